//! Domain error taxonomy. Each component matches on its own enum to
//! decide retry/skip/surface behavior; these never wrap `anyhow::Error`
//! so the Supervisor can build a `SystemEvent` from them without
//! downcasting.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("invalid input: {reason}")]
    InvalidInput { reason: String },
}

#[derive(Debug, Error)]
pub enum SizingError {
    #[error("invalid stop: entry and stop_loss coincide")]
    InvalidStop,
}

#[derive(Debug, Error)]
pub enum AiError {
    #[error("transient AI failure: {reason}")]
    Transient { reason: String },
    #[error("permanent AI failure: {reason}")]
    Permanent { reason: String },
    #[error("unparseable AI reply: {reason}")]
    Parse { reason: String },
}

#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("transient broker I/O error: {reason}")]
    TransientIo { reason: String },
    #[error("permanent broker I/O error: {reason}")]
    PermanentIo { reason: String },
    #[error("broker rejected order: {reason}")]
    Rejected { reason: String },
}

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("transient persistence I/O error: {reason}")]
    TransientIo { reason: String },
    #[error("bot/persistence state is corrupt: {reason}")]
    StateCorrupt { reason: String },
}

#[derive(Debug, Error)]
pub enum MarketDataError {
    #[error("transient market data error: {reason}")]
    TransientIo { reason: String },
    #[error("invalid market data for {symbol}: {reason}")]
    InvalidData { symbol: String, reason: String },
}
