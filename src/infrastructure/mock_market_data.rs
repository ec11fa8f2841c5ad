//! Deterministic synthetic market data, structured as a pull-based
//! `MarketDataPort` (no subscription/broadcast machinery) since the
//! Supervisor polls rather than streams.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use rust_decimal::Decimal;
use rust_decimal::prelude::FromPrimitive;
use tokio::sync::RwLock;

use crate::domain::errors::MarketDataError;
use crate::domain::ports::MarketDataPort;
use crate::domain::types::{Bar, Quote, Symbol, Timeframe};

/// Pull-based synthetic feed. Each call to `bars` regenerates a
/// deterministic series ending at the last published price, using a
/// linear-congruential walk so repeated runs against the same seed are
/// reproducible.
pub struct MockMarketDataSource {
    base_price: Decimal,
    tick_counter: AtomicI64,
    last_price: Arc<RwLock<Decimal>>,
}

impl MockMarketDataSource {
    pub fn new(base_price: Decimal) -> Self {
        Self {
            base_price,
            tick_counter: AtomicI64::new(0),
            last_price: Arc::new(RwLock::new(base_price)),
        }
    }

    fn next_walk_step(&self, index: i64) -> Decimal {
        let seed = (index as u64).wrapping_mul(1_103_515_245).wrapping_add(12_345);
        let random_val = ((seed / 65_536) % 1000) as f64 / 1000.0 - 0.5;
        Decimal::from_f64(random_val * 0.002).unwrap_or(Decimal::ZERO)
    }

    pub async fn set_price(&self, price: Decimal) {
        *self.last_price.write().await = price;
    }
}

#[async_trait]
impl MarketDataPort for MockMarketDataSource {
    async fn bars(
        &self,
        symbol: Symbol,
        timeframe: Timeframe,
        count: usize,
    ) -> Result<Vec<Bar>, MarketDataError> {
        if count == 0 {
            return Err(MarketDataError::InvalidData {
                symbol: symbol.to_string(),
                reason: "requested zero bars".to_string(),
            });
        }

        let mut price = self.base_price;
        let now = Utc::now();
        let minutes = timeframe.minutes();
        let mut bars = Vec::with_capacity(count);

        for i in 0..count {
            let idx = self.tick_counter.fetch_add(1, Ordering::Relaxed);
            let step = self.next_walk_step(idx);
            let open = price;
            price = (price * (Decimal::ONE + step)).max(Decimal::new(1, 2));
            let close = price;
            let high = open.max(close) + Decimal::new(5, 1);
            let low = open.min(close) - Decimal::new(5, 1);
            let time = now - ChronoDuration::minutes(minutes * (count - i) as i64);

            bars.push(Bar {
                time,
                open,
                high,
                low,
                close,
                volume: 100 + (idx.unsigned_abs() % 50) as i64,
            });
        }

        *self.last_price.write().await = price;
        Ok(bars)
    }

    async fn current_price(&self, _symbol: Symbol) -> Result<Quote, MarketDataError> {
        let price = *self.last_price.read().await;
        Ok(Quote {
            bid: price,
            ask: price + Decimal::new(5, 2),
            time: Utc::now(),
        })
    }
}
