//! C6: owns the open-position set and is its sole mutator. Translates
//! approved signals into `BrokerPort` calls and evaluates SL/TP each
//! tick. Ordering is enforced by the caller (Supervisor): one tick, one
//! executor call at a time, never concurrent mutations of the same
//! symbol's positions.

use std::collections::HashMap;

use chrono::Utc;
use rust_decimal::Decimal;
use tracing::{info, warn};

use crate::domain::errors::BrokerError;
use crate::domain::ports::BrokerPort;
use crate::domain::types::{Position, PositionStatus, Quote, Side, Signal, SignalDirection, Symbol, TradeRecord};

pub struct BrokerExecutor {
    open: HashMap<u64, Position>,
}

pub enum ClosedReason {
    StopLoss,
    TakeProfit,
    Manual,
    Forced,
}

impl BrokerExecutor {
    pub fn new() -> Self {
        Self {
            open: HashMap::new(),
        }
    }

    /// Adopt positions reported by the broker at startup (crash recovery).
    pub fn adopt(&mut self, positions: Vec<Position>) {
        for p in positions {
            self.open.insert(p.ticket, p);
        }
    }

    pub fn open_count(&self) -> usize {
        self.open.len()
    }

    pub fn open_positions(&self) -> Vec<&Position> {
        self.open.values().collect()
    }

    /// Evaluate every open position against the latest quote and close
    /// any that hit SL or TP. SL wins when both trigger in the same bar.
    pub async fn evaluate_exits(
        &mut self,
        broker: &dyn BrokerPort,
        symbol: Symbol,
        quote: Quote,
        bar_low: Decimal,
        bar_high: Decimal,
    ) -> Vec<(TradeRecord, ClosedReason)> {
        let mut closed = Vec::new();
        let tickets: Vec<u64> = self
            .open
            .values()
            .filter(|p| p.symbol.as_ref() == symbol.as_ref())
            .map(|p| p.ticket)
            .collect();

        for ticket in tickets {
            let Some(position) = self.open.get(&ticket) else {
                continue;
            };
            let sl_hit = match position.direction {
                Side::Buy => bar_low <= position.stop_loss,
                Side::Sell => bar_high >= position.stop_loss,
            };
            let tp_hit = match position.direction {
                Side::Buy => bar_high >= position.take_profit,
                Side::Sell => bar_low <= position.take_profit,
            };

            if !sl_hit && !tp_hit {
                continue;
            }

            let (exit_price, status) = if sl_hit {
                (position.stop_loss, PositionStatus::ClosedSl)
            } else {
                (position.take_profit, PositionStatus::ClosedTp)
            };

            match broker.close(ticket, exit_price).await {
                Ok(fill) => {
                    let record = self.finalize_close(ticket, fill, status, quote);
                    if let Some(record) = record {
                        info!(ticket, status = status.as_str(), pnl = %record.position.realized_pnl.unwrap_or_default(), "position closed");
                        closed.push((
                            record,
                            if sl_hit {
                                ClosedReason::StopLoss
                            } else {
                                ClosedReason::TakeProfit
                            },
                        ));
                    }
                }
                Err(e) => {
                    warn!(ticket, error = %e, "broker close failed, will retry next tick");
                }
            }
        }

        closed
    }

    pub async fn open_from_signal(
        &mut self,
        broker: &dyn BrokerPort,
        symbol: Symbol,
        signal: &Signal,
    ) -> Result<Position, BrokerError> {
        let side = match signal.direction {
            SignalDirection::Buy => Side::Buy,
            SignalDirection::Sell => Side::Sell,
            SignalDirection::Hold => {
                return Err(BrokerError::Rejected {
                    reason: "refusing to open a HOLD signal".into(),
                });
            }
        };

        let (ticket, fill_price) = broker
            .open(
                symbol,
                side,
                signal.lot_size,
                signal.stop_loss,
                signal.take_profit,
                "smc-signal",
            )
            .await?;

        let position = Position {
            ticket,
            symbol,
            timeframe: signal.analysis.timeframe,
            direction: side,
            volume: signal.lot_size,
            entry_price: fill_price,
            stop_loss: signal.stop_loss,
            take_profit: signal.take_profit,
            opened_at: Utc::now(),
            current_price: fill_price,
            unrealized_pnl: Decimal::ZERO,
            status: PositionStatus::Open,
            closed_at: None,
            exit_price: None,
            realized_pnl: None,
            confidence_at_entry: signal.confidence,
            setup_quality_at_entry: signal.setup_quality,
            smc_steps_at_entry: signal.reasons.clone(),
        };

        self.open.insert(ticket, position.clone());
        info!(ticket, side = ?side, volume = %signal.lot_size, entry = %fill_price, "position opened");
        Ok(position)
    }

    pub async fn close_manual(
        &mut self,
        broker: &dyn BrokerPort,
        ticket: u64,
        quote: Quote,
    ) -> Option<TradeRecord> {
        self.open.get(&ticket)?;
        match broker.close(ticket, quote.bid).await {
            Ok(fill) => self.finalize_close(ticket, fill, PositionStatus::ClosedManual, quote),
            Err(e) => {
                warn!(ticket, error = %e, "manual close failed");
                None
            }
        }
    }

    pub async fn force_close_all(
        &mut self,
        broker: &dyn BrokerPort,
        quote_for: impl Fn(Symbol) -> Quote,
    ) -> Vec<TradeRecord> {
        let tickets: Vec<u64> = self.open.keys().copied().collect();
        let mut records = Vec::new();
        for ticket in tickets {
            let Some(position) = self.open.get(&ticket) else {
                continue;
            };
            let symbol = position.symbol;
            let quote = quote_for(symbol);
            match broker.close(ticket, quote.bid).await {
                Ok(fill) => {
                    if let Some(record) = self.finalize_close(ticket, fill, PositionStatus::ClosedForced, quote)
                    {
                        records.push(record);
                    }
                }
                Err(e) => {
                    warn!(ticket, error = %e, "forced close failed during shutdown liquidation");
                }
            }
        }
        records
    }

    fn finalize_close(
        &mut self,
        ticket: u64,
        exit_price: Decimal,
        status: PositionStatus,
        quote: Quote,
    ) -> Option<TradeRecord> {
        let mut position = self.open.remove(&ticket)?;
        let pnl = Decimal::from(position.direction.sign())
            * (exit_price - position.entry_price)
            * position.volume
            * crate::application::sizing::CONTRACT_SIZE;
        position.status = status;
        position.closed_at = Some(quote.time);
        position.exit_price = Some(exit_price);
        position.realized_pnl = Some(pnl);
        position.current_price = exit_price;

        Some(TradeRecord {
            timeframe: position.timeframe,
            position,
            reasoning: format!("closed as {}", status.as_str()),
            session: "unspecified".to_string(),
        })
    }
}

impl Default for BrokerExecutor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::errors::BrokerError;
    use crate::domain::ports::BrokerPort;
    use crate::domain::types::AccountInfo;
    use async_trait::async_trait;
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use std::sync::Mutex;

    struct FakeBroker {
        next_ticket: Mutex<u64>,
    }

    #[async_trait]
    impl BrokerPort for FakeBroker {
        async fn open(
            &self,
            _symbol: Symbol,
            _side: Side,
            _volume: Decimal,
            _sl: Decimal,
            _tp: Decimal,
            _comment: &str,
        ) -> Result<(u64, Decimal), BrokerError> {
            let mut t = self.next_ticket.lock().unwrap();
            *t += 1;
            Ok((*t, dec!(2680.00)))
        }

        async fn close(&self, _ticket: u64, exit_price: Decimal) -> Result<Decimal, BrokerError> {
            Ok(exit_price)
        }

        async fn modify(&self, _ticket: u64, _sl: Decimal, _tp: Decimal) -> Result<(), BrokerError> {
            Ok(())
        }

        async fn current_price(&self, _symbol: Symbol) -> Result<Quote, BrokerError> {
            Ok(Quote {
                bid: dec!(2680),
                ask: dec!(2680.05),
                time: Utc::now(),
            })
        }

        async fn positions(&self) -> Result<Vec<Position>, BrokerError> {
            Ok(vec![])
        }

        async fn account_info(&self) -> Result<AccountInfo, BrokerError> {
            Ok(AccountInfo {
                balance: dec!(100000),
                equity: dec!(100000),
                currency: "USD",
            })
        }

        async fn market_open(&self, _symbol: Symbol, _now: chrono::DateTime<Utc>) -> bool {
            true
        }
    }

    fn sample_signal() -> Signal {
        let analysis = crate::domain::types::MarketAnalysis {
            at: Utc::now(),
            timeframe: crate::domain::types::Timeframe::M5,
            current_price: dec!(2680),
            trend: crate::domain::types::Direction::Bullish,
            session_levels: crate::domain::types::SessionLevels {
                session_high: dec!(2690),
                session_low: dec!(2670),
                prev_day_high: dec!(2690),
                prev_day_low: dec!(2670),
                weekly_high: dec!(2690),
                weekly_low: dec!(2670),
            },
            order_blocks: vec![],
            bos: crate::domain::types::BosFinding::none(Utc::now()),
            liquidity_grabs: vec![],
            indicators: crate::domain::types::Indicators {
                vwap: dec!(2685),
                ema21: dec!(2675),
                ema50: dec!(2670),
                ema200: dec!(2650),
                rsi: dec!(55),
                atr: dec!(2),
            },
            setup_quality: 10,
        };
        Signal {
            direction: SignalDirection::Buy,
            confidence: dec!(0.9),
            entry: dec!(2680.00),
            stop_loss: dec!(2678.95),
            take_profit: dec!(2682.10),
            risk_reward_ratio: dec!(2.0),
            lot_size: dec!(0.38),
            setup_quality: 10,
            reasons: vec!["ok".into()],
            ts: Utc::now(),
            analysis,
            ai_validated: Some(true),
            ai_confidence: Some(dec!(0.9)),
        }
    }

    #[tokio::test]
    async fn opening_inserts_into_open_set() {
        let broker = FakeBroker {
            next_ticket: Mutex::new(0),
        };
        let mut executor = BrokerExecutor::new();
        let position = executor
            .open_from_signal(&broker, Symbol::XAUUSD, &sample_signal())
            .await
            .unwrap();
        assert_eq!(executor.open_count(), 1);
        assert_eq!(position.status, PositionStatus::Open);
    }

    #[tokio::test]
    async fn stop_loss_wins_when_both_trigger_same_bar() {
        let broker = FakeBroker {
            next_ticket: Mutex::new(0),
        };
        let mut executor = BrokerExecutor::new();
        executor
            .open_from_signal(&broker, Symbol::XAUUSD, &sample_signal())
            .await
            .unwrap();

        let quote = Quote {
            bid: dec!(2678.90),
            ask: dec!(2679.00),
            time: Utc::now(),
        };
        // A bar whose low/high straddle both SL and TP in the same tick.
        let closed = executor
            .evaluate_exits(&broker, Symbol::XAUUSD, quote, dec!(2678.90), dec!(2683.00))
            .await;
        assert_eq!(closed.len(), 1);
        assert_eq!(closed[0].0.position.status, PositionStatus::ClosedSl);
        assert_eq!(closed[0].0.position.exit_price, Some(dec!(2678.95)));
        assert_eq!(executor.open_count(), 0);
    }
}
