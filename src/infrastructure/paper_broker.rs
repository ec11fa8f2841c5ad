//! In-process `BrokerPort` for paper trading: synthetic tickets,
//! last-observed price as the fill price, positions tracked only well
//! enough to report account equity (the BrokerExecutor is the
//! authoritative owner of open-position state).

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tokio::sync::RwLock;
use tracing::info;

use crate::domain::errors::BrokerError;
use crate::domain::ports::{BrokerPort, MarketDataPort};
use crate::domain::types::{AccountInfo, Position, Quote, Side, Symbol};

struct OpenTicket {
    side: Side,
    volume: Decimal,
    entry_price: Decimal,
    symbol: Symbol,
}

pub struct PaperBroker {
    starting_balance: Decimal,
    realized_pnl: RwLock<Decimal>,
    next_ticket: AtomicU64,
    open: RwLock<HashMap<u64, OpenTicket>>,
    market_data: Arc<dyn MarketDataPort>,
}

impl PaperBroker {
    pub fn new(starting_balance: Decimal, market_data: Arc<dyn MarketDataPort>) -> Self {
        Self {
            starting_balance,
            realized_pnl: RwLock::new(Decimal::ZERO),
            next_ticket: AtomicU64::new(1),
            open: RwLock::new(HashMap::new()),
            market_data,
        }
    }
}

#[async_trait]
impl BrokerPort for PaperBroker {
    async fn open(
        &self,
        symbol: Symbol,
        side: Side,
        volume: Decimal,
        _sl: Decimal,
        _tp: Decimal,
        comment: &str,
    ) -> Result<(u64, Decimal), BrokerError> {
        let quote = self
            .market_data
            .current_price(symbol)
            .await
            .map_err(|e| BrokerError::TransientIo {
                reason: e.to_string(),
            })?;
        let fill_price = match side {
            Side::Buy => quote.ask,
            Side::Sell => quote.bid,
        };

        let ticket = self.next_ticket.fetch_add(1, Ordering::Relaxed);
        self.open.write().await.insert(
            ticket,
            OpenTicket {
                side,
                volume,
                entry_price: fill_price,
                symbol,
            },
        );

        info!(ticket, %symbol, ?side, %volume, %fill_price, comment, "paper order filled");
        Ok((ticket, fill_price))
    }

    async fn close(&self, ticket: u64, exit_price: Decimal) -> Result<Decimal, BrokerError> {
        let mut open = self.open.write().await;
        let Some(position) = open.remove(&ticket) else {
            return Err(BrokerError::Rejected {
                reason: format!("no open paper ticket {ticket}"),
            });
        };
        let pnl = Decimal::from(position.side.sign())
            * (exit_price - position.entry_price)
            * position.volume
            * crate::application::sizing::CONTRACT_SIZE;
        *self.realized_pnl.write().await += pnl;
        Ok(exit_price)
    }

    async fn modify(&self, ticket: u64, _sl: Decimal, _tp: Decimal) -> Result<(), BrokerError> {
        if self.open.read().await.contains_key(&ticket) {
            Ok(())
        } else {
            Err(BrokerError::Rejected {
                reason: format!("no open paper ticket {ticket}"),
            })
        }
    }

    async fn current_price(&self, symbol: Symbol) -> Result<Quote, BrokerError> {
        self.market_data
            .current_price(symbol)
            .await
            .map_err(|e| BrokerError::TransientIo {
                reason: e.to_string(),
            })
    }

    async fn positions(&self) -> Result<Vec<Position>, BrokerError> {
        // Paper mode keeps no durable position records of its own; the
        // BrokerExecutor in-process state is authoritative and this
        // adapter never restarts mid-position in practice.
        Ok(vec![])
    }

    async fn account_info(&self) -> Result<AccountInfo, BrokerError> {
        let realized = *self.realized_pnl.read().await;
        let open = self.open.read().await;
        let mut unrealized = Decimal::ZERO;
        for (_, position) in open.iter() {
            if let Ok(quote) = self.market_data.current_price(position.symbol).await {
                let mark = match position.side {
                    Side::Buy => quote.bid,
                    Side::Sell => quote.ask,
                };
                unrealized += Decimal::from(position.side.sign())
                    * (mark - position.entry_price)
                    * position.volume
                    * crate::application::sizing::CONTRACT_SIZE;
            }
        }
        let balance = self.starting_balance + realized;
        Ok(AccountInfo {
            balance,
            equity: balance + unrealized,
            currency: "USD",
        })
    }

    async fn market_open(&self, _symbol: Symbol, now: DateTime<Utc>) -> bool {
        crate::application::supervisor::is_market_open(now)
    }
}
