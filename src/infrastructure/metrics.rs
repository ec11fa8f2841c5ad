//! Prometheus metrics: `xautrade_`-prefixed gauges and counters exposed
//! read-only via `Metrics::render`.

use prometheus::{
    CounterVec, Gauge, GaugeVec, Opts, Registry, TextEncoder,
    core::{AtomicF64, GenericGauge, GenericGaugeVec},
};
use std::sync::Arc;

#[derive(Clone)]
pub struct Metrics {
    registry: Arc<Registry>,
    pub account_balance_usd: GenericGauge<AtomicF64>,
    pub account_equity_usd: GenericGauge<AtomicF64>,
    pub open_positions_count: GenericGauge<AtomicF64>,
    pub daily_pnl_usd: GenericGauge<AtomicF64>,
    pub trades_total: CounterVec,
    pub signals_total: CounterVec,
    pub risk_blocks_total: CounterVec,
    pub ai_calls_total: CounterVec,
    pub setup_quality_current: GenericGaugeVec<AtomicF64>,
    pub uptime_seconds: GenericGauge<AtomicF64>,
}

impl Metrics {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let account_balance_usd = Gauge::with_opts(Opts::new(
            "xautrade_account_balance_usd",
            "Account balance in USD",
        ))?;
        registry.register(Box::new(account_balance_usd.clone()))?;

        let account_equity_usd = Gauge::with_opts(Opts::new(
            "xautrade_account_equity_usd",
            "Account equity (balance plus unrealized P&L) in USD",
        ))?;
        registry.register(Box::new(account_equity_usd.clone()))?;

        let open_positions_count = Gauge::with_opts(Opts::new(
            "xautrade_open_positions_count",
            "Number of currently open positions",
        ))?;
        registry.register(Box::new(open_positions_count.clone()))?;

        let daily_pnl_usd =
            Gauge::with_opts(Opts::new("xautrade_daily_pnl_usd", "Realized P&L for the current UTC day"))?;
        registry.register(Box::new(daily_pnl_usd.clone()))?;

        let trades_total = CounterVec::new(
            Opts::new("xautrade_trades_total", "Closed trades by outcome"),
            &["status"],
        )?;
        registry.register(Box::new(trades_total.clone()))?;

        let signals_total = CounterVec::new(
            Opts::new("xautrade_signals_total", "Signals generated by direction"),
            &["direction"],
        )?;
        registry.register(Box::new(signals_total.clone()))?;

        let risk_blocks_total = CounterVec::new(
            Opts::new("xautrade_risk_blocks_total", "RiskGate rejections by reason class"),
            &["reason"],
        )?;
        registry.register(Box::new(risk_blocks_total.clone()))?;

        let ai_calls_total = CounterVec::new(
            Opts::new("xautrade_ai_calls_total", "AI validator calls by outcome"),
            &["outcome"],
        )?;
        registry.register(Box::new(ai_calls_total.clone()))?;

        let setup_quality_current = GaugeVec::new(
            Opts::new("xautrade_setup_quality_current", "Most recent setup quality score"),
            &["symbol"],
        )?;
        registry.register(Box::new(setup_quality_current.clone()))?;

        let uptime_seconds =
            Gauge::with_opts(Opts::new("xautrade_uptime_seconds", "Daemon uptime in seconds"))?;
        registry.register(Box::new(uptime_seconds.clone()))?;

        Ok(Self {
            registry: Arc::new(registry),
            account_balance_usd,
            account_equity_usd,
            open_positions_count,
            daily_pnl_usd,
            trades_total,
            signals_total,
            risk_blocks_total,
            ai_calls_total,
            setup_quality_current,
            uptime_seconds,
        })
    }

    /// Render in Prometheus text exposition format for a push-gateway or
    /// a scrape pulled by a sidecar; this crate does not run its own
    /// HTTP server for metrics.
    pub fn render(&self) -> anyhow::Result<String> {
        let encoder = TextEncoder::new();
        let families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_without_panicking() {
        let metrics = Metrics::new().unwrap();
        metrics.account_balance_usd.set(100_000.0);
        let rendered = metrics.render().unwrap();
        assert!(rendered.contains("xautrade_account_balance_usd"));
    }
}
