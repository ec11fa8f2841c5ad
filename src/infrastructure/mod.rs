pub mod ai_client;
pub mod database;
pub mod http_client_factory;
pub mod metrics;
pub mod mock_market_data;
pub mod paper_broker;
pub mod repositories;
