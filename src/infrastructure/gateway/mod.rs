pub mod market_data;
pub mod mock;
pub mod symbols;

pub use market_data::MockMarketDataRepo;
pub use mock::{MockExchangeConfig, MockSpotExchange};
pub use symbols::SymbolTable;
