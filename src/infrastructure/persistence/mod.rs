pub mod database;
pub mod order_repository;
pub mod risk_repository;

pub use database::Database;
pub use order_repository::SqliteOrderRepository;
pub use risk_repository::SqliteRiskRepository;
