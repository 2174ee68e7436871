// Gateway adapters (mock exchange, symbol metadata)
pub mod gateway;

// Prometheus metrics
pub mod observability;

// Durable sqlx-backed repositories
pub mod persistence;

// In-memory repositories for backtests and tests
pub mod repositories;
