pub mod decision;
pub mod manager;

mod rule_circuit_breaker;
mod rule_fat_finger;
mod rule_position_limit;

pub use decision::{Decision, DecisionDetail};
pub use manager::{OrderContext, RiskManager};
