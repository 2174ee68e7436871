// Order management system
pub mod oms;

// Pre-trade risk management
pub mod risk;
