use thiserror::Error;

/// Error taxonomy shared by the risk manager, the OMS and the repositories.
///
/// Components surface these upward unchanged; the OMS is the single place
/// where retry/reconciliation policy is applied.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("invalid money literal: {0:?}")]
    InvalidMoneyLiteral(String),

    #[error("division by zero")]
    DivisionByZero,

    #[error("not found: {0}")]
    NotFound(String),

    #[error("order rejected by risk manager [{rule}]: {reason}")]
    RiskRejected { rule: String, reason: String },

    #[error("gateway error: {0}")]
    Gateway(String),

    #[error("persistence error: {0}")]
    Persistence(String),

    #[error("terminal state violation: order {client_order_id} is {status}")]
    TerminalState {
        client_order_id: String,
        status: String,
    },

    #[error("internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Lookup misses are handled (not logged as errors) on OMS fallback paths.
    pub fn is_not_found(&self) -> bool {
        matches!(self, CoreError::NotFound(_))
    }
}

impl From<sqlx::Error> for CoreError {
    fn from(err: sqlx::Error) -> Self {
        CoreError::Persistence(err.to_string())
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        CoreError::Persistence(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn risk_rejected_formatting() {
        let err = CoreError::RiskRejected {
            rule: "CircuitBreaker:ConsecutiveLosses".to_string(),
            reason: "consecutive losses (3) >= max allowed (3)".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("CircuitBreaker:ConsecutiveLosses"));
        assert!(msg.contains("consecutive losses"));
    }

    #[test]
    fn not_found_predicate() {
        assert!(CoreError::NotFound("order x".to_string()).is_not_found());
        assert!(!CoreError::DivisionByZero.is_not_found());
    }
}
