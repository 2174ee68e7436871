//! Risk decision types returned by the rule chain.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Block,
    /// Proceed with a smaller quantity and/or lower leverage.
    Reduce,
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Decision::Allow => write!(f, "ALLOW"),
            Decision::Block => write!(f, "BLOCK"),
            Decision::Reduce => write!(f, "REDUCE"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DecisionDetail {
    pub decision: Decision,
    pub reason: String,

    /// Name of the rule that produced a non-allow decision.
    pub triggered_rule: String,

    /// Reduce only: replacement quantity as a Money-equivalent string.
    pub suggested_quantity: Option<String>,
    /// Reduce only: replacement leverage.
    pub suggested_leverage: Option<u32>,
}

impl DecisionDetail {
    pub fn allow() -> Self {
        Self {
            decision: Decision::Allow,
            reason: "passed all risk checks".to_string(),
            triggered_rule: String::new(),
            suggested_quantity: None,
            suggested_leverage: None,
        }
    }

    pub fn block(reason: impl Into<String>, rule: impl Into<String>) -> Self {
        Self {
            decision: Decision::Block,
            reason: reason.into(),
            triggered_rule: rule.into(),
            suggested_quantity: None,
            suggested_leverage: None,
        }
    }

    pub fn reduce(
        reason: impl Into<String>,
        rule: impl Into<String>,
        suggested_quantity: Option<String>,
        suggested_leverage: Option<u32>,
    ) -> Self {
        Self {
            decision: Decision::Reduce,
            reason: reason.into(),
            triggered_rule: rule.into(),
            suggested_quantity,
            suggested_leverage,
        }
    }

    pub fn is_allowed(&self) -> bool {
        self.decision == Decision::Allow
    }

    pub fn is_blocked(&self) -> bool {
        self.decision == Decision::Block
    }

    pub fn should_reduce(&self) -> bool {
        self.decision == Decision::Reduce
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constructors_set_variant() {
        assert!(DecisionDetail::allow().is_allowed());

        let block = DecisionDetail::block("too big", "PositionLimit:TotalExposure");
        assert!(block.is_blocked());
        assert_eq!(block.triggered_rule, "PositionLimit:TotalExposure");

        let reduce = DecisionDetail::reduce(
            "downsize",
            "PositionLimit:SinglePosition",
            Some("0.06".to_string()),
            Some(1),
        );
        assert!(reduce.should_reduce());
        assert_eq!(reduce.suggested_quantity.as_deref(), Some("0.06"));
        assert_eq!(reduce.suggested_leverage, Some(1));
    }
}
