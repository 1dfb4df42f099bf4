/// What a dealer whose queries fail contributes to the report
use std::fmt;
use std::str::FromStr;

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
#[error("Unknown dealer failure policy: {0} (expected zeroed, omit or abort)")]
pub struct UnknownFailurePolicy(pub String);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DealerFailurePolicy {
    /// Log the failure and emit one defaulted row carrying only the dealer identity
    #[default]
    Zeroed,
    /// Log the failure and emit nothing for the dealer
    Omit,
    /// Fail the whole invocation on the first dealer failure
    Abort,
}

impl DealerFailurePolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            DealerFailurePolicy::Zeroed => "zeroed",
            DealerFailurePolicy::Omit => "omit",
            DealerFailurePolicy::Abort => "abort",
        }
    }
}

impl FromStr for DealerFailurePolicy {
    type Err = UnknownFailurePolicy;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "zeroed" => Ok(DealerFailurePolicy::Zeroed),
            "omit" => Ok(DealerFailurePolicy::Omit),
            "abort" => Ok(DealerFailurePolicy::Abort),
            _ => Err(UnknownFailurePolicy(value.to_string())),
        }
    }
}

impl fmt::Display for DealerFailurePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
