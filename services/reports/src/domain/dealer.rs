/// Dealer identifiers and per-dealer connection credentials
use std::fmt;

use thiserror::Error;

use super::query_row::QueryRow;

/// Longest accepted dealer identifier
pub const MAX_DEALER_ID_LENGTH: usize = 64;

#[derive(Debug, Clone, PartialEq, Error)]
#[error("Invalid dealer identifier: {0:?} (expected 1-64 characters of A-Z, a-z, 0-9 or '-')")]
pub struct InvalidDealerId(pub String);

/// A dealer identifier or integration code supplied by the caller.
///
/// Only ASCII alphanumerics and `-` are accepted, so an identifier can
/// never carry SQL or URL syntax even before it is bound as a parameter.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DealerId(String);

impl DealerId {
    pub fn parse(value: &str) -> Result<Self, InvalidDealerId> {
        let value = value.trim();
        let valid = !value.is_empty()
            && value.len() <= MAX_DEALER_ID_LENGTH
            && value.chars().all(|c| c.is_ascii_alphanumeric() || c == '-');

        if valid {
            Ok(Self(value.to_string()))
        } else {
            Err(InvalidDealerId(value.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DealerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Everything needed to reach one dealer's database
#[derive(Clone, PartialEq)]
pub struct DealerConnectionInfo {
    /// Identifier the job asked for
    pub dealer_id: DealerId,
    /// Integration code the dealer's rows are filtered by
    pub internal_code: String,
    pub dealer_name: String,
    pub host: String,
    pub database: String,
    pub user: String,
    pub password: String,
}

impl DealerConnectionInfo {
    /// Identity fields (`dealerName`, `dealerCode`) for report rows
    pub fn identity_row(&self) -> QueryRow {
        QueryRow::from_pairs([
            ("dealerName", self.dealer_name.as_str()),
            ("dealerCode", self.internal_code.as_str()),
        ])
    }
}

impl fmt::Debug for DealerConnectionInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DealerConnectionInfo")
            .field("dealer_id", &self.dealer_id)
            .field("internal_code", &self.internal_code)
            .field("dealer_name", &self.dealer_name)
            .field("host", &self.host)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .finish()
    }
}
