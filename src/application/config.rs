use crate::domain::DEFAULT_CURRENCY;

/// Settings handed to the ledger services at construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerConfig {
    /// Currency used when neither the caller nor a service price names one
    pub default_currency: String,
    /// How many times a transfer is attempted when its account write loses a race
    pub max_transfer_attempts: u32,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            default_currency: DEFAULT_CURRENCY.to_string(),
            max_transfer_attempts: 3,
        }
    }
}

impl LedgerConfig {
    pub fn with_default_currency(mut self, currency: impl Into<String>) -> Self {
        self.default_currency = currency.into();
        self
    }

    pub fn with_max_transfer_attempts(mut self, attempts: u32) -> Self {
        self.max_transfer_attempts = attempts.max(1);
        self
    }
}
