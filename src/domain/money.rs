use thiserror::Error;

use super::DomainError;

/// Money is held as integer minor units so balances never drift.
/// 1 unit = 100 cents, so 3000.93 = 300093 cents.
pub type Cents = i64;

/// Currency applied when a caller leaves the code empty.
pub const DEFAULT_CURRENCY: &str = "AOA";

/// Format cents as a decimal string.
/// Example: 5000 -> "50.00", -1234 -> "-12.34"
pub fn format_cents(cents: Cents) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let abs_cents = cents.unsigned_abs();
    format!("{}{}.{:02}", sign, abs_cents / 100, abs_cents % 100)
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseCentsError {
    #[error("invalid money format")]
    InvalidFormat,

    #[error("amount is too large")]
    Overflow,
}

/// Parse a decimal string into cents. Digits beyond the second decimal are truncated.
/// Example: "200.00" -> 20000, "12.5" -> 1250, "100" -> 10000
pub fn parse_cents(input: &str) -> Result<Cents, ParseCentsError> {
    let input = input.trim();
    let (negative, digits) = match input.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, input),
    };

    let (units_str, decimal_str) = match digits.split_once('.') {
        Some((units, decimals)) if !decimals.contains('.') => (units, decimals),
        Some(_) => return Err(ParseCentsError::InvalidFormat),
        None => (digits, ""),
    };

    if units_str.is_empty() && decimal_str.is_empty() {
        return Err(ParseCentsError::InvalidFormat);
    }
    let all_digits = |s: &str| s.chars().all(|c| c.is_ascii_digit());
    if !all_digits(units_str) || !all_digits(decimal_str) {
        return Err(ParseCentsError::InvalidFormat);
    }

    let units: i64 = if units_str.is_empty() {
        0
    } else {
        units_str.parse().map_err(|_| ParseCentsError::Overflow)?
    };

    let decimal_cents: i64 = match decimal_str.len() {
        0 => 0,
        1 => decimal_str.parse::<i64>().map_err(|_| ParseCentsError::InvalidFormat)? * 10,
        _ => decimal_str[..2]
            .parse()
            .map_err(|_| ParseCentsError::InvalidFormat)?,
    };

    let cents = units
        .checked_mul(100)
        .and_then(|c| c.checked_add(decimal_cents))
        .ok_or(ParseCentsError::Overflow)?;
    Ok(if negative { -cents } else { cents })
}

/// Resolve a caller-supplied currency code.
/// Empty input falls back to [`DEFAULT_CURRENCY`]; anything else must be three ASCII letters.
pub fn normalize_currency(currency: &str) -> Result<String, DomainError> {
    let currency = currency.trim();
    if currency.is_empty() {
        return Ok(DEFAULT_CURRENCY.to_string());
    }
    if currency.len() != 3 || !currency.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(DomainError::validation(format!(
            "invalid currency code: {}",
            currency
        )));
    }
    Ok(currency.to_ascii_uppercase())
}
