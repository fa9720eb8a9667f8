// Ledger documents and their settlement
pub mod settlement;

// Cash handling
pub mod cash_sessions;
pub mod tills;

// Stock
pub mod inventory_counts;

// Shared
pub mod audit;
pub mod numbering;

use crate::errors::ServiceError;
use rust_decimal::Decimal;

/// Smallest money amount accepted for a posting, document or movement.
pub const MIN_AMOUNT: Decimal = Decimal::from_parts(1, 0, 0, false, 2);

/// Money carries at most two decimal places.
pub(crate) fn require_cents(field: &str, value: Decimal) -> Result<(), ServiceError> {
    if value.round_dp(2) != value {
        return Err(ServiceError::ValidationError(format!(
            "{field} must have at most 2 decimal places"
        )));
    }
    Ok(())
}

pub(crate) fn require_amount(field: &str, value: Decimal) -> Result<(), ServiceError> {
    require_cents(field, value)?;
    if value < MIN_AMOUNT {
        return Err(ServiceError::ValidationError(format!(
            "{field} must be at least {MIN_AMOUNT}"
        )));
    }
    Ok(())
}

pub(crate) fn require_non_negative(field: &str, value: Decimal) -> Result<(), ServiceError> {
    require_cents(field, value)?;
    if value.is_sign_negative() && !value.is_zero() {
        return Err(ServiceError::ValidationError(format!(
            "{field} must not be negative"
        )));
    }
    Ok(())
}

/// Rejects blank free-text fields that passed length validation.
pub(crate) fn require_text(field: &str, value: &str) -> Result<(), ServiceError> {
    if value.trim().is_empty() {
        return Err(ServiceError::ValidationError(format!("{field} is required")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn min_amount_is_one_cent() {
        assert_eq!(MIN_AMOUNT, dec!(0.01));
    }

    #[test]
    fn amount_rules() {
        assert!(require_amount("amount", dec!(0.01)).is_ok());
        assert!(require_amount("amount", dec!(0.00)).is_err());
        assert!(require_amount("amount", dec!(10.005)).is_err());
        assert!(require_non_negative("discount", dec!(0)).is_ok());
        assert!(require_non_negative("discount", dec!(-0.01)).is_err());
        assert!(require_text("reason", "   ").is_err());
    }
}
