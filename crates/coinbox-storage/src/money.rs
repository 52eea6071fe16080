//! Conversion between API amounts and stored cents.

use crate::{StorageError, StorageResult};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;

const CENTS_SCALE: u32 = 2;

/// Convert an amount to integer cents.
///
/// # Errors
///
/// Returns `StorageError::Validation` if the amount has more than two
/// significant decimal places or does not fit in an `i64`.
pub fn to_cents(amount: Decimal) -> StorageResult<i64> {
    let normalized = amount.normalize();
    if normalized.scale() > CENTS_SCALE {
        return Err(StorageError::Validation(format!(
            "Amount {amount} has more than {CENTS_SCALE} decimal places"
        )));
    }

    normalized
        .checked_mul(Decimal::ONE_HUNDRED)
        .and_then(|cents| cents.to_i64())
        .ok_or_else(|| StorageError::Validation(format!("Amount {amount} is out of range")))
}

/// Convert stored cents back to an amount with two decimal places.
pub fn from_cents(cents: i64) -> Decimal {
    Decimal::new(cents, CENTS_SCALE)
}

/// Require a strictly positive amount and convert it.
pub(crate) fn positive_cents(amount: Decimal) -> StorageResult<i64> {
    if amount <= Decimal::ZERO {
        return Err(StorageError::Validation(format!(
            "Amount must be positive, got {amount}"
        )));
    }
    to_cents(amount)
}
