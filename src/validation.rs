//! Constraint definitions shared by the working-state engine and the
//! persisted-document checks.

use chrono::NaiveDate;
use std::collections::{HashMap, HashSet};
use thiserror::Error;

use crate::Amount;
use crate::model::{CostShareType, TierIndex, ValueField};

/// A rejected write. Messages are user facing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{0} is required")]
    Required(&'static str),

    #[error("effective date '{0}' must be a valid YYYY-MM-DD date")]
    InvalidEffectiveDate(String),

    #[error("class name cannot be empty")]
    EmptyClassName,

    #[error("class name '{0}' is already used in this structure")]
    DuplicateClassName(String),

    #[error("class id '{0}' is already used in this structure")]
    DuplicateClassId(String),

    #[error("benefit {benefit} is already assigned to class {class}")]
    BenefitAlreadyAssigned { benefit: String, class: String },

    #[error("quantity must be a positive whole number, got {0}")]
    InvalidQuantity(i64),

    #[error("interval value must be a positive whole number, got {0}")]
    InvalidIntervalValue(i64),

    #[error("{0} cannot be negative")]
    NegativeValue(&'static str),

    #[error("coinsurance percentage must be between 0 and 100, got {0}")]
    PercentageOutOfRange(Amount),

    #[error("{cost_share_type} cost share does not take a {field}")]
    FieldNotAccepted {
        cost_share_type: &'static str,
        field: &'static str,
    },

    #[error("network tier {tier} is out of range, the plan has {tiers} tier(s)")]
    TierOutOfRange { tier: TierIndex, tiers: u8 },

    #[error("{0} does not match the class structure's effective date, market segment and product type")]
    Incompatible(&'static str),

    #[error("structure declares {declared} classes but has {actual}")]
    ClassCountMismatch { declared: usize, actual: usize },
}

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Rule: a required text field must not be blank.
pub fn validate_required(field: &'static str, value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::Required(field));
    }
    Ok(())
}

/// Rule: effective dates are zero padded `YYYY-MM-DD` calendar dates.
pub fn validate_effective_date(value: &str) -> Result<NaiveDate, ValidationError> {
    let invalid = || ValidationError::InvalidEffectiveDate(value.to_string());
    if value.len() != 10 {
        return Err(invalid());
    }
    NaiveDate::parse_from_str(value, DATE_FORMAT).map_err(|_| invalid())
}

/// Rule: a class name is non-empty and not used by any other class.
///
/// `others` must not include the class being named.
pub fn validate_class_name<'a>(
    name: &str,
    others: impl IntoIterator<Item = &'a str>,
) -> Result<(), ValidationError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(ValidationError::EmptyClassName);
    }
    if others.into_iter().any(|other| other.trim() == name) {
        return Err(ValidationError::DuplicateClassName(name.to_string()));
    }
    Ok(())
}

/// Rule: every class name in a structure is non-empty and unique.
pub fn validate_class_names<'a>(
    names: impl IntoIterator<Item = &'a str>,
) -> Result<(), ValidationError> {
    let mut seen = HashSet::new();
    for name in names {
        let name = name.trim();
        if name.is_empty() {
            return Err(ValidationError::EmptyClassName);
        }
        if !seen.insert(name) {
            return Err(ValidationError::DuplicateClassName(name.to_string()));
        }
    }
    Ok(())
}

/// Rule: class ids are unique within a structure.
pub fn validate_class_ids<'a>(ids: impl IntoIterator<Item = &'a str>) -> Result<(), ValidationError> {
    let mut seen = HashSet::new();
    for id in ids {
        if !seen.insert(id) {
            return Err(ValidationError::DuplicateClassId(id.to_string()));
        }
    }
    Ok(())
}

/// Rule: a benefit appears in at most one class of a structure.
///
/// Takes `(class id, benefit id)` pairs in structure order.
pub fn validate_benefit_uniqueness<'a>(
    assignments: impl IntoIterator<Item = (&'a str, &'a str)>,
) -> Result<(), ValidationError> {
    let mut owners: HashMap<&str, &str> = HashMap::new();
    for (class, benefit) in assignments {
        if let Some(owner) = owners.insert(benefit, class) {
            return Err(ValidationError::BenefitAlreadyAssigned {
                benefit: benefit.to_string(),
                class: owner.to_string(),
            });
        }
    }
    Ok(())
}

/// Rule: limit quantities are positive.
pub fn validate_quantity(value: i64) -> Result<u32, ValidationError> {
    match u32::try_from(value) {
        Ok(quantity) if quantity > 0 => Ok(quantity),
        _ => Err(ValidationError::InvalidQuantity(value)),
    }
}

/// Rule: limit interval values are positive.
pub fn validate_interval_value(value: i64) -> Result<u32, ValidationError> {
    match u32::try_from(value) {
        Ok(interval) if interval > 0 => Ok(interval),
        _ => Err(ValidationError::InvalidIntervalValue(value)),
    }
}

/// Rule: a cost-share value must fit the record's type and range.
pub fn validate_cost_share_value(
    cost_share_type: CostShareType,
    field: ValueField,
    value: Amount,
) -> Result<(), ValidationError> {
    if !cost_share_type.accepts(field) {
        return Err(ValidationError::FieldNotAccepted {
            cost_share_type: cost_share_type.display_name(),
            field: field.display_name(),
        });
    }
    if value.is_negative() {
        return Err(ValidationError::NegativeValue(field.display_name()));
    }
    if field == ValueField::CoinsurancePercentage && value > Amount::whole(100) {
        return Err(ValidationError::PercentageOutOfRange(value));
    }
    Ok(())
}

/// Rule: a tier index addresses one of the plan's configured tiers.
pub fn validate_tier(tier: TierIndex, tiers: u8) -> Result<(), ValidationError> {
    if tier >= tiers {
        return Err(ValidationError::TierOutOfRange { tier, tiers });
    }
    Ok(())
}
