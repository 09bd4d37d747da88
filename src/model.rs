//! Core domain types for plan configuration.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::Amount;

/// Benefit class identifier, unique within a class structure.
pub type ClassId = String;

/// Benefit identifier (the benefit code from the catalog).
pub type BenefitId = String;

/// Index into a plan's ordered list of network tiers.
pub type TierIndex = u8;

/// A string did not name any variant of a closed enumeration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown {kind} '{value}'")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

/// Declares a closed enumeration with its wire name and display name.
macro_rules! closed_enum {
    (
        $(#[$meta:meta])*
        $name:ident {
            $( $(#[$vmeta:meta])* $variant:ident => $wire:literal, $display:literal; )+
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub enum $name {
            $( $(#[$vmeta])* #[serde(rename = $wire)] $variant, )+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            /// Name used in documents and edit scripts.
            pub fn as_str(self) -> &'static str {
                match self {
                    $($name::$variant => $wire,)+
                }
            }

            /// Human readable label.
            pub fn display_name(self) -> &'static str {
                match self {
                    $($name::$variant => $display,)+
                }
            }
        }

        impl FromStr for $name {
            type Err = UnknownVariant;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let s = s.trim();
                $name::ALL
                    .iter()
                    .copied()
                    .find(|v| v.as_str().eq_ignore_ascii_case(s))
                    .ok_or_else(|| UnknownVariant {
                        kind: stringify!($name),
                        value: s.to_string(),
                    })
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

closed_enum! {
    MarketSegment {
        Individual => "Individual", "Individual";
        SmallGroup => "SmallGroup", "Small Group";
        LargeGroup => "LargeGroup", "Large Group";
    }
}

closed_enum! {
    ProductType {
        Dppo => "DPPO", "Dental PPO";
        Dhmo => "DHMO", "Dental HMO";
        Indemnity => "Indemnity", "Indemnity";
    }
}

closed_enum! {
    /// Patient-responsibility formula for a covered service.
    CostShareType {
        NotCovered => "NotCovered", "Not Covered";
        Copay => "Copay", "Copay";
        Coinsurance => "Coinsurance", "Coinsurance";
        CopayThenCoinsurance => "CopayThenCoinsurance", "Copay then Coinsurance";
        DeductibleThenCopay => "DeductibleThenCopay", "Deductible then Copay";
        DeductibleThenCoinsurance => "DeductibleThenCoinsurance", "Deductible then Coinsurance";
    }
}

closed_enum! {
    CoverageType {
        Adult => "Adult", "Adult";
        Child => "Child", "Child";
    }
}

closed_enum! {
    IntervalType {
        PerVisit => "PerVisit", "Per Visit";
        PerYear => "PerYear", "Per Year";
        PerLifetime => "PerLifetime", "Per Lifetime";
    }
}

closed_enum! {
    UnitType {
        PerTooth => "PerTooth", "Per Tooth";
        PerItem => "PerItem", "Per Item";
        NotApplicable => "N/A", "N/A";
    }
}

closed_enum! {
    /// A value slot on a cost-share record.
    ValueField {
        CopayAmount => "copayAmount", "Copay Amount";
        CoinsurancePercentage => "coinsurancePercentage", "Coinsurance %";
    }
}

impl CostShareType {
    /// Whether records of this type carry the given value field.
    pub fn accepts(self, field: ValueField) -> bool {
        use CostShareType::*;
        match field {
            ValueField::CopayAmount => {
                matches!(self, Copay | CopayThenCoinsurance | DeductibleThenCopay)
            }
            ValueField::CoinsurancePercentage => matches!(
                self,
                Coinsurance | CopayThenCoinsurance | DeductibleThenCoinsurance
            ),
        }
    }
}

/// Reference to a catalog benefit held by a class (id plus denormalized name).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BenefitRef {
    pub id: BenefitId,
    pub name: String,
}

impl BenefitRef {
    pub fn new(id: impl Into<BenefitId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

/// Value slots of a cost-share record. Empty when both are absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CostShareValues {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub copay_amount: Option<Amount>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coinsurance_percentage: Option<Amount>,
}

impl CostShareValues {
    pub fn is_empty(&self) -> bool {
        self.copay_amount.is_none() && self.coinsurance_percentage.is_none()
    }

    pub fn get(&self, field: ValueField) -> Option<Amount> {
        match field {
            ValueField::CopayAmount => self.copay_amount,
            ValueField::CoinsurancePercentage => self.coinsurance_percentage,
        }
    }

    pub fn set(&mut self, field: ValueField, value: Amount) {
        match field {
            ValueField::CopayAmount => self.copay_amount = Some(value),
            ValueField::CoinsurancePercentage => self.coinsurance_percentage = Some(value),
        }
    }
}

/// Key of a cost-share record. An absent benefit marks the class-level default.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CostShareKey {
    pub class: ClassId,
    pub benefit: Option<BenefitId>,
    pub tier: TierIndex,
    pub coverage: CoverageType,
}

impl CostShareKey {
    pub fn benefit(
        class: impl Into<ClassId>,
        benefit: impl Into<BenefitId>,
        tier: TierIndex,
        coverage: CoverageType,
    ) -> Self {
        Self {
            class: class.into(),
            benefit: Some(benefit.into()),
            tier,
            coverage,
        }
    }

    pub fn class_default(class: impl Into<ClassId>, tier: TierIndex, coverage: CoverageType) -> Self {
        Self {
            class: class.into(),
            benefit: None,
            tier,
            coverage,
        }
    }

    /// The class-level key for the same (class, tier, coverage).
    pub fn to_class_default(&self) -> Self {
        Self::class_default(self.class.clone(), self.tier, self.coverage)
    }
}

/// How a covered service is paid for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CostShare {
    pub cost_share_type: CostShareType,
    #[serde(default)]
    pub values: CostShareValues,
}

impl CostShare {
    pub fn new(cost_share_type: CostShareType) -> Self {
        Self {
            cost_share_type,
            values: CostShareValues::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interval {
    #[serde(rename = "type")]
    pub kind: IntervalType,
    pub value: u32,
}

impl Default for Interval {
    fn default() -> Self {
        Self {
            kind: IntervalType::PerYear,
            value: 1,
        }
    }
}

/// Frequency/quantity cap on a benefit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limit {
    pub quantity: u32,
    pub unit: UnitType,
    pub interval: Interval,
}

impl Default for Limit {
    fn default() -> Self {
        Self {
            quantity: 1,
            unit: UnitType::NotApplicable,
            interval: Interval::default(),
        }
    }
}

/// A single limit field write. Numeric values are signed so that invalid
/// input reaches validation instead of failing to parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitFieldValue {
    Quantity(i64),
    Unit(UnitType),
    IntervalType(IntervalType),
    IntervalValue(i64),
}

impl LimitFieldValue {
    pub fn field_name(&self) -> &'static str {
        match self {
            LimitFieldValue::Quantity(_) => "quantity",
            LimitFieldValue::Unit(_) => "unit",
            LimitFieldValue::IntervalType(_) => "intervalType",
            LimitFieldValue::IntervalValue(_) => "intervalValue",
        }
    }
}

/// An edit issued against the working state, the possible inputs of the engine.
#[derive(Debug, Clone, PartialEq)]
pub enum Edit {
    /// Move a benefit to the end of another class.
    MoveBenefit {
        benefit: BenefitId,
        from: ClassId,
        to: ClassId,
    },
    /// Reinsert a benefit immediately before another one in the same class,
    /// or at the end when `before` is absent.
    ReorderWithinClass {
        class: ClassId,
        benefit: BenefitId,
        before: Option<BenefitId>,
    },
    /// Change the type of a cost-share cell, clearing its values.
    SetCostShareType {
        key: CostShareKey,
        cost_share_type: CostShareType,
    },
    SetCostShareValue {
        key: CostShareKey,
        field: ValueField,
        value: Amount,
    },
    /// Write one limit field. The class is carried for symmetry only.
    SetLimitField {
        class: ClassId,
        benefit: BenefitId,
        value: LimitFieldValue,
    },
    /// Assign an unassigned catalog benefit to a class.
    AddBenefit { class: ClassId, benefit: BenefitId },
    RemoveBenefit { class: ClassId, benefit: BenefitId },
    AddClass { class: ClassId, name: String },
    RenameClass { class: ClassId, name: String },
    RemoveClass { class: ClassId },
}

impl Edit {
    /// Short name used in logs and edit scripts.
    pub fn name(&self) -> &'static str {
        match self {
            Edit::MoveBenefit { .. } => "move",
            Edit::ReorderWithinClass { .. } => "reorder",
            Edit::SetCostShareType { .. } => "cost_share_type",
            Edit::SetCostShareValue { field, .. } => match field {
                ValueField::CopayAmount => "copay",
                ValueField::CoinsurancePercentage => "coinsurance",
            },
            Edit::SetLimitField { value, .. } => match value {
                LimitFieldValue::Quantity(_) => "quantity",
                LimitFieldValue::Unit(_) => "unit",
                LimitFieldValue::IntervalType(_) => "interval_type",
                LimitFieldValue::IntervalValue(_) => "interval_value",
            },
            Edit::AddBenefit { .. } => "add_benefit",
            Edit::RemoveBenefit { .. } => "remove_benefit",
            Edit::AddClass { .. } => "add_class",
            Edit::RenameClass { .. } => "rename_class",
            Edit::RemoveClass { .. } => "remove_class",
        }
    }

    /// The class the edit is addressed to.
    pub fn class(&self) -> &str {
        match self {
            Edit::MoveBenefit { from, .. } => from,
            Edit::SetCostShareType { key, .. } | Edit::SetCostShareValue { key, .. } => &key.class,
            Edit::ReorderWithinClass { class, .. }
            | Edit::SetLimitField { class, .. }
            | Edit::AddBenefit { class, .. }
            | Edit::RemoveBenefit { class, .. }
            | Edit::AddClass { class, .. }
            | Edit::RenameClass { class, .. }
            | Edit::RemoveClass { class } => class,
        }
    }

    /// The benefit the edit is addressed to, if any.
    pub fn benefit(&self) -> Option<&str> {
        match self {
            Edit::MoveBenefit { benefit, .. }
            | Edit::ReorderWithinClass { benefit, .. }
            | Edit::SetLimitField { benefit, .. }
            | Edit::AddBenefit { benefit, .. }
            | Edit::RemoveBenefit { benefit, .. } => Some(benefit.as_str()),
            Edit::SetCostShareType { key, .. } | Edit::SetCostShareValue { key, .. } => {
                key.benefit.as_deref()
            }
            Edit::AddClass { .. } | Edit::RenameClass { .. } | Edit::RemoveClass { .. } => None,
        }
    }
}
