//! Persisted document shapes exchanged with the document store.
//!
//! Field names follow the stored JSON (camelCase, Mongo-style `_id`).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{
    BenefitId, BenefitRef, ClassId, CostShare, CoverageType, Interval, MarketSegment, ProductType,
    TierIndex, UnitType, ValueField,
};
use crate::store::Document;
use crate::validation::{
    ValidationError, validate_benefit_uniqueness, validate_class_ids, validate_class_names,
    validate_cost_share_value, validate_effective_date, validate_interval_value,
    validate_quantity, validate_required, validate_tier,
};

/// Audit fields assigned by the store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Audit {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_modified_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_modified_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassDocument {
    pub id: ClassId,
    pub name: String,
    #[serde(default)]
    pub benefits: Vec<BenefitRef>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassStructureDocument {
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    pub effective_date: String,
    pub market_segment: MarketSegment,
    pub product_type: ProductType,
    pub number_of_classes: usize,
    #[serde(default)]
    pub classes: Vec<ClassDocument>,
    #[serde(flatten)]
    pub audit: Audit,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LimitDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub class_id: ClassId,
    pub class_name: String,
    pub benefit_id: BenefitId,
    pub benefit_name: String,
    pub quantity: u32,
    pub unit: UnitType,
    pub interval: Interval,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LimitStructureDocument {
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    pub effective_date: String,
    pub market_segment: MarketSegment,
    pub product_type: ProductType,
    pub benefit_class_structure_id: String,
    pub benefit_class_structure_name: String,
    #[serde(default)]
    pub limits: Vec<LimitDocument>,
    #[serde(flatten)]
    pub audit: Audit,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkTier {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CostShareDocument {
    pub class_id: ClassId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub benefit_id: Option<BenefitId>,
    pub network_tier: TierIndex,
    pub coverage_type: CoverageType,
    #[serde(flatten)]
    pub cost_share: CostShare,
}

/// A dental plan: a class structure, an optional limit structure, the
/// network tiers offered and the cost-share grid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DentalPlanDocument {
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    pub effective_date: String,
    pub market_segment: MarketSegment,
    pub product_type: ProductType,
    pub benefit_class_structure_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit_structure_id: Option<String>,
    #[serde(default)]
    pub network_tiers: Vec<NetworkTier>,
    #[serde(default)]
    pub cost_shares: Vec<CostShareDocument>,
    #[serde(flatten)]
    pub audit: Audit,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogClass {
    pub id: String,
    pub name: String,
}

/// Read-only universe of benefits and benefit classes available for assignment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Catalog {
    #[serde(default)]
    pub benefit_classes: Vec<CatalogClass>,
    #[serde(default)]
    pub benefits: Vec<BenefitRef>,
}

impl Catalog {
    pub fn benefit(&self, id: &str) -> Option<&BenefitRef> {
        self.benefits.iter().find(|b| b.id == id)
    }
}

/// Everything a configuration session loads and saves together.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bundle {
    pub class_structure: ClassStructureDocument,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit_structure: Option<LimitStructureDocument>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan: Option<DentalPlanDocument>,
    #[serde(default)]
    pub catalog: Catalog,
}

impl Bundle {
    /// Run the document-level checks on every document in the bundle,
    /// including cross-document compatibility.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.class_structure.validate()?;
        if let Some(limits) = &self.limit_structure {
            limits.validate()?;
            if !compatible(&self.class_structure, limits) {
                return Err(ValidationError::Incompatible("limit structure"));
            }
        }
        if let Some(plan) = &self.plan {
            plan.validate()?;
            if !compatible(&self.class_structure, plan) {
                return Err(ValidationError::Incompatible("plan"));
            }
        }
        Ok(())
    }
}

/// The fields structures are matched on.
pub trait Versioned {
    fn effective_date(&self) -> &str;
    fn market_segment(&self) -> MarketSegment;
    fn product_type(&self) -> ProductType;
}

macro_rules! impl_versioned {
    ($($doc:ty),+) => {
        $(impl Versioned for $doc {
            fn effective_date(&self) -> &str {
                &self.effective_date
            }
            fn market_segment(&self) -> MarketSegment {
                self.market_segment
            }
            fn product_type(&self) -> ProductType {
                self.product_type
            }
        })+
    };
}

impl_versioned!(ClassStructureDocument, LimitStructureDocument, DentalPlanDocument);

/// Exact match on effective date, market segment and product type.
pub fn compatible(a: &impl Versioned, b: &impl Versioned) -> bool {
    a.effective_date() == b.effective_date()
        && a.market_segment() == b.market_segment()
        && a.product_type() == b.product_type()
}

/// Limit structures that can be paired with the given class structure.
pub fn compatible_limit_structures<'a>(
    class_structure: &'a ClassStructureDocument,
    candidates: &'a [LimitStructureDocument],
) -> impl Iterator<Item = &'a LimitStructureDocument> + 'a {
    candidates
        .iter()
        .filter(move |candidate| compatible(class_structure, *candidate))
}

impl Document for ClassStructureDocument {
    const COLLECTION: &'static str = "benefitClassStructures";

    fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    fn set_id(&mut self, id: String) {
        self.id = Some(id);
    }

    fn audit_mut(&mut self) -> &mut Audit {
        &mut self.audit
    }

    fn validate(&self) -> Result<(), ValidationError> {
        validate_required("name", &self.name)?;
        validate_effective_date(&self.effective_date)?;
        if self.number_of_classes != self.classes.len() {
            return Err(ValidationError::ClassCountMismatch {
                declared: self.number_of_classes,
                actual: self.classes.len(),
            });
        }
        validate_class_ids(self.classes.iter().map(|c| c.id.as_str()))?;
        validate_class_names(self.classes.iter().map(|c| c.name.as_str()))?;
        validate_benefit_uniqueness(self.classes.iter().flat_map(|class| {
            class
                .benefits
                .iter()
                .map(move |benefit| (class.id.as_str(), benefit.id.as_str()))
        }))
    }
}

impl Document for LimitStructureDocument {
    const COLLECTION: &'static str = "limitStructures";

    fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    fn set_id(&mut self, id: String) {
        self.id = Some(id);
    }

    fn audit_mut(&mut self) -> &mut Audit {
        &mut self.audit
    }

    fn validate(&self) -> Result<(), ValidationError> {
        validate_required("name", &self.name)?;
        validate_effective_date(&self.effective_date)?;
        validate_required("benefit class structure", &self.benefit_class_structure_id)?;
        for limit in &self.limits {
            validate_quantity(i64::from(limit.quantity))?;
            validate_interval_value(i64::from(limit.interval.value))?;
        }
        // Limits are keyed by benefit alone.
        validate_benefit_uniqueness(
            self.limits
                .iter()
                .map(|l| (l.class_id.as_str(), l.benefit_id.as_str())),
        )
    }
}

impl Document for DentalPlanDocument {
    const COLLECTION: &'static str = "dentalPlans";

    fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    fn set_id(&mut self, id: String) {
        self.id = Some(id);
    }

    fn audit_mut(&mut self) -> &mut Audit {
        &mut self.audit
    }

    fn validate(&self) -> Result<(), ValidationError> {
        validate_required("plan name", &self.name)?;
        validate_effective_date(&self.effective_date)?;
        validate_required("benefit class structure", &self.benefit_class_structure_id)?;
        if self.network_tiers.is_empty() {
            return Err(ValidationError::Required("at least one network tier"));
        }
        let tiers = u8::try_from(self.network_tiers.len()).unwrap_or(u8::MAX);
        for tier in &self.network_tiers {
            validate_required("network tier name", &tier.name)?;
        }
        for row in &self.cost_shares {
            validate_tier(row.network_tier, tiers)?;
            let cost_share = row.cost_share;
            for field in ValueField::ALL {
                if let Some(value) = cost_share.values.get(*field) {
                    validate_cost_share_value(cost_share.cost_share_type, *field, value)?;
                }
            }
        }
        Ok(())
    }
}
