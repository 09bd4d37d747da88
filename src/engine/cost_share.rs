use std::collections::BTreeMap;
use tracing::{debug, warn};

use crate::Amount;
use crate::config::MovePolicy;
use crate::document::CostShareDocument;
use crate::model::{CostShare, CostShareKey, CostShareType, CoverageType, TierIndex, ValueField};
use crate::validation::validate_cost_share_value;

use super::error::{EngineError, StaleReference};

/// Outcome of a cost-share lookup, in precedence order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution<'a> {
    /// A record for this exact benefit exists.
    BenefitSpecific(&'a CostShare),
    /// Inherited from the class-level record for the same tier and coverage.
    ClassDefault(&'a CostShare),
    Unconfigured,
}

impl<'a> Resolution<'a> {
    pub fn cost_share(&self) -> Option<&'a CostShare> {
        match *self {
            Resolution::BenefitSpecific(cs) | Resolution::ClassDefault(cs) => Some(cs),
            Resolution::Unconfigured => None,
        }
    }

    pub fn source(&self) -> &'static str {
        match self {
            Resolution::BenefitSpecific(_) => "benefit",
            Resolution::ClassDefault(_) => "class",
            Resolution::Unconfigured => "none",
        }
    }
}

/// Cost-share records keyed by (class, benefit or class default, tier, coverage).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CostShareBook {
    records: BTreeMap<CostShareKey, CostShare>,
}

impl CostShareBook {
    pub fn from_documents(rows: &[CostShareDocument]) -> Self {
        let mut book = CostShareBook::default();
        for row in rows {
            let key = CostShareKey {
                class: row.class_id.clone(),
                benefit: row.benefit_id.clone(),
                tier: row.network_tier,
                coverage: row.coverage_type,
            };
            if book.records.insert(key, row.cost_share).is_some() {
                warn!(
                    class = %row.class_id,
                    benefit = row.benefit_id.as_deref().unwrap_or("-"),
                    tier = row.network_tier,
                    coverage = %row.coverage_type,
                    "duplicate cost share row, keeping the last one"
                );
            }
        }
        book
    }

    pub fn to_documents(&self) -> Vec<CostShareDocument> {
        self.records
            .iter()
            .map(|(key, cost_share)| CostShareDocument {
                class_id: key.class.clone(),
                benefit_id: key.benefit.clone(),
                network_tier: key.tier,
                coverage_type: key.coverage,
                cost_share: *cost_share,
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Exact-key lookup, no fallback.
    pub fn get(&self, key: &CostShareKey) -> Option<&CostShare> {
        self.records.get(key)
    }

    /// Effective cost share: benefit record, then class default, then unconfigured.
    pub fn resolve(
        &self,
        class: &str,
        benefit: &str,
        tier: TierIndex,
        coverage: CoverageType,
    ) -> Resolution<'_> {
        let key = CostShareKey::benefit(class, benefit, tier, coverage);
        if let Some(cs) = self.records.get(&key) {
            return Resolution::BenefitSpecific(cs);
        }
        match self.records.get(&key.to_class_default()) {
            Some(cs) => Resolution::ClassDefault(cs),
            None => Resolution::Unconfigured,
        }
    }

    /// Set the type of a cell, creating the record if needed. Values are cleared.
    pub(crate) fn set_type(&mut self, key: CostShareKey, cost_share_type: CostShareType) {
        self.records.insert(key, CostShare::new(cost_share_type));
    }

    /// Update one value on an existing record, leaving other values untouched.
    pub(crate) fn set_value(
        &mut self,
        key: &CostShareKey,
        field: ValueField,
        value: Amount,
    ) -> Result<(), EngineError> {
        let record = self
            .records
            .get_mut(key)
            .ok_or_else(|| StaleReference::CostShareNotFound(key.clone()))?;
        validate_cost_share_value(record.cost_share_type, field, value)?;
        record.values.set(field, value);
        Ok(())
    }

    /// Re-key every record of `benefit` from one class to another.
    ///
    /// Returns how many records moved.
    pub(crate) fn rekey_benefit(
        &mut self,
        benefit: &str,
        from: &str,
        to: &str,
        policy: MovePolicy,
    ) -> usize {
        let keys: Vec<CostShareKey> = self
            .records
            .keys()
            .filter(|k| k.class == from && k.benefit.as_deref() == Some(benefit))
            .cloned()
            .collect();

        for key in &keys {
            let Some(mut record) = self.records.remove(key) else {
                continue;
            };
            let target = CostShareKey::benefit(to, benefit, key.tier, key.coverage);

            if policy == MovePolicy::AdoptDestinationDefault {
                if let Some(default) = self.records.get(&target.to_class_default()) {
                    debug!(
                        benefit,
                        class = to,
                        tier = key.tier,
                        coverage = %key.coverage,
                        "benefit override replaced by destination class default"
                    );
                    record = *default;
                }
            }

            if self.records.insert(target, record).is_some() {
                warn!(benefit, class = to, "overwrote stale cost share record on move");
            }
        }
        keys.len()
    }

    /// Drop the benefit-specific records of a benefit in a class.
    pub(crate) fn remove_benefit(&mut self, class: &str, benefit: &str) -> usize {
        let before = self.records.len();
        self.records
            .retain(|k, _| !(k.class == class && k.benefit.as_deref() == Some(benefit)));
        before - self.records.len()
    }

    /// Drop every record of a class, defaults included.
    pub(crate) fn remove_class(&mut self, class: &str) -> usize {
        let before = self.records.len();
        self.records.retain(|k, _| k.class != class);
        before - self.records.len()
    }
}
