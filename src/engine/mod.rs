//! Plan configuration engine.
//!
//! The engine holds the working state of one configuration session: the
//! class -> benefit tree, the cost-share records and the limits. It applies
//! edits one at a time, keeps cost shares and limits consistent when benefits
//! change class, and exports the state back into document form.
//! Also supports async stream of edits.

use tokio_stream::{Stream, StreamExt};
use tracing::{debug, info, warn};

use crate::Amount;
use crate::config::EngineConfig;
use crate::document::{Bundle, Catalog, LimitStructureDocument};
use crate::model::{
    BenefitRef, CostShare, CostShareKey, CostShareType, CoverageType, Edit, Limit,
    LimitFieldValue, TierIndex, ValueField,
};
use crate::validation::validate_tier;

mod classes;
pub use classes::{Class, ClassTree};

mod cost_share;
pub use cost_share::{CostShareBook, Resolution};

mod limits;
pub use limits::LimitBook;

mod error;
pub use error::{EngineError, StaleReference};

/// The working state of a configuration session.
#[derive(Debug, Clone)]
pub struct Engine {
    config: EngineConfig,
    catalog: Catalog,
    network_tiers: u8,
    classes: ClassTree,
    cost_shares: CostShareBook,
    limits: LimitBook,
}

/// One resolved cell of the cost-share grid.
#[derive(Debug, Clone, PartialEq)]
pub struct GridCell<'a> {
    pub class: &'a Class,
    pub benefit: &'a BenefitRef,
    pub tier: TierIndex,
    pub coverage: CoverageType,
    pub resolution: Resolution<'a>,
}

/// Public API
impl Engine {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            catalog: Catalog::default(),
            network_tiers: config.network_tiers,
            classes: ClassTree::default(),
            cost_shares: CostShareBook::default(),
            limits: LimitBook::default(),
        }
    }

    /// Build the working state from stored documents.
    pub fn load(bundle: &Bundle, config: EngineConfig) -> Self {
        let classes = ClassTree::from_document(&bundle.class_structure);
        let limits = bundle
            .limit_structure
            .as_ref()
            .map(LimitBook::from_document)
            .unwrap_or_default();
        let (cost_shares, network_tiers) = match &bundle.plan {
            Some(plan) => (
                CostShareBook::from_documents(&plan.cost_shares),
                u8::try_from(plan.network_tiers.len())
                    .unwrap_or(u8::MAX)
                    .max(1),
            ),
            None => (CostShareBook::default(), config.network_tiers),
        };

        info!(
            structure = %bundle.class_structure.name,
            classes = classes.list_classes().len(),
            cost_shares = cost_shares.len(),
            limits = limits.len(),
            "working state loaded"
        );

        Self {
            config,
            catalog: bundle.catalog.clone(),
            network_tiers,
            classes,
            cost_shares,
            limits,
        }
    }

    /// Write the working state into a copy of `base`.
    ///
    /// A limit structure is created from the class structure header when the
    /// base has none and limits exist.
    pub fn export(&self, base: &Bundle) -> Bundle {
        let mut bundle = base.clone();

        let structure = &mut bundle.class_structure;
        structure.classes = self.classes.to_documents();
        structure.number_of_classes = structure.classes.len();

        match bundle.limit_structure.as_mut() {
            Some(limits) => limits.limits = self.limits.to_documents(&self.classes),
            None if !self.limits.is_empty() => {
                let structure = &bundle.class_structure;
                bundle.limit_structure = Some(LimitStructureDocument {
                    id: None,
                    name: format!("{} Limits", structure.name),
                    effective_date: structure.effective_date.clone(),
                    market_segment: structure.market_segment,
                    product_type: structure.product_type,
                    benefit_class_structure_id: structure.id.clone().unwrap_or_default(),
                    benefit_class_structure_name: structure.name.clone(),
                    limits: self.limits.to_documents(&self.classes),
                    audit: Default::default(),
                });
            }
            None => {}
        }

        match bundle.plan.as_mut() {
            Some(plan) => plan.cost_shares = self.cost_shares.to_documents(),
            None if !self.cost_shares.is_empty() => {
                warn!(
                    records = self.cost_shares.len(),
                    "no plan in bundle, cost shares are not exported"
                );
            }
            None => {}
        }

        bundle
    }

    /// Run the engine with the given edit stream
    pub async fn run(&mut self, mut stream: impl Stream<Item = Edit> + Unpin) {
        while let Some(edit) = stream.next().await {
            // a rejected edit never stops the session
            let _ = self.apply(edit);
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn network_tiers(&self) -> u8 {
        self.network_tiers
    }

    pub fn classes(&self) -> &ClassTree {
        &self.classes
    }

    pub fn cost_shares(&self) -> &CostShareBook {
        &self.cost_shares
    }

    pub fn limits(&self) -> &LimitBook {
        &self.limits
    }

    pub fn list_classes(&self) -> &[Class] {
        self.classes.list_classes()
    }

    pub fn benefits_in_class(&self, class: &str) -> &[BenefitRef] {
        self.classes.benefits_in_class(class)
    }

    pub fn all_unique_benefits(&self) -> Vec<&BenefitRef> {
        self.classes.all_unique_benefits()
    }

    pub fn available_to_add(&self, class: &str) -> Vec<&BenefitRef> {
        self.classes.available_to_add(class, &self.catalog)
    }

    pub fn resolve_cost_share(
        &self,
        class: &str,
        benefit: &str,
        tier: TierIndex,
        coverage: CoverageType,
    ) -> Resolution<'_> {
        self.cost_shares.resolve(class, benefit, tier, coverage)
    }

    pub fn resolve_limit(&self, benefit: &str) -> Option<&Limit> {
        self.limits.resolve(benefit)
    }

    /// Every (class, benefit, tier, coverage) cell in tree order.
    pub fn grid(&self) -> impl Iterator<Item = GridCell<'_>> + '_ {
        self.classes.list_classes().iter().flat_map(move |class| {
            class.benefits().iter().flat_map(move |benefit| {
                (0..self.network_tiers).flat_map(move |tier| {
                    CoverageType::ALL.iter().map(move |&coverage| GridCell {
                        class,
                        benefit,
                        tier,
                        coverage,
                        resolution: self.cost_shares.resolve(&class.id, &benefit.id, tier, coverage),
                    })
                })
            })
        })
    }

    pub fn move_benefit(&mut self, benefit: &str, from: &str, to: &str) -> Result<(), EngineError> {
        self.apply(Edit::MoveBenefit {
            benefit: benefit.into(),
            from: from.into(),
            to: to.into(),
        })
    }

    pub fn reorder_within_class(
        &mut self,
        class: &str,
        benefit: &str,
        before: Option<&str>,
    ) -> Result<(), EngineError> {
        self.apply(Edit::ReorderWithinClass {
            class: class.into(),
            benefit: benefit.into(),
            before: before.map(Into::into),
        })
    }

    /// `benefit = None` addresses the class-level default.
    pub fn set_cost_share_type(
        &mut self,
        class: &str,
        benefit: Option<&str>,
        tier: TierIndex,
        coverage: CoverageType,
        cost_share_type: CostShareType,
    ) -> Result<(), EngineError> {
        self.apply(Edit::SetCostShareType {
            key: Self::key(class, benefit, tier, coverage),
            cost_share_type,
        })
    }

    pub fn set_cost_share_value(
        &mut self,
        class: &str,
        benefit: Option<&str>,
        tier: TierIndex,
        coverage: CoverageType,
        field: ValueField,
        value: Amount,
    ) -> Result<(), EngineError> {
        self.apply(Edit::SetCostShareValue {
            key: Self::key(class, benefit, tier, coverage),
            field,
            value,
        })
    }

    /// `class` is accepted for symmetry with cost shares; limits are keyed by benefit.
    pub fn set_limit_field(
        &mut self,
        class: &str,
        benefit: &str,
        value: LimitFieldValue,
    ) -> Result<(), EngineError> {
        self.apply(Edit::SetLimitField {
            class: class.into(),
            benefit: benefit.into(),
            value,
        })
    }

    /// Apply a single edit on top of the current working state
    pub fn apply(&mut self, edit: Edit) -> Result<(), EngineError> {
        let result = match &edit {
            Edit::MoveBenefit { benefit, from, to } => self.apply_move(benefit, from, to),
            Edit::ReorderWithinClass {
                class,
                benefit,
                before,
            } => self.apply_reorder(class, benefit, before.as_deref()),
            Edit::SetCostShareType {
                key,
                cost_share_type,
            } => self.apply_cost_share_type(key, *cost_share_type),
            Edit::SetCostShareValue { key, field, value } => {
                self.apply_cost_share_value(key, *field, *value)
            }
            Edit::SetLimitField { benefit, value, .. } => self.apply_limit_field(benefit, *value),
            Edit::AddBenefit { class, benefit } => self.apply_add_benefit(class, benefit),
            Edit::RemoveBenefit { class, benefit } => self.apply_remove_benefit(class, benefit),
            Edit::AddClass { class, name } => self.classes.add_class(class, name).map_err(Into::into),
            Edit::RenameClass { class, name } => self.classes.rename_class(class, name),
            Edit::RemoveClass { class } => self.apply_remove_class(class),
        };
        Self::log_result(&edit, &result);
        result
    }
}

/// Private API
impl Engine {
    fn key(class: &str, benefit: Option<&str>, tier: TierIndex, coverage: CoverageType) -> CostShareKey {
        CostShareKey {
            class: class.into(),
            benefit: benefit.map(Into::into),
            tier,
            coverage,
        }
    }

    /// Small helper to log `apply` results
    fn log_result(edit: &Edit, result: &Result<(), EngineError>) {
        let benefit = edit.benefit().unwrap_or("-");
        match result {
            Ok(()) => {
                info!(class = %edit.class(), benefit, "{} applied", edit.name());
            }
            Err(e) if e.is_user_facing() => {
                info!(class = %edit.class(), benefit, reason = %e, "{} rejected", edit.name());
            }
            Err(e) => {
                info!(class = %edit.class(), benefit, reason = %e, "{} skipped", edit.name());
            }
        }
    }

    /// Apply `Edit::MoveBenefit`:
    /// - Ensure both classes exist and differ, and the benefit is in `from`
    /// - Append the benefit to `to`
    /// - Re-key the benefit's cost shares per the configured move policy
    /// - Limits are untouched, they follow the benefit
    fn apply_move(&mut self, benefit: &str, from: &str, to: &str) -> Result<(), EngineError> {
        self.classes.move_benefit(benefit, from, to)?;
        let moved = self
            .cost_shares
            .rekey_benefit(benefit, from, to, self.config.move_policy);
        debug!(benefit, from, to, cost_shares = moved, "benefit moved");
        Ok(())
    }

    fn apply_reorder(
        &mut self,
        class: &str,
        benefit: &str,
        before: Option<&str>,
    ) -> Result<(), EngineError> {
        if !self.classes.reorder(class, benefit, before)? {
            debug!(class, benefit, "order unchanged");
        }
        Ok(())
    }

    /// Apply `Edit::SetCostShareType`:
    /// - Ensure the tier exists and the class (and benefit, if any) is current
    /// - Create or reset the record with empty values
    fn apply_cost_share_type(
        &mut self,
        key: &CostShareKey,
        cost_share_type: CostShareType,
    ) -> Result<(), EngineError> {
        self.check_cell(key)?;
        self.cost_shares.set_type(key.clone(), cost_share_type);
        Ok(())
    }

    fn apply_cost_share_value(
        &mut self,
        key: &CostShareKey,
        field: ValueField,
        value: Amount,
    ) -> Result<(), EngineError> {
        self.check_cell(key)?;
        self.cost_shares.set_value(key, field, value)
    }

    /// Apply `Edit::SetLimitField`: the benefit must be assigned to some
    /// class, which class does not matter.
    fn apply_limit_field(&mut self, benefit: &str, value: LimitFieldValue) -> Result<(), EngineError> {
        if !self.classes.contains_benefit(benefit) {
            return Err(StaleReference::BenefitUnassigned(benefit.to_string()).into());
        }
        self.limits.set_field(benefit, value)?;
        Ok(())
    }

    fn apply_add_benefit(&mut self, class: &str, benefit: &str) -> Result<(), EngineError> {
        let benefit = self
            .catalog
            .benefit(benefit)
            .cloned()
            .ok_or_else(|| StaleReference::NotInCatalog(benefit.to_string()))?;
        self.classes.add_benefit(class, benefit)
    }

    /// Apply `Edit::RemoveBenefit`: the benefit's own cost shares in that class
    /// go with it, its limit stays in memory.
    fn apply_remove_benefit(&mut self, class: &str, benefit: &str) -> Result<(), EngineError> {
        self.classes.remove_benefit(class, benefit)?;
        let dropped = self.cost_shares.remove_benefit(class, benefit);
        debug!(class, benefit, cost_shares = dropped, "benefit removed");
        Ok(())
    }

    fn apply_remove_class(&mut self, class: &str) -> Result<(), EngineError> {
        let removed = self.classes.remove_class(class)?;
        let dropped = self.cost_shares.remove_class(class);
        debug!(
            class,
            unassigned = removed.benefits().len(),
            cost_shares = dropped,
            "class removed"
        );
        Ok(())
    }

    /// A cost-share cell must address a configured tier, a current class and,
    /// for benefit records, a benefit of that class.
    fn check_cell(&self, key: &CostShareKey) -> Result<(), EngineError> {
        validate_tier(key.tier, self.network_tiers)?;
        let class = self
            .classes
            .class(&key.class)
            .ok_or_else(|| StaleReference::ClassNotFound(key.class.clone()))?;
        if let Some(benefit) = &key.benefit {
            if !class.benefits().iter().any(|b| &b.id == benefit) {
                return Err(StaleReference::BenefitNotInClass {
                    class: key.class.clone(),
                    benefit: benefit.clone(),
                }
                .into());
            }
        }
        Ok(())
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

/// Effective cost share of a grid cell, if configured.
impl GridCell<'_> {
    pub fn cost_share(&self) -> Option<&CostShare> {
        self.resolution.cost_share()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MovePolicy;
    use crate::document::fixtures::{bundle, class_structure};
    use crate::model::{IntervalType, UnitType};
    use crate::validation::ValidationError;
    use std::collections::HashSet;
    use CoverageType::Adult;

    // test utils

    fn engine() -> Engine {
        Engine::load(&bundle(), EngineConfig::default())
    }

    /// Two classes ("Class 1" holding b1, "Class 2" empty) and two tiers.
    fn scenario_engine(policy: MovePolicy) -> Engine {
        let mut bundle = bundle();
        bundle.class_structure.classes[0].benefits.truncate(1);
        bundle.class_structure.classes[1].benefits.clear();
        bundle.limit_structure = None;
        Engine::load(
            &bundle,
            EngineConfig {
                move_policy: policy,
                ..EngineConfig::default()
            },
        )
    }

    fn ids(engine: &Engine, class: &str) -> Vec<String> {
        engine
            .benefits_in_class(class)
            .iter()
            .map(|b| b.id.clone())
            .collect()
    }

    fn copay(amount: i64) -> CostShare {
        let mut cs = CostShare::new(CostShareType::Copay);
        cs.values.copay_amount = Some(Amount::whole(amount));
        cs
    }

    fn assert_unique(engine: &Engine) {
        let mut seen = HashSet::new();
        for id in engine.classes().benefit_ids() {
            assert!(seen.insert(id.clone()), "benefit {id} appears twice");
        }
    }

    #[test]
    fn load_uses_plan_tiers() {
        let engine = engine();
        assert_eq!(engine.network_tiers(), 2);
        assert_eq!(engine.list_classes().len(), 2);
        assert_eq!(engine.resolve_limit("b2").unwrap().quantity, 2);
    }

    #[test]
    fn load_without_plan_uses_configured_tiers() {
        let mut bundle = bundle();
        bundle.plan = None;
        let engine = Engine::load(
            &bundle,
            EngineConfig {
                network_tiers: 3,
                ..EngineConfig::default()
            },
        );
        assert_eq!(engine.network_tiers(), 3);
    }

    // Move

    #[test]
    fn move_benefit_between_classes() {
        let mut engine = scenario_engine(MovePolicy::PreserveOverrides);
        engine.move_benefit("b1", "c1", "c2").unwrap();
        assert!(ids(&engine, "c1").is_empty());
        assert_eq!(ids(&engine, "c2"), ["b1"]);
    }

    #[test]
    fn move_round_trip_restores_membership() {
        let mut engine = engine();
        engine.move_benefit("b1", "c1", "c2").unwrap();
        engine.move_benefit("b1", "c2", "c1").unwrap();
        // membership restored, position is not: moves append
        assert_eq!(ids(&engine, "c1"), ["b2", "b1"]);
        assert_eq!(ids(&engine, "c2"), ["b3"]);
    }

    #[test]
    fn stale_move_is_skipped_without_changes() {
        let mut engine = engine();
        let before = ids(&engine, "c1");
        let result = engine.move_benefit("b3", "c1", "c2");
        assert!(matches!(result, Err(EngineError::Stale(_))));
        assert!(!result.unwrap_err().is_user_facing());
        assert_eq!(ids(&engine, "c1"), before);
        assert!(engine.move_benefit("b1", "c1", "c1").is_err());
    }

    #[test]
    fn benefit_inherits_destination_default() {
        let mut engine = scenario_engine(MovePolicy::PreserveOverrides);
        engine
            .set_cost_share_type("c2", None, 0, Adult, CostShareType::Copay)
            .unwrap();
        engine
            .set_cost_share_value("c2", None, 0, Adult, ValueField::CopayAmount, Amount::whole(10))
            .unwrap();

        engine.move_benefit("b1", "c1", "c2").unwrap();
        assert_eq!(
            engine.resolve_cost_share("c2", "b1", 0, Adult),
            Resolution::ClassDefault(&copay(10))
        );
    }

    #[test]
    fn override_survives_move_under_preserve_policy() {
        let mut engine = scenario_engine(MovePolicy::PreserveOverrides);
        engine
            .set_cost_share_type("c2", None, 0, Adult, CostShareType::Copay)
            .unwrap();
        engine
            .set_cost_share_type("c1", Some("b1"), 0, Adult, CostShareType::Copay)
            .unwrap();
        engine
            .set_cost_share_value("c1", Some("b1"), 0, Adult, ValueField::CopayAmount, Amount::whole(35))
            .unwrap();

        engine.move_benefit("b1", "c1", "c2").unwrap();
        assert_eq!(
            engine.resolve_cost_share("c2", "b1", 0, Adult),
            Resolution::BenefitSpecific(&copay(35))
        );
        assert_eq!(
            engine.resolve_cost_share("c1", "b1", 0, Adult),
            Resolution::Unconfigured
        );
    }

    #[test]
    fn override_replaced_under_adopt_policy() {
        let mut engine = scenario_engine(MovePolicy::AdoptDestinationDefault);
        engine
            .set_cost_share_type("c2", None, 0, Adult, CostShareType::Copay)
            .unwrap();
        engine
            .set_cost_share_value("c2", None, 0, Adult, ValueField::CopayAmount, Amount::whole(10))
            .unwrap();
        engine
            .set_cost_share_type("c1", Some("b1"), 0, Adult, CostShareType::Coinsurance)
            .unwrap();

        engine.move_benefit("b1", "c1", "c2").unwrap();
        assert_eq!(
            engine.resolve_cost_share("c2", "b1", 0, Adult),
            Resolution::BenefitSpecific(&copay(10))
        );
    }

    #[test]
    fn limits_follow_the_benefit() {
        let mut engine = scenario_engine(MovePolicy::PreserveOverrides);
        engine
            .set_limit_field("c1", "b1", LimitFieldValue::Quantity(2))
            .unwrap();
        engine.move_benefit("b1", "c1", "c2").unwrap();
        assert_eq!(engine.resolve_limit("b1").unwrap().quantity, 2);
    }

    #[test]
    fn uniqueness_holds_across_edit_sequences() {
        let mut engine = engine();
        let edits = [
            ("b1", "c1", "c2"),
            ("b3", "c2", "c1"),
            ("b1", "c2", "c1"),
            ("b2", "c1", "c2"),
            ("b9", "c1", "c2"),
        ];
        for (benefit, from, to) in edits {
            let _ = engine.move_benefit(benefit, from, to);
            let _ = engine.reorder_within_class(from, benefit, None);
            assert_unique(&engine);
        }
        let _ = engine.apply(Edit::AddBenefit {
            class: "c1".into(),
            benefit: "b2".into(),
        });
        assert_unique(&engine);
        assert_eq!(engine.all_unique_benefits().len(), 3);
    }

    // Reorder

    #[test]
    fn reorder_within_class() {
        let mut engine = engine();
        engine.reorder_within_class("c1", "b2", Some("b1")).unwrap();
        assert_eq!(ids(&engine, "c1"), ["b2", "b1"]);
        // already immediately before its successor
        engine.reorder_within_class("c1", "b2", Some("b1")).unwrap();
        assert_eq!(ids(&engine, "c1"), ["b2", "b1"]);
    }

    #[test]
    fn reorder_leaves_cost_shares_alone() {
        let mut engine = engine();
        engine
            .set_cost_share_type("c1", Some("b1"), 1, Adult, CostShareType::NotCovered)
            .unwrap();
        let before = engine.cost_shares().clone();
        engine.reorder_within_class("c1", "b1", None).unwrap();
        assert_eq!(engine.cost_shares(), &before);
    }

    // Cost shares

    #[test]
    fn type_change_clears_values() {
        let mut engine = engine();
        engine
            .set_cost_share_type("c1", Some("b1"), 0, Adult, CostShareType::Copay)
            .unwrap();
        engine
            .set_cost_share_value("c1", Some("b1"), 0, Adult, ValueField::CopayAmount, Amount::whole(20))
            .unwrap();
        engine
            .set_cost_share_type("c1", Some("b1"), 0, Adult, CostShareType::Coinsurance)
            .unwrap();

        let resolved = engine.resolve_cost_share("c1", "b1", 0, Adult);
        let cs = resolved.cost_share().unwrap();
        assert_eq!(cs.cost_share_type, CostShareType::Coinsurance);
        assert!(cs.values.is_empty());
    }

    #[test]
    fn cost_share_tier_must_exist() {
        let mut engine = engine();
        let result = engine.set_cost_share_type("c1", Some("b1"), 2, Adult, CostShareType::Copay);
        assert_eq!(
            result,
            Err(EngineError::Validation(ValidationError::TierOutOfRange { tier: 2, tiers: 2 }))
        );
        assert!(engine.cost_shares().is_empty());
    }

    #[test]
    fn cost_share_for_benefit_outside_class_is_stale() {
        let mut engine = engine();
        let result = engine.set_cost_share_type("c2", Some("b1"), 0, Adult, CostShareType::Copay);
        assert!(matches!(
            result,
            Err(EngineError::Stale(StaleReference::BenefitNotInClass { .. }))
        ));
    }

    // Limits

    #[test]
    fn limit_quantity_validation() {
        let mut engine = engine();
        engine
            .set_limit_field("c1", "b1", LimitFieldValue::Quantity(3))
            .unwrap();
        for bad in [0, -1] {
            let err = engine
                .set_limit_field("c1", "b1", LimitFieldValue::Quantity(bad))
                .unwrap_err();
            assert!(err.is_user_facing());
        }
        assert_eq!(engine.resolve_limit("b1").unwrap().quantity, 3);
    }

    #[test]
    fn limit_class_argument_is_ignored() {
        let mut engine = engine();
        engine
            .set_limit_field("c2", "b1", LimitFieldValue::Unit(UnitType::PerTooth))
            .unwrap();
        engine
            .set_limit_field("whatever", "b1", LimitFieldValue::IntervalType(IntervalType::PerVisit))
            .unwrap();
        let limit = engine.resolve_limit("b1").unwrap();
        assert_eq!(limit.unit, UnitType::PerTooth);
        assert_eq!(limit.interval.kind, IntervalType::PerVisit);
    }

    #[test]
    fn limit_for_unassigned_benefit_is_stale() {
        let mut engine = engine();
        let result = engine.set_limit_field("c1", "b4", LimitFieldValue::Quantity(1));
        assert!(matches!(
            result,
            Err(EngineError::Stale(StaleReference::BenefitUnassigned(_)))
        ));
    }

    // Structure edits

    #[test]
    fn add_and_remove_benefits() {
        let mut engine = engine();
        let addable: Vec<_> = engine.available_to_add("c2").iter().map(|b| b.id.clone()).collect();
        assert_eq!(addable, ["b4"]);

        engine
            .apply(Edit::AddBenefit {
                class: "c2".into(),
                benefit: "b4".into(),
            })
            .unwrap();
        assert_eq!(ids(&engine, "c2"), ["b3", "b4"]);
        assert!(engine.available_to_add("c2").is_empty());

        let unknown = engine.apply(Edit::AddBenefit {
            class: "c2".into(),
            benefit: "zz".into(),
        });
        assert!(matches!(
            unknown,
            Err(EngineError::Stale(StaleReference::NotInCatalog(_)))
        ));

        engine
            .set_cost_share_type("c2", Some("b4"), 0, Adult, CostShareType::Copay)
            .unwrap();
        engine
            .apply(Edit::RemoveBenefit {
                class: "c2".into(),
                benefit: "b4".into(),
            })
            .unwrap();
        assert!(engine.cost_shares().is_empty());
    }

    #[test]
    fn remove_class_drops_its_cost_shares() {
        let mut engine = engine();
        engine
            .set_cost_share_type("c1", None, 0, Adult, CostShareType::Copay)
            .unwrap();
        engine
            .apply(Edit::RemoveClass { class: "c1".into() })
            .unwrap();
        assert!(engine.cost_shares().is_empty());
        assert!(!engine.classes().contains_benefit("b1"));
        // limits stay in memory
        assert!(engine.resolve_limit("b2").is_some());
    }

    // Export

    #[test]
    fn export_reflects_working_state() {
        let base = bundle();
        let mut engine = Engine::load(&base, EngineConfig::default());
        engine.move_benefit("b2", "c1", "c2").unwrap();
        engine
            .set_cost_share_type("c2", None, 1, Adult, CostShareType::NotCovered)
            .unwrap();
        engine
            .apply(Edit::AddClass {
                class: "c3".into(),
                name: "Class 3".into(),
            })
            .unwrap();

        let exported = engine.export(&base);
        let structure = &exported.class_structure;
        assert_eq!(structure.number_of_classes, 3);
        assert_eq!(structure.classes[1].benefits.len(), 2);

        let limits = exported.limit_structure.as_ref().unwrap();
        assert_eq!(limits.limits[0].class_id, "c2");

        let plan = exported.plan.as_ref().unwrap();
        assert_eq!(plan.cost_shares.len(), 1);
        assert!(exported.validate().is_ok());

        let reloaded = Engine::load(&exported, EngineConfig::default());
        assert_eq!(reloaded.classes(), engine.classes());
        assert_eq!(reloaded.cost_shares(), engine.cost_shares());
    }

    #[test]
    fn export_creates_limit_structure_when_missing() {
        let base = Bundle {
            class_structure: class_structure(),
            limit_structure: None,
            plan: None,
            catalog: Catalog::default(),
        };
        let mut engine = Engine::load(&base, EngineConfig::default());
        engine
            .set_limit_field("c1", "b1", LimitFieldValue::Quantity(2))
            .unwrap();
        let exported = engine.export(&base);
        let limits = exported.limit_structure.unwrap();
        assert_eq!(limits.benefit_class_structure_id, "cs-1");
        assert_eq!(limits.limits.len(), 1);
        assert_eq!(limits.effective_date, "2025-01-01");
    }

    #[test]
    fn grid_covers_every_cell() {
        let mut engine = engine();
        engine
            .set_cost_share_type("c1", None, 0, Adult, CostShareType::Copay)
            .unwrap();
        let cells: Vec<_> = engine.grid().collect();
        // 3 benefits x 2 tiers x 2 coverages
        assert_eq!(cells.len(), 12);
        let configured: Vec<_> = cells.iter().filter(|c| c.cost_share().is_some()).collect();
        assert_eq!(configured.len(), 2);
        assert!(configured.iter().all(|c| c.resolution.source() == "class"));
    }

    // Async run()

    #[tokio::test]
    async fn run_applies_all_edits() {
        let mut engine = engine();
        let edits = vec![
            Edit::MoveBenefit {
                benefit: "b1".into(),
                from: "c1".into(),
                to: "c2".into(),
            },
            Edit::ReorderWithinClass {
                class: "c2".into(),
                benefit: "b1".into(),
                before: Some("b3".into()),
            },
        ];
        engine.run(tokio_stream::iter(edits)).await;
        assert_eq!(ids(&engine, "c2"), ["b1", "b3"]);
    }

    #[tokio::test]
    async fn run_skips_failed_edits_and_continues() {
        let mut engine = engine();
        let edits = vec![
            Edit::SetLimitField {
                class: "c1".into(),
                benefit: "b1".into(),
                value: LimitFieldValue::Quantity(0), // rejected
            },
            Edit::MoveBenefit {
                benefit: "b9".into(), // stale
                from: "c1".into(),
                to: "c2".into(),
            },
            Edit::SetLimitField {
                class: "c1".into(),
                benefit: "b1".into(),
                value: LimitFieldValue::Quantity(4),
            },
        ];
        engine.run(tokio_stream::iter(edits)).await;
        assert_eq!(engine.resolve_limit("b1").unwrap().quantity, 4);
    }
}
