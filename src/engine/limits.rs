use std::collections::HashMap;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::document::{LimitDocument, LimitStructureDocument};
use crate::model::{BenefitId, Limit, LimitFieldValue};
use crate::validation::{ValidationError, validate_interval_value, validate_quantity};

use super::classes::ClassTree;

#[derive(Debug, Clone, PartialEq)]
struct LimitEntry {
    /// Row id in the limit structure document.
    id: String,
    limit: Limit,
}

/// Limits keyed by benefit id, independent of class membership.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LimitBook {
    entries: HashMap<BenefitId, LimitEntry>,
}

impl LimitBook {
    /// Load the rows of a limit structure. When a benefit has several rows
    /// (one per class in older documents) the last row wins.
    pub fn from_document(doc: &LimitStructureDocument) -> Self {
        let mut book = LimitBook::default();
        for row in &doc.limits {
            let entry = LimitEntry {
                id: row.id.clone().unwrap_or_else(|| Uuid::now_v7().to_string()),
                limit: Limit {
                    quantity: row.quantity,
                    unit: row.unit,
                    interval: row.interval,
                },
            };
            if book.entries.insert(row.benefit_id.clone(), entry).is_some() {
                warn!(
                    benefit = %row.benefit_id,
                    class = %row.class_id,
                    "benefit has more than one limit row, keeping the last one"
                );
            }
        }
        book
    }

    /// Rows for every limited benefit currently assigned to a class, in tree
    /// order, stamped with the class that holds the benefit now.
    pub fn to_documents(&self, tree: &ClassTree) -> Vec<LimitDocument> {
        let mut rows = Vec::with_capacity(self.entries.len());
        for class in tree.list_classes() {
            for benefit in class.benefits() {
                if let Some(entry) = self.entries.get(&benefit.id) {
                    rows.push(LimitDocument {
                        id: Some(entry.id.clone()),
                        class_id: class.id.clone(),
                        class_name: class.name.clone(),
                        benefit_id: benefit.id.clone(),
                        benefit_name: benefit.name.clone(),
                        quantity: entry.limit.quantity,
                        unit: entry.limit.unit,
                        interval: entry.limit.interval,
                    });
                }
            }
        }
        if rows.len() < self.entries.len() {
            debug!(
                orphaned = self.entries.len() - rows.len(),
                "limits of unassigned benefits left out of the document"
            );
        }
        rows
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn resolve(&self, benefit: &str) -> Option<&Limit> {
        self.entries.get(benefit).map(|entry| &entry.limit)
    }

    /// Write one field, creating the limit with defaults on first write.
    /// Invalid values are rejected before anything changes.
    pub(crate) fn set_field(
        &mut self,
        benefit: &str,
        value: LimitFieldValue,
    ) -> Result<(), ValidationError> {
        let mut limit = self.resolve(benefit).copied().unwrap_or_default();
        match value {
            LimitFieldValue::Quantity(q) => limit.quantity = validate_quantity(q)?,
            LimitFieldValue::Unit(unit) => limit.unit = unit,
            LimitFieldValue::IntervalType(kind) => limit.interval.kind = kind,
            LimitFieldValue::IntervalValue(v) => limit.interval.value = validate_interval_value(v)?,
        }

        self.entries
            .entry(benefit.to_string())
            .or_insert_with(|| LimitEntry {
                id: Uuid::now_v7().to_string(),
                limit,
            })
            .limit = limit;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::fixtures::{class_structure, limit_structure};
    use crate::model::{Interval, IntervalType, UnitType};

    #[test]
    fn first_write_creates_with_defaults() {
        let mut book = LimitBook::default();
        book.set_field("b1", LimitFieldValue::Unit(UnitType::PerTooth))
            .unwrap();
        let limit = book.resolve("b1").unwrap();
        assert_eq!(limit.quantity, 1);
        assert_eq!(limit.unit, UnitType::PerTooth);
        assert_eq!(limit.interval, Interval::default());
    }

    #[test]
    fn invalid_quantity_keeps_prior_value() {
        let mut book = LimitBook::default();
        book.set_field("b1", LimitFieldValue::Quantity(3)).unwrap();

        for bad in [0, -1] {
            let result = book.set_field("b1", LimitFieldValue::Quantity(bad));
            assert_eq!(result, Err(ValidationError::InvalidQuantity(bad)));
        }
        assert_eq!(book.resolve("b1").unwrap().quantity, 3);
    }

    #[test]
    fn invalid_first_write_creates_nothing() {
        let mut book = LimitBook::default();
        assert!(book.set_field("b1", LimitFieldValue::Quantity(0)).is_err());
        assert!(book.set_field("b1", LimitFieldValue::IntervalValue(-2)).is_err());
        assert!(book.resolve("b1").is_none());
    }

    #[test]
    fn interval_fields_update_independently() {
        let mut book = LimitBook::default();
        book.set_field("b1", LimitFieldValue::IntervalType(IntervalType::PerLifetime))
            .unwrap();
        book.set_field("b1", LimitFieldValue::IntervalValue(5)).unwrap();
        let interval = book.resolve("b1").unwrap().interval;
        assert_eq!(interval.kind, IntervalType::PerLifetime);
        assert_eq!(interval.value, 5);
    }

    #[test]
    fn duplicate_rows_keep_last() {
        let mut doc = limit_structure();
        let mut second = doc.limits[0].clone();
        second.class_id = "c2".into();
        second.quantity = 4;
        doc.limits.push(second);
        let book = LimitBook::from_document(&doc);
        assert_eq!(book.len(), 1);
        assert_eq!(book.resolve("b2").unwrap().quantity, 4);
    }

    #[test]
    fn documents_follow_current_class_and_skip_orphans() {
        let mut tree = ClassTree::from_document(&class_structure());
        let mut book = LimitBook::from_document(&limit_structure());
        book.set_field("b9", LimitFieldValue::Quantity(2)).unwrap();

        tree.move_benefit("b2", "c1", "c2").unwrap();
        let rows = book.to_documents(&tree);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].benefit_id, "b2");
        assert_eq!(rows[0].class_id, "c2");
        assert_eq!(rows[0].class_name, "Class 2");
        assert_eq!(rows[0].id.as_deref(), Some("l-1"));
    }
}
