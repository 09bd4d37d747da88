use tracing::warn;

use crate::document::{Catalog, ClassDocument, ClassStructureDocument};
use crate::model::{BenefitId, BenefitRef, ClassId};
use crate::validation::{ValidationError, validate_class_name};

use super::error::{EngineError, StaleReference};

/// A benefit class and its ordered benefits.
#[derive(Debug, Clone, PartialEq)]
pub struct Class {
    pub id: ClassId,
    pub name: String,
    benefits: Vec<BenefitRef>,
}

impl Class {
    pub fn new(id: impl Into<ClassId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            benefits: Vec::new(),
        }
    }

    pub fn benefits(&self) -> &[BenefitRef] {
        &self.benefits
    }

    fn position(&self, benefit: &str) -> Option<usize> {
        self.benefits.iter().position(|b| b.id == benefit)
    }
}

/// Ordered class -> benefits tree of one class structure.
///
/// Classes keep insertion order and a benefit id belongs to at most one class.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClassTree {
    classes: Vec<Class>,
}

impl ClassTree {
    pub fn new(classes: Vec<Class>) -> Self {
        Self { classes }
    }

    /// Build the tree from a stored structure. A benefit listed in more than
    /// one class is kept in the first class only.
    pub fn from_document(doc: &ClassStructureDocument) -> Self {
        let mut tree = ClassTree::default();
        for class in &doc.classes {
            let mut loaded = Class::new(class.id.clone(), class.name.clone());
            for benefit in &class.benefits {
                if let Some(owner) = tree.class_of(&benefit.id) {
                    warn!(
                        benefit = %benefit.id,
                        kept_in = %owner.id,
                        dropped_from = %class.id,
                        "benefit listed in more than one class"
                    );
                    continue;
                }
                if loaded.position(&benefit.id).is_some() {
                    continue;
                }
                loaded.benefits.push(benefit.clone());
            }
            tree.classes.push(loaded);
        }
        tree
    }

    pub fn to_documents(&self) -> Vec<ClassDocument> {
        self.classes
            .iter()
            .map(|class| ClassDocument {
                id: class.id.clone(),
                name: class.name.clone(),
                benefits: class.benefits.clone(),
            })
            .collect()
    }

    pub fn list_classes(&self) -> &[Class] {
        &self.classes
    }

    pub fn class(&self, id: &str) -> Option<&Class> {
        self.classes.iter().find(|c| c.id == id)
    }

    /// Benefits of a class in order; empty for an unknown class.
    pub fn benefits_in_class(&self, id: &str) -> &[BenefitRef] {
        self.class(id).map(Class::benefits).unwrap_or(&[])
    }

    /// Every benefit across all classes, deduplicated by id, in tree order.
    pub fn all_unique_benefits(&self) -> Vec<&BenefitRef> {
        let mut seen = std::collections::HashSet::new();
        self.classes
            .iter()
            .flat_map(|c| c.benefits.iter())
            .filter(|b| seen.insert(b.id.as_str()))
            .collect()
    }

    /// The class currently holding the benefit.
    pub fn class_of(&self, benefit: &str) -> Option<&Class> {
        self.classes.iter().find(|c| c.position(benefit).is_some())
    }

    pub fn contains_benefit(&self, benefit: &str) -> bool {
        self.class_of(benefit).is_some()
    }

    /// Catalog benefits that can be added to the class: those assigned to no
    /// class at all. Empty for an unknown class.
    pub fn available_to_add<'a>(&self, class: &str, catalog: &'a Catalog) -> Vec<&'a BenefitRef> {
        if self.class(class).is_none() {
            return Vec::new();
        }
        catalog
            .benefits
            .iter()
            .filter(|b| !self.contains_benefit(&b.id))
            .collect()
    }

    fn class_mut(&mut self, id: &str) -> Result<&mut Class, StaleReference> {
        self.classes
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or_else(|| StaleReference::ClassNotFound(id.to_string()))
    }

    /// Remove the benefit from `from` and append it to `to`.
    pub(crate) fn move_benefit(
        &mut self,
        benefit: &str,
        from: &str,
        to: &str,
    ) -> Result<(), StaleReference> {
        if self.class(to).is_none() {
            return Err(StaleReference::ClassNotFound(to.to_string()));
        }
        if from == to {
            return Err(StaleReference::SameClass(benefit.to_string(), to.to_string()));
        }

        let source = self.class_mut(from)?;
        let index = source
            .position(benefit)
            .ok_or_else(|| StaleReference::BenefitNotInClass {
                class: from.to_string(),
                benefit: benefit.to_string(),
            })?;
        let moved = source.benefits.remove(index);

        self.class_mut(to)?.benefits.push(moved);
        Ok(())
    }

    /// Reinsert `benefit` immediately before `before`, or at the end.
    ///
    /// Returns whether the order changed.
    pub(crate) fn reorder(
        &mut self,
        class: &str,
        benefit: &str,
        before: Option<&str>,
    ) -> Result<bool, StaleReference> {
        let class = self.class_mut(class)?;
        let not_in_class = |id: &str| StaleReference::BenefitNotInClass {
            class: class.id.clone(),
            benefit: id.to_string(),
        };

        let from = class.position(benefit).ok_or_else(|| not_in_class(benefit))?;
        let target = match before {
            Some(before) if before == benefit => return Ok(false),
            Some(before) => class.position(before).ok_or_else(|| not_in_class(before))?,
            None => class.benefits.len(),
        };

        // removal shifts everything after `from` one slot left
        let insert_at = if target > from { target - 1 } else { target };
        if insert_at == from {
            return Ok(false);
        }
        let item = class.benefits.remove(from);
        class.benefits.insert(insert_at, item);
        Ok(true)
    }

    /// Append a benefit that is not yet assigned anywhere.
    pub(crate) fn add_benefit(&mut self, class: &str, benefit: BenefitRef) -> Result<(), EngineError> {
        if let Some(owner) = self.class_of(&benefit.id) {
            return Err(ValidationError::BenefitAlreadyAssigned {
                benefit: benefit.id,
                class: owner.name.clone(),
            }
            .into());
        }
        self.class_mut(class)?.benefits.push(benefit);
        Ok(())
    }

    pub(crate) fn remove_benefit(
        &mut self,
        class: &str,
        benefit: &str,
    ) -> Result<BenefitRef, StaleReference> {
        let class = self.class_mut(class)?;
        let index = class
            .position(benefit)
            .ok_or_else(|| StaleReference::BenefitNotInClass {
                class: class.id.clone(),
                benefit: benefit.to_string(),
            })?;
        Ok(class.benefits.remove(index))
    }

    pub(crate) fn add_class(&mut self, id: &str, name: &str) -> Result<(), ValidationError> {
        if self.class(id).is_some() {
            return Err(ValidationError::DuplicateClassId(id.to_string()));
        }
        validate_class_name(name, self.classes.iter().map(|c| c.name.as_str()))?;
        self.classes.push(Class::new(id, name.trim()));
        Ok(())
    }

    pub(crate) fn rename_class(&mut self, id: &str, name: &str) -> Result<(), EngineError> {
        if self.class(id).is_none() {
            return Err(StaleReference::ClassNotFound(id.to_string()).into());
        }
        validate_class_name(
            name,
            self.classes
                .iter()
                .filter(|c| c.id != id)
                .map(|c| c.name.as_str()),
        )?;
        self.class_mut(id)?.name = name.trim().to_string();
        Ok(())
    }

    /// Drop a class; its benefits become unassigned.
    pub(crate) fn remove_class(&mut self, id: &str) -> Result<Class, StaleReference> {
        let index = self
            .classes
            .iter()
            .position(|c| c.id == id)
            .ok_or_else(|| StaleReference::ClassNotFound(id.to_string()))?;
        Ok(self.classes.remove(index))
    }

    /// Benefit ids in tree order.
    pub fn benefit_ids(&self) -> impl Iterator<Item = &BenefitId> + '_ {
        self.classes
            .iter()
            .flat_map(|c| c.benefits.iter().map(|b| &b.id))
    }
}
