//! Error types for edit processing.

use thiserror::Error;

use crate::model::{BenefitId, ClassId, CostShareKey};
use crate::validation::ValidationError;

/// Top-level error returned by [`Engine::apply`](super::Engine::apply).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error("{0}")]
    Validation(#[from] ValidationError),

    #[error("{0}")]
    Stale(#[from] StaleReference),
}

impl EngineError {
    /// Validation failures are shown to the user; stale references are
    /// logged and otherwise ignored.
    pub fn is_user_facing(&self) -> bool {
        matches!(self, EngineError::Validation(_))
    }
}

/// An edit addressed something that is not (or no longer) in the working state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StaleReference {
    #[error("class {0} not found")]
    ClassNotFound(ClassId),

    #[error("benefit {benefit} not found in class {class}")]
    BenefitNotInClass { class: ClassId, benefit: BenefitId },

    #[error("benefit {0} is not assigned to any class")]
    BenefitUnassigned(BenefitId),

    #[error("benefit {0} not found in catalog")]
    NotInCatalog(BenefitId),

    #[error("benefit {0} already belongs to class {1}")]
    SameClass(BenefitId, ClassId),

    #[error(
        "no cost share for class {}, benefit {}, tier {}, {}",
        .0.class,
        .0.benefit.as_deref().unwrap_or("(class default)"),
        .0.tier,
        .0.coverage
    )]
    CostShareNotFound(CostShareKey),
}
