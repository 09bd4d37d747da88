//! Configuration session: the engine plus the interaction state around it.
//!
//! Move-by-selection, drag-and-drop, dirty tracking and the save flow all
//! live on an explicit [`UiState`] owned by the [`Session`].

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::document::{Bundle, DentalPlanDocument, LimitStructureDocument};
use crate::engine::{Engine, EngineError};
use crate::model::{BenefitId, ClassId, Edit};
use crate::store::{Document, DocumentStore, StoreError};
use crate::validation::ValidationError;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("a save is already in progress")]
    SaveInFlight,

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("save failed: {0}")]
    Persistence(#[from] StoreError),
}

/// Click-to-move state machine.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum MoveSelection {
    #[default]
    Idle,
    SelectingDestination {
        benefit: BenefitId,
        from: ClassId,
        display_name: String,
    },
}

/// Where a dragged benefit was released.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DropTarget {
    /// A class header.
    Class(ClassId),
    /// A benefit row.
    Benefit { class: ClassId, benefit: BenefitId },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveDrag {
    pub benefit: BenefitId,
    pub class: ClassId,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UiState {
    pub selection: MoveSelection,
    pub active_drag: Option<ActiveDrag>,
    /// Edits applied since the last load or save.
    pub dirty: bool,
    pub saving: bool,
}

#[derive(Debug)]
pub struct Session {
    engine: Engine,
    snapshot: Bundle,
    ui: UiState,
}

impl Session {
    pub fn new(bundle: Bundle, config: EngineConfig) -> Self {
        Self {
            engine: Engine::load(&bundle, config),
            snapshot: bundle,
            ui: UiState::default(),
        }
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    pub fn ui(&self) -> &UiState {
        &self.ui
    }

    /// The last loaded or saved bundle.
    pub fn snapshot(&self) -> &Bundle {
        &self.snapshot
    }

    pub fn is_dirty(&self) -> bool {
        self.ui.dirty
    }

    /// Apply an edit. Only validation failures come back as errors;
    /// stale references are logged by the engine and otherwise ignored.
    pub fn edit(&mut self, edit: Edit) -> Result<(), SessionError> {
        self.apply(edit)
    }

    /// Mark a benefit for move, replacing any earlier selection.
    pub fn select_for_move(&mut self, benefit: &str, class: &str) {
        let Some(selected) = self
            .engine
            .benefits_in_class(class)
            .iter()
            .find(|b| b.id == benefit)
        else {
            debug!(benefit, class, "selected benefit not in class");
            return;
        };
        self.ui.selection = MoveSelection::SelectingDestination {
            benefit: selected.id.clone(),
            from: class.to_string(),
            display_name: selected.name.clone(),
        };
    }

    pub fn cancel_move(&mut self) {
        self.ui.selection = MoveSelection::Idle;
    }

    /// Classes the selected benefit can be moved to.
    pub fn destinations(&self) -> Vec<&ClassId> {
        match &self.ui.selection {
            MoveSelection::Idle => Vec::new(),
            MoveSelection::SelectingDestination { from, .. } => self
                .engine
                .list_classes()
                .iter()
                .map(|c| &c.id)
                .filter(|id| *id != from)
                .collect(),
        }
    }

    /// Complete a pending move. The selection stays active if the move did not
    /// happen, e.g. when the source class itself was chosen.
    pub fn choose_destination(&mut self, class: &str) -> Result<(), SessionError> {
        let MoveSelection::SelectingDestination { benefit, from, .. } = &self.ui.selection else {
            return Ok(());
        };
        let edit = Edit::MoveBenefit {
            benefit: benefit.clone(),
            from: from.clone(),
            to: class.to_string(),
        };
        self.edit(edit)
    }

    pub fn drag_start(&mut self, benefit: &str) {
        self.ui.active_drag = self.engine.classes().class_of(benefit).map(|class| ActiveDrag {
            benefit: benefit.to_string(),
            class: class.id.clone(),
        });
    }

    /// Finish a drag. Releasing on a row of the same class reorders before
    /// that row; releasing anywhere in another class moves the benefit there.
    pub fn drag_end(&mut self, target: Option<DropTarget>) -> Result<(), SessionError> {
        let (Some(drag), Some(target)) = (self.ui.active_drag.take(), target) else {
            return Ok(());
        };

        let edit = match target {
            DropTarget::Class(class) if class == drag.class => return Ok(()),
            DropTarget::Benefit { class, benefit } if class == drag.class => {
                Edit::ReorderWithinClass {
                    class,
                    benefit: drag.benefit,
                    before: Some(benefit),
                }
            }
            DropTarget::Class(to) | DropTarget::Benefit { class: to, .. } => Edit::MoveBenefit {
                benefit: drag.benefit,
                from: drag.class,
                to,
            },
        };
        self.edit(edit)
    }

    pub fn drag_cancel(&mut self) {
        self.ui.active_drag = None;
    }

    /// Drop all edits and return to the last loaded or saved state.
    pub fn discard(&mut self) {
        self.engine = Engine::load(&self.snapshot, *self.engine.config());
        self.ui.selection = MoveSelection::Idle;
        self.ui.active_drag = None;
        self.ui.dirty = false;
    }

    /// Claim the single save slot.
    pub fn begin_save(&mut self) -> Result<(), SessionError> {
        if self.ui.saving {
            return Err(SessionError::SaveInFlight);
        }
        self.ui.saving = true;
        Ok(())
    }

    /// Release the save slot. A saved bundle becomes the new snapshot; on
    /// failure the edits are kept so the save can be retried.
    pub fn complete_save(&mut self, result: Result<Bundle, SessionError>) -> Result<(), SessionError> {
        self.ui.saving = false;
        match result {
            Ok(saved) => {
                self.snapshot = saved;
                self.ui.dirty = false;
                info!(structure = %self.snapshot.class_structure.name, "configuration saved");
                Ok(())
            }
            Err(e) => {
                warn!(reason = %e, "save failed, edits kept");
                Err(e)
            }
        }
    }

    /// Export, validate and persist the working state.
    pub fn save(&mut self, store: &mut impl DocumentStore, user: &str) -> Result<(), SessionError> {
        self.begin_save()?;
        let result = self.persist(store, user);
        self.complete_save(result)
    }
}

/// Parent id the children are validated against before the first write.
const UNSAVED_ID: &str = "unsaved";

impl Session {
    /// A move of the selected benefit, by any route, ends the selection.
    fn apply(&mut self, edit: Edit) -> Result<(), SessionError> {
        let moved = match &edit {
            Edit::MoveBenefit { benefit, .. } => Some(benefit.clone()),
            _ => None,
        };
        match self.engine.apply(edit) {
            Ok(()) => {}
            Err(EngineError::Validation(e)) => return Err(e.into()),
            Err(EngineError::Stale(_)) => return Ok(()),
        }
        self.ui.dirty = true;

        let ends_selection = matches!(
            (&moved, &self.ui.selection),
            (Some(moved), MoveSelection::SelectingDestination { benefit, .. }) if benefit == moved
        );
        if ends_selection {
            self.ui.selection = MoveSelection::Idle;
        }
        Ok(())
    }

    /// Documents are written parent first so children can carry its id:
    /// class structure, then limit structure, then plan. Everything is
    /// validated before the first write. Ids the store assigns are kept in
    /// the snapshot as they come, so a retry after a partial save updates
    /// those documents instead of creating new ones.
    fn persist(&mut self, store: &mut impl DocumentStore, user: &str) -> Result<Bundle, SessionError> {
        let mut bundle = self.engine.export(&self.snapshot);
        link(&mut bundle);
        check(&bundle)?;

        bundle.class_structure = store.upsert(bundle.class_structure, user)?;
        self.snapshot.class_structure.id = bundle.class_structure.id.clone();
        link(&mut bundle);

        if let Some(limits) = bundle.limit_structure.take() {
            let limits = store.upsert::<LimitStructureDocument>(limits, user)?;
            let snapshot = self
                .snapshot
                .limit_structure
                .get_or_insert_with(|| limits.clone());
            snapshot.id = limits.id.clone();
            bundle.limit_structure = Some(limits);
            link(&mut bundle);
        }
        if let Some(plan) = bundle.plan.take() {
            bundle.plan = Some(store.upsert::<DentalPlanDocument>(plan, user)?);
        }
        Ok(bundle)
    }
}

/// Validate the bundle as it will be stored, including the pairing of the
/// limit structure and plan with the class structure.
fn check(bundle: &Bundle) -> Result<(), ValidationError> {
    if bundle.class_structure.id().is_some() {
        return bundle.validate();
    }
    let mut linked = bundle.clone();
    linked.class_structure.id = Some(UNSAVED_ID.to_string());
    link(&mut linked);
    linked.validate()
}

/// Point the limit structure and plan at the documents they depend on.
fn link(bundle: &mut Bundle) {
    let structure = &bundle.class_structure;
    let structure_id = structure.id.clone().unwrap_or_default();
    if let Some(limits) = bundle.limit_structure.as_mut() {
        limits.benefit_class_structure_id = structure_id.clone();
        limits.benefit_class_structure_name = structure.name.clone();
    }
    if let Some(plan) = bundle.plan.as_mut() {
        plan.benefit_class_structure_id = structure_id;
        plan.limit_structure_id = bundle.limit_structure.as_ref().and_then(|l| l.id.clone());
    }
}
