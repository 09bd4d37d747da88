pub mod amount;
pub mod config;
pub mod csv;
pub mod document;
pub mod engine;
pub mod model;
pub mod session;
pub mod store;
pub mod validation;

pub use amount::{Amount, AmountError};
pub use config::{EngineConfig, MovePolicy};
pub use document::Bundle;
pub use engine::{Engine, EngineError};
pub use model::{BenefitId, ClassId, Edit, TierIndex};
pub use session::Session;
