//! Registry record types shared by the filter compiler and the repository.

mod entity;
mod family;
mod state;

pub use entity::{
    Artifact, ArtifactAttributes, Context, ContextAttributes, Entity, EntityAttributes, Execution,
    ExecutionAttributes, Property, PropertyValue,
};
pub use family::{RestEntityType, SchemaFamily};
pub use state::{ArtifactState, ExecutionState, UNKNOWN_STATE_SENTINEL, state_code};
