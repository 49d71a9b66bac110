//! Core module - fundamental types and services

pub mod analysis;
pub mod config;
pub mod identity;
pub mod project;
pub mod session;
pub mod store;
pub mod uncertainty;

pub use analysis::{CommandNarrative, NarrativeService, FALLBACK_ANALYSIS};
pub use config::Config;
pub use identity::RecordPrefix;
pub use project::{Project, ProjectError};
pub use session::{CalibrationSession, SessionState};
pub use store::{MemoryStore, Store, StoreError, YamlStore};
pub use uncertainty::{ApplyTo, UncertaintyError, UncertaintyInputs};
