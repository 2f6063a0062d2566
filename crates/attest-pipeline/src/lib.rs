//! attest-pipeline — the identity verification pipeline.
//!
//! Wires the capture device controller, the text/face recognition
//! capabilities, and the outcome sink around an explicit state machine.
//! The presentation layer drives it through [`PipelineHandle`] triggers and
//! observes it through [`PipelineView`] snapshots.

pub mod config;
pub mod controller;
pub mod driver;
pub mod machine;
pub mod store;

#[cfg(test)]
pub(crate) mod testutil;

pub use config::Config;
pub use controller::{spawn_controller, ControllerError, ControllerHandle};
pub use driver::{spawn_pipeline, PipelineHandle, PipelineView};
pub use machine::{Effect, Event, FacePhase, IdPhase, Machine, Step, VerificationStep};
pub use store::{MemorySink, OutcomeSink, SqliteIdentityStore, StoreError};
