// State machines for the indexing run and for each document pipeline.
//
// Both are plain in-memory machines: durability comes from the checkpoint
// store, which the engine writes only after a page has fully joined.

pub mod document_state_machine;
pub mod events;
pub mod run_state_machine;
pub mod states;

pub use document_state_machine::DocumentJob;
pub use events::{DocumentEvent, RunEvent};
pub use run_state_machine::RunStateMachine;
pub use states::{DocumentStage, RunPhase};
