//! Command vocabulary, priority model, and command queue
//!
//! The hot path between ASR and response generation: transcribed text is
//! classified into a `Command` (sub-millisecond, pure keyword matching),
//! enqueued on the per-session `CommandQueue`, and dequeued by whichever
//! unit is driving turns for that session.

mod classify;
mod queue;
mod types;

pub use classify::{classify, REFINEMENT_CUES};
pub use queue::CommandQueue;
pub use types::{Command, CommandKind, Priority, COMMAND_EXPIRY};
