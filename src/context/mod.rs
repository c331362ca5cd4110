//! Session state and context compilation.
//!
//! A [`session::Session`] is the ground truth for one execution: an
//! append-only event log mirrored into the evidence pack. The
//! [`compiler::ContextCompiler`] distills that log into a token-budgeted
//! [`working::WorkingContext`] ready for provider consumption.

pub mod budget;
pub mod builder;
pub mod compiler;
pub mod compression;
pub mod conversation;
pub mod session;
pub mod working;

pub use budget::{estimate_tokens, TokenBudget};
pub use builder::{ContextBuilder, ExecutionContext};
pub use compiler::{
    ArtifactAttacher, Compactor, ContextCompiler, HistorySelector, MemoryPreloader, Processor,
};
pub use compression::{CompressionStrategy, ContextCompressor};
pub use conversation::{ConversationMemory, ConversationTurn};
pub use session::{EventKind, EventLog, Session, SessionEvent};
pub use working::WorkingContext;
