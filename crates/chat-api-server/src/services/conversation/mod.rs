//! Per-conversation short-term memory and the turn pipeline.
//!
//! - `ConversationStore`: DashMap of id -> `ShortTermMemoryBuffer`
//! - `MemoryComposer` / `ContextBuilder`: merge memories, render model messages
//! - `ChatOrchestrator`: handle one turn against the model chain

mod buffer;
mod composer;
mod context_builder;
pub mod orchestrator;
mod store;

pub use buffer::ShortTermMemoryBuffer;
pub use composer::{MemoryComposer, MergedContext, Passage};
pub use context_builder::{ContextBuilder, LONG_TERM_PLACEHOLDER};
pub use orchestrator::{ChatOrchestrator, LongTermContextProvider, ModelChain};
pub use store::{ConversationStore, MemoryRelease};
