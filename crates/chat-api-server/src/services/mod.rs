pub mod conversation;
pub mod embedding_service;
pub mod event_bus;
pub mod knowledge;
pub mod llm_service;
pub mod session;

pub use conversation::{ChatOrchestrator, LongTermContextProvider, ModelChain};
pub use embedding_service::{EmbeddingProvider, EmbeddingService};
pub use event_bus::{EventBus, SessionEvent};
pub use knowledge::KnowledgeBase;
pub use llm_service::LlmService;
pub use session::{EvictionSweeper, SessionManager};
