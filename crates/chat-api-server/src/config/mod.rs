pub mod settings;

pub use settings::{
    KnowledgeConfig, LlmConfig, LoggingConfig, PromptsConfig, SecurityConfig, ServerConfig,
    SessionConfig, Settings,
};
