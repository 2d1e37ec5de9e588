use anyhow::Result;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
#[serde(default)]
pub struct Settings {
    pub server: ServerConfig,
    pub security: SecurityConfig,
    pub session: SessionConfig,
    pub llm: LlmConfig,
    pub knowledge: KnowledgeConfig,
    pub prompts: PromptsConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
#[serde(default)]
pub struct SecurityConfig {
    /// Expected value of the `API-KEY` header. `None` disables the check.
    pub api_key: Option<String>,
}

/// Session lifecycle knobs: admission capacity, sweep cadence, idle threshold.
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct SessionConfig {
    pub capacity: usize,
    pub sweep_period_ms: u64,
    pub idle_threshold_secs: u64,
    /// Sliding-window cap on recorded turn pairs. `None` keeps every turn.
    pub max_turn_pairs: Option<usize>,
    /// Admit unknown conversation ids on the turn path instead of rejecting them.
    pub implicit_admission: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            capacity: 3,
            sweep_period_ms: 180_000,
            idle_threshold_secs: 60,
            max_turn_pairs: None,
            implicit_admission: true,
        }
    }
}

impl SessionConfig {
    pub fn sweep_period(&self) -> Duration {
        Duration::from_millis(self.sweep_period_ms.max(1))
    }

    pub fn idle_threshold(&self) -> Duration {
        Duration::from_secs(self.idle_threshold_secs)
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct LlmConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub max_tokens: usize,
    pub temperature: f32,
    pub timeout_seconds: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com".to_string(),
            api_key: None,
            model: "gpt-3.5-turbo".to_string(),
            max_tokens: 256,
            temperature: 0.7,
            timeout_seconds: 60,
        }
    }
}

impl LlmConfig {
    /// Upper bound for a whole model-chain invocation.
    pub fn chain_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds.max(1))
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct KnowledgeConfig {
    pub documents_path: String,
    pub index_path: String,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    /// Number of passages returned per query (`k`).
    pub context_size: usize,
    pub embedding_base_url: String,
    pub embedding_model: String,
    pub embedding_api_key: Option<String>,
}

impl Default for KnowledgeConfig {
    fn default() -> Self {
        Self {
            documents_path: "./Documents".to_string(),
            index_path: "./VectorStore/index.json".to_string(),
            chunk_size: 1000,
            chunk_overlap: 0,
            context_size: 2,
            embedding_base_url: "https://api.openai.com".to_string(),
            embedding_model: "text-embedding-ada-002".to_string(),
            embedding_api_key: None,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct PromptsConfig {
    /// System message templates, sent in order. `{long_term_memory}` is substituted.
    pub system: Vec<String>,
}

impl Default for PromptsConfig {
    fn default() -> Self {
        Self {
            system: vec![
                "You are a knowledgeable assistant. Use respectful and formal language. \
                 If a question cannot be answered from what you know, say so politely."
                    .to_string(),
                "If a user provides information about themselves, remember it.".to_string(),
                "Answer all human questions with the following information as context: \
                 {long_term_memory}"
                    .to_string(),
            ],
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct LoggingConfig {
    /// `json` or `pretty`
    pub format: String,
    /// Directory for daily-rotated log files. Stdout only when unset.
    pub directory: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: "json".to_string(),
            directory: None,
        }
    }
}

impl Settings {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Config::builder()
            .add_source(File::with_name("config/settings").required(false))
            .add_source(
                Environment::with_prefix("APP")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let mut settings: Settings = config.try_deserialize()?;

        if let Some(port) = std::env::var("PORT").ok().and_then(|p| p.parse().ok()) {
            settings.server.port = port;
        }
        if settings.security.api_key.is_none() {
            settings.security.api_key = std::env::var("MY_API_KEY").ok().filter(|k| !k.is_empty());
        }
        if settings.llm.api_key.is_none() {
            settings.llm.api_key = std::env::var("OPENAI_API_KEY").ok().filter(|k| !k.is_empty());
        }
        if settings.knowledge.embedding_api_key.is_none() {
            settings.knowledge.embedding_api_key = settings.llm.api_key.clone();
        }

        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_defaults() {
        let cfg = SessionConfig::default();
        assert_eq!(cfg.capacity, 3);
        assert_eq!(cfg.sweep_period(), Duration::from_millis(180_000));
        assert_eq!(cfg.idle_threshold(), Duration::from_secs(60));
        assert!(cfg.max_turn_pairs.is_none());
        assert!(cfg.implicit_admission);
    }

    #[test]
    fn test_knowledge_defaults() {
        let cfg = KnowledgeConfig::default();
        assert_eq!(cfg.context_size, 2);
        assert_eq!(cfg.chunk_size, 1000);
    }

    #[test]
    fn test_partial_toml_falls_back_to_defaults() {
        let config = Config::builder()
            .add_source(config::File::from_str(
                "[session]\ncapacity = 5\n",
                config::FileFormat::Toml,
            ))
            .build()
            .unwrap();

        let settings: Settings = config.try_deserialize().unwrap();
        assert_eq!(settings.session.capacity, 5);
        assert_eq!(settings.session.idle_threshold_secs, 60);
        assert_eq!(settings.server.port, 3000);
        assert_eq!(settings.prompts.system.len(), 3);
    }
}
