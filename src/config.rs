use serde::Deserialize;

use crate::services::{selector::TopicPolicy, session::EngineConfig};

/// Application configuration loaded from environment variables
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Server host address
    #[serde(default = "default_host")]
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Redis connection URL. Sharing and collaborator caching are disabled without it.
    #[serde(default)]
    pub redis_url: Option<String>,

    /// Item catalog snapshot (JSON array of items)
    #[serde(default = "default_catalog_path")]
    pub catalog_path: String,

    /// Question graph snapshot (JSON array of question nodes)
    #[serde(default = "default_questions_path")]
    pub questions_path: String,

    /// Tag embeddings (JSON object of tag -> vector)
    #[serde(default = "default_tag_embeddings_path")]
    pub tag_embeddings_path: String,

    /// OpenAI-compatible chat completions base URL
    #[serde(default = "default_chat_api_url")]
    pub chat_api_url: String,

    /// API key for the chat endpoint. Free-text and AI questions are disabled without it.
    #[serde(default)]
    pub chat_api_key: Option<String>,

    #[serde(default = "default_chat_model")]
    pub chat_model: String,

    /// Weight of term overlap versus semantic similarity
    #[serde(default = "default_score_alpha")]
    pub score_alpha: f64,

    /// Answered questions required before an AI question may be requested
    #[serde(default = "default_min_questions")]
    pub min_questions: usize,

    /// Answered questions after which the quiz always shows results
    #[serde(default = "default_max_questions")]
    pub max_questions: usize,

    #[serde(default)]
    pub topic_policy: TopicPolicy,

    /// Reject session start when no bandit topics are available
    #[serde(default)]
    pub require_topics: bool,

    #[serde(default = "default_free_text_max_chars")]
    pub free_text_max_chars: usize,

    /// Lifetime of shared results in seconds
    #[serde(default = "default_share_ttl_secs")]
    pub share_ttl_secs: u64,

    /// Sessions untouched for this many seconds are dropped
    #[serde(default = "default_session_idle_secs")]
    pub session_idle_secs: u64,

    /// How often idle sessions are swept, in seconds
    #[serde(default = "default_session_sweep_secs")]
    pub session_sweep_secs: u64,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_catalog_path() -> String {
    "data/products.json".to_string()
}

fn default_questions_path() -> String {
    "data/questions.json".to_string()
}

fn default_tag_embeddings_path() -> String {
    "data/tag_embeddings.json".to_string()
}

fn default_chat_api_url() -> String {
    "https://api.openai.com".to_string()
}

fn default_chat_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_score_alpha() -> f64 {
    0.6
}

fn default_min_questions() -> usize {
    3
}

fn default_max_questions() -> usize {
    12
}

fn default_free_text_max_chars() -> usize {
    250
}

fn default_share_ttl_secs() -> u64 {
    2_592_000 // 30 days
}

fn default_session_idle_secs() -> u64 {
    3600
}

fn default_session_sweep_secs() -> u64 {
    60
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        envy::from_env::<Config>().map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))
    }

    /// Engine-facing subset of the configuration
    pub fn engine(&self) -> EngineConfig {
        EngineConfig {
            alpha: self.score_alpha,
            min_questions: self.min_questions,
            max_questions: self.max_questions,
            topic_policy: self.topic_policy,
            require_topics: self.require_topics,
            ..EngineConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_empty_environment() {
        let config: Config = envy::from_iter(Vec::<(String, String)>::new()).unwrap();
        assert_eq!(config.port, 3000);
        assert_eq!(config.score_alpha, 0.6);
        assert_eq!(config.topic_policy, TopicPolicy::FavoredTopicFirst);
        assert!(config.redis_url.is_none());
        assert!(config.chat_api_key.is_none());
        assert_eq!(config.session_idle_secs, 3600);
        assert_eq!(config.session_sweep_secs, 60);
    }

    #[test]
    fn test_topic_policy_from_environment() {
        let vars = vec![
            ("TOPIC_POLICY".to_string(), "generic_first".to_string()),
            ("MAX_QUESTIONS".to_string(), "5".to_string()),
        ];
        let config: Config = envy::from_iter(vars).unwrap();
        assert_eq!(config.topic_policy, TopicPolicy::GenericFirst);

        let engine = config.engine();
        assert_eq!(engine.max_questions, 5);
        assert_eq!(engine.topic_policy, TopicPolicy::GenericFirst);
    }
}
