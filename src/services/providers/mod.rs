//! External collaborators that need a network round trip
//!
//! The session engine only sees these traits. A failed call never blocks a
//! recommendation: the engine falls through to results instead.

use sha2::{Digest, Sha256};

use crate::{
    error::AppResult,
    models::{QuestionNode, SessionProfile},
};

pub mod chat;

pub use chat::ChatCompletionsClient;

/// Turns free text into interest tags
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait FreeTextInterpreter: Send + Sync {
    /// `raw_text` is already length-capped and sanitized by the caller
    async fn interpret(&self, prior_tags: &[String], raw_text: &str) -> AppResult<Vec<String>>;

    /// Collaborator name for logging
    fn name(&self) -> &'static str;
}

/// Produces one ad-hoc question when the question graph runs dry
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait ExternalQuestionGenerator: Send + Sync {
    async fn generate(
        &self,
        profile: &SessionProfile,
        top_candidates: &[String],
    ) -> AppResult<QuestionNode>;

    fn name(&self) -> &'static str;
}

/// Normalizes collaborator tags: `interest:` prefix stripped, lower-cased,
/// spaces as underscores, duplicates and blanks removed. Other namespaced
/// tags keep their namespace.
pub fn normalize_tags<I, S>(tags: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut normalized: Vec<String> = Vec::new();
    for tag in tags {
        let tag = tag.as_ref().trim();
        let tag = tag.strip_prefix("interest:").unwrap_or(tag);
        let tag = tag.trim().to_lowercase().replace(' ', "_");
        if !tag.is_empty() && !normalized.contains(&tag) {
            normalized.push(tag);
        }
    }
    normalized
}

/// Stable SHA-256 fingerprint over the given parts, for cache keys
pub fn fingerprint(parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part.as_bytes());
        hasher.update(b"|");
    }
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_tags() {
        let tags = normalize_tags(vec![
            "interest:Retro Spil",
            "retro_spil",
            "differentiator:budget",
            "  ",
            "Sport",
        ]);
        assert_eq!(
            tags,
            vec![
                "retro_spil".to_string(),
                "differentiator:budget".to_string(),
                "sport".to_string()
            ]
        );
    }

    #[test]
    fn test_fingerprint_is_stable_and_order_sensitive() {
        let a = fingerprint(&["sport,musik", "noget med fodbold"]);
        let b = fingerprint(&["sport,musik", "noget med fodbold"]);
        let c = fingerprint(&["noget med fodbold", "sport,musik"]);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 64);
    }
}
