use reqwest::Client as HttpClient;
use serde::Deserialize;
use serde_json::json;

use crate::{
    cached,
    db::{Cache, CacheKey},
    error::{AppError, AppResult},
    models::{AnswerOption, QuestionNode, SessionProfile, ESCAPE_HATCH_TAG},
    services::providers::{
        fingerprint, normalize_tags, ExternalQuestionGenerator, FreeTextInterpreter,
    },
};

const FREE_TEXT_CACHE_TTL: u64 = 604800; // 1 week
const QUESTION_CACHE_TTL: u64 = 86400; // 1 day
const MAX_GENERATED_ANSWERS: usize = 4;
const ESCAPE_HATCH_TEXT: &str = "Ingen af disse passer...";

/// OpenAI-compatible chat completions client
///
/// Serves both free-text interpretation and question generation. Results
/// are cached in Redis by a fingerprint of their inputs when a cache is set.
#[derive(Clone)]
pub struct ChatCompletionsClient {
    http_client: HttpClient,
    api_url: String,
    api_key: String,
    model: String,
    cache: Option<Cache>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TagsReply {
    #[serde(default)]
    tags: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct GeneratedAnswer {
    answer_text: String,
    #[serde(default)]
    tags: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct GeneratedQuestion {
    #[serde(default)]
    id: Option<String>,
    question_text: String,
    answers: Vec<GeneratedAnswer>,
}

/// The model sometimes wraps the question in `{"question": ...}`
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum QuestionReply {
    Wrapped { question: GeneratedQuestion },
    Bare(GeneratedQuestion),
}

impl ChatCompletionsClient {
    pub fn new(api_url: String, api_key: String, model: String, cache: Option<Cache>) -> Self {
        Self {
            http_client: HttpClient::new(),
            api_url: api_url.trim_end_matches('/').to_string(),
            api_key,
            model,
            cache,
        }
    }

    /// Sends one user prompt and parses the reply content as JSON
    async fn complete<T: serde::de::DeserializeOwned>(
        &self,
        prompt: String,
        temperature: f32,
    ) -> AppResult<T> {
        let url = format!("{}/v1/chat/completions", self.api_url);
        let body = json!({
            "model": self.model,
            "messages": [{ "role": "user", "content": prompt }],
            "temperature": temperature,
            "response_format": { "type": "json_object" },
        });

        let response = self
            .http_client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Collaborator(format!(
                "Chat API returned status {}: {}",
                status, body
            )));
        }

        let data: ChatResponse = response.json().await?;
        let content = data
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| AppError::Collaborator("Chat API returned no content".to_string()))?;

        serde_json::from_str(&content).map_err(|e| {
            tracing::error!(error = %e, content = %content, "Failed to parse chat reply");
            AppError::Collaborator(format!("Failed to parse chat reply: {}", e))
        })
    }

    async fn request_tags(&self, prior_tags: &[String], raw_text: &str) -> AppResult<Vec<String>> {
        let reply: TagsReply = self
            .complete(free_text_prompt(prior_tags, raw_text), 0.5)
            .await?;
        let tags = normalize_tags(reply.tags);

        tracing::info!(tags = tags.len(), provider = "chat", "Free text interpreted");

        Ok(tags)
    }

    async fn request_question(
        &self,
        profile: &SessionProfile,
        top_candidates: &[String],
    ) -> AppResult<QuestionNode> {
        let reply: QuestionReply = self
            .complete(question_prompt(profile, top_candidates), 0.7)
            .await?;
        let generated = match reply {
            QuestionReply::Wrapped { question } => question,
            QuestionReply::Bare(question) => question,
        };

        let node = into_question_node(generated, profile.favored_topic.clone())?;
        tracing::info!(question_id = %node.id, provider = "chat", "Question generated");

        Ok(node)
    }
}

#[async_trait::async_trait]
impl FreeTextInterpreter for ChatCompletionsClient {
    async fn interpret(&self, prior_tags: &[String], raw_text: &str) -> AppResult<Vec<String>> {
        let mut sorted = prior_tags.to_vec();
        sorted.sort();
        let prior = sorted.join(",");
        let key = CacheKey::FreeText(fingerprint(&[prior.as_str(), raw_text]));

        match &self.cache {
            Some(cache) => cached!(
                cache,
                key,
                FREE_TEXT_CACHE_TTL,
                self.request_tags(prior_tags, raw_text)
            ),
            None => self.request_tags(prior_tags, raw_text).await,
        }
    }

    fn name(&self) -> &'static str {
        "chat"
    }
}

#[async_trait::async_trait]
impl ExternalQuestionGenerator for ChatCompletionsClient {
    async fn generate(
        &self,
        profile: &SessionProfile,
        top_candidates: &[String],
    ) -> AppResult<QuestionNode> {
        let mut answered = profile.answered_tags.clone();
        answered.sort();
        let interests: Vec<String> = profile
            .interests
            .iter()
            .map(|(tag, weight)| format!("{}({})", tag, weight))
            .collect();
        let (answered, interests, candidates) = (
            answered.join(","),
            interests.join(","),
            top_candidates.join(","),
        );
        let key = CacheKey::AiQuestion(fingerprint(&[
            answered.as_str(),
            interests.as_str(),
            candidates.as_str(),
        ]));

        match &self.cache {
            Some(cache) => cached!(
                cache,
                key,
                QUESTION_CACHE_TTL,
                self.request_question(profile, top_candidates)
            ),
            None => self.request_question(profile, top_candidates).await,
        }
    }

    fn name(&self) -> &'static str {
        "chat"
    }
}

fn free_text_prompt(prior_tags: &[String], raw_text: &str) -> String {
    let context = if prior_tags.is_empty() {
        "(none)".to_string()
    } else {
        prior_tags.join(", ")
    };

    format!(
        "You turn a gift quiz answer typed by the user into tags.\n\
         Tags from earlier answers: {}\n\
         User text: \"{}\"\n\
         Return the recipient's interests as tags in the form \"interest:tag_name\", \
         with underscores instead of spaces. Reply with JSON only: {{\"tags\": [\"interest:tag\"]}}",
        context, raw_text
    )
}

fn question_prompt(profile: &SessionProfile, top_candidates: &[String]) -> String {
    let interests: Vec<String> = profile
        .interests
        .iter()
        .map(|(tag, weight)| format!("{} ({})", tag.replace('_', " "), weight))
        .collect();

    format!(
        "You are a personal shopper for a Danish gift shop. Ask the single question that best \
         separates the leading interests below, or confirms a niche one. Write in Danish, short and friendly.\n\
         Interests (score): {}\n\
         Leading products: {}\n\
         Answer tags must be taken from the interests above. At most {} answers, and the last one \
         must be \"{}\" with tags [\"{}\"].\n\
         Reply with JSON only: {{\"question\": {{\"question_text\": \"...\", \"answers\": \
         [{{\"answer_text\": \"...\", \"tags\": [\"...\"]}}]}}}}",
        interests.join(", "),
        top_candidates.join(", "),
        MAX_GENERATED_ANSWERS,
        ESCAPE_HATCH_TEXT,
        ESCAPE_HATCH_TAG
    )
}

/// Builds a root question from a generated reply, with fresh ids and an
/// escape hatch as the last answer
fn into_question_node(
    generated: GeneratedQuestion,
    topic: Option<String>,
) -> AppResult<QuestionNode> {
    if generated.question_text.trim().is_empty() {
        return Err(AppError::Collaborator(
            "Generated question has no text".to_string(),
        ));
    }

    let id = match generated.id {
        Some(id) if id.starts_with("q_ai_") => id,
        _ => format!("q_ai_{}", &uuid::Uuid::new_v4().simple().to_string()[..8]),
    };

    let mut answers: Vec<AnswerOption> = generated
        .answers
        .into_iter()
        .filter(|a| !a.answer_text.trim().is_empty())
        .map(|a| {
            let tags = if a.tags.iter().any(|t| t == ESCAPE_HATCH_TAG) {
                vec![ESCAPE_HATCH_TAG.to_string()]
            } else {
                normalize_tags(a.tags)
            };
            AnswerOption {
                id: String::new(),
                text: a.answer_text,
                tags,
            }
        })
        .collect();

    answers.retain(|a| !a.is_escape_hatch());
    answers.truncate(MAX_GENERATED_ANSWERS - 1);
    if answers.is_empty() {
        return Err(AppError::Collaborator(
            "Generated question has no usable answers".to_string(),
        ));
    }
    answers.push(AnswerOption {
        id: String::new(),
        text: ESCAPE_HATCH_TEXT.to_string(),
        tags: vec![ESCAPE_HATCH_TAG.to_string()],
    });
    for (index, answer) in answers.iter_mut().enumerate() {
        answer.id = format!("{}_a{}", id, index + 1);
    }

    Ok(QuestionNode {
        id,
        parent_answer_id: None,
        guard: None,
        topic,
        phrasings: vec![generated.question_text],
        answers,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reply(json: &str) -> GeneratedQuestion {
        match serde_json::from_str::<QuestionReply>(json).unwrap() {
            QuestionReply::Wrapped { question } => question,
            QuestionReply::Bare(question) => question,
        }
    }

    #[test]
    fn test_wrapped_and_bare_replies_parse() {
        let wrapped = reply(
            r#"{"question": {"question_text": "Ude eller hjemme?", "answers": [{"answer_text": "Ude", "tags": ["natur"]}]}}"#,
        );
        let bare = reply(
            r#"{"question_text": "Ude eller hjemme?", "answers": [{"answer_text": "Ude", "tags": ["natur"]}]}"#,
        );
        assert_eq!(wrapped.question_text, bare.question_text);
        assert_eq!(wrapped.answers.len(), 1);
    }

    #[test]
    fn test_generated_question_gets_escape_hatch_and_ids() {
        let generated = reply(
            r#"{"question": {"id": "q_ai_beef", "question_text": "Retro spil?", "answers": [
                {"answer_text": "Ja!", "tags": ["interest:Retro Spil"]},
                {"answer_text": "Nej", "tags": ["brætspil"]}
            ]}}"#,
        );

        let node = into_question_node(generated, Some("gaming".to_string())).unwrap();
        assert_eq!(node.id, "q_ai_beef");
        assert_eq!(node.parent_answer_id, None);
        assert_eq!(node.topic.as_deref(), Some("gaming"));
        assert_eq!(node.answers.len(), 3);
        assert_eq!(node.answers[0].id, "q_ai_beef_a1");
        assert_eq!(node.answers[0].tags, vec!["retro_spil".to_string()]);
        assert!(node.answers[2].is_escape_hatch());
    }

    #[test]
    fn test_generated_escape_hatch_is_moved_last() {
        let generated = reply(
            r#"{"question_text": "Hvad med musik?", "answers": [
                {"answer_text": "Ingen af disse", "tags": ["freetext:true"]},
                {"answer_text": "Vinyl", "tags": ["musik"]}
            ]}"#,
        );

        let node = into_question_node(generated, None).unwrap();
        assert!(node.id.starts_with("q_ai_"));
        assert_eq!(node.answers.len(), 2);
        assert_eq!(node.answers[0].text, "Vinyl");
        assert!(node.answers[1].is_escape_hatch());
    }

    #[test]
    fn test_generated_question_without_answers_is_rejected() {
        let generated = reply(
            r#"{"question_text": "Hmm?", "answers": [{"answer_text": "Ingen", "tags": ["freetext:true"]}]}"#,
        );
        assert!(matches!(
            into_question_node(generated, None),
            Err(AppError::Collaborator(_))
        ));
    }

    #[test]
    fn test_free_text_prompt_includes_context() {
        let prompt = free_text_prompt(&["sport".to_string()], "han elsker fodbold");
        assert!(prompt.contains("sport"));
        assert!(prompt.contains("han elsker fodbold"));
        assert!(free_text_prompt(&[], "x").contains("(none)"));
    }
}
