use std::sync::Arc;

use chrono::{DateTime, Utc};
use rand::{rngs::StdRng, SeedableRng};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    models::{
        interest_tags, AnswerRecord, Filters, InterestWeights, PresentedQuestion, QuestionNode,
        SessionProfile, SharedState,
    },
    services::{
        bandit::{InterestBandit, Reward},
        catalog::Snapshot,
        providers::{ExternalQuestionGenerator, FreeTextInterpreter},
        scorer::{HybridScorer, ScoredItem, DEFAULT_ALPHA},
        selector::{self, Candidate, QuestionSelector, TopicPolicy},
    },
};

/// Answer id recorded for free text typed after the escape hatch
pub const FREE_TEXT_ANSWER_ID: &str = "free_text";

/// Question id used when free text arrives with no question on screen
pub const FREE_TEXT_QUESTION_ID: &str = "q_free_text";

/// Tunables for one quiz session
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub alpha: f64,
    /// Answered questions before an AI question may be requested
    pub min_questions: usize,
    /// Answered questions after which results are forced
    pub max_questions: usize,
    pub topic_policy: TopicPolicy,
    pub require_topics: bool,
    /// Whether an external question generator is wired up
    pub external_questions: bool,
    /// Top-ranked item ids handed to the question generator
    pub top_candidates: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            alpha: DEFAULT_ALPHA,
            min_questions: 3,
            max_questions: 12,
            topic_policy: TopicPolicy::default(),
            require_topics: false,
            external_questions: false,
            top_candidates: 5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    Start,
    AwaitingAnswer,
    AwaitingFreeText,
    AwaitingExternalQuestion,
    Results,
    Terminated,
}

/// What the caller should show next
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum Step {
    Start,
    Question(PresentedQuestion),
    FreeText { question_id: String },
    LoadingExternal,
    Results(Vec<ScoredItem>),
}

/// One recommendation session
///
/// Owns all mutable state. The catalog snapshot is shared read-only between
/// sessions. Operations that take answers never fail: a missing question,
/// a missing answer or a failed collaborator call all fall through to
/// results.
pub struct Session {
    id: Uuid,
    created_at: DateTime<Utc>,
    snapshot: Arc<Snapshot>,
    config: EngineConfig,
    selector: QuestionSelector,
    scorer: HybridScorer,
    phase: SessionPhase,
    filters: Filters,
    interests: InterestWeights,
    answers: Vec<AnswerRecord>,
    visited: Vec<String>,
    transient: Vec<QuestionNode>,
    current: Option<String>,
    favored_topic: Option<String>,
    bandit: InterestBandit,
    rng: StdRng,
}

impl Session {
    pub fn new(snapshot: Arc<Snapshot>, config: EngineConfig) -> Self {
        Self::with_rng(snapshot, config, StdRng::from_os_rng())
    }

    /// Deterministic session for tests and replays
    pub fn with_seed(snapshot: Arc<Snapshot>, config: EngineConfig, seed: u64) -> Self {
        Self::with_rng(snapshot, config, StdRng::seed_from_u64(seed))
    }

    fn with_rng(snapshot: Arc<Snapshot>, config: EngineConfig, rng: StdRng) -> Self {
        Self {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            snapshot,
            selector: QuestionSelector::new(config.topic_policy),
            scorer: HybridScorer::new(config.alpha),
            config,
            phase: SessionPhase::Start,
            filters: Filters::default(),
            interests: InterestWeights::new(),
            answers: Vec::new(),
            visited: Vec::new(),
            transient: Vec::new(),
            current: None,
            favored_topic: None,
            bandit: InterestBandit::default(),
            rng,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn filters(&self) -> &Filters {
        &self.filters
    }

    pub fn interests(&self) -> &InterestWeights {
        &self.interests
    }

    pub fn answers(&self) -> &[AnswerRecord] {
        &self.answers
    }

    pub fn visited(&self) -> &[String] {
        &self.visited
    }

    pub fn bandit(&self) -> &InterestBandit {
        &self.bandit
    }

    pub fn current_question(&self) -> Option<&str> {
        self.current.as_deref()
    }

    /// Starts (or restarts) the quiz and presents the first question
    ///
    /// Bandit arms come from the seed interests when given, otherwise from
    /// the root question topics. Fails only when topics are required and
    /// none exist; the session then stays in `Start`. A terminated session
    /// is not restarted.
    pub fn start(&mut self, filters: Filters, seed: Option<InterestWeights>) -> AppResult<Step> {
        if self.phase == SessionPhase::Terminated {
            return Ok(Step::Results(self.rank()));
        }

        let seed = seed.unwrap_or_default();
        let topics = if seed.is_empty() {
            self.snapshot.graph.root_topics()
        } else {
            seed.tags()
        };
        let bandit = InterestBandit::initialize(topics, self.config.require_topics)?;

        self.reset();
        self.filters = filters;
        self.interests = seed;
        self.bandit = bandit;
        self.phase = SessionPhase::AwaitingAnswer;

        tracing::info!(
            session_id = %self.id,
            arms = self.bandit.arms().len(),
            seeded = !self.interests.is_empty(),
            "Session started"
        );

        Ok(self.advance(None))
    }

    /// Applies an answer and moves on
    ///
    /// A real answer is a bandit success for the question's topic; the
    /// escape hatch is a failure and asks for free text instead.
    pub fn answer(&mut self, question_id: &str, answer_id: &str) -> Step {
        if self.phase == SessionPhase::Terminated {
            return Step::Results(self.rank());
        }

        let Some((node, topic)) = self.lookup(question_id) else {
            return self.fall_through(AppError::Lookup(format!(
                "Unknown question '{}'",
                question_id
            )));
        };
        let Some(option) = node.option(answer_id).cloned() else {
            return self.fall_through(AppError::Lookup(format!(
                "Unknown answer '{}' for question '{}'",
                answer_id, question_id
            )));
        };

        let escape_hatch = option.is_escape_hatch();
        self.record(question_id, answer_id, option.interest_tags());
        if let Some(topic) = topic.as_deref() {
            self.bandit
                .update(topic, Reward::from_escape_hatch(escape_hatch));
        }

        tracing::info!(
            session_id = %self.id,
            question_id = %question_id,
            answer_id = %answer_id,
            escape_hatch,
            "Answer recorded"
        );

        if escape_hatch {
            self.phase = SessionPhase::AwaitingFreeText;
            self.current = Some(question_id.to_string());
            return Step::FreeText {
                question_id: question_id.to_string(),
            };
        }

        self.advance(Some(answer_id))
    }

    /// Interprets free text into interest tags and moves on
    ///
    /// Zero tags still counts as a success and the quiz continues. A failed
    /// interpreter call ends in results.
    pub async fn free_text(&mut self, raw_text: &str, interpreter: &dyn FreeTextInterpreter) -> Step {
        if self.phase == SessionPhase::Terminated {
            return Step::Results(self.rank());
        }

        let question_id = self.free_text_question();
        let prior_tags = self.answered_tags();

        let tags = match interpreter.interpret(&prior_tags, raw_text).await {
            Ok(tags) => tags,
            Err(e) => {
                tracing::warn!(
                    session_id = %self.id,
                    collaborator = interpreter.name(),
                    error = %e,
                    "Free text interpretation failed"
                );
                return self.show_results();
            }
        };

        let mut applied: Vec<String> = Vec::new();
        for tag in interest_tags(&tags) {
            if !applied.contains(&tag) {
                applied.push(tag);
            }
        }

        tracing::info!(
            session_id = %self.id,
            question_id = %question_id,
            tags = applied.len(),
            "Free text interpreted"
        );

        self.apply_free_text(&question_id, applied)
    }

    /// Moves past a free-text prompt when no interpreter is available
    ///
    /// Recorded the same way as free text that yielded no tags.
    pub fn skip_free_text(&mut self) -> Step {
        if self.phase == SessionPhase::Terminated {
            return Step::Results(self.rank());
        }

        let question_id = self.free_text_question();
        tracing::info!(session_id = %self.id, question_id = %question_id, "Free text skipped");

        self.apply_free_text(&question_id, Vec::new())
    }

    /// Asks the generator for one extra question and presents it
    pub async fn resolve_external_question(
        &mut self,
        generator: &dyn ExternalQuestionGenerator,
    ) -> Step {
        if self.phase != SessionPhase::AwaitingExternalQuestion {
            return self.fall_through(AppError::InvalidArgument(
                "No external question is pending".to_string(),
            ));
        }

        let profile = self.profile();
        let top_candidates: Vec<String> = self
            .rank()
            .into_iter()
            .take(self.config.top_candidates)
            .map(|item| item.id)
            .collect();

        let mut node = match generator.generate(&profile, &top_candidates).await {
            Ok(node) => node,
            Err(e) => {
                tracing::warn!(
                    session_id = %self.id,
                    collaborator = generator.name(),
                    error = %e,
                    "External question generation failed"
                );
                return self.show_results();
            }
        };

        if node.answers.is_empty() || self.lookup(&node.id).is_some() {
            return self.fall_through(AppError::Collaborator(format!(
                "Generated question '{}' is unusable",
                node.id
            )));
        }

        node.parent_answer_id = None;
        node.guard = None;
        if node.topic.is_none() {
            node.topic = self.favored_topic.clone();
        }

        let question_id = node.id.clone();
        tracing::info!(session_id = %self.id, question_id = %question_id, "External question added");
        self.transient.push(node);
        self.present(&question_id)
    }

    /// Reverses the most recent answer and re-presents its question
    ///
    /// Bandit counters are left alone. With nothing to undo the session
    /// goes back to `Start`.
    pub fn undo(&mut self) -> Step {
        if self.phase == SessionPhase::Terminated {
            return Step::Results(self.rank());
        }

        let Some(question_id) = self.visited.pop() else {
            self.phase = SessionPhase::Start;
            self.current = None;
            return Step::Start;
        };

        if let Some(position) = self
            .answers
            .iter()
            .rposition(|a| a.question_id == question_id)
        {
            let record = self.answers.remove(position);
            for tag in &record.tags {
                self.interests.decrement(tag);
            }
        }

        tracing::info!(session_id = %self.id, question_id = %question_id, "Answer undone");

        if question_id == FREE_TEXT_QUESTION_ID {
            self.phase = SessionPhase::AwaitingFreeText;
            self.current = None;
            return Step::FreeText { question_id };
        }

        self.present(&question_id)
    }

    /// Stops asking and ranks with what is known so far
    pub fn early_exit(&mut self) -> Step {
        if self.phase == SessionPhase::Terminated {
            return Step::Results(self.rank());
        }
        self.show_results()
    }

    /// Ends the session. Later calls only ever return results.
    pub fn terminate(&mut self) {
        tracing::info!(session_id = %self.id, answers = self.answers.len(), "Session terminated");
        self.phase = SessionPhase::Terminated;
        self.current = None;
    }

    /// Current ranking without changing state
    pub fn rank(&self) -> Vec<ScoredItem> {
        self.scorer
            .score_all(&self.snapshot, &self.interests, &self.filters)
    }

    pub fn profile(&self) -> SessionProfile {
        SessionProfile {
            filters: self.filters.clone(),
            interests: self.interests.clone(),
            answered_tags: self.answered_tags(),
            favored_topic: self.favored_topic.clone(),
        }
    }

    /// Filters and answer history, enough to rebuild the ranking elsewhere
    pub fn shared_state(&self, product_id: Option<String>) -> SharedState {
        SharedState {
            filters: self.filters.clone(),
            answers: self.answers.clone(),
            product_id,
        }
    }

    /// Rebuilds a session from a shared state payload and shows results
    ///
    /// Interests are recomputed from the answer history alone. The bandit
    /// and the visited history are not restored. A malformed payload resets
    /// the session to `Start`.
    pub fn rehydrate(&mut self, raw_json: &str) -> AppResult<Step> {
        let state = match Self::parse_shared_state(raw_json) {
            Ok(state) => state,
            Err(e) => {
                tracing::warn!(session_id = %self.id, error = %e, "Rejected shared state");
                self.reset();
                return Err(e);
            }
        };

        self.reset();
        self.filters = state.filters;
        for answer in state.answers {
            let tags = interest_tags(&answer.tags);
            for tag in &tags {
                self.interests.increment(tag);
            }
            self.answers.push(AnswerRecord { tags, ..answer });
        }

        tracing::info!(
            session_id = %self.id,
            answers = self.answers.len(),
            interests = self.interests.len(),
            "Session rehydrated"
        );

        Ok(self.show_results())
    }

    fn parse_shared_state(raw_json: &str) -> AppResult<SharedState> {
        let state: SharedState = serde_json::from_str(raw_json)
            .map_err(|e| AppError::MalformedSharedState(e.to_string()))?;

        if let Some(answer) = state
            .answers
            .iter()
            .find(|a| a.question_id.is_empty() || a.answer_id.is_empty())
        {
            return Err(AppError::MalformedSharedState(format!(
                "Answer entry with empty id: {:?}",
                answer
            )));
        }

        Ok(state)
    }

    fn reset(&mut self) {
        self.phase = SessionPhase::Start;
        self.filters = Filters::default();
        self.interests = InterestWeights::new();
        self.answers.clear();
        self.visited.clear();
        self.transient.clear();
        self.current = None;
        self.favored_topic = None;
        self.bandit = InterestBandit::default();
    }

    fn free_text_question(&self) -> String {
        self.current
            .clone()
            .unwrap_or_else(|| FREE_TEXT_QUESTION_ID.to_string())
    }

    fn apply_free_text(&mut self, question_id: &str, tags: Vec<String>) -> Step {
        self.record(question_id, FREE_TEXT_ANSWER_ID, tags);
        if let Some(topic) = self.topic_of(question_id) {
            self.bandit.update(&topic, Reward::Success);
        }

        self.advance(None)
    }

    fn record(&mut self, question_id: &str, answer_id: &str, tags: Vec<String>) {
        for tag in &tags {
            self.interests.increment(tag);
        }
        self.answers.push(AnswerRecord {
            question_id: question_id.to_string(),
            answer_id: answer_id.to_string(),
            tags,
        });
        self.visited.push(question_id.to_string());
    }

    /// Distinct questions answered so far
    fn questions_answered(&self) -> usize {
        let mut seen: Vec<&str> = Vec::new();
        for answer in &self.answers {
            if !seen.contains(&answer.question_id.as_str()) {
                seen.push(&answer.question_id);
            }
        }
        seen.len()
    }

    fn answered_tags(&self) -> Vec<String> {
        let mut tags: Vec<String> = Vec::new();
        for tag in self.answers.iter().flat_map(|a| a.tags.iter()) {
            if !tags.contains(tag) {
                tags.push(tag.clone());
            }
        }
        tags
    }

    fn lookup(&self, question_id: &str) -> Option<(QuestionNode, Option<String>)> {
        if let Some(node) = self.snapshot.graph.get(question_id) {
            let topic = self.snapshot.graph.topic_of(question_id).map(str::to_string);
            return Some((node.clone(), topic));
        }
        self.transient
            .iter()
            .find(|n| n.id == question_id)
            .map(|n| (n.clone(), n.topic.clone()))
    }

    fn topic_of(&self, question_id: &str) -> Option<String> {
        self.lookup(question_id).and_then(|(_, topic)| topic)
    }

    fn candidates(&self) -> Vec<Candidate<'_>> {
        let graph = &self.snapshot.graph;
        graph
            .nodes()
            .iter()
            .map(|node| Candidate {
                node,
                topic: graph.topic_of(&node.id),
            })
            .chain(self.transient.iter().map(|node| Candidate {
                node,
                topic: node.topic.as_deref(),
            }))
            .collect()
    }

    fn select_next(&mut self, parent: Option<&str>) -> Option<String> {
        self.favored_topic = self.bandit.select_arm(&mut self.rng).map(str::to_string);

        let candidates = self.candidates();
        self.selector
            .select(
                &candidates,
                parent,
                &self.filters,
                &self.visited,
                self.favored_topic.as_deref(),
            )
            .map(|c| c.node.id.clone())
    }

    /// Follow-ups of `parent` first, then root questions, then an external
    /// question when the answer count is inside the window, then results.
    fn advance(&mut self, parent: Option<&str>) -> Step {
        let answered = self.questions_answered();
        if answered >= self.config.max_questions {
            tracing::info!(session_id = %self.id, answered, "Question limit reached");
            return self.show_results();
        }

        let next = match parent {
            Some(parent) => self
                .select_next(Some(parent))
                .or_else(|| self.select_next(None)),
            None => self.select_next(None),
        };
        if let Some(question_id) = next {
            return self.present(&question_id);
        }

        if self.config.external_questions && answered >= self.config.min_questions {
            tracing::info!(session_id = %self.id, answered, "Question graph exhausted, requesting external question");
            self.phase = SessionPhase::AwaitingExternalQuestion;
            self.current = None;
            return Step::LoadingExternal;
        }

        self.show_results()
    }

    fn present(&mut self, question_id: &str) -> Step {
        let Some((node, topic)) = self.lookup(question_id) else {
            return self.fall_through(AppError::Lookup(format!(
                "Unknown question '{}'",
                question_id
            )));
        };

        let presented = selector::present(&node, topic.as_deref(), &self.filters, &mut self.rng);
        self.current = Some(node.id);
        self.phase = SessionPhase::AwaitingAnswer;
        Step::Question(presented)
    }

    fn show_results(&mut self) -> Step {
        self.phase = SessionPhase::Results;
        self.current = None;
        let ranked = self.rank();
        tracing::info!(
            session_id = %self.id,
            results = ranked.len(),
            answers = self.answers.len(),
            "Results ready"
        );
        Step::Results(ranked)
    }

    fn fall_through(&mut self, error: AppError) -> Step {
        if error.is_recoverable() {
            tracing::warn!(session_id = %self.id, error = %error, "Falling through to results");
        } else {
            tracing::error!(session_id = %self.id, error = %error, "Unexpected error, showing results");
        }
        self.show_results()
    }
}
