use std::collections::HashMap;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    models::{AnswerRecord, Filters, InterestWeights, SharedState},
    services::{
        feedback::{Flag, Rating},
        Session, SessionPhase, Step,
    },
};

use super::AppState;

// Request/Response types

#[derive(Debug, Deserialize)]
pub struct CreateSessionRequest {
    #[serde(default)]
    pub filters: Filters,
    #[serde(default)]
    pub seed_interests: Option<HashMap<String, u32>>,
    /// Fixes the session's random choices
    #[serde(default)]
    pub seed: Option<u64>,
}

#[derive(Debug, Serialize)]
pub struct SessionStepResponse {
    pub session_id: Uuid,
    pub step: Step,
}

#[derive(Debug, Deserialize)]
pub struct AnswerRequest {
    pub question_id: String,
    pub answer_id: String,
}

#[derive(Debug, Deserialize)]
pub struct FreeTextRequest {
    pub text: String,
}

#[derive(Debug, Serialize)]
pub struct SessionSummary {
    pub session_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub phase: SessionPhase,
    pub filters: Filters,
    pub interests: InterestWeights,
    pub answers: Vec<AnswerRecord>,
    pub current_question: Option<String>,
}

impl From<&Session> for SessionSummary {
    fn from(session: &Session) -> Self {
        Self {
            session_id: session.id(),
            created_at: session.created_at(),
            phase: session.phase(),
            filters: session.filters().clone(),
            interests: session.interests().clone(),
            answers: session.answers().to_vec(),
            current_question: session.current_question().map(str::to_string),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateShareRequest {
    pub session_id: Uuid,
    #[serde(default)]
    pub product_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ShareResponse {
    pub share_id: Uuid,
}

/// A shared result opened as a new session
#[derive(Debug, Serialize)]
pub struct SharedResultResponse {
    pub session_id: Uuid,
    /// Item the sharer picked out, if any
    pub product_id: Option<String>,
    pub step: Step,
}

#[derive(Debug, Deserialize)]
pub struct RatingRequest {
    pub product_id: String,
    pub rating: f64,
}

#[derive(Debug, Deserialize)]
pub struct FlagRequest {
    pub product_id: String,
    pub reason: String,
    #[serde(default)]
    pub quiz_answers: Option<Value>,
}

// Helpers

/// Strips `<...>` markup, trims and caps free text at `max_chars` characters
pub fn sanitize_free_text(raw: &str, max_chars: usize) -> AppResult<String> {
    let mut stripped = String::with_capacity(raw.len());
    let mut in_tag = false;
    for c in raw.chars() {
        match c {
            '<' => in_tag = true,
            '>' if in_tag => in_tag = false,
            _ if !in_tag => stripped.push(c),
            _ => {}
        }
    }

    let capped: String = stripped.trim().chars().take(max_chars).collect();
    let capped = capped.trim_end().to_string();
    if capped.is_empty() {
        return Err(AppError::InvalidArgument(
            "Free text must not be empty".to_string(),
        ));
    }

    Ok(capped)
}

fn known_product(state: &AppState, product_id: &str) -> AppResult<()> {
    state
        .snapshot
        .catalog
        .get(product_id)
        .map(|_| ())
        .ok_or_else(|| AppError::NotFound(format!("Product {} not found", product_id)))
}

/// Rehydrates a stored share into a new session
async fn open_shared(state: &AppState, shared: SharedState) -> AppResult<SharedResultResponse> {
    let raw = serde_json::to_string(&shared)
        .map_err(|e| AppError::Internal(format!("Failed to encode shared state: {}", e)))?;

    let mut session = state.new_session(None);
    let step = session.rehydrate(&raw)?;
    let session_id = state.insert(session).await;

    Ok(SharedResultResponse {
        session_id,
        product_id: shared.product_id,
        step,
    })
}

/// Resolves a pending external question right away when a generator exists
async fn drive(state: &AppState, session: &mut Session, step: Step) -> Step {
    match (&step, &state.generator) {
        (Step::LoadingExternal, Some(generator)) => {
            session.resolve_external_question(generator.as_ref()).await
        }
        _ => step,
    }
}

// Handlers

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    (
        StatusCode::OK,
        Json(json!({
            "status": "healthy",
            "items": state.snapshot.catalog.len(),
            "questions": state.snapshot.graph.nodes().len(),
        })),
    )
}

/// Starts a new quiz session
pub async fn create_session(
    State(state): State<AppState>,
    Json(request): Json<CreateSessionRequest>,
) -> AppResult<(StatusCode, Json<SessionStepResponse>)> {
    let mut session = state.new_session(request.seed);
    let step = session.start(
        request.filters,
        request.seed_interests.map(InterestWeights::from),
    )?;
    let step = drive(&state, &mut session, step).await;

    let session_id = state.insert(session).await;

    Ok((StatusCode::CREATED, Json(SessionStepResponse { session_id, step })))
}

/// Returns the current state of a session
pub async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<SessionSummary>> {
    let session = state.session(id).await?;
    let session = session.lock().await;
    Ok(Json(SessionSummary::from(&*session)))
}

/// Terminates and forgets a session
pub async fn delete_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    let session = state.remove(id).await?;
    session.lock().await.terminate();
    Ok(StatusCode::NO_CONTENT)
}

pub async fn answer(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<AnswerRequest>,
) -> AppResult<Json<Step>> {
    let session = state.session(id).await?;
    let mut session = session.lock().await;

    let step = session.answer(&request.question_id, &request.answer_id);
    let step = drive(&state, &mut session, step).await;

    Ok(Json(step))
}

pub async fn free_text(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<FreeTextRequest>,
) -> AppResult<Json<Step>> {
    let text = sanitize_free_text(&request.text, state.free_text_max_chars)?;

    let session = state.session(id).await?;
    let mut session = session.lock().await;

    // Without an interpreter the text is dropped and the quiz moves on
    let step = match &state.interpreter {
        Some(interpreter) => session.free_text(&text, interpreter.as_ref()).await,
        None => session.skip_free_text(),
    };
    let step = drive(&state, &mut session, step).await;

    Ok(Json(step))
}

pub async fn undo(State(state): State<AppState>, Path(id): Path<Uuid>) -> AppResult<Json<Step>> {
    let session = state.session(id).await?;
    let step = session.lock().await.undo();
    Ok(Json(step))
}

/// Ends the quiz early and returns the ranking
pub async fn finish(State(state): State<AppState>, Path(id): Path<Uuid>) -> AppResult<Json<Step>> {
    let session = state.session(id).await?;
    let step = session.lock().await.early_exit();
    Ok(Json(step))
}

/// Creates a session from a shared state payload
pub async fn rehydrate_session(
    State(state): State<AppState>,
    body: String,
) -> AppResult<(StatusCode, Json<SessionStepResponse>)> {
    let mut session = state.new_session(None);
    let step = session.rehydrate(&body)?;
    let session_id = state.insert(session).await;

    Ok((StatusCode::CREATED, Json(SessionStepResponse { session_id, step })))
}

/// Stores a session's shared state and returns a share id
pub async fn create_share(
    State(state): State<AppState>,
    Json(request): Json<CreateShareRequest>,
) -> AppResult<(StatusCode, Json<ShareResponse>)> {
    let shares = state
        .shares
        .as_ref()
        .ok_or_else(|| AppError::Unavailable("Sharing is not configured".to_string()))?;

    let shared = {
        let session = state.session(request.session_id).await?;
        let session = session.lock().await;
        session.shared_state(request.product_id)
    };
    let share_id = shares.create(&shared).await?;

    Ok((StatusCode::CREATED, Json(ShareResponse { share_id })))
}

/// Opens a shared result as a new session
pub async fn get_share(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<SharedResultResponse>> {
    let shares = state
        .shares
        .as_ref()
        .ok_or_else(|| AppError::Unavailable("Sharing is not configured".to_string()))?;

    let shared = shares.load(id).await?;
    let response = open_shared(&state, shared).await?;

    Ok(Json(response))
}

/// Records a star rating for a recommended item
pub async fn submit_rating(
    State(state): State<AppState>,
    Json(request): Json<RatingRequest>,
) -> AppResult<(StatusCode, Json<Value>)> {
    let rating = Rating::new(&request.product_id, request.rating)?;
    known_product(&state, &rating.product_id)?;

    let feedback = state
        .feedback
        .as_ref()
        .ok_or_else(|| AppError::Unavailable("Feedback is not configured".to_string()))?;
    feedback.submit_rating(&rating).await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({ "message": "Rating submitted" })),
    ))
}

/// Reports a recommendation that missed
pub async fn submit_flag(
    State(state): State<AppState>,
    Json(request): Json<FlagRequest>,
) -> AppResult<(StatusCode, Json<Value>)> {
    let flag = Flag::new(&request.product_id, &request.reason, request.quiz_answers)?;
    known_product(&state, &flag.product_id)?;

    let feedback = state
        .feedback
        .as_ref()
        .ok_or_else(|| AppError::Unavailable("Feedback is not configured".to_string()))?;
    feedback.submit_flag(&flag).await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({ "message": "Problem reported" })),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::services::{catalog::fixtures::snapshot, EngineConfig};

    fn state() -> AppState {
        AppState::new(Arc::new(snapshot()), EngineConfig::default())
    }

    #[tokio::test]
    async fn test_open_shared_keeps_product() {
        let state = state();
        let shared = SharedState {
            filters: Filters::default(),
            answers: vec![AnswerRecord {
                question_id: "q_gaming".to_string(),
                answer_id: "a_gaming_yes".to_string(),
                tags: vec!["gaming".to_string()],
            }],
            product_id: Some("headset".to_string()),
        };

        let response = open_shared(&state, shared).await.unwrap();

        assert_eq!(response.product_id.as_deref(), Some("headset"));
        assert!(matches!(response.step, Step::Results(_)));
        assert!(state.session(response.session_id).await.is_ok());

        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["product_id"], "headset");
    }

    #[test]
    fn test_known_product() {
        let state = state();
        assert!(known_product(&state, "ball").is_ok());
        assert!(matches!(
            known_product(&state, "missing"),
            Err(AppError::NotFound(_))
        ));
    }

    #[test]
    fn test_sanitize_strips_markup() {
        let text = sanitize_free_text("  <b>Han</b> elsker <script>x</script>fodbold ", 250).unwrap();
        assert_eq!(text, "Han elsker xfodbold");
    }

    #[test]
    fn test_sanitize_caps_length() {
        let long = "æ".repeat(300);
        let text = sanitize_free_text(&long, 250).unwrap();
        assert_eq!(text.chars().count(), 250);
    }

    #[test]
    fn test_sanitize_rejects_empty() {
        assert!(matches!(
            sanitize_free_text("   ", 250),
            Err(AppError::InvalidArgument(_))
        ));
        assert!(matches!(
            sanitize_free_text("<br/>", 250),
            Err(AppError::InvalidArgument(_))
        ));
    }
}
