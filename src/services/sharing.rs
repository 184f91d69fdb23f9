use uuid::Uuid;

use crate::{
    db::{Cache, CacheKey},
    error::{AppError, AppResult},
    models::SharedState,
};

/// Stores shared session state in Redis under a random id
#[derive(Clone)]
pub struct ShareStore {
    cache: Cache,
    ttl_secs: u64,
}

impl ShareStore {
    pub fn new(cache: Cache, ttl_secs: u64) -> Self {
        Self { cache, ttl_secs }
    }

    /// Persists the state and returns its share id
    pub async fn create(&self, state: &SharedState) -> AppResult<Uuid> {
        validate(state)?;

        let share_id = Uuid::new_v4();
        self.cache
            .set(&CacheKey::Share(share_id.to_string()), state, self.ttl_secs)
            .await?;

        tracing::info!(
            share_id = %share_id,
            answers = state.answers.len(),
            "Share created"
        );

        Ok(share_id)
    }

    pub async fn load(&self, share_id: Uuid) -> AppResult<SharedState> {
        self.cache
            .get_from_cache(&CacheKey::Share(share_id.to_string()))
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Share {} not found or expired", share_id)))
    }
}

fn validate(state: &SharedState) -> AppResult<()> {
    match state.product_id.as_deref() {
        Some(product_id) if product_id.trim().is_empty() => Err(AppError::InvalidArgument(
            "product_id must not be blank".to_string(),
        )),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_redis_client;
    use crate::models::{AnswerRecord, Filters};

    fn state(product_id: Option<&str>) -> SharedState {
        SharedState {
            filters: Filters::default(),
            answers: vec![AnswerRecord {
                question_id: "q_sport".to_string(),
                answer_id: "a_sport_yes".to_string(),
                tags: vec!["sport".to_string()],
            }],
            product_id: product_id.map(str::to_string),
        }
    }

    #[test]
    fn test_validate_rejects_blank_product() {
        assert!(validate(&state(Some("ball"))).is_ok());
        assert!(validate(&state(None)).is_ok());
        assert!(matches!(
            validate(&state(Some("  "))),
            Err(AppError::InvalidArgument(_))
        ));
    }

    #[tokio::test]
    #[ignore = "requires a running Redis"]
    async fn test_create_then_load() {
        let redis_url =
            std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string());
        let client = create_redis_client(&redis_url).unwrap();
        let (cache, _handle) = Cache::new(client).await;
        let store = ShareStore::new(cache, 60);

        let shared = state(Some("ball"));
        let share_id = store.create(&shared).await.unwrap();
        assert_eq!(store.load(share_id).await.unwrap(), shared);

        let missing = store.load(Uuid::new_v4()).await;
        assert!(matches!(missing, Err(AppError::NotFound(_))));
    }
}
