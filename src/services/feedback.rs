use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{
    db::{Cache, CacheKey},
    error::{AppError, AppResult},
};

pub const MIN_RATING: u8 = 1;
pub const MAX_RATING: u8 = 5;

/// A 1-5 star rating for one recommended item
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Rating {
    pub product_id: String,
    pub rating: u8,
    pub created_at: DateTime<Utc>,
}

impl Rating {
    /// Validates the product id and that `rating` is a whole number in range
    pub fn new(product_id: &str, rating: f64) -> AppResult<Self> {
        let product_id = required("product_id", product_id)?;

        let in_range = rating.fract() == 0.0
            && rating >= MIN_RATING as f64
            && rating <= MAX_RATING as f64;
        if !in_range {
            return Err(AppError::InvalidArgument(format!(
                "Rating must be an integer between {} and {}",
                MIN_RATING, MAX_RATING
            )));
        }

        Ok(Self {
            product_id,
            rating: rating as u8,
            created_at: Utc::now(),
        })
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FlagStatus {
    Open,
}

/// A report that a recommendation was a bad fit
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Flag {
    pub product_id: String,
    pub reason: String,
    /// Quiz answers the user chose to attach, minus their name
    pub quiz_answers: Map<String, Value>,
    pub status: FlagStatus,
    pub created_at: DateTime<Utc>,
}

impl Flag {
    pub fn new(product_id: &str, reason: &str, quiz_answers: Option<Value>) -> AppResult<Self> {
        let product_id = required("product_id", product_id)?;
        let reason = required("reason", reason)?;

        let mut quiz_answers = match quiz_answers {
            None | Some(Value::Null) => Map::new(),
            Some(Value::Object(answers)) => answers,
            Some(_) => {
                return Err(AppError::InvalidArgument(
                    "quiz_answers must be an object".to_string(),
                ))
            }
        };
        quiz_answers.remove("name");

        Ok(Self {
            product_id,
            reason,
            quiz_answers,
            status: FlagStatus::Open,
            created_at: Utc::now(),
        })
    }
}

fn required(field: &str, value: &str) -> AppResult<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(AppError::InvalidArgument(format!(
            "{} must not be blank",
            field
        )));
    }
    Ok(value.to_string())
}

/// Appends ratings and flags to Redis lists
#[derive(Clone)]
pub struct FeedbackStore {
    cache: Cache,
}

impl FeedbackStore {
    pub fn new(cache: Cache) -> Self {
        Self { cache }
    }

    pub async fn submit_rating(&self, rating: &Rating) -> AppResult<()> {
        self.cache
            .push(&CacheKey::Ratings(rating.product_id.clone()), rating)
            .await?;

        tracing::info!(product_id = %rating.product_id, rating = rating.rating, "Rating stored");
        Ok(())
    }

    pub async fn submit_flag(&self, flag: &Flag) -> AppResult<()> {
        self.cache.push(&CacheKey::Flags, flag).await?;

        tracing::info!(product_id = %flag.product_id, "Flag stored");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_rating_accepts_whole_numbers_in_range() {
        let rating = Rating::new(" ball ", 5.0).unwrap();
        assert_eq!(rating.product_id, "ball");
        assert_eq!(rating.rating, 5);
        assert_eq!(Rating::new("ball", 1.0).unwrap().rating, 1);
    }

    #[test]
    fn test_rating_rejects_out_of_range_and_fractions() {
        for value in [0.0, 6.0, -1.0, 3.5, f64::NAN] {
            assert!(
                matches!(Rating::new("ball", value), Err(AppError::InvalidArgument(_))),
                "{} accepted",
                value
            );
        }
    }

    #[test]
    fn test_rating_requires_product() {
        assert!(matches!(
            Rating::new("   ", 4.0),
            Err(AppError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_flag_strips_name_from_answers() {
        let flag = Flag::new(
            "ball",
            " Forkert alder ",
            Some(json!({"name": "Mette", "gender": "kvinde"})),
        )
        .unwrap();

        assert_eq!(flag.reason, "Forkert alder");
        assert_eq!(flag.status, FlagStatus::Open);
        assert!(!flag.quiz_answers.contains_key("name"));
        assert_eq!(flag.quiz_answers["gender"], "kvinde");
    }

    #[test]
    fn test_flag_validation() {
        assert!(Flag::new("ball", "dyr", None).unwrap().quiz_answers.is_empty());
        assert!(matches!(
            Flag::new("ball", "", None),
            Err(AppError::InvalidArgument(_))
        ));
        assert!(matches!(
            Flag::new("", "dyr", None),
            Err(AppError::InvalidArgument(_))
        ));
        assert!(matches!(
            Flag::new("ball", "dyr", Some(json!(["a", "b"]))),
            Err(AppError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_flag_serializes_open_status() {
        let flag = Flag::new("ball", "dyr", None).unwrap();
        let json = serde_json::to_value(&flag).unwrap();
        assert_eq!(json["status"], "open");
    }
}
