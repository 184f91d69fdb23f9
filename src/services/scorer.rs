use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::{
    models::{Filters, InterestWeights, Item},
    services::{catalog::Snapshot, vector},
};

/// Default weight of term overlap in the final score
pub const DEFAULT_ALPHA: f64 = 0.6;

/// Budget tiers and their price ceilings, cheapest first. `None` = no ceiling.
pub const BUDGET_TIERS: &[(&str, Option<f64>)] = &[
    ("billig", Some(200.0)),
    ("mellem", Some(500.0)),
    ("dyr", None),
];

/// Price ceiling of a budget tier; unknown tiers have none
pub fn budget_ceiling(tier: &str) -> Option<f64> {
    BUDGET_TIERS
        .iter()
        .find(|(name, _)| *name == tier)
        .and_then(|(_, ceiling)| *ceiling)
}

/// An item that survived the hard filters, with its score breakdown
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScoredItem {
    pub id: String,
    pub name: String,
    pub description: String,
    pub url: Option<String>,
    pub price: f64,
    pub score: f64,
    pub term_score: f64,
    pub semantic_score: f64,
}

/// Ranks catalog items by tag overlap and embedding similarity
///
/// `score = alpha * term_overlap + (1 - alpha) * cosine(interest_vector, item)`
#[derive(Debug, Clone, Copy)]
pub struct HybridScorer {
    alpha: f64,
}

impl Default for HybridScorer {
    fn default() -> Self {
        Self::new(DEFAULT_ALPHA)
    }
}

impl HybridScorer {
    pub fn new(alpha: f64) -> Self {
        Self {
            alpha: alpha.clamp(0.0, 1.0),
        }
    }

    /// Hard filters: gender, age range and budget ceiling
    pub fn passes_filters(item: &Item, filters: &Filters) -> bool {
        if let Some(gender) = filters.gender.as_deref() {
            if !item.context.fits_gender(gender) {
                return false;
            }
        }

        if let Some(age) = filters.age.as_deref() {
            if !item.context.fits_age(age) {
                return false;
            }
        }

        if let Some(ceiling) = filters.budget.as_deref().and_then(budget_ceiling) {
            if item.context.price > ceiling {
                return false;
            }
        }

        true
    }

    /// Sum of weight * IDF over tags shared by the item and the interests
    pub fn term_overlap(item: &Item, interests: &InterestWeights, snapshot: &Snapshot) -> f64 {
        interests
            .iter()
            .filter(|(tag, _)| item.has_tag(tag))
            .map(|(tag, weight)| *weight as f64 * snapshot.catalog.idf(tag))
            .sum()
    }

    /// Weight-scaled average of the embeddings of the weighted tags
    pub fn interest_vector(
        interests: &InterestWeights,
        tag_embeddings: &HashMap<String, Vec<f32>>,
    ) -> Vec<f32> {
        vector::weighted_average(interests.iter().filter_map(|(tag, weight)| {
            tag_embeddings
                .get(tag)
                .map(|embedding| (embedding.as_slice(), *weight as f32))
        }))
    }

    /// Scores every item that passes the hard filters, best first
    ///
    /// The sort is stable, so equal scores keep catalog order. Nothing is
    /// dropped beyond the hard filters.
    pub fn score_all(
        &self,
        snapshot: &Snapshot,
        interests: &InterestWeights,
        filters: &Filters,
    ) -> Vec<ScoredItem> {
        let interest_vector = Self::interest_vector(interests, &snapshot.tag_embeddings);

        let mut scored: Vec<ScoredItem> = snapshot
            .catalog
            .items()
            .iter()
            .filter(|item| Self::passes_filters(item, filters))
            .map(|item| {
                let term_score = Self::term_overlap(item, interests, snapshot);
                let semantic_score =
                    vector::cosine_similarity(&interest_vector, &item.embedding) as f64;
                let score = self.alpha * term_score + (1.0 - self.alpha) * semantic_score;

                ScoredItem {
                    id: item.id.clone(),
                    name: item.name.clone(),
                    description: item.description.clone(),
                    url: item.url.clone(),
                    price: item.context.price,
                    score,
                    term_score,
                    semantic_score,
                }
            })
            .collect();

        scored.sort_by(|a, b| b.score.total_cmp(&a.score));

        tracing::debug!(
            catalog = snapshot.catalog.len(),
            eligible = scored.len(),
            interests = interests.len(),
            top = scored.first().map(|s| s.id.as_str()),
            "Items scored"
        );

        scored
    }
}
