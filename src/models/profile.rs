use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

/// Session filters chosen before the quiz starts
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Filters {
    #[serde(default)]
    pub gender: Option<String>,
    #[serde(default)]
    pub age: Option<String>,
    /// Budget tier ("billig", "mellem", "dyr")
    #[serde(default)]
    pub budget: Option<String>,
}

impl Filters {
    /// Looks up a filter by the name used in question guards
    pub fn get(&self, key: &str) -> Option<&str> {
        match key {
            "gender" => self.gender.as_deref(),
            "age" => self.age.as_deref(),
            "budget" => self.budget.as_deref(),
            _ => None,
        }
    }
}

/// Sparse tag -> strength map. Tags never hold a zero weight.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct InterestWeights(BTreeMap<String, u32>);

impl InterestWeights {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, tag: &str) -> u32 {
        self.0.get(tag).copied().unwrap_or(0)
    }

    pub fn increment(&mut self, tag: &str) {
        *self.0.entry(tag.to_string()).or_insert(0) += 1;
    }

    /// Decrements a tag, removing it once it reaches zero
    pub fn decrement(&mut self, tag: &str) {
        if let Some(weight) = self.0.get_mut(tag) {
            *weight = weight.saturating_sub(1);
            if *weight == 0 {
                self.0.remove(tag);
            }
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &u32)> {
        self.0.iter()
    }

    pub fn tags(&self) -> Vec<String> {
        self.0.keys().cloned().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

impl From<HashMap<String, u32>> for InterestWeights {
    fn from(seed: HashMap<String, u32>) -> Self {
        Self(seed.into_iter().filter(|(_, w)| *w > 0).collect())
    }
}

impl FromIterator<(String, u32)> for InterestWeights {
    fn from_iter<I: IntoIterator<Item = (String, u32)>>(iter: I) -> Self {
        Self(iter.into_iter().filter(|(_, w)| *w > 0).collect())
    }
}

/// One answered question. `tags` are exactly the interest tags that were applied.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AnswerRecord {
    pub question_id: String,
    pub answer_id: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Externally storable part of a session
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SharedState {
    pub filters: Filters,
    pub answers: Vec<AnswerRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_id: Option<String>,
}

/// What collaborators get to see about a session
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SessionProfile {
    pub filters: Filters,
    pub interests: InterestWeights,
    pub answered_tags: Vec<String>,
    pub favored_topic: Option<String>,
}
