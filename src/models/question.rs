use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::Filters;

/// Tag marking the "none of these fit" answer option
pub const ESCAPE_HATCH_TAG: &str = "freetext:true";

/// One selectable answer to a question
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnswerOption {
    #[serde(alias = "answer_id")]
    pub id: String,
    #[serde(alias = "answer_text")]
    pub text: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl AnswerOption {
    pub fn is_escape_hatch(&self) -> bool {
        self.tags.iter().any(|t| t == ESCAPE_HATCH_TAG)
    }

    /// Tags that count towards interest weights
    ///
    /// The escape-hatch sentinel and other namespaced tags (`kind:value`) are
    /// control markers, not interests.
    pub fn interest_tags(&self) -> Vec<String> {
        interest_tags(&self.tags)
    }
}

/// Filters a tag list down to plain interest tags
pub fn interest_tags(tags: &[String]) -> Vec<String> {
    tags.iter()
        .filter(|t| !t.contains(':'))
        .cloned()
        .collect()
}

/// A node in the branching question graph
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QuestionNode {
    #[serde(alias = "question_id")]
    pub id: String,
    /// Answer that leads to this question; `None` for root questions
    #[serde(default)]
    pub parent_answer_id: Option<String>,
    /// Context guard: filter name -> required value
    #[serde(default, alias = "context")]
    pub guard: Option<BTreeMap<String, String>>,
    /// Owning bandit topic. Inherited from the parent question when absent.
    #[serde(default)]
    pub topic: Option<String>,
    pub phrasings: Vec<String>,
    pub answers: Vec<AnswerOption>,
}

impl QuestionNode {
    pub fn option(&self, answer_id: &str) -> Option<&AnswerOption> {
        self.answers.iter().find(|a| a.id == answer_id)
    }

    /// Guardless nodes are always eligible, guarded nodes need an exact
    /// match on every named filter.
    pub fn guard_satisfied(&self, filters: &Filters) -> bool {
        match &self.guard {
            None => true,
            Some(guard) => guard
                .iter()
                .all(|(key, value)| filters.get(key) == Some(value.as_str())),
        }
    }
}

/// A question as shown to the user, with one phrasing picked and personalized
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PresentedQuestion {
    pub id: String,
    pub text: String,
    pub topic: Option<String>,
    pub answers: Vec<AnswerOption>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn guarded_node(guard: &[(&str, &str)]) -> QuestionNode {
        QuestionNode {
            id: "q1".to_string(),
            parent_answer_id: None,
            guard: Some(
                guard
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
            ),
            topic: None,
            phrasings: vec!["Hvad kan {{pronoun1}} lide?".to_string()],
            answers: vec![],
        }
    }

    #[test]
    fn test_guard_requires_every_filter() {
        let node = guarded_node(&[("gender", "mand"), ("age", "voksen")]);
        let mut filters = Filters {
            gender: Some("mand".to_string()),
            ..Filters::default()
        };
        assert!(!node.guard_satisfied(&filters));

        filters.age = Some("voksen".to_string());
        assert!(node.guard_satisfied(&filters));
    }

    #[test]
    fn test_guardless_node_always_eligible() {
        let mut node = guarded_node(&[]);
        node.guard = None;
        assert!(node.guard_satisfied(&Filters::default()));
    }

    #[test]
    fn test_interest_tags_drop_sentinel_and_namespaced() {
        let option = AnswerOption {
            id: "a1".to_string(),
            text: "Ingen af disse passer...".to_string(),
            tags: vec![
                ESCAPE_HATCH_TAG.to_string(),
                "sport".to_string(),
                "differentiator:budget".to_string(),
            ],
        };
        assert!(option.is_escape_hatch());
        assert_eq!(option.interest_tags(), vec!["sport".to_string()]);
    }

    #[test]
    fn test_question_aliases_deserialize() {
        let json = r#"{
            "question_id": "q_root",
            "parent_answer_id": null,
            "context": { "gender": "kvinde" },
            "phrasings": ["Er {{pronoun1}} sporty?"],
            "answers": [
                { "answer_id": "a_yes", "answer_text": "Ja", "tags": ["sport"] }
            ]
        }"#;
        let node: QuestionNode = serde_json::from_str(json).unwrap();
        assert_eq!(node.id, "q_root");
        assert_eq!(node.answers[0].id, "a_yes");
        assert_eq!(
            node.guard.unwrap().get("gender").map(String::as_str),
            Some("kvinde")
        );
    }
}
