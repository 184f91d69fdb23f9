use rand::{seq::IndexedRandom, Rng};
use serde::{Deserialize, Serialize};

use crate::models::{Filters, PresentedQuestion, QuestionNode};

/// Which eligible question wins when several qualify
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TopicPolicy {
    /// Questions of the bandit's favored topic first, then catalog order
    #[default]
    FavoredTopicFirst,
    /// Topic-less questions first, then the favored topic, then catalog order
    GenericFirst,
}

/// A question the selector may pick, with its resolved topic
#[derive(Debug, Clone, Copy)]
pub struct Candidate<'a> {
    pub node: &'a QuestionNode,
    pub topic: Option<&'a str>,
}

/// Finds the next question to ask
#[derive(Debug, Clone, Copy, Default)]
pub struct QuestionSelector {
    policy: TopicPolicy,
}

impl QuestionSelector {
    pub fn new(policy: TopicPolicy) -> Self {
        Self { policy }
    }

    /// Returns the first eligible candidate under the configured policy
    ///
    /// Eligible means: `parent_answer_id` equals `parent`, the context guard
    /// is satisfied by `filters`, and the id is not in `visited`. Candidates
    /// are considered in the order given.
    pub fn select<'a>(
        &self,
        candidates: &[Candidate<'a>],
        parent: Option<&str>,
        filters: &Filters,
        visited: &[String],
        favored_topic: Option<&str>,
    ) -> Option<Candidate<'a>> {
        let eligible: Vec<Candidate<'a>> = candidates
            .iter()
            .filter(|c| c.node.parent_answer_id.as_deref() == parent)
            .filter(|c| c.node.guard_satisfied(filters))
            .filter(|c| !visited.iter().any(|v| *v == c.node.id))
            .copied()
            .collect();

        let favored = || {
            favored_topic.and_then(|topic| eligible.iter().find(|c| c.topic == Some(topic)))
        };
        let generic = || eligible.iter().find(|c| c.topic.is_none());

        let chosen = match self.policy {
            TopicPolicy::FavoredTopicFirst => favored(),
            TopicPolicy::GenericFirst => generic().or_else(favored),
        };

        chosen.or_else(|| eligible.first()).copied()
    }
}

/// Subject, object and possessive forms for a recipient
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Pronouns {
    subject: &'static str,
    object: &'static str,
    possessive: &'static str,
}

fn pronouns_for(gender: Option<&str>) -> Pronouns {
    match gender {
        Some("mand") => Pronouns {
            subject: "han",
            object: "ham",
            possessive: "hans",
        },
        Some("kvinde") => Pronouns {
            subject: "hun",
            object: "hende",
            possessive: "hendes",
        },
        _ => Pronouns {
            subject: "de",
            object: "dem",
            possessive: "deres",
        },
    }
}

/// Replaces the pronoun placeholders for the session's gender filter
pub fn personalize(text: &str, gender: Option<&str>) -> String {
    let pronouns = pronouns_for(gender);
    text.replace("{{pronoun1}}", pronouns.subject)
        .replace("{{pronoun2}}", pronouns.object)
        .replace("{{pronoun3}}", pronouns.possessive)
}

/// Picks a phrasing at random and personalizes it. Nothing here is persisted.
pub fn present<R: Rng + ?Sized>(
    node: &QuestionNode,
    topic: Option<&str>,
    filters: &Filters,
    rng: &mut R,
) -> PresentedQuestion {
    let phrasing = node
        .phrasings
        .choose(rng)
        .map(String::as_str)
        .unwrap_or_default();

    PresentedQuestion {
        id: node.id.clone(),
        text: personalize(phrasing, filters.gender.as_deref()),
        topic: topic.map(str::to_string),
        answers: node.answers.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::catalog::fixtures::{guarded, node, option};
    use rand::{rngs::StdRng, SeedableRng};

    fn candidates<'a>(nodes: &'a [(QuestionNode, Option<&'static str>)]) -> Vec<Candidate<'a>> {
        nodes
            .iter()
            .map(|(node, topic)| Candidate {
                node,
                topic: *topic,
            })
            .collect()
    }

    fn roots() -> Vec<(QuestionNode, Option<&'static str>)> {
        vec![
            (node("q_generic", None, None, vec![]), None),
            (node("q_sport", None, Some("sport"), vec![]), Some("sport")),
            (node("q_gaming", None, Some("gaming"), vec![]), Some("gaming")),
        ]
    }

    #[test]
    fn test_favored_topic_first() {
        let nodes = roots();
        let selector = QuestionSelector::new(TopicPolicy::FavoredTopicFirst);
        let chosen = selector
            .select(&candidates(&nodes), None, &Filters::default(), &[], Some("gaming"))
            .unwrap();
        assert_eq!(chosen.node.id, "q_gaming");
    }

    #[test]
    fn test_generic_first() {
        let nodes = roots();
        let selector = QuestionSelector::new(TopicPolicy::GenericFirst);
        let chosen = selector
            .select(&candidates(&nodes), None, &Filters::default(), &[], Some("gaming"))
            .unwrap();
        assert_eq!(chosen.node.id, "q_generic");

        let visited = vec!["q_generic".to_string()];
        let chosen = selector
            .select(&candidates(&nodes), None, &Filters::default(), &visited, Some("gaming"))
            .unwrap();
        assert_eq!(chosen.node.id, "q_gaming");
    }

    #[test]
    fn test_catalog_order_when_favored_topic_exhausted() {
        let nodes = roots();
        let selector = QuestionSelector::default();
        let visited = vec!["q_gaming".to_string()];
        let chosen = selector
            .select(&candidates(&nodes), None, &Filters::default(), &visited, Some("gaming"))
            .unwrap();
        assert_eq!(chosen.node.id, "q_generic");
    }

    #[test]
    fn test_parent_answer_must_match() {
        let nodes = vec![
            (node("q_root", None, Some("sport"), vec![]), Some("sport")),
            (node("q_child", Some("a_yes"), None, vec![]), Some("sport")),
        ];
        let selector = QuestionSelector::default();
        let chosen = selector
            .select(&candidates(&nodes), Some("a_yes"), &Filters::default(), &[], None)
            .unwrap();
        assert_eq!(chosen.node.id, "q_child");

        let none = selector.select(&candidates(&nodes), Some("a_no"), &Filters::default(), &[], None);
        assert!(none.is_none());
    }

    #[test]
    fn test_context_guard_filters_candidates() {
        let nodes = vec![
            (
                guarded(node("q_women", None, None, vec![]), "gender", "kvinde"),
                None,
            ),
            (node("q_any", None, None, vec![]), None),
        ];
        let selector = QuestionSelector::default();
        let filters = Filters {
            gender: Some("mand".to_string()),
            ..Filters::default()
        };
        let chosen = selector
            .select(&candidates(&nodes), None, &filters, &[], None)
            .unwrap();
        assert_eq!(chosen.node.id, "q_any");
    }

    #[test]
    fn test_exhausted_returns_none() {
        let nodes = roots();
        let visited: Vec<String> = nodes.iter().map(|(n, _)| n.id.clone()).collect();
        let selector = QuestionSelector::default();
        assert!(selector
            .select(&candidates(&nodes), None, &Filters::default(), &visited, None)
            .is_none());
    }

    #[test]
    fn test_personalize_pronouns() {
        let text = "Hvad laver {{pronoun1}}? Giv {{pronoun2}} noget til {{pronoun3}} hobby.";
        assert_eq!(
            personalize(text, Some("kvinde")),
            "Hvad laver hun? Giv hende noget til hendes hobby."
        );
        assert_eq!(
            personalize(text, Some("mand")),
            "Hvad laver han? Giv ham noget til hans hobby."
        );
        assert_eq!(
            personalize(text, Some("ukendt")),
            "Hvad laver de? Giv dem noget til deres hobby."
        );
        assert_eq!(
            personalize(text, None),
            "Hvad laver de? Giv dem noget til deres hobby."
        );
    }

    #[test]
    fn test_present_picks_a_phrasing() {
        let mut question = node("q1", None, Some("sport"), vec![option("a1", &["sport"])]);
        question.phrasings = vec![
            "Er {{pronoun1}} aktiv?".to_string(),
            "Dyrker {{pronoun1}} sport?".to_string(),
        ];
        let filters = Filters {
            gender: Some("mand".to_string()),
            ..Filters::default()
        };
        let mut rng = StdRng::seed_from_u64(3);

        let presented = present(&question, Some("sport"), &filters, &mut rng);
        assert!(presented.text == "Er han aktiv?" || presented.text == "Dyrker han sport?");
        assert_eq!(presented.topic.as_deref(), Some("sport"));
        assert_eq!(presented.answers.len(), 1);
    }
}
