use rand::Rng;
use rand_distr::{Beta, Distribution};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};

/// Observed outcome of probing a topic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Reward {
    /// A real answer (reward 1)
    Success,
    /// The escape hatch (reward 0)
    Failure,
}

impl Reward {
    pub fn from_escape_hatch(escape_hatch: bool) -> Self {
        if escape_hatch {
            Reward::Failure
        } else {
            Reward::Success
        }
    }
}

/// Beta-Bernoulli arm for one topic. The prior is Beta(1, 1).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BanditArm {
    pub topic: String,
    pub successes: u64,
    pub failures: u64,
}

impl BanditArm {
    fn new(topic: String) -> Self {
        Self {
            topic,
            successes: 0,
            failures: 0,
        }
    }

    pub fn alpha(&self) -> f64 {
        1.0 + self.successes as f64
    }

    pub fn beta(&self) -> f64 {
        1.0 + self.failures as f64
    }

    /// Posterior mean
    pub fn estimated_prob(&self) -> f64 {
        self.alpha() / (self.alpha() + self.beta())
    }

    fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        match Beta::new(self.alpha(), self.beta()) {
            Ok(dist) => dist.sample(rng),
            // alpha and beta are always >= 1
            Err(_) => self.estimated_prob(),
        }
    }
}

/// Thompson sampling over interest topics
///
/// Counters only ever grow; undoing an answer does not roll them back.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InterestBandit {
    arms: Vec<BanditArm>,
}

impl InterestBandit {
    /// Creates one arm per distinct topic, in the given order
    ///
    /// Fails with `InvalidArgument` when `require_topics` is set and no topic
    /// was supplied.
    pub fn initialize<I, S>(topics: I, require_topics: bool) -> AppResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut arms: Vec<BanditArm> = Vec::new();
        for topic in topics {
            let topic = topic.into();
            if !arms.iter().any(|a| a.topic == topic) {
                arms.push(BanditArm::new(topic));
            }
        }

        if arms.is_empty() && require_topics {
            return Err(AppError::InvalidArgument(
                "Topic-gated selection requires at least one topic".to_string(),
            ));
        }

        tracing::debug!(arms = arms.len(), "Interest bandit initialized");

        Ok(Self { arms })
    }

    /// Draws one posterior sample per arm and returns the topic with the
    /// highest draw. Ties go to the arm created first.
    pub fn select_arm<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<&str> {
        let mut best: Option<(&str, f64)> = None;

        for arm in &self.arms {
            let sample = arm.sample(rng);
            match best {
                Some((_, max)) if sample <= max => {}
                _ => best = Some((arm.topic.as_str(), sample)),
            }
        }

        best.map(|(topic, _)| topic)
    }

    /// Records a reward. Unknown topics are ignored.
    pub fn update(&mut self, topic: &str, reward: Reward) {
        let Some(arm) = self.arms.iter_mut().find(|a| a.topic == topic) else {
            tracing::debug!(topic = %topic, "Reward for unknown topic ignored");
            return;
        };

        match reward {
            Reward::Success => arm.successes += 1,
            Reward::Failure => arm.failures += 1,
        }
    }

    pub fn arm(&self, topic: &str) -> Option<&BanditArm> {
        self.arms.iter().find(|a| a.topic == topic)
    }

    pub fn arms(&self) -> &[BanditArm] {
        &self.arms
    }

    pub fn is_empty(&self) -> bool {
        self.arms.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};

    #[test]
    fn test_initialize_dedupes_topics() {
        let bandit = InterestBandit::initialize(vec!["sport", "musik", "sport"], false).unwrap();
        assert_eq!(bandit.arms().len(), 2);
        assert_eq!(bandit.arms()[0].topic, "sport");
        assert_eq!(bandit.arms()[0].alpha(), 1.0);
        assert_eq!(bandit.arms()[0].beta(), 1.0);
    }

    #[test]
    fn test_initialize_requires_topics_when_gated() {
        let result = InterestBandit::initialize(Vec::<String>::new(), true);
        assert!(matches!(result, Err(AppError::InvalidArgument(_))));

        let bandit = InterestBandit::initialize(Vec::<String>::new(), false).unwrap();
        assert!(bandit.is_empty());
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(bandit.select_arm(&mut rng), None);
    }

    #[test]
    fn test_update_counts() {
        let mut bandit = InterestBandit::initialize(vec!["sport"], false).unwrap();
        bandit.update("sport", Reward::Success);
        bandit.update("sport", Reward::Success);
        bandit.update("sport", Reward::Failure);

        let arm = bandit.arm("sport").unwrap();
        assert_eq!(arm.successes, 2);
        assert_eq!(arm.failures, 1);
        assert_eq!(arm.estimated_prob(), 3.0 / 5.0);
    }

    #[test]
    fn test_update_unknown_topic_is_noop() {
        let mut bandit = InterestBandit::initialize(vec!["sport"], false).unwrap();
        bandit.update("gaming", Reward::Success);
        assert_eq!(bandit.arm("sport").unwrap().successes, 0);
        assert!(bandit.arm("gaming").is_none());
    }

    #[test]
    fn test_reward_from_escape_hatch() {
        assert_eq!(Reward::from_escape_hatch(true), Reward::Failure);
        assert_eq!(Reward::from_escape_hatch(false), Reward::Success);
    }

    #[test]
    fn test_select_arm_favors_higher_success_ratio() {
        let mut bandit = InterestBandit::initialize(vec!["low", "high"], false).unwrap();
        for _ in 0..3 {
            bandit.update("low", Reward::Success);
            bandit.update("high", Reward::Success);
        }
        for _ in 0..6 {
            bandit.update("low", Reward::Failure);
            bandit.update("high", Reward::Success);
        }

        let mut rng = StdRng::seed_from_u64(42);
        let mut high = 0;
        let mut low = 0;
        for _ in 0..5_000 {
            match bandit.select_arm(&mut rng) {
                Some("high") => high += 1,
                Some("low") => low += 1,
                other => panic!("unexpected arm {:?}", other),
            }
        }

        assert!(high > low, "high={} low={}", high, low);
    }

    #[test]
    fn test_select_arm_explores_with_uniform_priors() {
        let bandit = InterestBandit::initialize(vec!["a", "b", "c"], false).unwrap();
        let mut rng = StdRng::seed_from_u64(7);
        let mut seen = std::collections::HashSet::new();
        for _ in 0..200 {
            if let Some(topic) = bandit.select_arm(&mut rng) {
                seen.insert(topic.to_string());
            }
        }
        assert_eq!(seen.len(), 3);
    }
}
