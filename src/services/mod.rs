pub mod bandit;
pub mod catalog;
pub mod feedback;
pub mod providers;
pub mod scorer;
pub mod selector;
pub mod session;
pub mod sharing;
pub mod vector;

pub use bandit::InterestBandit;
pub use catalog::{JsonFileProvider, Snapshot};
pub use feedback::FeedbackStore;
pub use scorer::{HybridScorer, ScoredItem};
pub use selector::{QuestionSelector, TopicPolicy};
pub use session::{EngineConfig, Session, SessionPhase, Step};
pub use sharing::ShareStore;
