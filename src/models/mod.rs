mod item;
mod profile;
mod question;

pub use item::{Item, ItemContext, UNIVERSAL_GENDER};
pub use profile::{AnswerRecord, Filters, InterestWeights, SessionProfile, SharedState};
pub use question::{
    interest_tags, AnswerOption, PresentedQuestion, QuestionNode, ESCAPE_HATCH_TAG,
};
