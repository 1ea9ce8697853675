pub mod generator;
pub mod llm;
pub mod prompts;
pub mod scorer;

pub use generator::{LlmSqlGenerator, SqlGenerator, UnavailableGenerator};
pub use llm::LlmClient;
pub use scorer::{DisabledScorer, JudgeScorer, Scorer};
