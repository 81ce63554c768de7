pub mod intent;
pub mod rewrite;
pub mod routing;
pub mod synthesis;

use kaiwa_llm::ChatClient;

/// What every stage needs to issue its LLM call.
pub struct StageContext<'a> {
    pub llm: &'a dyn ChatClient,
    pub model: &'a str,
    pub max_tokens: u32,
}
