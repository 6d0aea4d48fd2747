mod claude;
mod dispatcher;
mod gemini;
mod prompt;
mod request;
mod template;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::GenerationMethod;

pub use claude::ClaudeProvider;
pub use dispatcher::{Dispatcher, GenerationOutcome, TierStatus};
pub use gemini::GeminiProvider;
pub use prompt::story_prompt;
pub use request::GenerationRequest;
pub use template::{TemplateGenerator, TemplateStrategy, TEMPLATE_MODEL};

/// One generation tier.
#[async_trait]
pub trait GenerationStrategy: Send + Sync {
    fn method(&self) -> GenerationMethod;

    fn model(&self) -> &str;

    fn is_available(&self) -> bool {
        true
    }

    async fn attempt(&self, request: &GenerationRequest) -> Result<String>;
}
