use async_trait::async_trait;
use tracing::{error, info, instrument};

use crate::{Document, Theme};

pub const MIN_PROMPT_CHARS: usize = 10;

pub const GENERATION_FAILED_MESSAGE: &str =
    "Failed to generate website. The AI model might be busy. Please try again later.";

#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    #[error("Prompt must be at least {} characters long.", MIN_PROMPT_CHARS)]
    PromptTooShort,
    #[error("{}", GENERATION_FAILED_MESSAGE)]
    Failed(#[source] anyhow::Error),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Generation {
    pub theme: Theme,
    pub document: Document,
}

/// Remote service that writes websites from prompts.
#[async_trait]
pub trait SiteGenerator: Send + Sync {
    async fn generate_code(&self, prompt: &str) -> anyhow::Result<Document>;
    async fn select_theme(&self, prompt: &str) -> anyhow::Result<Theme>;
}

/// Runs the code and theme requests side by side. Either both succeed and the
/// caller gets a complete [`Generation`], or the whole call fails.
#[instrument(skip(generator, prompt), fields(prompt_chars = prompt.chars().count()))]
pub async fn generate_website<G>(generator: &G, prompt: &str) -> Result<Generation, GenerationError>
where
    G: SiteGenerator + ?Sized,
{
    if prompt.chars().count() < MIN_PROMPT_CHARS {
        return Err(GenerationError::PromptTooShort);
    }

    match tokio::try_join!(generator.select_theme(prompt), generator.generate_code(prompt)) {
        Ok((theme, document)) => {
            info!(%theme, pages = document.page_count(), "website generated");
            Ok(Generation { theme, document })
        }
        Err(err) => {
            error!(error = ?err, "error generating website");
            Err(GenerationError::Failed(err))
        }
    }
}
