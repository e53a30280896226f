use std::env;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use artisan_core::{Document, SiteGenerator, Theme};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, instrument};
use ureq::{Agent, AgentBuilder};

use crate::config::GeneratorConfig;

const CODE_INSTRUCTIONS: &str = r#"You are a web artisan. You write the HTML for every page of a multi-page website, plus one CSS file and one JavaScript file shared by all pages.

Rules:
- Always create an 'index.html' page for the main landing page.
- Create a separate page for every other page the request implies (for example "about", "contact" or "portfolio").
- Link pages with root-relative paths such as <a href="/about.html">.
- Each page's html is only the content of <body>; the shared CSS and JavaScript are added around it.
- The code must work without anything else being added.

Reply with a single JSON object and nothing else:
{
  "pages": [
    { "filename": "index.html", "html": "..." },
    { "filename": "about.html", "html": "..." }
  ],
  "css": "...",
  "js": "..."
}"#;

const THEME_INSTRUCTIONS: &str = r#"You choose a colour theme for a website from its description. Answer "dark" or "light".

- Developer-focused sites and sites with a modern, sleek look usually suit a dark theme.
- Professional, clean sites usually suit a light theme.

Reply with a single JSON object and nothing else: {"theme": "light"} or {"theme": "dark"}"#;

/// [`SiteGenerator`] backed by an OpenAI-compatible chat completions API.
#[derive(Clone)]
pub struct LlmSiteGenerator {
    agent: Agent,
    endpoint: String,
    model: String,
    api_key: Option<String>,
}

impl LlmSiteGenerator {
    pub fn from_config(config: &GeneratorConfig) -> Self {
        let api_key = env::var(&config.api_key_env)
            .ok()
            .filter(|key| !key.trim().is_empty());
        let agent = AgentBuilder::new()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build();
        Self {
            agent,
            endpoint: config.endpoint.clone(),
            model: config.model.clone(),
            api_key,
        }
    }

    fn complete(&self, instructions: &str, prompt: &str) -> Result<String> {
        let body = json!({
            "model": self.model,
            "response_format": { "type": "json_object" },
            "messages": [
                { "role": "system", "content": instructions },
                { "role": "user", "content": format!("Prompt: {prompt}") },
            ],
        });

        let mut request = self.agent.post(&self.endpoint);
        if let Some(key) = &self.api_key {
            request = request.set("Authorization", &format!("Bearer {key}"));
        }

        let response = match request.send_json(body) {
            Ok(response) => response,
            Err(ureq::Error::Status(code, response)) => {
                let detail = response.into_string().unwrap_or_default();
                bail!("model endpoint returned HTTP {code}: {detail}");
            }
            Err(ureq::Error::Transport(err)) => {
                return Err(anyhow!("transport error talking to {}: {err}", self.endpoint));
            }
        };

        let reply: ChatResponse = response
            .into_json()
            .context("model endpoint returned malformed JSON")?;
        reply
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| anyhow!("model reply had no content"))
    }

    async fn complete_blocking(&self, instructions: &'static str, prompt: &str) -> Result<String> {
        let this = self.clone();
        let prompt = prompt.to_owned();
        tokio::task::spawn_blocking(move || this.complete(instructions, &prompt))
            .await
            .context("generation worker panicked")?
    }
}

#[async_trait]
impl SiteGenerator for LlmSiteGenerator {
    #[instrument(skip_all)]
    async fn generate_code(&self, prompt: &str) -> Result<Document> {
        let content = self.complete_blocking(CODE_INSTRUCTIONS, prompt).await?;
        debug!(len = content.len(), "code reply received");
        parse_code_reply(&content)
    }

    #[instrument(skip_all)]
    async fn select_theme(&self, prompt: &str) -> Result<Theme> {
        let content = self.complete_blocking(THEME_INSTRUCTIONS, prompt).await?;
        parse_theme_reply(&content)
    }
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct ThemeReply {
    theme: Theme,
}

/// Models sometimes wrap JSON in a Markdown code fence.
fn strip_code_fence(content: &str) -> &str {
    let trimmed = content.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

pub fn parse_code_reply(content: &str) -> Result<Document> {
    serde_json::from_str(strip_code_fence(content)).context("model reply is not a valid site")
}

pub fn parse_theme_reply(content: &str) -> Result<Theme> {
    let reply: ThemeReply =
        serde_json::from_str(strip_code_fence(content)).context("model reply has no theme")?;
    Ok(reply.theme)
}
