use crate::rss_utils::text::first_sentence;
use crate::token_budget::{Prompt, TokenBudgeter};
use crate::traits::{ChatMessage, CompletionRequest, TextGenerator};
use crate::types::{Enrichment, EnrichmentStrategy, GeneratorConfig, IngestError, Insights, Result};
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

/// Summary used when the service answered but the answer was unusable.
pub const PLACEHOLDER_SUMMARY: &str = "No summary generated.";

/// Summary used when the service could not be reached and there is no
/// description to fall back on.
pub const NO_SUMMARY: &str = "No summary available";

const SYSTEM_PROMPT: &str = "You are a helpful assistant.";

/// What the generator gets to work with for one entry.
#[derive(Debug, Clone, Copy)]
pub struct EnrichmentInput<'a> {
    pub title: &'a str,
    pub description: &'a str,
    pub full_text: &'a str,
}

/// Produces a summary and topic tags for an entry. Never fails: service
/// errors and bad answers turn into [`Enrichment::Degraded`].
pub struct InsightGenerator {
    generator: Arc<dyn TextGenerator>,
    budgeter: TokenBudgeter,
    strategy: EnrichmentStrategy,
    config: GeneratorConfig,
}

impl InsightGenerator {
    pub fn new(
        generator: Arc<dyn TextGenerator>,
        strategy: EnrichmentStrategy,
        config: GeneratorConfig,
    ) -> Self {
        let budgeter = TokenBudgeter::for_model(&config.model);
        Self {
            generator,
            budgeter,
            strategy,
            config,
        }
    }

    pub fn strategy(&self) -> EnrichmentStrategy {
        self.strategy
    }

    pub fn build_prompt(&self, input: &EnrichmentInput<'_>) -> Prompt {
        match self.strategy {
            EnrichmentStrategy::Insights => {
                let body = if input.full_text.trim().is_empty() {
                    input.description
                } else {
                    input.full_text
                };
                Prompt::new(
                    format!(
                        "Create a one-line description for a technical blog post based on the title and full text I provide you. \
                         Also, give me a list of the top 5 most important topic tags from the same. \
                         Respond only in JSON, using 'summary' and 'tags' as the keys.\
                         \n\nTitle: '{}'\n\nFull Text: '",
                        input.title
                    ),
                    body,
                    "'",
                )
            }
            EnrichmentStrategy::Summary => Prompt::new(
                format!(
                    "Write a one-sentence summary of a technical blog post based on the title and description I provide you. \
                     Respond only in JSON, using 'summary' as the key.\
                     \n\nTitle: '{}'\n\nDescription: '",
                    input.title
                ),
                input.description,
                "'",
            ),
        }
    }

    pub fn build_request(&self, input: &EnrichmentInput<'_>) -> CompletionRequest {
        let prompt = self
            .budgeter
            .fit(self.build_prompt(input), self.config.max_prompt_tokens);

        CompletionRequest {
            model: self.config.model.clone(),
            messages: vec![ChatMessage::system(SYSTEM_PROMPT), ChatMessage::user(prompt.render())],
            max_tokens: self.config.max_output_tokens,
            json_output: true,
        }
    }

    pub async fn generate(&self, input: &EnrichmentInput<'_>) -> Enrichment {
        let request = self.build_request(input);

        let content = match self.generator.complete(&request).await {
            Ok(content) => content,
            Err(e) => {
                return Enrichment::Degraded {
                    insights: Insights {
                        summary: fallback_summary(input.description),
                        tags: Vec::new(),
                    },
                    reason: e.to_string(),
                };
            }
        };

        match parse_insights(&content) {
            Ok(mut insights) => {
                if !self.strategy.wants_tags() {
                    insights.tags.clear();
                }
                debug!("Generated summary for '{}' with {} tags", input.title, insights.tags.len());
                Enrichment::Generated(insights)
            }
            Err(e) => Enrichment::Degraded {
                insights: Insights {
                    summary: PLACEHOLDER_SUMMARY.to_string(),
                    tags: Vec::new(),
                },
                reason: format!("unparseable response: {}", e),
            },
        }
    }
}

/// Parse a `{"summary": ..., "tags": [...]}` answer. `buzzwords` is accepted
/// in place of `tags`. A missing summary becomes the placeholder and a missing
/// or malformed tag list becomes empty; only non-JSON or non-object answers
/// are errors.
pub fn parse_insights(content: &str) -> Result<Insights> {
    let value: Value = serde_json::from_str(strip_code_fence(content))?;
    let object = value
        .as_object()
        .ok_or_else(|| IngestError::Generation("expected a JSON object".to_string()))?;

    let summary = object
        .get("summary")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or(PLACEHOLDER_SUMMARY)
        .to_string();

    let tags = object
        .get("tags")
        .or_else(|| object.get("buzzwords"))
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    Ok(Insights { summary, tags })
}

/// First sentence of the description, or [`NO_SUMMARY`] when there is none.
pub fn fallback_summary(description: &str) -> String {
    if description.trim().is_empty() {
        NO_SUMMARY.to_string()
    } else {
        first_sentence(description)
    }
}

fn strip_code_fence(content: &str) -> &str {
    let trimmed = content.trim();
    match trimmed.strip_prefix("```") {
        Some(rest) => {
            let rest = rest.strip_prefix("json").unwrap_or(rest);
            rest.strip_suffix("```").unwrap_or(rest).trim()
        }
        None => trimmed,
    }
}
