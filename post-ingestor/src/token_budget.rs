//! Keeps prompts inside a token budget.
//!
//! Token counts come from the tokenizer of the model family (tiktoken). When
//! the prompt is too large its body is cut by a tenth and measured again
//! until it fits or the body is gone.

use tiktoken_rs::CoreBPE;
use tracing::{debug, warn};

use crate::rss_utils::text::truncate_chars;

/// Fraction of the body removed per shrink step.
const SHRINK_DIVISOR: usize = 10;

/// A prompt split into a fixed frame and a variable body that may be cut.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    pub head: String,
    pub body: String,
    pub tail: String,
}

impl Prompt {
    pub fn new(head: impl Into<String>, body: impl Into<String>, tail: impl Into<String>) -> Self {
        Self {
            head: head.into(),
            body: body.into(),
            tail: tail.into(),
        }
    }

    pub fn render(&self) -> String {
        format!("{}{}{}", self.head, self.body, self.tail)
    }
}

pub struct TokenBudgeter {
    bpe: Option<CoreBPE>,
}

impl TokenBudgeter {
    /// Tokenizer for `model`, or the general purpose `cl100k_base` scheme when
    /// the model is not recognized.
    pub fn for_model(model: &str) -> Self {
        let bpe = match tiktoken_rs::get_bpe_from_model(model) {
            Ok(bpe) => Some(bpe),
            Err(_) => {
                debug!("No tokenizer registered for model {}, using cl100k_base", model);
                match tiktoken_rs::cl100k_base() {
                    Ok(bpe) => Some(bpe),
                    Err(e) => {
                        warn!("Could not load cl100k_base, estimating by length: {}", e);
                        None
                    }
                }
            }
        };

        Self { bpe }
    }

    pub fn estimate(&self, text: &str) -> usize {
        match &self.bpe {
            Some(bpe) => bpe.encode_with_special_tokens(text).len(),
            // Roughly four characters per token for English prose.
            None => (text.chars().count() + 3) / 4,
        }
    }

    /// Shrinks `prompt.body` until the rendered prompt is within `max_tokens`.
    /// If the frame alone is over budget the prompt comes back with an empty
    /// body.
    pub fn fit(&self, mut prompt: Prompt, max_tokens: usize) -> Prompt {
        let mut estimate = self.estimate(&prompt.render());
        let mut steps = 0usize;

        while estimate > max_tokens && !prompt.body.is_empty() {
            prompt.body = shrink(&prompt.body);
            estimate = self.estimate(&prompt.render());
            steps += 1;
        }

        if steps > 0 {
            debug!(
                "Shrunk prompt body in {} step(s) to {} chars ({} tokens, budget {})",
                steps,
                prompt.body.chars().count(),
                estimate,
                max_tokens
            );
        }
        if estimate > max_tokens {
            warn!(
                "Prompt frame alone needs {} tokens, over the budget of {}",
                estimate, max_tokens
            );
        }

        prompt
    }
}

/// Fits `prompt` into `max_tokens` using `model`'s tokenizer.
pub fn fit(prompt: Prompt, max_tokens: usize, model: &str) -> Prompt {
    TokenBudgeter::for_model(model).fit(prompt, max_tokens)
}

/// One shrink step: drop the last tenth of the text, and always at least one
/// character, so repeated application reaches the empty string.
pub fn shrink(text: &str) -> String {
    let len = text.chars().count();
    let cut = (len / SHRINK_DIVISOR).max(1);
    truncate_chars(text, len.saturating_sub(cut)).to_string()
}
