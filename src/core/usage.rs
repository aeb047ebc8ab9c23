//! Token and cost estimation.
//!
//! Providers rarely report usage inline with streamed deltas, so usage is
//! estimated after the fact from the prompt and reply text. Counting prefers an
//! exact tokenizer for the model, then a generic tokenizer, then the
//! four-characters-per-token rule of thumb.
//!
//! Pricing is a single flat table applied to every model. It is an
//! approximation, not per-model billing.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

use crate::core::message::Message;

/// USD per million prompt tokens.
pub const PROMPT_PRICE_PER_MILLION: f64 = 0.15;
/// USD per million completion tokens.
pub const COMPLETION_PRICE_PER_MILLION: f64 = 0.60;

/// Token usage attached to an interaction record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_tokens: Option<u64>,
}

impl Usage {
    pub fn total(&self) -> u64 {
        self.total_tokens
            .unwrap_or(self.prompt_tokens + self.completion_tokens)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Estimate {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
    pub cost_usd: f64,
}

impl Estimate {
    pub fn usage(&self) -> Usage {
        Usage {
            prompt_tokens: self.prompt_tokens,
            completion_tokens: self.completion_tokens,
            total_tokens: Some(self.total_tokens),
        }
    }
}

pub trait Tokenizer: Send + Sync {
    /// Number of tokens in `text`, or `None` if this tokenizer cannot encode it.
    fn count_tokens(&self, text: &str) -> Option<usize>;
}

/// Tokenizers selectable by model name, with an optional generic fallback.
#[derive(Clone, Default)]
pub struct TokenizerSet {
    by_model: HashMap<String, Arc<dyn Tokenizer>>,
    generic: Option<Arc<dyn Tokenizer>>,
}

impl TokenizerSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_model(mut self, model: impl Into<String>, tokenizer: Arc<dyn Tokenizer>) -> Self {
        self.by_model.insert(model.into(), tokenizer);
        self
    }

    pub fn with_generic(mut self, tokenizer: Arc<dyn Tokenizer>) -> Self {
        self.generic = Some(tokenizer);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.by_model.is_empty() && self.generic.is_none()
    }

    /// Tokenizers to try for `model`, most specific first: the exact one
    /// (also matched without a routing prefix), then the generic one.
    pub fn candidates<'a>(&'a self, model: &str) -> impl Iterator<Item = &'a dyn Tokenizer> + 'a {
        let bare = model.rsplit('/').next().unwrap_or(model);
        let exact = self
            .by_model
            .get(model)
            .or_else(|| self.by_model.get(bare));
        exact
            .into_iter()
            .chain(self.generic.as_ref())
            .map(|tokenizer| &**tokenizer)
    }

    /// Load every `*.json` tokenizer in `dir`. `generic.json` becomes the
    /// fallback; any other file is keyed by its stem as a model name.
    #[cfg(feature = "hf-tokenizers")]
    pub fn load_dir(dir: &std::path::Path) -> std::io::Result<Self> {
        let mut set = Self::new();
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            match HfTokenizer::from_file(&path) {
                Ok(tokenizer) => {
                    let tokenizer: Arc<dyn Tokenizer> = Arc::new(tokenizer);
                    set = if stem == "generic" {
                        set.with_generic(tokenizer)
                    } else {
                        set.with_model(stem, tokenizer)
                    };
                    tracing::debug!(path = %path.display(), "loaded tokenizer");
                }
                Err(err) => {
                    tracing::warn!(path = %path.display(), "skipping tokenizer: {err}");
                }
            }
        }
        Ok(set)
    }
}

/// Tokenizer backed by a Hugging Face `tokenizer.json`.
#[cfg(feature = "hf-tokenizers")]
pub struct HfTokenizer(tokenizers::Tokenizer);

#[cfg(feature = "hf-tokenizers")]
impl HfTokenizer {
    pub fn from_file(path: &std::path::Path) -> Result<Self, String> {
        tokenizers::Tokenizer::from_file(path)
            .map(Self)
            .map_err(|err| err.to_string())
    }
}

#[cfg(feature = "hf-tokenizers")]
impl Tokenizer for HfTokenizer {
    fn count_tokens(&self, text: &str) -> Option<usize> {
        self.0.encode(text, false).ok().map(|encoding| encoding.len())
    }
}

#[derive(Clone, Default)]
pub struct UsageEstimator {
    tokenizers: TokenizerSet,
}

impl UsageEstimator {
    pub fn new(tokenizers: TokenizerSet) -> Self {
        Self { tokenizers }
    }

    /// Estimator that only uses the character-count approximation.
    pub fn approximate() -> Self {
        Self::default()
    }

    pub fn estimate(&self, model: &str, prompt_text: &str, response_text: &str) -> Estimate {
        let prompt_tokens = self.count(model, prompt_text);
        let completion_tokens = self.count(model, response_text);

        Estimate {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
            cost_usd: price(prompt_tokens, completion_tokens),
        }
    }

    fn count(&self, model: &str, text: &str) -> u64 {
        self.tokenizers
            .candidates(model)
            .find_map(|tokenizer| tokenizer.count_tokens(text))
            .map(|count| count as u64)
            .unwrap_or_else(|| approximate_tokens(text))
    }
}

/// Rule of thumb: roughly four characters per token.
pub fn approximate_tokens(text: &str) -> u64 {
    (text.chars().count() / 4) as u64
}

pub fn price(prompt_tokens: u64, completion_tokens: u64) -> f64 {
    (prompt_tokens as f64 * PROMPT_PRICE_PER_MILLION / 1_000_000.0)
        + (completion_tokens as f64 * COMPLETION_PRICE_PER_MILLION / 1_000_000.0)
}

/// Text a chat turn sends out, as counted for prompt tokens.
pub fn prompt_text(messages: &[Message]) -> String {
    messages
        .iter()
        .map(|m| m.content.as_str())
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedTokenizer(usize);

    impl Tokenizer for FixedTokenizer {
        fn count_tokens(&self, _text: &str) -> Option<usize> {
            Some(self.0)
        }
    }

    struct WordTokenizer;

    impl Tokenizer for WordTokenizer {
        fn count_tokens(&self, text: &str) -> Option<usize> {
            Some(text.split_whitespace().count())
        }
    }

    struct BrokenTokenizer;

    impl Tokenizer for BrokenTokenizer {
        fn count_tokens(&self, _text: &str) -> Option<usize> {
            None
        }
    }

    #[test]
    fn empty_text_costs_nothing() {
        let estimate = UsageEstimator::approximate().estimate("gpt-4o-mini", "", "");
        assert_eq!(estimate.total_tokens, 0);
        assert_eq!(estimate.cost_usd, 0.0);
    }

    #[test]
    fn approximation_divides_character_count_by_four() {
        let estimate =
            UsageEstimator::approximate().estimate("any-model", &"a".repeat(40), &"b".repeat(83));
        assert_eq!(estimate.prompt_tokens, 10);
        assert_eq!(estimate.completion_tokens, 20);
        assert_eq!(estimate.total_tokens, 30);
    }

    #[test]
    fn flat_price_table_applies() {
        // 10 * 0.15 / 1M + 20 * 0.60 / 1M
        assert!((price(10, 20) - 0.0000135).abs() < 1e-12);
        assert!((price(1_000_000, 1_000_000) - 0.75).abs() < 1e-9);
    }

    #[test]
    fn exact_tokenizer_wins_over_generic() {
        let set = TokenizerSet::new()
            .with_model("gpt-4o-mini", Arc::new(FixedTokenizer(7)))
            .with_generic(Arc::new(WordTokenizer));
        let estimator = UsageEstimator::new(set);

        let exact = estimator.estimate("gpt-4o-mini", "one two three", "four");
        assert_eq!((exact.prompt_tokens, exact.completion_tokens), (7, 7));

        let prefixed = estimator.estimate("openai/gpt-4o-mini", "x", "y");
        assert_eq!(prefixed.prompt_tokens, 7);

        let generic = estimator.estimate("claude-3", "one two three", "four");
        assert_eq!((generic.prompt_tokens, generic.completion_tokens), (3, 1));
    }

    #[test]
    fn failing_tokenizer_degrades_to_approximation() {
        let set = TokenizerSet::new().with_generic(Arc::new(BrokenTokenizer));
        let estimate = UsageEstimator::new(set).estimate("m", &"a".repeat(8), "");
        assert_eq!(estimate.prompt_tokens, 2);
    }

    #[test]
    fn failing_exact_tokenizer_falls_back_to_generic() {
        let set = TokenizerSet::new()
            .with_model("gpt-4o-mini", Arc::new(BrokenTokenizer))
            .with_generic(Arc::new(WordTokenizer));
        let estimate = UsageEstimator::new(set).estimate("gpt-4o-mini", "one two three", "four five");
        assert_eq!((estimate.prompt_tokens, estimate.completion_tokens), (3, 2));
    }

    #[test]
    fn estimate_is_deterministic() {
        let estimator = UsageEstimator::approximate();
        let first = estimator.estimate("m", "some prompt text", "a reply of some length");
        let second = estimator.estimate("m", "some prompt text", "a reply of some length");
        assert_eq!(first, second);
    }

    #[test]
    fn usage_total_falls_back_to_sum() {
        let usage = Usage {
            prompt_tokens: 3,
            completion_tokens: 4,
            total_tokens: None,
        };
        assert_eq!(usage.total(), 7);

        let json = serde_json::to_string(&usage).unwrap();
        assert!(!json.contains("total_tokens"));
    }

    #[test]
    fn prompt_text_joins_message_contents() {
        let messages = vec![Message::system("sys"), Message::user("hi")];
        assert_eq!(prompt_text(&messages), "sys\nhi");
    }
}
