pub mod anthropic;
pub mod mock;

use anyhow::Result;
use async_trait::async_trait;

/// Token usage from a single LLM call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl TokenUsage {
    /// Accumulate another usage into this one.
    pub fn add(&mut self, other: TokenUsage) {
        self.input_tokens += other.input_tokens;
        self.output_tokens += other.output_tokens;
    }

    /// Total tokens (input + output).
    pub fn total(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }
}

/// One chunk to rewrite.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModernizeRequest {
    pub text: String,
    /// Tail of the preceding chunk, given for continuity only.
    pub previous: Option<String>,
}

impl ModernizeRequest {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            previous: None,
        }
    }

    pub fn with_previous(mut self, previous: impl Into<String>) -> Self {
        self.previous = Some(previous.into());
        self
    }
}

/// The rewritten chunk plus optional token usage.
#[derive(Debug, Clone)]
pub struct Modernized {
    pub text: String,
    pub usage: Option<TokenUsage>,
}

/// Rewrites archaic prose in modern language. Could be an LLM or a test script.
#[async_trait]
pub trait Modernizer: Send + Sync {
    async fn modernize(&self, request: &ModernizeRequest) -> Result<Modernized>;

    /// Model identifier, for display.
    fn model(&self) -> String;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn usage_accumulates() {
        let mut usage = TokenUsage::default();
        usage.add(TokenUsage {
            input_tokens: 10,
            output_tokens: 4,
        });
        usage.add(TokenUsage {
            input_tokens: 1,
            output_tokens: 2,
        });
        assert_eq!(usage.input_tokens, 11);
        assert_eq!(usage.output_tokens, 6);
        assert_eq!(usage.total(), 17);
    }

    #[test]
    fn request_builder_sets_previous() {
        let req = ModernizeRequest::new("now").with_previous("before");
        assert_eq!(req.text, "now");
        assert_eq!(req.previous.as_deref(), Some("before"));
    }
}
