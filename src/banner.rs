//! Startup banner and session summary display.

use crate::consts::{AUTHOR, HOMEPAGE, REPO, format_number};
use crate::modernizer::TokenUsage;

/// Run configuration for display in the startup banner.
pub struct BannerInfo<'a> {
    pub model: &'a str,
    pub anthropic_auth: &'a str,
    pub tts_model: &'a str,
    pub voice: &'a str,
    pub openai_auth: &'a str,
    pub concurrency: usize,
    pub db: &'a str,
}

/// Print the startup banner with run info.
pub fn print_banner(info: &BannerInfo) {
    println!(
        r#"
   ╔═══════════════════════════════════════╗
   ║               Q U I L L               ║
   ║    old books, read in a new voice     ║
   ╚═══════════════════════════════════════╝

   version   {}
   by        {}
   home      {}
   repo      {}
   model     {} ({})
   speech    {}, voice {} ({})
   parallel  {}
   library   {}
"#,
        env!("CARGO_PKG_VERSION"),
        AUTHOR,
        HOMEPAGE,
        REPO,
        info.model,
        info.anthropic_auth,
        info.tts_model,
        info.voice,
        info.openai_auth,
        info.concurrency,
        info.db,
    );
}

/// Print the session token usage, if any tokens were spent.
pub fn print_session_summary(usage: TokenUsage) {
    if usage.total() > 0 {
        println!(
            "session: {:>6} input + {:>6} output = {:>6} tokens",
            format_number(usage.input_tokens),
            format_number(usage.output_tokens),
            format_number(usage.total()),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn print_banner_does_not_panic() {
        let info = BannerInfo {
            model: "mock",
            anthropic_auth: "not authenticated",
            tts_model: "tts-1",
            voice: "fable",
            openai_auth: "API key (env) ✓",
            concurrency: 4,
            db: ":memory:",
        };
        print_banner(&info);
    }

    #[test]
    fn print_session_summary_with_tokens() {
        let usage = TokenUsage {
            input_tokens: 1234,
            output_tokens: 567,
        };
        print_session_summary(usage);
    }

    #[test]
    fn print_session_summary_zero_tokens() {
        print_session_summary(TokenUsage::default());
    }
}
