//! Pure output parsers for the supported agent CLI formats.
//!
//! Each provider's one-shot CLI emits a different stdout format: a single
//! JSON object (claude, gemini), or a newline-delimited JSON event stream
//! (codex, opencode). Every parser here is total: malformed input never
//! fails, it degrades to returning the raw text as content. Line-oriented
//! parsers drop individual unparseable lines silently, so partial or
//! truncated streams degrade to "whatever parsed so far".

mod claude;
mod codex;
mod gemini;
mod opencode;

use progress::TokenUsage;
use providers::ProviderKind;

/// Uniform result of parsing a provider's raw stdout.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedOutput {
    pub content: String,
    pub tokens: Option<TokenUsage>,
    pub cost: Option<f64>,
}

impl ParsedOutput {
    /// Fallback for input that did not parse at all.
    pub(crate) fn raw(raw: &str) -> Self {
        Self {
            content: raw.to_string(),
            tokens: None,
            cost: None,
        }
    }
}

/// Parse a provider's complete stdout into a uniform result. Never panics.
pub fn parse_output(kind: ProviderKind, raw: &str) -> ParsedOutput {
    match kind {
        ProviderKind::Claude => claude::parse(raw),
        ProviderKind::Gemini => gemini::parse(raw),
        ProviderKind::Codex => codex::parse(raw),
        ProviderKind::Opencode => opencode::parse(raw),
    }
}

/// Opportunistically extract the content visible so far in a still-growing
/// stdout buffer.
///
/// Only the line-oriented providers support this; for the others the answer
/// is only known at completion and this returns `None`. The trailing
/// (possibly incomplete) line is ignored.
pub fn partial_content(kind: ProviderKind, raw_so_far: &str) -> Option<String> {
    if !kind.line_oriented() {
        return None;
    }
    let end = raw_so_far.rfind('\n')?;
    let complete = &raw_so_far[..=end];
    let content = match kind {
        ProviderKind::Codex => codex::extract(complete).content,
        ProviderKind::Opencode => opencode::extract(complete).content,
        _ => unreachable!("line_oriented() limits this to codex and opencode"),
    }?;
    if content.is_empty() {
        None
    } else {
        Some(content)
    }
}
