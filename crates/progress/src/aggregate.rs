//! Collapses a raw progress-event stream into display state.
//!
//! The chat view renders three things while an agent works: a short activity
//! history (tool calls, de-duplicated with repeat counts), a truncated
//! preview of the agent's thinking, and the latest cumulative answer text.
//! This aggregator is the consumer contract both executors must satisfy.

use crate::event::{ProgressEvent, ToolUseStatus};

/// Presentation policy. These lengths are display tuning, not invariants.
#[derive(Debug, Clone, Copy)]
pub struct AggregatorConfig {
    /// Maximum characters of a tool-call input shown in a history line.
    pub tool_input_max: usize,
    /// Maximum characters of accumulated thinking kept for the preview.
    pub thinking_preview_max: usize,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            tool_input_max: 60,
            thinking_preview_max: 300,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
struct ToolLine {
    label: String,
    count: usize,
    completed: bool,
}

/// Stateful reducer over `ProgressEvent`s.
#[derive(Debug, Default)]
pub struct ProgressAggregator {
    config: AggregatorConfig,
    tools: Vec<ToolLine>,
    thinking: String,
    text: String,
    status: Option<String>,
}

impl ProgressAggregator {
    pub fn new() -> Self {
        Self::with_config(AggregatorConfig::default())
    }

    pub fn with_config(config: AggregatorConfig) -> Self {
        Self {
            config,
            tools: Vec::new(),
            thinking: String::new(),
            text: String::new(),
            status: None,
        }
    }

    /// Fold one event into the display state.
    pub fn apply(&mut self, event: &ProgressEvent) {
        match event {
            ProgressEvent::Text { content } => {
                // Cumulative: each event supersedes the previous.
                self.text = content.clone();
            }
            ProgressEvent::Thinking { content } => {
                self.thinking.push_str(content);
            }
            ProgressEvent::Status { message } => {
                if self.status.as_deref() != Some(message.as_str()) {
                    self.status = Some(message.clone());
                }
            }
            ProgressEvent::ToolUse {
                tool,
                input,
                status,
            } => self.apply_tool_use(tool, input.as_deref(), *status),
        }
    }

    fn apply_tool_use(&mut self, tool: &str, input: Option<&str>, status: Option<ToolUseStatus>) {
        let label = match input {
            Some(input) => format!(
                "{tool} ({})",
                truncate(input, self.config.tool_input_max)
            ),
            None => tool.to_string(),
        };

        match status {
            Some(ToolUseStatus::Completed) => {
                // Mark the matching started entry done instead of adding a
                // duplicate line.
                if let Some(line) = self
                    .tools
                    .iter_mut()
                    .rev()
                    .find(|line| line.label.starts_with(tool) && !line.completed)
                {
                    line.completed = true;
                    return;
                }
                self.tools.push(ToolLine {
                    label,
                    count: 1,
                    completed: true,
                });
            }
            _ => {
                if let Some(last) = self.tools.last_mut() {
                    if last.label == label {
                        last.count += 1;
                        last.completed = false;
                        return;
                    }
                }
                self.tools.push(ToolLine {
                    label,
                    count: 1,
                    completed: false,
                });
            }
        }
    }

    /// Current cumulative answer text.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Truncated thinking preview, or `None` if the agent emitted no thoughts.
    pub fn thinking_preview(&self) -> Option<String> {
        if self.thinking.is_empty() {
            return None;
        }
        Some(truncate(&self.thinking, self.config.thinking_preview_max))
    }

    /// Human-readable activity lines, oldest first.
    pub fn activity_lines(&self) -> Vec<String> {
        let mut lines: Vec<String> = self
            .tools
            .iter()
            .map(|line| {
                if line.count > 1 {
                    format!("{} ×{}", line.label, line.count)
                } else {
                    line.label.clone()
                }
            })
            .collect();
        if let Some(status) = &self.status {
            lines.push(status.clone());
        }
        lines
    }

    /// Reset all accumulated state for a new prompt.
    pub fn reset(&mut self) {
        self.tools.clear();
        self.thinking.clear();
        self.text.clear();
        self.status = None;
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max_chars).collect();
    out.push('…');
    out
}
