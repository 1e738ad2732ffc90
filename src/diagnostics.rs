//! Diagnostic Rendering
//!
//! Three user-visible formats for [`RillError`]: a human format with a
//! source excerpt and caret underline, a single-line compact format, and
//! the LSP-compatible JSON wire format (0-indexed positions).

use serde::Serialize;

use crate::ast::Span;
use crate::runtime::errors::{CallFrame, RillError};

/// Default cap on rendered call-stack frames.
pub const DEFAULT_MAX_STACK_FRAMES: usize = 10;

// ============================================================================
// Human format
// ============================================================================

/// Render the `error[ID]: ...` format with a source excerpt. `verbose`
/// adds the documentation link.
pub fn human(error: &RillError, source: Option<&str>, verbose: bool) -> String {
    let mut out = format!("error[{}]: {}", error.id, error.message);

    if let Some(span) = error.location {
        out.push_str(&format!("\n  --> {}:{}", span.start.line, span.start.column));
        if let Some(source) = source {
            if let Some(line_text) = source.lines().nth(span.start.line.saturating_sub(1)) {
                let line_no = span.start.line.to_string();
                let gutter = " ".repeat(line_no.len());
                out.push_str(&format!("\n {} |", gutter));
                out.push_str(&format!("\n {} | {}", line_no, line_text));
                let caret_offset = span.start.column.saturating_sub(1);
                let caret_len = caret_width(span, line_text);
                out.push_str(&format!(
                    "\n {} | {}{}",
                    gutter,
                    " ".repeat(caret_offset),
                    "^".repeat(caret_len)
                ));
            }
        }
    }

    for suggestion in &error.suggestions {
        out.push_str(&format!("\n   = help: {}", suggestion));
    }
    if verbose {
        if let Some(url) = &error.help_url {
            out.push_str(&format!("\n   = see: {}", url));
        }
    }
    if !error.call_stack.is_empty() {
        out.push('\n');
        out.push_str(&render_call_stack(&error.call_stack, DEFAULT_MAX_STACK_FRAMES));
    }
    out
}

fn caret_width(span: Span, line_text: &str) -> usize {
    if span.end.line == span.start.line && span.end.column > span.start.column {
        (span.end.column - span.start.column).min(line_text.len().max(1))
    } else {
        1
    }
}

/// Render call-stack frames, innermost last, truncated at `max_frames`.
pub fn render_call_stack(frames: &[CallFrame], max_frames: usize) -> String {
    let mut out = String::from("call stack:");
    for frame in frames.iter().take(max_frames) {
        let name = frame.function_name.as_deref().unwrap_or("<anonymous>");
        out.push_str(&format!(
            "\n  at {} ({}:{})",
            name, frame.span.start.line, frame.span.start.column
        ));
        if let Some(context) = &frame.context {
            out.push_str(&format!(" — {}", context));
        }
    }
    if frames.len() > max_frames {
        out.push_str(&format!("\n  … {} more frames", frames.len() - max_frames));
    }
    out
}

// ============================================================================
// Compact format
// ============================================================================

/// Single-line form: `[ID] message at line:col (hint: ...)`.
pub fn compact(error: &RillError) -> String {
    let mut out = format!("[{}] {}", error.id, error.message);
    if let Some(span) = error.location {
        out.push_str(&format!(" at {}:{}", span.start.line, span.start.column));
    }
    if let Some(hint) = error.suggestions.first() {
        out.push_str(&format!(" (hint: {})", hint));
    }
    out
}

// ============================================================================
// JSON wire format (LSP-compatible)
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct JsonPosition {
    pub line: usize,
    pub character: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct JsonRange {
    pub start: JsonPosition,
    pub end: JsonPosition,
}

#[derive(Debug, Clone, Serialize)]
pub struct JsonStackFrame {
    pub location: String,
    #[serde(rename = "functionName", skip_serializing_if = "Option::is_none")]
    pub function_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

/// The LSP-diagnostic wire form. Lines and characters are 0-indexed.
#[derive(Debug, Clone, Serialize)]
pub struct JsonDiagnostic {
    #[serde(rename = "errorId")]
    pub error_id: String,
    pub severity: u8,
    pub message: String,
    pub source: String,
    pub code: String,
    pub range: JsonRange,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub suggestions: Vec<String>,
    #[serde(rename = "helpUrl", skip_serializing_if = "Option::is_none")]
    pub help_url: Option<String>,
    #[serde(rename = "callStack", skip_serializing_if = "Vec::is_empty")]
    pub call_stack: Vec<JsonStackFrame>,
}

pub fn to_json(error: &RillError) -> JsonDiagnostic {
    let span = error.location.unwrap_or_default();
    JsonDiagnostic {
        error_id: error.id.to_string(),
        severity: 1,
        message: error.message.clone(),
        source: "rill".to_string(),
        code: error.id.to_string(),
        range: JsonRange {
            start: JsonPosition {
                line: span.start.line.saturating_sub(1),
                character: span.start.column.saturating_sub(1),
            },
            end: JsonPosition {
                line: span.end.line.saturating_sub(1),
                character: span.end.column.saturating_sub(1),
            },
        },
        suggestions: error.suggestions.clone(),
        help_url: error.help_url.clone(),
        call_stack: error
            .call_stack
            .iter()
            .map(|frame| JsonStackFrame {
                location: format!("{}:{}", frame.span.start.line, frame.span.start.column),
                function_name: frame.function_name.clone(),
                context: frame.context.clone(),
            })
            .collect(),
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Position;
    use crate::runtime::errors::ids;

    fn sample_error() -> RillError {
        RillError::new(ids::MISSING_FIELD, "no field 'age'").at(Span::new(
            Position::new(2, 4, 10),
            Position::new(2, 8, 14),
        ))
    }

    #[test]
    fn test_human_format_with_excerpt() {
        let rendered = human(&sample_error(), Some("first line\n$d.age ?? 0"), false);
        assert!(rendered.starts_with("error[RILL-R-MissingField]: no field 'age'"));
        assert!(rendered.contains("--> 2:4"));
        assert!(rendered.contains("2 | $d.age ?? 0"));
        assert!(rendered.contains("^^^^"));
        assert!(rendered.contains("= help:"));
        assert!(!rendered.contains("= see:"));
    }

    #[test]
    fn test_human_verbose_adds_link() {
        let rendered = human(&sample_error(), None, true);
        assert!(rendered.contains("= see: https://"));
    }

    #[test]
    fn test_compact_format() {
        let rendered = compact(&sample_error());
        assert!(rendered.starts_with("[RILL-R-MissingField] no field 'age' at 2:4"));
        assert!(rendered.contains("(hint:"));
    }

    #[test]
    fn test_json_is_zero_indexed() {
        let diagnostic = to_json(&sample_error());
        assert_eq!(diagnostic.severity, 1);
        assert_eq!(diagnostic.source, "rill");
        assert_eq!(diagnostic.error_id, "RILL-R-MissingField");
        assert_eq!(diagnostic.code, "RILL-R-MissingField");
        assert_eq!(diagnostic.range.start.line, 1);
        assert_eq!(diagnostic.range.start.character, 3);
        let json = serde_json::to_value(&diagnostic).unwrap();
        assert_eq!(json["range"]["start"]["line"], 1);
        // Empty call stacks are omitted entirely.
        assert!(json.get("callStack").is_none());
    }

    #[test]
    fn test_call_stack_truncation() {
        let frames: Vec<CallFrame> = (0..14)
            .map(|i| CallFrame {
                span: Span::new(Position::new(i + 1, 1, 0), Position::new(i + 1, 2, 1)),
                function_name: Some(format!("f{}", i)),
                context: None,
            })
            .collect();
        let rendered = render_call_stack(&frames, 10);
        assert!(rendered.contains("at f0 (1:1)"));
        assert!(rendered.contains("at f9 (10:1)"));
        assert!(!rendered.contains("f10"));
        assert!(rendered.contains("… 4 more frames"));
    }
}
