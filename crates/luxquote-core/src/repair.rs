//! Structured-output repair for generator responses.
//!
//! Generators asked for pure JSON still wrap it in markdown fences, leave
//! trailing commas, or run out of tokens mid-object. Parsing is therefore a
//! two-stage pipeline: strict parse, then this pure repair transform, then a
//! second strict parse. Callers that fail both stages fall back to an empty
//! item list; repair itself never errors.

use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;

fn comma_before_brace() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r",\s*\}").unwrap())
}

fn comma_before_bracket() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r",\s*\]").unwrap())
}

/// Strict parse of the raw response, retried once through
/// [`repair_structured_text`] on failure.
pub fn parse_or_repair(raw: &str) -> Result<Value, serde_json::Error> {
    match serde_json::from_str(raw.trim()) {
        Ok(value) => Ok(value),
        Err(_) => serde_json::from_str(&repair_structured_text(raw)),
    }
}

/// Best-effort repair of malformed or truncated JSON text.
///
/// Steps, in order: strip markdown fences, drop trailing commas before
/// closers, truncate a mid-object tail back to the last structural `}`,
/// then append whatever closers are needed to balance the open
/// brace/bracket stack. The balancing step is a no-op on well-formed input,
/// so it also restores responses cut exactly between items, where the text
/// already ends in `}`.
pub fn repair_structured_text(raw: &str) -> String {
    let mut text = strip_code_fences(raw);

    text = comma_before_brace().replace_all(&text, "}").into_owned();
    text = comma_before_bracket().replace_all(&text, "]").into_owned();

    if !text.ends_with('}') && !text.ends_with(']') {
        if let Some(idx) = last_structural_close_brace(&text) {
            text.truncate(idx + 1);
        }
    }

    for closer in unclosed_delimiters(&text).into_iter().rev() {
        text.push(closer);
    }
    text
}

fn strip_code_fences(raw: &str) -> String {
    raw.replace("```json", "").replace("```", "").trim().to_string()
}

/// Byte index of the last `}` that sits outside any string literal.
///
/// A naive `rfind('}')` can land inside a description value ("curly }
/// inside") and corrupt the truncation point.
fn last_structural_close_brace(text: &str) -> Option<usize> {
    let mut last = None;
    let mut in_string = false;
    let mut escape = false;
    for (idx, ch) in text.char_indices() {
        if in_string {
            if escape {
                escape = false;
                continue;
            }
            match ch {
                '\\' => escape = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '}' => last = Some(idx),
            _ => {}
        }
    }
    last
}

/// Closers for every `{`/`[` opened but never closed, in opening order.
/// Mismatched closers are ignored; the second strict parse rejects those.
fn unclosed_delimiters(text: &str) -> Vec<char> {
    let mut stack = Vec::new();
    let mut in_string = false;
    let mut escape = false;
    for ch in text.chars() {
        if in_string {
            if escape {
                escape = false;
                continue;
            }
            match ch {
                '\\' => escape = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => stack.push('}'),
            '[' => stack.push(']'),
            '}' | ']' => {
                if stack.last() == Some(&ch) {
                    stack.pop();
                }
            }
            _ => {}
        }
    }
    stack
}
