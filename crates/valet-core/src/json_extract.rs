//! Tolerant extraction of a JSON object from LLM output.
//!
//! Models asked for structured output wrap it in markdown fences, prepend
//! prose, append trailing garbage, or emit JSON5-isms (line comments,
//! trailing commas). Extraction tries a bounded ladder of strategies and
//! never panics; callers degrade when every attempt fails.

use serde_json::Value;

/// Attempts, in order: fence-stripped strict parse, lenient cleanup parse,
/// first balanced `{...}` block, cleaned balanced block. Returns the first
/// candidate that parses to a JSON object.
pub fn extract_json_object(raw: &str) -> Option<Value> {
    let stripped = strip_code_fences(raw);

    let candidates = [
        stripped.to_string(),
        cleanup_lenient(stripped),
        first_balanced_object(stripped).unwrap_or_default(),
        first_balanced_object(stripped)
            .map(|block| cleanup_lenient(&block))
            .unwrap_or_default(),
    ];

    for candidate in candidates {
        let candidate = candidate.trim();
        if candidate.is_empty() {
            continue;
        }
        if let Ok(value) = serde_json::from_str::<Value>(candidate) {
            if value.is_object() {
                return Some(value);
            }
        }
    }
    None
}

/// Removes a surrounding markdown code fence (``` or ```json) if present.
fn strip_code_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Skip the language tag on the opening fence line.
    let rest = match rest.find('\n') {
        Some(idx) => &rest[idx + 1..],
        None => rest,
    };
    match rest.rfind("```") {
        Some(idx) => rest[..idx].trim(),
        None => rest.trim(),
    }
}

/// Strips `//` line comments and trailing commas outside of string literals.
fn cleanup_lenient(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();
    let mut in_string = false;
    let mut escaped = false;

    while let Some(c) = chars.next() {
        if in_string {
            out.push(c);
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        match c {
            '"' => {
                in_string = true;
                out.push(c);
            }
            '/' if chars.peek() == Some(&'/') => {
                // Line comment: consume to end of line.
                for next in chars.by_ref() {
                    if next == '\n' {
                        out.push('\n');
                        break;
                    }
                }
            }
            _ => out.push(c),
        }
    }

    strip_trailing_commas(&out)
}

fn strip_trailing_commas(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut in_string = false;
    let mut escaped = false;
    for c in input.chars() {
        if in_string {
            out.push(c);
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        match c {
            '"' => {
                in_string = true;
                out.push(c);
            }
            '}' | ']' => {
                // Drop a comma that directly precedes this close bracket.
                while matches!(out.chars().last(), Some(last) if last.is_whitespace()) {
                    out.pop();
                }
                if out.ends_with(',') {
                    out.pop();
                }
                out.push(c);
            }
            _ => out.push(c),
        }
    }
    out
}

/// Extracts the first `{...}` block with balanced braces, respecting strings.
fn first_balanced_object(input: &str) -> Option<String> {
    let start = input.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (offset, c) in input[start..].char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(input[start..start + offset + 1].to_string());
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const BARE: &str = r#"{"mode": "direct", "display_response": "hello"}"#;

    #[test]
    fn test_bare_json() {
        assert_eq!(
            extract_json_object(BARE).unwrap(),
            json!({"mode": "direct", "display_response": "hello"})
        );
    }

    #[test]
    fn test_fenced_json_parses_identically() {
        let fenced = format!("```json\n{BARE}\n```");
        assert_eq!(
            extract_json_object(&fenced),
            extract_json_object(BARE)
        );
    }

    #[test]
    fn test_comment_and_trailing_comma() {
        let lenient = r#"{
            // the chosen mode
            "mode": "direct",
            "display_response": "hello",
        }"#;
        assert_eq!(
            extract_json_object(lenient),
            extract_json_object(BARE)
        );
    }

    #[test]
    fn test_trailing_garbage_after_object() {
        let noisy = format!("Here is the plan:\n{BARE}\nLet me know if that works!");
        assert_eq!(
            extract_json_object(&noisy),
            extract_json_object(BARE)
        );
    }

    #[test]
    fn test_nested_object_with_braces_in_strings() {
        let tricky = r#"prefix {"a": "has a } brace", "b": {"c": 1}} suffix"#;
        assert_eq!(
            extract_json_object(tricky).unwrap(),
            json!({"a": "has a } brace", "b": {"c": 1}})
        );
    }

    #[test]
    fn test_unparseable_returns_none() {
        assert!(extract_json_object("no json here at all").is_none());
        assert!(extract_json_object("{not even close").is_none());
        assert!(extract_json_object("").is_none());
    }

    #[test]
    fn test_array_is_not_an_object() {
        assert!(extract_json_object(r#"[1, 2, 3]"#).is_none());
    }
}
