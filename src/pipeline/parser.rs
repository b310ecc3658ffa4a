//! Extraction helpers for JSON embedded in text-generation output.
//!
//! Backends are instructed to reply with bare JSON, but in practice wrap it in
//! markdown fences or surrounding prose. Callers strip/scan here before parsing.

/// Strip a markdown code-fence wrapper (```json ... ``` or ``` ... ```) from
/// generated output, returning the inner content. Input without fences is
/// returned trimmed and unchanged.
pub fn strip_code_fences(output: &str) -> String {
    let trimmed = output.trim();
    if !trimmed.starts_with("```") {
        return trimmed.to_string();
    }

    // Drop the opening fence line (``` or ```json / ```JSON etc).
    let after_open = match trimmed.find('\n') {
        Some(idx) => &trimmed[idx + 1..],
        None => return trimmed.trim_matches('`').trim().to_string(),
    };

    // Drop the closing fence if present.
    let inner = match after_open.rfind("```") {
        Some(idx) => &after_open[..idx],
        None => after_open,
    };

    inner.trim().to_string()
}

/// Extract JSON from a fenced ```json ... ``` block.
pub fn extract_fenced_json(output: &str) -> Option<serde_json::Value> {
    let mut in_block = false;
    let mut json_content = String::new();
    let mut best_result: Option<serde_json::Value> = None;

    for line in output.lines() {
        let trimmed = line.trim();
        if !in_block && (trimmed == "```json" || trimmed == "```JSON") {
            in_block = true;
            json_content.clear();
            continue;
        }
        if in_block && trimmed == "```" {
            in_block = false;
            if let Ok(val) = serde_json::from_str::<serde_json::Value>(&json_content) {
                if val.is_object() {
                    best_result = Some(val);
                }
            }
            continue;
        }
        if in_block {
            json_content.push_str(line);
            json_content.push('\n');
        }
    }

    best_result
}

/// Find the first bare JSON object in the output that contains any of the
/// given discriminating keys.
fn extract_bare_json_with_key(output: &str, keys: &[&str]) -> Option<serde_json::Value> {
    let chars: Vec<char> = output.chars().collect();
    let len = chars.len();
    let mut i = 0;

    while i < len {
        if chars[i] == '{' {
            if let Some(end) = find_matching_brace(&chars, i) {
                let candidate: String = chars[i..=end].iter().collect();
                if let Ok(val) = serde_json::from_str::<serde_json::Value>(&candidate) {
                    if keys.iter().any(|k| val.get(*k).is_some()) {
                        return Some(val);
                    }
                }
            }
        }
        i += 1;
    }

    None
}

/// Unified JSON extraction combinator. Tries a fenced ```json block first,
/// then scans for bare JSON objects containing any of the discriminant keys.
pub fn extract_json_by_key(output: &str, keys: &[&str]) -> Option<serde_json::Value> {
    if let Some(val) = extract_fenced_json(output) {
        if keys.iter().any(|k| val.get(*k).is_some()) {
            return Some(val);
        }
    }
    extract_bare_json_with_key(output, keys)
}

/// Find the index of the matching closing brace for an opening brace at `start`.
fn find_matching_brace(chars: &[char], start: usize) -> Option<usize> {
    let mut depth = 0;
    let mut in_string = false;
    let mut escape_next = false;

    for (i, &ch) in chars.iter().enumerate().skip(start) {
        if escape_next {
            escape_next = false;
            continue;
        }
        if ch == '\\' && in_string {
            escape_next = true;
            continue;
        }
        if ch == '"' {
            in_string = !in_string;
            continue;
        }
        if in_string {
            continue;
        }
        if ch == '{' {
            depth += 1;
        } else if ch == '}' {
            depth -= 1;
            if depth == 0 {
                return Some(i);
            }
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_fences_json_block() {
        let out = "```json\n{\"a\": 1}\n```";
        assert_eq!(strip_code_fences(out), "{\"a\": 1}");
    }

    #[test]
    fn test_strip_fences_plain_block() {
        let out = "```\n{\"a\": 1}\n```\n";
        assert_eq!(strip_code_fences(out), "{\"a\": 1}");
    }

    #[test]
    fn test_strip_fences_no_fence() {
        assert_eq!(strip_code_fences("  {\"a\": 1} "), "{\"a\": 1}");
    }

    #[test]
    fn test_strip_fences_unterminated() {
        let out = "```json\n{\"a\": 1}";
        assert_eq!(strip_code_fences(out), "{\"a\": 1}");
    }

    #[test]
    fn test_extract_fenced() {
        let out = "Here you go:\n\n```json\n{\"requirements\": {}}\n```\nDone.";
        let val = extract_fenced_json(out).unwrap();
        assert!(val.get("requirements").is_some());
    }

    #[test]
    fn test_extract_by_key_bare() {
        let out = "The result is {\"confidence\": 0.9, \"requirements\": {}} as requested.";
        let val = extract_json_by_key(out, &["requirements"]).unwrap();
        assert_eq!(val["confidence"], 0.9);
    }

    #[test]
    fn test_extract_by_key_ignores_other_objects() {
        let out = "{\"unrelated\": true} then {\"requirements\": {\"name\": \"x\"}}";
        let val = extract_json_by_key(out, &["requirements"]).unwrap();
        assert!(val.get("unrelated").is_none());
    }

    #[test]
    fn test_matching_brace_handles_strings() {
        let s: Vec<char> = r#"{"a": "br{ace}", "b": {}}"#.chars().collect();
        assert_eq!(find_matching_brace(&s, 0), Some(s.len() - 1));
    }
}
