//! JSON extraction from LLM replies.
//!
//! Judge models are asked for a bare JSON verdict but often wrap it in
//! markdown fences or preface it with prose. The extraction tries, in order:
//!
//! 1. A ```json code block
//! 2. A generic ``` code block
//! 3. Direct JSON (the reply starts with '{')
//! 4. The largest valid JSON object anywhere in the reply, preferring later
//!    occurrences (reasoning models emit brace-laden thinking before the
//!    actual verdict)
//!
//! Every candidate is validated with `serde_json` before it is returned.

use regex::Regex;

/// Extract a JSON object from an LLM reply.
///
/// Returns `None` when no parseable object can be found; callers decide
/// whether that is an error or a degraded no-match.
pub fn extract_json_object(content: &str) -> Option<String> {
    let trimmed = content.trim();

    if let Some(json) = extract_from_json_code_block(trimmed) {
        if is_valid_json(&json) {
            return Some(json);
        }
    }

    if let Some(json) = extract_from_generic_code_block(trimmed) {
        if is_valid_json(&json) {
            return Some(json);
        }
    }

    if trimmed.starts_with('{') {
        if let Some(end) = find_matching_brace(trimmed) {
            let candidate = &trimmed[..=end];
            if is_valid_json(candidate) {
                return Some(candidate.to_string());
            }
        }
    }

    extract_last_valid_object(trimmed)
}

fn is_valid_json(candidate: &str) -> bool {
    serde_json::from_str::<serde_json::Value>(candidate).is_ok()
}

/// Find the index of the '}' matching the '{' that starts `s`.
///
/// Tracks string literals and escape sequences so braces inside quoted
/// command text do not confuse the depth count.
pub fn find_matching_brace(s: &str) -> Option<usize> {
    let mut depth = 0;
    let mut in_string = false;
    let mut escape_next = false;

    for (i, c) in s.char_indices() {
        if escape_next {
            escape_next = false;
            continue;
        }

        match c {
            '\\' if in_string => {
                escape_next = true;
            }
            '"' => {
                in_string = !in_string;
            }
            '{' if !in_string => {
                depth += 1;
            }
            '}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }

    None
}

fn extract_from_json_code_block(content: &str) -> Option<String> {
    let re = Regex::new(r"```json\s*\n?([\s\S]*?)\n?```").ok()?;
    let caps = re.captures(content)?;
    let block = caps.get(1)?.as_str().trim();
    if block.starts_with('{') {
        if let Some(end) = find_matching_brace(block) {
            return Some(block[..=end].to_string());
        }
        return Some(block.to_string());
    }
    None
}

fn extract_from_generic_code_block(content: &str) -> Option<String> {
    let re = Regex::new(r"```(?:\w+)?\s*\n?([\s\S]*?)\n?```").ok()?;
    let caps = re.captures(content)?;
    let block = caps.get(1)?.as_str().trim();
    let start = block.find('{')?;
    let end = find_matching_brace(&block[start..])?;
    Some(block[start..=start + end].to_string())
}

/// Scan every '{' in the content and keep the largest valid object,
/// breaking size ties towards the later occurrence.
fn extract_last_valid_object(content: &str) -> Option<String> {
    let mut best: Option<(usize, String)> = None;

    for (start, c) in content.char_indices() {
        if c != '{' {
            continue;
        }
        let substr = &content[start..];
        if let Some(end) = find_matching_brace(substr) {
            let candidate = &substr[..=end];
            if !is_valid_json(candidate) {
                continue;
            }
            let better = match &best {
                Some((_, current)) => candidate.len() >= current.len(),
                None => true,
            };
            if better {
                best = Some((start, candidate.to_string()));
            }
        }
    }

    best.map(|(_, json)| json)
}
