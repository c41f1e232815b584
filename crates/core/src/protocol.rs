// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Prompt wrapping and done-marker detection.
//!
//! Every delegated prompt is prefixed with a correlation id line
//! (`CCB_REQ_ID: <id>`) and the provider is instructed to end its reply with
//! a final `CCB_DONE: <id>` line. The helpers here wrap outgoing prompts and
//! recognize/strip the markers in collected reply text.

pub const REQ_ID_PREFIX: &str = "CCB_REQ_ID:";
pub const DONE_PREFIX: &str = "CCB_DONE:";

/// Generate a request id: `YYYYMMDD-HHMMSS-mmm-PID`.
pub fn make_req_id() -> String {
    let now = chrono::Local::now();
    format!(
        "{}-{:03}-{}",
        now.format("%Y%m%d-%H%M%S"),
        now.timestamp_subsec_millis(),
        std::process::id()
    )
}

/// Wrap a user message with the correlation preamble, provider instructions,
/// and the terminal done marker. The wrapped prompt ends with one newline.
pub fn wrap_prompt(message: &str, req_id: &str, instructions: &[&str]) -> String {
    let message = message.trim_end();
    let mut out = format!("{REQ_ID_PREFIX} {req_id}\n\n{message}\n\nIMPORTANT:\n");
    for line in instructions {
        out.push_str("- ");
        out.push_str(line);
        out.push('\n');
    }
    out.push_str("- End your reply with this exact final line (verbatim, on its own line):\n");
    out.push_str(&format!("{DONE_PREFIX} {req_id}\n"));
    out
}

/// True when `s` looks like a request id (`\d{8}-\d{6}-\d{3}-\d+`).
fn is_req_id_like(s: &str) -> bool {
    let parts: Vec<&str> = s.split('-').collect();
    if parts.len() != 4 {
        return false;
    }
    let widths = [Some(8usize), Some(6), Some(3), None];
    parts.iter().zip(widths).all(|(part, width)| {
        !part.is_empty()
            && part.bytes().all(|b| b.is_ascii_digit())
            && width.is_none_or(|w| part.len() == w)
    })
}

/// True for `CCB_DONE: <any id>` lines (case-insensitive prefix).
fn is_any_done_line(line: &str) -> bool {
    let trimmed = line.trim();
    let Some(rest) = strip_prefix_ignore_case(trimmed, DONE_PREFIX) else {
        return false;
    };
    is_req_id_like(rest.trim())
}

/// True for the done line of this specific request.
fn is_done_line(line: &str, req_id: &str) -> bool {
    let trimmed = line.trim();
    match trimmed.strip_prefix(DONE_PREFIX) {
        Some(rest) => rest.trim() == req_id,
        None => false,
    }
}

fn strip_prefix_ignore_case<'a>(s: &'a str, prefix: &str) -> Option<&'a str> {
    let head = s.get(..prefix.len())?;
    head.eq_ignore_ascii_case(prefix)
        .then(|| &s[prefix.len()..])
}

/// Trailing lines that carry no content: blanks, and generic `*_DONE` tags
/// some harnesses append after the requested `CCB_DONE` line. The tag may
/// optionally be followed by `: <id>`. `CCB_DONE` itself is never noise.
fn is_trailing_noise_line(line: &str) -> bool {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return true;
    }
    let (tag, rest) = match trimmed.split_once(':') {
        Some((tag, rest)) => (tag.trim_end(), Some(rest.trim())),
        None => (trimmed, None),
    };
    if tag == "CCB_DONE" || !tag.ends_with("_DONE") {
        return false;
    }
    let valid_tag = tag
        .bytes()
        .enumerate()
        .all(|(i, b)| b.is_ascii_uppercase() || b == b'_' || (i > 0 && b.is_ascii_digit()));
    if !valid_tag || !tag.as_bytes()[0].is_ascii_uppercase() {
        return false;
    }
    match rest {
        None => true,
        Some(r) => r.is_empty() || is_req_id_like(r),
    }
}

/// True iff the last non-noise line of `text` is `CCB_DONE: <req_id>`.
pub fn is_done_text(text: &str, req_id: &str) -> bool {
    for line in text.lines().rev() {
        if is_trailing_noise_line(line) {
            continue;
        }
        return is_done_line(line, req_id);
    }
    false
}

/// Remove the final done line for `req_id` plus surrounding noise lines.
pub fn strip_done_text(text: &str, req_id: &str) -> String {
    let mut lines: Vec<&str> = text.lines().collect();
    while lines.last().is_some_and(|l| is_trailing_noise_line(l)) {
        lines.pop();
    }
    if lines.last().is_some_and(|l| is_done_line(l, req_id)) {
        lines.pop();
    }
    while lines.last().is_some_and(|l| is_trailing_noise_line(l)) {
        lines.pop();
    }
    lines.join("\n").trim_end().to_string()
}

/// Remove all trailing marker lines (blank lines, `CCB_DONE: <id>` for any
/// id, and other `*_DONE` tags). Used by recall/display flows that want a
/// clean view of the latest reply.
pub fn strip_trailing_markers(text: &str) -> String {
    let mut lines: Vec<&str> = text.lines().collect();
    while lines
        .last()
        .is_some_and(|l| is_trailing_noise_line(l) || is_any_done_line(l))
    {
        lines.pop();
    }
    lines.join("\n").trim_end().to_string()
}

/// Extract the reply segment for `req_id` from a message that may contain
/// several done lines (providers that batch multiple replies into a single
/// assistant turn). Returns the slice between the previous done line of any
/// id and the last done line for our id, trimmed of surrounding blanks.
/// Falls back to [`strip_done_text`] when our done line is absent.
pub fn extract_reply_for_req(text: &str, req_id: &str) -> String {
    let lines: Vec<&str> = text.lines().collect();
    if lines.is_empty() {
        return String::new();
    }

    let done_idxs: Vec<usize> = lines
        .iter()
        .enumerate()
        .filter(|(_, l)| is_any_done_line(l))
        .map(|(i, _)| i)
        .collect();
    let target_i = match done_idxs
        .iter()
        .rev()
        .find(|&&i| matches_done_ignore_case(lines[i], req_id))
    {
        Some(&i) => i,
        None => return strip_done_text(text, req_id),
    };
    let prev_done_i = done_idxs
        .iter()
        .rev()
        .find(|&&i| i < target_i)
        .map(|&i| i as i64)
        .unwrap_or(-1);

    let mut segment: &[&str] = &lines[(prev_done_i + 1) as usize..target_i];
    while segment.first().is_some_and(|l| l.trim().is_empty()) {
        segment = &segment[1..];
    }
    while segment.last().is_some_and(|l| l.trim().is_empty()) {
        segment = &segment[..segment.len() - 1];
    }
    segment.join("\n").trim_end().to_string()
}

fn matches_done_ignore_case(line: &str, req_id: &str) -> bool {
    strip_prefix_ignore_case(line.trim(), DONE_PREFIX).is_some_and(|rest| rest.trim() == req_id)
}

#[cfg(test)]
#[path = "protocol_tests.rs"]
mod tests;
