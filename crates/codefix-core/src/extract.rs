//! Recover a file body from free-form model output.
//!
//! Rules, applied in order:
//! 1. Fenced blocks (```` ``` ````) win. With several blocks the longest is
//!    taken; an unterminated fence runs to the end of the text.
//! 2. Otherwise text after a `CORRECTED CODE:` / `FIXED CODE:` marker.
//! 3. Otherwise the whole text.
//!
//! Cases 2 and 3 then drop leading prose lines ("Here is the fixed code:")
//! and trailing commentary paragraphs ("This removes the unused import.").
//!
//! Failure modes: [`ExtractError::Empty`] for blank output,
//! [`ExtractError::Refusal`] when the model declines, and
//! [`ExtractError::NoCode`] when nothing survives stripping.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExtractError {
    #[error("model returned no text")]
    Empty,

    #[error("model declined to produce code")]
    Refusal,

    #[error("no code block could be isolated")]
    NoCode,
}

const MARKERS: &[&str] = &["CORRECTED CODE:", "FIXED CODE:"];

const LEADING_PROSE: &[&str] = &[
    "here is",
    "here's",
    "sure!",
    "sure,",
    "sure.",
    "certainly!",
    "certainly,",
    "certainly.",
    "of course",
    "okay,",
    "okay.",
    "ok,",
    "below is",
    "the corrected",
    "the fixed",
    "i have",
    "i've",
];

const REFUSALS: &[&str] = &[
    "i cannot",
    "i can't",
    "i'm sorry",
    "sorry,",
    "sorry.",
    "sorry!",
    "as an ai",
    "i am unable",
    "i'm unable",
];

const TRAILING_PROSE: &[&str] = &[
    "this ",
    "these changes",
    "the changes",
    "changes made",
    "explanation",
    "note:",
    "in this",
    "the above",
    "i have",
    "i've",
    "i hope",
    "let me know",
    "hope this",
];

fn starts_with_any(line: &str, prefixes: &[&str]) -> bool {
    let lower = line.trim_start().to_ascii_lowercase();
    prefixes.iter().any(|p| lower.starts_with(p))
}

/// Extract the candidate file body from raw model output.
///
/// The result has no leading or trailing blank lines and no trailing
/// newline; callers restore the original file's line ending convention.
pub fn extract_code(raw: &str) -> Result<String, ExtractError> {
    let text = raw.replace("\r\n", "\n");
    if text.trim().is_empty() {
        return Err(ExtractError::Empty);
    }
    let lines: Vec<&str> = text.lines().collect();

    if let Some(block) = longest_fenced_block(&lines) {
        let block = trim_blank_lines(&block);
        if block.is_empty() {
            return Err(ExtractError::NoCode);
        }
        return Ok(block.join("\n"));
    }

    let body = match marker_position(&lines) {
        Some((idx, rest)) => {
            let mut body = Vec::with_capacity(lines.len() - idx);
            if !rest.trim().is_empty() {
                body.push(rest.trim_start());
            }
            body.extend_from_slice(&lines[idx + 1..]);
            body
        }
        None => lines,
    };

    let body = strip_prose(trim_blank_lines(&body))?;
    if body.is_empty() {
        return Err(ExtractError::NoCode);
    }
    Ok(body.join("\n"))
}

fn is_fence(line: &str) -> bool {
    line.trim_start().starts_with("```")
}

/// The longest fenced block by trimmed length; the first wins ties.
fn longest_fenced_block<'a>(lines: &[&'a str]) -> Option<Vec<&'a str>> {
    let mut blocks: Vec<Vec<&'a str>> = Vec::new();
    let mut current: Option<Vec<&'a str>> = None;

    for &line in lines {
        match current.take() {
            None if is_fence(line) => current = Some(Vec::new()),
            None => {}
            Some(block) if is_fence(line) => blocks.push(block),
            Some(mut block) => {
                block.push(line);
                current = Some(block);
            }
        }
    }
    if let Some(block) = current {
        blocks.push(block);
    }

    let mut best: Option<Vec<&'a str>> = None;
    let mut best_len = 0usize;
    for block in blocks {
        let len: usize = block.iter().map(|l| l.trim().len()).sum();
        if best.is_none() || len > best_len {
            best_len = len;
            best = Some(block);
        }
    }
    best
}

fn marker_position<'a>(lines: &[&'a str]) -> Option<(usize, &'a str)> {
    lines.iter().enumerate().find_map(|(idx, line)| {
        MARKERS
            .iter()
            .find_map(|m| line.find(m).map(|pos| (idx, &line[pos + m.len()..])))
    })
}

fn trim_blank_lines<'a>(lines: &[&'a str]) -> Vec<&'a str> {
    let start = lines.iter().position(|l| !l.trim().is_empty());
    let end = lines.iter().rposition(|l| !l.trim().is_empty());
    match (start, end) {
        (Some(start), Some(end)) => lines[start..=end].to_vec(),
        _ => Vec::new(),
    }
}

fn strip_prose(mut lines: Vec<&str>) -> Result<Vec<&str>, ExtractError> {
    if let Some(first) = lines.first() {
        if starts_with_any(first, REFUSALS) {
            return Err(ExtractError::Refusal);
        }
    }

    while let Some(first) = lines.first() {
        if !starts_with_any(first, LEADING_PROSE) {
            break;
        }
        lines.remove(0);
        lines = trim_blank_lines(&lines);
    }

    // Drop trailing paragraphs that read as commentary.
    while let Some(blank) = lines.iter().rposition(|l| l.trim().is_empty()) {
        if !is_commentary(&lines[blank + 1..]) {
            break;
        }
        lines.truncate(blank);
        lines = trim_blank_lines(&lines);
    }

    Ok(lines)
}

/// A paragraph is commentary only when it is sentence-shaped: it opens
/// with a capitalized commentary phrase, ends with sentence punctuation,
/// and has no line that looks like code.
fn is_commentary(paragraph: &[&str]) -> bool {
    let (Some(first), Some(last)) = (paragraph.first(), paragraph.last()) else {
        return false;
    };
    let first = first.trim();
    let opens_sentence = first.starts_with(|c: char| c.is_ascii_uppercase())
        && starts_with_any(first, TRAILING_PROSE);
    let closes_sentence = last.trim_end().ends_with(['.', '!', '?']);
    let looks_like_code = paragraph.iter().any(|line| {
        let trimmed = line.trim();
        line.starts_with(char::is_whitespace)
            || trimmed.contains(" = ")
            || trimmed.ends_with([';', '{', '}'])
    });
    opens_sentence && closes_sentence && !looks_like_code
}
