//! Unified diffs between original and proposed file contents.

use std::path::Path;

use similar::TextDiff;

/// Lines of context around each hunk.
const CONTEXT_LINES: usize = 3;

/// Render a git-style unified diff for `file`.
///
/// Returns an empty string when the contents are identical.
pub fn unified_diff(file: &Path, original: &str, proposed: &str) -> String {
    if original == proposed {
        return String::new();
    }
    let name = file.to_string_lossy();
    TextDiff::from_lines(original, proposed)
        .unified_diff()
        .context_radius(CONTEXT_LINES)
        .header(&format!("a/{name}"), &format!("b/{name}"))
        .to_string()
}

/// Count (added, removed) lines.
pub fn diff_stats(original: &str, proposed: &str) -> (usize, usize) {
    let diff = TextDiff::from_lines(original, proposed);
    let mut added = 0;
    let mut removed = 0;
    for change in diff.iter_all_changes() {
        match change.tag() {
            similar::ChangeTag::Insert => added += 1,
            similar::ChangeTag::Delete => removed += 1,
            similar::ChangeTag::Equal => {}
        }
    }
    (added, removed)
}
