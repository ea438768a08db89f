//! Text helpers shared by capability implementations.

/// Returns lines `start..end` of `contents` joined by `\n`.
///
/// Both bounds are clamped to the line count and `end` never precedes
/// `start`, so out-of-range requests yield a shorter or empty result.
#[must_use]
pub fn read_range(contents: &str, start: usize, end: usize) -> String {
    let lines: Vec<&str> = contents.lines().collect();
    let start = start.min(lines.len());
    let end = end.clamp(start, lines.len());
    lines.get(start..end).unwrap_or_default().join("\n")
}

/// Derives `owner/name` from a git remote URL.
///
/// Handles HTTPS and scp-style SSH remotes and strips a trailing `.git`.
/// Returns `None` for an empty remote.
#[must_use]
pub fn repo_name_from_remote(remote: &str) -> Option<String> {
    let trimmed = remote.trim();
    let trimmed = trimmed.strip_suffix(".git").unwrap_or(trimmed);
    let trimmed = trimmed.trim_end_matches('/');
    if trimmed.is_empty() {
        return None;
    }

    let mut segments = trimmed.rsplit(['/', ':']).filter(|segment| !segment.is_empty());
    let name = segments.next()?;
    match segments.next() {
        Some(owner) => Some(format!("{owner}/{name}")),
        None => Some(name.to_owned()),
    }
}
