//! Line-positional diff between two snapshots.
//!
//! Line `i` of one snapshot is assumed to describe the same thing as line
//! `i` of the next, so a diff is just the lines of the new snapshot whose
//! content changed at their position. No general-purpose diff algorithm
//! is needed and the result carries no position markers.

use bytes::Bytes;

use crate::snapshot::Snapshot;

/// Split a buffer into `\n`-separated lines.
///
/// A final newline does not produce a trailing empty line, and an empty
/// buffer has no lines at all.
pub fn split_lines(data: &[u8]) -> Vec<&[u8]> {
    if data.is_empty() {
        return Vec::new();
    }
    let mut lines: Vec<&[u8]> = data.split(|&b| b == b'\n').collect();
    if lines.last().is_some_and(|line| line.is_empty()) {
        lines.pop();
    }
    lines
}

/// Compute the changed-lines payload from `old` to `new`.
///
/// - With no `old`, every line of `new` is changed.
/// - A line of `new` past the end of `old` is always changed.
/// - Lines only present in `old` are ignored.
///
/// Changed lines keep their original order and are joined with `\n`.
/// Returns `None` when no line changed, which means nothing should be
/// broadcast.
pub fn diff(old: Option<&Snapshot>, new: &Snapshot) -> Option<Bytes> {
    let new_lines = split_lines(new.as_bytes());

    let changed: Vec<&[u8]> = match old {
        None => new_lines,
        Some(old) => {
            let old_lines = split_lines(old.as_bytes());
            new_lines
                .into_iter()
                .enumerate()
                .filter(|(i, line)| old_lines.get(*i) != Some(line))
                .map(|(_, line)| line)
                .collect()
        }
    };

    if changed.is_empty() {
        return None;
    }
    Some(Bytes::from(changed.join(&b'\n')))
}
