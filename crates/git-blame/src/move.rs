//! Move and copy detection: attributing lines to a parent blob's content
//! even when the content moved to a different offset (or a different file).
//!
//! Scoped down from C git's `find_move_in_parent`/`find_copy_in_parent`:
//! those re-run `xdiff` per candidate hunk with a tight context window. Here
//! we do a direct contiguous-run search over split lines, which is enough to
//! catch the common case (a block relocated verbatim) without re-deriving a
//! full diff engine inside the blame crate.

use git_diff::algorithm::split_lines;

/// Find `needle` as a contiguous run within `haystack`, returning the
/// 0-based start line in `haystack` if found.
pub fn find_line_run(haystack: &[u8], needle: &[u8]) -> Option<u32> {
    if needle.is_empty() {
        return None;
    }
    let haystack_lines = split_lines(haystack);
    let needle_lines = split_lines(needle);
    if needle_lines.is_empty() || needle_lines.len() > haystack_lines.len() {
        return None;
    }

    'outer: for start in 0..=(haystack_lines.len() - needle_lines.len()) {
        for (i, needle_line) in needle_lines.iter().enumerate() {
            if haystack_lines[start + i] != *needle_line {
                continue 'outer;
            }
        }
        return Some(start as u32);
    }
    None
}
