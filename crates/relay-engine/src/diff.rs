//! Line-level unified diffs.
//!
//! [`create_patch`] renders a full patch with descriptive header lines;
//! [`strip_patch_header`] cuts it down to the hunks:
//! ```text
//! @@ -start,count +start,count @@
//!  context line
//! -removed line
//! +added line
//! ```

pub const DEFAULT_CONTEXT_LINES: usize = 3;

const NO_NEWLINE_MARKER: &str = "\\ No newline at end of file";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EditOp {
    Equal(usize, usize), // old_idx, new_idx
    Delete(usize),       // old_idx
    Insert(usize),       // new_idx
}

/// Full unified patch of `old` → `new` for `path`, headers included.
pub fn create_patch(path: &str, old: &str, new: &str, context_lines: usize) -> String {
    let mut out = String::new();
    out.push_str(&format!("Index: {path}\n"));
    out.push_str(&"=".repeat(67));
    out.push('\n');
    out.push_str(&format!("--- {path}\n"));
    out.push_str(&format!("+++ {path}\n"));
    out.push_str(&generate_hunks(old, new, context_lines));
    out
}

/// Drop everything before the first `@@` line. A patch without hunks
/// (identical contents) becomes empty.
pub fn strip_patch_header(patch: &str) -> String {
    let lines: Vec<&str> = patch.split('\n').collect();
    match lines.iter().position(|line| line.starts_with("@@")) {
        Some(start) => lines[start..].join("\n"),
        None => String::new(),
    }
}

/// Hunks only (no header) between two strings.
pub fn generate_hunks(old: &str, new: &str, context_lines: usize) -> String {
    if old == new {
        return String::new();
    }

    // Lines keep their terminators, so a changed or missing line ending
    // counts as a changed line.
    let old_lines: Vec<&str> = old.split_inclusive('\n').collect();
    let new_lines: Vec<&str> = new.split_inclusive('\n').collect();

    let ops = compute_edit_ops(&old_lines, &new_lines);
    if ops.iter().all(|op| matches!(op, EditOp::Equal(..))) {
        return String::new();
    }

    format_hunks(&old_lines, &new_lines, &ops, context_lines)
}

/// LCS table + backtrack.
fn compute_edit_ops(old: &[&str], new: &[&str]) -> Vec<EditOp> {
    let old_len = old.len();
    let new_len = new.len();

    let mut dp = vec![vec![0u32; new_len + 1]; old_len + 1];
    for (i, old_line) in old.iter().enumerate() {
        for (j, new_line) in new.iter().enumerate() {
            dp[i + 1][j + 1] = if old_line == new_line {
                dp[i][j] + 1
            } else {
                dp[i + 1][j].max(dp[i][j + 1])
            };
        }
    }

    let mut ops = Vec::new();
    let mut i = old_len;
    let mut j = new_len;
    while i > 0 || j > 0 {
        if i > 0 && j > 0 && old[i - 1] == new[j - 1] {
            ops.push(EditOp::Equal(i - 1, j - 1));
            i -= 1;
            j -= 1;
        } else if j > 0 && (i == 0 || dp[i][j - 1] >= dp[i - 1][j]) {
            ops.push(EditOp::Insert(j - 1));
            j -= 1;
        } else {
            ops.push(EditOp::Delete(i - 1));
            i -= 1;
        }
    }
    ops.reverse();
    ops
}

/// Group changes whose context windows touch into one hunk each.
fn hunk_ranges(ops: &[EditOp], context_lines: usize) -> Vec<(usize, usize)> {
    let changes: Vec<usize> = ops
        .iter()
        .enumerate()
        .filter(|(_, op)| !matches!(op, EditOp::Equal(..)))
        .map(|(i, _)| i)
        .collect();

    let mut ranges: Vec<(usize, usize)> = Vec::new();
    for &idx in &changes {
        let start = idx.saturating_sub(context_lines);
        let end = (idx + 1 + context_lines).min(ops.len());
        match ranges.last_mut() {
            Some(last) if start <= last.1 => last.1 = end,
            _ => ranges.push((start, end)),
        }
    }
    ranges
}

fn format_hunks(old: &[&str], new: &[&str], ops: &[EditOp], context_lines: usize) -> String {
    // Lines of old/new consumed before each op index.
    let mut consumed = Vec::with_capacity(ops.len() + 1);
    let (mut old_pos, mut new_pos) = (0usize, 0usize);
    consumed.push((old_pos, new_pos));
    for op in ops {
        match op {
            EditOp::Equal(..) => {
                old_pos += 1;
                new_pos += 1;
            }
            EditOp::Delete(_) => old_pos += 1,
            EditOp::Insert(_) => new_pos += 1,
        }
        consumed.push((old_pos, new_pos));
    }

    let mut output = String::new();
    for (start, end) in hunk_ranges(ops, context_lines) {
        let (old_before, new_before) = consumed[start];
        let (old_after, new_after) = consumed[end];
        let old_count = old_after - old_before;
        let new_count = new_after - new_before;
        // An empty side points at the line before the hunk.
        let old_start = if old_count == 0 { old_before } else { old_before + 1 };
        let new_start = if new_count == 0 { new_before } else { new_before + 1 };

        output.push_str(&format!(
            "@@ -{old_start},{old_count} +{new_start},{new_count} @@\n"
        ));
        for op in &ops[start..end] {
            let (marker, line) = match op {
                EditOp::Equal(oi, _) => (' ', old[*oi]),
                EditOp::Delete(oi) => ('-', old[*oi]),
                EditOp::Insert(ni) => ('+', new[*ni]),
            };
            output.push(marker);
            output.push_str(line);
            if !line.ends_with('\n') {
                output.push('\n');
                output.push_str(NO_NEWLINE_MARKER);
                output.push('\n');
            }
        }
    }

    output
}
