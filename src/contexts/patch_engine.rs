//! Line-indexed patching of file contents.
//!
//! Replace edits run first, bottom-up (descending `start_line`), so each one is
//! read against the file's original line numbers. Inserts then run in the
//! order given, against the lines as the replaces left them.

use crate::contexts::action_grouper::ActionGroup;
use crate::contexts::workspace::{FileSystem, FsError};
use crate::data::action::{EditFileAction, EditOperation};
use sha2::{Digest, Sha256};
use std::fmt;

/// Why an edit was left out of the patch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// After clamping to the file, the range holds no line
    EmptyRange,
    /// The range overlaps a replace that was already applied
    Overlap,
    /// Neither replace nor insert
    UnsupportedOperation,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            SkipReason::EmptyRange => write!(f, "empty range"),
            SkipReason::Overlap => write!(f, "overlaps another replace"),
            SkipReason::UnsupportedOperation => write!(f, "unsupported operation"),
        }
    }
}

/// An edit that was not applied, with its position in the input list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedEdit {
    pub index: usize,
    pub start_line: usize,
    pub end_line: usize,
    pub operation: String,
    pub reason: SkipReason,
}

impl fmt::Display for SkippedEdit {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "edit #{} ({} {}-{}): {}",
            self.index + 1,
            self.operation,
            self.start_line,
            self.end_line,
            self.reason
        )
    }
}

/// Errors that abort patching of one file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatchError {
    Io { path: String, message: String },
    /// Raised instead of skipping when strict ranges are enabled
    Range { path: String, skipped: Vec<SkippedEdit> },
    OutsideWorkspace(String),
}

impl fmt::Display for PatchError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            PatchError::Io { path, message } => {
                write!(f, "Failed to patch '{}': {}", path, message)
            }
            PatchError::Range { path, skipped } => {
                let details: Vec<String> = skipped.iter().map(|s| s.to_string()).collect();
                write!(
                    f,
                    "Refusing to patch '{}': {}",
                    path,
                    details.join("; ")
                )
            }
            PatchError::OutsideWorkspace(path) => {
                write!(f, "Refusing to patch '{}': path is outside the workspace", path)
            }
        }
    }
}

impl std::error::Error for PatchError {}

impl From<FsError> for PatchError {
    fn from(e: FsError) -> Self {
        match e {
            FsError::OutsideWorkspace(path) => PatchError::OutsideWorkspace(path),
            FsError::Io { path, message } => PatchError::Io { path, message },
        }
    }
}

/// What happened to one file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchReport {
    pub path: String,
    pub applied: usize,
    pub skipped: Vec<SkippedEdit>,
    pub lines_before: usize,
    pub lines_after: usize,
    pub sha256_before: String,
    pub sha256_after: String,
    /// False for dry runs
    pub written: bool,
}

impl PatchReport {
    pub fn changed(&self) -> bool {
        self.sha256_before != self.sha256_after
    }
}

fn sha256_hex(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    hex::encode(hasher.finalize())
}

fn skipped(index: usize, edit: &EditFileAction, reason: SkipReason) -> SkippedEdit {
    SkippedEdit {
        index,
        start_line: edit.start_line,
        end_line: edit.end_line,
        operation: edit.operation.name().to_string(),
        reason,
    }
}

/// Applies edits to a line sequence without touching the disk.
///
/// Returns the new lines and the edits that were skipped.
pub fn apply_to_lines(
    mut lines: Vec<String>,
    edits: &[EditFileAction],
) -> (Vec<String>, Vec<SkippedEdit>) {
    let mut skips = Vec::new();
    let mut replaces: Vec<(usize, &EditFileAction)> = Vec::new();
    let mut inserts: Vec<(usize, &EditFileAction)> = Vec::new();

    for (index, edit) in edits.iter().enumerate() {
        match edit.operation {
            EditOperation::Replace => replaces.push((index, edit)),
            EditOperation::Insert => inserts.push((index, edit)),
            EditOperation::Other(_) => {
                skips.push(skipped(index, edit, SkipReason::UnsupportedOperation))
            }
        }
    }

    // Stable, so equal start lines keep their input order.
    replaces.sort_by(|a, b| b.1.start_line.cmp(&a.1.start_line));

    let original_len = lines.len();
    // Lowest start index of any replace applied so far
    let mut floor: Option<usize> = None;

    for (index, edit) in replaces {
        let start = edit.start_line.saturating_sub(1);
        let end = match (edit.end_line.checked_sub(1), original_len.checked_sub(1)) {
            (Some(end), Some(last)) => end.min(last),
            _ => {
                skips.push(skipped(index, edit, SkipReason::EmptyRange));
                continue;
            }
        };
        if start > end {
            skips.push(skipped(index, edit, SkipReason::EmptyRange));
            continue;
        }
        if floor.is_some_and(|floor| end >= floor) {
            skips.push(skipped(index, edit, SkipReason::Overlap));
            continue;
        }

        lines.splice(start..=end, edit.content_lines());
        floor = Some(start);
    }

    for (_, edit) in inserts {
        let at = edit.start_line.saturating_sub(1).min(lines.len());
        lines.splice(at..at, edit.content_lines());
    }

    skips.sort_by_key(|s| s.index);
    (lines, skips)
}

/// Rewrites files through a [`FileSystem`] according to edit actions
pub struct PatchEngine<F: FileSystem> {
    fs: F,
    strict_ranges: bool,
    dry_run: bool,
}

impl<F: FileSystem> PatchEngine<F> {
    pub fn new(fs: F) -> Self {
        Self {
            fs,
            strict_ranges: false,
            dry_run: false,
        }
    }

    /// Fail the file instead of skipping edits that cannot be placed
    pub fn strict_ranges(mut self, strict: bool) -> Self {
        self.strict_ranges = strict;
        self
    }

    /// Compute the patch but never write it
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn file_system(&self) -> &F {
        &self.fs
    }

    pub fn apply_group(&self, group: &ActionGroup) -> Result<PatchReport, PatchError> {
        self.apply(&group.path, &group.edits)
    }

    /// Applies `edits` to the file at `path` and overwrites it.
    ///
    /// Nothing is written when reading fails or, in strict mode, when an
    /// edit would be skipped. CRLF files keep their line endings.
    pub fn apply(&self, path: &str, edits: &[EditFileAction]) -> Result<PatchReport, PatchError> {
        let original = self.fs.read_text(path)?;
        let crlf = original.contains("\r\n");
        let lines: Vec<String> = original
            .split('\n')
            .map(|line| {
                if crlf {
                    line.strip_suffix('\r').unwrap_or(line).to_string()
                } else {
                    line.to_string()
                }
            })
            .collect();
        let lines_before = lines.len();

        let (patched, skipped) = apply_to_lines(lines, edits);
        if self.strict_ranges && !skipped.is_empty() {
            return Err(PatchError::Range {
                path: path.to_string(),
                skipped,
            });
        }

        let text = patched.join(if crlf { "\r\n" } else { "\n" });
        if !self.dry_run {
            self.fs.write_text(path, &text)?;
        }

        Ok(PatchReport {
            path: path.to_string(),
            applied: edits.len() - skipped.len(),
            skipped,
            lines_before,
            lines_after: patched.len(),
            sha256_before: sha256_hex(&original),
            sha256_after: sha256_hex(&text),
            written: !self.dry_run,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::collections::HashMap;

    #[derive(Default)]
    struct MemoryFileSystem {
        files: RefCell<HashMap<String, String>>,
        fail_writes: bool,
    }

    impl MemoryFileSystem {
        fn with_file(path: &str, text: &str) -> Self {
            let fs = Self::default();
            fs.files.borrow_mut().insert(path.to_string(), text.to_string());
            fs
        }

        fn get(&self, path: &str) -> String {
            self.files.borrow().get(path).cloned().unwrap_or_default()
        }
    }

    impl FileSystem for MemoryFileSystem {
        fn read_text(&self, path: &str) -> Result<String, FsError> {
            self.files.borrow().get(path).cloned().ok_or(FsError::Io {
                path: path.to_string(),
                message: "not found".to_string(),
            })
        }

        fn write_text(&self, path: &str, text: &str) -> Result<(), FsError> {
            if self.fail_writes {
                return Err(FsError::Io {
                    path: path.to_string(),
                    message: "read-only".to_string(),
                });
            }
            self.files.borrow_mut().insert(path.to_string(), text.to_string());
            Ok(())
        }
    }

    fn lines(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_replace_range() {
        let edits = vec![EditFileAction::replace("f", 2, 4, "new line2\nnew line3")];
        let (result, skipped) =
            apply_to_lines(lines(&["line1", "line2", "line3", "line4", "line5"]), &edits);
        assert_eq!(result, lines(&["line1", "new line2", "new line3", "line5"]));
        assert!(skipped.is_empty());
    }

    #[test]
    fn test_insert_before_line() {
        let edits = vec![EditFileAction::insert("f", 2, "new line")];
        let (result, _) = apply_to_lines(lines(&["line1", "line2", "line3"]), &edits);
        assert_eq!(result, lines(&["line1", "new line", "line2", "line3"]));
    }

    #[test]
    fn test_replace_then_insert_against_replaced_lines() {
        let edits = vec![
            EditFileAction::replace("f", 2, 3, "new line2"),
            EditFileAction::insert("f", 4, "inserted line"),
        ];
        let (result, _) =
            apply_to_lines(lines(&["line1", "line2", "line3", "line4", "line5"]), &edits);
        assert_eq!(
            result,
            lines(&["line1", "new line2", "line4", "inserted line", "line5"])
        );
    }

    #[test]
    fn test_insert_listed_first_still_runs_after_replace() {
        let edits = vec![
            EditFileAction::insert("f", 1, "header"),
            EditFileAction::replace("f", 1, 1, "first"),
        ];
        let (result, _) = apply_to_lines(lines(&["one", "two"]), &edits);
        assert_eq!(result, lines(&["header", "first", "two"]));
    }

    #[test]
    fn test_end_line_clamps_to_last_line() {
        let edits = vec![EditFileAction::replace("f", 2, 99, "tail")];
        let (result, skipped) = apply_to_lines(lines(&["a", "b", "c"]), &edits);
        assert_eq!(result, lines(&["a", "tail"]));
        assert!(skipped.is_empty());
    }

    #[test]
    fn test_start_beyond_end_of_file_is_skipped() {
        let edits = vec![EditFileAction::replace("f", 10, 12, "x")];
        let (result, skipped) = apply_to_lines(lines(&["a", "b"]), &edits);
        assert_eq!(result, lines(&["a", "b"]));
        assert_eq!(skipped.len(), 1);
        assert_eq!(skipped[0].reason, SkipReason::EmptyRange);
    }

    #[test]
    fn test_zero_end_line_is_skipped() {
        let edits = vec![EditFileAction::replace("f", 0, 0, "x")];
        let (_, skipped) = apply_to_lines(lines(&["a"]), &edits);
        assert_eq!(skipped[0].reason, SkipReason::EmptyRange);
    }

    #[test]
    fn test_multiple_replaces_use_original_numbering() {
        // Listed top-down; the first grows the file by one line.
        let edits = vec![
            EditFileAction::replace("f", 1, 1, "A1\nA2"),
            EditFileAction::replace("f", 3, 4, "C"),
        ];
        let (result, skipped) = apply_to_lines(lines(&["a", "b", "c", "d", "e"]), &edits);
        assert_eq!(result, lines(&["A1", "A2", "b", "C", "e"]));
        assert!(skipped.is_empty());
    }

    #[test]
    fn test_overlapping_replace_is_skipped() {
        let edits = vec![
            EditFileAction::replace("f", 2, 4, "X"),
            EditFileAction::replace("f", 3, 5, "Y"),
        ];
        let (result, skipped) = apply_to_lines(lines(&["1", "2", "3", "4", "5"]), &edits);
        assert_eq!(result, lines(&["1", "2", "Y"]));
        assert_eq!(skipped.len(), 1);
        assert_eq!(skipped[0].index, 0);
        assert_eq!(skipped[0].reason, SkipReason::Overlap);
    }

    #[test]
    fn test_empty_replace_deletes_and_empty_insert_is_noop() {
        let edits = vec![
            EditFileAction::replace("f", 2, 2, ""),
            EditFileAction::insert("f", 1, ""),
        ];
        let (result, _) = apply_to_lines(lines(&["a", "b", "c"]), &edits);
        assert_eq!(result, lines(&["a", "c"]));
    }

    #[test]
    fn test_insert_past_end_appends() {
        let edits = vec![
            EditFileAction::insert("f", 0, "top"),
            EditFileAction::insert("f", 50, "bottom"),
        ];
        let (result, _) = apply_to_lines(lines(&["a"]), &edits);
        assert_eq!(result, lines(&["top", "a", "bottom"]));
    }

    #[test]
    fn test_unsupported_operation_is_skipped() {
        let mut edit = EditFileAction::replace("f", 1, 1, "");
        edit.operation = EditOperation::from_name("delete");
        let (result, skipped) = apply_to_lines(lines(&["a"]), &[edit]);
        assert_eq!(result, lines(&["a"]));
        assert_eq!(skipped[0].reason, SkipReason::UnsupportedOperation);
    }

    #[test]
    fn test_apply_writes_file() {
        let fs = MemoryFileSystem::with_file("a.txt", "line1\nline2\nline3");
        let engine = PatchEngine::new(&fs);
        let report = engine
            .apply("a.txt", &[EditFileAction::insert("a.txt", 2, "new line")])
            .unwrap();

        assert_eq!(fs.get("a.txt"), "line1\nnew line\nline2\nline3");
        assert_eq!(report.applied, 1);
        assert_eq!((report.lines_before, report.lines_after), (3, 4));
        assert!(report.written);
        assert!(report.changed());
    }

    #[test]
    fn test_apply_preserves_trailing_newline_and_crlf() {
        let fs = MemoryFileSystem::with_file("a.txt", "a\r\nb\r\n");
        let engine = PatchEngine::new(&fs);
        engine
            .apply("a.txt", &[EditFileAction::replace("a.txt", 1, 1, "A")])
            .unwrap();
        assert_eq!(fs.get("a.txt"), "A\r\nb\r\n");
    }

    #[test]
    fn test_apply_crlf_content_takes_file_line_endings() {
        let fs = MemoryFileSystem::with_file("crlf.txt", "a\r\nb\r\n");
        fs.files
            .borrow_mut()
            .insert("lf.txt".to_string(), "a\nb\n".to_string());
        let engine = PatchEngine::new(&fs);

        engine
            .apply("crlf.txt", &[EditFileAction::replace("crlf.txt", 1, 1, "A1\r\nA2")])
            .unwrap();
        engine
            .apply("lf.txt", &[EditFileAction::replace("lf.txt", 1, 1, "A1\r\nA2")])
            .unwrap();

        assert_eq!(fs.get("crlf.txt"), "A1\r\nA2\r\nb\r\n");
        assert_eq!(fs.get("lf.txt"), "A1\nA2\nb\n");
    }

    #[test]
    fn test_apply_dry_run_leaves_file() {
        let fs = MemoryFileSystem::with_file("a.txt", "a\nb");
        let engine = PatchEngine::new(&fs).dry_run(true);
        let report = engine
            .apply("a.txt", &[EditFileAction::replace("a.txt", 1, 2, "z")])
            .unwrap();
        assert_eq!(fs.get("a.txt"), "a\nb");
        assert!(!report.written);
        assert_eq!(report.lines_after, 1);
    }

    #[test]
    fn test_apply_strict_ranges_refuses() {
        let fs = MemoryFileSystem::with_file("a.txt", "a\nb");
        let engine = PatchEngine::new(&fs).strict_ranges(true);
        let result = engine.apply(
            "a.txt",
            &[
                EditFileAction::replace("a.txt", 1, 1, "A"),
                EditFileAction::replace("a.txt", 9, 9, "Z"),
            ],
        );
        match result {
            Err(PatchError::Range { path, skipped }) => {
                assert_eq!(path, "a.txt");
                assert_eq!(skipped.len(), 1);
            }
            other => panic!("Expected Range error, got {:?}", other),
        }
        assert_eq!(fs.get("a.txt"), "a\nb");
    }

    #[test]
    fn test_apply_missing_file_is_io_error() {
        let fs = MemoryFileSystem::default();
        let engine = PatchEngine::new(&fs);
        let result = engine.apply("nope.txt", &[EditFileAction::insert("nope.txt", 1, "x")]);
        assert!(matches!(result, Err(PatchError::Io { .. })));
    }

    #[test]
    fn test_apply_write_failure_is_io_error() {
        let fs = MemoryFileSystem {
            fail_writes: true,
            ..MemoryFileSystem::with_file("a.txt", "a")
        };
        let engine = PatchEngine::new(&fs);
        let result = engine.apply("a.txt", &[EditFileAction::insert("a.txt", 1, "x")]);
        assert!(matches!(result, Err(PatchError::Io { .. })));
    }

    #[test]
    fn test_apply_group() {
        let fs = MemoryFileSystem::with_file("g.txt", "1\n2\n3");
        let engine = PatchEngine::new(&fs);
        let group = ActionGroup {
            path: "g.txt".to_string(),
            edits: vec![EditFileAction::replace("g.txt", 3, 3, "three")],
        };
        let report = engine.apply_group(&group).unwrap();
        assert_eq!(report.path, "g.txt");
        assert_eq!(fs.get("g.txt"), "1\n2\nthree");
    }
}
