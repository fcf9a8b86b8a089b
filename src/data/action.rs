//! Normalized representation of the operations a model can request.
//!
//! Actions are produced only by the parser and are never validated on
//! construction; range checking happens when the patch engine applies them.

use std::fmt;

pub const OPEN_FILE: &str = "open_file";
pub const EDIT_FILE: &str = "edit_file";
/// Older spelling of `edit_file`, still emitted by some models.
pub const WRITE_FILE: &str = "write_file";

/// The kind of line mutation an edit performs
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub enum EditOperation {
    /// Remove `start_line..=end_line` and put the content in their place
    #[default]
    Replace,
    /// Put the content before `start_line`
    Insert,
    /// An operation name the patch engine does not support
    Other(String),
}

impl EditOperation {
    /// Maps a wire name to an operation. Matching is case-insensitive and
    /// ignores surrounding whitespace.
    pub fn from_name(name: &str) -> Self {
        let normalized = name.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "replace" => EditOperation::Replace,
            "insert" => EditOperation::Insert,
            _ => EditOperation::Other(name.trim().to_string()),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            EditOperation::Replace => "replace",
            EditOperation::Insert => "insert",
            EditOperation::Other(name) => name,
        }
    }

    pub fn is_supported(&self) -> bool {
        !matches!(self, EditOperation::Other(_))
    }
}

impl fmt::Display for EditOperation {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Request for a file's content to be sent back as context
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenFileRequest {
    pub path: String,
}

impl OpenFileRequest {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }
}

/// A single line-range mutation of one file
///
/// Line numbers are 1-based. For a replace, `end_line` is the last line
/// removed (inclusive). For an insert, `start_line` is the line the content
/// goes in front of and `end_line` is ignored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditFileAction {
    pub path: String,
    pub content: String,
    pub start_line: usize,
    pub end_line: usize,
    pub operation: EditOperation,
}

impl EditFileAction {
    pub fn replace(path: impl Into<String>, start_line: usize, end_line: usize, content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
            start_line,
            end_line,
            operation: EditOperation::Replace,
        }
    }

    pub fn insert(path: impl Into<String>, start_line: usize, content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
            start_line,
            end_line: start_line,
            operation: EditOperation::Insert,
        }
    }

    /// The content split into the lines it will occupy in the file.
    ///
    /// Empty content occupies no lines, so an empty replace deletes its range
    /// and an empty insert changes nothing. Line terminators are dropped
    /// (`\r\n` included); the file's own ending is used on write.
    pub fn content_lines(&self) -> Vec<String> {
        if self.content.is_empty() {
            return Vec::new();
        }
        self.content
            .split('\n')
            .map(|line| line.strip_suffix('\r').unwrap_or(line).to_string())
            .collect()
    }
}

/// One operation requested by the model
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    OpenFile(OpenFileRequest),
    EditFile(EditFileAction),
}

impl Action {
    /// Type discriminator as it appears on the wire
    pub fn kind(&self) -> &'static str {
        match self {
            Action::OpenFile(_) => OPEN_FILE,
            Action::EditFile(_) => EDIT_FILE,
        }
    }

    pub fn path(&self) -> &str {
        match self {
            Action::OpenFile(request) => &request.path,
            Action::EditFile(edit) => &edit.path,
        }
    }

    pub fn as_edit(&self) -> Option<&EditFileAction> {
        match self {
            Action::EditFile(edit) => Some(edit),
            Action::OpenFile(_) => None,
        }
    }

    pub fn as_open(&self) -> Option<&OpenFileRequest> {
        match self {
            Action::OpenFile(request) => Some(request),
            Action::EditFile(_) => None,
        }
    }
}

impl From<OpenFileRequest> for Action {
    fn from(request: OpenFileRequest) -> Self {
        Action::OpenFile(request)
    }
}

impl From<EditFileAction> for Action {
    fn from(edit: EditFileAction) -> Self {
        Action::EditFile(edit)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Action::OpenFile(request) => write!(f, "open_file {}", request.path),
            Action::EditFile(edit) => write!(
                f,
                "edit_file {} {} {}-{} ({} line(s))",
                edit.path,
                edit.operation,
                edit.start_line,
                edit.end_line,
                edit.content_lines().len()
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_discriminator() {
        let open: Action = OpenFileRequest::new("src/main.rs").into();
        let edit: Action = EditFileAction::replace("src/main.rs", 1, 2, "x").into();
        assert_eq!(open.kind(), "open_file");
        assert_eq!(edit.kind(), "edit_file");
        assert_eq!(open.path(), "src/main.rs");
        assert!(edit.as_edit().is_some());
        assert!(open.as_edit().is_none());
    }

    #[test]
    fn test_operation_from_name() {
        assert_eq!(EditOperation::from_name("replace"), EditOperation::Replace);
        assert_eq!(EditOperation::from_name(" Insert "), EditOperation::Insert);
        assert_eq!(
            EditOperation::from_name("delete"),
            EditOperation::Other("delete".to_string())
        );
        assert!(!EditOperation::from_name("delete").is_supported());
    }

    #[test]
    fn test_empty_content_has_no_lines() {
        let edit = EditFileAction::replace("a.txt", 1, 1, "");
        assert!(edit.content_lines().is_empty());

        let edit = EditFileAction::insert("a.txt", 1, "one\n\nthree");
        assert_eq!(edit.content_lines(), vec!["one", "", "three"]);
    }
}
