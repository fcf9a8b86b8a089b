use crate::contexts::workspace::{FileSystem, FsError};
use std::collections::HashSet;

/// Files rendered for the model, plus the ones that could not be read
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileContext {
    pub blob: String,
    pub included: Vec<String>,
    pub missing: Vec<(String, FsError)>,
}

impl FileContext {
    pub fn is_empty(&self) -> bool {
        self.included.is_empty()
    }
}

/// Serves `open_file` requests by rendering file contents into a prompt blob
pub struct FileContextProvider<F: FileSystem> {
    fs: F,
    number_lines: bool,
}

impl<F: FileSystem> FileContextProvider<F> {
    pub fn new(fs: F) -> Self {
        Self {
            fs,
            number_lines: true,
        }
    }

    /// Prefix every line with its 1-based number (on by default)
    pub fn number_lines(mut self, enabled: bool) -> Self {
        self.number_lines = enabled;
        self
    }

    /// Reads each distinct path once, in first-seen order
    pub fn read_files<S: AsRef<str>>(&self, paths: &[S]) -> FileContext {
        let mut context = FileContext::default();
        let mut seen = HashSet::new();

        for path in paths.iter().map(|p| p.as_ref().trim()) {
            if path.is_empty() || !seen.insert(path.to_string()) {
                continue;
            }

            match self.fs.read_text(path) {
                Ok(content) => {
                    context.blob.push_str(&self.render(path, &content));
                    context.included.push(path.to_string());
                }
                Err(e) => context.missing.push((path.to_string(), e)),
            }
        }

        context
    }

    fn render(&self, path: &str, content: &str) -> String {
        let mut out = format!("<file path=\"{}\">\n", path);
        if self.number_lines {
            let lines: Vec<&str> = content.split('\n').collect();
            let width = lines.len().to_string().len().max(4);
            for (i, line) in lines.iter().enumerate() {
                out.push_str(&format!("{:>width$} | {}\n", i + 1, line, width = width));
            }
        } else {
            out.push_str(content);
            if !content.ends_with('\n') {
                out.push('\n');
            }
        }
        out.push_str("</file>\n");
        out
    }
}
