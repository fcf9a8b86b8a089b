//! Versioned description of the wire protocol spoken with the model.
//!
//! The same value drives the instructions sent to the model, the parser that
//! reads its replies and the canonical rendering of actions, so the three can
//! never drift apart.

use crate::data::action::{Action, EditFileAction, OpenFileRequest};
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

pub const PROTOCOL_VERSION: u32 = 1;

pub(crate) const OPEN_TAG: &str = "<open_file>";
pub(crate) const OPEN_CLOSE_TAG: &str = "</open_file>";
pub(crate) const EDIT_TAG: &str = "<edit_file>";
pub(crate) const EDIT_CLOSE_TAG: &str = "</edit_file>";
pub(crate) const WRITE_TAG: &str = "<write_file>";
pub(crate) const WRITE_CLOSE_TAG: &str = "</write_file>";
pub(crate) const PATH_HEADER: &str = "<path>";
pub(crate) const START_LINE_HEADER: &str = "<start_line>";
pub(crate) const END_LINE_HEADER: &str = "<end_line>";
pub(crate) const ACTION_HEADER: &str = "<action>";
pub(crate) const CONTENTS_MARKER: &str = "<file_contents>";

/// Wire encoding of actions in a model reply
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Grammar {
    /// Tag-delimited blocks embedded in free text
    Tagged,
    /// A JSON document `{ "actions": [...] }`, possibly surrounded by prose
    Json,
}

impl Grammar {
    pub fn name(&self) -> &'static str {
        match self {
            Grammar::Tagged => "tagged",
            Grammar::Json => "json",
        }
    }
}

impl fmt::Display for Grammar {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Grammar {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "tagged" | "tag" | "text" => Ok(Grammar::Tagged),
            "json" => Ok(Grammar::Json),
            other => Err(format!(
                "unknown grammar '{}' (expected 'tagged' or 'json')",
                other
            )),
        }
    }
}

/// JSON shape of one action, shared by the renderer and the instructions
#[derive(Serialize)]
struct WireAction<'a> {
    #[serde(rename = "type")]
    kind: &'a str,
    path: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    start_line: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    end_line: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    action: Option<&'a str>,
}

impl<'a> From<&'a Action> for WireAction<'a> {
    fn from(action: &'a Action) -> Self {
        match action {
            Action::OpenFile(request) => WireAction {
                kind: action.kind(),
                path: &request.path,
                content: None,
                start_line: None,
                end_line: None,
                action: None,
            },
            Action::EditFile(edit) => WireAction {
                kind: action.kind(),
                path: &edit.path,
                content: Some(&edit.content),
                start_line: Some(edit.start_line),
                end_line: Some(edit.end_line),
                action: Some(edit.operation.name()),
            },
        }
    }
}

#[derive(Serialize)]
struct WireDocument<'a> {
    actions: Vec<WireAction<'a>>,
}

/// The protocol a session speaks: which grammar, at which version
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Protocol {
    pub version: u32,
    pub grammar: Grammar,
}

impl Protocol {
    pub fn new(grammar: Grammar) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            grammar,
        }
    }

    pub fn tagged() -> Self {
        Self::new(Grammar::Tagged)
    }

    pub fn json() -> Self {
        Self::new(Grammar::Json)
    }

    /// Describes the reply format to the model
    pub fn instructions(&self) -> String {
        let mut text = String::new();
        text.push_str(&format!(
            "You are editing a source tree on the user's machine (edit protocol v{}, {} format).\n",
            self.version, self.grammar
        ));
        text.push_str(
            "You can request files to read and you can edit files. Paths are relative to the working directory.\n\
             Line numbers are 1-based. For \"replace\", start_line..end_line (inclusive) is removed and the content is put in its place.\n\
             For \"insert\", the content is placed before start_line. Only edit files you have opened.\n\n",
        );

        match self.grammar {
            Grammar::Tagged => {
                text.push_str("To read a file reply with:\n");
                text.push_str(&format!("{}\npath/to/file\n{}\n\n", OPEN_TAG, OPEN_CLOSE_TAG));
                text.push_str("To edit a file reply with:\n");
                text.push_str(&self.render(&Action::EditFile(EditFileAction::replace(
                    "path/to/file",
                    1,
                    3,
                    "new line 1\nnew line 2",
                ))));
                text.push_str("\n\n");
            }
            Grammar::Json => {
                text.push_str("Reply with a single JSON object and nothing else, for example:\n");
                let example = vec![
                    Action::OpenFile(OpenFileRequest::new("path/to/file")),
                    Action::EditFile(EditFileAction::replace(
                        "path/to/file",
                        1,
                        3,
                        "new line 1\nnew line 2",
                    )),
                ];
                text.push_str(&self.render_all(&example));
                text.push_str("\n\n\"type\" is \"open_file\" or \"edit_file\"; \"action\" is \"replace\" or \"insert\".\n\n");
            }
        }

        text.push_str("DO NOT REPLY WITH ANY OTHER FORM OF RESPONSE.");
        text
    }

    /// Prompt sent after requested files have been supplied
    pub fn follow_up(&self) -> &'static str {
        "Do you need more context to solve the USER TASK? If you need more files, request them. \
         Otherwise reply with the edits that solve the task."
    }

    /// Canonical wire text for one action
    pub fn render(&self, action: &Action) -> String {
        match self.grammar {
            Grammar::Tagged => render_tagged(action),
            Grammar::Json => serde_json::to_string_pretty(&WireAction::from(action))
                .unwrap_or_else(|_| "{}".to_string()),
        }
    }

    /// Canonical wire text for a whole reply
    pub fn render_all(&self, actions: &[Action]) -> String {
        match self.grammar {
            Grammar::Tagged => actions
                .iter()
                .map(render_tagged)
                .collect::<Vec<_>>()
                .join("\n\n"),
            Grammar::Json => {
                let document = WireDocument {
                    actions: actions.iter().map(WireAction::from).collect(),
                };
                serde_json::to_string_pretty(&document).unwrap_or_else(|_| "{}".to_string())
            }
        }
    }
}

impl Default for Protocol {
    fn default() -> Self {
        Self::json()
    }
}

fn render_tagged(action: &Action) -> String {
    match action {
        Action::OpenFile(request) => {
            format!("{}\n{}\n{}", OPEN_TAG, request.path, OPEN_CLOSE_TAG)
        }
        Action::EditFile(edit) => format!(
            "{}\n{}{}\n{}{}\n{}{}\n{}{}\n{}\n{}\n\n{}",
            EDIT_TAG,
            PATH_HEADER,
            edit.path,
            START_LINE_HEADER,
            edit.start_line,
            END_LINE_HEADER,
            edit.end_line,
            ACTION_HEADER,
            edit.operation,
            CONTENTS_MARKER,
            edit.content,
            EDIT_CLOSE_TAG
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grammar_from_str() {
        assert_eq!("json".parse::<Grammar>(), Ok(Grammar::Json));
        assert_eq!("Tagged".parse::<Grammar>(), Ok(Grammar::Tagged));
        assert!("yaml".parse::<Grammar>().is_err());
    }

    #[test]
    fn test_render_tagged_open_file() {
        let rendered = Protocol::tagged().render(&Action::OpenFile(OpenFileRequest::new("src/lib.rs")));
        assert_eq!(rendered, "<open_file>\nsrc/lib.rs\n</open_file>");
    }

    #[test]
    fn test_render_tagged_edit_file() {
        let edit = EditFileAction::insert("a.txt", 4, "x\ny");
        let rendered = Protocol::tagged().render(&Action::EditFile(edit));
        assert_eq!(
            rendered,
            "<edit_file>\n<path>a.txt\n<start_line>4\n<end_line>4\n<action>insert\n<file_contents>\nx\ny\n\n</edit_file>"
        );
    }

    #[test]
    fn test_render_json_document() {
        let actions = vec![Action::OpenFile(OpenFileRequest::new("a.txt"))];
        let rendered = Protocol::json().render_all(&actions);
        let value: serde_json::Value = serde_json::from_str(&rendered).unwrap();
        assert_eq!(value["actions"][0]["type"], "open_file");
        assert_eq!(value["actions"][0]["path"], "a.txt");
        assert!(value["actions"][0].get("content").is_none());
    }

    #[test]
    fn test_instructions_mention_version_and_format() {
        let text = Protocol::json().instructions();
        assert!(text.contains("v1"));
        assert!(text.contains("\"actions\""));

        let text = Protocol::tagged().instructions();
        assert!(text.contains("<open_file>"));
        assert!(text.contains("<file_contents>"));
    }
}
