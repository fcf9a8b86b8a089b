use crate::data::action::{
    Action, EditFileAction, EditOperation, OpenFileRequest, EDIT_FILE, OPEN_FILE, WRITE_FILE,
};
use crate::data::protocol::{
    Grammar, Protocol, ACTION_HEADER, CONTENTS_MARKER, EDIT_CLOSE_TAG, EDIT_TAG, END_LINE_HEADER,
    OPEN_CLOSE_TAG, OPEN_TAG, PATH_HEADER, START_LINE_HEADER, WRITE_CLOSE_TAG, WRITE_TAG,
};
use serde::Deserialize;
use std::fmt;

/// Problems found while reading a reply. None of them stop the parse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseDiagnostic {
    /// The reply (or one block/element of it) does not follow the wire format
    MalformedProtocol(String),
    /// An element named an action type the protocol does not define
    UnknownActionType(String),
}

impl fmt::Display for ParseDiagnostic {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ParseDiagnostic::MalformedProtocol(details) => {
                write!(f, "Malformed protocol output: {}", details)
            }
            ParseDiagnostic::UnknownActionType(kind) => {
                write!(f, "Unknown action type '{}'", kind)
            }
        }
    }
}

impl std::error::Error for ParseDiagnostic {}

/// Everything recovered from one reply
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParseOutcome {
    /// Actions in the order they appeared in the reply
    pub actions: Vec<Action>,
    pub diagnostics: Vec<ParseDiagnostic>,
}

impl ParseOutcome {
    /// True when the reply contained no usable action
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn open_requests(&self) -> impl Iterator<Item = &OpenFileRequest> {
        self.actions.iter().filter_map(Action::as_open)
    }

    pub fn edits(&self) -> impl Iterator<Item = &EditFileAction> {
        self.actions.iter().filter_map(Action::as_edit)
    }

    fn malformed(&mut self, details: impl Into<String>) {
        self.diagnostics
            .push(ParseDiagnostic::MalformedProtocol(details.into()));
    }
}

/// Turns raw model replies into actions using the grammar of a protocol
#[derive(Debug, Clone, Copy, Default)]
pub struct ActionParser {
    protocol: Protocol,
}

impl ActionParser {
    pub fn new(protocol: Protocol) -> Self {
        Self { protocol }
    }

    pub fn protocol(&self) -> &Protocol {
        &self.protocol
    }

    /// Parses a reply. Never fails: an empty outcome means "no actions found".
    pub fn parse(&self, reply: &str) -> ParseOutcome {
        match self.protocol.grammar {
            Grammar::Tagged => parse_tagged(reply),
            Grammar::Json => parse_json(reply),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BlockKind {
    Open,
    Edit,
    Write,
}

impl BlockKind {
    fn detect(line: &str) -> Option<(BlockKind, usize)> {
        [
            (BlockKind::Open, OPEN_TAG),
            (BlockKind::Edit, EDIT_TAG),
            (BlockKind::Write, WRITE_TAG),
        ]
        .into_iter()
        .filter_map(|(kind, tag)| line.find(tag).map(|pos| (kind, pos)))
        .min_by_key(|(_, pos)| *pos)
    }

    fn open_tag(&self) -> &'static str {
        match self {
            BlockKind::Open => OPEN_TAG,
            BlockKind::Edit => EDIT_TAG,
            BlockKind::Write => WRITE_TAG,
        }
    }

    fn close_tag(&self) -> &'static str {
        match self {
            BlockKind::Open => OPEN_CLOSE_TAG,
            BlockKind::Edit => EDIT_CLOSE_TAG,
            BlockKind::Write => WRITE_CLOSE_TAG,
        }
    }
}

struct Block<'a> {
    kind: BlockKind,
    /// Text on the opening line after the opening tag
    inline: &'a str,
    /// Lines between the opening and the closing line
    body: Vec<&'a str>,
}

/// Scans a tag-delimited reply.
///
/// Outside a block every line is ignored until one contains an opening tag.
/// Inside a block only the matching closing tag ends it, so file contents may
/// mention other tags freely.
pub fn parse_tagged(reply: &str) -> ParseOutcome {
    let mut outcome = ParseOutcome::default();
    let mut current: Option<Block> = None;

    for line in reply.lines() {
        let closed = match current.as_mut() {
            Some(block) => {
                if line.contains(block.kind.close_tag()) {
                    true
                } else {
                    block.body.push(line);
                    false
                }
            }
            None => {
                let Some((kind, pos)) = BlockKind::detect(line) else {
                    continue;
                };
                let rest = &line[pos + kind.open_tag().len()..];
                match rest.find(kind.close_tag()) {
                    Some(end) => {
                        current = Some(Block {
                            kind,
                            inline: &rest[..end],
                            body: Vec::new(),
                        });
                        true
                    }
                    None => {
                        current = Some(Block {
                            kind,
                            inline: rest,
                            body: Vec::new(),
                        });
                        false
                    }
                }
            }
        };

        if closed {
            if let Some(block) = current.take() {
                match decode_block(&block) {
                    Ok(action) => outcome.actions.push(action),
                    Err(details) => outcome.malformed(details),
                }
            }
        }
    }

    if let Some(block) = current {
        outcome.malformed(format!(
            "{} block is never closed with {}",
            block.kind.open_tag(),
            block.kind.close_tag()
        ));
    }

    outcome
}

fn decode_block(block: &Block) -> Result<Action, String> {
    match block.kind {
        BlockKind::Open => decode_open_block(block),
        BlockKind::Edit | BlockKind::Write => decode_edit_block(block),
    }
}

fn strip_path_markup(text: &str) -> &str {
    let text = text.trim();
    let text = text.strip_prefix(PATH_HEADER).unwrap_or(text);
    text.strip_suffix("</path>").unwrap_or(text).trim()
}

fn decode_open_block(block: &Block) -> Result<Action, String> {
    // The path is the line after the opening tag; fall back to text on the
    // opening line itself for one-line blocks.
    let candidate = block
        .body
        .iter()
        .find(|line| !line.trim().is_empty())
        .copied()
        .unwrap_or(block.inline);
    let path = strip_path_markup(candidate);

    if path.is_empty() {
        return Err(format!("{} block without a path", OPEN_TAG));
    }
    Ok(Action::OpenFile(OpenFileRequest::new(path)))
}

fn parse_header_number(rest: &str, header: &str) -> Result<usize, String> {
    let value = rest.trim();
    let value = value
        .strip_suffix(&header.replacen('<', "</", 1))
        .unwrap_or(value)
        .trim();
    value
        .parse::<usize>()
        .map_err(|_| format!("invalid {} value '{}'", header, value))
}

fn decode_edit_block(block: &Block) -> Result<Action, String> {
    let tag = block.kind.open_tag();
    let mut path: Option<String> = None;
    let mut awaiting_path = false;
    let mut start_line = 0;
    let mut end_line = 0;
    let mut operation = EditOperation::Replace;
    let mut content: Option<Vec<&str>> = None;

    for line in block.body.iter().copied() {
        if let Some(lines) = content.as_mut() {
            lines.push(line);
            continue;
        }

        let trimmed = line.trim();
        if let Some(rest) = trimmed.strip_prefix(CONTENTS_MARKER) {
            // Some models put the first content line on the marker line
            let mut lines = Vec::new();
            if !rest.is_empty() {
                lines.push(rest);
            }
            content = Some(lines);
        } else if let Some(rest) = trimmed.strip_prefix(PATH_HEADER) {
            let value = strip_path_markup(rest);
            if value.is_empty() {
                awaiting_path = true;
            } else {
                path = Some(value.to_string());
            }
        } else if let Some(rest) = trimmed.strip_prefix(START_LINE_HEADER) {
            start_line = parse_header_number(rest, START_LINE_HEADER)?;
        } else if let Some(rest) = trimmed.strip_prefix(END_LINE_HEADER) {
            end_line = parse_header_number(rest, END_LINE_HEADER)?;
        } else if let Some(rest) = trimmed.strip_prefix(ACTION_HEADER) {
            operation = EditOperation::from_name(rest.trim().trim_end_matches("</action>"));
        } else if awaiting_path && !trimmed.is_empty() && trimmed != "</path>" {
            path = Some(trimmed.to_string());
            awaiting_path = false;
        }
    }

    let path = path
        .filter(|p| !p.is_empty())
        .ok_or_else(|| format!("{} block without a {} header", tag, PATH_HEADER))?;
    let mut content = content
        .ok_or_else(|| format!("{} block for '{}' without {}", tag, path, CONTENTS_MARKER))?;
    // A single blank line before the closing tag is the block's own newline
    if content.len() > 1 && content.last().is_some_and(|line| line.is_empty()) {
        content.pop();
    }

    Ok(Action::EditFile(EditFileAction {
        path,
        content: content.join("\n"),
        start_line,
        end_line,
        operation,
    }))
}

#[derive(Deserialize)]
struct RawDocument {
    actions: Vec<serde_json::Value>,
}

/// Line numbers arrive as integers or, following the schema sent to the
/// model, as numeric strings.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawLine {
    Number(u64),
    Text(String),
}

impl RawLine {
    fn resolve(&self, field: &str) -> Result<usize, String> {
        match self {
            RawLine::Number(n) => usize::try_from(*n).map_err(|_| format!("{} out of range", field)),
            RawLine::Text(text) => text
                .trim()
                .parse::<usize>()
                .map_err(|_| format!("invalid {} '{}'", field, text)),
        }
    }
}

#[derive(Deserialize)]
struct RawAction {
    #[serde(rename = "type")]
    kind: String,
    path: Option<String>,
    content: Option<String>,
    start_line: Option<RawLine>,
    end_line: Option<RawLine>,
    action: Option<String>,
}

impl RawAction {
    fn into_action(self) -> Result<Action, ParseDiagnostic> {
        let kind = self.kind.trim().to_ascii_lowercase();
        if kind != OPEN_FILE && kind != EDIT_FILE && kind != WRITE_FILE {
            return Err(ParseDiagnostic::UnknownActionType(self.kind));
        }

        let path = self
            .path
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty())
            .ok_or_else(|| {
                ParseDiagnostic::MalformedProtocol(format!("{} action without a path", kind))
            })?;

        if kind == OPEN_FILE {
            return Ok(Action::OpenFile(OpenFileRequest::new(path)));
        }

        let line = |raw: Option<RawLine>, field: &str| -> Result<usize, ParseDiagnostic> {
            raw.map(|r| r.resolve(field))
                .transpose()
                .map(|n| n.unwrap_or(0))
                .map_err(|details| {
                    ParseDiagnostic::MalformedProtocol(format!("{} action for '{}': {}", kind, path, details))
                })
        };
        let start_line = line(self.start_line, "start_line")?;
        let end_line = line(self.end_line, "end_line")?;

        Ok(Action::EditFile(EditFileAction {
            content: self.content.unwrap_or_default(),
            start_line,
            end_line,
            operation: self
                .action
                .as_deref()
                .map(EditOperation::from_name)
                .unwrap_or_default(),
            path,
        }))
    }
}

fn decode_document(candidate: &str) -> Result<RawDocument, serde_json::Error> {
    match serde_json::from_str::<RawDocument>(candidate) {
        Ok(document) => Ok(document),
        Err(err) => {
            // Trailing prose may itself contain '}'; retry with the first
            // complete JSON value only.
            let mut stream = serde_json::Deserializer::from_str(candidate).into_iter::<RawDocument>();
            match stream.next() {
                Some(Ok(document)) => Ok(document),
                _ => Err(err),
            }
        }
    }
}

/// Reads a `{ "actions": [...] }` document out of a reply.
///
/// The document spans from the first `{` to the last `}`. Elements that fail
/// to decode are dropped individually.
pub fn parse_json(reply: &str) -> ParseOutcome {
    let mut outcome = ParseOutcome::default();

    let (start, end) = match (reply.find('{'), reply.rfind('}')) {
        (Some(start), Some(end)) if start < end => (start, end),
        _ => {
            outcome.malformed("no JSON object found in reply");
            return outcome;
        }
    };

    let document = match decode_document(&reply[start..=end]) {
        Ok(document) => document,
        Err(e) => {
            outcome.malformed(format!("invalid action document: {}", e));
            return outcome;
        }
    };

    for (index, value) in document.actions.into_iter().enumerate() {
        let decoded = serde_json::from_value::<RawAction>(value)
            .map_err(|e| ParseDiagnostic::MalformedProtocol(format!("action #{}: {}", index + 1, e)))
            .and_then(RawAction::into_action);
        match decoded {
            Ok(action) => outcome.actions.push(action),
            Err(diagnostic) => outcome.diagnostics.push(diagnostic),
        }
    }

    outcome
}
