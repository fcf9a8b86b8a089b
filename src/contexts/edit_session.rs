//! Drives the request/reply loop with the model and applies the resulting edits.

use crate::contexts::action_grouper::{self, GroupError};
use crate::contexts::action_parser::{ActionParser, ParseDiagnostic};
use crate::contexts::file_context::FileContextProvider;
use crate::contexts::patch_engine::{PatchEngine, PatchError, PatchReport};
use crate::contexts::workspace::FileSystem;
use crate::data::action::Action;
use crate::data::protocol::{Grammar, Protocol};
use crate::llm::{ChatBackend, ChatError, ChatRequest, Message};
use regex::Regex;
use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::{debug, info, warn};

/// Directory (relative to the project root) that holds session transcripts
pub const SESSIONS_DIR: &str = ".editloop/sessions";

/// What the user asked for
#[derive(Debug, Clone, Default)]
pub struct Task {
    pub prompt: String,
    /// Files whose contents go into the opening prompt
    pub files: Vec<String>,
    pub working_dir: String,
    /// Pre-rendered directory listing, if any
    pub tree: Option<String>,
}

#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub model: String,
    pub max_rounds: usize,
    pub strict_ranges: bool,
    pub dry_run: bool,
    pub number_lines: bool,
    /// Project root to write transcripts under; `None` disables them
    pub transcript_root: Option<PathBuf>,
}

impl SessionOptions {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            max_rounds: 3,
            strict_ranges: false,
            dry_run: false,
            number_lines: true,
            transcript_root: None,
        }
    }
}

/// Why the round loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// A reply carried no usable action
    NoActions,
    /// The model produced edits and asked for nothing more
    EditsReady,
    /// `max_rounds` replies were consumed
    RoundLimit,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            StopReason::NoActions => write!(f, "no actions"),
            StopReason::EditsReady => write!(f, "edits ready"),
            StopReason::RoundLimit => write!(f, "round limit reached"),
        }
    }
}

/// Result of patching one file
#[derive(Debug)]
pub struct FileOutcome {
    pub path: String,
    pub result: Result<PatchReport, PatchError>,
}

impl FileOutcome {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

#[derive(Debug)]
pub struct SessionReport {
    pub rounds: usize,
    pub files: Vec<FileOutcome>,
    pub rejected: Vec<GroupError>,
    pub diagnostics: Vec<ParseDiagnostic>,
    pub stop_reason: StopReason,
    /// Where the transcript was written, when enabled
    pub transcript: Option<PathBuf>,
}

impl SessionReport {
    /// True when any file failed or any group was rejected
    pub fn has_failures(&self) -> bool {
        !self.rejected.is_empty() || self.files.iter().any(|f| !f.is_success())
    }
}

fn think_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)<think>.*?</think>").expect("valid regex"))
}

/// Removes `<think>...</think>` reasoning sections some models prepend
pub fn strip_reasoning(reply: &str) -> String {
    think_re().replace_all(reply, "").trim().to_string()
}

/// Prompt/reply log for one session
struct Transcript {
    dir: PathBuf,
}

impl Transcript {
    fn create(root: &Path) -> Option<Self> {
        let sessions = root.join(SESSIONS_DIR);
        if let Err(e) = fs::create_dir_all(&sessions) {
            warn!("Could not create transcript directory {}: {}", sessions.display(), e);
            return None;
        }

        let stamp = chrono::Utc::now().format("%Y%m%dT%H%M%S%.3fZ").to_string();
        // Sessions started within the same millisecond get a numeric suffix
        for attempt in 0..100 {
            let name = if attempt == 0 {
                stamp.clone()
            } else {
                format!("{}-{}", stamp, attempt)
            };
            let dir = sessions.join(name);
            match fs::create_dir(&dir) {
                Ok(()) => return Some(Self { dir }),
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => continue,
                Err(e) => {
                    warn!("Could not create transcript directory {}: {}", dir.display(), e);
                    return None;
                }
            }
        }

        warn!("Could not find a free transcript directory under {}", sessions.display());
        None
    }

    fn record(&self, round: usize, kind: &str, text: &str) {
        let path = self.dir.join(format!("round_{}_{}.txt", round, kind));
        if let Err(e) = fs::write(&path, text) {
            warn!("Could not write transcript {}: {}", path.display(), e);
        }
    }
}

/// One user task carried through to patched files
pub struct EditSession<B: ChatBackend, F: FileSystem> {
    backend: B,
    fs: F,
    parser: ActionParser,
    options: SessionOptions,
}

impl<B: ChatBackend, F: FileSystem> EditSession<B, F> {
    pub fn new(backend: B, fs: F, protocol: Protocol, options: SessionOptions) -> Self {
        Self {
            backend,
            fs,
            parser: ActionParser::new(protocol),
            options,
        }
    }

    pub fn protocol(&self) -> &Protocol {
        self.parser.protocol()
    }

    fn opening_prompt(&self, task: &Task) -> String {
        let mut prompt = format!("THE CURRENT WORKING DIRECTORY IS: {}\n\n", task.working_dir);

        if let Some(tree) = &task.tree {
            prompt.push_str(tree);
            prompt.push('\n');
        }

        if !task.files.is_empty() {
            let context = self.context_provider().read_files(&task.files);
            for (path, error) in &context.missing {
                warn!("Skipping {}: {}", path, error);
            }
            if !context.is_empty() {
                prompt.push_str("FILES:\n");
                prompt.push_str(&context.blob);
                prompt.push('\n');
            }
        }

        prompt.push_str(&format!("USER TASK: {}\n", task.prompt));
        prompt
    }

    fn context_provider(&self) -> FileContextProvider<&F> {
        FileContextProvider::new(&self.fs).number_lines(self.options.number_lines)
    }

    /// Runs the conversation and applies whatever edits it produced.
    ///
    /// Only backend failures abort the session; parse problems, rejected
    /// groups and failed files are reported.
    pub async fn run(&self, task: &Task) -> Result<SessionReport, ChatError> {
        let transcript = self
            .options
            .transcript_root
            .as_deref()
            .and_then(Transcript::create);

        let mut messages = vec![
            Message::system(self.protocol().instructions()),
            Message::user(self.opening_prompt(task)),
        ];
        let mut supplied: HashSet<String> = task.files.iter().map(|f| f.trim().to_string()).collect();
        let mut edits: Vec<Action> = Vec::new();
        let mut diagnostics = Vec::new();
        let mut stop_reason = StopReason::RoundLimit;
        let mut rounds = 0;

        while rounds < self.options.max_rounds {
            rounds += 1;

            let request = ChatRequest {
                model: self.options.model.clone(),
                messages: messages.clone(),
                json: self.protocol().grammar == Grammar::Json,
            };
            if let (Some(t), Some(last)) = (&transcript, messages.last()) {
                t.record(rounds, "prompt", &last.content);
            }

            info!(round = rounds, model = %self.options.model, "Waiting for model reply");
            let raw = self.backend.chat(&request).await?;
            if let Some(t) = &transcript {
                t.record(rounds, "reply", &raw);
            }

            let reply = strip_reasoning(&raw);
            messages.push(Message::assistant(reply.clone()));

            let outcome = self.parser.parse(&reply);
            for diagnostic in &outcome.diagnostics {
                warn!(round = rounds, "{}", diagnostic);
            }
            diagnostics.extend(outcome.diagnostics.iter().cloned());

            if outcome.is_empty() {
                stop_reason = StopReason::NoActions;
                break;
            }

            edits.extend(outcome.edits().cloned().map(Action::EditFile));

            let requested: Vec<String> = outcome
                .open_requests()
                .map(|r| r.path.trim().to_string())
                .filter(|p| !supplied.contains(p))
                .collect();
            debug!(round = rounds, requested = requested.len(), edits = edits.len(), "Parsed reply");

            if requested.is_empty() {
                stop_reason = if edits.is_empty() {
                    StopReason::NoActions
                } else {
                    StopReason::EditsReady
                };
                break;
            }
            if rounds == self.options.max_rounds {
                break;
            }

            let context = self.context_provider().read_files(&requested);
            let mut follow_up = context.blob.clone();
            for (path, error) in &context.missing {
                warn!("Requested file {} unavailable: {}", path, error);
                follow_up.push_str(&format!("Could not open {}: {}\n", path, error));
            }
            follow_up.push('\n');
            follow_up.push_str(self.protocol().follow_up());
            supplied.extend(requested);

            messages.push(Message::user(follow_up));
        }

        info!(rounds, edits = edits.len(), reason = %stop_reason, "Conversation finished");

        let grouping = action_grouper::group(&edits);
        for error in &grouping.rejected {
            warn!("{}", error);
        }

        let engine = PatchEngine::new(&self.fs)
            .strict_ranges(self.options.strict_ranges)
            .dry_run(self.options.dry_run);
        let files = grouping
            .groups
            .iter()
            .map(|group| {
                let result = engine.apply_group(group);
                match &result {
                    Ok(report) => info!(
                        path = %report.path,
                        applied = report.applied,
                        skipped = report.skipped.len(),
                        "Patched file"
                    ),
                    Err(e) => warn!(path = %group.path, "{}", e),
                }
                FileOutcome {
                    path: group.path.clone(),
                    result,
                }
            })
            .collect();

        Ok(SessionReport {
            rounds,
            files,
            rejected: grouping.rejected,
            diagnostics,
            stop_reason,
            transcript: transcript.map(|t| t.dir),
        })
    }
}
