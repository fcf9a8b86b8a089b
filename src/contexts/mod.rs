pub mod action_grouper;
pub mod action_parser;
pub mod directory_tree;
pub mod edit_session;
pub mod file_context;
pub mod patch_engine;
pub mod workspace;

pub use action_grouper::{group, ActionGroup, GroupError, Grouping};
pub use action_parser::{parse_json, parse_tagged, ActionParser, ParseDiagnostic, ParseOutcome};
pub use directory_tree::DirectoryTree;
pub use edit_session::{
    strip_reasoning, EditSession, FileOutcome, SessionOptions, SessionReport, StopReason, Task,
};
pub use file_context::{FileContext, FileContextProvider};
pub use patch_engine::{apply_to_lines, PatchEngine, PatchError, PatchReport, SkipReason, SkippedEdit};
pub use workspace::{FileSystem, FsError, Workspace};
