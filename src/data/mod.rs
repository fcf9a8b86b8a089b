pub mod action;
pub mod protocol;

pub use action::{Action, EditFileAction, EditOperation, OpenFileRequest};
pub use protocol::{Grammar, Protocol, PROTOCOL_VERSION};
