use crate::data::action::{Action, EditFileAction};
use std::collections::HashMap;
use std::fmt;

/// Errors that reject a whole per-file group
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GroupError {
    /// The group mixes line edits with operations the patch engine cannot apply
    MixedActionTypes { path: String, offending: Vec<String> },
}

impl fmt::Display for GroupError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            GroupError::MixedActionTypes { path, offending } => write!(
                f,
                "Edits for '{}' mix replace/insert with unsupported operation(s): {}",
                path,
                offending.join(", ")
            ),
        }
    }
}

impl std::error::Error for GroupError {}

/// Same-path edits, in the order the model emitted them
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionGroup {
    pub path: String,
    pub edits: Vec<EditFileAction>,
}

/// Result of partitioning one reply's actions by file
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Grouping {
    /// Accepted groups, ordered by the first appearance of their path
    pub groups: Vec<ActionGroup>,
    pub rejected: Vec<GroupError>,
}

impl Grouping {
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty() && self.rejected.is_empty()
    }

    /// Accepted edits back as a flat action list, group by group
    pub fn flatten(&self) -> Vec<Action> {
        self.groups
            .iter()
            .flat_map(|group| group.edits.iter().cloned().map(Action::EditFile))
            .collect()
    }
}

/// Partitions edit actions by target path.
///
/// Open-file requests take no part; they are served as context, not patched.
pub fn group(actions: &[Action]) -> Grouping {
    let mut order: Vec<String> = Vec::new();
    let mut by_path: HashMap<String, Vec<EditFileAction>> = HashMap::new();

    for edit in actions.iter().filter_map(Action::as_edit) {
        if !by_path.contains_key(&edit.path) {
            order.push(edit.path.clone());
        }
        by_path
            .entry(edit.path.clone())
            .or_default()
            .push(edit.clone());
    }

    let mut grouping = Grouping::default();
    for path in order {
        let edits = by_path.remove(&path).unwrap_or_default();
        let offending: Vec<String> = edits
            .iter()
            .filter(|edit| !edit.operation.is_supported())
            .map(|edit| edit.operation.name().to_string())
            .collect();

        if offending.is_empty() {
            grouping.groups.push(ActionGroup { path, edits });
        } else {
            grouping
                .rejected
                .push(GroupError::MixedActionTypes { path, offending });
        }
    }

    grouping
}
