//! Reply parsing through the public API, in both grammars.

use editloop::contexts::{group, parse_json, ActionParser};
use editloop::data::{Action, EditFileAction, EditOperation, OpenFileRequest, Protocol};

fn sample_actions() -> Vec<Action> {
    vec![
        Action::OpenFile(OpenFileRequest::new("src/lib.rs")),
        Action::EditFile(EditFileAction::replace(
            "src/main.rs",
            3,
            5,
            "fn main() {\n    println!(\"<open_file> is just text here\");\n}",
        )),
        Action::EditFile(EditFileAction::insert("src/main.rs", 1, "use std::fs;")),
        Action::EditFile(EditFileAction::replace("README.md", 2, 2, "")),
        Action::EditFile(EditFileAction::insert("README.md", 9, "ends with a newline\n")),
    ]
}

#[test]
fn test_rendered_replies_parse_back() {
    for protocol in [Protocol::tagged(), Protocol::json()] {
        let actions = sample_actions();
        let reply = protocol.render_all(&actions);
        let outcome = ActionParser::new(protocol).parse(&reply);

        assert_eq!(outcome.actions, actions, "grammar {}", protocol.grammar);
        assert!(outcome.diagnostics.is_empty(), "grammar {}", protocol.grammar);
    }
}

#[test]
fn test_json_prose_around_object_is_ignored() {
    let body = Protocol::json().render_all(&sample_actions());
    let bare = parse_json(&body);
    let wrapped = parse_json(&format!(
        "Sure! Here is what I would do:\n```json\n{}\n```\nLet me know if {{this}} helps.",
        body
    ));

    assert_eq!(bare, wrapped);
    assert_eq!(bare.actions.len(), 5);
}

#[test]
fn test_grouping_reply_is_stable() {
    let outcome = ActionParser::new(Protocol::json()).parse(
        r#"{"actions": [
            {"type": "edit_file", "path": "b.rs", "content": "b", "start_line": "1", "end_line": "1", "action": "replace"},
            {"type": "open_file", "path": "a.rs"},
            {"type": "edit_file", "path": "a.rs", "content": "a", "start_line": 2, "end_line": 2, "action": "insert"},
            {"type": "edit_file", "path": "b.rs", "content": "c", "start_line": 4, "end_line": 6, "action": "REPLACE"}
        ]}"#,
    );

    let grouping = group(&outcome.actions);
    assert_eq!(grouping.groups.len(), 2);
    assert_eq!(grouping.groups[0].path, "b.rs");
    assert_eq!(grouping.groups[0].edits.len(), 2);
    assert_eq!(grouping.groups[0].edits[1].operation, EditOperation::Replace);
    assert_eq!(grouping.groups[1].edits[0].operation, EditOperation::Insert);

    // Grouping the flattened groups again changes nothing
    assert_eq!(group(&grouping.flatten()), grouping);
}
