use log_sift::{FilterNode, load_tree, save_tree};
use std::fs;
use tempfile::tempdir;

#[test]
fn test_profile_file_round_trip() {
    let dir = tempdir().expect("temp dir");
    let path = dir.path().join("profile.json");

    let root = FilterNode::and(vec![
        FilterNode::substring("error").with_highlight_color("Red"),
        FilterNode::or(vec![
            FilterNode::regex("conn(ect)?", false).with_highlight_color("Cyan"),
            FilterNode::substring("timeout").disabled(),
        ]),
        FilterNode::nor(vec![FilterNode::substring("healthcheck")]),
    ]);

    save_tree(&root, &path).expect("save profile");
    let loaded = load_tree(&path).expect("load profile");

    assert_eq!(loaded.children().len(), 3);
    assert_eq!(loaded.children()[0].value(), Some("error"));
    assert_eq!(loaded.children()[0].highlight_color, "Red");

    let nested = &loaded.children()[1];
    assert_eq!(nested.children()[0].value(), Some("conn(ect)?"));
    assert_eq!(nested.children()[0].highlight_color, "Cyan");
    assert!(!nested.children()[1].enabled);

    // The reloaded tree evaluates identically to the original.
    for line in [
        "ERROR conn refused",
        "error timeout waiting",
        "healthcheck error conn",
        "all fine",
    ] {
        assert_eq!(loaded.is_match(line), root.is_match(line), "line: {line}");
    }
}

#[test]
fn test_old_profile_without_highlight_color_defaults() {
    let dir = tempdir().expect("temp dir");
    let path = dir.path().join("old-profile.json");

    // Saves from before highlight colors carried only variant and value.
    fs::write(
        &path,
        r#"{
            "kind": {
                "type": "and",
                "children": [
                    {"kind": {"type": "substring", "text": "error"}},
                    {"kind": {"type": "regex", "pattern": "^\\d+", "case_sensitive": true}}
                ]
            }
        }"#,
    )
    .expect("write old profile");

    let loaded = load_tree(&path).expect("load old profile");
    assert_eq!(loaded.highlight_color, "Default");
    assert!(loaded.enabled);
    assert_eq!(loaded.children()[0].highlight_color, "Default");

    // The regex was recompiled on load.
    assert!(loaded.is_match("42 error codes"));
    assert!(!loaded.is_match("error but no leading digits"));
}

#[test]
fn test_missing_profile_reports_read_error() {
    let dir = tempdir().expect("temp dir");
    let err = load_tree(&dir.path().join("absent.json")).expect_err("must fail");
    assert!(err.to_string().contains("absent.json"));
}

#[test]
fn test_malformed_profile_reports_parse_error() {
    let dir = tempdir().expect("temp dir");
    let path = dir.path().join("broken.json");
    fs::write(&path, "{\"type\": \"mystery\"}").expect("write");
    assert!(load_tree(&path).is_err());
}
