//! Capability-gate property tests: every rejection path, fail-closed.

use serde_json::json;

use sandgate_core::gate::{validate, ArgGuard, GatePolicy, GateRejection, GuardKind};

fn policy() -> GatePolicy {
    GatePolicy::rooted_at("/workspace")
}

fn path_guard() -> [ArgGuard; 1] {
    [ArgGuard::required("path", GuardKind::WorkspacePath)]
}

// -------------------------------------------------------------------------
// Path rule
// -------------------------------------------------------------------------

#[test]
fn test_parent_traversal_rejected_everywhere() {
    let cases = [
        "../outside.txt",
        "../../etc/passwd",
        "src/../../escape.rs",
        "/workspace/../../etc/passwd",
        "a/b/../../../../root/.ssh/id_rsa",
    ];
    for raw in cases {
        let err = validate(&policy(), &path_guard(), &json!({ "path": raw })).unwrap_err();
        assert!(
            matches!(err, GateRejection::Path { .. }),
            "{raw} should be rejected, got {err:?}"
        );
    }
}

#[test]
fn test_paths_inside_the_root_accepted_and_normalized() {
    let out = validate(&policy(), &path_guard(), &json!({ "path": "file.txt" })).unwrap();
    assert_eq!(out["path"], "/workspace/file.txt");

    let out = validate(
        &policy(),
        &path_guard(),
        &json!({ "path": "/workspace/file.txt" }),
    )
    .unwrap();
    assert_eq!(out["path"], "/workspace/file.txt");

    let out = validate(
        &policy(),
        &path_guard(),
        &json!({ "path": "src/./nested/mod.rs" }),
    )
    .unwrap();
    assert_eq!(out["path"], "/workspace/src/nested/mod.rs");
}

#[test]
fn test_absolute_path_outside_the_root_rejected() {
    for raw in ["/etc/passwd", "/workspacefake/file.txt", "/"] {
        let err = validate(&policy(), &path_guard(), &json!({ "path": raw })).unwrap_err();
        assert!(matches!(err, GateRejection::Path { .. }), "{raw}");
    }
}

#[test]
fn test_empty_and_nul_paths_rejected() {
    for raw in ["", "file\0.txt"] {
        let err = validate(&policy(), &path_guard(), &json!({ "path": raw })).unwrap_err();
        assert!(matches!(err, GateRejection::Path { .. }));
    }
}

// -------------------------------------------------------------------------
// Shell-command rule
// -------------------------------------------------------------------------

#[test]
fn test_every_allow_listed_command_accepted() {
    let guards = [ArgGuard::required("command", GuardKind::ShellCommand)];
    for command in ["ls", "pwd", "echo hello", "cat notes.txt", "grep -r fn .", "find . -name '*.rs'"] {
        assert!(
            validate(&policy(), &guards, &json!({ "command": command })).is_ok(),
            "{command} should pass"
        );
    }
}

#[test]
fn test_unlisted_leading_token_rejected() {
    let guards = [ArgGuard::required("command", GuardKind::ShellCommand)];
    for command in ["rm -rf /", "curl http://evil", "sudo ls", "lsblk", ""] {
        let err = validate(&policy(), &guards, &json!({ "command": command })).unwrap_err();
        assert!(matches!(err, GateRejection::Command { .. }), "{command}");
    }
}

// -------------------------------------------------------------------------
// Package rules
// -------------------------------------------------------------------------

#[test]
fn test_package_name_character_class() {
    let guards = [ArgGuard::required("package", GuardKind::PackageName)];
    for package in ["lodash", "requests", "left-pad", "zope.interface", "pkg_v2"] {
        assert!(validate(&policy(), &guards, &json!({ "package": package })).is_ok());
    }
    for package in ["lodash; rm -rf /", "a b", "@scope/pkg", "", "pkg\n"] {
        let err = validate(&policy(), &guards, &json!({ "package": package })).unwrap_err();
        assert!(matches!(err, GateRejection::Package { .. }), "{package:?}");
    }
}

#[test]
fn test_only_known_package_managers_accepted() {
    let guards = [ArgGuard::required("manager", GuardKind::PackageManager)];
    assert!(validate(&policy(), &guards, &json!({ "manager": "npm" })).is_ok());
    assert!(validate(&policy(), &guards, &json!({ "manager": "pip" })).is_ok());
    for manager in ["cargo", "apt", "brew", ""] {
        let err = validate(&policy(), &guards, &json!({ "manager": manager })).unwrap_err();
        assert!(matches!(err, GateRejection::Package { .. }), "{manager}");
    }
}

// -------------------------------------------------------------------------
// URL rule
// -------------------------------------------------------------------------

#[test]
fn test_url_domain_allow_list() {
    let guards = [ArgGuard::required("url", GuardKind::FetchUrl)];
    for url in [
        "https://github.com/acme/repo",
        "https://gist.github.com/x",
        "http://stackoverflow.com/questions/1",
        "https://developer.mozilla.org/en-US/docs/Web",
    ] {
        assert!(validate(&policy(), &guards, &json!({ "url": url })).is_ok(), "{url}");
    }
    for url in [
        "https://evil.example.com/page",
        "https://github.com.attacker.io/phish",
        "https://evilgithub.com/",
        "ftp://github.com/file",
        "not a url",
    ] {
        let err = validate(&policy(), &guards, &json!({ "url": url })).unwrap_err();
        assert!(matches!(err, GateRejection::Url { .. }), "{url}");
    }
}

// -------------------------------------------------------------------------
// Policy as data
// -------------------------------------------------------------------------

#[test]
fn test_custom_policy_is_honored() {
    let mut policy = GatePolicy::rooted_at("/srv/box");
    policy.allowed_commands = vec!["make".into()];
    policy.allowed_domains = vec!["internal.dev".into()];

    let guards = [ArgGuard::required("command", GuardKind::ShellCommand)];
    assert!(validate(&policy, &guards, &json!({ "command": "make test" })).is_ok());
    assert!(validate(&policy, &guards, &json!({ "command": "ls" })).is_err());

    let guards = [ArgGuard::required("url", GuardKind::FetchUrl)];
    assert!(validate(&policy, &guards, &json!({ "url": "https://ci.internal.dev/run" })).is_ok());
    assert!(validate(&policy, &guards, &json!({ "url": "https://github.com/x" })).is_err());
}

#[test]
fn test_policy_round_trips_through_json() {
    let policy = GatePolicy::default();
    let json = serde_json::to_string_pretty(&policy).unwrap();
    let back: GatePolicy = serde_json::from_str(&json).unwrap();
    assert_eq!(policy, back);
}
