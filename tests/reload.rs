//! End-to-end directive-tree → config → reload exercises, covering the
//! remaining testable properties around hot configuration reload.

use std::io::Write;

use srs::context::Context;
use srs::directive::parse_str;
use srs::reload::{ReloadEngine, SubscriberRegistry};

#[test]
fn context_load_rejects_unknown_directive_before_starting() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "bogus_directive on;").unwrap();
    let err = Context::load(file.path().to_path_buf()).unwrap_err();
    assert!(matches!(
        err.as_ref(),
        srs::error::Error::ConfigInvalid { .. }
    ));
}

#[test]
fn compat_rename_is_applied_before_validation() {
    let root = parse_str(
        "http_stream { enabled on; listen 8080; }",
        std::path::Path::new("t.conf"),
    )
    .unwrap();
    let mut root = root;
    srs::directive::apply_compat_transforms(&mut root);
    assert!(srs::directive::validate(&root).is_ok());
    assert!(root.get("http_server").is_some());
    assert!(root.get("http_stream").is_none());
}

#[test]
fn edge_mode_reload_is_rejected_end_to_end() {
    let t0 = parse_str(
        "vhost v { cluster { mode local; } }",
        std::path::Path::new("t.conf"),
    )
    .unwrap();
    let t1 = parse_str(
        "vhost v { cluster { mode remote; } }",
        std::path::Path::new("t.conf"),
    )
    .unwrap();
    let mut engine = ReloadEngine::new(t0);
    let mut registry = SubscriberRegistry::new();
    let err = engine.reload(t1, &mut registry).unwrap_err();
    assert!(matches!(
        err.as_ref(),
        srs::error::Error::EdgeModeChanged { .. }
    ));
}
