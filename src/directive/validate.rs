//! Exhaustive validation of a compat-transformed directive tree: unknown
//! directive names at any recognized nesting level are rejected with the
//! offending name and source line.

use crate::directive::Directive;
use crate::error::{Error, Result};

const TOP_LEVEL: &[&str] = &[
    "listen",
    "pid",
    "srs_log_tank",
    "srs_log_level",
    "srs_log_file",
    "max_connections",
    "daemon",
    "utc_time",
    "pithy_print_ms",
    "http_api",
    "http_server",
    "rtc_server",
    "vhost",
    "stream_caster",
    "include",
];

const VHOST_CHILDREN: &[&str] = &[
    "enabled",
    "chunk_size",
    "tcp_nodelay",
    "min_latency",
    "play",
    "publish",
    "forward",
    "dash",
    "hls",
    "hds",
    "dvr",
    "exec",
    "http_static",
    "http_remux",
    "cluster",
    "rtc",
    "transcode",
    "ingest",
    "refer",
];

const HTTP_API_CHILDREN: &[&str] = &["enabled", "listen", "crossdomain", "raw_api"];
const HTTP_SERVER_CHILDREN: &[&str] = &["enabled", "listen", "dir", "crossdomain"];
const RTC_SERVER_CHILDREN: &[&str] = &["enabled", "listen", "candidate"];
const STREAM_CASTER_CHILDREN: &[&str] = &["enabled", "caster", "listen"];
const CLUSTER_CHILDREN: &[&str] = &["mode", "origin"];
const DVR_CHILDREN: &[&str] = &["enabled", "dvr_path", "dvr_plan", "dvr_apply"];

/// Validates `root`, already compat-transformed, against the recognized
/// directive table in the external-interfaces design. Deprecated-but-
/// still-accepted directives (`hls_storage`, `hls_mount`) are allowed
/// through and left for the caller to warn about, per the open question
/// resolution.
pub fn validate(root: &Directive) -> Result<()> {
    for child in &root.children {
        check_known(child, TOP_LEVEL, "top level")?;
        match child.name.as_str() {
            "vhost" => validate_vhost(child)?,
            "http_api" => check_children_known(child, HTTP_API_CHILDREN)?,
            "http_server" => check_children_known(child, HTTP_SERVER_CHILDREN)?,
            "rtc_server" => check_children_known(child, RTC_SERVER_CHILDREN)?,
            "stream_caster" => check_children_known(child, STREAM_CASTER_CHILDREN)?,
            _ => {}
        }
    }
    Ok(())
}

fn validate_vhost(vhost: &Directive) -> Result<()> {
    for child in &vhost.children {
        check_known(child, VHOST_CHILDREN, "vhost")?;
        match child.name.as_str() {
            "cluster" => check_children_known(child, CLUSTER_CHILDREN)?,
            "dvr" => check_children_known(child, DVR_CHILDREN)?,
            _ => {}
        }
    }
    Ok(())
}

fn check_known(directive: &Directive, allowed: &[&str], level: &str) -> Result<()> {
    if allowed.contains(&directive.name.as_str()) {
        Ok(())
    } else {
        Err(tracerr::new!(Error::ConfigInvalid {
            file: directive.file.clone(),
            line: directive.line,
            reason: format!("unknown directive '{}' at {}", directive.name, level),
        }))
    }
}

fn check_children_known(parent: &Directive, allowed: &[&str]) -> Result<()> {
    for child in &parent.children {
        check_known(child, allowed, &parent.name)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directive::parse_str;
    use std::path::Path;

    #[test]
    fn accepts_recognized_top_level_directives() {
        let root = parse_str(
            "listen 1935; pid ./srs.pid; vhost v { enabled on; }",
            Path::new("t.conf"),
        )
        .unwrap();
        assert!(validate(&root).is_ok());
    }

    #[test]
    fn rejects_unknown_top_level_directive() {
        let root = parse_str("bogus_directive on;", Path::new("t.conf")).unwrap();
        let err = validate(&root).unwrap_err();
        assert!(matches!(err.as_ref(), Error::ConfigInvalid { .. }));
    }

    #[test]
    fn rejects_unknown_vhost_child() {
        let root = parse_str("vhost v { nonsense on; }", Path::new("t.conf")).unwrap();
        assert!(validate(&root).is_err());
    }

    #[test]
    fn rejects_unknown_cluster_child() {
        let root = parse_str("vhost v { cluster { weird on; } }", Path::new("t.conf")).unwrap();
        assert!(validate(&root).is_err());
    }
}
