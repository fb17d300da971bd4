//! Diffs two directive trees and produces the ordered sequence of typed
//! [`ReloadEvent`]s the algorithm in the component design calls for.

use std::collections::BTreeSet;

use crate::directive::Directive;
use crate::error::{Error, Result};
use crate::reload::event::ReloadEvent;

const TOP_LEVEL_SCALARS: &[(&str, fn() -> ReloadEvent)] = &[
    ("listen", || ReloadEvent::ListenChanged),
    ("pid", || ReloadEvent::PidChanged),
    ("srs_log_tank", || ReloadEvent::LogTankChanged),
    ("srs_log_level", || ReloadEvent::LogLevelChanged),
    ("srs_log_file", || ReloadEvent::LogFileChanged),
    ("max_connections", || ReloadEvent::MaxConnectionsChanged),
    ("utc_time", || ReloadEvent::UtcTimeChanged),
    ("pithy_print_ms", || ReloadEvent::PithyPrintMsChanged),
];

const NOT_RELOADABLE: &[&str] = &["daemon", "stream_caster"];

const VHOST_CHILD_BLOCKS: &[&str] = &[
    "chunk_size",
    "tcp_nodelay",
    "min_latency",
    "play",
    "forward",
    "dash",
    "hls",
    "hds",
    "dvr",
    "exec",
    "publish",
    "http_static",
    "http_remux",
];

fn vhost_child_event(name: &str, vhost: String) -> Option<ReloadEvent> {
    Some(match name {
        "chunk_size" => ReloadEvent::VhostChunkSize { vhost },
        "tcp_nodelay" => ReloadEvent::VhostTcpNodelay { vhost },
        "min_latency" => ReloadEvent::VhostMinLatency { vhost },
        "play" => ReloadEvent::VhostPlay { vhost },
        "forward" => ReloadEvent::VhostForward { vhost },
        "dash" => ReloadEvent::VhostDash { vhost },
        "hls" => ReloadEvent::VhostHls { vhost },
        "hds" => ReloadEvent::VhostHds { vhost },
        "dvr" => ReloadEvent::VhostDvr { vhost },
        "exec" => ReloadEvent::VhostExec { vhost },
        "publish" => ReloadEvent::VhostPublish { vhost },
        "http_static" => ReloadEvent::VhostHttpStatic { vhost },
        "http_remux" => ReloadEvent::VhostHttpRemux { vhost },
        _ => return None,
    })
}

/// Computes the ordered notification sequence for a reload from `t0` to
/// `t1`. Both trees are assumed already compat-transformed and validated.
/// Fails with `EdgeModeChanged` if a vhost's `cluster.mode` differs, or
/// `ConfigInvalid` if a non-reloadable top-level directive (`daemon`,
/// `stream_caster`) differs — in both cases before any notification is
/// computed, so the caller never applies a partial reload.
pub fn diff(t0: &Directive, t1: &Directive) -> Result<Vec<ReloadEvent>> {
    for name in NOT_RELOADABLE {
        if !directive_equal(t0.get(name), t1.get(name)) {
            return Err(tracerr::new!(Error::ConfigInvalid {
                file: t1.file.clone(),
                line: t1.get(name).map(|d| d.line).unwrap_or(0),
                reason: format!("'{}' cannot be changed by reload", name),
            }));
        }
    }
    for vhost in vhost_names(t0, t1) {
        let v0 = t0.get_with_arg("vhost", &vhost);
        let v1 = t1.get_with_arg("vhost", &vhost);
        if let (Some(v0), Some(v1)) = (v0, v1) {
            let mode0 = v0.get("cluster").and_then(|c| c.get("mode"));
            let mode1 = v1.get("cluster").and_then(|c| c.get("mode"));
            if !directive_equal(mode0, mode1) {
                return Err(tracerr::new!(Error::EdgeModeChanged { vhost }));
            }
        }
    }

    let mut events = Vec::new();

    for (name, make) in TOP_LEVEL_SCALARS {
        if !directive_equal(t0.get(name), t1.get(name)) {
            events.push(make());
        }
    }

    diff_tristate(
        t0.get("http_api"),
        t1.get("http_api"),
        ReloadEvent::HttpApiEnabled,
        ReloadEvent::HttpApiDisabled,
        ReloadEvent::HttpApiModified,
        &mut events,
    );
    if let (Some(a0), Some(a1)) = (t0.get("http_api"), t1.get("http_api")) {
        if !directive_equal(a0.get("crossdomain"), a1.get("crossdomain")) {
            events.push(ReloadEvent::HttpApiCrossdomain);
        }
        if !directive_equal(a0.get("raw_api"), a1.get("raw_api")) {
            events.push(ReloadEvent::HttpApiRawApi);
        }
    }

    diff_tristate(
        t0.get("http_server"),
        t1.get("http_server"),
        ReloadEvent::HttpServerEnabled,
        ReloadEvent::HttpServerDisabled,
        ReloadEvent::HttpServerModified,
        &mut events,
    );
    diff_tristate(
        t0.get("rtc_server"),
        t1.get("rtc_server"),
        ReloadEvent::RtcServerEnabled,
        ReloadEvent::RtcServerDisabled,
        ReloadEvent::RtcServerModified,
        &mut events,
    );

    for vhost in vhost_names(t0, t1) {
        let v0 = t0.get_with_arg("vhost", &vhost);
        let v1 = t1.get_with_arg("vhost", &vhost);
        match (v0, v1) {
            (None, Some(_)) => events.push(ReloadEvent::VhostAdded { vhost }),
            (Some(_), None) => events.push(ReloadEvent::VhostRemoved { vhost }),
            (Some(v0), Some(v1)) => {
                if !v0.equals(v1, None) {
                    for block in VHOST_CHILD_BLOCKS {
                        if !directive_equal(v0.get(block), v1.get(block)) {
                            if let Some(ev) = vhost_child_event(block, vhost.clone()) {
                                events.push(ev);
                            }
                        }
                    }
                    diff_multi_instance(v0, v1, &vhost, "transcode", &mut events);
                    diff_multi_instance(v0, v1, &vhost, "ingest", &mut events);
                }
            }
            (None, None) => unreachable!("vhost_names only yields present names"),
        }
    }

    Ok(events)
}

fn diff_tristate(
    d0: Option<&Directive>,
    d1: Option<&Directive>,
    enabled: ReloadEvent,
    disabled: ReloadEvent,
    modified: ReloadEvent,
    events: &mut Vec<ReloadEvent>,
) {
    let was_enabled = is_enabled(d0);
    let is_enabled_now = is_enabled(d1);
    match (was_enabled, is_enabled_now) {
        (false, true) => events.push(enabled),
        (true, false) => events.push(disabled),
        (true, true) if !directive_equal(d0, d1) => events.push(modified),
        _ => {}
    }
}

fn is_enabled(d: Option<&Directive>) -> bool {
    d.and_then(|d| d.get("enabled"))
        .map(|e| e.args.first().map(String::as_str) == Some("on"))
        .unwrap_or(false)
}

fn directive_equal(a: Option<&Directive>, b: Option<&Directive>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => a.equals(b, None),
        _ => false,
    }
}

fn vhost_names(t0: &Directive, t1: &Directive) -> Vec<String> {
    let mut names: BTreeSet<String> = BTreeSet::new();
    for v in t0.get_all("vhost") {
        if let Some(name) = v.args.first() {
            names.insert(name.clone());
        }
    }
    for v in t1.get_all("vhost") {
        if let Some(name) = v.args.first() {
            names.insert(name.clone());
        }
    }
    names.into_iter().collect()
}

fn diff_multi_instance(
    v0: &Directive,
    v1: &Directive,
    vhost: &str,
    block_name: &str,
    events: &mut Vec<ReloadEvent>,
) {
    let mut names: BTreeSet<String> = BTreeSet::new();
    for d in v0.get_all(block_name) {
        if let Some(n) = d.args.first() {
            names.insert(n.clone());
        }
    }
    for d in v1.get_all(block_name) {
        if let Some(n) = d.args.first() {
            names.insert(n.clone());
        }
    }
    for name in names {
        let d0 = v0.get_with_arg(block_name, &name);
        let d1 = v1.get_with_arg(block_name, &name);
        let (added, removed, updated) = match block_name {
            "transcode" => (
                ReloadEvent::TranscodeAdded {
                    vhost: vhost.to_string(),
                    name: name.clone(),
                },
                ReloadEvent::TranscodeRemoved {
                    vhost: vhost.to_string(),
                    name: name.clone(),
                },
                ReloadEvent::TranscodeUpdated {
                    vhost: vhost.to_string(),
                    name: name.clone(),
                },
            ),
            _ => (
                ReloadEvent::IngestAdded {
                    vhost: vhost.to_string(),
                    name: name.clone(),
                },
                ReloadEvent::IngestRemoved {
                    vhost: vhost.to_string(),
                    name: name.clone(),
                },
                ReloadEvent::IngestUpdated {
                    vhost: vhost.to_string(),
                    name: name.clone(),
                },
            ),
        };
        match (d0, d1) {
            (None, Some(_)) => events.push(added),
            (Some(_), None) => events.push(removed),
            (Some(d0), Some(d1)) => {
                if !d0.equals(d1, None) {
                    events.push(updated);
                }
            }
            (None, None) => {}
        }
    }
}
