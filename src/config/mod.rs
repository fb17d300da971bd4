//! Typed configuration snapshots, projected from a validated directive
//! tree. Every field that a source file may omit has a default supplied
//! by `SmartDefault`, mirroring how optional fields are defaulted
//! elsewhere in this codebase's wire-format structs.

use std::collections::HashMap;
use std::time::Duration;

use serde::Deserialize;
use smart_default::SmartDefault;

use crate::directive::Directive;
use crate::error::{Error, Result};
use crate::media::consumer::JitterAlgorithm;
use crate::media::queue::DropPolicy;

#[derive(Clone, Debug, Deserialize, SmartDefault)]
pub struct HttpApiConf {
    #[default(false)]
    pub enabled: bool,
    #[default(1985)]
    pub listen: u16,
    #[default(false)]
    pub crossdomain: bool,
}

#[derive(Clone, Debug, Deserialize, SmartDefault)]
pub struct HttpServerConf {
    #[default(false)]
    pub enabled: bool,
    #[default(8080)]
    pub listen: u16,
    #[default(_code = "\"./objs/nginx/html\".to_string()")]
    pub dir: String,
}

#[derive(Clone, Debug, Deserialize, SmartDefault)]
pub struct RtcServerConf {
    #[default(false)]
    pub enabled: bool,
    #[default(8000)]
    pub listen: u16,
    #[default(_code = "\"*\".to_string()")]
    pub candidate: String,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ClusterMode {
    Local,
    Remote,
}

#[derive(Clone, Debug, Deserialize, SmartDefault)]
pub struct HlsConf {
    #[default(false)]
    pub enabled: bool,
    #[default(10.0)]
    pub hls_fragment: f64,
}

#[derive(Clone, Debug, Deserialize, SmartDefault)]
pub struct DvrConf {
    #[default(false)]
    pub enabled: bool,
    #[default(_code = "\"./objs/nginx/html\".to_string()")]
    pub dvr_path: String,
}

#[derive(Clone, Debug, Deserialize, SmartDefault)]
pub struct PlayConf {
    #[default(true)]
    pub gop_cache: bool,
    #[default(false)]
    pub atc: bool,
    #[default(2.0)]
    pub mw_latency: f64,
    #[default(_code = "\"full\".to_string()")]
    pub time_jitter: String,
}

impl PlayConf {
    pub fn jitter_algorithm(&self) -> JitterAlgorithm {
        match self.time_jitter.as_str() {
            "zero" => JitterAlgorithm::Zero,
            "off" => JitterAlgorithm::Off,
            _ => JitterAlgorithm::Full,
        }
    }
}

#[derive(Clone, Debug, Deserialize, SmartDefault)]
pub struct PublishConf {
    #[default(false)]
    pub mr: bool,
    #[default(_code = "Duration::from_millis(350)")]
    #[serde(with = "humantime_serde")]
    pub mr_latency: Duration,
    #[default(true)]
    pub normal_latency: bool,
    #[default(_code = "DropPolicy::DropVideoNonGop")]
    #[serde(skip)]
    pub drop_policy: DropPolicy,
}

#[derive(Clone, Debug, Default)]
pub struct VhostConf {
    pub name: String,
    pub enabled: bool,
    pub mix_correct: bool,
    pub cluster_mode: Option<ClusterMode>,
    pub play: PlayConf,
    pub publish: PublishConf,
    pub hls: HlsConf,
    pub dvr: DvrConf,
    pub forward: Vec<String>,
}

impl Default for ClusterMode {
    fn default() -> Self {
        ClusterMode::Local
    }
}

/// The full typed snapshot a reload subscriber or the data plane reads
/// from; rebuilt wholesale from a directive tree on every successful load
/// or reload.
#[derive(Clone, Debug, Default)]
pub struct Conf {
    pub listen: Vec<u16>,
    pub pid: String,
    pub log_tank: LogTank,
    pub log_level: LogLevel,
    pub log_file: String,
    pub max_connections: u32,
    pub http_api: HttpApiConf,
    pub http_server: HttpServerConf,
    pub rtc_server: RtcServerConf,
    pub vhosts: HashMap<String, VhostConf>,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum LogTank {
    Console,
    File,
}

impl Default for LogTank {
    fn default() -> Self {
        LogTank::Console
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum LogLevel {
    Verbose,
    Info,
    Trace,
    Warn,
    Error,
}

impl Default for LogLevel {
    fn default() -> Self {
        LogLevel::Trace
    }
}

fn parse_bool_arg(d: Option<&Directive>, field: &str) -> Result<bool> {
    match d.and_then(|d| d.args.first()) {
        Some(s) if s == "on" => Ok(true),
        Some(s) if s == "off" => Ok(false),
        Some(other) => Err(tracerr::new!(Error::ConfigInvalid {
            file: d.unwrap().file.clone(),
            line: d.unwrap().line,
            reason: format!("'{}' expects on|off, got '{}'", field, other),
        })),
        None => Ok(false),
    }
}

fn parse_u16_arg(d: Option<&Directive>, default: u16) -> u16 {
    d.and_then(|d| d.args.first())
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

/// Projects a validated, compat-transformed directive tree into a [`Conf`]
/// snapshot. Directives outside the recognized table were already
/// rejected by `directive::validate`; this function only needs to read
/// what it expects.
pub fn from_directive_tree(root: &Directive) -> Result<Conf> {
    let mut conf = Conf::default();

    if let Some(listen) = root.get("listen") {
        conf.listen = listen
            .args
            .iter()
            .filter_map(|s| s.parse().ok())
            .collect();
    }
    if let Some(pid) = root.get("pid") {
        conf.pid = pid.args.first().cloned().unwrap_or_default();
    }
    if let Some(tank) = root.get("srs_log_tank") {
        conf.log_tank = match tank.args.first().map(String::as_str) {
            Some("file") => LogTank::File,
            _ => LogTank::Console,
        };
    }
    if let Some(level) = root.get("srs_log_level") {
        conf.log_level = match level.args.first().map(String::as_str) {
            Some("verbose") => LogLevel::Verbose,
            Some("info") => LogLevel::Info,
            Some("warn") => LogLevel::Warn,
            Some("error") => LogLevel::Error,
            _ => LogLevel::Trace,
        };
    }
    if let Some(file) = root.get("srs_log_file") {
        conf.log_file = file.args.first().cloned().unwrap_or_default();
    }
    if let Some(mc) = root.get("max_connections") {
        conf.max_connections = mc
            .args
            .first()
            .and_then(|s| s.parse().ok())
            .unwrap_or(1000);
    }

    if let Some(api) = root.get("http_api") {
        conf.http_api.enabled = parse_bool_arg(api.get("enabled"), "http_api.enabled")?;
        conf.http_api.listen = parse_u16_arg(api.get("listen"), conf.http_api.listen);
        conf.http_api.crossdomain = parse_bool_arg(api.get("crossdomain"), "http_api.crossdomain")?;
    }
    if let Some(server) = root.get("http_server") {
        conf.http_server.enabled = parse_bool_arg(server.get("enabled"), "http_server.enabled")?;
        conf.http_server.listen = parse_u16_arg(server.get("listen"), conf.http_server.listen);
    }
    if let Some(rtc) = root.get("rtc_server") {
        conf.rtc_server.enabled = parse_bool_arg(rtc.get("enabled"), "rtc_server.enabled")?;
        conf.rtc_server.listen = parse_u16_arg(rtc.get("listen"), conf.rtc_server.listen);
    }

    for vhost in root.get_all("vhost") {
        let name = vhost.args.first().cloned().unwrap_or_default();
        let enabled = match vhost.get("enabled") {
            Some(_) => parse_bool_arg(vhost.get("enabled"), "vhost.enabled")?,
            None => true,
        };
        let mut vc = VhostConf {
            name: name.clone(),
            enabled,
            ..VhostConf::default()
        };
        if let Some(cluster) = vhost.get("cluster") {
            vc.cluster_mode = match cluster.get("mode").and_then(|m| m.args.first()) {
                Some(m) if m == "remote" => Some(ClusterMode::Remote),
                _ => Some(ClusterMode::Local),
            };
        }
        if let Some(hls) = vhost.get("hls") {
            vc.hls.enabled = parse_bool_arg(hls.get("enabled"), "hls.enabled")?;
            if let Some(frag) = hls.get("hls_fragment").and_then(|d| d.args.first()) {
                vc.hls.hls_fragment = frag.parse().unwrap_or(vc.hls.hls_fragment);
            }
        }
        if let Some(dvr) = vhost.get("dvr") {
            vc.dvr.enabled = parse_bool_arg(dvr.get("enabled"), "dvr.enabled")?;
        }
        if let Some(forward) = vhost.get("forward") {
            vc.forward = forward.args.clone();
        }
        conf.vhosts.insert(name, vc);
    }

    Ok(conf)
}
