//! Command-line argument parsing, mirroring the `clap` `App`/`Arg`
//! builder pattern already used by this codebase's control tooling.

use clap::{crate_version, App, Arg};

/// Parsed CLI surface. `-h`, `-v`, and `-g` exit immediately from
/// [`parse`] with the appropriate message; everything else is returned
/// for [`crate::main`] to act on.
#[derive(Clone, Debug)]
pub struct Cli {
    pub test_config: bool,
    pub config_path: Option<String>,
}

/// Config file lookup order when `-c` is absent: the compile-time
/// default, then `/etc/srs/srs.conf`. If an explicit path ends in
/// `docker.conf`, its sibling `srs.conf` is tried first.
pub fn resolve_config_path(explicit: Option<&str>) -> Vec<String> {
    let mut candidates = Vec::new();
    if let Some(path) = explicit {
        if path.ends_with("docker.conf") {
            if let Some(dir) = std::path::Path::new(path).parent() {
                candidates.push(dir.join("srs.conf").to_string_lossy().into_owned());
            }
        }
        candidates.push(path.to_string());
    }
    candidates.push("./conf/srs.conf".to_string());
    candidates.push("/etc/srs/srs.conf".to_string());
    candidates
}

/// Parses `argv`. Returns `None` if a no-op informational flag (`-h`,
/// `-v`, `-g`) was given and already printed its message — the caller
/// should exit 0 in that case.
pub fn parse(argv: impl IntoIterator<Item = String>) -> Option<Cli> {
    let matches = App::new("srs")
        .version(crate_version!())
        .about("Live-streaming media server: RTMP/SRT/GB28181 ingest, RTMP/HTTP-FLV/HLS/DASH/WebRTC delivery")
        .arg(
            Arg::with_name("version")
                .short("v")
                .long("version")
                .help("Show version and exit"),
        )
        .arg(
            Arg::with_name("signature")
                .short("g")
                .long("signature")
                .help("Show build signature and exit"),
        )
        .arg(
            Arg::with_name("test-config")
                .short("t")
                .long("test")
                .help("Test the configuration file and exit"),
        )
        .arg(
            Arg::with_name("config")
                .short("c")
                .long("config")
                .takes_value(true)
                .value_name("FILE")
                .help("Configuration file path"),
        )
        .get_matches_from(argv);

    if matches.is_present("version") || matches.is_present("signature") {
        println!("srs/{}", crate_version!());
        return None;
    }

    Some(Cli {
        test_config: matches.is_present("test-config"),
        config_path: matches.value_of("config").map(str::to_string),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(s: &[&str]) -> Vec<String> {
        std::iter::once("srs".to_string())
            .chain(s.iter().map(|s| s.to_string()))
            .collect()
    }

    #[test]
    fn parses_test_config_and_path() {
        let cli = parse(args(&["-t", "-c", "srs.conf"])).unwrap();
        assert!(cli.test_config);
        assert_eq!(cli.config_path.as_deref(), Some("srs.conf"));
    }

    #[test]
    fn docker_conf_tries_sibling_srs_conf_first() {
        let candidates = resolve_config_path(Some("/etc/srs/docker.conf"));
        assert_eq!(candidates[0], "/etc/srs/srs.conf");
        assert_eq!(candidates[1], "/etc/srs/docker.conf");
    }

    #[test]
    fn defaults_without_explicit_path() {
        let candidates = resolve_config_path(None);
        assert_eq!(candidates, vec!["./conf/srs.conf", "/etc/srs/srs.conf"]);
    }
}
