//! The process-wide context object. Every long-lived piece of shared
//! state (the active config snapshot, the source registry, the reload
//! machinery, the logging guard) lives behind this one `Rc<RefCell<_>>`
//! handle rather than as free-standing statics, so tests can construct
//! independent instances side by side.

use std::cell::RefCell;
use std::path::PathBuf;
use std::rc::Rc;

use crate::config::{self, Conf};
use crate::directive::{self, ParseError};
use crate::error::{Error, Result};
use crate::logging::LoggingHandle;
use crate::media::source::SourceHub;
use crate::reload::{ReloadEngine, SubscriberRegistry};

fn traced_parse_error(e: ParseError) -> tracerr::Traced<Error> {
    tracerr::new!(Error::ConfigInvalid {
        file: e.file,
        line: e.line,
        reason: e.message,
    })
}

/// Everything a running process needs, loaded once at startup and
/// mutated only through [`Context::reload`] thereafter.
pub struct Context {
    pub conf: Conf,
    pub source_hub: SourceHub,
    pub reload_engine: ReloadEngine,
    pub subscribers: SubscriberRegistry,
    logging: Option<LoggingHandle>,
    config_path: PathBuf,
}

impl Context {
    /// Loads, compat-transforms, and validates the directive tree at
    /// `config_path`, then projects it into a [`Conf`] and builds the
    /// rest of the context around it.
    pub fn load(config_path: PathBuf) -> Result<Self> {
        let mut tree = directive::parse(&config_path).map_err(traced_parse_error)?;
        directive::apply_compat_transforms(&mut tree);
        directive::validate(&tree)?;
        let conf = config::from_directive_tree(&tree)?;

        let source_hub = SourceHub::new(
            if conf.vhosts.values().any(|v| v.mix_correct) {
                crate::media::source::MixCorrect::Enabled
            } else {
                crate::media::source::MixCorrect::Disabled
            },
            crate::media::source::AtcRetention::Clear,
        );

        Ok(Self {
            conf,
            source_hub,
            reload_engine: ReloadEngine::new(tree),
            subscribers: SubscriberRegistry::new(),
            logging: None,
            config_path,
        })
    }

    pub fn install_logging(&mut self, handle: LoggingHandle) {
        self.logging = Some(handle);
    }

    /// Re-reads and re-validates the config file on disk, diffs it
    /// against the active tree, and dispatches the resulting events to
    /// every subscriber. On any failure the active tree and `self.conf`
    /// are left exactly as they were.
    pub fn reload(&mut self) -> Result<()> {
        let mut candidate = directive::parse(&self.config_path).map_err(traced_parse_error)?;
        directive::apply_compat_transforms(&mut candidate);
        directive::validate(&candidate)?;
        let new_conf = config::from_directive_tree(&candidate)?;

        self.reload_engine.reload(candidate, &mut self.subscribers)?;
        self.conf = new_conf;
        Ok(())
    }
}
