//! Live-streaming media server core: directive-based configuration,
//! hot reload, and the source-hub data plane that fans packets out from
//! a single publisher to every attached consumer and format bridger.

pub mod cli;
pub mod config;
pub mod context;
pub mod directive;
pub mod error;
pub mod logging;
pub mod media;
pub mod reload;
pub mod signal;

pub use context::Context;
pub use error::{Error, Result};
