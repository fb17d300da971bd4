//! Error taxonomy shared by every module of the data plane.
//!
//! Every fallible operation in this crate returns `Result<T, Traced<Error>>`
//! (or `Traced<E>` for a narrower, module-specific `E`). [`Traced`] captures
//! a `file:line` frame at each `?`/`wrap!()` hop so a failure can be
//! reported with its full causal path without a separate backtrace crate.

use std::path::PathBuf;

pub use tracerr::Traced;

/// Kinds of failure recognized by the core, as laid out in the error
/// handling design. Recovery is local wherever the source can continue;
/// only startup errors and [`Error::ConfigInvalid`] before first serve are
/// fatal.
#[derive(Clone, Debug, derive_more::Display)]
pub enum Error {
    /// Malformed directive tree: unknown directive, out-of-range value, or
    /// a missing required field. Fatal at startup; at reload, the tree is
    /// rolled back and the offending file:line is surfaced.
    #[display(
        fmt = "invalid configuration at {}:{}: {}",
        file,
        line,
        reason
    )]
    ConfigInvalid {
        file: PathBuf,
        line: usize,
        reason: String,
    },

    /// A reload attempted to change an origin/edge cluster role. The
    /// reload is aborted and the previous tree is retained.
    #[display(fmt = "reload would change edge/origin mode of vhost {}", vhost)]
    EdgeModeChanged { vhost: String },

    /// A second publisher attempted to attach while one was already
    /// admitted. The new publisher is rejected; the source is unchanged.
    #[display(fmt = "stream {} already has a publisher", stream)]
    StreamBusy { stream: String },

    /// A direct (non-bridger) publish was attempted against an edge-mode
    /// stream. Edge sources only ever obtain content through a pull
    /// bridger; the publish is rejected and the source is unchanged.
    #[display(fmt = "stream {} is edge-mode and only accepts a pull bridger as publisher", stream)]
    EdgePublishRejected { stream: String },

    /// A consumer's queue exceeded its bound under the `disable` drop
    /// policy. The consumer is detached; other consumers are unaffected.
    #[display(fmt = "consumer {} dropped for being too slow", consumer_id)]
    SlowConsumer { consumer_id: u64 },

    /// A packet referenced a codec config that has not yet been latched.
    /// The packet is dropped; not fatal.
    #[display(fmt = "no sequence header latched yet for stream {}", stream)]
    HeaderMissing { stream: String },

    /// A sequence header failed to parse. The latch is updated
    /// best-effort and the packet is still forwarded.
    #[display(fmt = "failed to decode sequence header: {}", reason)]
    DecodeError { reason: String },

    /// Task cancellation, propagated up to the task's top frame.
    #[display(fmt = "task interrupted")]
    Interrupted,

    /// No data arrived within the configured window. The connection is
    /// closed; the source is preserved.
    #[display(fmt = "timed out after {:?}", after)]
    Timeout { after: std::time::Duration },

    /// An upstream forward/bridger operation failed and will be retried
    /// with backoff.
    #[display(fmt = "transient error: {}", reason)]
    Transient { reason: String },
}

impl std::error::Error for Error {}

/// Convenience alias for this crate's default `Traced<Error>`.
pub type Result<T, E = Error> = std::result::Result<T, Traced<E>>;

/// Formats a [`Traced`] error together with its captured frames, for
/// logging at the point an error is finally swallowed (packet dropped,
/// consumer detached, connection closed).
pub fn log_trace(err: &Traced<Error>) -> String {
    format!("{}\n{}", err, err.trace())
}
