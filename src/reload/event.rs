//! Typed reload notifications and the subscriber dispatch trait generated
//! for them.

use srs_macro::dispatchable;

/// One notification kind per recognized change, emitted by the reload
/// engine's diff in the order documented on [`diff`](super::diff).
#[dispatchable]
#[derive(Clone, Debug)]
pub enum ReloadEvent {
    ListenChanged,
    PidChanged,
    LogTankChanged,
    LogLevelChanged,
    LogFileChanged,
    MaxConnectionsChanged,
    UtcTimeChanged,
    PithyPrintMsChanged,

    HttpApiEnabled,
    HttpApiDisabled,
    HttpApiModified,
    HttpApiCrossdomain,
    HttpApiRawApi,

    HttpServerEnabled,
    HttpServerDisabled,
    HttpServerModified,

    RtcServerEnabled,
    RtcServerDisabled,
    RtcServerModified,

    VhostAdded { vhost: String },
    VhostRemoved { vhost: String },
    VhostChunkSize { vhost: String },
    VhostTcpNodelay { vhost: String },
    VhostMinLatency { vhost: String },
    VhostPlay { vhost: String },
    VhostForward { vhost: String },
    VhostDash { vhost: String },
    VhostHls { vhost: String },
    VhostHds { vhost: String },
    VhostDvr { vhost: String },
    VhostExec { vhost: String },
    VhostPublish { vhost: String },
    VhostHttpStatic { vhost: String },
    VhostHttpRemux { vhost: String },

    TranscodeAdded { vhost: String, name: String },
    TranscodeRemoved { vhost: String, name: String },
    TranscodeUpdated { vhost: String, name: String },
    IngestAdded { vhost: String, name: String },
    IngestRemoved { vhost: String, name: String },
    IngestUpdated { vhost: String, name: String },
}
