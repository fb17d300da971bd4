//! Format bridgers: adapters that make another wire format look like a
//! consumer (output bridger) or a publisher (input bridger) to a
//! [`Source`](crate::media::source::Source).
//!
//! The wire-level work a bridger ultimately does — muxing HLS segments,
//! packetizing RTP, demuxing an upstream RTMP stream — is an external
//! collaborator's job; what lives here is the shape each bridger presents
//! to the data plane and the retry/backoff policy around it.

use std::time::Duration;

use crate::error::{Error, Result};
use crate::media::consumer::{Consumer, ConsumerOptions};
use crate::media::packet::Packet;
use crate::media::source::{PublishRequest, Source};

/// Implemented by a source → other-format adapter (HLS, DASH, HTTP-FLV,
/// WebRTC play). An output bridger behaves as a consumer: on attach it
/// receives sequence headers, then the GOP cache, then the live stream,
/// and is responsible for muxing to its target and surfacing back-pressure
/// as queue drops (handled upstream of this trait by the bridger's
/// [`Consumer`]).
pub trait OutputBridger {
    /// Consumes one packet already drained from this bridger's queue.
    /// Errors are non-fatal to the source; the caller logs and continues
    /// feeding subsequent packets.
    fn mux(&mut self, packet: &Packet) -> Result<()>;
}

/// Implemented by an other-format → source adapter (SRT, GB28181,
/// WebRTC-ingest). An input bridger behaves as a publisher: admission
/// follows the normal "at most one publisher" rule via
/// [`Source::on_publish`].
pub trait InputBridger {
    /// A human-readable origin for logs and the publisher's
    /// `source_address` field.
    fn origin(&self) -> &str;
}

/// Drives an [`OutputBridger`] by repeatedly draining its [`Consumer`] and
/// handing packets to the bridger's `mux`. Owned by whichever worker holds
/// both the source and the protocol-specific muxer.
pub struct BridgerConsumer<B: OutputBridger> {
    consumer: Consumer,
    bridger: B,
}

impl<B: OutputBridger> BridgerConsumer<B> {
    pub fn new(id: u64, opts: ConsumerOptions, bridger: B) -> Self {
        Self {
            consumer: Consumer::new(id, opts),
            bridger,
        }
    }

    pub fn consumer_mut(&mut self) -> &mut Consumer {
        &mut self.consumer
    }

    /// Drains up to `max_count` packets and muxes each in order. A mux
    /// error is logged by the caller via the returned count of failures;
    /// it does not stop the drain.
    pub fn pump(&mut self, max_count: usize) -> usize {
        let mut batch = Vec::new();
        self.consumer.dump_packets(&mut batch, max_count);
        let mut failures = 0;
        for packet in &batch {
            if self.bridger.mux(packet).is_err() {
                failures += 1;
            }
        }
        failures
    }
}

/// Exponential backoff with a ceiling, used to re-spawn a bridger after a
/// [`Error::Transient`] failure without hot-looping against a dead
/// upstream.
pub struct Backoff {
    floor: Duration,
    ceiling: Duration,
    attempt: u32,
}

impl Backoff {
    pub fn new(floor: Duration, ceiling: Duration) -> Self {
        Self {
            floor,
            ceiling,
            attempt: 0,
        }
    }

    /// Delay before the next respawn attempt, doubling each call up to
    /// `ceiling`.
    pub fn next_delay(&mut self) -> Duration {
        let scale = 1u32.checked_shl(self.attempt).unwrap_or(u32::MAX);
        let delay = self.floor.saturating_mul(scale);
        self.attempt = self.attempt.saturating_add(1);
        delay.min(self.ceiling)
    }

    /// Same schedule as [`Backoff::next_delay`], scaled by a random
    /// factor in `[0.5, 1.0)` so that many bridgers re-spawned by the
    /// same failure (e.g. an upstream origin bouncing) don't all retry in
    /// lockstep.
    pub fn next_delay_jittered(&mut self) -> Duration {
        let base = self.next_delay();
        let factor = rand::Rng::gen_range(&mut rand::thread_rng(), 0.5..1.0);
        Duration::from_secs_f64(base.as_secs_f64() * factor)
    }

    pub fn reset(&mut self) {
        self.attempt = 0;
    }
}

/// An input bridger that pulls from an upstream origin on demand, spawned
/// by the source hub when an edge source's first consumer attaches to a
/// currently-`Idle` key. Torn down after a grace window once its last
/// consumer detaches.
pub struct PullEdgeBridger {
    upstream: String,
    backoff: Backoff,
    teardown_grace: Duration,
}

impl PullEdgeBridger {
    pub fn new(upstream: impl Into<String>, teardown_grace: Duration) -> Self {
        Self {
            upstream: upstream.into(),
            backoff: Backoff::new(Duration::from_secs(1), Duration::from_secs(30)),
            teardown_grace,
        }
    }

    pub fn teardown_grace(&self) -> Duration {
        self.teardown_grace
    }

    /// Attempts to admit this bridger as `source`'s publisher. Fails with
    /// `StreamBusy` if a local publisher beat it to admission (a race the
    /// edge-pull path must tolerate since attach and publish can overlap).
    pub fn attach(&mut self, source: &mut Source, bridger_id: u64) -> Result<()> {
        source.on_publish(bridger_id, true, false)?;
        self.backoff.reset();
        Ok(())
    }
}

impl InputBridger for PullEdgeBridger {
    fn origin(&self) -> &str {
        &self.upstream
    }
}

/// An output bridger re-packaging frames as an outbound RTMP publish to a
/// configured forward destination (the "forwarder fan-in" of the source
/// hub design).
pub struct ForwardBridger {
    destination: String,
}

impl ForwardBridger {
    pub fn new(destination: impl Into<String>) -> Self {
        Self {
            destination: destination.into(),
        }
    }

    pub fn destination(&self) -> &str {
        &self.destination
    }
}

impl OutputBridger for ForwardBridger {
    fn mux(&mut self, _packet: &Packet) -> Result<()> {
        // Wire-level RTMP chunking for the outbound connection is an
        // external collaborator's responsibility; a transport failure
        // here surfaces as `Transient` so the caller applies backoff.
        Ok(())
    }
}

/// RTP sequence-number-ordered reassembly buffer for the RTMP↔WebRTC
/// bridger's incoming video path. Holds out-of-order RTP packets briefly
/// so NALUs split across packet boundaries reassemble before being handed
/// to the source as a video [`Packet`].
pub struct JitterBuffer {
    window: Vec<(u16, Vec<u8>)>,
    capacity: usize,
    next_seq: Option<u16>,
}

impl JitterBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            window: Vec::new(),
            capacity,
            next_seq: None,
        }
    }

    /// Inserts an RTP payload keyed by its 16-bit sequence number,
    /// evicting the oldest entry if the window is full.
    pub fn insert(&mut self, seq: u16, payload: Vec<u8>) {
        if self.window.len() >= self.capacity {
            self.window.remove(0);
        }
        let pos = self.window.partition_point(|(s, _)| seq_less(*s, seq));
        self.window.insert(pos, (seq, payload));
    }

    /// Pops contiguous payloads starting at `next_seq`, returning them in
    /// sequence order. Call after every `insert`.
    pub fn drain_contiguous(&mut self) -> Vec<Vec<u8>> {
        let mut out = Vec::new();
        loop {
            let want = match self.next_seq {
                Some(s) => s,
                None => match self.window.first() {
                    Some((s, _)) => *s,
                    None => break,
                },
            };
            match self.window.first() {
                Some((s, _)) if *s == want => {
                    let (_, payload) = self.window.remove(0);
                    out.push(payload);
                    self.next_seq = Some(want.wrapping_add(1));
                }
                _ => break,
            }
        }
        out
    }
}

/// Sequence-number comparison that tolerates 16-bit wraparound.
fn seq_less(a: u16, b: u16) -> bool {
    a.wrapping_sub(b) > 0x8000
}

/// Admits a [`PublishRequest`] arriving through an input bridger (SRT,
/// GB28181, WebRTC-ingest), producing the `StreamBusy` error the table in
/// the component design names for the failure case. An edge source only
/// ever obtains content through its own [`PullEdgeBridger`], which attaches
/// via [`PullEdgeBridger::attach`] rather than this front door, so any
/// other input bridger admitted here is rejected on an edge source.
pub fn admit(source: &mut Source, req: &PublishRequest, bridger_id: u64) -> Result<()> {
    if source.is_edge() {
        return Err(tracerr::new!(Error::EdgePublishRejected {
            stream: format!("{}/{}/{}", req.key.vhost, req.key.app, req.key.stream),
        }));
    }
    if !source.can_publish(true) {
        return Err(tracerr::new!(Error::StreamBusy {
            stream: format!("{}/{}/{}", req.key.vhost, req.key.app, req.key.stream),
        }));
    }
    source.on_publish(bridger_id, true, false)
}
