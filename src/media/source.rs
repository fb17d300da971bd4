//! Per-stream source hub: admission, publisher state, consumer fan-out,
//! sequence-header/metadata latching, mix-correct ordering, and bridger
//! dispatch.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::error::{Error, Result};
use crate::media::codec::{AudioConfig, CodecConfigs, VideoConfig};
use crate::media::consumer::{Consumer, ConsumerOptions};
use crate::media::gop_cache::GopCache;
use crate::media::packet::{FrameType, Packet};

/// Identifies a source: vhost, application, and stream name.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct StreamKey {
    pub vhost: String,
    pub app: String,
    pub stream: String,
}

impl StreamKey {
    pub fn new(vhost: impl Into<String>, app: impl Into<String>, stream: impl Into<String>) -> Self {
        Self {
            vhost: vhost.into(),
            app: app.into(),
            stream: stream.into(),
        }
    }
}

/// Lifecycle request carried by a publisher attempt, per the publisher
/// interface the core consumes from its RTMP/SRT/GB28181/WebRTC
/// collaborators.
#[derive(Clone, Debug)]
pub struct PublishRequest {
    pub key: StreamKey,
    pub params: HashMap<String, String>,
    pub source_address: String,
}

/// A source's admission/publisher state.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SourceState {
    Idle,
    IdleWithConsumers,
    Publishing,
}

/// Selects whether audio/video are reordered into strict DTS order before
/// fan-out (`mix_correct`) or forwarded immediately as they arrive.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum MixCorrect {
    Enabled,
    Disabled,
}

/// Whether an idle source retains its GOP cache and sequence headers
/// across a publisher reconnect within the dispose window.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum AtcRetention {
    Retain,
    Clear,
}

struct SequenceHeaders {
    audio: Option<Packet>,
    video: Option<Packet>,
}

impl SequenceHeaders {
    fn new() -> Self {
        Self {
            audio: None,
            video: None,
        }
    }
}

/// Per-stream hub object keyed by `(vhost, app, stream)`.
pub struct Source {
    key: StreamKey,
    state: SourceState,
    publisher_id: Option<u64>,
    is_bridger_publisher: bool,
    next_consumer_id: u64,
    consumers: HashMap<u64, Rc<RefCell<Consumer>>>,
    codecs: CodecConfigs,
    seq_headers: SequenceHeaders,
    metadata: Option<Packet>,
    gop_cache: GopCache,
    gop_cache_enabled: bool,
    mix_correct: MixCorrect,
    atc_retention: AtcRetention,
    audio_fifo: Vec<Packet>,
    video_fifo: Vec<Packet>,
    mix_fifo_window: usize,
    is_edge: bool,
    /// Output bridgers attached via [`Source::set_bridger`] (HLS/DASH/
    /// HTTP-FLV/WebRTC muxers, per-destination forwarders): pseudo-
    /// consumers fanned out to exactly like play consumers, but tracked
    /// separately so the caller can tell a format bridge apart from a
    /// regular player when iterating.
    bridgers: HashMap<u64, Rc<RefCell<Consumer>>>,
    next_bridger_id: u64,
    /// Upstream URLs this source forwards to, one outgoing bridger per
    /// destination, per the forwarder fan-in design.
    forward_destinations: Vec<String>,
}

/// How a newly attached consumer's prologue should be assembled.
#[derive(Clone, Copy, Debug)]
pub struct ConsumerDumpOptions {
    pub with_sequence_headers: bool,
    pub with_metadata: bool,
    pub with_gop_cache: bool,
}

impl Default for ConsumerDumpOptions {
    /// A freshly attached consumer gets the full prologue: latched
    /// sequence headers, latched metadata, then the GOP cache.
    fn default() -> Self {
        Self {
            with_sequence_headers: true,
            with_metadata: true,
            with_gop_cache: true,
        }
    }
}

impl Source {
    pub fn new(key: StreamKey, mix_correct: MixCorrect, atc_retention: AtcRetention, is_edge: bool) -> Self {
        Self {
            key,
            state: SourceState::Idle,
            publisher_id: None,
            is_bridger_publisher: false,
            next_consumer_id: 1,
            consumers: HashMap::new(),
            codecs: CodecConfigs::default(),
            seq_headers: SequenceHeaders::new(),
            metadata: None,
            gop_cache: GopCache::new(512, 10_000),
            gop_cache_enabled: true,
            mix_correct,
            atc_retention,
            audio_fifo: Vec::new(),
            video_fifo: Vec::new(),
            mix_fifo_window: 8,
            is_edge,
            bridgers: HashMap::new(),
            next_bridger_id: 1,
            forward_destinations: Vec::new(),
        }
    }

    pub fn key(&self) -> &StreamKey {
        &self.key
    }

    pub fn state(&self) -> SourceState {
        self.state
    }

    /// `true` iff no publisher is currently admitted. `exclusive` is
    /// accepted for symmetry with the interface table; admission is always
    /// exclusive in this implementation (at most one publisher).
    pub fn can_publish(&self, _exclusive: bool) -> bool {
        self.publisher_id.is_none()
    }

    /// Admits `publisher_id` as this source's publisher.
    ///
    /// `replacing_bridger`: when `true`, an existing bridger-origin
    /// publisher is atomically replaced rather than rejected, per the
    /// "existing publisher is a bridger being atomically replaced"
    /// exception in the state machine.
    pub fn on_publish(&mut self, publisher_id: u64, is_bridger: bool, replacing_bridger: bool) -> Result<()> {
        if self.is_edge && !is_bridger {
            return Err(tracerr::new!(Error::EdgePublishRejected {
                stream: self.stream_label(),
            }));
        }
        if self.publisher_id.is_some() {
            if replacing_bridger && self.is_bridger_publisher {
                self.publisher_id = Some(publisher_id);
                self.is_bridger_publisher = is_bridger;
                return Ok(());
            }
            return Err(tracerr::new!(Error::StreamBusy {
                stream: self.stream_label(),
            }));
        }
        self.publisher_id = Some(publisher_id);
        self.is_bridger_publisher = is_bridger;
        self.state = SourceState::Publishing;
        Ok(())
    }

    /// Releases the publisher. The GOP cache is cleared unless ATC
    /// retention is configured for this source.
    pub fn on_unpublish(&mut self) {
        self.publisher_id = None;
        self.is_bridger_publisher = false;
        if self.atc_retention == AtcRetention::Clear {
            self.gop_cache.clear();
        }
        self.state = if self.consumers.is_empty() {
            SourceState::Idle
        } else {
            SourceState::IdleWithConsumers
        };
    }

    fn stream_label(&self) -> String {
        format!("{}/{}/{}", self.key.vhost, self.key.app, self.key.stream)
    }

    /// Ingests an audio packet: updates the sequence-header latch if
    /// applicable, feeds the GOP cache, and fans out to every consumer
    /// (through the mix-correct FIFO if enabled).
    pub fn on_audio(&mut self, packet: Packet) {
        if packet.is_audio_sequence_header() {
            match AudioConfig::parse(&packet) {
                Ok(cfg) => self.codecs.audio = Some(cfg),
                Err(_) => {
                    // Best-effort: latch the raw header even if parsing
                    // failed, so dependent frames still have something to
                    // reference.
                }
            }
            self.seq_headers.audio = Some(packet.clone());
        }
        if self.gop_cache_enabled {
            self.gop_cache.cache(&packet);
        }
        self.dispatch(FrameType::Audio, packet);
    }

    /// Ingests a video packet. A frame classified as a dropped
    /// info/command frame never reaches a consumer.
    pub fn on_video(&mut self, packet: Packet) {
        if packet.is_dropped_command_frame() {
            return;
        }
        if packet.is_video_sequence_header() {
            match VideoConfig::parse(&packet) {
                Ok(cfg) => self.codecs.video = Some(cfg),
                Err(_) => {}
            }
            self.seq_headers.video = Some(packet.clone());
        }
        if self.gop_cache_enabled {
            self.gop_cache.cache(&packet);
        }
        self.dispatch(FrameType::Video, packet);
    }

    /// Latches script/metadata and re-delivers to every consumer
    /// immediately (new consumers see it on next attach).
    pub fn on_meta(&mut self, packet: Packet) {
        self.metadata = Some(packet.clone());
        self.dispatch(FrameType::Script, packet);
    }

    /// Routes `packet` either straight to fan-out, or (if `mix_correct` is
    /// enabled) through the per-type FIFO, draining the smaller-DTS packet
    /// first with audio preferred on a DTS tie.
    fn dispatch(&mut self, ty: FrameType, packet: Packet) {
        if self.mix_correct == MixCorrect::Disabled || ty == FrameType::Script {
            self.fan_out(packet);
            return;
        }
        match ty {
            FrameType::Audio => self.audio_fifo.push(packet),
            FrameType::Video => self.video_fifo.push(packet),
            FrameType::Script => unreachable!(),
        }
        self.drain_mix_fifos(false);
    }

    /// Drains the mix-correct FIFOs in ascending DTS order, ties broken in
    /// favor of audio. `flush` forces draining both FIFOs completely
    /// (used when the publisher disconnects).
    fn drain_mix_fifos(&mut self, flush: bool) {
        loop {
            if !flush && self.audio_fifo.len() < self.mix_fifo_window && self.video_fifo.len() < self.mix_fifo_window {
                // Wait for more context before committing to an order,
                // unless one side is empty and the other isn't (nothing
                // left to reorder against).
                if !(self.audio_fifo.is_empty() ^ self.video_fifo.is_empty()) {
                    break;
                }
            }
            match (self.audio_fifo.first(), self.video_fifo.first()) {
                (Some(a), Some(v)) => {
                    if a.dts() <= v.dts() {
                        let p = self.audio_fifo.remove(0);
                        self.fan_out(p);
                    } else {
                        let p = self.video_fifo.remove(0);
                        self.fan_out(p);
                    }
                }
                (Some(_), None) => {
                    let p = self.audio_fifo.remove(0);
                    self.fan_out(p);
                }
                (None, Some(_)) => {
                    let p = self.video_fifo.remove(0);
                    self.fan_out(p);
                }
                (None, None) => break,
            }
            if !flush {
                break;
            }
        }
    }

    fn fan_out(&mut self, packet: Packet) {
        let mut dead = Vec::new();
        for (id, consumer) in self.consumers.iter().chain(self.bridgers.iter()) {
            if consumer.borrow_mut().enqueue(packet.clone()).is_err() {
                dead.push(*id);
            }
        }
        for id in dead {
            self.consumers.remove(&id);
            self.bridgers.remove(&id);
        }
    }

    /// Creates and attaches a new consumer, transitioning `Idle` to
    /// `IdleWithConsumers` if there is no publisher yet.
    pub fn create_consumer(&mut self, opts: ConsumerOptions) -> Rc<RefCell<Consumer>> {
        let id = self.next_consumer_id;
        self.next_consumer_id += 1;
        let consumer = Rc::new(RefCell::new(Consumer::new(id, opts)));
        self.consumers.insert(id, Rc::clone(&consumer));
        if self.state == SourceState::Idle {
            self.state = SourceState::IdleWithConsumers;
        }
        consumer
    }

    pub fn detach_consumer(&mut self, id: u64) {
        self.consumers.remove(&id);
        if self.consumers.is_empty() && self.state == SourceState::IdleWithConsumers {
            self.state = SourceState::Idle;
        }
    }

    /// Attaches a format bridge (HLS/DASH/HTTP-FLV/WebRTC muxer, or a
    /// per-destination forwarder) as a pseudo-consumer: it receives the
    /// same prologue-then-live-stream treatment as a play consumer via
    /// [`Source::consumer_dumps`], but is tracked separately so the caller
    /// can enumerate format bridges without iterating play consumers.
    pub fn set_bridger(&mut self, opts: ConsumerOptions) -> (u64, Rc<RefCell<Consumer>>) {
        let id = self.next_bridger_id;
        self.next_bridger_id += 1;
        let consumer = Rc::new(RefCell::new(Consumer::new(id, opts)));
        self.bridgers.insert(id, Rc::clone(&consumer));
        (id, consumer)
    }

    pub fn detach_bridger(&mut self, id: u64) {
        self.bridgers.remove(&id);
    }

    pub fn bridger_count(&self) -> usize {
        self.bridgers.len()
    }

    /// `true` iff this is an edge source with no publisher and at least
    /// one consumer attached: the caller must spawn a pull-from-upstream
    /// bridger (which becomes this source's publisher via
    /// [`Source::on_publish`]) to satisfy the edge-mode contract.
    pub fn needs_edge_pull(&self) -> bool {
        self.is_edge && self.publisher_id.is_none() && !self.consumers.is_empty()
    }

    /// Upstream forward destinations configured for this source, per the
    /// `vhost.forward` directive; the caller spawns one [`set_bridger`]
    /// per entry.
    ///
    /// [`set_bridger`]: Source::set_bridger
    pub fn set_forward_destinations(&mut self, destinations: Vec<String>) {
        self.forward_destinations = destinations;
    }

    pub fn forward_destinations(&self) -> &[String] {
        &self.forward_destinations
    }

    /// Replays the selected prologue into `consumer`: sequence headers,
    /// then metadata, then the GOP cache, per the invariant that sequence
    /// headers always precede dependent frames.
    pub fn consumer_dumps(&self, consumer: &mut Consumer, opts: ConsumerDumpOptions) {
        if opts.with_sequence_headers {
            if let Some(v) = &self.seq_headers.video {
                let _ = consumer.enqueue(v.clone());
            }
            if let Some(a) = &self.seq_headers.audio {
                let _ = consumer.enqueue(a.clone());
            }
        }
        if opts.with_metadata {
            if let Some(m) = &self.metadata {
                let _ = consumer.enqueue(m.clone());
            }
        }
        if opts.with_gop_cache {
            self.gop_cache.dump(consumer);
        }
    }

    pub fn consumer_count(&self) -> usize {
        self.consumers.len()
    }

    pub fn is_edge(&self) -> bool {
        self.is_edge
    }
}

/// Registry of all live sources, keyed by `(vhost, app, stream)`. Sources
/// are retained even when idle (a reconnecting publisher sees prior
/// history within the configured dispose TTL); eviction is the caller's
/// responsibility (driven by a timer against `last_activity`, not modeled
/// here).
pub struct SourceHub {
    sources: HashMap<StreamKey, Rc<RefCell<Source>>>,
    transitioning: HashMap<StreamKey, ()>,
    mix_correct: MixCorrect,
    atc_retention: AtcRetention,
}

impl SourceHub {
    pub fn new(mix_correct: MixCorrect, atc_retention: AtcRetention) -> Self {
        Self {
            sources: HashMap::new(),
            transitioning: HashMap::new(),
            mix_correct,
            atc_retention,
        }
    }

    /// Returns the existing source for `key`, or creates and registers a
    /// new one. Returns `Busy` if the key is mid-transition (e.g. being
    /// atomically swapped to a new publisher elsewhere in the same tick).
    pub fn fetch_or_create(&mut self, key: StreamKey, is_edge: bool) -> Result<Rc<RefCell<Source>>> {
        if self.transitioning.contains_key(&key) {
            return Err(tracerr::new!(Error::StreamBusy {
                stream: format!("{}/{}/{}", key.vhost, key.app, key.stream),
            }));
        }
        if let Some(s) = self.sources.get(&key) {
            return Ok(Rc::clone(s));
        }
        let source = Rc::new(RefCell::new(Source::new(
            key.clone(),
            self.mix_correct,
            self.atc_retention,
            is_edge,
        )));
        self.sources.insert(key, Rc::clone(&source));
        Ok(source)
    }

    pub fn get(&self, key: &StreamKey) -> Option<Rc<RefCell<Source>>> {
        self.sources.get(key).cloned()
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use crate::media::consumer::JitterAlgorithm;
    use crate::media::queue::DropPolicy;

    fn key() -> StreamKey {
        StreamKey::new("__defaultVhost__", "live", "stream0")
    }

    fn default_consumer_opts() -> ConsumerOptions {
        ConsumerOptions {
            atc: false,
            jitter: JitterAlgorithm::Off,
            expected_interval_ms: 33,
            jitter_threshold_ms: 100,
            max_queue_span_ms: 60_000,
            max_queue_count: 1000,
            drop_policy: DropPolicy::DropVideoNonGop,
            merge_messages: 10,
            max_av_delta_ms: Some(10_000),
        }
    }

    fn meta() -> Packet {
        Packet::new(FrameType::Script, 0, 0, Bytes::from_static(b"onMetaData"))
    }

    fn vsh() -> Packet {
        Packet::new(FrameType::Video, 0, 0, Bytes::from(vec![0x17, 0x00, 0, 0, 0]))
    }

    fn ash() -> Packet {
        Packet::new(FrameType::Audio, 0, 0, Bytes::from(vec![0xAF, 0x00, 0x12, 0x10]))
    }

    fn vkey(dts: i64) -> Packet {
        Packet::new(FrameType::Video, dts, 0, Bytes::from(vec![0x17, 0x01, 0, 0, 0]))
    }

    fn v(dts: i64) -> Packet {
        Packet::new(FrameType::Video, dts, 0, Bytes::from(vec![0x27, 0x01, 0, 0, 0]))
    }

    fn a(dts: i64) -> Packet {
        Packet::new(FrameType::Audio, dts, 0, Bytes::from(vec![0xAF, 0x01, 0, 0]))
    }

    #[test]
    fn publish_then_play_ordering_s1() {
        let mut source = Source::new(key(), MixCorrect::Disabled, AtcRetention::Clear, false);
        source.on_publish(1, false, false).unwrap();
        source.on_meta(meta());
        source.on_video(vsh());
        source.on_audio(ash());
        source.on_video(vkey(0));
        source.on_audio(a(20));
        source.on_video(v(33));
        source.on_audio(a(40));
        source.on_video(v(66));

        let consumer = source.create_consumer(default_consumer_opts());
        source.consumer_dumps(
            &mut consumer.borrow_mut(),
            ConsumerDumpOptions {
                with_sequence_headers: true,
                with_metadata: true,
                with_gop_cache: true,
            },
        );
        let mut out = Vec::new();
        consumer.borrow_mut().dump_packets(&mut out, 100);
        // Sequence headers and metadata come from the prologue dump, not
        // from fan-out (the consumer attached after they were already
        // latched), and the GOP cache replays everything from the last
        // keyframe forward.
        assert!(out[0].is_video_sequence_header());
        assert!(out[1].is_audio_sequence_header());
        assert!(out[2].is_metadata());
        assert!(out[3].is_video_keyframe());
        assert_eq!(out[3].dts(), 0);
    }

    #[test]
    fn second_publisher_rejected_s4() {
        let mut source = Source::new(key(), MixCorrect::Disabled, AtcRetention::Clear, false);
        source.on_publish(1, false, false).unwrap();
        let err = source.on_publish(2, false, false).unwrap_err();
        assert!(matches!(err.as_ref(), Error::StreamBusy { .. }));
        assert_eq!(source.state(), SourceState::Publishing);
    }

    #[test]
    fn can_publish_reflects_admission_s3() {
        let mut source = Source::new(key(), MixCorrect::Disabled, AtcRetention::Clear, false);
        assert!(source.can_publish(true));
        source.on_publish(1, false, false).unwrap();
        assert!(!source.can_publish(true));
        source.on_unpublish();
        assert!(source.can_publish(true));
    }

    #[test]
    fn gop_cache_first_packet_after_prologue_is_keyframe_s6() {
        let mut source = Source::new(key(), MixCorrect::Disabled, AtcRetention::Clear, false);
        source.on_publish(1, false, false).unwrap();
        source.on_video(vkey(0));
        source.on_video(v(33));
        source.on_video(v(66));
        let consumer = source.create_consumer(default_consumer_opts());
        source.consumer_dumps(
            &mut consumer.borrow_mut(),
            ConsumerDumpOptions {
                with_sequence_headers: true,
                with_metadata: true,
                with_gop_cache: true,
            },
        );
        let mut out = Vec::new();
        consumer.borrow_mut().dump_packets(&mut out, 100);
        assert!(out[0].is_video_keyframe());
    }

    #[test]
    fn fetch_or_create_returns_same_source() {
        let mut hub = SourceHub::new(MixCorrect::Disabled, AtcRetention::Clear);
        let s1 = hub.fetch_or_create(key(), false).unwrap();
        let s2 = hub.fetch_or_create(key(), false).unwrap();
        assert!(Rc::ptr_eq(&s1, &s2));
        assert_eq!(hub.len(), 1);
    }

    #[test]
    fn set_bridger_receives_prologue_and_live_frames() {
        let mut source = Source::new(key(), MixCorrect::Disabled, AtcRetention::Clear, false);
        source.on_publish(1, false, false).unwrap();
        source.on_video(vsh());
        source.on_video(vkey(0));

        let (id, bridger) = source.set_bridger(default_consumer_opts());
        source.consumer_dumps(&mut bridger.borrow_mut(), ConsumerDumpOptions::default());
        source.on_video(v(33));

        let mut out = Vec::new();
        bridger.borrow_mut().dump_packets(&mut out, 10);
        assert!(out[0].is_video_sequence_header());
        assert!(out.iter().any(|p| p.dts() == 33));
        assert_eq!(source.bridger_count(), 1);
        source.detach_bridger(id);
        assert_eq!(source.bridger_count(), 0);
    }

    #[test]
    fn edge_source_needs_pull_bridger_once_a_consumer_attaches() {
        let mut source = Source::new(key(), MixCorrect::Disabled, AtcRetention::Clear, true);
        assert!(!source.needs_edge_pull());
        source.create_consumer(default_consumer_opts());
        assert!(source.needs_edge_pull());
        source.on_publish(1, true, false).unwrap();
        assert!(!source.needs_edge_pull());
    }

    #[test]
    fn edge_source_rejects_direct_publish() {
        let mut source = Source::new(key(), MixCorrect::Disabled, AtcRetention::Clear, true);
        let err = source.on_publish(1, false, false).unwrap_err();
        assert!(matches!(err.as_ref(), Error::EdgePublishRejected { .. }));
        assert!(source.can_publish(true));
        source.on_publish(1, true, false).unwrap();
        assert!(!source.can_publish(true));
    }

    #[test]
    fn forward_destinations_round_trip() {
        let mut source = Source::new(key(), MixCorrect::Disabled, AtcRetention::Clear, false);
        source.set_forward_destinations(vec!["rtmp://origin/live".into()]);
        assert_eq!(source.forward_destinations(), ["rtmp://origin/live"]);
    }
}
