//! A single subscriber's view of a source: queue, jitter correction, and
//! pause/resume, per the per-consumer contract a source hub attaches.

use crate::error::{Error, Result};
use crate::media::packet::{FrameType, Packet};
use crate::media::queue::{DropPolicy, EnqueueOutcome, Queue};

/// Selects how a consumer rewrites non-monotonic or jumpy DTS values.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum JitterAlgorithm {
    /// Rewrite using the expected per-frame interval whenever DTS goes
    /// backward or jumps ahead of a configured threshold.
    Full,
    /// Rewrite relative to the last delivered DTS using the delta between
    /// consecutive incoming DTS values (tolerates variable frame rate).
    Zero,
    /// Absolute-timestamp mode: pass DTS through unchanged.
    Off,
}

struct JitterState {
    alg: JitterAlgorithm,
    expected_interval_ms: i64,
    threshold_ms: i64,
    last_out: Option<i64>,
    last_in: Option<i64>,
}

impl JitterState {
    fn new(alg: JitterAlgorithm, expected_interval_ms: i64, threshold_ms: i64) -> Self {
        Self {
            alg,
            expected_interval_ms,
            threshold_ms,
            last_out: None,
            last_in: None,
        }
    }

    fn correct(&mut self, packet: &Packet) -> Packet {
        let dts_in = packet.dts();
        let out = match self.alg {
            JitterAlgorithm::Off => dts_in,
            JitterAlgorithm::Full => match (self.last_out, self.last_in) {
                (Some(last_out), Some(last_in))
                    if dts_in < last_in || dts_in - last_in > self.threshold_ms =>
                {
                    last_out + self.expected_interval_ms
                }
                _ => dts_in,
            },
            JitterAlgorithm::Zero => match (self.last_out, self.last_in) {
                (Some(last_out), Some(last_in)) => last_out + (dts_in - last_in),
                _ => dts_in,
            },
        };
        self.last_in = Some(dts_in);
        self.last_out = Some(out);
        if out == dts_in {
            packet.clone()
        } else {
            packet.with_dts(out)
        }
    }
}

/// Owns one [`Queue`] plus the jitter corrector applied to every enqueued
/// packet unless the source runs in ATC mode.
pub struct Consumer {
    id: u64,
    queue: Queue,
    audio_jitter: JitterState,
    video_jitter: JitterState,
    atc: bool,
    paused: bool,
    merge_messages: usize,
}

/// Tuning a [`Consumer`] is configured with, mirroring the attach-time
/// options a protocol handler passes to the source hub.
#[derive(Clone, Copy, Debug)]
pub struct ConsumerOptions {
    pub atc: bool,
    pub jitter: JitterAlgorithm,
    pub expected_interval_ms: i64,
    pub jitter_threshold_ms: i64,
    pub max_queue_span_ms: i64,
    pub max_queue_count: usize,
    pub drop_policy: DropPolicy,
    pub merge_messages: usize,
    /// A lagging audio packet more than this far behind the newest video
    /// packet already queued is dropped outright. `None` disables the
    /// check, appropriate for an audio-only consumer.
    pub max_av_delta_ms: Option<i64>,
}

impl Consumer {
    pub fn new(id: u64, opts: ConsumerOptions) -> Self {
        Self {
            id,
            queue: Queue::with_av_delta(
                opts.max_queue_span_ms,
                opts.max_queue_count,
                opts.drop_policy,
                opts.max_av_delta_ms,
            ),
            audio_jitter: JitterState::new(
                opts.jitter,
                opts.expected_interval_ms,
                opts.jitter_threshold_ms,
            ),
            video_jitter: JitterState::new(
                opts.jitter,
                opts.expected_interval_ms,
                opts.jitter_threshold_ms,
            ),
            atc: opts.atc,
            paused: false,
            merge_messages: opts.merge_messages,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Applies jitter correction (unless ATC) and enqueues. Returns
    /// `SlowConsumer` if the queue's policy is `Disable` and still over
    /// bound after enqueue; the caller must then detach this consumer.
    pub fn enqueue(&mut self, packet: Packet) -> Result<()> {
        let packet = if self.atc {
            packet
        } else {
            match packet.frame_type() {
                FrameType::Audio => self.audio_jitter.correct(&packet),
                FrameType::Video => self.video_jitter.correct(&packet),
                FrameType::Script => packet,
            }
        };
        match self.queue.enqueue(packet) {
            EnqueueOutcome::Accepted { .. } => Ok(()),
            EnqueueOutcome::Overflow => Err(tracerr::new!(Error::SlowConsumer {
                consumer_id: self.id,
            })),
        }
    }

    /// Drains up to `max_count` packets into `batch`. While paused, no
    /// packets are drained (the queue still fills and applies its drop
    /// policy). Returns fewer than `max_count` once `merge_messages` have
    /// been collected or the queue runs dry.
    pub fn dump_packets(&mut self, batch: &mut Vec<Packet>, max_count: usize) -> usize {
        if self.paused {
            return 0;
        }
        let cap = max_count.min(self.merge_messages.max(1));
        self.queue.dequeue(batch, cap)
    }

    pub fn on_play_client_pause(&mut self, paused: bool) {
        self.paused = paused;
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn default_opts(jitter: JitterAlgorithm) -> ConsumerOptions {
        ConsumerOptions {
            atc: false,
            jitter,
            expected_interval_ms: 33,
            jitter_threshold_ms: 100,
            max_queue_span_ms: 60_000,
            max_queue_count: 1000,
            drop_policy: DropPolicy::DropVideoNonGop,
            merge_messages: 1,
            max_av_delta_ms: None,
        }
    }

    fn vkey(dts: i64) -> Packet {
        Packet::new(FrameType::Video, dts, 0, Bytes::from(vec![0x17, 0x01, 0, 0, 0]))
    }

    #[test]
    fn jitter_full_rewrites_backward_dts_s2() {
        let mut c = Consumer::new(1, default_opts(JitterAlgorithm::Full));
        c.enqueue(vkey(100)).unwrap();
        c.enqueue(vkey(50)).unwrap();
        c.enqueue(vkey(180)).unwrap();
        let mut out = Vec::new();
        c.dump_packets(&mut out, 10);
        let dts: Vec<i64> = out.iter().map(Packet::dts).collect();
        assert_eq!(dts, vec![100, 133, 166]);
    }

    #[test]
    fn jitter_off_passes_through_under_atc() {
        let mut opts = default_opts(JitterAlgorithm::Full);
        opts.atc = true;
        let mut c = Consumer::new(1, opts);
        c.enqueue(vkey(100)).unwrap();
        c.enqueue(vkey(50)).unwrap();
        let mut out = Vec::new();
        c.dump_packets(&mut out, 10);
        let dts: Vec<i64> = out.iter().map(Packet::dts).collect();
        assert_eq!(dts, vec![100, 50]);
    }

    #[test]
    fn paused_consumer_does_not_drain() {
        let mut c = Consumer::new(1, default_opts(JitterAlgorithm::Off));
        c.enqueue(vkey(0)).unwrap();
        c.on_play_client_pause(true);
        let mut out = Vec::new();
        assert_eq!(c.dump_packets(&mut out, 10), 0);
        c.on_play_client_pause(false);
        assert_eq!(c.dump_packets(&mut out, 10), 1);
    }

    #[test]
    fn disable_policy_yields_slow_consumer_error() {
        let mut opts = default_opts(JitterAlgorithm::Off);
        opts.max_queue_count = 1;
        opts.drop_policy = DropPolicy::Disable;
        let mut c = Consumer::new(7, opts);
        c.enqueue(vkey(0)).unwrap();
        let err = c.enqueue(vkey(33)).unwrap_err();
        assert!(matches!(err.as_ref(), Error::SlowConsumer { consumer_id: 7 }));
    }
}
