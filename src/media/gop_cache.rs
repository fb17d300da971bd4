//! Per-source cache of frames from the latest video keyframe forward, fed
//! to newly attached consumers so they start up instantly instead of
//! waiting for the next keyframe.

use crate::media::consumer::Consumer;
use crate::media::packet::{FrameType, Packet};

/// Ordered run of packets starting at a video keyframe (or, for an
/// audio-only source, a bounded recent window).
pub struct GopCache {
    packets: Vec<Packet>,
    max_frames: usize,
    max_audio_only_span_ms: i64,
    has_video: bool,
}

impl GopCache {
    pub fn new(max_frames: usize, max_audio_only_span_ms: i64) -> Self {
        Self {
            packets: Vec::new(),
            max_frames,
            max_audio_only_span_ms,
            has_video: false,
        }
    }

    /// Appends `packet` to the cache, per the rules in the component
    /// design: a video keyframe resets the cache; otherwise the packet is
    /// appended only if the cache is already non-empty, or the packet is a
    /// sequence header / metadata (which may legitimately arrive first).
    pub fn cache(&mut self, packet: &Packet) {
        if packet.frame_type() == FrameType::Video {
            self.has_video = true;
        }
        if packet.is_video_keyframe() && !packet.is_sequence_header() {
            self.packets.clear();
            self.packets.push(packet.clone());
            return;
        }
        if self.packets.is_empty() && !packet.is_sequence_header() && !packet.is_metadata() {
            // No keyframe has arrived yet and this isn't header/metadata:
            // nothing to anchor the GOP to.
            if self.has_video {
                return;
            }
            // Audio-only source: the first audio packet anchors the cache.
        }
        self.packets.push(packet.clone());
        self.enforce_bound();
    }

    fn enforce_bound(&mut self) {
        if self.has_video {
            if self.packets.len() > self.max_frames {
                let excess = self.packets.len() - self.max_frames;
                self.packets.drain(0..excess);
            }
        } else if let (Some(first), Some(last)) = (self.packets.first(), self.packets.last()) {
            while self.packets.len() > 1
                && last.dts() - first.dts() > self.max_audio_only_span_ms
            {
                self.packets.remove(0);
            }
        }
    }

    /// Replays the cache into `consumer`'s queue, in order. The caller is
    /// responsible for prepending latched sequence headers and metadata
    /// before calling this, per the source hub's attach sequence.
    pub fn dump(&self, consumer: &mut Consumer) {
        for p in &self.packets {
            let _ = consumer.enqueue(p.clone());
        }
    }

    /// Clears the cache, called on unpublish unless ATC retention is
    /// enabled for the source (in which case the caller simply does not
    /// invoke this).
    pub fn clear(&mut self) {
        self.packets.clear();
        self.has_video = false;
    }

    pub fn is_empty(&self) -> bool {
        self.packets.is_empty()
    }

    pub fn first(&self) -> Option<&Packet> {
        self.packets.first()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn vkey(dts: i64) -> Packet {
        Packet::new(FrameType::Video, dts, 0, Bytes::from(vec![0x17, 0x01, 0, 0, 0]))
    }

    fn vinter(dts: i64) -> Packet {
        Packet::new(FrameType::Video, dts, 0, Bytes::from(vec![0x27, 0x01, 0, 0, 0]))
    }

    #[test]
    fn first_cached_frame_is_always_a_keyframe_s8() {
        let mut cache = GopCache::new(100, 10_000);
        cache.cache(&vinter(0)); // dropped: no keyframe anchor yet
        cache.cache(&vkey(33));
        cache.cache(&vinter(66));
        assert!(cache.first().unwrap().is_video_keyframe());
    }

    #[test]
    fn new_keyframe_resets_cache() {
        let mut cache = GopCache::new(100, 10_000);
        cache.cache(&vkey(0));
        cache.cache(&vinter(33));
        cache.cache(&vkey(66));
        assert_eq!(cache.first().unwrap().dts(), 66);
    }

    #[test]
    fn clear_empties_cache() {
        let mut cache = GopCache::new(100, 10_000);
        cache.cache(&vkey(0));
        cache.clear();
        assert!(cache.is_empty());
    }
}
