//! In-memory representation of a single audio/video/metadata packet.

use std::sync::Arc;

use bytes::Bytes;

/// Which kind of payload a [`Packet`] carries.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum FrameType {
    Audio,
    Video,
    /// AMF0/AMF3 script data, e.g. `onMetaData`.
    Script,
}

/// Audio codec identity, decoded from the low nibble of an audio tag's
/// first byte. Unsupported-but-recognized ids are kept only so
/// classification never panics on an exotic encoder; they are never
/// transcoded.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum AudioCodecId {
    Aac,
    Mp3,
    Opus,
    Other(u8),
}

impl AudioCodecId {
    pub(crate) fn from_nibble(b: u8) -> Self {
        match b {
            10 => Self::Aac,
            2 | 14 => Self::Mp3,
            // SRS has no stable FLV tag id for Opus; bridgers that speak it
            // (WebRTC ingest) construct packets with this id directly
            // rather than deriving it from a tag byte.
            13 => Self::Opus,
            other => Self::Other(other),
        }
    }
}

/// Video codec identity, decoded from the low nibble of a video tag's
/// first byte.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum VideoCodecId {
    Avc,
    Hevc,
    Av1,
    Other(u8),
}

impl VideoCodecId {
    pub(crate) fn from_nibble(b: u8) -> Self {
        match b {
            7 => Self::Avc,
            12 => Self::Hevc,
            13 => Self::Av1,
            other => Self::Other(other),
        }
    }

    fn has_sequence_header_trait(self) -> bool {
        matches!(self, Self::Avc | Self::Hevc | Self::Av1)
    }
}

/// Result of inspecting a packet's first bytes, per the classification
/// rules in the component design.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Classification {
    pub is_video_keyframe: bool,
    pub is_video_sequence_header: bool,
    pub is_audio_sequence_header: bool,
    pub is_metadata: bool,
    /// A video "info/command" frame (type 5): classified, never delivered.
    pub is_dropped_command_frame: bool,
}

/// A video frame-type nibble, per the FLV video tag layout.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum VideoFrameType {
    Key,
    Inter,
    DisposableInter,
    GeneratedKey,
    Command,
    Unknown(u8),
}

impl VideoFrameType {
    fn from_nibble(b: u8) -> Self {
        match b {
            1 => Self::Key,
            2 => Self::Inter,
            3 => Self::DisposableInter,
            4 => Self::GeneratedKey,
            5 => Self::Command,
            other => Self::Unknown(other),
        }
    }
}

fn classify_audio(payload: &[u8]) -> (AudioCodecId, Classification) {
    let mut c = Classification::default();
    if payload.is_empty() {
        return (AudioCodecId::Other(0), c);
    }
    let codec = AudioCodecId::from_nibble((payload[0] >> 4) & 0x0f);
    match codec {
        AudioCodecId::Aac => {
            if let Some(&packet_type) = payload.get(1) {
                c.is_audio_sequence_header = packet_type == 0;
            }
        }
        // MP3 and everything else carries no packet-type byte: every
        // packet is a raw frame.
        _ => {}
    }
    (codec, c)
}

fn classify_video(payload: &[u8]) -> (VideoCodecId, Classification) {
    let mut c = Classification::default();
    if payload.is_empty() {
        return (VideoCodecId::Other(0), c);
    }
    let byte0 = payload[0];
    let frame_type = VideoFrameType::from_nibble((byte0 >> 4) & 0x0f);
    let codec = VideoCodecId::from_nibble(byte0 & 0x0f);

    if frame_type == VideoFrameType::Command {
        c.is_dropped_command_frame = true;
        return (codec, c);
    }

    if codec.has_sequence_header_trait() {
        if let Some(&packet_type) = payload.get(1) {
            c.is_video_sequence_header = packet_type == 0;
        }
    }
    c.is_video_keyframe =
        matches!(frame_type, VideoFrameType::Key | VideoFrameType::GeneratedKey);

    (codec, c)
}

/// Immutable, reference-counted packet envelope.
///
/// Cloning a [`Packet`] is a pointer copy plus an atomic refcount bump: the
/// payload is never copied when the packet is fanned out to many
/// consumers. `Arc` (rather than `Rc`) is used because a packet may cross
/// an actix worker boundary through a typed message channel, where both
/// the sending and receiving worker read it concurrently.
#[derive(Clone, Debug)]
pub struct Packet(Arc<PacketInner>);

#[derive(Debug)]
struct PacketInner {
    frame_type: FrameType,
    dts: i64,
    cts: i32,
    payload: Bytes,
    classification: Classification,
}

impl Packet {
    /// Builds a new packet, inspecting its payload to derive
    /// [`Classification`]. Per the component design, a best-effort parse
    /// failure never rejects the packet — only logs.
    pub fn new(frame_type: FrameType, dts: i64, cts: i32, payload: Bytes) -> Self {
        let classification = match frame_type {
            FrameType::Audio => classify_audio(&payload).1,
            FrameType::Video => classify_video(&payload).1,
            FrameType::Script => Classification {
                is_metadata: true,
                ..Classification::default()
            },
        };
        Self(Arc::new(PacketInner {
            frame_type,
            dts,
            cts,
            payload,
            classification,
        }))
    }

    pub fn frame_type(&self) -> FrameType {
        self.0.frame_type
    }

    /// Decoding timestamp in milliseconds, monotonic within a stream.
    pub fn dts(&self) -> i64 {
        self.0.dts
    }

    /// Presentation timestamp: `dts + cts`.
    pub fn pts(&self) -> i64 {
        self.0.dts + i64::from(self.0.cts)
    }

    pub fn cts(&self) -> i32 {
        self.0.cts
    }

    pub fn payload(&self) -> &Bytes {
        &self.0.payload
    }

    pub fn is_video_keyframe(&self) -> bool {
        self.0.classification.is_video_keyframe
    }

    pub fn is_video_sequence_header(&self) -> bool {
        self.0.classification.is_video_sequence_header
    }

    pub fn is_audio_sequence_header(&self) -> bool {
        self.0.classification.is_audio_sequence_header
    }

    pub fn is_sequence_header(&self) -> bool {
        self.is_video_sequence_header() || self.is_audio_sequence_header()
    }

    pub fn is_metadata(&self) -> bool {
        self.0.classification.is_metadata
    }

    /// `true` for a video "info/command" frame, which is classified but
    /// never delivered to any consumer.
    pub fn is_dropped_command_frame(&self) -> bool {
        self.0.classification.is_dropped_command_frame
    }

    /// Returns a copy of this packet with `dts` rewritten, used by the
    /// consumer's jitter corrector. The payload `Bytes` is shared, not
    /// copied.
    pub fn with_dts(&self, dts: i64) -> Self {
        Self(Arc::new(PacketInner {
            frame_type: self.0.frame_type,
            dts,
            cts: self.0.cts,
            payload: self.0.payload.clone(),
            classification: self.0.classification,
        }))
    }
}
