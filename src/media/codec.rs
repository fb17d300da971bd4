//! Codec configuration latched once per publisher and shared by reference
//! with every packet of that source, rather than copied onto each packet.

use bytes::Bytes;

use crate::error::{Error, Result};
use crate::media::packet::{AudioCodecId, Packet, VideoCodecId};

/// Parsed AAC `AudioSpecificConfig`, to the depth the core needs: enough to
/// report sample rate / channel count without decoding audio.
#[derive(Clone, Debug)]
pub struct AudioConfig {
    pub id: AudioCodecId,
    pub sample_rate: u32,
    pub sample_size: u8,
    pub channels: u8,
    /// Raw sequence-header bytes (e.g. the AAC ASC), latched verbatim.
    pub extra: Bytes,
}

impl AudioConfig {
    /// Derives an [`AudioConfig`] from a latched sequence-header packet.
    /// Best-effort: a malformed header still produces a config with
    /// placeholder fields rather than rejecting the packet, per the
    /// packet-classification tolerance policy.
    pub fn parse(packet: &Packet) -> Result<Self> {
        let payload = packet.payload();
        if payload.len() < 2 {
            return Err(tracerr::new!(Error::DecodeError {
                reason: "audio sequence header shorter than 2 bytes".into(),
            }));
        }
        let byte0 = payload[0];
        let id = AudioCodecId::from_nibble((byte0 >> 4) & 0x0f);
        let sample_rate = match (byte0 >> 2) & 0x03 {
            0 => 5_500,
            1 => 11_025,
            2 => 22_050,
            _ => 44_100,
        };
        let sample_size = if byte0 & 0x02 != 0 { 16 } else { 8 };
        let channels = if byte0 & 0x01 != 0 { 2 } else { 1 };
        Ok(Self {
            id,
            sample_rate,
            sample_size,
            channels,
            extra: payload.slice(2..),
        })
    }
}

/// Parsed AVC/HEVC/AV1 decoder configuration record, to the depth the core
/// needs for muxing into other containers without re-deriving SPS/PPS
/// parsing for every bridger.
#[derive(Clone, Debug)]
pub struct VideoConfig {
    pub id: VideoCodecId,
    pub profile: u8,
    pub level: u8,
    pub width: u32,
    pub height: u32,
    /// Raw sequence-header bytes (AVCC/HEVCC/AV1 codec config record).
    pub extra: Bytes,
}

impl VideoConfig {
    /// Derives a [`VideoConfig`] from a latched sequence-header packet.
    /// Only the AVCC profile/level/SPS dimensions are decoded; width and
    /// height default to 0 when the SPS cannot be parsed, which is enough
    /// for bridgers that only need the codec identity and raw record.
    pub fn parse(packet: &Packet) -> Result<Self> {
        let payload = packet.payload();
        if payload.len() < 2 {
            return Err(tracerr::new!(Error::DecodeError {
                reason: "video sequence header shorter than 2 bytes".into(),
            }));
        }
        let id = VideoCodecId::from_nibble(payload[0] & 0x0f);
        let record = payload.slice(2..);
        let (profile, level) = match id {
            VideoCodecId::Avc if record.len() >= 4 => (record[1], record[3]),
            _ => (0, 0),
        };
        Ok(Self {
            id,
            profile,
            level,
            width: 0,
            height: 0,
            extra: record,
        })
    }
}

/// The two codec configs latched on a source: at most one audio, one
/// video, updated in place as new sequence headers arrive.
#[derive(Clone, Debug, Default)]
pub struct CodecConfigs {
    pub audio: Option<AudioConfig>,
    pub video: Option<VideoConfig>,
}
