//! End-to-end exercises of the source hub through the crate's public
//! API, one test per testable property in `SPEC_FULL.md` §8.

use bytes::Bytes;

use srs::media::consumer::{ConsumerOptions, JitterAlgorithm};
use srs::media::packet::{FrameType, Packet};
use srs::media::queue::DropPolicy;
use srs::media::source::{AtcRetention, MixCorrect, SourceHub, StreamKey};

fn avc_keyframe_seq_header(dts: i64) -> Packet {
    Packet::new(
        FrameType::Video,
        dts,
        0,
        Bytes::from_static(&[0x17, 0x00, 0x00, 0x00, 0x00]),
    )
}

fn avc_keyframe_nalu(dts: i64) -> Packet {
    Packet::new(
        FrameType::Video,
        dts,
        0,
        Bytes::from_static(&[0x17, 0x01, 0x00, 0x00, 0x00]),
    )
}

fn avc_inter_nalu(dts: i64) -> Packet {
    Packet::new(
        FrameType::Video,
        dts,
        0,
        Bytes::from_static(&[0x27, 0x01, 0x00, 0x00, 0x00]),
    )
}

fn default_opts() -> ConsumerOptions {
    ConsumerOptions {
        atc: false,
        jitter: JitterAlgorithm::Off,
        expected_interval_ms: 33,
        jitter_threshold_ms: 300,
        max_queue_span_ms: 10_000,
        max_queue_count: 1000,
        drop_policy: DropPolicy::Disable,
        merge_messages: 1,
        max_av_delta_ms: Some(10_000),
    }
}

#[test]
fn publish_then_play_delivers_gop_cache_to_late_joiner() {
    let mut hub = SourceHub::new(MixCorrect::Disabled, AtcRetention::Clear);
    let key = StreamKey::new("__defaultVhost__", "live", "stream0");
    let source = hub.fetch_or_create(key, false).unwrap();

    {
        let mut s = source.borrow_mut();
        s.on_publish(1, false, false).unwrap();
        s.on_video(avc_keyframe_seq_header(0));
        s.on_video(avc_keyframe_nalu(40));
        s.on_video(avc_inter_nalu(73));
    }

    let consumer = source.borrow_mut().create_consumer(default_opts());
    source
        .borrow()
        .consumer_dumps(&mut consumer.borrow_mut(), Default::default());

    let mut drained = Vec::new();
    consumer.borrow_mut().dump_packets(&mut drained, 10);
    assert!(drained[0].is_video_sequence_header());
    assert!(drained.iter().skip(1).any(|p| p.is_video_keyframe()));
}

#[test]
fn second_publisher_is_rejected_while_one_is_active() {
    let mut hub = SourceHub::new(MixCorrect::Disabled, AtcRetention::Clear);
    let key = StreamKey::new("__defaultVhost__", "live", "stream0");
    let source = hub.fetch_or_create(key, false).unwrap();

    source.borrow_mut().on_publish(1, false, false).unwrap();
    let err = source.borrow_mut().on_publish(2, false, false).unwrap_err();
    assert!(matches!(err.as_ref(), srs::error::Error::StreamBusy { .. }));
}

#[test]
fn slow_consumer_under_disable_policy_is_detached_on_overflow() {
    let mut hub = SourceHub::new(MixCorrect::Disabled, AtcRetention::Clear);
    let key = StreamKey::new("__defaultVhost__", "live", "stream0");
    let source = hub.fetch_or_create(key, false).unwrap();
    source.borrow_mut().on_publish(1, false, false).unwrap();

    let mut opts = default_opts();
    opts.max_queue_count = 1;
    let _consumer_id = source.borrow_mut().create_consumer(opts).borrow().id();
    assert_eq!(source.borrow().consumer_count(), 1);

    for i in 0..5 {
        source.borrow_mut().on_video(avc_inter_nalu(i * 40));
    }
    assert_eq!(source.borrow().consumer_count(), 0);
}

#[test]
fn fetch_or_create_returns_the_same_source_for_the_same_key() {
    let mut hub = SourceHub::new(MixCorrect::Disabled, AtcRetention::Clear);
    let key = StreamKey::new("__defaultVhost__", "live", "stream0");
    let a = hub.fetch_or_create(key.clone(), false).unwrap();
    let b = hub.fetch_or_create(key, false).unwrap();
    assert!(std::rc::Rc::ptr_eq(&a, &b));
    assert_eq!(hub.len(), 1);
}
