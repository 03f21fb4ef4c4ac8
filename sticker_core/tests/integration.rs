/// Integration tests for the delta-frame container and the vector path.
///
/// Containers are produced with [`ContainerWriter`] and played back with
/// [`ContainerDecoder`]; the vector tests go through gzip and the Lottie
/// backend exactly as the player does.
use std::sync::Arc;

use sticker_codecs::{GzipCodec, LottieBackend, Lz4Codec, PassThroughCodec};
use sticker_core::color::argb_to_yuva;
use sticker_core::format::frame_entries;
use sticker_core::{
    transcode_vector, Codec, ContainerDecoder, ContainerHeader, ContainerWriter, DecodeError,
    ErrorKind, FrameCache, FrameSource, PixelLayout, VectorDecoder, HEADER_SIZE,
};

/// Generate `len` deterministic bytes using a simple LCG.
fn pseudo_random_bytes(len: usize, seed: u64) -> Vec<u8> {
    let mut rng = seed;
    (0..len)
        .map(|_| {
            rng = rng
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1442695040888963407);
            (rng >> 56) as u8
        })
        .collect()
}

/// Frames that differ a little from one to the next, like real animation.
fn animation_frames(count: usize, frame_len: usize) -> Vec<Vec<u8>> {
    let mut frame = pseudo_random_bytes(frame_len, 7);
    let mut frames = Vec::with_capacity(count);
    for i in 0..count {
        let stride = 37 + i;
        for j in (i..frame_len).step_by(stride) {
            frame[j] = frame[j].wrapping_add(i as u8 + 1);
        }
        frames.push(frame.clone());
    }
    frames
}

// ── helpers ───────────────────────────────────────────────────────────────

fn encode(codec: Arc<dyn Codec>, header: ContainerHeader, frames: &[Vec<u8>]) -> Vec<u8> {
    let mut w = ContainerWriter::create(Vec::new(), codec, header).unwrap();
    for frame in frames {
        w.write_frame(frame).unwrap();
    }
    let (bytes, count) = w.finish().unwrap();
    assert_eq!(count, frames.len() as u64);
    bytes
}

/// Hand-assemble a container from raw (already compressed) frame payloads.
fn raw_container(fps: i32, width: i32, height: i32, payloads: &[&[u8]]) -> Vec<u8> {
    let mut out = Vec::new();
    for v in [fps, width, height] {
        out.extend_from_slice(&v.to_le_bytes());
    }
    for p in payloads {
        out.extend_from_slice(&(p.len() as i32).to_le_bytes());
        out.extend_from_slice(p);
    }
    out
}

fn gzip(bytes: &[u8]) -> Vec<u8> {
    GzipCodec::default().compress_block(bytes).unwrap()
}

const BOUNCING_DOT: &str = r##"{
    "v": "5.7.0", "fr": 30, "ip": 0, "op": 6, "w": 64, "h": 64,
    "layers": [
        {
            "ty": 4, "ip": 0, "op": 6,
            "ks": {"p": {"a": 1, "k": [
                {"t": 0, "s": [16, 32]},
                {"t": 5, "s": [48, 32]}
            ]}},
            "shapes": [{"ty": "gr", "it": [
                {"ty": "el", "p": {"k": [0, 0]}, "s": {"k": [20, 20]}},
                {"ty": "fl", "c": {"k": [1, 0.5, 0, 1]}, "o": {"k": 100}},
                {"ty": "tr", "p": {"k": [0, 0]}}
            ]}]
        },
        {"ty": 1, "ip": 0, "op": 6, "sc": "#204080", "sw": 64, "sh": 64, "ks": {}}
    ]
}"##;

// ── container tests ───────────────────────────────────────────────────────

#[test]
fn test_roundtrip_lz4() {
    let header = ContainerHeader { fps: 30, width: 16, height: 8 };
    let frames = animation_frames(12, header.frame_size());
    let bytes = encode(Arc::new(Lz4Codec), header, &frames);
    assert_eq!(frame_entries(&bytes).unwrap().len(), 12);

    let mut r = ContainerDecoder::open(bytes.into(), Arc::new(Lz4Codec)).unwrap();
    assert_eq!(r.header, header);
    assert_eq!(r.frame_count().unwrap(), 12);
    for (i, expected) in frames.iter().enumerate() {
        assert_eq!(r.decode_next().unwrap(), &expected[..], "frame {i}");
    }
}

#[test]
fn test_roundtrip_passthrough_frame_source() {
    let header = ContainerHeader { fps: 24, width: 3, height: 5 };
    let frames = animation_frames(4, header.frame_size());
    let bytes = encode(Arc::new(PassThroughCodec), header, &frames);
    // Uncompressed deltas: header plus one length prefix and full frame each.
    assert_eq!(bytes.len(), HEADER_SIZE + 4 * (4 + header.frame_size()));

    let mut r = ContainerDecoder::open(bytes.into(), Arc::new(PassThroughCodec)).unwrap();
    assert_eq!(r.fps(), 24);
    for expected in &frames {
        let index = r.frame_index();
        let frame = r.next_frame().unwrap();
        assert_eq!(frame.layout, PixelLayout::Yuva);
        assert_eq!((frame.width, frame.height), (3, 5));
        assert_eq!(frame.pixels, *expected, "frame {index}");
    }
    assert_eq!(r.frame_index(), 0);
}

#[test]
fn test_cycle_repeats_exactly() {
    let header = ContainerHeader { fps: 60, width: 8, height: 8 };
    let frames = animation_frames(5, header.frame_size());
    let bytes = encode(Arc::new(Lz4Codec), header, &frames);
    let mut r = ContainerDecoder::open(bytes.into(), Arc::new(Lz4Codec)).unwrap();

    for i in 0..23 {
        assert_eq!(r.decode_next().unwrap(), &frames[i % 5][..], "decode #{i}");
    }
}

#[test]
fn test_single_opaque_white_frame_repeats() {
    // 2x2, one frame, every byte 0xFF: the delta against zeros is the frame.
    let header = ContainerHeader { fps: 30, width: 2, height: 2 };
    let white = vec![0xFFu8; 16];
    let bytes = encode(Arc::new(Lz4Codec), header, &[white.clone()]);

    let mut r = ContainerDecoder::open(bytes.into(), Arc::new(Lz4Codec)).unwrap();
    assert_eq!(r.frame_count().unwrap(), 1);
    for _ in 0..4 {
        assert_eq!(r.decode_next().unwrap(), &white[..]);
        assert_eq!(r.frame_index(), 0);
    }
}

#[test]
fn test_rewind_restarts_from_zeros() {
    let header = ContainerHeader { fps: 30, width: 4, height: 4 };
    let frames = animation_frames(3, header.frame_size());
    let bytes = encode(Arc::new(Lz4Codec), header, &frames);
    let mut r = ContainerDecoder::open(bytes.into(), Arc::new(Lz4Codec)).unwrap();
    r.decode_next().unwrap();
    r.decode_next().unwrap();
    r.rewind();
    assert_eq!(r.decode_next().unwrap(), &frames[0][..]);
}

#[test]
fn test_header_only_container_is_empty() {
    let bytes = raw_container(30, 2, 2, &[]);
    let err = ContainerDecoder::open(bytes.into(), Arc::new(Lz4Codec)).err().unwrap();
    assert!(matches!(err, DecodeError::Empty));
    assert_eq!(err.kind(), ErrorKind::Format);
}

#[test]
fn test_invalid_header_rejected() {
    let bytes = raw_container(0, 2, 2, &[&[0u8; 16]]);
    let err = ContainerDecoder::open(bytes.into(), Arc::new(PassThroughCodec)).err().unwrap();
    assert!(matches!(err, DecodeError::InvalidHeader { fps: 0, .. }));

    let err = ContainerDecoder::open(vec![1u8; HEADER_SIZE - 1].into(), Arc::new(Lz4Codec))
        .err()
        .unwrap();
    assert!(matches!(err, DecodeError::TruncatedHeader { len: 11 }));
}

#[test]
fn test_overrunning_length_is_format_error() {
    let mut bytes = raw_container(30, 2, 2, &[]);
    bytes.extend_from_slice(&1000i32.to_le_bytes());
    bytes.extend_from_slice(&[0u8; 10]);

    let err = ContainerDecoder::open(bytes.into(), Arc::new(Lz4Codec)).err().unwrap();
    match err {
        DecodeError::FrameOverrun {
            index,
            offset,
            length,
            available,
        } => {
            assert_eq!(index, 0);
            assert_eq!(offset, HEADER_SIZE);
            assert_eq!(length, 1000);
            assert_eq!(available, 10);
        }
        other => panic!("expected FrameOverrun, got {other:?}"),
    }
}

#[test]
fn test_later_frame_overrun_fails_before_any_frame() {
    let header = ContainerHeader {
        fps: 30,
        width: 4,
        height: 4,
    };
    let frames = animation_frames(3, 64);
    let mut bytes = encode(Arc::new(Lz4Codec), header, &frames);
    // Claim more bytes for the last frame than the buffer holds.
    let last = frame_entries(&bytes).unwrap()[2];
    let claimed = (last.length as i32 + 50).to_le_bytes();
    bytes[last.offset..last.offset + 4].copy_from_slice(&claimed);

    let err = ContainerDecoder::open(bytes.into(), Arc::new(Lz4Codec)).err().unwrap();
    assert!(matches!(err, DecodeError::FrameOverrun { index: 2, .. }));
    assert_eq!(err.kind(), ErrorKind::Format);
}

#[test]
fn test_negative_length_is_format_error() {
    let mut bytes = raw_container(30, 2, 2, &[&[0u8; 16]]);
    bytes.extend_from_slice(&(-5i32).to_le_bytes());
    let err = ContainerDecoder::open(bytes.into(), Arc::new(PassThroughCodec)).err().unwrap();
    assert!(matches!(err, DecodeError::FrameOverrun { index: 1, length: -5, .. }));
    assert_eq!(err.kind(), ErrorKind::Format);
}

#[test]
fn test_oversized_header_is_rejected_without_allocating() {
    let bytes = raw_container(30, i32::MAX, i32::MAX, &[&[0u8; 4]]);
    let err = ContainerDecoder::open(bytes.into(), Arc::new(Lz4Codec)).err().unwrap();
    assert!(matches!(err, DecodeError::InvalidHeader { .. }));
    assert_eq!(err.kind(), ErrorKind::Format);
}

#[test]
fn test_wrong_decompressed_size_is_error() {
    // A passthrough "compressed" frame one pixel short of 2x2.
    let bytes = raw_container(30, 2, 2, &[&[0u8; 12]]);
    let mut r = ContainerDecoder::open(bytes.into(), Arc::new(PassThroughCodec)).unwrap();
    let err = r.decode_next().unwrap_err();
    assert!(matches!(
        err,
        DecodeError::SizeMismatch {
            index: 0,
            expected: 16,
            actual: 12
        }
    ));
}

#[test]
fn test_corrupt_lz4_block_is_error() {
    let bytes = raw_container(30, 2, 2, &[&[0xF0, 0x00, 0x01]]);
    let mut r = ContainerDecoder::open(bytes.into(), Arc::new(Lz4Codec)).unwrap();
    assert!(r.decode_next().is_err());
}

// ── vector tests ──────────────────────────────────────────────────────────

#[test]
fn test_vector_decoder_plays_gzip_lottie() {
    let payload = gzip(BOUNCING_DOT.as_bytes());
    let backend = LottieBackend::new();
    let mut d = VectorDecoder::open(&payload, "dot.tgs", &GzipCodec::default(), &backend, 32, 32)
        .unwrap();
    assert_eq!(d.fps(), 30);
    assert_eq!(d.frame_count(), 6);

    let first = d.next_frame().unwrap();
    assert_eq!(first.layout, PixelLayout::Argb);
    assert_eq!(first.pixels.len(), 32 * 32 * 4);
    // Corner pixel is the opaque background.
    assert_eq!(&first.pixels[..4], &[255, 0x20, 0x40, 0x80]);

    let second = d.next_frame().unwrap();
    assert_ne!(first.pixels, second.pixels, "the dot moves");
    for _ in 2..6 {
        d.next_frame().unwrap();
    }
    assert_eq!(d.frame_index(), 0);
    assert_eq!(d.next_frame().unwrap().pixels, first.pixels);
}

#[test]
fn test_vector_cache_serves_repeats() {
    let payload = gzip(BOUNCING_DOT.as_bytes());
    let backend = LottieBackend::new();
    let cache = Arc::new(FrameCache::default());
    let mut d = VectorDecoder::open(&payload, "dot.tgs", &GzipCodec::default(), &backend, 16, 16)
        .unwrap()
        .with_cache(cache.clone());
    let first_pass: Vec<_> = (0..6).map(|_| d.next_frame().unwrap().pixels).collect();
    assert_eq!(cache.len(), 6);
    let second_pass: Vec<_> = (0..6).map(|_| d.next_frame().unwrap().pixels).collect();
    assert_eq!(first_pass, second_pass);
}

#[test]
fn test_vector_garbage_is_decode_unavailable() {
    let backend = LottieBackend::new();
    let err = VectorDecoder::open(
        &gzip(b"not json"),
        "bad.tgs",
        &GzipCodec::default(),
        &backend,
        16,
        16,
    )
    .err()
    .unwrap();
    assert_eq!(err.kind(), ErrorKind::DecodeUnavailable);

    let err = VectorDecoder::open(b"plain", "bad.tgs", &GzipCodec::default(), &backend, 16, 16)
        .err()
        .unwrap();
    assert!(matches!(err, DecodeError::VectorUnavailable { .. }));
}

#[test]
fn test_transcode_matches_direct_render() {
    let payload = gzip(BOUNCING_DOT.as_bytes());
    let backend = LottieBackend::new();
    let unzip = GzipCodec::default();
    let container = transcode_vector(
        &payload,
        "dot.tgs",
        24,
        24,
        &unzip,
        &backend,
        Arc::new(Lz4Codec),
    )
    .unwrap();

    let mut cached = ContainerDecoder::open(container.into(), Arc::new(Lz4Codec)).unwrap();
    assert_eq!(cached.header, ContainerHeader { fps: 30, width: 24, height: 24 });
    assert_eq!(cached.frame_count().unwrap(), 6);

    let mut direct = VectorDecoder::open(&payload, "dot.tgs", &unzip, &backend, 24, 24).unwrap();
    let mut yuva = vec![0u8; 24 * 24 * 4];
    for i in 0..6 {
        argb_to_yuva(&direct.next_frame().unwrap().pixels, &mut yuva);
        assert_eq!(cached.decode_next().unwrap(), &yuva[..], "frame {i}");
    }
    // Both programs came from one parsed document.
    assert_eq!(backend.cached_documents(), 1);
}
