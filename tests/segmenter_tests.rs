// Integration tests for the fixed-duration segmenter
//
// These tests verify that irregular capture blocks are re-cut into
// uniform segments, that segmenting is lossless and order-preserving,
// and that the final-segment padding policy behaves as configured.

use voicepipe::audio::{Segmenter, SegmenterConfig};

fn config(sample_rate: u32, segment_seconds: f64, pad: bool, normalize: bool) -> SegmenterConfig {
    SegmenterConfig {
        sample_rate,
        segment_seconds,
        normalize,
        normalize_target: 0.99,
        pad_last_segment: pad,
    }
}

#[test]
fn non_final_segments_have_exact_length() {
    let mut segmenter = Segmenter::new(config(8_000, 0.5, false, false));
    let seg_len = segmenter.segment_frames();
    assert_eq!(seg_len, 4_000);

    // irregular pushes: none aligned to the segment boundary
    let mut emitted = Vec::new();
    for size in [1_500usize, 2_600, 100, 3_999, 4_001, 7] {
        let block = vec![0.25f32; size];
        emitted.extend(segmenter.push_frame(&block));
    }

    // 12207 samples in total -> 3 full segments, 207 in carry
    assert_eq!(emitted.len(), 3);
    for segment in &emitted {
        assert_eq!(segment.pcm.len(), seg_len);
    }
    assert_eq!(segmenter.pending_samples(), 207);
}

#[test]
fn segmenting_is_lossless_and_order_preserving() {
    // values chosen so float conversion round-trips exactly
    let total = 10_000usize;
    let input: Vec<f32> = (0..total).map(|k| k as f32 / 32767.0).collect();

    let mut segmenter = Segmenter::new(config(1_000, 3.0, false, false));

    let mut emitted = Vec::new();
    let mut offset = 0;
    // fragment the stream arbitrarily
    for size in [1usize, 127, 128, 953, 2048, 4096, 2647] {
        emitted.extend(segmenter.push_frame(&input[offset..offset + size]));
        offset += size;
    }
    assert_eq!(offset, total);
    emitted.extend(segmenter.stop());

    let concatenated: Vec<i16> = emitted.iter().flat_map(|s| s.pcm.iter().copied()).collect();
    let expected: Vec<i16> = (0..total).map(|k| k as i16).collect();
    assert_eq!(concatenated, expected);

    // sequence numbers cover every segment including the final one
    for (i, segment) in emitted.iter().enumerate() {
        assert_eq!(segment.seq, i as u64);
    }
}

#[test]
fn padded_final_segment_scenario() {
    // 3.5s of audio at 44.1kHz with 2s segments and padding enabled
    let mut segmenter = Segmenter::new(config(44_100, 2.0, true, false));
    let emitted = segmenter.push_frame(&vec![0.5f32; 154_350]);

    assert_eq!(emitted.len(), 1);
    assert_eq!(emitted[0].seq, 0);
    assert_eq!(emitted[0].pcm.len(), 88_200);

    let last = segmenter.stop().expect("carry should flush");
    assert_eq!(last.seq, 1);
    assert_eq!(last.pcm.len(), 88_200);

    // the real tail first, silence after
    let expected_sample = 16_384i16; // 0.5 * 0x7FFF, rounded
    assert!(last.pcm[..66_150].iter().all(|&s| s == expected_sample));
    assert!(last.pcm[66_150..].iter().all(|&s| s == 0));
}

#[test]
fn unpadded_final_segment_keeps_true_duration() {
    let mut segmenter = Segmenter::new(config(8_000, 1.0, false, false));
    segmenter.push_frame(&vec![0.1f32; 2_000]);

    let last = segmenter.stop().expect("carry should flush");
    assert_eq!(last.pcm.len(), 2_000);
    assert!((last.duration_seconds - 0.25).abs() < 1e-9);
}

#[test]
fn conversion_clamps_and_hits_exact_bounds() {
    let mut segmenter = Segmenter::new(config(8_000, 1.0, false, false));
    segmenter.push_frame(&[1.0, -1.0, 2.0, -7.5]);

    let segment = segmenter.stop().expect("carry should flush");
    assert_eq!(segment.pcm, vec![32_767, -32_768, 32_767, -32_768]);
}

#[test]
fn normalization_raises_quiet_segments_to_target() {
    let mut segmenter = Segmenter::new(config(8_000, 1.0, false, true));
    // peak 0.5, below the 0.99 target
    segmenter.push_frame(&[0.5, -0.25, 0.125]);

    let segment = segmenter.stop().expect("carry should flush");
    // 0.5 scaled to 0.99 exactly (scale factor is a power-of-two ratio)
    assert_eq!(segment.pcm[0], 32_439);
    assert_eq!(segment.pcm[1], -16_220);
}

#[test]
fn normalization_never_amplifies_silence() {
    let mut segmenter = Segmenter::new(config(8_000, 1.0, true, true));
    segmenter.push_frame(&vec![0.0f32; 100]);

    let segment = segmenter.stop().expect("carry should flush");
    assert!(segment.pcm.iter().all(|&s| s == 0));
}

#[test]
fn stop_with_empty_carry_emits_nothing() {
    let mut segmenter = Segmenter::new(config(8_000, 0.5, true, false));
    let emitted = segmenter.push_frame(&vec![0.25f32; 4_000]);
    assert_eq!(emitted.len(), 1);
    assert!(segmenter.stop().is_none());
}

#[test]
fn empty_pushes_are_ignored() {
    let mut segmenter = Segmenter::new(config(8_000, 0.5, true, false));
    assert!(segmenter.push_frame(&[]).is_empty());
    assert_eq!(segmenter.pending_samples(), 0);
}
