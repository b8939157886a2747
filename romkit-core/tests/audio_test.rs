//! Integration tests for BRR decoding and WAV export

use romkit_core::audio::brr::{decode_block, BrrHeader, DecoderState};
use romkit_core::audio::{write_wav, write_wav_to, AudioCodec, BLOCK_SIZE, DSP_SAMPLE_RATE};
use romkit_core::{ErrorKind, RomError};
use std::io::Cursor;

fn block(header: u8, data: u8) -> [u8; BLOCK_SIZE] {
    let mut block = [data; BLOCK_SIZE];
    block[0] = header;
    block
}

#[test]
fn test_header_fields() {
    let header = BrrHeader::parse(0xB7);
    assert_eq!(header.shift, 11);
    assert_eq!(header.filter, 1);
    assert!(header.loop_flag);
    assert!(header.end);
}

#[test]
fn test_filter_zero_scales_nibbles() {
    let mut state = DecoderState::default();
    // High nibble 1, low nibble -1.
    let samples = decode_block(&block(0xC0, 0x1F), &mut state);
    assert_eq!(samples[0], 4096);
    assert_eq!(samples[1], -4096);
    assert_eq!(samples[15], -4096);
}

#[test]
fn test_oversized_shift_behaves_as_twelve() {
    let mut a = DecoderState::default();
    let mut b = DecoderState::default();
    assert_eq!(
        decode_block(&block(0xD0, 0x11), &mut a),
        decode_block(&block(0xC0, 0x11), &mut b)
    );
}

#[test]
fn test_filter_one_decays_previous_sample() {
    let mut bytes = Vec::new();
    bytes.extend_from_slice(&block(0xC0, 0x77));
    bytes.extend_from_slice(&block(0x05, 0x00)); // filter 1, end
    let sample = AudioCodec::decode_block_stream(&bytes).unwrap();
    assert_eq!(sample.samples[15], 28672);
    assert_eq!(sample.samples[16], 28672 - 1792);
    assert_eq!(sample.blocks, 2);
    assert_eq!(sample.byte_len(), 18);
}

#[test]
fn test_output_saturates() {
    let mut bytes = Vec::new();
    bytes.extend_from_slice(&block(0xC0, 0x77));
    bytes.extend_from_slice(&block(0xC5, 0x77));
    let sample = AudioCodec::decode_block_stream(&bytes).unwrap();
    assert_eq!(sample.samples[16], i16::MAX);
    assert!(sample.samples[16..].iter().all(|&s| s == i16::MAX));
}

#[test]
fn test_end_flag_stops_decoding() {
    let mut bytes = Vec::new();
    bytes.extend_from_slice(&block(0x03, 0x00)); // loop + end
    bytes.extend_from_slice(&block(0xC0, 0x77));
    let sample = AudioCodec::decode_block_stream(&bytes).unwrap();
    assert_eq!(sample.blocks, 1);
    assert_eq!(sample.samples.len(), 16);
    assert!(sample.ended);
    assert!(sample.loops);
}

#[test]
fn test_stream_without_end_flag_runs_to_buffer_end() {
    let bytes = [0u8; BLOCK_SIZE * 3];
    let sample = AudioCodec::decode_block_stream(&bytes).unwrap();
    assert_eq!(sample.blocks, 3);
    assert!(!sample.ended);
}

#[test]
fn test_truncated_block_is_an_error() {
    let bytes = [0u8; BLOCK_SIZE + 4];
    let err = AudioCodec::decode_block_stream(&bytes).unwrap_err();
    assert!(matches!(err, RomError::TruncatedSample { offset: 9, blocks_decoded: 1 }));
    assert_eq!(err.kind(), ErrorKind::Format);
}

#[test]
fn test_loop_offset_resolves_to_sample_index() {
    let mut bytes = vec![0u8; BLOCK_SIZE * 3];
    bytes[BLOCK_SIZE * 2] = 0x03;
    let sample = AudioCodec::decode_block_stream_with_loop(&bytes, Some(BLOCK_SIZE)).unwrap();
    assert_eq!(sample.loop_start, Some(16));

    let sample = AudioCodec::decode_block_stream_with_loop(&bytes, Some(4)).unwrap();
    assert_eq!(sample.loop_start, None, "loop offsets must be block aligned");
}

#[test]
fn test_wav_export() {
    let mut bytes = Vec::new();
    bytes.extend_from_slice(&block(0xC0, 0x1F));
    bytes.extend_from_slice(&block(0xC1, 0x1F));
    let sample = AudioCodec::decode_block_stream(&bytes).unwrap();

    let mut cursor = Cursor::new(Vec::new());
    write_wav_to(&mut cursor, &sample, DSP_SAMPLE_RATE).unwrap();
    cursor.set_position(0);
    let mut reader = hound::WavReader::new(cursor).unwrap();
    let spec = reader.spec();
    assert_eq!(spec.channels, 1);
    assert_eq!(spec.sample_rate, 32_000);
    assert_eq!(spec.bits_per_sample, 16);
    let pcm: Vec<i16> = reader.samples::<i16>().map(|s| s.unwrap()).collect();
    assert_eq!(pcm, sample.samples);

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sample.wav");
    write_wav(&path, &sample, 16_000).unwrap();
    let reader = hound::WavReader::open(&path).unwrap();
    assert_eq!(reader.spec().sample_rate, 16_000);
    assert_eq!(reader.len(), 32);
}
