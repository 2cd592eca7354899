//! Frame codec properties: decoding must not depend on how the byte
//! stream was chunked by the transport.

use sqlbridge::protocol::{encode_frame, shutdown_frame, Frame, FrameDecoder};

fn decode_all(decoder: &mut FrameDecoder) -> Vec<Frame> {
    let mut frames = Vec::new();
    while let Some(frame) = decoder.next_frame().unwrap() {
        frames.push(frame);
    }
    frames
}

fn sample_stream() -> (Vec<u8>, Vec<Frame>) {
    let payloads: [&[u8]; 4] = [
        br#"{"idx":1,"result":true}"#,
        br#"{"idx":2,"result":[{"a":1},{"a":2}]}"#,
        b"x",
        br#"{"idx":3,"error":{"type":"DriverError","message":"boom","stack":""}}"#,
    ];
    let mut bytes = Vec::new();
    let mut expected = Vec::new();
    for payload in payloads {
        bytes.extend_from_slice(&encode_frame(payload));
        expected.push(Frame::Message(payload.to_vec()));
    }
    bytes.extend_from_slice(&shutdown_frame());
    expected.push(Frame::Shutdown);
    (bytes, expected)
}

#[test]
fn test_one_chunk_decodes_everything() {
    let (bytes, expected) = sample_stream();
    let mut decoder = FrameDecoder::new();
    decoder.extend(&bytes);
    assert_eq!(decode_all(&mut decoder), expected);
    assert_eq!(decoder.buffered(), 0);
}

#[test]
fn test_byte_at_a_time_matches_one_chunk() {
    let (bytes, expected) = sample_stream();
    let mut decoder = FrameDecoder::new();
    let mut frames = Vec::new();
    for byte in &bytes {
        decoder.extend(std::slice::from_ref(byte));
        frames.extend(decode_all(&mut decoder));
    }
    assert_eq!(frames, expected);
}

#[test]
fn test_arbitrary_chunk_sizes_match_one_chunk() {
    let (bytes, expected) = sample_stream();
    for chunk_size in 1..=bytes.len() {
        let mut decoder = FrameDecoder::new();
        let mut frames = Vec::new();
        for chunk in bytes.chunks(chunk_size) {
            decoder.extend(chunk);
            frames.extend(decode_all(&mut decoder));
        }
        assert_eq!(frames, expected, "chunk size {} diverged", chunk_size);
    }
}

#[test]
fn test_shutdown_is_not_followed_by_payload_read() {
    // Bytes after the shutdown marker must not be consumed as a payload of
    // the shutdown frame itself.
    let mut bytes = shutdown_frame().to_vec();
    bytes.extend_from_slice(&encode_frame(b"late"));

    let mut decoder = FrameDecoder::new();
    decoder.extend(&bytes);
    assert_eq!(decoder.next_frame().unwrap(), Some(Frame::Shutdown));
    assert_eq!(
        decoder.next_frame().unwrap(),
        Some(Frame::Message(b"late".to_vec()))
    );
}

#[test]
fn test_prefix_equals_payload_byte_length() {
    let payload = "héllo wörld".as_bytes();
    let framed = encode_frame(payload);
    let declared = u32::from_le_bytes(framed[..4].try_into().unwrap()) as usize;
    assert_eq!(declared, payload.len());
    assert_eq!(framed.len(), 4 + payload.len());
}
