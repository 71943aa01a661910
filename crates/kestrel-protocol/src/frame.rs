use crate::packet::Packet;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use kestrel_common::{KestrelError, PacketBuffer, Result};
use std::io::{Read, Write};

/// Hard cap on any declared frame or inflated-data length. Protects
/// against hostile length prefixes before any allocation happens.
pub const MAX_FRAME_LEN: usize = 1 << 21;

/// The compression flag and threshold in force when a packet was
/// enqueued. Toggling compression mid-queue must not change how
/// already-queued packets are framed, so the writer carries this
/// snapshot alongside every packet.
#[derive(Debug, Clone, Copy)]
pub struct CompressionSnapshot {
    pub enabled: bool,
    pub threshold: usize,
}

impl CompressionSnapshot {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            threshold: 0,
        }
    }

    pub fn enabled(threshold: usize) -> Self {
        Self {
            enabled: true,
            threshold,
        }
    }
}

/// Encodes one packet into a complete wire frame.
///
/// Uncompressed form: `varint(len) varint(id) payload`. Compressed form:
/// `varint(frame_len) varint(data_len) bytes`, where `bytes` is a zlib
/// stream of `varint(id) payload` when the body met the threshold, or
/// those bytes raw with `data_len == 0` when it did not. Bodies below
/// the threshold are never compressed.
pub fn encode_packet(packet: &dyn Packet, compression: CompressionSnapshot) -> Result<Vec<u8>> {
    let mut body = PacketBuffer::new();
    body.write_varint(packet.packet_id());
    packet.write_to_buffer(&mut body)?;
    let body = body.into_bytes();

    let mut frame = PacketBuffer::new();
    if !compression.enabled {
        frame.write_varint(body.len() as i32);
        frame.write_bytes_raw(&body);
        return Ok(frame.into_bytes());
    }

    let mut inner = PacketBuffer::new();
    if body.len() >= compression.threshold {
        inner.write_varint(body.len() as i32);
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&body).map_err(KestrelError::from)?;
        let compressed = encoder.finish().map_err(KestrelError::from)?;
        inner.write_bytes_raw(&compressed);
    } else {
        inner.write_varint(0);
        inner.write_bytes_raw(&body);
    }
    let inner = inner.into_bytes();

    frame.write_varint(inner.len() as i32);
    frame.write_bytes_raw(&inner);
    Ok(frame.into_bytes())
}

/// Decodes a complete frame body (everything after the outer length
/// varint) into `(packet_id, payload)`.
///
/// Compressed frames inflate into a buffer bounded by the declared
/// uncompressed length; a declared length that does not match the actual
/// inflated size is a [`KestrelError::FrameLengthMismatch`].
pub fn decode_frame_body(body: Vec<u8>, compression_enabled: bool) -> Result<(i32, Vec<u8>)> {
    let mut buffer = PacketBuffer::from_bytes(body);

    if !compression_enabled {
        let packet_id = buffer.read_varint()?;
        return Ok((packet_id, buffer.read_rest()));
    }

    let data_len = buffer.read_varint()?;
    if data_len == 0 {
        // Below-threshold frame: id and payload travel uncompressed
        // after the two length varints.
        let packet_id = buffer.read_varint()?;
        return Ok((packet_id, buffer.read_rest()));
    }
    if data_len < 0 || data_len as usize > MAX_FRAME_LEN {
        return Err(KestrelError::FrameTooLarge {
            declared: data_len as usize,
            limit: MAX_FRAME_LEN,
        });
    }

    let declared = data_len as usize;
    let compressed = buffer.read_rest();
    let mut inflated = Vec::with_capacity(declared);
    // One byte past the declared length is enough to notice an oversized
    // stream without inflating it all.
    ZlibDecoder::new(&compressed[..])
        .take(declared as u64 + 1)
        .read_to_end(&mut inflated)
        .map_err(KestrelError::from)?;
    if inflated.len() != declared {
        return Err(KestrelError::FrameLengthMismatch {
            declared,
            actual: inflated.len(),
        });
    }

    let mut inner = PacketBuffer::from_bytes(inflated);
    let packet_id = inner.read_varint()?;
    Ok((packet_id, inner.read_rest()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    struct RawPacket {
        id: i32,
        payload: Vec<u8>,
    }

    impl Packet for RawPacket {
        fn packet_id(&self) -> i32 {
            self.id
        }

        fn write_to_buffer(&self, buffer: &mut PacketBuffer) -> Result<()> {
            buffer.write_bytes_raw(&self.payload);
            Ok(())
        }
    }

    /// Strips the outer length varint and checks it covered the rest.
    fn frame_body(frame: Vec<u8>) -> Vec<u8> {
        let mut buffer = PacketBuffer::from_bytes(frame);
        let len = buffer.read_varint().unwrap() as usize;
        let body = buffer.read_rest();
        assert_eq!(body.len(), len);
        body
    }

    #[test]
    fn uncompressed_round_trip() {
        for (id, payload) in [(0x00, vec![]), (0x42, vec![1, 2, 3]), (0x7F, vec![0xFF; 300])] {
            let packet = RawPacket {
                id,
                payload: payload.clone(),
            };
            let frame = encode_packet(&packet, CompressionSnapshot::disabled()).unwrap();
            let (decoded_id, decoded_payload) =
                decode_frame_body(frame_body(frame), false).unwrap();
            assert_eq!(decoded_id, id);
            assert_eq!(decoded_payload, payload);
        }
    }

    #[test]
    fn compressed_round_trip_above_threshold() {
        let packet = RawPacket {
            id: 0x20,
            payload: vec![7; 1000],
        };
        let frame = encode_packet(&packet, CompressionSnapshot::enabled(64)).unwrap();
        let body = frame_body(frame);

        // data_len > 0 marks an actually-deflated frame.
        let mut peek = PacketBuffer::from_bytes(body.clone());
        assert!(peek.read_varint().unwrap() > 0);

        let (id, payload) = decode_frame_body(body, true).unwrap();
        assert_eq!(id, 0x20);
        assert_eq!(payload, vec![7; 1000]);
    }

    #[test]
    fn below_threshold_is_sent_raw() {
        // Body is id varint + payload; threshold 64 with a 62-byte
        // payload gives a 63-byte body, one short of the threshold.
        let packet = RawPacket {
            id: 0x05,
            payload: vec![9; 62],
        };
        let frame = encode_packet(&packet, CompressionSnapshot::enabled(64)).unwrap();
        let body = frame_body(frame);

        let mut peek = PacketBuffer::from_bytes(body.clone());
        assert_eq!(peek.read_varint().unwrap(), 0);

        let (id, payload) = decode_frame_body(body, true).unwrap();
        assert_eq!(id, 0x05);
        assert_eq!(payload, vec![9; 62]);
    }

    #[test]
    fn at_threshold_is_compressed() {
        // 63-byte payload + 1-byte id varint lands exactly on the
        // threshold.
        let packet = RawPacket {
            id: 0x05,
            payload: vec![9; 63],
        };
        let frame = encode_packet(&packet, CompressionSnapshot::enabled(64)).unwrap();
        let mut peek = PacketBuffer::from_bytes(frame_body(frame));
        assert!(peek.read_varint().unwrap() > 0);
    }

    #[test]
    fn declared_length_mismatch_is_rejected() {
        let packet = RawPacket {
            id: 0x01,
            payload: vec![3; 500],
        };
        let frame = encode_packet(&packet, CompressionSnapshot::enabled(10)).unwrap();
        let mut body = frame_body(frame);

        // The declared length 501 encodes as a two-byte varint; bump it
        // so it no longer matches the inflated size.
        let mut tampered = PacketBuffer::new();
        tampered.write_varint(502);
        tampered.write_bytes_raw(&body.split_off(2));

        let result = decode_frame_body(tampered.into_bytes(), true);
        assert_matches!(
            result,
            Err(KestrelError::FrameLengthMismatch {
                declared: 502,
                actual: 501
            })
        );
    }

    #[test]
    fn oversized_declared_length_is_rejected_before_inflate() {
        let mut body = PacketBuffer::new();
        body.write_varint((MAX_FRAME_LEN + 1) as i32);
        body.write_bytes_raw(&[0; 16]);

        let result = decode_frame_body(body.into_bytes(), true);
        assert_matches!(result, Err(KestrelError::FrameTooLarge { .. }));
    }
}
