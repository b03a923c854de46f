use bytes::{BufMut, Bytes, BytesMut};

use crate::protocol::packet::{BitEncodable, DecodeError};

/// Number of whole bytes needed to hold `bits` bits.
#[inline]
pub fn bits_to_bytes(bits: usize) -> usize {
    (bits + 7) >> 3
}

/// Number of bits [`BitWriter::write_compressed`] emits for `value` stored in
/// `width` bytes.
pub fn compressed_bit_len(value: u32, width: usize) -> usize {
    let be = value.to_be_bytes();
    let bytes = &be[4 - width..];
    for (i, byte) in bytes[..width - 1].iter().enumerate() {
        if *byte != 0 {
            return i + 1 + (width - i) * 8;
        }
    }
    let flags = width - 1;
    if bytes[width - 1] & 0xF0 == 0 {
        flags + 1 + 4
    } else {
        flags + 1 + 8
    }
}

/// Append-only, MSB-first bit cursor backed by a `BytesMut`.
#[derive(Debug, Default)]
pub struct BitWriter {
    buf: BytesMut,
    bits: usize,
}

impl BitWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(bytes: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(bytes),
            bits: 0,
        }
    }

    /// Bits written so far.
    pub fn bit_len(&self) -> usize {
        self.bits
    }

    pub fn is_empty(&self) -> bool {
        self.bits == 0
    }

    pub fn write_bit(&mut self, bit: bool) {
        let offset = self.bits & 7;
        if offset == 0 {
            self.buf.put_u8(0);
        }
        if bit {
            let last = self.buf.len() - 1;
            self.buf[last] |= 0x80 >> offset;
        }
        self.bits += 1;
    }

    /// Write the low `count` bits of `value`, most significant first.
    pub fn write_bits(&mut self, value: u32, count: usize) {
        debug_assert!(count <= 32);
        for shift in (0..count).rev() {
            self.write_bit((value >> shift) & 1 == 1);
        }
    }

    /// Variable width unsigned integer: leading zero bytes cost one bit each,
    /// and a final byte with a zero high nibble only costs five bits.
    pub fn write_compressed(&mut self, value: u32, width: usize) {
        debug_assert!((1..=4).contains(&width));
        debug_assert!(width == 4 || value >> (width * 8) == 0);

        let be = value.to_be_bytes();
        let bytes = &be[4 - width..];
        for (i, byte) in bytes[..width - 1].iter().enumerate() {
            if *byte == 0 {
                self.write_bit(true);
                continue;
            }
            self.write_bit(false);
            for rest in &bytes[i..] {
                self.write_bits(*rest as u32, 8);
            }
            return;
        }

        let last = bytes[width - 1];
        if last & 0xF0 == 0 {
            self.write_bit(true);
            self.write_bits(last as u32, 4);
        } else {
            self.write_bit(false);
            self.write_bits(last as u32, 8);
        }
    }

    /// Pad with zero bits up to the next byte boundary.
    pub fn align(&mut self) {
        self.bits = self.buf.len() * 8;
    }

    pub fn write_aligned_bytes(&mut self, bytes: &[u8]) {
        self.align();
        self.buf.put_slice(bytes);
        self.bits = self.buf.len() * 8;
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    pub fn clear(&mut self) {
        self.buf.clear();
        self.bits = 0;
    }

    /// Hand out the written bytes, leaving the writer empty but with its allocation.
    pub fn take(&mut self) -> Bytes {
        self.bits = 0;
        self.buf.split().freeze()
    }
}

/// MSB-first bit cursor over a received datagram.
#[derive(Debug, Clone)]
pub struct BitReader {
    data: Bytes,
    pos: usize,
}

impl BitReader {
    pub fn new(data: Bytes) -> Self {
        Self { data, pos: 0 }
    }

    pub fn remaining_bits(&self) -> usize {
        self.data.len() * 8 - self.pos
    }

    pub fn read_bit(&mut self) -> Result<bool, DecodeError> {
        if self.remaining_bits() == 0 {
            return Err(DecodeError::UnexpectedEof);
        }
        let byte = self.data[self.pos >> 3];
        let bit = byte & (0x80 >> (self.pos & 7)) != 0;
        self.pos += 1;
        Ok(bit)
    }

    pub fn read_bits(&mut self, count: usize) -> Result<u32, DecodeError> {
        debug_assert!(count <= 32);
        if self.remaining_bits() < count {
            return Err(DecodeError::UnexpectedEof);
        }
        let mut value = 0u32;
        for _ in 0..count {
            value = (value << 1) | self.read_bit()? as u32;
        }
        Ok(value)
    }

    pub fn read_compressed(&mut self, width: usize) -> Result<u32, DecodeError> {
        debug_assert!((1..=4).contains(&width));
        for i in 0..width - 1 {
            if self.read_bit()? {
                continue;
            }
            let mut value = 0u32;
            for _ in i..width {
                value = (value << 8) | self.read_bits(8)?;
            }
            return Ok(value);
        }

        if self.read_bit()? {
            self.read_bits(4)
        } else {
            self.read_bits(8)
        }
    }

    pub fn align(&mut self) {
        self.pos = (self.pos + 7) & !7;
    }

    /// Zero-copy slice of the next `len` bytes after aligning.
    pub fn read_aligned_bytes(&mut self, len: usize) -> Result<Bytes, DecodeError> {
        self.align();
        let start = self.pos >> 3;
        if self.data.len() - start < len {
            return Err(DecodeError::UnexpectedEof);
        }
        self.pos += len * 8;
        Ok(self.data.slice(start..start + len))
    }
}

impl BitEncodable for bool {
    fn encode_bits(&self, dst: &mut BitWriter) {
        dst.write_bit(*self);
    }

    fn decode_bits(src: &mut BitReader) -> Result<Self, DecodeError> {
        src.read_bit()
    }
}

impl BitEncodable for u8 {
    fn encode_bits(&self, dst: &mut BitWriter) {
        dst.write_bits(*self as u32, 8);
    }

    fn decode_bits(src: &mut BitReader) -> Result<Self, DecodeError> {
        Ok(src.read_bits(8)? as u8)
    }
}

impl BitEncodable for u16 {
    fn encode_bits(&self, dst: &mut BitWriter) {
        dst.write_bits(*self as u32, 16);
    }

    fn decode_bits(src: &mut BitReader) -> Result<Self, DecodeError> {
        Ok(src.read_bits(16)? as u16)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bits_are_msb_first() {
        let mut w = BitWriter::new();
        w.write_bit(true);
        w.write_bits(0b010, 3);
        w.write_aligned_bytes(&[0xAB]);
        assert_eq!(w.as_slice(), &[0b1010_0000, 0xAB]);
        assert_eq!(w.bit_len(), 16);
    }

    #[test]
    fn compressed_small_values_use_five_bits_per_trailing_byte() {
        let mut w = BitWriter::new();
        w.write_compressed(7, 2);
        // one "high byte is zero" flag, one "small nibble" flag, four bits of value
        assert_eq!(w.bit_len(), 6);
        assert_eq!(compressed_bit_len(7, 2), 6);
    }

    #[test]
    fn compressed_lengths_match_prediction() {
        for &(value, width) in &[
            (0u32, 2usize),
            (0x0F, 2),
            (0x10, 2),
            (0x0100, 2),
            (0xFFFF, 2),
            (0, 4),
            (0x1F, 4),
            (0x0001_0000, 4),
            (u32::MAX, 4),
        ] {
            let mut w = BitWriter::new();
            w.write_compressed(value, width);
            assert_eq!(w.bit_len(), compressed_bit_len(value, width), "{value:#x}");

            let mut r = BitReader::new(w.take());
            assert_eq!(r.read_compressed(width).unwrap(), value);
        }
    }

    #[test]
    fn reading_past_the_end_is_eof() {
        let mut r = BitReader::new(Bytes::from_static(&[0xFF]));
        assert_eq!(r.read_bits(4).unwrap(), 0xF);
        assert_eq!(r.read_bits(8), Err(DecodeError::UnexpectedEof));
        assert_eq!(r.read_aligned_bytes(1), Err(DecodeError::UnexpectedEof));
    }

    #[test]
    fn aligned_read_is_zero_copy_slice() {
        let data = Bytes::from_static(&[0x80, 1, 2, 3]);
        let mut r = BitReader::new(data);
        assert!(r.read_bit().unwrap());
        let body = r.read_aligned_bytes(3).unwrap();
        assert_eq!(&body[..], &[1, 2, 3]);
        assert_eq!(r.remaining_bits(), 0);
    }
}
