// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Bounds-checked TLV (Type-Length-Value) decoding.
//!
//! A notification payload is a flat chain of TLVs packed back-to-back with no
//! padding and no terminator:
//!
//! ```text
//! +--------+--------+-----------------+
//! |  Type  | Length |  Value ...      |
//! |   1B   |   1B   |  Length bytes   |
//! +--------+--------+-----------------+
//!
//! Extended form (Length byte == 0xFF):
//! +--------+--------+--------+--------+-----------------+
//! |  Type  |  0xFF  |  ExtLen (BE)    |  Value ...      |
//! +--------+--------+--------+--------+-----------------+
//! ```
//!
//! The cursor never exposes a byte outside the source buffer. A header or
//! value that does not fit ends the chain; records already yielded stay valid.

/// Size of the base header (type + length).
pub const TLV_HEADER_SIZE: usize = 2;

/// Size of the extended header (type + 0xFF + 16-bit length).
pub const TLV_EXTENDED_HEADER_SIZE: usize = 4;

/// Length byte announcing the extended header.
pub const TLV_EXTENDED_LENGTH: u8 = 0xFF;

/// A single TLV record borrowed from the source buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tlv<'a> {
    /// Semantic tag
    pub tag: u8,
    /// Value bytes (window into the source buffer)
    pub value: &'a [u8],
    /// Offset of the record header within the source buffer
    pub offset: usize,
}

impl<'a> Tlv<'a> {
    /// Value length in bytes.
    pub fn len(&self) -> usize {
        self.value.len()
    }

    /// True if the value is empty.
    pub fn is_empty(&self) -> bool {
        self.value.is_empty()
    }
}

/// Cursor over a TLV chain.
///
/// Tracks the current offset explicitly and validates every header and value
/// against the remaining length before producing a record.
#[derive(Debug, Clone)]
pub struct TlvCursor<'a> {
    buf: &'a [u8],
    offset: usize,
    truncated_at: Option<usize>,
}

impl<'a> TlvCursor<'a> {
    /// Create a cursor at offset 0.
    pub const fn new(buf: &'a [u8]) -> Self {
        Self {
            buf,
            offset: 0,
            truncated_at: None,
        }
    }

    /// Current offset within the buffer.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Bytes not yet consumed.
    pub fn remaining(&self) -> usize {
        self.buf.len().saturating_sub(self.offset)
    }

    /// Offset of the malformed record that ended the chain, if any.
    pub fn truncated_at(&self) -> Option<usize> {
        self.truncated_at
    }

    /// Parse the header at the current offset.
    ///
    /// Returns `(header_size, value_length)` or `None` if the header does not
    /// fit in the remaining bytes.
    fn read_header(&self) -> Option<(usize, usize)> {
        let rest = self.buf.get(self.offset..)?;
        if rest.len() < TLV_HEADER_SIZE {
            return None;
        }
        if rest[1] != TLV_EXTENDED_LENGTH {
            return Some((TLV_HEADER_SIZE, rest[1] as usize));
        }
        if rest.len() < TLV_EXTENDED_HEADER_SIZE {
            return None;
        }
        let length = u16::from_be_bytes([rest[2], rest[3]]) as usize;
        Some((TLV_EXTENDED_HEADER_SIZE, length))
    }

    fn mark_truncated(&mut self) {
        self.truncated_at = Some(self.offset);
        self.offset = self.buf.len();
    }
}

impl<'a> Iterator for TlvCursor<'a> {
    type Item = Tlv<'a>;

    fn next(&mut self) -> Option<Tlv<'a>> {
        if self.remaining() == 0 {
            return None;
        }

        let Some((header_size, length)) = self.read_header() else {
            self.mark_truncated();
            return None;
        };

        // header_size <= remaining is guaranteed by read_header
        if length > self.remaining() - header_size {
            self.mark_truncated();
            return None;
        }

        let start = self.offset + header_size;
        let end = start + length;
        let record = Tlv {
            tag: self.buf[self.offset],
            value: &self.buf[start..end],
            offset: self.offset,
        };
        self.offset = end;
        Some(record)
    }
}

/// Find the first TLV with `tag` in `buf`.
///
/// Returns `None` when the tag is absent or when the chain breaks on a
/// malformed record before a match is reached.
pub fn find(tag: u8, buf: &[u8]) -> Option<Tlv<'_>> {
    TlvCursor::new(buf).find(|tlv| tlv.tag == tag)
}

/// Builds well-formed TLV chains.
#[derive(Debug, Default, Clone)]
pub struct TlvWriter {
    buf: Vec<u8>,
}

impl TlvWriter {
    /// Create an empty writer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a record, using the extended header for values longer than 254 bytes.
    ///
    /// Values longer than `u16::MAX` bytes cannot be represented and are
    /// rejected with `None`.
    pub fn push(&mut self, tag: u8, value: &[u8]) -> Option<&mut Self> {
        if value.len() < TLV_EXTENDED_LENGTH as usize {
            self.buf.push(tag);
            self.buf.push(value.len() as u8);
        } else {
            let length = u16::try_from(value.len()).ok()?;
            self.buf.push(tag);
            self.buf.push(TLV_EXTENDED_LENGTH);
            self.buf.extend_from_slice(&length.to_be_bytes());
        }
        self.buf.extend_from_slice(value);
        Some(self)
    }

    /// Encoded chain.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Consume the writer and return the encoded chain.
    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_happy_path() {
        let buf = [
            0x01, 0x04, b'm', b'u', b'd', b':', 0x02, 0x04, 0xFD, 0x00, 0x00, 0x01,
        ];

        let url = find(0x01, &buf).expect("url tlv");
        assert_eq!(url.value, b"mud:");
        assert_eq!(url.offset, 0);

        let addr = find(0x02, &buf).expect("address tlv");
        assert_eq!(addr.value, &[0xFD, 0x00, 0x00, 0x01]);
        assert_eq!(addr.offset, 6);
    }

    #[test]
    fn test_find_declared_length_past_end() {
        let buf = [0x01, 0x05, b'h', b'e', b'l', b'l'];
        assert_eq!(find(0x01, &buf), None);
    }

    #[test]
    fn test_find_first_match_wins() {
        let buf = [0x07, 0x01, 0xAA, 0x03, 0x00, 0x07, 0x01, 0xBB];
        let tlv = find(0x07, &buf).expect("tlv");
        assert_eq!(tlv.value, &[0xAA]);
        assert_eq!(tlv.offset, 0);
    }

    #[test]
    fn test_find_empty_buffer() {
        assert_eq!(find(0x01, &[]), None);
    }

    #[test]
    fn test_find_lone_type_byte() {
        assert_eq!(find(0x01, &[0x01]), None);
    }

    #[test]
    fn test_zero_length_value() {
        let buf = [0x03, 0x00, 0x01, 0x01, 0x42];
        let empty = find(0x03, &buf).expect("empty tlv");
        assert!(empty.is_empty());
        assert_eq!(find(0x01, &buf).expect("tlv").value, &[0x42]);
    }

    #[test]
    fn test_earlier_match_survives_truncated_tail() {
        let buf = [0x01, 0x02, 0x10, 0x20, 0x02, 0x09, 0x00];
        assert_eq!(find(0x01, &buf).expect("tlv").value, &[0x10, 0x20]);
        assert_eq!(find(0x02, &buf), None);
    }

    #[test]
    fn test_cursor_records_truncation_offset() {
        let buf = [0x01, 0x01, 0xAA, 0x02, 0x08, 0x00];
        let mut cursor = TlvCursor::new(&buf);

        assert_eq!(cursor.next().map(|t| t.tag), Some(0x01));
        assert_eq!(cursor.next(), None);
        assert_eq!(cursor.truncated_at(), Some(3));
        assert_eq!(cursor.remaining(), 0);
        // Stays exhausted
        assert_eq!(cursor.next(), None);
    }

    #[test]
    fn test_cursor_clean_end_not_truncated() {
        let buf = [0x01, 0x01, 0xAA];
        let mut cursor = TlvCursor::new(&buf);
        assert!(cursor.next().is_some());
        assert!(cursor.next().is_none());
        assert_eq!(cursor.truncated_at(), None);
    }

    #[test]
    fn test_extended_length() {
        let mut buf = vec![0x05, 0xFF, 0x01, 0x00];
        buf.extend(std::iter::repeat(0x5A).take(256));
        buf.extend_from_slice(&[0x06, 0x01, 0x01]);

        let big = find(0x05, &buf).expect("extended tlv");
        assert_eq!(big.len(), 256);
        assert_eq!(find(0x06, &buf).expect("tlv").value, &[0x01]);
    }

    #[test]
    fn test_extended_header_truncated() {
        assert_eq!(find(0x05, &[0x05, 0xFF, 0x00]), None);

        let mut cursor = TlvCursor::new(&[0x05, 0xFF, 0x00]);
        assert_eq!(cursor.next(), None);
        assert_eq!(cursor.truncated_at(), Some(0));
    }

    #[test]
    fn test_extended_length_past_end() {
        let buf = [0x05, 0xFF, 0xFF, 0xFF, 0x00, 0x00];
        assert_eq!(find(0x05, &buf), None);
    }

    #[test]
    fn test_every_prefix_stays_in_bounds() {
        let mut writer = TlvWriter::new();
        writer.push(0x01, b"https://example.com/mud.json");
        writer.push(0x02, &[0xFD; 16]);
        let chain = writer.into_bytes();

        for cut in 0..=chain.len() {
            let prefix = &chain[..cut];
            for tag in [0x01, 0x02, 0x03] {
                if let Some(tlv) = find(tag, prefix) {
                    let start = tlv.value.as_ptr() as usize - prefix.as_ptr() as usize;
                    assert!(start + tlv.len() <= prefix.len());
                }
            }
        }
    }

    #[test]
    fn test_writer_picks_extended_header() {
        let mut writer = TlvWriter::new();
        writer.push(0x01, &[0u8; 254]);
        writer.push(0x02, &[0u8; 255]);
        let bytes = writer.as_bytes();

        assert_eq!(&bytes[..2], &[0x01, 0xFE]);
        assert_eq!(&bytes[256..260], &[0x02, 0xFF, 0x00, 0xFF]);
        assert_eq!(find(0x02, bytes).expect("tlv").len(), 255);
    }

    #[test]
    fn test_writer_rejects_oversized_value() {
        let mut writer = TlvWriter::new();
        assert!(writer.push(0x01, &vec![0u8; 70_000]).is_none());
        assert!(writer.as_bytes().is_empty());
    }
}
