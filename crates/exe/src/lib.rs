//! The executable file format shared by the assembler's writer and the emulator's loader: a
//! 6-byte file header followed by concatenated segment records, all big-endian on the wire
//! regardless of host byte order.
//!
//! ```text
//! file_header:   u16 total_length
//!                u16 segment_count
//!                u16 execution_start_address
//!
//! segment_rec:   u16 load_address
//!                u16 record_length   // includes these 5 bytes
//!                u8  is_code
//!                u8[record_length - 5] payload
//! ```

use robco_core::prelude::*;
use robco_core::prelude::data::Error as DataError;
use snafu::prelude::*;

/// Size in bytes of the file header.
pub const FILE_HEADER_SIZE: usize = 6;
/// Size in bytes of a segment record's header (excludes payload).
pub const SEGMENT_HEADER_SIZE: usize = 5;

#[derive(Debug, Snafu)]
#[non_exhaustive]
pub enum Error {
    #[snafu(display("unexpected end of file while reading an executable"))]
    UnexpectedEndOfFile,
    #[snafu(display(
        "segment at 0x{load_address:04x} claims length {record_length} but file has only \
         {available} bytes left"
    ))]
    TruncatedSegment { load_address: u16, record_length: u16, available: usize },
    #[snafu(display(
        "segment at 0x{load_address:04x} of length {length} would exceed the 64 KiB data image"
    ))]
    SegmentOutOfRange { load_address: u16, length: usize },
    #[snafu(display("total_length field ({declared}) does not match the file's actual size ({actual})"))]
    LengthMismatch { declared: u16, actual: usize },
}

type Result<T> = core::result::Result<T, Error>;

impl From<DataError> for Error {
    #[inline]
    fn from(error: DataError) -> Self {
        match error {
            DataError::EndOfFile => Self::UnexpectedEndOfFile,
            _ => panic!("Unexpected data::Error! Something has gone horribly wrong"),
        }
    }
}

/// One contiguous span of bytes destined for a fixed load address, either code or data.
#[derive(Debug, Clone)]
pub struct Segment {
    pub load_address: u16,
    pub is_code: bool,
    pub bytes: Vec<u8>,
}

impl Segment {
    #[must_use]
    pub fn record_length(&self) -> usize {
        SEGMENT_HEADER_SIZE + self.bytes.len()
    }
}

/// A fully decoded (or not-yet-encoded) executable: where the program counter starts, and the
/// segments to relocate into the data image before running.
#[derive(Debug, Clone, Default)]
pub struct ExecutableFile {
    pub execution_start_address: u16,
    pub segments: Vec<Segment>,
}

impl ExecutableFile {
    #[must_use]
    pub fn new(execution_start_address: u16) -> Self {
        Self { execution_start_address, segments: Vec::new() }
    }

    /// Total encoded file size: the header plus every segment's record (header + payload).
    #[must_use]
    pub fn encoded_len(&self) -> usize {
        FILE_HEADER_SIZE + self.segments.iter().map(Segment::record_length).sum::<usize>()
    }

    /// Encodes this executable into its on-disk byte representation.
    ///
    /// # Errors
    /// Returns an error if any segment's length, combined with the file header and the other
    /// segments, overflows a `u16` total length.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let total_length = self.encoded_len();
        let total_length_u16 =
            u16::try_from(total_length).map_err(|_| Error::LengthMismatch {
                declared: u16::MAX,
                actual: total_length,
            })?;

        let mut cursor = DataCursor::new(vec![0u8; total_length], Endian::Big);
        cursor.write_u16(total_length_u16)?;
        cursor.write_u16(u16::try_from(self.segments.len()).unwrap_or(u16::MAX))?;
        cursor.write_u16(self.execution_start_address)?;

        for segment in &self.segments {
            let record_length = u16::try_from(segment.record_length()).map_err(|_| {
                Error::SegmentOutOfRange {
                    load_address: segment.load_address,
                    length: segment.bytes.len(),
                }
            })?;
            cursor.write_u16(segment.load_address)?;
            cursor.write_u16(record_length)?;
            cursor.write_u8(u8::from(segment.is_code))?;
            for &byte in &segment.bytes {
                cursor.write_u8(byte)?;
            }
        }

        Ok(cursor.into_inner().into_vec())
    }

    /// Decodes an executable from its on-disk byte representation.
    ///
    /// # Errors
    /// Returns [`Error::UnexpectedEndOfFile`] if the buffer is shorter than any declared length,
    /// or [`Error::LengthMismatch`] if the header's `total_length` disagrees with the buffer size.
    pub fn decode(data: &[u8]) -> Result<Self> {
        ensure!(data.len() >= FILE_HEADER_SIZE, UnexpectedEndOfFileSnafu);

        let mut cursor = DataCursorRef::new(data, Endian::Big);
        let total_length = cursor.read_u16()?;
        let segment_count = cursor.read_u16()?;
        let execution_start_address = cursor.read_u16()?;

        ensure!(
            usize::from(total_length) == data.len(),
            LengthMismatchSnafu { declared: total_length, actual: data.len() }
        );

        let mut segments = Vec::with_capacity(usize::from(segment_count));
        for _ in 0..segment_count {
            let load_address = cursor.read_u16()?;
            let record_length = cursor.read_u16()?;
            let is_code = cursor.read_u8()? != 0;

            let payload_length = usize::from(record_length)
                .checked_sub(SEGMENT_HEADER_SIZE)
                .ok_or(Error::TruncatedSegment {
                    load_address,
                    record_length,
                    available: cursor.remaining_slice().len(),
                })?;
            ensure!(
                cursor.remaining_slice().len() >= payload_length,
                TruncatedSegmentSnafu {
                    load_address,
                    record_length,
                    available: cursor.remaining_slice().len()
                }
            );
            let payload = cursor.get_slice(payload_length)?.to_vec();
            segments.push(Segment { load_address, is_code, bytes: payload });
        }

        Ok(Self { execution_start_address, segments })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_encode_and_decode() {
        let mut file = ExecutableFile::new(0x0200);
        file.segments.push(Segment { load_address: 0x0200, is_code: true, bytes: vec![0x71] });
        file.segments
            .push(Segment { load_address: 0x0300, is_code: false, bytes: vec![b'H', b'i', 0] });

        let encoded = file.encode().unwrap();
        let decoded = ExecutableFile::decode(&encoded).unwrap();

        assert_eq!(decoded.execution_start_address, 0x0200);
        assert_eq!(decoded.segments.len(), 2);
        assert_eq!(decoded.segments[0].bytes, vec![0x71]);
        assert!(decoded.segments[0].is_code);
        assert_eq!(decoded.segments[1].bytes, vec![b'H', b'i', 0]);
        assert!(!decoded.segments[1].is_code);
    }

    #[test]
    fn org_placement_matches_scenario_d() {
        let mut file = ExecutableFile::new(0x0200);
        file.segments.push(Segment { load_address: 0x0200, is_code: true, bytes: vec![0x71] });
        let encoded = file.encode().unwrap();

        // header (6) + segment header (5) + 1 payload byte = 12
        assert_eq!(encoded.len(), 12);
        assert_eq!(&encoded[6..8], &0x0200u16.to_be_bytes());
        assert_eq!(&encoded[8..10], &6u16.to_be_bytes());
        assert_eq!(encoded[10], 1);
        assert_eq!(encoded[11], 0x71);
    }

    #[test]
    fn decode_rejects_truncated_segment() {
        // header (6) + segment header (5), no payload bytes actually present.
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&11u16.to_be_bytes()); // total_length matches actual buffer size
        bytes.extend_from_slice(&1u16.to_be_bytes()); // segment_count
        bytes.extend_from_slice(&0u16.to_be_bytes()); // execution_start_address
        bytes.extend_from_slice(&0u16.to_be_bytes()); // segment load_address
        bytes.extend_from_slice(&20u16.to_be_bytes()); // record_length claims 15 payload bytes
        bytes.push(0); // is_code

        assert_eq!(bytes.len(), 11);
        let err = ExecutableFile::decode(&bytes).unwrap_err();
        assert!(matches!(err, Error::TruncatedSegment { .. }));
    }
}
