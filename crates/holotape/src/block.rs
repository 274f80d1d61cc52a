//! Fixed-geometry block format: header fields plus a payload that always fills out to
//! [`BLOCK_SIZE`]. Block size and tape length are not declared as named constants anywhere in the
//! historical sources (see `DESIGN.md`); they're pinned here as format constants.

use robco_core::prelude::*;

/// Bytes per block, including the header.
pub const BLOCK_SIZE: usize = 1024;
/// Number of blocks on a tape.
pub const MAX_BLOCKS: usize = 256;
/// Maximum bytes in a file name, including no terminator.
pub const FILE_NAME_MAX: usize = 8;

/// `block_bytes(2) + remaining_blocks(2) + filename(8) + next_block(1)`.
pub const HEADER_SIZE: usize = 13;
/// Payload bytes available per block once the header is accounted for.
pub const PAYLOAD_SIZE: usize = BLOCK_SIZE - HEADER_SIZE;

/// Total size in bytes of a freshly initialized tape.
pub const TAPE_SIZE: usize = BLOCK_SIZE * MAX_BLOCKS;

/// One block's header, decoded from its on-tape bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BlockHeader {
    /// Number of payload bytes in this block that are actually part of the file.
    pub block_bytes: u16,
    /// Number of further blocks remaining in this file's chain after this one.
    pub remaining_blocks: u16,
    /// File name, zero-padded. `filename[0] == 0` marks a free block.
    pub filename: [u8; FILE_NAME_MAX],
    /// Block index of the next block in this file's chain (meaningless on the tail block).
    pub next_block: u8,
}

impl BlockHeader {
    #[must_use]
    pub fn is_free(&self) -> bool {
        self.filename[0] == 0
    }

    /// True for the tail block of a file's chain, the block whose name is canonical for listing.
    #[must_use]
    pub fn is_tail(&self) -> bool {
        !self.is_free() && self.remaining_blocks == 0
    }

    /// Decodes a header from the first [`HEADER_SIZE`] bytes of `data`.
    ///
    /// # Errors
    /// Returns [`robco_core::data::Error::EndOfFile`] if `data` is shorter than [`HEADER_SIZE`].
    pub fn decode(cursor: &mut DataCursorRef<'_>) -> core::result::Result<Self, data::Error> {
        let block_bytes = cursor.read_u16()?;
        let remaining_blocks = cursor.read_u16()?;
        let mut filename = [0u8; FILE_NAME_MAX];
        cursor.read_length(&mut filename)?;
        let next_block = cursor.read_u8()?;
        Ok(Self { block_bytes, remaining_blocks, filename, next_block })
    }

    /// Encodes this header into `cursor` at its current position.
    ///
    /// # Errors
    /// Returns [`robco_core::data::Error::EndOfFile`] if there isn't room left in `cursor`.
    pub fn encode(&self, cursor: &mut DataCursorMut<'_>) -> core::result::Result<(), data::Error> {
        cursor.write_u16(self.block_bytes)?;
        cursor.write_u16(self.remaining_blocks)?;
        for &byte in &self.filename {
            cursor.write_u8(byte)?;
        }
        cursor.write_u8(self.next_block)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_round_trips() {
        let header = BlockHeader {
            block_bytes: 200,
            remaining_blocks: 1,
            filename: *b"PROG\0\0\0\0",
            next_block: 9,
        };
        let mut bytes = vec![0u8; HEADER_SIZE];
        let mut writer = DataCursorMut::new(&mut bytes, Endian::Big);
        header.encode(&mut writer).unwrap();

        let mut reader = DataCursorRef::new(&bytes, Endian::Big);
        let decoded = BlockHeader::decode(&mut reader).unwrap();
        assert_eq!(decoded, header);
    }

    #[test]
    fn free_and_tail_detection() {
        let free = BlockHeader::default();
        assert!(free.is_free());
        assert!(!free.is_tail());

        let tail = BlockHeader { filename: *b"A\0\0\0\0\0\0\0", remaining_blocks: 0, ..free };
        assert!(!tail.is_free());
        assert!(tail.is_tail());
    }
}
