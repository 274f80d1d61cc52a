//! The holotape `EXECUTE` syscall's loader: read an executable's bytes off however many blocks its
//! declared length spans, then route each segment into the instruction or data image by its
//! `is_code` flag.
//!
//! Mirrors `handle_holotape_execute`'s accumulation loop. That loop treats the file header as
//! opaque bytes read straight off the tape rather than going through a parsed struct, so this does
//! the same: the first two fields are peeked directly out of the accumulated buffer before
//! `robco_exe::ExecutableFile::decode` ever sees it, since decoding requires the buffer to already
//! be exactly `total_length` bytes long.

use robco_exe::ExecutableFile;
use robco_holotape::Deck;

use crate::memory::Memory;
use crate::{Error, Result};

/// Reads one complete executable starting at the deck's current block position.
///
/// # Errors
/// Returns [`Error::MalformedExecutable`] if the file header is missing or declares zero segments
/// or zero length, or if the tape runs out of chained blocks before `total_length` bytes have been
/// collected. Returns [`Error::Holotape`] if no tape is inserted or the deck is already at its end.
pub fn read_executable(deck: &mut Deck) -> Result<ExecutableFile> {
    let header = deck.read()?;
    let mut bytes = deck.buffer[..usize::from(header.block_bytes)].to_vec();
    let mut remaining_blocks = header.remaining_blocks;

    if bytes.len() < 6 {
        return Err(Error::MalformedExecutable {
            reason: "first block is shorter than the executable file header".into(),
        });
    }
    let total_length = usize::from(u16::from_be_bytes([bytes[0], bytes[1]]));
    let segment_count = u16::from_be_bytes([bytes[2], bytes[3]]);
    if segment_count == 0 || total_length == 0 {
        return Err(Error::MalformedExecutable {
            reason: "executable declares zero segments or zero length".into(),
        });
    }

    while bytes.len() < total_length {
        if remaining_blocks == 0 {
            return Err(Error::MalformedExecutable {
                reason: format!(
                    "tape ran out of blocks after {} of {} declared bytes",
                    bytes.len(),
                    total_length
                ),
            });
        }
        let header = deck.read()?;
        bytes.extend_from_slice(&deck.buffer[..usize::from(header.block_bytes)]);
        remaining_blocks = header.remaining_blocks;
    }
    bytes.truncate(total_length);

    ExecutableFile::decode(&bytes).map_err(Error::from)
}

/// Relocates every segment of `file` into the image its `is_code` flag selects. Callers are
/// expected to have already reset [`Memory`] beforehand, as the historical loader does.
///
/// # Errors
/// Returns [`Error::Memory`] if any segment's `load_address`/length would run past its image.
pub fn relocate(memory: &mut Memory, file: &ExecutableFile) -> Result<()> {
    for segment in &file.segments {
        if segment.is_code {
            memory.load_instruction_segment(segment.load_address, &segment.bytes)?;
        } else {
            memory.load_data_segment(segment.load_address, &segment.bytes)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use robco_exe::Segment;
    use robco_holotape::Deck;

    fn executable_with_one_segment() -> ExecutableFile {
        let mut file = ExecutableFile::new(0x0200);
        file.segments.push(Segment { load_address: 0x0200, is_code: true, bytes: vec![0x71; 32] });
        file.segments.push(Segment {
            load_address: 0x0100,
            is_code: false,
            bytes: b"hello".to_vec(),
        });
        file
    }

    fn deck_with(file: &ExecutableFile) -> Deck {
        let mut deck = Deck::new_blank();
        let encoded = file.encode().unwrap();
        deck.buffer[..encoded.len()].copy_from_slice(&encoded);
        let header = robco_holotape::BlockHeader {
            block_bytes: encoded.len() as u16,
            remaining_blocks: 0,
            filename: *b"PROG\0\0\0\0",
            next_block: 0,
        };
        deck.write(&header).unwrap();
        deck.rewind().unwrap();
        deck
    }

    #[test]
    fn reads_an_executable_that_fits_in_one_block() {
        let file = executable_with_one_segment();
        let mut deck = deck_with(&file);
        let decoded = read_executable(&mut deck).unwrap();
        assert_eq!(decoded.execution_start_address, 0x0200);
        assert_eq!(decoded.segments.len(), 2);
    }

    #[test]
    fn rejects_a_header_declaring_zero_segments() {
        let mut deck = Deck::new_blank();
        let mut bytes = vec![0u8; 6];
        bytes[0..2].copy_from_slice(&10u16.to_be_bytes());
        deck.buffer[..6].copy_from_slice(&bytes);
        let header = robco_holotape::BlockHeader {
            block_bytes: 6,
            remaining_blocks: 0,
            filename: *b"PROG\0\0\0\0",
            next_block: 0,
        };
        deck.write(&header).unwrap();
        deck.rewind().unwrap();
        let err = read_executable(&mut deck).unwrap_err();
        assert!(matches!(err, Error::MalformedExecutable { .. }));
    }

    #[test]
    fn relocate_routes_segments_by_is_code() {
        let file = executable_with_one_segment();
        let mut memory = Memory::new();
        relocate(&mut memory, &file).unwrap();
        assert_eq!(memory.fetch_instruction_byte(0x0200), Some(0x71));
        assert_eq!(memory.data_slice(0x0100, 5), b"hello");
    }
}
