//! The holotape deck: a block-addressed pseudo-tape, used both as bulk storage and as the
//! transport for loadable executables. Mirrors the historical deck's operations (`insert`,
//! `eject`, `rewind`, `seek`, `read`, `write`, `find`, `append`) against an in-memory image of the
//! host tape file.

use std::path::{Path, PathBuf};

use robco_core::prelude::*;
use snafu::prelude::*;

use crate::block::{BlockHeader, FILE_NAME_MAX, HEADER_SIZE, MAX_BLOCKS, PAYLOAD_SIZE, TAPE_SIZE};

#[derive(Debug, Snafu)]
#[non_exhaustive]
pub enum Error {
    /// No tape is currently inserted.
    #[snafu(display("no tape is inserted"))]
    Empty,
    /// A tape is already inserted where an empty deck was required.
    #[snafu(display("a tape is already inserted"))]
    NotEmpty,
    /// `find` scanned to the end of the tape without a match.
    #[snafu(display("file \"{name}\" not found on tape"))]
    NotFound { name: String },
    /// A seek, read, or write ran past the last block.
    #[snafu(display("operation ran past the end of the tape"))]
    EndOfTape,
    /// `append`'s file name exceeds [`FILE_NAME_MAX`] bytes.
    #[snafu(display("file name \"{name}\" exceeds {FILE_NAME_MAX} bytes"))]
    NameTooLong { name: String },
    /// No free block was available for `append`.
    #[snafu(display("tape has no free blocks left"))]
    TapeFull,
    /// Reading or writing the host file failed.
    #[snafu(display("I/O error: {source}"))]
    Io { source: std::io::Error },
    /// An inserted tape's size does not match `MAX_BLOCKS * BLOCK_SIZE`.
    #[snafu(display("tape has {actual} bytes, expected {expected}"))]
    InvalidGeometry { expected: usize, actual: usize },
}

type Result<T> = core::result::Result<T, Error>;

impl From<std::io::Error> for Error {
    #[inline]
    fn from(source: std::io::Error) -> Self {
        Self::Io { source }
    }
}

fn encode_filename(name: &str) -> Result<[u8; FILE_NAME_MAX]> {
    ensure!(name.len() <= FILE_NAME_MAX, NameTooLongSnafu { name: name.to_owned() });
    let mut bytes = [0u8; FILE_NAME_MAX];
    bytes[..name.len()].copy_from_slice(name.as_bytes());
    Ok(bytes)
}

/// A loaded tape plus the deck's read/write head position, measured in whole blocks.
pub struct Deck {
    data: Option<DataCursor>,
    path: Option<PathBuf>,
    position: usize,
    /// Scratch buffer for `read`/`write`, mirroring the historical deck's single transfer buffer.
    pub buffer: [u8; PAYLOAD_SIZE],
}

impl Default for Deck {
    fn default() -> Self {
        Self { data: None, path: None, position: 0, buffer: [0u8; PAYLOAD_SIZE] }
    }
}

impl Deck {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a tape is currently inserted, for `HOLOTAPECHECK`.
    #[must_use]
    pub fn is_inserted(&self) -> bool {
        self.data.is_some()
    }

    fn data(&self) -> Result<&DataCursor> {
        self.data.as_ref().ok_or(Error::Empty)
    }

    fn data_mut(&mut self) -> Result<&mut DataCursor> {
        self.data.as_mut().ok_or(Error::Empty)
    }

    /// Reads the header of the block at `index` without moving the deck position.
    fn header_at(&self, index: usize) -> Result<BlockHeader> {
        let data = self.data()?;
        let offset = index * crate::block::BLOCK_SIZE;
        let mut cursor = DataCursorRef::new(&data[offset..offset + HEADER_SIZE], Endian::Big);
        Ok(BlockHeader::decode(&mut cursor).expect("slice is exactly HEADER_SIZE long"))
    }

    fn write_block(
        &mut self,
        index: usize,
        header: &BlockHeader,
        payload: &[u8],
    ) -> Result<()> {
        let data = self.data_mut()?;
        let offset = index * crate::block::BLOCK_SIZE;
        let mut cursor = DataCursorMut::new(
            &mut data[offset..offset + crate::block::BLOCK_SIZE],
            Endian::Big,
        );
        header.encode(&mut cursor).expect("header fits in one block");
        for &byte in payload {
            cursor.write_u8(byte).expect("payload fits in one block");
        }
        Ok(())
    }

    /// Loads a tape file from `path` into memory.
    ///
    /// # Errors
    /// Returns [`Error::NotEmpty`] if a tape is already inserted, [`Error::Io`] if the file can't
    /// be read, or [`Error::InvalidGeometry`] if its length isn't `MAX_BLOCKS * BLOCK_SIZE`.
    pub fn insert<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        ensure!(self.data.is_none(), NotEmptySnafu);
        let path = path.as_ref();
        let bytes = std::fs::read(path)?;
        ensure!(
            bytes.len() == TAPE_SIZE,
            InvalidGeometrySnafu { expected: TAPE_SIZE, actual: bytes.len() }
        );
        self.data = Some(DataCursor::new(bytes, Endian::Big));
        self.path = Some(path.to_path_buf());
        self.position = 0;
        Ok(())
    }

    /// Creates a brand-new, fully zeroed tape in memory (not yet backed by a host file).
    #[must_use]
    pub fn new_blank() -> Self {
        let mut deck = Self::new();
        deck.data = Some(DataCursor::new(vec![0u8; TAPE_SIZE], Endian::Big));
        deck
    }

    /// Writes the in-memory tape back out to its host file.
    ///
    /// # Errors
    /// Returns [`Error::Empty`] if no tape is inserted, or [`Error::Io`] if the write fails. If
    /// the tape was never loaded from a path, writes to `path` instead and remembers it.
    pub fn flush<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        let data = self.data()?;
        std::fs::write(path.as_ref(), &data[..])?;
        self.path = Some(path.as_ref().to_path_buf());
        Ok(())
    }

    /// Ejects the current tape, discarding in-memory state.
    ///
    /// # Errors
    /// Returns [`Error::Empty`] if no tape is inserted.
    pub fn eject(&mut self) -> Result<()> {
        ensure!(self.data.is_some(), EmptySnafu);
        self.data = None;
        self.path = None;
        self.position = 0;
        Ok(())
    }

    #[must_use]
    pub fn position(&self) -> usize {
        self.position
    }

    /// Resets the deck position to block zero.
    ///
    /// # Errors
    /// Returns [`Error::Empty`] if no tape is inserted.
    pub fn rewind(&mut self) -> Result<()> {
        self.data()?;
        self.position = 0;
        Ok(())
    }

    /// Moves the deck position back by one block.
    ///
    /// # Errors
    /// Returns [`Error::Empty`] if no tape is inserted, or [`Error::EndOfTape`] if already at
    /// block zero.
    pub fn rewind_block(&mut self) -> Result<()> {
        self.data()?;
        self.position = self.position.checked_sub(1).ok_or(Error::EndOfTape)?;
        Ok(())
    }

    /// Moves the deck position forward (or backward, for a negative `n`) by `n` blocks.
    ///
    /// # Errors
    /// Returns [`Error::Empty`] if no tape is inserted, or [`Error::EndOfTape`] if the result
    /// would fall outside `[0, MAX_BLOCKS)`.
    pub fn seek(&mut self, n: i32) -> Result<()> {
        self.data()?;
        let target = i32::try_from(self.position).unwrap_or(i32::MAX) + n;
        ensure!(target >= 0 && (target as usize) < MAX_BLOCKS, EndOfTapeSnafu);
        self.position = target as usize;
        Ok(())
    }

    /// Reads the block at the current position into [`Deck::buffer`] and advances one block.
    ///
    /// # Errors
    /// Returns [`Error::Empty`] if no tape is inserted, or [`Error::EndOfTape`] if the position is
    /// already past the last block.
    pub fn read(&mut self) -> Result<BlockHeader> {
        ensure!(self.position < MAX_BLOCKS, EndOfTapeSnafu);
        let header = self.header_at(self.position)?;
        let data = self.data()?;
        let offset = self.position * crate::block::BLOCK_SIZE + HEADER_SIZE;
        self.buffer.copy_from_slice(&data[offset..offset + PAYLOAD_SIZE]);
        self.position += 1;
        Ok(header)
    }

    /// Writes [`Deck::buffer`] to the block at the current position using `header`, then advances
    /// one block.
    ///
    /// # Errors
    /// Returns [`Error::Empty`] if no tape is inserted, or [`Error::EndOfTape`] if the position is
    /// already past the last block.
    pub fn write(&mut self, header: &BlockHeader) -> Result<()> {
        ensure!(self.position < MAX_BLOCKS, EndOfTapeSnafu);
        let payload = self.buffer;
        self.write_block(self.position, header, &payload)?;
        self.position += 1;
        Ok(())
    }

    /// Scans forward from the current position for a block whose filename matches `name`. On a
    /// match, leaves the deck positioned so the next [`Deck::read`] returns that block.
    ///
    /// # Errors
    /// Returns [`Error::Empty`] if no tape is inserted, or [`Error::NotFound`] if the scan reaches
    /// the end of the tape without a match.
    pub fn find(&mut self, name: &str) -> Result<()> {
        self.data()?;
        let target = encode_filename(name)?;
        for index in self.position..MAX_BLOCKS {
            let header = self.header_at(index)?;
            if header.filename == target {
                self.position = index;
                return Ok(());
            }
        }
        NotFoundSnafu { name: name.to_owned() }.fail()
    }

    /// Appends a host file's contents as a new chain of blocks, starting at the first free block.
    /// The host file's basename is truncated to [`FILE_NAME_MAX`] bytes if longer, with a warning.
    ///
    /// # Errors
    /// Returns [`Error::Empty`] if no tape is inserted, or [`Error::TapeFull`] if there isn't a
    /// free block to start the chain.
    pub fn append<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        self.data()?;
        let path = path.as_ref();
        let contents = std::fs::read(path)?;

        let stem = path.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default();
        let name = if stem.len() > FILE_NAME_MAX {
            log::warn!(
                "file name \"{stem}\" exceeds {FILE_NAME_MAX} bytes, truncating to \"{}\"",
                &stem[..FILE_NAME_MAX]
            );
            stem[..FILE_NAME_MAX].to_owned()
        } else {
            stem
        };
        let filename = encode_filename(&name)?;

        let mut free_blocks = Vec::new();
        for index in 0..MAX_BLOCKS {
            if self.header_at(index)?.is_free() {
                free_blocks.push(index);
            }
        }

        let chunks: Vec<&[u8]> = if contents.is_empty() {
            vec![&[][..]]
        } else {
            contents.chunks(PAYLOAD_SIZE).collect()
        };
        ensure!(free_blocks.len() >= chunks.len(), TapeFullSnafu);

        for (i, chunk) in chunks.iter().enumerate() {
            let block_index = free_blocks[i];
            let next_block =
                if i + 1 < chunks.len() { free_blocks[i + 1] as u8 } else { block_index as u8 };
            let header = BlockHeader {
                block_bytes: u16::try_from(chunk.len()).unwrap_or(u16::MAX),
                remaining_blocks: u16::try_from(chunks.len() - 1 - i).unwrap_or(u16::MAX),
                filename,
                next_block,
            };
            self.write_block(block_index, &header, chunk)?;
        }
        Ok(())
    }

    /// Zeroes every block, returning the tape to its empty state.
    ///
    /// # Errors
    /// Returns [`Error::Empty`] if no tape is inserted.
    pub fn erase(&mut self) -> Result<()> {
        let data = self.data_mut()?;
        for byte in data.as_mut() {
            *byte = 0;
        }
        self.position = 0;
        Ok(())
    }

    /// Lists the canonical name of every file on the tape (the tail block of each chain).
    ///
    /// # Errors
    /// Returns [`Error::Empty`] if no tape is inserted.
    pub fn list(&self) -> Result<Vec<String>> {
        self.data()?;
        let mut names = Vec::new();
        for index in 0..MAX_BLOCKS {
            let header = self.header_at(index)?;
            if header.is_tail() {
                let end = header.filename.iter().position(|&b| b == 0).unwrap_or(FILE_NAME_MAX);
                names.push(String::from_utf8_lossy(&header.filename[..end]).into_owned());
            }
        }
        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filename(name: &str) -> [u8; FILE_NAME_MAX] {
        encode_filename(name).unwrap()
    }

    #[test]
    fn write_then_rewind_block_then_read_round_trips() {
        let mut deck = Deck::new_blank();
        deck.buffer[..5].copy_from_slice(b"hello");
        let header = BlockHeader {
            block_bytes: 5,
            remaining_blocks: 0,
            filename: filename("HI"),
            next_block: 0,
        };
        deck.write(&header).unwrap();

        deck.rewind_block().unwrap();
        let read_header = deck.read().unwrap();
        assert_eq!(read_header, header);
        assert_eq!(&deck.buffer[..5], b"hello");
    }

    #[test]
    fn find_positions_so_next_read_returns_the_match() {
        let mut deck = Deck::new_blank();
        // Write a marker file at block 3 directly.
        let header = BlockHeader {
            block_bytes: 4,
            remaining_blocks: 0,
            filename: filename("PROG"),
            next_block: 0,
        };
        deck.buffer[..4].copy_from_slice(b"data");
        deck.seek(3).unwrap();
        deck.write(&header).unwrap();

        deck.rewind().unwrap();
        deck.find("PROG").unwrap();
        assert_eq!(deck.position(), 3);
        let found = deck.read().unwrap();
        assert_eq!(found.filename, filename("PROG"));
    }

    #[test]
    fn find_without_a_match_reports_not_found() {
        let mut deck = Deck::new_blank();
        let err = deck.find("NOPE").unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
    }

    #[test]
    fn seek_past_the_tape_is_end_of_tape() {
        let mut deck = Deck::new_blank();
        let err = deck.seek(1000).unwrap_err();
        assert!(matches!(err, Error::EndOfTape));
    }

    #[test]
    fn operations_on_an_empty_deck_are_rejected() {
        let mut deck = Deck::new();
        assert!(matches!(deck.rewind().unwrap_err(), Error::Empty));
        assert!(matches!(deck.read().unwrap_err(), Error::Empty));
    }

    #[test]
    fn erase_zeroes_every_block() {
        let mut deck = Deck::new_blank();
        deck.buffer[0] = 0xFF;
        let header = BlockHeader { filename: filename("X"), ..Default::default() };
        deck.write(&header).unwrap();
        deck.erase().unwrap();
        deck.rewind().unwrap();
        let header = deck.read().unwrap();
        assert!(header.is_free());
    }
}
