//! The assembler driver: a single-pass line parser over a byte-addressed, multi-region layout,
//! with forward references patched the moment their symbol is defined (spec §4.4).
//!
//! ```text
//! source text -> line parser -> (directives, instructions)
//!             -> region allocator + symbol table -> resolution pass -> executable writer
//! ```

pub mod line;
pub mod region;
pub mod summary;

use std::collections::VecDeque;
use std::path::{Path, PathBuf};

use robco_exe::{ExecutableFile, Segment};
use robco_isa::opcode::{self, AccessMode, OpcodeEntry, Signedness, SymbolType};
use robco_isa::{Register, find_by_mnemonic};
use robco_symbols::{PatchBytes, PatchError, ReferenceError, ReferenceOutcome, Site, SymbolKind, SymbolTable};
use snafu::prelude::*;

use region::{AllocError, Allocator, MIN_INSTRUCTION_REGION_SIZE};

/// Maximum number of errors accumulated before the driver gives up collecting more. Matches the
/// "bounded error buffer" requirement in spec §7.
pub const MAX_ERRORS: usize = 256;

#[derive(Debug, Snafu)]
#[non_exhaustive]
pub enum Error {
    #[snafu(display("{path}: {source}"))]
    Io { path: String, source: std::io::Error },
    #[snafu(display("{site}: {message}"))]
    Syntax { site: DisplaySite, message: String },
    #[snafu(display("{site}: {message}"))]
    SymbolError { site: DisplaySite, message: String },
    #[snafu(display("{site}: value {value} does not fit in {width}"))]
    ValueOutOfBounds { site: DisplaySite, value: i64, width: &'static str },
    #[snafu(display("{site}: {message}"))]
    InvalidArgument { site: DisplaySite, message: String },
    #[snafu(display("{site}: no free address range for a {length}-byte region"))]
    NoFreeAddressRange { site: DisplaySite, length: u16 },
    #[snafu(display("no execution_start_address was ever set (no .org or instruction emitted)"))]
    UninitializedValue,
    #[snafu(display("more than {MAX_ERRORS} errors were reported; aborting"))]
    TooManyErrors,
    #[snafu(display("executable encoding failed: {source}"))]
    ExeEncode { source: robco_exe::Error },
}

/// A `(file, line)` pair with its filename resolved for display, since [`Site`] only stores a
/// numeric `file_id`.
#[derive(Debug, Clone)]
pub struct DisplaySite {
    pub file: String,
    pub line: u32,
}

impl core::fmt::Display for DisplaySite {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}:{}", self.file, self.line)
    }
}

struct DataBlock {
    name: Option<String>,
    bytes: Vec<u8>,
    site: Site,
}

/// Drives one assemble operation: all files it processes (the root source plus its includes)
/// share one address space, one symbol table, and one accumulated error list.
pub struct Assembler {
    regions: Allocator,
    symbols: SymbolTable,
    current_instruction_region: Option<usize>,
    execution_start_address: Option<u16>,
    errors: Vec<Error>,
    files: Vec<PathBuf>,
    include_paths: Vec<PathBuf>,
    pending_includes: VecDeque<(PathBuf, Site)>,
    data_block: Option<DataBlock>,
}

impl Assembler {
    #[must_use]
    pub fn new(include_paths: Vec<PathBuf>) -> Self {
        Self {
            regions: Allocator::new(),
            symbols: SymbolTable::new(),
            current_instruction_region: None,
            execution_start_address: None,
            errors: Vec::new(),
            files: Vec::new(),
            include_paths,
            pending_includes: VecDeque::new(),
            data_block: None,
        }
    }

    #[must_use]
    pub fn errors(&self) -> &[Error] {
        &self.errors
    }

    fn site_display(&self, site: Site) -> DisplaySite {
        let file = self
            .files
            .get(site.file_id as usize)
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "<unknown>".to_owned());
        DisplaySite { file, line: site.line }
    }

    fn push_error(&mut self, error: Error) {
        if self.errors.len() >= MAX_ERRORS {
            if !matches!(self.errors.last(), Some(Error::TooManyErrors)) {
                self.errors.push(Error::TooManyErrors);
            }
            return;
        }
        self.errors.push(error);
    }

    fn register_file(&mut self, path: PathBuf) -> u32 {
        if let Some(pos) = self.files.iter().position(|p| p == &path) {
            return pos as u32;
        }
        self.files.push(path);
        (self.files.len() - 1) as u32
    }

    /// Resolves `.include`'s search-path order: the directory of the including file first isn't
    /// modeled here (the driver doesn't track per-file cwd), then each configured `--include`
    /// directory in order, then the literal path itself.
    fn resolve_include(&self, requested: &str) -> Option<PathBuf> {
        for dir in &self.include_paths {
            let candidate = dir.join(requested);
            if candidate.is_file() {
                return Some(candidate);
            }
        }
        let bare = PathBuf::from(requested);
        bare.is_file().then_some(bare)
    }

    /// Processes `path` (and, depth-first, every file it `.include`s) to completion, accumulating
    /// errors rather than stopping at the first one.
    pub fn assemble_file(&mut self, path: &Path) {
        let file_id = self.register_file(path.to_path_buf());
        self.process_file(path, file_id);
    }

    fn process_file(&mut self, path: &Path, file_id: u32) {
        log::debug!("assembling {}", path.display());
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(source) => {
                self.push_error(Error::Io { path: path.display().to_string(), source });
                return;
            }
        };

        for (zero_based_line, raw_line) in text.split(['\n']).enumerate() {
            let raw_line = raw_line.strip_suffix('\r').unwrap_or(raw_line);
            let line_no = zero_based_line as u32 + 1;
            let site = Site { file_id, line: line_no };
            self.handle_line(site, raw_line);

            while let Some((include_path, include_site)) = self.pending_includes.pop_front() {
                match self.resolve_include(&include_path.display().to_string()) {
                    Some(resolved) => {
                        let inc_id = self.register_file(resolved.clone());
                        self.process_file(&resolved, inc_id);
                    }
                    None => self.push_error(Error::Io {
                        path: include_path.display().to_string(),
                        source: std::io::Error::new(
                            std::io::ErrorKind::NotFound,
                            format!("include not found in any search path ({})", self.site_display(include_site)),
                        ),
                    }),
                }
            }
        }

        // An unterminated `.data` block (no explicit `.end`, no following non-byte-array line)
        // implicitly closes at end of file.
        if let Some(block) = self.data_block.take() {
            self.finish_data_block(block);
        }
    }

    fn handle_line(&mut self, site: Site, raw_line: &str) {
        let stripped = line::strip_comment(raw_line);
        let tokens = line::tokenize(stripped);
        if tokens.is_empty() {
            return;
        }

        if self.data_block.is_some() {
            if tokens[0].eq_ignore_ascii_case(".end") {
                let block = self.data_block.take().unwrap();
                self.finish_data_block(block);
                return;
            }
            if line::looks_like_byte_array(&tokens) {
                match self.collect_byte_tokens(&tokens, site) {
                    Ok(mut bytes) => self.data_block.as_mut().unwrap().bytes.append(&mut bytes),
                    Err(e) => self.push_error(e),
                }
                return;
            }
            let block = self.data_block.take().unwrap();
            self.finish_data_block(block);
            // fall through: reprocess this line under normal rules
        }

        let directive = tokens[0].to_ascii_lowercase();
        match directive.as_str() {
            ".include" => self.handle_include(&tokens, site),
            ".defbyte" => self.handle_defbyte(&tokens, site),
            ".defword" => self.handle_defword(&tokens, site),
            ".data" => self.handle_data_start(&tokens, site),
            ".reserve" => self.handle_reserve(&tokens, site),
            ".org" => self.handle_org(&tokens, site),
            ".struct" => self.handle_struct(&tokens, site),
            ".end" => {} // stray .end with no open block; ignore
            _ if tokens[0].ends_with(':') => self.handle_label(&tokens[0], site),
            _ => self.handle_instruction(&tokens, site),
        }
    }

    fn collect_byte_tokens(&self, tokens: &[String], site: Site) -> Result<Vec<u8>, Error> {
        let mut bytes = Vec::new();
        for tok in tokens {
            if tok.starts_with('"') {
                bytes.extend(line::parse_string_literal(tok).map_err(|e| self.syntax_error(site, e))?);
                bytes.push(0); // strings in `.data` are implicitly NUL-terminated (scenario E).
            } else if tok.starts_with('\'') {
                bytes.push(line::parse_char_literal(tok).map_err(|e| self.syntax_error(site, e))?);
            } else {
                let value = line::parse_integer(tok).map_err(|e| self.syntax_error(site, e))?;
                if !(0..=255).contains(&value) && !(-128..=-1).contains(&value) {
                    return Err(Error::ValueOutOfBounds { site: self.site_display(site), value, width: "a byte" });
                }
                bytes.push(value as u8);
            }
        }
        Ok(bytes)
    }

    fn syntax_error(&self, site: Site, e: line::LineError) -> Error {
        Error::Syntax { site: self.site_display(site), message: e.to_string() }
    }

    fn finish_data_block(&mut self, block: DataBlock) {
        let DataBlock { name, bytes, site } = block;
        let length = match u16::try_from(bytes.len()) {
            Ok(length) => length,
            Err(_) => {
                self.push_error(Error::ValueOutOfBounds {
                    site: self.site_display(site),
                    value: bytes.len() as i64,
                    width: "a 64 KiB region",
                });
                return;
            }
        };
        match self.regions.allocate(length, Some(bytes)) {
            Ok(index) => {
                let start = self.regions.region(index).start;
                if let Some(name) = name {
                    self.define_symbol(&name, SymbolKind::AddressData, Signedness::Any, start, 0, site);
                }
            }
            Err(AllocError::NoFreeAddressRange) => {
                self.push_error(Error::NoFreeAddressRange { site: self.site_display(site), length })
            }
            Err(AllocError::Overlap { .. }) => unreachable!("allocate() never uses an explicit base"),
        }
    }

    fn handle_include(&mut self, tokens: &[String], site: Site) {
        let Some(path_tok) = tokens.get(1) else {
            return self.push_error(self.wrong_arg_count(".include", "1", tokens.len() - 1, site));
        };
        let Ok(path_bytes) = line::parse_string_literal(path_tok) else {
            return self.push_error(self.syntax_error(site, line::LineError::UnterminatedLiteral));
        };
        let path = String::from_utf8_lossy(&path_bytes).into_owned();
        self.pending_includes.push_back((PathBuf::from(path), site));
    }

    fn wrong_arg_count(&self, directive: &str, expected: &'static str, found: usize, site: Site) -> Error {
        Error::Syntax {
            site: self.site_display(site),
            message: format!("\"{directive}\" expects {expected} argument(s), found {found}"),
        }
    }

    fn handle_defbyte(&mut self, tokens: &[String], site: Site) {
        if tokens.len() != 3 {
            return self.push_error(self.wrong_arg_count(".defbyte", "2", tokens.len() - 1, site));
        }
        let value = match line::parse_scalar(&tokens[2]) {
            Ok(value) => value,
            Err(e) => return self.push_error(self.syntax_error(site, e)),
        };
        if !(-128..=255).contains(&value) {
            return self.push_error(Error::ValueOutOfBounds { site: self.site_display(site), value, width: "a byte" });
        }
        self.define_symbol(&tokens[1], SymbolKind::Byte, Signedness::Any, 0, value as u8, site);
    }

    fn handle_defword(&mut self, tokens: &[String], site: Site) {
        if tokens.len() != 3 {
            return self.push_error(self.wrong_arg_count(".defword", "2", tokens.len() - 1, site));
        }
        let value = match line::parse_scalar(&tokens[2]) {
            Ok(value) => value,
            Err(e) => return self.push_error(self.syntax_error(site, e)),
        };
        if !(-32768..=65535).contains(&value) {
            return self.push_error(Error::ValueOutOfBounds { site: self.site_display(site), value, width: "a word" });
        }
        self.define_symbol(&tokens[1], SymbolKind::Word, Signedness::Any, value as u16, 0, site);
    }

    fn handle_data_start(&mut self, tokens: &[String], site: Site) {
        // `.data [NAME] bytes...`: NAME is present unless the first byte-ish token immediately
        // follows `.data`.
        let (name, byte_tokens) = if tokens.len() > 1 && line::looks_like_byte_array(&tokens[1..2]) {
            (None, &tokens[1..])
        } else if tokens.len() > 1 {
            (Some(tokens[1].clone()), &tokens[2..])
        } else {
            (None, &tokens[1..])
        };

        let bytes = match self.collect_byte_tokens(byte_tokens, site) {
            Ok(bytes) => bytes,
            Err(e) => return self.push_error(e),
        };
        self.data_block = Some(DataBlock { name, bytes, site });
    }

    fn handle_reserve(&mut self, tokens: &[String], site: Site) {
        if tokens.len() != 3 {
            return self.push_error(self.wrong_arg_count(".reserve", "2", tokens.len() - 1, site));
        }
        let size = match line::parse_integer(&tokens[2]) {
            Ok(size) if (0..=0xFFFF).contains(&size) => size as u16,
            Ok(value) => {
                return self.push_error(Error::ValueOutOfBounds { site: self.site_display(site), value, width: "a region size" })
            }
            Err(e) => return self.push_error(self.syntax_error(site, e)),
        };
        match self.regions.allocate(size, None) {
            Ok(index) => {
                let start = self.regions.region(index).start;
                self.define_symbol(&tokens[1], SymbolKind::AddressData, Signedness::Any, start, 0, site);
            }
            Err(AllocError::NoFreeAddressRange) => {
                self.push_error(Error::NoFreeAddressRange { site: self.site_display(site), length: size })
            }
            Err(AllocError::Overlap { .. }) => unreachable!("allocate() never uses an explicit base"),
        }
    }

    fn handle_org(&mut self, tokens: &[String], site: Site) {
        if tokens.len() != 2 {
            return self.push_error(self.wrong_arg_count(".org", "1", tokens.len() - 1, site));
        }
        let addr = match line::parse_integer(&tokens[1]) {
            Ok(value) if (0..=0xFFFF).contains(&value) => value as u16,
            Ok(value) => {
                return self.push_error(Error::ValueOutOfBounds { site: self.site_display(site), value, width: "an address" })
            }
            Err(e) => return self.push_error(self.syntax_error(site, e)),
        };

        if let Some(existing) = self.regions.find_containing(addr) {
            self.current_instruction_region = Some(existing);
            self.regions.region_mut(existing).current_instruction_offset = addr - self.regions.region(existing).start;
            self.regions.region_mut(existing).executable = true;
        } else {
            match self.regions.allocate_at(addr, MIN_INSTRUCTION_REGION_SIZE, true) {
                Ok(index) => self.current_instruction_region = Some(index),
                Err(AllocError::Overlap { .. }) => {
                    return self.push_error(Error::Syntax {
                        site: self.site_display(site),
                        message: format!("address 0x{addr:04x} overlaps an existing region"),
                    });
                }
                Err(AllocError::NoFreeAddressRange) => unreachable!("explicit base never signals this"),
            }
        }
        if self.execution_start_address.is_none() {
            self.execution_start_address = Some(addr);
        }
    }

    fn handle_struct(&mut self, tokens: &[String], site: Site) {
        // `.struct NAME { MEMBER SIZE ... }`, required to be a single line (see `DESIGN.md`).
        if tokens.len() < 4 || tokens[2] != "{" || tokens.last().map(String::as_str) != Some("}") {
            return self.push_error(Error::Syntax {
                site: self.site_display(site),
                message: "malformed .struct; expected \".struct NAME { MEMBER SIZE ... }\"".to_owned(),
            });
        }
        let name = &tokens[1];
        let members = &tokens[3..tokens.len() - 1];
        if members.len() % 2 != 0 {
            return self.push_error(Error::Syntax {
                site: self.site_display(site),
                message: "each struct member needs a name and a size".to_owned(),
            });
        }

        let mut offset: u16 = 0;
        for pair in members.chunks(2) {
            let member_name = &pair[0];
            let size = match line::parse_integer(&pair[1]) {
                Ok(value) if (0..=0xFFFF).contains(&value) => value as u16,
                Ok(value) => {
                    return self.push_error(Error::ValueOutOfBounds {
                        site: self.site_display(site),
                        value,
                        width: "a struct member size",
                    });
                }
                Err(e) => return self.push_error(self.syntax_error(site, e)),
            };
            let full_name = format!("{name}.{member_name}");
            self.define_symbol(&full_name, SymbolKind::Word, Signedness::Any, offset, 0, site);
            offset = offset.saturating_add(size);
        }
        self.define_symbol(&format!("sizeof({name})"), SymbolKind::Word, Signedness::Any, offset, 0, site);
    }

    fn handle_label(&mut self, token: &str, site: Site) {
        let name = token.trim_end_matches(':');
        self.ensure_instruction_region(site);
        let Some(addr) = self.current_instruction_address() else { return };
        self.define_symbol(name, SymbolKind::AddressInst, Signedness::Any, addr, 0, site);
    }

    fn ensure_instruction_region(&mut self, site: Site) {
        if self.current_instruction_region.is_some() {
            return;
        }
        match self.regions.allocate_at(0, MIN_INSTRUCTION_REGION_SIZE, true) {
            Ok(index) => {
                self.current_instruction_region = Some(index);
                if self.execution_start_address.is_none() {
                    self.execution_start_address = Some(0);
                }
            }
            Err(AllocError::Overlap { .. }) => {
                // Address 0 is already spoken for (e.g. a `.reserve` claimed it); fall back to
                // the generic allocator.
                match self.regions.allocate_instruction_region() {
                    Ok(index) => {
                        let start = self.regions.region(index).start;
                        self.current_instruction_region = Some(index);
                        if self.execution_start_address.is_none() {
                            self.execution_start_address = Some(start);
                        }
                    }
                    Err(AllocError::NoFreeAddressRange) => {
                        self.push_error(Error::NoFreeAddressRange { site: self.site_display(site), length: MIN_INSTRUCTION_REGION_SIZE })
                    }
                    Err(AllocError::Overlap { .. }) => unreachable!(),
                }
            }
            Err(AllocError::NoFreeAddressRange) => unreachable!("explicit base never signals this"),
        }
    }

    #[must_use]
    fn current_instruction_address(&self) -> Option<u16> {
        let index = self.current_instruction_region?;
        let region = self.regions.region(index);
        Some(region.start + region.current_instruction_offset)
    }

    /// Ensures the current instruction region has room for `needed` more bytes, extending it in
    /// place or (if extension falls short) allocating a fresh region and retargeting.
    fn ensure_instruction_room(&mut self, needed: u16, site: Site) -> bool {
        let index = self.current_instruction_region.expect("caller calls ensure_instruction_region first");
        let region = self.regions.region(index);
        let available = region.length - region.current_instruction_offset;
        if available >= needed {
            return true;
        }
        let shortfall = needed - available;
        let result = self.regions.extend(index, shortfall);
        if result.granted >= shortfall {
            return true;
        }
        match self.regions.allocate_instruction_region() {
            Ok(new_index) => {
                log::debug!(
                    "instruction region ran out of room; retargeting to a fresh region at 0x{:04x}",
                    self.regions.region(new_index).start
                );
                self.current_instruction_region = Some(new_index);
                true
            }
            Err(AllocError::NoFreeAddressRange) => {
                self.push_error(Error::NoFreeAddressRange { site: self.site_display(site), length: needed });
                false
            }
            Err(AllocError::Overlap { .. }) => unreachable!(),
        }
    }

    fn emit_instruction_byte(&mut self, byte: u8) -> u16 {
        let index = self.current_instruction_region.expect("room was ensured");
        let region = self.regions.region_mut(index);
        let addr = region.start + region.current_instruction_offset;
        region.buffer.as_mut().expect("instruction regions are always backed")[usize::from(region.current_instruction_offset)] = byte;
        region.current_instruction_offset += 1;
        addr
    }

    fn define_symbol(
        &mut self,
        name: &str,
        kind: SymbolKind,
        signedness: Signedness,
        word_value: u16,
        byte_value: u8,
        site: Site,
    ) {
        match self.symbols.define(name, kind, signedness, word_value, byte_value) {
            Ok(patches) => {
                for patch in patches {
                    self.apply_patch(patch.ref_location, patch.result, patch.site);
                }
            }
            Err(e) => self.push_error(Error::SymbolError { site: self.site_display(site), message: e.to_string() }),
        }
    }

    fn apply_patch(&mut self, ref_location: u16, result: Result<PatchBytes, PatchError>, site: Site) {
        let bytes = match result {
            Ok(bytes) => bytes,
            Err(e) => return self.push_error(Error::SymbolError { site: self.site_display(site), message: e.to_string() }),
        };
        let Some(index) = self.regions.find_containing(ref_location) else {
            return self.push_error(Error::SymbolError {
                site: self.site_display(site),
                message: format!("reference location 0x{ref_location:04x} is not inside any region"),
            });
        };
        let region = self.regions.region_mut(index);
        let offset = usize::from(ref_location - region.start);
        let buffer = region.buffer.as_mut().expect("referenced regions are always backed");
        match bytes {
            PatchBytes::One(byte) => buffer[offset] = byte,
            PatchBytes::Two(bytes) => buffer[offset..offset + 2].copy_from_slice(&bytes),
        }
    }

    fn symbol_kind_of(entry: &OpcodeEntry) -> Option<SymbolKind> {
        match entry.argument_type {
            SymbolType::None => None,
            SymbolType::Word => Some(SymbolKind::Word),
            SymbolType::Byte => Some(SymbolKind::Byte),
            SymbolType::AddressInst => Some(SymbolKind::AddressInst),
            SymbolType::AddressData => Some(SymbolKind::AddressData),
        }
    }

    fn handle_instruction(&mut self, tokens: &[String], site: Site) {
        let Some(entry) = find_by_mnemonic(&tokens[0]) else {
            return self.push_error(Error::Syntax {
                site: self.site_display(site),
                message: format!("unknown mnemonic \"{}\"", tokens[0]),
            });
        };
        let entry = *entry;
        let operand_tok = tokens.get(1);

        self.ensure_instruction_region(site);
        if self.current_instruction_region.is_none() {
            return; // NoFreeAddressRange already reported.
        }

        match entry.access_mode {
            AccessMode::None | AccessMode::StackOnly | AccessMode::StackToFromRegister => {
                if operand_tok.is_some() {
                    return self.push_error(Error::InvalidArgument {
                        site: self.site_display(site),
                        message: format!("\"{}\" takes no argument", entry.mnemonic),
                    });
                }
                if !self.ensure_instruction_room(1, site) {
                    return;
                }
                self.emit_instruction_byte(entry.opcode);
            }
            AccessMode::RegisterIndexed => {
                let Some(operand_tok) = operand_tok else {
                    return self.push_error(Error::InvalidArgument {
                        site: self.site_display(site),
                        message: format!("\"{}\" requires a [reg] operand", entry.mnemonic),
                    });
                };
                let indexed = match line::parse_indexed_operand(operand_tok) {
                    Ok(indexed) => indexed,
                    Err(e) => return self.push_error(self.syntax_error(site, e)),
                };
                if !self.ensure_instruction_room(2, site) {
                    return;
                }
                let opcode = (entry.opcode & !opcode::OP_STACK_REGISTER_MASK) | indexed.register.code();
                self.emit_instruction_byte(opcode);
                self.emit_instruction_byte(indexed.post_byte());
            }
            AccessMode::ImmediateOperands => {
                let Some(operand_tok) = operand_tok else {
                    return self.push_error(Error::InvalidArgument {
                        site: self.site_display(site),
                        message: format!("\"{}\" requires an operand", entry.mnemonic),
                    });
                };
                if !self.ensure_instruction_room(1 + u16::from(entry.arg_byte_count), site) {
                    return;
                }
                let instruction_addr = self.emit_instruction_byte(entry.opcode);
                self.emit_operand(&entry, operand_tok.clone(), instruction_addr, site);
            }
        }
    }

    fn emit_operand(&mut self, entry: &OpcodeEntry, operand_tok: String, instruction_addr: u16, site: Site) {
        let ref_location = instruction_addr + 1;

        if let Ok(value) = line::parse_scalar(&operand_tok) {
            let width_bits = u32::from(entry.arg_byte_count) * 8;
            let (low, high) = match entry.argument_signedness {
                Signedness::Signed => (-(1i64 << (width_bits - 1)), (1i64 << (width_bits - 1)) - 1),
                _ => (0i64, (1i64 << width_bits) - 1),
            };
            if value < low || value > high {
                return self.push_error(Error::ValueOutOfBounds {
                    site: self.site_display(site),
                    value,
                    width: if entry.arg_byte_count == 1 { "a byte operand" } else { "a word operand" },
                });
            }
            match entry.arg_byte_count {
                1 => {
                    self.emit_instruction_byte(value as u8);
                }
                2 => {
                    let bytes = (value as u16).to_be_bytes();
                    self.emit_instruction_byte(bytes[0]);
                    self.emit_instruction_byte(bytes[1]);
                }
                _ => unreachable!("only 1- or 2-byte immediate operands exist"),
            }
            return;
        }

        // Not a literal: treat as a symbol reference.
        let Some(expected_kind) = Self::symbol_kind_of(entry) else {
            return self.push_error(Error::Syntax {
                site: self.site_display(site),
                message: format!("\"{operand_tok}\" is not a valid literal for \"{}\"", entry.mnemonic),
            });
        };
        for _ in 0..entry.arg_byte_count {
            self.emit_instruction_byte(0); // placeholder, patched below or on later define()
        }
        let outcome =
            self.symbols.add_reference(&operand_tok, ref_location, expected_kind, entry.argument_signedness, site);
        match outcome {
            Ok(ReferenceOutcome::Queued) => {}
            Ok(ReferenceOutcome::ResolvedImmediately(result)) => self.apply_patch(ref_location, result, site),
            Err(e @ ReferenceError::WrongType { .. } | e @ ReferenceError::WrongSignedness { .. }) => {
                self.push_error(Error::SymbolError { site: self.site_display(site), message: e.to_string() })
            }
        }
    }

    /// Finalizes the assemble: reports unresolved references and, if no error was ever reported,
    /// encodes the executable. Per spec §7, any accumulated error suppresses file output, so this
    /// returns `Err` whenever any error (including a newly discovered unresolved reference) was
    /// reported. Leaves `self` intact afterward so a caller can still render a `summary` listing
    /// from `self.symbols()`/`self.regions()`.
    ///
    /// # Errors
    /// Returns every accumulated error, including any still-unresolved symbol references.
    pub fn finalize(&mut self) -> Result<ExecutableFile, Vec<Error>> {
        let unresolved = self.symbols.finalize();
        for (name, site) in unresolved {
            self.push_error(Error::SymbolError {
                site: self.site_display(site),
                message: format!("symbol \"{name}\" was never defined"),
            });
        }

        if !self.errors.is_empty() {
            return Err(std::mem::take(&mut self.errors));
        }

        let Some(execution_start_address) = self.execution_start_address else {
            return Err(vec![Error::UninitializedValue]);
        };

        let mut file = ExecutableFile::new(execution_start_address);
        for region in self.regions.regions() {
            let committed = region.committed_len();
            if committed == 0 {
                continue;
            }
            let bytes = region.buffer.as_ref().map_or_else(Vec::new, |b| b[..usize::from(committed)].to_vec());
            file.segments.push(Segment { load_address: region.start, is_code: region.executable, bytes });
        }
        Ok(file)
    }

    #[must_use]
    pub fn regions(&self) -> &[region::Region] {
        self.regions.regions()
    }

    #[must_use]
    pub fn symbols(&self) -> &SymbolTable {
        &self.symbols
    }

    #[must_use]
    pub fn execution_start_address(&self) -> Option<u16> {
        self.execution_start_address
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn assemble_source(source: &str) -> Result<ExecutableFile, Vec<Error>> {
        let dir = std::env::temp_dir().join(format!("robco-asm-test-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(format!("{:x}.asm", source.len() as u64 ^ 0x9E37_79B9));
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(source.as_bytes()).unwrap();

        let mut asm = Assembler::new(vec![]);
        asm.assemble_file(&path);
        let result = asm.finalize();
        let _ = std::fs::remove_file(&path);
        result
    }

    #[test]
    fn scenario_d_org_placement() {
        let file = assemble_source(".org 0x200\nrts\n").unwrap();
        assert_eq!(file.execution_start_address, 0x200);
        assert_eq!(file.segments.len(), 1);
        assert_eq!(file.segments[0].load_address, 0x200);
        assert!(file.segments[0].is_code);
        assert_eq!(file.segments[0].bytes, vec![0x71]);
    }

    #[test]
    fn scenario_b_forward_branch_displacement() {
        // `b` (2 bytes) + two `pushi 0` (2 bytes each) = 6 bytes before `target:`.
        let source = "b target\npushi 0\npushi 0\ntarget:\nrts\n";
        let file = assemble_source(source).unwrap();
        let code = &file.segments[0].bytes;
        assert_eq!(code[0], 0x60); // `b` opcode
        assert_eq!(code[1], 0x06); // displacement to target
    }

    #[test]
    fn scenario_c_branch_overflow_produces_no_output() {
        let mut source = String::from("b target\n");
        for _ in 0..200 {
            source.push_str("pushi 0\n");
        }
        source.push_str("target:\nrts\n");
        let errors = assemble_source(&source).unwrap_err();
        assert!(errors.iter().any(|e| matches!(e, Error::SymbolError { message, .. } if message.contains("out of range"))));
    }

    #[test]
    fn scenario_e_data_and_label_round_trip() {
        let source = ".data HELLO \"Hi\"\npushiw HELLO\nsyscall 0x0102\n";
        let file = assemble_source(source).unwrap();
        let data_segment = file.segments.iter().find(|s| !s.is_code).unwrap();
        assert_eq!(data_segment.bytes, vec![b'H', b'i', 0]);
        let addr = data_segment.load_address;

        let code_segment = file.segments.iter().find(|s| s.is_code).unwrap();
        assert_eq!(code_segment.bytes[1..3], addr.to_be_bytes());
    }

    #[test]
    fn duplicate_symbol_is_an_error() {
        let source = ".defbyte X 1\n.defbyte X 2\n";
        let errors = assemble_source(source).unwrap_err();
        assert!(errors.iter().any(|e| matches!(e, Error::SymbolError { message, .. } if message.contains("already defined"))));
    }

    #[test]
    fn stack_only_instruction_rejects_an_argument() {
        let source = "add 5\n";
        let errors = assemble_source(source).unwrap_err();
        assert!(errors.iter().any(|e| matches!(e, Error::InvalidArgument { .. })));
    }

    #[test]
    fn register_indexed_push_encodes_post_byte() {
        let source = "push [++X]\n";
        let file = assemble_source(source).unwrap();
        let code = &file.segments[0].bytes;
        assert_eq!(code[1], 0x82);
    }
}
