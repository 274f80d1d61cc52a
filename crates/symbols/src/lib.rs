//! The symbol table: definitions, pending forward references, and resolution patching.
//!
//! The historical assembler threaded an opaque callback (really, a raw pointer into the region
//! buffer) through every pending reference so that [`SymbolTable::define`] could poke resolved
//! bytes directly into memory as it walked the list. That does not translate cleanly into safe
//! Rust, since region buffers can grow and move while references to them are still outstanding (see
//! the region-extension note in `DESIGN.md`). Instead, a [`Reference`] only remembers *what kind of
//! patch* it needs; [`SymbolTable::define`] and [`SymbolTable::add_reference`] compute the patch
//! bytes and hand them back to the caller, which is responsible for writing them into whichever
//! region currently owns `ref_location`.

use robco_isa::{Signedness, opcode::SymbolType};
use snafu::prelude::*;

/// Maximum symbol name length, matching the historical fixed-size name buffer.
pub const MAX_NAME_LENGTH: usize = 30;

/// The four symbol shapes a `define` call can assign. Plain opcode operands that take no symbol at
/// all use [`SymbolType::None`] from `robco-isa`, which is intentionally not representable here: a
/// defined symbol always has a real type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolKind {
    Word,
    Byte,
    AddressInst,
    AddressData,
}

impl SymbolKind {
    #[must_use]
    pub const fn as_symbol_type(self) -> SymbolType {
        match self {
            Self::Word => SymbolType::Word,
            Self::Byte => SymbolType::Byte,
            Self::AddressInst => SymbolType::AddressInst,
            Self::AddressData => SymbolType::AddressData,
        }
    }
}

/// A defined symbol's value. Byte-typed symbols only ever populate `byte_value`; every other kind
/// populates `word_value` as a 16-bit quantity (an absolute address, for the two `Address*` kinds).
#[derive(Debug, Clone, Copy)]
pub struct Symbol {
    pub kind: SymbolKind,
    pub signedness: Signedness,
    pub word_value: u16,
    pub byte_value: u8,
}

/// Where a reference or definition came from, for pinning errors to `(file, line)` as the driver
/// requires. Opaque to this crate; the assembler chooses what `file_id` means.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Site {
    pub file_id: u32,
    pub line: u32,
}

/// The concrete bytes a resolved reference should be patched with, and where.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchBytes {
    One(u8),
    Two([u8; 2]),
}

#[derive(Debug, Snafu)]
#[non_exhaustive]
pub enum PatchError {
    /// Raised when an `ADDRESS_INST` signed (branch) reference's displacement does not fit an
    /// `i8`. Pinned to the referencing site so the assembler can report it against that line.
    #[snafu(display("branch displacement {displacement} out of range at {site:?}"))]
    BranchOutOfRange { displacement: i32, site: Site },
}

#[derive(Debug, Snafu)]
#[non_exhaustive]
pub enum DefineError {
    /// A symbol with this name (case-insensitively) is already defined.
    #[snafu(display("symbol \"{name}\" is already defined"))]
    Duplicate { name: String },
}

#[derive(Debug, Snafu)]
#[non_exhaustive]
pub enum ReferenceError {
    #[snafu(display("reference to \"{name}\" expected type {expected:?} but symbol is {actual:?}"))]
    WrongType { name: String, expected: SymbolKind, actual: SymbolKind },
    #[snafu(display("reference to \"{name}\" expected signedness {expected:?} but symbol is {actual:?}"))]
    WrongSignedness { name: String, expected: Signedness, actual: Signedness },
}

/// The outcome of [`SymbolTable::add_reference`]: either the symbol isn't defined yet and the
/// reference was queued, or it already exists and the patch bytes are ready immediately (which may
/// itself fail, e.g. a branch that's already out of range).
#[derive(Debug)]
pub enum ReferenceOutcome {
    Queued,
    ResolvedImmediately(Result<PatchBytes, PatchError>),
}

/// One patch produced while resolving the references pending on a freshly defined symbol.
#[derive(Debug)]
pub struct ResolvedPatch {
    pub ref_location: u16,
    pub site: Site,
    pub result: Result<PatchBytes, PatchError>,
}

struct PendingReference {
    name: String,
    ref_location: u16,
    expected_kind: SymbolKind,
    expected_signedness: Signedness,
    site: Site,
    resolved: bool,
}

/// `WORD` and `ADDRESS_DATA` symbols both resolve to a two-byte big-endian write (spec §4.2), so a
/// reference that expects one accepts a symbol defined as the other — e.g. `pushiw` treats a
/// `.data` label's address the same as a plain word constant.
fn word_and_address_data(a: SymbolKind, b: SymbolKind) -> bool {
    matches!((a, b), (SymbolKind::Word, SymbolKind::AddressData) | (SymbolKind::AddressData, SymbolKind::Word))
}

/// Computes the patch bytes for a reference once its symbol's value is known, per the resolution
/// rules in the machine's data model: byte symbols write one byte, word/address-data symbols write
/// a big-endian word, and signed `ADDRESS_INST` references (branches) encode a displacement biased
/// by `ref_location - 1` so that a branch to the very next instruction encodes as zero.
fn compute_patch(symbol: &Symbol, ref_location: u16, site: Site) -> Result<PatchBytes, PatchError> {
    match symbol.kind {
        SymbolKind::Byte => Ok(PatchBytes::One(symbol.byte_value)),
        SymbolKind::Word | SymbolKind::AddressData => {
            Ok(PatchBytes::Two(symbol.word_value.to_be_bytes()))
        }
        SymbolKind::AddressInst => match symbol.signedness {
            // Only ever reached for references that requested SIGNED; UNSIGNED address-inst
            // references (jmp/jsr) just want the raw absolute address.
            _ if symbol.signedness != Signedness::Signed => {
                Ok(PatchBytes::Two(symbol.word_value.to_be_bytes()))
            }
            _ => {
                let bias = i32::from(ref_location) - 1;
                let displacement = i32::from(symbol.word_value) - bias;
                let Ok(displacement) = i8::try_from(displacement) else {
                    return BranchOutOfRangeSnafu { displacement, site }.fail();
                };
                Ok(PatchBytes::One(displacement as u8))
            }
        },
    }
}

/// The symbol table. Mirrors the historical design as two parallel lists (definitions and pending
/// references) rather than a hash map, since programs assembled by this toolchain are small and
/// insertion order matters for deterministic error reporting.
#[derive(Default)]
pub struct SymbolTable {
    symbols: Vec<(String, Symbol)>,
    references: Vec<PendingReference>,
}

impl SymbolTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn find_symbol(&self, name: &str) -> Option<&Symbol> {
        self.symbols.iter().find(|(n, _)| n.eq_ignore_ascii_case(name)).map(|(_, s)| s)
    }

    /// Defines a new symbol, then walks every still-pending reference whose name matches and
    /// resolves it, returning the resulting patches (which may individually fail, e.g.
    /// `BranchOutOfRange`, without aborting the others).
    ///
    /// # Errors
    /// Returns [`DefineError::Duplicate`] if a symbol with this name (case-insensitively) already
    /// exists. No references are touched in that case.
    pub fn define(
        &mut self,
        name: &str,
        kind: SymbolKind,
        signedness: Signedness,
        word_value: u16,
        byte_value: u8,
    ) -> Result<Vec<ResolvedPatch>, DefineError> {
        ensure!(self.find_symbol(name).is_none(), DuplicateSnafu { name: name.to_owned() });

        let symbol = Symbol { kind, signedness, word_value, byte_value };
        self.symbols.push((name.to_owned(), symbol));

        let mut patches = Vec::new();
        for reference in &mut self.references {
            if reference.resolved || !reference.name.eq_ignore_ascii_case(name) {
                continue;
            }
            reference.resolved = true;
            let result = compute_patch(&symbol, reference.ref_location, reference.site);
            patches.push(ResolvedPatch { ref_location: reference.ref_location, site: reference.site, result });
        }
        Ok(patches)
    }

    /// Registers a forward (or backward) reference to `name` at `ref_location`. If the symbol is
    /// already defined the reference is resolved immediately; otherwise it is queued for
    /// [`define`](Self::define) to resolve later.
    ///
    /// # Errors
    /// Returns [`ReferenceError::WrongType`] or [`ReferenceError::WrongSignedness`] if an already-
    /// defined symbol's type/signedness conflicts with what this reference expects.
    pub fn add_reference(
        &mut self,
        name: &str,
        ref_location: u16,
        expected_kind: SymbolKind,
        expected_signedness: Signedness,
        site: Site,
    ) -> Result<ReferenceOutcome, ReferenceError> {
        let existing = self.find_symbol(name).copied();

        if let Some(symbol) = existing {
            ensure!(
                symbol.kind == expected_kind || word_and_address_data(symbol.kind, expected_kind),
                WrongTypeSnafu { name: name.to_owned(), expected: expected_kind, actual: symbol.kind }
            );
            if expected_signedness != Signedness::Any && symbol.signedness != Signedness::Any {
                ensure!(
                    symbol.signedness == expected_signedness,
                    WrongSignednessSnafu {
                        name: name.to_owned(),
                        expected: expected_signedness,
                        actual: symbol.signedness
                    }
                );
            }
        }

        self.references.push(PendingReference {
            name: name.to_owned(),
            ref_location,
            expected_kind,
            expected_signedness,
            site,
            resolved: existing.is_some(),
        });

        Ok(match existing {
            Some(symbol) => {
                ReferenceOutcome::ResolvedImmediately(compute_patch(&symbol, ref_location, site))
            }
            None => ReferenceOutcome::Queued,
        })
    }

    /// Looks a symbol up without creating a reference to it.
    #[must_use]
    pub fn resolve(&self, name: &str) -> Option<Symbol> {
        self.find_symbol(name).copied()
    }

    /// Every defined symbol, in definition order, for listings (`summary` output) and tooling.
    pub fn symbols(&self) -> impl Iterator<Item = (&str, &Symbol)> {
        self.symbols.iter().map(|(name, symbol)| (name.as_str(), symbol))
    }

    /// Returns the name and site of every reference that was never resolved by a matching
    /// `define` call, without consuming the table (the driver still needs it afterward to render
    /// a `summary` listing).
    #[must_use]
    pub fn finalize(&self) -> Vec<(String, Site)> {
        self.references
            .iter()
            .filter(|r| !r.resolved)
            .map(|r| (r.name.clone(), r.site))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn site(line: u32) -> Site {
        Site { file_id: 0, line }
    }

    #[test]
    fn duplicate_define_is_rejected() {
        let mut table = SymbolTable::new();
        table.define("count", SymbolKind::Byte, Signedness::Any, 0, 5).unwrap();
        let err = table.define("COUNT", SymbolKind::Byte, Signedness::Any, 0, 6).unwrap_err();
        assert!(matches!(err, DefineError::Duplicate { .. }));
    }

    #[test]
    fn forward_reference_is_patched_on_define() {
        let mut table = SymbolTable::new();
        let outcome = table
            .add_reference("target", 0x10, SymbolKind::Word, Signedness::Any, site(1))
            .unwrap();
        assert!(matches!(outcome, ReferenceOutcome::Queued));

        let patches = table.define("target", SymbolKind::Word, Signedness::Any, 0x1234, 0).unwrap();
        assert_eq!(patches.len(), 1);
        assert_eq!(patches[0].result.unwrap(), PatchBytes::Two([0x12, 0x34]));
    }

    #[test]
    fn branch_reference_biases_by_ref_location_minus_one() {
        let mut table = SymbolTable::new();
        // Branch operand byte lives at address 2 (opcode at 1); target is address 8.
        table
            .add_reference("loop_end", 2, SymbolKind::AddressInst, Signedness::Signed, site(1))
            .unwrap();
        let patches =
            table.define("loop_end", SymbolKind::AddressInst, Signedness::Signed, 8, 0).unwrap();
        assert_eq!(patches[0].result.unwrap(), PatchBytes::One(7));
    }

    #[test]
    fn branch_out_of_range_is_reported_but_does_not_abort_other_patches() {
        let mut table = SymbolTable::new();
        table
            .add_reference("far", 2, SymbolKind::AddressInst, Signedness::Signed, site(1))
            .unwrap();
        let patches =
            table.define("far", SymbolKind::AddressInst, Signedness::Signed, 500, 0).unwrap();
        assert!(matches!(patches[0].result, Err(PatchError::BranchOutOfRange { .. })));
    }

    #[test]
    fn already_defined_symbol_resolves_reference_immediately() {
        let mut table = SymbolTable::new();
        table.define("two", SymbolKind::Byte, Signedness::Any, 0, 2).unwrap();
        let outcome =
            table.add_reference("two", 0x40, SymbolKind::Byte, Signedness::Any, site(3)).unwrap();
        match outcome {
            ReferenceOutcome::ResolvedImmediately(Ok(PatchBytes::One(2))) => {}
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn finalize_reports_unresolved_references() {
        let mut table = SymbolTable::new();
        table
            .add_reference("missing", 0x10, SymbolKind::Word, Signedness::Any, site(5))
            .unwrap();
        let unresolved = table.finalize();
        assert_eq!(unresolved, vec![("missing".to_string(), site(5))]);
    }

    #[test]
    fn word_reference_accepts_an_address_data_symbol() {
        let mut table = SymbolTable::new();
        table.define("hello", SymbolKind::AddressData, Signedness::Any, 0x3000, 0).unwrap();
        let outcome =
            table.add_reference("hello", 0x10, SymbolKind::Word, Signedness::Any, site(1)).unwrap();
        match outcome {
            ReferenceOutcome::ResolvedImmediately(Ok(PatchBytes::Two([0x30, 0x00]))) => {}
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn wrong_type_reference_against_existing_symbol_is_rejected() {
        let mut table = SymbolTable::new();
        table.define("flag", SymbolKind::Byte, Signedness::Any, 0, 1).unwrap();
        let err = table
            .add_reference("flag", 0x10, SymbolKind::Word, Signedness::Any, site(2))
            .unwrap_err();
        assert!(matches!(err, ReferenceError::WrongType { .. }));
    }
}
