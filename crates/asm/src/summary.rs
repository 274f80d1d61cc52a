//! The `--type summary` human-readable dump: execution start, code/data bytes grouped four per
//! line with their addresses, followed by the symbol table.

use std::fmt::Write as _;

use robco_exe::ExecutableFile;
use robco_symbols::{SymbolKind, SymbolTable};

/// Renders a human-readable summary of an assembled executable, in the style of a disassembler
/// listing: execution start address, each segment's bytes grouped four per line, then the symbol
/// table.
#[must_use]
pub fn render(file: &ExecutableFile, symbols: &SymbolTable) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "execution_start_address: 0x{:04x}", file.execution_start_address);
    let _ = writeln!(out, "segments: {}", file.segments.len());

    for segment in &file.segments {
        let _ = writeln!(
            out,
            "\n{} segment at 0x{:04x}, {} byte(s):",
            if segment.is_code { "code" } else { "data" },
            segment.load_address,
            segment.bytes.len(),
        );
        for (row, chunk) in segment.bytes.chunks(4).enumerate() {
            let addr = segment.load_address.wrapping_add((row * 4) as u16);
            let hex: Vec<String> = chunk.iter().map(|b| format!("{b:02x}")).collect();
            let _ = writeln!(out, "  0x{addr:04x}: {}", hex.join(" "));
        }
    }

    let _ = writeln!(out, "\nsymbols:");
    for (name, symbol) in symbols.symbols() {
        match symbol.kind {
            SymbolKind::Byte => {
                let _ = writeln!(out, "  {name} = 0x{:02x} (byte)", symbol.byte_value);
            }
            SymbolKind::Word => {
                let _ = writeln!(out, "  {name} = 0x{:04x} (word)", symbol.word_value);
            }
            SymbolKind::AddressInst => {
                let _ = writeln!(out, "  {name} = 0x{:04x} (code address)", symbol.word_value);
            }
            SymbolKind::AddressData => {
                let _ = writeln!(out, "  {name} = 0x{:04x} (data address)", symbol.word_value);
            }
        }
    }

    out
}
