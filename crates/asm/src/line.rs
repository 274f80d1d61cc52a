//! Line-level lexing: splitting a physical line into directive/instruction tokens, parsing
//! integer literals, and the small two-state DFA that handles `.data`'s no-explicit-terminator
//! multi-line continuation (see `DESIGN.md`).

use robco_isa::Register;
use snafu::prelude::*;

#[derive(Debug, Snafu)]
#[non_exhaustive]
pub enum LineError {
    #[snafu(display("malformed integer literal \"{text}\""))]
    BadLiteral { text: String },
    #[snafu(display("unterminated string or character literal"))]
    UnterminatedLiteral,
    #[snafu(display("unknown directive \".{name}\""))]
    UnknownDirective { name: String },
    #[snafu(display("\"{text}\" is not a valid register-indexed operand"))]
    BadIndexedOperand { text: String },
    #[snafu(display("expected {expected} argument(s) for \"{directive}\", found {found}"))]
    WrongArgCount { directive: String, expected: &'static str, found: usize },
}

type Result<T> = core::result::Result<T, LineError>;

/// Strips a `;`-introduced end-of-line comment and trailing/leading whitespace. Does not look
/// inside string/char literals for a `;`, matching a plain line-oriented comment strip.
#[must_use]
pub fn strip_comment(line: &str) -> &str {
    match line.find(';') {
        Some(i) => line[..i].trim(),
        None => line.trim(),
    }
}

/// Splits a line into whitespace-separated tokens, keeping `"..."` and `'.'` literals intact as
/// single tokens (including their delimiters, stripped by the literal parsers).
#[must_use]
pub fn tokenize(line: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut chars = line.chars().peekable();
    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
            continue;
        }
        if c == '"' {
            let mut tok = String::from("\"");
            chars.next();
            for ch in chars.by_ref() {
                tok.push(ch);
                if ch == '"' {
                    break;
                }
            }
            tokens.push(tok);
            continue;
        }
        if c == '\'' {
            let mut tok = String::from("'");
            chars.next();
            for ch in chars.by_ref() {
                tok.push(ch);
                if ch == '\'' {
                    break;
                }
            }
            tokens.push(tok);
            continue;
        }
        if c == '[' {
            let mut tok = String::new();
            for ch in chars.by_ref() {
                tok.push(ch);
                if ch == ']' {
                    break;
                }
            }
            tokens.push(tok);
            continue;
        }
        let mut tok = String::new();
        while let Some(&c) = chars.peek() {
            if c.is_whitespace() || c == '[' {
                break;
            }
            tok.push(c);
            chars.next();
        }
        tokens.push(tok);
    }
    tokens
}

fn unescape_char(s: &str) -> Option<u8> {
    let bytes = s.as_bytes();
    match bytes {
        [b'\\', b'n'] => Some(b'\n'),
        [b'\\', b'r'] => Some(b'\r'),
        [b'\\', b't'] => Some(b'\t'),
        [b'\\', b'0'] => Some(0),
        [b'\\', b'\\'] => Some(b'\\'),
        [b'\\', b'\''] => Some(b'\''),
        [single] => Some(*single),
        _ => None,
    }
}

/// Parses a single-quoted character literal (`'H'`, `'\n'`) into its byte value.
pub fn parse_char_literal(text: &str) -> Result<u8> {
    ensure!(text.len() >= 3 && text.starts_with('\'') && text.ends_with('\''), UnterminatedLiteralSnafu);
    let inner = &text[1..text.len() - 1];
    unescape_char(inner).ok_or_else(|| LineError::BadLiteral { text: text.to_owned() })
}

/// Parses a double-quoted string literal (`"Hi"`) into its bytes, honoring the same escapes as
/// [`parse_char_literal`].
pub fn parse_string_literal(text: &str) -> Result<Vec<u8>> {
    ensure!(text.len() >= 2 && text.starts_with('"') && text.ends_with('"'), UnterminatedLiteralSnafu);
    let inner = &text[1..text.len() - 1];
    let mut bytes = Vec::new();
    let mut chars = inner.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(next) = chars.next() {
                bytes.push(unescape_char(&format!("\\{next}")).unwrap_or(next as u8));
                continue;
            }
        }
        bytes.push(c as u8);
    }
    Ok(bytes)
}

/// Parses a decimal, `0x` hex, or leading-zero octal integer literal. Accepts an optional leading
/// `-` for use in signed contexts (e.g. register-indexed increments are parsed separately).
pub fn parse_integer(text: &str) -> Result<i64> {
    let (neg, text) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text),
    };
    let value = if let Some(hex) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        i64::from_str_radix(hex, 16).map_err(|_| LineError::BadLiteral { text: text.to_owned() })?
    } else if text.len() > 1 && text.starts_with('0') && text.bytes().all(|b| b.is_ascii_digit()) {
        i64::from_str_radix(&text[1..], 8).map_err(|_| LineError::BadLiteral { text: text.to_owned() })?
    } else {
        text.parse::<i64>().map_err(|_| LineError::BadLiteral { text: text.to_owned() })?
    };
    Ok(if neg { -value } else { value })
}

/// Parses any scalar literal (integer or character) that can stand in for a byte/word value.
pub fn parse_scalar(text: &str) -> Result<i64> {
    if text.starts_with('\'') {
        parse_char_literal(text).map(i64::from)
    } else {
        parse_integer(text)
    }
}

/// A register-indexed operand: `[++X]` (pre-increment by 2), `[X--]` (post-decrement by 1), etc.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexedOperand {
    pub register: Register,
    pub pre_increment: bool,
    /// Signed adjustment amount, always `+-1` or `+-2`.
    pub amount: i8,
}

impl IndexedOperand {
    /// The post-byte: bit 7 set for pre-increment, low seven bits the two's-complement amount.
    #[must_use]
    pub fn post_byte(&self) -> u8 {
        let flags = if self.pre_increment { 0x80 } else { 0x00 };
        let magnitude = (self.amount as i32 & 0x7F) as u8;
        flags | magnitude
    }
}

/// Parses the bracketed register-indexed syntax `[ ++X ]` / `[ X-- ]` (brackets from [`tokenize`]
/// are still attached).
pub fn parse_indexed_operand(text: &str) -> Result<IndexedOperand> {
    let inner = text.strip_prefix('[').and_then(|s| s.strip_suffix(']')).unwrap_or(text).trim();
    let bad = || LineError::BadIndexedOperand { text: text.to_owned() };

    let sign_run = |s: &str| -> (usize, i8) {
        let c = s.chars().next();
        match c {
            Some('+') => (s.chars().take_while(|&c| c == '+').count(), 1),
            Some('-') => (s.chars().take_while(|&c| c == '-').count(), -1),
            _ => (0, 0),
        }
    };

    let (count, sign) = sign_run(inner);
    if count > 0 && (count == 1 || count == 2) {
        let reg_name = &inner[count..];
        let register = Register::from_name(reg_name.trim()).ok_or_else(bad)?;
        return Ok(IndexedOperand { register, pre_increment: true, amount: sign * count as i8 });
    }

    // Otherwise look for a trailing run of `+`/`-` after the register name.
    let trimmed_end = inner.trim_end_matches(['+', '-']);
    let suffix = &inner[trimmed_end.len()..];
    let (count, sign) = sign_run_from_end(suffix);
    if count == 1 || count == 2 {
        let register = Register::from_name(trimmed_end.trim()).ok_or_else(bad)?;
        return Ok(IndexedOperand { register, pre_increment: false, amount: sign * count as i8 });
    }

    Err(bad())
}

fn sign_run_from_end(suffix: &str) -> (usize, i8) {
    let c = suffix.chars().next();
    match c {
        Some('+') => (suffix.len(), 1),
        Some('-') => (suffix.len(), -1),
        _ => (0, 0),
    }
}

/// Determines whether a tokenized line could plausibly be a `.data` continuation line: a bare
/// sequence of byte literals with no directive/label/mnemonic shape.
#[must_use]
pub fn looks_like_byte_array(tokens: &[String]) -> bool {
    let Some(first) = tokens.first() else { return false };
    if first.starts_with('.') || first.ends_with(':') {
        return false;
    }
    if first.starts_with('"') || first.starts_with('\'') {
        return true;
    }
    parse_integer(first).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenizes_quoted_strings_as_one_token() {
        let tokens = tokenize(r#".data HELLO "Hi""#);
        assert_eq!(tokens, vec![".data", "HELLO", "\"Hi\""]);
    }

    #[test]
    fn parses_hex_octal_and_decimal() {
        assert_eq!(parse_integer("0x10").unwrap(), 16);
        assert_eq!(parse_integer("010").unwrap(), 8);
        assert_eq!(parse_integer("10").unwrap(), 10);
        assert_eq!(parse_integer("-1").unwrap(), -1);
    }

    #[test]
    fn parses_char_literal_escapes() {
        assert_eq!(parse_char_literal("'\\n'").unwrap(), b'\n');
        assert_eq!(parse_char_literal("'H'").unwrap(), b'H');
    }

    #[test]
    fn parses_string_literal_bytes() {
        assert_eq!(parse_string_literal("\"Hi\"").unwrap(), vec![b'H', b'i']);
    }

    #[test]
    fn parses_pre_and_post_increment_indexed_operands() {
        let pre = parse_indexed_operand("[++X]").unwrap();
        assert!(pre.pre_increment);
        assert_eq!(pre.amount, 2);
        assert_eq!(pre.register, Register::X);

        let post = parse_indexed_operand("[DP--]").unwrap();
        assert!(!post.pre_increment);
        assert_eq!(post.amount, -1);
        assert_eq!(post.register, Register::Dp);
    }

    #[test]
    fn post_byte_packs_flags_and_magnitude() {
        let pre_plus_two = IndexedOperand { register: Register::X, pre_increment: true, amount: 2 };
        assert_eq!(pre_plus_two.post_byte(), 0x82);
        let post_minus_one = IndexedOperand { register: Register::Dp, pre_increment: false, amount: -1 };
        assert_eq!(post_minus_one.post_byte(), 0x7F);
    }
}
