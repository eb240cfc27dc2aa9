//! Parser for the runtime's key-list text
//!
//! The runtime answers key enumeration with a JSON-style array of strings.
//! Parsing is lenient and never fails: anything unexpected ends the list and
//! the strings collected so far are returned.

use std::iter::Peekable;
use std::str::Chars;

fn skip_whitespace(chars: &mut Peekable<Chars<'_>>) {
    while chars.next_if(|c| matches!(c, ' ' | '\t' | '\r' | '\n')).is_some() {}
}

/// Four hex digits of a `\u` escape. Consumes nothing unless all four are
/// present.
fn read_hex4(chars: &mut Peekable<Chars<'_>>) -> Option<u32> {
    let mut lookahead = chars.clone();
    let mut code = 0;
    for _ in 0..4 {
        code = code * 16 + lookahead.next()?.to_digit(16)?;
    }
    *chars = lookahead;
    Some(code)
}

/// The character a `\u` escape stands for, joining surrogate pairs. Broken
/// escapes decode to U+FFFD.
fn read_unicode_escape(chars: &mut Peekable<Chars<'_>>) -> char {
    let Some(high) = read_hex4(chars) else {
        return char::REPLACEMENT_CHARACTER;
    };
    if !(0xD800..0xDC00).contains(&high) {
        return char::from_u32(high).unwrap_or(char::REPLACEMENT_CHARACTER);
    }
    let mut lookahead = chars.clone();
    if lookahead.next() == Some('\\') && lookahead.next() == Some('u') {
        if let Some(low @ 0xDC00..0xE000) = read_hex4(&mut lookahead) {
            *chars = lookahead;
            let code = 0x10000 + ((high - 0xD800) << 10) + (low - 0xDC00);
            return char::from_u32(code).unwrap_or(char::REPLACEMENT_CHARACTER);
        }
    }
    char::REPLACEMENT_CHARACTER
}

/// Body of a quoted string after its opening quote. Returns the text and
/// whether the closing quote was found.
fn read_string(chars: &mut Peekable<Chars<'_>>) -> (String, bool) {
    let mut out = String::new();
    while let Some(c) = chars.next() {
        match c {
            '"' => return (out, true),
            '\\' => match chars.next() {
                Some('n') => out.push('\n'),
                Some('r') => out.push('\r'),
                Some('t') => out.push('\t'),
                Some('b') => out.push('\u{8}'),
                Some('f') => out.push('\u{c}'),
                Some('u') => out.push(read_unicode_escape(chars)),
                // `\\`, `\"`, `\/` and any other escape: the character itself.
                Some(other) => out.push(other),
                None => break,
            },
            c => out.push(c),
        }
    }
    (out, false)
}

/// Parse `["a", "b", ...]` into its strings.
pub fn parse_key_list(text: &str) -> Vec<String> {
    let mut keys = Vec::new();
    let mut chars = text.chars().peekable();

    skip_whitespace(&mut chars);
    if chars.next() != Some('[') {
        return keys;
    }
    loop {
        skip_whitespace(&mut chars);
        match chars.next() {
            Some('"') => {
                let (key, closed) = read_string(&mut chars);
                keys.push(key);
                if !closed {
                    return keys;
                }
            }
            _ => return keys,
        }
        skip_whitespace(&mut chars);
        match chars.next() {
            Some(',') => continue,
            _ => return keys,
        }
    }
}
