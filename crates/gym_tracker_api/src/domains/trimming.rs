//! Fit training history into the prompt's token budget.

use std::io;

use serde::Serialize;
use serde_json::ser::{Formatter, Serializer};

/// Bytes of serialized JSON per estimated token.
pub const BYTES_PER_TOKEN: usize = 4;

/// Single-line JSON with `", "` / `": "` separators and ASCII-only strings.
///
/// Budgets were tuned against this layout, so the estimate keeps it.
struct SpacedAsciiFormatter;

impl Formatter for SpacedAsciiFormatter {
    fn begin_array_value<W: ?Sized + io::Write>(
        &mut self,
        writer: &mut W,
        first: bool,
    ) -> io::Result<()> {
        if first { Ok(()) } else { writer.write_all(b", ") }
    }

    fn begin_object_key<W: ?Sized + io::Write>(
        &mut self,
        writer: &mut W,
        first: bool,
    ) -> io::Result<()> {
        if first { Ok(()) } else { writer.write_all(b", ") }
    }

    fn begin_object_value<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        writer.write_all(b": ")
    }

    fn write_string_fragment<W: ?Sized + io::Write>(
        &mut self,
        writer: &mut W,
        fragment: &str,
    ) -> io::Result<()> {
        for ch in fragment.chars() {
            if ch.is_ascii() {
                writer.write_all(&[ch as u8])?;
            } else {
                let mut units = [0u16; 2];
                for unit in ch.encode_utf16(&mut units) {
                    write!(writer, "\\u{:04x}", unit)?;
                }
            }
        }
        Ok(())
    }
}

/// Length in bytes of `item` rendered by [`SpacedAsciiFormatter`].
pub fn serialized_len<T: Serialize>(item: &T) -> usize {
    let mut buf = Vec::new();
    let mut ser = Serializer::with_formatter(&mut buf, SpacedAsciiFormatter);
    match item.serialize(&mut ser) {
        Ok(()) => buf.len(),
        Err(_) => 0,
    }
}

/// Coarse token estimate from the serialized JSON length.
pub fn estimate_tokens<T: Serialize>(item: &T) -> usize {
    serialized_len(item) / BYTES_PER_TOKEN
}

/// Keep the longest run of most-recent items whose estimated cost fits `budget`.
///
/// Items are ordered oldest first. The scan walks backwards from the newest
/// item and stops at the first one that would overflow the budget, so the
/// result is always a suffix of `items` in its original order. Single items
/// are never truncated: an oversized newest item yields an empty result.
pub fn trim_to_token_budget<T: Serialize + Clone>(items: &[T], budget: i64) -> Vec<T> {
    let mut used: i64 = 0;
    let mut start = items.len();
    for (idx, item) in items.iter().enumerate().rev() {
        let cost = estimate_tokens(item) as i64;
        if used + cost > budget {
            break;
        }
        used += cost;
        start = idx;
    }
    items[start..].to_vec()
}
