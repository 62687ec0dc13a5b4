//! Incremental line splitting for text streams.

/// Split `text` into complete lines, returning them together with the
/// unterminated remainder.
///
/// `\n`, `\r\n` and a bare `\r` all end a line and are stripped. A `\r` at the
/// very end of `text` ends the last line; if the next chunk starts with `\n`
/// it belongs to that `\r`, and the caller must drop it before calling again
/// (see [`ends_with_cr`]). Callers prepend the remainder to the next chunk.
pub fn split_lines(text: &str) -> (Vec<&str>, &str) {
    let bytes = text.as_bytes();
    let mut lines = Vec::new();
    let mut start = 0;
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'\n' => {
                lines.push(&text[start..i]);
                i += 1;
                start = i;
            }
            b'\r' => {
                lines.push(&text[start..i]);
                i += if bytes.get(i + 1) == Some(&b'\n') { 2 } else { 1 };
                start = i;
            }
            _ => i += 1,
        }
    }

    (lines, &text[start..])
}

/// Whether `text` ends in a `\r` that [`split_lines`] treated as a complete
/// terminator, so a `\n` opening the next chunk must be skipped.
pub fn ends_with_cr(text: &str) -> bool {
    text.ends_with('\r')
}
