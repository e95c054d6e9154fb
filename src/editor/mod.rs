//! Pure line-editing operations.
//!
//! Every operation maps `(cursor, text)` to a new `(cursor, text)` without
//! touching anything else. Cursors count `char`s, not bytes; a cursor past
//! the end is treated as being at the end. Operations that have nothing to
//! do at a boundary return their input unchanged.

/// Key sequence to operation table.
pub mod bindings;

pub use bindings::Bindings;

/// Signature shared by all editing operations.
pub type EditFn = fn(usize, &str) -> (usize, String);

fn char_len(text: &str) -> usize {
    text.chars().count()
}

fn clamp(cursor: usize, text: &str) -> usize {
    cursor.min(char_len(text))
}

/// Byte offset of the `index`th char (or the end of `text`).
fn byte_offset(text: &str, index: usize) -> usize {
    text.char_indices()
        .nth(index)
        .map(|(offset, _)| offset)
        .unwrap_or(text.len())
}

fn is_word_char(ch: char) -> bool {
    ch == '_' || ch.is_alphanumeric()
}

/// Remove chars `start..end` from `text`.
fn splice(text: &str, start: usize, end: usize) -> String {
    let mut out = String::with_capacity(text.len());
    out.push_str(&text[..byte_offset(text, start)]);
    out.push_str(&text[byte_offset(text, end)..]);
    out
}

/// Move one char left.
pub fn left_arrow(cursor: usize, text: &str) -> (usize, String) {
    (clamp(cursor, text).saturating_sub(1), text.to_string())
}

/// Move one char right.
pub fn right_arrow(cursor: usize, text: &str) -> (usize, String) {
    ((cursor.saturating_add(1)).min(char_len(text)), text.to_string())
}

/// Move to the start of the line.
pub fn beginning_of_line(_cursor: usize, text: &str) -> (usize, String) {
    (0, text.to_string())
}

/// Move to the end of the line.
pub fn end_of_line(_cursor: usize, text: &str) -> (usize, String) {
    (char_len(text), text.to_string())
}

/// Move to just past the end of the next whitespace-delimited word.
pub fn forward_word(cursor: usize, text: &str) -> (usize, String) {
    let cursor = clamp(cursor, text);
    let mut rest: Vec<char> = text.chars().skip(cursor).collect();
    rest.push(' ');

    let delta = rest
        .windows(2)
        .position(|pair| !pair[0].is_whitespace() && pair[1].is_whitespace())
        .map(|index| index + 1)
        .unwrap_or(0);

    (cursor + delta, text.to_string())
}

/// Move to the start of the whitespace-delimited word before the cursor.
pub fn back_word(cursor: usize, text: &str) -> (usize, String) {
    let cursor = clamp(cursor, text);
    let before = &text[..byte_offset(text, cursor)];
    (last_word_pos(before), text.to_string())
}

/// Index of the start of the last whitespace-delimited word in `text`.
///
/// A word at the very start of `text` (or no word at all) gives 0.
pub fn last_word_pos(text: &str) -> usize {
    let chars: Vec<char> = text.chars().collect();
    (1..chars.len())
        .rev()
        .find(|&index| !chars[index].is_whitespace() && chars[index - 1].is_whitespace())
        .unwrap_or(0)
}

/// Delete the char under the cursor.
pub fn delete(cursor: usize, text: &str) -> (usize, String) {
    let cursor = clamp(cursor, text);
    if cursor >= char_len(text) {
        return (cursor, text.to_string());
    }
    (cursor, splice(text, cursor, cursor + 1))
}

/// Delete the char before the cursor.
pub fn backspace(cursor: usize, text: &str) -> (usize, String) {
    let cursor = clamp(cursor, text);
    if cursor == 0 {
        return (0, text.to_string());
    }
    (cursor - 1, splice(text, cursor - 1, cursor))
}

/// Delete everything before the cursor.
pub fn delete_from_cursor_back(cursor: usize, text: &str) -> (usize, String) {
    let cursor = clamp(cursor, text);
    (0, text[byte_offset(text, cursor)..].to_string())
}

/// Delete everything from the cursor on.
pub fn delete_from_cursor_forward(cursor: usize, text: &str) -> (usize, String) {
    let cursor = clamp(cursor, text);
    (cursor, text[..byte_offset(text, cursor)].to_string())
}

/// Delete from the cursor through the end of the next run of word chars.
pub fn delete_rest_of_word(cursor: usize, text: &str) -> (usize, String) {
    let cursor = clamp(cursor, text);
    let rest: Vec<char> = text.chars().skip(cursor).collect();

    let word_end = (0..rest.len())
        .find(|&index| is_word_char(rest[index]) && !rest.get(index + 1).is_some_and(|&ch| is_word_char(ch)));

    match word_end {
        Some(index) => (cursor, splice(text, cursor, cursor + index + 1)),
        None => (cursor, text.to_string()),
    }
}

/// Delete back to the start of the whitespace-delimited word before the cursor.
pub fn delete_word_to_cursor(cursor: usize, text: &str) -> (usize, String) {
    let cursor = clamp(cursor, text);
    let before: Vec<char> = text.chars().take(cursor).collect();

    let start = before
        .windows(2)
        .rposition(|pair| pair[0].is_whitespace() && !pair[1].is_whitespace())
        .map(|index| index + 1)
        .unwrap_or(0);

    (start, splice(text, start, cursor))
}

/// Delete back to the start of the last run of word chars before the cursor.
pub fn delete_word_from_cursor_back(cursor: usize, text: &str) -> (usize, String) {
    let cursor = clamp(cursor, text);
    let chars: Vec<char> = text.chars().collect();

    let start = (0..cursor)
        .rev()
        .find(|&index| is_word_char(chars[index]) && (index == 0 || !is_word_char(chars[index - 1])));

    match start {
        Some(start) => (start, splice(text, start, cursor)),
        None => (cursor, text.to_string()),
    }
}

/// Swap the char before the cursor with the one under it, then advance.
pub fn transpose_character_before_cursor(cursor: usize, text: &str) -> (usize, String) {
    let cursor = clamp(cursor, text);
    let mut chars: Vec<char> = text.chars().collect();
    if cursor == 0 || cursor >= chars.len() {
        return (cursor, text.to_string());
    }
    chars.swap(cursor - 1, cursor);
    (cursor + 1, chars.into_iter().collect())
}
