use std::collections::HashMap;

use super::*;

/// Maps raw key sequences (as read from a terminal) to editing operations.
///
/// The default table follows the usual readline/emacs keys.
#[derive(Clone)]
pub struct Bindings {
    keys: HashMap<String, EditFn>,
}

impl Default for Bindings {
    fn default() -> Self {
        let table: [(&str, EditFn); 22] = [
            ("\x02", left_arrow),
            ("\x1b[D", left_arrow),
            ("\x06", right_arrow),
            ("\x1b[C", right_arrow),
            ("\x01", beginning_of_line),
            ("\x1b[H", beginning_of_line),
            ("\x05", end_of_line),
            ("\x1b[F", end_of_line),
            ("\x1bf", forward_word),
            ("\x1bb", back_word),
            ("\x04", delete),
            ("\x1b[3~", delete),
            ("\x7f", backspace),
            ("\x08", backspace),
            ("\x15", delete_from_cursor_back),
            ("\x0b", delete_from_cursor_forward),
            ("\x1bd", delete_rest_of_word),
            ("\x17", delete_word_to_cursor),
            ("\x1b\x7f", delete_word_from_cursor_back),
            ("\x1b\x08", delete_word_from_cursor_back),
            ("\x14", transpose_character_before_cursor),
            ("\x1b[1~", beginning_of_line),
        ];

        Self {
            keys: table
                .into_iter()
                .map(|(seq, edit)| (seq.to_string(), edit))
                .collect(),
        }
    }
}

impl Bindings {
    /// A table with no bindings at all.
    pub fn empty() -> Self {
        Self {
            keys: HashMap::new(),
        }
    }

    /// Bind `seq` to `edit`, returning the operation it replaces.
    pub fn bind(&mut self, seq: impl Into<String>, edit: EditFn) -> Option<EditFn> {
        self.keys.insert(seq.into(), edit)
    }

    /// Remove the binding for `seq`.
    pub fn unbind(&mut self, seq: &str) -> Option<EditFn> {
        self.keys.remove(seq)
    }

    /// The operation bound to `seq`.
    pub fn get(&self, seq: &str) -> Option<EditFn> {
        self.keys.get(seq).copied()
    }

    /// Apply the operation bound to `seq`, or `None` if the key is unbound.
    pub fn apply(&self, seq: &str, cursor: usize, text: &str) -> Option<(usize, String)> {
        self.get(seq).map(|edit| edit(cursor, text))
    }

    /// Number of bound sequences.
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Whether nothing is bound.
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

impl std::fmt::Debug for Bindings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut keys: Vec<&String> = self.keys.keys().collect();
        keys.sort();
        f.debug_struct("Bindings").field("keys", &keys).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_keys() {
        let bindings = Bindings::default();
        assert_eq!(bindings.apply("\x01", 4, "abcd"), Some((0, "abcd".to_string())));
        assert_eq!(bindings.apply("\x7f", 2, "as"), Some((1, "a".to_string())));
        assert_eq!(
            bindings.apply("\x14", 2, "asdf"),
            Some((3, "adsf".to_string()))
        );
        assert_eq!(bindings.apply("\x1bz", 0, "abc"), None);
    }

    #[test]
    fn test_rebind() {
        let mut bindings = Bindings::empty();
        assert!(bindings.is_empty());
        assert!(bindings.bind("\x01", end_of_line).is_none());
        assert_eq!(bindings.apply("\x01", 0, "ab"), Some((2, "ab".to_string())));
        assert!(bindings.unbind("\x01").is_some());
        assert_eq!(bindings.len(), 0);
    }
}
