//! Character storage.
//!
//! The document layer talks to its text through [`CharStore`]. The default
//! implementation, [`TextBuffer`], keeps the text in a ropey rope.

use crate::error::{Error, Result};
use ropey::Rope;
use std::fs;
use std::io::{self, BufReader};
use std::path::Path;

/// Random-access character store addressed by character offset.
pub trait CharStore {
    /// Number of characters stored.
    fn len(&self) -> usize;

    /// Returns true if nothing is stored.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copies `len` characters starting at `offset`.
    fn read(&self, offset: usize, len: usize) -> Result<String>;

    /// Copies `len` characters starting at `offset` into `out`, replacing its
    /// contents.
    fn read_chars(&self, offset: usize, len: usize, out: &mut Vec<char>) -> Result<()> {
        out.clear();
        out.extend(self.read(offset, len)?.chars());
        Ok(())
    }

    /// Inserts `text` before the character at `offset`.
    fn insert_chars(&mut self, offset: usize, text: &str) -> Result<()>;

    /// Removes `len` characters starting at `offset`.
    fn remove_chars(&mut self, offset: usize, len: usize) -> Result<()>;

    /// Offset of the first `pattern` in `start..limit`.
    fn find_forward(&self, pattern: char, start: usize, limit: usize) -> Option<usize>;

    /// Offset of the last `pattern` in `limit..start`.
    fn find_backward(&self, pattern: char, start: usize, limit: usize) -> Option<usize>;
}

/// A text buffer backed by a rope data structure.
#[derive(Debug, Clone)]
pub struct TextBuffer {
    rope: Rope,
}

impl Default for TextBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl TextBuffer {
    /// Creates a new empty text buffer.
    pub fn new() -> Self {
        Self { rope: Rope::new() }
    }

    /// Creates a text buffer from a string.
    pub fn from_str(text: &str) -> Self {
        Self {
            rope: Rope::from_str(text),
        }
    }

    /// Loads a text buffer from a file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let file = fs::File::open(path)?;
        let rope = Rope::from_reader(BufReader::new(file))?;
        Ok(Self { rope })
    }

    /// Returns the character at the given index, if it exists.
    pub fn char_at(&self, char_idx: usize) -> Option<char> {
        self.rope.get_char(char_idx)
    }

    /// Returns the entire buffer as a string.
    pub fn to_string(&self) -> String {
        self.rope.to_string()
    }

    fn check_range(&self, offset: usize, len: usize) -> Result<usize> {
        let limit = self.rope.len_chars();
        match offset.checked_add(len) {
            Some(end) if end <= limit => Ok(end),
            _ => Err(Error::BadLocation {
                offset: offset.saturating_add(len),
                limit,
            }),
        }
    }
}

impl CharStore for TextBuffer {
    fn len(&self) -> usize {
        self.rope.len_chars()
    }

    fn read(&self, offset: usize, len: usize) -> Result<String> {
        let end = self.check_range(offset, len)?;
        Ok(self.rope.slice(offset..end).to_string())
    }

    fn read_chars(&self, offset: usize, len: usize, out: &mut Vec<char>) -> Result<()> {
        let end = self.check_range(offset, len)?;
        out.clear();
        out.extend(self.rope.slice(offset..end).chars());
        Ok(())
    }

    fn insert_chars(&mut self, offset: usize, text: &str) -> Result<()> {
        self.check_range(offset, 0)?;
        self.rope.insert(offset, text);
        Ok(())
    }

    fn remove_chars(&mut self, offset: usize, len: usize) -> Result<()> {
        let end = self.check_range(offset, len)?;
        if len > 0 {
            self.rope.remove(offset..end);
        }
        Ok(())
    }

    fn find_forward(&self, pattern: char, start: usize, limit: usize) -> Option<usize> {
        let limit = limit.min(self.rope.len_chars());
        if start >= limit {
            return None;
        }
        self.rope
            .chars_at(start)
            .take(limit - start)
            .position(|c| c == pattern)
            .map(|i| start + i)
    }

    fn find_backward(&self, pattern: char, start: usize, limit: usize) -> Option<usize> {
        let mut pos = start.min(self.rope.len_chars());
        let mut chars = self.rope.chars_at(pos);
        while pos > limit {
            let c = chars.prev()?;
            pos -= 1;
            if c == pattern {
                return Some(pos);
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_buffer() {
        let buf = TextBuffer::new();
        assert!(buf.is_empty());
        assert_eq!(buf.len(), 0);
    }

    #[test]
    fn test_insert_and_read() {
        let mut buf = TextBuffer::from_str("hello world");
        buf.insert_chars(5, ",").unwrap();
        assert_eq!(buf.to_string(), "hello, world");
        assert_eq!(buf.read(7, 5).unwrap(), "world");
        assert_eq!(buf.char_at(5), Some(','));
        assert_eq!(buf.char_at(12), None);
    }

    #[test]
    fn test_read_chars_counts_characters() {
        let buf = TextBuffer::from_str("héllo\nwörld");
        let mut out = Vec::new();
        buf.read_chars(6, 5, &mut out).unwrap();
        assert_eq!(out.iter().collect::<String>(), "wörld");
    }

    #[test]
    fn test_remove() {
        let mut buf = TextBuffer::from_str("hello world");
        buf.remove_chars(5, 6).unwrap();
        assert_eq!(buf.to_string(), "hello");
        buf.remove_chars(5, 0).unwrap();
        assert_eq!(buf.len(), 5);
    }

    #[test]
    fn test_out_of_range() {
        let mut buf = TextBuffer::from_str("abc");
        assert_eq!(
            buf.read(2, 2),
            Err(Error::BadLocation { offset: 4, limit: 3 })
        );
        assert!(buf.insert_chars(4, "x").is_err());
        assert!(buf.remove_chars(1, 5).is_err());
        assert_eq!(buf.to_string(), "abc");
    }

    #[test]
    fn test_find() {
        let buf = TextBuffer::from_str("ab\ncd\nef");
        assert_eq!(buf.find_forward('\n', 0, 8), Some(2));
        assert_eq!(buf.find_forward('\n', 3, 8), Some(5));
        assert_eq!(buf.find_forward('\n', 3, 5), None);
        assert_eq!(buf.find_forward('\n', 6, 100), None);

        assert_eq!(buf.find_backward('\n', 8, 0), Some(5));
        assert_eq!(buf.find_backward('\n', 5, 0), Some(2));
        assert_eq!(buf.find_backward('\n', 5, 3), None);
        assert_eq!(buf.find_backward('\n', 2, 0), None);
    }
}
