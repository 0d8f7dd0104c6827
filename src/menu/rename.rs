/// Characters offered while renaming, in cursor order. The commit entry
/// follows the last character.
pub const RENAME_CHARS: &str =
    " ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789_-";
pub const COMMIT_LABEL: &str = "OK";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenameEntry {
    Char(char),
    Commit,
}

impl RenameEntry {
    pub fn label(&self) -> String {
        match self {
            RenameEntry::Char(c) => c.to_string(),
            RenameEntry::Commit => COMMIT_LABEL.to_owned(),
        }
    }
}

fn alphabet_len() -> usize {
    RENAME_CHARS.chars().count() + 1
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RenameBuffer {
    text: String,
    cursor: usize,
}

impl RenameBuffer {
    pub fn new(text: &str) -> Self {
        Self {
            text: text.to_owned(),
            cursor: 0,
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn current(&self) -> RenameEntry {
        RENAME_CHARS
            .chars()
            .nth(self.cursor)
            .map_or(RenameEntry::Commit, RenameEntry::Char)
    }

    /// Moves the cursor, wrapping around at both ends of the alphabet.
    pub fn move_cursor(&mut self, delta: isize) {
        let len = alphabet_len() as isize;
        self.cursor = (self.cursor as isize + delta).rem_euclid(len) as usize;
    }

    pub fn push(&mut self, c: char) {
        self.text.push(c);
    }

    /// Removes the last character. Returns `false` if there was none.
    pub fn pop(&mut self) -> bool {
        self.text.pop().is_some()
    }
}
