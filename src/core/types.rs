use serde::{Deserialize, Serialize};
use crate::core::error::{Error, ErrorKind, Result};

/// Appended to every stored key to mark the end of a word
pub const TERMINATOR: u8 = 0xFF;

/// Indexed keys are raw byte strings
pub type Key = Vec<u8>;

/// Shard number inside one trie directory
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PartId(pub u32);

impl PartId {
    pub fn value(&self) -> u32 {
        self.0
    }

    pub fn next(&self) -> PartId {
        PartId(self.0 + 1)
    }
}

impl From<u32> for PartId {
    fn from(id: u32) -> Self {
        PartId(id)
    }
}

/// Edit budget for one side of a search
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EditBudget {
    pub max_edits: usize,
    /// Accept only matches at exactly `max_edits`
    pub exact: bool,
}

impl EditBudget {
    pub fn within(max_edits: usize) -> Self {
        EditBudget { max_edits, exact: false }
    }

    pub fn exactly(max_edits: usize) -> Self {
        EditBudget { max_edits, exact: true }
    }

    pub fn accepts(&self, distance: usize) -> bool {
        if self.exact {
            distance == self.max_edits
        } else {
            distance <= self.max_edits
        }
    }
}

pub fn validate_key(key: &[u8]) -> Result<()> {
    if key.contains(&TERMINATOR) {
        return Err(Error::new(
            ErrorKind::InvalidInput,
            format!("Key {:?} contains the reserved terminator byte", String::from_utf8_lossy(key)),
        ));
    }
    Ok(())
}

pub fn with_terminator(key: &[u8]) -> Key {
    let mut word = Vec::with_capacity(key.len() + 1);
    word.extend_from_slice(key);
    word.push(TERMINATOR);
    word
}

/// Key as stored in the reverse trie; the terminator is appended later
pub fn reversed(key: &[u8]) -> Key {
    key.iter().rev().copied().collect()
}

pub fn strip_terminator(word: &[u8]) -> &[u8] {
    match word.split_last() {
        Some((&TERMINATOR, body)) => body,
        _ => word,
    }
}
