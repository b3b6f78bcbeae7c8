//! Token ⇄ dense id vocabularies with a reserved padding slot.

use std::collections::HashMap;

/// Token stored at id 0 of every vocabulary.
pub const PAD_TOKEN: &str = "[PAD]";

/// Dense id assignment for raw tokens.
///
/// Id 0 is the padding slot; real tokens get ids `1..len()` in first-seen
/// order. Embedding tables are sized with [`Vocab::len`], so the padding
/// row is always present.
#[derive(Debug, Clone)]
pub struct Vocab {
    tokens: Vec<String>,
    ids: HashMap<String, u32>,
}

impl Default for Vocab {
    fn default() -> Self {
        Self::new()
    }
}

impl Vocab {
    pub fn new() -> Self {
        Self {
            tokens: vec![PAD_TOKEN.to_string()],
            ids: HashMap::new(),
        }
    }

    /// Return the id of `token`, assigning the next free id on first sight.
    pub fn get_or_insert(&mut self, token: &str) -> u32 {
        if let Some(&id) = self.ids.get(token) {
            return id;
        }
        let id = self.tokens.len() as u32;
        self.tokens.push(token.to_string());
        self.ids.insert(token.to_string(), id);
        id
    }

    pub fn id(&self, token: &str) -> Option<u32> {
        self.ids.get(token).copied()
    }

    pub fn token(&self, id: u32) -> Option<&str> {
        if id == 0 {
            return None;
        }
        self.tokens.get(id as usize).map(String::as_str)
    }

    /// Table size including the padding slot.
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    /// True when only the padding slot exists.
    pub fn is_empty(&self) -> bool {
        self.tokens.len() == 1
    }

    /// Iterate `(id, token)` over real tokens, skipping padding.
    pub fn iter(&self) -> impl Iterator<Item = (u32, &str)> {
        self.tokens
            .iter()
            .enumerate()
            .skip(1)
            .map(|(i, t)| (i as u32, t.as_str()))
    }
}
