use std::collections::BTreeMap;

use indexmap::IndexMap;

use crate::types::{Token, TokenId};

/// Bag-of-words document: `(token id, count)` pairs in ascending id order.
pub type BowDocument = Vec<(TokenId, u32)>;

/// Bidirectional token↔id mapping with dense ids in first-seen order.
///
/// Id assignment is purely a function of insertion order, so rebuilding from
/// the same ordered vocabulary rows reproduces the same mapping. The mapping
/// is owned by the training stage for the duration of one run and is never
/// persisted on its own; the model bundle stores its own copy.
#[derive(Clone, Debug, Default)]
pub struct Dictionary {
    index: IndexMap<Token, TokenId>,
}

impl Dictionary {
    /// Empty dictionary.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from tokens in order; duplicates keep their first-seen id.
    pub fn from_ordered_tokens<I>(tokens: I) -> Self
    where
        I: IntoIterator<Item = Token>,
    {
        let mut dictionary = Self::new();
        for token in tokens {
            dictionary.insert(token);
        }
        dictionary
    }

    /// Intern `token`, returning its dense id.
    pub fn insert(&mut self, token: Token) -> TokenId {
        let next_id = self.index.len() as TokenId;
        *self.index.entry(token).or_insert(next_id)
    }

    /// Number of distinct tokens.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    /// True when no token has been interned.
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Id of `token`, if known.
    pub fn id_of(&self, token: &str) -> Option<TokenId> {
        self.index.get(token).copied()
    }

    /// Token for `id`, if assigned.
    pub fn token_of(&self, id: TokenId) -> Option<&str> {
        self.index
            .get_index(id as usize)
            .map(|(token, _)| token.as_str())
    }

    /// All tokens in id order.
    pub fn tokens(&self) -> Vec<Token> {
        self.index.keys().cloned().collect()
    }

    /// Convert one record's token fields into a bag-of-words document.
    ///
    /// Unknown tokens are dropped, not erred; topic modeling tolerates
    /// vocabulary mismatch. Counts are aggregated and ordered by id.
    pub fn doc_to_bow(&self, tokens: &[Token]) -> BowDocument {
        let mut counts: BTreeMap<TokenId, u32> = BTreeMap::new();
        for token in tokens {
            if let Some(id) = self.id_of(token) {
                *counts.entry(id).or_insert(0) += 1;
            }
        }
        counts.into_iter().collect()
    }
}
