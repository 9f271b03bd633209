//! Composite index keys.
//!
//! A key is an ordered tuple of scalar values, each tagged with the index
//! field's direction. Descending positions invert the comparison locally;
//! the full comparator stays lexicographic. A shorter key orders before any
//! longer key it prefixes, which lets equality-prefix scans seed a range
//! lookup with a partial key.

use std::cmp::Ordering;

use smallvec::SmallVec;

use crate::model::Value;
use crate::schema::Direction;

/// One key position: a value compared under the field's direction.
#[derive(Clone, Debug)]
pub struct KeyPart {
    /// The indexed value at this position.
    pub value: Value,
    /// Comparison direction for this position.
    pub direction: Direction,
}

impl KeyPart {
    /// Builds a part for an ascending position.
    pub fn asc(value: Value) -> Self {
        Self {
            value,
            direction: Direction::Asc,
        }
    }
}

impl PartialEq for KeyPart {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
    }
}

impl Eq for KeyPart {}

impl PartialOrd for KeyPart {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for KeyPart {
    fn cmp(&self, other: &Self) -> Ordering {
        match self.direction {
            Direction::Asc => self.value.cmp(&other.value),
            Direction::Desc => other.value.cmp(&self.value),
        }
    }
}

/// A composite key: the ordered tuple of per-position parts.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct IndexKey(pub SmallVec<[KeyPart; 4]>);

impl IndexKey {
    /// Builds a key from already-tagged parts.
    pub fn new(parts: SmallVec<[KeyPart; 4]>) -> Self {
        Self(parts)
    }

    /// Number of positions.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True when the key has no positions.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// True when `prefix` matches this key's leading positions.
    pub fn starts_with(&self, prefix: &IndexKey) -> bool {
        prefix.0.len() <= self.0.len()
            && self.0[..prefix.0.len()]
                .iter()
                .zip(prefix.0.iter())
                .all(|(a, b)| a == b)
    }
}
