use serde::{Deserialize, Serialize};
use std::fmt::{self, Debug, Formatter};
use std::ops::{BitAnd, BitOr, BitOrAssign, Sub};

use crate::ExtendedItem;

const WORD_BITS: usize = 64;

/// Set of extended items, stored as a bitset keyed by item id.
///
/// The word vector never ends in a zero word, so two inventories holding the same items
/// always compare (and hash) equal regardless of how they were built.
#[derive(Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "Vec<ExtendedItem>", into = "Vec<ExtendedItem>")]
pub struct Inventory {
    words: Vec<u64>,
}

impl Inventory {
    pub fn new() -> Self {
        Inventory { words: vec![] }
    }

    pub fn single(item: ExtendedItem) -> Self {
        let mut out = Inventory::new();
        out.insert(item);
        out
    }

    pub fn contains(&self, item: ExtendedItem) -> bool {
        match self.words.get(item / WORD_BITS) {
            Some(&w) => w & (1 << (item % WORD_BITS)) != 0,
            None => false,
        }
    }

    pub fn insert(&mut self, item: ExtendedItem) {
        let idx = item / WORD_BITS;
        if idx >= self.words.len() {
            self.words.resize(idx + 1, 0);
        }
        self.words[idx] |= 1 << (item % WORD_BITS);
    }

    pub fn remove(&mut self, item: ExtendedItem) {
        let idx = item / WORD_BITS;
        if idx < self.words.len() {
            self.words[idx] &= !(1 << (item % WORD_BITS));
            self.trim();
        }
    }

    pub fn with(&self, item: ExtendedItem) -> Inventory {
        let mut out = self.clone();
        out.insert(item);
        out
    }

    pub fn without(&self, item: ExtendedItem) -> Inventory {
        let mut out = self.clone();
        out.remove(item);
        out
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    pub fn len(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    pub fn is_subset(&self, other: &Inventory) -> bool {
        if self.words.len() > other.words.len() {
            return false;
        }
        self.words
            .iter()
            .zip(other.words.iter())
            .all(|(&a, &b)| a & !b == 0)
    }

    pub fn intersects(&self, other: &Inventory) -> bool {
        self.words
            .iter()
            .zip(other.words.iter())
            .any(|(&a, &b)| a & b != 0)
    }

    pub fn union_with(&mut self, other: &Inventory) {
        if other.words.len() > self.words.len() {
            self.words.resize(other.words.len(), 0);
        }
        for (a, &b) in self.words.iter_mut().zip(other.words.iter()) {
            *a |= b;
        }
    }

    /// Items in ascending id order.
    pub fn iter(&self) -> impl Iterator<Item = ExtendedItem> + '_ {
        self.words.iter().enumerate().flat_map(|(i, &w)| {
            (0..WORD_BITS)
                .filter(move |b| w & (1 << b) != 0)
                .map(move |b| i * WORD_BITS + b)
        })
    }

    fn trim(&mut self) {
        while self.words.last() == Some(&0) {
            self.words.pop();
        }
    }
}

impl Debug for Inventory {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

impl FromIterator<ExtendedItem> for Inventory {
    fn from_iter<T: IntoIterator<Item = ExtendedItem>>(iter: T) -> Self {
        let mut out = Inventory::new();
        for item in iter {
            out.insert(item);
        }
        out
    }
}

impl From<Vec<ExtendedItem>> for Inventory {
    fn from(items: Vec<ExtendedItem>) -> Self {
        items.into_iter().collect()
    }
}

impl From<Inventory> for Vec<ExtendedItem> {
    fn from(inventory: Inventory) -> Self {
        inventory.iter().collect()
    }
}

impl BitOr for &Inventory {
    type Output = Inventory;

    fn bitor(self, rhs: &Inventory) -> Inventory {
        let mut out = self.clone();
        out.union_with(rhs);
        out
    }
}

impl BitOrAssign<&Inventory> for Inventory {
    fn bitor_assign(&mut self, rhs: &Inventory) {
        self.union_with(rhs);
    }
}

impl BitAnd for &Inventory {
    type Output = Inventory;

    fn bitand(self, rhs: &Inventory) -> Inventory {
        let mut out = Inventory {
            words: self
                .words
                .iter()
                .zip(rhs.words.iter())
                .map(|(&a, &b)| a & b)
                .collect(),
        };
        out.trim();
        out
    }
}

impl Sub for &Inventory {
    type Output = Inventory;

    fn sub(self, rhs: &Inventory) -> Inventory {
        let mut out = self.clone();
        for (a, &b) in out.words.iter_mut().zip(rhs.words.iter()) {
            *a &= !b;
        }
        out.trim();
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_remove_contains() {
        let mut inv = Inventory::new();
        inv.insert(3);
        inv.insert(130);
        assert!(inv.contains(3));
        assert!(inv.contains(130));
        assert!(!inv.contains(4));
        assert_eq!(inv.len(), 2);
        inv.remove(130);
        assert!(!inv.contains(130));
        assert_eq!(inv, Inventory::single(3));
    }

    #[test]
    fn equality_ignores_construction_history() {
        let mut a = Inventory::single(200);
        a.remove(200);
        assert_eq!(a, Inventory::new());
        assert!(a.is_empty());
    }

    #[test]
    fn subset_and_set_operations() {
        let a: Inventory = vec![1, 2, 70].into();
        let b: Inventory = vec![1, 2, 3, 70, 300].into();
        assert!(a.is_subset(&b));
        assert!(!b.is_subset(&a));
        assert!(Inventory::new().is_subset(&a));
        assert_eq!(&a | &b, b);
        assert_eq!(&a & &b, a);
        assert_eq!(&b - &a, vec![3, 300].into());
        assert!(a.intersects(&b));
        assert!(!a.intersects(&Inventory::single(4)));
        assert_eq!(b.iter().collect::<Vec<_>>(), vec![1, 2, 3, 70, 300]);
    }
}
