use serde::{Deserialize, Serialize};
use std::fmt::{self, Debug, Formatter};
use std::ops::{BitAnd, BitAndAssign, BitOr, BitOrAssign};

use crate::{ExtendedItem, Inventory};

/// Requirement in disjunctive normal form: an OR of conjunctions, each conjunction being the set
/// of extended items that must all be held.
///
/// No conjunctions means the requirement can never be satisfied; a requirement containing an
/// empty conjunction is always satisfied. Conjunctions are kept as an antichain: a conjunction is
/// only retained if no other conjunction is a subset of it.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct Requirement {
    disjunction: Vec<Inventory>,
}

impl Requirement {
    pub fn never() -> Self {
        Requirement {
            disjunction: vec![],
        }
    }

    pub fn free() -> Self {
        Requirement {
            disjunction: vec![Inventory::new()],
        }
    }

    pub fn item(item: ExtendedItem) -> Self {
        Requirement {
            disjunction: vec![Inventory::single(item)],
        }
    }

    pub fn all_of(conjunction: Inventory) -> Self {
        Requirement {
            disjunction: vec![conjunction],
        }
    }

    pub fn any_of<I: IntoIterator<Item = ExtendedItem>>(items: I) -> Self {
        let mut out = Requirement::never();
        for item in items {
            out.insert_conjunction(Inventory::single(item));
        }
        out
    }

    pub fn make_and(reqs: Vec<Requirement>) -> Requirement {
        let mut out = Requirement::free();
        for req in &reqs {
            out = out.and(req);
            if out.is_never() {
                break;
            }
        }
        out
    }

    pub fn make_or(reqs: Vec<Requirement>) -> Requirement {
        let mut out = Requirement::never();
        for req in &reqs {
            out = out.or(req);
            if out.is_free() {
                break;
            }
        }
        out
    }

    pub fn is_never(&self) -> bool {
        self.disjunction.is_empty()
    }

    pub fn is_free(&self) -> bool {
        self.disjunction.iter().any(|c| c.is_empty())
    }

    pub fn disjunction(&self) -> &[Inventory] {
        &self.disjunction
    }

    /// Adds a conjunction, keeping the disjunction free of supersets.
    pub fn insert_conjunction(&mut self, conjunction: Inventory) {
        if self.disjunction.iter().any(|c| c.is_subset(&conjunction)) {
            return;
        }
        self.disjunction.retain(|c| !conjunction.is_subset(c));
        self.disjunction.push(conjunction);
    }

    pub fn or(&self, other: &Requirement) -> Requirement {
        let mut out = self.clone();
        for conj in &other.disjunction {
            out.insert_conjunction(conj.clone());
        }
        out
    }

    pub fn and(&self, other: &Requirement) -> Requirement {
        let mut out = Requirement::never();
        for a in &self.disjunction {
            for b in &other.disjunction {
                out.insert_conjunction(a | b);
            }
        }
        out
    }

    /// Treats `item` as always held: it is dropped from every conjunction.
    pub fn remove_item(&self, item: ExtendedItem) -> Requirement {
        let mut out = Requirement::never();
        for conj in &self.disjunction {
            out.insert_conjunction(conj.without(item));
        }
        out
    }

    pub fn eval(&self, inventory: &Inventory) -> bool {
        self.disjunction.iter().any(|c| c.is_subset(inventory))
    }

    /// Union of every item mentioned by the requirement.
    pub fn items(&self) -> Inventory {
        let mut out = Inventory::new();
        for conj in &self.disjunction {
            out |= conj;
        }
        out
    }

    pub fn mentions(&self, item: ExtendedItem) -> bool {
        self.disjunction.iter().any(|c| c.contains(item))
    }
}

impl PartialEq for Requirement {
    fn eq(&self, other: &Requirement) -> bool {
        self.disjunction.len() == other.disjunction.len()
            && self
                .disjunction
                .iter()
                .all(|c| other.disjunction.contains(c))
    }
}

impl Eq for Requirement {}

impl Debug for Requirement {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if self.is_never() {
            return write!(f, "Never");
        }
        let mut first = true;
        for conj in &self.disjunction {
            if !first {
                write!(f, " | ")?;
            }
            first = false;
            write!(f, "{:?}", conj)?;
        }
        Ok(())
    }
}

impl BitAnd for &Requirement {
    type Output = Requirement;

    fn bitand(self, rhs: &Requirement) -> Requirement {
        self.and(rhs)
    }
}

impl BitOr for &Requirement {
    type Output = Requirement;

    fn bitor(self, rhs: &Requirement) -> Requirement {
        self.or(rhs)
    }
}

impl BitAndAssign<&Requirement> for Requirement {
    fn bitand_assign(&mut self, rhs: &Requirement) {
        *self = self.and(rhs);
    }
}

impl BitOrAssign<&Requirement> for Requirement {
    fn bitor_assign(&mut self, rhs: &Requirement) {
        for conj in &rhs.disjunction {
            self.insert_conjunction(conj.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inv(items: &[ExtendedItem]) -> Inventory {
        items.iter().copied().collect()
    }

    fn sample() -> Vec<Requirement> {
        vec![
            Requirement::never(),
            Requirement::free(),
            Requirement::item(1),
            Requirement::any_of([1, 2]),
            Requirement::all_of(inv(&[2, 3])).or(&Requirement::item(4)),
            Requirement::all_of(inv(&[1, 3, 5])),
        ]
    }

    fn inventories() -> Vec<Inventory> {
        vec![
            inv(&[]),
            inv(&[1]),
            inv(&[2, 3]),
            inv(&[1, 3, 5]),
            inv(&[4]),
            inv(&[1, 2, 3, 4, 5]),
        ]
    }

    #[test]
    fn constants() {
        assert!(Requirement::never().is_never());
        assert!(!Requirement::never().eval(&inv(&[1, 2, 3])));
        assert!(Requirement::free().is_free());
        assert!(Requirement::free().eval(&Inventory::new()));
    }

    #[test]
    fn algebra_laws() {
        for a in sample() {
            assert_eq!(a.or(&a), a);
            assert_eq!(a.and(&Requirement::never()), Requirement::never());
            assert_eq!(a.or(&Requirement::never()), a);
            assert_eq!(a.and(&Requirement::free()), a);
            for b in sample() {
                for i in inventories() {
                    assert_eq!(a.and(&b).eval(&i), a.eval(&i) && b.eval(&i));
                    assert_eq!(a.or(&b).eval(&i), a.eval(&i) || b.eval(&i));
                }
            }
        }
    }

    #[test]
    fn or_absorbs_supersets() {
        let r = Requirement::all_of(inv(&[1, 2])).or(&Requirement::item(1));
        assert_eq!(r.disjunction().len(), 1);
        assert_eq!(r, Requirement::item(1));

        let r = Requirement::item(1).or(&Requirement::all_of(inv(&[1, 2])));
        assert_eq!(r, Requirement::item(1));
    }

    #[test]
    fn and_distributes() {
        // (1 | 2) & (3 | 1) == 1 | (2 & 3)
        let r = Requirement::any_of([1, 2]).and(&Requirement::any_of([3, 1]));
        let expected = Requirement::item(1).or(&Requirement::all_of(inv(&[2, 3])));
        assert_eq!(r, expected);
    }

    #[test]
    fn remove_item_assumes_held() {
        let r = Requirement::all_of(inv(&[1, 2])).or(&Requirement::all_of(inv(&[3, 4])));
        let removed = r.remove_item(1);
        assert_eq!(
            removed,
            Requirement::item(2).or(&Requirement::all_of(inv(&[3, 4])))
        );
        assert!(Requirement::item(7).remove_item(7).is_free());
    }

    #[test]
    fn make_and_or() {
        let r = Requirement::make_and(vec![
            Requirement::item(1),
            Requirement::item(2),
            Requirement::free(),
        ]);
        assert_eq!(r, Requirement::all_of(inv(&[1, 2])));
        assert!(Requirement::make_and(vec![]).is_free());
        assert!(Requirement::make_or(vec![]).is_never());
        let r = Requirement::make_or(vec![Requirement::item(1), Requirement::never()]);
        assert_eq!(r, Requirement::item(1));
    }

    #[test]
    fn items_and_mentions() {
        let r = Requirement::all_of(inv(&[1, 2])).or(&Requirement::item(9));
        assert_eq!(r.items(), inv(&[1, 2, 9]));
        assert!(r.mentions(9));
        assert!(!r.mentions(3));
    }
}
