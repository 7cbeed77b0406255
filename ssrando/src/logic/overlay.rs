use hashbrown::HashMap;
use ssrando_logic::{ExtendedItem, Inventory, Requirement};

/// Read access to a per-item requirement table.
pub trait RequirementTable {
    fn num_items(&self) -> usize;
    fn requirement(&self, item: ExtendedItem) -> &Requirement;
}

impl RequirementTable for [Requirement] {
    fn num_items(&self) -> usize {
        self.len()
    }

    fn requirement(&self, item: ExtendedItem) -> &Requirement {
        &self[item]
    }
}

impl RequirementTable for Vec<Requirement> {
    fn num_items(&self) -> usize {
        self.len()
    }

    fn requirement(&self, item: ExtendedItem) -> &Requirement {
        &self[item]
    }
}

/// Sparse set of tentative overrides on top of a base table. Used to test a change before
/// committing it to the live requirements.
pub struct RequirementOverlay<'a> {
    base: &'a [Requirement],
    overrides: HashMap<ExtendedItem, Requirement>,
}

impl<'a> RequirementOverlay<'a> {
    pub fn new(base: &'a [Requirement]) -> Self {
        RequirementOverlay {
            base,
            overrides: HashMap::new(),
        }
    }

    pub fn set(&mut self, item: ExtendedItem, req: Requirement) {
        self.overrides.insert(item, req);
    }

    pub fn ban(&mut self, item: ExtendedItem) {
        self.set(item, Requirement::never());
    }
}

impl RequirementTable for RequirementOverlay<'_> {
    fn num_items(&self) -> usize {
        self.base.len()
    }

    fn requirement(&self, item: ExtendedItem) -> &Requirement {
        match self.overrides.get(&item) {
            Some(req) => req,
            None => &self.base[item],
        }
    }
}

/// Reachability fixed point: adds every item whose requirement holds until nothing changes.
pub fn fill<T: RequirementTable + ?Sized>(table: &T, mut inventory: Inventory) -> Inventory {
    let n = table.num_items();
    let mut keep_going = true;
    while keep_going {
        keep_going = false;
        for i in 0..n {
            if !inventory.contains(i) && table.requirement(i).eval(&inventory) {
                inventory.insert(i);
                keep_going = true;
            }
        }
    }
    inventory
}

/// Every item mentioned by the requirement of a reached item, i.e. every item that may be
/// justifying part of `full_inventory`.
pub fn aggregate_required_items<T: RequirementTable + ?Sized>(
    table: &T,
    full_inventory: &Inventory,
) -> Inventory {
    let mut aggregate = Inventory::new();
    for item in full_inventory.iter() {
        if item >= table.num_items() {
            continue;
        }
        for conj in table.requirement(item).disjunction() {
            aggregate |= conj;
        }
    }
    aggregate
}

/// Every item some satisfiable way of reaching `target` goes through, walking requirements
/// backward from `target` and only following conjunctions held by `full_inventory`.
pub fn items_behind<T: RequirementTable + ?Sized>(
    table: &T,
    full_inventory: &Inventory,
    target: ExtendedItem,
) -> Inventory {
    let mut behind = Inventory::new();
    let mut stack = vec![target];
    while let Some(item) = stack.pop() {
        if item >= table.num_items() {
            continue;
        }
        for conj in table.requirement(item).disjunction() {
            if !conj.is_subset(full_inventory) {
                continue;
            }
            for dep in conj.iter() {
                if !behind.contains(dep) {
                    behind.insert(dep);
                    stack.push(dep);
                }
            }
        }
    }
    behind
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain() -> Vec<Requirement> {
        // 0 <- free, 1 <- 0, 2 <- 1 & 3, 3 <- never
        vec![
            Requirement::free(),
            Requirement::item(0),
            Requirement::all_of([1, 3].into_iter().collect()),
            Requirement::never(),
        ]
    }

    #[test]
    fn fill_reaches_fixed_point() {
        let reqs = chain();
        let full = fill(&reqs, Inventory::new());
        assert_eq!(full, vec![0, 1].into());
        assert_eq!(fill(&reqs, full.clone()), full);
        assert_eq!(fill(&reqs, Inventory::single(3)), vec![0, 1, 2, 3].into());
    }

    #[test]
    fn overlay_leaves_base_untouched() {
        let reqs = chain();
        let mut overlay = RequirementOverlay::new(&reqs);
        overlay.set(3, Requirement::item(1));
        overlay.ban(0);
        assert_eq!(fill(&overlay, Inventory::new()), Inventory::new());
        assert_eq!(fill(&overlay, Inventory::single(0)), vec![0, 1, 2, 3].into());
        assert!(reqs[3].is_never());
    }

    #[test]
    fn aggregate_collects_used_items() {
        let reqs = chain();
        let full = fill(&reqs, Inventory::new());
        assert_eq!(aggregate_required_items(&reqs, &full), Inventory::single(0));
    }

    #[test]
    fn alternatives_are_both_behind_the_target() {
        // 0, 1 held; 2 <- 0 | 1; 3 <- 2; 4 <- never, and 2 could also come from 4.
        let reqs = vec![
            Requirement::never(),
            Requirement::never(),
            Requirement::any_of([0, 1, 4]),
            Requirement::item(2),
            Requirement::never(),
        ];
        let full = fill(&reqs, vec![0, 1].into());
        assert_eq!(items_behind(&reqs, &full, 3), vec![0, 1, 2].into());
        assert_eq!(items_behind(&reqs, &full, 0), Inventory::new());
    }
}
