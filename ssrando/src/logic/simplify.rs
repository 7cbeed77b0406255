use ssrando_logic::{Inventory, Requirement};

// Requirements with this many conjunctions or more are left alone.
const MAX_SIMPLIFY_CONJUNCTIONS: usize = 30;

/// Inlines, one level deep, the requirements of non-opaque items that consist of a single
/// conjunction. A conjunction that would come to mention its own item is dropped, and one that
/// relies on an unreachable item disappears.
pub fn shallow_simplify(requirements: &mut [Requirement], opaque: &[bool]) {
    let simplifiable: Inventory = requirements
        .iter()
        .enumerate()
        .filter(|(_, req)| req.disjunction().len() <= 1)
        .map(|(i, _)| i)
        .collect();

    for item in 0..requirements.len() {
        if opaque[item] || requirements[item].disjunction().len() >= MAX_SIMPLIFY_CONJUNCTIONS {
            continue;
        }
        let mut new_req = Requirement::never();
        for conj in requirements[item].disjunction() {
            if !conj.intersects(&simplifiable) {
                new_req.insert_conjunction(conj.clone());
                continue;
            }
            let mut new_conj = Inventory::new();
            let mut skip = false;
            for req_item in conj.iter() {
                if opaque[req_item] || !simplifiable.contains(req_item) {
                    new_conj.insert(req_item);
                    continue;
                }
                match requirements[req_item].disjunction() {
                    [] => {
                        skip = true;
                        break;
                    }
                    [inner] => new_conj |= inner,
                    _ => new_conj.insert(req_item),
                }
            }
            if !skip && !new_conj.contains(item) {
                new_req.insert_conjunction(new_conj);
            }
        }
        requirements[item] = new_req;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inlines_single_conjunctions() {
        // 0: opaque item, 1 <- 0, 2 <- 1 | 3, 3 <- 0 & 1
        let mut reqs = vec![
            Requirement::never(),
            Requirement::item(0),
            Requirement::any_of([1, 3]),
            Requirement::all_of([0, 1].into_iter().collect()),
        ];
        let opaque = vec![true, false, false, false];
        shallow_simplify(&mut reqs, &opaque);
        assert!(reqs[0].is_never());
        assert_eq!(reqs[1], Requirement::item(0));
        assert_eq!(reqs[2], Requirement::item(0));
        assert_eq!(reqs[3], Requirement::item(0));
    }

    #[test]
    fn drops_self_references_and_never() {
        // 1 <- 2, 2 <- 1 | 0, 3 <- 4, 4 <- never
        let mut reqs = vec![
            Requirement::free(),
            Requirement::item(2),
            Requirement::any_of([1, 0]),
            Requirement::item(4),
            Requirement::never(),
        ];
        let opaque = vec![true, false, false, false, false];
        shallow_simplify(&mut reqs, &opaque);
        // 2 has two conjunctions, so 1 keeps pointing at it; 2 inlining 1 would refer to itself.
        assert_eq!(reqs[1], Requirement::item(2));
        assert_eq!(reqs[2], Requirement::item(0));
        assert!(reqs[3].is_never());
    }
}
