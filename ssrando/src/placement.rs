use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Debug;

use crate::hints::GossipStoneHint;

/// Decisions made so far: which item sits in which location, which exit leads to which entrance,
/// and which hints each gossip stone carries. All names are full names.
///
/// `map_transitions` and `reverse_map_transitions` are kept as mutual inverses; use `link` and
/// `unlink_exit` / `unlink_entrance` rather than touching them directly.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Placement {
    pub item_placement_limit: BTreeMap<String, String>, // item -> area or check the item must land in
    pub map_transitions: BTreeMap<String, String>,      // exit -> entrance
    pub reverse_map_transitions: BTreeMap<String, String>, // entrance -> exit
    pub locations: BTreeMap<String, String>,            // check -> item
    pub items: BTreeMap<String, String>,                // item -> check, for non-duplicable items
    pub stones: BTreeMap<String, Vec<String>>,          // gossip stone -> hint names
    pub hints: BTreeMap<String, GossipStoneHint>,       // hint name -> hint
}

impl Placement {
    pub fn new() -> Self {
        Self::default()
    }

    /// Connects `exit` to `entrance`, dropping any previous connection of either side.
    pub fn link(&mut self, exit: &str, entrance: &str) {
        self.unlink_exit(exit);
        self.unlink_entrance(entrance);
        self.map_transitions
            .insert(exit.to_string(), entrance.to_string());
        self.reverse_map_transitions
            .insert(entrance.to_string(), exit.to_string());
    }

    pub fn unlink_exit(&mut self, exit: &str) -> Option<String> {
        let entrance = self.map_transitions.remove(exit)?;
        self.reverse_map_transitions.remove(&entrance);
        Some(entrance)
    }

    pub fn unlink_entrance(&mut self, entrance: &str) -> Option<String> {
        let exit = self.reverse_map_transitions.remove(entrance)?;
        self.map_transitions.remove(&exit);
        Some(exit)
    }

    pub fn is_occupied(&self, location: &str) -> bool {
        self.locations.contains_key(location)
    }

    pub fn hints_on(&self, stone: &str) -> &[String] {
        match self.stones.get(stone) {
            Some(hints) => hints,
            None => &[],
        }
    }

    /// Combines two partial placements, failing if they disagree on any shared key.
    pub fn merge(&self, other: &Placement) -> Result<Placement> {
        Ok(Placement {
            item_placement_limit: merge_map(
                "placement limit",
                &self.item_placement_limit,
                &other.item_placement_limit,
            )?,
            map_transitions: merge_map("exit", &self.map_transitions, &other.map_transitions)?,
            reverse_map_transitions: merge_map(
                "entrance",
                &self.reverse_map_transitions,
                &other.reverse_map_transitions,
            )?,
            locations: merge_map("location", &self.locations, &other.locations)?,
            items: merge_map("item", &self.items, &other.items)?,
            stones: merge_map("gossip stone", &self.stones, &other.stones)?,
            hints: merge_map("hint", &self.hints, &other.hints)?,
        })
    }
}

fn merge_map<V: Clone + PartialEq + Debug>(
    what: &str,
    a: &BTreeMap<String, V>,
    b: &BTreeMap<String, V>,
) -> Result<BTreeMap<String, V>> {
    let mut out = a.clone();
    for (k, v) in b {
        match a.get(k) {
            Some(existing) if existing != v => {
                bail!("conflicting placements for {what} {k}: {existing:?} vs {v:?}");
            }
            _ => {
                out.insert(k.clone(), v.clone());
            }
        }
    }
    Ok(out)
}
