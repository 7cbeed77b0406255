use serde::{Deserialize, Serialize};
use ssrando_game::CheckIdx;
use ssrando_logic::ExtendedItem;
use std::collections::BTreeMap;

use crate::hints::GossipStoneHint;
use crate::logic::overlay::{fill, RequirementOverlay};
use crate::logic::Logic;

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct SpoilerSphere {
    pub step: usize,
    pub items: BTreeMap<String, String>, // location -> item collected at this step
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct SpoilerLog {
    pub progress_items: Vec<String>,
    pub locations: BTreeMap<String, String>,
    pub transitions: BTreeMap<String, String>,
    pub hints: BTreeMap<String, Vec<GossipStoneHint>>,
    pub spheres: Vec<SpoilerSphere>,
    pub unreachable_items: Vec<String>,
}

struct PlacedItem {
    check: CheckIdx,
    bit: ExtendedItem,
    location: String,
    item: String,
}

impl SpoilerLog {
    pub fn new(
        logic: &Logic,
        progress_items: Vec<String>,
        hints: &BTreeMap<String, Vec<GossipStoneHint>>,
    ) -> SpoilerLog {
        let mut remaining: Vec<PlacedItem> = vec![];
        for (location, item) in &logic.placement.locations {
            let (Some(check), Some(bit)) = (logic.world.check_idx(location), logic.item_bit(item))
            else {
                continue;
            };
            remaining.push(PlacedItem {
                check,
                bit,
                location: location.clone(),
                item: item.clone(),
            });
        }

        // Each sphere is what can be picked up with the items of the previous spheres only.
        let mut collected = logic.inventory.without(logic.world.banned_bit);
        let mut spheres = vec![];
        loop {
            let mut overlay = RequirementOverlay::new(&logic.requirements);
            for placed in &remaining {
                overlay.ban(placed.bit);
            }
            let reachable = fill(&overlay, collected.clone());
            let (found, rest): (Vec<PlacedItem>, Vec<PlacedItem>) = remaining
                .into_iter()
                .partition(|p| reachable.contains(logic.world.checks[p.check].item));
            remaining = rest;
            if found.is_empty() {
                break;
            }
            for placed in &found {
                collected.insert(placed.bit);
            }
            spheres.push(SpoilerSphere {
                step: spheres.len() + 1,
                items: found.into_iter().map(|p| (p.location, p.item)).collect(),
            });
        }

        SpoilerLog {
            progress_items,
            locations: logic.placement.locations.clone(),
            transitions: logic.placement.map_transitions.clone(),
            hints: hints.clone(),
            spheres,
            unreachable_items: remaining.into_iter().map(|p| p.item).collect(),
        }
    }
}
