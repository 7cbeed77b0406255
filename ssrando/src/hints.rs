pub mod distribution;

use anyhow::Result;
use hashbrown::{HashMap, HashSet};
use log::info;
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use ssrando_game::{CheckIdx, StoneIdx};
use ssrando_logic::{ExtendedItem, Inventory, Requirement};
use std::collections::BTreeMap;

use self::distribution::HintDistribution;
use crate::logic::Logic;
use crate::randomize::{UserOutput, MAX_DEPTH};
use crate::settings::HintSettings;

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LocationHintKind {
    Always,
    Sometimes,
    BossKey,
    PreciseItem,
    Random,
}

/// What a gossip stone says. Locations are full check names.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GossipStoneHint {
    Location {
        kind: LocationHintKind,
        location: String,
        item: String,
        text: Option<String>,
    },
    SotsGoal {
        location: String,
        item: String,
        zone: Option<String>,
        goal: Option<String>,
    },
    ZoneItem {
        location: String,
        item: String,
        zone: Option<String>,
    },
    Barren {
        zone: String,
    },
    Junk {
        text: String,
    },
}

impl GossipStoneHint {
    pub fn location(&self) -> Option<&str> {
        match self {
            GossipStoneHint::Location { location, .. }
            | GossipStoneHint::SotsGoal { location, .. }
            | GossipStoneHint::ZoneItem { location, .. } => Some(location),
            GossipStoneHint::Barren { .. } | GossipStoneHint::Junk { .. } => None,
        }
    }
}

// Queries answering "what matters for victory" on the solved graph. Locations behind the Banned
// bit are never considered.
impl Logic<'_> {
    pub fn not_banned(&mut self) -> Inventory {
        let banned = self.world.banned_bit;
        self.fill_restricted(&[banned])
    }

    /// Placed locations whose item cannot be done without to reach `goal`.
    pub fn sots_locations(&mut self, goal: ExtendedItem) -> Vec<CheckIdx> {
        let banned = self.world.banned_bit;
        let not_banned = self.not_banned();
        if !not_banned.contains(goal) {
            return vec![];
        }
        let placed: Vec<(CheckIdx, ExtendedItem)> = self.placed_registered_items(&not_banned);
        let mut out = vec![];
        for (check, item) in placed {
            if !self.fill_restricted(&[banned, item]).contains(goal) {
                out.push(check);
            }
        }
        out
    }

    /// Items placed at a location needed for one of `goals`, or without which such a location
    /// cannot be reached.
    pub fn useful_items(&mut self, goals: &[ExtendedItem]) -> HashSet<String> {
        let banned = self.world.banned_bit;
        let not_banned = self.not_banned();
        let mut targets: Vec<CheckIdx> = vec![];
        for &goal in goals {
            for check in self.sots_locations(goal) {
                if !targets.contains(&check) {
                    targets.push(check);
                }
            }
        }
        let mut useful: HashSet<String> = targets
            .iter()
            .filter_map(|&c| self.item_at(c).map(|s| s.to_string()))
            .collect();
        for (check, item) in self.placed_registered_items(&not_banned) {
            let name = self.item_at(check).unwrap_or_default().to_string();
            if useful.contains(&name) {
                continue;
            }
            let restricted = self.fill_restricted(&[banned, item]);
            if targets
                .iter()
                .any(|&t| !restricted.contains(self.world.checks[t].item))
            {
                useful.insert(name);
            }
        }
        useful
    }

    /// Reachable checks grouped by hint region.
    pub fn checks_by_hint_region(&mut self) -> BTreeMap<String, Vec<CheckIdx>> {
        let not_banned = self.not_banned();
        let mut out: BTreeMap<String, Vec<CheckIdx>> = BTreeMap::new();
        for (c, check) in self.world.checks.iter().enumerate() {
            if let Some(region) = &check.hint_region {
                if not_banned.contains(check.item) {
                    out.entry(region.clone()).or_default().push(c);
                }
            }
        }
        out
    }

    /// Hint regions where no reachable check holds a useful item.
    pub fn barren_regions(&mut self, useful: &HashSet<String>) -> Vec<String> {
        let mut out = vec![];
        for (region, checks) in self.checks_by_hint_region() {
            let barren = checks.iter().all(|&c| match self.item_at(c) {
                Some(item) => !useful.contains(item),
                None => true,
            });
            if barren {
                out.push(region);
            }
        }
        out
    }

    fn placed_registered_items(&self, reachable: &Inventory) -> Vec<(CheckIdx, ExtendedItem)> {
        let mut out = vec![];
        for (location, item) in &self.placement.locations {
            let (Some(check), Some(bit)) = (self.world.check_idx(location), self.item_bit(item))
            else {
                continue;
            };
            if reachable.contains(self.world.checks[check].item) {
                out.push((check, bit));
            }
        }
        out
    }
}

/// Picks hints according to the distribution and places them on gossip stones so that each
/// location hint can be read before the hinted item is needed.
pub struct Hints<'l, 'a, R: Rng> {
    logic: &'l mut Logic<'a>,
    rng: &'l mut R,
    settings: &'l HintSettings,
    max_hints_for: Vec<usize>, // Capacity of each stone, indexed like World.stones
}

impl<'l, 'a, R: Rng> Hints<'l, 'a, R> {
    pub fn new(logic: &'l mut Logic<'a>, rng: &'l mut R, settings: &'l HintSettings) -> Self {
        Hints {
            logic,
            rng,
            settings,
            max_hints_for: vec![],
        }
    }

    pub fn do_hints(
        &mut self,
        output: &mut dyn UserOutput,
    ) -> Result<BTreeMap<String, Vec<GossipStoneHint>>> {
        self.settings.distribution.validate()?;
        let mut dist = HintDistribution::start(self.logic, self.rng, self.settings)?;
        let hints = dist.get_hints(self.rng);
        self.max_hints_for = dist.max_hints_for.clone();
        info!("Selected {} hints", hints.len());

        output.progress("placing hints...");
        let named: Vec<(String, GossipStoneHint)> = hints
            .into_iter()
            .enumerate()
            .map(|(i, hint)| (format!("Hint {i}"), hint))
            .collect();
        self.randomize(&named, output)?;

        let by_name: HashMap<&str, &GossipStoneHint> =
            named.iter().map(|(n, h)| (n.as_str(), h)).collect();
        for (name, hint) in &named {
            self.logic.placement.hints.insert(name.clone(), hint.clone());
        }
        let mut out = BTreeMap::new();
        for stone in &self.logic.world.stones {
            let hints = self
                .logic
                .placement
                .hints_on(&stone.name)
                .iter()
                .filter_map(|n| by_name.get(n.as_str()).map(|&h| h.clone()))
                .collect();
            out.insert(stone.name.clone(), hints);
        }
        Ok(out)
    }

    fn randomize(
        &mut self,
        hints: &[(String, GossipStoneHint)],
        output: &mut dyn UserOutput,
    ) -> Result<()> {
        for (name, hint) in hints {
            let hint_bit = self.logic.register_item(name)?;
            if let GossipStoneHint::Location { item, .. } = hint {
                if let Some(item_bit) = self.logic.item_bit(item) {
                    self.logic
                        .add_requirement(item_bit, &Requirement::item(hint_bit));
                }
            }
            self.logic.inventory.insert(hint_bit);
        }
        self.logic.fill_inventory(false);

        for (name, _) in hints {
            if !self.place_hint(name, output)? {
                return Err(output.generation_failed(format!("could not place {name}")));
            }
        }
        Ok(())
    }

    fn place_hint(&mut self, hint_name: &str, output: &mut dyn UserOutput) -> Result<bool> {
        let mut current = hint_name.to_string();
        for depth in 0.. {
            if let Some(bit) = self.logic.item_bit(&current) {
                self.logic.remove_item(bit);
            }
            let accessible_stones: Vec<StoneIdx> = self.logic.accessible_stones();
            let mut available_stones: Vec<StoneIdx> = vec![];
            for &stone in &accessible_stones {
                let used = self
                    .logic
                    .placement
                    .hints_on(&self.logic.world.stones[stone].name)
                    .len();
                let free = self.max_hints_for[stone].saturating_sub(used);
                available_stones.extend(std::iter::repeat(stone).take(free));
            }

            if let Some(&stone) = available_stones.choose(self.rng) {
                self.logic
                    .place_hint(stone, &current, self.max_hints_for[stone])?;
                return Ok(true);
            }

            // Every reachable stone is full, so take the spot of an already placed hint.
            if depth >= MAX_DEPTH {
                return Ok(false);
            }
            if accessible_stones.is_empty() {
                return Err(
                    output.generation_failed(format!("no more location accessible for {current}"))
                );
            }
            let mut spots: Vec<(StoneIdx, String)> = vec![];
            for &stone in &accessible_stones {
                let stone_name = &self.logic.world.stones[stone].name;
                for old_hint in self.logic.placement.hints_on(stone_name) {
                    spots.push((stone, old_hint.clone()));
                }
            }
            let Some((stone, old_hint)) = spots.choose(self.rng).cloned() else {
                return Err(
                    output.generation_failed(format!("no gossip stone can hold {current}"))
                );
            };
            self.logic.replace_hint(stone, &current, &old_hint)?;
            current = old_hint;
        }
        Ok(false)
    }
}
