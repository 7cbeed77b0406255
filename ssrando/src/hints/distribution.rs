use anyhow::{Context, Result};
use hashbrown::{HashMap, HashSet};
use log::{debug, warn};
use rand::distributions::{Distribution, WeightedIndex};
use rand::seq::SliceRandom;
use rand::Rng;
use ssrando_game::{CheckIdx, HintImportance, World};
use ssrando_logic::{ExtendedItem, Inventory};
use std::collections::BTreeMap;

use super::{GossipStoneHint, LocationHintKind};
use crate::logic::{Logic, LogicError};
use crate::settings::{HintSettings, HintType, HintTypeSettings};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum BarrenKind {
    Dungeon,
    Overworld,
}

/// Chooses which hints go on gossip stones: the fixed hints first, in order, then weighted
/// picks until every stone slot has one.
pub struct HintDistribution<'w> {
    world: &'w World,
    precise_item: bool,
    distribution: BTreeMap<HintType, HintTypeSettings>,
    dungeon_sots_limit: usize,
    dungeon_barren_limit: usize,
    pub max_hints_for: Vec<usize>, // Indexed like World.stones
    pub nb_hints: usize,
    not_banned: Inventory,
    locations: BTreeMap<String, String>, // Placement.locations at the time of the selection
    items: BTreeMap<String, String>,     // Placement.items at the time of the selection
    hinted_locations: HashSet<CheckIdx>,
    always_hints: Vec<CheckIdx>,
    sometimes_hints: Vec<CheckIdx>,
    required_boss_keys: Vec<String>,
    sots_locations: Vec<CheckIdx>,
    sots_dungeon_placed: usize,
    goals: Vec<String>,
    goal_locations: Vec<Vec<CheckIdx>>,
    goal_index: usize,
    hintable_items: Vec<String>,
    region_checks: BTreeMap<String, Vec<CheckIdx>>,
    barren_dungeons: Vec<String>,
    barren_overworld_zones: Vec<String>,
    barren_hinted_areas: HashSet<String>,
    placed_dungeon_barren: usize,
    prev_barren_type: Option<BarrenKind>,
    junk_hints: Vec<String>,
    counts_by_type: HashMap<HintType, usize>,
    hints: Vec<GossipStoneHint>,
}

impl<'w> HintDistribution<'w> {
    /// Classifies the solved placement and creates the fixed hints.
    pub fn start<R: Rng>(
        logic: &mut Logic<'w>,
        rng: &mut R,
        settings: &HintSettings,
    ) -> Result<HintDistribution<'w>> {
        let world = logic.world;
        let dist = &settings.distribution;

        let banned_stones = dist
            .banned_stones
            .iter()
            .map(|s| {
                world
                    .stone_idx(s)
                    .ok_or_else(|| LogicError::UnknownName(s.clone()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        let max_hints_for: Vec<usize> = (0..world.stones.len())
            .map(|s| {
                if banned_stones.contains(&s) {
                    0
                } else {
                    dist.hints_per_stone
                }
            })
            .collect();
        let nb_hints = max_hints_for.iter().sum();

        let not_banned = logic.not_banned();
        let mut always_hints = vec![];
        let mut sometimes_hints = vec![];
        for (c, check) in world.checks.iter().enumerate() {
            if !not_banned.contains(check.item) {
                continue;
            }
            match check.hint {
                Some(HintImportance::Always) => always_hints.push(c),
                Some(HintImportance::Sometimes) => sometimes_hints.push(c),
                None => {}
            }
        }
        for added in &dist.added_locations {
            let c = world
                .check_idx(&added.location)
                .ok_or_else(|| LogicError::UnknownName(added.location.clone()))?;
            let (add_to, remove_from) = match added.kind {
                HintImportance::Always => (&mut always_hints, &mut sometimes_hints),
                HintImportance::Sometimes => (&mut sometimes_hints, &mut always_hints),
            };
            if !add_to.contains(&c) {
                add_to.push(c);
                remove_from.retain(|&x| x != c);
            }
        }
        for removed in &dist.removed_locations {
            let c = world
                .check_idx(removed)
                .ok_or_else(|| LogicError::UnknownName(removed.clone()))?;
            always_hints.retain(|&x| x != c);
            sometimes_hints.retain(|&x| x != c);
        }
        always_hints.shuffle(rng);
        sometimes_hints.shuffle(rng);

        // Locations decided up front are never hinted.
        let mut hinted_locations: HashSet<CheckIdx> =
            logic.known_locations.iter().copied().collect();

        let mut required_boss_keys = vec![];
        let mut goals = vec![];
        for name in &settings.required_dungeons {
            let dungeon = world
                .dungeon_of_region(name)
                .ok_or_else(|| LogicError::UnknownName(name.clone()))?;
            required_boss_keys.extend(dungeon.boss_keys.iter().cloned());
            if let Some(goal) = &dungeon.goal {
                goals.push(goal.clone());
            }
        }
        required_boss_keys.shuffle(rng);

        let mut sots_locations = logic.sots_locations(world.win_bit);
        sots_locations.shuffle(rng);

        goals.shuffle(rng);
        let mut goal_bits: Vec<ExtendedItem> = vec![world.win_bit];
        let mut goal_locations = vec![];
        for goal in &goals {
            let bit = world
                .bit(goal)
                .with_context(|| format!("unknown goal {goal}"))?;
            goal_bits.push(bit);
            let mut locs = logic.sots_locations(bit);
            locs.shuffle(rng);
            goal_locations.push(locs);
        }

        let useful = logic.useful_items(&goal_bits);
        let mut hintable_items = world.hintable_items.clone();
        for added in &dist.added_items {
            hintable_items.extend(std::iter::repeat(added.name.clone()).take(added.amount));
        }
        for removed in &dist.removed_items {
            if let Some(loc) = logic.placement.items.get(removed) {
                if let Some(c) = world.check_idx(loc) {
                    hinted_locations.insert(c);
                }
            }
            hintable_items.retain(|i| i != removed);
        }
        hintable_items.shuffle(rng);

        let region_checks = logic.checks_by_hint_region();
        let mut barren_dungeons = vec![];
        let mut barren_overworld_zones = vec![];
        for zone in logic.barren_regions(&useful) {
            if region_checks[&zone]
                .iter()
                .all(|c| hinted_locations.contains(c))
            {
                continue;
            }
            if world.dungeon_of_region(&zone).is_some() {
                barren_dungeons.push(zone);
            } else {
                barren_overworld_zones.push(zone);
            }
        }
        debug!(
            "Hint classification: {} sots locations, {} useful items, barren dungeons {:?}, barren zones {:?}",
            sots_locations.len(),
            useful.len(),
            barren_dungeons,
            barren_overworld_zones
        );

        let mut distribution = dist.distribution.clone();
        if let Some(goal) = distribution.get_mut(&HintType::Goal) {
            goal.fixed *= settings.required_dungeons.len();
        }
        if let Some(always) = distribution.get_mut(&HintType::Always) {
            always.fixed = always_hints.len();
        }

        let mut junk_hints = world.junk_hints.clone();
        junk_hints.shuffle(rng);

        let mut out = HintDistribution {
            world,
            precise_item: settings.precise_item,
            distribution,
            dungeon_sots_limit: dist.dungeon_sots_limit,
            dungeon_barren_limit: dist.dungeon_barren_limit,
            max_hints_for,
            nb_hints,
            not_banned,
            locations: logic.placement.locations.clone(),
            items: logic.placement.items.clone(),
            hinted_locations,
            always_hints,
            sometimes_hints,
            required_boss_keys,
            sots_locations,
            sots_dungeon_placed: 0,
            goals,
            goal_locations,
            goal_index: 0,
            hintable_items,
            region_checks,
            barren_dungeons,
            barren_overworld_zones,
            barren_hinted_areas: HashSet::new(),
            placed_dungeon_barren: 0,
            prev_barren_type: None,
            junk_hints,
            counts_by_type: HashMap::new(),
            hints: vec![],
        };

        let mut needed_fixed: Vec<HintType> = out
            .distribution
            .iter()
            .filter(|(_, s)| s.fixed > 0)
            .map(|(&t, _)| t)
            .collect();
        needed_fixed.sort_by_key(|t| out.distribution[t].order);
        for hint_type in needed_fixed {
            let HintTypeSettings { fixed, copies, .. } = out.distribution[&hint_type];
            for _ in 0..fixed {
                if let Some(hint) = out.create_hint(hint_type, rng) {
                    *out.counts_by_type.entry(hint_type).or_default() += 1;
                    out.hints
                        .extend(std::iter::repeat(hint).take(copies));
                }
            }
        }
        Ok(out)
    }

    /// Fills the remaining slots with weighted picks and returns exactly as many hints as the
    /// stones can hold, or fewer if every hint type has run dry.
    pub fn get_hints<R: Rng>(&mut self, rng: &mut R) -> Vec<GossipStoneHint> {
        let mut exhausted: HashSet<HintType> = HashSet::new();
        while self.hints.len() < self.nb_hints {
            let candidates: Vec<(HintType, f32)> = self
                .distribution
                .iter()
                .filter(|(t, s)| {
                    let count = self.counts_by_type.get(*t).copied().unwrap_or(0);
                    s.weight > 0.0
                        && !exhausted.contains(*t)
                        && s.max.map_or(true, |max| count < max)
                })
                .map(|(&t, s)| (t, s.weight))
                .collect();
            let Ok(index) = WeightedIndex::new(candidates.iter().map(|(_, w)| *w)) else {
                warn!(
                    "Ran out of hints: only {} of {} slots filled",
                    self.hints.len(),
                    self.nb_hints
                );
                break;
            };
            let hint_type = candidates[index.sample(rng)].0;
            match self.create_hint(hint_type, rng) {
                Some(hint) => {
                    *self.counts_by_type.entry(hint_type).or_default() += 1;
                    let copies = self.distribution[&hint_type].copies;
                    self.hints.extend(std::iter::repeat(hint).take(copies));
                }
                None => {
                    exhausted.insert(hint_type);
                }
            }
        }
        let mut hints = std::mem::take(&mut self.hints);
        hints.truncate(self.nb_hints);
        hints
    }

    fn create_hint<R: Rng>(&mut self, hint_type: HintType, rng: &mut R) -> Option<GossipStoneHint> {
        match hint_type {
            HintType::Always => self.create_location_hint(LocationHintKind::Always),
            HintType::Sometimes => self.create_location_hint(LocationHintKind::Sometimes),
            HintType::Sots => self.create_sots_goal_hint(false),
            HintType::Goal => self.create_sots_goal_hint(true),
            HintType::Barren => self.create_barren_hint(rng),
            HintType::Item => self.create_item_hint(),
            HintType::Random => self.create_random_hint(rng),
            HintType::Junk => self.create_junk_hint(rng),
            HintType::Bk => self.create_bk_hint(),
        }
    }

    fn item_at(&self, check: CheckIdx) -> Option<&String> {
        self.locations.get(&self.world.checks[check].name)
    }

    fn location_hint(
        &mut self,
        kind: LocationHintKind,
        check: CheckIdx,
    ) -> Option<GossipStoneHint> {
        let item = self.item_at(check)?.clone();
        self.hinted_locations.insert(check);
        let check_data = &self.world.checks[check];
        Some(GossipStoneHint::Location {
            kind,
            location: check_data.name.clone(),
            item,
            text: check_data.text.clone(),
        })
    }

    fn create_location_hint(&mut self, kind: LocationHintKind) -> Option<GossipStoneHint> {
        loop {
            let check = match kind {
                LocationHintKind::Always => self.always_hints.pop()?,
                _ => self.sometimes_hints.pop()?,
            };
            if self.hinted_locations.contains(&check) {
                continue;
            }
            if let Some(hint) = self.location_hint(kind, check) {
                return Some(hint);
            }
        }
    }

    fn create_bk_hint(&mut self) -> Option<GossipStoneHint> {
        loop {
            let item = self.required_boss_keys.pop()?;
            let Some(check) = self
                .items
                .get(&item)
                .and_then(|loc| self.world.check_idx(loc))
            else {
                continue;
            };
            if self.hinted_locations.contains(&check) {
                continue;
            }
            if let Some(hint) = self.location_hint(LocationHintKind::BossKey, check) {
                return Some(hint);
            }
        }
    }

    fn create_item_hint(&mut self) -> Option<GossipStoneHint> {
        loop {
            let item = self.hintable_items.pop()?;
            let Some(check) = self
                .items
                .get(&item)
                .and_then(|loc| self.world.check_idx(loc))
            else {
                continue;
            };
            if self.hinted_locations.contains(&check) {
                continue;
            }
            if self.precise_item {
                if let Some(hint) = self.location_hint(LocationHintKind::PreciseItem, check) {
                    return Some(hint);
                }
                continue;
            }
            self.hinted_locations.insert(check);
            let check_data = &self.world.checks[check];
            return Some(GossipStoneHint::ZoneItem {
                location: check_data.name.clone(),
                item,
                zone: check_data.hint_region.clone(),
            });
        }
    }

    fn create_random_hint<R: Rng>(&mut self, rng: &mut R) -> Option<GossipStoneHint> {
        let candidates: Vec<CheckIdx> = self
            .locations
            .keys()
            .filter_map(|loc| self.world.check_idx(loc))
            .filter(|&c| {
                let check = &self.world.checks[c];
                !self.hinted_locations.contains(&c)
                    && self.not_banned.contains(check.item)
                    && !check
                        .hint_region
                        .as_ref()
                        .is_some_and(|r| self.barren_hinted_areas.contains(r))
            })
            .collect();
        let &check = candidates.choose(rng)?;
        self.location_hint(LocationHintKind::Random, check)
    }

    fn is_dungeon(&self, zone: Option<&String>) -> bool {
        zone.is_some_and(|z| self.world.dungeon_of_region(z).is_some())
    }

    fn create_sots_goal_hint(&mut self, goal_mode: bool) -> Option<GossipStoneHint> {
        loop {
            let popped = if goal_mode {
                if self.goals.is_empty() {
                    return None;
                }
                self.goal_locations[self.goal_index].pop()
            } else {
                self.sots_locations.pop()
            };
            let Some(check) = popped else {
                if !goal_mode || self.goal_locations.iter().all(|l| l.is_empty()) {
                    return None;
                }
                // Nothing left for this goal, try the next one.
                self.goal_index = (self.goal_index + 1) % self.goals.len();
                continue;
            };
            if self.hinted_locations.contains(&check) {
                continue;
            }
            let zone = self.world.checks[check].hint_region.clone();
            let in_dungeon = self.is_dungeon(zone.as_ref());
            if in_dungeon && self.sots_dungeon_placed >= self.dungeon_sots_limit {
                continue;
            }
            let Some(item) = self.item_at(check).cloned() else {
                continue;
            };
            if in_dungeon {
                self.sots_dungeon_placed += 1;
            }
            self.hinted_locations.insert(check);
            let goal = if goal_mode {
                let goal = self.goals[self.goal_index].clone();
                self.goal_index = (self.goal_index + 1) % self.goals.len();
                Some(goal)
            } else {
                None
            };
            return Some(GossipStoneHint::SotsGoal {
                location: self.world.checks[check].name.clone(),
                item,
                zone,
                goal,
            });
        }
    }

    fn create_barren_hint<R: Rng>(&mut self, rng: &mut R) -> Option<GossipStoneHint> {
        // (dungeon weight, overworld weight); alternate after the first pick.
        let (dungeon_weight, overworld_weight) = match self.prev_barren_type {
            None => (1, 1),
            Some(BarrenKind::Dungeon) => (1, 3),
            Some(BarrenKind::Overworld) => (3, 1),
        };
        let mut kind = if rng.gen_range(0..dungeon_weight + overworld_weight) < dungeon_weight {
            BarrenKind::Dungeon
        } else {
            BarrenKind::Overworld
        };
        if self.placed_dungeon_barren >= self.dungeon_barren_limit {
            kind = BarrenKind::Overworld;
        }

        let region_checks = &self.region_checks;
        let has_checks = |zone: &String| region_checks.get(zone).is_some_and(|c| !c.is_empty());
        self.barren_dungeons.retain(|z| has_checks(z));
        self.barren_overworld_zones.retain(|z| has_checks(z));
        if self.barren_dungeons.is_empty() {
            if self.barren_overworld_zones.is_empty() {
                return None;
            }
            kind = BarrenKind::Overworld;
        }
        if self.barren_overworld_zones.is_empty() {
            kind = BarrenKind::Dungeon;
        }

        let zones = match kind {
            BarrenKind::Dungeon => &mut self.barren_dungeons,
            BarrenKind::Overworld => &mut self.barren_overworld_zones,
        };
        let weights = zones.iter().map(|z| region_checks[z].len());
        let index = WeightedIndex::new(weights).ok()?.sample(rng);
        let zone = zones.remove(index);
        if kind == BarrenKind::Dungeon {
            self.placed_dungeon_barren += 1;
        }
        self.barren_hinted_areas.insert(zone.clone());
        self.prev_barren_type = Some(kind);
        Some(GossipStoneHint::Barren { zone })
    }

    fn create_junk_hint<R: Rng>(&mut self, rng: &mut R) -> Option<GossipStoneHint> {
        let text = self.junk_hints.choose(rng)?.clone();
        Some(GossipStoneHint::Junk { text })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logic::LogicSettings;
    use crate::settings::HintDistributionSettings;
    use rand::SeedableRng;
    use ssrando_game::{Dungeon, RequirementSpec, TimeOfDay, WorldBuilder};

    fn dungeon_world() -> Result<World> {
        let mut b = WorldBuilder::new();
        b.add_item("Sword");
        let dungeon = b.add_area(None, "Dungeon", TimeOfDay::DayOnly);
        b.area_mut(dungeon).hint_region = Some("Dungeon".to_string());
        b.add_location(dungeon, "Chest 1", RequirementSpec::Free);
        b.add_location(dungeon, "Chest 2", RequirementSpec::Free);
        b.add_event(dungeon, "Done", RequirementSpec::Free);
        b.add_stone(dungeon, "Stone", RequirementSpec::Free);
        b.add_dungeon(Dungeon {
            name: "Dungeon".to_string(),
            goal: None,
            boss_keys: vec![],
        });
        b.set_start_area("Dungeon");
        b.set_win_condition("Dungeon/Done");
        b.build()
    }

    #[test]
    fn empty_location_does_not_use_dungeon_sots_quota() -> Result<()> {
        let world = dungeon_world()?;
        let settings = LogicSettings {
            starting_inventory: Inventory::new(),
            starting_area: world.start_area,
            additional_requirements: vec![],
            exit_pools: vec![],
        };
        let mut logic = Logic::new(&world, settings, None)?;
        let chest_1 = world.check_idx("Dungeon/Chest 1").unwrap();
        let chest_2 = world.check_idx("Dungeon/Chest 2").unwrap();
        logic.place_item(chest_2, "Sword")?;

        let hint_settings = HintSettings {
            enabled: true,
            distribution: HintDistributionSettings {
                distribution: BTreeMap::from([(
                    HintType::Junk,
                    HintTypeSettings {
                        order: 0,
                        weight: 1.0,
                        fixed: 0,
                        copies: 1,
                        max: None,
                    },
                )]),
                ..Default::default()
            },
            ..Default::default()
        };
        let mut rng = rand::rngs::StdRng::seed_from_u64(0);
        let mut dist = HintDistribution::start(&mut logic, &mut rng, &hint_settings)?;

        // The empty chest comes up first and must be skipped without counting.
        dist.sots_locations = vec![chest_2, chest_1];
        dist.dungeon_sots_limit = 1;
        dist.hinted_locations.clear();
        let hint = dist.create_sots_goal_hint(false);
        assert_eq!(
            hint.as_ref().and_then(|h| h.location()),
            Some("Dungeon/Chest 2")
        );
        assert_eq!(dist.sots_dungeon_placed, 1);
        Ok(())
    }
}
