pub mod overlay;
pub mod simplify;

use anyhow::{bail, Context, Result};
use hashbrown::HashMap;
use log::debug;
use ssrando_game::{AreaIdx, CheckIdx, EntranceIdx, ExitIdx, IndexedVec, StoneIdx, World};
use ssrando_logic::{ExtendedItem, Inventory, Requirement};
use thiserror::Error;

use self::overlay::{aggregate_required_items, fill, items_behind, RequirementOverlay};
use crate::placement::Placement;

/// Misuse of the placement and linking primitives. These indicate a bug in the caller.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LogicError {
    #[error("location {0} is already taken")]
    LocationOccupied(String),
    #[error("item {0} is already placed")]
    ItemAlreadyPlaced(String),
    #[error("location {0} is not taken")]
    LocationNotOccupied(String),
    #[error("item {item} cannot be placed in {location}, it must be placed in {limit}")]
    OutsidePlacementLimit {
        item: String,
        location: String,
        limit: String,
    },
    #[error("exit {0} is not linked")]
    NotLinked(String),
    #[error("{0} is already linked")]
    AlreadyLinked(String),
    #[error("unknown name {0}")]
    UnknownName(String),
    #[error("gossip stone {0} cannot hold more hints")]
    StoneFull(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Transition {
    Exit(ExitIdx),
    Entrance(EntranceIdx),
}

/// Orders a constraint pair as (exit, entrance), whichever way round it was given.
pub fn order_entrance_exit(a: Transition, b: Transition) -> Option<(ExitIdx, EntranceIdx)> {
    match (a, b) {
        (Transition::Exit(x), Transition::Entrance(e)) => Some((x, e)),
        (Transition::Entrance(e), Transition::Exit(x)) => Some((x, e)),
        _ => None,
    }
}

#[derive(Clone, Debug)]
pub struct PoolEntrance {
    pub entrance: EntranceIdx,
    pub constraints: Vec<Transition>,
}

#[derive(Clone, Debug)]
pub struct PoolExit {
    pub exit: ExitIdx,
    pub constraints: Vec<Transition>,
}

/// Entrances and exits that may be freely connected to each other.
#[derive(Clone, Debug, Default)]
pub struct ExitPool {
    pub entrances: Vec<PoolEntrance>,
    pub exits: Vec<PoolExit>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlacementLimit {
    Anywhere,
    Area(AreaIdx),
    Check(CheckIdx),
}

pub struct LogicSettings {
    pub starting_inventory: Inventory,
    pub starting_area: AreaIdx,
    pub additional_requirements: Vec<(ExtendedItem, Requirement)>,
    pub exit_pools: Vec<ExitPool>,
}

pub fn make_exit_pool(i: usize) -> String {
    format!("Exit pool {i}")
}

/// The requirement graph together with the current placement.
///
/// `requirements` is the live table; `backup_requirements` holds the same table without any
/// tentative change and is what removals roll back to. `full_inventory` is always the fixed point
/// of `requirements` seeded with `inventory`.
pub struct Logic<'a> {
    pub world: &'a World,
    pub item_names: IndexedVec<String>,
    pub requirements: Vec<Requirement>,
    pub backup_requirements: Vec<Requirement>,
    pub opaque: Vec<bool>,
    pub inventory: Inventory,
    pub full_inventory: Inventory,
    pub aggregate: Inventory, // Items mentioned by the requirement of some reached item
    pub placement: Placement,
    pub pools: Vec<ExitPool>,
    pub pool_bits: Vec<ExtendedItem>,
    pub accessibility_check_bit: ExtendedItem,
    pub known_locations: Vec<CheckIdx>, // Locations decided before the logic was built
    restricted_cache: HashMap<Inventory, Inventory>,
}

impl<'a> Logic<'a> {
    pub fn new(
        world: &'a World,
        settings: LogicSettings,
        placement: Option<&Placement>,
    ) -> Result<Logic<'a>> {
        let mut requirements = world.requirements.clone();
        for (item, req) in &settings.additional_requirements {
            requirements[*item] &= req;
        }
        let starting_area_bit = world.area_bit(settings.starting_area);
        let inventory = settings.starting_inventory.with(starting_area_bit);

        let mut logic = Logic {
            world,
            item_names: world.item_isv.clone(),
            requirements,
            backup_requirements: vec![],
            opaque: world.opaque.clone(),
            full_inventory: inventory.clone(),
            inventory,
            aggregate: Inventory::new(),
            placement: Placement::new(),
            pools: vec![],
            pool_bits: vec![],
            accessibility_check_bit: starting_area_bit,
            known_locations: vec![],
            restricted_cache: HashMap::new(),
        };

        for (i, pool) in settings.exit_pools.iter().enumerate() {
            let pool_bit = logic.register_item(&make_exit_pool(i))?;
            logic.pool_bits.push(pool_bit);
            for entrance in &pool.entrances {
                for bit in world.entrances[entrance.entrance].bits.all_bits() {
                    logic.requirements[bit] = Requirement::item(pool_bit);
                    logic.opaque[bit] = true;
                }
            }
        }
        logic.pools = settings.exit_pools;
        logic.backup_requirements = logic.requirements.clone();
        logic.refresh_pool_requirements();

        if let Some(placement) = placement {
            logic.placement.item_placement_limit = placement.item_placement_limit.clone();
            for (exit, entrance) in &placement.map_transitions {
                let x = world
                    .exit_idx(exit)
                    .ok_or_else(|| LogicError::UnknownName(exit.clone()))?;
                let e = world
                    .entrance_idx(entrance)
                    .ok_or_else(|| LogicError::UnknownName(entrance.clone()))?;
                logic.commit_link(&[(x, e)]);
            }
            for (location, item) in &placement.locations {
                let check = world
                    .check_idx(location)
                    .ok_or_else(|| LogicError::UnknownName(location.clone()))?;
                logic.assign_location(check, item);
                logic.known_locations.push(check);
            }
            for (stone, hints) in &placement.stones {
                logic.placement.stones.insert(stone.clone(), hints.clone());
            }
            logic.placement.hints = placement.hints.clone();
        }

        logic.fill_inventory(false);
        // Held items are reached whatever their requirement says, so it must not be inlined.
        let mut keep = logic.opaque.clone();
        for item in logic.inventory.iter() {
            keep[item] = true;
        }
        simplify::shallow_simplify(&mut logic.requirements, &keep);
        logic.backup_requirements = logic.requirements.clone();
        logic.fill_inventory(false);
        debug!(
            "Logic built: {} extended items, {} reachable",
            logic.requirements.len(),
            logic.full_inventory.len()
        );
        Ok(logic)
    }

    pub fn num_items(&self) -> usize {
        self.requirements.len()
    }

    /// Appends a synthetic extended item, unreachable until something assigns its requirement.
    pub fn register_item(&mut self, name: &str) -> Result<ExtendedItem> {
        if self.item_names.index_by_key.contains_key(name) {
            bail!("extended item {name} is already registered");
        }
        let item = self.item_names.add(name);
        self.requirements.push(Requirement::never());
        self.backup_requirements.push(Requirement::never());
        self.opaque.push(true);
        Ok(item)
    }

    pub fn item_bit(&self, name: &str) -> Option<ExtendedItem> {
        self.item_names.index_by_key.get(name).copied()
    }

    pub fn item_name(&self, item: ExtendedItem) -> &str {
        &self.item_names.keys[item]
    }

    /// ANDs `req` onto both the live and the backup requirement of `item`.
    pub fn add_requirement(&mut self, item: ExtendedItem, req: &Requirement) {
        self.requirements[item] &= req;
        self.backup_requirements[item] &= req;
    }

    pub fn fill_inventory(&mut self, monotonic: bool) {
        let seed = if monotonic {
            &self.full_inventory | &self.inventory
        } else {
            self.inventory.clone()
        };
        self.full_inventory = fill(&self.requirements, seed);
        self.aggregate = aggregate_required_items(&self.requirements, &self.full_inventory);
        self.restricted_cache.clear();
    }

    pub fn add_item(&mut self, item: ExtendedItem) {
        self.inventory.insert(item);
        self.fill_inventory(true);
    }

    pub fn remove_item(&mut self, item: ExtendedItem) {
        if !self.inventory.contains(item) {
            return;
        }
        self.inventory.remove(item);
        if self.aggregate.contains(item) {
            self.fill_inventory(false);
        } else if !self.requirements[item].eval(&self.full_inventory.without(item)) {
            self.full_inventory.remove(item);
            self.restricted_cache.clear();
        }
    }

    pub fn fill_from(&self, seed: Inventory) -> Inventory {
        fill(&self.requirements, seed)
    }

    pub fn is_reachable(&self, item: ExtendedItem) -> bool {
        self.full_inventory.contains(item)
    }

    /// Whether the completion sentinel is reached from the current inventory, without going
    /// through banned locations.
    pub fn is_completable(&self) -> bool {
        self.fill_from(self.inventory.without(self.world.banned_bit))
            .contains(self.world.everything_unbanned_bit)
    }

    /// Items that some way of reaching the completion sentinel goes through, with the current
    /// inventory held.
    pub fn completion_items(&self) -> Inventory {
        let full = self.fill_from(self.inventory.without(self.world.banned_bit));
        items_behind(&self.requirements, &full, self.world.everything_unbanned_bit)
    }

    /// Fixed point of the live requirements with every item of `banned` made unreachable.
    /// Results are memoized until the next change to the live state.
    pub fn fill_restricted(&mut self, banned: &[ExtendedItem]) -> Inventory {
        let key: Inventory = banned.iter().copied().collect();
        if let Some(full) = self.restricted_cache.get(&key) {
            return full.clone();
        }
        let mut overlay = RequirementOverlay::new(&self.requirements);
        for &item in banned {
            overlay.ban(item);
        }
        let full = fill(&overlay, &self.inventory - &key);
        self.restricted_cache.insert(key, full.clone());
        full
    }

    pub fn check_name(&self, check: CheckIdx) -> &str {
        &self.world.checks[check].name
    }

    pub fn item_at(&self, check: CheckIdx) -> Option<&str> {
        self.placement
            .locations
            .get(self.check_name(check))
            .map(|s| s.as_str())
    }

    pub fn is_occupied(&self, check: CheckIdx) -> bool {
        self.placement.is_occupied(self.check_name(check))
    }

    pub fn placement_limit(&self, item: &str) -> Result<PlacementLimit> {
        let Some(limit) = self.placement.item_placement_limit.get(item) else {
            return Ok(PlacementLimit::Anywhere);
        };
        if let Some(check) = self.world.check_idx(limit) {
            Ok(PlacementLimit::Check(check))
        } else if let Some(area) = self.world.area_idx(limit) {
            Ok(PlacementLimit::Area(area))
        } else {
            Err(LogicError::UnknownName(limit.clone()).into())
        }
    }

    fn checks_in_limit(&self, limit: PlacementLimit) -> Vec<CheckIdx> {
        match limit {
            PlacementLimit::Anywhere => (0..self.world.checks.len()).collect(),
            PlacementLimit::Area(area) => self.world.checks_in_subtree(area).to_vec(),
            PlacementLimit::Check(check) => vec![check],
        }
    }

    fn within_limit(&self, limit: PlacementLimit, check: CheckIdx) -> bool {
        match limit {
            PlacementLimit::Anywhere => true,
            PlacementLimit::Area(area) => self.world.checks_in_subtree(area).contains(&check),
            PlacementLimit::Check(c) => c == check,
        }
    }

    /// Reachable checks within `limit`, occupied or not.
    pub fn reachable_checks(&self, limit: PlacementLimit) -> Vec<CheckIdx> {
        self.checks_in_limit(limit)
            .into_iter()
            .filter(|&c| self.full_inventory.contains(self.world.checks[c].item))
            .collect()
    }

    /// Reachable checks within `limit` that do not hold an item yet.
    pub fn accessible_checks(&self, limit: PlacementLimit) -> Vec<CheckIdx> {
        self.reachable_checks(limit)
            .into_iter()
            .filter(|&c| !self.is_occupied(c))
            .collect()
    }

    /// Indices into `pools[pool].exits` of the exits currently reachable.
    pub fn accessible_exits(&self, pool: usize) -> Vec<usize> {
        self.pools[pool]
            .exits
            .iter()
            .enumerate()
            .filter(|(_, x)| {
                self.full_inventory
                    .contains(self.world.exits[x.exit].item)
            })
            .map(|(i, _)| i)
            .collect()
    }

    pub fn accessible_stones(&self) -> Vec<StoneIdx> {
        (0..self.world.stones.len())
            .filter(|&s| self.full_inventory.contains(self.world.stones[s].item))
            .collect()
    }

    fn assign_location(&mut self, check: CheckIdx, item: &str) {
        let location = self.world.checks[check].name.clone();
        if let Some(bit) = self.item_bit(item) {
            let req = Requirement::item(self.world.checks[check].item);
            self.requirements[bit] = req.clone();
            self.backup_requirements[bit] = req;
            self.opaque[bit] = true;
            self.placement
                .items
                .insert(item.to_string(), location.clone());
        }
        self.placement.locations.insert(location, item.to_string());
    }

    fn check_placeable(&self, check: CheckIdx, item: &str) -> Result<()> {
        if self.placement.items.contains_key(item) {
            return Err(LogicError::ItemAlreadyPlaced(item.to_string()).into());
        }
        let limit = self.placement_limit(item)?;
        if !self.within_limit(limit, check) {
            return Err(LogicError::OutsidePlacementLimit {
                item: item.to_string(),
                location: self.check_name(check).to_string(),
                limit: self.placement.item_placement_limit[item].clone(),
            }
            .into());
        }
        Ok(())
    }

    /// Puts `item` at `check`. Registered items then become reachable exactly when the check is.
    pub fn place_item(&mut self, check: CheckIdx, item: &str) -> Result<()> {
        if self.is_occupied(check) {
            return Err(LogicError::LocationOccupied(self.check_name(check).to_string()).into());
        }
        self.check_placeable(check, item)?;
        self.assign_location(check, item);
        if self.item_bit(item).is_some() {
            self.fill_inventory(true);
        }
        Ok(())
    }

    /// Swaps the item at `check` for `item`, returning the item that was there.
    pub fn replace_item(&mut self, check: CheckIdx, item: &str) -> Result<String> {
        let location = self.check_name(check).to_string();
        if !self.placement.is_occupied(&location) {
            return Err(LogicError::LocationNotOccupied(location).into());
        }
        self.check_placeable(check, item)?;
        let old_item = self
            .placement
            .locations
            .remove(&location)
            .context("occupied location has no item")?;
        self.placement.items.remove(&old_item);
        if let Some(old_bit) = self.item_bit(&old_item) {
            self.opaque[old_bit] = false;
            self.backup_requirements[old_bit] = Requirement::never();
            self.requirements = self.backup_requirements.clone();
            self.fill_inventory(false);
        }
        self.place_item(check, item)?;
        Ok(old_item)
    }

    pub fn place_hint(&mut self, stone: StoneIdx, hint: &str, capacity: usize) -> Result<()> {
        let stone_name = self.world.stones[stone].name.clone();
        if self.placement.hints_on(&stone_name).len() >= capacity {
            return Err(LogicError::StoneFull(stone_name).into());
        }
        if self
            .placement
            .stones
            .values()
            .any(|hints| hints.iter().any(|h| h == hint))
        {
            return Err(LogicError::ItemAlreadyPlaced(hint.to_string()).into());
        }
        self.placement
            .stones
            .entry(stone_name)
            .or_default()
            .push(hint.to_string());
        if let Some(bit) = self.item_bit(hint) {
            let req = Requirement::item(self.world.stones[stone].item);
            self.requirements[bit] = req.clone();
            self.backup_requirements[bit] = req;
            self.opaque[bit] = true;
            self.fill_inventory(true);
        }
        Ok(())
    }

    pub fn replace_hint(&mut self, stone: StoneIdx, hint: &str, old_hint: &str) -> Result<()> {
        let stone_name = self.world.stones[stone].name.clone();
        let hints = self
            .placement
            .stones
            .get_mut(&stone_name)
            .ok_or_else(|| LogicError::LocationNotOccupied(stone_name.clone()))?;
        let pos = hints
            .iter()
            .position(|h| h == old_hint)
            .ok_or_else(|| LogicError::LocationNotOccupied(format!("{stone_name}: {old_hint}")))?;
        hints.remove(pos);
        if let Some(old_bit) = self.item_bit(old_hint) {
            self.opaque[old_bit] = false;
            self.backup_requirements[old_bit] = Requirement::never();
            self.requirements = self.backup_requirements.clone();
            self.fill_inventory(false);
        }
        self.place_hint(stone, hint, usize::MAX)
    }

    pub fn pool_of_entrance(&self, entrance: EntranceIdx) -> Option<usize> {
        self.pools
            .iter()
            .position(|p| p.entrances.iter().any(|e| e.entrance == entrance))
    }

    pub fn is_exit_linked(&self, exit: ExitIdx) -> bool {
        self.placement
            .map_transitions
            .contains_key(&self.world.exits[exit].name)
    }

    pub fn is_entrance_linked(&self, entrance: EntranceIdx) -> bool {
        self.placement
            .reverse_map_transitions
            .contains_key(&self.world.entrances[entrance].name)
    }

    fn unlinked_requirement(&self, entrance: EntranceIdx, bit: ExtendedItem) -> Requirement {
        match self.pool_of_entrance(entrance) {
            Some(pool) => Requirement::item(self.pool_bits[pool]),
            None => self.world.requirements[bit].clone(),
        }
    }

    /// OR of the exits of `pool` that lead nowhere yet, also treating `assigned` as taken.
    fn pool_requirement(&self, pool: usize, assigned: &[ExitIdx]) -> Requirement {
        Requirement::any_of(
            self.pools[pool]
                .exits
                .iter()
                .filter(|x| !assigned.contains(&x.exit) && !self.is_exit_linked(x.exit))
                .map(|x| self.world.exits[x.exit].item),
        )
    }

    fn refresh_pool_requirements(&mut self) {
        for pool in 0..self.pools.len() {
            let req = self.pool_requirement(pool, &[]);
            let bit = self.pool_bits[pool];
            self.requirements[bit] = req.clone();
            self.backup_requirements[bit] = req;
        }
    }

    fn reset_entrance(&mut self, entrance: EntranceIdx) {
        for bit in self.world.entrances[entrance].bits.all_bits() {
            let req = self.unlinked_requirement(entrance, bit);
            self.requirements[bit] = req.clone();
            self.backup_requirements[bit] = req;
            self.opaque[bit] = true;
        }
    }

    /// The connection itself followed by its constraint partners.
    fn link_group(
        &self,
        pool: usize,
        exit: usize,
        entrance: usize,
    ) -> Result<Vec<(ExitIdx, EntranceIdx)>> {
        let pool_exit = &self.pools[pool].exits[exit];
        let pool_entrance = &self.pools[pool].entrances[entrance];
        let mut pairs = vec![(pool_exit.exit, pool_entrance.entrance)];
        for (&a, &b) in pool_exit
            .constraints
            .iter()
            .zip(pool_entrance.constraints.iter())
        {
            let pair = order_entrance_exit(a, b).with_context(|| {
                format!(
                    "constraints of {} and {} do not pair an exit with an entrance",
                    self.world.exits[pool_exit.exit].name,
                    self.world.entrances[pool_entrance.entrance].name
                )
            })?;
            pairs.push(pair);
        }
        Ok(pairs)
    }

    /// Tests the connections on an overlay: from where each one lands, the start must still be
    /// reachable.
    fn can_link(&self, pairs: &[(ExitIdx, EntranceIdx)], released: &[EntranceIdx]) -> bool {
        let mut overlay = RequirementOverlay::new(&self.requirements);
        for &entrance in released {
            for bit in self.world.entrances[entrance].bits.all_bits() {
                overlay.set(bit, self.unlinked_requirement(entrance, bit));
            }
        }
        for &(exit, entrance) in pairs {
            for (bit, req) in self.world.link_requirements(exit, entrance) {
                overlay.set(bit, req);
            }
        }
        let assigned: Vec<ExitIdx> = pairs.iter().map(|&(x, _)| x).collect();
        for pool in 0..self.pools.len() {
            overlay.set(self.pool_bits[pool], self.pool_requirement(pool, &assigned));
        }

        let base = self.inventory.without(self.accessibility_check_bit);
        pairs.iter().all(|&(_, entrance)| {
            let entrance_data = &self.world.entrances[entrance];
            let mut seed = base.clone();
            for bit in entrance_data.bits.all_bits() {
                seed.insert(bit);
            }
            for bit in self.world.areas[entrance_data.area].bits.all_bits() {
                seed.insert(bit);
            }
            fill(&overlay, seed).contains(self.accessibility_check_bit)
        })
    }

    fn commit_link(&mut self, pairs: &[(ExitIdx, EntranceIdx)]) {
        for &(exit, entrance) in pairs {
            let exit_name = self.world.exits[exit].name.clone();
            let entrance_name = self.world.entrances[entrance].name.clone();
            if let Some(old_entrance) = self.placement.unlink_exit(&exit_name) {
                if let Some(old) = self.world.entrance_idx(&old_entrance) {
                    self.reset_entrance(old);
                }
            }
            self.placement.unlink_entrance(&entrance_name);
            self.placement.link(&exit_name, &entrance_name);
            for (bit, req) in self.world.link_requirements(exit, entrance) {
                self.requirements[bit] = req.clone();
                self.backup_requirements[bit] = req;
                self.opaque[bit] = true;
            }
        }
        self.refresh_pool_requirements();
    }

    /// Connects an unassigned exit of `pool` to an unassigned entrance, along with their
    /// constraint partners. Returns false, leaving everything untouched, if the start would no
    /// longer be reachable from where the connection lands.
    pub fn link_connection(&mut self, pool: usize, exit: usize, entrance: usize) -> Result<bool> {
        let pairs = self.link_group(pool, exit, entrance)?;
        for &(x, e) in &pairs {
            if self.is_exit_linked(x) {
                return Err(LogicError::AlreadyLinked(self.world.exits[x].name.clone()).into());
            }
            if self.is_entrance_linked(e) {
                return Err(LogicError::AlreadyLinked(self.world.entrances[e].name.clone()).into());
            }
        }
        if !self.can_link(&pairs, &[]) {
            return Ok(false);
        }
        self.commit_link(&pairs);
        self.fill_inventory(false);
        Ok(true)
    }

    /// Points an already linked exit of `pool` at a new entrance. The previous entrance and its
    /// constraint partners go back to being unassigned; their index in `pools[pool].entrances`
    /// is returned so the caller can seat it again. Returns `None` if the new connection fails
    /// the reachability check.
    pub fn relink_connection(
        &mut self,
        pool: usize,
        exit: usize,
        entrance: usize,
    ) -> Result<Option<usize>> {
        let pairs = self.link_group(pool, exit, entrance)?;
        let (exit_idx, entrance_idx) = pairs[0];
        let exit_name = self.world.exits[exit_idx].name.clone();
        let old_entrance_name = self
            .placement
            .map_transitions
            .get(&exit_name)
            .cloned()
            .ok_or_else(|| LogicError::NotLinked(exit_name.clone()))?;
        if self.is_entrance_linked(entrance_idx) {
            return Err(
                LogicError::AlreadyLinked(self.world.entrances[entrance_idx].name.clone()).into(),
            );
        }
        let old_entrance = self
            .world
            .entrance_idx(&old_entrance_name)
            .ok_or_else(|| LogicError::UnknownName(old_entrance_name.clone()))?;
        if !self.can_link(&pairs, &[old_entrance]) {
            return Ok(None);
        }

        let old_idx = self.pools[pool]
            .entrances
            .iter()
            .position(|e| e.entrance == old_entrance)
            .with_context(|| format!("{old_entrance_name} is not part of exit pool {pool}"))?;
        self.placement.unlink_exit(&exit_name);
        self.reset_entrance(old_entrance);
        for constraint in self.pools[pool].entrances[old_idx].constraints.clone() {
            match constraint {
                Transition::Entrance(e) => {
                    let name = self.world.entrances[e].name.clone();
                    if self.placement.unlink_entrance(&name).is_some() {
                        self.reset_entrance(e);
                    }
                }
                Transition::Exit(x) => {
                    let name = self.world.exits[x].name.clone();
                    if let Some(linked) = self.placement.unlink_exit(&name) {
                        if let Some(e) = self.world.entrance_idx(&linked) {
                            self.reset_entrance(e);
                        }
                    }
                }
            }
        }
        self.requirements = self.backup_requirements.clone();
        self.commit_link(&pairs);
        self.fill_inventory(false);
        Ok(Some(old_idx))
    }
}
