pub mod bfa;

use anyhow::{bail, ensure, Result};
use hashbrown::HashSet;
use log::info;
use rand::SeedableRng;
use serde_derive::{Deserialize, Serialize};
use ssrando_game::{AreaIdx, World};
use ssrando_logic::{ExtendedItem, Inventory, Requirement};
use std::collections::BTreeMap;
use thiserror::Error;

use self::bfa::Bfa;
use crate::hints::{GossipStoneHint, Hints};
use crate::logic::{
    ExitPool, Logic, LogicError, LogicSettings, PoolEntrance, PoolExit, Transition,
};
use crate::placement::Placement;
use crate::settings::{PoolConnectionSettings, RandomizerSettings};
use crate::spoiler_log::SpoilerLog;

// Bound on chains of displaced items, hints and bumped entrances.
pub const MAX_DEPTH: usize = 50;

/// Ends the current attempt. The caller may retry with another seed.
#[derive(Debug, Error)]
#[error("generation failed: {0}")]
pub struct GenerationFailed(pub String);

/// Where progress messages go, and how fatal conditions are built.
pub trait UserOutput {
    fn progress(&mut self, message: &str);

    fn generation_failed(&self, message: String) -> anyhow::Error {
        GenerationFailed(message).into()
    }
}

/// Forwards progress to the log, once per distinct phase.
pub struct LogOutput {
    attempt_num: usize,
    last_message: String,
}

impl LogOutput {
    pub fn new(attempt_num: usize) -> Self {
        LogOutput {
            attempt_num,
            last_message: String::new(),
        }
    }
}

impl UserOutput for LogOutput {
    fn progress(&mut self, message: &str) {
        if message != self.last_message {
            info!("[attempt {}] {}", self.attempt_num, message);
            self.last_message = message.to_string();
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Randomization {
    pub seed: usize,
    pub placement: Placement,
    pub hints: BTreeMap<String, Vec<GossipStoneHint>>, // gossip stone -> hints
    pub spoiler_log: SpoilerLog,
}

pub struct Randomizer<'a> {
    pub world: &'a World,
    pub settings: &'a RandomizerSettings,
    starting_inventory: Inventory,
    starting_area: AreaIdx,
    additional_requirements: Vec<(ExtendedItem, Requirement)>,
    exit_pools: Vec<ExitPool>,
    start_placement: Placement,
    must_be_placed_items: Vec<String>,
    may_be_placed_items: Vec<String>,
}

fn physical_item(world: &World, name: &str) -> Result<ExtendedItem> {
    match world.bit(name) {
        Some(bit) if world.is_physical_item(bit) => Ok(bit),
        _ => Err(LogicError::UnknownName(name.to_string()).into()),
    }
}

fn pool_transition(world: &World, name: &str) -> Result<Transition> {
    if let Some(exit) = world.exit_idx(name) {
        Ok(Transition::Exit(exit))
    } else if let Some(entrance) = world.entrance_idx(name) {
        Ok(Transition::Entrance(entrance))
    } else {
        Err(LogicError::UnknownName(name.to_string()).into())
    }
}

fn pool_constraints(world: &World, conn: &PoolConnectionSettings) -> Result<Vec<Transition>> {
    conn.constraints
        .iter()
        .map(|c| pool_transition(world, c))
        .collect()
}

impl<'a> Randomizer<'a> {
    pub fn new(world: &'a World, settings: &'a RandomizerSettings) -> Result<Randomizer<'a>> {
        let mut start_placement = Placement::new();
        for (location, item) in &settings.placed_items {
            let check = world
                .check_idx(location)
                .ok_or_else(|| LogicError::UnknownName(location.clone()))?;
            let location = world.checks[check].name.clone();
            if let Some(bit) = world.bit(item) {
                let full = world.item_name(bit).to_string();
                ensure!(
                    !start_placement.items.contains_key(&full),
                    "{full} is placed twice"
                );
                start_placement.items.insert(full.clone(), location.clone());
                start_placement.locations.insert(location, full);
            } else {
                start_placement.locations.insert(location, item.clone());
            }
        }

        let mut starting_inventory = Inventory::new();
        for item in &settings.starting_items {
            starting_inventory.insert(physical_item(world, item)?);
        }
        // Assumed fill: everything left to place starts in the inventory.
        let mut must_be_placed_items = vec![];
        let mut may_be_placed_items = vec![];
        for (items, out) in [
            (&settings.must_be_placed_items, &mut must_be_placed_items),
            (&settings.may_be_placed_items, &mut may_be_placed_items),
        ] {
            for item in items {
                let bit = physical_item(world, item)?;
                let full = world.item_name(bit).to_string();
                if start_placement.items.contains_key(&full) {
                    continue;
                }
                starting_inventory.insert(bit);
                out.push(full);
            }
        }
        for item in &settings.duplicable_items {
            if world.bit(item).is_some() {
                bail!("duplicable item {item} cannot appear in requirements");
            }
        }

        let starting_area = match &settings.start_area {
            Some(name) => world
                .area_idx(name)
                .ok_or_else(|| LogicError::UnknownName(name.clone()))?,
            None => world.start_area,
        };

        let mut additional_requirements = vec![];
        let mut banned: HashSet<usize> = HashSet::new();
        for location in &settings.banned_locations {
            let check = world
                .check_idx(location)
                .ok_or_else(|| LogicError::UnknownName(location.clone()))?;
            banned.insert(check);
            additional_requirements.push((
                world.checks[check].item,
                Requirement::item(world.banned_bit),
            ));
        }
        if settings.all_locations_reachable {
            let unbanned: Inventory = (0..world.checks.len())
                .filter(|c| !banned.contains(c))
                .map(|c| world.checks[c].item)
                .collect();
            additional_requirements.push((
                world.everything_unbanned_bit,
                Requirement::all_of(unbanned),
            ));
        }

        let mut exit_pools = vec![];
        let mut pooled: HashSet<Transition> = HashSet::new();
        for pool_settings in &settings.entrance_pools {
            let mut pool = ExitPool::default();
            for conn in &pool_settings.entrances {
                let entrance = world
                    .entrance_idx(&conn.name)
                    .ok_or_else(|| LogicError::UnknownName(conn.name.clone()))?;
                let constraints = pool_constraints(world, conn)?;
                pooled.insert(Transition::Entrance(entrance));
                pooled.extend(constraints.iter().copied());
                pool.entrances.push(PoolEntrance {
                    entrance,
                    constraints,
                });
            }
            for conn in &pool_settings.exits {
                let exit = world
                    .exit_idx(&conn.name)
                    .ok_or_else(|| LogicError::UnknownName(conn.name.clone()))?;
                let constraints = pool_constraints(world, conn)?;
                pooled.insert(Transition::Exit(exit));
                pooled.extend(constraints.iter().copied());
                pool.exits.push(PoolExit { exit, constraints });
            }
            ensure!(
                pool.exits.len() >= pool.entrances.len(),
                "entrance pool has {} entrances but only {} exits",
                pool.entrances.len(),
                pool.exits.len()
            );
            exit_pools.push(pool);
        }

        for &(exit, entrance) in &world.vanilla_connections {
            if pooled.contains(&Transition::Exit(exit))
                || pooled.contains(&Transition::Entrance(entrance))
            {
                continue;
            }
            start_placement.link(&world.exits[exit].name, &world.entrances[entrance].name);
        }

        for (item, limit) in &settings.item_placement_limits {
            let item = match world.bit(item) {
                Some(bit) => world.item_name(bit).to_string(),
                None => item.clone(),
            };
            let limit = if let Some(check) = world.check_idx(limit) {
                world.checks[check].name.clone()
            } else if let Some(area) = world.area_idx(limit) {
                world.areas[area].name.clone()
            } else {
                bail!(LogicError::UnknownName(limit.clone()));
            };
            start_placement.item_placement_limit.insert(item, limit);
        }

        Ok(Randomizer {
            world,
            settings,
            starting_inventory,
            starting_area,
            additional_requirements,
            exit_pools,
            start_placement,
            must_be_placed_items,
            may_be_placed_items,
        })
    }

    pub fn logic_settings(&self) -> LogicSettings {
        LogicSettings {
            starting_inventory: self.starting_inventory.clone(),
            starting_area: self.starting_area,
            additional_requirements: self.additional_requirements.clone(),
            exit_pools: self.exit_pools.clone(),
        }
    }

    pub fn start_placement(&self) -> &Placement {
        &self.start_placement
    }

    pub fn randomize(&self, attempt_num: usize, seed: usize) -> Result<Randomization> {
        let mut output = LogOutput::new(attempt_num);
        self.randomize_with(seed, &mut output)
    }

    pub fn randomize_with(
        &self,
        seed: usize,
        output: &mut dyn UserOutput,
    ) -> Result<Randomization> {
        let mut rng_seed = [0u8; 32];
        rng_seed[..8].copy_from_slice(&seed.to_le_bytes());
        let mut rng = rand::rngs::StdRng::from_seed(rng_seed);

        let mut logic = Logic::new(
            self.world,
            self.logic_settings(),
            Some(&self.start_placement),
        )?;
        if !logic.is_completable() {
            return Err(output.generation_failed(
                "the world cannot be completed even with every item".to_string(),
            ));
        }

        let mut bfa = Bfa::new(
            &mut logic,
            &mut rng,
            self.must_be_placed_items.clone(),
            self.may_be_placed_items.clone(),
            self.settings.duplicable_items.clone(),
        );
        bfa.link_all(output)?;
        bfa.randomize(output)?;
        let progress_items = bfa.progress_items.clone();

        let hints = if self.settings.hint_settings.enabled {
            output.progress("selecting hints...");
            Hints::new(&mut logic, &mut rng, &self.settings.hint_settings).do_hints(output)?
        } else {
            BTreeMap::new()
        };

        if !logic.is_completable() {
            return Err(output.generation_failed(
                "the placement leaves the world incompletable".to_string(),
            ));
        }
        let spoiler_log = SpoilerLog::new(&logic, progress_items, &hints);
        Ok(Randomization {
            seed,
            placement: logic.placement.clone(),
            hints,
            spoiler_log,
        })
    }
}
