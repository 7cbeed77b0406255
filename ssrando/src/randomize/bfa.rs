use anyhow::Result;
use log::{debug, info};
use rand::seq::SliceRandom;
use rand::Rng;
use ssrando_game::CheckIdx;

use super::{UserOutput, MAX_DEPTH};
use crate::logic::{Logic, PlacementLimit};

/// Backward fill: every item to place starts in the inventory, and is taken out right before
/// it is put somewhere still reachable without it.
pub struct Bfa<'l, 'a, R: Rng> {
    pub logic: &'l mut Logic<'a>,
    rng: &'l mut R,
    pub progress_items: Vec<String>,
    must_be_placed_items: Vec<String>,
    may_be_placed_items: Vec<String>,
    duplicable_items: Vec<String>,
}

impl<'l, 'a, R: Rng> Bfa<'l, 'a, R> {
    pub fn new(
        logic: &'l mut Logic<'a>,
        rng: &'l mut R,
        must_be_placed_items: Vec<String>,
        may_be_placed_items: Vec<String>,
        duplicable_items: Vec<String>,
    ) -> Self {
        // Progress: any item some way of completing the world goes through, alternatives included.
        let behind = logic.completion_items();
        let mut progress_items: Vec<String> = vec![];
        for item in must_be_placed_items.iter().chain(may_be_placed_items.iter()) {
            if progress_items.contains(item) {
                continue;
            }
            if logic.item_bit(item).is_some_and(|bit| behind.contains(bit)) {
                progress_items.push(item.clone());
            }
        }
        debug!("Progress items: {:?}", progress_items);

        Bfa {
            logic,
            rng,
            progress_items,
            must_be_placed_items,
            may_be_placed_items,
            duplicable_items,
        }
    }

    /// Connects every entrance of every pool.
    pub fn link_all(&mut self, output: &mut dyn UserOutput) -> Result<()> {
        for pool in 0..self.logic.pools.len() {
            output.progress("linking entrances...");
            for _ in 0..self.logic.pools[pool].entrances.len() {
                self.link(pool, output)?;
            }
        }
        Ok(())
    }

    pub fn randomize(&mut self, output: &mut dyn UserOutput) -> Result<()> {
        let mut progress_list = self.progress_items.clone();
        progress_list.shuffle(self.rng);
        for item in &progress_list {
            output.progress("placing progress items...");
            self.place_required(item, output)?;
        }

        let mut must_be_placed_items: Vec<String> = self
            .must_be_placed_items
            .iter()
            .filter(|i| !self.progress_items.contains(*i))
            .cloned()
            .collect();
        let mut may_be_placed_items: Vec<String> = self
            .may_be_placed_items
            .iter()
            .filter(|i| {
                !self.progress_items.contains(*i) && !self.must_be_placed_items.contains(*i)
            })
            .cloned()
            .collect();
        must_be_placed_items.shuffle(self.rng);
        may_be_placed_items.shuffle(self.rng);

        // From here on, banned locations are fair game.
        let banned = self.logic.world.banned_bit;
        self.logic.add_item(banned);
        for item in &must_be_placed_items {
            output.progress("placing nonprogress items...");
            self.place_required(item, output)?;
        }
        for (i, item) in may_be_placed_items.iter().enumerate() {
            output.progress("placing erasable items...");
            if !self.place_item(item, false, output)? {
                info!(
                    "Left {} optional items unplaced",
                    may_be_placed_items.len() - i
                );
                for rest in &may_be_placed_items[i..] {
                    if let Some(bit) = self.logic.item_bit(rest) {
                        self.logic.remove_item(bit);
                    }
                }
                break;
            }
        }

        output.progress("filling with junk...");
        self.fill_with_junk(output)
    }

    fn place_required(&mut self, item: &str, output: &mut dyn UserOutput) -> Result<()> {
        if !self.place_item(item, true, output)? {
            return Err(output.generation_failed(format!(
                "could not place {item} within {MAX_DEPTH} displacements"
            )));
        }
        Ok(())
    }

    /// Puts `item` in a random empty reachable location. With `force`, an occupied reachable
    /// location is taken instead when there is no empty one, and its previous item goes through
    /// the same process. Returns false when no location was found, or the chain of displaced
    /// items got too long.
    pub fn place_item(
        &mut self,
        item: &str,
        force: bool,
        output: &mut dyn UserOutput,
    ) -> Result<bool> {
        let mut current = item.to_string();
        let mut depth = 0;
        loop {
            if let Some(bit) = self.logic.item_bit(&current) {
                self.logic.remove_item(bit);
            }
            let limit = self.logic.placement_limit(&current)?;
            let reachable = self.logic.reachable_checks(limit);
            let empty: Vec<CheckIdx> = reachable
                .iter()
                .copied()
                .filter(|&c| !self.logic.is_occupied(c))
                .collect();
            if let Some(&check) = empty.choose(self.rng) {
                self.logic.place_item(check, &current)?;
                return Ok(true);
            }

            if !force || depth >= MAX_DEPTH {
                return Ok(false);
            }
            let displaceable: Vec<CheckIdx> = reachable
                .into_iter()
                .filter(|c| !self.logic.known_locations.contains(c))
                .collect();
            let Some(&check) = displaceable.choose(self.rng) else {
                return Err(
                    output.generation_failed(format!("no more location accessible for {current}"))
                );
            };
            current = self.logic.replace_item(check, &current)?;
            depth += 1;
        }
    }

    fn fill_with_junk(&mut self, output: &mut dyn UserOutput) -> Result<()> {
        let empty_locations = self.logic.accessible_checks(PlacementLimit::Anywhere);
        if empty_locations.is_empty() {
            return Ok(());
        }
        if self.duplicable_items.is_empty() {
            return Err(output.generation_failed(format!(
                "{} locations are left empty and there is no duplicable item",
                empty_locations.len()
            )));
        }
        for check in empty_locations {
            let Some(junk) = self.duplicable_items.choose(self.rng) else {
                break;
            };
            let junk = junk.clone();
            self.logic.place_item(check, &junk)?;
        }
        Ok(())
    }

    /// Seats one unassigned entrance of `pool`. A free reachable exit is preferred; otherwise a
    /// reachable exit is taken from the entrance it leads to, which then gets seated in turn.
    pub fn link(&mut self, pool: usize, output: &mut dyn UserOutput) -> Result<()> {
        let unassigned: Vec<usize> = (0..self.logic.pools[pool].entrances.len())
            .filter(|&i| {
                !self
                    .logic
                    .is_entrance_linked(self.logic.pools[pool].entrances[i].entrance)
            })
            .collect();
        let Some(&first) = unassigned.choose(self.rng) else {
            return Ok(());
        };

        let mut entrance = first;
        for _ in 0..=MAX_DEPTH {
            let mut assigned_exits = vec![];
            let mut unassigned_exits = vec![];
            for x in self.logic.accessible_exits(pool) {
                if self.logic.is_exit_linked(self.logic.pools[pool].exits[x].exit) {
                    assigned_exits.push(x);
                } else {
                    unassigned_exits.push(x);
                }
            }

            unassigned_exits.shuffle(self.rng);
            for &x in &unassigned_exits {
                if self.logic.link_connection(pool, x, entrance)? {
                    return Ok(());
                }
            }

            // No free exit works, so take one away from another entrance.
            assigned_exits.shuffle(self.rng);
            let mut bumped = None;
            for &x in &assigned_exits {
                if let Some(old) = self.logic.relink_connection(pool, x, entrance)? {
                    bumped = Some(old);
                    break;
                }
            }
            match bumped {
                Some(old) => entrance = old,
                None => break,
            }
        }
        let entrance_idx = self.logic.pools[pool].entrances[entrance].entrance;
        Err(output.generation_failed(format!(
            "No exit could be found for the entrance {}",
            self.logic.world.entrances[entrance_idx].name
        )))
    }
}
