use anyhow::{bail, ensure, Context, Result};
use hashbrown::HashMap;
use log::info;
use ssrando_logic::{ExtendedItem, Requirement};

use crate::{
    day_name, night_name, short_name, with_sep_full, Area, AreaIdx, Check, Dungeon, Event,
    GossipStone, HintImportance, IndexedVec, MapEntrance, MapExit, RequirementSpec, Time,
    TimeOfDay, TimedBits, World, BANNED, EVERYTHING_UNBANNED,
};

pub struct LocationDef {
    pub name: String,
    pub requires: RequirementSpec,
    pub hint: Option<HintImportance>,
    pub text: Option<String>,
}

pub struct AreaDef {
    pub name: String,
    pub parent: Option<AreaIdx>,
    pub time_of_day: TimeOfDay,
    pub abstract_area: bool,
    pub can_sleep: bool,
    pub hint_region: Option<String>,
    pub locations: Vec<LocationDef>,
    pub events: Vec<(String, RequirementSpec)>,
    pub exits: Vec<(String, RequirementSpec)>,
    pub entrances: Vec<(String, Option<TimeOfDay>)>,
    pub logic_exits: Vec<(String, RequirementSpec)>,
    pub stones: Vec<(String, RequirementSpec)>,
}

/// Incremental construction of a `World`. Names used in requirements are resolved in `build`,
/// so areas and locations may be declared in any order.
#[derive(Default)]
pub struct WorldBuilder {
    items: Vec<String>,
    areas: Vec<AreaDef>,
    connections: Vec<(String, String)>,
    dungeons: Vec<Dungeon>,
    hintable_items: Vec<String>,
    junk_hints: Vec<String>,
    start_area: Option<String>,
    win_condition: Option<String>,
}

impl WorldBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_item(&mut self, name: &str) -> &mut Self {
        self.items.push(name.to_string());
        self
    }

    pub fn add_area(
        &mut self,
        parent: Option<AreaIdx>,
        name: &str,
        time_of_day: TimeOfDay,
    ) -> AreaIdx {
        let hint_region = match parent {
            Some(p) => self.areas[p].hint_region.clone(),
            None => None,
        };
        self.areas.push(AreaDef {
            name: name.to_string(),
            parent,
            time_of_day,
            abstract_area: false,
            can_sleep: false,
            hint_region,
            locations: vec![],
            events: vec![],
            exits: vec![],
            entrances: vec![],
            logic_exits: vec![],
            stones: vec![],
        });
        self.areas.len() - 1
    }

    pub fn area_mut(&mut self, area: AreaIdx) -> &mut AreaDef {
        &mut self.areas[area]
    }

    pub fn add_location(
        &mut self,
        area: AreaIdx,
        name: &str,
        requires: RequirementSpec,
    ) -> &mut LocationDef {
        let locations = &mut self.areas[area].locations;
        locations.push(LocationDef {
            name: name.to_string(),
            requires,
            hint: None,
            text: None,
        });
        let idx = locations.len() - 1;
        &mut locations[idx]
    }

    pub fn add_event(&mut self, area: AreaIdx, name: &str, requires: RequirementSpec) {
        self.areas[area].events.push((name.to_string(), requires));
    }

    pub fn add_exit(&mut self, area: AreaIdx, name: &str, requires: RequirementSpec) {
        self.areas[area].exits.push((name.to_string(), requires));
    }

    pub fn add_entrance(&mut self, area: AreaIdx, name: &str, time_of_day: Option<TimeOfDay>) {
        self.areas[area]
            .entrances
            .push((name.to_string(), time_of_day));
    }

    /// Edge from `area` to the area named `target` (full name, or relative to `area`).
    pub fn add_logic_exit(&mut self, area: AreaIdx, target: &str, requires: RequirementSpec) {
        self.areas[area]
            .logic_exits
            .push((target.to_string(), requires));
    }

    pub fn add_stone(&mut self, area: AreaIdx, name: &str, requires: RequirementSpec) {
        self.areas[area].stones.push((name.to_string(), requires));
    }

    pub fn connect(&mut self, exit: &str, entrance: &str) {
        self.connections
            .push((exit.to_string(), entrance.to_string()));
    }

    pub fn add_dungeon(&mut self, dungeon: Dungeon) {
        self.dungeons.push(dungeon);
    }

    pub fn add_hintable_item(&mut self, name: &str) {
        self.hintable_items.push(name.to_string());
    }

    pub fn add_junk_hint(&mut self, text: &str) {
        self.junk_hints.push(text.to_string());
    }

    pub fn set_start_area(&mut self, name: &str) {
        self.start_area = Some(name.to_string());
    }

    pub fn set_win_condition(&mut self, name: &str) {
        self.win_condition = Some(name.to_string());
    }

    pub fn build(mut self) -> Result<World> {
        let mut world = World {
            item_isv: IndexedVec::default(),
            physical_items: vec![],
            areas: vec![],
            checks: vec![],
            events: vec![],
            exits: vec![],
            entrances: vec![],
            stones: vec![],
            requirements: vec![],
            opaque: vec![],
            vanilla_connections: vec![],
            dungeons: std::mem::take(&mut self.dungeons),
            hintable_items: std::mem::take(&mut self.hintable_items),
            junk_hints: std::mem::take(&mut self.junk_hints),
            start_area: 0,
            win_bit: 0,
            banned_bit: 0,
            everything_unbanned_bit: 0,
            short_to_full: HashMap::new(),
            full_to_short: HashMap::new(),
            area_by_name: HashMap::new(),
            check_by_name: HashMap::new(),
            exit_by_name: HashMap::new(),
            entrance_by_name: HashMap::new(),
            stone_by_name: HashMap::new(),
            checks_by_area: vec![],
        };

        for item in &self.items {
            let bit = register(&mut world.item_isv, item)?;
            world.physical_items.push(bit);
        }

        // Areas first, so that their bits precede everything located inside them.
        for (area_idx, def) in self.areas.iter().enumerate() {
            let full_name = match def.parent {
                Some(p) => {
                    ensure!(p < area_idx, "parent of area {} is declared after it", def.name);
                    with_sep_full(&world.areas[p].name, &def.name)
                }
                None => def.name.clone(),
            };
            ensure!(
                !world.area_by_name.contains_key(&full_name),
                "duplicate area {full_name}"
            );
            let bits = if def.abstract_area {
                TimedBits::Timeless(register(&mut world.item_isv, &full_name)?)
            } else if def.time_of_day == TimeOfDay::Both {
                TimedBits::DayNight {
                    day: register(&mut world.item_isv, &day_name(&full_name))?,
                    night: register(&mut world.item_isv, &night_name(&full_name))?,
                }
            } else {
                TimedBits::Single {
                    bit: register(&mut world.item_isv, &full_name)?,
                    time_of_day: def.time_of_day,
                }
            };
            if let Some(p) = def.parent {
                world.areas[p].sub_areas.push(area_idx);
            }
            world.area_by_name.insert(full_name.clone(), area_idx);
            world.areas.push(Area {
                name: full_name,
                short_name: def.name.clone(),
                parent: def.parent,
                sub_areas: vec![],
                time_of_day: def.time_of_day,
                abstract_area: def.abstract_area,
                can_sleep: def.can_sleep,
                hint_region: def.hint_region.clone(),
                checks: vec![],
                events: vec![],
                exits: vec![],
                entrances: vec![],
                stones: vec![],
                bits,
            });
        }

        for (area_idx, def) in self.areas.iter().enumerate() {
            let area_name = world.areas[area_idx].name.clone();
            let area_short = world.areas[area_idx].short_name.clone();
            for loc in &def.locations {
                let (name, short, item) =
                    world.register_location(&area_name, &area_short, &loc.name)?;
                world.check_by_name.insert(name.clone(), world.checks.len());
                world.areas[area_idx].checks.push(world.checks.len());
                world.checks.push(Check {
                    name,
                    short_name: short,
                    area: area_idx,
                    item,
                    hint: loc.hint,
                    hint_region: def.hint_region.clone(),
                    text: loc.text.clone(),
                });
            }
            for (event_name, _) in &def.events {
                let (name, short, item) =
                    world.register_location(&area_name, &area_short, event_name)?;
                world.areas[area_idx].events.push(world.events.len());
                world.events.push(Event {
                    name,
                    short_name: short,
                    area: area_idx,
                    item,
                });
            }
            for (exit_name, _) in &def.exits {
                let (name, short, item) =
                    world.register_location(&area_name, &area_short, exit_name)?;
                world.exit_by_name.insert(name.clone(), world.exits.len());
                world.areas[area_idx].exits.push(world.exits.len());
                world.exits.push(MapExit {
                    name,
                    short_name: short,
                    area: area_idx,
                    item,
                });
            }
            for (entrance_name, time_of_day) in &def.entrances {
                let name = with_sep_full(&area_name, entrance_name);
                let short = short_name(&area_short, entrance_name);
                let time_of_day = time_of_day.unwrap_or(def.time_of_day);
                let bits = if time_of_day == TimeOfDay::Both {
                    TimedBits::DayNight {
                        day: register(&mut world.item_isv, &day_name(&name))?,
                        night: register(&mut world.item_isv, &night_name(&name))?,
                    }
                } else {
                    TimedBits::Single {
                        bit: register(&mut world.item_isv, &name)?,
                        time_of_day,
                    }
                };
                world.add_short_name(&name, &short)?;
                world.entrance_by_name.insert(name.clone(), world.entrances.len());
                world.areas[area_idx].entrances.push(world.entrances.len());
                world.entrances.push(MapEntrance {
                    name,
                    short_name: short,
                    area: area_idx,
                    time_of_day,
                    bits,
                });
            }
            for (stone_name, _) in &def.stones {
                let (name, short, item) =
                    world.register_location(&area_name, &area_short, stone_name)?;
                world.stone_by_name.insert(name.clone(), world.stones.len());
                world.areas[area_idx].stones.push(world.stones.len());
                world.stones.push(GossipStone {
                    name,
                    short_name: short,
                    area: area_idx,
                    item,
                });
            }
        }

        world.banned_bit = register(&mut world.item_isv, BANNED)?;
        world.everything_unbanned_bit = register(&mut world.item_isv, EVERYTHING_UNBANNED)?;

        let num_items = world.item_isv.keys.len();
        world.requirements = vec![Requirement::never(); num_items];
        world.opaque = vec![false; num_items];
        for &bit in &world.physical_items {
            world.opaque[bit] = true;
        }
        for entrance in &world.entrances {
            for bit in entrance.bits.all_bits() {
                world.opaque[bit] = true;
            }
        }
        world.opaque[world.banned_bit] = true;
        world.opaque[world.everything_unbanned_bit] = true;

        self.derive_requirements(&mut world)?;

        for (exit, entrance) in &self.connections {
            let exit_idx = world
                .exit_idx(exit)
                .with_context(|| format!("unknown exit {exit} in connection"))?;
            let entrance_idx = world
                .entrance_idx(entrance)
                .with_context(|| format!("unknown entrance {entrance} in connection"))?;
            world.vanilla_connections.push((exit_idx, entrance_idx));
        }

        let start_area = self
            .start_area
            .as_deref()
            .context("world has no start area")?;
        world.start_area = world
            .area_idx(start_area)
            .with_context(|| format!("unknown start area {start_area}"))?;
        let win_condition = self
            .win_condition
            .as_deref()
            .context("world has no win condition")?;
        world.win_bit = world
            .bit(win_condition)
            .with_context(|| format!("unknown win condition {win_condition}"))?;
        world.requirements[world.everything_unbanned_bit] = Requirement::item(world.win_bit);

        for dungeon in &world.dungeons {
            if let Some(goal) = &dungeon.goal {
                ensure!(
                    world.bit(goal).is_some(),
                    "unknown goal {goal} for dungeon {}",
                    dungeon.name
                );
            }
        }

        world.checks_by_area = vec![vec![]; world.areas.len()];
        for area_idx in (0..world.areas.len()).rev() {
            let mut out = world.areas[area_idx].checks.clone();
            for &sub in &world.areas[area_idx].sub_areas {
                out.extend(world.checks_by_area[sub].iter().copied());
            }
            world.checks_by_area[area_idx] = out;
        }

        info!(
            "World: {} extended items, {} areas, {} checks, {} exits, {} entrances, {} gossip stones",
            num_items,
            world.areas.len(),
            world.checks.len(),
            world.exits.len(),
            world.entrances.len(),
            world.stones.len()
        );
        Ok(world)
    }

    fn derive_requirements(&self, world: &mut World) -> Result<()> {
        for (area_idx, def) in self.areas.iter().enumerate() {
            for (target, spec) in &def.logic_exits {
                let target_idx = world
                    .resolve_area(area_idx, target)
                    .with_context(|| {
                        format!(
                            "unknown logic exit target {target} in {}",
                            world.areas[area_idx].name
                        )
                    })?;
                let req = world
                    .resolve_requirement(spec, area_idx)
                    .with_context(|| {
                        format!("logic exit {} -> {target}", world.areas[area_idx].name)
                    })?;
                for time in [Time::Day, Time::Night] {
                    let src = world.areas[area_idx].bits.bit_for(time);
                    let dst = world.areas[target_idx].bits.bit_for(time);
                    if let (Some(src), Some(dst)) = (src, dst) {
                        let edge = Requirement::item(src).and(&req);
                        world.requirements[dst] |= &edge;
                    }
                }
            }
            if def.can_sleep {
                if let TimedBits::DayNight { day, night } = world.areas[area_idx].bits {
                    world.requirements[day] |= &Requirement::item(night);
                    world.requirements[night] |= &Requirement::item(day);
                }
            }
        }

        for area in &world.areas {
            for &entrance_idx in &area.entrances {
                let entrance = &world.entrances[entrance_idx];
                for time in [Time::Day, Time::Night] {
                    if let (Some(ent), Some(dst)) =
                        (entrance.bits.bit_for(time), area.bits.bit_for(time))
                    {
                        world.requirements[dst] |= &Requirement::item(ent);
                    }
                }
            }
        }

        for (area_idx, def) in self.areas.iter().enumerate() {
            let in_area = Requirement::any_of(world.areas[area_idx].bits.all_bits());
            let area_name = world.areas[area_idx].name.clone();
            let located = def
                .locations
                .iter()
                .map(|l| (&l.name, &l.requires))
                .chain(def.events.iter().map(|(n, r)| (n, r)))
                .chain(def.exits.iter().map(|(n, r)| (n, r)))
                .chain(def.stones.iter().map(|(n, r)| (n, r)));
            for (name, spec) in located {
                let full = with_sep_full(&area_name, name);
                let bit = world.item_isv.index_by_key[&full];
                let req = world
                    .resolve_requirement(spec, area_idx)
                    .with_context(|| format!("requirement of {full}"))?;
                world.requirements[bit] = in_area.and(&req);
            }
        }
        Ok(())
    }
}

fn register(isv: &mut IndexedVec<String>, name: &str) -> Result<ExtendedItem> {
    if isv.index_by_key.contains_key(name) {
        bail!("duplicate name {name}");
    }
    Ok(isv.add(name))
}

impl World {
    fn register_location(
        &mut self,
        area_name: &str,
        area_short: &str,
        name: &str,
    ) -> Result<(String, String, ExtendedItem)> {
        let full = with_sep_full(area_name, name);
        let short = short_name(area_short, name);
        let item = register(&mut self.item_isv, &full)?;
        self.add_short_name(&full, &short)?;
        Ok((full, short, item))
    }

    fn add_short_name(&mut self, full: &str, short: &str) -> Result<()> {
        if let Some(existing) = self.short_to_full.get(short) {
            bail!("short name {short} is shared by {existing} and {full}");
        }
        self.short_to_full.insert(short.to_string(), full.to_string());
        self.full_to_short.insert(full.to_string(), short.to_string());
        Ok(())
    }

    fn resolve_area(&self, from: AreaIdx, name: &str) -> Option<AreaIdx> {
        let relative = with_sep_full(&self.areas[from].name, name);
        if let Some(&idx) = self.area_by_name.get(&relative) {
            return Some(idx);
        }
        if let Some(parent) = self.areas[from].parent {
            let sibling = with_sep_full(&self.areas[parent].name, name);
            if let Some(&idx) = self.area_by_name.get(&sibling) {
                return Some(idx);
            }
        }
        self.area_by_name.get(name).copied()
    }

    pub fn resolve_requirement(
        &self,
        spec: &RequirementSpec,
        area: AreaIdx,
    ) -> Result<Requirement> {
        Ok(match spec {
            RequirementSpec::Free => Requirement::free(),
            RequirementSpec::Never => Requirement::never(),
            RequirementSpec::And(specs) => Requirement::make_and(
                specs
                    .iter()
                    .map(|s| self.resolve_requirement(s, area))
                    .collect::<Result<Vec<_>>>()?,
            ),
            RequirementSpec::Or(specs) => Requirement::make_or(
                specs
                    .iter()
                    .map(|s| self.resolve_requirement(s, area))
                    .collect::<Result<Vec<_>>>()?,
            ),
            RequirementSpec::Name(name) => {
                let relative = with_sep_full(&self.areas[area].name, name);
                if let Some(&bit) = self.item_isv.index_by_key.get(&relative) {
                    Requirement::item(bit)
                } else if let Some(&bit) = self.item_isv.index_by_key.get(name) {
                    Requirement::item(bit)
                } else if let Some(idx) = self.resolve_area(area, name) {
                    Requirement::any_of(self.areas[idx].bits.all_bits())
                } else if let Some(full) = self.short_to_full.get(name) {
                    Requirement::item(self.item_isv.index_by_key[full])
                } else {
                    bail!("unknown name '{name}' in {}", self.areas[area].name);
                }
            }
        })
    }
}
