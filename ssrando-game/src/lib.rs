pub mod builder;

pub use builder::WorldBuilder;

use anyhow::{bail, Context, Result};
use hashbrown::HashMap;
use json::{self, JsonValue};
use log::info;
use serde::{Deserialize, Serialize};
use ssrando_logic::{ExtendedItem, Requirement};
use std::fs::File;
use std::hash::Hash;
use std::path::Path;
use std::str::FromStr;
use strum::VariantNames;
use strum_macros::{Display, EnumString, VariantNames};

pub const BANNED: &str = "Banned";
pub const EVERYTHING_UNBANNED: &str = "Everything Unbanned";

pub type AreaIdx = usize; // Index into World.areas
pub type CheckIdx = usize; // Index into World.checks
pub type EventIdx = usize; // Index into World.events
pub type ExitIdx = usize; // Index into World.exits
pub type EntranceIdx = usize; // Index into World.entrances
pub type StoneIdx = usize; // Index into World.stones

#[derive(Default, Clone)]
pub struct IndexedVec<T: Hash + Eq> {
    pub keys: Vec<T>,
    pub index_by_key: HashMap<T, usize>,
}

impl<T: Hash + Eq> IndexedVec<T> {
    pub fn add<U: ToOwned<Owned = T> + ?Sized>(&mut self, name: &U) -> usize {
        if !self.index_by_key.contains_key(&name.to_owned()) {
            let idx = self.keys.len();
            self.index_by_key.insert(name.to_owned(), self.keys.len());
            self.keys.push(name.to_owned());
            idx
        } else {
            self.index_by_key[&name.to_owned()]
        }
    }
}

#[derive(
    Copy,
    Clone,
    Debug,
    PartialEq,
    Eq,
    Hash,
    EnumString,
    VariantNames,
    Display,
    Serialize,
    Deserialize,
)]
pub enum TimeOfDay {
    DayOnly,
    NightOnly,
    Both,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Time {
    Day,
    Night,
}

impl TimeOfDay {
    pub fn allows(self, time: Time) -> bool {
        match self {
            TimeOfDay::DayOnly => time == Time::Day,
            TimeOfDay::NightOnly => time == Time::Night,
            TimeOfDay::Both => true,
        }
    }
}

#[derive(
    Copy,
    Clone,
    Debug,
    PartialEq,
    Eq,
    Hash,
    EnumString,
    VariantNames,
    Display,
    Serialize,
    Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum HintImportance {
    Always,
    Sometimes,
}

/// The extended items standing for "this area (or entrance) is reached".
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TimedBits {
    // Abstract areas are reached independently of the time of day.
    Timeless(ExtendedItem),
    Single {
        bit: ExtendedItem,
        time_of_day: TimeOfDay,
    },
    DayNight {
        day: ExtendedItem,
        night: ExtendedItem,
    },
}

impl TimedBits {
    pub fn bit_for(&self, time: Time) -> Option<ExtendedItem> {
        match *self {
            TimedBits::Timeless(bit) => Some(bit),
            TimedBits::Single { bit, time_of_day } => {
                if time_of_day.allows(time) {
                    Some(bit)
                } else {
                    None
                }
            }
            TimedBits::DayNight { day, night } => match time {
                Time::Day => Some(day),
                Time::Night => Some(night),
            },
        }
    }

    pub fn all_bits(&self) -> Vec<ExtendedItem> {
        match *self {
            TimedBits::Timeless(bit) => vec![bit],
            TimedBits::Single { bit, .. } => vec![bit],
            TimedBits::DayNight { day, night } => vec![day, night],
        }
    }
}

#[derive(Clone, Debug)]
pub struct Area {
    pub name: String,
    pub short_name: String,
    pub parent: Option<AreaIdx>,
    pub sub_areas: Vec<AreaIdx>,
    pub time_of_day: TimeOfDay,
    pub abstract_area: bool,
    pub can_sleep: bool,
    pub hint_region: Option<String>,
    pub checks: Vec<CheckIdx>,
    pub events: Vec<EventIdx>,
    pub exits: Vec<ExitIdx>,
    pub entrances: Vec<EntranceIdx>,
    pub stones: Vec<StoneIdx>,
    pub bits: TimedBits,
}

#[derive(Clone, Debug)]
pub struct Check {
    pub name: String,
    pub short_name: String,
    pub area: AreaIdx,
    pub item: ExtendedItem,
    pub hint: Option<HintImportance>,
    pub hint_region: Option<String>,
    pub text: Option<String>,
}

#[derive(Clone, Debug)]
pub struct Event {
    pub name: String,
    pub short_name: String,
    pub area: AreaIdx,
    pub item: ExtendedItem,
}

#[derive(Clone, Debug)]
pub struct MapExit {
    pub name: String,
    pub short_name: String,
    pub area: AreaIdx,
    pub item: ExtendedItem,
}

#[derive(Clone, Debug)]
pub struct MapEntrance {
    pub name: String,
    pub short_name: String,
    pub area: AreaIdx,
    pub time_of_day: TimeOfDay,
    pub bits: TimedBits,
}

#[derive(Clone, Debug)]
pub struct GossipStone {
    pub name: String,
    pub short_name: String,
    pub area: AreaIdx,
    pub item: ExtendedItem,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Dungeon {
    pub name: String,
    pub goal: Option<String>,
    #[serde(default)]
    pub boss_keys: Vec<String>,
}

/// Requirement as written in a world definition, before names are resolved to extended items.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RequirementSpec {
    Free,
    Never,
    Name(String),
    And(Vec<RequirementSpec>),
    Or(Vec<RequirementSpec>),
}

impl RequirementSpec {
    pub fn name(name: &str) -> Self {
        RequirementSpec::Name(name.to_string())
    }

    pub fn all(names: &[&str]) -> Self {
        RequirementSpec::And(names.iter().map(|n| RequirementSpec::name(n)).collect())
    }

    pub fn any(names: &[&str]) -> Self {
        RequirementSpec::Or(names.iter().map(|n| RequirementSpec::name(n)).collect())
    }

    pub fn parse_json(value: &JsonValue) -> Result<Self> {
        if value.is_null() {
            return Ok(RequirementSpec::Free);
        }
        if let Some(s) = value.as_str() {
            return Ok(match s {
                "free" => RequirementSpec::Free,
                "never" => RequirementSpec::Never,
                _ => RequirementSpec::Name(s.to_string()),
            });
        }
        if value.is_array() {
            return Ok(RequirementSpec::And(parse_spec_list(value)?));
        }
        if value.is_object() {
            if value.has_key("and") {
                return Ok(RequirementSpec::And(parse_spec_list(&value["and"])?));
            }
            if value.has_key("or") {
                return Ok(RequirementSpec::Or(parse_spec_list(&value["or"])?));
            }
        }
        bail!("unrecognized requirement: {}", value.dump());
    }
}

fn parse_spec_list(value: &JsonValue) -> Result<Vec<RequirementSpec>> {
    if !value.is_array() {
        bail!("expected a list of requirements: {}", value.dump());
    }
    value.members().map(RequirementSpec::parse_json).collect()
}

pub fn with_sep_full(parent: &str, name: &str) -> String {
    format!("{parent}/{name}")
}

pub fn short_name(area_short: &str, name: &str) -> String {
    format!("{area_short} - {name}")
}

pub fn day_name(name: &str) -> String {
    format!("{name} (Day)")
}

pub fn night_name(name: &str) -> String {
    format!("{name} (Night)")
}

/// A fully resolved game world: every named entity is registered as an extended item and carries
/// the requirement derived from the definition.
#[derive(Clone)]
pub struct World {
    pub item_isv: IndexedVec<String>,
    pub physical_items: Vec<ExtendedItem>,
    pub areas: Vec<Area>,
    pub checks: Vec<Check>,
    pub events: Vec<Event>,
    pub exits: Vec<MapExit>,
    pub entrances: Vec<MapEntrance>,
    pub stones: Vec<GossipStone>,
    pub requirements: Vec<Requirement>,
    pub opaque: Vec<bool>,
    pub vanilla_connections: Vec<(ExitIdx, EntranceIdx)>,
    pub dungeons: Vec<Dungeon>,
    pub hintable_items: Vec<String>,
    pub junk_hints: Vec<String>,
    pub start_area: AreaIdx,
    pub win_bit: ExtendedItem,
    pub banned_bit: ExtendedItem,
    pub everything_unbanned_bit: ExtendedItem,
    pub short_to_full: HashMap<String, String>,
    pub full_to_short: HashMap<String, String>,
    pub area_by_name: HashMap<String, AreaIdx>,
    pub check_by_name: HashMap<String, CheckIdx>,
    pub exit_by_name: HashMap<String, ExitIdx>,
    pub entrance_by_name: HashMap<String, EntranceIdx>,
    pub stone_by_name: HashMap<String, StoneIdx>,
    pub checks_by_area: Vec<Vec<CheckIdx>>, // Checks in each area and all of its sub-areas
}

impl World {
    pub fn load(path: &Path) -> Result<World> {
        info!("Loading world definition from {}", path.display());
        let world_json = read_json(path)?;
        World::from_json(&world_json)
            .with_context(|| format!("invalid world in {}", path.display()))
    }

    pub fn from_json(world_json: &JsonValue) -> Result<World> {
        let mut builder = WorldBuilder::new();
        for item in world_json["items"].members() {
            builder.add_item(json_str(item, "item name")?);
        }
        for area_json in world_json["areas"].members() {
            load_area(&mut builder, None, area_json)?;
        }
        for conn in world_json["connections"].members() {
            builder.connect(
                json_str(&conn["exit"], "connection exit")?,
                json_str(&conn["entrance"], "connection entrance")?,
            );
        }
        for dungeon in world_json["dungeons"].members() {
            builder.add_dungeon(Dungeon {
                name: json_str(&dungeon["name"], "dungeon name")?.to_string(),
                goal: dungeon["goal"].as_str().map(|s| s.to_string()),
                boss_keys: dungeon["boss_keys"]
                    .members()
                    .map(|x| json_str(x, "boss key").map(|s| s.to_string()))
                    .collect::<Result<Vec<_>>>()?,
            });
        }
        for item in world_json["hintable_items"].members() {
            builder.add_hintable_item(json_str(item, "hintable item")?);
        }
        for text in world_json["junk_hints"].members() {
            builder.add_junk_hint(json_str(text, "junk hint")?);
        }
        builder.set_start_area(json_str(&world_json["start_area"], "start_area")?);
        builder.set_win_condition(json_str(&world_json["win_condition"], "win_condition")?);
        builder.build()
    }

    /// Extended item for a full name, falling back to short names.
    pub fn bit(&self, name: &str) -> Option<ExtendedItem> {
        if let Some(&bit) = self.item_isv.index_by_key.get(name) {
            return Some(bit);
        }
        let full = self.short_to_full.get(name)?;
        self.item_isv.index_by_key.get(full).copied()
    }

    pub fn item_name(&self, item: ExtendedItem) -> &str {
        &self.item_isv.keys[item]
    }

    pub fn short_to_full(&self, name: &str) -> Option<&str> {
        self.short_to_full.get(name).map(|s| s.as_str())
    }

    pub fn full_to_short<'a>(&'a self, name: &'a str) -> &'a str {
        match self.full_to_short.get(name) {
            Some(short) => short.as_str(),
            None => name,
        }
    }

    fn lookup(&self, table: &HashMap<String, usize>, name: &str) -> Option<usize> {
        if let Some(&idx) = table.get(name) {
            return Some(idx);
        }
        table.get(self.short_to_full.get(name)?).copied()
    }

    pub fn area_idx(&self, name: &str) -> Option<AreaIdx> {
        self.area_by_name.get(name).copied()
    }

    pub fn check_idx(&self, name: &str) -> Option<CheckIdx> {
        self.lookup(&self.check_by_name, name)
    }

    pub fn exit_idx(&self, name: &str) -> Option<ExitIdx> {
        self.lookup(&self.exit_by_name, name)
    }

    pub fn entrance_idx(&self, name: &str) -> Option<EntranceIdx> {
        self.lookup(&self.entrance_by_name, name)
    }

    pub fn stone_idx(&self, name: &str) -> Option<StoneIdx> {
        self.lookup(&self.stone_by_name, name)
    }

    pub fn is_physical_item(&self, item: ExtendedItem) -> bool {
        self.physical_items.contains(&item)
    }

    pub fn checks_in_subtree(&self, area: AreaIdx) -> &[CheckIdx] {
        &self.checks_by_area[area]
    }

    pub fn area_bit(&self, area: AreaIdx) -> ExtendedItem {
        let bits = &self.areas[area].bits;
        match bits.bit_for(Time::Day) {
            Some(bit) => bit,
            None => bits.all_bits()[0],
        }
    }

    pub fn start_bit(&self) -> ExtendedItem {
        self.area_bit(self.start_area)
    }

    /// Requirements of an entrance's bits once `exit` leads to it: each time variant of the
    /// entrance is reached when the exit is taken at that time of day.
    pub fn link_requirements(
        &self,
        exit: ExitIdx,
        entrance: EntranceIdx,
    ) -> Vec<(ExtendedItem, Requirement)> {
        let exit_data = &self.exits[exit];
        let exit_area = &self.areas[exit_data.area];
        let entrance_bits = &self.entrances[entrance].bits;
        let mut out = vec![];
        for time in [Time::Day, Time::Night] {
            let Some(bit) = entrance_bits.bit_for(time) else {
                continue;
            };
            if out.iter().any(|(b, _)| *b == bit) {
                continue;
            }
            let req = if exit_area.abstract_area {
                Requirement::item(exit_data.item)
            } else {
                match exit_area.bits.bit_for(time) {
                    Some(src) => Requirement::all_of([exit_data.item, src].into_iter().collect()),
                    None => Requirement::never(),
                }
            };
            out.push((bit, req));
        }
        out
    }

    pub fn dungeon_of_region(&self, region: &str) -> Option<&Dungeon> {
        self.dungeons.iter().find(|d| d.name == region)
    }
}

fn json_str<'a>(value: &'a JsonValue, what: &str) -> Result<&'a str> {
    value
        .as_str()
        .with_context(|| format!("expected a string for {what}, got {}", value.dump()))
}

fn load_area(
    builder: &mut WorldBuilder,
    parent: Option<AreaIdx>,
    area_json: &JsonValue,
) -> Result<()> {
    let name = json_str(&area_json["name"], "area name")?;
    let time_of_day = match area_json["time_of_day"].as_str() {
        Some(s) => TimeOfDay::from_str(s).with_context(|| {
            format!(
                "invalid time_of_day {s} in area {name}, expected one of {:?}",
                TimeOfDay::VARIANTS
            )
        })?,
        None => match parent {
            Some(p) => builder.area_mut(p).time_of_day,
            None => TimeOfDay::Both,
        },
    };
    let area = builder.add_area(parent, name, time_of_day);
    {
        let def = builder.area_mut(area);
        def.abstract_area = area_json["abstract"].as_bool().unwrap_or(false);
        def.can_sleep = area_json["can_sleep"].as_bool().unwrap_or(false);
        if let Some(region) = area_json["hint_region"].as_str() {
            def.hint_region = Some(region.to_string());
        }
    }
    let ctx = || format!("in area {name}");
    for loc in area_json["locations"].members() {
        let loc_name = json_str(&loc["name"], "location name").with_context(ctx)?;
        let requires = RequirementSpec::parse_json(&loc["requires"])
            .with_context(|| format!("location {loc_name} in area {name}"))?;
        let hint = match loc["hint"].as_str() {
            Some(s) => Some(
                HintImportance::from_str(s)
                    .with_context(|| format!("invalid hint importance {s} for {loc_name}"))?,
            ),
            None => None,
        };
        let def = builder.add_location(area, loc_name, requires);
        def.hint = hint;
        def.text = loc["text"].as_str().map(|s| s.to_string());
    }
    for event in area_json["events"].members() {
        let event_name = json_str(&event["name"], "event name").with_context(ctx)?;
        let requires = RequirementSpec::parse_json(&event["requires"])
            .with_context(|| format!("event {event_name} in area {name}"))?;
        builder.add_event(area, event_name, requires);
    }
    for exit in area_json["exits"].members() {
        let exit_name = json_str(&exit["name"], "exit name").with_context(ctx)?;
        let requires = RequirementSpec::parse_json(&exit["requires"])
            .with_context(|| format!("exit {exit_name} in area {name}"))?;
        builder.add_exit(area, exit_name, requires);
    }
    for entrance in area_json["entrances"].members() {
        let entrance_name = json_str(&entrance["name"], "entrance name").with_context(ctx)?;
        let time_of_day = match entrance["time_of_day"].as_str() {
            Some(s) => Some(
                TimeOfDay::from_str(s)
                    .with_context(|| format!("invalid time_of_day {s} for {entrance_name}"))?,
            ),
            None => None,
        };
        builder.add_entrance(area, entrance_name, time_of_day);
    }
    for logic_exit in area_json["logic_exits"].members() {
        let target = json_str(&logic_exit["to"], "logic exit target").with_context(ctx)?;
        let requires = RequirementSpec::parse_json(&logic_exit["requires"])
            .with_context(|| format!("logic exit to {target} in area {name}"))?;
        builder.add_logic_exit(area, target, requires);
    }
    for stone in area_json["gossip_stones"].members() {
        let stone_name = json_str(&stone["name"], "gossip stone name").with_context(ctx)?;
        let requires = RequirementSpec::parse_json(&stone["requires"])
            .with_context(|| format!("gossip stone {stone_name} in area {name}"))?;
        builder.add_stone(area, stone_name, requires);
    }
    for sub_area in area_json["sub_areas"].members() {
        load_area(builder, Some(area), sub_area)?;
    }
    Ok(())
}

fn read_json(path: &Path) -> Result<JsonValue> {
    let file = File::open(path).with_context(|| format!("unable to open {}", path.display()))?;
    let json_str = std::io::read_to_string(file)
        .with_context(|| format!("unable to read {}", path.display()))?;
    let json_data =
        json::parse(&json_str).with_context(|| format!("unable to parse {}", path.display()))?;
    Ok(json_data)
}

#[cfg(test)]
mod tests {
    use super::*;

    const WORLD: &str = r#"{
        "items": ["Sword", "Key"],
        "areas": [
            {
                "name": "Skyloft",
                "time_of_day": "Both",
                "can_sleep": true,
                "hint_region": "Skyloft",
                "locations": [
                    {"name": "Chest", "requires": "free", "hint": "sometimes"},
                    {"name": "Locked Chest", "requires": {"and": ["Key", {"or": ["Sword", "never"]}]}}
                ],
                "gossip_stones": [{"name": "Stone", "requires": "free"}],
                "exits": [{"name": "Dive", "requires": "Sword"}],
                "sub_areas": [
                    {
                        "name": "Academy",
                        "locations": [{"name": "Crystal", "requires": "Skyloft - Chest"}]
                    }
                ],
                "logic_exits": [{"to": "Academy", "requires": "free"}]
            },
            {
                "name": "Faron",
                "time_of_day": "DayOnly",
                "hint_region": "Faron Woods",
                "entrances": [{"name": "Landing"}],
                "events": [{"name": "Beat Game", "requires": "Sword"}]
            }
        ],
        "connections": [{"exit": "Skyloft - Dive", "entrance": "Faron/Landing"}],
        "dungeons": [{"name": "Faron Woods", "goal": "Faron - Beat Game", "boss_keys": ["Key"]}],
        "start_area": "Skyloft",
        "win_condition": "Faron/Beat Game"
    }"#;

    #[test]
    fn load_world_from_json() -> Result<()> {
        let world = World::from_json(&json::parse(WORLD)?)?;
        assert_eq!(world.checks.len(), 3);
        assert_eq!(world.areas[1].name, "Skyloft/Academy");
        assert_eq!(world.areas[1].time_of_day, TimeOfDay::Both);
        assert_eq!(world.checks[2].hint_region.as_deref(), Some("Skyloft"));
        assert_eq!(world.checks[0].hint, Some(HintImportance::Sometimes));
        assert_eq!(world.vanilla_connections, vec![(0, 0)]);
        assert_eq!(world.checks_in_subtree(0), &[0, 1, 2]);
        assert_eq!(world.start_bit(), world.bit("Skyloft (Day)").unwrap());
        assert_eq!(world.win_bit, world.bit("Faron/Beat Game").unwrap());

        let key = world.bit("Key").unwrap();
        let sword = world.bit("Sword").unwrap();
        let locked = world.bit("Skyloft - Locked Chest").unwrap();
        assert!(world.requirements[locked]
            .disjunction()
            .iter()
            .all(|c| c.contains(key) && c.contains(sword)));

        // The crystal refers to the chest by its short name.
        let crystal = world.bit("Academy - Crystal").unwrap();
        let chest = world.bit("Skyloft/Chest").unwrap();
        assert!(world.requirements[crystal].mentions(chest));
        Ok(())
    }

    #[test]
    fn link_requirements_follow_time_of_day() -> Result<()> {
        let world = World::from_json(&json::parse(WORLD)?)?;
        let exit = world.exit_idx("Skyloft - Dive").unwrap();
        let entrance = world.entrance_idx("Faron - Landing").unwrap();
        let reqs = world.link_requirements(exit, entrance);
        // Faron is day only, so the entrance has a single bit reached from Skyloft by day.
        assert_eq!(reqs.len(), 1);
        let (bit, req) = &reqs[0];
        assert_eq!(*bit, world.bit("Faron/Landing").unwrap());
        let expected = Requirement::all_of(
            [world.exits[exit].item, world.bit("Skyloft (Day)").unwrap()]
                .into_iter()
                .collect(),
        );
        assert_eq!(*req, expected);
        Ok(())
    }

    #[test]
    fn invalid_time_of_day_is_reported() {
        let bad = r#"{"areas": [{"name": "A", "time_of_day": "Dusk"}], "start_area": "A", "win_condition": "A"}"#;
        match World::from_json(&json::parse(bad).unwrap()) {
            Ok(_) => panic!("world with an unknown time of day was accepted"),
            Err(err) => assert!(format!("{err:#}").contains("Dusk")),
        }
    }
}
