#![allow(dead_code)]

use anyhow::Result;
use ssrando::logic::{ExitPool, Logic, LogicSettings, PoolEntrance, PoolExit, Transition};
use ssrando::placement::Placement;
use ssrando::randomize::{Randomizer, UserOutput};
use ssrando::settings::{EntrancePoolSettings, PoolConnectionSettings};
use ssrando_game::{Dungeon, RequirementSpec, TimeOfDay, World, WorldBuilder};
use ssrando_logic::Inventory;

/// Keeps every progress message, in order.
#[derive(Default)]
pub struct RecordingOutput {
    pub messages: Vec<String>,
}

impl UserOutput for RecordingOutput {
    fn progress(&mut self, message: &str) {
        self.messages.push(message.to_string());
    }
}

pub fn empty_logic_settings(world: &World) -> LogicSettings {
    LogicSettings {
        starting_inventory: Inventory::new(),
        starting_area: world.start_area,
        additional_requirements: vec![],
        exit_pools: vec![],
    }
}

/// One area with two chests; the second needs the key.
pub fn key_world() -> Result<World> {
    let mut b = WorldBuilder::new();
    b.add_item("Key").add_item("Chest");
    let field = b.add_area(None, "Field", TimeOfDay::DayOnly);
    b.add_location(field, "A", RequirementSpec::Free);
    b.add_location(field, "B", RequirementSpec::name("Key"));
    b.add_event(field, "Done", RequirementSpec::Free);
    b.set_start_area("Field");
    b.set_win_condition("Field/Done");
    b.build()
}

/// A hub with two exits, and a cave and a lake that both lead back to it.
pub fn hub_world() -> Result<World> {
    let mut b = WorldBuilder::new();
    b.add_item("Sword");
    let hub = b.add_area(None, "Hub", TimeOfDay::DayOnly);
    b.add_exit(hub, "To Cave", RequirementSpec::Free);
    b.add_exit(hub, "To Lake", RequirementSpec::Free);
    b.add_exit(hub, "To Pit", RequirementSpec::Free);
    for name in ["Cave", "Lake"] {
        let area = b.add_area(None, name, TimeOfDay::DayOnly);
        b.add_entrance(area, "Entrance", None);
        b.add_logic_exit(area, "Hub", RequirementSpec::Free);
        b.add_location(area, "Chest", RequirementSpec::Free);
    }
    // No way back from the pit.
    let pit = b.add_area(None, "Pit", TimeOfDay::DayOnly);
    b.add_entrance(pit, "Entrance", None);
    b.add_event(hub, "Done", RequirementSpec::Free);
    b.connect("Hub/To Cave", "Cave/Entrance");
    b.connect("Hub/To Lake", "Lake/Entrance");
    b.set_start_area("Hub");
    b.set_win_condition("Hub/Done");
    b.build()
}

pub fn pool(world: &World, entrances: &[&str], exits: &[&str]) -> ExitPool {
    ExitPool {
        entrances: entrances
            .iter()
            .map(|e| PoolEntrance {
                entrance: world.entrance_idx(e).unwrap(),
                constraints: vec![],
            })
            .collect(),
        exits: exits
            .iter()
            .map(|x| PoolExit {
                exit: world.exit_idx(x).unwrap(),
                constraints: vec![],
            })
            .collect(),
    }
}

/// Sky islands with two gossip stones, a dungeon holding the goal and a grotto.
pub fn sky_world() -> Result<World> {
    let mut b = WorldBuilder::new();
    b.add_item("Sword").add_item("Bow").add_item("Boss Key");

    let sky = b.add_area(None, "Sky", TimeOfDay::DayOnly);
    b.area_mut(sky).hint_region = Some("Sky".to_string());
    b.add_location(sky, "Chest 1", RequirementSpec::Free);
    b.add_location(sky, "Chest 2", RequirementSpec::Free);
    b.add_location(sky, "Chest 3", RequirementSpec::name("Sword"));
    b.add_location(sky, "Chest 4", RequirementSpec::name("Bow"));
    b.add_stone(sky, "Stone", RequirementSpec::Free);
    b.add_stone(sky, "Statue", RequirementSpec::Free);
    b.add_exit(sky, "To Dungeon", RequirementSpec::Free);
    b.add_exit(sky, "To Grotto", RequirementSpec::Free);

    let dungeon = b.add_area(None, "Dungeon", TimeOfDay::DayOnly);
    b.area_mut(dungeon).hint_region = Some("Dungeon".to_string());
    b.add_entrance(dungeon, "Entrance", None);
    b.add_logic_exit(dungeon, "Sky", RequirementSpec::Free);
    b.add_location(dungeon, "Chest 5", RequirementSpec::Free);
    b.add_location(dungeon, "Chest 6", RequirementSpec::name("Sword"));
    b.add_event(
        dungeon,
        "Beat Boss",
        RequirementSpec::all(&["Sword", "Bow", "Boss Key"]),
    );

    let grotto = b.add_area(None, "Grotto", TimeOfDay::DayOnly);
    b.area_mut(grotto).hint_region = Some("Grotto".to_string());
    b.add_entrance(grotto, "Entrance", None);
    b.add_logic_exit(grotto, "Sky", RequirementSpec::Free);
    b.add_location(grotto, "Chest 7", RequirementSpec::Free);

    b.connect("Sky/To Dungeon", "Dungeon/Entrance");
    b.connect("Sky/To Grotto", "Grotto/Entrance");
    b.add_dungeon(Dungeon {
        name: "Dungeon".to_string(),
        goal: Some("Dungeon/Beat Boss".to_string()),
        boss_keys: vec!["Boss Key".to_string()],
    });
    b.add_hintable_item("Bow");
    b.add_junk_hint("The wind is nice today");
    b.set_start_area("Sky");
    b.set_win_condition("Dungeon/Beat Boss");
    b.build()
}

pub fn sky_entrance_pool() -> EntrancePoolSettings {
    let conn = |name: &str| PoolConnectionSettings {
        name: name.to_string(),
        constraints: vec![],
    };
    EntrancePoolSettings {
        entrances: vec![conn("Dungeon/Entrance"), conn("Grotto/Entrance")],
        exits: vec![conn("Sky/To Dungeon"), conn("Sky/To Grotto")],
    }
}

/// Four chests in a field; either item opens the goal.
pub fn alternatives_world() -> Result<World> {
    let mut b = WorldBuilder::new();
    b.add_item("Hook").add_item("Whip");
    let field = b.add_area(None, "Field", TimeOfDay::DayOnly);
    for name in ["L1", "L2", "L3", "L4"] {
        b.add_location(field, name, RequirementSpec::Free);
    }
    b.add_event(field, "Goal", RequirementSpec::any(&["Hook", "Whip"]));
    b.set_start_area("Field");
    b.set_win_condition("Field/Goal");
    b.build()
}

/// A hub and two rooms whose only way back is the return door linked along with the way in.
pub fn coupled_world() -> Result<World> {
    let mut b = WorldBuilder::new();
    let hub = b.add_area(None, "Hub", TimeOfDay::DayOnly);
    b.add_exit(hub, "To Cave", RequirementSpec::Free);
    b.add_exit(hub, "To Lake", RequirementSpec::Free);
    b.add_entrance(hub, "From Cave", None);
    b.add_entrance(hub, "From Lake", None);
    b.add_event(hub, "Done", RequirementSpec::Free);
    for name in ["Cave", "Lake"] {
        let room = b.add_area(None, name, TimeOfDay::DayOnly);
        b.add_entrance(room, "Entrance", None);
        b.add_exit(room, "Exit", RequirementSpec::Free);
        b.add_location(room, "Chest", RequirementSpec::Free);
    }
    b.set_start_area("Hub");
    b.set_win_condition("Hub/Done");
    b.build()
}

/// Room entrances paired with their way out, hub exits paired with the door they come back to.
pub fn coupled_pool(world: &World) -> ExitPool {
    let entrance = |room: &str| PoolEntrance {
        entrance: world.entrance_idx(&format!("{room}/Entrance")).unwrap(),
        constraints: vec![Transition::Exit(
            world.exit_idx(&format!("{room}/Exit")).unwrap(),
        )],
    };
    let exit = |room: &str| PoolExit {
        exit: world.exit_idx(&format!("Hub/To {room}")).unwrap(),
        constraints: vec![Transition::Entrance(
            world.entrance_idx(&format!("Hub/From {room}")).unwrap(),
        )],
    };
    ExitPool {
        entrances: vec![entrance("Cave"), entrance("Lake")],
        exits: vec![exit("Cave"), exit("Lake")],
    }
}

/// Whether the win condition is reached from the starting items alone, picking up only what
/// `placement` puts in reach and never entering a banned location.
pub fn completable_from_placement(randomizer: &Randomizer, placement: &Placement) -> Result<bool> {
    let world = randomizer.world;
    let mut starting_inventory = Inventory::new();
    for item in &randomizer.settings.starting_items {
        starting_inventory.insert(world.bit(item).unwrap());
    }
    let settings = LogicSettings {
        starting_inventory,
        exit_pools: vec![],
        ..randomizer.logic_settings()
    };
    let logic = Logic::new(world, settings, Some(placement))?;
    Ok(logic.is_reachable(world.win_bit))
}
