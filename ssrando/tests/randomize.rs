mod common;

use anyhow::Result;
use common::{
    alternatives_world, completable_from_placement, sky_entrance_pool, sky_world, RecordingOutput,
};
use ssrando::hints::GossipStoneHint;
use ssrando::randomize::Randomizer;
use ssrando::settings::{HintSettings, RandomizerSettings};

fn sky_settings(hints: bool) -> RandomizerSettings {
    RandomizerSettings {
        must_be_placed_items: vec![
            "Sword".to_string(),
            "Bow".to_string(),
            "Boss Key".to_string(),
        ],
        duplicable_items: vec!["Rupee".to_string()],
        entrance_pools: vec![sky_entrance_pool()],
        hint_settings: HintSettings {
            enabled: hints,
            required_dungeons: vec!["Dungeon".to_string()],
            ..Default::default()
        },
        ..Default::default()
    }
}

#[test]
fn same_seed_gives_same_randomization() -> Result<()> {
    let world = sky_world()?;
    let settings = sky_settings(true);
    let randomizer = Randomizer::new(&world, &settings)?;
    let first = randomizer.randomize(0, 1234)?;
    let second = randomizer.randomize(1, 1234)?;
    assert_eq!(
        serde_json::to_string(&first)?,
        serde_json::to_string(&second)?
    );
    Ok(())
}

#[test]
fn every_location_is_filled() -> Result<()> {
    let world = sky_world()?;
    let settings = sky_settings(false);
    let randomizer = Randomizer::new(&world, &settings)?;
    for seed in 0..10 {
        let randomization = randomizer.randomize_with(seed, &mut RecordingOutput::default())?;
        let placement = &randomization.placement;
        assert_eq!(placement.locations.len(), world.checks.len());
        for item in ["Sword", "Bow", "Boss Key"] {
            let location = &placement.items[item];
            assert_eq!(&placement.locations[location], item);
        }
        let rupees = placement
            .locations
            .values()
            .filter(|i| *i == "Rupee")
            .count();
        assert_eq!(rupees, world.checks.len() - 3);
        assert_eq!(placement.map_transitions.len(), 2);
        assert!(randomization.spoiler_log.unreachable_items.is_empty());
        assert!(randomization.hints.is_empty());
        assert!(completable_from_placement(&randomizer, placement)?);
    }
    Ok(())
}

#[test]
fn progress_items_come_first_in_spheres() -> Result<()> {
    let world = sky_world()?;
    let settings = sky_settings(false);
    let randomizer = Randomizer::new(&world, &settings)?;
    let randomization = randomizer.randomize_with(5, &mut RecordingOutput::default())?;
    let log = &randomization.spoiler_log;

    let mut progress = log.progress_items.clone();
    progress.sort();
    assert_eq!(progress, vec!["Boss Key", "Bow", "Sword"]);
    let collected: usize = log.spheres.iter().map(|s| s.items.len()).sum();
    assert_eq!(collected, 3);
    assert!(!log.spheres.is_empty());
    assert!(log.unreachable_items.is_empty());
    Ok(())
}

#[test]
fn hints_fill_every_stone() -> Result<()> {
    let world = sky_world()?;
    let settings = sky_settings(true);
    let randomizer = Randomizer::new(&world, &settings)?;
    for seed in 0..5 {
        let randomization = randomizer.randomize_with(seed, &mut RecordingOutput::default())?;
        let placement = &randomization.placement;
        assert_eq!(randomization.hints.len(), world.stones.len());
        for hints in randomization.hints.values() {
            assert_eq!(hints.len(), 2);
        }
        assert_eq!(placement.hints.len(), 4);

        let required = ["Sword", "Bow", "Boss Key"];
        for hint in randomization.hints.values().flatten() {
            match hint {
                GossipStoneHint::SotsGoal { item, location, .. } => {
                    assert!(required.contains(&item.as_str()));
                    assert_eq!(&placement.locations[location], item);
                }
                GossipStoneHint::Location { item, location, .. }
                | GossipStoneHint::ZoneItem { item, location, .. } => {
                    assert_eq!(&placement.locations[location], item);
                }
                GossipStoneHint::Barren { zone } => {
                    for (location, item) in &placement.locations {
                        let check = &world.checks[world.check_idx(location).unwrap()];
                        if check.hint_region.as_ref() == Some(zone) {
                            assert!(!required.contains(&item.as_str()));
                        }
                    }
                }
                GossipStoneHint::Junk { text } => {
                    assert_eq!(text, "The wind is nice today");
                }
            }
        }
    }
    Ok(())
}

// Entrances are linked before any hint exists, so relinking never has to carry hint gates.
#[test]
fn entrances_are_linked_before_hints() -> Result<()> {
    let world = sky_world()?;
    let settings = sky_settings(true);
    let randomizer = Randomizer::new(&world, &settings)?;
    let mut output = RecordingOutput::default();
    randomizer.randomize_with(11, &mut output)?;

    let position = |message: &str| output.messages.iter().position(|m| m == message);
    let linking = position("linking entrances...").unwrap();
    let placing = position("placing progress items...").unwrap();
    let hints = position("selecting hints...").unwrap();
    assert!(linking < placing);
    assert!(placing < hints);
    Ok(())
}

#[test]
fn unknown_names_are_rejected() -> Result<()> {
    let world = sky_world()?;
    let mut settings = sky_settings(false);
    settings.must_be_placed_items.push("Hookshot".to_string());
    assert!(Randomizer::new(&world, &settings).is_err());

    let mut settings = sky_settings(false);
    settings.banned_locations.push("Sky/Chest 99".to_string());
    assert!(Randomizer::new(&world, &settings).is_err());
    Ok(())
}

#[test]
fn banned_locations_only_get_junk() -> Result<()> {
    let world = sky_world()?;
    let mut settings = sky_settings(false);
    settings.banned_locations = vec![
        "Dungeon/Chest 5".to_string(),
        "Grotto/Chest 7".to_string(),
    ];
    let randomizer = Randomizer::new(&world, &settings)?;
    for seed in 0..10 {
        let randomization = randomizer.randomize_with(seed, &mut RecordingOutput::default())?;
        let placement = &randomization.placement;
        assert_eq!(placement.locations["Dungeon/Chest 5"], "Rupee");
        assert_eq!(placement.locations["Grotto/Chest 7"], "Rupee");
        assert!(completable_from_placement(&randomizer, placement)?);
    }
    Ok(())
}

#[test]
fn alternative_items_stay_out_of_banned_locations() -> Result<()> {
    let world = alternatives_world()?;
    let settings = RandomizerSettings {
        must_be_placed_items: vec!["Hook".to_string(), "Whip".to_string()],
        duplicable_items: vec!["Rupee".to_string()],
        banned_locations: vec!["Field/L1".to_string(), "Field/L2".to_string()],
        ..Default::default()
    };
    let randomizer = Randomizer::new(&world, &settings)?;
    for seed in 0..40 {
        let randomization = randomizer.randomize_with(seed, &mut RecordingOutput::default())?;
        let mut progress = randomization.spoiler_log.progress_items.clone();
        progress.sort();
        assert_eq!(progress, vec!["Hook", "Whip"]);
        let placement = &randomization.placement;
        assert_eq!(placement.locations["Field/L1"], "Rupee");
        assert_eq!(placement.locations["Field/L2"], "Rupee");
        assert!(completable_from_placement(&randomizer, placement)?);
    }

    // Both items behind banned locations can only be picked up with the ban lifted.
    let mut placement = randomizer.start_placement().clone();
    for (location, item) in [
        ("Field/L1", "Hook"),
        ("Field/L2", "Whip"),
        ("Field/L3", "Rupee"),
        ("Field/L4", "Rupee"),
    ] {
        placement
            .locations
            .insert(location.to_string(), item.to_string());
    }
    assert!(!completable_from_placement(&randomizer, &placement)?);
    Ok(())
}

#[test]
fn placed_items_and_limits_are_honored() -> Result<()> {
    let world = sky_world()?;
    let mut settings = sky_settings(true);
    settings
        .placed_items
        .insert("Sky/Chest 1".to_string(), "Sword".to_string());
    settings
        .item_placement_limits
        .insert("Boss Key".to_string(), "Dungeon".to_string());
    let randomizer = Randomizer::new(&world, &settings)?;
    for seed in 0..5 {
        let randomization = randomizer.randomize_with(seed, &mut RecordingOutput::default())?;
        let placement = &randomization.placement;
        assert_eq!(placement.locations["Sky/Chest 1"], "Sword");
        assert!(placement.items["Boss Key"].starts_with("Dungeon/"));
        // Decided locations are never hinted.
        for hint in randomization.hints.values().flatten() {
            assert_ne!(hint.location(), Some("Sky/Chest 1"));
        }
    }
    Ok(())
}
