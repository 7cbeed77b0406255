use anyhow::{bail, Result};
use hashbrown::HashMap;
use serde::{Deserialize, Serialize};
use ssrando_game::HintImportance;
use std::collections::BTreeMap;
use strum_macros::{Display, EnumString, VariantNames};

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Default)]
pub struct RandomizerSettings {
    #[serde(default)]
    pub starting_items: Vec<String>,
    // Overrides the world's start area
    #[serde(default)]
    pub start_area: Option<String>,
    pub must_be_placed_items: Vec<String>,
    #[serde(default)]
    pub may_be_placed_items: Vec<String>,
    pub duplicable_items: Vec<String>,
    // Item -> area or check it must be placed in
    #[serde(default)]
    pub item_placement_limits: HashMap<String, String>,
    // Check -> item, decided before randomization
    #[serde(default)]
    pub placed_items: BTreeMap<String, String>,
    #[serde(default)]
    pub banned_locations: Vec<String>,
    #[serde(default)]
    pub all_locations_reachable: bool,
    #[serde(default)]
    pub entrance_pools: Vec<EntrancePoolSettings>,
    #[serde(default)]
    pub hint_settings: HintSettings,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Default)]
pub struct EntrancePoolSettings {
    pub entrances: Vec<PoolConnectionSettings>,
    pub exits: Vec<PoolConnectionSettings>,
}

/// An entrance or exit of a pool. `constraints` are paired positionally with the constraints of
/// whatever it gets linked to, each pair being linked along with it.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct PoolConnectionSettings {
    pub name: String,
    #[serde(default)]
    pub constraints: Vec<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Default)]
pub struct HintSettings {
    pub enabled: bool,
    #[serde(default)]
    pub precise_item: bool,
    #[serde(default)]
    pub required_dungeons: Vec<String>,
    #[serde(default)]
    pub distribution: HintDistributionSettings,
}

#[derive(
    Serialize,
    Deserialize,
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    EnumString,
    VariantNames,
    Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum HintType {
    Always,
    Sometimes,
    Sots,
    Goal,
    Barren,
    Item,
    Random,
    Junk,
    Bk,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct HintTypeSettings {
    pub order: usize,
    pub weight: f32,
    #[serde(default)]
    pub fixed: usize,
    #[serde(default = "default_copies")]
    pub copies: usize,
    #[serde(default)]
    pub max: Option<usize>,
}

fn default_copies() -> usize {
    1
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct AddedHintLocation {
    pub location: String,
    #[serde(rename = "type")]
    pub kind: HintImportance,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct AddedHintItem {
    pub name: String,
    pub amount: usize,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct HintDistributionSettings {
    pub hints_per_stone: usize,
    #[serde(default)]
    pub banned_stones: Vec<String>,
    #[serde(default)]
    pub added_locations: Vec<AddedHintLocation>,
    #[serde(default)]
    pub removed_locations: Vec<String>,
    #[serde(default)]
    pub added_items: Vec<AddedHintItem>,
    #[serde(default)]
    pub removed_items: Vec<String>,
    #[serde(default)]
    pub dungeon_sots_limit: usize,
    #[serde(default)]
    pub dungeon_barren_limit: usize,
    pub distribution: BTreeMap<HintType, HintTypeSettings>,
}

impl Default for HintDistributionSettings {
    fn default() -> Self {
        let entry = |order, weight, fixed| HintTypeSettings {
            order,
            weight,
            fixed,
            copies: 1,
            max: None,
        };
        HintDistributionSettings {
            hints_per_stone: 2,
            banned_stones: vec![],
            added_locations: vec![],
            removed_locations: vec![],
            added_items: vec![],
            removed_items: vec![],
            dungeon_sots_limit: 2,
            dungeon_barren_limit: 1,
            distribution: BTreeMap::from([
                (HintType::Always, entry(0, 0.0, 0)),
                (HintType::Sots, entry(1, 2.0, 2)),
                (HintType::Goal, entry(2, 0.0, 1)),
                (HintType::Sometimes, entry(3, 1.5, 2)),
                (HintType::Barren, entry(4, 1.0, 1)),
                (HintType::Item, entry(5, 1.0, 0)),
                (HintType::Random, entry(6, 1.0, 0)),
                (HintType::Junk, entry(7, 0.5, 0)),
                (HintType::Bk, entry(8, 0.0, 0)),
            ]),
        }
    }
}

impl HintDistributionSettings {
    pub fn validate(&self) -> Result<()> {
        // Gossip stone text only fits so many hints.
        if self.hints_per_stone == 0 || self.hints_per_stone > 8 {
            bail!(
                "Hint distribution must have no less than one hint per stone and no more than 8, got {}",
                self.hints_per_stone
            );
        }
        for (hint_type, s) in &self.distribution {
            if s.copies == 0 {
                bail!("Hint type {hint_type} must have at least one copy");
            }
            if s.weight < 0.0 || !s.weight.is_finite() {
                bail!("Hint type {hint_type} has invalid weight {}", s.weight);
            }
        }
        Ok(())
    }
}

pub fn parse_randomizer_settings(settings_json: &str) -> Result<RandomizerSettings> {
    let mut des = serde_json::Deserializer::from_str(settings_json);
    let settings: RandomizerSettings = serde_path_to_error::deserialize(&mut des)?;
    settings.hint_settings.distribution.validate()?;
    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_minimal_settings() -> Result<()> {
        let settings = parse_randomizer_settings(
            r#"{
                "must_be_placed_items": ["Key"],
                "duplicable_items": ["Rupee"],
                "hint_settings": {
                    "enabled": true,
                    "distribution": {
                        "hints_per_stone": 3,
                        "distribution": {
                            "junk": {"order": 0, "weight": 1.0},
                            "always": {"order": 1, "weight": 0.0, "copies": 2}
                        }
                    }
                }
            }"#,
        )?;
        assert_eq!(settings.must_be_placed_items, vec!["Key"]);
        assert!(settings.may_be_placed_items.is_empty());
        let dist = &settings.hint_settings.distribution;
        assert_eq!(dist.hints_per_stone, 3);
        assert_eq!(dist.distribution[&HintType::Always].copies, 2);
        assert_eq!(dist.distribution[&HintType::Junk].copies, 1);
        // Keys iterate in a fixed order regardless of the input.
        let types: Vec<_> = dist.distribution.keys().copied().collect();
        assert_eq!(types, vec![HintType::Always, HintType::Junk]);
        Ok(())
    }

    #[test]
    fn rejects_too_many_hints_per_stone() {
        let mut dist = HintDistributionSettings::default();
        assert!(dist.validate().is_ok());
        dist.hints_per_stone = 9;
        assert!(dist.validate().is_err());
        dist.hints_per_stone = 0;
        assert!(dist.validate().is_err());
    }

    #[test]
    fn reports_path_of_bad_field() {
        let err = parse_randomizer_settings(
            r#"{"must_be_placed_items": [], "duplicable_items": [], "all_locations_reachable": 3}"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("all_locations_reachable"));
    }
}
