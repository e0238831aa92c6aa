//! Record normalization
//!
//! Maps the raw entries of the three source schemas (block definitions,
//! component blueprints, refining blueprints) onto one canonical
//! [`RecipeRecord`] shape keyed by a resolved item identity.

use thiserror::Error;

use crate::models::{
    BlockDefinition, BlueprintDefinition, GridBlock, ItemRef, Partition, RawEntry, RecipeRecord,
};

/// Blueprints that are pass-through conversions rather than real recipes
const EXCLUDED_BLUEPRINTS: &[&str] = &[
    "IceToOxygen",
    "HydrogenBottlesRefill",
    "OxygenBottlesRefill",
    "ScrapIngotToIronIngot",
    "ScrapToIronIngot",
];

/// Items no machine produces; their production time is ignored
const UNTIMED_ITEMS: &[&str] = &["ZoneChip"];

/// Block definitions whose `SubtypeId` is empty: (TypeId, CubeSize) -> identity.
/// `None` for the size matches any size.
const BLOCK_FALLBACKS: &[(&str, Option<&str>, &str)] = &[
    ("OxygenTank", Some("Large"), "LargeOxygenTank"),
    ("AirVent", None, "AirVent"),
    ("GravityGenerator", None, "GravityGenerator"),
    ("OxygenGenerator", None, "OxygenGenerator"),
];

/// Grid blocks whose `SubtypeName` is empty: xsi:type -> identity
const GRID_BLOCK_FALLBACKS: &[(&str, &str)] = &[
    ("MyObjectBuilder_OxygenTank", "LargeOxygenTank"),
    ("MyObjectBuilder_OxygenGenerator", "OxygenGenerator"),
    ("MyObjectBuilder_AirVent", "AirVent"),
    ("MyObjectBuilder_GravityGenerator", "GravityGenerator"),
];

#[derive(Debug, Error, PartialEq)]
pub enum NormalizationError {
    #[error("Block definition without subtype cannot be identified (TypeId: {type_id}, CubeSize: {cube_size})")]
    UnidentifiedBlock { type_id: String, cube_size: String },

    #[error("Found unidentifiable block without proper subtype (type: {xsi_type}, EntityId: {entity_id})")]
    UnidentifiedGridBlock { xsi_type: String, entity_id: String },

    #[error("Blueprint result has no subtype and the blueprint has no id")]
    UnidentifiedBlueprint,

    #[error("Invalid result amount '{amount}' in blueprint for {id}")]
    InvalidYield { id: String, amount: String },

    #[error("Invalid build time '{value}' for {id}")]
    InvalidBuildTime { id: String, value: String },
}

/// A normalized entry ready to be merged into the cost database
#[derive(Debug, Clone, PartialEq)]
pub struct Normalized {
    pub id: String,
    pub partition: Partition,
    pub record: RecipeRecord,
}

/// Normalize one raw entry.
///
/// Returns `Ok(None)` for entries the policy tables exclude and for
/// blueprints that cannot be addressed by a single output identity.
pub fn normalize(entry: &RawEntry) -> Result<Option<Normalized>, NormalizationError> {
    match entry {
        RawEntry::AssembledUnit(def) => normalize_block(def).map(Some),
        RawEntry::Component(bp) => normalize_blueprint(bp, Partition::Components),
        RawEntry::Refined(bp) => normalize_blueprint(bp, Partition::Materials),
    }
}

fn normalize_block(def: &BlockDefinition) -> Result<Normalized, NormalizationError> {
    let id = match non_empty(def.subtype_id.as_deref()) {
        Some(subtype) => subtype.to_string(),
        None => block_fallback(def)?,
    };

    let build_time = match def.build_time.as_deref() {
        Some(raw) => parse_amount(raw)
            .filter(|t| *t >= 0.0)
            .ok_or_else(|| NormalizationError::InvalidBuildTime {
                id: id.clone(),
                value: raw.to_string(),
            })?,
        None => 0.0,
    };

    let mut record = RecipeRecord::new(build_time, 1.0);
    for component in &def.components {
        // Only children with a usable Count contribute
        let (Some(subtype), Some(count)) = (
            non_empty(component.subtype.as_deref()),
            component.count.as_deref().and_then(parse_amount),
        ) else {
            continue;
        };
        if count < 0.0 {
            continue;
        }
        record.add_ingredient(subtype, count);
    }

    Ok(Normalized {
        id,
        partition: Partition::Blocks,
        record,
    })
}

fn block_fallback(def: &BlockDefinition) -> Result<String, NormalizationError> {
    let type_id = def.type_id.as_deref().map(strip_builder_prefix).unwrap_or("");
    let cube_size = def.cube_size.as_deref().unwrap_or("");

    BLOCK_FALLBACKS
        .iter()
        .find(|(t, size, _)| *t == type_id && size.is_none_or(|s| s == cube_size))
        .map(|(_, _, name)| name.to_string())
        .ok_or_else(|| NormalizationError::UnidentifiedBlock {
            type_id: type_id.to_string(),
            cube_size: cube_size.to_string(),
        })
}

fn normalize_blueprint(
    bp: &BlueprintDefinition,
    partition: Partition,
) -> Result<Option<Normalized>, NormalizationError> {
    let blueprint_id = non_empty(bp.subtype_id.as_deref());
    if blueprint_id.is_some_and(|id| EXCLUDED_BLUEPRINTS.contains(&id)) {
        return Ok(None);
    }

    // Several outputs can't be addressed through one identity
    let [result] = bp.results.as_slice() else {
        return Ok(None);
    };

    let id = match item_name(result) {
        Some(name) => name,
        None => blueprint_id
            .map(str::to_string)
            .ok_or(NormalizationError::UnidentifiedBlueprint)?,
    };

    let yield_quantity = match result.amount.as_deref() {
        Some(raw) => parse_amount(raw)
            .filter(|amount| *amount > 0.0)
            .ok_or_else(|| NormalizationError::InvalidYield {
                id: id.clone(),
                amount: raw.to_string(),
            })?,
        None => 1.0,
    };

    let build_time = if UNTIMED_ITEMS.contains(&id.as_str()) {
        0.0
    } else {
        match bp.production_time.as_deref() {
            Some(raw) => parse_amount(raw)
                .filter(|t| *t >= 0.0)
                .ok_or_else(|| NormalizationError::InvalidBuildTime {
                    id: id.clone(),
                    value: raw.to_string(),
                })?,
            None => 0.0,
        }
    };

    let mut record = RecipeRecord::new(build_time, yield_quantity);
    for prerequisite in &bp.prerequisites {
        let (Some(name), Some(amount)) = (
            item_name(prerequisite),
            prerequisite.amount.as_deref().and_then(parse_amount),
        ) else {
            continue;
        };
        if amount < 0.0 {
            continue;
        }
        record.add_ingredient(name, amount);
    }

    Ok(Some(Normalized {
        id,
        partition,
        record,
    }))
}

/// Resolve the identity of a block placed on a ship grid
pub fn identify_grid_block(block: &GridBlock) -> Result<String, NormalizationError> {
    if let Some(name) = non_empty(block.subtype_name.as_deref()) {
        return Ok(name.to_string());
    }

    let xsi_type = block.xsi_type.as_deref().unwrap_or("");
    GRID_BLOCK_FALLBACKS
        .iter()
        .find(|(t, _)| *t == xsi_type)
        .map(|(_, name)| name.to_string())
        .ok_or_else(|| NormalizationError::UnidentifiedGridBlock {
            xsi_type: xsi_type.to_string(),
            entity_id: block.entity_id.clone().unwrap_or_else(|| "?".to_string()),
        })
}

/// Item name with the tier label appended for ores and ingots.
///
/// Source data reuses the same subtype ("Iron") for both the ore and the
/// ingot, so the label is part of the identity.
pub fn item_name(item: &ItemRef) -> Option<String> {
    let subtype = non_empty(item.subtype_id.as_deref())?;
    let type_id = item.type_id.as_deref().map(strip_builder_prefix);
    Some(match type_id {
        Some("Ore") => format!("{} Ore", subtype),
        Some("Ingot") => format!("{} Ingot", subtype),
        _ => subtype.to_string(),
    })
}

fn strip_builder_prefix(type_id: &str) -> &str {
    type_id.strip_prefix("MyObjectBuilder_").unwrap_or(type_id)
}

fn non_empty(s: Option<&str>) -> Option<&str> {
    s.map(str::trim).filter(|s| !s.is_empty())
}

fn parse_amount(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}
