//! Game data extraction
//!
//! Reads the `.sbc` definition files shipped with Space Engineers and ship
//! blueprints (`bp.sbc`). The files are XML, but only a handful of elements
//! matter here, so they are picked out with regular expressions the same
//! way for every file.

use std::fs;
use std::path::{Path, PathBuf};

use regex::{Captures, Regex};
use thiserror::Error;
use tracing::debug;
use walkdir::WalkDir;

use crate::models::{
    BlockDefinition, BlueprintDefinition, ComponentRef, GridBlock, ItemRef, RawEntry,
    RequestVector,
};
use crate::normalize::{self, NormalizationError};

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("Failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid extraction pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("{} is not a ship blueprint (no {section} section)", .path.display())]
    MissingSection {
        path: PathBuf,
        section: &'static str,
    },

    #[error("{}: {source}", .path.display())]
    Normalization {
        path: PathBuf,
        source: NormalizationError,
    },
}

/// Find all `.sbc` files below a directory, in file-name order
pub fn find_sbc_files(dir: &Path) -> Vec<PathBuf> {
    WalkDir::new(dir)
        .follow_links(true)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| p.extension().is_some_and(|ext| ext == "sbc"))
        .collect()
}

pub fn read_source(path: &Path) -> Result<String, ExtractError> {
    fs::read_to_string(path).map_err(|source| ExtractError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Parse every `<Definition>` of a CubeBlocks file
pub fn parse_block_definitions(content: &str) -> Result<Vec<RawEntry>, ExtractError> {
    let definition_re = Regex::new(r"(?s)<Definition\b[^>]*>(.*?)</Definition>")?;
    let id_re = id_regex()?;
    let type_re = element_regex("TypeId")?;
    let subtype_re = element_regex("SubtypeId")?;
    let size_re = element_regex("CubeSize")?;
    let time_re = element_regex("BuildTimeSeconds")?;
    let components_re = Regex::new(r"(?s)<Components>(.*?)</Components>")?;
    let component_re = Regex::new(r"<Component\b([^>]*?)/?>")?;
    let attr_re = attribute_regex()?;

    let mut entries = Vec::new();
    for cap in definition_re.captures_iter(content) {
        let body = &cap[1];
        let mut def = BlockDefinition::default();

        if let Some(id) = id_re.captures(body) {
            (def.type_id, def.subtype_id) = parse_id(&id, &attr_re, &type_re, &subtype_re);
        }
        def.cube_size = first_element_text(&size_re, body);
        def.build_time = first_element_text(&time_re, body);

        if let Some(components) = components_re.captures(body) {
            for c in component_re.captures_iter(&components[1]) {
                let attrs = &c[1];
                def.components.push(ComponentRef {
                    subtype: attribute(&attr_re, attrs, "Subtype"),
                    count: attribute(&attr_re, attrs, "Count"),
                });
            }
        }

        entries.push(RawEntry::AssembledUnit(def));
    }

    Ok(entries)
}

/// Parse every `<Blueprint>` of a blueprints file, tagged as component or
/// refining recipe by its result type
pub fn parse_blueprint_definitions(content: &str) -> Result<Vec<RawEntry>, ExtractError> {
    let blueprint_re = Regex::new(r"(?s)<Blueprint\b[^>]*>(.*?)</Blueprint>")?;
    let id_re = id_regex()?;
    let type_re = element_regex("TypeId")?;
    let subtype_re = element_regex("SubtypeId")?;
    let result_re = Regex::new(r"<Result\b([^>]*?)/?>")?;
    let results_re = Regex::new(r"(?s)<Results>(.*?)</Results>")?;
    let prerequisites_re = Regex::new(r"(?s)<Prerequisites>(.*?)</Prerequisites>")?;
    let item_re = Regex::new(r"<Item\b([^>]*?)/?>")?;
    let time_re = element_regex("BaseProductionTimeInSeconds")?;
    let attr_re = attribute_regex()?;

    let item_ref = |attrs: &str| ItemRef {
        type_id: attribute(&attr_re, attrs, "TypeId"),
        subtype_id: attribute(&attr_re, attrs, "SubtypeId"),
        amount: attribute(&attr_re, attrs, "Amount"),
    };

    let mut entries = Vec::new();
    for cap in blueprint_re.captures_iter(content) {
        let body = &cap[1];
        let mut bp = BlueprintDefinition::default();

        if let Some(id) = id_re.captures(body) {
            (_, bp.subtype_id) = parse_id(&id, &attr_re, &type_re, &subtype_re);
        }

        if let Some(result) = result_re.captures(body) {
            bp.results.push(item_ref(&result[1]));
        } else if let Some(results) = results_re.captures(body) {
            bp.results = item_re
                .captures_iter(&results[1])
                .map(|c| item_ref(&c[1]))
                .collect();
        }

        if let Some(prerequisites) = prerequisites_re.captures(body) {
            bp.prerequisites = item_re
                .captures_iter(&prerequisites[1])
                .map(|c| item_ref(&c[1]))
                .collect();
        }

        bp.production_time = first_element_text(&time_re, body);

        let refined = bp.results.first().is_some_and(|r| {
            matches!(
                r.type_id.as_deref().map(|t| t.trim_start_matches("MyObjectBuilder_")),
                Some("Ingot") | Some("Ore")
            )
        });
        entries.push(if refined {
            RawEntry::Refined(bp)
        } else {
            RawEntry::Component(bp)
        });
    }

    Ok(entries)
}

/// Parse the placed blocks of a ship blueprint.
///
/// Returns `None` when the document has no `CubeGrids` section.
pub fn parse_grid_blocks(content: &str) -> Result<Option<Vec<GridBlock>>, ExtractError> {
    let grids_re = Regex::new(r"<CubeGrids\b")?;
    if !grids_re.is_match(content) {
        return Ok(None);
    }

    let block_re = Regex::new(
        r"(?s)<MyObjectBuilder_CubeBlock\b([^>]*)>(.*?)</MyObjectBuilder_CubeBlock>",
    )?;
    let subtype_re = element_regex("SubtypeName")?;
    let entity_re = element_regex("EntityId")?;
    let attr_re = attribute_regex()?;

    let blocks = block_re
        .captures_iter(content)
        .map(|cap| GridBlock {
            xsi_type: attribute(&attr_re, &cap[1], "xsi:type"),
            subtype_name: first_element_text(&subtype_re, &cap[2]),
            entity_id: first_element_text(&entity_re, &cap[2]),
        })
        .collect();

    Ok(Some(blocks))
}

/// Count the blocks of a ship blueprint file by identity
pub fn read_ship_blueprint(path: &Path) -> Result<RequestVector, ExtractError> {
    let content = read_source(path)?;
    let blocks = parse_grid_blocks(&content)?.ok_or_else(|| ExtractError::MissingSection {
        path: path.to_path_buf(),
        section: "CubeGrids",
    })?;

    let mut request = RequestVector::new();
    for block in &blocks {
        let id = normalize::identify_grid_block(block).map_err(|source| {
            ExtractError::Normalization {
                path: path.to_path_buf(),
                source,
            }
        })?;
        *request.entry(id).or_default() += 1.0;
    }

    debug!(
        "{}: {} blocks of {} kinds",
        path.display(),
        blocks.len(),
        request.len()
    );
    Ok(request)
}

/// `<Tag/>` or `<Tag>text</Tag>`; the empty form yields no capture
fn element_regex(tag: &str) -> Result<Regex, regex::Error> {
    Regex::new(&format!(r"<{tag}\s*/>|<{tag}>([^<]*)</{tag}>"))
}

/// `<Id Type=".." Subtype=".."/>` or `<Id>...</Id>`
fn id_regex() -> Result<Regex, regex::Error> {
    Regex::new(r"(?s)<Id\b([^>]*?)(?:/>|>(.*?)</Id>)")
}

fn attribute_regex() -> Result<Regex, regex::Error> {
    Regex::new(r#"([\w:]+)\s*=\s*"([^"]*)""#)
}

fn first_element_text(re: &Regex, content: &str) -> Option<String> {
    let cap = re.captures(content)?;
    cap.get(1)
        .map(|m| m.as_str().trim().to_string())
        .filter(|s| !s.is_empty())
}

fn attribute(re: &Regex, attrs: &str, name: &str) -> Option<String> {
    re.captures_iter(attrs)
        .find(|c| &c[1] == name)
        .map(|c| c[2].to_string())
}

fn parse_id(
    id: &Captures<'_>,
    attr_re: &Regex,
    type_re: &Regex,
    subtype_re: &Regex,
) -> (Option<String>, Option<String>) {
    match id.get(2) {
        Some(inner) => (
            first_element_text(type_re, inner.as_str()),
            first_element_text(subtype_re, inner.as_str()),
        ),
        None => (
            attribute(attr_re, &id[1], "Type"),
            attribute(attr_re, &id[1], "Subtype").filter(|s| !s.is_empty()),
        ),
    }
}
