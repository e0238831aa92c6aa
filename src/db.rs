//! Cost database: construction from game files and the SQLite cache

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use rusqlite::{Connection, OpenFlags};
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{debug, info};

use crate::extract::{self, ExtractError};
use crate::models::{Partition, RawEntry, RecipeRecord, RequestVector};
use crate::normalize::{self, NormalizationError};

/// Location of the game data below the steamapps folder
const DATA_SUBDIR: &str = "common/SpaceEngineers/Content/Data";
const BLOCKS_SUBDIR: &str = "CubeBlocks";
const BLUEPRINTS_FILE: &str = "Blueprints.sbc";

#[derive(Debug, Error)]
pub enum BuildError {
    #[error(
        "No valid Space Engineers installation found in {}. Please set the correct install directory with the -s option.",
        .path.display()
    )]
    NoSourceRoot { path: PathBuf },

    #[error(transparent)]
    Extract(#[from] ExtractError),

    #[error("{}: {source}", .path.display())]
    Normalization {
        path: PathBuf,
        source: NormalizationError,
    },
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("Component database cache not found at {}", .path.display())]
    NotFound { path: PathBuf },

    #[error("Component database cache at {} is corrupt: {reason}", .path.display())]
    Corrupt { path: PathBuf, reason: String },
}

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("Failed to write component database cache: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Failed to replace component database cache: {0}")]
    Io(#[from] std::io::Error),
}

/// Recipe records of every tier, addressed through one namespace
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CostDatabase {
    pub blocks: BTreeMap<String, RecipeRecord>,
    pub components: BTreeMap<String, RecipeRecord>,
    pub materials: BTreeMap<String, RecipeRecord>,
}

impl CostDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    fn partition_mut(&mut self, partition: Partition) -> &mut BTreeMap<String, RecipeRecord> {
        match partition {
            Partition::Blocks => &mut self.blocks,
            Partition::Components => &mut self.components,
            Partition::Materials => &mut self.materials,
        }
    }

    fn partitions(&self) -> [(Partition, &BTreeMap<String, RecipeRecord>); 3] {
        [
            (Partition::Blocks, &self.blocks),
            (Partition::Components, &self.components),
            (Partition::Materials, &self.materials),
        ]
    }

    /// Insert a record; a colliding identity is overwritten
    pub fn insert(&mut self, partition: Partition, id: impl Into<String>, record: RecipeRecord) {
        self.partition_mut(partition).insert(id.into(), record);
    }

    #[cfg(test)]
    pub fn with_record(
        mut self,
        partition: Partition,
        id: impl Into<String>,
        record: RecipeRecord,
    ) -> Self {
        self.insert(partition, id, record);
        self
    }

    /// Look up a recipe in any partition
    pub fn get(&self, id: &str) -> Option<&RecipeRecord> {
        self.partitions()
            .into_iter()
            .find_map(|(_, records)| records.get(id))
    }

    /// Identities used as an ingredient by at least one record
    pub fn referenced_ingredients(&self) -> BTreeSet<&str> {
        self.partitions()
            .into_iter()
            .flat_map(|(_, records)| records.values())
            .flat_map(|r| r.ingredients.keys())
            .map(String::as_str)
            .collect()
    }

    fn merge(&mut self, entries: &[RawEntry], path: &Path) -> Result<usize, BuildError> {
        let mut merged = 0;
        for entry in entries {
            let normalized = normalize::normalize(entry).map_err(|source| {
                BuildError::Normalization {
                    path: path.to_path_buf(),
                    source,
                }
            })?;
            if let Some(n) = normalized {
                self.insert(n.partition, n.id, n.record);
                merged += 1;
            }
        }
        Ok(merged)
    }
}

/// Check that every requested identity has a recipe
pub fn validate(db: &CostDatabase, request: &RequestVector) -> bool {
    request.keys().all(|id| db.get(id).is_some())
}

/// Build the database from a Space Engineers installation
pub fn build(steamapps_folder: &Path) -> Result<CostDatabase, BuildError> {
    let data_dir = steamapps_folder.join(DATA_SUBDIR);
    if !data_dir.is_dir() {
        return Err(BuildError::NoSourceRoot {
            path: steamapps_folder.to_path_buf(),
        });
    }
    build_from_data_dir(&data_dir)
}

/// Build the database from a `Content/Data` directory
fn build_from_data_dir(data_dir: &Path) -> Result<CostDatabase, BuildError> {
    let mut db = CostDatabase::new();

    let block_files = extract::find_sbc_files(&data_dir.join(BLOCKS_SUBDIR));
    info!("Scanning {} block definition files...", block_files.len());
    for path in &block_files {
        let content = extract::read_source(path)?;
        let entries = extract::parse_block_definitions(&content)?;
        let merged = db.merge(&entries, path)?;
        debug!("  Parsed: {} ({} blocks)", path.display(), merged);
    }

    let blueprints_path = data_dir.join(BLUEPRINTS_FILE);
    let content = extract::read_source(&blueprints_path)?;
    let entries = extract::parse_blueprint_definitions(&content)?;
    let merged = db.merge(&entries, &blueprints_path)?;
    debug!("  Parsed: {} ({} blueprints)", blueprints_path.display(), merged);

    info!(
        "Built component database: {} blocks, {} components, {} materials",
        db.blocks.len(),
        db.components.len(),
        db.materials.len()
    );
    Ok(db)
}

/// Initialize the cache schema
fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS recipes (
            partition TEXT NOT NULL,
            id TEXT NOT NULL,
            build_time REAL NOT NULL,
            yield_quantity REAL NOT NULL,
            PRIMARY KEY (partition, id)
        );

        CREATE TABLE IF NOT EXISTS ingredients (
            partition TEXT NOT NULL,
            recipe_id TEXT NOT NULL,
            ingredient_id TEXT NOT NULL,
            amount REAL NOT NULL,
            PRIMARY KEY (partition, recipe_id, ingredient_id)
        );

        CREATE INDEX IF NOT EXISTS idx_ingredients_recipe ON ingredients(partition, recipe_id);
        "#,
    )
}

/// Write the whole database to the cache file.
///
/// The database is written to a fresh file next to `path` and renamed over
/// it once complete, so whatever was at `path` before is replaced whole.
pub fn persist(db: &CostDatabase, path: &Path) -> Result<(), PersistError> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let staged = NamedTempFile::new_in(dir)?;

    let mut conn = Connection::open(staged.path())?;
    init_schema(&conn)?;

    let tx = conn.transaction()?;
    {
        let mut insert_recipe = tx.prepare(
            "INSERT INTO recipes (partition, id, build_time, yield_quantity)
             VALUES (?1, ?2, ?3, ?4)",
        )?;
        let mut insert_ingredient = tx.prepare(
            "INSERT INTO ingredients (partition, recipe_id, ingredient_id, amount)
             VALUES (?1, ?2, ?3, ?4)",
        )?;

        for (partition, records) in db.partitions() {
            for (id, record) in records {
                insert_recipe.execute((
                    partition.as_str(),
                    id,
                    record.build_time,
                    record.yield_quantity,
                ))?;
                for (ingredient, amount) in &record.ingredients {
                    insert_ingredient.execute((partition.as_str(), id, ingredient, amount))?;
                }
            }
        }
    }
    tx.commit()?;
    conn.close().map_err(|(_, e)| e)?;

    staged.persist(path).map_err(|e| e.error)?;
    debug!("Saved component database to {}", path.display());
    Ok(())
}

/// Load a previously persisted database
pub fn load(path: &Path) -> Result<CostDatabase, LoadError> {
    if !path.is_file() {
        return Err(LoadError::NotFound {
            path: path.to_path_buf(),
        });
    }

    let corrupt = |reason: String| LoadError::Corrupt {
        path: path.to_path_buf(),
        reason,
    };

    let conn = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)
        .map_err(|e| corrupt(e.to_string()))?;
    read_database(&conn).map_err(corrupt)
}

fn read_database(conn: &Connection) -> Result<CostDatabase, String> {
    let mut db = CostDatabase::new();

    let mut stmt = conn
        .prepare("SELECT partition, id, build_time, yield_quantity FROM recipes")
        .map_err(|e| e.to_string())?;
    let rows = stmt
        .query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, f64>(2)?,
                row.get::<_, f64>(3)?,
            ))
        })
        .map_err(|e| e.to_string())?;

    for row in rows {
        let (partition, id, build_time, yield_quantity) = row.map_err(|e| e.to_string())?;
        let partition = Partition::parse(&partition)
            .ok_or_else(|| format!("unknown partition '{}' for {}", partition, id))?;
        if !(yield_quantity > 0.0) || build_time < 0.0 {
            return Err(format!("invalid recipe values for {}", id));
        }
        db.insert(partition, id, RecipeRecord::new(build_time, yield_quantity));
    }

    let mut stmt = conn
        .prepare("SELECT partition, recipe_id, ingredient_id, amount FROM ingredients")
        .map_err(|e| e.to_string())?;
    let rows = stmt
        .query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, f64>(3)?,
            ))
        })
        .map_err(|e| e.to_string())?;

    for row in rows {
        let (partition, recipe_id, ingredient, amount) = row.map_err(|e| e.to_string())?;
        let partition = Partition::parse(&partition)
            .ok_or_else(|| format!("unknown partition '{}' for {}", partition, recipe_id))?;
        match db.partition_mut(partition).get_mut(&recipe_id) {
            Some(record) => record.add_ingredient(ingredient, amount),
            None => {
                return Err(format!(
                    "ingredient {} refers to missing recipe {}",
                    ingredient, recipe_id
                ));
            }
        }
    }

    Ok(db)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn sample_db() -> CostDatabase {
        CostDatabase::new()
            .with_record(
                Partition::Blocks,
                "LargeBlockArmorBlock",
                RecipeRecord::new(8.0, 1.0).with_ingredient("SteelPlate", 25.0),
            )
            .with_record(
                Partition::Components,
                "SteelPlate",
                RecipeRecord::new(1.0, 1.0).with_ingredient("Iron Ingot", 7.0),
            )
            .with_record(
                Partition::Materials,
                "Iron Ingot",
                RecipeRecord::new(0.05, 0.7).with_ingredient("Iron Ore", 1.0),
            )
    }

    const BLOCKS_A: &str = r#"<Definitions><CubeBlocks>
  <Definition>
    <Id><TypeId>CubeBlock</TypeId><SubtypeId>LargeBlockArmorBlock</SubtypeId></Id>
    <CubeSize>Large</CubeSize>
    <Components><Component Subtype="SteelPlate" Count="25" /></Components>
    <BuildTimeSeconds>8</BuildTimeSeconds>
  </Definition>
</CubeBlocks></Definitions>"#;

    const BLOCKS_B: &str = r#"<Definitions><CubeBlocks>
  <Definition>
    <Id><TypeId>CubeBlock</TypeId><SubtypeId>LargeBlockArmorBlock</SubtypeId></Id>
    <CubeSize>Large</CubeSize>
    <Components><Component Subtype="SteelPlate" Count="30" /></Components>
    <BuildTimeSeconds>9</BuildTimeSeconds>
  </Definition>
</CubeBlocks></Definitions>"#;

    const BLUEPRINTS: &str = r#"<Definitions><Blueprints>
  <Blueprint>
    <Id><TypeId>BlueprintDefinition</TypeId><SubtypeId>SteelPlate</SubtypeId></Id>
    <Prerequisites><Item Amount="7" TypeId="Ingot" SubtypeId="Iron" /></Prerequisites>
    <Result Amount="1" TypeId="Component" SubtypeId="SteelPlate" />
    <BaseProductionTimeInSeconds>1</BaseProductionTimeInSeconds>
  </Blueprint>
  <Blueprint>
    <Id><TypeId>BlueprintDefinition</TypeId><SubtypeId>IronOreToIngot</SubtypeId></Id>
    <Prerequisites><Item Amount="1" TypeId="Ore" SubtypeId="Iron" /></Prerequisites>
    <Result Amount="0.7" TypeId="Ingot" SubtypeId="Iron" />
    <BaseProductionTimeInSeconds>0.05</BaseProductionTimeInSeconds>
  </Blueprint>
  <Blueprint>
    <Id><TypeId>BlueprintDefinition</TypeId><SubtypeId>IceToOxygen</SubtypeId></Id>
    <Prerequisites><Item Amount="1" TypeId="Ore" SubtypeId="Ice" /></Prerequisites>
    <Result Amount="10" TypeId="GasProperties" SubtypeId="Oxygen" />
  </Blueprint>
</Blueprints></Definitions>"#;

    fn write_data_dir(root: &Path) -> PathBuf {
        let data = root.join(DATA_SUBDIR);
        fs::create_dir_all(data.join(BLOCKS_SUBDIR)).unwrap();
        fs::write(data.join(BLOCKS_SUBDIR).join("a_armor.sbc"), BLOCKS_A).unwrap();
        fs::write(data.join(BLOCKS_SUBDIR).join("b_armor_override.sbc"), BLOCKS_B).unwrap();
        fs::write(data.join(BLUEPRINTS_FILE), BLUEPRINTS).unwrap();
        data
    }

    #[test]
    fn build_merges_sources_with_last_write_wins() {
        let dir = tempfile::tempdir().unwrap();
        write_data_dir(dir.path());

        let db = build(dir.path()).unwrap();
        let armor = &db.blocks["LargeBlockArmorBlock"];
        assert_eq!(armor.build_time, 9.0);
        assert_eq!(armor.ingredients["SteelPlate"], 30.0);
        assert_eq!(db.components["SteelPlate"].ingredients["Iron Ingot"], 7.0);
        assert!(!db.components.contains_key("Oxygen"));

        // Refinery output lands in its own partition
        let ingot = &db.materials["Iron Ingot"];
        assert_eq!(ingot.yield_quantity, 0.7);
        assert_eq!(ingot.ingredients["Iron Ore"], 1.0);
        assert!(!db.components.contains_key("Iron Ingot"));
    }

    #[test]
    fn build_without_installation_fails() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            build(dir.path()),
            Err(BuildError::NoSourceRoot { .. })
        ));
    }

    #[test]
    fn build_propagates_normalization_errors() {
        let dir = tempfile::tempdir().unwrap();
        let data = write_data_dir(dir.path());
        fs::write(
            data.join(BLOCKS_SUBDIR).join("c_passage.sbc"),
            r#"<Definitions><CubeBlocks><Definition>
                <Id><TypeId>Passage</TypeId><SubtypeId /></Id>
                <CubeSize>Large</CubeSize>
            </Definition></CubeBlocks></Definitions>"#,
        )
        .unwrap();

        let err = build(dir.path()).unwrap_err();
        assert!(matches!(err, BuildError::Normalization { .. }));
        assert!(err.to_string().contains("c_passage.sbc"));
    }

    #[test]
    fn persisted_database_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("components_db.sqlite");
        let db = sample_db();

        persist(&db, &path).unwrap();
        assert_eq!(load(&path).unwrap(), db);

        // Overwrite with a smaller database
        let smaller = CostDatabase::new().with_record(
            Partition::Materials,
            "Iron Ingot",
            RecipeRecord::new(0.05, 0.7).with_ingredient("Iron Ore", 1.0),
        );
        persist(&smaller, &path).unwrap();
        assert_eq!(load(&path).unwrap(), smaller);
    }

    #[test]
    fn built_database_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        write_data_dir(dir.path());
        let db = build(dir.path()).unwrap();

        let path = dir.path().join("cache.sqlite");
        persist(&db, &path).unwrap();
        assert_eq!(load(&path).unwrap(), db);
    }

    #[test]
    fn missing_cache_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            load(&dir.path().join("missing.sqlite")),
            Err(LoadError::NotFound { .. })
        ));
    }

    #[test]
    fn garbage_cache_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("components_db.sqlite");
        fs::write(&path, "this is not a database ".repeat(64)).unwrap();

        assert!(matches!(load(&path), Err(LoadError::Corrupt { .. })));
    }

    #[test]
    fn persist_replaces_corrupt_cache() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("components_db.sqlite");
        fs::write(&path, "this is not a database ".repeat(64)).unwrap();

        let db = sample_db();
        persist(&db, &path).unwrap();
        assert_eq!(load(&path).unwrap(), db);

        // Only the cache file is left behind
        let files: Vec<_> = fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(files.len(), 1);
    }

    #[test]
    fn validate_requires_every_requested_identity() {
        let db = sample_db();
        let mut request = RequestVector::new();
        request.insert("LargeBlockArmorBlock".to_string(), 3.0);
        assert!(validate(&db, &request));

        request.insert("LargeBlockBeacon".to_string(), 1.0);
        assert!(!validate(&db, &request));
    }

    #[test]
    fn referenced_ingredients_span_partitions() {
        let db = sample_db();
        let referenced = db.referenced_ingredients();
        assert!(referenced.contains("SteelPlate"));
        assert!(referenced.contains("Iron Ore"));
        assert!(!referenced.contains("LargeBlockArmorBlock"));
    }
}
