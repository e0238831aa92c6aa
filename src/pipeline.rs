//! Cost database acquisition
//!
//! Load the cached database, fall back to a rebuild from game files when the
//! cache is missing, corrupt or doesn't know a requested block, then resolve.

use std::path::PathBuf;

use thiserror::Error;
use tracing::{info, warn};

use crate::calculator::{self, AggregateResult, ResolveError};
use crate::db::{self, BuildError, CostDatabase, LoadError, PersistError};
use crate::models::RequestVector;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Build(#[from] BuildError),

    #[error(transparent)]
    Resolve(#[from] ResolveError),
}

/// Where cost databases come from and go to
pub trait CostSource {
    fn load(&self) -> Result<CostDatabase, LoadError>;
    fn build(&self) -> Result<CostDatabase, BuildError>;
    fn persist(&self, db: &CostDatabase) -> Result<(), PersistError>;
}

/// A Space Engineers installation plus an on-disk cache file
#[derive(Debug, Clone)]
pub struct GameInstall {
    pub steamapps_folder: PathBuf,
    pub cache_path: PathBuf,
}

impl CostSource for GameInstall {
    fn load(&self) -> Result<CostDatabase, LoadError> {
        db::load(&self.cache_path)
    }

    fn build(&self) -> Result<CostDatabase, BuildError> {
        db::build(&self.steamapps_folder)
    }

    fn persist(&self, db: &CostDatabase) -> Result<(), PersistError> {
        db::persist(db, &self.cache_path)
    }
}

fn rebuild(source: &impl CostSource) -> Result<CostDatabase, BuildError> {
    let db = source.build()?;
    if let Err(e) = source.persist(&db) {
        warn!("{}", e);
    }
    Ok(db)
}

/// Obtain a database that knows every requested identity if possible.
///
/// A cached database is rebuilt at most once; a fresh build is returned as is.
pub fn acquire(
    source: &impl CostSource,
    request: &RequestVector,
    force_rebuild: bool,
) -> Result<CostDatabase, BuildError> {
    if force_rebuild {
        return rebuild(source);
    }

    match source.load() {
        Ok(cached) if db::validate(&cached, request) => Ok(cached),
        Ok(_) => {
            info!("Found a block in the blueprint not found in the cached database. Attempting to rebuild.");
            let db = rebuild(source)?;
            info!("Rebuilt the database from game files.");
            Ok(db)
        }
        Err(e) => {
            info!("{}, rebuilding.", e);
            rebuild(source)
        }
    }
}

/// Acquire a database and resolve the request against it
pub fn run(
    source: &impl CostSource,
    request: &RequestVector,
    force_rebuild: bool,
) -> Result<AggregateResult, PipelineError> {
    let db = acquire(source, request, force_rebuild)?;
    Ok(calculator::resolve(&db, request)?)
}
