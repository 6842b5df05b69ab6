use std::ffi::OsString;
use std::path::{Path, PathBuf};

use crate::cli::Cli;
use crate::error::{IndexError, Result};

pub const DB_ENV_VAR: &str = "JARSCOPE_DB";

const HOME_DIR_NAME: &str = ".jarscope";
const DB_FILE_NAME: &str = "index.lmdb";

/// Settings resolved once at startup and passed down explicitly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub db_path: PathBuf,
}

impl Settings {
    pub fn resolve(cli: &Cli) -> Result<Self> {
        Ok(Self {
            db_path: resolve_db_path(cli)?,
        })
    }
}

pub fn resolve_db_path(cli: &Cli) -> Result<PathBuf> {
    choose_db_path(cli.db.clone(), std::env::var_os(DB_ENV_VAR), dirs::home_dir())
}

/// `--db` wins over `JARSCOPE_DB`, which wins over `~/.jarscope/index.lmdb`.
pub fn choose_db_path(
    flag: Option<PathBuf>,
    env: Option<OsString>,
    home: Option<PathBuf>,
) -> Result<PathBuf> {
    let chosen = match (flag, env) {
        (Some(p), _) => p,
        (None, Some(v)) if !v.is_empty() => PathBuf::from(v),
        _ => {
            let home =
                home.ok_or_else(|| IndexError::Config("failed to resolve home directory".into()))?;
            home.join(HOME_DIR_NAME).join(DB_FILE_NAME)
        }
    };

    if chosen.as_os_str().is_empty() {
        return Err(IndexError::Config("database path is empty".into()));
    }
    if chosen.is_dir() {
        return Err(IndexError::Config(format!(
            "database path is a directory: {}",
            chosen.display()
        )));
    }
    Ok(chosen)
}

pub fn clear_db(db_path: &Path) -> Result<()> {
    remove_file_if_exists(db_path)?;
    remove_file_if_exists(&lmdb_lock_path(db_path))?;
    Ok(())
}

fn lmdb_lock_path(db_path: &Path) -> PathBuf {
    let mut os = db_path.as_os_str().to_os_string();
    os.push("-lock");
    PathBuf::from(os)
}

fn remove_file_if_exists(path: &Path) -> Result<()> {
    if path.exists() {
        std::fs::remove_file(path).map_err(|e| IndexError::io(path, e))?;
    }
    Ok(())
}
