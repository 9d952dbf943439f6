use directories::ProjectDirs;
use std::path::{Path, PathBuf};

pub const APP_QUALIFIER: &str = "com";
pub const APP_ORG: &str = "darklock";
pub const APP_NAME: &str = "roomcipher";

pub const DATA_DIR_ENV: &str = "ROOMCIPHER_DATA_DIR";

pub fn data_dir() -> anyhow::Result<PathBuf> {
    if let Ok(override_path) = std::env::var(DATA_DIR_ENV) {
        return Ok(PathBuf::from(override_path));
    }
    let dirs = ProjectDirs::from(APP_QUALIFIER, APP_ORG, APP_NAME)
        .ok_or_else(|| anyhow::anyhow!("cannot determine data directory"))?;
    Ok(dirs.data_dir().to_path_buf())
}

pub fn key_dir(base: &Path) -> PathBuf {
    base.join("keys")
}

pub fn exchange_db_path(base: &Path) -> PathBuf {
    base.join("exchange.db")
}

pub fn settings_path(base: &Path) -> PathBuf {
    base.join("settings.json")
}
