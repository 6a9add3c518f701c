use crate::{AppConfig, MdCompareError};
use directories::ProjectDirs;
use std::fs;
use std::path::{Path, PathBuf};

const CONFIG_FILE_NAME: &str = "mdcompare.toml";

#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: AppConfig,
    pub path: PathBuf,
    pub exists: bool,
    pub portable: bool,
}

pub fn load_config(prefer_portable: bool) -> Result<LoadedConfig, MdCompareError> {
    let (path, portable) = resolve_config_path(prefer_portable)?;
    let mut loaded = load_config_from(&path)?;
    loaded.portable = portable;
    loaded.config.portable_mode = portable;
    Ok(loaded)
}

/// Load configuration from an explicit path, falling back to defaults when the file is absent
pub fn load_config_from(path: &Path) -> Result<LoadedConfig, MdCompareError> {
    let exists = path.exists();

    let config = if exists {
        let data = fs::read_to_string(path)?;
        parse_config(&data)?
    } else {
        AppConfig::default()
    };

    Ok(LoadedConfig {
        config,
        path: path.to_path_buf(),
        exists,
        portable: false,
    })
}

pub fn ensure_config(prefer_portable: bool) -> Result<LoadedConfig, MdCompareError> {
    let loaded = load_config(prefer_portable)?;
    if !loaded.exists {
        save_config(&loaded.path, &loaded.config)?;
    }
    Ok(loaded)
}

pub fn save_config(path: &Path, config: &AppConfig) -> Result<(), MdCompareError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let data = toml::to_string_pretty(config)
        .map_err(|e| MdCompareError::Serialization(e.to_string()))?;
    fs::write(path, data)?;
    Ok(())
}

fn parse_config(data: &str) -> Result<AppConfig, MdCompareError> {
    let config: AppConfig =
        toml::from_str(data).map_err(|e| MdCompareError::Serialization(e.to_string()))?;

    if config.batch_size == 0 {
        return Err(MdCompareError::Config(
            "batch_size must be at least 1".to_string(),
        ));
    }
    if config.api_version.is_empty() {
        return Err(MdCompareError::Config("api_version must not be empty".to_string()));
    }

    Ok(config)
}

fn resolve_config_path(prefer_portable: bool) -> Result<(PathBuf, bool), MdCompareError> {
    if let Some(portable_path) = portable_config_path() {
        if prefer_portable || portable_path.exists() {
            return Ok((portable_path, true));
        }
    }

    let dirs = ProjectDirs::from("", "aecs4u", "mdcompare")
        .ok_or_else(|| MdCompareError::Config("Unable to determine config directory".to_string()))?;
    Ok((dirs.config_dir().join(CONFIG_FILE_NAME), false))
}

fn portable_config_path() -> Option<PathBuf> {
    std::env::current_exe()
        .ok()
        .and_then(|path| path.parent().map(|dir| dir.join(CONFIG_FILE_NAME)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::OrgProfile;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_yields_defaults() {
        let temp = TempDir::new().unwrap();
        let loaded = load_config_from(&temp.path().join(CONFIG_FILE_NAME)).unwrap();
        assert!(!loaded.exists);
        assert_eq!(loaded.config.batch_size, 25);
    }

    #[test]
    fn test_save_then_load() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nested").join(CONFIG_FILE_NAME);

        let mut config = AppConfig::default();
        config.batch_size = 10;
        config.orgs.push(OrgProfile {
            name: "uat".to_string(),
            instance_url: "https://uat.example.com".to_string(),
            token_env: None,
        });
        save_config(&path, &config).unwrap();

        let loaded = load_config_from(&path).unwrap();
        assert!(loaded.exists);
        assert_eq!(loaded.config.batch_size, 10);
        assert_eq!(loaded.config.orgs, config.orgs);
    }

    #[test]
    fn test_zero_batch_size_rejected() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join(CONFIG_FILE_NAME);
        fs::write(&path, "batch_size = 0\n").unwrap();

        let err = load_config_from(&path).unwrap_err();
        assert!(matches!(err, MdCompareError::Config(_)));
    }

    #[test]
    fn test_invalid_toml_is_serialization_error() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join(CONFIG_FILE_NAME);
        fs::write(&path, "batch_size = \"many\"\n").unwrap();

        let err = load_config_from(&path).unwrap_err();
        assert!(matches!(err, MdCompareError::Serialization(_)));
    }
}
