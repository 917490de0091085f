//! Default locations for configuration and separation output

use std::path::PathBuf;

const APP_DIR: &str = "stemdeck";

/// Default config file path
///
/// Returns: `<config_dir>/stemdeck/config.yaml`
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
        .join("config.yaml")
}

/// Default root for separation working directories
///
/// Returns: `<cache_dir>/stemdeck/separations`
pub fn default_work_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(APP_DIR)
        .join("separations")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_path() {
        let path = default_config_path();
        assert!(path.ends_with("stemdeck/config.yaml"));
    }

    #[test]
    fn test_work_dir() {
        assert!(default_work_dir().ends_with("stemdeck/separations"));
    }
}
