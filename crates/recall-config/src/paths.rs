use std::path::PathBuf;

/// XDG app name for config and data paths.
pub const APP_NAME: &str = "recall";

fn project_dirs() -> Option<directories::ProjectDirs> {
    directories::ProjectDirs::from("", "", APP_NAME)
}

/// Where entry collections, sessions and state live.
///
/// Falls back to `./recall-data` when no home directory can be
/// determined (e.g. stripped-down containers).
pub fn data_dir() -> PathBuf {
    project_dirs()
        .map(|dirs| dirs.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("recall-data"))
}

/// Path of the optional TOML config file.
pub fn config_file_path() -> Option<PathBuf> {
    project_dirs().map(|dirs| dirs.config_dir().join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_dir_is_never_empty() {
        let dir = data_dir();
        assert!(!dir.as_os_str().is_empty());
    }

    #[test]
    fn test_config_file_name() {
        if let Some(path) = config_file_path() {
            assert_eq!(path.file_name().unwrap(), "config.toml");
        }
    }
}
