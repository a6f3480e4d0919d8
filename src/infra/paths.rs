// src/infra/paths.rs — Path management
//
// All paths respect the PROMPTCYCLE_HOME environment variable for isolation.
// When PROMPTCYCLE_HOME is set, all config and data live under that directory.
// When unset, config uses ~/.promptcycle/ and data uses the platform data dir.

use directories::ProjectDirs;
use std::path::PathBuf;
use std::sync::OnceLock;

static PROJECT_DIRS: OnceLock<ProjectDirs> = OnceLock::new();

fn project_dirs() -> &'static ProjectDirs {
    PROJECT_DIRS.get_or_init(|| {
        ProjectDirs::from("", "", "promptcycle").expect("Could not determine home directory")
    })
}

/// Returns the PROMPTCYCLE_HOME override, if set.
fn promptcycle_home() -> Option<PathBuf> {
    std::env::var_os("PROMPTCYCLE_HOME").map(PathBuf::from)
}

/// Configuration directory: $PROMPTCYCLE_HOME/ or ~/.promptcycle/
pub fn config_dir() -> PathBuf {
    if let Some(home) = promptcycle_home() {
        return home;
    }
    dirs_home().join(".promptcycle")
}

/// Data directory: $PROMPTCYCLE_HOME/data/ or the platform data dir
pub fn data_dir() -> PathBuf {
    if let Some(home) = promptcycle_home() {
        return home.join("data");
    }
    project_dirs().data_local_dir().to_path_buf()
}

/// Home directory
pub fn dirs_home() -> PathBuf {
    directories::BaseDirs::new()
        .expect("Could not determine home directory")
        .home_dir()
        .to_path_buf()
}

/// Directory for persisted improvement histories
pub fn sessions_dir() -> PathBuf {
    data_dir().join("sessions")
}

/// Settings file path
pub fn settings_file_path() -> PathBuf {
    config_dir().join("promptcycle.toml")
}

/// Ensure all required directories exist
pub async fn ensure_dirs() -> anyhow::Result<()> {
    let dirs = [config_dir(), data_dir(), sessions_dir()];

    for dir in &dirs {
        tokio::fs::create_dir_all(dir).await?;
    }

    Ok(())
}
