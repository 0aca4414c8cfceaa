//! Standard locations for the reverb configuration and BRIR library

use std::path::PathBuf;

/// Application directory name under the platform config/data roots
const APP_DIR: &str = "binaural-reverb";

/// File name of the reverb configuration
pub const CONFIG_FILE_NAME: &str = "reverb-config.yaml";

/// Directory holding the configuration file
///
/// Returns: `~/.config/binaural-reverb` on Linux
pub fn default_config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
}

/// Returns: `~/.config/binaural-reverb/reverb-config.yaml` on Linux
pub fn default_config_path() -> PathBuf {
    default_config_dir().join(CONFIG_FILE_NAME)
}

/// Directory the bundled BRIR presets are resolved against
///
/// Returns: `~/.local/share/binaural-reverb/brirs` on Linux
pub fn default_brir_directory() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
        .join("brirs")
}
