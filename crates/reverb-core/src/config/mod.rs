//! Reverb stage configuration
//!
//! - Generic YAML config loading/saving
//! - Default config and BRIR library locations
//! - [`ReverbConfig`]: startup settings for a [`ReverbStage`](crate::ReverbStage)
//!
//! # Usage
//!
//! ```ignore
//! use reverb_core::config::{default_config_path, load_config, ReverbConfig};
//!
//! let config: ReverbConfig = load_config(&default_config_path());
//! ```

mod io;
mod paths;
mod reverb;

pub use io::{load_config, save_config};
pub use paths::{default_brir_directory, default_config_dir, default_config_path, CONFIG_FILE_NAME};
pub use reverb::ReverbConfig;
