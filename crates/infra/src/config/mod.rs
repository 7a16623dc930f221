//! Settings loading
//!
//! Fault-tolerance settings come from an optional TOML/JSON file, with
//! environment variables (and a `.env` file) layered on top.

pub mod loader;

// Re-export commonly used items
pub use loader::{
    apply_env_overrides, load, load_dotenv, load_from_file, probe_config_paths, validate_settings,
};
