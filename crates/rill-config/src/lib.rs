//! Engine configuration and patch files for the rill graph runtime.
//!
//! # Features
//!
//! - **Engine settings**: [`EngineConfig`] loaded from TOML with `RILL_*`
//!   environment overrides, converted to runner and output settings
//! - **Patches**: graphs described in TOML, resolved through the
//!   [`UGenRegistry`] into a [`Graph`](rill_core::Graph)
//! - **Factory patches**: built-in patches that need no files
//! - **Paths**: platform-specific config and patch directories
//!
//! # Example
//!
//! ```rust,no_run
//! use rill_config::{EngineConfig, resolve_patch};
//! use rill_registry::UGenRegistry;
//!
//! let config = EngineConfig::resolve(None).unwrap();
//! let patch = resolve_patch("feedback").unwrap();
//! let graph = patch.to_graph(&UGenRegistry::new()).unwrap();
//! println!("{} nodes at {} Hz", graph.len(), config.sample_rate);
//! ```

mod engine_config;
mod error;
mod patch;

/// Platform-specific paths for patches and configuration.
pub mod paths;

/// Factory patches bundled with the library.
pub mod factory_patches;

pub use engine_config::{ENV_OVERRIDES, EngineConfig, MAX_SAMPLE_RATE, MIN_SAMPLE_RATE};
pub use error::ConfigError;
pub use factory_patches::{
    FACTORY_PATCH_NAMES, factory_patches, get_factory_patch, is_factory_patch,
};
pub use patch::{EdgeSpec, NodeSpec, Patch};
pub use paths::{
    config_file_path, ensure_user_patches_dir, find_patch, list_user_patches,
    patch_name_from_path, resolve_patch, user_config_dir, user_patches_dir,
};

/// Re-export commonly used types from rill-registry
pub use rill_registry::{UGenCategory, UGenDescriptor, UGenRegistry};
