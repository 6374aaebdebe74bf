//! Shared types, error model, and configuration for BioKB Enrich.
//!
//! This crate is the foundation depended on by all other BioKB crates.
//! It provides:
//! - [`BioKbError`] — the unified error type
//! - Domain types ([`SearchFilter`], [`ListRequest`])
//! - Configuration ([`AppConfig`], [`FetchConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    ApiConfig, AppConfig, DefaultsConfig, FetchConfig, config_dir, config_file_path, init_config,
    load_config, load_config_from,
};
pub use error::{BioKbError, Result};
pub use types::{ListRequest, SearchFilter};
