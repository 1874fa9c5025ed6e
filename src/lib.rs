//! Vault Extract - read Ansible vault-encrypted values outside a playbook run.
//!
//! This library drives `ansible` against a throwaway one-host inventory,
//! parses the variables it prints, drops the tool's own bookkeeping keys,
//! flattens nested values and renders the result as `key: value` lines or
//! shell `export` statements.

pub mod config;
pub mod error;
pub mod extractor;
pub mod filter;
pub mod model;
pub mod parser;
pub mod provider;
pub mod render;

pub use error::{ExtractError, Result};
pub use extractor::Extractor;
pub use render::RenderFormat;
