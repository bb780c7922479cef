//! # Soundmap Common Library
//!
//! Shared code for the Soundmap services:
//! - Error and result types
//! - Store and service configuration, root folder resolution

pub mod config;
pub mod error;

pub use config::{ServiceConfig, StoreConfig};
pub use error::{Error, Result};
