//! This module handles configuration, command-line parsing, and logging.

// SPDX-License-Identifier: AGPL-3.0-or-later

/// Command-line interface parsing.
pub mod cli;
/// Configuration file parsing and management.
pub mod config;
/// Enumerations used in configuration.
pub mod enums;
/// Logger initialization.
pub mod logger;

pub use config::{Config, PortConfig, RuntimeConfig, TargetConfig};
