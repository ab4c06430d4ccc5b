//! Command implementations
//!
//! Each command exposes an `execute_*` function with injectable output for
//! tests and a `run` function wired to the terminal.

pub mod clear;
pub mod config;
pub mod get;
pub mod inspect;
pub mod optimize;
pub mod put;
pub mod rotate_key;
pub mod stats;
