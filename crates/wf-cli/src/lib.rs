//! Waveform program CLI library.
//!
//! This crate provides the `wf` console: program files, scripts and
//! inspection commands on top of `wf-core`.

mod cli;
pub mod commands;
mod config;
pub mod program;

pub use cli::{Cli, Commands};
pub use config::Config;
