//! CLI subcommand implementations.

pub mod check;
pub mod new;
pub mod run;
pub mod sample;
pub mod show;
