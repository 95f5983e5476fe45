//! CLI subcommands

pub mod node;
pub mod window;
