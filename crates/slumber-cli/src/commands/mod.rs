//! CLI subcommand implementations.

pub mod clusters;
pub mod day;
pub mod summary;
pub mod util;
