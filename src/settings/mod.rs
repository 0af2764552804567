//! Layered configuration: a TOML file chosen by build profile or `--settings`,
//! overridden by `MEDIAVAULT_*` environment variables.

mod cli;
pub use clap::Parser;
pub use cli::*;

mod settings;
pub use settings::*;
