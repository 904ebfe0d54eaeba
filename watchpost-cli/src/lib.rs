//! Watchpost command-line interface.
//!
//! - [`cli`]: clap argument definitions
//! - [`commands`]: one handler per subcommand (`scan`, `replay`, `rules`, `config`)
//! - [`output`]: text / JSON rendering
//! - [`error`]: `CliError` and exit codes

pub mod cli;
pub mod commands;
pub mod error;
pub mod output;
