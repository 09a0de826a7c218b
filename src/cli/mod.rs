//! Command Line Interface for smdp
mod args;
pub(crate) use args::Parameters;
mod cli_main;
pub mod styles;
pub use cli_main::cli;
