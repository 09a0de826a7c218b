//! Configuration management
//!
//! smdp reads its settings from several layers; see [`Manager`] for the order of precedence.
//!
//! The full set of settings is described by [`Configuration`].
//! `smdp --show-config` prints the merged result together with the source of each value.

mod manager;
pub use manager::{DisplayAdapter, Manager};

mod structure;
pub use structure::{Configuration, Configuration_Optional};

mod sysdefault;
use sysdefault::SystemDefault;
