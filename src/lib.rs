#![allow(clippy::doc_markdown)]
//! The Simple Media Distribution Protocol (`smdp`) serves a catalog of stored files
//! over a plain TCP connection.
//!
//! ## Overview
//!
//! - A server keeps a catalog of files (a numeric id, a display name and a storage path)
//!   in an SQLite database, together with a table of user credentials.
//! - Clients connect, authenticate with a username and secret, and may then
//!   list the catalog, download a file by id or at random, and upload new files.
//! - Every connection runs an independent [session]. One misbehaving peer cannot
//!   affect any other.
//!
//! ## Getting started
//!
//! ```text
//! smdp --add-user alice s3cret
//! smdp --add-directory ~/music
//! smdp --server
//! smdp localhost
//! ```
//!
//! The interactive client accepts `list`, `user`, `pass`, `download`, `random`,
//! `upload`, `echo`, `help` and `exit`.
//!
//! ## Documentation
//!
//! * [The wire protocol](protocol)
//! * [Configuring smdp](config)
//! * [The catalog store](catalog)
//!
//! #### MSRV policy
//!
//! As this is an application crate, the MSRV is not guaranteed to remain stable.
#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

mod admin;
pub mod catalog;
pub(crate) mod cli;
pub use cli::cli;
pub use cli::styles;
pub mod client;
pub mod config;
pub use config::Configuration;
pub mod protocol;
pub mod server;
pub mod session;
pub mod util;

mod version;

#[doc(hidden)]
pub use derive_deftly;
// Use the current version of derive_deftly here:
derive_deftly::template_export_semver_check!("0.14.0");
