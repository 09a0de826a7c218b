//! Configuration structure

use std::sync::LazyLock;

use anyhow::Result;
use clap::Parser;
use derive_deftly::Deftly;
use human_repr::HumanCount as _;
use serde::{Deserialize, Serialize};

use crate::protocol::DEFAULT_PORT;
use crate::util::{TimeFormat, derive_deftly_template_Optionalify};

/// Largest transfer chunk we allow
pub(crate) const MAX_CHUNK_SIZE: u32 = 1_048_576;

/// The set of configurable options supported by smdp.
///
/// ### Configuration files
///
/// Configuration files are TOML, with the field names below as keys:
///
/// ```toml
/// port = 3535
/// database = "/var/lib/smdp/server.db"
/// idle_timeout = 300
/// ```
///
/// ### Environment
///
/// Every field may be set with an `SMDP_` prefixed environment variable, e.g. `SMDP_IDLE_TIMEOUT=60`.
///
/// ### Command line
///
/// All fields may be given on the command line, in kebab-case. The command line wins over everything else.
///
/// ### Developer notes
///
/// The [Optionalify](derive_deftly_template_Optionalify) template defines `Configuration_Optional`,
/// the same struct with every member an `Option`. The CLI fills that one in, so wherever the user
/// gave no value, lower priority sources (files, environment, system defaults) win.
///
// Maintainer note: None of the members of this struct should be Option<anything>.
#[derive(Deftly)]
#[derive_deftly(Optionalify)]
#[derive(Debug, Clone, PartialEq, Parser, Deserialize, Serialize)]
pub struct Configuration {
    /// TCP port to listen on (server) or connect to (client).
    /// [default: 3535]
    #[arg(short('p'), long, help_heading("Network"), value_name("PORT"))]
    pub port: u16,

    /// Address the server binds to.
    /// [default: 0.0.0.0]
    #[arg(long, help_heading("Network"), value_name("ADDRESS"))]
    pub address: String,

    /// Seconds a server session waits for each request before closing the connection.
    /// [default: 120]
    #[arg(long, help_heading("Server"), value_name("SECONDS"))]
    pub idle_timeout: u32,

    /// Catalog database file. Created if it does not exist.
    /// [default: server.db]
    #[arg(long, help_heading("Server"), value_name("FILE"))]
    pub database: String,

    /// Directory where uploaded files are stored.
    /// [default: uploads]
    #[arg(long, help_heading("Server"), value_name("DIR"))]
    pub upload_dir: String,

    /// Size of the buffer used to move file bodies, in bytes.
    /// [default: 1024]
    #[arg(long, help_heading("Advanced"), value_name("BYTES"))]
    pub chunk_size: u32,

    /// Format for timestamps in log messages.
    /// [default: local]
    #[arg(short('T'), long, help_heading("Output"), value_name("FORMAT"))]
    pub time_format: TimeFormat,
}

static SYSTEM_DEFAULT_CONFIG: LazyLock<Configuration> = LazyLock::new(|| Configuration {
    port: DEFAULT_PORT,
    address: "0.0.0.0".into(),
    idle_timeout: 120,
    database: "server.db".into(),
    upload_dir: "uploads".into(),
    chunk_size: 1024,
    time_format: TimeFormat::Local,
});

impl Configuration {
    /// The hard-wired defaults, which apply at the lowest priority
    #[must_use]
    pub fn system_default() -> &'static Self {
        &SYSTEM_DEFAULT_CONFIG
    }

    /// Performs additional validation checks on a configuration object
    pub(crate) fn try_validate(&self) -> Result<()> {
        anyhow::ensure!(self.port != 0, "The port must not be 0");
        anyhow::ensure!(
            self.idle_timeout >= 1,
            "The idle timeout must be at least 1 second"
        );
        anyhow::ensure!(
            (1..=MAX_CHUNK_SIZE).contains(&self.chunk_size),
            "The chunk size ({}) must be between 1 and {}",
            self.chunk_size,
            MAX_CHUNK_SIZE.human_count_bytes()
        );
        Ok(())
    }

    /// Validates, consuming self
    pub(crate) fn validate(self) -> Result<Self> {
        self.try_validate()?;
        Ok(self)
    }
}
