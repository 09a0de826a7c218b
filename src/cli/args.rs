//! Command-line arguments

use std::ffi::OsString;
use std::path::PathBuf;

use clap::{ArgGroup, Args, FromArgMatches as _, Parser};

use crate::config::Configuration_Optional;

/// Options that apply to the whole program rather than to one configuration layer
#[derive(Debug, Args, Clone, Default, PartialEq, Eq)]
pub(crate) struct Parameters {
    /// Enables detailed debug output
    ///
    /// This has the same effect as setting `RUST_LOG=smdp=debug` in the environment.
    /// If present, `RUST_LOG` overrides this option.
    #[arg(short, long, action, help_heading("Debug"))]
    pub verbose: bool,

    /// Quiet mode
    ///
    /// Switches off progress display and informational messages. Errors are still shown.
    #[arg(short, long, action, conflicts_with("verbose"), help_heading("Output"))]
    pub quiet: bool,

    /// Log to a file
    ///
    /// By default the log receives everything printed to stderr.
    /// To override this behaviour, set the environment variable `RUST_LOG_FILE_DETAIL`
    /// (same semantics as `RUST_LOG`).
    #[arg(short('l'), long, value_name("FILE"), help_heading("Output"))]
    pub log_file: Option<PathBuf>,

    /// Server to connect to (client mode)
    #[arg(value_name("HOST"))]
    pub host: Option<String>,
}

/// The main CLI parser
#[derive(Debug, Parser, Clone)]
#[command(
    author,
    // we set short/long version strings explicitly, see custom_parse()
    about,
    before_help = "e.g.   smdp --server\n       smdp --add-user alice s3cret\n       smdp localhost",
    infer_long_args(true),
)]
#[command(help_template(
    "\
{name} version {version}
{about-with-newline}
{usage-heading} {usage}
{before-help}
{all-args}{after-help}
"
))]
#[command(styles=super::styles::CLAP_STYLES)]
#[command(group(
    ArgGroup::new("mode")
        .args(["server", "add_user", "add_directory", "show_config", "config_files", "host"])
        .required(true)
))]
pub(crate) struct CliArgs {
    // MODE SELECTION ======================================================================
    /// Runs the server, listening for connections until interrupted
    #[arg(long, help_heading("Modes"))]
    pub server: bool,

    /// Creates a user, or replaces its secret, in the catalog database
    #[arg(
        long,
        num_args(2),
        value_names(["USER", "SECRET"]),
        help_heading("Modes")
    )]
    pub add_user: Option<Vec<String>>,

    /// Registers every file in a directory with the catalog
    ///
    /// Each file is named after its file stem. See also `--extension`.
    #[arg(long, value_name("DIR"), help_heading("Modes"))]
    pub add_directory: Option<PathBuf>,

    /// File extension selected by `--add-directory` [default: mp3]
    #[arg(long, value_name("EXT"), requires("add_directory"))]
    pub extension: Option<String>,

    /// Outputs the configuration, then exits.
    ///
    /// Each setting is shown together with where it came from.
    #[arg(long, help_heading("Configuration"))]
    pub show_config: bool,

    /// Outputs the paths to configuration file(s), then exits
    #[arg(long, help_heading("Configuration"))]
    pub config_files: bool,

    // CONFIGURABLE OPTIONS ================================================================
    #[command(flatten)]
    /// The set of options which may be set in a config file or via command-line.
    pub config: Configuration_Optional,

    // PARAMETERS ==========================================================================
    #[command(flatten)]
    /// Options that apply to every mode
    pub parameters: Parameters,
}

const DEFAULT_EXTENSION: &str = "mp3";

impl CliArgs {
    /// Sets up and executes our parser
    pub(crate) fn custom_parse<I, T>(args: I) -> Result<Self, clap::error::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        let cli = clap::Command::new(clap::crate_name!()).version(crate::version::short());
        let cli = CliArgs::augment_args(cli);
        CliArgs::from_arg_matches(&cli.try_get_matches_from(args)?)
    }

    /// Works out which mode the user asked for
    /// The extension `--add-directory` looks for
    pub(crate) fn extension(&self) -> &str {
        self.extension.as_deref().unwrap_or(DEFAULT_EXTENSION)
    }

    pub(crate) fn mode(&self) -> MainMode {
        if self.server {
            MainMode::Server
        } else if self.add_user.is_some() {
            MainMode::AddUser
        } else if self.add_directory.is_some() {
            MainMode::AddDirectory
        } else if self.show_config {
            MainMode::ShowConfig
        } else if self.config_files {
            MainMode::ShowConfigFiles
        } else {
            MainMode::Client
        }
    }
}

/// Computed mode of operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "kebab-case")]
pub(crate) enum MainMode {
    Server,
    Client,
    AddUser,
    AddDirectory,
    ShowConfig,
    ShowConfigFiles,
}
