//! Main CLI for smdp

use std::ffi::OsString;
use std::io::Write as _;

use anyhow::{Context as _, Result};
use indicatif::{MultiProgress, ProgressDrawTarget};
use tracing::debug;

use super::args::{CliArgs, MainMode};
use super::styles::{RESET, autodetect_colour, configure_colours, header, use_colours};
use crate::client::MAX_UPDATE_FPS;
use crate::config::{Configuration, Manager};
use crate::util::{ConsoleTraceType, setup_tracing, trace_level};

/// Main CLI entrypoint
///
/// Call this from `main`, passing the arguments to use.
/// Normally you will call `cli(std::env::args_os())` but you can pass in alternate arguments for CLI testing.
///
/// # Return
/// `Ok(true)` on success. `Ok(false)` indicates a failure that has already been reported.
///
/// # Note
/// This function may start a tokio runtime and perform work in it.
pub fn cli<I, T>(args: I) -> Result<bool>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let Some(args) = parse_args(args)? else {
        return Ok(true); // help/version shown; exit
    };
    let mode = args.mode();

    let mut manager = Manager::standard();
    manager.merge_provider(args.config.clone());
    manager.apply_system_default();

    handle_mode(mode, &manager, &args)
}

fn parse_args<I, T>(args: I) -> Result<Option<Box<CliArgs>>>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    use clap::error::ErrorKind::{DisplayHelp, DisplayVersion};
    configure_colours(autodetect_colour());
    match CliArgs::custom_parse(args) {
        Ok(args) => Ok(Some(Box::new(args))),
        Err(e) if matches!(e.kind(), DisplayHelp | DisplayVersion) => {
            let message = e.render();
            if use_colours() {
                anstream::print!("{}", message.ansi());
            } else {
                anstream::print!("{message}");
            }
            Ok(None)
        }
        Err(e) => Err(e.into()),
    }
}

// MODE HANDLERS ///////////////////////////////////////////////////////////

fn handle_mode(mode: MainMode, manager: &Manager, args: &CliArgs) -> Result<bool> {
    match mode {
        MainMode::ShowConfigFiles => {
            let mut out = anstream::stdout();
            for file in Manager::config_files() {
                writeln!(out, "{file}")?;
            }
            return Ok(true);
        }
        MainMode::ShowConfig => {
            anstream::print!("{}", show_config_data(manager));
            let _ = current_config(manager)?;
            return Ok(true);
        }
        _ => (),
    }

    let config = current_config(manager)?;
    let display = if args.parameters.quiet {
        MultiProgress::with_draw_target(ProgressDrawTarget::hidden())
    } else {
        MultiProgress::with_draw_target(ProgressDrawTarget::stderr_with_hz(MAX_UPDATE_FPS))
    };
    let trace_display = if mode == MainMode::Client {
        ConsoleTraceType::Indicatif(display.clone())
    } else {
        ConsoleTraceType::Standard
    };
    setup_tracing(
        trace_level(&args.parameters),
        trace_display,
        args.parameters.log_file.as_deref(),
        config.time_format,
        use_colours(),
    )?; // to provoke an error here: RUST_LOG=.
    debug!("mode: {mode}");

    match mode {
        MainMode::AddUser => {
            let [user, secret] = args.add_user.as_deref().unwrap_or_default() else {
                anyhow::bail!("--add-user needs a username and a secret");
            };
            crate::admin::add_user(&config, user, secret, &mut anstream::stdout())
        }
        MainMode::AddDirectory => {
            let dir = args
                .add_directory
                .as_deref()
                .context("--add-directory needs a directory")?;
            crate::admin::add_directory(&config, dir, args.extension(), &mut anstream::stdout())
        }
        MainMode::Server => run_server(&config),
        MainMode::Client => {
            let host = args
                .parameters
                .host
                .as_deref()
                .context("no server host given")?;
            run_client(&config, host, display, args.parameters.quiet)
        }
        MainMode::ShowConfig | MainMode::ShowConfigFiles => Ok(true),
    }
}

fn current_config(manager: &Manager) -> Result<Configuration> {
    manager
        .get::<Configuration>()
        .context("reading configuration")?
        .validate()
}

fn show_config_data(manager: &Manager) -> String {
    format!(
        "{}Configuration:{RESET}\n{}",
        header(),
        manager.to_display_adapter()
    )
}

#[tokio::main]
async fn run_server(config: &Configuration) -> Result<bool> {
    crate::server::server_main(config)
        .await
        .context("[Server] failed")?;
    Ok(true)
}

#[tokio::main]
async fn run_client(
    config: &Configuration,
    host: &str,
    display: MultiProgress,
    quiet: bool,
) -> Result<bool> {
    crate::client::client_main(config, host, display, quiet).await
}
