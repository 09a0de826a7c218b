//! Tracing helpers

use std::{
    fs::File,
    io::Write,
    path::Path,
    sync::atomic::{AtomicBool, Ordering},
    sync::{Arc, Mutex},
};

use anyhow::Context;
use indicatif::MultiProgress;
use serde::{Deserialize, Serialize, de};
use strum::VariantNames as _;
use tracing_subscriber::{
    EnvFilter,
    fmt::{
        MakeWriter,
        time::{ChronoLocal, ChronoUtc},
    },
    prelude::*,
};

use crate::cli::styles::maybe_strip_color;

static TRACING_INITIALIZED: AtomicBool = AtomicBool::new(false);

const FRIENDLY_FORMAT_LOCAL: &str = "%Y-%m-%d %H:%M:%SL";
const FRIENDLY_FORMAT_UTC: &str = "%Y-%m-%d %H:%M:%SZ";

/// Environment variable that controls what gets logged to stderr
const STANDARD_ENV_VAR: &str = "RUST_LOG";
/// Environment variable that controls what gets logged to file
const LOG_FILE_DETAIL_ENV_VAR: &str = "RUST_LOG_FILE_DETAIL";

/// Computes the trace level for a given set of [`Parameters`](crate::cli::Parameters)
pub(crate) fn trace_level(args: &crate::cli::Parameters) -> &'static str {
    if args.verbose {
        "debug"
    } else if args.quiet {
        "error"
    } else {
        "info"
    }
}

/// Selects the format of time stamps in output messages
#[derive(
    Copy,
    Clone,
    Debug,
    Default,
    Eq,
    PartialEq,
    strum::Display,
    strum::EnumString,
    strum::VariantNames,
    clap::ValueEnum,
    Serialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "kebab-case")]
pub enum TimeFormat {
    /// Local time (as best as we can figure it out), as "year-month-day HH:MM:SS"
    #[default]
    Local,
    /// UTC time, as "year-month-day HH:MM:SS"
    Utc,
    /// UTC time, in the format described in [RFC 3339](https://datatracker.ietf.org/doc/html/rfc3339).
    Rfc3339,
}

impl<'de> Deserialize<'de> for TimeFormat {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let lower = s.to_ascii_lowercase();
        std::str::FromStr::from_str(&lower)
            .map_err(|_| de::Error::unknown_variant(&s, TimeFormat::VARIANTS))
    }
}

struct FilterResult {
    filter: EnvFilter,
    used_env: bool,
}

/// Uses the given environment variable if set; otherwise logs only smdp events at `trace_level`.
fn filter_for(trace_level: &str, key: &str) -> anyhow::Result<FilterResult> {
    EnvFilter::try_from_env(key)
        .map(|filter| FilterResult {
            filter,
            used_env: true,
        })
        .or_else(|e| {
            if std::env::var(key).is_ok() {
                anyhow::bail!("{key} (set in environment) was not understood: {e}");
            }
            Ok(FilterResult {
                filter: EnvFilter::try_new(format!("smdp={trace_level}"))?,
                used_env: false,
            })
        })
}

fn make_tracing_layer<S, W, F>(
    writer: W,
    filter: F,
    time_format: TimeFormat,
    show_target: bool,
    ansi: bool,
) -> Box<dyn tracing_subscriber::Layer<S> + Send + Sync>
where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
    W: for<'writer> MakeWriter<'writer> + 'static + Sync + Send,
    F: tracing_subscriber::layer::Filter<S> + 'static + Sync + Send,
{
    let layer = tracing_subscriber::fmt::layer::<S>()
        .compact()
        .with_target(show_target)
        .with_ansi(ansi);

    // The timer has to go on before the writer and filter
    match time_format {
        TimeFormat::Local => layer
            .with_timer(ChronoLocal::new(FRIENDLY_FORMAT_LOCAL.into()))
            .with_writer(writer)
            .with_filter(filter)
            .boxed(),
        TimeFormat::Utc => layer
            .with_timer(ChronoUtc::new(FRIENDLY_FORMAT_UTC.into()))
            .with_writer(writer)
            .with_filter(filter)
            .boxed(),
        TimeFormat::Rfc3339 => layer
            .with_timer(ChronoLocal::rfc_3339())
            .with_writer(writer)
            .with_filter(filter)
            .boxed(),
    }
}

/// Where console trace output goes
#[derive(Debug)]
pub(crate) enum ConsoleTraceType {
    /// Trace directly to stderr
    Standard,
    /// Trace via Indicatif, so log lines do not tear through progress bars
    Indicatif(MultiProgress),
    /// Do not print traces anywhere
    #[allow(dead_code)] // used by tests
    None,
}

/// Set up rust tracing, to console (via an optional `MultiProgress`) and optionally to file.
///
/// By default we log only our own events, at the given trace level.
/// This can be overridden by setting `RUST_LOG`; the log file can be given
/// a different filter with `RUST_LOG_FILE_DETAIL`.
///
/// **CAUTION:** If this function fails, tracing won't be set up; callers must take extra care to report the error.
///
/// **NOTE:** You can only run this once per process. A global bool prevents re-running.
pub(crate) fn setup(
    trace_level: &str,
    display: ConsoleTraceType,
    log_file: Option<&Path>,
    time_format: TimeFormat,
    ansi_colours: bool,
) -> anyhow::Result<()> {
    if is_initialized() {
        tracing::warn!("tracing::setup called a second time (ignoring)");
        return Ok(());
    }
    TRACING_INITIALIZED.store(true, Ordering::Relaxed);

    let layers = setup_inner(trace_level, display, log_file, time_format, ansi_colours)?;
    tracing_subscriber::registry().with(layers).init();

    Ok(())
}

fn setup_inner(
    trace_level: &str,
    display: ConsoleTraceType,
    log_file: Option<&Path>,
    time_format: TimeFormat,
    ansi_colours: bool,
) -> anyhow::Result<
    Vec<Box<dyn tracing_subscriber::Layer<tracing_subscriber::Registry> + Send + Sync>>,
> {
    let mut layers = Vec::new();

    let filter = filter_for(trace_level, STANDARD_ENV_VAR)?;
    // Show targets only when the environment asked for more than our own events
    match display {
        ConsoleTraceType::None => (),
        ConsoleTraceType::Standard => {
            layers.push(make_tracing_layer(
                std::io::stderr,
                filter.filter,
                time_format,
                filter.used_env,
                ansi_colours,
            ));
        }
        ConsoleTraceType::Indicatif(mp) => {
            layers.push(make_tracing_layer(
                ProgressWriter::wrap(mp),
                filter.filter,
                time_format,
                filter.used_env,
                ansi_colours,
            ));
        }
    }

    if let Some(filename) = log_file {
        let out_file = Arc::new(File::create(filename).context("Failed to open log file")?);
        let filter = if std::env::var(LOG_FILE_DETAIL_ENV_VAR).is_ok() {
            FilterResult {
                filter: EnvFilter::try_from_env(LOG_FILE_DETAIL_ENV_VAR)?,
                used_env: true,
            }
        } else {
            filter_for(trace_level, STANDARD_ENV_VAR)?
        };
        layers.push(make_tracing_layer(
            out_file,
            filter.filter,
            time_format,
            filter.used_env,
            false,
        ));
    }

    Ok(layers)
}

/// Returns whether tracing has been initialized
pub fn is_initialized() -> bool {
    TRACING_INITIALIZED.load(Ordering::Relaxed)
}

/// A wrapper type so tracing can output in a way that doesn't mess up `MultiProgress`
struct ProgressWriter(MultiProgress);

impl ProgressWriter {
    fn wrap(display: MultiProgress) -> Mutex<Self> {
        Mutex::new(Self(display))
    }
}

impl Write for ProgressWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let msg = std::str::from_utf8(buf)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        let msg = maybe_strip_color(msg);
        if self.0.is_hidden() {
            eprint!("{msg}");
        } else {
            self.0.println(msg.trim_end())?;
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod test {
    use figment::providers::Format as _;
    use indicatif::{MultiProgress, ProgressDrawTarget};
    use pretty_assertions::assert_eq;
    use rusty_fork::rusty_fork_test;
    use tracing_subscriber::EnvFilter;

    use super::{ConsoleTraceType, TimeFormat, setup, setup_inner, trace_level};
    use crate::cli::Parameters;

    #[test]
    fn trace_levels() {
        let p = Parameters {
            verbose: true,
            quiet: true,
            ..Default::default()
        };
        assert_eq!(trace_level(&p), "debug");
        let p = Parameters {
            quiet: true,
            ..Default::default()
        };
        assert_eq!(trace_level(&p), "error");
        assert_eq!(trace_level(&Parameters::default()), "info");
    }

    #[test]
    fn time_format_is_case_insensitive() {
        let tf: TimeFormat = from_toml("\"UTC\"");
        assert_eq!(tf, TimeFormat::Utc);
    }

    fn from_toml(s: &str) -> TimeFormat {
        let fig = figment::Figment::new().merge(figment::providers::Toml::string(&format!(
            "time_format = {s}"
        )));
        fig.extract_inner("time_format").unwrap()
    }

    #[test]
    fn console_layer_via_indicatif() {
        let mp = MultiProgress::new();
        let layers = setup_inner(
            "info",
            ConsoleTraceType::Indicatif(mp),
            None,
            TimeFormat::Local,
            false,
        )
        .unwrap();
        assert_eq!(layers.len(), 1);
    }

    #[test]
    fn console_and_file_layers() {
        let dir = tempfile::tempdir().unwrap();
        let filename = dir.path().join("test.log");
        let layers = setup_inner(
            "info",
            ConsoleTraceType::Standard,
            Some(&filename),
            TimeFormat::Utc,
            false,
        )
        .unwrap();
        assert_eq!(layers.len(), 2);
        assert!(filename.exists());
    }

    #[test]
    fn invalid_level_is_rejected() {
        let result = setup_inner(
            "invalid_level",
            ConsoleTraceType::None,
            None,
            TimeFormat::Utc,
            false,
        );
        assert!(result.is_err());
    }

    #[test]
    fn rfc3339_layer() {
        let f = EnvFilter::new("");
        let _result: Box<
            dyn tracing_subscriber::Layer<tracing_subscriber::Registry> + Send + Sync,
        > = super::make_tracing_layer(std::io::stderr, f, TimeFormat::Rfc3339, false, false);
    }

    #[test]
    fn progress_writer_hidden() {
        use std::io::Write as _;
        let mp = MultiProgress::with_draw_target(ProgressDrawTarget::hidden());
        let mux = super::ProgressWriter::wrap(mp);
        let mut writer = mux.lock().unwrap();
        let msg = "Test message";
        let bytes_written = writer.write(msg.as_bytes()).unwrap();
        assert_eq!(bytes_written, msg.len());
        writer.flush().unwrap();
    }

    // these tests affect global state, so need to run in forks
    rusty_fork_test! {
        #[test]
        fn setup_twice_is_harmless() {
            assert!(!super::is_initialized());
            setup("info", ConsoleTraceType::None, None, TimeFormat::Utc, false).unwrap();
            assert!(super::is_initialized());
            setup("debug", ConsoleTraceType::None, None, TimeFormat::Utc, false).unwrap();
        }
    }
}
