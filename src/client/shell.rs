//! The interactive command loop

use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::str::FromStr;

use anyhow::Context as _;
use indicatif::MultiProgress;
use tokio::sync::{mpsc, watch};
use tracing::debug;

use super::connection::{Client, ClientError, Fetched, Stored};
use super::progress::transfer_bar;
use crate::cli::styles::{RESET, error, header, success, warning};
use crate::protocol::common::{ReceivingStream, SendingStream};

const HELP: &str = "\
Commands:
  list                      show the catalog
  user <name>               set the username to log in as
  pass <secret>             log in
  download <id> <path>      save catalog entry <id> to <path>
  random <path>             save a randomly chosen entry to <path>
  upload <name> <path>      add local file <path> to the catalog as <name>
  echo <text>               ask the server to repeat <text>
  help                      show this message
  exit                      close the connection and quit";

/// One line of user input
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum ShellCommand {
    List,
    User(String),
    Pass(String),
    Download { id: u32, path: PathBuf },
    Random(PathBuf),
    Upload { name: String, path: PathBuf },
    Echo(String),
    Help,
    Exit,
    /// A blank line
    Nothing,
}

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub(crate) enum ParseError {
    #[error("Invalid command {0} (try `help`)")]
    Unknown(String),
    #[error("Usage: {0}")]
    Usage(&'static str),
    #[error("Invalid id {0:?}: expected a number")]
    BadId(String),
}

impl FromStr for ShellCommand {
    type Err = ParseError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let line = line.trim();
        let (verb, rest) = line
            .split_once(char::is_whitespace)
            .map_or((line, ""), |(v, r)| (v, r.trim_start()));
        let args: Vec<&str> = rest.split_whitespace().collect();
        Ok(match (verb, args.as_slice()) {
            ("", _) => ShellCommand::Nothing,
            ("list", []) => ShellCommand::List,
            ("list", _) => return Err(ParseError::Usage("list")),
            ("user", [name]) => ShellCommand::User((*name).to_owned()),
            ("user", _) => return Err(ParseError::Usage("user <name>")),
            ("pass", [secret]) => ShellCommand::Pass((*secret).to_owned()),
            ("pass", _) => return Err(ParseError::Usage("pass <secret>")),
            ("download", [id, path]) => ShellCommand::Download {
                id: id
                    .parse()
                    .map_err(|_| ParseError::BadId((*id).to_owned()))?,
                path: PathBuf::from(path),
            },
            ("download", _) => return Err(ParseError::Usage("download <id> <path>")),
            ("random", [path]) => ShellCommand::Random(PathBuf::from(path)),
            ("random", _) => return Err(ParseError::Usage("random <path>")),
            ("upload", [name, path]) => ShellCommand::Upload {
                name: (*name).to_owned(),
                path: PathBuf::from(path),
            },
            ("upload", _) => return Err(ParseError::Usage("upload <name> <path>")),
            // echo keeps its text as typed, inner spacing included
            ("echo", _) => ShellCommand::Echo(rest.to_owned()),
            ("help" | "?", _) => ShellCommand::Help,
            ("exit" | "quit", _) => ShellCommand::Exit,
            (other, _) => return Err(ParseError::Unknown(other.to_owned())),
        })
    }
}

/// Lines of user input, as they arrive
pub(crate) type Lines = mpsc::Receiver<std::io::Result<String>>;

/// Reads lines from `input` on a thread of its own.
///
/// A blocking read of a terminal cannot be cancelled, so it must not run on the runtime:
/// the runtime could not shut down until the user pressed Enter.
pub(crate) fn read_lines<I: BufRead + Send + 'static>(input: I) -> std::io::Result<Lines> {
    let (tx, rx) = mpsc::channel(1);
    let _ = std::thread::Builder::new()
        .name("input".into())
        .spawn(move || {
            for line in input.lines() {
                let failed = line.is_err();
                if tx.blocking_send(line).is_err() || failed {
                    break;
                }
            }
        })?;
    Ok(rx)
}

/// Resolves once `shutdown` becomes true. Never resolves if the sender has gone away.
async fn interrupted(shutdown: &mut watch::Receiver<bool>) {
    let signalled = shutdown.wait_for(|stop| *stop).await.is_ok();
    if !signalled {
        std::future::pending::<()>().await;
    }
}

/// Drives a [`Client`] from lines of user input
pub(crate) struct Shell<S: SendingStream, R: ReceivingStream, W: Write> {
    client: Client<S, R>,
    out: W,
    display: MultiProgress,
    quiet: bool,
}

impl<S: SendingStream, R: ReceivingStream, W: Write> Shell<S, R, W> {
    pub(crate) fn new(client: Client<S, R>, out: W, display: MultiProgress, quiet: bool) -> Self {
        Self {
            client,
            out,
            display,
            quiet,
        }
    }

    /// Runs commands from `input` until `exit`, end of input or a shutdown signal,
    /// then sends CLOSE.
    ///
    /// A shutdown signal also cuts short a command in progress. The connection is then
    /// out of step, so it is shut down without CLOSE.
    ///
    /// Only a fault on the connection is an error. Everything else is reported and the loop carries on.
    pub(crate) async fn run(
        mut self,
        mut input: Lines,
        mut shutdown: watch::Receiver<bool>,
    ) -> anyhow::Result<()> {
        loop {
            let line = tokio::select! {
                biased;
                () = interrupted(&mut shutdown) => {
                    debug!("interrupted");
                    None
                }
                line = input.recv() => line.transpose().context("reading commands")?,
            };
            let Some(line) = line else {
                break;
            };
            let command = match line.parse::<ShellCommand>() {
                Ok(ShellCommand::Exit) => break,
                Ok(c) => c,
                Err(e) => {
                    self.say(format_args!("{e}"))?;
                    continue;
                }
            };
            let outcome = tokio::select! {
                biased;
                () = interrupted(&mut shutdown) => None,
                r = self.execute(command) => Some(r),
            };
            match outcome {
                None => {
                    self.say(format_args!("{}Interrupted{RESET}", warning()))?;
                    self.client.abandon().await;
                    return Ok(());
                }
                Some(Ok(())) => (),
                Some(Err(e)) if e.is_fatal() => return Err(e).context("connection lost"),
                Some(Err(e)) => self.say(format_args!("{}Error:{RESET} {e}", error()))?,
            }
        }
        self.client.close().await.context("closing the connection")?;
        Ok(())
    }

    fn say(&mut self, what: std::fmt::Arguments<'_>) -> anyhow::Result<()> {
        writeln!(self.out, "{what}").context("writing output")
    }

    fn denied(&mut self) -> anyhow::Result<()> {
        self.say(format_args!("{}Access denied{RESET}", warning()))
    }

    fn no_file(&mut self) -> anyhow::Result<()> {
        self.say(format_args!("{}No such file{RESET}", warning()))
    }

    async fn execute(&mut self, command: ShellCommand) -> Result<(), ClientError> {
        match command {
            ShellCommand::Nothing | ShellCommand::Exit => (),
            ShellCommand::Help => self.say(format_args!("{HELP}")).map_err(local_output)?,
            ShellCommand::List => {
                let rows = self.client.list().await?;
                self.say(format_args!(
                    "{}{:>6}  {:<30} {}{RESET}",
                    header(),
                    "ID",
                    "NAME",
                    "PATH"
                ))
                .map_err(local_output)?;
                for row in rows {
                    self.say(format_args!("{:>6}  {:<30} {}", row.id, row.name, row.path))
                        .map_err(local_output)?;
                }
            }
            ShellCommand::User(name) => self.client.user(&name).await?,
            ShellCommand::Pass(secret) => {
                let said = if self.client.pass(&secret).await? {
                    self.say(format_args!("{}Successfully logged in{RESET}", success()))
                } else {
                    self.say(format_args!("{}Invalid username/password{RESET}", warning()))
                };
                said.map_err(local_output)?;
            }
            ShellCommand::Download { id, path } => {
                let bar = self.bar(&path.display().to_string())?;
                let fetched = self.client.download(id, &path, &bar).await;
                bar.finish_and_clear();
                self.report_fetch(&path, None, fetched?)?;
            }
            ShellCommand::Random(path) => {
                let bar = self.bar(&path.display().to_string())?;
                let fetched = self.client.random(&path, &bar).await;
                bar.finish_and_clear();
                let (id, fetched) = fetched?;
                self.report_fetch(&path, id, fetched)?;
            }
            ShellCommand::Upload { name, path } => {
                let bar = self.bar(&name)?;
                let stored = self.client.upload(&name, &path, &bar).await;
                bar.finish_and_clear();
                let said = match stored? {
                    Stored::As(id) => self.say(format_args!(
                        "{}Uploaded {} as {name} (id {id}){RESET}",
                        success(),
                        path.display()
                    )),
                    Stored::Denied => self.denied(),
                };
                said.map_err(local_output)?;
            }
            ShellCommand::Echo(text) => {
                let reply = self.client.echo(&text).await?;
                self.say(format_args!("{}", String::from_utf8_lossy(&reply)))
                    .map_err(local_output)?;
            }
        }
        Ok(())
    }

    fn bar(&self, label: &str) -> Result<indicatif::ProgressBar, ClientError> {
        transfer_bar(&self.display, label, self.quiet).map_err(|e| ClientError::Local {
            path: PathBuf::from(label),
            source: std::io::Error::other(e),
        })
    }

    fn report_fetch(
        &mut self,
        path: &std::path::Path,
        id: Option<u32>,
        fetched: Fetched,
    ) -> Result<(), ClientError> {
        let said = match fetched {
            Fetched::Saved(bytes) => {
                let picked = id.map(|id| format!(" (picked id {id})")).unwrap_or_default();
                self.say(format_args!(
                    "{}Saved {bytes} bytes to {}{picked}{RESET}",
                    success(),
                    path.display()
                ))
            }
            Fetched::NoFile => self.no_file(),
            Fetched::Denied => self.denied(),
        };
        said.map_err(local_output)
    }
}

/// Failing to write to our own terminal is reported like any other local problem
fn local_output(e: anyhow::Error) -> ClientError {
    ClientError::Local {
        path: PathBuf::from("<stdout>"),
        source: std::io::Error::other(e),
    }
}
