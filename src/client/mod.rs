//! Interactive client
//!
//! The client connects to a server and reads commands, one per line, from standard input.
//! [`Client`] speaks the protocol and can be driven directly; the shell is a thin layer
//! over it that parses commands and prints results.

mod connection;
pub use connection::{Client, ClientError, Fetched, Stored};
mod progress;
pub(crate) use progress::MAX_UPDATE_FPS;
mod shell;

use anyhow::Context as _;
use indicatif::MultiProgress;
use tokio::net::TcpStream;
use tokio::sync::watch;
use tracing::{debug, error, info};

use crate::Configuration;
use crate::protocol::common::TcpStreamPair;

/// Client mode entrypoint
///
/// # Return value
/// `true` if the session ran and closed normally; `false` if the server could not be reached,
/// in which case the reason has already been reported.
pub async fn client_main(
    config: &Configuration,
    host: &str,
    display: MultiProgress,
    quiet: bool,
) -> anyhow::Result<bool> {
    let Ok(mut addresses) = tokio::net::lookup_host((host, config.port)).await else {
        error!("No such host: {host}");
        return Ok(false);
    };
    let Some(address) = addresses.next() else {
        error!("No such host: {host}");
        return Ok(false);
    };
    debug!("{host} resolved to {address}");
    let stream = match TcpStream::connect(address).await {
        Ok(s) => s,
        Err(e) => {
            error!("Could not connect to {address}: {e}");
            return Ok(false);
        }
    };
    info!("connected to {address}");
    let client = Client::new(
        TcpStreamPair::from_tcp(stream),
        config.chunk_size as usize,
    );

    let (tx, rx) = watch::channel(false);
    let _signal = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = tx.send(true);
        } else {
            // Without a signal handler, only `exit` or end of input stop the shell
            std::future::pending::<()>().await;
        }
    });

    let input = shell::read_lines(std::io::BufReader::new(std::io::stdin()))
        .context("starting the input reader")?;
    shell::Shell::new(client, anstream::stdout(), display, quiet)
        .run(input, rx)
        .await
        .with_context(|| format!("session with {host}"))?;
    Ok(true)
}
