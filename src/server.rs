//! Connection supervisor
//!
//! Listens for TCP connections and runs one [`Session`] per connection, each on its own task.
//! A session that fails (or panics) affects nobody else. Every connection's stream is
//! released however its session ended.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context as _;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{Instrument as _, debug, error, info, info_span, trace, warn};

use crate::Configuration;
use crate::catalog::{SharedCatalog, SqliteCatalog};
use crate::protocol::common::TcpStreamPair;
use crate::session::{Session, SessionOptions};

/// Accepts connections and supervises their sessions
#[derive(Debug)]
pub struct Supervisor {
    listener: TcpListener,
    catalog: SharedCatalog,
    options: SessionOptions,
}

impl Supervisor {
    /// Binds the listening socket
    pub async fn listen(
        address: &str,
        port: u16,
        catalog: SharedCatalog,
        options: SessionOptions,
    ) -> anyhow::Result<Self> {
        let listener = TcpListener::bind((address, port))
            .await
            .with_context(|| format!("could not listen on {address} port {port}"))?;
        Ok(Self {
            listener,
            catalog,
            options,
        })
    }

    /// The address actually bound (useful when asked for port 0)
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Waits for the next connection
    pub async fn accept(&self) -> std::io::Result<(TcpStream, SocketAddr)> {
        self.listener.accept().await
    }

    /// Accepts connections until `shutdown` becomes true, then waits for every session to finish.
    ///
    /// Sessions see the same shutdown signal; any read or write they are blocked in fails at once.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> anyhow::Result<()> {
        info!(
            "listening on {}",
            self.local_addr().context("reading listener address")?
        );
        let session_rx = shutdown.clone();
        let mut tasks = JoinSet::new();
        loop {
            tokio::select! {
                stop = async { shutdown.wait_for(|stop| *stop).await.is_ok() } => {
                    if stop {
                        info!("shutting down; waiting for {} session(s)", tasks.len());
                    } else {
                        warn!("shutdown channel closed; stopping");
                    }
                    break;
                }
                accepted = self.accept() => match accepted {
                    Ok((stream, peer)) => {
                        let catalog = Arc::clone(&self.catalog);
                        let options = self.options.clone();
                        let rx = session_rx.clone();
                        let _ = tasks.spawn(
                            serve(stream, peer, catalog, options, rx)
                                .instrument(info_span!("conn", %peer)),
                        );
                    }
                    Err(e) => {
                        // Usually transient (e.g. out of file descriptors); keep listening
                        warn!("accept failed: {e}");
                        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
                    }
                },
                Some(joined) = tasks.join_next(), if !tasks.is_empty() => reap(joined),
            }
        }
        while let Some(joined) = tasks.join_next().await {
            reap(joined);
        }
        info!("all sessions finished");
        Ok(())
    }
}

fn reap(joined: Result<(), tokio::task::JoinError>) {
    if let Err(e) = joined {
        if e.is_panic() {
            error!("session task panicked: {e}");
        } else {
            debug!("session task cancelled: {e}");
        }
    }
}

/// Runs one session to completion, then closes the stream whatever the outcome
pub async fn serve(
    stream: TcpStream,
    peer: SocketAddr,
    catalog: SharedCatalog,
    options: SessionOptions,
    shutdown: watch::Receiver<bool>,
) {
    info!("connection from {peer}");
    if let Err(e) = stream.set_nodelay(true) {
        debug!("could not set TCP_NODELAY: {e}");
    }
    let pair = TcpStreamPair::from_tcp(stream);
    let (mut pair, result) = Session::new(pair, catalog, options, shutdown).run().await;
    match result {
        Ok(end) => info!("session ended: {end}"),
        Err(e) => warn!("session aborted: {e}"),
    }
    if let Err(e) = pair.shutdown().await {
        trace!("stream shutdown: {e}");
    }
}

/// Server mode entrypoint: opens the catalog and serves until interrupted
pub async fn server_main(config: &Configuration) -> anyhow::Result<()> {
    let catalog = SqliteCatalog::open(&config.database)
        .with_context(|| format!("opening catalog database {}", config.database))?;
    let supervisor = Supervisor::listen(
        &config.address,
        config.port,
        Arc::new(catalog),
        SessionOptions::from(config),
    )
    .await?;

    let (tx, rx) = watch::channel(false);
    let _signal = tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("interrupt received");
                let _ = tx.send(true);
            }
            Err(e) => {
                error!("cannot listen for interrupts: {e}");
                // keep the sender alive so the server is not stopped by accident
                std::future::pending::<()>().await;
            }
        }
    });
    supervisor.run(rx).await
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod test {
    use std::sync::Arc;
    use std::time::Duration;

    use pretty_assertions::assert_eq;
    use tokio::sync::watch;

    use super::Supervisor;
    use crate::catalog::{CatalogStore as _, SqliteCatalog};
    use crate::protocol::common::TcpStreamPair;
    use crate::protocol::{Request, Response, Tag};
    use crate::session::SessionOptions;

    type Running = (
        std::net::SocketAddr,
        watch::Sender<bool>,
        tokio::task::JoinHandle<anyhow::Result<()>>,
        Arc<SqliteCatalog>,
    );

    async fn start() -> Running {
        let catalog = Arc::new(SqliteCatalog::in_memory().unwrap());
        let sup = Supervisor::listen("127.0.0.1", 0, catalog.clone(), SessionOptions::default())
            .await
            .unwrap();
        let addr = sup.local_addr().unwrap();
        let (tx, rx) = watch::channel(false);
        let task = tokio::spawn(sup.run(rx));
        (addr, tx, task, catalog)
    }

    async fn connect(addr: std::net::SocketAddr) -> TcpStreamPair {
        TcpStreamPair::from_tcp(tokio::net::TcpStream::connect(addr).await.unwrap())
    }

    #[tokio::test]
    async fn sessions_are_isolated() {
        let (addr, tx, task, catalog) = start().await;
        let _ = catalog.insert("x", "/nowhere").unwrap();

        // One client commits a protocol fault
        let mut bad = connect(addr).await;
        tokio::io::AsyncWriteExt::write_all(&mut bad.send, &[0, 0, 0, 99])
            .await
            .unwrap();
        bad.flush().await.unwrap();

        // Another carries on regardless
        let mut good = connect(addr).await;
        Request::List.write_to(&mut good.send).await.unwrap();
        good.flush().await.unwrap();
        assert_eq!(
            Response::read_from(&mut good.recv, &[Tag::List], "LIST")
                .await
                .unwrap(),
            Response::ListCount(1)
        );

        // The faulty connection was closed by the server
        let mut buf = [0u8; 1];
        let n = tokio::time::timeout(
            Duration::from_secs(5),
            tokio::io::AsyncReadExt::read(&mut bad.recv, &mut buf),
        )
        .await
        .unwrap()
        .unwrap();
        assert_eq!(n, 0);

        Request::Close.write_to(&mut good.send).await.unwrap();
        good.flush().await.unwrap();
        tx.send(true).unwrap();
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn shutdown_stops_idle_sessions() {
        let (addr, tx, task, _catalog) = start().await;
        let mut idle = connect(addr).await;
        // make sure the session is up before signalling
        Request::Echo("hi".into()).write_to(&mut idle.send).await.unwrap();
        idle.flush().await.unwrap();
        let _ = Response::read_from(&mut idle.recv, &[Tag::Echo], "ECHO")
            .await
            .unwrap();
        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn shutdown_interrupts_a_stalled_upload() {
        let (addr, tx, task, catalog) = start().await;
        catalog.add_user("alice", b"pw").unwrap();
        let mut peer = connect(addr).await;
        Request::User("alice".into()).write_to(&mut peer.send).await.unwrap();
        Request::Pass("pw".into()).write_to(&mut peer.send).await.unwrap();
        Request::Upload.write_to(&mut peer.send).await.unwrap();
        peer.flush().await.unwrap();
        for _ in 0..2 {
            assert_eq!(
                Response::read_from(&mut peer.recv, &[Tag::Accept], "ACCEPT")
                    .await
                    .unwrap(),
                Response::Accept
            );
        }
        // ...and the name and body never come
        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn port_in_use() {
        let first = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = first.local_addr().unwrap().port();
        let catalog = Arc::new(SqliteCatalog::in_memory().unwrap());
        let err = Supervisor::listen("127.0.0.1", port, catalog, SessionOptions::default())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("could not listen"));
    }
}
