//! Real supervisor on an ephemeral port, driven by the library client

use std::sync::Arc;
use std::time::Duration;

use indicatif::ProgressBar;
use pretty_assertions::assert_eq;
use smdp::catalog::{CatalogStore as _, SqliteCatalog};
use smdp::client::{Client, Fetched, Stored};
use smdp::protocol::common::TcpStreamPair;
use smdp::server::Supervisor;
use smdp::session::SessionOptions;
use tokio::net::TcpStream;
use tokio::sync::watch;

type TcpClient = Client<
    tokio::io::BufWriter<tokio::net::tcp::OwnedWriteHalf>,
    tokio::net::tcp::OwnedReadHalf,
>;

struct Server {
    addr: std::net::SocketAddr,
    catalog: Arc<SqliteCatalog>,
    shutdown: watch::Sender<bool>,
    task: tokio::task::JoinHandle<anyhow::Result<()>>,
    dir: tempfile::TempDir,
}

async fn start_server() -> Server {
    let dir = tempfile::tempdir().unwrap();
    let catalog = Arc::new(SqliteCatalog::open(dir.path().join("server.db")).unwrap());
    catalog.add_user("alice", b"wonderland").unwrap();
    let options = SessionOptions {
        idle_timeout: Duration::from_secs(10),
        chunk_size: 1024,
        upload_dir: dir.path().join("uploads"),
    };
    let supervisor = Supervisor::listen("127.0.0.1", 0, catalog.clone(), options)
        .await
        .unwrap();
    let addr = supervisor.local_addr().unwrap();
    let (shutdown, rx) = watch::channel(false);
    let task = tokio::spawn(supervisor.run(rx));
    Server {
        addr,
        catalog,
        shutdown,
        task,
        dir,
    }
}

async fn connect(server: &Server) -> TcpClient {
    let stream = TcpStream::connect(server.addr).await.unwrap();
    Client::new(TcpStreamPair::from_tcp(stream), 1024)
}

#[tokio::test]
async fn full_session() {
    let server = start_server().await;
    let media = server.dir.path().join("track.mp3");
    let data: Vec<u8> = (0..10_000u32).map(|i| (i % 241) as u8).collect();
    std::fs::write(&media, &data).unwrap();
    let id = server
        .catalog
        .insert("track", &media.to_string_lossy())
        .unwrap();
    let id = u32::try_from(id).unwrap();

    let mut client = connect(&server).await;
    assert_eq!(client.echo("ping").await.unwrap(), "ping".as_bytes());

    // Nothing is available before logging in
    let dest = server.dir.path().join("copy.mp3");
    let hidden = ProgressBar::hidden();
    assert_eq!(
        client.download(id, &dest, &hidden).await.unwrap(),
        Fetched::Denied
    );

    client.user("alice").await.unwrap();
    assert!(!client.pass("looking-glass").await.unwrap());
    assert!(client.pass("wonderland").await.unwrap());

    let rows = client.list().await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].name, "track");

    assert_eq!(
        client.download(id, &dest, &hidden).await.unwrap(),
        Fetched::Saved(10_000)
    );
    assert_eq!(std::fs::read(&dest).unwrap(), data);
    assert_eq!(
        client.download(id + 1, &dest, &hidden).await.unwrap(),
        Fetched::NoFile
    );

    let Stored::As(new_id) = client.upload("copy", &dest, &hidden).await.unwrap() else {
        panic!("upload refused");
    };
    let rows = client.list().await.unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[1].id, new_id.to_string());
    assert_eq!(rows[1].name, "copy");

    let random_dest = server.dir.path().join("random.mp3");
    let (picked, fetched) = client.random(&random_dest, &hidden).await.unwrap();
    assert!(picked == Some(id) || picked == Some(new_id));
    assert_eq!(fetched, Fetched::Saved(10_000));

    client.close().await.unwrap();
    server.shutdown.send(true).unwrap();
    server.task.await.unwrap().unwrap();
}

#[tokio::test]
async fn concurrent_clients_are_independent() {
    let server = start_server().await;
    let mut tasks = Vec::new();
    for n in 0..8 {
        let mut client = connect(&server).await;
        tasks.push(tokio::spawn(async move {
            let text = format!("client {n}");
            for _ in 0..20 {
                assert_eq!(client.echo(&text).await.unwrap(), text.as_bytes());
            }
            client.close().await.unwrap();
        }));
    }
    // One more client that commits a protocol fault mid-way
    let mut rogue = TcpStream::connect(server.addr).await.unwrap();
    tokio::io::AsyncWriteExt::write_all(&mut rogue, &[0, 0, 0, 99])
        .await
        .unwrap();

    for t in tasks {
        t.await.unwrap();
    }
    server.shutdown.send(true).unwrap();
    server.task.await.unwrap().unwrap();
}

#[tokio::test]
async fn idle_client_is_disconnected() {
    let dir = tempfile::tempdir().unwrap();
    let catalog = Arc::new(SqliteCatalog::in_memory().unwrap());
    let options = SessionOptions {
        idle_timeout: Duration::from_millis(200),
        chunk_size: 1024,
        upload_dir: dir.path().to_owned(),
    };
    let supervisor = Supervisor::listen("127.0.0.1", 0, catalog, options)
        .await
        .unwrap();
    let addr = supervisor.local_addr().unwrap();
    let (shutdown, rx) = watch::channel(false);
    let task = tokio::spawn(supervisor.run(rx));

    let mut client = TcpStream::connect(addr).await.unwrap();
    let mut buf = [0u8; 1];
    let n = tokio::time::timeout(
        Duration::from_secs(5),
        tokio::io::AsyncReadExt::read(&mut client, &mut buf),
    )
    .await
    .expect("server should close an idle connection")
    .unwrap();
    assert_eq!(n, 0);

    shutdown.send(true).unwrap();
    task.await.unwrap().unwrap();
}
