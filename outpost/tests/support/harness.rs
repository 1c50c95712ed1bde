//! End-to-end test harness for outpost
//!
//! Starts a maildir queue, a relay that accepts every message, and a
//! change-driven dispatcher watching the queue, all in this process.
//!
//! ```no_run
//! let harness = E2ETestHarness::start().await;
//! harness.enqueue("a@b.com", "c@d.com", "Subject: Test\r\n\r\nHello").await;
//! harness.wait_for_empty_queue(Duration::from_secs(5)).await.unwrap();
//! harness.shutdown().await;
//! ```

use std::{net::SocketAddr, sync::Arc, time::Duration};

use outpost_common::Signal;
use outpost_delivery::{Dispatcher, DispatcherConfig, HttpTransportConfig, HttpTransportFactory};
use outpost_spool::{Maildir, SpoolWatcher};
use tempfile::TempDir;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpListener,
    sync::{Mutex, broadcast},
    task::JoinHandle,
};

pub struct E2ETestHarness {
    _dir: TempDir,
    spool: Maildir,
    relay_requests: Arc<Mutex<Vec<String>>>,
    relay_task: JoinHandle<()>,
    dispatcher_task: JoinHandle<()>,
    shutdown: broadcast::Sender<Signal>,
}

impl E2ETestHarness {
    /// Start with `backlog` messages already queued
    pub async fn start_with_backlog(backlog: usize) -> Self {
        let dir = tempfile::tempdir().expect("temp dir");
        let spool = Maildir::open(dir.path(), true).expect("open maildir");
        for n in 0..backlog {
            spool
                .enqueue(
                    "no-reply@nextthought.com",
                    &["user@example.com".to_string()],
                    format!("Subject: backlog {n}\r\n\r\nbody").as_bytes(),
                )
                .await
                .expect("enqueue backlog");
        }

        let (relay_addr, relay_requests, relay_task) = start_relay().await;

        let factory = HttpTransportFactory::new(HttpTransportConfig {
            endpoint: format!("http://{relay_addr}"),
            ..HttpTransportConfig::default()
        });
        let dispatcher = Dispatcher::new(
            spool.clone(),
            Arc::new(factory),
            DispatcherConfig {
                cooldown_secs: 1,
                ..DispatcherConfig::default()
            },
        );

        let (watcher, changes) =
            SpoolWatcher::watch(spool.incoming_dir(), 64).expect("watch maildir");
        let (shutdown, shutdown_rx) = broadcast::channel(1);
        let dispatcher_task = tokio::spawn(async move {
            let _watcher = watcher;
            dispatcher.run_watching(changes, shutdown_rx).await;
        });

        Self {
            _dir: dir,
            spool,
            relay_requests,
            relay_task,
            dispatcher_task,
            shutdown,
        }
    }

    pub async fn start() -> Self {
        Self::start_with_backlog(0).await
    }

    pub async fn enqueue(&self, from: &str, to: &str, message: &str) {
        self.spool
            .enqueue(from, &[to.to_string()], message.as_bytes())
            .await
            .expect("enqueue");
    }

    pub const fn spool(&self) -> &Maildir {
        &self.spool
    }

    /// Paths of the requests the relay has received
    pub async fn relay_requests(&self) -> Vec<String> {
        self.relay_requests.lock().await.clone()
    }

    /// Dispatch cycles run so far; every cycle probes the relay once
    pub async fn cycles(&self) -> usize {
        self.relay_requests()
            .await
            .iter()
            .filter(|line| line.starts_with("GET "))
            .count()
    }

    /// Poll until the queue is empty or `limit` passes
    pub async fn wait_for_empty_queue(&self, limit: Duration) -> Result<(), String> {
        tokio::time::timeout(limit, async {
            while !self.spool.is_empty().await.expect("list spool") {
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
        })
        .await
        .map_err(|_| "queue was not drained in time".to_string())
    }

    pub async fn shutdown(self) {
        let _ = self.shutdown.send(Signal::Shutdown);
        let _ = self.dispatcher_task.await;
        self.relay_task.abort();
    }
}

/// A relay that answers every request with 200 and records its path
async fn start_relay() -> (SocketAddr, Arc<Mutex<Vec<String>>>, JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind relay");
    let addr = listener.local_addr().expect("relay address");
    let requests = Arc::new(Mutex::new(Vec::new()));

    let recorded = Arc::clone(&requests);
    let task = tokio::spawn(async move {
        while let Ok((mut stream, _)) = listener.accept().await {
            let recorded = Arc::clone(&recorded);
            tokio::spawn(async move {
                let mut buf = Vec::new();
                let mut chunk = [0u8; 4096];

                let header_end = loop {
                    match stream.read(&mut chunk).await {
                        Ok(0) | Err(_) => return,
                        Ok(n) => buf.extend_from_slice(&chunk[..n]),
                    }
                    if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                        break pos + 4;
                    }
                };

                let head = String::from_utf8_lossy(&buf[..header_end]).into_owned();
                let content_length = head
                    .lines()
                    .filter_map(|line| line.split_once(':'))
                    .find(|(k, _)| k.trim().eq_ignore_ascii_case("content-length"))
                    .and_then(|(_, v)| v.trim().parse::<usize>().ok())
                    .unwrap_or(0);

                while buf.len() < header_end + content_length {
                    match stream.read(&mut chunk).await {
                        Ok(0) | Err(_) => break,
                        Ok(n) => buf.extend_from_slice(&chunk[..n]),
                    }
                }

                let request_line = head.lines().next().unwrap_or_default().to_string();
                recorded.lock().await.push(request_line);

                let _ = stream
                    .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 0\r\nConnection: close\r\n\r\n")
                    .await;
                let _ = stream.shutdown().await;
            });
        }
    });

    (addr, requests, task)
}
