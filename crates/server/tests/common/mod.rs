//! # Common Test Utilities
//!
//! `TestApp` spawns the real router on a random port with a scripted catalog
//! tool standing in for `exiftool`, and exposes a `reqwest` client to drive it.

// Not every test file uses every helper.
#![allow(unused)]

use anyhow::Result;
use axum::serve;
use reqwest::Client;
use std::{net::SocketAddr, sync::Arc};
use tagstream::ToolLauncher;
use tagstream_server::{config::AppConfig, router::create_router, state::AppState};
use tagstream_test_utils::{init_tracing, ProcessProbe, ScriptedLauncher};
use tokio::{net::TcpListener, task::JoinHandle};

/// A harness for end-to-end testing of the Axum server.
pub struct TestApp {
    pub address: String,
    pub client: Client,
    pub probe: ProcessProbe,
    _server_handle: JoinHandle<()>,
    shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
}

impl TestApp {
    /// Spawns the server with the given scripted tool.
    pub async fn spawn(launcher: ScriptedLauncher) -> Result<Self> {
        let probe = launcher.probe();
        Self::spawn_with(Arc::new(launcher), probe).await
    }

    /// Spawns the server with any launcher, e.g. the real process launcher.
    pub async fn spawn_with(launcher: Arc<dyn ToolLauncher>, probe: ProcessProbe) -> Result<Self> {
        init_tracing();

        let app_state = AppState::with_launcher(&AppConfig::default(), launcher);

        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr: SocketAddr = listener.local_addr()?;
        let address = format!("http://{addr}");

        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
        let server_handle = tokio::spawn(async move {
            let app = create_router(app_state);
            let server = serve(listener, app).with_graceful_shutdown(async {
                shutdown_rx.await.ok();
            });
            if let Err(e) = server.await {
                tracing::error!("[TestApp] Server error: {}", e);
            }
        });

        Ok(Self {
            address,
            client: Client::new(),
            probe,
            _server_handle: server_handle,
            shutdown_tx: Some(shutdown_tx),
        })
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            // The receiver might already be gone if the server task panicked.
            let _ = tx.send(());
        }
    }
}
