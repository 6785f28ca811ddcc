//! Integration tests for the player-server binary.
//!
//! Each test starts a throwaway origin, launches the server against it and
//! talks to the server over HTTP.

use axum::{routing::get, Router};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tempfile::TempDir;
use tokio::io::AsyncBufReadExt;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// Origin serving the player shell, stoppable to simulate going offline.
struct Origin {
    url: String,
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl Origin {
    async fn start() -> Origin {
        let app = Router::new()
            .route("/", get(|| async { "<html>player</html>" }))
            .route("/index.html", get(|| async { "<html>player</html>" }))
            .route("/styles.css", get(|| async { "body { margin: 0 }" }))
            .route("/script.js", get(|| async { "new MusicPlayer()" }))
            .route("/manifest.json", get(|| async { "{}" }))
            .route("/icons/icon-192x192.png", get(|| async { "png-192" }))
            .route("/icons/icon-512x512.png", get(|| async { "png-512" }));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let (tx, rx) = oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = rx.await;
                })
                .await
                .unwrap();
        });

        Origin {
            url: format!("http://127.0.0.1:{}/", port),
            shutdown: Some(tx),
            task,
        }
    }

    async fn stop(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        let _ = tokio::time::timeout(Duration::from_secs(5), self.task).await;
    }
}

struct ServerHandle {
    child: tokio::process::Child,
    port: u16,
}

impl ServerHandle {
    fn url(&self, path: &str) -> String {
        format!("http://127.0.0.1:{}{}", self.port, path)
    }
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        let _ = self.child.start_kill();
    }
}

fn binary() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_player-server"))
}

/// Launch the server and wait for it to report its port.
async fn start_server(origin: &str, data_dir: &Path) -> ServerHandle {
    let mut child = tokio::process::Command::new(binary())
        .arg("--port")
        .arg("0")
        .arg("--origin")
        .arg(origin)
        .arg("--data-dir")
        .arg(data_dir)
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .spawn()
        .expect("failed to spawn player-server");

    let stdout = child.stdout.take().expect("failed to capture stdout");
    let mut lines = tokio::io::BufReader::new(stdout).lines();

    let port = tokio::time::timeout(Duration::from_secs(30), async {
        while let Ok(Some(line)) = lines.next_line().await {
            if let Some(value) = line.strip_prefix("PLAYER_PORT=") {
                return value.trim().parse::<u16>().ok();
            }
        }
        None
    })
    .await
    .ok()
    .flatten()
    .expect("PLAYER_PORT line not emitted by player-server");

    tokio::spawn(async move { while let Ok(Some(_)) = lines.next_line().await {} });

    ServerHandle { child, port }
}

async fn get_json(url: &str) -> (u16, Value) {
    let response = reqwest::get(url).await.unwrap();
    let status = response.status().as_u16();
    let body = response.json::<Value>().await.unwrap_or(Value::Null);
    (status, body)
}

#[tokio::test]
async fn test_health_and_worker_status() {
    let origin = Origin::start().await;
    let data_dir = TempDir::new().unwrap();
    let server = start_server(&origin.url, data_dir.path()).await;

    let (status, body) = get_json(&server.url("/health")).await;
    assert_eq!(status, 200);
    assert_eq!(body["status"], "ok");

    let (status, body) = get_json(&server.url("/worker/status")).await;
    assert_eq!(status, 200);
    assert_eq!(body["state"], "activated");
    assert_eq!(body["controlling"], true);
    assert_eq!(body["cache_name"], "music-player-v1");
    assert_eq!(body["stats"]["total_entries"], 7);

    origin.stop().await;
}

#[tokio::test]
async fn test_shell_served_while_origin_is_down() {
    let origin = Origin::start().await;
    let data_dir = TempDir::new().unwrap();
    let server = start_server(&origin.url, data_dir.path()).await;

    let response = reqwest::get(server.url("/missing.png")).await.unwrap();
    assert_eq!(response.status().as_u16(), 404);

    origin.stop().await;

    let response = reqwest::get(server.url("/styles.css")).await.unwrap();
    assert_eq!(response.status().as_u16(), 200);
    assert_eq!(response.text().await.unwrap(), "body { margin: 0 }");

    let response = reqwest::get(server.url("/never-cached.js")).await.unwrap();
    assert_eq!(response.status().as_u16(), 503);
}

#[tokio::test]
async fn test_proxy_stays_on_origin() {
    let origin = Origin::start().await;
    let other = Origin::start().await;
    let data_dir = TempDir::new().unwrap();
    let server = start_server(&origin.url, data_dir.path()).await;

    for target in [
        format!("/{}styles.css", other.url),
        "/blob:http://127.0.0.1/abc".to_string(),
    ] {
        let response = reqwest::get(server.url(&target)).await.unwrap();
        assert_eq!(response.status().as_u16(), 400, "{}", target);
        assert_ne!(response.text().await.unwrap(), "body { margin: 0 }");
    }

    let (_, body) = get_json(&server.url("/worker/status")).await;
    assert_eq!(body["stats"]["total_entries"], 7);

    other.stop().await;
    origin.stop().await;
}

#[tokio::test]
async fn test_sync_keys() {
    let origin = Origin::start().await;
    let data_dir = TempDir::new().unwrap();
    let server = start_server(&origin.url, data_dir.path()).await;
    let client = reqwest::Client::new();

    let response = client
        .put(server.url("/sync/audioMode"))
        .json(&json!("bass"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 204);
    let (status, body) = get_json(&server.url("/sync/audioMode")).await;
    assert_eq!(status, 200);
    assert_eq!(body, json!("bass"));

    let response = client
        .put(server.url("/sync/audioMode"))
        .json(&json!("loud"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 422);
    let (_, body) = get_json(&server.url("/sync/audioMode")).await;
    assert_eq!(body, json!("bass"));

    let songs = json!([{
        "name": "Intro",
        "artist": "Rebecca",
        "url": "https://media.example.com/intro.mp3",
        "isVideo": false
    }]);
    let response = client
        .put(server.url("/sync/songs"))
        .json(&songs)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 204);
    let (_, body) = get_json(&server.url("/sync/songs")).await;
    assert_eq!(body, songs);

    let response = client
        .delete(server.url("/sync/songs"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 204);
    let (status, _) = get_json(&server.url("/sync/songs")).await;
    assert_eq!(status, 404);

    origin.stop().await;
}

#[tokio::test]
async fn test_worker_messages_and_sync_tags() {
    let origin = Origin::start().await;
    let data_dir = TempDir::new().unwrap();
    let server = start_server(&origin.url, data_dir.path()).await;
    let client = reqwest::Client::new();

    let response = client
        .post(server.url("/worker/message"))
        .json(&json!({"type": "CLAIM"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 400);

    // Already active: the message is accepted but activates nothing.
    let response = client
        .post(server.url("/worker/message"))
        .json(&json!({"type": "SKIP_WAITING"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);
    let body = response.json::<Value>().await.unwrap();
    assert_eq!(body["state"], "activated");
    assert_eq!(body["activation"], Value::Null);

    for (tag, handled) in [("background-sync", true), ("periodic-refresh", false)] {
        let response = client
            .post(server.url("/worker/sync"))
            .json(&json!({ "tag": tag }))
            .send()
            .await
            .unwrap();
        let body = response.json::<Value>().await.unwrap();
        assert_eq!(body["handled"], handled);
    }

    origin.stop().await;
}
