//! Fake MusicBrainz web service
//!
//! Serves canned JSON documents by path over plain HTTP/1.1 and counts the
//! requests it receives. Unknown paths get a 404.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

pub struct FakeMusicBrainz {
    pub base_url: String,
    documents: Arc<Mutex<HashMap<String, String>>>,
    hits: Arc<AtomicUsize>,
}

impl FakeMusicBrainz {
    pub async fn spawn() -> Self {
        let documents: Arc<Mutex<HashMap<String, String>>> = Arc::new(Mutex::new(HashMap::new()));
        let hits = Arc::new(AtomicUsize::new(0));

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind fake MusicBrainz");
        let addr = listener.local_addr().expect("Failed to get local address");

        let served = documents.clone();
        let counter = hits.clone();
        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                let served = served.clone();
                let counter = counter.clone();
                tokio::spawn(async move {
                    let mut buf = Vec::new();
                    let mut chunk = [0u8; 1024];
                    while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
                        match socket.read(&mut chunk).await {
                            Ok(0) | Err(_) => return,
                            Ok(n) => buf.extend_from_slice(&chunk[..n]),
                        }
                    }
                    counter.fetch_add(1, Ordering::SeqCst);
                    let head = String::from_utf8_lossy(&buf);
                    let path = head
                        .lines()
                        .next()
                        .and_then(|line| line.split_whitespace().nth(1))
                        .map(|target| target.split('?').next().unwrap_or(target).to_string())
                        .unwrap_or_default();

                    let document = served.lock().unwrap().get(&path).cloned();
                    let (status, body) = match document {
                        Some(body) => ("200 OK", body),
                        None => ("404 Not Found", r#"{"error":"Not Found"}"#.to_string()),
                    };
                    let response = format!(
                        "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                        status,
                        body.len(),
                        body
                    );
                    let _ = socket.write_all(response.as_bytes()).await;
                    let _ = socket.shutdown().await;
                });
            }
        });

        Self {
            base_url: format!("http://{}", addr),
            documents,
            hits,
        }
    }

    fn serve(&self, path: String, body: serde_json::Value) {
        self.documents.lock().unwrap().insert(path, body.to_string());
    }

    pub fn add_recording(&self, mbid: &str, title: &str, length_ms: Option<u64>) {
        self.serve(
            format!("/recording/{}", mbid),
            serde_json::json!({ "id": mbid, "title": title, "length": length_ms }),
        );
    }

    pub fn add_release(&self, mbid: &str, title: &str, artist_mbid: &str) {
        self.serve(
            format!("/release/{}", mbid),
            serde_json::json!({
                "id": mbid,
                "title": title,
                "artist-credit": [{ "name": "", "artist": { "id": artist_mbid } }],
            }),
        );
    }

    pub fn add_artist(&self, mbid: &str, name: &str, aliases: &[&str]) {
        let aliases: Vec<serde_json::Value> = aliases
            .iter()
            .map(|alias| serde_json::json!({ "name": alias }))
            .collect();
        self.serve(
            format!("/artist/{}", mbid),
            serde_json::json!({ "id": mbid, "name": name, "aliases": aliases }),
        );
    }

    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }
}
