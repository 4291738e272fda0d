//! In-process HTTP front for a [`SessionStore`], used by the remote transport
//! tests.
//!
//! Speaks just enough HTTP/1.1 for `reqwest`: one request per connection,
//! `Content-Length` bodies, `Connection: close` replies.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use serde::Serialize;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

use crate::session::{ScriptedGameFactory, SessionError, SessionStore};

type Store = SessionStore<ScriptedGameFactory>;

pub struct TestService {
    addr: SocketAddr,
    store: Arc<Store>,
    requests: Arc<Mutex<Vec<String>>>,
    task: JoinHandle<()>,
}

impl TestService {
    pub async fn spawn() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        Self::serve(listener)
    }

    /// Serve on `addr`, e.g. a port that was refused a moment ago.
    pub async fn spawn_at(addr: SocketAddr) -> Self {
        let listener = TcpListener::bind(addr).await.unwrap();
        Self::serve(listener)
    }

    fn serve(listener: TcpListener) -> Self {
        let addr = listener.local_addr().unwrap();
        let store = Arc::new(SessionStore::new(ScriptedGameFactory));
        let requests = Arc::new(Mutex::new(Vec::new()));

        let task = {
            let store = store.clone();
            let requests = requests.clone();
            tokio::spawn(async move {
                while let Ok((socket, _)) = listener.accept().await {
                    let store = store.clone();
                    let requests = requests.clone();
                    tokio::spawn(async move {
                        let _ = handle(socket, &store, &requests).await;
                    });
                }
            })
        };

        Self {
            addr,
            store,
            requests,
            task,
        }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    /// "METHOD /path" for every request received, in order.
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }

    pub fn count(&self, request: &str) -> usize {
        self.requests().iter().filter(|r| *r == request).count()
    }
}

impl Drop for TestService {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// A local address nothing is listening on.
pub async fn unused_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

async fn handle(
    socket: TcpStream,
    store: &Store,
    requests: &Mutex<Vec<String>>,
) -> std::io::Result<()> {
    let mut reader = BufReader::new(socket);

    let mut request_line = String::new();
    reader.read_line(&mut request_line).await?;
    let mut parts = request_line.split_whitespace();
    let method = parts.next().unwrap_or_default().to_string();
    let target = parts.next().unwrap_or_default().to_string();

    let mut content_length = 0;
    loop {
        let mut header = String::new();
        reader.read_line(&mut header).await?;
        let header = header.trim();
        if header.is_empty() {
            break;
        }
        if let Some((name, value)) = header.split_once(':') {
            if name.eq_ignore_ascii_case("content-length") {
                content_length = value.trim().parse().unwrap_or(0);
            }
        }
    }
    let mut body = vec![0u8; content_length];
    reader.read_exact(&mut body).await?;

    let (path, query) = target.split_once('?').unwrap_or((target.as_str(), ""));
    requests.lock().unwrap().push(format!("{method} {path}"));
    let (status, reply) = route(store, &method, path, query, &body);

    let payload = reply.to_string();
    let response = format!(
        "HTTP/1.1 {status} {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{payload}",
        if status == 200 { "OK" } else { "Error" },
        payload.len()
    );
    let mut socket = reader.into_inner();
    socket.write_all(response.as_bytes()).await?;
    socket.shutdown().await
}

fn route(store: &Store, method: &str, path: &str, query: &str, body: &[u8]) -> (u16, Value) {
    let param = |key: &str| {
        query
            .split('&')
            .filter_map(|pair| pair.split_once('='))
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v.to_string())
    };
    let id = param("session_id").unwrap_or_default();
    let slot = param("slot").unwrap_or_default();

    match (method, path) {
        ("POST", "/start") => reply(store.start(&id, param("game_file").as_deref())),
        ("POST", "/step") => {
            let action = serde_json::from_slice::<Value>(body)
                .ok()
                .and_then(|v| v["action"].as_str().map(str::to_string))
                .unwrap_or_default();
            reply(store.step(&id, &action))
        }
        ("GET", "/reset") => reply(store.reset(&id)),
        ("GET", "/state") => reply(store.state(&id)),
        ("GET", "/valid-actions") => reply(
            store
                .valid_actions(&id)
                .map(|actions| json!({ "valid_actions": actions })),
        ),
        ("POST", "/save") => reply(store.save(&id, &slot)),
        ("POST", "/load") => reply(store.load(&id, &slot)),
        ("POST", "/end") => reply(store.end(&id)),
        ("GET", "/max-score") => reply(store.max_score(&id).map(|m| json!({ "max_score": m }))),
        ("GET", "/game-over") => reply(store.game_over(&id).map(|g| json!({ "game_over": g }))),
        ("GET", "/victory") => reply(store.victory(&id).map(|v| json!({ "victory": v }))),
        ("GET", "/inventory") => reply(store.inventory(&id).map(|i| json!({ "inventory": i }))),
        _ => (404, json!({ "detail": "Not Found" })),
    }
}

fn reply<T: Serialize>(result: Result<T, SessionError>) -> (u16, Value) {
    match result {
        Ok(value) => (200, serde_json::to_value(value).unwrap()),
        Err(e) => (e.status_code(), json!({ "detail": e.to_string() })),
    }
}
