//! Games hosted behind the session service.
//!
//! The service keeps one interpreter per session id and exposes it over HTTP:
//!
//! - `POST {base}/start?session_id=..&game_file=..` -- `{"session_id", "response"}`
//! - `POST {base}/step?session_id=..` body `{"action"}` -- `{"response", "reward", "score", "moves", "done"}`
//! - `GET  {base}/reset?session_id=..` -- `{"response", "score", "moves"}`
//! - `GET  {base}/state?session_id=..` -- [`StateSnapshot`]
//! - `GET  {base}/valid-actions?session_id=..` -- `{"valid_actions"}`
//! - `POST {base}/save?session_id=..&slot=..`, `POST {base}/load?...`
//! - `POST {base}/end?session_id=..`
//! - `GET  {base}/max-score`, `/game-over`, `/victory`, `/inventory` (all `?session_id=..`)
//!
//! Unknown session ids answer 404; starting an existing id answers 400.

use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::{RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::traits::{Environment, StepOutcome};
use crate::config::RemoteConfig;
use crate::stream::{RemoteTurnStream, TurnSource};

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartResponse {
    pub session_id: String,
    pub response: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepResponse {
    pub response: String,
    #[serde(default)]
    pub reward: f64,
    #[serde(default)]
    pub score: i64,
    #[serde(default)]
    pub moves: u32,
    #[serde(default)]
    pub done: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResetResponse {
    pub response: String,
    #[serde(default)]
    pub score: i64,
    #[serde(default)]
    pub moves: u32,
}

/// Point-in-time view of a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateSnapshot {
    pub score: i64,
    pub moves: u32,
    /// Opaque hash identifying the current world state.
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub inventory: Vec<String>,
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidActionsResponse {
    pub valid_actions: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaxScoreResponse {
    #[serde(default)]
    pub max_score: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameOverResponse {
    pub game_over: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VictoryResponse {
    pub victory: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InventoryResponse {
    pub inventory: Vec<String>,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// HTTP client for the session service.
#[derive(Debug, Clone)]
pub struct GameServiceClient {
    base_url: String,
    http: reqwest::Client,
}

impl GameServiceClient {
    pub fn new(base_url: &str, timeout: Duration) -> Self {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{path}", self.base_url)
    }

    pub async fn start(&self, session_id: &str, game_file: Option<&str>) -> Result<StartResponse> {
        let mut req = self
            .http
            .post(self.url("start"))
            .query(&[("session_id", session_id)]);
        if let Some(game_file) = game_file {
            req = req.query(&[("game_file", game_file)]);
        }
        send_json(req, "start").await
    }

    pub async fn step(&self, session_id: &str, action: &str) -> Result<StepResponse> {
        let req = self
            .http
            .post(self.url("step"))
            .query(&[("session_id", session_id)])
            .json(&serde_json::json!({ "action": action }));
        send_json(req, "step").await
    }

    pub async fn reset(&self, session_id: &str) -> Result<ResetResponse> {
        let req = self
            .http
            .get(self.url("reset"))
            .query(&[("session_id", session_id)]);
        send_json(req, "reset").await
    }

    /// Current snapshot, or `None` when the session does not exist.
    pub async fn state(&self, session_id: &str) -> Result<Option<StateSnapshot>> {
        let resp = self
            .http
            .get(self.url("state"))
            .query(&[("session_id", session_id)])
            .send()
            .await
            .context("failed to reach game service on state")?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        parse_json(resp, "state").await.map(Some)
    }

    pub async fn valid_actions(&self, session_id: &str) -> Result<Vec<String>> {
        let req = self
            .http
            .get(self.url("valid-actions"))
            .query(&[("session_id", session_id)]);
        let resp: ValidActionsResponse = send_json(req, "valid-actions").await?;
        Ok(resp.valid_actions)
    }

    pub async fn save(&self, session_id: &str, slot: &str) -> Result<String> {
        let req = self
            .http
            .post(self.url("save"))
            .query(&[("session_id", session_id), ("slot", slot)]);
        let resp: MessageResponse = send_json(req, "save").await?;
        Ok(resp.message)
    }

    pub async fn load(&self, session_id: &str, slot: &str) -> Result<String> {
        let req = self
            .http
            .post(self.url("load"))
            .query(&[("session_id", session_id), ("slot", slot)]);
        let resp: MessageResponse = send_json(req, "load").await?;
        Ok(resp.message)
    }

    pub async fn max_score(&self, session_id: &str) -> Result<Option<i64>> {
        let req = self.metadata("max-score", session_id);
        let resp: MaxScoreResponse = send_json(req, "max-score").await?;
        Ok(resp.max_score)
    }

    pub async fn game_over(&self, session_id: &str) -> Result<bool> {
        let req = self.metadata("game-over", session_id);
        let resp: GameOverResponse = send_json(req, "game-over").await?;
        Ok(resp.game_over)
    }

    pub async fn victory(&self, session_id: &str) -> Result<bool> {
        let req = self.metadata("victory", session_id);
        let resp: VictoryResponse = send_json(req, "victory").await?;
        Ok(resp.victory)
    }

    pub async fn inventory(&self, session_id: &str) -> Result<Vec<String>> {
        let req = self.metadata("inventory", session_id);
        let resp: InventoryResponse = send_json(req, "inventory").await?;
        Ok(resp.inventory)
    }

    fn metadata(&self, path: &str, session_id: &str) -> RequestBuilder {
        self.http
            .get(self.url(path))
            .query(&[("session_id", session_id)])
    }

    pub async fn end(&self, session_id: &str) -> Result<()> {
        let req = self
            .http
            .post(self.url("end"))
            .query(&[("session_id", session_id)]);
        let _: MessageResponse = send_json(req, "end").await?;
        Ok(())
    }
}

async fn send_json<T: DeserializeOwned>(req: RequestBuilder, endpoint: &str) -> Result<T> {
    let resp = req
        .send()
        .await
        .with_context(|| format!("failed to reach game service on {endpoint}"))?;
    parse_json(resp, endpoint).await
}

async fn parse_json<T: DeserializeOwned>(resp: reqwest::Response, endpoint: &str) -> Result<T> {
    let status = resp.status();
    if !status.is_success() {
        let text = resp.text().await.unwrap_or_default();
        anyhow::bail!("game service {endpoint} returned {status}: {text}");
    }
    resp.json()
        .await
        .with_context(|| format!("failed to parse game service {endpoint} response"))
}

/// Whether an error (anywhere in its chain) is a connection-level failure
/// worth retrying.
pub fn is_connect_failure(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        cause
            .downcast_ref::<reqwest::Error>()
            .is_some_and(|e| e.is_connect() || e.is_timeout())
    })
}

// ---------------------------------------------------------------------------
// Environment
// ---------------------------------------------------------------------------

/// An [`Environment`] backed by one session on the session service.
#[derive(Debug)]
pub struct RemoteEnv {
    client: GameServiceClient,
    turns: RemoteTurnStream,
    session_id: String,
    snapshot_after_step: bool,
    closed: bool,
}

impl RemoteEnv {
    pub fn new(config: &RemoteConfig) -> Self {
        let session_id = config
            .session_id
            .clone()
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let client =
            GameServiceClient::new(&config.base_url, Duration::from_secs(config.timeout_secs));
        let turns = RemoteTurnStream::new(client.clone(), &session_id, config.game_file.clone())
            .with_poll_delay(Duration::from_millis(config.poll_delay_ms))
            .with_retry(
                config.connect_attempts,
                Duration::from_millis(config.retry_delay_ms),
            );

        Self {
            client,
            turns,
            session_id,
            snapshot_after_step: config.snapshot_after_step,
            closed: false,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }
}

impl Environment for RemoteEnv {
    async fn start(&mut self) -> Result<Option<String>> {
        Ok(self.turns.next_turn().await?.map(|t| t.into_string()))
    }

    async fn step(&mut self, action: &str) -> Result<Option<StepOutcome>> {
        let resp = self.client.step(&self.session_id, action).await?;
        let mut narration = resp.response.trim().to_string();

        if self.snapshot_after_step && !resp.done {
            match self.turns.next_turn().await? {
                Some(snapshot) => {
                    narration = format!("{}\n\n{}", snapshot.as_str(), narration);
                }
                None => return Ok(None),
            }
        }

        debug!(session = %self.session_id, score = resp.score, moves = resp.moves, done = resp.done, "remote step");

        Ok(Some(StepOutcome {
            narration,
            done: resp.done,
            score: Some(resp.score),
            moves: Some(resp.moves),
        }))
    }

    async fn valid_actions(&mut self) -> Result<Vec<String>> {
        self.client.valid_actions(&self.session_id).await
    }

    async fn score(&mut self) -> Result<Option<i64>> {
        Ok(self
            .client
            .state(&self.session_id)
            .await?
            .map(|snapshot| snapshot.score))
    }

    async fn max_score(&mut self) -> Result<Option<i64>> {
        self.client.max_score(&self.session_id).await
    }

    async fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        if !self.turns.is_started() {
            return Ok(());
        }
        self.client
            .end(&self.session_id)
            .await
            .context("failed to end remote session")
    }

    fn label(&self) -> &str {
        "remote"
    }
}
