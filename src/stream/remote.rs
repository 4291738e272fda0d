//! Turn stream for a game hosted behind the request/response service.
//!
//! There is no byte stream to frame here: the first pull establishes the
//! session and yields its introduction, every later pull waits the poll delay
//! and yields the current room description.

use std::time::Duration;

use anyhow::{bail, Result};
use tracing::{debug, warn};

use super::{Turn, TurnSource};
use crate::env::remote::{is_connect_failure, GameServiceClient};

/// Polling turn source over a [`GameServiceClient`] session.
#[derive(Debug, Clone)]
pub struct RemoteTurnStream {
    client: GameServiceClient,
    session_id: String,
    game_file: Option<String>,
    started: bool,
    poll_delay: Duration,
    connect_attempts: u32,
    retry_delay: Duration,
}

impl RemoteTurnStream {
    pub fn new(client: GameServiceClient, session_id: &str, game_file: Option<String>) -> Self {
        Self {
            client,
            session_id: session_id.to_string(),
            game_file,
            started: false,
            poll_delay: Duration::from_millis(100),
            connect_attempts: 10,
            retry_delay: Duration::from_secs(2),
        }
    }

    pub fn with_poll_delay(mut self, delay: Duration) -> Self {
        self.poll_delay = delay;
        self
    }

    /// Bound the number of session-establishment attempts and the wait
    /// between them.
    pub fn with_retry(mut self, attempts: u32, delay: Duration) -> Self {
        self.connect_attempts = attempts.max(1);
        self.retry_delay = delay;
        self
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    /// Start the session, retrying while the service is unreachable.
    ///
    /// Only connection-level failures are retried; an HTTP error such as a
    /// duplicate session id is returned immediately.
    async fn start_with_retry(&self) -> Result<String> {
        for attempt in 1..=self.connect_attempts {
            match self
                .client
                .start(&self.session_id, self.game_file.as_deref())
                .await
            {
                Ok(resp) => return Ok(resp.response),
                Err(e) if is_connect_failure(&e) => {
                    warn!(
                        attempt,
                        max_attempts = self.connect_attempts,
                        error = %e,
                        "game service not ready, retrying"
                    );
                    if attempt < self.connect_attempts {
                        tokio::time::sleep(self.retry_delay).await;
                    }
                }
                Err(e) => return Err(e),
            }
        }
        bail!(
            "failed to connect to game service at {} after {} attempts",
            self.client.base_url(),
            self.connect_attempts
        )
    }
}

impl TurnSource for RemoteTurnStream {
    async fn next_turn(&mut self) -> Result<Option<Turn>> {
        if !self.started {
            let intro = self.start_with_retry().await?;
            self.started = true;
            debug!(session = %self.session_id, "remote session started");
            return Ok(Some(Turn::new(intro.trim())));
        }

        tokio::time::sleep(self.poll_delay).await;
        match self.client.state(&self.session_id).await? {
            Some(snapshot) => Ok(Some(Turn::new(snapshot.description.trim()))),
            None => {
                debug!(session = %self.session_id, "remote session gone, ending stream");
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::TestService;

    #[tokio::test]
    async fn surfaces_fatal_error_after_bounded_retries() {
        // Port 9 (discard) on localhost is refused on any sane test host.
        let client = GameServiceClient::new("http://127.0.0.1:9", Duration::from_secs(2));
        let mut stream = RemoteTurnStream::new(client, "player1", None)
            .with_retry(3, Duration::from_millis(1));

        let err = stream.next_turn().await.unwrap_err();
        assert!(err.to_string().contains("after 3 attempts"), "{err:#}");
        assert!(!stream.is_started());
    }

    #[tokio::test]
    async fn retries_until_the_service_comes_up() {
        let addr = crate::testing::unused_addr().await;
        let client = GameServiceClient::new(&format!("http://{addr}"), Duration::from_secs(2));
        let mut stream = RemoteTurnStream::new(client, "p1", None)
            .with_retry(40, Duration::from_millis(50))
            .with_poll_delay(Duration::ZERO);

        let late = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            TestService::spawn_at(addr).await
        });

        let intro = stream.next_turn().await.unwrap().unwrap();
        assert!(intro.as_str().starts_with("GRUE: A Small Underground Adventure"));
        assert!(stream.is_started());

        let service = late.await.unwrap();
        assert_eq!(service.count("POST /start"), 1);
        assert!(service.store().contains("p1"));
    }

    #[tokio::test]
    async fn later_pulls_poll_the_room_description() {
        let service = TestService::spawn().await;
        let client = GameServiceClient::new(&service.base_url(), Duration::from_secs(2));
        let mut stream = RemoteTurnStream::new(client, "p1", None)
            .with_poll_delay(Duration::from_millis(20));

        stream.next_turn().await.unwrap().unwrap();
        service.store().step("p1", "north").unwrap();

        let started = tokio::time::Instant::now();
        let turn = stream.next_turn().await.unwrap().unwrap();
        assert!(started.elapsed() >= Duration::from_millis(20));
        let expected = service.store().state("p1").unwrap().description;
        assert_eq!(turn.as_str(), expected.trim());
        assert!(turn.as_str().starts_with("North of House"));
        assert_eq!(service.count("GET /state"), 1);
    }

    #[tokio::test]
    async fn vanished_session_ends_the_stream() {
        let service = TestService::spawn().await;
        let client = GameServiceClient::new(&service.base_url(), Duration::from_secs(2));
        let mut stream =
            RemoteTurnStream::new(client, "p1", None).with_poll_delay(Duration::ZERO);

        stream.next_turn().await.unwrap().unwrap();
        service.store().end("p1").unwrap();
        assert!(stream.next_turn().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn duplicate_session_is_not_retried() {
        let service = TestService::spawn().await;
        service.store().start("p1", None).unwrap();
        let client = GameServiceClient::new(&service.base_url(), Duration::from_secs(2));
        let mut stream = RemoteTurnStream::new(client, "p1", None)
            .with_retry(5, Duration::from_millis(1));

        let err = stream.next_turn().await.unwrap_err();
        assert!(err.to_string().contains("400"), "{err:#}");
        assert_eq!(service.count("POST /start"), 1);
    }

    #[test]
    fn retry_attempts_are_at_least_one() {
        let client = GameServiceClient::new("http://localhost:8000", Duration::from_secs(1));
        let stream = RemoteTurnStream::new(client, "p", None).with_retry(0, Duration::ZERO);
        assert_eq!(stream.connect_attempts, 1);
    }
}
