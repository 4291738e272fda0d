//! Live game sessions keyed by identifier.
//!
//! [`SessionStore`] is the state behind a request/response boundary such as
//! the session service: each identifier owns at most one live game, and
//! every operation names the session it targets. The store is an ordinary
//! object created at startup and torn down with [`SessionStore::shutdown`].

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use anyhow::bail;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::env::remote::{MessageResponse, ResetResponse, StartResponse, StepResponse};
use crate::env::{ScriptedGame, StateSnapshot, StepOutcome};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Session '{0}' not found")]
    NotFound(String),

    #[error("Session '{0}' already exists")]
    AlreadyExists(String),

    #[error("Slot '{slot}' not found for session '{session}'")]
    SlotNotFound { session: String, slot: String },

    #[error("Game error: {0}")]
    Backend(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl SessionError {
    /// HTTP status a boundary layer should answer with.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::NotFound(_) | Self::SlotNotFound { .. } => 404,
            Self::AlreadyExists(_) => 400,
            Self::Backend(_) => 502,
            Self::Internal(_) => 500,
        }
    }
}

fn backend(err: anyhow::Error) -> SessionError {
    SessionError::Backend(format!("{err:#}"))
}

fn poisoned<T>(_: T) -> SessionError {
    SessionError::Internal("session lock poisoned".into())
}

pub type SessionResult<T> = std::result::Result<T, SessionError>;

// ---------------------------------------------------------------------------
// Game handles
// ---------------------------------------------------------------------------

/// A synchronous, exclusively owned game instance.
pub trait GameHandle: Send {
    /// Restart the game and return its opening narration.
    fn reset(&mut self) -> anyhow::Result<String>;
    fn step(&mut self, action: &str) -> anyhow::Result<StepOutcome>;
    fn snapshot(&mut self) -> anyhow::Result<StateSnapshot>;
    fn valid_actions(&mut self) -> anyhow::Result<Vec<String>>;
    /// Opaque blob; only [`GameHandle::load_state`] interprets it.
    fn save_state(&self) -> anyhow::Result<Vec<u8>>;
    fn load_state(&mut self, blob: &[u8]) -> anyhow::Result<()>;
    /// Highest attainable score, when the game knows it.
    fn max_score(&self) -> Option<i64> {
        None
    }
    fn game_over(&self) -> bool;
    fn victory(&self) -> bool {
        false
    }
    fn close(&mut self);
}

/// Builds game handles for new sessions.
pub trait GameFactory: Send + Sync {
    type Handle: GameHandle;

    fn create(&self, game_file: Option<&str>) -> anyhow::Result<Self::Handle>;
}

impl GameHandle for ScriptedGame {
    fn reset(&mut self) -> anyhow::Result<String> {
        Ok(ScriptedGame::reset(self))
    }

    fn step(&mut self, action: &str) -> anyhow::Result<StepOutcome> {
        if self.is_closed() {
            bail!("scripted game has been closed");
        }
        Ok(self.apply(action))
    }

    fn snapshot(&mut self) -> anyhow::Result<StateSnapshot> {
        Ok(ScriptedGame::snapshot(self))
    }

    fn valid_actions(&mut self) -> anyhow::Result<Vec<String>> {
        Ok(self.available_actions())
    }

    fn save_state(&self) -> anyhow::Result<Vec<u8>> {
        self.save_blob()
    }

    fn load_state(&mut self, blob: &[u8]) -> anyhow::Result<()> {
        self.load_blob(blob)
    }

    fn max_score(&self) -> Option<i64> {
        Some(ScriptedGame::MAX_SCORE)
    }

    fn game_over(&self) -> bool {
        self.is_over()
    }

    fn victory(&self) -> bool {
        self.is_victory()
    }

    fn close(&mut self) {
        self.mark_closed();
    }
}

/// Serves the built-in scripted adventure.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScriptedGameFactory;

impl ScriptedGameFactory {
    pub const GAME_NAME: &'static str = "scripted";
}

impl GameFactory for ScriptedGameFactory {
    type Handle = ScriptedGame;

    fn create(&self, game_file: Option<&str>) -> anyhow::Result<ScriptedGame> {
        match game_file {
            None | Some(Self::GAME_NAME) => Ok(ScriptedGame::new()),
            Some(other) => bail!("unknown game file '{other}'"),
        }
    }
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

struct Session<H> {
    handle: H,
    /// Outcome of the most recent step, if any.
    last_info: Option<StepOutcome>,
    last_score: i64,
}

type SharedSession<H> = Arc<Mutex<Session<H>>>;

/// Identifier-keyed live sessions plus their save slots.
///
/// Start and end take the map's write lock, so they are atomic with respect
/// to each other. Every other operation clones the session's `Arc` under the
/// read lock and then works under that session's own mutex. Save slots are
/// keyed by (session, slot) and outlive the session that wrote them.
pub struct SessionStore<F: GameFactory> {
    factory: F,
    sessions: RwLock<HashMap<String, SharedSession<F::Handle>>>,
    slots: RwLock<HashMap<(String, String), Vec<u8>>>,
}

impl<F: GameFactory> SessionStore<F> {
    pub fn new(factory: F) -> Self {
        Self {
            factory,
            sessions: RwLock::new(HashMap::new()),
            slots: RwLock::new(HashMap::new()),
        }
    }

    fn session(&self, id: &str) -> SessionResult<SharedSession<F::Handle>> {
        self.sessions
            .read()
            .map_err(poisoned)?
            .get(id)
            .cloned()
            .ok_or_else(|| SessionError::NotFound(id.to_string()))
    }

    /// Start a session. An existing id is a conflict and is left untouched.
    pub fn start(&self, id: &str, game_file: Option<&str>) -> SessionResult<StartResponse> {
        let mut sessions = self.sessions.write().map_err(poisoned)?;
        if sessions.contains_key(id) {
            return Err(SessionError::AlreadyExists(id.to_string()));
        }

        let mut handle = self.factory.create(game_file).map_err(backend)?;
        let response = handle.reset().map_err(backend)?;
        let session = Session {
            handle,
            last_info: None,
            last_score: 0,
        };
        sessions.insert(id.to_string(), Arc::new(Mutex::new(session)));
        info!(session = id, "session started");

        Ok(StartResponse {
            session_id: id.to_string(),
            response,
        })
    }

    pub fn step(&self, id: &str, action: &str) -> SessionResult<StepResponse> {
        let session = self.session(id)?;
        let mut session = session.lock().map_err(poisoned)?;
        let outcome = session.handle.step(action).map_err(backend)?;

        let score = outcome.score.unwrap_or(session.last_score);
        let reward = score.saturating_sub(session.last_score) as f64;
        session.last_score = score;
        debug!(session = id, action, score, done = outcome.done, "session step");

        let response = StepResponse {
            response: outcome.narration.clone(),
            reward,
            score,
            moves: outcome.moves.unwrap_or_default(),
            done: outcome.done,
        };
        session.last_info = Some(outcome);
        Ok(response)
    }

    pub fn reset(&self, id: &str) -> SessionResult<ResetResponse> {
        let session = self.session(id)?;
        let mut session = session.lock().map_err(poisoned)?;
        let response = session.handle.reset().map_err(backend)?;
        let snapshot = session.handle.snapshot().map_err(backend)?;
        session.last_info = None;
        session.last_score = snapshot.score;
        Ok(ResetResponse {
            response,
            score: snapshot.score,
            moves: snapshot.moves,
        })
    }

    pub fn state(&self, id: &str) -> SessionResult<StateSnapshot> {
        let session = self.session(id)?;
        let mut session = session.lock().map_err(poisoned)?;
        session.handle.snapshot().map_err(backend)
    }

    pub fn valid_actions(&self, id: &str) -> SessionResult<Vec<String>> {
        let session = self.session(id)?;
        let mut session = session.lock().map_err(poisoned)?;
        session.handle.valid_actions().map_err(backend)
    }

    pub fn max_score(&self, id: &str) -> SessionResult<Option<i64>> {
        let session = self.session(id)?;
        let session = session.lock().map_err(poisoned)?;
        Ok(session.handle.max_score())
    }

    pub fn game_over(&self, id: &str) -> SessionResult<bool> {
        let session = self.session(id)?;
        let session = session.lock().map_err(poisoned)?;
        Ok(session.handle.game_over())
    }

    pub fn victory(&self, id: &str) -> SessionResult<bool> {
        let session = self.session(id)?;
        let session = session.lock().map_err(poisoned)?;
        Ok(session.handle.victory())
    }

    pub fn inventory(&self, id: &str) -> SessionResult<Vec<String>> {
        Ok(self.state(id)?.inventory)
    }

    /// The outcome of the session's latest step.
    pub fn last_info(&self, id: &str) -> SessionResult<Option<StepOutcome>> {
        let session = self.session(id)?;
        let session = session.lock().map_err(poisoned)?;
        Ok(session.last_info.clone())
    }

    pub fn save(&self, id: &str, slot: &str) -> SessionResult<MessageResponse> {
        let session = self.session(id)?;
        let blob = {
            let session = session.lock().map_err(poisoned)?;
            session.handle.save_state().map_err(backend)?
        };
        self.slots
            .write()
            .map_err(poisoned)?
            .insert((id.to_string(), slot.to_string()), blob);
        Ok(MessageResponse {
            message: format!("Saved '{id}' to slot '{slot}'"),
        })
    }

    pub fn load(&self, id: &str, slot: &str) -> SessionResult<MessageResponse> {
        let session = self.session(id)?;
        let blob = self
            .slots
            .read()
            .map_err(poisoned)?
            .get(&(id.to_string(), slot.to_string()))
            .cloned()
            .ok_or_else(|| SessionError::SlotNotFound {
                session: id.to_string(),
                slot: slot.to_string(),
            })?;

        let mut session = session.lock().map_err(poisoned)?;
        session.handle.load_state(&blob).map_err(backend)?;
        session.last_score = session.handle.snapshot().map_err(backend)?.score;
        Ok(MessageResponse {
            message: format!("Loaded slot '{slot}' for '{id}'"),
        })
    }

    /// Release a session. Ending an unknown id succeeds and does nothing.
    pub fn end(&self, id: &str) -> SessionResult<MessageResponse> {
        let removed = self.sessions.write().map_err(poisoned)?.remove(id);
        match removed {
            Some(session) => {
                session.lock().map_err(poisoned)?.handle.close();
                info!(session = id, "session ended");
            }
            None => debug!(session = id, "end for unknown session ignored"),
        }
        Ok(MessageResponse {
            message: format!("Session '{id}' ended"),
        })
    }

    pub fn contains(&self, id: &str) -> bool {
        self.sessions
            .read()
            .map(|s| s.contains_key(id))
            .unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.sessions.read().map(|s| s.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Close every live session.
    pub fn shutdown(&self) {
        let drained: Vec<(String, SharedSession<F::Handle>)> = match self.sessions.write() {
            Ok(mut sessions) => sessions.drain().collect(),
            Err(_) => {
                warn!("session map poisoned during shutdown");
                return;
            }
        };
        for (id, session) in drained {
            match session.lock() {
                Ok(mut session) => session.handle.close(),
                Err(_) => warn!(session = %id, "session lock poisoned during shutdown"),
            }
        }
        info!("session store shut down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> SessionStore<ScriptedGameFactory> {
        SessionStore::new(ScriptedGameFactory)
    }

    #[test]
    fn start_step_and_state() {
        let store = store();
        let started = store.start("p1", None).unwrap();
        assert_eq!(started.session_id, "p1");
        assert!(started.response.contains("West of House"));

        store.step("p1", "north").unwrap();
        let step = store.step("p1", "take egg").unwrap();
        assert_eq!(step.score, 5);
        assert_eq!(step.reward, 5.0);
        assert_eq!(step.moves, 2);

        let state = store.state("p1").unwrap();
        assert_eq!(state.inventory, vec!["egg"]);
        assert_eq!(store.last_info("p1").unwrap().unwrap().score, Some(5));
    }

    #[test]
    fn duplicate_start_conflicts_without_touching_session() {
        let store = store();
        store.start("p1", None).unwrap();
        store.step("p1", "north").unwrap();

        let err = store.start("p1", None).unwrap_err();
        assert!(matches!(err, SessionError::AlreadyExists(_)));
        assert_eq!(err.status_code(), 400);

        // The live session kept its progress.
        assert_eq!(store.state("p1").unwrap().moves, 1);
    }

    #[test]
    fn ending_absent_session_is_a_no_op() {
        let store = store();
        let msg = store.end("ghost").unwrap();
        assert!(msg.message.contains("ghost"));
        assert!(store.is_empty());
    }

    #[test]
    fn unknown_session_is_not_found() {
        let store = store();
        let err = store.step("ghost", "look").unwrap_err();
        assert!(matches!(err, SessionError::NotFound(_)));
        assert_eq!(err.status_code(), 404);
        assert!(store.state("ghost").is_err());
        assert!(store.reset("ghost").is_err());
        assert!(store.valid_actions("ghost").is_err());
        assert!(store.save("ghost", "a").is_err());
    }

    #[test]
    fn save_and_load_slots() {
        let store = store();
        store.start("p1", None).unwrap();
        store.step("p1", "north").unwrap();
        store.save("p1", "a").unwrap();
        store.step("p1", "east").unwrap();

        store.load("p1", "a").unwrap();
        assert_eq!(store.state("p1").unwrap().location, "NorthOfHouse");

        let err = store.load("p1", "missing").unwrap_err();
        assert!(matches!(err, SessionError::SlotNotFound { .. }));
        assert_eq!(err.status_code(), 404);
    }

    #[test]
    fn slots_survive_end_and_restart() {
        let store = store();
        store.start("p1", None).unwrap();
        store.step("p1", "north").unwrap();
        store.save("p1", "a").unwrap();
        store.end("p1").unwrap();
        assert!(!store.contains("p1"));

        store.start("p1", None).unwrap();
        store.load("p1", "a").unwrap();
        assert_eq!(store.state("p1").unwrap().location, "NorthOfHouse");
    }

    #[test]
    fn reset_restores_opening() {
        let store = store();
        store.start("p1", None).unwrap();
        store.step("p1", "north").unwrap();
        let reset = store.reset("p1").unwrap();
        assert!(reset.response.contains("West of House"));
        assert_eq!(reset.moves, 0);
        assert!(store.last_info("p1").unwrap().is_none());
    }

    #[test]
    fn unknown_game_file_is_a_backend_error() {
        let store = store();
        let err = store.start("p1", Some("zork9.z5")).unwrap_err();
        assert!(matches!(err, SessionError::Backend(_)));
        assert_eq!(err.status_code(), 502);
        assert!(!store.contains("p1"));
    }

    #[test]
    fn concurrent_starts_admit_exactly_one() {
        let store = store();
        let results: Vec<bool> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| scope.spawn(|| store.start("shared", None).is_ok()))
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });
        assert_eq!(results.iter().filter(|ok| **ok).count(), 1);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn metadata_reports_progress_and_victory() {
        let store = store();
        store.start("p1", None).unwrap();
        assert_eq!(store.max_score("p1").unwrap(), Some(15));
        assert!(!store.game_over("p1").unwrap());
        for action in [
            "north", "take egg", "east", "west", "take lamp", "west", "down", "take painting",
        ] {
            store.step("p1", action).unwrap();
        }
        assert!(store.game_over("p1").unwrap());
        assert!(store.victory("p1").unwrap());
        assert_eq!(store.inventory("p1").unwrap(), vec!["egg", "lamp", "painting"]);
        assert!(matches!(
            store.max_score("ghost").unwrap_err(),
            SessionError::NotFound(_)
        ));
    }

    #[test]
    fn closed_handle_rejects_steps() {
        let mut game = ScriptedGame::new();
        GameHandle::reset(&mut game).unwrap();
        GameHandle::close(&mut game);
        assert!(game.is_closed());
        assert!(GameHandle::step(&mut game, "look").is_err());
    }

    /// Reports whatever score it is told to, however extreme.
    struct SwingingScores {
        scores: Vec<i64>,
        moves: u32,
    }

    impl GameHandle for SwingingScores {
        fn reset(&mut self) -> anyhow::Result<String> {
            Ok("Intro".into())
        }

        fn step(&mut self, _action: &str) -> anyhow::Result<StepOutcome> {
            let score = self.scores.remove(0);
            self.moves += 1;
            Ok(StepOutcome {
                narration: format!("{score} points"),
                done: false,
                score: Some(score),
                moves: Some(self.moves),
            })
        }

        fn snapshot(&mut self) -> anyhow::Result<StateSnapshot> {
            Ok(StateSnapshot {
                score: 0,
                moves: self.moves,
                location: String::new(),
                inventory: Vec::new(),
                description: "Nowhere".into(),
            })
        }

        fn valid_actions(&mut self) -> anyhow::Result<Vec<String>> {
            Ok(Vec::new())
        }

        fn save_state(&self) -> anyhow::Result<Vec<u8>> {
            Ok(Vec::new())
        }

        fn load_state(&mut self, _blob: &[u8]) -> anyhow::Result<()> {
            Ok(())
        }

        fn game_over(&self) -> bool {
            false
        }

        fn close(&mut self) {}
    }

    struct SwingingFactory;

    impl GameFactory for SwingingFactory {
        type Handle = SwingingScores;

        fn create(&self, _game_file: Option<&str>) -> anyhow::Result<SwingingScores> {
            Ok(SwingingScores {
                scores: vec![i64::MIN, i64::MAX],
                moves: 0,
            })
        }
    }

    #[test]
    fn extreme_score_swings_saturate() {
        let store = SessionStore::new(SwingingFactory);
        store.start("p1", None).unwrap();
        assert_eq!(store.step("p1", "a").unwrap().reward, i64::MIN as f64);
        assert_eq!(store.step("p1", "b").unwrap().reward, i64::MAX as f64);
        assert_eq!(store.max_score("p1").unwrap(), None);
        assert!(!store.victory("p1").unwrap());
    }

    #[test]
    fn shutdown_drains_sessions() {
        let store = store();
        store.start("a", None).unwrap();
        store.start("b", None).unwrap();
        store.shutdown();
        assert!(store.is_empty());
    }
}
