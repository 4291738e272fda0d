//! Loop avoidance between REASON and ACT.

use std::collections::{HashSet, VecDeque};

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use tracing::info;

/// Exploration moves substituted when a loop is detected.
pub const EXPLORATION_ACTIONS: [&str; 5] = ["north", "south", "east", "west", "look"];

type Pair = (String, String);

/// Sliding window of (observation, action) pairs.
///
/// Once the window is full, every call compares the whole window against all
/// windows recorded so far. A repeat replaces the proposed action with a
/// random exploration move; the fallback may itself land in a known loop and
/// that is not corrected.
#[derive(Debug)]
pub struct WindowGuard {
    size: usize,
    recent: VecDeque<Pair>,
    signatures: HashSet<Vec<Pair>>,
    rng: StdRng,
}

impl WindowGuard {
    pub fn new(size: usize) -> Self {
        Self::with_rng(size, StdRng::from_entropy())
    }

    pub fn seeded(size: usize, seed: u64) -> Self {
        Self::with_rng(size, StdRng::seed_from_u64(seed))
    }

    fn with_rng(size: usize, rng: StdRng) -> Self {
        let size = size.max(1);
        Self {
            size,
            recent: VecDeque::with_capacity(size),
            signatures: HashSet::new(),
            rng,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn guard(&mut self, obs: &str, proposed: &str) -> String {
        if self.recent.len() == self.size {
            self.recent.pop_front();
        }
        self.recent.push_back((obs.to_string(), proposed.to_string()));

        if self.recent.len() < self.size {
            return proposed.to_string();
        }

        let signature: Vec<Pair> = self.recent.iter().cloned().collect();
        if self.signatures.contains(&signature) {
            let fallback = EXPLORATION_ACTIONS
                .choose(&mut self.rng)
                .copied()
                .unwrap_or("look");
            info!(proposed, fallback, "loop detected, overriding action");
            return fallback.to_string();
        }
        self.signatures.insert(signature);
        proposed.to_string()
    }
}

#[derive(Debug)]
pub enum AnyLoopGuard {
    Off,
    Window(WindowGuard),
}

impl AnyLoopGuard {
    pub fn guard(&mut self, obs: &str, proposed: &str) -> String {
        match self {
            Self::Off => proposed.to_string(),
            Self::Window(g) => g.guard(obs, proposed),
        }
    }
}
