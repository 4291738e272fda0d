//! A small deterministic text adventure that runs in-process.
//!
//! Useful for deterministic tests of the episode engine, the policies and the
//! session store without an interpreter binary or a running service. The map
//! is a handful of rooms around a white house; taking the painting in the
//! cellar wins, walking into the cellar without the lamp loses.

use std::collections::BTreeMap;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use super::remote::StateSnapshot;
use super::traits::{Environment, StepOutcome};

// ---------------------------------------------------------------------------
// Map
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Room {
    WestOfHouse,
    NorthOfHouse,
    SouthOfHouse,
    BehindHouse,
    Kitchen,
    Attic,
    LivingRoom,
    Cellar,
}

impl Room {
    pub fn name(&self) -> &'static str {
        match self {
            Self::WestOfHouse => "West of House",
            Self::NorthOfHouse => "North of House",
            Self::SouthOfHouse => "South of House",
            Self::BehindHouse => "Behind House",
            Self::Kitchen => "Kitchen",
            Self::Attic => "Attic",
            Self::LivingRoom => "Living Room",
            Self::Cellar => "Cellar",
        }
    }

    fn description(&self) -> &'static str {
        match self {
            Self::WestOfHouse => "You are standing in an open field west of a white house, with a boarded front door.",
            Self::NorthOfHouse => "You are facing the north side of a white house. There is no door here.",
            Self::SouthOfHouse => "You are facing the south side of a white house. All the windows are boarded.",
            Self::BehindHouse => "You are behind the white house. In one corner of the house there is a small window which is slightly ajar.",
            Self::Kitchen => "You are in the kitchen of the white house. A passage leads west and a dark staircase leads up.",
            Self::Attic => "This is the attic. The only exit is a stairway leading down.",
            Self::LivingRoom => "You are in the living room. There is a trap door in the floor.",
            Self::Cellar => "You are in a dark and damp cellar.",
        }
    }

    fn exits(&self) -> &'static [(Direction, Room)] {
        use Direction::*;
        match self {
            Self::WestOfHouse => &[(North, Room::NorthOfHouse), (South, Room::SouthOfHouse)],
            Self::NorthOfHouse => &[(West, Room::WestOfHouse), (East, Room::BehindHouse)],
            Self::SouthOfHouse => &[(West, Room::WestOfHouse), (East, Room::BehindHouse)],
            Self::BehindHouse => &[
                (North, Room::NorthOfHouse),
                (South, Room::SouthOfHouse),
                (West, Room::Kitchen),
            ],
            Self::Kitchen => &[(East, Room::BehindHouse), (Up, Room::Attic), (West, Room::LivingRoom)],
            Self::Attic => &[(Down, Room::Kitchen)],
            Self::LivingRoom => &[(East, Room::Kitchen), (Down, Room::Cellar)],
            Self::Cellar => &[(Up, Room::LivingRoom)],
        }
    }

    fn exit(&self, dir: Direction) -> Option<Room> {
        self.exits().iter().find(|(d, _)| *d == dir).map(|(_, r)| *r)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    North,
    South,
    East,
    West,
    Up,
    Down,
}

impl Direction {
    fn parse(word: &str) -> Option<Self> {
        match word {
            "n" | "north" => Some(Self::North),
            "s" | "south" => Some(Self::South),
            "e" | "east" => Some(Self::East),
            "w" | "west" => Some(Self::West),
            "u" | "up" => Some(Self::Up),
            "d" | "down" => Some(Self::Down),
            _ => None,
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            Self::North => "north",
            Self::South => "south",
            Self::East => "east",
            Self::West => "west",
            Self::Up => "up",
            Self::Down => "down",
        }
    }
}

/// Points awarded the first time an item is taken.
fn item_value(item: &str) -> i64 {
    match item {
        "egg" => 5,
        "painting" => 10,
        _ => 0,
    }
}

fn initial_items() -> BTreeMap<Room, Vec<String>> {
    let mut items = BTreeMap::new();
    items.insert(Room::WestOfHouse, vec!["leaflet".to_string()]);
    items.insert(Room::NorthOfHouse, vec!["egg".to_string()]);
    items.insert(Room::Kitchen, vec!["lamp".to_string()]);
    items.insert(Room::Attic, vec!["rope".to_string()]);
    items.insert(Room::Cellar, vec!["painting".to_string()]);
    items
}

const INTRO: &str = "GRUE: A Small Underground Adventure\nRevision 1";

// ---------------------------------------------------------------------------
// Game
// ---------------------------------------------------------------------------

/// The full mutable game state. Serialised as-is for save slots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct GameState {
    room: Room,
    items: BTreeMap<Room, Vec<String>>,
    inventory: Vec<String>,
    scored: Vec<String>,
    score: i64,
    moves: u32,
    done: bool,
}

impl GameState {
    fn new() -> Self {
        Self {
            room: Room::WestOfHouse,
            items: initial_items(),
            inventory: Vec::new(),
            scored: Vec::new(),
            score: 0,
            moves: 0,
            done: false,
        }
    }
}

/// The scripted adventure.
#[derive(Debug, Clone)]
pub struct ScriptedGame {
    state: GameState,
    closed: bool,
}

impl ScriptedGame {
    /// Every scoring item taken.
    pub const MAX_SCORE: i64 = 15;

    pub fn new() -> Self {
        Self {
            state: GameState::new(),
            closed: false,
        }
    }

    /// Restart from the opening position and return the introduction.
    pub fn reset(&mut self) -> String {
        self.state = GameState::new();
        self.closed = false;
        format!("{INTRO}\n\n{}", self.describe())
    }

    pub fn room(&self) -> Room {
        self.state.room
    }

    pub fn current_score(&self) -> i64 {
        self.state.score
    }

    pub fn moves(&self) -> u32 {
        self.state.moves
    }

    pub fn is_over(&self) -> bool {
        self.state.done
    }

    /// Over because the painting was recovered, not because of a grue.
    pub fn is_victory(&self) -> bool {
        self.state.done && self.state.inventory.iter().any(|i| i == "painting")
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Refuse further commands until the next reset.
    pub fn mark_closed(&mut self) {
        self.closed = true;
    }

    pub fn inventory(&self) -> &[String] {
        &self.state.inventory
    }

    /// Room name, description and visible items.
    pub fn describe(&self) -> String {
        let room = self.state.room;
        let mut text = format!("{}\n{}", room.name(), room.description());
        if let Some(items) = self.state.items.get(&room) {
            for item in items {
                text.push_str(&format!("\nThere is a {item} here."));
            }
        }
        text
    }

    /// Apply one command.
    pub fn apply(&mut self, action: &str) -> StepOutcome {
        let command = action.trim().to_lowercase();
        if self.state.done {
            return self.outcome("The game is over. Type RESTART to play again.".into());
        }
        self.state.moves += 1;

        let words: Vec<&str> = command.split_whitespace().collect();
        let narration = match words.as_slice() {
            [] => "I beg your pardon?".to_string(),
            ["look"] | ["l"] => self.describe(),
            ["inventory"] | ["i"] => self.inventory_text(),
            ["score"] => format!(
                "Your score is {} points, in {} moves.",
                self.state.score, self.state.moves
            ),
            ["go", dir] => self.walk(dir),
            [dir] if Direction::parse(dir).is_some() => self.walk(dir),
            ["take" | "get", item] => self.take(item),
            ["drop", item] => self.drop_item(item),
            _ => "I don't know how to do that.".to_string(),
        };
        self.outcome(narration)
    }

    /// Commands that would do something useful right now.
    pub fn available_actions(&self) -> Vec<String> {
        let room = self.state.room;
        let mut actions: Vec<String> = room
            .exits()
            .iter()
            .map(|(d, _)| d.as_str().to_string())
            .collect();
        if let Some(items) = self.state.items.get(&room) {
            actions.extend(items.iter().map(|item| format!("take {item}")));
        }
        actions.extend(self.state.inventory.iter().map(|item| format!("drop {item}")));
        actions.push("look".into());
        actions.push("inventory".into());
        actions
    }

    pub fn snapshot(&self) -> StateSnapshot {
        StateSnapshot {
            score: self.state.score,
            moves: self.state.moves,
            location: format!("{:?}", self.state.room),
            inventory: self.state.inventory.clone(),
            description: self.describe(),
        }
    }

    /// Serialise the whole game into an opaque blob.
    pub fn save_blob(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(&self.state).context("failed to serialise game state")
    }

    /// Restore a blob produced by [`ScriptedGame::save_blob`].
    pub fn load_blob(&mut self, blob: &[u8]) -> Result<()> {
        self.state = serde_json::from_slice(blob).context("failed to restore game state")?;
        Ok(())
    }

    fn outcome(&self, narration: String) -> StepOutcome {
        StepOutcome {
            narration,
            done: self.state.done,
            score: Some(self.state.score),
            moves: Some(self.state.moves),
        }
    }

    fn walk(&mut self, word: &str) -> String {
        let Some(dir) = Direction::parse(word) else {
            return "I don't know which way that is.".into();
        };
        let Some(next) = self.state.room.exit(dir) else {
            return "You can't go that way.".into();
        };
        self.state.room = next;

        if next == Room::Cellar && !self.state.inventory.iter().any(|i| i == "lamp") {
            self.state.done = true;
            return "It is pitch black. You are likely to be eaten by a grue.\n\
                    Oh, no! You have walked into the slavering fangs of a lurking grue!\n\
                    ****  You have died  ****"
                .into();
        }
        self.describe()
    }

    fn take(&mut self, item: &str) -> String {
        let room = self.state.room;
        let here = self.state.items.entry(room).or_default();
        let Some(pos) = here.iter().position(|i| i == item) else {
            return format!("You can't see any {item} here!");
        };
        let item = here.remove(pos);

        let mut text = "Taken.".to_string();
        let value = item_value(&item);
        if value > 0 && !self.state.scored.contains(&item) {
            self.state.score += value;
            self.state.scored.push(item.clone());
            text.push_str(&format!(
                "\n[Your score is now {} points.]",
                self.state.score
            ));
        }
        if item == "painting" {
            self.state.done = true;
            text.push_str("\nYou have recovered the painting. The game is over.");
        }
        self.state.inventory.push(item);
        text
    }

    fn drop_item(&mut self, item: &str) -> String {
        let Some(pos) = self.state.inventory.iter().position(|i| i == item) else {
            return format!("You don't have the {item}.");
        };
        let item = self.state.inventory.remove(pos);
        self.state.items.entry(self.state.room).or_default().push(item);
        "Dropped.".into()
    }

    fn inventory_text(&self) -> String {
        if self.state.inventory.is_empty() {
            return "You are empty-handed.".into();
        }
        let mut text = "You are carrying:".to_string();
        for item in &self.state.inventory {
            text.push_str(&format!("\n  A {item}"));
        }
        text
    }
}

impl Default for ScriptedGame {
    fn default() -> Self {
        Self::new()
    }
}

impl Environment for ScriptedGame {
    async fn start(&mut self) -> Result<Option<String>> {
        Ok(Some(self.reset()))
    }

    async fn step(&mut self, action: &str) -> Result<Option<StepOutcome>> {
        if self.closed {
            bail!("scripted game has been closed");
        }
        Ok(Some(self.apply(action)))
    }

    async fn valid_actions(&mut self) -> Result<Vec<String>> {
        Ok(self.available_actions())
    }

    async fn score(&mut self) -> Result<Option<i64>> {
        Ok(Some(self.state.score))
    }

    async fn max_score(&mut self) -> Result<Option<i64>> {
        Ok(Some(Self::MAX_SCORE))
    }

    async fn close(&mut self) -> Result<()> {
        self.mark_closed();
        Ok(())
    }

    fn label(&self) -> &str {
        "scripted"
    }
}
