use std::io;
use std::path::PathBuf;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::warn;
use unoroom_protocol::{Card, Direction, MatchStatus, MatchSummary};
use uuid::Uuid;

use crate::error::StoreError;
use crate::game::MatchState;

/// One JSON document per match, named `<match_id>.json` under the data
/// directory. The store only marshals; it never applies game rules.
pub struct MatchStore {
    data_dir: PathBuf,
}

#[derive(Debug, Serialize, Deserialize)]
struct MatchDocument {
    id: Uuid,
    host_id: Option<Uuid>,
    status: MatchStatus,
    max_players: usize,
    turn_index: usize,
    direction: Direction,
    draw_pile: Vec<Card>,
    discard_pile: Vec<Card>,
    updated_at: DateTime<Utc>,
    players: Vec<PlayerRecord>,
}

#[derive(Debug, Serialize, Deserialize)]
struct PlayerRecord {
    player_id: Uuid,
    name: String,
    hand: Vec<Card>,
    is_host: bool,
    score: i64,
}

impl MatchDocument {
    fn from_state(state: &MatchState) -> Self {
        MatchDocument {
            id: state.id,
            host_id: state.players.iter().find(|p| p.is_host).map(|p| p.id),
            status: state.status,
            max_players: state.max_players,
            turn_index: state.turn_index,
            direction: state.direction,
            draw_pile: state.draw_pile.clone(),
            discard_pile: state.discard_pile.clone(),
            updated_at: Utc::now(),
            players: state
                .players
                .iter()
                .map(|p| PlayerRecord {
                    player_id: p.id,
                    name: p.name.clone(),
                    hand: p.hand.clone(),
                    is_host: p.is_host,
                    score: p.score,
                })
                .collect(),
        }
    }

    /// Rebuild a state by replaying the player records through the normal
    /// join path, then restoring hands and flags directly (trusted state,
    /// not a move).
    fn into_state(self) -> MatchState {
        let mut state = MatchState::new(self.id, self.max_players);
        for rec in self.players {
            if state.add_player(rec.player_id, &rec.name).is_err() {
                warn!(match_id = %self.id, player_id = %rec.player_id, "dropping duplicate player record");
                continue;
            }
            if let Some(seat) = state.seat_mut(rec.player_id) {
                seat.has_uno = rec.hand.len() == 1;
                seat.hand = rec.hand;
                seat.is_host = rec.is_host;
                seat.score = rec.score;
            }
        }
        state.draw_pile = self.draw_pile;
        state.discard_pile = self.discard_pile;
        state.turn_index = self.turn_index;
        state.direction = self.direction;
        state.status = self.status;
        state
    }

    fn host_name(&self) -> String {
        self.players
            .iter()
            .find(|p| p.is_host)
            .map(|p| p.name.clone())
            .unwrap_or_default()
    }
}

impl MatchStore {
    pub fn new(data_dir: impl Into<PathBuf>) -> io::Result<Self> {
        let data_dir = data_dir.into();
        std::fs::create_dir_all(&data_dir)?;
        Ok(MatchStore { data_dir })
    }

    fn path_for(&self, match_id: Uuid) -> PathBuf {
        self.data_dir.join(format!("{}.json", match_id))
    }

    pub async fn load(&self, match_id: Uuid) -> Result<MatchState, StoreError> {
        let raw = match fs::read_to_string(self.path_for(match_id)).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Err(StoreError::NotFound),
            Err(e) => return Err(e.into()),
        };
        let doc: MatchDocument = serde_json::from_str(&raw)?;
        Ok(doc.into_state())
    }

    /// Write to a temp file and rename into place, so a save is
    /// all-or-nothing per action.
    pub async fn save(&self, state: &MatchState) -> Result<(), StoreError> {
        let doc = MatchDocument::from_state(state);
        let json = serde_json::to_string_pretty(&doc)?;
        let path = self.path_for(state.id);
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, json).await?;
        fs::rename(&tmp, &path).await?;
        Ok(())
    }

    /// Idempotent: deleting an absent match succeeds.
    pub async fn delete(&self, match_id: Uuid) -> Result<(), StoreError> {
        match fs::remove_file(self.path_for(match_id)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Joinable matches: waiting, not full, touched within the recency
    /// window. Unparseable documents are skipped with a warning. Newest
    /// first.
    pub async fn list_waiting(&self, window: Duration) -> Result<Vec<MatchSummary>, StoreError> {
        let cutoff = Utc::now() - window;
        let mut found: Vec<(DateTime<Utc>, MatchSummary)> = Vec::new();
        let mut entries = fs::read_dir(&self.data_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let raw = match fs::read_to_string(&path).await {
                Ok(raw) => raw,
                Err(err) => {
                    warn!(path = %path.display(), %err, "skipping unreadable match document");
                    continue;
                }
            };
            let doc: MatchDocument = match serde_json::from_str(&raw) {
                Ok(doc) => doc,
                Err(err) => {
                    warn!(path = %path.display(), %err, "skipping unparseable match document");
                    continue;
                }
            };
            if doc.status != MatchStatus::Waiting
                || doc.players.len() >= doc.max_players
                || doc.updated_at < cutoff
            {
                continue;
            }
            let summary = MatchSummary {
                match_id: doc.id,
                host_name: doc.host_name(),
                current_players: doc.players.len(),
                max_players: doc.max_players,
            };
            found.push((doc.updated_at, summary));
        }
        found.sort_by(|a, b| b.0.cmp(&a.0));
        Ok(found.into_iter().map(|(_, s)| s).collect())
    }
}
