use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tokio::time::{sleep, timeout};
use tracing::{debug, warn};
use unoroom_protocol::{Card, Color, MatchStatus, MatchSummary, MatchView, PlayerView};
use uuid::Uuid;

use crate::error::{ApiError, GameError, StoreError};
use crate::game::{MatchState, MAX_PLAYERS_CAP, MIN_PLAYERS};
use crate::store::MatchStore;

pub const MIN_NAME_LEN: usize = 2;
pub const MAX_NAME_LEN: usize = 20;
const SAVE_ATTEMPTS: u32 = 3;
const SAVE_BACKOFF: Duration = Duration::from_millis(50);

/// Everything the broadcaster needs after a successful mutation: one
/// fully-redacted shared view plus each player's private hand.
#[derive(Debug, Clone)]
pub struct StateDelta {
    pub match_id: Uuid,
    pub shared: MatchView,
    pub hands: Vec<(Uuid, Vec<Card>)>,
}

impl StateDelta {
    fn of(state: &MatchState) -> Self {
        StateDelta {
            match_id: state.id,
            shared: state.view(None),
            hands: state
                .players
                .iter()
                .map(|p| (p.id, p.hand.clone()))
                .collect(),
        }
    }
}

#[derive(Debug)]
pub struct CreateOutcome {
    pub match_id: Uuid,
    pub view: MatchView,
    pub delta: StateDelta,
}

#[derive(Debug)]
pub struct JoinOutcome {
    pub view: MatchView,
    pub delta: StateDelta,
}

#[derive(Debug)]
pub struct StartOutcome {
    pub view: MatchView,
    pub discard_top: Card,
    pub current_player_id: Uuid,
    pub delta: StateDelta,
}

#[derive(Debug)]
pub struct PlayedOutcome {
    pub view: MatchView,
    pub next_player_id: Option<Uuid>,
    pub winner: Option<Uuid>,
    pub delta: StateDelta,
}

#[derive(Debug)]
pub struct DrawOutcome {
    pub card: Card,
    pub playable: bool,
    pub auto_played: bool,
    pub view: MatchView,
    pub next_player_id: Option<Uuid>,
    pub delta: StateDelta,
}

#[derive(Debug)]
pub struct LeaveOutcome {
    pub remaining: Vec<PlayerView>,
    pub match_deleted: bool,
    /// None when the match was deleted or the leave was a no-op.
    pub delta: Option<StateDelta>,
}

/// Serializes every reload-mutate-persist cycle per match. One async mutex
/// per match id, never a global lock: distinct matches proceed
/// concurrently, actions on the same match queue up, and a bounded wait
/// turns contention into `Conflict` instead of a stuck connection.
pub struct MatchCoordinator {
    store: MatchStore,
    locks: Mutex<HashMap<Uuid, Arc<AsyncMutex<()>>>>,
    lock_wait: Duration,
}

impl MatchCoordinator {
    pub fn new(store: MatchStore, lock_wait: Duration) -> Self {
        MatchCoordinator {
            store,
            locks: Mutex::new(HashMap::new()),
            lock_wait,
        }
    }

    pub(crate) fn lock_for(&self, match_id: Uuid) -> Arc<AsyncMutex<()>> {
        self.locks.lock().entry(match_id).or_default().clone()
    }

    #[cfg(test)]
    pub(crate) fn lock_count(&self) -> usize {
        self.locks.lock().len()
    }

    /// Drop the map entry when nobody else holds the mutex. The map's Arc
    /// plus the caller's guard account for exactly two references, so a
    /// queued waiter keeps the entry (and serialization) alive.
    fn prune_lock(&self, match_id: Uuid, guard: &OwnedMutexGuard<()>) {
        let _ = guard;
        let mut locks = self.locks.lock();
        if let Some(lock) = locks.get(&match_id) {
            if Arc::strong_count(lock) == 2 {
                locks.remove(&match_id);
            }
        }
    }

    /// Load under the caller's guard; a missing document also prunes the
    /// lock entry so probes of unknown ids do not grow the map.
    async fn load_locked(
        &self,
        match_id: Uuid,
        guard: &OwnedMutexGuard<()>,
    ) -> Result<MatchState, ApiError> {
        match self.store.load(match_id).await {
            Ok(state) => Ok(state),
            Err(StoreError::NotFound) => {
                self.prune_lock(match_id, guard);
                Err(ApiError::GameNotFound)
            }
            Err(e) => Err(ApiError::Persistence(e)),
        }
    }

    async fn acquire(&self, match_id: Uuid) -> Result<OwnedMutexGuard<()>, ApiError> {
        let lock = self.lock_for(match_id);
        match timeout(self.lock_wait, lock.lock_owned()).await {
            Ok(guard) => Ok(guard),
            Err(_) => {
                warn!(%match_id, "lock wait exceeded, rejecting action");
                Err(ApiError::Conflict)
            }
        }
    }

    async fn save_with_retry(&self, state: &MatchState) -> Result<(), ApiError> {
        let mut attempt = 1;
        loop {
            match self.store.save(state).await {
                Ok(()) => return Ok(()),
                Err(err) if attempt < SAVE_ATTEMPTS => {
                    warn!(match_id = %state.id, %err, attempt, "save failed, retrying");
                    sleep(SAVE_BACKOFF * attempt).await;
                    attempt += 1;
                }
                Err(err) => return Err(ApiError::Persistence(err)),
            }
        }
    }

    pub async fn create_match(
        &self,
        host_id: Uuid,
        host_name: &str,
        max_players: usize,
    ) -> Result<CreateOutcome, ApiError> {
        let name = validate_name(host_name)?;
        let max_players = validate_max_players(max_players)?;
        // fresh id, nothing can contend yet
        let match_id = Uuid::new_v4();
        let mut state = MatchState::new(match_id, max_players);
        state.add_player(host_id, &name).map_err(ApiError::from)?;
        self.save_with_retry(&state).await?;
        debug!(%match_id, host = %host_id, "match created");
        Ok(CreateOutcome {
            match_id,
            view: state.view(Some(host_id)),
            delta: StateDelta::of(&state),
        })
    }

    pub async fn join_match(
        &self,
        match_id: Uuid,
        player_id: Uuid,
        player_name: &str,
    ) -> Result<JoinOutcome, ApiError> {
        let name = validate_name(player_name)?;
        let _guard = self.acquire(match_id).await?;
        let mut state = self.load_locked(match_id, &_guard).await?;
        if state.status != MatchStatus::Waiting {
            return Err(GameError::AlreadyStarted.into());
        }
        state.add_player(player_id, &name)?;
        self.save_with_retry(&state).await?;
        debug!(%match_id, player = %player_id, "player joined");
        Ok(JoinOutcome {
            view: state.view(Some(player_id)),
            delta: StateDelta::of(&state),
        })
    }

    pub async fn start_match(
        &self,
        match_id: Uuid,
        player_id: Uuid,
    ) -> Result<StartOutcome, ApiError> {
        let _guard = self.acquire(match_id).await?;
        let mut state = self.load_locked(match_id, &_guard).await?;
        let seat = state.seat_of(player_id).ok_or(ApiError::PlayerNotInGame)?;
        if !state.players[seat].is_host {
            return Err(ApiError::Validation(
                "only the host can start the match".to_string(),
            ));
        }
        let discard_top = state.start()?;
        self.save_with_retry(&state).await?;
        let current_player_id = state
            .current_player_id()
            .ok_or(ApiError::Rule(GameError::NotEnoughPlayers))?;
        debug!(%match_id, "match started");
        Ok(StartOutcome {
            view: state.view(Some(player_id)),
            discard_top,
            current_player_id,
            delta: StateDelta::of(&state),
        })
    }

    pub async fn play_card(
        &self,
        match_id: Uuid,
        player_id: Uuid,
        card_index: usize,
        chosen_color: Option<Color>,
    ) -> Result<PlayedOutcome, ApiError> {
        let _guard = self.acquire(match_id).await?;
        let mut state = self.load_locked(match_id, &_guard).await?;
        if state.seat_of(player_id).is_none() {
            return Err(ApiError::PlayerNotInGame);
        }
        let outcome = state.play_card(player_id, card_index, chosen_color)?;
        self.save_with_retry(&state).await?;
        debug!(%match_id, player = %player_id, card = %outcome.played, "card played");
        Ok(PlayedOutcome {
            view: state.view(Some(player_id)),
            next_player_id: outcome.next_player,
            winner: outcome.winner,
            delta: StateDelta::of(&state),
        })
    }

    /// Draw exactly one card. If it can follow the discard top the turn
    /// stays with the player (auto-playing it when asked); otherwise the
    /// turn passes.
    pub async fn draw_card(
        &self,
        match_id: Uuid,
        player_id: Uuid,
        auto_play: bool,
        chosen_color: Option<Color>,
    ) -> Result<DrawOutcome, ApiError> {
        let _guard = self.acquire(match_id).await?;
        let mut state = self.load_locked(match_id, &_guard).await?;
        match state.status {
            MatchStatus::Waiting => return Err(GameError::NotStarted.into()),
            MatchStatus::Finished => return Err(GameError::MatchOver.into()),
            MatchStatus::Playing => {}
        }
        if state.seat_of(player_id).is_none() {
            return Err(ApiError::PlayerNotInGame);
        }
        if state.current_player_id() != Some(player_id) {
            return Err(GameError::NotYourTurn.into());
        }
        let top = state.discard_top().ok_or(ApiError::Rule(GameError::NotStarted))?;
        let drawn = state.draw_from_pile(player_id, 1)?;
        let card = *drawn.first().ok_or(ApiError::Rule(GameError::EmptyDeck))?;
        let playable = card.can_follow(&top);

        let mut auto_played = false;
        if playable && auto_play {
            let idx = state
                .seat_of(player_id)
                .and_then(|s| state.players[s].hand.len().checked_sub(1))
                .ok_or(ApiError::PlayerNotInGame)?;
            match state.play_card(player_id, idx, chosen_color) {
                Ok(_) => auto_played = true,
                // a drawn wild with no color stays in hand, turn kept
                Err(GameError::ColorRequired) => {}
                Err(e) => return Err(e.into()),
            }
        }
        if !playable {
            state.pass_turn();
        }
        self.save_with_retry(&state).await?;
        debug!(%match_id, player = %player_id, playable, auto_played, "card drawn");
        Ok(DrawOutcome {
            card,
            playable,
            auto_played,
            view: state.view(Some(player_id)),
            next_player_id: state.current_player_id(),
            delta: StateDelta::of(&state),
        })
    }

    /// Idempotent: leaving a match you are no longer in (or that is gone)
    /// is a successful no-op. The earliest remaining player inherits host;
    /// an emptied match is deleted.
    pub async fn leave_match(
        &self,
        match_id: Uuid,
        player_id: Uuid,
    ) -> Result<LeaveOutcome, ApiError> {
        let _guard = self.acquire(match_id).await?;
        let mut state = match self.store.load(match_id).await {
            Ok(state) => state,
            Err(StoreError::NotFound) => {
                self.prune_lock(match_id, &_guard);
                return Ok(LeaveOutcome {
                    remaining: Vec::new(),
                    match_deleted: true,
                    delta: None,
                });
            }
            Err(e) => return Err(e.into()),
        };
        let removed_index = match state.remove_player(player_id) {
            Ok(idx) => idx,
            Err(GameError::PlayerNotFound) => {
                return Ok(LeaveOutcome {
                    remaining: state.view(None).players,
                    match_deleted: false,
                    delta: None,
                })
            }
            Err(e) => return Err(e.into()),
        };
        if state.players.is_empty() {
            self.store.delete(match_id).await.map_err(ApiError::from)?;
            self.prune_lock(match_id, &_guard);
            debug!(%match_id, "last player left, match deleted");
            return Ok(LeaveOutcome {
                remaining: Vec::new(),
                match_deleted: true,
                delta: None,
            });
        }
        state.reclamp_turn(removed_index);
        state.reassign_host();
        self.save_with_retry(&state).await?;
        debug!(%match_id, player = %player_id, "player left");
        Ok(LeaveOutcome {
            remaining: state.view(None).players,
            match_deleted: false,
            delta: Some(StateDelta::of(&state)),
        })
    }

    pub async fn get_state(
        &self,
        match_id: Uuid,
        player_id: Uuid,
    ) -> Result<MatchView, ApiError> {
        let _guard = self.acquire(match_id).await?;
        let state = self.load_locked(match_id, &_guard).await?;
        if state.seat_of(player_id).is_none() {
            return Err(ApiError::PlayerNotInGame);
        }
        Ok(state.view(Some(player_id)))
    }

    pub async fn list_open(
        &self,
        window: chrono::Duration,
    ) -> Result<Vec<MatchSummary>, ApiError> {
        self.store.list_waiting(window).await.map_err(ApiError::from)
    }
}

fn validate_name(name: &str) -> Result<String, ApiError> {
    let name = name.trim();
    // length is in characters, not bytes
    let chars = name.chars().count();
    if chars < MIN_NAME_LEN || chars > MAX_NAME_LEN {
        return Err(ApiError::Validation(format!(
            "player name must be {} to {} characters",
            MIN_NAME_LEN, MAX_NAME_LEN
        )));
    }
    if !name
        .chars()
        .all(|c| c.is_alphanumeric() || c == ' ' || c == '-' || c == '_')
    {
        return Err(ApiError::Validation(
            "player name may only contain letters, numbers, spaces, hyphens and underscores"
                .to_string(),
        ));
    }
    Ok(name.to_string())
}

fn validate_max_players(max_players: usize) -> Result<usize, ApiError> {
    if !(MIN_PLAYERS..=MAX_PLAYERS_CAP).contains(&max_players) {
        return Err(ApiError::Validation(format!(
            "max players must be between {} and {}",
            MIN_PLAYERS, MAX_PLAYERS_CAP
        )));
    }
    Ok(max_players)
}
