use serde::{Deserialize, Serialize};
use unoroom_protocol::{
    shuffle, standard_shuffled_deck, ActionKind, Card, Color, Direction, MatchStatus, MatchView,
    PlayerView,
};
use uuid::Uuid;

use crate::error::GameError;

pub const STARTING_HAND: usize = 7;
pub const MIN_PLAYERS: usize = 2;
pub const MAX_PLAYERS_CAP: usize = 10;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerSeat {
    pub id: Uuid,
    pub name: String,
    pub hand: Vec<Card>,
    pub has_uno: bool,
    pub is_host: bool,
    pub score: i64,
}

/// What a successful play did to the table.
#[derive(Debug, Clone, Copy)]
pub struct PlayOutcome {
    pub played: Card,
    pub winner: Option<Uuid>,
    pub next_player: Option<Uuid>,
}

/// Pure UNO state machine. Players are kept in join order, which is also
/// turn order; no I/O happens here.
#[derive(Debug, Clone)]
pub struct MatchState {
    pub id: Uuid,
    pub players: Vec<PlayerSeat>,
    pub draw_pile: Vec<Card>,
    pub discard_pile: Vec<Card>,
    pub turn_index: usize,
    pub direction: Direction,
    pub status: MatchStatus,
    pub max_players: usize,
}

impl MatchState {
    pub fn new(id: Uuid, max_players: usize) -> Self {
        MatchState {
            id,
            players: Vec::new(),
            draw_pile: Vec::new(),
            discard_pile: Vec::new(),
            turn_index: 0,
            direction: Direction::Clockwise,
            status: MatchStatus::Waiting,
            max_players,
        }
    }

    pub fn seat_of(&self, player_id: Uuid) -> Option<usize> {
        self.players.iter().position(|p| p.id == player_id)
    }

    pub fn seat_mut(&mut self, player_id: Uuid) -> Option<&mut PlayerSeat> {
        self.players.iter_mut().find(|p| p.id == player_id)
    }

    pub fn current_player_id(&self) -> Option<Uuid> {
        self.players.get(self.turn_index).map(|p| p.id)
    }

    pub fn discard_top(&self) -> Option<Card> {
        self.discard_pile.last().copied()
    }

    /// Cards on the table plus cards in hands; 108 for any dealt match.
    pub fn total_cards(&self) -> usize {
        self.draw_pile.len()
            + self.discard_pile.len()
            + self.players.iter().map(|p| p.hand.len()).sum::<usize>()
    }

    /// The first player seated becomes host. Returns the new seat index.
    pub fn add_player(&mut self, player_id: Uuid, name: &str) -> Result<usize, GameError> {
        if self.players.iter().any(|p| p.id == player_id) {
            return Err(GameError::DuplicatePlayer);
        }
        if self.players.len() >= self.max_players {
            return Err(GameError::RoomFull);
        }
        let is_host = self.players.is_empty();
        self.players.push(PlayerSeat {
            id: player_id,
            name: name.to_string(),
            hand: Vec::new(),
            has_uno: false,
            is_host,
            score: 0,
        });
        Ok(self.players.len() - 1)
    }

    /// Removes the seat and returns its former index. Turn reclamping and
    /// host reassignment are separate calls owned by the caller.
    pub fn remove_player(&mut self, player_id: Uuid) -> Result<usize, GameError> {
        let idx = self.seat_of(player_id).ok_or(GameError::PlayerNotFound)?;
        self.players.remove(idx);
        Ok(idx)
    }

    /// Keep `turn_index` pointing at a present player after a removal:
    /// a departure before the pointer shifts it down one, a departure at
    /// the pointer leaves it on the slot's new occupant, then reduce
    /// modulo the new count.
    pub fn reclamp_turn(&mut self, removed_index: usize) {
        if self.players.is_empty() {
            self.turn_index = 0;
            return;
        }
        if removed_index < self.turn_index {
            self.turn_index -= 1;
        }
        self.turn_index %= self.players.len();
    }

    /// Promote the earliest remaining player if no host is left.
    pub fn reassign_host(&mut self) {
        if self.players.iter().any(|p| p.is_host) {
            return;
        }
        if let Some(first) = self.players.first_mut() {
            first.is_host = true;
        }
    }

    /// Shuffle a fresh deck, deal 7 to each seat in join order, flip one
    /// discard card. Returns the flipped card.
    pub fn start(&mut self) -> Result<Card, GameError> {
        if self.status != MatchStatus::Waiting {
            return Err(GameError::AlreadyStarted);
        }
        if self.players.len() < MIN_PLAYERS {
            return Err(GameError::NotEnoughPlayers);
        }
        self.draw_pile = standard_shuffled_deck();
        self.discard_pile.clear();
        for p in &mut self.players {
            p.hand.clear();
            p.has_uno = false;
        }
        for _ in 0..STARTING_HAND {
            for i in 0..self.players.len() {
                let card = self.draw_pile.pop().ok_or(GameError::EmptyDeck)?;
                self.players[i].hand.push(card);
            }
        }
        let top = self.draw_pile.pop().ok_or(GameError::EmptyDeck)?;
        self.discard_pile.push(top);
        self.turn_index = 0;
        self.direction = Direction::Clockwise;
        self.status = MatchStatus::Playing;
        Ok(top)
    }

    pub fn play_card(
        &mut self,
        player_id: Uuid,
        card_index: usize,
        chosen_color: Option<Color>,
    ) -> Result<PlayOutcome, GameError> {
        match self.status {
            MatchStatus::Waiting => return Err(GameError::NotStarted),
            MatchStatus::Finished => return Err(GameError::MatchOver),
            MatchStatus::Playing => {}
        }
        let seat = self.seat_of(player_id).ok_or(GameError::PlayerNotFound)?;
        if seat != self.turn_index {
            return Err(GameError::NotYourTurn);
        }
        if card_index >= self.players[seat].hand.len() {
            return Err(GameError::InvalidCardIndex);
        }
        let candidate = self.players[seat].hand[card_index];
        if candidate.needs_color() && chosen_color.is_none() {
            return Err(GameError::ColorRequired);
        }
        // Playing implies a non-empty discard (start flipped one and the
        // reshuffle keeps the top in place).
        let top = self.discard_top().ok_or(GameError::NotStarted)?;
        if !candidate.can_follow(&top) {
            return Err(GameError::IllegalPlay);
        }

        // All checks passed, mutate.
        let mut card = self.players[seat].hand.remove(card_index);
        if let Some(color) = chosen_color {
            card = card.with_chosen(color);
        }
        self.discard_pile.push(card);
        let remaining = self.players[seat].hand.len();
        self.players[seat].has_uno = remaining == 1;

        if remaining == 0 {
            self.players[seat].score += 1;
            self.status = MatchStatus::Finished;
            return Ok(PlayOutcome {
                played: card,
                winner: Some(player_id),
                next_player: None,
            });
        }

        self.apply_effect(card)?;
        Ok(PlayOutcome {
            played: card,
            winner: None,
            next_player: self.current_player_id(),
        })
    }

    /// Draw `count` cards into the player's hand, reshuffling the discard
    /// (minus its top) when the pile runs dry. Stops short if every
    /// remaining card is held or is the discard top.
    pub fn draw_from_pile(
        &mut self,
        player_id: Uuid,
        count: usize,
    ) -> Result<Vec<Card>, GameError> {
        let seat = self.seat_of(player_id).ok_or(GameError::PlayerNotFound)?;
        let mut drawn = Vec::with_capacity(count);
        for _ in 0..count {
            if self.draw_pile.is_empty() {
                self.reshuffle_discard();
            }
            match self.draw_pile.pop() {
                Some(card) => {
                    self.players[seat].hand.push(card);
                    drawn.push(card);
                }
                None => break,
            }
        }
        self.players[seat].has_uno = self.players[seat].hand.len() == 1;
        Ok(drawn)
    }

    pub fn pass_turn(&mut self) {
        self.advance(1);
    }

    fn advance(&mut self, steps: usize) {
        let n = self.players.len();
        if n == 0 {
            return;
        }
        for _ in 0..steps {
            self.turn_index = match self.direction {
                Direction::Clockwise => (self.turn_index + 1) % n,
                Direction::CounterClockwise => (self.turn_index + n - 1) % n,
            };
        }
    }

    fn apply_effect(&mut self, card: Card) -> Result<(), GameError> {
        match card {
            Card::Action {
                kind: ActionKind::Skip,
                ..
            } => self.advance(2),
            Card::Action {
                kind: ActionKind::Reverse,
                ..
            } => {
                self.direction = self.direction.flipped();
                self.advance(1);
            }
            Card::Action {
                kind: ActionKind::DrawTwo,
                ..
            } => self.penalize_next(2)?,
            Card::WildDrawFour { .. } => self.penalize_next(4)?,
            _ => self.advance(1),
        }
        Ok(())
    }

    /// The seat after the player draws `count` and loses their turn.
    fn penalize_next(&mut self, count: usize) -> Result<(), GameError> {
        self.advance(1);
        let victim = self.players[self.turn_index].id;
        self.draw_from_pile(victim, count)?;
        self.advance(1);
        Ok(())
    }

    fn reshuffle_discard(&mut self) {
        if self.discard_pile.len() <= 1 {
            return;
        }
        let Some(top) = self.discard_pile.pop() else {
            return;
        };
        let mut rest = std::mem::take(&mut self.discard_pile);
        // stamped wilds go back in blank
        for c in &mut rest {
            *c = c.cleared();
        }
        shuffle(&mut rest);
        self.draw_pile.append(&mut rest);
        self.discard_pile.push(top);
    }

    /// The only sanctioned hand exposure: full cards for `for_player`,
    /// counts for everyone else.
    pub fn view(&self, for_player: Option<Uuid>) -> MatchView {
        MatchView {
            match_id: self.id,
            players: self
                .players
                .iter()
                .map(|p| PlayerView {
                    id: p.id,
                    name: p.name.clone(),
                    cards_count: p.hand.len(),
                    has_uno: p.has_uno,
                    is_host: p.is_host,
                    score: p.score,
                    cards: (Some(p.id) == for_player).then(|| p.hand.clone()),
                })
                .collect(),
            draw_pile_count: self.draw_pile.len(),
            discard_top: self.discard_top(),
            current_player_id: self.current_player_id(),
            direction: self.direction,
            status: self.status,
            max_players: self.max_players,
        }
    }
}
