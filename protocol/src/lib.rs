use rand::seq::SliceRandom;
use rand::thread_rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// ---- Cards ----
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Color {
    Red,
    Green,
    Blue,
    Yellow,
}

impl Color {
    pub const ALL: [Color; 4] = [Color::Red, Color::Green, Color::Blue, Color::Yellow];
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Color::Red => write!(f, "red"),
            Color::Green => write!(f, "green"),
            Color::Blue => write!(f, "blue"),
            Color::Yellow => write!(f, "yellow"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ActionKind {
    Skip,
    Reverse,
    DrawTwo,
}

/// A single UNO card. Wilds carry the color chosen when they were played;
/// until then `chosen` is `None`, so a "colored wild" cannot exist off the
/// discard pile.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Card {
    Number { color: Color, value: u8 },
    Action { color: Color, kind: ActionKind },
    Wild { chosen: Option<Color> },
    WildDrawFour { chosen: Option<Color> },
}

impl Card {
    /// The color this card counts as on top of the discard pile.
    /// `None` only for a wild that was flipped as the opening card.
    pub fn effective_color(&self) -> Option<Color> {
        match self {
            Card::Number { color, .. } | Card::Action { color, .. } => Some(*color),
            Card::Wild { chosen } | Card::WildDrawFour { chosen } => *chosen,
        }
    }

    pub fn needs_color(&self) -> bool {
        matches!(
            self,
            Card::Wild { chosen: None } | Card::WildDrawFour { chosen: None }
        )
    }

    /// Stamp the chosen color onto a wild; leaves other cards untouched.
    pub fn with_chosen(self, color: Color) -> Card {
        match self {
            Card::Wild { .. } => Card::Wild {
                chosen: Some(color),
            },
            Card::WildDrawFour { .. } => Card::WildDrawFour {
                chosen: Some(color),
            },
            other => other,
        }
    }

    /// Clear the chosen color, used when a played wild is shuffled back
    /// into the draw pile.
    pub fn cleared(self) -> Card {
        match self {
            Card::Wild { .. } => Card::Wild { chosen: None },
            Card::WildDrawFour { .. } => Card::WildDrawFour { chosen: None },
            other => other,
        }
    }

    /// Legality of playing `self` onto `top`. Wilds always follow; an
    /// unstamped wild on top (opening flip) permits anything.
    pub fn can_follow(&self, top: &Card) -> bool {
        if matches!(self, Card::Wild { .. } | Card::WildDrawFour { .. }) {
            return true;
        }
        let Some(top_color) = top.effective_color() else {
            return true;
        };
        if self.effective_color() == Some(top_color) {
            return true;
        }
        match (self, top) {
            (Card::Number { value: a, .. }, Card::Number { value: b, .. }) => a == b,
            (Card::Action { kind: a, .. }, Card::Action { kind: b, .. }) => a == b,
            _ => false,
        }
    }
}

impl fmt::Display for Card {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Card::Number { color, value } => write!(f, "{} {}", color, value),
            Card::Action { color, kind } => match kind {
                ActionKind::Skip => write!(f, "{} skip", color),
                ActionKind::Reverse => write!(f, "{} reverse", color),
                ActionKind::DrawTwo => write!(f, "{} draw2", color),
            },
            Card::Wild { chosen: Some(c) } => write!(f, "wild ({})", c),
            Card::Wild { chosen: None } => write!(f, "wild"),
            Card::WildDrawFour { chosen: Some(c) } => write!(f, "wild draw4 ({})", c),
            Card::WildDrawFour { chosen: None } => write!(f, "wild draw4"),
        }
    }
}

pub const DECK_SIZE: usize = 108;

/// The standard 108-card deck, shuffled: per color one 0, two of each 1-9,
/// two of each action, plus four wilds and four wild-draw-fours.
pub fn standard_shuffled_deck() -> Vec<Card> {
    let mut cards = Vec::with_capacity(DECK_SIZE);
    for &color in &Color::ALL {
        cards.push(Card::Number { color, value: 0 });
        for value in 1..=9 {
            cards.push(Card::Number { color, value });
            cards.push(Card::Number { color, value });
        }
        for kind in [ActionKind::Skip, ActionKind::Reverse, ActionKind::DrawTwo] {
            cards.push(Card::Action { color, kind });
            cards.push(Card::Action { color, kind });
        }
    }
    for _ in 0..4 {
        cards.push(Card::Wild { chosen: None });
        cards.push(Card::WildDrawFour { chosen: None });
    }
    cards.shuffle(&mut thread_rng());
    cards
}

pub fn shuffle(cards: &mut [Card]) {
    cards.shuffle(&mut thread_rng());
}

/// ---- Match state vocabulary ----
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Direction {
    Clockwise,
    CounterClockwise,
}

impl Direction {
    pub fn flipped(self) -> Direction {
        match self {
            Direction::Clockwise => Direction::CounterClockwise,
            Direction::CounterClockwise => Direction::Clockwise,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum MatchStatus {
    Waiting,
    Playing,
    Finished,
}

/// ---- Views ----
/// One seat as the room sees it. `cards` is populated only in a view built
/// for that player; the shared snapshot carries `cards_count` alone.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerView {
    pub id: Uuid,
    pub name: String,
    pub cards_count: usize,
    pub has_uno: bool,
    pub is_host: bool,
    pub score: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cards: Option<Vec<Card>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchView {
    pub match_id: Uuid,
    pub players: Vec<PlayerView>,
    pub draw_pile_count: usize,
    pub discard_top: Option<Card>,
    pub current_player_id: Option<Uuid>,
    pub direction: Direction,
    pub status: MatchStatus,
    pub max_players: usize,
}

/// Lobby listing entry for a joinable match.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchSummary {
    pub match_id: Uuid,
    pub host_name: String,
    pub current_players: usize,
    pub max_players: usize,
}

/// ---- Wire messages ----
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ClientToServer {
    CreateMatch {
        name: String,
        max_players: usize,
    },
    JoinMatch {
        match_id: Uuid,
        name: String,
    },
    StartMatch,
    PlayCard {
        card_index: usize,
        chosen_color: Option<Color>,
    },
    DrawCard {
        auto_play: bool,
        chosen_color: Option<Color>,
    },
    LeaveMatch,
    GetState,
    ListMatches {
        recent_minutes: Option<i64>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ServerToClient {
    Hello {
        your_id: Uuid,
    },
    Created {
        match_id: Uuid,
        view: MatchView,
    },
    Joined {
        view: MatchView,
    },
    Started {
        view: MatchView,
        discard_top: Card,
        current_player_id: Uuid,
    },
    /// Direct reply to the player who played: their own view plus outcome.
    Played {
        view: MatchView,
        next_player_id: Option<Uuid>,
        winner: Option<Uuid>,
    },
    CardDrawn {
        card: Card,
        playable: bool,
        auto_played: bool,
        view: MatchView,
    },
    /// Room-wide snapshot after any mutation; never carries hands.
    StateChanged {
        view: MatchView,
    },
    /// Private: the recipient's full hand, sent only to its owner.
    YourHand {
        cards: Vec<Card>,
    },
    /// Direct reply to GetState, personalized for the requester.
    State {
        view: MatchView,
    },
    Left {
        remaining_players: Vec<PlayerView>,
        match_deleted: bool,
    },
    MatchList {
        matches: Vec<MatchSummary>,
    },
    Error {
        message: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deck_is_108_with_standard_counts() {
        let deck = standard_shuffled_deck();
        assert_eq!(deck.len(), DECK_SIZE);
        for color in Color::ALL {
            let zeros = deck
                .iter()
                .filter(|c| matches!(c, Card::Number { color: col, value: 0 } if *col == color))
                .count();
            assert_eq!(zeros, 1);
            for value in 1..=9u8 {
                let n = deck
                    .iter()
                    .filter(
                        |c| matches!(c, Card::Number { color: col, value: v } if *col == color && *v == value),
                    )
                    .count();
                assert_eq!(n, 2);
            }
            for kind in [ActionKind::Skip, ActionKind::Reverse, ActionKind::DrawTwo] {
                let n = deck
                    .iter()
                    .filter(
                        |c| matches!(c, Card::Action { color: col, kind: k } if *col == color && *k == kind),
                    )
                    .count();
                assert_eq!(n, 2);
            }
        }
        let wilds = deck
            .iter()
            .filter(|c| matches!(c, Card::Wild { .. }))
            .count();
        let draw_fours = deck
            .iter()
            .filter(|c| matches!(c, Card::WildDrawFour { .. }))
            .count();
        assert_eq!(wilds, 4);
        assert_eq!(draw_fours, 4);
    }

    #[test]
    fn follow_rules() {
        let red5 = Card::Number {
            color: Color::Red,
            value: 5,
        };
        let blue5 = Card::Number {
            color: Color::Blue,
            value: 5,
        };
        let blue7 = Card::Number {
            color: Color::Blue,
            value: 7,
        };
        let red_skip = Card::Action {
            color: Color::Red,
            kind: ActionKind::Skip,
        };
        let blue_skip = Card::Action {
            color: Color::Blue,
            kind: ActionKind::Skip,
        };
        let wild = Card::Wild { chosen: None };

        assert!(blue5.can_follow(&red5), "same value follows");
        assert!(blue7.can_follow(&blue5), "same color follows");
        assert!(!blue7.can_follow(&red5));
        assert!(blue_skip.can_follow(&red_skip), "same action kind follows");
        assert!(wild.can_follow(&red5), "wilds always follow");
        assert!(!red_skip.can_follow(&blue7), "skip does not match a number");
    }

    #[test]
    fn stamped_wild_sets_effective_color() {
        let wild = Card::Wild { chosen: None };
        assert!(wild.needs_color());
        let stamped = wild.with_chosen(Color::Green);
        assert!(!stamped.needs_color());
        assert_eq!(stamped.effective_color(), Some(Color::Green));

        let green3 = Card::Number {
            color: Color::Green,
            value: 3,
        };
        let red3 = Card::Number {
            color: Color::Red,
            value: 3,
        };
        assert!(green3.can_follow(&stamped));
        // a wild has no number face, so only the stamped color matches
        assert!(!red3.can_follow(&stamped));
        assert_eq!(stamped.cleared(), Card::Wild { chosen: None });
    }

    #[test]
    fn unstamped_top_permits_anything() {
        let wild_top = Card::Wild { chosen: None };
        let any = Card::Number {
            color: Color::Yellow,
            value: 9,
        };
        assert!(any.can_follow(&wild_top));
    }
}
