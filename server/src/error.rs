use thiserror::Error;

/// Rule violations raised by the match state machine. These never touch I/O.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum GameError {
    #[error("player is already in this match")]
    DuplicatePlayer,
    #[error("player not found in this match")]
    PlayerNotFound,
    #[error("match is full")]
    RoomFull,
    #[error("match has already started")]
    AlreadyStarted,
    #[error("need at least 2 players to start")]
    NotEnoughPlayers,
    #[error("match has not started yet")]
    NotStarted,
    #[error("match is already over")]
    MatchOver,
    #[error("not your turn")]
    NotYourTurn,
    #[error("invalid card index")]
    InvalidCardIndex,
    #[error("card does not match the discard top")]
    IllegalPlay,
    #[error("a wild card needs a chosen color")]
    ColorRequired,
    #[error("no cards left to draw")]
    EmptyDeck,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("match not found")]
    NotFound,
    #[error("storage io: {0}")]
    Io(#[from] std::io::Error),
    #[error("storage encoding: {0}")]
    Encoding(#[from] serde_json::Error),
}

/// The coordinator's public error surface, sent to clients verbatim via
/// its Display text.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("match not found")]
    GameNotFound,
    #[error("you are not in this match")]
    PlayerNotInGame,
    #[error(transparent)]
    Rule(#[from] GameError),
    #[error("match is busy, try again")]
    Conflict,
    #[error("{0}")]
    Validation(String),
    #[error("persistence failure: {0}")]
    Persistence(StoreError),
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => ApiError::GameNotFound,
            other => ApiError::Persistence(other),
        }
    }
}
