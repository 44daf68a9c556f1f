use thiserror::Error;

/// Why a join was refused. The display text is what the client sees.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum JoinError {
    #[error("you have to be logged in to join a channel")]
    NotAuthenticated,
    #[error("channel is not in database")]
    ChannelNotFound,
    #[error("joining channels requires an account")]
    NoAccount,
    #[error("database error: {0}")]
    Database(String),
}

/// Rejections on the message path shared by clients and webhooks.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum IngestError {
    #[error("Unknown Webhook")]
    NotFound,
    #[error("webhook is not bound to a known channel")]
    ChannelNotFound,
    #[error("Cannot send an empty message")]
    EmptyContent,
    #[error("Message queue is full")]
    QueueFull,
    #[error("Ratelimited message sending")]
    RateLimited,
    #[error("Failed to relay message")]
    RelayFailed,
    #[error("database error: {0}")]
    Database(String),
}

#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("failed to access message snapshot: {0}")]
    Io(#[from] std::io::Error),
    #[error("message snapshot is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),
}

/// Login and registration failures. The display text is sent back in the
/// auth response.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("invalid username")]
    EmptyUsername,
    #[error("invalid password")]
    EmptyPassword,
    #[error("username has to match ^[a-zA-Z0-9_]{{1,20}}$")]
    BadUsername,
    #[error("password has to be between 3 and 1024 characters long")]
    BadPasswordLength,
    #[error("please choose a different password")]
    ReservedPassword,
    #[error("this username is already taken")]
    UsernameTaken,
    #[error("invalid sign up token")]
    BadSignUpToken,
    #[error("this username is already logged in")]
    AlreadyLoggedIn,
    #[error("wrong credentials")]
    WrongCredentials,
    #[error("this account is blocked")]
    Blocked,
    #[error("this username needs a different password")]
    NeedsDifferentPassword,
    #[error("failed to join channel")]
    JoinFailed,
    #[error("internal error")]
    Internal,
}
