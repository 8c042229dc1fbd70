//! Network Layer
//!
//! WebSocket transport, authentication, and message dispatch.
//! This layer owns sockets and channels only; all game decisions run
//! through `game/`.

pub mod auth;
pub mod dispatcher;
pub mod protocol;
pub mod server;

pub use auth::{authenticate, AuthConfig, AuthError, Identity, TokenClaims, validate_token};
pub use dispatcher::Dispatcher;
pub use protocol::{ClientMessage, DifficultyConfig, GameConfig, LastWinner, ServerMessage};
pub use server::{GameServer, GameServerError, ServerConfig};
