//! # Repository Layer
//!
//! Repositories encapsulating SeaORM operations for connector-owned tables.

pub mod connection;
pub mod import_cursor;
pub mod oauth_state;

pub use connection::{ConnectionRepository, NewConnection, TokenGrant};
pub use import_cursor::ImportCursorRepository;
pub use oauth_state::OAuthStateRepository;
