//! Remote side of the connector: entity catalogue, OAuth token lifecycle,
//! the authenticated REST client and its request/response types.

pub mod client;
pub mod connection;
pub mod decode;
pub mod entity;
pub mod payload;
pub mod records;
pub mod token_manager;

pub use client::QboClient;
pub use connection::Connection;
pub use entity::{ImportStream, RemoteEntity};
pub use records::RemoteRecord;
pub use token_manager::{AccessToken, TokenManager};
