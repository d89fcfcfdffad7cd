//! Session credential storage

mod token_store;

pub use token_store::{StoredSession, TokenStore};
