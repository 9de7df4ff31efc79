pub mod models;
pub mod routes;
pub mod token_store;

pub use token_store::{AccountError, InMemoryTokenStore, TokenStore};
