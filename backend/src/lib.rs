//! Plant disease classification service: image normalization, a TorchScript
//! classifier shared across requests, and the HTTP surface around them.

pub mod account;
pub mod config;
pub mod inference;
pub mod routes;
