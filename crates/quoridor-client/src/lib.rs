//! Client-side session sync for two-player Quoridor games.
//!
//! The REST backend owns every game; this crate keeps a local mirror of one
//! session fresh (polling plus push notifications), decides whose turn it
//! is, filters obviously malformed moves before they are sent, and manages
//! the session's chat channel.

pub mod api;
pub mod chat;
pub mod config;
pub mod controller;
pub mod push;
pub mod store;
pub mod sync;
pub mod transport;
#[cfg(feature = "native")]
pub mod ws_transport;

#[cfg(test)]
mod test_support;
