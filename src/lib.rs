//! Client-side view synchronization for a live blind-test quiz.
//!
//! Server events are normalized by [`services::ingress`], reduced by
//! [`state::engine::SyncEngine`] and projected as a [`dto::view::GameView`] per role.

pub mod config;
pub mod dto;
pub mod error;
pub mod services;
pub mod state;
