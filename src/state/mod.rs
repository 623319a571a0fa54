//! Engine state: the phase machine and the controllers it coordinates.

/// Audio handle ownership and backend seam.
pub mod audio;
/// Optimistic buzz control.
pub mod buzz;
/// User intents turned into outbound commands.
pub mod commands;
/// The reducer tying every controller together.
pub mod engine;
/// Round/stage ordering used to drop stale events.
pub mod epoch;
/// Normalized inbound events.
pub mod events;
/// Shared records: players, teams, rounds.
pub mod model;
/// Mode registry and per-mode extensions.
pub mod modes;
/// Snapshot restoration after reconnection.
pub mod reconnect;
/// Client roles and their permissions.
pub mod role;
/// Player and team bookkeeping.
pub mod roster;
/// Visible phase transitions.
pub mod state_machine;
/// Deadline-based countdowns.
pub mod timer;
