//! Lyric synchronization
//!
//! - `synchronizer`: the session/cursor state machine and its events
//! - `shared`: a lock-guarded handle for hosts with several position paths
//! - `display`: previous/current/next rendering driven by sync events

pub mod display;
pub mod shared;
pub mod synchronizer;

pub use shared::SharedSynchronizer;
pub use synchronizer::LyricResolution;
