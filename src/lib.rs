//! Slidegate - Sliding-Window Request Rate Limiting
//!
//! This crate decides, per request key, whether an outbound call may proceed
//! under a trailing time-window quota. Limiters can be used on their own or
//! grouped behind prefix rules, wrapped around outbound calls, and pruned in
//! the background.

pub mod config;
pub mod error;
pub mod gate;
pub mod guard;
pub mod ratelimit;
pub mod replay;
pub mod sweeper;
