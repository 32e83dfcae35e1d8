//! Core toggle logic - storage mapping, audit trail and hook dispatch.
//!
//! Operations take a [`crate::context::ToggleContext`] and never hold state of
//! their own; the key-value store holds the only persisted copy of every entity.

pub mod application;
pub mod audit;
pub mod category;
pub mod feature;
pub mod hooks;
pub mod locks;
pub mod migrate;
