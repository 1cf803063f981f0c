//! Domain model for the course portal's content-lock subsystem.
//!
//! Holds the wire/record types shared with the lock service, the
//! client-side [`LockCache`](locks::LockCache), the static course
//! navigation tree, and the pure navigation gate that turns lock state
//! into per-item sidebar affordances.

pub mod error;
pub mod gate;
pub mod locks;
pub mod navigation;
pub mod roles;
pub mod types;
