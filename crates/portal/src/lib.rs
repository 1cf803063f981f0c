//! `courseport-portal` library crate.
//!
//! Console front end for the content-lock client: configuration, sidebar
//! rendering, and the command interpreter. The binary entrypoint lives in
//! `main.rs`.

pub mod config;
pub mod console;
pub mod render;
