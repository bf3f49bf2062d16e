//! Core types, config, and errors for the Chalk tutoring engine.

pub mod config;
pub mod error;
pub mod types;
