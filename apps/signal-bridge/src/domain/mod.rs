//! Domain Layer - Core bridge types and business rules.
//!
//! This layer contains the trade signal and connection types shared by the
//! rest of the crate. Types here depend only on serialization and decimal
//! support.

/// Trade signals and their results.
pub mod signal;

/// Endpoint configuration and connection lifecycle types.
pub mod connection;
