//! Fixture behaviour against in-memory collaborators

pub mod lifecycle;
