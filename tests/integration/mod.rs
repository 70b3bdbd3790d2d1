//! Fixture behaviour against a live PostgreSQL server
//!
//! Every test returns early when `DATABASE_URL` is unset or unreachable.

pub mod fixture;
