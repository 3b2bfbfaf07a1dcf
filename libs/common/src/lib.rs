//! Common library for the When Is The Last Time application
//!
//! This crate provides shared functionality used across the application
//! services, including database connectivity, the Redis cache used for
//! ephemeral registration state, and common error handling.

pub mod cache;
pub mod database;
pub mod error;
