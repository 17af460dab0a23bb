//! HTTP transport for provider fetch attempts.

pub mod client;
