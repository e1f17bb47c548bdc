//! Shared helpers: clocks, generators, rate limits

pub mod names;
pub mod rate_limit;
pub mod time;
