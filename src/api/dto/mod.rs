//! Data Transfer Objects for API requests and responses.

pub mod clicks;
pub mod health;
