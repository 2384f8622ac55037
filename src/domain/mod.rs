//! Domain layer: the click model, timeframe parsing and repository contracts.
//!
//! # Architecture
//!
//! - [`click_event`] - Click event model and ingress validation
//! - [`timeframe`] - `<integer><unit>` window parsing
//! - [`repositories`] - Storage trait definitions
//!
//! The domain layer has no dependencies on infrastructure or presentation
//! layers; the pipeline core in [`crate::application`] is written against the
//! traits defined here.

pub mod click_event;
pub mod repositories;
pub mod timeframe;
