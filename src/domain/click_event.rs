//! Click event model for asynchronous click tracking.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

/// An accepted ad click travelling through the pipeline.
///
/// Created once at ingress and never mutated afterwards. Its terminal fate is
/// one of: persisted to storage, re-queued on the durable log, or written to
/// the disk backup.
///
/// The JSON form is the wire format on the durable log and the content of a
/// backup file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClickEvent {
    pub id: Uuid,
    pub ad_id: String,
    pub ip: String,
    pub playback_time: i32,
    pub timestamp: DateTime<Utc>,
}

impl ClickEvent {
    /// Stamps an id and the current time onto a validated click.
    pub fn accept(new_click: NewClick) -> Self {
        Self {
            id: Uuid::new_v4(),
            ad_id: new_click.ad_id,
            ip: new_click.ip,
            playback_time: new_click.playback_time,
            timestamp: Utc::now(),
        }
    }
}

/// Click data as submitted by the ingress collaborator, before acceptance.
///
/// # Validation
///
/// - `ad_id` must be non-empty
/// - `playback_time` must be strictly positive
/// - `ip` must parse as an IPv4 or IPv6 address
#[derive(Debug, Clone, Validate)]
pub struct NewClick {
    #[validate(length(min = 1, message = "Ad ID is required"))]
    pub ad_id: String,

    #[validate(ip(message = "IP address is malformed"))]
    pub ip: String,

    #[validate(range(min = 1, message = "Ad playback time must be greater than zero"))]
    pub playback_time: i32,
}

impl NewClick {
    pub fn new(ad_id: impl Into<String>, ip: impl Into<String>, playback_time: i32) -> Self {
        Self {
            ad_id: ad_id.into(),
            ip: ip.into(),
            playback_time,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accept_stamps_id_and_time() {
        let before = Utc::now();
        let event = ClickEvent::accept(NewClick::new("ad-1", "10.0.0.1", 12));

        assert_eq!(event.ad_id, "ad-1");
        assert_eq!(event.ip, "10.0.0.1");
        assert_eq!(event.playback_time, 12);
        assert!(event.timestamp >= before);
        assert!(!event.id.is_nil());
    }

    #[test]
    fn test_accept_assigns_distinct_ids() {
        let a = ClickEvent::accept(NewClick::new("ad-1", "10.0.0.1", 1));
        let b = ClickEvent::accept(NewClick::new("ad-1", "10.0.0.1", 1));

        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_validation_accepts_well_formed_click() {
        assert!(NewClick::new("ad-1", "192.168.1.1", 5).validate().is_ok());
        assert!(NewClick::new("ad-1", "::1", 5).validate().is_ok());
    }

    #[test]
    fn test_validation_rejects_missing_ad_id() {
        let errors = NewClick::new("", "192.168.1.1", 5).validate().unwrap_err();

        assert!(errors.field_errors().contains_key("ad_id"));
    }

    #[test]
    fn test_validation_rejects_non_positive_playback_time() {
        let zero = NewClick::new("ad-1", "192.168.1.1", 0).validate().unwrap_err();
        let negative = NewClick::new("ad-1", "192.168.1.1", -3).validate().unwrap_err();

        assert!(zero.field_errors().contains_key("playback_time"));
        assert!(negative.field_errors().contains_key("playback_time"));
    }

    #[test]
    fn test_validation_rejects_malformed_ip() {
        let errors = NewClick::new("ad-1", "999.1.1.1", 5).validate().unwrap_err();

        assert!(errors.field_errors().contains_key("ip"));
    }

    #[test]
    fn test_wire_format_field_names() {
        let event = ClickEvent::accept(NewClick::new("ad-7", "1.1.1.1", 30));
        let json = serde_json::to_value(&event).unwrap();

        assert_eq!(json["ad_id"], "ad-7");
        assert_eq!(json["ip"], "1.1.1.1");
        assert_eq!(json["playback_time"], 30);
        assert!(json["id"].is_string());
        assert!(json["timestamp"].is_string());
    }
}
