//! Click acceptance at ingress.

use chrono::Utc;
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, warn};
use validator::Validate;

use crate::application::ad_directory::AdDirectory;
use crate::application::ingress::{IngressError, IngressHandle};
use crate::application::publisher::ClickPublisher;
use crate::application::rate_limiter::ClickRateLimiter;
use crate::domain::click_event::{ClickEvent, NewClick};
use crate::error::AppError;

/// Decides whether a click is accepted and hands accepted clicks to the
/// pipeline without waiting on any downstream dependency.
pub struct ClickService {
    ads: Arc<AdDirectory>,
    rate_limiter: Arc<ClickRateLimiter>,
    ingress: IngressHandle,
    publisher: Arc<ClickPublisher>,
}

impl ClickService {
    pub fn new(
        ads: Arc<AdDirectory>,
        rate_limiter: Arc<ClickRateLimiter>,
        ingress: IngressHandle,
        publisher: Arc<ClickPublisher>,
    ) -> Self {
        Self {
            ads,
            rate_limiter,
            ingress,
            publisher,
        }
    }

    /// Accepts or rejects a click.
    ///
    /// Checks run in order: field validation, ad existence, per-IP rate limit.
    /// An accepted click is queued for publication; if the queue is full it is
    /// written straight to the disk backup.
    ///
    /// # Errors
    ///
    /// - [`AppError::Validation`] for a malformed click
    /// - [`AppError::NotFound`] for an unknown ad
    /// - [`AppError::RateLimited`] when the IP exceeded its hourly ceiling
    /// - [`AppError::Unavailable`] when the ad cannot be looked up, or when
    ///   neither the queue nor the disk backup can take the click
    pub async fn record_click(&self, new_click: NewClick) -> Result<ClickEvent, AppError> {
        let result = self.accept(new_click).await;

        match &result {
            Ok(event) => {
                metrics::counter!("clicks_accepted_total").increment(1);
                debug!(click_id = %event.id, ad_id = %event.ad_id, "Click accepted");
            }
            Err(e) => {
                metrics::counter!("clicks_rejected_total", "reason" => e.code()).increment(1);
                debug!(reason = e.code(), "Click rejected");
            }
        }

        result
    }

    async fn accept(&self, new_click: NewClick) -> Result<ClickEvent, AppError> {
        new_click.validate()?;

        if !self.ads.exists(&new_click.ad_id).await? {
            return Err(AppError::not_found(
                "Ad not found",
                json!({ "ad_id": new_click.ad_id }),
            ));
        }

        let admitted_at = Utc::now();
        if !self
            .rate_limiter
            .check_and_record_at(&new_click.ip, admitted_at)
        {
            return Err(AppError::rate_limited(
                "Too many clicks from this address",
                json!({ "ip": new_click.ip }),
            ));
        }

        let event = ClickEvent::accept(new_click);

        match self.ingress.submit(event.clone()) {
            Ok(()) => Ok(event),
            Err(e) => {
                let reason = match &e {
                    IngressError::QueueFull(_) => "queue full",
                    IngressError::Closed(_) => "queue closed",
                };
                warn!(click_id = %event.id, reason, "Ingress queue refused click, backing up");

                if self.publisher.back_up(&e.into_event()).await.is_durable() {
                    Ok(event)
                } else {
                    // Nothing was recorded, so the attempt does not count.
                    self.rate_limiter.release(&event.ip, admitted_at);
                    Err(AppError::unavailable(
                        "Click could not be recorded",
                        json!({ "click_id": event.id }),
                    ))
                }
            }
        }
    }
}
