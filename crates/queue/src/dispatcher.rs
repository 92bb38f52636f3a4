//! Activity dispatch.
//!
//! Every dequeued job goes through [`DeliveryDispatcher::process`]:
//!
//! 1. The job's delivery event records one more attempt.
//! 2. Inbound jobs pass the algorithm gate, then signature verification
//!    (skipped for `Delete`), then go to the [`ActivityHandler`] method for
//!    their type. Outbound jobs go to [`OutboundDelivery`].
//! 3. The outcome settles the event: success, failed, or still waiting when
//!    the error is transient and the retry sweep may try again.
//!
//! Handlers must be idempotent. Delivering the same `Follow` twice must
//! leave one follow edge, and a second `Accept` for an accepted follow is a
//! no-op.

#![allow(missing_docs)]

use std::sync::Arc;

use apub_common::AppError;
use apub_federation::{
    Activity, ActivityType, FederationClientError, SignatureValidator, ValidationError,
    VerifiedActor,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::event::{Attempt, DeliveryEventStore, DeliveryResult};
use crate::jobs::{InboxJob, JobPayload, Lane, QueuedJob};
use crate::workers::OutboundDelivery;

/// How a failure should be treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Missing key, user agent or host. Fails before I/O, never retried.
    Configuration,
    /// Malformed or unverifiable input. Resending it fails the same way.
    Protocol,
    /// Network trouble, timeouts, remote 5xx. Left for the retry sweep.
    Transient,
    /// The remote answered 4xx.
    RemoteRejection,
}

/// Dispatch error type.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Signature validation failed: {0}")]
    Validation(#[from] ValidationError),
    #[error("Handler failed: {0}")]
    Handler(AppError),
    #[error("Delivery failed: {0}")]
    Delivery(#[from] FederationClientError),
    #[error("Key material lookup failed: {0}")]
    KeyMaterial(AppError),
    #[error("No key material for actor: {0}")]
    MissingKeyMaterial(String),
    #[error("Invalid inbox URL: {0}")]
    InvalidInbox(String),
    #[error("No outbound delivery configured")]
    DeliveryNotConfigured,
    #[error("Undo by {outer} wraps an activity by {inner}")]
    ActorMismatch { outer: String, inner: String },
    #[error("Delivery event bookkeeping failed: {0}")]
    Bookkeeping(AppError),
}

impl DispatchError {
    #[must_use]
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::Validation(e) if e.is_transient() => ErrorClass::Transient,
            Self::Validation(_) | Self::ActorMismatch { .. } => ErrorClass::Protocol,
            Self::Handler(e) | Self::KeyMaterial(e) => match e {
                _ if e.is_transient() => ErrorClass::Transient,
                AppError::Config(_) => ErrorClass::Configuration,
                _ => ErrorClass::Protocol,
            },
            Self::Delivery(e) if e.is_configuration() => ErrorClass::Configuration,
            Self::Delivery(e) if e.is_retryable() => ErrorClass::Transient,
            Self::Delivery(FederationClientError::RemoteRejected { .. }) => {
                ErrorClass::RemoteRejection
            }
            Self::Delivery(_) => ErrorClass::Protocol,
            Self::MissingKeyMaterial(_) | Self::InvalidInbox(_) | Self::DeliveryNotConfigured => {
                ErrorClass::Configuration
            }
            Self::Bookkeeping(_) => ErrorClass::Transient,
        }
    }
}

/// What a successful dispatch did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// A handler ran, or the activity was delivered.
    Handled,
    /// Verified, but nothing handles this activity type.
    Ignored,
    /// The event was already settled; the job was dropped untouched.
    AlreadySettled,
    /// Another worker is running this event; the duplicate job was dropped.
    InFlight,
}

/// Where an inbound activity came from and who signed it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Origin {
    pub lane: Lane,
    /// Local actor whose inbox or outbox received the activity.
    pub recipient: Option<String>,
    /// `None` only for unsigned `Delete`s.
    pub signer: Option<VerifiedActor>,
}

/// Applies verified activities to local state.
///
/// Implementations own persistence and must be idempotent per activity.
#[async_trait]
pub trait ActivityHandler: Send + Sync {
    /// Persist the carried note.
    async fn create(&self, activity: &Activity, origin: &Origin) -> Result<(), AppError>;

    /// Create a pending or approved follow edge.
    async fn follow(&self, activity: &Activity, origin: &Origin) -> Result<(), AppError>;

    /// Resolve a pending follow request as accepted.
    async fn accept(&self, activity: &Activity, origin: &Origin) -> Result<(), AppError>;

    /// Resolve a pending follow request as rejected.
    async fn reject(&self, activity: &Activity, origin: &Origin) -> Result<(), AppError>;

    /// Create a reblog.
    async fn announce(&self, activity: &Activity, origin: &Origin) -> Result<(), AppError>;

    /// Tombstone the deleted actor or object.
    async fn delete(&self, activity: &Activity, origin: &Origin) -> Result<(), AppError>;

    /// Remove the follow edge `follow` created.
    async fn undo_follow(
        &self,
        undo: &Activity,
        follow: &Activity,
        origin: &Origin,
    ) -> Result<(), AppError>;

    /// Remove the favourite `like` created.
    async fn undo_like(
        &self,
        undo: &Activity,
        like: &Activity,
        origin: &Origin,
    ) -> Result<(), AppError>;

    /// Remove the reblog `announce` created.
    async fn undo_announce(
        &self,
        undo: &Activity,
        announce: &Activity,
        origin: &Origin,
    ) -> Result<(), AppError>;

    /// An `Undo` whose object is only an id, so what it reverses is unknown
    /// here. Handlers that index activities by id can resolve it.
    async fn undo_by_id(
        &self,
        undo: &Activity,
        object_id: &str,
        _origin: &Origin,
    ) -> Result<(), AppError> {
        debug!(activity_id = ?undo.id, object_id, "Ignoring Undo of unresolved object");
        Ok(())
    }

    /// Create a favourite.
    async fn like(&self, activity: &Activity, _origin: &Origin) -> Result<(), AppError> {
        debug!(activity_id = ?activity.id, "Like not handled");
        Ok(())
    }

    /// Refresh the updated actor or note.
    async fn update(&self, activity: &Activity, _origin: &Origin) -> Result<(), AppError> {
        debug!(activity_id = ?activity.id, "Update not handled");
        Ok(())
    }
}

/// Runs queued jobs and settles their delivery events.
#[derive(Clone)]
pub struct DeliveryDispatcher {
    validator: SignatureValidator,
    handler: Arc<dyn ActivityHandler>,
    events: Arc<dyn DeliveryEventStore>,
    delivery: Option<OutboundDelivery>,
}

impl DeliveryDispatcher {
    #[must_use]
    pub fn new(
        validator: SignatureValidator,
        handler: Arc<dyn ActivityHandler>,
        events: Arc<dyn DeliveryEventStore>,
    ) -> Self {
        Self {
            validator,
            handler,
            events,
            delivery: None,
        }
    }

    /// Enable the deliver lane.
    #[must_use]
    pub fn with_delivery(mut self, delivery: OutboundDelivery) -> Self {
        self.delivery = Some(delivery);
        self
    }

    /// Run one job to completion and record the result on its event.
    ///
    /// Errors are returned after they are recorded; they never leave the
    /// event half-updated.
    pub async fn process(&self, job: &QueuedJob) -> Result<DispatchOutcome, DispatchError> {
        let activity_type = job.payload.activity_type();
        let activity_id = job.payload.activity_id().unwrap_or_default();

        let attempt = match self.events.begin_attempt(&job.event_id, Utc::now()).await {
            Ok(Attempt::Started(attempt)) => attempt,
            Ok(Attempt::Settled) => {
                debug!(event_id = %job.event_id, "Delivery event already settled, dropping job");
                return Ok(DispatchOutcome::AlreadySettled);
            }
            Ok(Attempt::InFlight) => {
                debug!(event_id = %job.event_id, "Delivery event claimed by another worker, dropping job");
                return Ok(DispatchOutcome::InFlight);
            }
            Err(e) => {
                error!(
                    event_id = %job.event_id,
                    lane = %job.lane,
                    activity_type,
                    activity_id,
                    error = %e,
                    "Could not start job"
                );
                return Err(DispatchError::Bookkeeping(e));
            }
        };

        debug!(
            event_id = %job.event_id,
            lane = %job.lane,
            attempt,
            activity_type,
            activity_id,
            "Processing job"
        );

        let result = match &job.payload {
            JobPayload::Inbound(inbound) => {
                self.dispatch_inbound(inbound, job.lane, Utc::now()).await
            }
            JobPayload::Deliver(deliver) => match &self.delivery {
                Some(delivery) => delivery
                    .deliver(deliver)
                    .await
                    .map(|()| DispatchOutcome::Handled),
                None => Err(DispatchError::DeliveryNotConfigured),
            },
        };

        let (state, last_error) = match &result {
            Ok(_) => (DeliveryResult::Success, None),
            Err(e) => {
                let class = e.class();
                error!(
                    event_id = %job.event_id,
                    lane = %job.lane,
                    attempt,
                    activity_type,
                    activity_id,
                    class = ?class,
                    error = %e,
                    "Job failed"
                );
                let state = if class == ErrorClass::Transient {
                    DeliveryResult::Waiting
                } else {
                    DeliveryResult::Failed
                };
                (state, Some(e.to_string()))
            }
        };

        if let Err(e) = self.events.complete(&job.event_id, state, last_error).await {
            error!(
                event_id = %job.event_id,
                lane = %job.lane,
                attempt,
                activity_type,
                activity_id,
                error = %e,
                "Could not record job result"
            );
            return Err(DispatchError::Bookkeeping(e));
        }
        result
    }

    /// Verify and handle one inbound activity. Does not touch delivery events.
    pub async fn dispatch_inbound(
        &self,
        job: &InboxJob,
        lane: Lane,
        now: DateTime<Utc>,
    ) -> Result<DispatchOutcome, DispatchError> {
        let activity = &job.activity;
        let request = &job.request;

        let signer = if activity.kind == ActivityType::Delete {
            // Deletes must propagate even after the origin's key is gone.
            if request.is_signed() {
                SignatureValidator::algorithm_gate(request)?;
            }
            None
        } else {
            Some(self.validator.validate(request, activity, now).await?)
        };

        let origin = Origin {
            lane,
            recipient: job.recipient.clone(),
            signer,
        };
        self.handle(activity, &origin).await
    }

    async fn handle(
        &self,
        activity: &Activity,
        origin: &Origin,
    ) -> Result<DispatchOutcome, DispatchError> {
        let handler = &self.handler;
        let handled = match &activity.kind {
            ActivityType::Create => handler.create(activity, origin).await,
            ActivityType::Follow => handler.follow(activity, origin).await,
            ActivityType::Accept => handler.accept(activity, origin).await,
            ActivityType::Reject => handler.reject(activity, origin).await,
            ActivityType::Announce => handler.announce(activity, origin).await,
            ActivityType::Delete => handler.delete(activity, origin).await,
            ActivityType::Like => handler.like(activity, origin).await,
            ActivityType::Update => handler.update(activity, origin).await,
            ActivityType::Undo => return self.handle_undo(activity, origin).await,
            other => {
                info!(
                    activity_type = %other,
                    activity_id = ?activity.id,
                    "Dropping unhandled activity type"
                );
                return Ok(DispatchOutcome::Ignored);
            }
        };
        handled.map_err(DispatchError::Handler)?;
        Ok(DispatchOutcome::Handled)
    }

    async fn handle_undo(
        &self,
        undo: &Activity,
        origin: &Origin,
    ) -> Result<DispatchOutcome, DispatchError> {
        let object = undo.single_object().ok_or_else(|| {
            DispatchError::Handler(AppError::BadRequest(
                "Undo must wrap exactly one object".to_string(),
            ))
        })?;

        let Some(inner) = object.as_activity() else {
            let Some(object_id) = object.id() else {
                return Err(DispatchError::Handler(AppError::BadRequest(
                    "Undo object has no id".to_string(),
                )));
            };
            self.handler
                .undo_by_id(undo, object_id, origin)
                .await
                .map_err(DispatchError::Handler)?;
            return Ok(DispatchOutcome::Handled);
        };

        // Only the actor that did something may undo it.
        let outer_ids = undo.actor_ids();
        let inner_ids = inner.actor_ids();
        if outer_ids != inner_ids {
            warn!(activity_id = ?undo.id, "Undo actor does not match wrapped activity");
            return Err(DispatchError::ActorMismatch {
                outer: outer_ids.join(","),
                inner: inner_ids.join(","),
            });
        }

        let handled = match &inner.kind {
            ActivityType::Follow => self.handler.undo_follow(undo, inner, origin).await,
            ActivityType::Like => self.handler.undo_like(undo, inner, origin).await,
            ActivityType::Announce => self.handler.undo_announce(undo, inner, origin).await,
            other => {
                info!(
                    activity_type = %other,
                    activity_id = ?undo.id,
                    "Dropping Undo of unhandled activity type"
                );
                return Ok(DispatchOutcome::Ignored);
            }
        };
        handled.map_err(DispatchError::Handler)?;
        Ok(DispatchOutcome::Handled)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classes() {
        assert_eq!(
            DispatchError::from(ValidationError::SignatureIsNotValid).class(),
            ErrorClass::Protocol
        );
        assert_eq!(
            DispatchError::from(ValidationError::Directory(AppError::ExternalService(
                "down".into()
            )))
            .class(),
            ErrorClass::Transient
        );
        assert_eq!(
            DispatchError::from(FederationClientError::Unreachable("timeout".into())).class(),
            ErrorClass::Transient
        );
        assert_eq!(
            DispatchError::from(FederationClientError::RemoteRejected {
                status: 503,
                body: String::new()
            })
            .class(),
            ErrorClass::Transient
        );
        assert_eq!(
            DispatchError::from(FederationClientError::RemoteRejected {
                status: 403,
                body: String::new()
            })
            .class(),
            ErrorClass::RemoteRejection
        );
        assert_eq!(
            DispatchError::from(FederationClientError::MissingUserAgent).class(),
            ErrorClass::Configuration
        );
        assert_eq!(
            DispatchError::Handler(AppError::Database("gone".into())).class(),
            ErrorClass::Transient
        );
        assert_eq!(
            DispatchError::Handler(AppError::NotFound("note".into())).class(),
            ErrorClass::Protocol
        );
    }
}
