use std::sync::Arc;

use tracing::{info, warn};

use studio_pos_core::authz::{authorize, Action};
use studio_pos_core::domain::cancellation::{
    CancellationDecision, CancellationRequest, CancellationRequestId, CancellationStatus,
    Resolution,
};
use studio_pos_core::domain::movement::MovementId;
use studio_pos_core::domain::timestamp_now;
use studio_pos_core::domain::user::User;
use studio_pos_core::errors::{ApplicationError, DomainError};

use crate::repositories::CancellationRepository;

/// `pending -> approved | denied`. Staff open requests; only admins resolve
/// them. Failed calls leave movements and requests as they were.
pub struct CancellationWorkflow {
    requests: Arc<dyn CancellationRepository>,
}

impl CancellationWorkflow {
    pub fn new(requests: Arc<dyn CancellationRepository>) -> Self {
        Self { requests }
    }

    pub async fn request_cancellation(
        &self,
        movement_id: &MovementId,
        reason: &str,
        actor: &User,
    ) -> Result<CancellationRequest, ApplicationError> {
        authorize(actor, Action::RequestCancellation)?;
        let request = CancellationRequest::open(
            movement_id.clone(),
            actor.id.clone(),
            reason,
            timestamp_now(),
        )?;

        let opened = self.requests.open(request).await?;
        info!(
            event_name = "cancellation.opened",
            request_id = %opened.id,
            movement_id = %opened.movement_id,
            requested_by = %opened.requested_by,
            "cancellation request opened"
        );
        Ok(opened)
    }

    pub async fn list_requests(
        &self,
        status: Option<CancellationStatus>,
        actor: &User,
    ) -> Result<Vec<CancellationRequest>, ApplicationError> {
        authorize(actor, Action::ListCancellationRequests)?;
        Ok(self.requests.list(status).await?)
    }

    pub async fn approve(
        &self,
        id: &CancellationRequestId,
        admin_notes: Option<String>,
        actor: &User,
    ) -> Result<CancellationRequest, ApplicationError> {
        self.resolve(id, CancellationDecision::Approved, admin_notes, actor).await
    }

    pub async fn deny(
        &self,
        id: &CancellationRequestId,
        admin_notes: Option<String>,
        actor: &User,
    ) -> Result<CancellationRequest, ApplicationError> {
        self.resolve(id, CancellationDecision::Denied, admin_notes, actor).await
    }

    pub async fn resolve(
        &self,
        id: &CancellationRequestId,
        decision: CancellationDecision,
        admin_notes: Option<String>,
        actor: &User,
    ) -> Result<CancellationRequest, ApplicationError> {
        if let Err(error) = authorize(actor, Action::ResolveCancellation) {
            warn!(
                event_name = "cancellation.resolve_forbidden",
                request_id = %id,
                actor = %actor.id,
                "non-admin attempted to resolve a cancellation request"
            );
            return Err(error.into());
        }

        let resolution = Resolution::new(decision, actor.id.clone(), admin_notes, timestamp_now());
        let resolved = match self.requests.resolve(id, resolution).await {
            Ok(resolved) => resolved,
            Err(error) => {
                let error = ApplicationError::from(error);
                if let ApplicationError::Domain(DomainError::AlreadyResolved { status, .. }) =
                    &error
                {
                    info!(
                        event_name = "cancellation.already_resolved",
                        request_id = %id,
                        status = status.as_str(),
                        "cancellation request was already resolved"
                    );
                }
                return Err(error);
            }
        };

        match resolved.status {
            CancellationStatus::Approved => info!(
                event_name = "cancellation.approved",
                request_id = %resolved.id,
                movement_id = %resolved.movement_id,
                reviewed_by = %actor.id,
                "cancellation approved; movement deleted"
            ),
            _ => info!(
                event_name = "cancellation.denied",
                request_id = %resolved.id,
                movement_id = %resolved.movement_id,
                reviewed_by = %actor.id,
                "cancellation denied; movement restored"
            ),
        }
        Ok(resolved)
    }
}
