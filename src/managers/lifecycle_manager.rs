use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::info;
use uuid::Uuid;

use crate::error::{LiftClubError, Result};
use crate::models::{
    ApprovalDecision, LiftClub, LiftClubRequest, LiftClubRequestDraft, NewClub, RequestStatus,
};
use crate::state::{ClubRegistry, SharedClubRegistry, SharedRequestStore};
use crate::validator;

/// Published after a lifecycle change has been committed.
///
/// Notification delivery lives outside the core and subscribes here.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum LifecycleEvent {
    #[serde(rename_all = "camelCase")]
    Submitted {
        request_id: Uuid,
        requester_id: String,
    },
    #[serde(rename_all = "camelCase")]
    Approved { request_id: Uuid, club_id: Uuid },
    #[serde(rename_all = "camelCase")]
    Rejected { request_id: Uuid, reason: String },
    #[serde(rename_all = "camelCase")]
    Completed { request_id: Uuid },
}

/// Drives requests from pending to a final decision.
///
/// Every mutation runs under the request's own lock with no await inside,
/// so a decision and the club it produces land together or not at all.
pub struct LifecycleManager {
    requests: SharedRequestStore,
    registry: SharedClubRegistry,
    events: broadcast::Sender<LifecycleEvent>,
}

impl LifecycleManager {
    pub fn new(requests: SharedRequestStore, registry: SharedClubRegistry) -> Self {
        let (events, _) = broadcast::channel(256);
        Self {
            requests,
            registry,
            events,
        }
    }

    /// Subscribe to committed lifecycle changes
    pub fn subscribe(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.events.subscribe()
    }

    /// Validate a draft and record it as a pending request
    pub fn submit(
        &self,
        draft: LiftClubRequestDraft,
        requester_id: &str,
    ) -> Result<LiftClubRequest> {
        let result = validator::validate(&draft);
        if !result.is_valid {
            return Err(LiftClubError::ValidationFailed {
                errors: result.errors,
            });
        }

        let now = Utc::now();
        let request = LiftClubRequest {
            id: Uuid::new_v4(),
            requester_id: requester_id.to_string(),
            requester_role: draft.requester_role,
            route_type: draft.route_type,
            proposed_name: draft.proposed_name.trim().to_string(),
            pickup_location: draft.pickup_location.trim().to_string(),
            dropoff_location: draft.dropoff_location.trim().to_string(),
            preferred_departure_time: draft.preferred_departure_time,
            days_of_week: validator::normalized_days(&draft.days_of_week),
            // Range checked by the validator
            estimated_members: draft.estimated_members as u32,
            max_budget: draft.max_budget,
            description: draft.description.trim().to_string(),
            status: RequestStatus::Pending,
            admin_notes: None,
            rejection_reason: None,
            created_at: now,
            updated_at: now,
            decided_at: None,
            assigned_lift_club_id: None,
        };

        self.requests.insert(request.clone());
        info!(
            request_id = %request.id,
            requester_id,
            "Submitted request '{}'",
            request.proposed_name
        );
        self.publish(LifecycleEvent::Submitted {
            request_id: request.id,
            requester_id: requester_id.to_string(),
        });

        Ok(request)
    }

    /// Approve a pending request into a brand-new club
    pub fn approve(&self, request_id: Uuid, decision: ApprovalDecision) -> Result<LiftClub> {
        let _guard = self.registry.mutation_guard();
        let entry = self.requests.entry(request_id)?;
        let mut request = entry.lock();
        ensure_pending(&request)?;

        if decision.monthly_cost <= 0 {
            return Err(LiftClubError::InvalidDecision {
                message: format!("monthly cost must be positive, got {}", decision.monthly_cost),
            });
        }
        let min_members = request.estimated_members.max(1);
        if decision.max_members < min_members {
            return Err(LiftClubError::InvalidDecision {
                message: format!(
                    "max members {} is below the required minimum {}",
                    decision.max_members, min_members
                ),
            });
        }
        if let Some(arrival) = &decision.arrival_time {
            if !validator::is_valid_time(arrival) {
                return Err(LiftClubError::InvalidDecision {
                    message: format!("arrival time '{}' is not HH:MM", arrival),
                });
            }
        }

        let prepared = ClubRegistry::prepare(NewClub {
            name: request.proposed_name.clone(),
            club_type: request.route_type,
            pickup_location: request.pickup_location.clone(),
            dropoff_location: request.dropoff_location.clone(),
            departure_time: request.preferred_departure_time.clone(),
            arrival_time: decision.arrival_time,
            days_of_week: request.days_of_week.clone(),
            max_capacity: decision.max_members,
            monthly_fee: decision.monthly_cost,
            driver_id: decision.assigned_driver_id,
            distance_meters: decision.distance_meters,
            request_id: Some(request_id),
            founder_id: request.requester_id.clone(),
        })?;

        // Nothing below can fail: the club insert and the status flip commit together
        let club = self.registry.commit(prepared);
        mark_approved(&mut request, club.id, decision.notes.as_deref());
        drop(request);

        info!(request_id = %request_id, club_id = %club.id, "Request approved");
        self.publish(LifecycleEvent::Approved {
            request_id,
            club_id: club.id,
        });

        Ok(club)
    }

    /// Approve a pending request by seating its requester in an existing club.
    ///
    /// A full or inactive club leaves the request pending.
    pub fn approve_onto_existing(
        &self,
        request_id: Uuid,
        club_id: Uuid,
        notes: Option<&str>,
    ) -> Result<LiftClub> {
        let _guard = self.registry.mutation_guard();
        let entry = self.requests.entry(request_id)?;
        let mut request = entry.lock();
        ensure_pending(&request)?;

        self.registry.join(club_id, &request.requester_id)?;
        mark_approved(&mut request, club_id, notes);
        drop(request);

        info!(request_id = %request_id, club_id = %club_id, "Request approved onto existing club");
        self.publish(LifecycleEvent::Approved {
            request_id,
            club_id,
        });

        self.registry.get(club_id)
    }

    /// Reject a pending request. There is no way back from this.
    pub fn reject(&self, request_id: Uuid, reason: &str) -> Result<LiftClubRequest> {
        let entry = self.requests.entry(request_id)?;
        let mut request = entry.lock();
        ensure_pending(&request)?;

        let reason = reason.trim();
        if reason.is_empty() {
            return Err(LiftClubError::MissingReason);
        }

        let now = Utc::now();
        request.status = RequestStatus::Rejected;
        request.rejection_reason = Some(reason.to_string());
        request.decided_at = Some(now);
        request.updated_at = now;
        let rejected = request.clone();
        drop(request);

        info!(request_id = %request_id, "Request rejected: {}", reason);
        self.publish(LifecycleEvent::Rejected {
            request_id,
            reason: reason.to_string(),
        });

        Ok(rejected)
    }

    /// Explicit administrative close-out of an approved request
    pub fn complete(&self, request_id: Uuid, notes: Option<&str>) -> Result<LiftClubRequest> {
        let entry = self.requests.entry(request_id)?;
        let mut request = entry.lock();

        match request.status {
            RequestStatus::Approved => {}
            RequestStatus::Pending => {
                return Err(LiftClubError::InvalidTransition {
                    request_id,
                    from: request.status.to_string(),
                    to: RequestStatus::Completed.to_string(),
                });
            }
            RequestStatus::Rejected | RequestStatus::Completed => {
                return Err(already_decided(&request));
            }
        }

        let now = Utc::now();
        request.status = RequestStatus::Completed;
        request.updated_at = now;
        if let Some(note) = notes {
            append_note(&mut request, note);
        }
        let completed = request.clone();
        drop(request);

        info!(request_id = %request_id, "Request completed");
        self.publish(LifecycleEvent::Completed { request_id });

        Ok(completed)
    }

    /// Append an audit note. Allowed in every state.
    pub fn append_admin_note(&self, request_id: Uuid, note: &str) -> Result<LiftClubRequest> {
        let entry = self.requests.entry(request_id)?;
        let mut request = entry.lock();

        if note.trim().is_empty() {
            return Err(LiftClubError::ValidationFailed {
                errors: vec!["Note must not be empty".to_string()],
            });
        }
        append_note(&mut request, note);
        Ok(request.clone())
    }

    pub fn get(&self, request_id: Uuid) -> Result<LiftClubRequest> {
        self.requests.get(request_id)
    }

    /// Every request ever submitted
    pub fn history(&self) -> Vec<LiftClubRequest> {
        self.requests.snapshot()
    }

    fn publish(&self, event: LifecycleEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }
}

fn ensure_pending(request: &LiftClubRequest) -> Result<()> {
    if !request.status.is_terminal() {
        Ok(())
    } else {
        Err(already_decided(request))
    }
}

fn already_decided(request: &LiftClubRequest) -> LiftClubError {
    LiftClubError::AlreadyDecided {
        request_id: request.id,
        status: request.status.to_string(),
    }
}

fn mark_approved(request: &mut LiftClubRequest, club_id: Uuid, notes: Option<&str>) {
    let now = Utc::now();
    request.status = RequestStatus::Approved;
    request.assigned_lift_club_id = Some(club_id);
    request.decided_at = Some(now);
    request.updated_at = now;
    if let Some(note) = notes {
        append_note(request, note);
    }
}

fn append_note(request: &mut LiftClubRequest, note: &str) {
    let note = note.trim();
    if note.is_empty() {
        return;
    }
    let line = format!("[{}] {}", Utc::now().to_rfc3339(), note);
    match &mut request.admin_notes {
        Some(existing) => {
            existing.push('\n');
            existing.push_str(&line);
        }
        None => request.admin_notes = Some(line),
    }
}

/// Shared lifecycle manager type
pub type SharedLifecycleManager = Arc<LifecycleManager>;

pub fn create_shared_lifecycle_manager(
    requests: SharedRequestStore,
    registry: SharedClubRegistry,
) -> SharedLifecycleManager {
    Arc::new(LifecycleManager::new(requests, registry))
}
