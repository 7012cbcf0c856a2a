// src/models.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Kind of route a club serves
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RouteType {
    School,
    Staff,
}

/// Who is asking for a new club
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequesterRole {
    Parent,
    Staff,
    #[default]
    Commuter,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    Pending,
    Approved,
    Rejected,
    Completed,
}

impl RequestStatus {
    /// Approved counts as terminal for field mutation; only the lifecycle
    /// manager moves it on to completed.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, RequestStatus::Pending)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Pending => "pending",
            RequestStatus::Approved => "approved",
            RequestStatus::Rejected => "rejected",
            RequestStatus::Completed => "completed",
        }
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClubStatus {
    Active,
    Full,
    Inactive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MembershipStatus {
    Active,
    Inactive,
    Pending,
}

/// A proposed club as submitted by a rider, before validation.
///
/// Numeric fields are wide so out-of-range input reaches the validator
/// instead of failing deserialization.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiftClubRequestDraft {
    #[serde(default)]
    pub requester_role: RequesterRole,
    pub route_type: RouteType,
    #[serde(default)]
    pub proposed_name: String,
    #[serde(default)]
    pub pickup_location: String,
    #[serde(default)]
    pub dropoff_location: String,
    #[serde(default)]
    pub preferred_departure_time: String,
    #[serde(default)]
    pub days_of_week: Vec<i64>,
    #[serde(default)]
    pub estimated_members: i64,
    #[serde(default)]
    pub max_budget: i64,
    #[serde(default)]
    pub description: String,
}

/// A rider's proposal to create a club
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiftClubRequest {
    pub id: Uuid,
    pub requester_id: String,
    pub requester_role: RequesterRole,
    pub route_type: RouteType,
    pub proposed_name: String,
    pub pickup_location: String,
    pub dropoff_location: String,
    pub preferred_departure_time: String,
    /// Sorted, Sunday = 0
    pub days_of_week: Vec<u8>,
    pub estimated_members: u32,
    pub max_budget: i64,
    pub description: String,
    pub status: RequestStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub admin_notes: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rejection_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decided_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assigned_lift_club_id: Option<Uuid>,
}

/// A recurring shared-ride group.
///
/// `current_members` and `status` are owned by the club registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiftClub {
    pub id: Uuid,
    pub name: String,
    #[serde(rename = "type")]
    pub club_type: RouteType,
    pub pickup_location: String,
    pub dropoff_location: String,
    pub departure_time: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arrival_time: Option<String>,
    pub days_of_week: Vec<u8>,
    pub max_capacity: u32,
    pub current_members: u32,
    pub monthly_fee: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub driver_id: Option<String>,
    /// Route length recorded by an external routing service, if known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distance_meters: Option<u32>,
    pub status: ClubStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl LiftClub {
    pub fn seats_left(&self) -> u32 {
        self.max_capacity.saturating_sub(self.current_members)
    }
}

/// Everything needed to allocate a new club
#[derive(Debug, Clone)]
pub struct NewClub {
    pub name: String,
    pub club_type: RouteType,
    pub pickup_location: String,
    pub dropoff_location: String,
    pub departure_time: String,
    pub arrival_time: Option<String>,
    pub days_of_week: Vec<u8>,
    pub max_capacity: u32,
    pub monthly_fee: i64,
    pub driver_id: Option<String>,
    pub distance_meters: Option<u32>,
    pub request_id: Option<Uuid>,
    /// Auto-enrolled as the first member
    pub founder_id: String,
}

/// Optional contact details captured on join
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberContact {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact_phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emergency_contact_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emergency_contact_phone: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Membership {
    pub id: Uuid,
    pub club_id: Uuid,
    pub member_id: String,
    #[serde(flatten)]
    pub contact: MemberContact,
    pub status: MembershipStatus,
    pub joined_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub left_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MembershipEventKind {
    Joined,
    Left,
}

/// Append-only record of membership changes, used for trends
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MembershipEvent {
    pub club_id: Uuid,
    pub member_id: String,
    pub kind: MembershipEventKind,
    pub at: DateTime<Utc>,
}

/// Admin decision used to approve a request into a brand-new club
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalDecision {
    #[serde(default)]
    pub assigned_driver_id: Option<String>,
    pub monthly_cost: i64,
    pub max_members: u32,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub arrival_time: Option<String>,
    #[serde(default)]
    pub distance_meters: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallerRole {
    Rider,
    Admin,
}

/// Identity of whoever invokes a read operation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Caller {
    pub id: String,
    pub role: CallerRole,
}

impl Caller {
    pub fn admin(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            role: CallerRole::Admin,
        }
    }

    pub fn rider(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            role: CallerRole::Rider,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == CallerRole::Admin
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_draft_uses_camel_case_fields() {
        let draft: LiftClubRequestDraft = serde_json::from_value(serde_json::json!({
            "routeType": "school",
            "proposedName": "X",
            "pickupLocation": "A",
            "dropoffLocation": "B",
            "preferredDepartureTime": "07:15",
            "daysOfWeek": [1, 2, 3],
            "estimatedMembers": 5,
            "maxBudget": 500,
            "description": "Need reliable morning transport for kids"
        }))
        .unwrap();

        assert_eq!(draft.route_type, RouteType::School);
        assert_eq!(draft.requester_role, RequesterRole::Commuter);
        assert_eq!(draft.days_of_week, vec![1, 2, 3]);
        assert_eq!(draft.max_budget, 500);
    }

    #[test]
    fn test_request_status_terminal() {
        assert!(!RequestStatus::Pending.is_terminal());
        assert!(RequestStatus::Approved.is_terminal());
        assert!(RequestStatus::Rejected.is_terminal());
        assert!(RequestStatus::Completed.is_terminal());
        assert_eq!(RequestStatus::Approved.to_string(), "approved");
    }

    #[test]
    fn test_club_serializes_type_field() {
        let now = Utc::now();
        let club = LiftClub {
            id: Uuid::new_v4(),
            name: "Morning run".to_string(),
            club_type: RouteType::Staff,
            pickup_location: "A".to_string(),
            dropoff_location: "B".to_string(),
            departure_time: "07:00".to_string(),
            arrival_time: None,
            days_of_week: vec![1],
            max_capacity: 4,
            current_members: 1,
            monthly_fee: 300,
            driver_id: None,
            distance_meters: None,
            status: ClubStatus::Active,
            request_id: None,
            created_at: now,
            updated_at: now,
        };

        let value = serde_json::to_value(&club).unwrap();
        assert_eq!(value["type"], "staff");
        assert_eq!(value["maxCapacity"], 4);
        assert_eq!(value["status"], "active");
        assert!(value.get("driverId").is_none());
        assert_eq!(club.seats_left(), 3);
    }
}
