use chrono::Utc;
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{LiftClubError, Result};
use crate::models::{
    ClubStatus, LiftClub, MemberContact, Membership, MembershipEvent, MembershipEventKind,
    MembershipStatus, NewClub,
};

/// A club together with every membership it has ever had
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClubSnapshot {
    pub club: LiftClub,
    pub memberships: Vec<Membership>,
}

impl ClubSnapshot {
    fn active_membership(&self, member_id: &str) -> Option<&Membership> {
        self.memberships
            .iter()
            .find(|m| m.member_id == member_id && m.status == MembershipStatus::Active)
    }

    fn active_count(&self) -> usize {
        self.memberships
            .iter()
            .filter(|m| m.status == MembershipStatus::Active)
            .count()
    }

    fn check_invariants(&self) -> Result<()> {
        let club = &self.club;
        if club.max_capacity < 1 {
            return Err(LiftClubError::InvariantViolation {
                message: format!("club {} has capacity {}", club.id, club.max_capacity),
            });
        }
        if club.current_members > club.max_capacity {
            return Err(LiftClubError::InvariantViolation {
                message: format!(
                    "club {} has {} members but capacity {}",
                    club.id, club.current_members, club.max_capacity
                ),
            });
        }
        let mut seen = HashSet::new();
        for membership in self
            .memberships
            .iter()
            .filter(|m| m.status == MembershipStatus::Active)
        {
            if !seen.insert(membership.member_id.as_str()) {
                return Err(LiftClubError::InvariantViolation {
                    message: format!(
                        "club {} has more than one active membership for {}",
                        club.id, membership.member_id
                    ),
                });
            }
        }
        if self.active_count() != club.current_members as usize {
            return Err(LiftClubError::InvariantViolation {
                message: format!(
                    "club {} counts {} members but has {} active memberships",
                    club.id,
                    club.current_members,
                    self.active_count()
                ),
            });
        }
        let expected = derive_status(club.current_members, club.max_capacity, club.status);
        if club.status != expected {
            return Err(LiftClubError::InvariantViolation {
                message: format!(
                    "club {} is {:?} but membership implies {:?}",
                    club.id, club.status, expected
                ),
            });
        }
        Ok(())
    }
}

/// A validated club that has not been inserted yet.
///
/// Lets a caller do the fallible part of club creation first and then
/// commit with an infallible insert inside its own critical section.
#[derive(Debug)]
pub struct PreparedClub(ClubSnapshot);

impl PreparedClub {
    pub fn club(&self) -> &LiftClub {
        &self.0.club
    }
}

/// The one place club status is derived from membership.
///
/// Inactive is sticky: only administrative deactivation sets it and
/// membership changes never clear it.
fn derive_status(current_members: u32, max_capacity: u32, previous: ClubStatus) -> ClubStatus {
    if previous == ClubStatus::Inactive {
        ClubStatus::Inactive
    } else if current_members >= max_capacity {
        ClubStatus::Full
    } else {
        ClubStatus::Active
    }
}

/// Owns every club and is the only writer of membership counts.
///
/// Each club sits behind its own mutex, so joins on one club never wait
/// on another club.
pub struct ClubRegistry {
    clubs: DashMap<Uuid, Arc<Mutex<ClubSnapshot>>>,
    events: Mutex<Vec<MembershipEvent>>,
    /// Shared by every mutation, exclusive while a snapshot is captured
    gate: RwLock<()>,
}

impl Default for ClubRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ClubRegistry {
    pub fn new() -> Self {
        Self {
            clubs: DashMap::new(),
            events: Mutex::new(Vec::new()),
            gate: RwLock::new(()),
        }
    }

    /// Hold while mutating clubs or the requests that point at them.
    ///
    /// Recursive, so a holder may call back into the registry.
    pub fn mutation_guard(&self) -> RwLockReadGuard<'_, ()> {
        self.gate.read_recursive()
    }

    /// Block every mutation until the guard drops
    pub fn freeze(&self) -> RwLockWriteGuard<'_, ()> {
        self.gate.write()
    }

    /// Rebuild a registry from persisted state, refusing inconsistent clubs
    pub fn restore(clubs: Vec<ClubSnapshot>, events: Vec<MembershipEvent>) -> Result<Self> {
        let registry = Self::new();
        for snapshot in clubs {
            snapshot.check_invariants()?;
            registry
                .clubs
                .insert(snapshot.club.id, Arc::new(Mutex::new(snapshot)));
        }
        *registry.events.lock() = events;
        Ok(registry)
    }

    /// Validate a new club without inserting it
    pub fn prepare(new_club: NewClub) -> Result<PreparedClub> {
        if new_club.max_capacity < 1 {
            return Err(LiftClubError::InvalidCapacity {
                message: format!("max capacity must be at least 1, got {}", new_club.max_capacity),
            });
        }

        // The founder is enrolled straight away
        let current_members = 1;
        if current_members > new_club.max_capacity {
            return Err(LiftClubError::InvalidCapacity {
                message: format!(
                    "{} founding members exceed capacity {}",
                    current_members, new_club.max_capacity
                ),
            });
        }

        let now = Utc::now();
        let id = Uuid::new_v4();
        let club = LiftClub {
            id,
            name: new_club.name,
            club_type: new_club.club_type,
            pickup_location: new_club.pickup_location,
            dropoff_location: new_club.dropoff_location,
            departure_time: new_club.departure_time,
            arrival_time: new_club.arrival_time,
            days_of_week: new_club.days_of_week,
            max_capacity: new_club.max_capacity,
            current_members,
            monthly_fee: new_club.monthly_fee,
            driver_id: new_club.driver_id,
            distance_meters: new_club.distance_meters,
            status: derive_status(current_members, new_club.max_capacity, ClubStatus::Active),
            request_id: new_club.request_id,
            created_at: now,
            updated_at: now,
        };
        let founder = Membership {
            id: Uuid::new_v4(),
            club_id: id,
            member_id: new_club.founder_id,
            contact: MemberContact::default(),
            status: MembershipStatus::Active,
            joined_at: now,
            left_at: None,
        };

        Ok(PreparedClub(ClubSnapshot {
            club,
            memberships: vec![founder],
        }))
    }

    /// Insert a prepared club. Cannot fail.
    pub fn commit(&self, prepared: PreparedClub) -> LiftClub {
        let _guard = self.mutation_guard();
        let snapshot = prepared.0;
        let club = snapshot.club.clone();
        {
            let mut events = self.events.lock();
            for member in &snapshot.memberships {
                events.push(MembershipEvent {
                    club_id: club.id,
                    member_id: member.member_id.clone(),
                    kind: MembershipEventKind::Joined,
                    at: member.joined_at,
                });
            }
        }
        self.clubs.insert(club.id, Arc::new(Mutex::new(snapshot)));
        info!(
            club_id = %club.id,
            capacity = club.max_capacity,
            "Created club '{}'",
            club.name
        );
        club
    }

    /// Allocate a new club with its founder enrolled
    pub fn create_club(&self, new_club: NewClub) -> Result<LiftClub> {
        let prepared = Self::prepare(new_club)?;
        Ok(self.commit(prepared))
    }

    pub fn join(&self, club_id: Uuid, member_id: &str) -> Result<Membership> {
        self.join_with_contact(club_id, member_id, MemberContact::default())
    }

    /// Atomically check for a free seat and take it.
    ///
    /// Joining again while already an active member returns the existing
    /// membership.
    pub fn join_with_contact(
        &self,
        club_id: Uuid,
        member_id: &str,
        contact: MemberContact,
    ) -> Result<Membership> {
        let _guard = self.mutation_guard();
        let entry = self.entry(club_id)?;
        let mut record = entry.lock();

        if record.club.status == ClubStatus::Inactive {
            return Err(LiftClubError::ClubInactive { club_id });
        }
        if let Some(existing) = record.active_membership(member_id) {
            debug!(club_id = %club_id, member_id, "Member already in club");
            return Ok(existing.clone());
        }

        let club = &record.club;
        if club.current_members > club.max_capacity {
            return Err(LiftClubError::InvariantViolation {
                message: format!(
                    "club {} has {} members but capacity {}",
                    club_id, club.current_members, club.max_capacity
                ),
            });
        }
        if club.seats_left() == 0 {
            return Err(LiftClubError::ClubFull { club_id });
        }

        let now = Utc::now();
        let membership = Membership {
            id: Uuid::new_v4(),
            club_id,
            member_id: member_id.to_string(),
            contact,
            status: MembershipStatus::Active,
            joined_at: now,
            left_at: None,
        };

        let club = &mut record.club;
        club.current_members += 1;
        club.status = derive_status(club.current_members, club.max_capacity, club.status);
        club.updated_at = now;
        let (current, status) = (club.current_members, club.status);
        record.memberships.push(membership.clone());
        drop(record);

        self.record_event(club_id, member_id, MembershipEventKind::Joined, now);
        info!(
            club_id = %club_id,
            member_id,
            current_members = current,
            status = ?status,
            "Member joined club"
        );

        Ok(membership)
    }

    /// Release a member's seat. Does nothing if they hold no active seat.
    pub fn leave(&self, club_id: Uuid, member_id: &str) -> Result<()> {
        let _guard = self.mutation_guard();
        let entry = self.entry(club_id)?;
        let mut record = entry.lock();

        let Some(index) = record
            .memberships
            .iter()
            .position(|m| m.member_id == member_id && m.status == MembershipStatus::Active)
        else {
            debug!(club_id = %club_id, member_id, "Leave ignored, no active membership");
            return Ok(());
        };

        if record.club.current_members == 0 {
            return Err(LiftClubError::InvariantViolation {
                message: format!("club {} has an active member but a zero count", club_id),
            });
        }

        let now = Utc::now();
        let membership = &mut record.memberships[index];
        membership.status = MembershipStatus::Inactive;
        membership.left_at = Some(now);

        let club = &mut record.club;
        club.current_members -= 1;
        club.status = derive_status(club.current_members, club.max_capacity, club.status);
        club.updated_at = now;
        let current = club.current_members;
        drop(record);

        self.record_event(club_id, member_id, MembershipEventKind::Left, now);
        info!(
            club_id = %club_id,
            member_id,
            current_members = current,
            "Member left club"
        );

        Ok(())
    }

    /// Administratively retire a club; further joins fail
    pub fn deactivate(&self, club_id: Uuid) -> Result<LiftClub> {
        let _guard = self.mutation_guard();
        let entry = self.entry(club_id)?;
        let mut record = entry.lock();
        if record.club.status != ClubStatus::Inactive {
            record.club.status = ClubStatus::Inactive;
            record.club.updated_at = Utc::now();
            info!(club_id = %club_id, "Club deactivated");
        }
        Ok(record.club.clone())
    }

    pub fn get(&self, club_id: Uuid) -> Result<LiftClub> {
        let entry = self.entry(club_id)?;
        let record = entry.lock();
        Ok(record.club.clone())
    }

    /// All memberships of a club, including inactive ones
    pub fn memberships(&self, club_id: Uuid) -> Result<Vec<Membership>> {
        let entry = self.entry(club_id)?;
        let record = entry.lock();
        Ok(record.memberships.clone())
    }

    /// Consistent copy of every club.
    ///
    /// Each club is copied under its own lock so no half-updated club is
    /// ever observed.
    pub fn snapshot(&self) -> Vec<LiftClub> {
        self.entries()
            .into_iter()
            .map(|entry| entry.lock().club.clone())
            .collect()
    }

    /// Full export for persistence
    pub fn export(&self) -> Vec<ClubSnapshot> {
        self.entries()
            .into_iter()
            .map(|entry| entry.lock().clone())
            .collect()
    }

    pub fn membership_events(&self) -> Vec<MembershipEvent> {
        self.events.lock().clone()
    }

    pub fn club_count(&self) -> usize {
        self.clubs.len()
    }

    fn entry(&self, club_id: Uuid) -> Result<Arc<Mutex<ClubSnapshot>>> {
        // Clone the Arc so the map shard is released before locking the club
        self.clubs
            .get(&club_id)
            .map(|r| r.value().clone())
            .ok_or_else(|| LiftClubError::not_found("Club", club_id))
    }

    fn entries(&self) -> Vec<Arc<Mutex<ClubSnapshot>>> {
        self.clubs.iter().map(|r| r.value().clone()).collect()
    }

    fn record_event(
        &self,
        club_id: Uuid,
        member_id: &str,
        kind: MembershipEventKind,
        at: chrono::DateTime<Utc>,
    ) {
        self.events.lock().push(MembershipEvent {
            club_id,
            member_id: member_id.to_string(),
            kind,
            at,
        });
    }
}

/// Shared club registry type
pub type SharedClubRegistry = Arc<ClubRegistry>;

pub fn create_shared_club_registry(registry: ClubRegistry) -> SharedClubRegistry {
    Arc::new(registry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RouteType;

    fn new_club(capacity: u32) -> NewClub {
        NewClub {
            name: "School run".to_string(),
            club_type: RouteType::School,
            pickup_location: "Oak Street".to_string(),
            dropoff_location: "Hillside Primary".to_string(),
            departure_time: "07:15".to_string(),
            arrival_time: None,
            days_of_week: vec![1, 2, 3, 4, 5],
            max_capacity: capacity,
            monthly_fee: 480,
            driver_id: None,
            distance_meters: None,
            request_id: None,
            founder_id: "founder".to_string(),
        }
    }

    #[test]
    fn test_create_club_enrolls_founder() {
        let registry = ClubRegistry::new();
        let club = registry.create_club(new_club(8)).unwrap();

        assert_eq!(club.current_members, 1);
        assert_eq!(club.status, ClubStatus::Active);

        let members = registry.memberships(club.id).unwrap();
        assert_eq!(members.len(), 1);
        assert_eq!(members[0].member_id, "founder");
        assert_eq!(registry.membership_events().len(), 1);
    }

    #[test]
    fn test_create_club_capacity_one_is_full() {
        let registry = ClubRegistry::new();
        let club = registry.create_club(new_club(1)).unwrap();
        assert_eq!(club.status, ClubStatus::Full);
    }

    #[test]
    fn test_create_club_rejects_zero_capacity() {
        let registry = ClubRegistry::new();
        let err = registry.create_club(new_club(0)).unwrap_err();
        assert!(matches!(err, LiftClubError::InvalidCapacity { .. }));
        assert_eq!(registry.club_count(), 0);
    }

    #[test]
    fn test_join_until_full() {
        let registry = ClubRegistry::new();
        let club = registry.create_club(new_club(3)).unwrap();

        registry.join(club.id, "rider-1").unwrap();
        assert_eq!(registry.get(club.id).unwrap().status, ClubStatus::Active);

        registry.join(club.id, "rider-2").unwrap();
        let full = registry.get(club.id).unwrap();
        assert_eq!(full.current_members, 3);
        assert_eq!(full.status, ClubStatus::Full);

        let err = registry.join(club.id, "rider-3").unwrap_err();
        assert!(matches!(err, LiftClubError::ClubFull { club_id } if club_id == club.id));
    }

    #[test]
    fn test_join_is_idempotent() {
        let registry = ClubRegistry::new();
        let club = registry.create_club(new_club(5)).unwrap();

        let first = registry.join(club.id, "rider").unwrap();
        let second = registry.join(club.id, "rider").unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(registry.get(club.id).unwrap().current_members, 2);
    }

    #[test]
    fn test_join_unknown_club() {
        let registry = ClubRegistry::new();
        let err = registry.join(Uuid::new_v4(), "rider").unwrap_err();
        assert!(matches!(err, LiftClubError::NotFound { entity: "Club", .. }));
    }

    #[test]
    fn test_leave_then_join_restores_count() {
        let registry = ClubRegistry::new();
        let club = registry.create_club(new_club(5)).unwrap();
        registry.join(club.id, "rider").unwrap();
        let before = registry.get(club.id).unwrap().current_members;

        registry.leave(club.id, "rider").unwrap();
        assert_eq!(registry.get(club.id).unwrap().current_members, before - 1);

        registry.join(club.id, "rider").unwrap();
        assert_eq!(registry.get(club.id).unwrap().current_members, before);

        // Old membership is kept as inactive history
        let memberships = registry.memberships(club.id).unwrap();
        assert_eq!(memberships.len(), 3);
        assert_eq!(
            memberships
                .iter()
                .filter(|m| m.status == MembershipStatus::Inactive)
                .count(),
            1
        );
    }

    #[test]
    fn test_leave_without_membership_is_noop() {
        let registry = ClubRegistry::new();
        let club = registry.create_club(new_club(5)).unwrap();

        registry.leave(club.id, "stranger").unwrap();
        assert_eq!(registry.get(club.id).unwrap().current_members, 1);
        assert_eq!(registry.membership_events().len(), 1);
    }

    #[test]
    fn test_single_seat_club_cycle() {
        let registry = ClubRegistry::new();
        let club = registry.create_club(new_club(1)).unwrap();

        let err = registry.join(club.id, "newcomer").unwrap_err();
        assert!(matches!(err, LiftClubError::ClubFull { .. }));

        registry.leave(club.id, "founder").unwrap();
        let emptied = registry.get(club.id).unwrap();
        assert_eq!(emptied.current_members, 0);
        assert_eq!(emptied.status, ClubStatus::Active);

        registry.join(club.id, "newcomer").unwrap();
        let refilled = registry.get(club.id).unwrap();
        assert_eq!(refilled.current_members, 1);
        assert_eq!(refilled.status, ClubStatus::Full);
    }

    #[test]
    fn test_deactivated_club_rejects_joins() {
        let registry = ClubRegistry::new();
        let club = registry.create_club(new_club(4)).unwrap();

        let deactivated = registry.deactivate(club.id).unwrap();
        assert_eq!(deactivated.status, ClubStatus::Inactive);

        let err = registry.join(club.id, "rider").unwrap_err();
        assert!(matches!(err, LiftClubError::ClubInactive { .. }));

        // Leaving does not revive the club
        registry.leave(club.id, "founder").unwrap();
        assert_eq!(registry.get(club.id).unwrap().status, ClubStatus::Inactive);
    }

    #[test]
    fn test_racing_joins_never_exceed_capacity() {
        let registry = ClubRegistry::new();
        let club_id = registry.create_club(new_club(5)).unwrap().id;
        let riders = 32;

        let results: Vec<Result<Membership>> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..riders)
                .map(|i| {
                    let registry = &registry;
                    scope.spawn(move || registry.join(club_id, &format!("rider-{i}")))
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        let joined = results.iter().filter(|r| r.is_ok()).count();
        let full = results
            .iter()
            .filter(|r| matches!(r, Err(LiftClubError::ClubFull { .. })))
            .count();

        assert_eq!(joined, 4);
        assert_eq!(full, riders - 4);

        let final_club = registry.get(club_id).unwrap();
        assert_eq!(final_club.current_members, 5);
        assert_eq!(final_club.status, ClubStatus::Full);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_racing_joins_across_tasks() {
        let registry = create_shared_club_registry(ClubRegistry::new());
        let club_id = registry.create_club(new_club(3)).unwrap().id;

        let tasks = (0..10).map(|i| {
            let registry = registry.clone();
            tokio::spawn(async move { registry.join(club_id, &format!("rider-{i}")) })
        });
        let results = futures::future::join_all(tasks).await;

        let joined = results
            .into_iter()
            .filter(|r| matches!(r, Ok(Ok(_))))
            .count();
        assert_eq!(joined, 2);
        assert_eq!(registry.get(club_id).unwrap().current_members, 3);
    }

    #[test]
    fn test_restore_rejects_overfull_club() {
        let registry = ClubRegistry::new();
        let club = registry.create_club(new_club(2)).unwrap();
        let mut exported = registry.export();
        exported[0].club.current_members = 3;

        let err = ClubRegistry::restore(exported, vec![]).err().unwrap();
        assert!(matches!(err, LiftClubError::InvariantViolation { .. }));
        assert_eq!(club.current_members, 1);
    }

    #[test]
    fn test_restore_rejects_count_mismatch() {
        let registry = ClubRegistry::new();
        let club = registry.create_club(new_club(4)).unwrap();
        registry.join(club.id, "rider").unwrap();
        let mut exported = registry.export();
        // Within capacity, but only two memberships are active
        exported[0].club.current_members = 3;

        let err = ClubRegistry::restore(exported, vec![]).err().unwrap();
        assert!(matches!(
            err,
            LiftClubError::InvariantViolation { message } if message.contains("active memberships")
        ));
    }

    #[test]
    fn test_restore_rejects_wrong_status() {
        let registry = ClubRegistry::new();
        registry.create_club(new_club(4)).unwrap();
        let mut exported = registry.export();
        exported[0].club.status = ClubStatus::Full;

        let err = ClubRegistry::restore(exported, vec![]).err().unwrap();
        assert!(matches!(
            err,
            LiftClubError::InvariantViolation { message } if message.contains("membership implies")
        ));
    }

    #[test]
    fn test_restore_rejects_duplicate_active_member() {
        let registry = ClubRegistry::new();
        let club = registry.create_club(new_club(4)).unwrap();
        registry.join(club.id, "rider").unwrap();
        let mut exported = registry.export();
        let mut twin = exported[0].memberships[1].clone();
        twin.id = Uuid::new_v4();
        exported[0].memberships.push(twin);
        exported[0].club.current_members = 3;

        let err = ClubRegistry::restore(exported, vec![]).err().unwrap();
        assert!(matches!(
            err,
            LiftClubError::InvariantViolation { message } if message.contains("more than one")
        ));
    }

    #[test]
    fn test_freeze_blocks_joins_until_released() {
        let registry = ClubRegistry::new();
        let club_id = registry.create_club(new_club(4)).unwrap().id;

        std::thread::scope(|scope| {
            let frozen = registry.freeze();
            let joiner = scope.spawn(|| registry.join(club_id, "rider"));
            std::thread::sleep(std::time::Duration::from_millis(50));
            assert_eq!(registry.get(club_id).unwrap().current_members, 1);
            drop(frozen);
            joiner.join().unwrap().unwrap();
        });
        assert_eq!(registry.get(club_id).unwrap().current_members, 2);
    }

    #[test]
    fn test_restore_round_trip() {
        let registry = ClubRegistry::new();
        let club = registry.create_club(new_club(2)).unwrap();
        registry.join(club.id, "rider").unwrap();

        let restored =
            ClubRegistry::restore(registry.export(), registry.membership_events()).unwrap();
        let copy = restored.get(club.id).unwrap();
        assert_eq!(copy.current_members, 2);
        assert_eq!(copy.status, ClubStatus::Full);
        assert_eq!(restored.membership_events().len(), 2);
    }
}
