use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{LiftClubError, Result};
use crate::models::{LiftClubRequest, MembershipEvent, RequestStatus};
use crate::state::{ClubRegistry, ClubSnapshot, RequestStore};

pub const SNAPSHOT_VERSION: u32 = 1;

/// Persisted state of the whole service
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    /// Schema version for migrations
    pub version: u32,
    pub saved_at: DateTime<Utc>,
    pub clubs: Vec<ClubSnapshot>,
    pub requests: Vec<LiftClubRequest>,
    #[serde(default)]
    pub membership_events: Vec<MembershipEvent>,
}

impl Snapshot {
    /// Copy both stores as one consistent cut.
    ///
    /// Mutations are held off for the duration, so an approval is either
    /// wholly in the snapshot or not at all.
    pub fn capture(registry: &ClubRegistry, requests: &RequestStore) -> Self {
        let _frozen = registry.freeze();
        Self {
            version: SNAPSHOT_VERSION,
            saved_at: Utc::now(),
            clubs: registry.export(),
            requests: requests.snapshot(),
            membership_events: registry.membership_events(),
        }
    }

    /// Rebuild the in-memory stores, refusing dangling club/request links
    pub fn into_stores(self) -> Result<(ClubRegistry, RequestStore)> {
        check_links(&self.clubs, &self.requests)?;
        let registry = ClubRegistry::restore(self.clubs, self.membership_events)?;
        let requests = RequestStore::restore(self.requests);
        Ok((registry, requests))
    }
}

fn check_links(clubs: &[ClubSnapshot], requests: &[LiftClubRequest]) -> Result<()> {
    let club_ids: HashSet<Uuid> = clubs.iter().map(|c| c.club.id).collect();
    let by_id: HashMap<Uuid, &LiftClubRequest> = requests.iter().map(|r| (r.id, r)).collect();
    let violation = |message: String| Err(LiftClubError::InvariantViolation { message });

    for request in requests {
        let decided = matches!(
            request.status,
            RequestStatus::Approved | RequestStatus::Completed
        );
        match (decided, request.assigned_lift_club_id) {
            (true, None) => {
                return violation(format!(
                    "request {} is {} without a club",
                    request.id, request.status
                ));
            }
            (true, Some(club_id)) if !club_ids.contains(&club_id) => {
                return violation(format!(
                    "request {} points at missing club {}",
                    request.id, club_id
                ));
            }
            (false, Some(club_id)) => {
                return violation(format!(
                    "request {} is {} but assigned to club {}",
                    request.id, request.status, club_id
                ));
            }
            _ => {}
        }
    }

    for snapshot in clubs {
        let club = &snapshot.club;
        let Some(request_id) = club.request_id else {
            continue;
        };
        match by_id.get(&request_id) {
            None => {
                return violation(format!(
                    "club {} was created from missing request {}",
                    club.id, request_id
                ));
            }
            Some(request) if request.assigned_lift_club_id != Some(club.id) => {
                return violation(format!(
                    "club {} was created from request {} which is {} and not assigned to it",
                    club.id, request_id, request.status
                ));
            }
            Some(_) => {}
        }
    }

    Ok(())
}

/// Somewhere a snapshot can be kept between runs
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// `None` when nothing has been saved yet
    async fn load(&self) -> Result<Option<Snapshot>>;

    async fn save(&self, snapshot: &Snapshot) -> Result<()>;
}

/// Snapshot kept as a pretty-printed JSON file
pub struct JsonFileSnapshotStore {
    path: PathBuf,
}

impl JsonFileSnapshotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn display_path(&self) -> String {
        self.path.display().to_string()
    }
}

#[async_trait]
impl SnapshotStore for JsonFileSnapshotStore {
    async fn load(&self) -> Result<Option<Snapshot>> {
        let path = self.display_path();
        match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => {
                let snapshot: Snapshot =
                    serde_json::from_str(&content).map_err(|e| LiftClubError::StateParse {
                        path: path.clone(),
                        source: e,
                    })?;
                if snapshot.version > SNAPSHOT_VERSION {
                    return Err(LiftClubError::InvariantViolation {
                        message: format!(
                            "snapshot '{}' has version {}, newest supported is {}",
                            path, snapshot.version, SNAPSHOT_VERSION
                        ),
                    });
                }
                info!(
                    "Loaded {} clubs and {} requests from {}",
                    snapshot.clubs.len(),
                    snapshot.requests.len(),
                    path
                );
                Ok(Some(snapshot))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No snapshot at {}, starting empty", path);
                Ok(None)
            }
            Err(e) => Err(LiftClubError::StateLoad { path, source: e }),
        }
    }

    /// Write to a temp file first, then rename for atomicity
    async fn save(&self, snapshot: &Snapshot) -> Result<()> {
        let path = self.display_path();
        let content = serde_json::to_string_pretty(snapshot)?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| LiftClubError::StateSave {
                    path: path.clone(),
                    source: e,
                })?;
        }

        let temp_path = format!("{}.tmp", path);
        tokio::fs::write(&temp_path, &content)
            .await
            .map_err(|e| LiftClubError::StateSave {
                path: path.clone(),
                source: e,
            })?;

        tokio::fs::rename(&temp_path, &self.path)
            .await
            .map_err(|e| LiftClubError::StateSave {
                path: path.clone(),
                source: e,
            })?;

        debug!("Saved snapshot to {}", path);
        Ok(())
    }
}

/// Shared snapshot store type
pub type SharedSnapshotStore = Arc<dyn SnapshotStore>;
