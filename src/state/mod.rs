pub mod club_registry;
pub mod request_store;
pub mod snapshot;

pub use club_registry::{
    create_shared_club_registry, ClubRegistry, ClubSnapshot, PreparedClub, SharedClubRegistry,
};
pub use request_store::{create_shared_request_store, RequestStore, SharedRequestStore};
pub use snapshot::{JsonFileSnapshotStore, SharedSnapshotStore, Snapshot, SnapshotStore};
