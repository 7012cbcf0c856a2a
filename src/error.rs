use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum LiftClubError {
    // Request lifecycle errors
    #[error("Request failed validation: {}", errors.join("; "))]
    ValidationFailed { errors: Vec<String> },

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Request {request_id} has already been decided ({status})")]
    AlreadyDecided { request_id: Uuid, status: String },

    #[error("A rejection reason is required")]
    MissingReason,

    #[error("Invalid decision: {message}")]
    InvalidDecision { message: String },

    #[error("Request {request_id} cannot move from {from} to {to}")]
    InvalidTransition {
        request_id: Uuid,
        from: String,
        to: String,
    },

    // Club errors
    #[error("Invalid capacity: {message}")]
    InvalidCapacity { message: String },

    #[error("Club is full: {club_id}")]
    ClubFull { club_id: Uuid },

    #[error("Club is inactive: {club_id}")]
    ClubInactive { club_id: Uuid },

    #[error("Invariant violated: {message}")]
    InvariantViolation { message: String },

    // Permission errors
    #[error("Permission denied: {message}")]
    PermissionDenied { message: String },

    // Configuration errors
    #[error("Failed to load config file '{path}': {source}")]
    ConfigLoad {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file '{path}': {source}")]
    ConfigParse {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid config: {message}")]
    ConfigValidation { message: String },

    // State errors
    #[error("Failed to save state to '{path}': {source}")]
    StateSave {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to load state from '{path}': {source}")]
    StateLoad {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse state file '{path}': {source}")]
    StateParse {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    // Generic errors
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl LiftClubError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        LiftClubError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Stable machine-readable name of the error kind
    pub fn kind(&self) -> &'static str {
        match self {
            LiftClubError::ValidationFailed { .. } => "ValidationFailed",
            LiftClubError::NotFound { .. } => "NotFound",
            LiftClubError::AlreadyDecided { .. } => "AlreadyDecided",
            LiftClubError::MissingReason => "MissingReason",
            LiftClubError::InvalidDecision { .. } => "InvalidDecision",
            LiftClubError::InvalidTransition { .. } => "InvalidTransition",
            LiftClubError::InvalidCapacity { .. } => "InvalidCapacity",
            LiftClubError::ClubFull { .. } => "ClubFull",
            LiftClubError::ClubInactive { .. } => "ClubInactive",
            LiftClubError::InvariantViolation { .. } => "InvariantViolation",
            LiftClubError::PermissionDenied { .. } => "PermissionDenied",
            LiftClubError::ConfigLoad { .. } => "ConfigLoad",
            LiftClubError::ConfigParse { .. } => "ConfigParse",
            LiftClubError::ConfigValidation { .. } => "ConfigValidation",
            LiftClubError::StateSave { .. } => "StateSave",
            LiftClubError::StateLoad { .. } => "StateLoad",
            LiftClubError::StateParse { .. } => "StateParse",
            LiftClubError::Internal { .. } => "Internal",
        }
    }

    /// Whether a caller may retry the same call unchanged.
    ///
    /// Domain errors never are.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            LiftClubError::StateSave { .. } | LiftClubError::Internal { .. }
        )
    }
}

impl From<std::io::Error> for LiftClubError {
    fn from(err: std::io::Error) -> Self {
        LiftClubError::Internal {
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for LiftClubError {
    fn from(err: serde_json::Error) -> Self {
        LiftClubError::Internal {
            message: err.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, LiftClubError>;
