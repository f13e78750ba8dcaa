use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::models::{SiteId, SiteKind, Spot, UserId, VehicleId};

/// Rejected input. Nothing is mutated when one of these is returned.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Name cannot be empty")]
    EmptyName,

    #[error("Name cannot exceed 128 characters")]
    NameTooLong,

    #[error("A {kind} named '{name}' already exists")]
    DuplicateName { kind: SiteKind, name: String },

    #[error("Invalid coordinates: {reason}")]
    InvalidCoordinates { reason: String },

    #[error("Invalid dimensions: {reason}")]
    InvalidDimensions { reason: String },

    #[error("Unknown entrance: {0}")]
    UnknownEntrance(String),

    #[error("Cannot resize '{name}' while {occupied} spot(s) are occupied")]
    ResizeWhileOccupied { name: String, occupied: usize },

    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    #[error("Invalid username: {reason}")]
    InvalidUsername { reason: String },

    #[error("Invalid license plate: {0}")]
    InvalidLicensePlate(String),

    #[error("Invalid role: {0}")]
    InvalidRole(String),

    #[error("Invalid region: {0}")]
    InvalidRegion(String),

    #[error("Invalid site kind: {0}")]
    InvalidSiteKind(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NotFoundError {
    #[error("Site not found: {0}")]
    Site(SiteId),

    #[error("User not found: {0}")]
    User(UserId),
}

/// Failure to toggle a single grid cell.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum GridError {
    #[error("Spot ({0}) is outside the grid")]
    OutOfBounds(Spot),

    #[error("Spot ({0}) is already occupied")]
    AlreadyOccupied(Spot),

    #[error("Spot ({0}) is already free")]
    AlreadyFree(Spot),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SiteError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    NotFound(#[from] NotFoundError),

    #[error("Site {site_id} still has {vehicles} parked vehicle(s)")]
    Occupied { site_id: SiteId, vehicles: usize },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegisterError {
    #[error("Username already taken: {0}")]
    DuplicateUsername(String),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Password hashing failed: {0}")]
    Hashing(String),
}

/// Why a login attempt failed.
///
/// Both variants render the same text so callers cannot tell a wrong
/// password from a wrong role; the distinction is for internal logic only.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthError {
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Invalid credentials")]
    RoleMismatch,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParkError {
    #[error("User not found: {0}")]
    UserNotFound(UserId),

    #[error("User is already parked")]
    UserAlreadyParked,

    #[error("Site not found: {0}")]
    SiteNotFound(SiteId),

    #[error("Spot ({0}) is unavailable")]
    SpotUnavailable(Spot),

    #[error("Spot ({0}) does not exist at this site")]
    InvalidSpot(Spot),

    #[error("No free spots left at this site")]
    LotFull,

    #[error(transparent)]
    Validation(#[from] ValidationError),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UnparkError {
    #[error("User not found: {0}")]
    UserNotFound(UserId),

    #[error("User is not parked")]
    UserNotParked,

    #[error("User {0} is marked parked but has no vehicle record")]
    VehicleRecordMissing(UserId),

    #[error("Vehicle {vehicle_id} references site {site_id} which no longer exists")]
    SiteMissing {
        vehicle_id: VehicleId,
        site_id: SiteId,
    },

    #[error("Grid at site {site_id} disagrees with vehicle {vehicle_id}: {source}")]
    GridMismatch {
        vehicle_id: VehicleId,
        site_id: SiteId,
        source: GridError,
    },
}

impl UnparkError {
    /// True for invariant violations rather than ordinary business outcomes.
    pub fn is_consistency_failure(&self) -> bool {
        matches!(
            self,
            UnparkError::VehicleRecordMissing(_)
                | UnparkError::SiteMissing { .. }
                | UnparkError::GridMismatch { .. }
        )
    }
}

/// Unified error type for all API failures.
///
/// Each variant maps to a specific HTTP status code and produces a consistent
/// JSON error response with `error` and `details` fields.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Bearer token required")]
    MissingAuth,

    #[error("Session not found")]
    SessionNotFound,

    #[error("Session expired")]
    SessionExpired,

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    NotFound(#[from] NotFoundError),

    #[error(transparent)]
    Site(#[from] SiteError),

    #[error(transparent)]
    Register(#[from] RegisterError),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Park(#[from] ParkError),

    #[error(transparent)]
    Unpark(#[from] UnparkError),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Internal server error")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    fn status_and_message(&self) -> (StatusCode, &'static str) {
        match self {
            AppError::MissingAuth => (StatusCode::UNAUTHORIZED, "Authorization header required"),
            AppError::SessionNotFound => (StatusCode::UNAUTHORIZED, "Session not found"),
            AppError::SessionExpired => (StatusCode::UNAUTHORIZED, "Session expired"),
            AppError::Forbidden(_) => (StatusCode::FORBIDDEN, "Forbidden"),
            AppError::Validation(ValidationError::DuplicateName { .. }) => {
                (StatusCode::CONFLICT, "Duplicate name")
            }
            AppError::Validation(_) => (StatusCode::BAD_REQUEST, "Invalid input"),
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, "Resource not found"),
            AppError::Site(SiteError::Validation(ValidationError::DuplicateName { .. })) => {
                (StatusCode::CONFLICT, "Duplicate name")
            }
            AppError::Site(SiteError::Validation(ValidationError::ResizeWhileOccupied {
                ..
            })) => (StatusCode::CONFLICT, "Site is occupied"),
            AppError::Site(SiteError::Validation(_)) => (StatusCode::BAD_REQUEST, "Invalid input"),
            AppError::Site(SiteError::NotFound(_)) => (StatusCode::NOT_FOUND, "Resource not found"),
            AppError::Site(SiteError::Occupied { .. }) => (StatusCode::CONFLICT, "Site is occupied"),
            AppError::Register(RegisterError::DuplicateUsername(_)) => {
                (StatusCode::CONFLICT, "Username already taken")
            }
            AppError::Register(RegisterError::Validation(_)) => {
                (StatusCode::BAD_REQUEST, "Invalid input")
            }
            AppError::Register(RegisterError::Hashing(_)) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
            }
            AppError::Auth(_) => (StatusCode::UNAUTHORIZED, "Invalid credentials"),
            AppError::Park(ParkError::UserNotFound(_) | ParkError::SiteNotFound(_)) => {
                (StatusCode::NOT_FOUND, "Resource not found")
            }
            AppError::Park(ParkError::UserAlreadyParked) => {
                (StatusCode::CONFLICT, "User is already parked")
            }
            AppError::Park(ParkError::SpotUnavailable(_)) => {
                (StatusCode::CONFLICT, "Spot unavailable")
            }
            AppError::Park(ParkError::LotFull) => (StatusCode::CONFLICT, "Lot full"),
            AppError::Park(ParkError::InvalidSpot(_) | ParkError::Validation(_)) => {
                (StatusCode::BAD_REQUEST, "Invalid input")
            }
            AppError::Unpark(UnparkError::UserNotFound(_)) => {
                (StatusCode::NOT_FOUND, "Resource not found")
            }
            AppError::Unpark(UnparkError::UserNotParked) => {
                (StatusCode::CONFLICT, "User is not parked")
            }
            AppError::Unpark(_) => (StatusCode::INTERNAL_SERVER_ERROR, "Consistency failure"),
            AppError::Database(_) => (StatusCode::INTERNAL_SERVER_ERROR, "Database error"),
            AppError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error"),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = self.status_and_message();

        let body = Json(json!({
            "error": error_message,
            "details": self.to_string()
        }));

        (status, body).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    #[test]
    fn test_error_display() {
        let spot = Spot::new(0, 1, 2);
        assert_eq!(
            GridError::AlreadyOccupied(spot).to_string(),
            "Spot (floor 0, row 1, column 2) is already occupied"
        );
        assert_eq!(
            ValidationError::DuplicateName {
                kind: SiteKind::Lot,
                name: "lot-1".to_string()
            }
            .to_string(),
            "A lot named 'lot-1' already exists"
        );
        assert_eq!(AppError::MissingAuth.to_string(), "Bearer token required");
        assert_eq!(
            AppError::from(ParkError::LotFull).to_string(),
            "No free spots left at this site"
        );
    }

    #[test]
    fn test_auth_errors_share_caller_facing_text() {
        assert_eq!(
            AuthError::InvalidCredentials.to_string(),
            AuthError::RoleMismatch.to_string()
        );
        assert_ne!(AuthError::InvalidCredentials, AuthError::RoleMismatch);
    }

    #[test]
    fn test_consistency_failures() {
        assert!(UnparkError::VehicleRecordMissing(UserId::new()).is_consistency_failure());
        assert!(UnparkError::GridMismatch {
            vehicle_id: VehicleId::new(),
            site_id: SiteId::new(),
            source: GridError::AlreadyFree(Spot::new(0, 0, 0)),
        }
        .is_consistency_failure());
        assert!(!UnparkError::UserNotParked.is_consistency_failure());
    }

    #[tokio::test]
    async fn test_error_into_response() {
        let test_cases = vec![
            (AppError::MissingAuth, StatusCode::UNAUTHORIZED, "Authorization header required"),
            (AppError::SessionExpired, StatusCode::UNAUTHORIZED, "Session expired"),
            (AppError::Forbidden("admin only".to_string()), StatusCode::FORBIDDEN, "Forbidden"),
            (ValidationError::EmptyName.into(), StatusCode::BAD_REQUEST, "Invalid input"),
            (
                SiteError::from(ValidationError::DuplicateName {
                    kind: SiteKind::Building,
                    name: "b".to_string(),
                })
                .into(),
                StatusCode::CONFLICT,
                "Duplicate name",
            ),
            (
                SiteError::Occupied { site_id: SiteId::new(), vehicles: 2 }.into(),
                StatusCode::CONFLICT,
                "Site is occupied",
            ),
            (NotFoundError::Site(SiteId::new()).into(), StatusCode::NOT_FOUND, "Resource not found"),
            (
                RegisterError::DuplicateUsername("ada".to_string()).into(),
                StatusCode::CONFLICT,
                "Username already taken",
            ),
            (AuthError::RoleMismatch.into(), StatusCode::UNAUTHORIZED, "Invalid credentials"),
            (ParkError::UserAlreadyParked.into(), StatusCode::CONFLICT, "User is already parked"),
            (
                ParkError::SpotUnavailable(Spot::new(0, 0, 0)).into(),
                StatusCode::CONFLICT,
                "Spot unavailable",
            ),
            (ParkError::LotFull.into(), StatusCode::CONFLICT, "Lot full"),
            (UnparkError::UserNotParked.into(), StatusCode::CONFLICT, "User is not parked"),
            (
                UnparkError::VehicleRecordMissing(UserId::new()).into(),
                StatusCode::INTERNAL_SERVER_ERROR,
                "Consistency failure",
            ),
            (
                AppError::Internal(anyhow::anyhow!("test")),
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error",
            ),
        ];

        for (error, expected_status, expected_message) in test_cases {
            let response = error.into_response();
            assert_eq!(response.status(), expected_status);

            let (_parts, body) = response.into_parts();
            let body_bytes = axum::body::to_bytes(body, usize::MAX).await.unwrap();
            let json: Value = serde_json::from_slice(&body_bytes).unwrap();

            assert_eq!(json["error"], expected_message);
            assert!(json["details"].is_string());
        }
    }

    #[test]
    fn test_role_mismatch_details_do_not_leak() {
        let response = AppError::from(AuthError::RoleMismatch).into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            AppError::from(AuthError::RoleMismatch).to_string(),
            "Invalid credentials"
        );
    }
}
