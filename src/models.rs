use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ValidationError;
use crate::grid::Grid;

/// Upper bound for any single grid dimension.
pub const MAX_DIMENSION: u32 = 1000;
/// Upper bound for `floors * rows * cols`.
pub const MAX_CAPACITY: usize = 100_000;

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s).map(Self)
            }
        }
    };
}

id_type!(
    /// Identifies an [`Entrance`].
    EntranceId
);
id_type!(
    /// Identifies a lot or building.
    SiteId
);
id_type!(
    /// Identifies a [`User`].
    UserId
);
id_type!(
    /// Identifies an active parking record.
    VehicleId
);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Region {
    North,
    South,
    East,
    West,
}

impl Region {
    pub const ALL: [Region; 4] = [Region::North, Region::South, Region::East, Region::West];

    pub fn as_str(&self) -> &'static str {
        match self {
            Region::North => "north",
            Region::South => "south",
            Region::East => "east",
            Region::West => "west",
        }
    }
}

impl FromStr for Region {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Region::ALL
            .into_iter()
            .find(|r| r.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| ValidationError::InvalidRegion(s.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinates {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }
}

/// Shape of a site's grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Dimensions {
    pub floors: u32,
    pub rows: u32,
    pub cols: u32,
}

impl Dimensions {
    pub fn new(floors: u32, rows: u32, cols: u32) -> Self {
        Self { floors, rows, cols }
    }

    pub fn capacity(&self) -> usize {
        self.floors as usize * self.rows as usize * self.cols as usize
    }
}

/// One addressable cell of a site's grid.
///
/// The derived ordering is lexicographic over `(floor, row, column)`, which is
/// also the order in which the allocator scans a grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Spot {
    pub floor: u32,
    pub row: u32,
    pub column: u32,
}

impl Spot {
    pub fn new(floor: u32, row: u32, column: u32) -> Self {
        Self { floor, row, column }
    }
}

impl fmt::Display for Spot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "floor {}, row {}, column {}",
            self.floor, self.row, self.column
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SiteKind {
    Lot,
    Building,
}

impl SiteKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SiteKind::Lot => "lot",
            SiteKind::Building => "building",
        }
    }
}

impl fmt::Display for SiteKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SiteKind {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "lot" => Ok(SiteKind::Lot),
            "building" => Ok(SiteKind::Building),
            other => Err(ValidationError::InvalidSiteKind(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entrance {
    pub id: EntranceId,
    pub name: String,
    pub coordinates: Coordinates,
    pub region: Region,
    #[serde(skip)]
    pub seq: u64,
}

/// A lot or building together with its occupancy grid.
#[derive(Debug, Clone)]
pub struct Site {
    pub id: SiteId,
    pub kind: SiteKind,
    pub name: String,
    pub coordinates: Coordinates,
    pub nearest_entrance_id: EntranceId,
    pub grid: Grid,
    pub created_at: DateTime<Utc>,
    pub seq: u64,
}

impl Site {
    pub fn dimensions(&self) -> Dimensions {
        self.grid.dimensions()
    }

    pub fn summary(&self) -> SiteSummary {
        let dims = self.dimensions();
        SiteSummary {
            id: self.id,
            kind: self.kind,
            name: self.name.clone(),
            coordinates: self.coordinates,
            floors: dims.floors,
            rows: dims.rows,
            cols: dims.cols,
            nearest_entrance_id: self.nearest_entrance_id,
            max_capacity: self.grid.max_capacity(),
            available_spots: self.grid.available_spots(),
            occupied_spots: self.grid.occupied_spots(),
        }
    }
}

/// Input for creating a site.
#[derive(Debug, Clone)]
pub struct NewSite {
    pub kind: SiteKind,
    pub name: String,
    pub coordinates: Coordinates,
    pub dimensions: Dimensions,
    pub nearest_entrance_id: EntranceId,
}

/// Input for updating a site. Kind and nearest entrance are fixed at creation.
#[derive(Debug, Clone)]
pub struct SiteUpdate {
    pub name: String,
    pub coordinates: Coordinates,
    pub dimensions: Dimensions,
}

#[derive(Debug, Clone, Serialize)]
pub struct SiteSummary {
    pub id: SiteId,
    pub kind: SiteKind,
    pub name: String,
    pub coordinates: Coordinates,
    pub floors: u32,
    pub rows: u32,
    pub cols: u32,
    pub nearest_entrance_id: EntranceId,
    pub max_capacity: usize,
    pub available_spots: usize,
    pub occupied_spots: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    User,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::User => "user",
        }
    }
}

impl FromStr for Role {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Role::Admin),
            "user" => Ok(Role::User),
            other => Err(ValidationError::InvalidRole(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub id: UserId,
    pub first_name: String,
    pub last_name: String,
    pub username: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: Role,
    pub parked: bool,
    pub created_at: DateTime<Utc>,
    #[serde(skip)]
    pub seq: u64,
}

/// Input for registering a user. The password is plain text here and is
/// hashed before it reaches the registry.
#[derive(Debug, Clone, Deserialize)]
pub struct NewUser {
    pub first_name: String,
    pub last_name: String,
    pub username: String,
    pub password: String,
    pub role: Role,
}

/// An active parking record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Vehicle {
    pub id: VehicleId,
    pub user_id: UserId,
    pub license_plate: String,
    pub site_kind: SiteKind,
    pub site_id: SiteId,
    pub spot: Spot,
    pub parked_at: DateTime<Utc>,
}

// ── Request / response models ───────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub first_name: String,
    pub last_name: String,
    pub username: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    pub first_name: String,
    pub last_name: String,
    pub username: String,
    pub password: String,
    pub role: Role,
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub user_id: UserId,
    pub username: String,
    pub role: Role,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
    pub role: Role,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub user_id: UserId,
    pub role: Role,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct CreateSiteRequest {
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    pub floors: u32,
    pub rows: u32,
    pub cols: u32,
    pub nearest_entrance_id: EntranceId,
}

#[derive(Debug, Deserialize)]
pub struct UpdateSiteRequest {
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    pub floors: u32,
    pub rows: u32,
    pub cols: u32,
}

#[derive(Debug, Serialize)]
pub struct CreateSiteResponse {
    pub id: SiteId,
}

#[derive(Debug, Deserialize)]
pub struct EntranceQuery {
    pub region: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SiteQuery {
    pub entrance_id: Option<EntranceId>,
}

#[derive(Debug, Deserialize)]
pub struct ParkRequest {
    pub license_plate: String,
    pub site_kind: SiteKind,
    pub site_id: SiteId,
    /// When absent the first available spot is allocated.
    pub spot: Option<Spot>,
}

#[derive(Debug, Serialize)]
pub struct VehiclesResponse {
    pub vehicles: Vec<Vehicle>,
}

// ── Validation ──────────────────────────────────────────────────────────

pub fn validate_site_name(name: &str) -> Result<(), ValidationError> {
    if name.trim().is_empty() {
        return Err(ValidationError::EmptyName);
    }
    if name.chars().count() > 128 {
        return Err(ValidationError::NameTooLong);
    }
    Ok(())
}

/// Both components must be finite, and `(0, 0)` is treated as "not set".
pub fn validate_coordinates(coordinates: &Coordinates) -> Result<(), ValidationError> {
    if !coordinates.latitude.is_finite() || !coordinates.longitude.is_finite() {
        return Err(ValidationError::InvalidCoordinates {
            reason: "coordinates must be finite numbers".to_string(),
        });
    }
    if coordinates.latitude == 0.0 && coordinates.longitude == 0.0 {
        return Err(ValidationError::InvalidCoordinates {
            reason: "coordinates cannot both be zero".to_string(),
        });
    }
    Ok(())
}

pub fn validate_dimensions(dimensions: &Dimensions) -> Result<(), ValidationError> {
    let Dimensions { floors, rows, cols } = *dimensions;
    for (label, value) in [("floors", floors), ("rows", rows), ("cols", cols)] {
        if value == 0 {
            return Err(ValidationError::InvalidDimensions {
                reason: format!("{label} must be at least 1"),
            });
        }
        if value > MAX_DIMENSION {
            return Err(ValidationError::InvalidDimensions {
                reason: format!("{label} cannot exceed {MAX_DIMENSION}"),
            });
        }
    }
    if dimensions.capacity() > MAX_CAPACITY {
        return Err(ValidationError::InvalidDimensions {
            reason: format!("capacity cannot exceed {MAX_CAPACITY} spots"),
        });
    }
    Ok(())
}

pub fn validate_username(username: &str) -> Result<(), ValidationError> {
    if username.is_empty() {
        return Err(ValidationError::MissingField("username"));
    }
    if username.len() > 64 {
        return Err(ValidationError::InvalidUsername {
            reason: "username cannot exceed 64 characters".to_string(),
        });
    }
    if !username
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-' || c == '_' || c == '.')
    {
        return Err(ValidationError::InvalidUsername {
            reason: "username can only contain alphanumeric characters, hyphens, underscores, and dots"
                .to_string(),
        });
    }
    Ok(())
}

pub fn validate_new_user(user: &NewUser) -> Result<(), ValidationError> {
    if user.first_name.trim().is_empty() {
        return Err(ValidationError::MissingField("first_name"));
    }
    if user.last_name.trim().is_empty() {
        return Err(ValidationError::MissingField("last_name"));
    }
    validate_username(&user.username)?;
    if user.password.is_empty() {
        return Err(ValidationError::MissingField("password"));
    }
    Ok(())
}

pub fn validate_license_plate(plate: &str) -> Result<(), ValidationError> {
    let trimmed = plate.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::MissingField("license_plate"));
    }
    if trimmed.chars().count() > 16
        || !trimmed
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == ' ' || c == '-')
    {
        return Err(ValidationError::InvalidLicensePlate(plate.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spot_order_is_floor_row_column() {
        let mut spots = vec![
            Spot::new(0, 2, 1),
            Spot::new(1, 0, 0),
            Spot::new(0, 0, 4),
        ];
        spots.sort();
        assert_eq!(
            spots,
            vec![Spot::new(0, 0, 4), Spot::new(0, 2, 1), Spot::new(1, 0, 0)]
        );
        assert!(Spot::new(0, 9, 9) < Spot::new(1, 0, 0));
    }

    #[test]
    fn test_spot_display() {
        assert_eq!(Spot::new(1, 2, 3).to_string(), "floor 1, row 2, column 3");
    }

    #[test]
    fn test_validate_site_name() {
        assert!(validate_site_name("Lot-1").is_ok());
        assert_eq!(validate_site_name(""), Err(ValidationError::EmptyName));
        assert_eq!(validate_site_name("   "), Err(ValidationError::EmptyName));
        assert_eq!(
            validate_site_name(&"a".repeat(129)),
            Err(ValidationError::NameTooLong)
        );
    }

    #[test]
    fn test_validate_coordinates() {
        assert!(validate_coordinates(&Coordinates::new(42.7, -84.5)).is_ok());
        assert!(validate_coordinates(&Coordinates::new(0.0, 12.0)).is_ok());
        assert!(matches!(
            validate_coordinates(&Coordinates::new(0.0, 0.0)),
            Err(ValidationError::InvalidCoordinates { .. })
        ));
        assert!(matches!(
            validate_coordinates(&Coordinates::new(f64::NAN, 1.0)),
            Err(ValidationError::InvalidCoordinates { .. })
        ));
        assert!(matches!(
            validate_coordinates(&Coordinates::new(1.0, f64::INFINITY)),
            Err(ValidationError::InvalidCoordinates { .. })
        ));
    }

    #[test]
    fn test_validate_dimensions() {
        assert!(validate_dimensions(&Dimensions::new(1, 1, 1)).is_ok());
        assert!(validate_dimensions(&Dimensions::new(3, 5, 5)).is_ok());
        for dims in [
            Dimensions::new(0, 5, 5),
            Dimensions::new(1, 0, 5),
            Dimensions::new(1, 5, 0),
            Dimensions::new(1001, 1, 1),
            Dimensions::new(1000, 1000, 1),
        ] {
            assert!(
                matches!(
                    validate_dimensions(&dims),
                    Err(ValidationError::InvalidDimensions { .. })
                ),
                "{dims:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_validate_new_user() {
        let user = NewUser {
            first_name: "Ada".to_string(),
            last_name: "Lovelace".to_string(),
            username: "ada".to_string(),
            password: "secret".to_string(),
            role: Role::User,
        };
        assert!(validate_new_user(&user).is_ok());

        let missing_password = NewUser {
            password: String::new(),
            ..user.clone()
        };
        assert_eq!(
            validate_new_user(&missing_password),
            Err(ValidationError::MissingField("password"))
        );

        let bad_username = NewUser {
            username: "ada lovelace".to_string(),
            ..user
        };
        assert!(matches!(
            validate_new_user(&bad_username),
            Err(ValidationError::InvalidUsername { .. })
        ));
    }

    #[test]
    fn test_validate_license_plate() {
        assert!(validate_license_plate("ABC-1234").is_ok());
        assert!(validate_license_plate("MI 7XY").is_ok());
        assert_eq!(
            validate_license_plate(" "),
            Err(ValidationError::MissingField("license_plate"))
        );
        assert!(validate_license_plate("AB@12").is_err());
        assert!(validate_license_plate(&"A".repeat(17)).is_err());
    }

    #[test]
    fn test_parse_enums() {
        assert_eq!("admin".parse::<Role>(), Ok(Role::Admin));
        assert!("root".parse::<Role>().is_err());
        assert_eq!("North".parse::<Region>(), Ok(Region::North));
        assert_eq!("building".parse::<SiteKind>(), Ok(SiteKind::Building));
        assert!("garage".parse::<SiteKind>().is_err());
    }

    #[test]
    fn test_ids_serialize_transparently() {
        let id = SiteId::new();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{}\"", id.0));
        assert_eq!(json.trim_matches('"').parse::<SiteId>().unwrap(), id);
    }

    #[test]
    fn test_password_hash_not_serialized() {
        let user = User {
            id: UserId::new(),
            first_name: "A".to_string(),
            last_name: "B".to_string(),
            username: "ab".to_string(),
            password_hash: "$argon2id$secret".to_string(),
            role: Role::User,
            parked: false,
            created_at: Utc::now(),
            seq: 1,
        };
        let json = serde_json::to_string(&user).unwrap();
        assert!(!json.contains("argon2"));
        assert!(json.contains("\"role\":\"user\""));
    }
}
