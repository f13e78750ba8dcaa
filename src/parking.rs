//! Park / unpark lifecycle.
//!
//! A user is either unparked (no vehicle record) or parked (exactly one
//! vehicle record whose grid cell is occupied). Every transition holds the
//! site lock and then the user lock, so the grid, the vehicle map and the
//! user's `parked` flag change together.

use crate::{
    db,
    error::{AppError, GridError, NotFoundError, ParkError, Result, UnparkError},
    grid::Grid,
    models::{
        validate_license_plate, ParkRequest, SiteId, SiteKind, Spot, UserId, Vehicle, VehicleId,
        VehiclesResponse,
    },
    store::{ParkingStore, UserHandle},
};
use axum::{extract::State, http::HeaderMap, http::StatusCode, Json};
use chrono::Utc;
use tracing::{debug, error, info};

impl ParkingStore {
    /// Peeks at the spot the allocator would pick right now. The answer can be
    /// stale by the time it is passed to [`ParkingStore::park`], which
    /// re-checks it.
    pub fn find_first_available(
        &self,
        kind: SiteKind,
        site_id: SiteId,
    ) -> std::result::Result<Option<Spot>, NotFoundError> {
        let handle = self
            .site_handle(site_id)
            .ok_or(NotFoundError::Site(site_id))?;
        let site = handle.lock();
        if site.kind != kind {
            return Err(NotFoundError::Site(site_id));
        }
        Ok(site.grid.find_first_available())
    }

    /// Parks `user_id` at an explicit spot.
    pub fn park(
        &self,
        user_id: UserId,
        license_plate: &str,
        kind: SiteKind,
        site_id: SiteId,
        spot: Spot,
    ) -> std::result::Result<Vehicle, ParkError> {
        self.park_with(user_id, license_plate, kind, site_id, |_| Ok(spot))
    }

    /// Parks `user_id` at the lowest free spot, choosing and claiming it under
    /// one site lock.
    pub fn park_first_available(
        &self,
        user_id: UserId,
        license_plate: &str,
        kind: SiteKind,
        site_id: SiteId,
    ) -> std::result::Result<Vehicle, ParkError> {
        self.park_with(user_id, license_plate, kind, site_id, |grid| {
            grid.find_first_available().ok_or(ParkError::LotFull)
        })
    }

    fn park_with<F>(
        &self,
        user_id: UserId,
        license_plate: &str,
        kind: SiteKind,
        site_id: SiteId,
        choose: F,
    ) -> std::result::Result<Vehicle, ParkError>
    where
        F: FnOnce(&Grid) -> std::result::Result<Spot, ParkError>,
    {
        validate_license_plate(license_plate)?;

        let user_handle = self
            .user_handle(user_id)
            .ok_or(ParkError::UserNotFound(user_id))?;
        let site_handle = self
            .site_handle(site_id)
            .ok_or(ParkError::SiteNotFound(site_id))?;

        let mut site = site_handle.lock();
        if site.kind != kind || !self.sites.contains_key(&site_id) {
            return Err(ParkError::SiteNotFound(site_id));
        }

        let mut user = user_handle.lock();
        if user.parked {
            debug!("Rejected park for {}: already parked", user.username);
            return Err(ParkError::UserAlreadyParked);
        }

        let spot = choose(&site.grid)?;
        site.grid.claim(spot).map_err(|e| match e {
            GridError::OutOfBounds(spot) => ParkError::InvalidSpot(spot),
            GridError::AlreadyOccupied(spot) | GridError::AlreadyFree(spot) => {
                debug!("Spot ({}) at '{}' is taken", spot, site.name);
                ParkError::SpotUnavailable(spot)
            }
        })?;

        let vehicle = Vehicle {
            id: VehicleId::new(),
            user_id,
            license_plate: license_plate.trim().to_string(),
            site_kind: kind,
            site_id,
            spot,
            parked_at: Utc::now(),
        };
        user.parked = true;
        self.vehicles.insert(vehicle.id, vehicle.clone());
        self.vehicle_by_user.insert(user_id, vehicle.id);
        self.write_through("vehicle", vehicle.id, |conn| db::save_vehicle(conn, &vehicle));

        info!(
            "Parked {} ({}) at {} '{}' ({})",
            user.username, vehicle.license_plate, kind, site.name, spot
        );
        Ok(vehicle)
    }

    /// Ends the user's parking session and frees its spot.
    pub fn unpark(&self, user_id: UserId) -> std::result::Result<Vehicle, UnparkError> {
        let user_handle = self
            .user_handle(user_id)
            .ok_or(UnparkError::UserNotFound(user_id))?;

        loop {
            let Some(vehicle) = self.vehicle_of(user_id) else {
                let user = user_handle.lock();
                if !user.parked {
                    return Err(UnparkError::UserNotParked);
                }
                // park inserts the record before releasing the user lock
                if self.vehicle_of(user_id).is_some() {
                    continue;
                }
                error!("User {} is marked parked but has no vehicle record", user_id);
                return Err(UnparkError::VehicleRecordMissing(user_id));
            };

            if let Some(outcome) = self.release_vehicle(&user_handle, vehicle) {
                return outcome;
            }
        }
    }

    /// One locked attempt at removing `vehicle`. `None` means the record
    /// vanished before the locks were taken and the caller should look again.
    fn release_vehicle(
        &self,
        user_handle: &UserHandle,
        vehicle: Vehicle,
    ) -> Option<std::result::Result<Vehicle, UnparkError>> {
        let Some(site_handle) = self.site_handle(vehicle.site_id) else {
            // A concurrent unpark may have emptied the site, letting it be deleted.
            if !self.vehicles.contains_key(&vehicle.id) {
                return None;
            }
            error!(
                "Vehicle {} references site {} which no longer exists",
                vehicle.id, vehicle.site_id
            );
            return Some(Err(UnparkError::SiteMissing {
                vehicle_id: vehicle.id,
                site_id: vehicle.site_id,
            }));
        };

        let mut site = site_handle.lock();
        let mut user = user_handle.lock();

        // Someone else unparked between the lookup and the locks.
        if !self.vehicles.contains_key(&vehicle.id) {
            return None;
        }

        if let Err(source) = site.grid.release(vehicle.spot) {
            error!(
                "Grid at '{}' disagrees with vehicle {}: {}",
                site.name, vehicle.id, source
            );
            return Some(Err(UnparkError::GridMismatch {
                vehicle_id: vehicle.id,
                site_id: vehicle.site_id,
                source,
            }));
        }

        self.vehicles.remove(&vehicle.id);
        self.vehicle_by_user.remove(&vehicle.user_id);
        user.parked = false;
        self.write_through("vehicle", vehicle.id, |conn| db::delete_vehicle(conn, vehicle.id));

        info!(
            "Unparked {} ({}) from {} '{}' ({})",
            user.username, vehicle.license_plate, vehicle.site_kind, site.name, vehicle.spot
        );
        Some(Ok(vehicle))
    }

    /// Active parking records for a user; at most one while invariants hold.
    pub fn vehicles_for_user(&self, user_id: UserId) -> Vec<Vehicle> {
        self.vehicle_of(user_id).into_iter().collect()
    }

    fn vehicle_of(&self, user_id: UserId) -> Option<Vehicle> {
        let vehicle_id = self.vehicle_by_user.get(&user_id).map(|entry| *entry.value())?;
        self.vehicles
            .get(&vehicle_id)
            .map(|entry| entry.value().clone())
    }
}

// ── Route handlers ──────────────────────────────────────────────────────

pub async fn park(
    State(state): State<crate::AppState>,
    headers: HeaderMap,
    Json(req): Json<ParkRequest>,
) -> Result<(StatusCode, Json<Vehicle>)> {
    let session = state.auth.authorize(&headers)?;

    let vehicle = match req.spot {
        Some(spot) => state.store.park(
            session.user_id,
            &req.license_plate,
            req.site_kind,
            req.site_id,
            spot,
        )?,
        None => state.store.park_first_available(
            session.user_id,
            &req.license_plate,
            req.site_kind,
            req.site_id,
        )?,
    };

    Ok((StatusCode::CREATED, Json(vehicle)))
}

pub async fn unpark(
    State(state): State<crate::AppState>,
    headers: HeaderMap,
) -> Result<Json<Vehicle>> {
    let session = state.auth.authorize(&headers)?;
    let vehicle = state.store.unpark(session.user_id)?;
    Ok(Json(vehicle))
}

pub async fn list_vehicles(
    State(state): State<crate::AppState>,
    headers: HeaderMap,
) -> Result<Json<VehiclesResponse>> {
    let session = state.auth.authorize(&headers)?;
    if state.store.get_user(session.user_id).is_none() {
        return Err(AppError::NotFound(NotFoundError::User(session.user_id)));
    }
    Ok(Json(VehiclesResponse {
        vehicles: state.store.vehicles_for_user(session.user_id),
    }))
}
