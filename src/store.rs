use crate::{
    db::{self, DbConn, Snapshot},
    error::{AppError, NotFoundError, Result, SiteError, ValidationError},
    grid::Grid,
    models::{
        validate_coordinates, validate_dimensions, validate_site_name, Coordinates, Dimensions,
        Entrance, EntranceId, NewSite, NewUser, Region, Role, Site, SiteId, SiteKind,
        SiteSummary, SiteUpdate, User, UserId, Vehicle, VehicleId,
    },
};
use chrono::Utc;
use dashmap::{mapref::entry::Entry, DashMap};
use parking_lot::Mutex;
use rusqlite::Connection;
use std::{
    fmt::Display,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};
use tracing::{debug, error, info, warn};

pub(crate) type SiteHandle = Arc<Mutex<Site>>;
pub(crate) type UserHandle = Arc<Mutex<User>>;

/// The entity registry.
///
/// Every site and user sits behind its own mutex, so operations on different
/// sites never contend. Anything that needs both locks takes the site lock
/// first. Handles are always cloned out of the maps before locking; holding a
/// map guard while waiting on an entity lock can deadlock against `remove`.
#[derive(Clone)]
pub struct ParkingStore {
    pub(crate) entrances: Arc<DashMap<EntranceId, Entrance>>,
    pub(crate) sites: Arc<DashMap<SiteId, SiteHandle>>,
    site_names: Arc<DashMap<(SiteKind, String), SiteId>>,
    pub(crate) users: Arc<DashMap<UserId, UserHandle>>,
    pub(crate) usernames: Arc<DashMap<String, UserId>>,
    pub(crate) vehicles: Arc<DashMap<VehicleId, Vehicle>>,
    /// Active vehicle per user. Changes together with `vehicles`, under the
    /// same site and user locks.
    pub(crate) vehicle_by_user: Arc<DashMap<UserId, VehicleId>>,
    sequence: Arc<AtomicU64>,
    db: Option<DbConn>,
}

impl Default for ParkingStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ParkingStore {
    /// An empty, memory-only registry.
    pub fn new() -> Self {
        Self {
            entrances: Arc::new(DashMap::new()),
            sites: Arc::new(DashMap::new()),
            site_names: Arc::new(DashMap::new()),
            users: Arc::new(DashMap::new()),
            usernames: Arc::new(DashMap::new()),
            vehicles: Arc::new(DashMap::new()),
            vehicle_by_user: Arc::new(DashMap::new()),
            sequence: Arc::new(AtomicU64::new(1)),
            db: None,
        }
    }

    /// A registry that writes through to `db`, loaded with whatever it holds.
    pub fn with_database(db: DbConn) -> Result<Self> {
        let snapshot = {
            let conn = db.lock();
            db::init_schema(&conn)?;
            db::load_snapshot(&conn)?
        };

        let store = Self {
            db: Some(db),
            ..Self::new()
        };
        store.restore(snapshot)?;
        Ok(store)
    }

    fn restore(&self, snapshot: Snapshot) -> Result<()> {
        let mut max_seq = 0;
        let counts = (
            snapshot.entrances.len(),
            snapshot.sites.len(),
            snapshot.users.len(),
            snapshot.vehicles.len(),
        );

        for entrance in snapshot.entrances {
            max_seq = max_seq.max(entrance.seq);
            self.entrances.insert(entrance.id, entrance);
        }

        for site in snapshot.sites {
            max_seq = max_seq.max(site.seq);
            self.site_names
                .insert((site.kind, site.name.clone()), site.id);
            self.sites.insert(site.id, Arc::new(Mutex::new(site)));
        }

        for user in snapshot.users {
            max_seq = max_seq.max(user.seq);
            self.usernames.insert(user.username.clone(), user.id);
            self.users.insert(user.id, Arc::new(Mutex::new(user)));
        }

        for vehicle in snapshot.vehicles {
            let site = self.site_handle(vehicle.site_id).ok_or_else(|| {
                error!(
                    "Stored vehicle {} references missing site {}",
                    vehicle.id, vehicle.site_id
                );
                anyhow::anyhow!(
                    "vehicle {} references missing site {}",
                    vehicle.id,
                    vehicle.site_id
                )
            })?;
            let user = self.user_handle(vehicle.user_id).ok_or_else(|| {
                error!(
                    "Stored vehicle {} references missing user {}",
                    vehicle.id, vehicle.user_id
                );
                anyhow::anyhow!(
                    "vehicle {} references missing user {}",
                    vehicle.id,
                    vehicle.user_id
                )
            })?;

            let mut site = site.lock();
            if site.kind != vehicle.site_kind {
                error!(
                    "Stored vehicle {} is recorded at a {} but site {} is a {}",
                    vehicle.id, vehicle.site_kind, site.id, site.kind
                );
                return Err(anyhow::anyhow!(
                    "vehicle {} is recorded at a {} but site {} is a {}",
                    vehicle.id,
                    vehicle.site_kind,
                    site.id,
                    site.kind
                )
                .into());
            }
            if self.vehicle_by_user.contains_key(&vehicle.user_id) {
                error!(
                    "User {} has more than one stored vehicle",
                    vehicle.user_id
                );
                return Err(
                    anyhow::anyhow!("user {} has more than one stored vehicle", vehicle.user_id)
                        .into(),
                );
            }
            site.grid.claim(vehicle.spot).map_err(|e| {
                error!("Stored vehicle {} cannot re-claim its spot: {}", vehicle.id, e);
                anyhow::anyhow!("vehicle {} cannot re-claim its spot: {}", vehicle.id, e)
            })?;
            user.lock().parked = true;
            self.vehicle_by_user.insert(vehicle.user_id, vehicle.id);
            self.vehicles.insert(vehicle.id, vehicle);
        }

        self.sequence.store(max_seq + 1, Ordering::SeqCst);
        info!(
            "Loaded {} entrances, {} sites, {} users, {} parked vehicles from database",
            counts.0, counts.1, counts.2, counts.3
        );
        Ok(())
    }

    pub(crate) fn next_seq(&self) -> u64 {
        self.sequence.fetch_add(1, Ordering::SeqCst)
    }

    /// Runs a persistence write if a database is attached. In-memory state is
    /// the source of truth, so failures are logged and swallowed.
    pub(crate) fn write_through<F>(&self, entity: &str, id: impl Display, op: F)
    where
        F: FnOnce(&Connection) -> rusqlite::Result<()>,
    {
        if let Some(db) = &self.db {
            let conn = db.lock();
            if let Err(e) = op(&conn) {
                warn!("Failed to persist {} {} to database: {}", entity, id, e);
            }
        }
    }

    pub(crate) fn site_handle(&self, id: SiteId) -> Option<SiteHandle> {
        self.sites.get(&id).map(|entry| Arc::clone(entry.value()))
    }

    pub(crate) fn user_handle(&self, id: UserId) -> Option<UserHandle> {
        self.users.get(&id).map(|entry| Arc::clone(entry.value()))
    }

    // ── Entrances ───────────────────────────────────────────────────────

    /// Entrances are created while seeding and are immutable afterwards.
    pub fn add_entrance(
        &self,
        name: impl Into<String>,
        coordinates: Coordinates,
        region: Region,
    ) -> std::result::Result<EntranceId, ValidationError> {
        let name = name.into();
        validate_site_name(&name)?;
        validate_coordinates(&coordinates)?;

        let entrance = Entrance {
            id: EntranceId::new(),
            name: name.trim().to_string(),
            coordinates,
            region,
            seq: self.next_seq(),
        };
        let id = entrance.id;

        self.write_through("entrance", id, |conn| db::save_entrance(conn, &entrance));
        debug!("Entrance added: {} ({})", entrance.name, id);
        self.entrances.insert(id, entrance);
        Ok(id)
    }

    /// Entrances in insertion order, optionally only those in `region`.
    pub fn list_entrances(&self, region: Option<Region>) -> Vec<Entrance> {
        let mut entrances: Vec<Entrance> = self
            .entrances
            .iter()
            .filter(|entry| region.map_or(true, |r| entry.value().region == r))
            .map(|entry| entry.value().clone())
            .collect();
        entrances.sort_by_key(|e| e.seq);
        entrances
    }

    // ── Sites ───────────────────────────────────────────────────────────

    pub fn create_site(&self, new_site: NewSite) -> std::result::Result<SiteId, ValidationError> {
        validate_site_name(&new_site.name)?;
        validate_coordinates(&new_site.coordinates)?;
        validate_dimensions(&new_site.dimensions)?;
        if !self.entrances.contains_key(&new_site.nearest_entrance_id) {
            return Err(ValidationError::UnknownEntrance(
                new_site.nearest_entrance_id.to_string(),
            ));
        }

        let name = new_site.name.trim().to_string();
        let id = SiteId::new();

        match self.site_names.entry((new_site.kind, name.clone())) {
            Entry::Occupied(_) => {
                debug!("Rejected duplicate {} name '{}'", new_site.kind, name);
                return Err(ValidationError::DuplicateName {
                    kind: new_site.kind,
                    name,
                });
            }
            Entry::Vacant(entry) => {
                entry.insert(id);
            }
        }

        let site = Site {
            id,
            kind: new_site.kind,
            name,
            coordinates: new_site.coordinates,
            nearest_entrance_id: new_site.nearest_entrance_id,
            grid: Grid::new(new_site.dimensions),
            created_at: Utc::now(),
            seq: self.next_seq(),
        };

        self.write_through("site", id, |conn| db::save_site(conn, &site));
        info!(
            "Site created: {} '{}' ({} spots)",
            site.kind,
            site.name,
            site.grid.max_capacity()
        );
        self.sites.insert(id, Arc::new(Mutex::new(site)));
        Ok(id)
    }

    /// Renames, moves or resizes a site.
    ///
    /// Changing the dimensions re-allocates an empty grid and is refused while
    /// any spot is occupied. Unchanged dimensions keep the current grid.
    pub fn update_site(&self, id: SiteId, update: SiteUpdate) -> std::result::Result<(), SiteError> {
        validate_site_name(&update.name)?;
        validate_coordinates(&update.coordinates)?;
        validate_dimensions(&update.dimensions)?;

        let handle = self.site_handle(id).ok_or(NotFoundError::Site(id))?;
        let mut site = handle.lock();
        if !self.sites.contains_key(&id) {
            return Err(NotFoundError::Site(id).into());
        }

        let resize = site.dimensions() != update.dimensions;
        if resize {
            let occupied = site.grid.occupied_spots();
            if occupied > 0 {
                debug!("Rejected resize of '{}': {} spots occupied", site.name, occupied);
                return Err(ValidationError::ResizeWhileOccupied {
                    name: site.name.clone(),
                    occupied,
                }
                .into());
            }
        }

        let new_name = update.name.trim().to_string();
        if new_name != site.name {
            match self.site_names.entry((site.kind, new_name.clone())) {
                Entry::Occupied(entry) if *entry.get() != id => {
                    return Err(ValidationError::DuplicateName {
                        kind: site.kind,
                        name: new_name,
                    }
                    .into());
                }
                Entry::Occupied(_) => {}
                Entry::Vacant(entry) => {
                    entry.insert(id);
                }
            }
            self.site_names.remove(&(site.kind, site.name.clone()));
            site.name = new_name;
        }

        site.coordinates = update.coordinates;
        if resize {
            site.grid = Grid::new(update.dimensions);
        }

        self.write_through("site", id, |conn| db::save_site(conn, &site));
        info!(
            "Site updated: {} '{}' ({} spots{})",
            site.kind,
            site.name,
            site.grid.max_capacity(),
            if resize { ", resized" } else { "" }
        );
        Ok(())
    }

    /// Removes a site. Refused while any vehicle is parked there.
    pub fn delete_site(&self, id: SiteId) -> std::result::Result<(), SiteError> {
        let handle = self.site_handle(id).ok_or(NotFoundError::Site(id))?;
        let site = handle.lock();
        if !self.sites.contains_key(&id) {
            return Err(NotFoundError::Site(id).into());
        }

        // Every occupied cell belongs to exactly one vehicle record.
        let parked = site.grid.occupied_spots();
        if parked > 0 {
            debug!("Rejected delete of '{}': {} vehicles parked", site.name, parked);
            return Err(SiteError::Occupied {
                site_id: id,
                vehicles: parked,
            });
        }

        self.sites.remove(&id);
        self.site_names.remove(&(site.kind, site.name.clone()));
        self.write_through("site", id, |conn| db::delete_site(conn, id));
        info!("Site deleted: {} '{}'", site.kind, site.name);
        Ok(())
    }

    pub fn get_site(&self, id: SiteId) -> Option<SiteSummary> {
        self.site_handle(id).map(|handle| handle.lock().summary())
    }

    /// Sites of one kind in insertion order, optionally only those whose
    /// nearest entrance is `nearest_entrance`.
    pub fn list_sites(
        &self,
        kind: SiteKind,
        nearest_entrance: Option<EntranceId>,
    ) -> Vec<SiteSummary> {
        let handles: Vec<SiteHandle> = self
            .sites
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();

        let mut summaries: Vec<(u64, SiteSummary)> = handles
            .iter()
            .filter_map(|handle| {
                let site = handle.lock();
                let wanted = site.kind == kind
                    && nearest_entrance.map_or(true, |e| site.nearest_entrance_id == e);
                wanted.then(|| (site.seq, site.summary()))
            })
            .collect();
        summaries.sort_by_key(|(seq, _)| *seq);
        summaries.into_iter().map(|(_, summary)| summary).collect()
    }

    pub fn list_lots(&self) -> Vec<SiteSummary> {
        self.list_sites(SiteKind::Lot, None)
    }

    pub fn list_buildings(&self) -> Vec<SiteSummary> {
        self.list_sites(SiteKind::Building, None)
    }

    // ── Seeding ─────────────────────────────────────────────────────────

    /// Populates an empty registry with demo entrances, sites and accounts.
    /// Does nothing once any site or user exists.
    pub fn seed_demo_data(&self) -> Result<()> {
        if !self.sites.is_empty() || !self.users.is_empty() {
            debug!("Registry already populated; skipping demo data");
            return Ok(());
        }

        if self.entrances.is_empty() {
            for i in 0..6 {
                self.add_entrance(
                    format!("North Hall-{i}"),
                    Coordinates::new(123.0 + i as f64, 456.0 + i as f64),
                    Region::North,
                )?;
            }
        }
        let nearest_entrance_id = self
            .list_entrances(None)
            .first()
            .map(|e| e.id)
            .ok_or_else(|| AppError::Internal(anyhow::anyhow!("no entrances to seed sites near")))?;

        for i in 0..6u32 {
            self.create_site(NewSite {
                kind: SiteKind::Lot,
                name: format!("Lot-{i}"),
                coordinates: Coordinates::new(123.0 + i as f64, 456.0 + i as f64),
                dimensions: Dimensions::new(3, 5, 5),
                nearest_entrance_id,
            })?;
        }
        for i in 0..4u32 {
            self.create_site(NewSite {
                kind: SiteKind::Building,
                name: format!("building-{i}"),
                coordinates: Coordinates::new(123.0 + i as f64, 456.0 + i as f64),
                dimensions: Dimensions::new(3 + i, 5 + i, 5 + i),
                nearest_entrance_id,
            })?;
        }

        for (first_name, last_name, username, password, role) in [
            ("Admin", "Admin", "admin", "admin123", Role::Admin),
            ("User", "User", "user", "user123", Role::User),
        ] {
            self.register_user(NewUser {
                first_name: first_name.to_string(),
                last_name: last_name.to_string(),
                username: username.to_string(),
                password: password.to_string(),
                role,
            })?;
        }

        info!("Seeded demo entrances, sites and accounts");
        Ok(())
    }
}
