//! Optional sqlite write-through for the registry.
//!
//! Grids are never stored. A site is loaded empty and every stored vehicle
//! re-claims its cell, so occupancy is always derived from vehicle records.

use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, Row};
use tracing::info;

use crate::grid::Grid;
use crate::models::{
    validate_dimensions, Coordinates, Dimensions, Entrance, EntranceId, Site, SiteId, Spot, User,
    Vehicle, VehicleId,
};

pub type DbConn = Arc<Mutex<Connection>>;

/// Everything persisted, in insertion order per table.
#[derive(Debug, Default)]
pub struct Snapshot {
    pub entrances: Vec<Entrance>,
    pub sites: Vec<Site>,
    pub users: Vec<User>,
    pub vehicles: Vec<Vehicle>,
}

pub fn open(database_url: &str) -> rusqlite::Result<DbConn> {
    let conn = Connection::open(database_url)?;
    init_schema(&conn)?;
    info!("Database opened at: {}", database_url);
    Ok(Arc::new(Mutex::new(conn)))
}

pub fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS entrances (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            latitude REAL NOT NULL,
            longitude REAL NOT NULL,
            region TEXT NOT NULL,
            seq INTEGER NOT NULL
        );
        CREATE TABLE IF NOT EXISTS sites (
            id TEXT PRIMARY KEY,
            kind TEXT NOT NULL,
            name TEXT NOT NULL,
            latitude REAL NOT NULL,
            longitude REAL NOT NULL,
            grid_floors INTEGER NOT NULL,
            grid_rows INTEGER NOT NULL,
            grid_cols INTEGER NOT NULL,
            nearest_entrance_id TEXT NOT NULL,
            created_at TEXT NOT NULL,
            seq INTEGER NOT NULL,
            UNIQUE (kind, name)
        );
        CREATE TABLE IF NOT EXISTS users (
            id TEXT PRIMARY KEY,
            first_name TEXT NOT NULL,
            last_name TEXT NOT NULL,
            username TEXT NOT NULL UNIQUE,
            password_hash TEXT NOT NULL,
            role TEXT NOT NULL,
            created_at TEXT NOT NULL,
            seq INTEGER NOT NULL
        );
        CREATE TABLE IF NOT EXISTS vehicles (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL UNIQUE,
            license_plate TEXT NOT NULL,
            site_kind TEXT NOT NULL,
            site_id TEXT NOT NULL,
            spot_floor INTEGER NOT NULL,
            spot_row INTEGER NOT NULL,
            spot_column INTEGER NOT NULL,
            parked_at TEXT NOT NULL
        );
        "#,
    )
}

fn parse_column<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw: String = row.get(idx)?;
    raw.parse::<T>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

fn parse_timestamp(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        })
}

pub fn load_snapshot(conn: &Connection) -> rusqlite::Result<Snapshot> {
    let mut snapshot = Snapshot::default();

    let mut stmt = conn.prepare(
        "SELECT id, name, latitude, longitude, region, seq FROM entrances ORDER BY seq",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok(Entrance {
            id: parse_column(row, 0)?,
            name: row.get(1)?,
            coordinates: Coordinates::new(row.get(2)?, row.get(3)?),
            region: parse_column(row, 4)?,
            seq: row.get::<_, i64>(5)? as u64,
        })
    })?;
    for entrance in rows {
        snapshot.entrances.push(entrance?);
    }

    let mut stmt = conn.prepare(
        "SELECT id, kind, name, latitude, longitude, grid_floors, grid_rows, grid_cols, \
         nearest_entrance_id, created_at, seq FROM sites ORDER BY seq",
    )?;
    let rows = stmt.query_map([], |row| {
        let dimensions = Dimensions::new(row.get(5)?, row.get(6)?, row.get(7)?);
        validate_dimensions(&dimensions).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(5, rusqlite::types::Type::Integer, Box::new(e))
        })?;
        Ok(Site {
            id: parse_column(row, 0)?,
            kind: parse_column(row, 1)?,
            name: row.get(2)?,
            coordinates: Coordinates::new(row.get(3)?, row.get(4)?),
            grid: Grid::new(dimensions),
            nearest_entrance_id: parse_column::<EntranceId>(row, 8)?,
            created_at: parse_timestamp(row, 9)?,
            seq: row.get::<_, i64>(10)? as u64,
        })
    })?;
    for site in rows {
        snapshot.sites.push(site?);
    }

    let mut stmt = conn.prepare(
        "SELECT id, first_name, last_name, username, password_hash, role, created_at, seq \
         FROM users ORDER BY seq",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok(User {
            id: parse_column(row, 0)?,
            first_name: row.get(1)?,
            last_name: row.get(2)?,
            username: row.get(3)?,
            password_hash: row.get(4)?,
            role: parse_column(row, 5)?,
            parked: false,
            created_at: parse_timestamp(row, 6)?,
            seq: row.get::<_, i64>(7)? as u64,
        })
    })?;
    for user in rows {
        snapshot.users.push(user?);
    }

    let mut stmt = conn.prepare(
        "SELECT id, user_id, license_plate, site_kind, site_id, spot_floor, spot_row, \
         spot_column, parked_at FROM vehicles ORDER BY parked_at",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok(Vehicle {
            id: parse_column(row, 0)?,
            user_id: parse_column(row, 1)?,
            license_plate: row.get(2)?,
            site_kind: parse_column(row, 3)?,
            site_id: parse_column(row, 4)?,
            spot: Spot::new(row.get(5)?, row.get(6)?, row.get(7)?),
            parked_at: parse_timestamp(row, 8)?,
        })
    })?;
    for vehicle in rows {
        snapshot.vehicles.push(vehicle?);
    }

    Ok(snapshot)
}

pub fn save_entrance(conn: &Connection, entrance: &Entrance) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO entrances (id, name, latitude, longitude, region, seq) \
         VALUES (?, ?, ?, ?, ?, ?)",
        params![
            entrance.id.to_string(),
            entrance.name,
            entrance.coordinates.latitude,
            entrance.coordinates.longitude,
            entrance.region.as_str(),
            entrance.seq as i64
        ],
    )?;
    Ok(())
}

pub fn save_site(conn: &Connection, site: &Site) -> rusqlite::Result<()> {
    let dims = site.dimensions();
    conn.execute(
        "INSERT OR REPLACE INTO sites (id, kind, name, latitude, longitude, grid_floors, \
         grid_rows, grid_cols, nearest_entrance_id, created_at, seq) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        params![
            site.id.to_string(),
            site.kind.as_str(),
            site.name,
            site.coordinates.latitude,
            site.coordinates.longitude,
            dims.floors,
            dims.rows,
            dims.cols,
            site.nearest_entrance_id.to_string(),
            site.created_at.to_rfc3339(),
            site.seq as i64
        ],
    )?;
    Ok(())
}

pub fn delete_site(conn: &Connection, site_id: SiteId) -> rusqlite::Result<()> {
    conn.execute("DELETE FROM sites WHERE id = ?", params![site_id.to_string()])?;
    Ok(())
}

pub fn save_user(conn: &Connection, user: &User) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO users (id, first_name, last_name, username, password_hash, \
         role, created_at, seq) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        params![
            user.id.to_string(),
            user.first_name,
            user.last_name,
            user.username,
            user.password_hash,
            user.role.as_str(),
            user.created_at.to_rfc3339(),
            user.seq as i64
        ],
    )?;
    Ok(())
}

pub fn save_vehicle(conn: &Connection, vehicle: &Vehicle) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO vehicles (id, user_id, license_plate, site_kind, site_id, \
         spot_floor, spot_row, spot_column, parked_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        params![
            vehicle.id.to_string(),
            vehicle.user_id.to_string(),
            vehicle.license_plate,
            vehicle.site_kind.as_str(),
            vehicle.site_id.to_string(),
            vehicle.spot.floor,
            vehicle.spot.row,
            vehicle.spot.column,
            vehicle.parked_at.to_rfc3339()
        ],
    )?;
    Ok(())
}

pub fn delete_vehicle(conn: &Connection, vehicle_id: VehicleId) -> rusqlite::Result<()> {
    conn.execute(
        "DELETE FROM vehicles WHERE id = ?",
        params![vehicle_id.to_string()],
    )?;
    Ok(())
}
