pub mod app;
pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod grid;
pub mod models;
pub mod parking;
pub mod password;
pub mod sessions;
pub mod sites;
pub mod store;
pub mod users;

pub use app::AppState;
pub use store::ParkingStore;
