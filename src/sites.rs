//! HTTP handlers for entrances and sites.

use crate::{
    error::Result,
    models::{
        Coordinates, CreateSiteRequest, CreateSiteResponse, Dimensions, Entrance, EntranceQuery,
        NewSite, Region, SiteId, SiteKind, SiteQuery, SiteSummary, SiteUpdate, UpdateSiteRequest,
    },
};
use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    Json,
};

pub async fn list_entrances(
    State(state): State<crate::AppState>,
    headers: HeaderMap,
    Query(query): Query<EntranceQuery>,
) -> Result<Json<Vec<Entrance>>> {
    state.auth.authorize(&headers)?;
    let region = query
        .region
        .as_deref()
        .map(str::parse::<Region>)
        .transpose()?;
    Ok(Json(state.store.list_entrances(region)))
}

pub async fn list_lots(
    State(state): State<crate::AppState>,
    headers: HeaderMap,
    Query(query): Query<SiteQuery>,
) -> Result<Json<Vec<SiteSummary>>> {
    state.auth.authorize(&headers)?;
    Ok(Json(state.store.list_sites(SiteKind::Lot, query.entrance_id)))
}

pub async fn list_buildings(
    State(state): State<crate::AppState>,
    headers: HeaderMap,
    Query(query): Query<SiteQuery>,
) -> Result<Json<Vec<SiteSummary>>> {
    state.auth.authorize(&headers)?;
    Ok(Json(
        state.store.list_sites(SiteKind::Building, query.entrance_id),
    ))
}

pub async fn create_lot(
    state: State<crate::AppState>,
    headers: HeaderMap,
    req: Json<CreateSiteRequest>,
) -> Result<(StatusCode, Json<CreateSiteResponse>)> {
    create_site(SiteKind::Lot, state, headers, req).await
}

pub async fn create_building(
    state: State<crate::AppState>,
    headers: HeaderMap,
    req: Json<CreateSiteRequest>,
) -> Result<(StatusCode, Json<CreateSiteResponse>)> {
    create_site(SiteKind::Building, state, headers, req).await
}

async fn create_site(
    kind: SiteKind,
    State(state): State<crate::AppState>,
    headers: HeaderMap,
    Json(req): Json<CreateSiteRequest>,
) -> Result<(StatusCode, Json<CreateSiteResponse>)> {
    state.auth.require_admin(&headers)?;

    let id = state.store.create_site(NewSite {
        kind,
        name: req.name,
        coordinates: Coordinates::new(req.latitude, req.longitude),
        dimensions: Dimensions::new(req.floors, req.rows, req.cols),
        nearest_entrance_id: req.nearest_entrance_id,
    })?;

    Ok((StatusCode::CREATED, Json(CreateSiteResponse { id })))
}

pub async fn update_site(
    Path(id): Path<SiteId>,
    State(state): State<crate::AppState>,
    headers: HeaderMap,
    Json(req): Json<UpdateSiteRequest>,
) -> Result<Json<SiteSummary>> {
    state.auth.require_admin(&headers)?;

    state.store.update_site(
        id,
        SiteUpdate {
            name: req.name,
            coordinates: Coordinates::new(req.latitude, req.longitude),
            dimensions: Dimensions::new(req.floors, req.rows, req.cols),
        },
    )?;

    let summary = state
        .store
        .get_site(id)
        .ok_or(crate::error::NotFoundError::Site(id))?;
    Ok(Json(summary))
}

pub async fn delete_site(
    Path(id): Path<SiteId>,
    State(state): State<crate::AppState>,
    headers: HeaderMap,
) -> Result<StatusCode> {
    state.auth.require_admin(&headers)?;
    state.store.delete_site(id)?;
    Ok(StatusCode::NO_CONTENT)
}
