use crate::{
    error::{AppError, Result},
    models::{
        CreateUserRequest, LoginRequest, LoginResponse, NewUser, RegisterRequest,
        RegisterResponse, Role, UserId,
    },
    sessions::{Session, SessionStore},
    store::ParkingStore,
};
use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    Json,
};
use tracing::{debug, info};

/// Pull the token out of `Authorization: Bearer <token>`.
fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

// ---------------------------------------------------------------------------
// AuthService
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct AuthService {
    store: ParkingStore,
    sessions: SessionStore,
}

impl AuthService {
    pub fn new(store: ParkingStore, sessions: SessionStore) -> Self {
        Self { store, sessions }
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    /// Registers a user off the async runtime; hashing is CPU bound.
    pub async fn register(&self, new_user: NewUser) -> Result<UserId> {
        let store = self.store.clone();
        let id = tokio::task::spawn_blocking(move || store.register_user(new_user))
            .await
            .map_err(|e| AppError::Internal(e.into()))??;
        Ok(id)
    }

    /// Verifies credentials and opens a session. Nothing is recorded when
    /// verification fails.
    pub async fn login(&self, username: String, password: String, role: Role) -> Result<Session> {
        let store = self.store.clone();
        let user_id =
            tokio::task::spawn_blocking(move || store.authenticate(&username, &password, role))
                .await
                .map_err(|e| AppError::Internal(e.into()))??;

        Ok(self.sessions.create_session(user_id, role))
    }

    pub fn logout(&self, token: &str) {
        self.sessions.terminate(token);
    }

    pub fn is_logged_in(&self, token: &str) -> bool {
        self.sessions.is_active(token)
    }

    /// Resolves the bearer token on a request to its session.
    pub fn authorize(&self, headers: &HeaderMap) -> Result<Session> {
        let token = bearer_token(headers).ok_or(AppError::MissingAuth)?;
        self.sessions.resolve(token)
    }

    pub fn require_admin(&self, headers: &HeaderMap) -> Result<Session> {
        let session = self.authorize(headers)?;
        if session.role != Role::Admin {
            debug!("User {} denied admin operation", session.user_id);
            return Err(AppError::Forbidden("admin role required".to_string()));
        }
        Ok(session)
    }
}

// ---------------------------------------------------------------------------
// Route handlers
// ---------------------------------------------------------------------------

pub async fn register(
    State(state): State<crate::AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<RegisterResponse>)> {
    let username = req.username.clone();
    let user_id = state
        .auth
        .register(NewUser {
            first_name: req.first_name,
            last_name: req.last_name,
            username: req.username,
            password: req.password,
            role: Role::User,
        })
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            user_id,
            username,
            role: Role::User,
        }),
    ))
}

pub async fn login(
    State(state): State<crate::AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<LoginResponse>> {
    let session = state.auth.login(req.username, req.password, req.role).await?;

    Ok(Json(LoginResponse {
        token: session.token,
        user_id: session.user_id,
        role: session.role,
        expires_at: session.expires_at,
    }))
}

pub async fn logout(
    State(state): State<crate::AppState>,
    headers: HeaderMap,
) -> Result<StatusCode> {
    let token = bearer_token(&headers).ok_or(AppError::MissingAuth)?;
    state.auth.logout(token);
    Ok(StatusCode::NO_CONTENT)
}

pub async fn create_user(
    State(state): State<crate::AppState>,
    headers: HeaderMap,
    Json(req): Json<CreateUserRequest>,
) -> Result<(StatusCode, Json<RegisterResponse>)> {
    let admin = state.auth.require_admin(&headers)?;

    let username = req.username.clone();
    let role = req.role;
    let user_id = state
        .auth
        .register(NewUser {
            first_name: req.first_name,
            last_name: req.last_name,
            username: req.username,
            password: req.password,
            role,
        })
        .await?;

    info!("Admin {} created user {} ({})", admin.user_id, username, role.as_str());
    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            user_id,
            username,
            role,
        }),
    ))
}
