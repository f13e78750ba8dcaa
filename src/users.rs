use crate::{
    db,
    error::{AuthError, RegisterError},
    models::{validate_new_user, NewUser, Role, User, UserId},
    password,
    store::ParkingStore,
};
use chrono::Utc;
use dashmap::mapref::entry::Entry;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, info, warn};

impl ParkingStore {
    /// Registers a user. Usernames are unique by exact, case-sensitive match.
    pub fn register_user(&self, new_user: NewUser) -> Result<UserId, RegisterError> {
        validate_new_user(&new_user)?;

        // Skip the expensive hash for names that are obviously taken.
        if self.usernames.contains_key(&new_user.username) {
            debug!("Rejected duplicate username '{}'", new_user.username);
            return Err(RegisterError::DuplicateUsername(new_user.username));
        }

        let password_hash = password::hash_password(&new_user.password)
            .map_err(|e| RegisterError::Hashing(e.to_string()))?;

        let id = UserId::new();
        match self.usernames.entry(new_user.username.clone()) {
            Entry::Occupied(_) => {
                debug!("Rejected duplicate username '{}'", new_user.username);
                return Err(RegisterError::DuplicateUsername(new_user.username));
            }
            Entry::Vacant(entry) => {
                entry.insert(id);
            }
        }

        let user = User {
            id,
            first_name: new_user.first_name.trim().to_string(),
            last_name: new_user.last_name.trim().to_string(),
            username: new_user.username,
            password_hash,
            role: new_user.role,
            parked: false,
            created_at: Utc::now(),
            seq: self.next_seq(),
        };

        self.write_through("user", id, |conn| db::save_user(conn, &user));
        info!("User registered: {} ({})", user.username, user.role.as_str());
        self.users.insert(id, Arc::new(Mutex::new(user)));
        Ok(id)
    }

    /// Checks a username and password, then that the account holds `role`.
    ///
    /// A correct password presented with the wrong role is `RoleMismatch`;
    /// it never falls back to granting the account's actual role.
    pub fn authenticate(
        &self,
        username: &str,
        password: &str,
        role: Role,
    ) -> Result<UserId, AuthError> {
        let Some((id, handle)) = self
            .usernames
            .get(username)
            .map(|entry| *entry.value())
            .and_then(|id| Some((id, self.user_handle(id)?)))
        else {
            debug!("Login attempt for unknown user '{}'", username);
            password::verify_dummy(password);
            return Err(AuthError::InvalidCredentials);
        };

        // Hash verification is slow; don't hold the user lock for it.
        let (password_hash, actual_role) = {
            let user = handle.lock();
            (user.password_hash.clone(), user.role)
        };

        match password::verify_password(password, &password_hash) {
            Ok(true) => {}
            Ok(false) => {
                debug!("Wrong password for '{}'", username);
                return Err(AuthError::InvalidCredentials);
            }
            Err(e) => {
                warn!("Stored password hash for '{}' is unreadable: {}", username, e);
                return Err(AuthError::InvalidCredentials);
            }
        }

        if actual_role != role {
            debug!(
                "'{}' authenticated as {} but requested {}",
                username,
                actual_role.as_str(),
                role.as_str()
            );
            return Err(AuthError::RoleMismatch);
        }

        Ok(id)
    }

    pub fn get_user(&self, id: UserId) -> Option<User> {
        self.user_handle(id).map(|handle| handle.lock().clone())
    }

    pub fn find_user_by_username(&self, username: &str) -> Option<User> {
        let id = self.usernames.get(username).map(|entry| *entry.value())?;
        self.get_user(id)
    }
}
