//! Signed-in session state.
//!
//! One `Session` exists per signed-in user. It is created empty, populated by
//! `begin` after a successful sign-in and wiped by `clear` on sign-out or a
//! failed token refresh. Services share it through `SharedSession`.

use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::{anyhow, Result};

use super::credentials::CredentialStore;
use crate::models::{AppNotification, Tokens, User};

/// Pseudo-location meaning "every location".
pub const ALL_LOCATIONS: &str = "All";
pub const MAX_LOCATION_NAME_CHARS: usize = 32;

pub type SharedSession = Arc<Mutex<Session>>;

pub struct Session {
    tokens: Option<Tokens>,
    user: Option<User>,
    current_location: String,
    notifications: Vec<AppNotification>,
    store: Arc<dyn CredentialStore>,
}

impl Session {
    pub fn new(store: Arc<dyn CredentialStore>) -> Self {
        Self {
            tokens: None,
            user: None,
            current_location: ALL_LOCATIONS.to_string(),
            notifications: Vec::new(),
            store,
        }
    }

    pub fn shared(store: Arc<dyn CredentialStore>) -> SharedSession {
        Arc::new(Mutex::new(Self::new(store)))
    }

    /// Record a sign-in. Either half may be absent in a partial response.
    pub fn begin(&mut self, user: Option<User>, tokens: Option<Tokens>) -> Result<()> {
        if let Some(user) = user {
            self.current_location = user
                .locations()
                .first()
                .cloned()
                .unwrap_or_else(|| ALL_LOCATIONS.to_string());
            self.user = Some(user);
        }
        if let Some(tokens) = tokens {
            self.set_tokens(tokens)?;
        }
        log::info!("session saved");
        Ok(())
    }

    /// Replace tokens and persist the refresh credential.
    pub fn set_tokens(&mut self, tokens: Tokens) -> Result<()> {
        self.store.store(&tokens.refresh_token)?;
        self.tokens = Some(tokens);
        Ok(())
    }

    /// Forget the access token so requests fall back to the refresh credential.
    pub fn drop_access_token(&mut self) {
        if let Some(tokens) = self.tokens.as_mut() {
            tokens.access_token.clear();
        }
    }

    /// Wipe all state and the stored credential.
    pub fn clear(&mut self) -> Result<()> {
        self.tokens = None;
        self.user = None;
        self.notifications.clear();
        self.current_location = ALL_LOCATIONS.to_string();
        self.store.delete()
    }

    pub fn is_signed_in(&self) -> bool {
        self.tokens.is_some()
    }

    /// `Bearer` value: the access token, else the refresh token.
    pub fn bearer(&self) -> Option<String> {
        let tokens = self.tokens.as_ref()?;
        if !tokens.access_token.is_empty() {
            Some(tokens.access_token.clone())
        } else if !tokens.refresh_token.is_empty() {
            Some(tokens.refresh_token.clone())
        } else {
            None
        }
    }

    pub fn refresh_token(&self) -> Option<String> {
        self.tokens
            .as_ref()
            .map(|tokens| tokens.refresh_token.clone())
            .filter(|token| !token.is_empty())
    }

    /// Load a refresh credential left by a previous launch.
    pub fn restore_stored_credential(&mut self) -> Result<bool> {
        match self.store.retrieve()? {
            Some(refresh_token) => {
                self.tokens = Some(Tokens {
                    access_token: String::new(),
                    refresh_token,
                });
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub fn user(&self) -> Option<&User> {
        self.user.as_ref()
    }

    pub fn user_mut(&mut self) -> Option<&mut User> {
        self.user.as_mut()
    }

    pub fn current_location(&self) -> &str {
        &self.current_location
    }

    pub fn set_current_location(&mut self, location: &str) {
        self.current_location = location.to_string();
    }

    pub fn locations(&self) -> &[String] {
        self.user.as_ref().map(User::locations).unwrap_or(&[])
    }

    /// Apply a server-confirmed location list. The current location falls back
    /// to `All` when it no longer exists.
    pub fn set_locations(&mut self, locations: Vec<String>) {
        if self.current_location != ALL_LOCATIONS && !locations.contains(&self.current_location) {
            self.current_location = ALL_LOCATIONS.to_string();
        }
        if let Some(user) = self.user.as_mut() {
            user.locations = Some(locations);
        }
    }

    pub fn notifications(&self) -> &[AppNotification] {
        &self.notifications
    }

    pub fn set_notifications(&mut self, notifications: Vec<AppNotification>) {
        self.notifications = notifications;
    }

    pub fn remove_notification(&mut self, id: &str) {
        self.notifications.retain(|note| note.id != id);
    }
}

/// Lock a shared session, mapping poisoning to an error.
pub fn lock(session: &SharedSession) -> Result<MutexGuard<'_, Session>> {
    session.lock().map_err(|_| anyhow!("session lock poisoned"))
}

/// Reject names the location list cannot hold.
pub fn validate_location_name(name: &str) -> Result<()> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(anyhow!("location name must not be empty"));
    }
    if trimmed.chars().count() > MAX_LOCATION_NAME_CHARS {
        return Err(anyhow!(
            "location name cannot be more than {} characters long",
            MAX_LOCATION_NAME_CHARS
        ));
    }
    if trimmed.eq_ignore_ascii_case(ALL_LOCATIONS) {
        return Err(anyhow!("'{}' is reserved", trimmed));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::credentials::InMemoryCredentialStore;

    fn user(locations: Option<Vec<&str>>) -> User {
        let mut user: User = serde_json::from_str(r#"{"userId": "u1"}"#).unwrap();
        user.locations = locations.map(|l| l.into_iter().map(str::to_string).collect());
        user
    }

    fn tokens(access: &str, refresh: &str) -> Tokens {
        Tokens {
            access_token: access.to_string(),
            refresh_token: refresh.to_string(),
        }
    }

    #[test]
    fn begin_picks_first_location_and_persists_refresh() {
        let store = Arc::new(InMemoryCredentialStore::new());
        let mut session = Session::new(store.clone());
        session
            .begin(Some(user(Some(vec!["Kitchen", "Office"]))), Some(tokens("a", "r")))
            .unwrap();
        assert_eq!(session.current_location(), "Kitchen");
        assert_eq!(store.retrieve().unwrap().as_deref(), Some("r"));
        assert_eq!(session.bearer().as_deref(), Some("a"));
    }

    #[test]
    fn begin_without_locations_selects_all() {
        let mut session = Session::new(Arc::new(InMemoryCredentialStore::new()));
        session.begin(Some(user(None)), None).unwrap();
        assert_eq!(session.current_location(), ALL_LOCATIONS);
    }

    #[test]
    fn bearer_falls_back_to_refresh() {
        let mut session = Session::new(Arc::new(InMemoryCredentialStore::new()));
        assert_eq!(session.bearer(), None);
        session.set_tokens(tokens("a", "r")).unwrap();
        session.drop_access_token();
        assert_eq!(session.bearer().as_deref(), Some("r"));
    }

    #[test]
    fn clear_wipes_everything() {
        let store = Arc::new(InMemoryCredentialStore::new());
        let mut session = Session::new(store.clone());
        session
            .begin(Some(user(Some(vec!["Den"]))), Some(tokens("a", "r")))
            .unwrap();
        session.clear().unwrap();
        assert!(!session.is_signed_in());
        assert!(session.user().is_none());
        assert_eq!(session.current_location(), ALL_LOCATIONS);
        assert_eq!(store.retrieve().unwrap(), None);
    }

    #[test]
    fn removed_current_location_falls_back_to_all() {
        let mut session = Session::new(Arc::new(InMemoryCredentialStore::new()));
        session
            .begin(Some(user(Some(vec!["Den", "Garage"]))), None)
            .unwrap();
        session.set_locations(vec!["Den".to_string()]);
        assert_eq!(session.current_location(), "Den");
        session.set_locations(vec!["Garage".to_string()]);
        assert_eq!(session.current_location(), ALL_LOCATIONS);
        assert_eq!(session.locations(), &["Garage".to_string()]);
    }

    #[test]
    fn location_names_are_validated() {
        assert!(validate_location_name("Kitchen").is_ok());
        assert!(validate_location_name("  ").is_err());
        assert!(validate_location_name("all").is_err());
        assert!(validate_location_name(&"x".repeat(33)).is_err());
    }
}
