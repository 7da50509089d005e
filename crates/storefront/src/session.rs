//! Who is signed in.
//!
//! [`Session`] owns the identity and is the only writer of the credential
//! slot and the token store. Every identity transition bumps an epoch that
//! the wishlist and order containers use to drop responses meant for a
//! previous identity.
//!
//! ```text
//! anonymous --login/register/restore--> authenticating --ok--> authenticated
//!                                             |
//!                                             +--error--> (previous status)
//! authenticated --logout--> anonymous
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use thiserror::Error;
use tokio::sync::watch;
use tracing::{info, instrument, warn};

use crate::credential::{CredentialSlot, TokenStore};
use crate::error::{
    ErrorKind, ValidationError, add_breadcrumb, clear_sentry_user, require, set_sentry_user,
};
use crate::gateway::{AuthPayload, Credentials, Gateway, GatewayError, Identity, ProfileUpdate, Registration};

/// Errors from login, registration, and profile updates.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The backend refused the request; the message is shown inline.
    #[error("{0}")]
    Rejected(String),

    #[error("Network error: {0}")]
    Network(#[source] GatewayError),
}

impl SessionError {
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::Rejected(_) => ErrorKind::Auth,
            Self::Network(_) => ErrorKind::Network,
        }
    }
}

impl From<GatewayError> for SessionError {
    fn from(err: GatewayError) -> Self {
        match err.kind() {
            ErrorKind::Network => Self::Network(err),
            ErrorKind::Auth | ErrorKind::Validation => Self::Rejected(err.user_message()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionStatus {
    #[default]
    Anonymous,
    Authenticating,
    Authenticated,
}

/// Read-only view of the session handed to the state containers.
#[derive(Debug, Clone)]
pub struct SessionView {
    identity: watch::Receiver<Option<Identity>>,
    epoch: Arc<AtomicU64>,
}

impl SessionView {
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.identity.borrow().is_some()
    }

    #[must_use]
    pub fn identity(&self) -> Option<Identity> {
        self.identity.borrow().clone()
    }

    /// Changes every time the identity is established or discarded.
    #[must_use]
    pub fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::Acquire)
    }
}

pub struct Session {
    gateway: Arc<dyn Gateway>,
    credential: CredentialSlot,
    store: Arc<dyn TokenStore>,
    identity: watch::Sender<Option<Identity>>,
    status: RwLock<SessionStatus>,
    epoch: Arc<AtomicU64>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("status", &self.status())
            .field("credential", &self.credential)
            .finish_non_exhaustive()
    }
}

impl Session {
    #[must_use]
    pub(crate) fn new(
        gateway: Arc<dyn Gateway>,
        credential: CredentialSlot,
        store: Arc<dyn TokenStore>,
    ) -> Self {
        let (identity, _rx) = watch::channel(None);
        Self {
            gateway,
            credential,
            store,
            identity,
            status: RwLock::new(SessionStatus::Anonymous),
            epoch: Arc::new(AtomicU64::new(0)),
        }
    }

    // =========================================================================
    // Queries
    // =========================================================================

    #[must_use]
    pub fn status(&self) -> SessionStatus {
        *self.status.read().unwrap_or_else(PoisonError::into_inner)
    }

    #[must_use]
    pub fn identity(&self) -> Option<Identity> {
        self.identity.borrow().clone()
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.status() == SessionStatus::Authenticated
    }

    /// Observe identity transitions.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Option<Identity>> {
        self.identity.subscribe()
    }

    #[must_use]
    pub fn view(&self) -> SessionView {
        SessionView {
            identity: self.identity.subscribe(),
            epoch: Arc::clone(&self.epoch),
        }
    }

    #[must_use]
    pub const fn credential(&self) -> &CredentialSlot {
        &self.credential
    }

    // =========================================================================
    // Transitions
    // =========================================================================

    /// Sign in with email and password.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Validation` for malformed input (nothing is
    /// sent), `Rejected` when the backend refuses the credentials, and
    /// `Network` when the request could not complete.
    #[instrument(skip(self, password), fields(email = %email))]
    pub(crate) async fn login(&self, email: &str, password: &str) -> Result<Identity, SessionError> {
        let credentials = Credentials::parse(email, password)?;

        let previous = self.set_status(SessionStatus::Authenticating);
        match self.gateway.login(&credentials).await {
            Ok(payload) => Ok(self.establish(payload)),
            Err(e) => {
                warn!(error = %e, "Login failed");
                self.set_status(previous);
                Err(e.into())
            }
        }
    }

    /// Create an account and sign in as it.
    ///
    /// # Errors
    ///
    /// Same as [`Session::login`].
    #[instrument(skip(self, form), fields(email = %form.email, role = %form.role))]
    pub(crate) async fn register(&self, form: &Registration) -> Result<Identity, SessionError> {
        form.validate()?;

        let previous = self.set_status(SessionStatus::Authenticating);
        match self.gateway.register(form).await {
            Ok(payload) => Ok(self.establish(payload)),
            Err(e) => {
                warn!(error = %e, "Registration failed");
                self.set_status(previous);
                Err(e.into())
            }
        }
    }

    /// Resume a session from the stored token.
    ///
    /// Never fails: any problem discards the token and leaves the session
    /// anonymous. Returns the restored identity, if any.
    #[instrument(skip(self))]
    pub(crate) async fn restore_session(&self) -> Option<Identity> {
        if self.is_authenticated() {
            return self.identity();
        }

        let token = match self.store.load() {
            Ok(Some(token)) => token,
            Ok(None) => return None,
            Err(e) => {
                warn!(error = %e, "Could not read stored session token");
                return None;
            }
        };

        self.set_status(SessionStatus::Authenticating);
        self.credential.set(token);

        match self.gateway.profile().await {
            Ok(user) => {
                info!(user_id = %user.id, "Session restored");
                self.publish(Some(user.clone()));
                Some(user)
            }
            Err(e) => {
                warn!(error = %e, "Stored session is no longer valid, continuing anonymously");
                self.discard();
                None
            }
        }
    }

    /// Forget the token and identity. No request is made.
    pub(crate) fn logout(&self) {
        if self.identity.borrow().is_some() {
            add_breadcrumb("auth", "Signed out", None);
            info!("Signed out");
        }
        self.discard();
    }

    /// Save profile changes and refresh the held identity.
    ///
    /// # Errors
    ///
    /// Returns `Validation` for a blank name, otherwise as [`Session::login`].
    #[instrument(skip(self, update))]
    pub(crate) async fn update_profile(&self, update: &ProfileUpdate) -> Result<Identity, SessionError> {
        if let Some(name) = &update.name {
            require(name, "Name")?;
        }

        let epoch = self.epoch.load(Ordering::Acquire);
        let user = self.gateway.update_profile(update).await?;

        // Signed out or switched users while the request was in flight
        if self.epoch.load(Ordering::Acquire) != epoch || !self.is_authenticated() {
            return Err(SessionError::Rejected("Please log in".to_string()));
        }

        self.identity.send_replace(Some(user.clone()));
        Ok(user)
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn set_status(&self, status: SessionStatus) -> SessionStatus {
        let mut guard = self.status.write().unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(&mut *guard, status)
    }

    fn establish(&self, payload: AuthPayload) -> Identity {
        self.credential.set(payload.token.clone());
        if let Err(e) = self.store.save(&payload.token) {
            warn!(error = %e, "Could not persist session token");
        }

        info!(user_id = %payload.user.id, role = %payload.user.role, "Signed in");
        add_breadcrumb("auth", "Signed in", None);
        self.publish(Some(payload.user.clone()));
        payload.user
    }

    fn discard(&self) {
        self.credential.clear();
        if let Err(e) = self.store.clear() {
            warn!(error = %e, "Could not clear stored session token");
        }
        self.publish(None);
    }

    /// Swap the identity, bump the epoch, and move to the matching status.
    fn publish(&self, identity: Option<Identity>) {
        match &identity {
            Some(user) => set_sentry_user(&user.id, Some(&user.email)),
            None => clear_sentry_user(),
        }

        let status = if identity.is_some() {
            SessionStatus::Authenticated
        } else {
            SessionStatus::Anonymous
        };

        self.epoch.fetch_add(1, Ordering::AcqRel);
        self.identity.send_replace(identity);
        self.set_status(status);
    }
}
