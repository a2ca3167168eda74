//! Player Sessions
//!
//! A [`Player`] exists from a successful login until its connection closes.
//! The [`SessionRegistry`] owns every player and enforces one live session
//! per username.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::RwLock;
use tracing::info;

use crate::core::ids::{LobbyId, SessionId};
use crate::game::roster::Occupant;
use crate::network::auth::{Account, AccountId, AuthError, CredentialStore};
use crate::network::connection::Connection;

/// A player's place in a lobby.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Role {
    /// Seat 0.
    Host,
    /// Seated member.
    Member,
    /// Waiting in the overflow queue.
    Queued,
}

/// Lobby a player belongs to, and how.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Membership {
    /// The lobby.
    pub lobby: LobbyId,
    /// Role in it.
    pub role: Role,
}

/// An authenticated, connected player.
#[derive(Debug)]
pub struct Player {
    id: SessionId,
    account: AccountId,
    name: String,
    lang: String,
    connection: Arc<Connection>,
    // Only written under the owning lobby's lock; never held across an await.
    membership: Mutex<Option<Membership>>,
}

impl Player {
    /// Create a player for a verified account.
    pub fn new(account: Account, connection: Arc<Connection>) -> Self {
        Self {
            id: SessionId::generate(),
            account: account.id,
            name: account.username,
            lang: account.lang,
            connection,
            membership: Mutex::new(None),
        }
    }

    /// Session identifier.
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Account identifier.
    pub fn account_id(&self) -> AccountId {
        self.account
    }

    /// Display name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Preferred language tag.
    pub fn lang(&self) -> &str {
        &self.lang
    }

    /// Socket handle.
    pub fn connection(&self) -> &Arc<Connection> {
        &self.connection
    }

    /// Current lobby membership.
    pub fn membership(&self) -> Option<Membership> {
        *self.membership.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replace the membership.
    pub fn set_membership(&self, membership: Option<Membership>) {
        *self.membership.lock().unwrap_or_else(PoisonError::into_inner) = membership;
    }

    /// Clear the membership if it points at `lobby`.
    pub fn clear_membership(&self, lobby: LobbyId) {
        let mut slot = self.membership.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.is_some_and(|m| m.lobby == lobby) {
            *slot = None;
        }
    }
}

impl Occupant for Arc<Player> {
    fn occupant_id(&self) -> SessionId {
        self.id
    }
}

// =============================================================================
// SESSION REGISTRY
// =============================================================================

#[derive(Default)]
struct SessionIndex {
    by_id: BTreeMap<SessionId, Arc<Player>>,
    by_name: BTreeMap<String, SessionId>,
}

/// All logged-in players.
#[derive(Default)]
pub struct SessionRegistry {
    index: RwLock<SessionIndex>,
}

impl SessionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Verify credentials and create a session for `username`.
    pub async fn register(
        &self,
        connection: Arc<Connection>,
        username: &str,
        password: &str,
        store: &dyn CredentialStore,
    ) -> Result<Arc<Player>, AuthError> {
        let account = store.login(username, password).await?;

        let mut index = self.index.write().await;
        if index.by_name.contains_key(&account.username) {
            return Err(AuthError::AlreadyLoggedIn(account.username));
        }

        let player = Arc::new(Player::new(account, connection));
        index.by_name.insert(player.name.clone(), player.id);
        index.by_id.insert(player.id, player.clone());

        info!(
            "Player {} logged in as {} (account {}, {}) from {}",
            player.id.short(),
            player.name,
            player.account_id().0,
            player.lang,
            player.connection.peer()
        );
        Ok(player)
    }

    /// Remove a session. Idempotent.
    pub async fn unregister(&self, id: SessionId) -> Option<Arc<Player>> {
        let mut index = self.index.write().await;
        let player = index.by_id.remove(&id)?;
        index.by_name.remove(&player.name);
        info!("Player {} ({}) logged out", id.short(), player.name);
        Some(player)
    }

    /// Whether `name` has a live session.
    pub async fn is_name_active(&self, name: &str) -> bool {
        self.index.read().await.by_name.contains_key(name)
    }

    /// Number of live sessions.
    pub async fn count(&self) -> usize {
        self.index.read().await.by_id.len()
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Players wired to in-memory pipes.

    use std::time::Duration;

    use tokio::io::{AsyncReadExt, DuplexStream};

    use super::*;
    use crate::network::protocol::{FrameBuffer, Response, ResponseCode};

    /// Read side of a test player's connection.
    pub struct Inbox {
        stream: DuplexStream,
        buffer: FrameBuffer,
    }

    impl Inbox {
        /// Every frame delivered so far.
        pub async fn drain(&mut self) -> Vec<Response> {
            let mut frames = Vec::new();
            let mut chunk = [0u8; 4096];
            loop {
                if let Some(frame) = self.buffer.next_frame() {
                    frames.push(Response::decode(&frame).unwrap());
                    continue;
                }
                match tokio::time::timeout(Duration::from_millis(20), self.stream.read(&mut chunk)).await {
                    Ok(Ok(n)) if n > 0 => self.buffer.extend(&chunk[..n]),
                    _ => break,
                }
            }
            frames
        }

        /// Codes delivered so far.
        pub async fn codes(&mut self) -> Vec<ResponseCode> {
            self.drain().await.into_iter().map(|r| r.code).collect()
        }
    }

    /// A logged-in player plus its inbox.
    pub fn player(name: &str, lang: &str) -> (Arc<Player>, Inbox) {
        let (client, server) = tokio::io::duplex(64 * 1024);
        let peer = "127.0.0.1:9".parse().unwrap();
        let connection = Arc::new(Connection::new(peer, server, Duration::from_secs(1)));
        let account = Account {
            id: AccountId(0),
            username: name.to_string(),
            lang: lang.to_string(),
        };
        let player = Arc::new(Player::new(account, connection));
        (player, Inbox { stream: client, buffer: FrameBuffer::new() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::auth::MemoryCredentialStore;
    use crate::network::session::Role;
    use std::time::Duration;

    fn connection() -> Arc<Connection> {
        let peer = "127.0.0.1:1".parse().unwrap();
        Arc::new(Connection::new(peer, tokio::io::sink(), Duration::from_secs(1)))
    }

    async fn store() -> MemoryCredentialStore {
        let store = MemoryCredentialStore::new();
        store.signup("anna", "pw", "it").await.unwrap();
        store
    }

    #[tokio::test]
    async fn test_register_and_unregister() {
        let store = store().await;
        let bruno = store.signup("bruno", "pw", "en").await.unwrap();
        let registry = SessionRegistry::new();

        let player = registry.register(connection(), "anna", "pw", &store).await.unwrap();
        assert_eq!(player.lang(), "it");
        let other = registry.register(connection(), "bruno", "pw", &store).await.unwrap();
        assert_eq!(other.account_id(), bruno);
        assert_ne!(player.account_id(), bruno);
        registry.unregister(other.id()).await;
        assert!(registry.is_name_active("anna").await);
        assert_eq!(registry.count().await, 1);

        assert!(registry.unregister(player.id()).await.is_some());
        assert!(registry.unregister(player.id()).await.is_none());
        assert!(!registry.is_name_active("anna").await);
    }

    #[tokio::test]
    async fn test_second_login_rejected() {
        let store = store().await;
        let registry = SessionRegistry::new();
        registry.register(connection(), "anna", "pw", &store).await.unwrap();

        let err = registry.register(connection(), "anna", "pw", &store).await.unwrap_err();
        assert_eq!(err, AuthError::AlreadyLoggedIn("anna".into()));
        assert_eq!(registry.count().await, 1);
    }

    #[tokio::test]
    async fn test_bad_credentials() {
        let store = store().await;
        let registry = SessionRegistry::new();
        assert_eq!(
            registry.register(connection(), "anna", "nope", &store).await.unwrap_err(),
            AuthError::InvalidCredentials
        );
        assert_eq!(
            registry.register(connection(), "ghost", "pw", &store).await.unwrap_err(),
            AuthError::InvalidCredentials
        );
    }

    #[tokio::test]
    async fn test_clear_membership_only_for_matching_lobby() {
        let (player, _inbox) = testing::player("p", "en");
        let lobby = LobbyId::generate();
        player.set_membership(Some(Membership { lobby, role: Role::Member }));

        player.clear_membership(LobbyId::generate());
        assert!(player.membership().is_some());
        player.clear_membership(lobby);
        assert!(player.membership().is_none());
    }
}
