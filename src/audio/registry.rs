//! Guild → session map.
//!
//! Creation and replacement are atomic per guild (they happen under the
//! map's entry lock). A session leaves the map as soon as its connection is
//! destroyed.

use std::sync::Arc;

use dashmap::{mapref::entry::Entry, DashMap};
use serenity::model::id::GuildId;
use tracing::{debug, info};

use super::session::Session;

pub struct SessionRegistry<S> {
    sessions: DashMap<GuildId, Arc<Session<S>>>,
}

impl<S: Send + 'static> Default for SessionRegistry<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: Send + 'static> SessionRegistry<S> {
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
        }
    }

    pub fn get(&self, guild_id: GuildId) -> Option<Arc<Session<S>>> {
        self.sessions.get(&guild_id).map(|entry| entry.value().clone())
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Returns the guild's session if `reusable` accepts it, otherwise
    /// builds a new one with `create` and retires the old one.
    pub fn get_or_create<R, C>(
        self: &Arc<Self>,
        guild_id: GuildId,
        reusable: R,
        create: C,
    ) -> Arc<Session<S>>
    where
        R: FnOnce(&Session<S>) -> bool,
        C: FnOnce() -> Arc<Session<S>>,
    {
        let (session, replaced) = match self.sessions.entry(guild_id) {
            Entry::Occupied(mut entry) => {
                if reusable(entry.get()) {
                    return entry.get().clone();
                }
                let session = create();
                let old = entry.insert(session.clone());
                (session, Some(old))
            }
            Entry::Vacant(entry) => {
                let session = create();
                entry.insert(session.clone());
                (session, None)
            }
        };

        if let Some(old) = replaced {
            info!("♻️ Replacing session in guild {}", guild_id);
            old.retire();
        }
        self.remove_when_destroyed(guild_id, &session);
        session
    }

    pub fn remove(&self, guild_id: GuildId) -> Option<Arc<Session<S>>> {
        self.sessions.remove(&guild_id).map(|(_, session)| session)
    }

    /// Removes the entry only if it still is `session`.
    pub fn remove_if_same(&self, guild_id: GuildId, session: &Arc<Session<S>>) -> bool {
        self.sessions
            .remove_if(&guild_id, |_, current| Arc::ptr_eq(current, session))
            .is_some()
    }

    /// Destroys every session. Used on shutdown.
    pub async fn shutdown(&self) {
        let sessions: Vec<_> = self
            .sessions
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        self.sessions.clear();
        futures::future::join_all(sessions.iter().map(|session| session.destroy())).await;
    }

    fn remove_when_destroyed(self: &Arc<Self>, guild_id: GuildId, session: &Arc<Session<S>>) {
        let registry = Arc::downgrade(self);
        let weak_session = Arc::downgrade(session);
        let mut states = session.subscribe_connection();
        tokio::spawn(async move {
            // an Err means the connection is gone entirely, which is as final as Destroyed
            let _ = states.wait_for(|state| state.is_destroyed()).await;
            if let (Some(registry), Some(session)) = (registry.upgrade(), weak_session.upgrade()) {
                if registry.remove_if_same(guild_id, &session) {
                    debug!("🗑️ Session for guild {} removed from registry", guild_id);
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{
        connection::{ConnectionState, RecoveryPolicy, VoiceConnection},
        testing::{settle, EventLog, FakeConnection, FakePlayer, FakeResolver},
    };
    use serenity::model::id::ChannelId;

    fn session(connection: Arc<FakeConnection>) -> Arc<Session<String>> {
        let (player, events) = FakePlayer::new();
        Session::start(
            GuildId::new(7),
            connection,
            player,
            events,
            Arc::new(FakeResolver::default()),
            RecoveryPolicy::default(),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_reuses_accepted_session() {
        let registry = Arc::new(SessionRegistry::new());
        let first = registry.get_or_create(
            GuildId::new(7),
            |_| true,
            || session(FakeConnection::ready(ChannelId::new(1))),
        );
        let second = registry.get_or_create(GuildId::new(7), |_| true, || unreachable!());

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_replacement_retires_old_session() {
        let registry = Arc::new(SessionRegistry::new());
        let old = registry.get_or_create(
            GuildId::new(7),
            |_| true,
            || session(FakeConnection::ready(ChannelId::new(1))),
        );
        let log = EventLog::default();
        old.enqueue(log.sink(), "a", None, None).unwrap();
        settle().await;

        let new = registry.get_or_create(
            GuildId::new(7),
            |_| false,
            || session(FakeConnection::ready(ChannelId::new(2))),
        );

        assert!(!Arc::ptr_eq(&old, &new));
        assert!(old.is_closed());
        assert!(!new.is_closed());
        assert_eq!(registry.get(GuildId::new(7)).map(|s| s.channel_id()), Some(ChannelId::new(2)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_destroyed_session_leaves_registry() {
        let registry = Arc::new(SessionRegistry::new());
        let connection = FakeConnection::ready(ChannelId::new(1));
        registry.get_or_create(GuildId::new(7), |_| true, || session(connection.clone()));
        settle().await;

        connection.set(ConnectionState::Destroyed);
        settle().await;

        assert!(registry.get(GuildId::new(7)).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_destroy_keeps_replacement() {
        let registry = Arc::new(SessionRegistry::new());
        let old_connection = FakeConnection::ready(ChannelId::new(1));
        registry.get_or_create(GuildId::new(7), |_| true, || session(old_connection.clone()));
        let new = registry.get_or_create(
            GuildId::new(7),
            |_| false,
            || session(FakeConnection::ready(ChannelId::new(2))),
        );

        old_connection.set(ConnectionState::Destroyed);
        settle().await;

        let current = registry.get(GuildId::new(7));
        assert!(current.is_some_and(|s| Arc::ptr_eq(&s, &new)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_destroys_all() {
        let registry = Arc::new(SessionRegistry::new());
        let connections: Vec<_> = (1..=3)
            .map(|id| FakeConnection::ready(ChannelId::new(id)))
            .collect();
        for (id, connection) in (1u64..).zip(&connections) {
            registry.get_or_create(GuildId::new(id), |_| true, || session(connection.clone()));
        }

        registry.shutdown().await;

        assert!(registry.is_empty());
        assert!(connections.iter().all(|c| c.state().is_destroyed()));
    }
}
