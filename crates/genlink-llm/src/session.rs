use std::time::Duration;

use genlink_config::ContinuationConfig;
use mini_moka::sync::Cache;

/// Conversation id to last response id, with expiry
///
/// Owned by one client and injectable for tests. Entries expire after the
/// configured TTL; the oldest entries are evicted past `max_sessions`.
#[derive(Clone)]
pub struct SessionStore {
    sessions: Cache<String, String>,
}

impl SessionStore {
    pub fn new(ttl: Duration, max_sessions: u64) -> Self {
        Self {
            sessions: Cache::builder()
                .max_capacity(max_sessions)
                .time_to_live(ttl)
                .build(),
        }
    }

    /// Build from client configuration
    ///
    /// # Errors
    ///
    /// Returns an error if the session TTL is not a valid duration.
    pub fn from_config(config: &ContinuationConfig) -> anyhow::Result<Self> {
        Ok(Self::new(config.session_ttl()?, config.max_sessions))
    }

    /// Last response id recorded for a conversation
    pub fn get(&self, conversation_id: &str) -> Option<String> {
        self.sessions.get(&conversation_id.to_owned())
    }

    /// Record the response a conversation should continue from
    pub fn remember(&self, conversation_id: &str, response_id: &str) {
        self.sessions
            .insert(conversation_id.to_owned(), response_id.to_owned());
    }

    /// Drop a conversation, e.g. after the provider rejected its token
    pub fn forget(&self, conversation_id: &str) {
        self.sessions.invalidate(&conversation_id.to_owned());
    }
}

impl std::fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStore").finish_non_exhaustive()
    }
}

/// Pending session refresh for one call
#[derive(Debug, Clone)]
pub(crate) struct SessionUpdate {
    pub store: SessionStore,
    pub conversation_id: String,
}

impl SessionUpdate {
    pub fn remember(&self, response_id: Option<&str>) {
        if let Some(id) = response_id.filter(|id| !id.is_empty()) {
            self.store.remember(&self.conversation_id, id);
        }
    }

    pub fn forget(&self) {
        self.store.forget(&self.conversation_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn miss_returns_none() {
        let store = SessionStore::new(Duration::from_secs(60), 100);
        assert!(store.get("conv_1").is_none());
    }

    #[test]
    fn remember_and_forget() {
        let store = SessionStore::new(Duration::from_secs(60), 100);
        store.remember("conv_1", "resp_1");
        store.remember("conv_1", "resp_2");
        assert_eq!(store.get("conv_1").as_deref(), Some("resp_2"));

        store.forget("conv_1");
        assert!(store.get("conv_1").is_none());
    }

    #[test]
    fn clones_share_entries() {
        let store = SessionStore::new(Duration::from_secs(60), 100);
        let other = store.clone();
        store.remember("conv_1", "resp_1");
        assert_eq!(other.get("conv_1").as_deref(), Some("resp_1"));
    }

    #[test]
    fn entries_expire() {
        let store = SessionStore::new(Duration::from_millis(50), 100);
        store.remember("conv_1", "resp_1");
        std::thread::sleep(Duration::from_millis(120));
        assert!(store.get("conv_1").is_none());
    }

    #[test]
    fn from_config_parses_ttl() {
        let store = SessionStore::from_config(&ContinuationConfig::default()).unwrap();
        store.remember("conv_1", "resp_1");
        assert_eq!(store.get("conv_1").as_deref(), Some("resp_1"));
    }

    #[test]
    fn update_ignores_missing_ids() {
        let update = SessionUpdate {
            store: SessionStore::new(Duration::from_secs(60), 10),
            conversation_id: "conv_1".to_owned(),
        };
        update.remember(None);
        update.remember(Some(""));
        assert!(update.store.get("conv_1").is_none());
        update.remember(Some("resp_9"));
        assert_eq!(update.store.get("conv_1").as_deref(), Some("resp_9"));
    }
}
