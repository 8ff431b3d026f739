use dashmap::DashMap;

/// Who is making the request: the client session plus the user id when a
/// valid access token was presented.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub session_key: String,
    pub user_id: Option<i64>,
}

impl Identity {
    pub fn new(session_key: impl Into<String>, user_id: Option<i64>) -> Self {
        Self {
            session_key: session_key.into(),
            user_id,
        }
    }
}

/// Remembers which order a session is working on.
pub trait SessionStore: Send + Sync {
    fn get_active_order_id(&self, session_key: &str) -> Option<i64>;
    fn set_active_order_id(&self, session_key: &str, order_id: i64);
    fn clear_active_order_id(&self, session_key: &str);
}

#[derive(Default)]
pub struct MemorySessionStore {
    orders: DashMap<String, i64>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for MemorySessionStore {
    fn get_active_order_id(&self, session_key: &str) -> Option<i64> {
        self.orders.get(session_key).map(|id| *id)
    }

    fn set_active_order_id(&self, session_key: &str, order_id: i64) {
        self.orders.insert(session_key.to_string(), order_id);
    }

    fn clear_active_order_id(&self, session_key: &str) {
        self.orders.remove(session_key);
    }
}
