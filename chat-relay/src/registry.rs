use std::collections::HashMap;

use parking_lot::Mutex;

use crate::handle::ConnectionHandle;

/// Directory of online users, keyed by registered name.
///
/// Every operation takes the same lock and does only in-memory bookkeeping
/// while holding it. Callers deliver frames after the lock is released.
#[derive(Default)]
pub struct Registry {
    users: Mutex<HashMap<String, ConnectionHandle>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces the entry for `name`.
    ///
    /// Returns the handle that was displaced when it belongs to a different
    /// connection. The displaced connection is not closed.
    pub fn register(&self, name: &str, handle: ConnectionHandle) -> Option<ConnectionHandle> {
        let mut users = self.users.lock();
        users
            .insert(name.to_string(), handle.clone())
            .filter(|previous| !previous.same_connection(&handle))
    }

    /// Removes `name` only if it still points at `handle`'s connection.
    ///
    /// A newer registration made by another connection is left untouched.
    pub fn unregister(&self, name: &str, handle: &ConnectionHandle) -> bool {
        let mut users = self.users.lock();
        match users.get(name) {
            Some(current) if current.same_connection(handle) => {
                users.remove(name);
                true
            }
            _ => false,
        }
    }

    /// Point-in-time copy of the registered names, sorted.
    pub fn snapshot(&self) -> Vec<String> {
        let mut names: Vec<String> = self.users.lock().keys().cloned().collect();
        names.sort_unstable();
        names
    }

    pub fn lookup(&self, name: &str) -> Option<ConnectionHandle> {
        self.users.lock().get(name).cloned()
    }

    pub fn len(&self) -> usize {
        self.users.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.lock().is_empty()
    }
}
