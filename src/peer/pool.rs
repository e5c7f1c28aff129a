use std::collections::HashMap;
use std::sync::Mutex;

use tracing::debug;

use super::connection::{PeerConnection, PeerError};
use super::endpoint::{Endpoint, PeerRole};

/// Idle backend connections keyed by endpoint and role
///
/// A checked-out connection is owned by exactly one session until it is
/// checked back in, so no two sessions ever interleave frames on it. With
/// `max_idle_per_endpoint == 0` every checkout opens a fresh connection.
#[derive(Debug)]
pub struct BackendPool {
    idle: Mutex<HashMap<(Endpoint, PeerRole), Vec<PeerConnection>>>,
    max_idle_per_endpoint: usize,
}

impl BackendPool {
    pub fn new(max_idle_per_endpoint: usize) -> Self {
        Self {
            idle: Mutex::new(HashMap::new()),
            max_idle_per_endpoint,
        }
    }

    /// A pool that never keeps connections
    pub fn disabled() -> Self {
        Self::new(0)
    }

    pub fn is_enabled(&self) -> bool {
        self.max_idle_per_endpoint > 0
    }

    /// Take an idle live connection for `endpoint`, or open a new one
    pub async fn checkout(&self, endpoint: &Endpoint, role: PeerRole) -> Result<PeerConnection, PeerError> {
        while let Some(mut conn) = self.pop_idle(endpoint, role) {
            if conn.drain_stale() {
                debug!("Reusing pooled {} connection {} to {}", role, conn.id(), endpoint);
                return Ok(conn);
            }
            debug!("Discarding dead pooled {} connection {} to {}", role, conn.id(), endpoint);
        }

        PeerConnection::connect(endpoint, role).await
    }

    /// Return a connection after a completed exchange
    pub fn checkin(&self, endpoint: &Endpoint, conn: PeerConnection) {
        if !self.is_enabled() || !conn.is_alive() {
            return;
        }

        let Ok(mut idle) = self.idle.lock() else {
            return;
        };
        let slot = idle.entry((endpoint.clone(), conn.role())).or_default();
        if slot.len() < self.max_idle_per_endpoint {
            debug!("Pooling {} connection {} to {}", conn.role(), conn.id(), endpoint);
            slot.push(conn);
        }
    }

    /// Number of idle connections currently held for `endpoint`
    pub fn idle_count(&self, endpoint: &Endpoint, role: PeerRole) -> usize {
        self.idle
            .lock()
            .map(|idle| idle.get(&(endpoint.clone(), role)).map_or(0, Vec::len))
            .unwrap_or(0)
    }

    fn pop_idle(&self, endpoint: &Endpoint, role: PeerRole) -> Option<PeerConnection> {
        let mut idle = self.idle.lock().ok()?;
        idle.get_mut(&(endpoint.clone(), role))?.pop()
    }
}
