//! Leased connections.

use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use tokio::sync::OwnedSemaphorePermit;
use tracing::warn;

use crate::connector::Connector;
use crate::generation::Generation;

/// A validated physical connection leased from a [`CredentialPool`](crate::CredentialPool).
///
/// Hand it back with [`CredentialPool::release`](crate::CredentialPool::release).
/// Dropping it has the same effect, performed on a background task: the
/// connection returns to its generation if that generation is still
/// current, and is closed otherwise.
pub struct ConnectionHandle<C: Connector> {
    conn: Option<C::Connection>,
    generation: Arc<Generation<C>>,
    permit: Option<OwnedSemaphorePermit>,
}

impl<C: Connector> ConnectionHandle<C> {
    pub(crate) fn new(
        conn: C::Connection,
        generation: Arc<Generation<C>>,
        permit: OwnedSemaphorePermit,
    ) -> Self {
        Self {
            conn: Some(conn),
            generation,
            permit: Some(permit),
        }
    }

    /// Number of the generation this connection belongs to.
    pub fn generation_id(&self) -> u64 {
        self.generation.id()
    }

    /// `true` if the pool has rotated credentials since this lease began.
    pub fn is_stale(&self) -> bool {
        self.generation.is_retired()
    }

    /// Give the connection back to its generation.
    pub(crate) async fn release(mut self) {
        if let Some(conn) = self.conn.take() {
            self.generation.reclaim(conn).await;
        }
        // The slot frees only once the connection is pooled or closed.
        self.permit.take();
    }
}

impl<C: Connector> Deref for ConnectionHandle<C> {
    type Target = C::Connection;

    fn deref(&self) -> &Self::Target {
        self.conn
            .as_ref()
            .expect("BUG: ConnectionHandle used after release")
    }
}

impl<C: Connector> DerefMut for ConnectionHandle<C> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.conn
            .as_mut()
            .expect("BUG: ConnectionHandle used after release")
    }
}

impl<C: Connector> fmt::Debug for ConnectionHandle<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("generation", &self.generation.id())
            .field("stale", &self.is_stale())
            .finish_non_exhaustive()
    }
}

impl<C: Connector> Drop for ConnectionHandle<C> {
    fn drop(&mut self) {
        let Some(conn) = self.conn.take() else {
            return;
        };
        let generation = Arc::clone(&self.generation);
        let permit = self.permit.take();

        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move {
                generation.reclaim(conn).await;
                drop(permit);
            });
        } else {
            warn!(
                generation = generation.id(),
                "no runtime available; connection dropped without release"
            );
        }
    }
}
