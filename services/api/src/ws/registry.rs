//! Table of live sessions, used for counting and broadcast.

use super::{conversation::Session, protocol::ServerMessage};
use futures_util::future::join_all;
use std::{collections::HashMap, sync::Arc, time::Duration};
use tokio::{sync::Mutex, time::timeout};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Upper bound on one session's share of a broadcast.
pub const BROADCAST_SEND_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Default)]
pub struct ConnectionRegistry {
    sessions: Mutex<HashMap<Uuid, Arc<Session>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, session: Arc<Session>) {
        let mut sessions = self.sessions.lock().await;
        sessions.insert(session.id, session);
        debug!(active = sessions.len(), "Session registered");
    }

    /// Stops the session and drops it from the table.
    pub async fn unregister(&self, id: Uuid) -> Option<Arc<Session>> {
        let mut sessions = self.sessions.lock().await;
        let session = sessions.remove(&id)?;
        session.stop();
        debug!(active = sessions.len(), "Session unregistered");
        Some(session)
    }

    pub async fn count(&self) -> usize {
        self.sessions.lock().await.len()
    }

    /// Sends a `text` frame to every live session and returns how many
    /// accepted it.
    ///
    /// Sends run concurrently outside the table lock, each bounded by
    /// [`BROADCAST_SEND_TIMEOUT`], so a stalled socket only loses its own copy.
    pub async fn broadcast_text(&self, text: &str) -> usize {
        let targets: Vec<Arc<Session>> = self
            .sessions
            .lock()
            .await
            .values()
            .filter(|session| !session.is_stopped())
            .cloned()
            .collect();
        let msg = ServerMessage::Text {
            text: text.to_string(),
        };

        let outcomes = join_all(targets.iter().map(|session| {
            let msg = &msg;
            async move {
                match timeout(BROADCAST_SEND_TIMEOUT, session.send(msg)).await {
                    Ok(sent) => sent,
                    Err(_) => {
                        warn!(session_id = %session.id, "Broadcast send timed out");
                        false
                    }
                }
            }
        }))
        .await;

        let delivered = outcomes.into_iter().filter(|sent| *sent).count();
        info!(delivered, total = targets.len(), "Broadcast sent");
        delivered
    }
}
