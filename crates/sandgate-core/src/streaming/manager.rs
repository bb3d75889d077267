//! Authenticated duplex sessions relaying container and command output.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, Mutex};
use tokio::task::JoinHandle;

use futures::StreamExt;
use tracing::warn;
use uuid::Uuid;

use crate::auth::CredentialAuthority;
use crate::lifecycle::{EngineClient, ExecHandle, LifecycleManager, OutputStream};
use crate::metrics::METRICS;
use crate::obs;

use super::error::{StreamingError, StreamingResult};
use super::events::{ErrorScope, SessionEvent};

/// Chunks buffered per container feed before slow relays start lagging.
const FEED_BUFFER: usize = 256;

/// Client half of a session: the id to address it by, and the event feed
/// the transport drains.
pub struct SessionHandle {
    pub session_id: String,
    pub events: mpsc::UnboundedReceiver<SessionEvent>,
}

struct Relay {
    task: JoinHandle<()>,
}

struct Session {
    subject: Option<String>,
    tx: mpsc::UnboundedSender<SessionEvent>,
    relays: Vec<Relay>,
    subscribed: HashSet<String>,
}

impl Session {
    fn send(&self, event: SessionEvent) {
        let _ = self.tx.send(event);
    }

    /// Drop finished relay handles, then track a new one. Keeps the vector
    /// bounded by the number of live relays on long sessions.
    fn track_relay(&mut self, task: JoinHandle<()>) {
        self.relays.retain(|relay| !relay.task.is_finished());
        self.relays.push(Relay { task });
    }
}

/// One fan-out point per attached container: a pump task drains the engine
/// stream into a broadcast channel, and each subscribed session runs a
/// forwarder off its own receiver.
struct ContainerFeed {
    tx: broadcast::Sender<String>,
    pump: JoinHandle<()>,
    subscribers: usize,
}

#[derive(Default)]
struct Inner {
    sessions: HashMap<String, Session>,
    feeds: HashMap<String, ContainerFeed>,
}

/// Manages per-client streaming sessions over one sandbox.
///
/// Unauthenticated sessions are refused with rejection events rather than
/// errors, and engine failures surface as events scoped to the affected
/// subscription or command, so one bad stream never tears down a session.
pub struct SessionManager<E: EngineClient> {
    lifecycle: Arc<LifecycleManager<E>>,
    authority: Arc<dyn CredentialAuthority>,
    inner: Mutex<Inner>,
}

impl<E: EngineClient> SessionManager<E> {
    pub fn new(
        lifecycle: Arc<LifecycleManager<E>>,
        authority: Arc<dyn CredentialAuthority>,
    ) -> Self {
        Self {
            lifecycle,
            authority,
            inner: Mutex::new(Inner::default()),
        }
    }

    pub fn lifecycle(&self) -> &Arc<LifecycleManager<E>> {
        &self.lifecycle
    }

    /// Open a new session in the connected (not yet authenticated) state.
    pub async fn connect(&self) -> SessionHandle {
        let session_id = Uuid::new_v4().to_string();
        let (tx, events) = mpsc::unbounded_channel();
        let session = Session {
            subject: None,
            tx,
            relays: Vec::new(),
            subscribed: HashSet::new(),
        };
        self.inner
            .lock()
            .await
            .sessions
            .insert(session_id.clone(), session);

        METRICS.inc_sessions_opened();
        obs::emit_session_opened(&session_id);
        SessionHandle {
            session_id,
            events,
        }
    }

    /// Verify a bearer token for the session.
    ///
    /// Success and failure are both reported as events; a failed attempt
    /// leaves the transport open so the client may retry.
    pub async fn authenticate(&self, session_id: &str, token: &str) -> StreamingResult<()> {
        let mut inner = self.inner.lock().await;
        let session = inner
            .sessions
            .get_mut(session_id)
            .ok_or_else(|| StreamingError::SessionNotFound(session_id.to_string()))?;

        match self.authority.verify(token) {
            Ok(credential) => {
                obs::emit_session_authenticated(session_id, &credential.subject);
                session.subject = Some(credential.subject.clone());
                session.send(SessionEvent::Authenticated {
                    subject: credential.subject,
                });
            }
            Err(e) => {
                session.send(SessionEvent::AuthenticationFailed {
                    reason: e.to_string(),
                });
            }
        }
        Ok(())
    }

    /// Attach the session to a container's combined output.
    ///
    /// Multiple sessions may subscribe to the same container; each receives
    /// every chunk emitted after its subscription, in emission order.
    /// Subscribing twice to the same container is acknowledged but adds no
    /// second relay.
    pub async fn subscribe(&self, session_id: &str, container_id: &str) -> StreamingResult<()> {
        let mut inner = self.inner.lock().await;

        {
            let session = inner
                .sessions
                .get(session_id)
                .ok_or_else(|| StreamingError::SessionNotFound(session_id.to_string()))?;
            if session.subject.is_none() {
                session.send(SessionEvent::Rejected {
                    action: "subscribe_container".into(),
                    reason: "session is not authenticated".into(),
                });
                return Ok(());
            }
            if session.subscribed.contains(container_id) {
                session.send(SessionEvent::Subscribed {
                    container_id: container_id.to_string(),
                });
                return Ok(());
            }
        }

        let receiver = if let Some(feed) = inner.feeds.get_mut(container_id) {
            feed.subscribers += 1;
            feed.tx.subscribe()
        } else {
            let stream = match self.lifecycle.engine().attach(container_id).await {
                Ok(stream) => stream,
                Err(e) => {
                    if let Some(session) = inner.sessions.get(session_id) {
                        session.send(SessionEvent::Error {
                            scope: ErrorScope::Subscription {
                                container_id: container_id.to_string(),
                            },
                            message: e.to_string(),
                        });
                    }
                    return Ok(());
                }
            };
            let (tx, rx) = broadcast::channel(FEED_BUFFER);
            let pump = tokio::spawn(pump_feed(stream, tx.clone()));
            inner.feeds.insert(
                container_id.to_string(),
                ContainerFeed {
                    tx,
                    pump,
                    subscribers: 1,
                },
            );
            rx
        };

        let session = inner
            .sessions
            .get_mut(session_id)
            .ok_or_else(|| StreamingError::SessionNotFound(session_id.to_string()))?;
        session.send(SessionEvent::Subscribed {
            container_id: container_id.to_string(),
        });

        let events = session.tx.clone();
        let task = tokio::spawn(forward_chunks(receiver, events, container_id.to_string()));
        session.track_relay(task);
        session.subscribed.insert(container_id.to_string());

        obs::emit_subscription_started(session_id, container_id);
        Ok(())
    }

    /// Start a one-shot command in the container and relay its output.
    ///
    /// Returns the command id used to tag the relayed events, or `None`
    /// when the session was not authenticated (a rejection event is emitted
    /// instead). Exactly one terminal event follows the output: either
    /// `command_completed` with the exit code or a command-scoped error.
    pub async fn run_command(
        &self,
        session_id: &str,
        container_id: &str,
        command: &str,
    ) -> StreamingResult<Option<String>> {
        let mut inner = self.inner.lock().await;
        let session = inner
            .sessions
            .get_mut(session_id)
            .ok_or_else(|| StreamingError::SessionNotFound(session_id.to_string()))?;

        if session.subject.is_none() {
            session.send(SessionEvent::Rejected {
                action: "execute_command".into(),
                reason: "session is not authenticated".into(),
            });
            return Ok(None);
        }

        let command_id = Uuid::new_v4().to_string();
        let argv = vec!["sh".to_string(), "-c".to_string(), command.to_string()];
        let handle = match self.lifecycle.engine().exec(container_id, argv).await {
            Ok(handle) => handle,
            Err(e) => {
                session.send(SessionEvent::Error {
                    scope: ErrorScope::Command {
                        command_id: command_id.clone(),
                    },
                    message: e.to_string(),
                });
                return Ok(Some(command_id));
            }
        };

        METRICS.inc_commands_executed();
        obs::emit_command_started(session_id, container_id, command);

        let events = session.tx.clone();
        let task = tokio::spawn(relay_command(
            handle,
            events,
            session_id.to_string(),
            container_id.to_string(),
            command_id.clone(),
        ));
        session.track_relay(task);

        Ok(Some(command_id))
    }

    /// Tear the session down: abort its relays and close container feeds
    /// that no remaining session is watching.
    pub async fn disconnect(&self, session_id: &str) -> StreamingResult<()> {
        let mut inner = self.inner.lock().await;
        let session = inner
            .sessions
            .remove(session_id)
            .ok_or_else(|| StreamingError::SessionNotFound(session_id.to_string()))?;

        let released = session.relays.len();
        for relay in session.relays {
            relay.task.abort();
        }

        for container_id in session.subscribed {
            let drained = match inner.feeds.get_mut(&container_id) {
                Some(feed) => {
                    feed.subscribers = feed.subscribers.saturating_sub(1);
                    feed.subscribers == 0
                }
                None => false,
            };
            if drained {
                if let Some(feed) = inner.feeds.remove(&container_id) {
                    feed.pump.abort();
                }
            }
        }

        obs::emit_session_closed(session_id, released);
        Ok(())
    }

    pub async fn session_count(&self) -> usize {
        self.inner.lock().await.sessions.len()
    }

    pub async fn is_authenticated(&self, session_id: &str) -> StreamingResult<bool> {
        let inner = self.inner.lock().await;
        inner
            .sessions
            .get(session_id)
            .map(|s| s.subject.is_some())
            .ok_or_else(|| StreamingError::SessionNotFound(session_id.to_string()))
    }

    /// Containers with a live fan-out feed. Zero once every subscriber of
    /// every container has disconnected.
    pub async fn feed_count(&self) -> usize {
        self.inner.lock().await.feeds.len()
    }

    /// Relay handles the session still tracks. Finished relays are reaped
    /// whenever a new one starts, so this stays near the live relay count.
    pub async fn relay_count(&self, session_id: &str) -> StreamingResult<usize> {
        let inner = self.inner.lock().await;
        inner
            .sessions
            .get(session_id)
            .map(|s| s.relays.len())
            .ok_or_else(|| StreamingError::SessionNotFound(session_id.to_string()))
    }
}

async fn pump_feed(mut stream: OutputStream, feed: broadcast::Sender<String>) {
    while let Some(chunk) = stream.next().await {
        // No receivers yet is fine; chunks before a subscription are dropped.
        let _ = feed.send(chunk);
    }
}

async fn forward_chunks(
    mut receiver: broadcast::Receiver<String>,
    events: mpsc::UnboundedSender<SessionEvent>,
    container_id: String,
) {
    loop {
        match receiver.recv().await {
            Ok(chunk) => {
                let sent = events.send(SessionEvent::ContainerOutput {
                    container_id: container_id.clone(),
                    chunk,
                });
                if sent.is_err() {
                    break;
                }
                METRICS.add_chunks_relayed(1);
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(container_id = %container_id, skipped, "relay lagged, dropping chunks");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

async fn relay_command(
    handle: ExecHandle,
    events: mpsc::UnboundedSender<SessionEvent>,
    session_id: String,
    container_id: String,
    command_id: String,
) {
    let ExecHandle {
        mut output,
        exit_code,
    } = handle;

    while let Some(chunk) = output.next().await {
        let sent = events.send(SessionEvent::CommandOutput {
            command_id: command_id.clone(),
            container_id: container_id.clone(),
            chunk,
        });
        if sent.is_err() {
            return;
        }
        METRICS.add_chunks_relayed(1);
    }

    match exit_code.await {
        Ok(code) => {
            obs::emit_command_completed(&session_id, &container_id, code);
            let _ = events.send(SessionEvent::CommandCompleted {
                command_id,
                container_id,
                exit_code: code,
            });
        }
        Err(e) => {
            let _ = events.send(SessionEvent::Error {
                scope: ErrorScope::Command { command_id },
                message: e.to_string(),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use crate::fakes::{StaticAuthority, StubEngine};

    use super::*;

    fn manager() -> SessionManager<StubEngine> {
        let lifecycle = Arc::new(LifecycleManager::new(StubEngine::new(), "dev-sandbox"));
        let authority = Arc::new(StaticAuthority::new());
        authority.accept("good-token", "dev");
        SessionManager::new(lifecycle, authority)
    }

    async fn next_event(handle: &mut SessionHandle) -> SessionEvent {
        tokio::time::timeout(Duration::from_secs(1), handle.events.recv())
            .await
            .expect("timed out waiting for event")
            .expect("event channel closed")
    }

    #[tokio::test]
    async fn valid_credential_authenticates_the_session() {
        let manager = manager();
        let mut handle = manager.connect().await;

        manager
            .authenticate(&handle.session_id, "good-token")
            .await
            .unwrap();

        assert!(matches!(
            next_event(&mut handle).await,
            SessionEvent::Authenticated { .. }
        ));
        assert!(manager.is_authenticated(&handle.session_id).await.unwrap());
    }

    #[tokio::test]
    async fn failed_authentication_leaves_the_session_open_for_retry() {
        let manager = manager();
        let mut handle = manager.connect().await;

        manager
            .authenticate(&handle.session_id, "wrong-token")
            .await
            .unwrap();
        assert!(matches!(
            next_event(&mut handle).await,
            SessionEvent::AuthenticationFailed { .. }
        ));

        manager
            .authenticate(&handle.session_id, "good-token")
            .await
            .unwrap();
        assert!(matches!(
            next_event(&mut handle).await,
            SessionEvent::Authenticated { .. }
        ));
    }

    #[tokio::test]
    async fn unauthenticated_subscribe_yields_a_rejection_event() {
        let manager = manager();
        let mut handle = manager.connect().await;

        manager
            .subscribe(&handle.session_id, "container-0000")
            .await
            .unwrap();

        match next_event(&mut handle).await {
            SessionEvent::Rejected { action, .. } => assert_eq!(action, "subscribe_container"),
            other => panic!("expected rejection, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn unauthenticated_command_yields_a_rejection_event() {
        let manager = manager();
        let mut handle = manager.connect().await;

        let command_id = manager
            .run_command(&handle.session_id, "container-0000", "ls")
            .await
            .unwrap();

        assert!(command_id.is_none());
        match next_event(&mut handle).await {
            SessionEvent::Rejected { action, .. } => assert_eq!(action, "execute_command"),
            other => panic!("expected rejection, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn unknown_session_is_a_typed_error() {
        let manager = manager();
        let err = manager.authenticate("ghost", "token").await.unwrap_err();
        assert!(matches!(err, StreamingError::SessionNotFound(_)));
    }
}
