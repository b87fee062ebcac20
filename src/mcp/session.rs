//! Per-client session state and the initialize handshake
//!
//! A session moves `Uninitialized -> Initializing -> Ready` and never back.
//! Every check-and-transition happens under a single lock acquisition, so
//! concurrent requests on one session cannot race the handshake. Locks are
//! never held while a handler runs.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::errors::McpError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Uninitialized,
    Initializing,
    Ready,
}

/// Outcome of an accepted `initialize`.
#[derive(Debug, Clone, PartialEq)]
pub struct Handshake {
    pub protocol_version: String,
    /// `false` when the session had already been initialized and the original
    /// agreement was returned unchanged.
    pub fresh: bool,
}

#[derive(Debug)]
struct SessionState {
    phase: SessionPhase,
    protocol_version: Option<String>,
    client_capabilities: Value,
    client_info: Value,
}

#[derive(Debug)]
pub struct Session {
    id: Arc<str>,
    created_at: DateTime<Utc>,
    state: Mutex<SessionState>,
    in_flight: Mutex<InFlight>,
    last_seen: Mutex<Instant>,
    terminated: CancellationToken,
}

#[derive(Debug, Default)]
struct InFlight {
    next_ticket: u64,
    requests: HashMap<String, (u64, CancellationToken)>,
}

impl Session {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            id: Arc::from(Uuid::new_v4().to_string()),
            created_at: Utc::now(),
            state: Mutex::new(SessionState {
                phase: SessionPhase::Uninitialized,
                protocol_version: None,
                client_capabilities: Value::Null,
                client_info: Value::Null,
            }),
            in_flight: Mutex::new(InFlight::default()),
            last_seen: Mutex::new(Instant::now()),
            terminated: CancellationToken::new(),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn shared_id(&self) -> Arc<str> {
        Arc::clone(&self.id)
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn phase(&self) -> SessionPhase {
        self.state.lock().phase
    }

    pub fn protocol_version(&self) -> Option<String> {
        self.state.lock().protocol_version.clone()
    }

    pub fn client_capabilities(&self) -> Value {
        self.state.lock().client_capabilities.clone()
    }

    pub fn client_info(&self) -> Value {
        self.state.lock().client_info.clone()
    }

    /// Runs version negotiation for an `initialize` request.
    ///
    /// On an `Uninitialized` session a supported version moves the session to
    /// `Initializing`; an unsupported one leaves it untouched. On an already
    /// initialized session the call is accepted idempotently and returns the
    /// version agreed the first time.
    pub fn begin_initialize(
        &self,
        offered_version: &str,
        supported_versions: &[&str],
        client_capabilities: Value,
        client_info: Value,
    ) -> Result<Handshake, McpError> {
        let mut state = self.state.lock();

        if state.phase != SessionPhase::Uninitialized {
            if let Some(version) = state.protocol_version.clone() {
                return Ok(Handshake {
                    protocol_version: version,
                    fresh: false,
                });
            }
        }

        let offered_version = offered_version.trim();
        if !supported_versions.contains(&offered_version) {
            return Err(McpError::InvalidParams {
                code: "unsupported_protocol_version",
                message: "unsupported initialize protocolVersion".to_string(),
                details: serde_json::json!({
                    "requested": offered_version,
                    "supported": supported_versions,
                }),
            });
        }

        state.phase = SessionPhase::Initializing;
        state.protocol_version = Some(offered_version.to_string());
        state.client_capabilities = client_capabilities;
        state.client_info = client_info;

        Ok(Handshake {
            protocol_version: offered_version.to_string(),
            fresh: true,
        })
    }

    /// Gate for every request other than `initialize` and `ping`.
    ///
    /// Fails with `NotInitialized` on an `Uninitialized` session without
    /// changing it; the first admitted request after the handshake completes
    /// the `Initializing -> Ready` transition.
    pub fn admit(&self) -> Result<(), McpError> {
        let mut state = self.state.lock();
        match state.phase {
            SessionPhase::Uninitialized => Err(McpError::NotInitialized),
            SessionPhase::Initializing => {
                state.phase = SessionPhase::Ready;
                Ok(())
            }
            SessionPhase::Ready => Ok(()),
        }
    }

    /// Handles `notifications/initialized`. Ignored unless the handshake is
    /// in progress.
    pub fn acknowledge_initialized(&self) {
        let mut state = self.state.lock();
        if state.phase == SessionPhase::Initializing {
            state.phase = SessionPhase::Ready;
        }
    }

    pub fn touch(&self) {
        *self.last_seen.lock() = Instant::now();
    }

    pub fn idle_for(&self) -> Duration {
        self.last_seen.lock().elapsed()
    }

    /// Registers an in-flight request. The returned guard owns a token that
    /// is cancelled by `cancel_request`, by session termination, or by the
    /// transport's `parent` token; dropping the guard forgets the request.
    pub fn track_request(
        self: &Arc<Self>,
        request_id: &Value,
        parent: &CancellationToken,
    ) -> InFlightGuard {
        let token = parent.child_token();
        let key = request_key(request_id);

        let ticket = {
            let mut in_flight = self.in_flight.lock();
            in_flight.next_ticket += 1;
            let ticket = in_flight.next_ticket;
            in_flight.requests.insert(key.clone(), (ticket, token.clone()));
            ticket
        };

        InFlightGuard {
            session: Arc::clone(self),
            key,
            ticket,
            token,
            terminated: self.terminated.clone(),
        }
    }

    /// Cancels the in-flight request with this id. Returns whether one was
    /// found.
    pub fn cancel_request(&self, request_id: &Value) -> bool {
        let in_flight = self.in_flight.lock();
        match in_flight.requests.get(&request_key(request_id)) {
            Some((_, token)) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight.lock().requests.len()
    }

    /// Cancels everything still running on this session.
    pub fn terminate(&self) {
        self.terminated.cancel();
        for (_, token) in self.in_flight.lock().requests.values() {
            token.cancel();
        }
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated.is_cancelled()
    }
}

/// Ids compare by their JSON text, so `1` and `"1"` are different requests.
fn request_key(request_id: &Value) -> String {
    request_id.to_string()
}

pub struct InFlightGuard {
    session: Arc<Session>,
    key: String,
    ticket: u64,
    token: CancellationToken,
    terminated: CancellationToken,
}

impl InFlightGuard {
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Resolves once the request is cancelled or its session terminated.
    pub async fn cancelled(&self) {
        tokio::select! {
            _ = self.token.cancelled() => {}
            _ = self.terminated.cancelled() => {}
        }
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        {
            let mut in_flight = self.session.in_flight.lock();
            if in_flight
                .requests
                .get(&self.key)
                .is_some_and(|(ticket, _)| *ticket == self.ticket)
            {
                in_flight.requests.remove(&self.key);
            }
        }
        self.session.touch();
    }
}

/// Sessions addressable by the `Mcp-Session-Id` header.
#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: RwLock<HashMap<String, Arc<Session>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &str) -> Option<Arc<Session>> {
        let session = self.sessions.read().get(id).cloned()?;
        session.touch();
        Some(session)
    }

    pub fn insert(&self, session: Arc<Session>) {
        session.touch();
        self.sessions
            .write()
            .insert(session.id().to_string(), session);
    }

    pub fn remove(&self, id: &str) -> Option<Arc<Session>> {
        let session = self.sessions.write().remove(id)?;
        session.terminate();
        Some(session)
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }

    /// Drops sessions idle for longer than `max_idle`. Sessions with requests
    /// still in flight are never idle. Returns how many were evicted.
    pub fn evict_idle(&self, max_idle: Duration) -> usize {
        let expired: Vec<Arc<Session>> = {
            let mut sessions = self.sessions.write();
            let ids: Vec<String> = sessions
                .iter()
                .filter(|(_, session)| {
                    session.in_flight_count() == 0 && session.idle_for() > max_idle
                })
                .map(|(id, _)| id.clone())
                .collect();
            ids.iter().filter_map(|id| sessions.remove(id)).collect()
        };

        for session in &expired {
            session.terminate();
        }
        expired.len()
    }
}
