// Supabase MCP Gateway - Gateway (Primary Enforcement Point)
// Copyright 2026 Joseph Stone - All Rights Reserved
//
// Every tool call passes through here. Lookup -> Validate -> Dispatch -> Normalize.
// Unregistered names never reach the backend. Every call ends in exactly
// one envelope, including cancelled ones.

use crate::backend::{Arguments, Backend, BackendError};
use crate::envelope::ResponseEnvelope;
use crate::registry::{Capability, Registry};
use crate::validate;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// How often a cancellable dispatch checks its token
const CANCEL_POLL: Duration = Duration::from_millis(25);

/// Cooperative cancellation flag shared between the transport and one invocation
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Lifecycle of one invocation. `Completed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvocationState {
    Received,
    Validated,
    Dispatched,
    Completed,
}

/// Per-call bookkeeping. Owned by the call, never shared.
struct Invocation<'a> {
    id: u64,
    capability: &'a str,
    state: InvocationState,
    started: Instant,
}

impl<'a> Invocation<'a> {
    fn new(id: u64, capability: &'a str) -> Self {
        log::debug!("#{} {} Received", id, capability);
        Self { id, capability, state: InvocationState::Received, started: Instant::now() }
    }

    fn advance(&mut self, next: InvocationState) {
        debug_assert!(self.state != InvocationState::Completed, "invocation already completed");
        log::debug!("#{} {} {:?} -> {:?}", self.id, self.capability, self.state, next);
        self.state = next;
    }

    fn complete(mut self, envelope: ResponseEnvelope) -> ResponseEnvelope {
        self.advance(InvocationState::Completed);
        let elapsed = self.started.elapsed().as_millis();
        if envelope.is_success() {
            log::info!("#{} {} -> {} ({} ms)", self.id, self.capability, envelope.outcome(), elapsed);
        } else {
            log::warn!(
                "#{} {} -> {}: {} ({} ms)",
                self.id,
                self.capability,
                envelope.outcome(),
                envelope.message().unwrap_or_default(),
                elapsed
            );
        }
        envelope
    }
}

/// Bounded command gateway over a sealed registry
pub struct Gateway {
    registry: Arc<Registry>,
    backend: Arc<dyn Backend>,
    next_id: AtomicU64,
}

impl Gateway {
    /// The registry is sealed here if the caller has not already done so
    pub fn new(mut registry: Registry, backend: Arc<dyn Backend>) -> Self {
        registry.seal();
        Self {
            registry: Arc::new(registry),
            backend,
            next_id: AtomicU64::new(1),
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Process one invocation to completion
    pub fn handle(&self, name: &str, raw_args: &Value) -> ResponseEnvelope {
        let mut inv = Invocation::new(self.next_id.fetch_add(1, Ordering::Relaxed), name);

        let (capability, args) = match self.prepare(name, raw_args) {
            Ok(prepared) => prepared,
            Err(envelope) => return inv.complete(envelope),
        };
        inv.advance(InvocationState::Validated);

        inv.advance(InvocationState::Dispatched);
        let result = capability.handler().dispatch(self.backend.as_ref(), &args);
        inv.complete(normalize(capability, result))
    }

    /// Like `handle`, but stops waiting on the backend once `cancel` fires.
    /// The abandoned backend call runs on until its own timeout; its result
    /// is dropped.
    pub fn handle_cancellable(
        &self,
        name: &str,
        raw_args: &Value,
        cancel: &CancelToken,
    ) -> ResponseEnvelope {
        let mut inv = Invocation::new(self.next_id.fetch_add(1, Ordering::Relaxed), name);

        let (capability, args) = match self.prepare(name, raw_args) {
            Ok((capability, args)) => (capability.clone(), args),
            Err(envelope) => return inv.complete(envelope),
        };
        inv.advance(InvocationState::Validated);

        if cancel.is_cancelled() {
            return inv.complete(ResponseEnvelope::transport_error(format!(
                "invocation of '{}' cancelled before dispatch",
                name
            )));
        }

        inv.advance(InvocationState::Dispatched);
        let (tx, rx) = mpsc::channel();
        let backend = Arc::clone(&self.backend);
        let worker = capability.clone();
        let spawned = std::thread::Builder::new()
            .name(format!("dispatch-{}", inv.id))
            .spawn(move || {
                let result = worker.handler().dispatch(backend.as_ref(), &args);
                let _ = tx.send(result);
            });
        if let Err(e) = spawned {
            return inv.complete(ResponseEnvelope::transport_error(format!(
                "could not start backend call: {}",
                e
            )));
        }

        let result = loop {
            match rx.recv_timeout(CANCEL_POLL) {
                Ok(result) => break result,
                Err(RecvTimeoutError::Timeout) => {
                    if cancel.is_cancelled() {
                        return inv.complete(ResponseEnvelope::transport_error(format!(
                            "invocation of '{}' cancelled while waiting for the backend",
                            name
                        )));
                    }
                }
                Err(RecvTimeoutError::Disconnected) => {
                    break Err(BackendError::Transport("backend call aborted".to_string()));
                }
            }
        };
        inv.complete(normalize(&capability, result))
    }

    /// Name lookup and argument normalization. Never touches the backend.
    fn prepare(&self, name: &str, raw_args: &Value) -> Result<(&Capability, Arguments), ResponseEnvelope> {
        let capability = self.registry.lookup(name).ok_or_else(|| {
            ResponseEnvelope::validation_error(format!(
                "unknown capability '{}' — not in the registered tool surface",
                name
            ))
        })?;

        let validation = validate::validate_arguments(capability.input_shape(), raw_args);
        for warning in &validation.warnings {
            log::debug!("{}: {}", name, warning);
        }
        if !validation.valid {
            return Err(ResponseEnvelope::validation_error(format!(
                "{}: {}",
                name,
                validation.error_message()
            )));
        }
        Ok((capability, validation.arguments))
    }
}

/// Map a backend result onto the envelope
fn normalize(capability: &Capability, result: Result<Value, BackendError>) -> ResponseEnvelope {
    match result {
        Ok(value) => ResponseEnvelope::success(capability.handler().render(&value)),
        Err(BackendError::Rejected(msg)) => ResponseEnvelope::capability_error(msg),
        Err(BackendError::Transport(msg)) => ResponseEnvelope::transport_error(msg),
    }
}

// ============================================================================
// TESTS
// ============================================================================
