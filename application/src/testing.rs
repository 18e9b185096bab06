//! Scriptable test doubles shared by the use-case tests.

use crate::ports::event_sink::{EventSink, MonitorEvent};
use crate::ports::voice_adapter::{AdapterError, AdapterFactory, HealthProbe, VoiceAdapter};
use async_trait::async_trait;
use chorus_domain::{ErrorKind, PriorMessage, VoiceIdentity, VoiceResponse, VoiceSpec};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// One scripted `send` behavior, consumed front-to-back.
#[derive(Debug, Clone)]
pub enum SendScript {
    Reply(String),
    Fail(ErrorKind),
    /// Never answer within any reasonable budget
    Hang,
}

fn error_for_kind(kind: ErrorKind) -> AdapterError {
    match kind {
        ErrorKind::Timeout => AdapterError::Timeout,
        ErrorKind::RateLimited => AdapterError::RateLimited("scripted".into()),
        ErrorKind::EmptyResponse => AdapterError::EmptyResponse,
        ErrorKind::Protocol => AdapterError::Protocol("scripted".into()),
        ErrorKind::CapabilityMissing => AdapterError::CapabilityMissing("scripted".into()),
        ErrorKind::Connection => AdapterError::Connection("scripted".into()),
        ErrorKind::Other => AdapterError::Other("scripted".into()),
    }
}

/// Deterministic in-memory voice adapter.
pub struct ScriptedAdapter {
    script: Mutex<VecDeque<SendScript>>,
    default_reply: String,
    latency: Duration,
    connect_failures_remaining: AtomicU32,
    connected: AtomicBool,
    probe_connected: AtomicBool,
    pub send_count: AtomicU32,
    pub connect_count: AtomicU32,
    pub disconnect_count: AtomicU32,
}

impl ScriptedAdapter {
    pub fn replying(text: impl Into<String>) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            default_reply: text.into(),
            latency: Duration::ZERO,
            connect_failures_remaining: AtomicU32::new(0),
            connected: AtomicBool::new(false),
            probe_connected: AtomicBool::new(true),
            send_count: AtomicU32::new(0),
            connect_count: AtomicU32::new(0),
            disconnect_count: AtomicU32::new(0),
        }
    }

    pub fn scripted(steps: Vec<SendScript>) -> Self {
        let adapter = Self::replying("fallthrough");
        *adapter.script.lock().unwrap() = steps.into();
        adapter
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn failing_connects(self, count: u32) -> Self {
        self.connect_failures_remaining.store(count, Ordering::SeqCst);
        self
    }

    pub fn set_probe_connected(&self, connected: bool) {
        self.probe_connected.store(connected, Ordering::SeqCst);
    }

    pub fn sends(&self) -> u32 {
        self.send_count.load(Ordering::SeqCst)
    }

    pub fn disconnects(&self) -> u32 {
        self.disconnect_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VoiceAdapter for ScriptedAdapter {
    async fn connect(&self) -> Result<bool, AdapterError> {
        self.connect_count.fetch_add(1, Ordering::SeqCst);
        let remaining = self.connect_failures_remaining.load(Ordering::SeqCst);
        if remaining > 0 {
            self.connect_failures_remaining
                .store(remaining - 1, Ordering::SeqCst);
            return Err(AdapterError::Connection("scripted connect failure".into()));
        }
        self.connected.store(true, Ordering::SeqCst);
        Ok(true)
    }

    async fn disconnect(&self) {
        self.disconnect_count.fetch_add(1, Ordering::SeqCst);
        self.connected.store(false, Ordering::SeqCst);
    }

    async fn send(
        &self,
        _prompt: &str,
        _history: &[PriorMessage],
    ) -> Result<VoiceResponse, AdapterError> {
        self.send_count.fetch_add(1, Ordering::SeqCst);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        let step = self.script.lock().unwrap().pop_front();
        match step {
            None => Ok(VoiceResponse::new(self.default_reply.clone())),
            Some(SendScript::Reply(text)) => Ok(VoiceResponse::new(text)),
            Some(SendScript::Fail(kind)) => Err(error_for_kind(kind)),
            Some(SendScript::Hang) => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Err(AdapterError::Timeout)
            }
        }
    }

    async fn check_health(&self) -> HealthProbe {
        if self.probe_connected.load(Ordering::SeqCst) {
            HealthProbe::healthy(Duration::from_millis(5))
        } else {
            HealthProbe::disconnected(ErrorKind::Connection)
        }
    }
}

/// Factory mapping identities to pre-registered scripted adapters.
///
/// Unknown identities fail with `UnknownProvider` unless a default
/// reply is configured.
pub struct ScriptedFactory {
    adapters: Mutex<HashMap<VoiceIdentity, Arc<ScriptedAdapter>>>,
    default_reply: Option<String>,
}

impl ScriptedFactory {
    pub fn new() -> Self {
        Self {
            adapters: Mutex::new(HashMap::new()),
            default_reply: None,
        }
    }

    pub fn with_default_reply(text: impl Into<String>) -> Self {
        Self {
            adapters: Mutex::new(HashMap::new()),
            default_reply: Some(text.into()),
        }
    }

    pub fn register(&self, identity: VoiceIdentity, adapter: Arc<ScriptedAdapter>) {
        self.adapters.lock().unwrap().insert(identity, adapter);
    }

    pub fn adapter(&self, identity: &VoiceIdentity) -> Option<Arc<ScriptedAdapter>> {
        self.adapters.lock().unwrap().get(identity).cloned()
    }
}

impl AdapterFactory for ScriptedFactory {
    fn create(
        &self,
        _spec: &VoiceSpec,
        identity: &VoiceIdentity,
    ) -> Result<Arc<dyn VoiceAdapter>, AdapterError> {
        let mut adapters = self.adapters.lock().unwrap();
        if let Some(adapter) = adapters.get(identity) {
            return Ok(adapter.clone());
        }
        match &self.default_reply {
            Some(text) => {
                let adapter = Arc::new(ScriptedAdapter::replying(text.clone()));
                adapters.insert(identity.clone(), adapter.clone());
                Ok(adapter)
            }
            None => Err(AdapterError::UnknownProvider(identity.to_string())),
        }
    }
}

/// Sink that records every event for assertions.
#[derive(Default)]
pub struct CollectingSink {
    events: Mutex<Vec<MonitorEvent>>,
}

impl CollectingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<MonitorEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn count_matching(&self, predicate: impl Fn(&MonitorEvent) -> bool) -> usize {
        self.events.lock().unwrap().iter().filter(|e| predicate(e)).count()
    }
}

impl EventSink for CollectingSink {
    fn emit(&self, event: MonitorEvent) {
        self.events.lock().unwrap().push(event);
    }
}
