//! Provider registry.
//!
//! Routes each [`VoiceIdentity`] to the factory registered for its
//! provider name. Routing priority:
//!  1. Factory registered under the identity's exact provider name
//!  2. The configured default provider, if any
//!  3. `UnknownProvider`
//!
//! The registry is built once at startup from configuration; there is
//! no global state and no lazy registration.

use chorus_application::{AdapterError, AdapterFactory, VoiceAdapter};
use chorus_domain::{VoiceIdentity, VoiceSpec};
use std::collections::HashMap;
use std::sync::Arc;

pub struct AdapterRegistry {
    factories: HashMap<String, Arc<dyn AdapterFactory>>,
    default_provider: Option<String>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
            default_provider: None,
        }
    }

    /// Register a factory for a provider name, replacing any existing
    /// registration for that name.
    pub fn register(mut self, provider: impl Into<String>, factory: Arc<dyn AdapterFactory>) -> Self {
        self.factories.insert(provider.into(), factory);
        self
    }

    /// Provider to fall back to when an identity names an unregistered
    /// provider.
    pub fn with_default(mut self, provider: impl Into<String>) -> Self {
        self.default_provider = Some(provider.into());
        self
    }

    pub fn providers(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }

    fn resolve(&self, identity: &VoiceIdentity) -> Result<&dyn AdapterFactory, AdapterError> {
        if let Some(factory) = self.factories.get(identity.provider()) {
            return Ok(factory.as_ref());
        }
        if let Some(default) = &self.default_provider
            && let Some(factory) = self.factories.get(default)
        {
            return Ok(factory.as_ref());
        }
        Err(AdapterError::UnknownProvider(identity.provider().to_string()))
    }
}

impl Default for AdapterRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl AdapterFactory for AdapterRegistry {
    fn create(
        &self,
        spec: &VoiceSpec,
        identity: &VoiceIdentity,
    ) -> Result<Arc<dyn VoiceAdapter>, AdapterError> {
        self.resolve(identity)?.create(spec, identity)
    }
}
