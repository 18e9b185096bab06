//! Voice spec - the caller-supplied request for one logical voice.

use crate::core::identity::VoiceIdentity;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Requested configuration for one logical voice (Value Object)
///
/// Created by the caller and read-only to the core. The `fallbacks`
/// list is ordered: when the primary identity cannot be connected (or
/// is switched away by healing), fallbacks are the replacement
/// candidates for the same logical slot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoiceSpec {
    /// Primary identity for this slot
    pub identity: VoiceIdentity,
    /// Optional role/persona string, passed through to the adapter
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    /// Sampling temperature
    pub temperature: f64,
    /// Provider-specific overrides, opaque to the core
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub overrides: BTreeMap<String, serde_json::Value>,
    /// Ordered fallback identities for this slot
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fallbacks: Vec<VoiceIdentity>,
}

impl VoiceSpec {
    pub fn new(identity: VoiceIdentity) -> Self {
        Self {
            identity,
            role: None,
            temperature: 0.7,
            overrides: BTreeMap::new(),
            fallbacks: Vec::new(),
        }
    }

    /// Set the role/persona for this voice.
    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.role = Some(role.into());
        self
    }

    /// Set the sampling temperature.
    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature;
        self
    }

    /// Append a fallback identity (tried after the primary exhausts
    /// its retry budget, in declaration order).
    pub fn with_fallback(mut self, identity: VoiceIdentity) -> Self {
        self.fallbacks.push(identity);
        self
    }

    /// Set a provider-specific override value.
    pub fn with_override(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.overrides.insert(key.into(), value);
        self
    }

    /// All identities this spec may resolve to, primary first.
    pub fn candidates(&self) -> impl Iterator<Item = &VoiceIdentity> {
        std::iter::once(&self.identity).chain(self.fallbacks.iter())
    }

    /// Position of `identity` in the fallback chain, if it is part of
    /// this spec at all. The primary is position 0.
    pub fn candidate_position(&self, identity: &VoiceIdentity) -> Option<usize> {
        self.candidates().position(|c| c == identity)
    }

    /// Fallbacks that come strictly after `identity` in the chain.
    pub fn fallbacks_after(&self, identity: &VoiceIdentity) -> &[VoiceIdentity] {
        match self.candidate_position(identity) {
            // position 0 is the primary, so the fallback slice starts at `pos`
            Some(pos) => &self.fallbacks[pos..],
            None => &[],
        }
    }
}
