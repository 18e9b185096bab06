//! Voice identity value object.

use crate::core::error::DomainError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Stable `(provider, model)` key for one logical voice (Value Object)
///
/// The identity survives reconnects and fallback switches of the
/// underlying worker and is the key used for health tracking across
/// sessions. Serialized as the string `provider/model`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VoiceIdentity {
    provider: String,
    model: String,
}

impl VoiceIdentity {
    pub fn new(provider: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            model: model.into(),
        }
    }

    pub fn provider(&self) -> &str {
        &self.provider
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Canonical string form, also used as serialization key
    pub fn as_key(&self) -> String {
        format!("{}/{}", self.provider, self.model)
    }
}

impl std::fmt::Display for VoiceIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.provider, self.model)
    }
}

impl std::str::FromStr for VoiceIdentity {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('/') {
            Some((provider, model)) if !provider.is_empty() && !model.is_empty() => {
                Ok(Self::new(provider, model))
            }
            _ => Err(DomainError::InvalidIdentity(s.to_string())),
        }
    }
}

impl Serialize for VoiceIdentity {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.as_key())
    }
}

impl<'de> Deserialize<'de> for VoiceIdentity {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_roundtrip() {
        let id = VoiceIdentity::new("anthropic", "claude-sonnet-4.5");
        let parsed: VoiceIdentity = id.as_key().parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn test_model_may_contain_slashes() {
        let id: VoiceIdentity = "openrouter/meta/llama-3".parse().unwrap();
        assert_eq!(id.provider(), "openrouter");
        assert_eq!(id.model(), "meta/llama-3");
    }

    #[test]
    fn test_invalid_identity_rejected() {
        assert!("no-slash".parse::<VoiceIdentity>().is_err());
        assert!("/model".parse::<VoiceIdentity>().is_err());
        assert!("provider/".parse::<VoiceIdentity>().is_err());
    }

    #[test]
    fn test_serde_as_string() {
        let id = VoiceIdentity::new("openai", "gpt-5");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"openai/gpt-5\"");
        let back: VoiceIdentity = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn test_usable_as_map_key() {
        use std::collections::BTreeMap;
        let mut map = BTreeMap::new();
        map.insert(VoiceIdentity::new("a", "m"), 1_u32);
        let json = serde_json::to_string(&map).unwrap();
        assert_eq!(json, "{\"a/m\":1}");
        let back: BTreeMap<VoiceIdentity, u32> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, map);
    }
}
