use serde::{Deserialize, Serialize};

/// Brokerage brand that issued a lease
///
/// The brand namespaces cache keys so records from different brokerages
/// never collide in a shared cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProviderBrand {
    #[default]
    Kuaidaili,
}

impl ProviderBrand {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderBrand::Kuaidaili => "kuaidaili",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "kuaidaili" | "kdl" => Some(ProviderBrand::Kuaidaili),
            _ => None,
        }
    }

    /// Cache key for one lease of this brand
    pub fn cache_key(&self, ip: impl std::fmt::Display, port: u16) -> String {
        format!("{}_{}_{}", self.as_str(), ip, port)
    }

    /// Key pattern enumerating every lease of this brand
    pub fn key_pattern(&self) -> String {
        format!("{}_*", self.as_str())
    }
}

impl std::fmt::Display for ProviderBrand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
