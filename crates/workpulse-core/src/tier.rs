// Tenant tiers and the worker-pool sizing they select.
// Pools are shared per tier, never per tenant.

use serde::{Deserialize, Serialize};

/// Tenant tier. Selects queue binding and worker-pool size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Free,
    Basic,
    Premium,
    Enterprise,
}

impl Tier {
    /// All tiers, in queue-setup order
    pub const ALL: [Tier; 4] = [Tier::Free, Tier::Basic, Tier::Premium, Tier::Enterprise];

    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Free => "free",
            Tier::Basic => "basic",
            Tier::Premium => "premium",
            Tier::Enterprise => "enterprise",
        }
    }

    /// Parse from the value stored on the tenants table
    pub fn parse(s: &str) -> Option<Tier> {
        match s.to_ascii_lowercase().as_str() {
            "free" => Some(Tier::Free),
            "basic" => Some(Tier::Basic),
            "premium" => Some(Tier::Premium),
            "enterprise" => Some(Tier::Enterprise),
            _ => None,
        }
    }

    /// Number of extraction workers in this tier's shared pool
    pub fn extraction_workers(&self) -> usize {
        match self {
            Tier::Free => 1,
            Tier::Basic => 3,
            Tier::Premium => 5,
            Tier::Enterprise => 10,
        }
    }

    /// Number of transform workers in this tier's shared pool
    pub fn transform_workers(&self) -> usize {
        // Transform pools mirror extraction pools
        self.extraction_workers()
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_sizes() {
        assert_eq!(Tier::Free.extraction_workers(), 1);
        assert_eq!(Tier::Basic.extraction_workers(), 3);
        assert_eq!(Tier::Premium.extraction_workers(), 5);
        assert_eq!(Tier::Enterprise.extraction_workers(), 10);
        for tier in Tier::ALL {
            assert_eq!(tier.extraction_workers(), tier.transform_workers());
        }
    }

    #[test]
    fn test_parse_round_trip() {
        for tier in Tier::ALL {
            assert_eq!(Tier::parse(tier.as_str()), Some(tier));
        }
        assert_eq!(Tier::parse("PREMIUM"), Some(Tier::Premium));
        assert_eq!(Tier::parse("platinum"), None);
    }
}
