use std::fmt;

use serde::{Deserialize, Serialize};

/// Per-task rule governing what happens when live state diverges from
/// desired state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Lifecycle {
    /// Create or update freely to converge.
    #[default]
    Sync,
    /// Report divergence, never mutate.
    WarnOnly,
    /// Owned by another system. Discovered for its identifier, never
    /// validated, mutated or reported as divergent.
    ExternallyManaged,
}

impl Lifecycle {
    pub fn permits_mutation(self) -> bool {
        matches!(self, Self::Sync)
    }

    pub fn validates(self) -> bool {
        !matches!(self, Self::ExternallyManaged)
    }

    pub fn reports_divergence(self) -> bool {
        !matches!(self, Self::ExternallyManaged)
    }
}

impl fmt::Display for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Sync => "sync",
            Self::WarnOnly => "warn-only",
            Self::ExternallyManaged => "externally-managed",
        };
        f.write_str(s)
    }
}
