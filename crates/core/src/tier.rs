// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Provider tiers

use serde::{Deserialize, Serialize};

/// Named provider tier, ordered from cheapest to most capable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Fast,
    Balanced,
    Premium,
}

impl Tier {
    /// The next tier up. Premium stays premium.
    pub fn escalate(self) -> Tier {
        match self {
            Tier::Fast => Tier::Balanced,
            Tier::Balanced => Tier::Premium,
            Tier::Premium => Tier::Premium,
        }
    }

    /// The next tier down. Fast stays fast.
    pub fn downgrade(self) -> Tier {
        match self {
            Tier::Premium => Tier::Balanced,
            Tier::Balanced => Tier::Fast,
            Tier::Fast => Tier::Fast,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Fast => "fast",
            Tier::Balanced => "balanced",
            Tier::Premium => "premium",
        }
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Tier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fast" => Ok(Tier::Fast),
            "balanced" => Ok(Tier::Balanced),
            "premium" => Ok(Tier::Premium),
            other => Err(format!("unknown tier: {}", other)),
        }
    }
}

#[cfg(test)]
#[path = "tier_tests.rs"]
mod tests;
