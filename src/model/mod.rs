pub mod book;
pub mod chain;
pub mod event;
pub mod order;
pub mod route;

use serde::{Deserialize, Serialize};

/// A trading venue. The set is closed: every platform this router can split
/// an order across has a variant here and an adapter in `crate::venues`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Polymarket,
    Limitless,
    Opinion,
}

impl Platform {
    pub const ALL: [Platform; 3] = [Platform::Polymarket, Platform::Limitless, Platform::Opinion];

    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Polymarket => "polymarket",
            Platform::Limitless => "limitless",
            Platform::Opinion => "opinion",
        }
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "polymarket" => Ok(Platform::Polymarket),
            "limitless" => Ok(Platform::Limitless),
            "opinion" => Ok(Platform::Opinion),
            other => Err(format!("unknown platform '{other}'")),
        }
    }
}

/// Round to `dp` decimal places. Display values only; on-chain amounts are
/// floored, never rounded (see `floor_dp`).
pub fn round_dp(value: f64, dp: i32) -> f64 {
    let m = 10f64.powi(dp);
    (value * m).round() / m
}

/// Floor to `dp` decimal places. Used for every amount submitted to a venue
/// so bridge fees can never push an order past the settled balance.
pub fn floor_dp(value: f64, dp: i32) -> f64 {
    let m = 10f64.powi(dp);
    (value * m).floor() / m
}
