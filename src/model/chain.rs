use alloy::primitives::{Address, address};
use serde::{Deserialize, Serialize};

/// A settlement chain the router operates on.
///
/// Each chain carries its canonical quote stablecoin: the token the on-chain
/// router pulls from users and the bridge moves between chains.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chain {
    pub name: String,
    pub id: u64,
    pub rpc_url: String,
    pub stablecoin: Address,
    pub stablecoin_decimals: u8,
    /// Chains without EIP-1559 get legacy gas with a 1.5x overpay.
    pub supports_eip1559: bool,
}

impl Chain {
    pub fn base() -> Self {
        Chain {
            name: "base".into(),
            id: 8453,
            rpc_url: rpc_override("BASE_RPC_URL", "https://mainnet.base.org"),
            stablecoin: address!("0x833589fCD6eDb6E08f4c7C32D4f71b54bdA02913"),
            stablecoin_decimals: 6,
            supports_eip1559: true,
        }
    }

    /// Polygon quotes in bridged USDC.e, not native USDC.
    pub fn polygon() -> Self {
        Chain {
            name: "polygon".into(),
            id: 137,
            rpc_url: rpc_override("POLYGON_RPC_URL", "https://polygon-bor-rpc.publicnode.com"),
            stablecoin: address!("0x2791Bca1f2de4661ED88A30C99A7a9449Aa84174"),
            stablecoin_decimals: 6,
            supports_eip1559: true,
        }
    }

    pub fn bsc() -> Self {
        Chain {
            name: "bsc".into(),
            id: 56,
            rpc_url: rpc_override("BSC_RPC_URL", "https://bsc-dataseed.binance.org"),
            stablecoin: address!("0x55d398326f99059fF775485246999027B3197955"),
            stablecoin_decimals: 18,
            supports_eip1559: false,
        }
    }

    pub fn from_id(id: u64) -> Option<Self> {
        match id {
            8453 => Some(Self::base()),
            137 => Some(Self::polygon()),
            56 => Some(Self::bsc()),
            _ => None,
        }
    }
}

fn rpc_override(var: &str, default: &str) -> String {
    std::env::var(var).unwrap_or_else(|_| default.to_string())
}

impl std::fmt::Display for Chain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.name, self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_chains_resolve_by_id() {
        assert_eq!(Chain::from_id(8453).unwrap().name, "base");
        assert_eq!(Chain::from_id(137).unwrap().stablecoin_decimals, 6);
        assert_eq!(Chain::from_id(56).unwrap().stablecoin_decimals, 18);
        assert!(Chain::from_id(1).is_none());
    }

    #[test]
    fn bsc_is_legacy_gas() {
        assert!(!Chain::bsc().supports_eip1559);
        assert!(Chain::base().supports_eip1559);
    }
}
