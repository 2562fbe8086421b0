use std::collections::HashMap;
use std::path::PathBuf;

use alloy::primitives::Address;
use alloy::signers::local::PrivateKeySigner;
use anyhow::{Context, Result, anyhow};

/// Everything the process reads from the environment. Missing venue keys
/// disable that venue; only a malformed value is an error.
pub struct RuntimeConfig {
    /// Main relayer key: owns the router contracts, pays gas for pulls,
    /// bridges, and smart-wallet executions.
    pub owner_key: Option<String>,
    /// chain id -> deployed router contract
    pub router_addresses: HashMap<u64, Address>,
    pub wc_project_id: String,
    pub events_path: PathBuf,
    pub orders_path: PathBuf,
    pub polymarket: Option<PolymarketConfig>,
    pub limitless: Option<LimitlessConfig>,
    pub opinion: Option<OpinionConfig>,
}

pub struct PolymarketConfig {
    pub private_key: String,
    pub api_key: Option<String>,
    pub api_secret: Option<String>,
    pub api_passphrase: Option<String>,
}

pub struct LimitlessConfig {
    pub private_key: String,
    pub api_key: Option<String>,
}

pub struct OpinionConfig {
    pub private_key: String,
    pub smart_wallet: Address,
    /// The main relayer EOA: approved to move funds off the smart wallet
    /// and pays gas for its executions.
    pub main_relayer_key: String,
    pub api_key: String,
}

impl RuntimeConfig {
    pub fn from_env(events_path: PathBuf, orders_path: PathBuf) -> Result<Self> {
        // Key from env var, or from a file so it never shows in `printenv`.
        let owner_key = match std::env::var("OWNER_PRIVATE_KEY") {
            Ok(pk) => Some(normalize_key(&pk)),
            Err(_) => match std::env::var("OWNER_PRIVATE_KEY_FILE") {
                Ok(path) => Some(normalize_key(
                    std::fs::read_to_string(&path)
                        .with_context(|| format!("reading owner key from {path}"))?
                        .trim(),
                )),
                Err(_) => None,
            },
        };

        let mut router_addresses = HashMap::new();
        for (var, chain_id) in [
            ("ROUTER_ADDRESS_BASE", 8453u64),
            ("ROUTER_ADDRESS_POLYGON", 137),
            ("ROUTER_ADDRESS_BSC", 56),
        ] {
            if let Ok(raw) = std::env::var(var) {
                let addr: Address = raw
                    .parse()
                    .with_context(|| format!("parsing {var}"))?;
                router_addresses.insert(chain_id, addr);
            }
        }

        let polymarket = env_opt("POLYMARKET_PRIVATE_KEY").map(|pk| PolymarketConfig {
            private_key: normalize_key(&pk),
            api_key: env_opt("POLYMARKET_API_KEY"),
            api_secret: env_opt("POLYMARKET_API_SECRET"),
            api_passphrase: env_opt("POLYMARKET_API_PASSPHRASE"),
        });

        let limitless = env_opt("LIMITLESS_PRIVATE_KEY").map(|pk| LimitlessConfig {
            private_key: normalize_key(&pk),
            api_key: env_opt("LIMITLESS_API_KEY"),
        });

        let opinion = match (
            env_opt("OPINION_PRIVATE_KEY"),
            env_opt("OPINION_SMART_WALLET"),
            env_opt("OPINION_API_KEY"),
            &owner_key,
        ) {
            (Some(pk), Some(wallet), Some(api_key), Some(main_key)) => Some(OpinionConfig {
                private_key: normalize_key(&pk),
                smart_wallet: wallet.parse().context("parsing OPINION_SMART_WALLET")?,
                main_relayer_key: main_key.clone(),
                api_key,
            }),
            _ => None,
        };

        Ok(RuntimeConfig {
            owner_key,
            router_addresses,
            wc_project_id: env_opt("WALLET_CONNECT_PROJECT_ID").unwrap_or_default(),
            events_path,
            orders_path,
            polymarket,
            limitless,
            opinion,
        })
    }

    pub fn owner_signer(&self) -> Result<PrivateKeySigner> {
        let key = self
            .owner_key
            .as_ref()
            .ok_or_else(|| anyhow!("OWNER_PRIVATE_KEY not configured"))?;
        key.parse()
            .map_err(|e| anyhow!("invalid owner private key: {e}"))
    }

    pub fn relayer_address(&self) -> Option<Address> {
        self.owner_signer().ok().map(|s| s.address())
    }

    pub fn router_for(&self, chain_id: u64) -> Option<Address> {
        self.router_addresses.get(&chain_id).copied()
    }
}

fn env_opt(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn normalize_key(key: &str) -> String {
    let key = key.trim();
    if key.starts_with("0x") {
        key.to_string()
    } else {
        format!("0x{key}")
    }
}
