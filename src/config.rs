//! Handler tunables
//!
//! Storage request sizes can be raised per installation through the
//! operator's environment without touching the CRDs.

use tracing::warn;

use crate::OPERATOR_SERVICE_ACCOUNT;

/// Env var overriding the grdata claim size (GiB)
pub const GRDATA_STORAGE_REQUEST_ENV: &str = "GRDATA_STORAGE_REQUEST";

/// Env var overriding the builder cache claim size (GiB)
pub const CACHE_STORAGE_REQUEST_ENV: &str = "CHAOS_CACHE_STORAGE_REQUEST";

/// Default grdata claim size (GiB)
pub const DEFAULT_GRDATA_STORAGE_REQUEST: i64 = 40;

/// Default builder cache claim size (GiB)
pub const DEFAULT_CACHE_STORAGE_REQUEST: i64 = 10;

/// Tunables for the builder (rbd-chaos) handler
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChaosConfig {
    /// Size of the shared grdata claim in GiB
    pub grdata_storage_request: i64,
    /// Size of the builder cache claim in GiB
    pub cache_storage_request: i64,
    /// Service account builder pods run as
    pub service_account: String,
}

impl Default for ChaosConfig {
    fn default() -> Self {
        Self {
            grdata_storage_request: DEFAULT_GRDATA_STORAGE_REQUEST,
            cache_storage_request: DEFAULT_CACHE_STORAGE_REQUEST,
            service_account: OPERATOR_SERVICE_ACCOUNT.to_string(),
        }
    }
}

impl ChaosConfig {
    /// Read tunables from the process environment
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read tunables through an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        Self {
            grdata_storage_request: storage_request(
                &lookup,
                GRDATA_STORAGE_REQUEST_ENV,
                DEFAULT_GRDATA_STORAGE_REQUEST,
            ),
            cache_storage_request: storage_request(
                &lookup,
                CACHE_STORAGE_REQUEST_ENV,
                DEFAULT_CACHE_STORAGE_REQUEST,
            ),
            ..Default::default()
        }
    }
}

fn storage_request<F>(lookup: &F, key: &str, default: i64) -> i64
where
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = lookup(key) else {
        return default;
    };

    match raw.trim().parse::<i64>() {
        Ok(size) if size > 0 => size,
        _ => {
            warn!(key, value = %raw, default, "ignoring invalid storage request");
            default
        }
    }
}
