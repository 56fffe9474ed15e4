//! Cache settings with environment overrides.

use std::time::Duration;

/// Default TTL of both the scale set collection and the per scale set VM collections.
pub const DEFAULT_TTL: Duration = Duration::from_secs(600);

#[derive(Clone, Debug)]
pub struct CacheConfig {
    pub scale_set_ttl: Duration,
    pub vm_ttl: Duration,
    /// Turns every cached read into a pass-through remote call.
    pub disable_api_call_cache: bool,
    /// Resource groups scanned for flexible scale sets.
    pub resource_groups: Vec<String>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            scale_set_ttl: DEFAULT_TTL,
            vm_ttl: DEFAULT_TTL,
            disable_api_call_cache: false,
            resource_groups: Vec::new(),
        }
    }
}

impl CacheConfig {
    pub fn new(resource_groups: Vec<String>) -> Self {
        Self {
            resource_groups,
            ..Self::default()
        }
    }

    /// Reads `VMSSFLEX_SCALE_SET_TTL_SECS`, `VMSSFLEX_VM_TTL_SECS`,
    /// `VMSSFLEX_DISABLE_API_CALL_CACHE` and `VMSSFLEX_RESOURCE_GROUPS`
    /// (comma separated). A TTL of zero means the default.
    pub fn from_env() -> Self {
        Self {
            scale_set_ttl: Duration::from_secs(env_u64("VMSSFLEX_SCALE_SET_TTL_SECS", 0)),
            vm_ttl: Duration::from_secs(env_u64("VMSSFLEX_VM_TTL_SECS", 0)),
            disable_api_call_cache: env_bool("VMSSFLEX_DISABLE_API_CALL_CACHE", false),
            resource_groups: env_list("VMSSFLEX_RESOURCE_GROUPS"),
        }
        .normalized()
    }

    /// Replaces zero TTLs with [`DEFAULT_TTL`].
    pub fn normalized(mut self) -> Self {
        if self.scale_set_ttl.is_zero() {
            self.scale_set_ttl = DEFAULT_TTL;
        }
        if self.vm_ttl.is_zero() {
            self.vm_ttl = DEFAULT_TTL;
        }
        self
    }
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|val| val.parse::<u64>().ok())
        .unwrap_or(default)
}

fn env_bool(key: &str, default: bool) -> bool {
    std::env::var(key)
        .ok()
        .and_then(|val| match val.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" => Some(true),
            "0" | "false" | "no" => Some(false),
            _ => None,
        })
        .unwrap_or(default)
}

fn env_list(key: &str) -> Vec<String> {
    std::env::var(key)
        .map(|val| {
            val.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}
