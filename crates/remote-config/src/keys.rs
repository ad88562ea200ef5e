//! Single source-of-truth table of every key this core recognizes, its
//! default value, and the environment variable that overrides it at
//! startup (spec.md §4.G / §6).

/// One recognized configuration key.
#[derive(Debug, Clone, Copy)]
pub struct ConfigKeyDef {
    pub key: &'static str,
    pub default: f64,
    pub env_var: &'static str,
}

pub const RECOGNIZED_KEYS: &[ConfigKeyDef] = &[
    ConfigKeyDef { key: "mem_lru_sampling_rate", default: 1.0, env_var: "MEM_LRU_SAMPLING_RATE" },
    ConfigKeyDef { key: "remote_cache_sampling_rate", default: 1.0, env_var: "REMOTE_CACHE_SAMPLING_RATE" },
    ConfigKeyDef { key: "fs_backup_sampling_rate", default: 1.0, env_var: "FS_BACKUP_SAMPLING_RATE" },
    ConfigKeyDef { key: "kv_doc_sampling_rate", default: 1.0, env_var: "KV_DOC_SAMPLING_RATE" },
    ConfigKeyDef { key: "blob_store_sampling_rate", default: 1.0, env_var: "BLOB_STORE_SAMPLING_RATE" },
    ConfigKeyDef { key: "small_item_bytes_threshold", default: 262_144.0, env_var: "SMALL_ITEM_BYTES_THRESHOLD" },
    ConfigKeyDef { key: "small_item_doc_bytes_threshold", default: 10_240.0, env_var: "SMALL_ITEM_DOC_BYTES_THRESHOLD" },
    ConfigKeyDef { key: "mem_lru_ttl_secs", default: 60.0, env_var: "MEM_LRU_TTL_SECS" },
    ConfigKeyDef { key: "remote_cache_ttl_secs", default: 3_600.0, env_var: "REMOTE_CACHE_TTL_SECS" },
    ConfigKeyDef { key: "quarantine_ttl_secs", default: 432_000.0, env_var: "QUARANTINE_TTL_SECS" },
    ConfigKeyDef { key: "remote_config_ttl_secs", default: 180.0, env_var: "REMOTE_CONFIG_TTL_SECS" },
    ConfigKeyDef { key: "breaker_error_threshold_pct", default: 50.0, env_var: "BREAKER_ERROR_THRESHOLD_PCT" },
    ConfigKeyDef { key: "breaker_reset_timeout_secs", default: 30.0, env_var: "BREAKER_RESET_TIMEOUT_SECS" },
    ConfigKeyDef { key: "breaker_call_timeout_secs", default: 5.0, env_var: "BREAKER_CALL_TIMEOUT_SECS" },
    ConfigKeyDef { key: "assembler_max_inflight_bytes", default: 104_857_600.0, env_var: "ASSEMBLER_MAX_INFLIGHT_BYTES" },
    ConfigKeyDef { key: "assembler_max_inflight_requests", default: 100.0, env_var: "ASSEMBLER_MAX_INFLIGHT_REQUESTS" },
    ConfigKeyDef { key: "assembler_attribute_guard_secs", default: 60.0, env_var: "ASSEMBLER_ATTRIBUTE_GUARD_SECS" },
    ConfigKeyDef { key: "retry_max_retries", default: 5.0, env_var: "RETRY_MAX_RETRIES" },
    ConfigKeyDef { key: "retry_initial_delay_ms", default: 500.0, env_var: "RETRY_INITIAL_DELAY_MS" },
    ConfigKeyDef { key: "retry_rate_limit_timeout_secs", default: 60.0, env_var: "RETRY_RATE_LIMIT_TIMEOUT_SECS" },
    ConfigKeyDef { key: "chunk_min_bytes", default: 262_144.0, env_var: "CHUNK_MIN_BYTES" },
    ConfigKeyDef { key: "chunk_max_bytes", default: 536_870_912.0, env_var: "CHUNK_MAX_BYTES" },
    ConfigKeyDef { key: "in_flight_ingest_ttl_secs", default: 60.0, env_var: "IN_FLIGHT_INGEST_TTL_SECS" },
];

pub fn lookup(key: &str) -> Option<&'static ConfigKeyDef> {
    RECOGNIZED_KEYS.iter().find(|def| def.key == key)
}
