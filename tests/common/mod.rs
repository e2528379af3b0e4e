use myrvm::state::AppState;
use myrvm_cache::{AnyStore, MemoryStore};
use myrvm_config::{CacheConfig, CacheDriver, SessionConfig};

/// Application state over a fresh in-memory store.
#[allow(dead_code)]
pub fn test_state() -> AppState {
    test_state_with(SessionConfig::default())
}

#[allow(dead_code)]
pub fn test_state_with(session_config: SessionConfig) -> AppState {
    let cache_config = CacheConfig {
        driver: CacheDriver::Memory,
        ..CacheConfig::default()
    };
    AppState::from_store(
        AnyStore::Memory(MemoryStore::new()),
        cache_config,
        session_config,
    )
}

pub const KIOSK_IP: &str = "10.0.0.5";
pub const KIOSK_UA: &str = "myrvm-kiosk/1.0";
