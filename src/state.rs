use myrvm_cache::keys;
use myrvm_cache::{AnyStore, CacheService, Ttl, Warmer};
use myrvm_config::{CacheConfig, SessionConfig};
use myrvm_session::SessionService;
use serde_json::json;

#[derive(Clone, Debug)]
pub struct AppState {
    pub cache: CacheService<AnyStore>,
    pub sessions: SessionService<AnyStore>,
    pub cache_config: CacheConfig,
}

pub async fn init_app_state() -> anyhow::Result<AppState> {
    let cache_config = CacheConfig::from_env();
    let store = AnyStore::connect(&cache_config).await?;

    Ok(AppState::from_store(
        store,
        cache_config,
        SessionConfig::from_env(),
    ))
}

impl AppState {
    /// Wires the services over an already connected store and registers the
    /// well-known warm-up entries.
    pub fn from_store(
        store: AnyStore,
        cache_config: CacheConfig,
        session_config: SessionConfig,
    ) -> Self {
        let base = CacheService::new(store);
        let sessions = SessionService::new(base.clone(), session_config);

        let app_config = json!({
            "app_name": cache_config.app_name,
            "app_env": cache_config.app_env,
            "cache_driver": cache_config.driver.to_string(),
            "session_driver": cache_config.driver.to_string(),
        });

        let stats_source = sessions.clone();
        let cache = base
            .with_warmer(Warmer::new(
                "config",
                keys::config::PREFIX,
                keys::config::APP,
                Ttl::Extreme,
                move || {
                    let app_config = app_config.clone();
                    async move { Ok::<_, anyhow::Error>(app_config) }
                },
            ))
            .with_warmer(Warmer::new(
                "session_stats",
                keys::analytics::PREFIX,
                keys::analytics::SESSION_STATS,
                Ttl::Medium,
                move || {
                    let sessions = stats_source.clone();
                    async move {
                        let stats = sessions
                            .get_session_stats()
                            .await
                            .ok_or_else(|| anyhow::anyhow!("session statistics unavailable"))?;
                        Ok::<_, anyhow::Error>(serde_json::to_value(stats)?)
                    }
                },
            ));

        Self {
            cache,
            sessions,
            cache_config,
        }
    }
}
