//! Shared process state
//!
//! One [`AppState`] per running fabric, cloned cheaply (every field is an
//! `Arc` or a plain value) into every axum handler and background task.

mod private
{
  use relay_catalog::Catalog;
  use relay_health::{ CooldownRegistry, HealthRegistry, HealthSupervisor, QuickTestCache };
  use relay_lifecycle::LifecycleManager;
  use relay_persistence::
  {
    ChannelStore, EndpointStore, ModelPricingStore, RequestLogStore, SettingStore, UsageSummaryStore,
  };
  use relay_pool::{ ArchiveQueue, HotPool };
  use relay_routing::{ BackoffConfig, RoutingConfig, SelectionStrategy };
  use relay_settings::SettingsService;
  use relay_types::{ RelayResult, RequestRecord };
  use crate::port_manager::PortInfo;
  use std::path::PathBuf;
  use std::sync::Arc;
  use tokio_util::sync::CancellationToken;

  /// Every long-lived handle one running `relay-http` process shares
  /// across its HTTP handlers and background tasks.
  #[ derive( Debug, Clone ) ]
  pub struct AppState
  {
    /// Runtime routing catalog.
    pub catalog : Arc< Catalog >,
    /// Channel table CRUD.
    pub channel_store : Arc< ChannelStore >,
    /// Endpoint table CRUD.
    pub endpoint_store : Arc< EndpointStore >,
    /// Model pricing table CRUD.
    pub pricing_store : Arc< ModelPricingStore >,
    /// Request-log table CRUD and paged queries.
    pub request_log_store : Arc< RequestLogStore >,
    /// Usage-summary rollup CRUD.
    pub usage_summary_store : Arc< UsageSummaryStore >,
    /// Raw settings-table CRUD, for the admin settings surface.
    pub setting_store : Arc< SettingStore >,
    /// Typed settings accessors and the hot-reload bus.
    pub settings : Arc< SettingsService >,
    /// Probe loop plus health/cooldown/quick-test registries.
    pub health_supervisor : Arc< HealthSupervisor >,
    /// Business-state machine and its event bus.
    pub lifecycle : Arc< LifecycleManager >,
    /// Bounded in-memory map of in-flight requests.
    pub hot_pool : Arc< HotPool >,
    /// Hand-off queue from the hot pool to the archive worker.
    pub archive_queue : Arc< ArchiveQueue >,
    /// Shared client used for every upstream forward and probe outside
    /// the health supervisor's own client.
    pub http_client : reqwest::Client,
    /// Directory per-request streaming debug files are written under.
    pub log_dir : PathBuf,
    /// When this process started, for `/api/status` uptime.
    pub started_at : chrono::DateTime< chrono::Utc >,
    /// Fires on graceful shutdown; every per-request routing call and
    /// background worker holds a child of this token.
    pub shutdown : CancellationToken,
    /// Result of resolving the listener port at startup, for `/api/port`.
    pub port_info : PortInfo,
  }

  impl AppState
  {
    /// Build a [`RoutingConfig`] from the current settings-table values,
    /// re-read on every call so a hot-reloaded value takes effect on the
    /// next request routed.
    ///
    /// # Errors
    ///
    /// Returns whatever [`SettingsService`] surfaces on a malformed row.
    pub async fn routing_config( &self ) -> RelayResult< RoutingConfig >
    {
      let retry_max_attempts = self.settings.get_int( "retry", "max_attempts", 3 ).await?;
      let failover_enabled = self.settings.get_bool( "failover", "enabled", true ).await?;
      let default_cooldown = self.settings.get_duration( "failover", "default_cooldown", std::time::Duration::from_secs( 600 ) ).await?;
      let suspension_enabled = self.settings.get_int( "failover", "max_suspended", 100 ).await? > 0;
      let max_suspended = self.settings.get_int( "failover", "max_suspended", 100 ).await?;
      let suspend_timeout = self.settings.get_duration( "failover", "suspend_timeout", std::time::Duration::from_secs( 300 ) ).await?;

      Ok( RoutingConfig::with_explicit_config(
        u32::try_from( retry_max_attempts ).unwrap_or( 3 ),
        failover_enabled,
        SelectionStrategy::Priority,
        default_cooldown,
        suspension_enabled,
        usize::try_from( max_suspended ).unwrap_or( 100 ),
        suspend_timeout,
      ) )
    }

    /// Build a [`BackoffConfig`] from the current settings-table values.
    ///
    /// # Errors
    ///
    /// Returns whatever [`SettingsService`] surfaces on a malformed row.
    pub async fn backoff_config( &self ) -> RelayResult< BackoffConfig >
    {
      let base = self.settings.get_duration( "retry", "backoff_base", std::time::Duration::from_secs( 1 ) ).await?;
      let max = self.settings.get_duration( "retry", "backoff_max", std::time::Duration::from_secs( 30 ) ).await?;
      let jitter_fraction = self.settings.get_float( "retry", "backoff_jitter_fraction", 0.15 ).await?;
      Ok( BackoffConfig::with_explicit_config( base, 2.0, max, jitter_fraction ) )
    }

    /// The health registry shared between the supervisor's probe loop and
    /// every per-request routing engine.
    #[ must_use ]
    pub fn health_registry( &self ) -> Arc< HealthRegistry >
    {
      self.health_supervisor.health_registry()
    }

    /// The quick-test cache shared the same way.
    #[ must_use ]
    pub fn quick_test( &self ) -> Arc< QuickTestCache >
    {
      self.health_supervisor.quick_test_cache()
    }

    /// The cooldown registry shared the same way.
    #[ must_use ]
    pub fn cooldowns( &self ) -> Arc< CooldownRegistry >
    {
      self.health_supervisor.cooldowns().clone()
    }

    /// Admit a freshly-accepted record into the hot pool, falling back to
    /// [`relay_types::RelayError::StorageBusy`]-flavored rejection when the
    /// pool is at capacity — the proxy handler maps this straight to a 503.
    ///
    /// # Errors
    ///
    /// Returns [`relay_types::RelayError::StorageBusy`] if the hot pool is
    /// at its configured capacity.
    pub fn admit( &self, record : RequestRecord ) -> RelayResult< () >
    {
      self.hot_pool.admit( record ).map_err( | _rejected |
        relay_types::RelayError::StorageBusy { detail : "hot pool at capacity".to_string() } )
    }
  }
}

crate::mod_interface!
{
  exposed use AppState;
}
