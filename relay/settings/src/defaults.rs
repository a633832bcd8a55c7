//! Built-in settings defaults, re-seeded by `reset_category`
//!
//! Values mirror the defaults each consuming crate already falls back to
//! when constructed with its own `new()` (`relay_routing::BackoffConfig`/
//! `RoutingConfig`, `relay_health::ProbeConfig`, `relay_pool::HotPoolConfig`/
//! `ArchiveConfig`) so the settings table and a freshly-constructed
//! in-process default never disagree on day one.

mod private
{
  use relay_types::SettingValueType;

  /// One row of the built-in defaults table.
  #[ derive( Debug, Clone, Copy ) ]
  pub struct DefaultSetting
  {
    /// Grouping category.
    pub category : &'static str,
    /// Key within the category.
    pub key : &'static str,
    /// Default raw value.
    pub value : &'static str,
    /// Declared type.
    pub value_type : SettingValueType,
    /// Admin-UI label.
    pub label : &'static str,
    /// Admin-UI description.
    pub description : &'static str,
    /// Display order within the category.
    pub display_order : i32,
    /// Whether changing this setting requires a process restart.
    pub requires_restart : bool,
  }

  /// The full built-in defaults table, covering every settings category
  /// the admin surface exposes : retry, failover, health, pool, archive,
  /// cleanup, and server tuning.
  pub const DEFAULTS : &[ DefaultSetting ] =
  &[
    DefaultSetting { category : "retry", key : "max_attempts", value : "3", value_type : SettingValueType::Int, label : "Max retry attempts", description : "Retries against the same candidate before cooldown.", display_order : 0, requires_restart : false },
    DefaultSetting { category : "retry", key : "backoff_base", value : "1s", value_type : SettingValueType::Duration, label : "Backoff base delay", description : "First retry delay before exponential growth.", display_order : 1, requires_restart : false },
    DefaultSetting { category : "retry", key : "backoff_max", value : "30s", value_type : SettingValueType::Duration, label : "Backoff max delay", description : "Cap on the exponential backoff delay.", display_order : 2, requires_restart : false },
    DefaultSetting { category : "retry", key : "backoff_jitter_fraction", value : "0.15", value_type : SettingValueType::Float, label : "Backoff jitter fraction", description : "Multiplicative jitter applied to each backoff delay.", display_order : 3, requires_restart : false },

    DefaultSetting { category : "failover", key : "enabled", value : "true", value_type : SettingValueType::Bool, label : "Failover enabled", description : "Whether to fail over across channels on exhaustion.", display_order : 0, requires_restart : false },
    DefaultSetting { category : "failover", key : "default_cooldown", value : "600s", value_type : SettingValueType::Duration, label : "Default cooldown", description : "Cooldown applied when an endpoint carries none of its own.", display_order : 1, requires_restart : false },
    DefaultSetting { category : "failover", key : "max_suspended", value : "100", value_type : SettingValueType::Int, label : "Max suspended requests", description : "Capacity of the recovery queue.", display_order : 2, requires_restart : false },
    DefaultSetting { category : "failover", key : "suspend_timeout", value : "300s", value_type : SettingValueType::Duration, label : "Suspend timeout", description : "How long a parked request waits before giving up.", display_order : 3, requires_restart : false },

    DefaultSetting { category : "health", key : "probe_interval", value : "30s", value_type : SettingValueType::Duration, label : "Probe interval", description : "Interval between health-check probes.", display_order : 0, requires_restart : false },
    DefaultSetting { category : "health", key : "probe_timeout", value : "5s", value_type : SettingValueType::Duration, label : "Probe timeout", description : "Per-probe timeout.", display_order : 1, requires_restart : false },

    DefaultSetting { category : "pool", key : "max_active_requests", value : "1000", value_type : SettingValueType::Int, label : "Max active requests", description : "Hot-pool capacity.", display_order : 0, requires_restart : false },
    DefaultSetting { category : "pool", key : "max_age", value : "30m", value_type : SettingValueType::Duration, label : "Max request age", description : "How long a request may stay non-terminal before it is failed as stale.", display_order : 1, requires_restart : false },

    DefaultSetting { category : "cleanup", key : "cleanup_interval", value : "1m", value_type : SettingValueType::Duration, label : "Cleanup interval", description : "How often the stale-request sweep runs.", display_order : 0, requires_restart : false },
    DefaultSetting { category : "cleanup", key : "max_files", value : "10000", value_type : SettingValueType::Int, label : "Max debug files", description : "Debug-file directory cap by count.", display_order : 1, requires_restart : false },
    DefaultSetting { category : "cleanup", key : "auto_cleanup_days", value : "7", value_type : SettingValueType::Int, label : "Debug file max age (days)", description : "Debug-file directory cap by age.", display_order : 2, requires_restart : false },

    DefaultSetting { category : "archive", key : "batch_size", value : "64", value_type : SettingValueType::Int, label : "Archive batch size", description : "Terminal records written per archive pass.", display_order : 0, requires_restart : false },
    DefaultSetting { category : "archive", key : "max_attempts", value : "5", value_type : SettingValueType::Int, label : "Archive max attempts", description : "Write attempts before a record is quarantined to disk.", display_order : 1, requires_restart : false },

    DefaultSetting { category : "server", key : "host", value : "127.0.0.1", value_type : SettingValueType::String, label : "Listen host", description : "Interface the HTTP listener binds.", display_order : 0, requires_restart : true },
    DefaultSetting { category : "server", key : "port", value : "8080", value_type : SettingValueType::Int, label : "Listen port", description : "Preferred port; the launcher increments on conflict.", display_order : 1, requires_restart : true },
  ];

  #[ cfg( test ) ]
  mod tests
  {
    use super::*;

    #[ test ]
    fn every_default_key_is_unique_within_its_category()
    {
      let mut seen = std::collections::HashSet::new();
      for default in DEFAULTS
      {
        assert!( seen.insert( ( default.category, default.key ) ), "duplicate default for {}/{}", default.category, default.key );
      }
    }
  }
}

crate::mod_interface!
{
  exposed use
  {
    DefaultSetting,
    DEFAULTS,
  };
}
