//! Health supervisor configuration

mod private
{
  use core::time::Duration;

  /// Tunables for the probe loop, the quick-test cache, and cooldown
  /// duration defaults.
  #[ derive( Debug, Clone, PartialEq ) ]
  pub struct ProbeConfig
  {
    probe_interval : Duration,
    probe_timeout : Duration,
    health_path : String,
    quick_test_path : String,
    quick_test_timeout : Duration,
    quick_test_ttl : Duration,
    default_cooldown : Duration,
  }

  impl ProbeConfig
  {
    /// Build a configuration with every tunable given explicitly.
    #[ must_use ]
    pub fn with_explicit_config(
      probe_interval : Duration,
      probe_timeout : Duration,
      health_path : String,
      quick_test_path : String,
      quick_test_timeout : Duration,
      quick_test_ttl : Duration,
      default_cooldown : Duration,
    ) -> Self
    {
      Self
      {
        probe_interval,
        probe_timeout,
        health_path,
        quick_test_path,
        quick_test_timeout,
        quick_test_ttl,
        default_cooldown,
      }
    }

    /// Configuration carrying the documented defaults : 30s probe interval,
    /// 5s probe timeout, `/v1/models` for both probe paths, 1s quick-test
    /// timeout, 3s quick-test TTL, 600s default cooldown.
    #[ must_use ]
    pub fn new() -> Self
    {
      Self::with_explicit_config(
        Duration::from_secs( 30 ),
        Duration::from_secs( 5 ),
        "/v1/models".to_string(),
        "/v1/models".to_string(),
        Duration::from_secs( 1 ),
        Duration::from_secs( 3 ),
        Duration::from_secs( 600 ),
      )
    }

    /// Override the probe interval.
    #[ must_use ]
    pub fn with_probe_interval( mut self, interval : Duration ) -> Self
    {
      self.probe_interval = interval;
      self
    }

    /// Override the probe timeout.
    #[ must_use ]
    pub fn with_probe_timeout( mut self, timeout : Duration ) -> Self
    {
      self.probe_timeout = timeout;
      self
    }

    /// Override the health probe path.
    #[ must_use ]
    pub fn with_health_path( mut self, path : String ) -> Self
    {
      self.health_path = path;
      self
    }

    /// Override the quick-test probe path.
    #[ must_use ]
    pub fn with_quick_test_path( mut self, path : String ) -> Self
    {
      self.quick_test_path = path;
      self
    }

    /// Override the quick-test timeout.
    #[ must_use ]
    pub fn with_quick_test_timeout( mut self, timeout : Duration ) -> Self
    {
      self.quick_test_timeout = timeout;
      self
    }

    /// Override the quick-test cache TTL.
    #[ must_use ]
    pub fn with_quick_test_ttl( mut self, ttl : Duration ) -> Self
    {
      self.quick_test_ttl = ttl;
      self
    }

    /// Override the global default cooldown duration, used when an
    /// endpoint declares no override.
    #[ must_use ]
    pub fn with_default_cooldown( mut self, cooldown : Duration ) -> Self
    {
      self.default_cooldown = cooldown;
      self
    }

    /// Whether every tunable is within a sane range.
    #[ must_use ]
    pub fn is_valid( &self ) -> bool
    {
      !self.probe_interval.is_zero()
        && !self.probe_timeout.is_zero()
        && !self.quick_test_ttl.is_zero()
        && !self.health_path.is_empty()
        && !self.quick_test_path.is_empty()
    }

    /// Probe loop interval.
    #[ must_use ]
    pub fn probe_interval( &self ) -> Duration
    {
      self.probe_interval
    }

    /// Probe request timeout.
    #[ must_use ]
    pub fn probe_timeout( &self ) -> Duration
    {
      self.probe_timeout
    }

    /// Health probe path, appended to the endpoint's base URL.
    #[ must_use ]
    pub fn health_path( &self ) -> &str
    {
      &self.health_path
    }

    /// Quick-test probe path, appended to the endpoint's base URL.
    #[ must_use ]
    pub fn quick_test_path( &self ) -> &str
    {
      &self.quick_test_path
    }

    /// Quick-test request timeout.
    #[ must_use ]
    pub fn quick_test_timeout( &self ) -> Duration
    {
      self.quick_test_timeout
    }

    /// Quick-test cache entry TTL.
    #[ must_use ]
    pub fn quick_test_ttl( &self ) -> Duration
    {
      self.quick_test_ttl
    }

    /// Global default cooldown duration.
    #[ must_use ]
    pub fn default_cooldown( &self ) -> Duration
    {
      self.default_cooldown
    }
  }

  impl Default for ProbeConfig
  {
    fn default() -> Self
    {
      Self::new()
    }
  }

  #[ cfg( test ) ]
  mod tests
  {
    use super::*;

    #[ test ]
    fn defaults_match_documented_values()
    {
      let config = ProbeConfig::new();
      assert_eq!( config.probe_interval(), Duration::from_secs( 30 ) );
      assert_eq!( config.probe_timeout(), Duration::from_secs( 5 ) );
      assert_eq!( config.health_path(), "/v1/models" );
      assert_eq!( config.quick_test_ttl(), Duration::from_secs( 3 ) );
      assert_eq!( config.default_cooldown(), Duration::from_secs( 600 ) );
      assert!( config.is_valid() );
    }

    #[ test ]
    fn builder_overrides_apply()
    {
      let config = ProbeConfig::new().with_probe_interval( Duration::from_secs( 10 ) );
      assert_eq!( config.probe_interval(), Duration::from_secs( 10 ) );
    }

    #[ test ]
    fn zero_ttl_is_invalid()
    {
      let config = ProbeConfig::new().with_quick_test_ttl( Duration::ZERO );
      assert!( !config.is_valid() );
    }
  }
}

crate::mod_interface!
{
  exposed use ProbeConfig;
}
