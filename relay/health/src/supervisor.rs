//! Probe loop
//!
//! Drives [`crate::HealthRegistry`] and [`crate::QuickTestCache`] from a
//! caller-supplied probe scope. The supervisor holds no opinion on which
//! endpoints are in scope — that decision (inter-channel failover state,
//! active channel set) lives in the runtime catalog — it only executes
//! probes concurrently and records outcomes.

mod private
{
  use crate::config::ProbeConfig;
  use crate::cooldown::CooldownRegistry;
  use crate::prober::{ probe, ProbeTarget };
  use crate::quick_test::QuickTestCache;
  use crate::status::HealthRegistry;
  use chrono::Utc;
  use std::sync::Arc;
  use tokio_util::sync::CancellationToken;

  /// What the health supervisor should probe this tick : endpoints inside
  /// scope get a full probe; endpoints outside scope are reset to
  /// never-checked without being probed.
  #[ derive( Debug, Clone, Default ) ]
  pub struct ProbeScope
  {
    /// Endpoints to probe this tick.
    pub in_scope : Vec< ProbeTarget >,
    /// Endpoint ids to reset to never-checked this tick.
    pub out_of_scope : Vec< i64 >,
  }

  /// Owns the HTTP client, health registry, cooldown registry, and
  /// quick-test cache for one relay fabric instance.
  #[ derive( Debug ) ]
  pub struct HealthSupervisor
  {
    config : ProbeConfig,
    client : reqwest::Client,
    health : Arc< HealthRegistry >,
    cooldowns : Arc< CooldownRegistry >,
    quick_test : Arc< QuickTestCache >,
  }

  impl HealthSupervisor
  {
    /// Build a supervisor sharing `cooldowns` with the routing engine,
    /// owning a fresh health registry and quick-test cache.
    ///
    /// # Panics
    ///
    /// Panics if the underlying `reqwest::Client` cannot be constructed.
    #[ must_use ]
    pub fn new( config : ProbeConfig, cooldowns : Arc< CooldownRegistry > ) -> Self
    {
      Self::with_shared_state( config, Arc::new( HealthRegistry::new() ), cooldowns, Arc::new( QuickTestCache::new() ) )
    }

    /// Build a supervisor over registries already shared with a routing
    /// engine, so probe outcomes and live-traffic signals land in the same
    /// state the engine selects candidates from.
    ///
    /// # Panics
    ///
    /// Panics if the underlying `reqwest::Client` cannot be constructed.
    #[ must_use ]
    pub fn with_shared_state( config : ProbeConfig, health : Arc< HealthRegistry >, cooldowns : Arc< CooldownRegistry >, quick_test : Arc< QuickTestCache > ) -> Self
    {
      Self
      {
        config,
        client : reqwest::Client::builder().build().expect( "building reqwest client" ),
        health,
        cooldowns,
        quick_test,
      }
    }

    /// The health registry, for readers (the catalog, the routing engine)
    /// that need current status.
    #[ must_use ]
    pub fn health( &self ) -> &HealthRegistry
    {
      &self.health
    }

    /// The health registry, shared with a routing engine.
    #[ must_use ]
    pub fn health_registry( &self ) -> Arc< HealthRegistry >
    {
      self.health.clone()
    }

    /// The quick-test cache, shared with a routing engine.
    #[ must_use ]
    pub fn quick_test_cache( &self ) -> Arc< QuickTestCache >
    {
      self.quick_test.clone()
    }

    /// The cooldown registry shared with the routing engine.
    #[ must_use ]
    pub fn cooldowns( &self ) -> &Arc< CooldownRegistry >
    {
      &self.cooldowns
    }

    /// The quick-test cache, for the routing engine's "fastest" tie-break.
    #[ must_use ]
    pub fn quick_test( &self ) -> &QuickTestCache
    {
      &self.quick_test
    }

    /// Run one probe round against `scope`.
    pub async fn run_once( &self, scope : &ProbeScope )
    {
      let now = Utc::now();
      for endpoint_id in &scope.out_of_scope
      {
        self.health.mark_out_of_scope( *endpoint_id );
      }

      let outcomes = futures::future::join_all(
        scope.in_scope.iter().map( | target | probe( &self.client, target, self.config.health_path(), self.config.probe_timeout() ) ),
      ).await;

      for ( target, outcome ) in scope.in_scope.iter().zip( outcomes.iter() )
      {
        if outcome.healthy
        {
          tracing::debug!( endpoint_id = target.endpoint_id, latency_ms = outcome.latency_ms, "probe succeeded" );
        }
        else
        {
          tracing::warn!( endpoint_id = target.endpoint_id, error = outcome.error.as_deref().unwrap_or( "unknown" ), "probe failed" );
        }
        self.health.apply_probe( target.endpoint_id, outcome, now );
      }
    }

    /// Issue a targeted quick-test probe for `target` and cache the
    /// latency, used on a quick-test cache miss.
    pub async fn refresh_quick_test( &self, target : &ProbeTarget )
    {
      let now = Utc::now();
      let outcome = probe( &self.client, target, self.config.quick_test_path(), self.config.quick_test_timeout() ).await;
      if let Some( latency_ms ) = outcome.latency_ms
      {
        self.quick_test.record( target.endpoint_id, latency_ms, now, chrono::Duration::from_std( self.config.quick_test_ttl() ).unwrap_or_default() );
      }
    }

    /// Run the probe loop until `cancel` fires, re-fetching `scope` from
    /// `scope_fn` each tick so callers can reflect catalog changes.
    pub async fn run_forever< F >( &self, mut scope_fn : F, cancel : CancellationToken )
    where
      F : FnMut() -> ProbeScope,
    {
      let mut ticker = tokio::time::interval( self.config.probe_interval() );
      loop
      {
        tokio::select!
        {
          () = cancel.cancelled() => break,
          _ = ticker.tick() =>
          {
            let scope = scope_fn();
            self.run_once( &scope ).await;
          }
        }
      }
    }
  }

  #[ cfg( test ) ]
  mod tests
  {
    use super::*;
    use std::collections::BTreeMap;

    #[ tokio::test ]
    async fn out_of_scope_endpoints_reset_to_never_checked()
    {
      let supervisor = HealthSupervisor::new( ProbeConfig::new(), Arc::new( CooldownRegistry::new() ) );
      supervisor.health().apply_probe(
        1,
        &crate::prober::ProbeOutcome { healthy : true, latency_ms : Some( 5 ), error : None },
        Utc::now(),
      );
      let scope = ProbeScope { in_scope : Vec::new(), out_of_scope : vec![ 1 ] };
      supervisor.run_once( &scope ).await;
      let status = supervisor.health().status( 1, supervisor.cooldowns(), Utc::now() );
      assert!( status.never_checked );
    }

    #[ tokio::test ]
    async fn probe_against_unreachable_host_marks_unhealthy()
    {
      let supervisor = HealthSupervisor::new( ProbeConfig::new().with_probe_timeout( core::time::Duration::from_millis( 200 ) ), Arc::new( CooldownRegistry::new() ) );
      let target = ProbeTarget
      {
        endpoint_id : 1,
        url : "http://127.0.0.1:1".to_string(),
        bearer_token : None,
        api_key : None,
        custom_headers : BTreeMap::new(),
      };
      let scope = ProbeScope { in_scope : vec![ target ], out_of_scope : Vec::new() };
      supervisor.run_once( &scope ).await;
      supervisor.run_once( &scope ).await;
      let status = supervisor.health().status( 1, supervisor.cooldowns(), Utc::now() );
      assert!( !status.healthy, "two consecutive failed probes must mark the endpoint unhealthy" );
      assert!( !status.never_checked );
    }
  }
}

crate::mod_interface!
{
  exposed use
  {
    ProbeScope,
    HealthSupervisor,
  };
}
