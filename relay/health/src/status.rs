//! Runtime health status registry
//!
//! Owns the `healthy`/`never_checked`/`last_check`/`last_latency_ms` half
//! of [`relay_types::EndpointRuntimeStatus`]; `cooldown_until` and
//! `cooldown_reason` are read through from [`crate::CooldownRegistry`] so
//! there is exactly one writer for each half.

mod private
{
  use crate::cooldown::CooldownRegistry;
  use crate::prober::ProbeOutcome;
  use chrono::{ DateTime, Utc };
  use parking_lot::RwLock;
  use relay_types::EndpointRuntimeStatus;
  use std::collections::HashMap;

  /// Consecutive failed probes required before an endpoint flips
  /// unhealthy. A single bad probe is not enough — transient blips (one
  /// dropped connection, one slow DNS lookup) must not pull a candidate
  /// out of rotation; only a sustained failure streak does.
  const UNHEALTHY_AFTER : u32 = 2;

  #[ derive( Debug, Clone, Copy, Default ) ]
  struct Health
  {
    healthy : bool,
    never_checked : bool,
    last_check : Option< DateTime< Utc > >,
    last_latency_ms : Option< u64 >,
    consecutive_failures : u32,
  }

  /// Many-reader/one-writer health state for every endpoint known to the
  /// supervisor.
  #[ derive( Debug, Default ) ]
  pub struct HealthRegistry
  {
    endpoints : RwLock< HashMap< i64, Health > >,
  }

  impl HealthRegistry
  {
    /// An empty registry; every endpoint reads as never-checked until a
    /// probe applies.
    #[ must_use ]
    pub fn new() -> Self
    {
      Self::default()
    }

    /// Apply one probe's outcome. A success marks the endpoint healthy
    /// immediately and resets the failure streak; a failure only flips it
    /// unhealthy once [`UNHEALTHY_AFTER`] consecutive probes have failed.
    pub fn apply_probe( &self, endpoint_id : i64, outcome : &ProbeOutcome, now : DateTime< Utc > )
    {
      let mut endpoints = self.endpoints.write();
      let entry = endpoints.entry( endpoint_id ).or_default();
      entry.never_checked = false;
      entry.last_check = Some( now );
      if outcome.healthy
      {
        entry.healthy = true;
        entry.consecutive_failures = 0;
        if outcome.latency_ms.is_some()
        {
          entry.last_latency_ms = outcome.latency_ms;
        }
      }
      else
      {
        entry.consecutive_failures += 1;
        if entry.consecutive_failures >= UNHEALTHY_AFTER
        {
          entry.healthy = false;
        }
      }
    }

    /// Promote an endpoint to healthy from live traffic success, without
    /// requiring a probe — live requests are also a signal.
    pub fn mark_healthy_from_live_traffic( &self, endpoint_id : i64, latency_ms : u64, now : DateTime< Utc > )
    {
      let mut endpoints = self.endpoints.write();
      let entry = endpoints.entry( endpoint_id ).or_default();
      entry.healthy = true;
      entry.never_checked = false;
      entry.last_check = Some( now );
      entry.last_latency_ms = Some( latency_ms );
      entry.consecutive_failures = 0;
    }

    /// Reset an endpoint to never-checked, used when it falls outside the
    /// probe scope (out-of-scope endpoints are reported never-checked,
    /// never unhealthy).
    pub fn mark_out_of_scope( &self, endpoint_id : i64 )
    {
      self.endpoints.write().remove( &endpoint_id );
    }

    /// Full runtime status for one endpoint, joining this registry's
    /// health half with `cooldowns`' cooldown half.
    #[ must_use ]
    pub fn status( &self, endpoint_id : i64, cooldowns : &CooldownRegistry, now : DateTime< Utc > ) -> EndpointRuntimeStatus
    {
      let health = self.endpoints.read().get( &endpoint_id ).copied().unwrap_or_default();
      let cooldown = cooldowns.endpoint_cooldown( endpoint_id, now );
      EndpointRuntimeStatus
      {
        healthy : health.healthy,
        never_checked : health.never_checked,
        last_check : health.last_check,
        last_latency_ms : health.last_latency_ms,
        cooldown_until : cooldown.as_ref().map( | entry | entry.until ),
        cooldown_reason : cooldown.map( | entry | entry.reason ),
      }
    }
  }

  #[ cfg( test ) ]
  mod tests
  {
    use super::*;
    use crate::prober::ProbeOutcome;

    #[ test ]
    fn unknown_endpoint_is_never_checked()
    {
      let registry = HealthRegistry::new();
      let cooldowns = CooldownRegistry::new();
      let status = registry.status( 1, &cooldowns, Utc::now() );
      assert!( status.never_checked );
      assert!( !status.healthy );
    }

    #[ test ]
    fn successful_probe_marks_healthy_with_latency()
    {
      let registry = HealthRegistry::new();
      let cooldowns = CooldownRegistry::new();
      let now = Utc::now();
      registry.apply_probe( 1, &ProbeOutcome { healthy : true, latency_ms : Some( 42 ), error : None }, now );
      let status = registry.status( 1, &cooldowns, now );
      assert!( status.healthy );
      assert!( !status.never_checked );
      assert_eq!( status.last_latency_ms, Some( 42 ) );
    }

    #[ test ]
    fn single_failed_probe_does_not_yet_mark_unhealthy()
    {
      let registry = HealthRegistry::new();
      let cooldowns = CooldownRegistry::new();
      let now = Utc::now();
      registry.apply_probe( 1, &ProbeOutcome { healthy : true, latency_ms : Some( 10 ), error : None }, now );
      registry.apply_probe( 1, &ProbeOutcome { healthy : false, latency_ms : None, error : Some( "boom".to_string() ) }, now );
      assert!( registry.status( 1, &cooldowns, now ).healthy, "one dropped probe must not pull an endpoint out of rotation" );
    }

    #[ test ]
    fn consecutive_failed_probes_mark_unhealthy()
    {
      let registry = HealthRegistry::new();
      let cooldowns = CooldownRegistry::new();
      let now = Utc::now();
      registry.apply_probe( 1, &ProbeOutcome { healthy : true, latency_ms : Some( 10 ), error : None }, now );
      for _ in 0..UNHEALTHY_AFTER
      {
        registry.apply_probe( 1, &ProbeOutcome { healthy : false, latency_ms : None, error : Some( "boom".to_string() ) }, now );
      }
      assert!( !registry.status( 1, &cooldowns, now ).healthy );
    }

    #[ test ]
    fn a_single_success_resets_the_failure_streak()
    {
      let registry = HealthRegistry::new();
      let cooldowns = CooldownRegistry::new();
      let now = Utc::now();
      registry.apply_probe( 1, &ProbeOutcome { healthy : false, latency_ms : None, error : Some( "boom".to_string() ) }, now );
      registry.apply_probe( 1, &ProbeOutcome { healthy : true, latency_ms : Some( 5 ), error : None }, now );
      registry.apply_probe( 1, &ProbeOutcome { healthy : false, latency_ms : None, error : Some( "boom".to_string() ) }, now );
      assert!( registry.status( 1, &cooldowns, now ).healthy, "a success must reset the streak, not just decrement it" );
    }

    #[ test ]
    fn status_joins_cooldown_from_registry()
    {
      let registry = HealthRegistry::new();
      let cooldowns = CooldownRegistry::new();
      let now = Utc::now();
      registry.apply_probe( 1, &ProbeOutcome { healthy : true, latency_ms : Some( 5 ), error : None }, now );
      cooldowns.cooldown_endpoint( 1, now, chrono::Duration::seconds( 600 ), "upstream 503" );
      let status = registry.status( 1, &cooldowns, now );
      assert!( status.healthy );
      assert!( !status.is_eligible( now ) );
    }
  }
}

crate::mod_interface!
{
  exposed use HealthRegistry;
}
