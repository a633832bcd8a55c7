//! Cooldown registry
//!
//! Tracks cooldown-until per endpoint and per channel. Cooldown is entered
//! only by the routing engine observing live request failures (§4.4) —
//! the probe loop's healthy/unhealthy transition alone never cools an
//! endpoint down. `cooldown_until` is an exclusive upper bound: at
//! `now == cooldown_until` the subject is eligible again.

mod private
{
  use chrono::{ DateTime, Utc };
  use parking_lot::RwLock;
  use std::collections::HashMap;

  /// One active cooldown window.
  #[ derive( Debug, Clone, PartialEq ) ]
  pub struct CooldownEntry
  {
    /// Exclusive upper bound of the cooldown window.
    pub until : DateTime< Utc >,
    /// Human-readable reason the cooldown was entered.
    pub reason : String,
  }

  /// Many-reader/one-writer cooldown state for every endpoint and channel,
  /// keyed independently.
  #[ derive( Debug, Default ) ]
  pub struct CooldownRegistry
  {
    endpoints : RwLock< HashMap< i64, CooldownEntry > >,
    channels : RwLock< HashMap< String, CooldownEntry > >,
  }

  impl CooldownRegistry
  {
    /// An empty registry.
    #[ must_use ]
    pub fn new() -> Self
    {
      Self::default()
    }

    /// Place an endpoint under cooldown for `duration`, atomically
    /// replacing any existing entry.
    pub fn cooldown_endpoint( &self, endpoint_id : i64, now : DateTime< Utc >, duration : chrono::Duration, reason : impl Into< String > )
    {
      self.endpoints.write().insert( endpoint_id, CooldownEntry { until : now + duration, reason : reason.into() } );
    }

    /// Place a channel under cooldown for `duration`, atomically replacing
    /// any existing entry.
    pub fn cooldown_channel( &self, channel : &str, now : DateTime< Utc >, duration : chrono::Duration, reason : impl Into< String > )
    {
      self.channels.write().insert( channel.to_string(), CooldownEntry { until : now + duration, reason : reason.into() } );
    }

    /// Current cooldown entry for an endpoint, if its window has not yet
    /// elapsed as of `now`. A stale entry (`until <= now`) reads as absent
    /// without being evicted — callers needing cleanup use
    /// [`Self::evict_expired`].
    #[ must_use ]
    pub fn endpoint_cooldown( &self, endpoint_id : i64, now : DateTime< Utc > ) -> Option< CooldownEntry >
    {
      self.endpoints.read().get( &endpoint_id ).filter( | entry | entry.until > now ).cloned()
    }

    /// Current cooldown entry for a channel, if its window has not yet
    /// elapsed as of `now`.
    #[ must_use ]
    pub fn channel_cooldown( &self, channel : &str, now : DateTime< Utc > ) -> Option< CooldownEntry >
    {
      self.channels.read().get( channel ).filter( | entry | entry.until > now ).cloned()
    }

    /// Whether an endpoint is presently cooling down.
    #[ must_use ]
    pub fn is_endpoint_cooling( &self, endpoint_id : i64, now : DateTime< Utc > ) -> bool
    {
      self.endpoint_cooldown( endpoint_id, now ).is_some()
    }

    /// Whether a channel is presently cooling down.
    #[ must_use ]
    pub fn is_channel_cooling( &self, channel : &str, now : DateTime< Utc > ) -> bool
    {
      self.channel_cooldown( channel, now ).is_some()
    }

    /// Drop every entry whose window has elapsed as of `now`, keeping the
    /// registry's memory footprint bounded.
    pub fn evict_expired( &self, now : DateTime< Utc > )
    {
      self.endpoints.write().retain( | _, entry | entry.until > now );
      self.channels.write().retain( | _, entry | entry.until > now );
    }
  }

  #[ cfg( test ) ]
  mod tests
  {
    use super::*;
    use chrono::Duration as ChronoDuration;

    #[ test ]
    fn endpoint_cools_down_for_the_given_duration()
    {
      let registry = CooldownRegistry::new();
      let now = Utc::now();
      registry.cooldown_endpoint( 1, now, ChronoDuration::seconds( 600 ), "upstream 503" );
      assert!( registry.is_endpoint_cooling( 1, now ) );
      assert!( !registry.is_endpoint_cooling( 1, now + ChronoDuration::seconds( 601 ) ) );
    }

    #[ test ]
    fn cooldown_upper_bound_is_exclusive()
    {
      let registry = CooldownRegistry::new();
      let now = Utc::now();
      registry.cooldown_endpoint( 1, now, ChronoDuration::seconds( 60 ), "test" );
      let until = registry.endpoint_cooldown( 1, now ).unwrap().until;
      assert!( !registry.is_endpoint_cooling( 1, until ) );
    }

    #[ test ]
    fn channel_cooldown_is_independent_of_endpoint_cooldown()
    {
      let registry = CooldownRegistry::new();
      let now = Utc::now();
      registry.cooldown_channel( "primary", now, ChronoDuration::seconds( 600 ), "channel exhausted" );
      assert!( registry.is_channel_cooling( "primary", now ) );
      assert!( !registry.is_endpoint_cooling( 1, now ) );
    }

    #[ test ]
    fn evict_expired_clears_stale_entries()
    {
      let registry = CooldownRegistry::new();
      let now = Utc::now();
      registry.cooldown_endpoint( 1, now, ChronoDuration::seconds( -1 ), "already expired" );
      registry.evict_expired( now );
      assert!( registry.endpoints.read().is_empty() );
    }
  }
}

crate::mod_interface!
{
  exposed use
  {
    CooldownEntry,
    CooldownRegistry,
  };
}
