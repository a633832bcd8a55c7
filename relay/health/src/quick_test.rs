//! Quick-test latency cache
//!
//! Backs the "fastest" routing strategy's tie-break. Keyed by endpoint,
//! value is `(last_test_latency, expires_at)`; a cache miss is the
//! caller's cue to issue a targeted probe.

mod private
{
  use chrono::{ DateTime, Utc };
  use parking_lot::RwLock;
  use std::collections::HashMap;

  /// A cached latency sample with its expiry.
  #[ derive( Debug, Clone, Copy, PartialEq ) ]
  pub struct QuickTestEntry
  {
    /// Observed latency, in milliseconds.
    pub latency_ms : u64,
    /// When this entry should be treated as stale.
    pub expires_at : DateTime< Utc >,
  }

  /// Many-reader/one-writer latency cache, one entry per endpoint.
  #[ derive( Debug, Default ) ]
  pub struct QuickTestCache
  {
    entries : RwLock< HashMap< i64, QuickTestEntry > >,
  }

  impl QuickTestCache
  {
    /// An empty cache.
    #[ must_use ]
    pub fn new() -> Self
    {
      Self::default()
    }

    /// Record a fresh latency sample, valid until `now + ttl`.
    pub fn record( &self, endpoint_id : i64, latency_ms : u64, now : DateTime< Utc >, ttl : chrono::Duration )
    {
      self.entries.write().insert( endpoint_id, QuickTestEntry { latency_ms, expires_at : now + ttl } );
    }

    /// Fetch the cached latency if it has not expired as of `now`; a
    /// cache miss (absent or expired) returns `None`.
    #[ must_use ]
    pub fn get( &self, endpoint_id : i64, now : DateTime< Utc > ) -> Option< u64 >
    {
      self.entries.read().get( &endpoint_id ).filter( | entry | entry.expires_at > now ).map( | entry | entry.latency_ms )
    }

    /// Drop every expired entry.
    pub fn evict_expired( &self, now : DateTime< Utc > )
    {
      self.entries.write().retain( | _, entry | entry.expires_at > now );
    }
  }

  #[ cfg( test ) ]
  mod tests
  {
    use super::*;
    use chrono::Duration as ChronoDuration;

    #[ test ]
    fn fresh_entry_is_returned()
    {
      let cache = QuickTestCache::new();
      let now = Utc::now();
      cache.record( 1, 42, now, ChronoDuration::seconds( 3 ) );
      assert_eq!( cache.get( 1, now ), Some( 42 ) );
    }

    #[ test ]
    fn expired_entry_reads_as_miss()
    {
      let cache = QuickTestCache::new();
      let now = Utc::now();
      cache.record( 1, 42, now, ChronoDuration::seconds( 3 ) );
      assert_eq!( cache.get( 1, now + ChronoDuration::seconds( 4 ) ), None );
    }

    #[ test ]
    fn unknown_endpoint_is_a_miss()
    {
      let cache = QuickTestCache::new();
      assert_eq!( cache.get( 99, Utc::now() ), None );
    }
  }
}

crate::mod_interface!
{
  exposed use
  {
    QuickTestEntry,
    QuickTestCache,
  };
}
