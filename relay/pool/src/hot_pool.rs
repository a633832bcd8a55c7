//! Bounded in-memory map of in-flight requests
//!
//! The pool never holds a terminal record: a business transition into
//! `Completed`, `Failed`, or `Cancelled` atomically removes the slot in the
//! same call that applies it, handing the finished record back to the
//! caller (the archive pipeline enqueues it from there). Every record is
//! behind its own `tokio::sync::Mutex` so one slow caller serializes only
//! that request's read-modify-write, never the whole pool.

mod private
{
  use chrono::{ DateTime, Duration, Utc };
  use parking_lot::RwLock;
  use relay_lifecycle::LifecycleManager;
  use relay_types::{ BusinessState, ErrorState, RequestRecord };
  use std::collections::HashMap;
  use std::sync::Arc;
  use tokio::sync::Mutex as AsyncMutex;

  /// "Thin client, rich API": every bound has an explicit default, but
  /// nothing is implied — callers who want the §4.6 defaults call `new`,
  /// callers who want something else build it field by field.
  #[ derive( Debug, Clone, Copy ) ]
  pub struct HotPoolConfig
  {
    /// Upper bound on concurrently resident (non-terminal) requests.
    pub max_active_requests : usize,
    /// How long a record may sit in the pool without reaching a terminal
    /// state before the cleanup worker calls it stale.
    pub max_age : Duration,
  }

  impl HotPoolConfig
  {
    /// Build with every bound specified explicitly.
    #[ must_use ]
    pub fn with_explicit_config( max_active_requests : usize, max_age : Duration ) -> Self
    {
      Self { max_active_requests, max_age }
    }

    /// Compatibility wrapper with sensible defaults: 1000 active requests,
    /// a 30 minute max age.
    #[ must_use ]
    pub fn new() -> Self
    {
      Self::with_explicit_config( 1000, Duration::minutes( 30 ) )
    }

    /// Override the active-request bound.
    #[ must_use ]
    pub fn with_max_active_requests( mut self, max_active_requests : usize ) -> Self
    {
      self.max_active_requests = max_active_requests;
      self
    }

    /// Override the max age.
    #[ must_use ]
    pub fn with_max_age( mut self, max_age : Duration ) -> Self
    {
      self.max_age = max_age;
      self
    }
  }

  impl Default for HotPoolConfig
  {
    fn default() -> Self
    {
      Self::new()
    }
  }

  /// Outcome of a business transition attempted through the pool.
  #[ derive( Debug ) ]
  pub struct HotPoolTransition
  {
    /// Whether the transition actually changed the record's state.
    pub applied : bool,
    /// The record, if this transition just made it terminal. The slot has
    /// already been released by the time this is returned.
    pub terminal_record : Option< RequestRecord >,
  }

  /// The hot pool itself.
  #[ derive( Debug ) ]
  pub struct HotPool
  {
    slots : RwLock< HashMap< String, Arc< AsyncMutex< RequestRecord > > > >,
    config : HotPoolConfig,
    lifecycle : Arc< LifecycleManager >,
  }

  impl HotPool
  {
    /// A pool bounded per `config`, delegating every transition through
    /// `lifecycle`.
    #[ must_use ]
    pub fn new( config : HotPoolConfig, lifecycle : Arc< LifecycleManager > ) -> Self
    {
      Self { slots : RwLock::new( HashMap::new() ), config, lifecycle }
    }

    /// Number of resident (non-terminal) requests.
    #[ must_use ]
    pub fn len( &self ) -> usize
    {
      self.slots.read().len()
    }

    /// Whether the pool currently holds no requests.
    #[ must_use ]
    pub fn is_empty( &self ) -> bool
    {
      self.len() == 0
    }

    /// Admit a freshly-accepted record. Rejects (returning the record
    /// back, unadmitted) once the pool holds `max_active_requests`.
    ///
    /// # Errors
    ///
    /// Returns `record` unchanged when the pool is at capacity.
    pub fn admit( &self, record : RequestRecord ) -> Result< (), RequestRecord >
    {
      let mut slots = self.slots.write();
      if slots.len() >= self.config.max_active_requests
      {
        return Err( record );
      }
      slots.insert( record.request_id.clone(), Arc::new( AsyncMutex::new( record ) ) );
      Ok( () )
    }

    /// Borrow the per-record lock for `request_id`, if resident.
    #[ must_use ]
    pub fn get( &self, request_id : &str ) -> Option< Arc< AsyncMutex< RequestRecord > > >
    {
      self.slots.read().get( request_id ).cloned()
    }

    /// Read-modify-write `request_id`'s record under its own lock. This is
    /// the path live token updates from the HTTP layer use — every update
    /// observes the latest prior write, never a stale copy.
    pub async fn with_record< F, R >( &self, request_id : &str, f : F ) -> Option< R >
    where
      F : FnOnce( &mut RequestRecord ) -> R,
    {
      let handle = self.get( request_id )?;
      let mut record = handle.lock().await;
      Some( f( &mut record ) )
    }

    /// Apply a business-state transition. On success, if the new state is
    /// terminal, the slot is released in the same call and the finished
    /// record comes back for the archive pipeline to pick up.
    pub async fn transition_business
    (
      &self,
      request_id : &str,
      next : BusinessState,
      now : DateTime< Utc >,
      reason : Option< String >,
    ) -> Option< HotPoolTransition >
    {
      let handle = self.get( request_id )?;
      let ( applied, terminal_record ) =
      {
        let mut record = handle.lock().await;
        let applied = self.lifecycle.transition_business( &mut record, next, now, reason );
        let terminal_record = if applied && record.is_terminal() { Some( record.clone() ) } else { None };
        ( applied, terminal_record )
      };
      if terminal_record.is_some()
      {
        self.slots.write().remove( request_id );
      }
      Some( HotPoolTransition { applied, terminal_record } )
    }

    /// Set the orthogonal error state. Never releases the slot — only a
    /// business transition does that.
    pub async fn set_error_state( &self, request_id : &str, next : ErrorState ) -> Option< bool >
    {
      let handle = self.get( request_id )?;
      let mut record = handle.lock().await;
      Some( self.lifecycle.set_error_state( &mut record, next ) )
    }

    /// Remove a record without going through a transition, used by the
    /// cleanup worker once it has already archived a stale-timed-out
    /// record.
    pub fn evict( &self, request_id : &str )
    {
      self.slots.write().remove( request_id );
    }

    /// Ids of every resident record whose `start_time` is older than
    /// `max_age` as of `now`. Every resident record is non-terminal by
    /// construction, so the cleanup worker can fail these straight to
    /// `Failed` without re-checking terminality.
    #[ must_use ]
    pub fn scan_older_than( &self, now : DateTime< Utc > ) -> Vec< String >
    {
      self.slots.read()
        .iter()
        .filter_map( | ( id, handle ) |
        {
          handle.try_lock().ok().and_then( | record |
          {
            ( now - record.start_time > self.config.max_age ).then( || id.clone() )
          } )
        } )
        .collect()
    }
  }

  #[ cfg( test ) ]
  mod tests
  {
    use super::*;

    fn manager() -> Arc< LifecycleManager >
    {
      Arc::new( LifecycleManager::new() )
    }

    fn record( id : &str ) -> RequestRecord
    {
      RequestRecord::new( id.to_string(), Utc::now(), false )
    }

    #[ tokio::test ]
    async fn admit_then_get_round_trips_the_record()
    {
      let pool = HotPool::new( HotPoolConfig::new(), manager() );
      pool.admit( record( "req-1" ) ).unwrap();
      assert_eq!( pool.len(), 1 );
      let handle = pool.get( "req-1" ).unwrap();
      assert_eq!( handle.lock().await.request_id, "req-1" );
    }

    #[ tokio::test ]
    async fn admit_rejects_once_at_capacity()
    {
      let config = HotPoolConfig::new().with_max_active_requests( 1 );
      let pool = HotPool::new( config, manager() );
      pool.admit( record( "req-1" ) ).unwrap();
      let rejected = pool.admit( record( "req-2" ) ).unwrap_err();
      assert_eq!( rejected.request_id, "req-2" );
    }

    #[ tokio::test ]
    async fn terminal_transition_releases_the_slot()
    {
      let pool = HotPool::new( HotPoolConfig::new(), manager() );
      pool.admit( record( "req-1" ) ).unwrap();

      pool.transition_business( "req-1", BusinessState::Forwarding, Utc::now(), None ).await.unwrap();
      let outcome = pool.transition_business( "req-1", BusinessState::Completed, Utc::now(), None ).await.unwrap();

      assert!( outcome.applied );
      assert!( outcome.terminal_record.is_some() );
      assert!( pool.is_empty() );
    }

    #[ tokio::test ]
    async fn non_terminal_transition_keeps_the_slot()
    {
      let pool = HotPool::new( HotPoolConfig::new(), manager() );
      pool.admit( record( "req-1" ) ).unwrap();

      let outcome = pool.transition_business( "req-1", BusinessState::Forwarding, Utc::now(), None ).await.unwrap();

      assert!( outcome.applied );
      assert!( outcome.terminal_record.is_none() );
      assert_eq!( pool.len(), 1 );
    }

    #[ tokio::test ]
    async fn scan_older_than_finds_stale_residents_only()
    {
      let config = HotPoolConfig::new().with_max_age( Duration::seconds( 0 ) );
      let pool = HotPool::new( config, manager() );
      pool.admit( record( "old" ) ).unwrap();

      let stale = pool.scan_older_than( Utc::now() + Duration::seconds( 1 ) );
      assert_eq!( stale, vec![ "old".to_string() ] );
    }

    #[ tokio::test ]
    async fn with_record_observes_prior_writes()
    {
      let pool = HotPool::new( HotPoolConfig::new(), manager() );
      pool.admit( record( "req-1" ) ).unwrap();

      pool.with_record( "req-1", | record | record.tokens.input = 10 ).await.unwrap();
      let total = pool.with_record( "req-1", | record | record.tokens.input ).await.unwrap();

      assert_eq!( total, 10 );
    }
  }
}

crate::mod_interface!
{
  exposed use
  {
    HotPoolConfig,
    HotPoolTransition,
    HotPool,
  };
}
