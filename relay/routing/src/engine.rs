//! The selection pipeline
//!
//! One [`RoutingEngine`] instance serves a whole proxy fabric; each call
//! to [`RoutingEngine::route`] drives one request through channel
//! selection, intra-candidate retry, intra-channel failover, and
//! inter-channel failover.

mod private
{
  use crate::backoff::BackoffConfig;
  use crate::dispatch::{ Dispatch, DispatchSuccess };
  use crate::selection::{ active_channels, candidate_list, SelectionStrategy };
  use crate::suspend::{ SuspendQueue, SuspendedRequest };
  use chrono::{ DateTime, Duration as ChronoDuration, Utc };
  use core::time::Duration;
  use relay_catalog::Catalog;
  use relay_health::{ CooldownRegistry, HealthRegistry, HealthSupervisor, ProbeTarget, QuickTestCache };
  use relay_types::{ Channel, Endpoint, RelayError };
  use std::sync::Arc;
  use tokio_util::sync::CancellationToken;

  /// How `RoutingEngine::route` finished.
  #[ derive( Debug ) ]
  pub enum RouteOutcome
  {
    /// An attempt succeeded.
    Completed( DispatchSuccess ),
    /// Every channel was exhausted and the request was parked on the
    /// recovery queue; the caller should await a later
    /// [`RoutingEngine::resume_suspended`] pass.
    Suspended,
    /// No more failover options remain; terminal.
    Failed( RelayError ),
  }

  /// Tunables for the routing engine : retry/failover limits, the channel
  /// selection strategy, and suspension behavior once every candidate is
  /// exhausted.
  #[ derive( Debug, Clone ) ]
  pub struct RoutingConfig
  {
    retry_max_attempts : u32,
    failover_enabled : bool,
    strategy : SelectionStrategy,
    default_cooldown : Duration,
    suspension_enabled : bool,
    max_suspended : usize,
    suspend_timeout : Duration,
  }

  impl RoutingConfig
  {
    /// Build a configuration with every tunable given explicitly.
    #[ must_use ]
    pub fn with_explicit_config(
      retry_max_attempts : u32,
      failover_enabled : bool,
      strategy : SelectionStrategy,
      default_cooldown : Duration,
      suspension_enabled : bool,
      max_suspended : usize,
      suspend_timeout : Duration,
    ) -> Self
    {
      Self { retry_max_attempts, failover_enabled, strategy, default_cooldown, suspension_enabled, max_suspended, suspend_timeout }
    }

    /// Compatibility wrapper with the documented defaults: 3 max attempts,
    /// failover enabled, priority tie-break, 600s default cooldown,
    /// suspension enabled with `max_suspended` 100 and a 300s timeout.
    #[ must_use ]
    pub fn new() -> Self
    {
      Self::with_explicit_config( 3, true, SelectionStrategy::Priority, Duration::from_secs( 600 ), true, 100, Duration::from_secs( 300 ) )
    }

    /// Override the per-candidate retry ceiling.
    #[ must_use ]
    pub fn with_retry_max_attempts( mut self, retry_max_attempts : u32 ) -> Self
    {
      self.retry_max_attempts = retry_max_attempts;
      self
    }

    /// Override whether inter-channel failover is permitted.
    #[ must_use ]
    pub fn with_failover_enabled( mut self, failover_enabled : bool ) -> Self
    {
      self.failover_enabled = failover_enabled;
      self
    }

    /// Override the tie-break strategy.
    #[ must_use ]
    pub fn with_strategy( mut self, strategy : SelectionStrategy ) -> Self
    {
      self.strategy = strategy;
      self
    }

    /// Override the default cooldown duration used when an endpoint
    /// declares no override.
    #[ must_use ]
    pub fn with_default_cooldown( mut self, default_cooldown : Duration ) -> Self
    {
      self.default_cooldown = default_cooldown;
      self
    }

    /// Override whether exhausted requests are parked instead of failed.
    #[ must_use ]
    pub fn with_suspension_enabled( mut self, suspension_enabled : bool ) -> Self
    {
      self.suspension_enabled = suspension_enabled;
      self
    }

    /// Override the recovery queue's capacity.
    #[ must_use ]
    pub fn with_max_suspended( mut self, max_suspended : usize ) -> Self
    {
      self.max_suspended = max_suspended;
      self
    }

    /// Override how long a parked request waits before giving up.
    #[ must_use ]
    pub fn with_suspend_timeout( mut self, suspend_timeout : Duration ) -> Self
    {
      self.suspend_timeout = suspend_timeout;
      self
    }
  }

  impl Default for RoutingConfig
  {
    fn default() -> Self
    {
      Self::new()
    }
  }

  enum CandidateOutcome
  {
    Completed( DispatchSuccess ),
    Fatal( RelayError ),
    RetriesExhausted( RelayError ),
  }

  enum ChannelOutcome
  {
    Completed( DispatchSuccess ),
    Fatal( RelayError ),
    Exhausted,
  }

  /// Owns one fabric's catalog/health/cooldown/quick-test handles plus a
  /// [`Dispatch`] implementation, and drives the selection pipeline for
  /// each request.
  pub struct RoutingEngine< D : Dispatch >
  {
    config : RoutingConfig,
    backoff : BackoffConfig,
    catalog : Arc< Catalog >,
    health : Arc< HealthRegistry >,
    cooldowns : Arc< CooldownRegistry >,
    quick_test : Arc< QuickTestCache >,
    quick_test_supervisor : Option< Arc< HealthSupervisor > >,
    suspend_queue : SuspendQueue,
    dispatcher : D,
  }

  impl< D : Dispatch > RoutingEngine< D >
  {
    /// Build an engine sharing its registries with the health supervisor
    /// and catalog. Under the "fastest" strategy a quick-test cache miss
    /// is tolerated (candidates fall back to priority order for this
    /// request) but not otherwise acted on — call
    /// [`Self::with_quick_test_supervisor`] to also have misses trigger a
    /// targeted probe for next time.
    #[ must_use ]
    pub fn new(
      config : RoutingConfig,
      backoff : BackoffConfig,
      catalog : Arc< Catalog >,
      health : Arc< HealthRegistry >,
      cooldowns : Arc< CooldownRegistry >,
      quick_test : Arc< QuickTestCache >,
      dispatcher : D,
    ) -> Self
    {
      let suspend_queue = SuspendQueue::new( config.max_suspended );
      Self { config, backoff, catalog, health, cooldowns, quick_test, quick_test_supervisor : None, suspend_queue, dispatcher }
    }

    /// Attach the health supervisor so a quick-test cache miss under the
    /// "fastest" strategy issues a targeted probe in the background,
    /// instead of leaving the cache empty until the next scheduled health
    /// probe round happens to record a latency.
    #[ must_use ]
    pub fn with_quick_test_supervisor( mut self, supervisor : Arc< HealthSupervisor > ) -> Self
    {
      self.quick_test_supervisor = Some( supervisor );
      self
    }

    /// For every candidate with no cached quick-test latency, spawn a
    /// background refresh against `supervisor` so the next request sees a
    /// warm cache; this request still proceeds on the fallback ordering.
    fn refresh_stale_quick_tests( &self, candidates : &[ Endpoint ], now : DateTime< Utc > )
    {
      let Some( supervisor ) = self.quick_test_supervisor.clone() else { return };
      for endpoint in candidates
      {
        if self.quick_test.get( endpoint.id, now ).is_some()
        {
          continue;
        }
        let target = ProbeTarget
        {
          endpoint_id : endpoint.id,
          url : endpoint.url.clone(),
          bearer_token : endpoint.bearer_token.clone(),
          api_key : endpoint.api_key.clone(),
          custom_headers : endpoint.custom_headers.clone(),
        };
        let supervisor = supervisor.clone();
        tokio::spawn( async move { supervisor.refresh_quick_test( &target ).await; } );
      }
    }

    /// Number of requests currently parked on the recovery queue.
    #[ must_use ]
    pub fn suspended_count( &self ) -> usize
    {
      self.suspend_queue.len()
    }

    /// Run the full selection pipeline for one request.
    pub async fn route( &self, request_id : &str, cancel : &CancellationToken ) -> RouteOutcome
    {
      if let Some( outcome ) = self.attempt_all_channels( cancel ).await
      {
        return outcome;
      }

      if self.config.suspension_enabled
      {
        let deadline = Utc::now() + ChronoDuration::from_std( self.config.suspend_timeout ).unwrap_or_default();
        let parked = SuspendedRequest { request_id : request_id.to_string(), deadline };
        if self.suspend_queue.try_push( parked ).is_ok()
        {
          return RouteOutcome::Suspended;
        }
      }

      RouteOutcome::Failed( RelayError::NetworkTransient { detail : "no_endpoints_available".to_string() } )
    }

    /// Re-run the pipeline for every request currently parked, plus fail
    /// out any whose deadline has already passed. Intended to be called
    /// whenever an endpoint becomes healthy or a cooldown expires.
    pub async fn resume_suspended( &self, cancel : &CancellationToken ) -> Vec< ( String, RouteOutcome ) >
    {
      let now = Utc::now();
      let mut results : Vec< ( String, RouteOutcome ) > = self
      .suspend_queue
      .evict_expired( now )
      .into_iter()
      .map( | expired | ( expired.request_id, RouteOutcome::Failed( RelayError::NetworkTransient { detail : "no_endpoints_available".to_string() } ) ) )
      .collect();

      let pending = self.suspend_queue.len();
      for _ in 0..pending
      {
        let Some( entry ) = self.suspend_queue.pop_front() else { break };
        let outcome = self.route( &entry.request_id, cancel ).await;
        results.push( ( entry.request_id, outcome ) );
      }
      results
    }

    async fn attempt_all_channels( &self, cancel : &CancellationToken ) -> Option< RouteOutcome >
    {
      for channel in active_channels( &self.catalog, self.config.failover_enabled )
      {
        if cancel.is_cancelled()
        {
          return Some( RouteOutcome::Failed( RelayError::ClientCancelled ) );
        }

        match self.attempt_channel( &channel, cancel ).await
        {
          ChannelOutcome::Completed( success ) => return Some( RouteOutcome::Completed( success ) ),
          ChannelOutcome::Fatal( error ) => return Some( RouteOutcome::Failed( error ) ),
          ChannelOutcome::Exhausted =>
          {
            if self.config.failover_enabled
            {
              tracing::warn!( channel = %channel.name, "channel exhausted every candidate, entering cooldown" );
              self.cooldowns.cooldown_channel(
                &channel.name,
                Utc::now(),
                ChronoDuration::from_std( self.config.default_cooldown ).unwrap_or_default(),
                "channel exhausted every candidate",
              );
            }
          }
        }
      }
      None
    }

    async fn attempt_channel( &self, channel : &Channel, cancel : &CancellationToken ) -> ChannelOutcome
    {
      loop
      {
        let now = Utc::now();
        let candidates = candidate_list( &self.catalog, &self.health, &self.cooldowns, &self.quick_test, &channel.name, self.config.strategy, now );
        if self.config.strategy == SelectionStrategy::Fastest
        {
          self.refresh_stale_quick_tests( &candidates, now );
        }
        let Some( endpoint ) = candidates.into_iter().next() else { return ChannelOutcome::Exhausted };

        match self.attempt_candidate( &endpoint, cancel ).await
        {
          CandidateOutcome::Completed( success ) => return ChannelOutcome::Completed( success ),
          CandidateOutcome::Fatal( error ) => return ChannelOutcome::Fatal( error ),
          CandidateOutcome::RetriesExhausted( error ) =>
          {
            let duration = endpoint.cooldown_seconds.map( Duration::from_secs ).unwrap_or( self.config.default_cooldown );
            tracing::warn!( endpoint_id = endpoint.id, %error, "candidate exhausted retries, entering cooldown" );
            self.cooldowns.cooldown_endpoint( endpoint.id, Utc::now(), ChronoDuration::from_std( duration ).unwrap_or_default(), error.to_string() );
          }
        }
      }
    }

    async fn attempt_candidate( &self, endpoint : &Endpoint, cancel : &CancellationToken ) -> CandidateOutcome
    {
      let mut last_error = None;
      for attempt in 1..=self.config.retry_max_attempts
      {
        if cancel.is_cancelled()
        {
          return CandidateOutcome::Fatal( RelayError::ClientCancelled );
        }

        match self.dispatcher.attempt( endpoint ).await
        {
          Ok( success ) =>
          {
            let latency = success.latency_ms.unwrap_or( 0 );
            self.health.mark_healthy_from_live_traffic( endpoint.id, latency, Utc::now() );
            if let Some( latency_ms ) = success.latency_ms
            {
              self.quick_test.record( endpoint.id, latency_ms, Utc::now(), ChronoDuration::seconds( 300 ) );
            }
            return CandidateOutcome::Completed( success );
          }
          Err( error ) =>
          {
            if !error.is_retryable()
            {
              return CandidateOutcome::Fatal( error );
            }
            let is_last_attempt = attempt == self.config.retry_max_attempts;
            last_error = Some( error );
            if !is_last_attempt
            {
              let delay = self.backoff.delay_for( attempt );
              tokio::select!
              {
                () = cancel.cancelled() => return CandidateOutcome::Fatal( RelayError::ClientCancelled ),
                () = tokio::time::sleep( delay ) => {}
              }
            }
          }
        }
      }
      CandidateOutcome::RetriesExhausted( last_error.unwrap_or( RelayError::NetworkTransient { detail : "retries exhausted".to_string() } ) )
    }
  }

  #[ cfg( test ) ]
  mod tests
  {
    use super::*;
    use relay_persistence::{ ChannelStore, EndpointStore, NewChannel, NewEndpoint };
    use std::sync::atomic::{ AtomicUsize, Ordering };

    struct ScriptedDispatcher
    {
      calls : AtomicUsize,
      outcomes : Vec< RelayError >,
    }

    #[ async_trait::async_trait ]
    impl Dispatch for ScriptedDispatcher
    {
      async fn attempt( &self, _endpoint : &Endpoint ) -> relay_types::RelayResult< DispatchSuccess >
      {
        let index = self.calls.fetch_add( 1, Ordering::SeqCst );
        match self.outcomes.get( index )
        {
          Some( error ) => Err( error.clone() ),
          None => Ok( DispatchSuccess { latency_ms : Some( 12 ) } ),
        }
      }
    }

    async fn seeded( endpoints_per_channel : usize ) -> ( Catalog, Arc< HealthRegistry >, Arc< CooldownRegistry >, Arc< QuickTestCache > )
    {
      let pool = sqlx::SqlitePool::connect( "sqlite::memory:" ).await.unwrap();
      relay_persistence::migrate( &pool ).await.unwrap();
      let channel_store = ChannelStore::new( pool.clone() );
      let endpoint_store = EndpointStore::new( pool );
      channel_store.create( NewChannel { name : "primary".to_string(), website : None, priority : 0, participates_in_channel_failover : true } ).await.unwrap();
      for index in 0..endpoints_per_channel
      {
        endpoint_store.create( NewEndpoint::with_defaults( "primary".to_string(), format!( "ep{index}" ), "http://upstream.invalid".to_string() ) ).await.unwrap();
      }

      let catalog = Catalog::new();
      catalog.update_from_persistence( &channel_store, &endpoint_store, relay_catalog::CatalogEvent::Mutated ).await.unwrap();

      let health = Arc::new( HealthRegistry::new() );
      let now = Utc::now();
      for endpoint in catalog.candidates_for_channel( "primary" )
      {
        health.apply_probe( endpoint.id, &relay_health::ProbeOutcome { healthy : true, latency_ms : Some( 5 ), error : None }, now );
      }

      ( catalog, health, Arc::new( CooldownRegistry::new() ), Arc::new( QuickTestCache::new() ) )
    }

    fn fast_backoff() -> BackoffConfig
    {
      BackoffConfig::new().with_base( Duration::from_millis( 1 ) ).with_max( Duration::from_millis( 5 ) ).with_jitter_fraction( 0.0 )
    }

    #[ tokio::test ]
    async fn first_candidate_success_completes_immediately()
    {
      let ( catalog, health, cooldowns, quick_test ) = seeded( 1 ).await;
      let dispatcher = ScriptedDispatcher { calls : AtomicUsize::new( 0 ), outcomes : Vec::new() };
      let engine = RoutingEngine::new( RoutingConfig::new(), fast_backoff(), Arc::new( catalog ), health, cooldowns, quick_test, dispatcher );
      let cancel = CancellationToken::new();
      match engine.route( "req-1", &cancel ).await
      {
        RouteOutcome::Completed( _ ) => {}
        other => panic!( "expected Completed, got {other:?}" ),
      }
    }

    #[ tokio::test ]
    async fn fatal_failure_does_not_retry_or_fail_over()
    {
      let ( catalog, health, cooldowns, quick_test ) = seeded( 2 ).await;
      let dispatcher = ScriptedDispatcher
      {
        calls : AtomicUsize::new( 0 ),
        outcomes : vec![ RelayError::UpstreamClientError { status : 400, body : String::new() } ],
      };
      let engine = RoutingEngine::new( RoutingConfig::new(), fast_backoff(), Arc::new( catalog ), health, cooldowns, quick_test, dispatcher );
      let cancel = CancellationToken::new();
      match engine.route( "req-1", &cancel ).await
      {
        RouteOutcome::Failed( RelayError::UpstreamClientError { status, .. } ) => assert_eq!( status, 400 ),
        other => panic!( "expected Failed(UpstreamClientError), got {other:?}" ),
      }
      assert_eq!( engine.dispatcher.calls.load( Ordering::SeqCst ), 1, "fatal failure must not retry" );
    }

    #[ tokio::test ]
    async fn retryable_failure_exhausts_candidate_then_fails_over()
    {
      let ( catalog, health, cooldowns, quick_test ) = seeded( 2 ).await;
      let dispatcher = ScriptedDispatcher
      {
        calls : AtomicUsize::new( 0 ),
        outcomes : vec!
        [
          RelayError::NetworkTransient { detail : "a".to_string() },
          RelayError::NetworkTransient { detail : "a".to_string() },
          RelayError::NetworkTransient { detail : "a".to_string() },
        ],
      };
      let engine = RoutingEngine::new( RoutingConfig::new(), fast_backoff(), Arc::new( catalog ), health.clone(), cooldowns.clone(), quick_test.clone(), dispatcher );
      let cancel = CancellationToken::new();
      match engine.route( "req-1", &cancel ).await
      {
        RouteOutcome::Completed( _ ) => {}
        other => panic!( "expected Completed on the second endpoint, got {other:?}" ),
      }
      let remaining = crate::selection::candidate_list( &engine.catalog, &health, &cooldowns, &quick_test, "primary", SelectionStrategy::Priority, Utc::now() );
      assert_eq!( remaining.len(), 1, "the exhausted endpoint must be in cooldown" );
    }

    #[ tokio::test ]
    async fn exhausting_every_channel_without_suspension_fails_with_no_endpoints()
    {
      let ( catalog, health, cooldowns, quick_test ) = seeded( 1 ).await;
      let dispatcher = ScriptedDispatcher
      {
        calls : AtomicUsize::new( 0 ),
        outcomes : vec!
        [
          RelayError::NetworkTransient { detail : "a".to_string() },
          RelayError::NetworkTransient { detail : "a".to_string() },
          RelayError::NetworkTransient { detail : "a".to_string() },
        ],
      };
      let config = RoutingConfig::new().with_suspension_enabled( false );
      let engine = RoutingEngine::new( config, fast_backoff(), Arc::new( catalog ), health, cooldowns, quick_test, dispatcher );
      let cancel = CancellationToken::new();
      match engine.route( "req-1", &cancel ).await
      {
        RouteOutcome::Failed( RelayError::NetworkTransient { detail } ) => assert_eq!( detail, "no_endpoints_available" ),
        other => panic!( "expected Failed(no_endpoints_available), got {other:?}" ),
      }
    }

    #[ tokio::test ]
    async fn exhausting_every_channel_with_suspension_parks_the_request()
    {
      let ( catalog, health, cooldowns, quick_test ) = seeded( 1 ).await;
      let dispatcher = ScriptedDispatcher
      {
        calls : AtomicUsize::new( 0 ),
        outcomes : vec!
        [
          RelayError::NetworkTransient { detail : "a".to_string() },
          RelayError::NetworkTransient { detail : "a".to_string() },
          RelayError::NetworkTransient { detail : "a".to_string() },
        ],
      };
      let engine = RoutingEngine::new( RoutingConfig::new(), fast_backoff(), Arc::new( catalog ), health, cooldowns, quick_test, dispatcher );
      let cancel = CancellationToken::new();
      match engine.route( "req-1", &cancel ).await
      {
        RouteOutcome::Suspended => {}
        other => panic!( "expected Suspended, got {other:?}" ),
      }
      assert_eq!( engine.suspended_count(), 1 );
    }

    #[ tokio::test ]
    async fn cancellation_short_circuits_without_retry()
    {
      let ( catalog, health, cooldowns, quick_test ) = seeded( 1 ).await;
      let dispatcher = ScriptedDispatcher { calls : AtomicUsize::new( 0 ), outcomes : Vec::new() };
      let engine = RoutingEngine::new( RoutingConfig::new(), fast_backoff(), Arc::new( catalog ), health, cooldowns, quick_test, dispatcher );
      let cancel = CancellationToken::new();
      cancel.cancel();
      match engine.route( "req-1", &cancel ).await
      {
        RouteOutcome::Failed( RelayError::ClientCancelled ) => {}
        other => panic!( "expected Failed(ClientCancelled), got {other:?}" ),
      }
    }
  }
}

crate::mod_interface!
{
  exposed use
  {
    RouteOutcome,
    RoutingConfig,
    RoutingEngine,
  };
}
