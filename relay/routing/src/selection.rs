//! Candidate list construction
//!
//! Step 1–2 of the selection pipeline: which channels are in play, and
//! within each, which endpoints are eligible right now.

mod private
{
  use chrono::{ DateTime, Utc };
  use relay_catalog::Catalog;
  use relay_health::{ CooldownRegistry, HealthRegistry, QuickTestCache };
  use relay_types::{ Channel, Endpoint };

  /// How ties within a channel's candidate list are broken.
  #[ derive( Debug, Clone, Copy, PartialEq, Eq ) ]
  pub enum SelectionStrategy
  {
    /// Keep the catalog's configured-priority order.
    Priority,
    /// Prefer the endpoint with the lowest cached quick-test latency,
    /// falling back to configured priority when no sample is cached.
    Fastest,
  }

  /// The channels a request may be routed through, in the order they
  /// should be tried. With inter-channel failover disabled this is at
  /// most one channel; with it enabled, every failover-participating
  /// channel in priority order.
  #[ must_use ]
  pub fn active_channels( catalog : &Catalog, failover_enabled : bool ) -> Vec< Channel >
  {
    let ordered = catalog.channels_in_failover_order();
    if failover_enabled
    {
      ordered.into_iter().filter( | channel | channel.participates_in_channel_failover ).collect()
    }
    else
    {
      ordered.into_iter().take( 1 ).collect()
    }
  }

  /// The ordered, filtered candidate list for one channel: enabled
  /// endpoints that participate in failover, are not cooling down, and
  /// are currently healthy, tie-broken per `strategy`.
  #[ must_use ]
  pub fn candidate_list(
    catalog : &Catalog,
    health : &HealthRegistry,
    cooldowns : &CooldownRegistry,
    quick_test : &QuickTestCache,
    channel : &str,
    strategy : SelectionStrategy,
    now : DateTime< Utc >,
  ) -> Vec< Endpoint >
  {
    let mut candidates : Vec< Endpoint > = catalog
    .candidates_for_channel( channel )
    .into_iter()
    .filter( | endpoint | endpoint.enabled && endpoint.participates_in_failover )
    .filter( | endpoint | health.status( endpoint.id, cooldowns, now ).is_eligible( now ) )
    .collect();

    if strategy == SelectionStrategy::Fastest
    {
      candidates.sort_by_key( | endpoint | quick_test.get( endpoint.id, now ).unwrap_or( u64::MAX ) );
    }

    candidates
  }

  #[ cfg( test ) ]
  mod tests
  {
    use super::*;
    use relay_persistence::{ ChannelStore, EndpointStore, NewChannel, NewEndpoint };

    async fn seeded_catalog() -> ( Catalog, ChannelStore, EndpointStore )
    {
      let pool = sqlx::SqlitePool::connect( "sqlite::memory:" ).await.unwrap();
      relay_persistence::migrate( &pool ).await.unwrap();
      let channels = ChannelStore::new( pool.clone() );
      let endpoints = EndpointStore::new( pool );
      channels.create( NewChannel { name : "primary".to_string(), website : None, priority : 0, participates_in_channel_failover : true } ).await.unwrap();
      channels.create( NewChannel { name : "backup".to_string(), website : None, priority : 1, participates_in_channel_failover : false } ).await.unwrap();
      endpoints.create( NewEndpoint::with_defaults( "primary".to_string(), "fast".to_string(), "http://a.invalid".to_string() ) ).await.unwrap();
      endpoints.create( NewEndpoint::with_defaults( "primary".to_string(), "slow".to_string(), "http://b.invalid".to_string() ) ).await.unwrap();
      let catalog = Catalog::new();
      catalog.update_from_persistence( &channels, &endpoints, relay_catalog::CatalogEvent::Mutated ).await.unwrap();
      ( catalog, channels, endpoints )
    }

    #[ tokio::test ]
    async fn disabled_failover_yields_at_most_one_channel()
    {
      let ( catalog, _channels, _endpoints ) = seeded_catalog().await;
      let active = active_channels( &catalog, false );
      assert_eq!( active.len(), 1 );
      assert_eq!( active[ 0 ].name, "primary" );
    }

    #[ tokio::test ]
    async fn enabled_failover_excludes_non_participating_channels()
    {
      let ( catalog, _channels, _endpoints ) = seeded_catalog().await;
      let active = active_channels( &catalog, true );
      assert_eq!( active.len(), 1 );
      assert_eq!( active[ 0 ].name, "primary" );
    }

    #[ tokio::test ]
    async fn unhealthy_endpoints_are_excluded_from_candidates()
    {
      let ( catalog, _channels, _endpoints ) = seeded_catalog().await;
      let health = HealthRegistry::new();
      let cooldowns = CooldownRegistry::new();
      let quick_test = QuickTestCache::new();
      let now = Utc::now();

      let before = candidate_list( &catalog, &health, &cooldowns, &quick_test, "primary", SelectionStrategy::Priority, now );
      assert!( before.is_empty(), "never-probed endpoints are not yet eligible" );

      for endpoint in catalog.candidates_for_channel( "primary" )
      {
        health.apply_probe( endpoint.id, &relay_health::ProbeOutcome { healthy : true, latency_ms : Some( 5 ), error : None }, now );
      }
      let after = candidate_list( &catalog, &health, &cooldowns, &quick_test, "primary", SelectionStrategy::Priority, now );
      assert_eq!( after.len(), 2 );
    }

    #[ tokio::test ]
    async fn fastest_strategy_sorts_by_cached_latency()
    {
      let ( catalog, _channels, _endpoints ) = seeded_catalog().await;
      let health = HealthRegistry::new();
      let cooldowns = CooldownRegistry::new();
      let quick_test = QuickTestCache::new();
      let now = Utc::now();

      let endpoints = catalog.candidates_for_channel( "primary" );
      let fast = endpoints.iter().find( | e | e.name == "fast" ).unwrap();
      let slow = endpoints.iter().find( | e | e.name == "slow" ).unwrap();
      for endpoint in &endpoints
      {
        health.apply_probe( endpoint.id, &relay_health::ProbeOutcome { healthy : true, latency_ms : Some( 5 ), error : None }, now );
      }
      quick_test.record( fast.id, 10, now, chrono::Duration::seconds( 60 ) );
      quick_test.record( slow.id, 500, now, chrono::Duration::seconds( 60 ) );

      let ordered = candidate_list( &catalog, &health, &cooldowns, &quick_test, "primary", SelectionStrategy::Fastest, now );
      assert_eq!( ordered[ 0 ].name, "fast" );
      assert_eq!( ordered[ 1 ].name, "slow" );
    }
  }
}

crate::mod_interface!
{
  exposed use
  {
    SelectionStrategy,
    active_channels,
    candidate_list,
  };
}
