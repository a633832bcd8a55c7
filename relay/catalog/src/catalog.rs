//! Runtime catalog
//!
//! A `parking_lot::RwLock<Arc<CatalogSnapshot>>` readers never block behind
//! writers for : the write side builds a whole new snapshot off to the
//! side and swaps a pointer in; readers only ever hold the lock for the
//! duration of an `Arc` clone. Every swap broadcasts a [`CatalogEvent`] so
//! the routing engine and admin UI can react without polling.

mod private
{
  use crate::events::CatalogEvent;
  use crate::snapshot::CatalogSnapshot;
  use parking_lot::RwLock;
  use relay_persistence::{ ChannelStore, EndpointStore };
  use relay_types::{ Channel, Endpoint, RelayResult };
  use std::sync::Arc;
  use tokio::sync::broadcast;
  use tokio_util::sync::CancellationToken;

  /// Channel capacity for the mutation broadcast bus. Lagging subscribers
  /// miss intermediate events but will see the latest snapshot on their
  /// next read through [`Catalog::current`].
  const EVENT_CHANNEL_CAPACITY : usize = 256;

  /// Ordered in-memory view of channels and endpoints, kept in sync with
  /// persistence and broadcast to subscribers on every mutation.
  #[ derive( Debug ) ]
  pub struct Catalog
  {
    snapshot : RwLock< Arc< CatalogSnapshot > >,
    events : broadcast::Sender< CatalogEvent >,
  }

  impl Default for Catalog
  {
    fn default() -> Self
    {
      Self::new()
    }
  }

  impl Catalog
  {
    /// An empty catalog; call [`Catalog::update_from_persistence`] before
    /// relying on it for routing decisions.
    #[ must_use ]
    pub fn new() -> Self
    {
      let ( events, _receiver ) = broadcast::channel( EVENT_CHANNEL_CAPACITY );
      Self { snapshot : RwLock::new( Arc::new( CatalogSnapshot::default() ) ), events }
    }

    /// The current snapshot. Cheap : clones an `Arc`, never the data.
    #[ must_use ]
    pub fn current( &self ) -> Arc< CatalogSnapshot >
    {
      self.snapshot.read().clone()
    }

    /// Endpoints belonging to `channel`, in selection order. The routing
    /// engine further filters these by health and cooldown.
    #[ must_use ]
    pub fn candidates_for_channel( &self, channel : &str ) -> Vec< Endpoint >
    {
      self.current().candidates_for_channel( channel )
    }

    /// All channels, in failover order.
    #[ must_use ]
    pub fn channels_in_failover_order( &self ) -> Vec< Channel >
    {
      self.current().channels_in_failover_order()
    }

    /// Whether `channel` participates in inter-channel failover.
    #[ must_use ]
    pub fn is_channel_failover_enabled( &self, channel : &str ) -> bool
    {
      self.current().is_channel_failover_enabled( channel )
    }

    /// Subscribe to mutation/reconciliation events. The returned receiver
    /// only ever sees events sent after this call.
    pub fn subscribe( &self ) -> broadcast::Receiver< CatalogEvent >
    {
      self.events.subscribe()
    }

    /// Rebuild the snapshot from storage and broadcast `event`. Mutations
    /// from the service layer call this within the same transaction
    /// boundary as their write so readers never observe a record absent
    /// from the catalog but present in storage; the periodic reconciler
    /// calls it on a timer to correct external drift.
    ///
    /// # Errors
    ///
    /// Returns an error if either store's list query fails.
    pub async fn update_from_persistence( &self, channels : &ChannelStore, endpoints : &EndpointStore, event : CatalogEvent ) -> RelayResult< () >
    {
      let channel_rows = channels.list().await?;
      let endpoint_rows = endpoints.list().await?;
      let fresh = CatalogSnapshot::build( channel_rows, endpoint_rows );
      *self.snapshot.write() = Arc::new( fresh );
      let _ignored = self.events.send( event );
      Ok( () )
    }

    /// Run periodic reconciliation against `channels`/`endpoints` every
    /// `interval`, until `cancel` fires. Intended grace : at most one
    /// second of drift between an external edit and its reflection here.
    pub async fn run_reconciler( &self, channels : &ChannelStore, endpoints : &EndpointStore, interval : core::time::Duration, cancel : CancellationToken )
    {
      let mut ticker = tokio::time::interval( interval );
      loop
      {
        tokio::select!
        {
          () = cancel.cancelled() => break,
          _ = ticker.tick() =>
          {
            if let Err( error ) = self.update_from_persistence( channels, endpoints, CatalogEvent::Reconciled ).await
            {
              tracing::warn!( %error, "catalog reconciliation failed" );
            }
          }
        }
      }
    }
  }

  #[ cfg( test ) ]
  mod tests
  {
    use super::*;
    use relay_persistence::{ ChannelStore, EndpointStore, NewChannel, NewEndpoint };

    async fn memory_pool() -> sqlx::SqlitePool
    {
      let pool = sqlx::SqlitePool::connect( "sqlite::memory:" ).await.unwrap();
      relay_persistence::migrate( &pool ).await.unwrap();
      pool
    }

    #[ tokio::test ]
    async fn empty_catalog_has_no_candidates()
    {
      let catalog = Catalog::new();
      assert!( catalog.candidates_for_channel( "primary" ).is_empty() );
      assert!( catalog.channels_in_failover_order().is_empty() );
    }

    #[ tokio::test ]
    async fn update_from_persistence_picks_up_rows_and_broadcasts()
    {
      let pool = memory_pool().await;
      let channels = ChannelStore::new( pool.clone() );
      let endpoints = EndpointStore::new( pool );
      channels.create( NewChannel { name : "primary".to_string(), website : None, priority : 0, participates_in_channel_failover : true } ).await.unwrap();
      endpoints.create( NewEndpoint::with_defaults( "primary".to_string(), "ep1".to_string(), "http://upstream.invalid".to_string() ) ).await.unwrap();

      let catalog = Catalog::new();
      let mut receiver = catalog.subscribe();
      catalog.update_from_persistence( &channels, &endpoints, CatalogEvent::Mutated ).await.unwrap();

      assert_eq!( catalog.channels_in_failover_order().len(), 1 );
      assert_eq!( catalog.candidates_for_channel( "primary" ).len(), 1 );
      assert_eq!( receiver.recv().await.unwrap(), CatalogEvent::Mutated );
    }

    #[ tokio::test ]
    async fn reconciler_stops_on_cancellation()
    {
      let pool = memory_pool().await;
      let channels = ChannelStore::new( pool.clone() );
      let endpoints = EndpointStore::new( pool );
      let catalog = Catalog::new();
      let cancel = CancellationToken::new();
      cancel.cancel();
      catalog.run_reconciler( &channels, &endpoints, core::time::Duration::from_millis( 10 ), cancel ).await;
    }
  }
}

crate::mod_interface!
{
  exposed use Catalog;
}
