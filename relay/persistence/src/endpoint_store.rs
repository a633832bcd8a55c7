//! Endpoint CRUD
//!
//! Endpoint names are unique *within* a channel; two endpoints in
//! different channels may share a name. Service-layer validation — not a
//! database constraint alone — rejects updates that would violate this,
//! because legacy schemas may lack the constraint.

mod private
{
  use crate::time::{ format_for_storage, parse_lenient };
  use crate::txn::StoreTxn;
  use relay_types::{ Endpoint, RelayError, RelayResult };
  use serde::Deserialize;
  use sqlx::sqlite::SqliteRow;
  use sqlx::{ Row, SqliteExecutor, SqlitePool };
  use std::collections::BTreeMap;
  use tokio::sync::Mutex;

  /// Fields needed to create an endpoint; `id`/timestamps are assigned by
  /// the store.
  #[ derive( Debug, Clone, Deserialize ) ]
  pub struct NewEndpoint
  {
    /// See [`Endpoint::channel`].
    pub channel : String,
    /// See [`Endpoint::name`].
    pub name : String,
    /// See [`Endpoint::url`].
    pub url : String,
    /// See [`Endpoint::bearer_token`].
    pub bearer_token : Option< String >,
    /// See [`Endpoint::api_key`].
    pub api_key : Option< String >,
    /// See [`Endpoint::custom_headers`].
    pub custom_headers : BTreeMap< String, String >,
    /// See [`Endpoint::priority`].
    pub priority : i32,
    /// See [`Endpoint::participates_in_failover`].
    pub participates_in_failover : bool,
    /// See [`Endpoint::cooldown_seconds`].
    pub cooldown_seconds : Option< u64 >,
    /// See [`Endpoint::timeout_seconds`].
    pub timeout_seconds : u64,
    /// See [`Endpoint::supports_token_counting`].
    pub supports_token_counting : bool,
    /// See [`Endpoint::cost_multiplier_overall`].
    pub cost_multiplier_overall : f64,
    /// See [`Endpoint::cost_multiplier_input`].
    pub cost_multiplier_input : f64,
    /// See [`Endpoint::cost_multiplier_output`].
    pub cost_multiplier_output : f64,
    /// See [`Endpoint::cost_multiplier_cache_creation_5m`].
    pub cost_multiplier_cache_creation_5m : f64,
    /// See [`Endpoint::cost_multiplier_cache_creation_1h`].
    pub cost_multiplier_cache_creation_1h : f64,
    /// See [`Endpoint::cost_multiplier_cache_read`].
    pub cost_multiplier_cache_read : f64,
    /// See [`Endpoint::enabled`].
    pub enabled : bool,
  }

  impl NewEndpoint
  {
    /// An endpoint with every cost multiplier and the timeout at their
    /// documented defaults.
    #[ must_use ]
    pub fn with_defaults( channel : String, name : String, url : String ) -> Self
    {
      Self
      {
        channel,
        name,
        url,
        bearer_token : None,
        api_key : None,
        custom_headers : BTreeMap::new(),
        priority : 0,
        participates_in_failover : true,
        cooldown_seconds : None,
        timeout_seconds : Endpoint::DEFAULT_TIMEOUT_SECONDS,
        supports_token_counting : true,
        cost_multiplier_overall : 1.0,
        cost_multiplier_input : 1.0,
        cost_multiplier_output : 1.0,
        cost_multiplier_cache_creation_5m : 1.0,
        cost_multiplier_cache_creation_1h : 1.0,
        cost_multiplier_cache_read : 1.0,
        enabled : true,
      }
    }
  }

  fn row_to_endpoint( row : SqliteRow ) -> RelayResult< Endpoint >
  {
    let err = | e : sqlx::Error | RelayError::StorageFatal { detail : e.to_string() };
    let headers_json : String = row.try_get( "custom_headers" ).map_err( err )?;
    let custom_headers : BTreeMap< String, String > = serde_json::from_str( &headers_json ).unwrap_or_default();

    let created_at_raw : String = row.try_get( "created_at" ).map_err( err )?;
    let updated_at_raw : String = row.try_get( "updated_at" ).map_err( err )?;

    Ok( Endpoint
    {
      id : row.try_get( "id" ).map_err( err )?,
      channel : row.try_get( "channel" ).map_err( err )?,
      name : row.try_get( "name" ).map_err( err )?,
      url : row.try_get( "url" ).map_err( err )?,
      bearer_token : row.try_get( "bearer_token" ).map_err( err )?,
      api_key : row.try_get( "api_key" ).map_err( err )?,
      custom_headers,
      priority : row.try_get( "priority" ).map_err( err )?,
      participates_in_failover : row.try_get( "participates_in_failover" ).map_err( err )?,
      cooldown_seconds : row.try_get::< Option< i64 >, _ >( "cooldown_seconds" ).map_err( err )?.map( | v | v as u64 ),
      timeout_seconds : row.try_get::< i64, _ >( "timeout_seconds" ).map_err( err )? as u64,
      supports_token_counting : row.try_get( "supports_token_counting" ).map_err( err )?,
      cost_multiplier_overall : row.try_get( "cost_multiplier_overall" ).map_err( err )?,
      cost_multiplier_input : row.try_get( "cost_multiplier_input" ).map_err( err )?,
      cost_multiplier_output : row.try_get( "cost_multiplier_output" ).map_err( err )?,
      cost_multiplier_cache_creation_5m : row.try_get( "cost_multiplier_cache_creation_5m" ).map_err( err )?,
      cost_multiplier_cache_creation_1h : row.try_get( "cost_multiplier_cache_creation_1h" ).map_err( err )?,
      cost_multiplier_cache_read : row.try_get( "cost_multiplier_cache_read" ).map_err( err )?,
      enabled : row.try_get( "enabled" ).map_err( err )?,
      created_at : parse_lenient( &created_at_raw ),
      updated_at : parse_lenient( &updated_at_raw ),
    } )
  }

  /// Raw insert, returning the inserted row. Generic over the executor so
  /// callers can run it against the pool directly (wrapped in busy-retry)
  /// or against an open [`StoreTxn`].
  async fn create_row< 'e, E : SqliteExecutor< 'e > >( executor : E, new : &NewEndpoint ) -> Result< SqliteRow, sqlx::Error >
  {
    let now = format_for_storage( chrono::Utc::now() );
    let headers = serde_json::to_string( &new.custom_headers ).unwrap_or_else( | _ | "{}".to_string() );
    sqlx::query(
      "INSERT INTO endpoints
       ( channel, name, url, bearer_token, api_key, custom_headers, priority,
         participates_in_failover, cooldown_seconds, timeout_seconds,
         supports_token_counting, cost_multiplier_overall, cost_multiplier_input,
         cost_multiplier_output, cost_multiplier_cache_creation_5m,
         cost_multiplier_cache_creation_1h, cost_multiplier_cache_read, enabled,
         created_at, updated_at )
       VALUES ( ?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,? )
       RETURNING *" )
      .bind( &new.channel )
      .bind( &new.name )
      .bind( &new.url )
      .bind( &new.bearer_token )
      .bind( &new.api_key )
      .bind( headers )
      .bind( new.priority )
      .bind( new.participates_in_failover )
      .bind( new.cooldown_seconds.map( | v | v as i64 ) )
      .bind( new.timeout_seconds as i64 )
      .bind( new.supports_token_counting )
      .bind( new.cost_multiplier_overall )
      .bind( new.cost_multiplier_input )
      .bind( new.cost_multiplier_output )
      .bind( new.cost_multiplier_cache_creation_5m )
      .bind( new.cost_multiplier_cache_creation_1h )
      .bind( new.cost_multiplier_cache_read )
      .bind( new.enabled )
      .bind( &now )
      .bind( &now )
      .fetch_one( executor )
      .await
  }

  async fn get_row( pool : &SqlitePool, id : i64 ) -> Result< Option< SqliteRow >, sqlx::Error >
  {
    sqlx::query( "SELECT * FROM endpoints WHERE id = ?" )
      .bind( id )
      .fetch_optional( pool )
      .await
  }

  async fn get_by_name_row( pool : &SqlitePool, channel : &str, name : &str ) -> Result< Option< SqliteRow >, sqlx::Error >
  {
    sqlx::query( "SELECT * FROM endpoints WHERE channel = ? AND name = ?" )
      .bind( channel )
      .bind( name )
      .fetch_optional( pool )
      .await
  }

  async fn list_rows( pool : &SqlitePool ) -> Result< Vec< SqliteRow >, sqlx::Error >
  {
    sqlx::query( "SELECT * FROM endpoints ORDER BY channel, priority, created_at DESC, name" )
      .fetch_all( pool )
      .await
  }

  async fn delete_row< 'e, E : SqliteExecutor< 'e > >( executor : E, id : i64 ) -> Result< (), sqlx::Error >
  {
    sqlx::query( "DELETE FROM endpoints WHERE id = ?" )
      .bind( id )
      .execute( executor )
      .await
      .map( | _ | () )
  }

  /// CRUD access to the `endpoints` table, serializing writes per store
  /// instance while allowing concurrent reads.
  #[ derive( Debug ) ]
  pub struct EndpointStore
  {
    pool : SqlitePool,
    write_lock : Mutex< () >,
  }

  impl EndpointStore
  {
    /// Wrap `pool` as an endpoint store.
    #[ must_use ]
    pub fn new( pool : SqlitePool ) -> Self
    {
      Self { pool, write_lock : Mutex::new( () ) }
    }

    async fn get_by_name_typed( &self, channel : &str, name : &str ) -> RelayResult< Option< Endpoint > >
    {
      crate::pool::busy_retry( 5, || get_by_name_row( &self.pool, channel, name ) ).await?
        .map( row_to_endpoint )
        .transpose()
    }

    /// Reject a create/update that would produce two endpoints sharing
    /// `(channel, name)`.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::ConfigInvalid`] with the message
    /// `"endpoint name must be unique within a channel"` on conflict.
    pub async fn check_name_unique( &self, channel : &str, name : &str, excluding_id : Option< i64 > ) -> RelayResult< () >
    {
      if let Some( existing ) = self.get_by_name_typed( channel, name ).await?
      {
        if Some( existing.id ) != excluding_id
        {
          return Err( RelayError::ConfigInvalid
          {
            detail : "endpoint name must be unique within a channel".to_string(),
          } );
        }
      }
      Ok( () )
    }

    /// Create a new endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::ConfigInvalid`] on a name collision within the
    /// channel, or [`RelayError::StorageFatal`]/[`RelayError::StorageBusy`]
    /// on database failure.
    pub async fn create( &self, new : NewEndpoint ) -> RelayResult< Endpoint >
    {
      let _guard = self.write_lock.lock().await;
      self.check_name_unique( &new.channel, &new.name, None ).await?;
      let row = crate::pool::busy_retry( 5, || create_row( &self.pool, &new ) ).await?;
      row_to_endpoint( row )
    }

    /// Fetch by primary key.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::StorageFatal`]/[`RelayError::StorageBusy`] on
    /// database failure.
    pub async fn get( &self, id : i64 ) -> RelayResult< Option< Endpoint > >
    {
      crate::pool::busy_retry( 5, || get_row( &self.pool, id ) ).await?
        .map( row_to_endpoint )
        .transpose()
    }

    /// Fetch by `(channel, name)`.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::StorageFatal`]/[`RelayError::StorageBusy`] on
    /// database failure.
    pub async fn get_by_name( &self, channel : &str, name : &str ) -> RelayResult< Option< Endpoint > >
    {
      self.get_by_name_typed( channel, name ).await
    }

    /// List every endpoint, ordered `(channel, priority asc, created_at
    /// desc, name asc)`.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::StorageFatal`]/[`RelayError::StorageBusy`] on
    /// database failure.
    pub async fn list( &self ) -> RelayResult< Vec< Endpoint > >
    {
      let rows = crate::pool::busy_retry( 5, || list_rows( &self.pool ) ).await?;
      rows.into_iter().map( row_to_endpoint ).collect()
    }

    /// List endpoints belonging to one channel, in the same order as
    /// [`Self::list`].
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::StorageFatal`]/[`RelayError::StorageBusy`] on
    /// database failure.
    pub async fn list_by_channel( &self, channel : &str ) -> RelayResult< Vec< Endpoint > >
    {
      Ok( self.list().await?.into_iter().filter( | e | e.channel == channel ).collect() )
    }

    /// Replace an endpoint's mutable fields in place, bumping `updated_at`.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::ConfigInvalid`] if the endpoint does not exist
    /// or the update would violate within-channel name uniqueness.
    pub async fn update( &self, id : i64, new : NewEndpoint ) -> RelayResult< Endpoint >
    {
      let _guard = self.write_lock.lock().await;
      if crate::pool::busy_retry( 5, || get_row( &self.pool, id ) ).await?.is_none()
      {
        return Err( RelayError::ConfigInvalid { detail : format!( "endpoint {id} does not exist" ) } );
      }
      self.check_name_unique( &new.channel, &new.name, Some( id ) ).await?;

      let now = format_for_storage( chrono::Utc::now() );
      let headers = serde_json::to_string( &new.custom_headers ).unwrap_or_else( | _ | "{}".to_string() );
      crate::pool::busy_retry( 5, ||
      {
        let new = new.clone();
        let headers = headers.clone();
        let now = now.clone();
        async move
        {
          sqlx::query(
            "UPDATE endpoints SET channel=?, name=?, url=?, bearer_token=?, api_key=?,
             custom_headers=?, priority=?, participates_in_failover=?, cooldown_seconds=?,
             timeout_seconds=?, supports_token_counting=?, cost_multiplier_overall=?,
             cost_multiplier_input=?, cost_multiplier_output=?,
             cost_multiplier_cache_creation_5m=?, cost_multiplier_cache_creation_1h=?,
             cost_multiplier_cache_read=?, enabled=?, updated_at=? WHERE id=?" )
            .bind( new.channel )
            .bind( new.name )
            .bind( new.url )
            .bind( new.bearer_token )
            .bind( new.api_key )
            .bind( headers )
            .bind( new.priority )
            .bind( new.participates_in_failover )
            .bind( new.cooldown_seconds.map( | v | v as i64 ) )
            .bind( new.timeout_seconds as i64 )
            .bind( new.supports_token_counting )
            .bind( new.cost_multiplier_overall )
            .bind( new.cost_multiplier_input )
            .bind( new.cost_multiplier_output )
            .bind( new.cost_multiplier_cache_creation_5m )
            .bind( new.cost_multiplier_cache_creation_1h )
            .bind( new.cost_multiplier_cache_read )
            .bind( new.enabled )
            .bind( now )
            .bind( id )
            .execute( &self.pool )
            .await
        }
      } ).await?;

      self.get( id ).await?.ok_or_else( || RelayError::StorageFatal { detail : "endpoint vanished after update".to_string() } )
    }

    /// Delete by primary key. A delete of a nonexistent id is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::StorageFatal`]/[`RelayError::StorageBusy`] on
    /// database failure.
    pub async fn delete( &self, id : i64 ) -> RelayResult< () >
    {
      let _guard = self.write_lock.lock().await;
      crate::pool::busy_retry( 5, || delete_row( &self.pool, id ) ).await
    }

    /// Create many endpoints as one transaction.
    ///
    /// # Errors
    ///
    /// Returns the first [`RelayError`] encountered; no rows are committed
    /// on failure.
    pub async fn batch_create( &self, news : Vec< NewEndpoint > ) -> RelayResult< Vec< Endpoint > >
    {
      let _guard = self.write_lock.lock().await;
      for new in &news
      {
        self.check_name_unique( &new.channel, &new.name, None ).await?;
      }
      let mut txn = StoreTxn::begin( &self.pool ).await?;
      let mut created = Vec::with_capacity( news.len() );
      for new in &news
      {
        let row = create_row( &mut *txn.inner, new ).await
          .map_err( | e | RelayError::StorageFatal { detail : e.to_string() } )?;
        created.push( row_to_endpoint( row )? );
      }
      txn.commit().await?;
      Ok( created )
    }

    /// Delete many endpoints as one transaction.
    ///
    /// # Errors
    ///
    /// Returns the first [`RelayError`] encountered; no rows are committed
    /// on failure.
    pub async fn batch_delete( &self, ids : Vec< i64 > ) -> RelayResult< () >
    {
      let _guard = self.write_lock.lock().await;
      let mut txn = StoreTxn::begin( &self.pool ).await?;
      for id in ids
      {
        delete_row( &mut *txn.inner, id ).await
          .map_err( | e | RelayError::StorageFatal { detail : e.to_string() } )?;
      }
      txn.commit().await
    }

    /// Begin a transaction for batching writes across stores.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::StorageFatal`] if a connection cannot be
    /// acquired.
    pub async fn with_transaction( &self ) -> RelayResult< StoreTxn >
    {
      StoreTxn::begin( &self.pool ).await
    }

    /// Create an endpoint within an already-open transaction.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::StorageFatal`] on database failure.
    pub async fn create_in_txn( &self, txn : &mut StoreTxn, new : &NewEndpoint ) -> RelayResult< Endpoint >
    {
      let row = create_row( &mut *txn.inner, new ).await
        .map_err( | e | RelayError::StorageFatal { detail : e.to_string() } )?;
      row_to_endpoint( row )
    }
  }

  #[ cfg( test ) ]
  mod tests
  {
    use super::*;

    async fn store() -> EndpointStore
    {
      let pool = sqlx::SqlitePool::connect( "sqlite::memory:" ).await.unwrap();
      crate::schema::migrate( &pool ).await.unwrap();
      EndpointStore::new( pool )
    }

    #[ tokio::test ]
    async fn create_then_get_round_trips()
    {
      let store = store().await;
      let created = store.create( NewEndpoint::with_defaults( "primary".into(), "east".into(), "https://e.test".into() ) ).await.unwrap();
      let fetched = store.get( created.id ).await.unwrap().unwrap();
      assert_eq!( fetched.name, "east" );
      assert_eq!( fetched.channel, "primary" );
      assert!( ( fetched.cost_multiplier_overall - 1.0 ).abs() < f64::EPSILON );
    }

    #[ tokio::test ]
    async fn duplicate_name_within_channel_is_rejected()
    {
      let store = store().await;
      store.create( NewEndpoint::with_defaults( "primary".into(), "east".into(), "https://e.test".into() ) ).await.unwrap();
      let result = store.create( NewEndpoint::with_defaults( "primary".into(), "east".into(), "https://other.test".into() ) ).await;
      assert!( result.is_err() );
    }

    #[ tokio::test ]
    async fn same_name_in_different_channels_is_allowed()
    {
      let store = store().await;
      store.create( NewEndpoint::with_defaults( "primary".into(), "east".into(), "https://e.test".into() ) ).await.unwrap();
      let result = store.create( NewEndpoint::with_defaults( "backup".into(), "east".into(), "https://other.test".into() ) ).await;
      assert!( result.is_ok() );
    }

    #[ tokio::test ]
    async fn list_by_channel_filters_correctly()
    {
      let store = store().await;
      store.create( NewEndpoint::with_defaults( "primary".into(), "a".into(), "https://a.test".into() ) ).await.unwrap();
      store.create( NewEndpoint::with_defaults( "backup".into(), "b".into(), "https://b.test".into() ) ).await.unwrap();
      let primary_only = store.list_by_channel( "primary" ).await.unwrap();
      assert_eq!( primary_only.len(), 1 );
      assert_eq!( primary_only[ 0 ].name, "a" );
    }

    #[ tokio::test ]
    async fn delete_removes_the_row()
    {
      let store = store().await;
      let created = store.create( NewEndpoint::with_defaults( "primary".into(), "a".into(), "https://a.test".into() ) ).await.unwrap();
      store.delete( created.id ).await.unwrap();
      assert!( store.get( created.id ).await.unwrap().is_none() );
    }

    #[ tokio::test ]
    async fn batch_create_is_all_or_nothing()
    {
      let store = store().await;
      let news = vec!
      [
        NewEndpoint::with_defaults( "primary".into(), "a".into(), "https://a.test".into() ),
        NewEndpoint::with_defaults( "primary".into(), "a".into(), "https://b.test".into() ),
      ];
      let result = store.batch_create( news ).await;
      assert!( result.is_err() );
      assert!( store.list().await.unwrap().is_empty() );
    }

    #[ tokio::test ]
    async fn update_rejects_unknown_id()
    {
      let store = store().await;
      let result = store.update( 999, NewEndpoint::with_defaults( "primary".into(), "a".into(), "https://a.test".into() ) ).await;
      assert!( result.is_err() );
    }
  }
}

crate::mod_interface!
{
  exposed use
  {
    NewEndpoint,
    EndpointStore,
  };
}
