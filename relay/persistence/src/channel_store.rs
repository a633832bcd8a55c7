//! Channel CRUD

mod private
{
  use crate::time::{ format_for_storage, parse_lenient };
  use crate::txn::StoreTxn;
  use relay_types::{ Channel, RelayError, RelayResult };
  use serde::Deserialize;
  use sqlx::sqlite::SqliteRow;
  use sqlx::{ Row, SqliteExecutor, SqlitePool };
  use tokio::sync::Mutex;

  /// Fields needed to create a channel.
  #[ derive( Debug, Clone, Deserialize ) ]
  pub struct NewChannel
  {
    /// See [`Channel::name`].
    pub name : String,
    /// See [`Channel::website`].
    pub website : Option< String >,
    /// See [`Channel::priority`].
    pub priority : i32,
    /// See [`Channel::participates_in_channel_failover`].
    pub participates_in_channel_failover : bool,
  }

  fn row_to_channel( row : SqliteRow ) -> RelayResult< Channel >
  {
    let err = | e : sqlx::Error | RelayError::StorageFatal { detail : e.to_string() };
    let created_at_raw : String = row.try_get( "created_at" ).map_err( err )?;
    let updated_at_raw : String = row.try_get( "updated_at" ).map_err( err )?;
    Ok( Channel
    {
      id : row.try_get( "id" ).map_err( err )?,
      name : row.try_get( "name" ).map_err( err )?,
      website : row.try_get( "website" ).map_err( err )?,
      priority : row.try_get( "priority" ).map_err( err )?,
      participates_in_channel_failover : row.try_get( "participates_in_channel_failover" ).map_err( err )?,
      created_at : parse_lenient( &created_at_raw ),
      updated_at : parse_lenient( &updated_at_raw ),
    } )
  }

  async fn create_row< 'e, E : SqliteExecutor< 'e > >( executor : E, new : &NewChannel ) -> Result< SqliteRow, sqlx::Error >
  {
    let now = format_for_storage( chrono::Utc::now() );
    sqlx::query(
      "INSERT INTO channels ( name, website, priority, participates_in_channel_failover, created_at, updated_at )
       VALUES ( ?,?,?,?,?,? ) RETURNING *" )
      .bind( &new.name )
      .bind( &new.website )
      .bind( new.priority )
      .bind( new.participates_in_channel_failover )
      .bind( &now )
      .bind( &now )
      .fetch_one( executor )
      .await
  }

  async fn get_row( pool : &SqlitePool, id : i64 ) -> Result< Option< SqliteRow >, sqlx::Error >
  {
    sqlx::query( "SELECT * FROM channels WHERE id = ?" )
      .bind( id )
      .fetch_optional( pool )
      .await
  }

  async fn get_by_name_row( pool : &SqlitePool, name : &str ) -> Result< Option< SqliteRow >, sqlx::Error >
  {
    sqlx::query( "SELECT * FROM channels WHERE name = ?" )
      .bind( name )
      .fetch_optional( pool )
      .await
  }

  async fn list_rows( pool : &SqlitePool ) -> Result< Vec< SqliteRow >, sqlx::Error >
  {
    sqlx::query( "SELECT * FROM channels ORDER BY priority, created_at DESC, name" )
      .fetch_all( pool )
      .await
  }

  async fn delete_row< 'e, E : SqliteExecutor< 'e > >( executor : E, id : i64 ) -> Result< (), sqlx::Error >
  {
    sqlx::query( "DELETE FROM channels WHERE id = ?" )
      .bind( id )
      .execute( executor )
      .await
      .map( | _ | () )
  }

  /// CRUD access to the `channels` table.
  #[ derive( Debug ) ]
  pub struct ChannelStore
  {
    pool : SqlitePool,
    write_lock : Mutex< () >,
  }

  impl ChannelStore
  {
    /// Wrap `pool` as a channel store.
    #[ must_use ]
    pub fn new( pool : SqlitePool ) -> Self
    {
      Self { pool, write_lock : Mutex::new( () ) }
    }

    /// Create a channel.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::ConfigInvalid`] if the name is already taken.
    pub async fn create( &self, new : NewChannel ) -> RelayResult< Channel >
    {
      let _guard = self.write_lock.lock().await;
      let existing = crate::pool::busy_retry( 5, || get_by_name_row( &self.pool, &new.name ) ).await?;
      if existing.is_some()
      {
        return Err( RelayError::ConfigInvalid { detail : format!( "channel '{}' already exists", new.name ) } );
      }
      let row = crate::pool::busy_retry( 5, || create_row( &self.pool, &new ) ).await?;
      row_to_channel( row )
    }

    /// Fetch by primary key.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::StorageFatal`]/[`RelayError::StorageBusy`] on database failure.
    pub async fn get( &self, id : i64 ) -> RelayResult< Option< Channel > >
    {
      crate::pool::busy_retry( 5, || get_row( &self.pool, id ) ).await?
        .map( row_to_channel )
        .transpose()
    }

    /// Fetch by name.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::StorageFatal`]/[`RelayError::StorageBusy`] on database failure.
    pub async fn get_by_name( &self, name : &str ) -> RelayResult< Option< Channel > >
    {
      crate::pool::busy_retry( 5, || get_by_name_row( &self.pool, name ) ).await?
        .map( row_to_channel )
        .transpose()
    }

    /// List every channel, ordered `(priority asc, created_at desc, name asc)`.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::StorageFatal`]/[`RelayError::StorageBusy`] on database failure.
    pub async fn list( &self ) -> RelayResult< Vec< Channel > >
    {
      let rows = crate::pool::busy_retry( 5, || list_rows( &self.pool ) ).await?;
      rows.into_iter().map( row_to_channel ).collect()
    }

    /// Replace a channel's mutable fields in place, bumping `updated_at`.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::ConfigInvalid`] if the channel does not exist
    /// or the new name collides with a different channel.
    pub async fn update( &self, id : i64, new : NewChannel ) -> RelayResult< Channel >
    {
      let _guard = self.write_lock.lock().await;
      if crate::pool::busy_retry( 5, || get_row( &self.pool, id ) ).await?.is_none()
      {
        return Err( RelayError::ConfigInvalid { detail : format!( "channel {id} does not exist" ) } );
      }
      if let Some( existing ) = crate::pool::busy_retry( 5, || get_by_name_row( &self.pool, &new.name ) ).await?
      {
        let existing = row_to_channel( existing )?;
        if existing.id != id
        {
          return Err( RelayError::ConfigInvalid { detail : format!( "channel '{}' already exists", new.name ) } );
        }
      }

      let now = format_for_storage( chrono::Utc::now() );
      crate::pool::busy_retry( 5, ||
      {
        let new = new.clone();
        let now = now.clone();
        async move
        {
          sqlx::query(
            "UPDATE channels SET name=?, website=?, priority=?, participates_in_channel_failover=?, updated_at=? WHERE id=?" )
            .bind( new.name )
            .bind( new.website )
            .bind( new.priority )
            .bind( new.participates_in_channel_failover )
            .bind( now )
            .bind( id )
            .execute( &self.pool )
            .await
        }
      } ).await
      .map_err( | e : sqlx::Error | RelayError::StorageFatal { detail : e.to_string() } )?;

      crate::pool::busy_retry( 5, || get_row( &self.pool, id ) ).await?
        .map( row_to_channel )
        .transpose()?
        .ok_or_else( || RelayError::StorageFatal { detail : "channel vanished mid-update".to_string() } )
    }

    /// Delete by primary key. Cascading endpoint deletion, if requested, is
    /// the caller's responsibility (see `relay-catalog`'s channel service).
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::StorageFatal`]/[`RelayError::StorageBusy`] on database failure.
    pub async fn delete( &self, id : i64 ) -> RelayResult< () >
    {
      let _guard = self.write_lock.lock().await;
      crate::pool::busy_retry( 5, || delete_row( &self.pool, id ) ).await
    }

    /// Begin a transaction for batching writes across stores.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::StorageFatal`] if a connection cannot be acquired.
    pub async fn with_transaction( &self ) -> RelayResult< StoreTxn >
    {
      StoreTxn::begin( &self.pool ).await
    }

    /// Create a channel within an already-open transaction.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::StorageFatal`] on database failure.
    pub async fn create_in_txn( &self, txn : &mut StoreTxn, new : &NewChannel ) -> RelayResult< Channel >
    {
      let row = create_row( &mut *txn.inner, new ).await
        .map_err( | e | RelayError::StorageFatal { detail : e.to_string() } )?;
      row_to_channel( row )
    }
  }

  #[ cfg( test ) ]
  mod tests
  {
    use super::*;

    async fn store() -> ChannelStore
    {
      let pool = sqlx::SqlitePool::connect( "sqlite::memory:" ).await.unwrap();
      crate::schema::migrate( &pool ).await.unwrap();
      ChannelStore::new( pool )
    }

    #[ tokio::test ]
    async fn create_then_list_round_trips()
    {
      let store = store().await;
      store.create( NewChannel { name : "primary".into(), website : None, priority : 1, participates_in_channel_failover : true } ).await.unwrap();
      let channels = store.list().await.unwrap();
      assert_eq!( channels.len(), 1 );
      assert_eq!( channels[ 0 ].name, "primary" );
    }

    #[ tokio::test ]
    async fn duplicate_name_is_rejected()
    {
      let store = store().await;
      store.create( NewChannel { name : "primary".into(), website : None, priority : 1, participates_in_channel_failover : true } ).await.unwrap();
      let result = store.create( NewChannel { name : "primary".into(), website : None, priority : 2, participates_in_channel_failover : true } ).await;
      assert!( result.is_err() );
    }

    #[ tokio::test ]
    async fn update_changes_fields_in_place()
    {
      let store = store().await;
      let created = store.create( NewChannel { name : "primary".into(), website : None, priority : 1, participates_in_channel_failover : true } ).await.unwrap();
      let updated = store.update( created.id, NewChannel { name : "primary".into(), website : Some( "https://example.test".into() ), priority : 5, participates_in_channel_failover : false } ).await.unwrap();
      assert_eq!( updated.priority, 5 );
      assert!( !updated.participates_in_channel_failover );
    }

    #[ tokio::test ]
    async fn delete_removes_the_row()
    {
      let store = store().await;
      let created = store.create( NewChannel { name : "primary".into(), website : None, priority : 1, participates_in_channel_failover : true } ).await.unwrap();
      store.delete( created.id ).await.unwrap();
      assert!( store.get( created.id ).await.unwrap().is_none() );
    }
  }
}

crate::mod_interface!
{
  exposed use
  {
    NewChannel,
    ChannelStore,
  };
}
