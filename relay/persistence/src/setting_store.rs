//! Setting CRUD
//!
//! Raw `(category, key)` storage only. Typed accessors and hot-reload
//! notification live in the settings service, which layers on top of
//! this store.

mod private
{
  use crate::time::{ format_for_storage, parse_lenient };
  use crate::txn::StoreTxn;
  use relay_types::{ RelayError, RelayResult, Setting, SettingValueType };
  use sqlx::sqlite::SqliteRow;
  use sqlx::{ Row, SqliteExecutor, SqlitePool };
  use tokio::sync::Mutex;

  fn value_type_to_str( value_type : SettingValueType ) -> &'static str
  {
    match value_type
    {
      SettingValueType::String => "string",
      SettingValueType::Int => "int",
      SettingValueType::Float => "float",
      SettingValueType::Bool => "bool",
      SettingValueType::Duration => "duration",
      SettingValueType::Password => "password",
      SettingValueType::Json => "json",
    }
  }

  fn value_type_from_str( raw : &str ) -> RelayResult< SettingValueType >
  {
    match raw
    {
      "string" => Ok( SettingValueType::String ),
      "int" => Ok( SettingValueType::Int ),
      "float" => Ok( SettingValueType::Float ),
      "bool" => Ok( SettingValueType::Bool ),
      "duration" => Ok( SettingValueType::Duration ),
      "password" => Ok( SettingValueType::Password ),
      "json" => Ok( SettingValueType::Json ),
      other => Err( RelayError::StorageFatal { detail : format!( "unknown setting value_type '{other}'" ) } ),
    }
  }

  fn row_to_setting( row : SqliteRow ) -> RelayResult< Setting >
  {
    let err = | e : sqlx::Error | RelayError::StorageFatal { detail : e.to_string() };
    let value_type_raw : String = row.try_get( "value_type" ).map_err( err )?;
    let created_at_raw : String = row.try_get( "created_at" ).map_err( err )?;
    let updated_at_raw : String = row.try_get( "updated_at" ).map_err( err )?;
    Ok( Setting
    {
      category : row.try_get( "category" ).map_err( err )?,
      key : row.try_get( "key" ).map_err( err )?,
      value : row.try_get( "value" ).map_err( err )?,
      value_type : value_type_from_str( &value_type_raw )?,
      label : row.try_get( "label" ).map_err( err )?,
      description : row.try_get( "description" ).map_err( err )?,
      display_order : row.try_get( "display_order" ).map_err( err )?,
      requires_restart : row.try_get( "requires_restart" ).map_err( err )?,
      created_at : parse_lenient( &created_at_raw ),
      updated_at : parse_lenient( &updated_at_raw ),
    } )
  }

  async fn upsert_row< 'e, E : SqliteExecutor< 'e > >( executor : E, setting : &Setting ) -> Result< SqliteRow, sqlx::Error >
  {
    let now = format_for_storage( chrono::Utc::now() );
    sqlx::query(
      "INSERT INTO settings
       ( category, key, value, value_type, label, description, display_order, requires_restart, created_at, updated_at )
       VALUES ( ?,?,?,?,?,?,?,?,?,? )
       ON CONFLICT( category, key ) DO UPDATE SET
         value = excluded.value,
         value_type = excluded.value_type,
         label = excluded.label,
         description = excluded.description,
         display_order = excluded.display_order,
         requires_restart = excluded.requires_restart,
         updated_at = excluded.updated_at
       RETURNING *" )
      .bind( &setting.category )
      .bind( &setting.key )
      .bind( &setting.value )
      .bind( value_type_to_str( setting.value_type ) )
      .bind( &setting.label )
      .bind( &setting.description )
      .bind( setting.display_order )
      .bind( setting.requires_restart )
      .bind( &now )
      .bind( &now )
      .fetch_one( executor )
      .await
  }

  async fn get_row( pool : &SqlitePool, category : &str, key : &str ) -> Result< Option< SqliteRow >, sqlx::Error >
  {
    sqlx::query( "SELECT * FROM settings WHERE category = ? AND key = ?" )
      .bind( category )
      .bind( key )
      .fetch_optional( pool )
      .await
  }

  async fn list_rows( pool : &SqlitePool ) -> Result< Vec< SqliteRow >, sqlx::Error >
  {
    sqlx::query( "SELECT * FROM settings ORDER BY category, display_order, key" )
      .fetch_all( pool )
      .await
  }

  async fn list_by_category_rows( pool : &SqlitePool, category : &str ) -> Result< Vec< SqliteRow >, sqlx::Error >
  {
    sqlx::query( "SELECT * FROM settings WHERE category = ? ORDER BY display_order, key" )
      .bind( category )
      .fetch_all( pool )
      .await
  }

  async fn delete_row< 'e, E : SqliteExecutor< 'e > >( executor : E, category : &str, key : &str ) -> Result< (), sqlx::Error >
  {
    sqlx::query( "DELETE FROM settings WHERE category = ? AND key = ?" )
      .bind( category )
      .bind( key )
      .execute( executor )
      .await
      .map( | _ | () )
  }

  async fn delete_category_row< 'e, E : SqliteExecutor< 'e > >( executor : E, category : &str ) -> Result< (), sqlx::Error >
  {
    sqlx::query( "DELETE FROM settings WHERE category = ?" )
      .bind( category )
      .execute( executor )
      .await
      .map( | _ | () )
  }

  /// CRUD access to the `settings` table.
  #[ derive( Debug ) ]
  pub struct SettingStore
  {
    pool : SqlitePool,
    write_lock : Mutex< () >,
  }

  impl SettingStore
  {
    /// Wrap `pool` as a setting store.
    #[ must_use ]
    pub fn new( pool : SqlitePool ) -> Self
    {
      Self { pool, write_lock : Mutex::new( () ) }
    }

    /// Insert or replace the `(category, key)` row.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::StorageFatal`]/[`RelayError::StorageBusy`] on database failure.
    pub async fn upsert( &self, setting : Setting ) -> RelayResult< Setting >
    {
      let _guard = self.write_lock.lock().await;
      let row = crate::pool::busy_retry( 5, || upsert_row( &self.pool, &setting ) ).await?;
      row_to_setting( row )
    }

    /// Fetch a single setting.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::StorageFatal`]/[`RelayError::StorageBusy`] on database failure.
    pub async fn get( &self, category : &str, key : &str ) -> RelayResult< Option< Setting > >
    {
      crate::pool::busy_retry( 5, || get_row( &self.pool, category, key ) ).await?
        .map( row_to_setting )
        .transpose()
    }

    /// List every setting, ordered `(category, display_order, key)`.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::StorageFatal`]/[`RelayError::StorageBusy`] on database failure.
    pub async fn list( &self ) -> RelayResult< Vec< Setting > >
    {
      let rows = crate::pool::busy_retry( 5, || list_rows( &self.pool ) ).await?;
      rows.into_iter().map( row_to_setting ).collect()
    }

    /// List every setting in one category, ordered `(display_order, key)`.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::StorageFatal`]/[`RelayError::StorageBusy`] on database failure.
    pub async fn list_by_category( &self, category : &str ) -> RelayResult< Vec< Setting > >
    {
      let rows = crate::pool::busy_retry( 5, || list_by_category_rows( &self.pool, category ) ).await?;
      rows.into_iter().map( row_to_setting ).collect()
    }

    /// Delete a single setting. A delete of an unknown key is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::StorageFatal`]/[`RelayError::StorageBusy`] on database failure.
    pub async fn delete( &self, category : &str, key : &str ) -> RelayResult< () >
    {
      let _guard = self.write_lock.lock().await;
      crate::pool::busy_retry( 5, || delete_row( &self.pool, category, key ) ).await
    }

    /// Delete every setting in a category — used to implement the settings
    /// service's `reset_category` to defaults (caller re-seeds afterward).
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::StorageFatal`]/[`RelayError::StorageBusy`] on database failure.
    pub async fn delete_category( &self, category : &str ) -> RelayResult< () >
    {
      let _guard = self.write_lock.lock().await;
      crate::pool::busy_retry( 5, || delete_category_row( &self.pool, category ) ).await
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

    /// Insert or replace as part of an already-open transaction, used by
    /// the settings service's `update_and_apply` to batch several rows
    /// into one commit followed by a single broadcast.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::StorageFatal`] on database failure.
    pub async fn upsert_in_txn( &self, txn : &mut StoreTxn, setting : Setting ) -> RelayResult< Setting >
    {
      let row = upsert_row( &mut *txn.inner, &setting ).await
        .map_err( | e | RelayError::StorageFatal { detail : e.to_string() } )?;
      row_to_setting( row )
    }

    /// Delete every setting in a category as part of an already-open
    /// transaction, used by `reset_category` to delete-then-reseed
    /// atomically.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::StorageFatal`] on database failure.
    pub async fn delete_category_in_txn( &self, txn : &mut StoreTxn, category : &str ) -> RelayResult< () >
    {
      delete_category_row( &mut *txn.inner, category ).await
        .map_err( | e | RelayError::StorageFatal { detail : e.to_string() } )
    }
  }

  #[ cfg( test ) ]
  mod tests
  {
    use super::*;

    async fn store() -> SettingStore
    {
      let pool = sqlx::SqlitePool::connect( "sqlite::memory:" ).await.unwrap();
      crate::schema::migrate( &pool ).await.unwrap();
      SettingStore::new( pool )
    }

    fn sample() -> Setting
    {
      Setting
      {
        category : "retry".to_string(),
        key : "max_attempts".to_string(),
        value : "5".to_string(),
        value_type : SettingValueType::Int,
        label : "Max attempts".to_string(),
        description : String::new(),
        display_order : 0,
        requires_restart : false,
        created_at : chrono::DateTime::< chrono::Utc >::UNIX_EPOCH,
        updated_at : chrono::DateTime::< chrono::Utc >::UNIX_EPOCH,
      }
    }

    #[ tokio::test ]
    async fn upsert_then_get_round_trips()
    {
      let store = store().await;
      store.upsert( sample() ).await.unwrap();
      let fetched = store.get( "retry", "max_attempts" ).await.unwrap().unwrap();
      assert_eq!( fetched.value, "5" );
      assert_eq!( fetched.value_type, SettingValueType::Int );
    }

    #[ tokio::test ]
    async fn upsert_updates_value_in_place()
    {
      let store = store().await;
      store.upsert( sample() ).await.unwrap();
      let mut updated = sample();
      updated.value = "8".to_string();
      store.upsert( updated ).await.unwrap();
      assert_eq!( store.list().await.unwrap().len(), 1 );
      assert_eq!( store.get( "retry", "max_attempts" ).await.unwrap().unwrap().value, "8" );
    }

    #[ tokio::test ]
    async fn list_by_category_filters()
    {
      let store = store().await;
      store.upsert( sample() ).await.unwrap();
      let mut other = sample();
      other.category = "failover".to_string();
      store.upsert( other ).await.unwrap();
      assert_eq!( store.list_by_category( "retry" ).await.unwrap().len(), 1 );
    }

    #[ tokio::test ]
    async fn delete_category_clears_every_key_in_it()
    {
      let store = store().await;
      store.upsert( sample() ).await.unwrap();
      let mut second = sample();
      second.key = "base_delay_ms".to_string();
      store.upsert( second ).await.unwrap();
      store.delete_category( "retry" ).await.unwrap();
      assert!( store.list().await.unwrap().is_empty() );
    }
  }
}

crate::mod_interface!
{
  exposed use SettingStore;
}
