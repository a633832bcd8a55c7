//! Model pricing CRUD
//!
//! Backs [`relay_types::pricing::attribute_cost`]; keyed by model name
//! rather than a surrogate id since pricing rows are looked up by model,
//! never enumerated by id.

mod private
{
  use crate::txn::StoreTxn;
  use relay_types::{ ModelPricing, RelayError, RelayResult };
  use sqlx::sqlite::SqliteRow;
  use sqlx::{ Row, SqliteExecutor, SqlitePool };
  use tokio::sync::Mutex;

  fn row_to_pricing( row : SqliteRow ) -> RelayResult< ModelPricing >
  {
    let err = | e : sqlx::Error | RelayError::StorageFatal { detail : e.to_string() };
    Ok( ModelPricing
    {
      model : row.try_get( "model" ).map_err( err )?,
      input_price : row.try_get( "input_price" ).map_err( err )?,
      output_price : row.try_get( "output_price" ).map_err( err )?,
      cache_creation_5m_price : row.try_get( "cache_creation_5m_price" ).map_err( err )?,
      cache_creation_1h_price : row.try_get( "cache_creation_1h_price" ).map_err( err )?,
      cache_read_price : row.try_get( "cache_read_price" ).map_err( err )?,
    } )
  }

  async fn upsert_row< 'e, E : SqliteExecutor< 'e > >( executor : E, pricing : &ModelPricing ) -> Result< SqliteRow, sqlx::Error >
  {
    sqlx::query(
      "INSERT INTO model_pricing
       ( model, input_price, output_price, cache_creation_5m_price, cache_creation_1h_price, cache_read_price )
       VALUES ( ?,?,?,?,?,? )
       ON CONFLICT( model ) DO UPDATE SET
         input_price = excluded.input_price,
         output_price = excluded.output_price,
         cache_creation_5m_price = excluded.cache_creation_5m_price,
         cache_creation_1h_price = excluded.cache_creation_1h_price,
         cache_read_price = excluded.cache_read_price
       RETURNING *" )
      .bind( &pricing.model )
      .bind( pricing.input_price )
      .bind( pricing.output_price )
      .bind( pricing.cache_creation_5m_price )
      .bind( pricing.cache_creation_1h_price )
      .bind( pricing.cache_read_price )
      .fetch_one( executor )
      .await
  }

  async fn get_row( pool : &SqlitePool, model : &str ) -> Result< Option< SqliteRow >, sqlx::Error >
  {
    sqlx::query( "SELECT * FROM model_pricing WHERE model = ?" )
      .bind( model )
      .fetch_optional( pool )
      .await
  }

  async fn list_rows( pool : &SqlitePool ) -> Result< Vec< SqliteRow >, sqlx::Error >
  {
    sqlx::query( "SELECT * FROM model_pricing ORDER BY model" )
      .fetch_all( pool )
      .await
  }

  async fn delete_row< 'e, E : SqliteExecutor< 'e > >( executor : E, model : &str ) -> Result< (), sqlx::Error >
  {
    sqlx::query( "DELETE FROM model_pricing WHERE model = ?" )
      .bind( model )
      .execute( executor )
      .await
      .map( | _ | () )
  }

  /// CRUD access to the `model_pricing` table.
  #[ derive( Debug ) ]
  pub struct ModelPricingStore
  {
    pool : SqlitePool,
    write_lock : Mutex< () >,
  }

  impl ModelPricingStore
  {
    /// Wrap `pool` as a model pricing store.
    #[ must_use ]
    pub fn new( pool : SqlitePool ) -> Self
    {
      Self { pool, write_lock : Mutex::new( () ) }
    }

    /// Insert or replace the pricing row for `pricing.model`.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::StorageFatal`]/[`RelayError::StorageBusy`] on database failure.
    pub async fn upsert( &self, pricing : ModelPricing ) -> RelayResult< ModelPricing >
    {
      let _guard = self.write_lock.lock().await;
      let row = crate::pool::busy_retry( 5, || upsert_row( &self.pool, &pricing ) ).await?;
      row_to_pricing( row )
    }

    /// Fetch by model name.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::StorageFatal`]/[`RelayError::StorageBusy`] on database failure.
    pub async fn get( &self, model : &str ) -> RelayResult< Option< ModelPricing > >
    {
      crate::pool::busy_retry( 5, || get_row( &self.pool, model ) ).await?
        .map( row_to_pricing )
        .transpose()
    }

    /// List every known model's pricing, ordered by model name.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::StorageFatal`]/[`RelayError::StorageBusy`] on database failure.
    pub async fn list( &self ) -> RelayResult< Vec< ModelPricing > >
    {
      let rows = crate::pool::busy_retry( 5, || list_rows( &self.pool ) ).await?;
      rows.into_iter().map( row_to_pricing ).collect()
    }

    /// Delete by model name. A delete of an unknown model is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::StorageFatal`]/[`RelayError::StorageBusy`] on database failure.
    pub async fn delete( &self, model : &str ) -> RelayResult< () >
    {
      let _guard = self.write_lock.lock().await;
      crate::pool::busy_retry( 5, || delete_row( &self.pool, model ) ).await
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
  }

  #[ cfg( test ) ]
  mod tests
  {
    use super::*;

    async fn store() -> ModelPricingStore
    {
      let pool = sqlx::SqlitePool::connect( "sqlite::memory:" ).await.unwrap();
      crate::schema::migrate( &pool ).await.unwrap();
      ModelPricingStore::new( pool )
    }

    fn sample( model : &str ) -> ModelPricing
    {
      ModelPricing
      {
        model : model.to_string(),
        input_price : 3.0,
        output_price : 15.0,
        cache_creation_5m_price : 3.75,
        cache_creation_1h_price : 6.0,
        cache_read_price : 0.3,
      }
    }

    #[ tokio::test ]
    async fn upsert_then_get_round_trips()
    {
      let store = store().await;
      store.upsert( sample( "claude-opus-4" ) ).await.unwrap();
      let fetched = store.get( "claude-opus-4" ).await.unwrap().unwrap();
      assert!( ( fetched.output_price - 15.0 ).abs() < f64::EPSILON );
    }

    #[ tokio::test ]
    async fn upsert_replaces_existing_row()
    {
      let store = store().await;
      store.upsert( sample( "claude-opus-4" ) ).await.unwrap();
      let mut updated = sample( "claude-opus-4" );
      updated.output_price = 20.0;
      store.upsert( updated ).await.unwrap();
      let fetched = store.get( "claude-opus-4" ).await.unwrap().unwrap();
      assert!( ( fetched.output_price - 20.0 ).abs() < f64::EPSILON );
      assert_eq!( store.list().await.unwrap().len(), 1 );
    }

    #[ tokio::test ]
    async fn delete_removes_the_row()
    {
      let store = store().await;
      store.upsert( sample( "claude-opus-4" ) ).await.unwrap();
      store.delete( "claude-opus-4" ).await.unwrap();
      assert!( store.get( "claude-opus-4" ).await.unwrap().is_none() );
    }
  }
}

crate::mod_interface!
{
  exposed use ModelPricingStore;
}
