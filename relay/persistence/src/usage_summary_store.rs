//! Usage summary rollup
//!
//! `accumulate` adds one terminal request's contribution to the
//! `(date, model, channel, endpoint)` row, creating it if absent. Callers
//! (the hot pool's archive pipeline) are responsible for invoking this at
//! most once per request — see `RequestRecord`'s "at most one
//! `usage_summary` mutation per record" invariant; this store has no way
//! to detect a duplicate call on its own.

mod private
{
  use relay_types::{ RelayError, RelayResult, TokenCounters, UsageSummary };
  use sqlx::sqlite::SqliteRow;
  use sqlx::{ Row, SqliteExecutor, SqlitePool };
  use tokio::sync::Mutex;

  fn row_to_summary( row : SqliteRow ) -> RelayResult< UsageSummary >
  {
    let err = | e : sqlx::Error | RelayError::StorageFatal { detail : e.to_string() };
    Ok( UsageSummary
    {
      date : row.try_get( "date" ).map_err( err )?,
      model : row.try_get( "model" ).map_err( err )?,
      channel : row.try_get( "channel" ).map_err( err )?,
      endpoint : row.try_get( "endpoint" ).map_err( err )?,
      request_count : row.try_get::< i64, _ >( "request_count" ).map_err( err )? as u64,
      success_count : row.try_get::< i64, _ >( "success_count" ).map_err( err )? as u64,
      error_count : row.try_get::< i64, _ >( "error_count" ).map_err( err )? as u64,
      tokens : TokenCounters
      {
        input : row.try_get::< i64, _ >( "input_tokens" ).map_err( err )? as u64,
        output : row.try_get::< i64, _ >( "output_tokens" ).map_err( err )? as u64,
        cache_creation_5m : row.try_get::< i64, _ >( "cache_creation_5m_tokens" ).map_err( err )? as u64,
        cache_creation_1h : row.try_get::< i64, _ >( "cache_creation_1h_tokens" ).map_err( err )? as u64,
        cache_read : row.try_get::< i64, _ >( "cache_read_tokens" ).map_err( err )? as u64,
      },
      cost_usd : row.try_get( "cost_usd" ).map_err( err )?,
    } )
  }

  /// One request's contribution to a `usage_summary` row.
  #[ derive( Debug, Clone, Copy ) ]
  pub struct UsageDelta
  {
    /// Whether the contributing request succeeded.
    pub success : bool,
    /// Token counters attributed to the request.
    pub tokens : TokenCounters,
    /// Cost attributed to the request, in US dollars.
    pub cost_usd : f64,
  }

  async fn accumulate_row< 'e, E : SqliteExecutor< 'e > >(
    executor : E,
    date : &str,
    model : &str,
    channel : &str,
    endpoint : &str,
    delta : UsageDelta,
  ) -> Result< SqliteRow, sqlx::Error >
  {
    let success_count : i64 = i64::from( delta.success );
    let error_count : i64 = i64::from( !delta.success );
    sqlx::query(
      "INSERT INTO usage_summary
       ( date, model, channel, endpoint, request_count, success_count, error_count,
         input_tokens, output_tokens, cache_creation_5m_tokens, cache_creation_1h_tokens,
         cache_read_tokens, cost_usd )
       VALUES ( ?,?,?,?,1,?,?,?,?,?,?,?,? )
       ON CONFLICT( date, model, channel, endpoint ) DO UPDATE SET
         request_count = request_count + 1,
         success_count = success_count + excluded.success_count,
         error_count = error_count + excluded.error_count,
         input_tokens = input_tokens + excluded.input_tokens,
         output_tokens = output_tokens + excluded.output_tokens,
         cache_creation_5m_tokens = cache_creation_5m_tokens + excluded.cache_creation_5m_tokens,
         cache_creation_1h_tokens = cache_creation_1h_tokens + excluded.cache_creation_1h_tokens,
         cache_read_tokens = cache_read_tokens + excluded.cache_read_tokens,
         cost_usd = cost_usd + excluded.cost_usd
       RETURNING *" )
      .bind( date )
      .bind( model )
      .bind( channel )
      .bind( endpoint )
      .bind( success_count )
      .bind( error_count )
      .bind( delta.tokens.input as i64 )
      .bind( delta.tokens.output as i64 )
      .bind( delta.tokens.cache_creation_5m as i64 )
      .bind( delta.tokens.cache_creation_1h as i64 )
      .bind( delta.tokens.cache_read as i64 )
      .bind( delta.cost_usd )
      .fetch_one( executor )
      .await
  }

  async fn get_row( pool : &SqlitePool, date : &str, model : &str, channel : &str, endpoint : &str ) -> Result< Option< SqliteRow >, sqlx::Error >
  {
    sqlx::query( "SELECT * FROM usage_summary WHERE date = ? AND model = ? AND channel = ? AND endpoint = ?" )
      .bind( date )
      .bind( model )
      .bind( channel )
      .bind( endpoint )
      .fetch_optional( pool )
      .await
  }

  async fn list_for_date_rows( pool : &SqlitePool, date : &str ) -> Result< Vec< SqliteRow >, sqlx::Error >
  {
    sqlx::query( "SELECT * FROM usage_summary WHERE date = ? ORDER BY model, channel, endpoint" )
      .bind( date )
      .fetch_all( pool )
      .await
  }

  async fn list_between_rows( pool : &SqlitePool, start_date : &str, end_date : &str ) -> Result< Vec< SqliteRow >, sqlx::Error >
  {
    sqlx::query( "SELECT * FROM usage_summary WHERE date >= ? AND date <= ? ORDER BY date, model, channel, endpoint" )
      .bind( start_date )
      .bind( end_date )
      .fetch_all( pool )
      .await
  }

  async fn list_all_rows( pool : &SqlitePool ) -> Result< Vec< SqliteRow >, sqlx::Error >
  {
    sqlx::query( "SELECT * FROM usage_summary ORDER BY date, model, channel, endpoint" )
      .fetch_all( pool )
      .await
  }

  /// Rollup access to the `usage_summary` table.
  #[ derive( Debug ) ]
  pub struct UsageSummaryStore
  {
    pool : SqlitePool,
    write_lock : Mutex< () >,
  }

  impl UsageSummaryStore
  {
    /// Wrap `pool` as a usage summary store.
    #[ must_use ]
    pub fn new( pool : SqlitePool ) -> Self
    {
      Self { pool, write_lock : Mutex::new( () ) }
    }

    /// Add `delta`'s contribution to the `(date, model, channel,
    /// endpoint)` row, creating it on first write.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::StorageFatal`]/[`RelayError::StorageBusy`] on database failure.
    pub async fn accumulate( &self, date : &str, model : &str, channel : &str, endpoint : &str, delta : UsageDelta ) -> RelayResult< UsageSummary >
    {
      let _guard = self.write_lock.lock().await;
      let row = crate::pool::busy_retry( 5, || accumulate_row( &self.pool, date, model, channel, endpoint, delta ) ).await?;
      row_to_summary( row )
    }

    /// Accumulate as part of an already-open transaction, used to pair the
    /// `usage_summary` update with the matching `request_logs` archive
    /// write inside one commit.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::StorageFatal`] on database failure.
    pub async fn accumulate_in_txn(
      &self,
      txn : &mut crate::txn::StoreTxn,
      date : &str,
      model : &str,
      channel : &str,
      endpoint : &str,
      delta : UsageDelta,
    ) -> RelayResult< UsageSummary >
    {
      let row = accumulate_row( &mut *txn.inner, date, model, channel, endpoint, delta ).await
        .map_err( | e | RelayError::StorageFatal { detail : e.to_string() } )?;
      row_to_summary( row )
    }

    /// Fetch a single rollup row.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::StorageFatal`]/[`RelayError::StorageBusy`] on database failure.
    pub async fn get( &self, date : &str, model : &str, channel : &str, endpoint : &str ) -> RelayResult< Option< UsageSummary > >
    {
      crate::pool::busy_retry( 5, || get_row( &self.pool, date, model, channel, endpoint ) ).await?
        .map( row_to_summary )
        .transpose()
    }

    /// List every rollup row for one calendar date.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::StorageFatal`]/[`RelayError::StorageBusy`] on database failure.
    pub async fn list_for_date( &self, date : &str ) -> RelayResult< Vec< UsageSummary > >
    {
      let rows = crate::pool::busy_retry( 5, || list_for_date_rows( &self.pool, date ) ).await?;
      rows.into_iter().map( row_to_summary ).collect()
    }

    /// List every rollup row between two calendar dates, inclusive.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::StorageFatal`]/[`RelayError::StorageBusy`] on database failure.
    pub async fn list_between( &self, start_date : &str, end_date : &str ) -> RelayResult< Vec< UsageSummary > >
    {
      let rows = crate::pool::busy_retry( 5, || list_between_rows( &self.pool, start_date, end_date ) ).await?;
      rows.into_iter().map( row_to_summary ).collect()
    }

    /// List every rollup row ever recorded.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::StorageFatal`]/[`RelayError::StorageBusy`] on database failure.
    pub async fn list_all( &self ) -> RelayResult< Vec< UsageSummary > >
    {
      let rows = crate::pool::busy_retry( 5, || list_all_rows( &self.pool ) ).await?;
      rows.into_iter().map( row_to_summary ).collect()
    }

    /// Begin a transaction for batching writes across stores.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::StorageFatal`] if a connection cannot be acquired.
    pub async fn with_transaction( &self ) -> RelayResult< crate::txn::StoreTxn >
    {
      crate::txn::StoreTxn::begin( &self.pool ).await
    }
  }

  #[ cfg( test ) ]
  mod tests
  {
    use super::*;

    async fn store() -> UsageSummaryStore
    {
      let pool = sqlx::SqlitePool::connect( "sqlite::memory:" ).await.unwrap();
      crate::schema::migrate( &pool ).await.unwrap();
      UsageSummaryStore::new( pool )
    }

    fn delta( input : u64, cost : f64, success : bool ) -> UsageDelta
    {
      UsageDelta { success, tokens : TokenCounters { input, ..TokenCounters::default() }, cost_usd : cost }
    }

    #[ tokio::test ]
    async fn accumulate_creates_row_on_first_write()
    {
      let store = store().await;
      let summary = store.accumulate( "2026-07-26", "claude-opus-4", "primary", "east", delta( 100, 1.5, true ) ).await.unwrap();
      assert_eq!( summary.request_count, 1 );
      assert_eq!( summary.success_count, 1 );
      assert_eq!( summary.tokens.input, 100 );
    }

    #[ tokio::test ]
    async fn accumulate_adds_to_existing_row()
    {
      let store = store().await;
      store.accumulate( "2026-07-26", "claude-opus-4", "primary", "east", delta( 100, 1.5, true ) ).await.unwrap();
      let summary = store.accumulate( "2026-07-26", "claude-opus-4", "primary", "east", delta( 50, 0.5, false ) ).await.unwrap();
      assert_eq!( summary.request_count, 2 );
      assert_eq!( summary.success_count, 1 );
      assert_eq!( summary.error_count, 1 );
      assert_eq!( summary.tokens.input, 150 );
      assert!( ( summary.cost_usd - 2.0 ).abs() < f64::EPSILON );
    }

    #[ tokio::test ]
    async fn distinct_keys_stay_separate()
    {
      let store = store().await;
      store.accumulate( "2026-07-26", "claude-opus-4", "primary", "east", delta( 100, 1.0, true ) ).await.unwrap();
      store.accumulate( "2026-07-26", "claude-opus-4", "primary", "west", delta( 10, 0.1, true ) ).await.unwrap();
      assert_eq!( store.list_for_date( "2026-07-26" ).await.unwrap().len(), 2 );
    }
  }
}

crate::mod_interface!
{
  exposed use
  {
    UsageDelta,
    UsageSummaryStore,
  };
}
