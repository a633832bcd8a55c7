//! Request log archival
//!
//! One row per terminal request, written once by the hot pool's archive
//! pipeline (`relay-pool`). `upsert` is idempotent on `request_id` so a
//! retried archive attempt after a crash never duplicates a row.

mod private
{
  use chrono::{ DateTime, Utc };
  use relay_types::
  {
    AuthType, BusinessState, EndpointRef, ErrorState, RelayError, RelayResult, RequestRecord, TokenCounters,
  };
  use sqlx::sqlite::SqliteRow;
  use sqlx::{ QueryBuilder, Row, Sqlite, SqliteExecutor, SqlitePool };
  use tokio::sync::Mutex;

  /// Filters for [`RequestLogStore::list_filtered`]; every field is
  /// optional and narrows the result set when present. `limit`/`offset`
  /// page the (already-filtered) set, newest first.
  #[ derive( Debug, Clone ) ]
  pub struct RequestLogFilter
  {
    /// Only rows whose `start_time` is at or after this instant.
    pub start_time : Option< DateTime< Utc > >,
    /// Only rows whose `start_time` is at or before this instant.
    pub end_time : Option< DateTime< Utc > >,
    /// Only rows in this business state.
    pub state : Option< BusinessState >,
    /// Only rows for this model name.
    pub model : Option< String >,
    /// Only rows routed through this channel.
    pub channel : Option< String >,
    /// Only rows whose selected endpoint carries this name.
    pub endpoint_name : Option< String >,
    /// Rows to return.
    pub limit : u32,
    /// Rows to skip before `limit` takes effect.
    pub offset : u32,
  }

  impl Default for RequestLogFilter
  {
    fn default() -> Self
    {
      Self { start_time : None, end_time : None, state : None, model : None, channel : None, endpoint_name : None, limit : 50, offset : 0 }
    }
  }

  /// One page of [`RequestLogStore::list_filtered`], plus the total row
  /// count across the whole filtered set (for the caller's pager UI).
  #[ derive( Debug, Clone ) ]
  pub struct PagedRequestLogs
  {
    /// This page's rows, newest first.
    pub records : Vec< RequestRecord >,
    /// Total rows matching the filter, ignoring `limit`/`offset`.
    pub total : i64,
  }

  fn push_filters( builder : &mut QueryBuilder< '_, Sqlite >, filter : &RequestLogFilter )
  {
    builder.push( " WHERE 1=1" );
    if let Some( start ) = filter.start_time
    {
      builder.push( " AND start_time >= " ).push_bind( crate::time::format_for_storage( start ) );
    }
    if let Some( end ) = filter.end_time
    {
      builder.push( " AND start_time <= " ).push_bind( crate::time::format_for_storage( end ) );
    }
    if let Some( state ) = filter.state
    {
      builder.push( " AND state = " ).push_bind( business_state_to_str( state ) );
    }
    if let Some( model ) = &filter.model
    {
      builder.push( " AND model = " ).push_bind( model.clone() );
    }
    if let Some( channel ) = &filter.channel
    {
      builder.push( " AND selected_channel = " ).push_bind( channel.clone() );
    }
    if let Some( endpoint_name ) = &filter.endpoint_name
    {
      builder.push( " AND selected_endpoint_name = " ).push_bind( endpoint_name.clone() );
    }
  }

  fn business_state_to_str( state : BusinessState ) -> &'static str
  {
    match state
    {
      BusinessState::Pending => "pending",
      BusinessState::Forwarding => "forwarding",
      BusinessState::Streaming => "streaming",
      BusinessState::Processing => "processing",
      BusinessState::Completed => "completed",
      BusinessState::Failed => "failed",
      BusinessState::Cancelled => "cancelled",
    }
  }

  fn business_state_from_str( raw : &str ) -> RelayResult< BusinessState >
  {
    match raw
    {
      "pending" => Ok( BusinessState::Pending ),
      "forwarding" => Ok( BusinessState::Forwarding ),
      "streaming" => Ok( BusinessState::Streaming ),
      "processing" => Ok( BusinessState::Processing ),
      "completed" => Ok( BusinessState::Completed ),
      "failed" => Ok( BusinessState::Failed ),
      "cancelled" => Ok( BusinessState::Cancelled ),
      other => Err( RelayError::StorageFatal { detail : format!( "unknown request state '{other}'" ) } ),
    }
  }

  fn error_state_to_str( state : ErrorState ) -> &'static str
  {
    match state
    {
      ErrorState::None => "none",
      ErrorState::Retrying => "retrying",
      ErrorState::Suspended => "suspended",
    }
  }

  fn error_state_from_str( raw : &str ) -> RelayResult< ErrorState >
  {
    match raw
    {
      "none" => Ok( ErrorState::None ),
      "retrying" => Ok( ErrorState::Retrying ),
      "suspended" => Ok( ErrorState::Suspended ),
      other => Err( RelayError::StorageFatal { detail : format!( "unknown error state '{other}'" ) } ),
    }
  }

  fn auth_type_to_str( auth_type : AuthType ) -> &'static str
  {
    match auth_type
    {
      AuthType::Token => "token",
      AuthType::ApiKey => "api_key",
      AuthType::None => "none",
    }
  }

  fn auth_type_from_str( raw : &str ) -> RelayResult< AuthType >
  {
    match raw
    {
      "token" => Ok( AuthType::Token ),
      "api_key" => Ok( AuthType::ApiKey ),
      "none" => Ok( AuthType::None ),
      other => Err( RelayError::StorageFatal { detail : format!( "unknown auth type '{other}'" ) } ),
    }
  }

  fn row_to_record( row : SqliteRow ) -> RelayResult< RequestRecord >
  {
    let err = | e : sqlx::Error | RelayError::StorageFatal { detail : e.to_string() };
    let state_raw : String = row.try_get( "state" ).map_err( err )?;
    let error_state_raw : String = row.try_get( "error_state" ).map_err( err )?;
    let auth_type_raw : String = row.try_get( "auth_type" ).map_err( err )?;
    let start_time_raw : String = row.try_get( "start_time" ).map_err( err )?;
    let end_time_raw : Option< String > = row.try_get( "end_time" ).map_err( err )?;

    let endpoint_id : Option< i64 > = row.try_get( "selected_endpoint_id" ).map_err( err )?;
    let endpoint_name : Option< String > = row.try_get( "selected_endpoint_name" ).map_err( err )?;
    let channel : Option< String > = row.try_get( "selected_channel" ).map_err( err )?;
    let selected_endpoint = match ( endpoint_id, &endpoint_name, &channel )
    {
      ( Some( id ), Some( name ), Some( ch ) ) => Some( EndpointRef { id, channel : ch.clone(), name : name.clone() } ),
      _ => None,
    };

    Ok( RequestRecord
    {
      request_id : row.try_get( "request_id" ).map_err( err )?,
      start_time : crate::time::parse_lenient( &start_time_raw ),
      end_time : end_time_raw.map( | raw | crate::time::parse_lenient( &raw ) ),
      state : business_state_from_str( &state_raw )?,
      error_state : error_state_from_str( &error_state_raw )?,
      selected_endpoint,
      selected_channel : channel,
      model : row.try_get( "model" ).map_err( err )?,
      auth_type : auth_type_from_str( &auth_type_raw )?,
      auth_key_fingerprint : row.try_get( "auth_key_fingerprint" ).map_err( err )?,
      http_status : row.try_get::< Option< i64 >, _ >( "http_status" ).map_err( err )?.map( | v | v as u16 ),
      retry_count : row.try_get::< i64, _ >( "retry_count" ).map_err( err )? as u32,
      failure_reason : row.try_get( "failure_reason" ).map_err( err )?,
      cancel_reason : row.try_get( "cancel_reason" ).map_err( err )?,
      streaming : row.try_get( "streaming" ).map_err( err )?,
      tokens : TokenCounters
      {
        input : row.try_get::< i64, _ >( "input_tokens" ).map_err( err )? as u64,
        output : row.try_get::< i64, _ >( "output_tokens" ).map_err( err )? as u64,
        cache_creation_5m : row.try_get::< i64, _ >( "cache_creation_5m_tokens" ).map_err( err )? as u64,
        cache_creation_1h : row.try_get::< i64, _ >( "cache_creation_1h_tokens" ).map_err( err )? as u64,
        cache_read : row.try_get::< i64, _ >( "cache_read_tokens" ).map_err( err )? as u64,
      },
      cost_usd : row.try_get( "cost_usd" ).map_err( err )?,
      duration_ms : row.try_get::< Option< i64 >, _ >( "duration_ms" ).map_err( err )?.map( | v | v as u64 ),
    } )
  }

  async fn upsert_row< 'e, E : SqliteExecutor< 'e > >( executor : E, record : &RequestRecord ) -> Result< SqliteRow, sqlx::Error >
  {
    let start_time = crate::time::format_for_storage( record.start_time );
    let end_time = record.end_time.map( crate::time::format_for_storage );
    let ( endpoint_id, endpoint_name ) = match &record.selected_endpoint
    {
      Some( endpoint_ref ) => ( Some( endpoint_ref.id ), Some( endpoint_ref.name.clone() ) ),
      None => ( None, None ),
    };

    sqlx::query(
      "INSERT INTO request_logs
       ( request_id, start_time, end_time, state, error_state, selected_channel,
         selected_endpoint_id, selected_endpoint_name, model, auth_type, auth_key_fingerprint,
         http_status, retry_count, failure_reason, cancel_reason, streaming,
         input_tokens, output_tokens, cache_creation_5m_tokens, cache_creation_1h_tokens,
         cache_read_tokens, cost_usd, duration_ms )
       VALUES ( ?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,? )
       ON CONFLICT( request_id ) DO UPDATE SET
         end_time = excluded.end_time,
         state = excluded.state,
         error_state = excluded.error_state,
         selected_channel = excluded.selected_channel,
         selected_endpoint_id = excluded.selected_endpoint_id,
         selected_endpoint_name = excluded.selected_endpoint_name,
         model = excluded.model,
         http_status = excluded.http_status,
         retry_count = excluded.retry_count,
         failure_reason = excluded.failure_reason,
         cancel_reason = excluded.cancel_reason,
         input_tokens = excluded.input_tokens,
         output_tokens = excluded.output_tokens,
         cache_creation_5m_tokens = excluded.cache_creation_5m_tokens,
         cache_creation_1h_tokens = excluded.cache_creation_1h_tokens,
         cache_read_tokens = excluded.cache_read_tokens,
         cost_usd = excluded.cost_usd,
         duration_ms = excluded.duration_ms
       RETURNING *" )
      .bind( &record.request_id )
      .bind( start_time )
      .bind( end_time )
      .bind( business_state_to_str( record.state ) )
      .bind( error_state_to_str( record.error_state ) )
      .bind( &record.selected_channel )
      .bind( endpoint_id )
      .bind( endpoint_name )
      .bind( &record.model )
      .bind( auth_type_to_str( record.auth_type ) )
      .bind( &record.auth_key_fingerprint )
      .bind( record.http_status.map( i64::from ) )
      .bind( i64::from( record.retry_count ) )
      .bind( &record.failure_reason )
      .bind( &record.cancel_reason )
      .bind( record.streaming )
      .bind( record.tokens.input as i64 )
      .bind( record.tokens.output as i64 )
      .bind( record.tokens.cache_creation_5m as i64 )
      .bind( record.tokens.cache_creation_1h as i64 )
      .bind( record.tokens.cache_read as i64 )
      .bind( record.cost_usd )
      .bind( record.duration_ms.map( | v | v as i64 ) )
      .fetch_one( executor )
      .await
  }

  async fn get_row( pool : &SqlitePool, request_id : &str ) -> Result< Option< SqliteRow >, sqlx::Error >
  {
    sqlx::query( "SELECT * FROM request_logs WHERE request_id = ?" )
      .bind( request_id )
      .fetch_optional( pool )
      .await
  }

  async fn list_recent_rows( pool : &SqlitePool, limit : i64 ) -> Result< Vec< SqliteRow >, sqlx::Error >
  {
    sqlx::query( "SELECT * FROM request_logs ORDER BY start_time DESC LIMIT ?" )
      .bind( limit )
      .fetch_all( pool )
      .await
  }

  /// Archival access to the `request_logs` table.
  #[ derive( Debug ) ]
  pub struct RequestLogStore
  {
    pool : SqlitePool,
    write_lock : Mutex< () >,
  }

  impl RequestLogStore
  {
    /// Wrap `pool` as a request log store.
    #[ must_use ]
    pub fn new( pool : SqlitePool ) -> Self
    {
      Self { pool, write_lock : Mutex::new( () ) }
    }

    /// Archive a terminal record, idempotent on `request_id`.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::StorageFatal`]/[`RelayError::StorageBusy`] on database failure.
    pub async fn upsert( &self, record : &RequestRecord ) -> RelayResult< RequestRecord >
    {
      let _guard = self.write_lock.lock().await;
      let row = crate::pool::busy_retry( 5, || upsert_row( &self.pool, record ) ).await?;
      row_to_record( row )
    }

    /// Archive a record as part of an already-open transaction, used to
    /// pair a `request_logs` write with the matching `usage_summary`
    /// upsert inside one commit.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::StorageFatal`] on database failure.
    pub async fn upsert_in_txn( &self, txn : &mut crate::txn::StoreTxn, record : &RequestRecord ) -> RelayResult< RequestRecord >
    {
      let row = upsert_row( &mut *txn.inner, record ).await
        .map_err( | e | RelayError::StorageFatal { detail : e.to_string() } )?;
      row_to_record( row )
    }

    /// Fetch by request id.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::StorageFatal`]/[`RelayError::StorageBusy`] on database failure.
    pub async fn get( &self, request_id : &str ) -> RelayResult< Option< RequestRecord > >
    {
      crate::pool::busy_retry( 5, || get_row( &self.pool, request_id ) ).await?
        .map( row_to_record )
        .transpose()
    }

    /// List the most recent `limit` archived requests, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::StorageFatal`]/[`RelayError::StorageBusy`] on database failure.
    pub async fn list_recent( &self, limit : u32 ) -> RelayResult< Vec< RequestRecord > >
    {
      let rows = crate::pool::busy_retry( 5, || list_recent_rows( &self.pool, i64::from( limit ) ) ).await?;
      rows.into_iter().map( row_to_record ).collect()
    }

    /// Paged, filtered listing for the admin request-query surface,
    /// newest first. `filter.limit` is clamped to 500 per page.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::StorageFatal`]/[`RelayError::StorageBusy`] on database failure.
    pub async fn list_filtered( &self, filter : &RequestLogFilter ) -> RelayResult< PagedRequestLogs >
    {
      let limit = i64::from( filter.limit.min( 500 ) );
      let offset = i64::from( filter.offset );

      let total : i64 = crate::pool::busy_retry( 5, ||
      {
        let mut count_builder : QueryBuilder< '_, Sqlite > = QueryBuilder::new( "SELECT COUNT(*) FROM request_logs" );
        push_filters( &mut count_builder, filter );
        async move
        {
          let row = count_builder.build().fetch_one( &self.pool ).await?;
          row.try_get::< i64, _ >( 0 )
        }
      } ).await
      .map_err( | e : sqlx::Error | RelayError::StorageFatal { detail : e.to_string() } )?;

      let rows = crate::pool::busy_retry( 5, ||
      {
        let mut builder : QueryBuilder< '_, Sqlite > = QueryBuilder::new( "SELECT * FROM request_logs" );
        push_filters( &mut builder, filter );
        builder.push( " ORDER BY start_time DESC LIMIT " ).push_bind( limit );
        builder.push( " OFFSET " ).push_bind( offset );
        async move { builder.build().fetch_all( &self.pool ).await }
      } ).await?;

      Ok( PagedRequestLogs { records : rows.into_iter().map( row_to_record ).collect::< RelayResult< _ > >()?, total } )
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
    use chrono::Utc;

    async fn store() -> RequestLogStore
    {
      let pool = sqlx::SqlitePool::connect( "sqlite::memory:" ).await.unwrap();
      crate::schema::migrate( &pool ).await.unwrap();
      RequestLogStore::new( pool )
    }

    fn sample() -> RequestRecord
    {
      let mut record = RequestRecord::new( "req-1".to_string(), Utc::now(), false );
      record.state = BusinessState::Completed;
      record.selected_channel = Some( "primary".to_string() );
      record.selected_endpoint = Some( EndpointRef { id : 1, channel : "primary".to_string(), name : "east".to_string() } );
      record.http_status = Some( 200 );
      record.tokens = TokenCounters { input : 100, output : 50, ..TokenCounters::default() };
      record.cost_usd = 1.23;
      record.end_time = Some( Utc::now() );
      record
    }

    #[ tokio::test ]
    async fn upsert_then_get_round_trips()
    {
      let store = store().await;
      store.upsert( &sample() ).await.unwrap();
      let fetched = store.get( "req-1" ).await.unwrap().unwrap();
      assert_eq!( fetched.state, BusinessState::Completed );
      assert_eq!( fetched.tokens.input, 100 );
      assert_eq!( fetched.selected_endpoint.unwrap().name, "east" );
    }

    #[ tokio::test ]
    async fn upsert_is_idempotent_on_request_id()
    {
      let store = store().await;
      store.upsert( &sample() ).await.unwrap();
      let mut again = sample();
      again.retry_count = 2;
      store.upsert( &again ).await.unwrap();
      assert_eq!( store.list_recent( 10 ).await.unwrap().len(), 1 );
      assert_eq!( store.get( "req-1" ).await.unwrap().unwrap().retry_count, 2 );
    }

    #[ tokio::test ]
    async fn list_filtered_narrows_by_channel_and_pages()
    {
      let store = store().await;
      store.upsert( &sample() ).await.unwrap();
      let mut other = sample();
      other.request_id = "req-2".to_string();
      other.selected_channel = Some( "secondary".to_string() );
      store.upsert( &other ).await.unwrap();

      let page = store.list_filtered( &RequestLogFilter { channel : Some( "primary".to_string() ), ..RequestLogFilter::default() } ).await.unwrap();
      assert_eq!( page.total, 1 );
      assert_eq!( page.records[ 0 ].request_id, "req-1" );

      let all = store.list_filtered( &RequestLogFilter { limit : 1, ..RequestLogFilter::default() } ).await.unwrap();
      assert_eq!( all.total, 2 );
      assert_eq!( all.records.len(), 1 );
    }
  }
}

crate::mod_interface!
{
  exposed use
  {
    RequestLogStore,
    RequestLogFilter,
    PagedRequestLogs,
  };
}
