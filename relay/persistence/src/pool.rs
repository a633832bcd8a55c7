//! Pool construction and scoped busy-retry
//!
//! `relay-persistence` opens a single `sqlx::SqlitePool`; every store
//! serializes its own writes through a `tokio::sync::Mutex`, while reads
//! run concurrently against pool connections.

mod private
{
  use core::future::Future;
  use core::time::Duration;
  use relay_types::{ RelayError, RelayResult };
  use sqlx::sqlite::{ SqliteConnectOptions, SqlitePoolOptions };
  use sqlx::SqlitePool;

  /// Busy-retry starting backoff.
  const BUSY_RETRY_BASE : Duration = Duration::from_millis( 30 );
  /// Busy-retry maximum backoff.
  const BUSY_RETRY_MAX : Duration = Duration::from_millis( 500 );

  /// Open (creating if absent) the SQLite database at `path` and run schema
  /// creation.
  ///
  /// # Errors
  ///
  /// Returns [`RelayError::StorageFatal`] if the database cannot be opened,
  /// or [`RelayError::SchemaIncompatible`] if an existing database carries
  /// an unexpected schema version.
  pub async fn open( path : &str ) -> RelayResult< SqlitePool >
  {
    let options = SqliteConnectOptions::new()
      .filename( path )
      .create_if_missing( true )
      .busy_timeout( BUSY_RETRY_MAX );

    let pool = SqlitePoolOptions::new()
      .max_connections( 8 )
      .connect_with( options )
      .await
      .map_err( | e | RelayError::StorageFatal { detail : format!( "opening database at {path}: {e}" ) } )?;

    crate::schema::migrate( &pool ).await?;
    Ok( pool )
  }

  /// Whether a `sqlx::Error` represents a transient SQLite busy/locked
  /// condition worth retrying, as opposed to a structural failure.
  #[ must_use ]
  pub fn is_busy_error( error : &sqlx::Error ) -> bool
  {
    match error
    {
      sqlx::Error::Database( db_error ) =>
      {
        let code = db_error.code();
        matches!( code.as_deref(), Some( "5" ) | Some( "6" ) )
          || db_error.message().to_lowercase().contains( "locked" )
          || db_error.message().to_lowercase().contains( "busy" )
      }
      _ => false,
    }
  }

  /// Run `operation`, retrying with exponential backoff (30ms → 500ms) as
  /// long as the observed failure is a busy/locked condition. Any other
  /// error, or exhaustion of `max_attempts`, is returned immediately.
  ///
  /// # Errors
  ///
  /// Propagates the last observed `sqlx::Error`, wrapped as
  /// [`RelayError::StorageBusy`] if busy-retries were exhausted or
  /// [`RelayError::StorageFatal`] for any other database failure.
  pub async fn busy_retry< F, Fut, T >( max_attempts : u32, mut operation : F ) -> RelayResult< T >
  where
    F : FnMut() -> Fut,
    Fut : Future< Output = Result< T, sqlx::Error > >,
  {
    let mut delay = BUSY_RETRY_BASE;
    let mut attempt = 0;
    loop
    {
      attempt += 1;
      match operation().await
      {
        Ok( value ) => return Ok( value ),
        Err( error ) if is_busy_error( &error ) && attempt < max_attempts =>
        {
          tracing::debug!( attempt, delay_ms = delay.as_millis() as u64, "retrying after storage busy" );
          tokio::time::sleep( delay ).await;
          delay = ( delay * 2 ).min( BUSY_RETRY_MAX );
        }
        Err( error ) if is_busy_error( &error ) =>
        {
          return Err( RelayError::StorageBusy { detail : error.to_string() } );
        }
        Err( error ) => return Err( RelayError::StorageFatal { detail : error.to_string() } ),
      }
    }
  }

  #[ cfg( test ) ]
  mod tests
  {
    use super::*;
    use core::sync::atomic::{ AtomicU32, Ordering };

    #[ tokio::test ]
    async fn open_creates_database_and_migrates_schema()
    {
      let dir = tempfile::tempdir().unwrap();
      let path = dir.path().join( "relay.db" );
      let pool = open( path.to_str().unwrap() ).await.unwrap();
      let version : ( i64, ) = sqlx::query_as( "PRAGMA user_version" )
        .fetch_one( &pool )
        .await
        .unwrap();
      assert_eq!( version.0, crate::schema::SCHEMA_VERSION );
    }

    #[ tokio::test ]
    async fn busy_retry_gives_up_immediately_on_non_busy_error()
    {
      let calls = AtomicU32::new( 0 );
      let result : RelayResult< () > = busy_retry( 5, ||
      {
        calls.fetch_add( 1, Ordering::SeqCst );
        async { Err( sqlx::Error::RowNotFound ) }
      } ).await;
      assert!( result.is_err() );
      assert_eq!( calls.load( Ordering::SeqCst ), 1 );
    }

    #[ tokio::test ]
    async fn busy_retry_succeeds_on_first_try()
    {
      let result = busy_retry( 3, || async { Ok::< _, sqlx::Error >( 42 ) } ).await.unwrap();
      assert_eq!( result, 42 );
    }
  }
}

crate::mod_interface!
{
  exposed use
  {
    open,
    is_busy_error,
    busy_retry,
  };
}
