//! Table definitions and schema version gate
//!
//! Schema *migration scripts* are out of scope for the core (an external
//! collaborator owns them); this module only creates the tables this
//! binary expects on a fresh database and refuses to run against an
//! incompatible existing one.

mod private
{
  use relay_types::{ RelayError, RelayResult };
  use sqlx::SqlitePool;

  /// Schema version this binary expects. Bumped whenever a table shape
  /// changes in a way old rows cannot be read back from.
  pub const SCHEMA_VERSION : i64 = 1;

  const CREATE_CHANNELS : &str = "
    CREATE TABLE IF NOT EXISTS channels
    (
      id INTEGER PRIMARY KEY AUTOINCREMENT,
      name TEXT NOT NULL UNIQUE,
      website TEXT,
      priority INTEGER NOT NULL DEFAULT 0,
      participates_in_channel_failover INTEGER NOT NULL DEFAULT 1,
      created_at TEXT NOT NULL,
      updated_at TEXT NOT NULL
    )";

  const CREATE_ENDPOINTS : &str = "
    CREATE TABLE IF NOT EXISTS endpoints
    (
      id INTEGER PRIMARY KEY AUTOINCREMENT,
      channel TEXT NOT NULL,
      name TEXT NOT NULL,
      url TEXT NOT NULL,
      bearer_token TEXT,
      api_key TEXT,
      custom_headers TEXT NOT NULL DEFAULT '{}',
      priority INTEGER NOT NULL DEFAULT 0,
      participates_in_failover INTEGER NOT NULL DEFAULT 1,
      cooldown_seconds INTEGER,
      timeout_seconds INTEGER NOT NULL DEFAULT 300,
      supports_token_counting INTEGER NOT NULL DEFAULT 1,
      cost_multiplier_overall REAL NOT NULL DEFAULT 1.0,
      cost_multiplier_input REAL NOT NULL DEFAULT 1.0,
      cost_multiplier_output REAL NOT NULL DEFAULT 1.0,
      cost_multiplier_cache_creation_5m REAL NOT NULL DEFAULT 1.0,
      cost_multiplier_cache_creation_1h REAL NOT NULL DEFAULT 1.0,
      cost_multiplier_cache_read REAL NOT NULL DEFAULT 1.0,
      enabled INTEGER NOT NULL DEFAULT 1,
      created_at TEXT NOT NULL,
      updated_at TEXT NOT NULL,
      UNIQUE( channel, name )
    )";

  const CREATE_MODEL_PRICING : &str = "
    CREATE TABLE IF NOT EXISTS model_pricing
    (
      model TEXT PRIMARY KEY,
      input_price REAL NOT NULL DEFAULT 0.0,
      output_price REAL NOT NULL DEFAULT 0.0,
      cache_creation_5m_price REAL NOT NULL DEFAULT 0.0,
      cache_creation_1h_price REAL NOT NULL DEFAULT 0.0,
      cache_read_price REAL NOT NULL DEFAULT 0.0
    )";

  const CREATE_SETTINGS : &str = "
    CREATE TABLE IF NOT EXISTS settings
    (
      category TEXT NOT NULL,
      key TEXT NOT NULL,
      value TEXT NOT NULL,
      value_type TEXT NOT NULL,
      label TEXT NOT NULL DEFAULT '',
      description TEXT NOT NULL DEFAULT '',
      display_order INTEGER NOT NULL DEFAULT 0,
      requires_restart INTEGER NOT NULL DEFAULT 0,
      created_at TEXT NOT NULL,
      updated_at TEXT NOT NULL,
      PRIMARY KEY( category, key )
    )";

  const CREATE_REQUEST_LOGS : &str = "
    CREATE TABLE IF NOT EXISTS request_logs
    (
      request_id TEXT PRIMARY KEY,
      start_time TEXT NOT NULL,
      end_time TEXT,
      state TEXT NOT NULL,
      error_state TEXT NOT NULL,
      selected_channel TEXT,
      selected_endpoint_id INTEGER,
      selected_endpoint_name TEXT,
      model TEXT,
      auth_type TEXT NOT NULL,
      auth_key_fingerprint TEXT,
      http_status INTEGER,
      retry_count INTEGER NOT NULL DEFAULT 0,
      failure_reason TEXT,
      cancel_reason TEXT,
      streaming INTEGER NOT NULL DEFAULT 0,
      input_tokens INTEGER NOT NULL DEFAULT 0,
      output_tokens INTEGER NOT NULL DEFAULT 0,
      cache_creation_5m_tokens INTEGER NOT NULL DEFAULT 0,
      cache_creation_1h_tokens INTEGER NOT NULL DEFAULT 0,
      cache_read_tokens INTEGER NOT NULL DEFAULT 0,
      cost_usd REAL NOT NULL DEFAULT 0.0,
      duration_ms INTEGER
    )";

  const CREATE_USAGE_SUMMARY : &str = "
    CREATE TABLE IF NOT EXISTS usage_summary
    (
      date TEXT NOT NULL,
      model TEXT NOT NULL,
      channel TEXT NOT NULL,
      endpoint TEXT NOT NULL,
      request_count INTEGER NOT NULL DEFAULT 0,
      success_count INTEGER NOT NULL DEFAULT 0,
      error_count INTEGER NOT NULL DEFAULT 0,
      input_tokens INTEGER NOT NULL DEFAULT 0,
      output_tokens INTEGER NOT NULL DEFAULT 0,
      cache_creation_5m_tokens INTEGER NOT NULL DEFAULT 0,
      cache_creation_1h_tokens INTEGER NOT NULL DEFAULT 0,
      cache_read_tokens INTEGER NOT NULL DEFAULT 0,
      cost_usd REAL NOT NULL DEFAULT 0.0,
      PRIMARY KEY( date, model, channel, endpoint )
    )";

  /// Create every table this binary expects, if absent, and verify the
  /// schema version of an existing database.
  ///
  /// # Errors
  ///
  /// Returns [`RelayError::SchemaIncompatible`] if the database already
  /// carries a non-zero, non-matching `user_version`, or
  /// [`RelayError::StorageFatal`] on any other database failure.
  pub async fn migrate( pool : &SqlitePool ) -> RelayResult< () >
  {
    let ( found, ) : ( i64, ) = sqlx::query_as( "PRAGMA user_version" )
      .fetch_one( pool )
      .await
      .map_err( | e | RelayError::StorageFatal { detail : e.to_string() } )?;

    if found != 0 && found != SCHEMA_VERSION
    {
      return Err( RelayError::SchemaIncompatible { found, expected : SCHEMA_VERSION } );
    }

    for statement in
    [
      CREATE_CHANNELS,
      CREATE_ENDPOINTS,
      CREATE_MODEL_PRICING,
      CREATE_SETTINGS,
      CREATE_REQUEST_LOGS,
      CREATE_USAGE_SUMMARY,
    ]
    {
      sqlx::query( statement )
        .execute( pool )
        .await
        .map_err( | e | RelayError::StorageFatal { detail : e.to_string() } )?;
    }

    sqlx::query( &format!( "PRAGMA user_version = {SCHEMA_VERSION}" ) )
      .execute( pool )
      .await
      .map_err( | e | RelayError::StorageFatal { detail : e.to_string() } )?;

    Ok( () )
  }

  #[ cfg( test ) ]
  mod tests
  {
    use super::*;

    #[ tokio::test ]
    async fn migrate_is_idempotent()
    {
      let pool = sqlx::SqlitePool::connect( "sqlite::memory:" ).await.unwrap();
      migrate( &pool ).await.unwrap();
      migrate( &pool ).await.unwrap();
    }

    #[ tokio::test ]
    async fn migrate_rejects_incompatible_schema_version()
    {
      let pool = sqlx::SqlitePool::connect( "sqlite::memory:" ).await.unwrap();
      sqlx::query( "PRAGMA user_version = 99" ).execute( &pool ).await.unwrap();
      let result = migrate( &pool ).await;
      assert!( matches!( result, Err( RelayError::SchemaIncompatible { found : 99, expected : SCHEMA_VERSION } ) ) );
    }
  }
}

crate::mod_interface!
{
  exposed use
  {
    SCHEMA_VERSION,
    migrate,
  };
}
