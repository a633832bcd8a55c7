//! CLI flags and the optional YAML seed file
//!
//! Explicit, non-magic configuration : nothing is assembled from
//! environment-variable soup, every knob traces to either a CLI flag, a
//! seed-file field, or a documented built-in default, in that priority
//! order.

mod private
{
  use relay_types::{ RelayError, RelayResult };
  use serde::Deserialize;
  use std::path::PathBuf;

  /// Command-line flags accepted by the `relay-http` binary.
  #[ derive( Debug, Clone, clap::Parser ) ]
  #[ command( name = "relay-http", about = "Local reverse-proxy fabric for Anthropic-compatible chat-completion APIs" ) ]
  pub struct CliArgs
  {
    /// Optional YAML seed file; CLI flags override whatever it sets.
    #[ arg( long, env = "RELAY_CONFIG" ) ]
    pub config : Option< PathBuf >,
    /// SQLite database path; defaults to the seed file's `db` field, or
    /// `relay.sqlite3` in the current directory.
    #[ arg( long, env = "RELAY_DB" ) ]
    pub db : Option< String >,
    /// Listener interface override.
    #[ arg( long, env = "RELAY_HOST" ) ]
    pub host : Option< String >,
    /// Preferred listener port override.
    #[ arg( long, env = "RELAY_PORT" ) ]
    pub port : Option< u16 >,
  }

  /// The optional YAML seed file. Every field is optional;
  /// routing/retry/failover knobs are deliberately absent here — those
  /// live in the `settings` table and hot-reload, not in this file.
  #[ derive( Debug, Clone, Default, Deserialize ) ]
  struct SeedFile
  {
    host : Option< String >,
    port : Option< u16 >,
    db : Option< String >,
    timezone : Option< String >,
  }

  /// Fully resolved startup configuration.
  #[ derive( Debug, Clone ) ]
  pub struct ServerConfig
  {
    /// Interface the HTTP listener binds.
    pub host : String,
    /// Preferred port; the port manager increments on conflict.
    pub port : u16,
    /// SQLite database path.
    pub db_path : String,
    /// IANA timezone name used to render calendar-date usage rollups.
    pub timezone : String,
  }

  const DEFAULT_HOST : &str = "127.0.0.1";
  const DEFAULT_PORT : u16 = 8080;
  const DEFAULT_DB_PATH : &str = "relay.sqlite3";
  const DEFAULT_TIMEZONE : &str = "UTC";

  impl ServerConfig
  {
    /// Resolve from `args`, reading and parsing the seed file named by
    /// `args.config` if present.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::ConfigInvalid`] if the seed file cannot be
    /// read or fails to parse as YAML.
    pub async fn from_seed_file( args : &CliArgs ) -> RelayResult< Self >
    {
      let seed = match &args.config
      {
        Some( path ) =>
        {
          let raw = tokio::fs::read_to_string( path ).await
            .map_err( | e | RelayError::ConfigInvalid { detail : format!( "reading {}: {e}", path.display() ) } )?;
          serde_yaml::from_str::< SeedFile >( &raw )
            .map_err( | e | RelayError::ConfigInvalid { detail : format!( "parsing {}: {e}", path.display() ) } )?
        }
        None => SeedFile::default(),
      };

      Ok( Self
      {
        host : args.host.clone().or( seed.host ).unwrap_or_else( || DEFAULT_HOST.to_string() ),
        port : args.port.or( seed.port ).unwrap_or( DEFAULT_PORT ),
        db_path : args.db.clone().or( seed.db ).unwrap_or_else( || DEFAULT_DB_PATH.to_string() ),
        timezone : seed.timezone.unwrap_or_else( || DEFAULT_TIMEZONE.to_string() ),
      } )
    }
  }

  #[ cfg( test ) ]
  mod tests
  {
    use super::*;

    fn args() -> CliArgs
    {
      CliArgs { config : None, db : None, host : None, port : None }
    }

    #[ tokio::test ]
    async fn no_seed_file_falls_back_to_built_in_defaults()
    {
      let config = ServerConfig::from_seed_file( &args() ).await.unwrap();
      assert_eq!( config.host, DEFAULT_HOST );
      assert_eq!( config.port, DEFAULT_PORT );
      assert_eq!( config.db_path, DEFAULT_DB_PATH );
    }

    #[ tokio::test ]
    async fn cli_flags_override_the_seed_file()
    {
      let dir = tempfile::tempdir().unwrap();
      let path = dir.path().join( "seed.yaml" );
      tokio::fs::write( &path, "host: 0.0.0.0\nport: 9000\n" ).await.unwrap();
      let mut cli = args();
      cli.config = Some( path );
      cli.port = Some( 9100 );
      let config = ServerConfig::from_seed_file( &cli ).await.unwrap();
      assert_eq!( config.host, "0.0.0.0" );
      assert_eq!( config.port, 9100, "CLI flag must win over the seed file" );
    }

    #[ tokio::test ]
    async fn missing_seed_file_is_a_config_error()
    {
      let mut cli = args();
      cli.config = Some( "/no/such/file.yaml".into() );
      assert!( ServerConfig::from_seed_file( &cli ).await.is_err() );
    }
  }
}

crate::mod_interface!
{
  exposed use
  {
    CliArgs,
    ServerConfig,
  };
}
