//! Recovery from per-request debug files and their periodic pruning
//!
//! Every in-flight streamed request appends to an append-only
//! `{request_id}.debug` file under the log directory. If the terminal SSE
//! `usage` event never parses cleanly, [`recover_tokens`] re-reads that
//! file and extracts the last `"usage":{...}` object it can find —
//! the same canonical shape upstream emits on `message_delta`/
//! `message_stop`. [`DebugFilePruner`] keeps the directory itself bounded,
//! throttled to at most one sweep per day.

mod private
{
  use chrono::{ DateTime, Utc };
  use parking_lot::Mutex;
  use relay_types::TokenCounters;
  use serde::Deserialize;
  use std::path::{ Path, PathBuf };
  use std::sync::OnceLock;

  fn usage_pattern() -> &'static regex::Regex
  {
    static PATTERN : OnceLock< regex::Regex > = OnceLock::new();
    PATTERN.get_or_init( || regex::Regex::new( r#""usage"\s*:\s*(\{[^{}]*\})"# ).expect( "static pattern is valid" ) )
  }

  #[ derive( Debug, Deserialize ) ]
  struct RecoveredUsage
  {
    #[ serde( default ) ]
    input_tokens : u64,
    #[ serde( default ) ]
    output_tokens : u64,
    #[ serde( default ) ]
    cache_creation_input_tokens : u64,
    #[ serde( default ) ]
    cache_read_input_tokens : u64,
  }

  /// Scan `text` for every `"usage":{...}` object and parse the last one
  /// found — later events in the same debug file are cumulative, so the
  /// last parseable object carries the final counts.
  ///
  /// The recovered shape carries a single `cache_creation_input_tokens`
  /// field rather than this fabric's 5-minute/1-hour split; it is folded
  /// into `cache_creation_5m`, leaving `cache_creation_1h` untouched so a
  /// merge with whatever partial counters streaming already captured can
  /// only grow, never shrink, either bucket.
  #[ must_use ]
  pub fn extract_last_usage( text : &str ) -> Option< TokenCounters >
  {
    let captured = usage_pattern().captures_iter( text ).last()?;
    let raw = captured.get( 1 )?.as_str();
    let recovered : RecoveredUsage = serde_json::from_str( raw ).ok()?;
    Some( TokenCounters
    {
      input : recovered.input_tokens,
      output : recovered.output_tokens,
      cache_creation_5m : recovered.cache_creation_input_tokens,
      cache_creation_1h : 0,
      cache_read : recovered.cache_read_input_tokens,
    } )
  }

  /// Read `{request_id}.debug` under `log_dir` and recover its last usage
  /// object, if any.
  pub async fn recover_tokens( log_dir : &Path, request_id : &str ) -> Option< TokenCounters >
  {
    let path = log_dir.join( format!( "{request_id}.debug" ) );
    let text = tokio::fs::read_to_string( path ).await.ok()?;
    extract_last_usage( &text )
  }

  /// Bounds the debug-file directory by count and age, throttled to one
  /// sweep per 24 hours regardless of how often `maybe_prune` is called.
  #[ derive( Debug ) ]
  pub struct DebugFilePruner
  {
    log_dir : PathBuf,
    max_files : usize,
    auto_cleanup_days : i64,
    last_swept : Mutex< Option< DateTime< Utc > > >,
  }

  impl DebugFilePruner
  {
    /// A pruner over `log_dir`, keeping at most `max_files` files no older
    /// than `auto_cleanup_days` days.
    #[ must_use ]
    pub fn new( log_dir : PathBuf, max_files : usize, auto_cleanup_days : i64 ) -> Self
    {
      Self { log_dir, max_files, auto_cleanup_days, last_swept : Mutex::new( None ) }
    }

    /// Run a sweep if at least 24 hours have passed since the last one (or
    /// none has run yet). Returns the number of files deleted.
    pub async fn maybe_prune( &self, now : DateTime< Utc > ) -> std::io::Result< usize >
    {
      {
        let last = self.last_swept.lock();
        if let Some( last ) = *last
        {
          if now - last < chrono::Duration::hours( 24 )
          {
            return Ok( 0 );
          }
        }
      }

      let deleted = self.sweep( now ).await?;
      *self.last_swept.lock() = Some( now );
      Ok( deleted )
    }

    async fn sweep( &self, now : DateTime< Utc > ) -> std::io::Result< usize >
    {
      let mut entries = match tokio::fs::read_dir( &self.log_dir ).await
      {
        Ok( entries ) => entries,
        Err( error ) if error.kind() == std::io::ErrorKind::NotFound => return Ok( 0 ),
        Err( error ) => return Err( error ),
      };

      let mut files : Vec< ( PathBuf, DateTime< Utc > ) > = Vec::new();
      while let Some( entry ) = entries.next_entry().await?
      {
        let path = entry.path();
        if path.extension().and_then( std::ffi::OsStr::to_str ) != Some( "debug" )
        {
          continue;
        }
        let modified = entry.metadata().await?.modified()?;
        files.push( ( path, DateTime::< Utc >::from( modified ) ) );
      }

      files.sort_by_key( | ( _, modified ) | *modified );

      let mut deleted = 0;
      let stale_cutoff = now - chrono::Duration::days( self.auto_cleanup_days );
      let overflow = files.len().saturating_sub( self.max_files );

      for ( index, ( path, modified ) ) in files.iter().enumerate()
      {
        let too_old = *modified < stale_cutoff;
        let over_capacity = index < overflow;
        if too_old || over_capacity
        {
          tokio::fs::remove_file( path ).await?;
          deleted += 1;
        }
      }
      Ok( deleted )
    }
  }

  #[ cfg( test ) ]
  mod tests
  {
    use super::*;

    #[ test ]
    fn extracts_the_last_usage_object_in_a_multi_event_stream()
    {
      let text = r#"
        event: message_start
        data: {"usage":{"input_tokens":10,"output_tokens":0,"cache_creation_input_tokens":0,"cache_read_input_tokens":0}}

        event: message_delta
        data: {"usage":{"input_tokens":10,"output_tokens":42,"cache_creation_input_tokens":5,"cache_read_input_tokens":0}}
      "#;

      let tokens = extract_last_usage( text ).unwrap();
      assert_eq!( tokens.input, 10 );
      assert_eq!( tokens.output, 42 );
      assert_eq!( tokens.cache_creation_5m, 5 );
    }

    #[ test ]
    fn returns_none_when_no_usage_object_is_present()
    {
      assert!( extract_last_usage( "no usage here" ).is_none() );
    }

    #[ tokio::test ]
    async fn recover_tokens_reads_the_matching_debug_file()
    {
      let dir = tempfile::tempdir().unwrap();
      tokio::fs::write
      (
        dir.path().join( "req-1.debug" ),
        r#"data: {"usage":{"input_tokens":3,"output_tokens":7,"cache_creation_input_tokens":0,"cache_read_input_tokens":0}}"#,
      ).await.unwrap();

      let tokens = recover_tokens( dir.path(), "req-1" ).await.unwrap();
      assert_eq!( tokens.input, 3 );
      assert_eq!( tokens.output, 7 );
    }

    #[ tokio::test ]
    async fn pruner_deletes_oldest_files_beyond_capacity()
    {
      let dir = tempfile::tempdir().unwrap();
      for name in [ "a", "b", "c" ]
      {
        tokio::fs::write( dir.path().join( format!( "{name}.debug" ) ), b"{}" ).await.unwrap();
      }

      let pruner = DebugFilePruner::new( dir.path().to_path_buf(), 2, 365 );
      let deleted = pruner.maybe_prune( Utc::now() ).await.unwrap();

      assert_eq!( deleted, 1 );
      let mut remaining = tokio::fs::read_dir( dir.path() ).await.unwrap();
      let mut count = 0;
      while remaining.next_entry().await.unwrap().is_some()
      {
        count += 1;
      }
      assert_eq!( count, 2 );
    }

    #[ tokio::test ]
    async fn second_sweep_within_24h_is_a_no_op()
    {
      let dir = tempfile::tempdir().unwrap();
      tokio::fs::write( dir.path().join( "a.debug" ), b"{}" ).await.unwrap();

      let pruner = DebugFilePruner::new( dir.path().to_path_buf(), 0, 365 );
      let now = Utc::now();
      assert_eq!( pruner.maybe_prune( now ).await.unwrap(), 1 );
      assert_eq!( pruner.maybe_prune( now + chrono::Duration::hours( 1 ) ).await.unwrap(), 0 );
    }
  }
}

crate::mod_interface!
{
  exposed use
  {
    extract_last_usage,
    recover_tokens,
    DebugFilePruner,
  };
}
