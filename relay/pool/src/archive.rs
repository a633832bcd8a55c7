//! Background drain of terminal records into persistence
//!
//! A terminal record leaves the hot pool the instant its transition is
//! applied (see [`crate::HotPool::transition_business`]) and is hand-off
//! queued here. [`ArchiveWorker::run_forever`] drains it in batches of up
//! to `batch_size`, writing the `request_logs` row and the matching
//! `usage_summary` upsert inside one transaction so the two never
//! disagree. A write that keeps failing past `max_attempts` is persisted
//! to a disk-backed quarantine directory instead of being retried forever.

mod private
{
  use chrono::Duration;
  use parking_lot::Mutex;
  use relay_persistence::{ RequestLogStore, UsageDelta, UsageSummaryStore };
  use relay_types::{ BusinessState, RelayResult, RequestRecord };
  use std::collections::VecDeque;
  use std::path::PathBuf;
  use std::sync::Arc;
  use tokio_util::sync::CancellationToken;

  /// A record waiting to be archived, with its retry history.
  #[ derive( Debug, Clone ) ]
  struct ArchiveEntry
  {
    record : RequestRecord,
    attempts : u32,
  }

  /// FIFO hand-off queue from the hot pool to the archive worker.
  #[ derive( Debug, Default ) ]
  pub struct ArchiveQueue
  {
    entries : Mutex< VecDeque< ArchiveEntry > >,
  }

  impl ArchiveQueue
  {
    /// An empty queue.
    #[ must_use ]
    pub fn new() -> Self
    {
      Self::default()
    }

    /// Enqueue a freshly-terminal record for its first archive attempt.
    pub fn push( &self, record : RequestRecord )
    {
      self.entries.lock().push_back( ArchiveEntry { record, attempts : 0 } );
    }

    fn push_for_retry( &self, entry : ArchiveEntry )
    {
      self.entries.lock().push_back( entry );
    }

    /// Pop up to `max` entries in FIFO order.
    fn pop_batch( &self, max : usize ) -> Vec< ArchiveEntry >
    {
      let mut entries = self.entries.lock();
      let take = max.min( entries.len() );
      entries.drain( .. take ).collect()
    }

    /// Number of records currently awaiting archival.
    #[ must_use ]
    pub fn len( &self ) -> usize
    {
      self.entries.lock().len()
    }

    /// Whether the queue currently holds no records.
    #[ must_use ]
    pub fn is_empty( &self ) -> bool
    {
      self.len() == 0
    }
  }

  /// "Thin client, rich API": every bound has a spec-given default but
  /// nothing is implicit.
  #[ derive( Debug, Clone ) ]
  pub struct ArchiveConfig
  {
    /// Target batch size per drain pass (§4.6: "batches of 1-N, target 64").
    pub batch_size : usize,
    /// How often the worker checks the queue for work.
    pub poll_interval : std::time::Duration,
    /// Delay before retrying a failed write.
    pub retry_backoff : std::time::Duration,
    /// Attempts allowed before a record is quarantined instead of retried.
    pub max_attempts : u32,
    /// Directory records are written to once `max_attempts` is exceeded.
    pub quarantine_dir : PathBuf,
  }

  impl ArchiveConfig
  {
    /// Build with every bound specified explicitly.
    #[ must_use ]
    pub fn with_explicit_config
    (
      batch_size : usize,
      poll_interval : std::time::Duration,
      retry_backoff : std::time::Duration,
      max_attempts : u32,
      quarantine_dir : PathBuf,
    ) -> Self
    {
      Self { batch_size, poll_interval, retry_backoff, max_attempts, quarantine_dir }
    }

    /// Compatibility wrapper with sensible defaults: batches of 64, a one
    /// second poll, a five second retry backoff, five attempts before
    /// quarantine.
    #[ must_use ]
    pub fn new( quarantine_dir : PathBuf ) -> Self
    {
      Self::with_explicit_config( 64, std::time::Duration::from_secs( 1 ), std::time::Duration::from_secs( 5 ), 5, quarantine_dir )
    }
  }

  fn date_key( record : &RequestRecord ) -> String
  {
    record.end_time.unwrap_or( record.start_time ).format( "%Y-%m-%d" ).to_string()
  }

  /// Write one record's `request_logs` row and `usage_summary` delta in a
  /// single transaction. A `request_id` already archived is a no-op, not a
  /// second write : exactly one archive write happens per request.
  ///
  /// # Errors
  ///
  /// Returns whatever [`RelayError`](relay_types::RelayError) the stores
  /// surface on a database failure; the transaction is not committed.
  async fn archive_one
  (
    log_store : &RequestLogStore,
    usage_store : &UsageSummaryStore,
    record : &RequestRecord,
  ) -> RelayResult< () >
  {
    if log_store.get( &record.request_id ).await?.is_some()
    {
      tracing::warn!( request_id = %record.request_id, "ignoring duplicate archive attempt, request already archived" );
      return Ok( () );
    }

    let date = date_key( record );
    let model = record.model.clone().unwrap_or_else( || "unknown".to_string() );
    let channel = record.selected_channel.clone().unwrap_or_else( || "unknown".to_string() );
    let endpoint = record.selected_endpoint.as_ref().map_or_else( || "unknown".to_string(), | e | e.name.clone() );
    let delta = UsageDelta
    {
      success : record.state == BusinessState::Completed,
      tokens : record.tokens,
      cost_usd : record.cost_usd,
    };

    let mut txn = log_store.with_transaction().await?;
    log_store.upsert_in_txn( &mut txn, record ).await?;
    usage_store.accumulate_in_txn( &mut txn, &date, &model, &channel, &endpoint, delta ).await?;
    txn.commit().await
  }

  /// Write a record that exhausted its retry budget to the quarantine
  /// directory instead of losing it.
  async fn quarantine( dir : &std::path::Path, record : &RequestRecord ) -> std::io::Result< () >
  {
    tokio::fs::create_dir_all( dir ).await?;
    let path = dir.join( format!( "{}.json", record.request_id ) );
    let body = serde_json::to_vec_pretty( record ).unwrap_or_default();
    tokio::fs::write( path, body ).await
  }

  /// Drains [`ArchiveQueue`] into persistence.
  #[ derive( Debug ) ]
  pub struct ArchiveWorker
  {
    config : ArchiveConfig,
    log_store : Arc< RequestLogStore >,
    usage_store : Arc< UsageSummaryStore >,
  }

  impl ArchiveWorker
  {
    /// A worker writing through `log_store`/`usage_store` per `config`.
    #[ must_use ]
    pub fn new( config : ArchiveConfig, log_store : Arc< RequestLogStore >, usage_store : Arc< UsageSummaryStore > ) -> Self
    {
      Self { config, log_store, usage_store }
    }

    /// Drain and write one batch; entries that fail are requeued for retry
    /// (after `retry_backoff`) or quarantined once `max_attempts` is
    /// exceeded. Returns the number of records successfully archived.
    pub async fn drain_once( &self, queue : &ArchiveQueue ) -> usize
    {
      let batch = queue.pop_batch( self.config.batch_size );
      let mut archived = 0;
      for mut entry in batch
      {
        match archive_one( &self.log_store, &self.usage_store, &entry.record ).await
        {
          Ok( () ) => archived += 1,
          Err( error ) =>
          {
            entry.attempts += 1;
            if entry.attempts >= self.config.max_attempts
            {
              tracing::warn!
              (
                request_id = %entry.record.request_id,
                attempts = entry.attempts,
                %error,
                "archive write exhausted its retry budget, quarantining",
              );
              if let Err( io_error ) = quarantine( &self.config.quarantine_dir, &entry.record ).await
              {
                tracing::warn!( request_id = %entry.record.request_id, %io_error, "failed to write quarantine file" );
              }
            }
            else
            {
              tracing::warn!( request_id = %entry.record.request_id, attempt = entry.attempts, %error, "archive write failed, will retry" );
              tokio::time::sleep( self.config.retry_backoff ).await;
              queue.push_for_retry( entry );
            }
          },
        }
      }
      archived
    }

    /// Poll `queue` until `cancel` fires, draining whatever batches arrive.
    pub async fn run_forever( &self, queue : Arc< ArchiveQueue >, cancel : CancellationToken )
    {
      let mut interval = tokio::time::interval( self.config.poll_interval );
      loop
      {
        tokio::select!
        {
          () = cancel.cancelled() => break,
          _ = interval.tick() =>
          {
            if !queue.is_empty()
            {
              self.drain_once( &queue ).await;
            }
          },
        }
      }
    }
  }

  #[ cfg( test ) ]
  mod tests
  {
    use super::*;
    use chrono::Utc;

    fn record( id : &str ) -> RequestRecord
    {
      let mut record = RequestRecord::new( id.to_string(), Utc::now(), false );
      record.state = BusinessState::Completed;
      record
    }

    async fn memory_pool() -> sqlx::SqlitePool
    {
      let pool = sqlx::SqlitePool::connect( "sqlite::memory:" ).await.unwrap();
      relay_persistence::migrate( &pool ).await.unwrap();
      pool
    }

    #[ test ]
    fn queue_push_and_pop_batch_is_fifo_and_bounded()
    {
      let queue = ArchiveQueue::new();
      queue.push( record( "a" ) );
      queue.push( record( "b" ) );
      queue.push( record( "c" ) );

      let batch = queue.pop_batch( 2 );
      assert_eq!( batch.len(), 2 );
      assert_eq!( batch[ 0 ].record.request_id, "a" );
      assert_eq!( queue.len(), 1 );
    }

    #[ tokio::test ]
    async fn drain_once_writes_through_to_both_stores()
    {
      let pool = memory_pool().await;
      let log_store = Arc::new( RequestLogStore::new( pool.clone() ) );
      let usage_store = Arc::new( UsageSummaryStore::new( pool ) );
      let queue = ArchiveQueue::new();
      queue.push( record( "req-1" ) );

      let worker = ArchiveWorker::new
      (
        ArchiveConfig::new( std::env::temp_dir().join( "relay_pool_test_quarantine" ) ),
        log_store.clone(),
        usage_store,
      );
      let archived = worker.drain_once( &queue ).await;

      assert_eq!( archived, 1 );
      assert!( queue.is_empty() );
      assert!( log_store.get( "req-1" ).await.unwrap().is_some() );
    }
  }
}

crate::mod_interface!
{
  exposed use
  {
    ArchiveConfig,
    ArchiveQueue,
    ArchiveWorker,
  };
}
