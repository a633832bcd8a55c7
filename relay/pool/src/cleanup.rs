//! Periodic stale-request sweep
//!
//! Every `interval` (default one minute), scans the hot pool for records
//! older than its configured `max_age`, fails each one with reason
//! `stale_timeout`, hands it to the archive queue, and evicts the slot.
//! The same tick also gives the debug-file pruner a chance to run — it
//! self-throttles to once per 24 hours, so calling it every minute costs
//! nothing beyond a clock check on the ticks that don't sweep.

mod private
{
  use crate::archive::ArchiveQueue;
  use crate::hot_pool::HotPool;
  use chrono::Utc;
  use relay_types::BusinessState;
  use std::sync::Arc;
  use tokio_util::sync::CancellationToken;

  const STALE_TIMEOUT_REASON : &str = "stale_timeout";

  /// Runs the stale-request sweep on a fixed tick until `cancel` fires.
  pub async fn run_forever
  (
    pool : Arc< HotPool >,
    archive : Arc< ArchiveQueue >,
    pruner : Arc< crate::debug_file::DebugFilePruner >,
    interval : std::time::Duration,
    cancel : CancellationToken,
  )
  {
    let mut ticker = tokio::time::interval( interval );
    loop
    {
      tokio::select!
      {
        () = cancel.cancelled() => break,
        _ = ticker.tick() => sweep_once( &pool, &archive, &pruner ).await,
      }
    }
  }

  async fn sweep_once( pool : &HotPool, archive : &ArchiveQueue, pruner : &crate::debug_file::DebugFilePruner )
  {
    let now = Utc::now();
    for request_id in pool.scan_older_than( now )
    {
      let outcome = pool.transition_business
      (
        &request_id,
        BusinessState::Failed,
        now,
        Some( STALE_TIMEOUT_REASON.to_string() ),
      ).await;

      if let Some( outcome ) = outcome
      {
        if let Some( record ) = outcome.terminal_record
        {
          tracing::warn!( request_id = %record.request_id, "evicting stale request past max age" );
          archive.push( record );
        }
      }
    }

    if let Err( error ) = pruner.maybe_prune( now ).await
    {
      tracing::warn!( %error, "debug-file prune sweep failed" );
    }
  }

  #[ cfg( test ) ]
  mod tests
  {
    use super::*;
    use crate::debug_file::DebugFilePruner;
    use crate::hot_pool::HotPoolConfig;
    use chrono::Duration;
    use relay_lifecycle::LifecycleManager;
    use relay_types::RequestRecord;

    #[ tokio::test ]
    async fn sweep_fails_stale_records_and_enqueues_them_for_archive()
    {
      let config = HotPoolConfig::new().with_max_age( Duration::seconds( 0 ) );
      let pool = Arc::new( HotPool::new( config, Arc::new( LifecycleManager::new() ) ) );
      pool.admit( RequestRecord::new( "stale".to_string(), Utc::now() - Duration::seconds( 5 ), false ) ).unwrap();
      let archive = Arc::new( ArchiveQueue::new() );
      let dir = tempfile::tempdir().unwrap();
      let pruner = DebugFilePruner::new( dir.path().to_path_buf(), 100, 365 );

      sweep_once( &pool, &archive, &pruner ).await;

      assert!( pool.is_empty() );
      assert_eq!( archive.len(), 1 );
    }

    #[ tokio::test ]
    async fn sweep_leaves_fresh_records_alone()
    {
      let pool = Arc::new( HotPool::new( HotPoolConfig::new(), Arc::new( LifecycleManager::new() ) ) );
      pool.admit( RequestRecord::new( "fresh".to_string(), Utc::now(), false ) ).unwrap();
      let archive = Arc::new( ArchiveQueue::new() );
      let dir = tempfile::tempdir().unwrap();
      let pruner = DebugFilePruner::new( dir.path().to_path_buf(), 100, 365 );

      sweep_once( &pool, &archive, &pruner ).await;

      assert_eq!( pool.len(), 1 );
      assert!( archive.is_empty() );
    }
  }
}

crate::mod_interface!
{
  exposed use run_forever;
}
