//! `relay-http` binary
//!
//! Parses CLI flags, resolves the seed file, opens the database, wires
//! every component crate into one [`relay_http::AppState`], binds the
//! listener through the port manager, and serves the proxy + admin router
//! until a shutdown signal fires. Exit code `0` on a clean shutdown, `1`
//! on any startup failure.

use clap::Parser;
use relay_catalog::{ Catalog, CatalogEvent };
use relay_health::{ CooldownRegistry, HealthSupervisor, ProbeConfig, ProbeScope, ProbeTarget };
use relay_http::{ AppState, CliArgs, ServerConfig };
use relay_lifecycle::LifecycleManager;
use relay_persistence::
{
  ChannelStore, EndpointStore, ModelPricingStore, RequestLogStore, SettingStore, UsageSummaryStore,
};
use relay_pool::{ ArchiveConfig, ArchiveQueue, ArchiveWorker, DebugFilePruner, HotPool, HotPoolConfig };
use relay_settings::SettingsService;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Directory per-request streaming debug files and the archive quarantine
/// live under, relative to the working directory.
const LOG_DIR : &str = "relay-logs";
const CLEANUP_INTERVAL : std::time::Duration = std::time::Duration::from_secs( 60 );
const PORT_FALLBACK_ATTEMPTS : u16 = 20;

#[ tokio::main ]
async fn main()
{
  tracing_subscriber::fmt()
    .with_env_filter( tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else( | _ | tracing_subscriber::EnvFilter::new( "info" ) ) )
    .init();

  if let Err( error ) = run().await
  {
    tracing::error!( %error, "relay-http failed to start" );
    std::process::exit( 1 );
  }
}

async fn run() -> Result< (), Box< dyn std::error::Error > >
{
  let args = CliArgs::parse();
  let config = ServerConfig::from_seed_file( &args ).await?;

  let pool = relay_persistence::open( &config.db_path ).await?;
  let channel_store = Arc::new( ChannelStore::new( pool.clone() ) );
  let endpoint_store = Arc::new( EndpointStore::new( pool.clone() ) );
  let pricing_store = Arc::new( ModelPricingStore::new( pool.clone() ) );
  let request_log_store = Arc::new( RequestLogStore::new( pool.clone() ) );
  let usage_summary_store = Arc::new( UsageSummaryStore::new( pool.clone() ) );
  let setting_store = Arc::new( SettingStore::new( pool.clone() ) );

  let settings = Arc::new( SettingsService::new( setting_store.clone() ) );
  settings.ensure_defaults_seeded().await?;

  let catalog = Arc::new( Catalog::new() );
  catalog.update_from_persistence( &channel_store, &endpoint_store, CatalogEvent::Reconciled ).await?;

  let cooldowns = Arc::new( CooldownRegistry::new() );
  let health_supervisor = Arc::new( HealthSupervisor::new( ProbeConfig::new(), cooldowns ) );

  let lifecycle = Arc::new( LifecycleManager::new() );
  let hot_pool = Arc::new( HotPool::new( HotPoolConfig::new(), lifecycle.clone() ) );
  let archive_queue = Arc::new( ArchiveQueue::new() );

  let log_dir = PathBuf::from( LOG_DIR );
  tokio::fs::create_dir_all( &log_dir ).await?;

  let shutdown = CancellationToken::new();

  let ( listener, port_info ) = relay_http::bind_with_fallback( &config.host, config.port, PORT_FALLBACK_ATTEMPTS ).await?;
  tracing::info!( host = %config.host, port = port_info.actual_port, was_occupied = port_info.was_occupied, "listener bound" );

  let state = Arc::new( AppState
  {
    catalog,
    channel_store,
    endpoint_store,
    pricing_store,
    request_log_store,
    usage_summary_store,
    setting_store,
    settings,
    health_supervisor,
    lifecycle,
    hot_pool,
    archive_queue,
    http_client : reqwest::Client::builder().build()?,
    log_dir,
    started_at : chrono::Utc::now(),
    shutdown : shutdown.clone(),
    port_info,
  } );

  spawn_background_tasks( &state );

  let app = relay_http::router()
    .with_state( state )
    .layer( tower_http::trace::TraceLayer::new_for_http() );

  axum::serve( listener, app )
    .with_graceful_shutdown( shutdown_signal( shutdown ) )
    .await?;

  tracing::info!( "relay-http shut down cleanly" );
  Ok( () )
}

/// Wait for either `SIGINT` or (on unix) `SIGTERM`, then cancel `shutdown`
/// so every per-request routing call and background worker unwinds.
async fn shutdown_signal( shutdown : CancellationToken )
{
  let ctrl_c = async
  {
    let _ = tokio::signal::ctrl_c().await;
  };

  #[ cfg( unix ) ]
  let terminate = async
  {
    let mut signal = tokio::signal::unix::signal( tokio::signal::unix::SignalKind::terminate() )
      .expect( "installing SIGTERM handler" );
    signal.recv().await;
  };

  #[ cfg( not( unix ) ) ]
  let terminate = std::future::pending::< () >();

  tokio::select!
  {
    () = ctrl_c => {},
    () = terminate => {},
  }

  tracing::info!( "shutdown signal received" );
  shutdown.cancel();
}

/// Spawn every long-running worker this process owns : the health probe
/// loop, the catalog reconciler, the archive drain, and the stale-request
/// cleanup sweep (which also throttles the debug-file pruner).
fn spawn_background_tasks( state : &Arc< AppState > )
{
  let probe_state = state.clone();
  let probe_cancel = state.shutdown.child_token();
  tokio::spawn( async move
  {
    let scope_fn = ||
    {
      let mut in_scope = Vec::new();
      for entry in &probe_state.catalog.current().channels
      {
        for endpoint in &entry.endpoints
        {
          if !endpoint.enabled
          {
            continue;
          }
          in_scope.push( ProbeTarget
          {
            endpoint_id : endpoint.id,
            url : endpoint.url.clone(),
            bearer_token : endpoint.bearer_token.clone(),
            api_key : endpoint.api_key.clone(),
            custom_headers : endpoint.custom_headers.clone(),
          } );
        }
      }
      ProbeScope { in_scope, out_of_scope : Vec::new() }
    };
    probe_state.health_supervisor.run_forever( scope_fn, probe_cancel ).await;
  } );

  let reconciler_state = state.clone();
  let reconciler_cancel = state.shutdown.child_token();
  tokio::spawn( async move
  {
    reconciler_state.catalog.run_reconciler(
      &reconciler_state.channel_store,
      &reconciler_state.endpoint_store,
      std::time::Duration::from_secs( 30 ),
      reconciler_cancel,
    ).await;
  } );

  let archive_state = state.clone();
  let archive_cancel = state.shutdown.child_token();
  tokio::spawn( async move
  {
    let config = ArchiveConfig::new( archive_state.log_dir.join( "quarantine" ) );
    let worker = ArchiveWorker::new( config, archive_state.request_log_store.clone(), archive_state.usage_summary_store.clone() );
    worker.run_forever( archive_state.archive_queue.clone(), archive_cancel ).await;
  } );

  let cleanup_state = state.clone();
  let cleanup_cancel = state.shutdown.child_token();
  tokio::spawn( async move
  {
    let pruner = Arc::new( DebugFilePruner::new( cleanup_state.log_dir.clone(), 10_000, 30 ) );
    relay_pool::run_forever(
      cleanup_state.hot_pool.clone(),
      cleanup_state.archive_queue.clone(),
      pruner,
      CLEANUP_INTERVAL,
      cleanup_cancel,
    ).await;
  } );
}
