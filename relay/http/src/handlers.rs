//! The proxy request pipeline
//!
//! Two entry points, both mounted under `/v1/*rest` in [`crate::router`]:
//! [`proxy_regular`] buffers the whole upstream response before replying;
//! [`proxy_streaming`] pumps an SSE body to the client as it arrives. Both
//! admit a [`relay_types::RequestRecord`] into the hot pool, drive it
//! through a [`relay_routing::RoutingEngine`], and archive the terminal
//! record once routing finishes.

mod private
{
  use crate::dispatch::{ BufferedDispatcher, StreamChunk, StreamingDispatcher };
  use crate::error::ApiError;
  use crate::state::AppState;
  use axum::body::Body;
  use bytes::Bytes;
  use axum::extract::{ Request, State };
  use axum::http::{ HeaderValue, StatusCode };
  use axum::response::{ IntoResponse, Response };
  use relay_pool::HotPool;
  use relay_routing::{ BackoffConfig, RoutingConfig, RoutingEngine };
  use relay_types::{ AuthType, BusinessState, RelayError, RequestRecord };
  use std::sync::Arc;
  use std::time::Duration;
  use tokio::sync::mpsc;
  use tokio_stream::wrappers::ReceiverStream;
  use tokio_util::sync::CancellationToken;

  /// How long a request keeps polling the suspend queue for its own
  /// deferred candidate before giving up and reporting failure.
  const SUSPEND_POLL_INTERVAL : Duration = Duration::from_millis( 500 );

  const REQUEST_BODY_LIMIT : usize = 16 * 1024 * 1024;

  /// How much of a streaming request body to accumulate before giving up
  /// on finding `model`/`eof_retry_hint` near the front and scanning
  /// whatever arrived once the body ends.
  const BODY_PEEK_LIMIT : usize = 64 * 1024;

  fn new_request_id() -> String
  {
    format!( "req-{}", uuid::Uuid::new_v4() )
  }

  fn inbound_auth( headers : &axum::http::HeaderMap ) -> ( AuthType, Option< String > )
  {
    if let Some( value ) = headers.get( axum::http::header::AUTHORIZATION ).and_then( | v | v.to_str().ok() )
    {
      if let Some( token ) = value.strip_prefix( "Bearer " )
      {
        return ( AuthType::Token, Some( relay_types::AuthFingerprint::new( token ).fingerprint() ) );
      }
    }
    if let Some( value ) = headers.get( "x-api-key" ).and_then( | v | v.to_str().ok() )
    {
      return ( AuthType::ApiKey, Some( relay_types::AuthFingerprint::new( value ).fingerprint() ) );
    }
    ( AuthType::None, None )
  }

  /// Best-effort extraction of `model` and `stream` from a JSON request
  /// body; a non-JSON or absent body (e.g. `GET /v1/models`) is not an
  /// error, it simply yields `(None, false)`.
  fn inspect_body( body : &[ u8 ] ) -> ( Option< String >, bool )
  {
    let Ok( value ) = serde_json::from_slice::< serde_json::Value >( body ) else { return ( None, false ); };
    let model = value.get( "model" ).and_then( | v | v.as_str() ).map( str::to_string );
    let streaming = value.get( "stream" ).and_then( serde_json::Value::as_bool ).unwrap_or( false );
    ( model, streaming )
  }

  /// Lenient substring scan for a quoted string field, e.g. `"model":"x"`.
  /// Unlike [`inspect_body`] this does not require `text` to be complete,
  /// parseable JSON — only that the field, if present, already appeared in
  /// whatever prefix has arrived so far.
  fn extract_quoted_field( text : &str, key : &str ) -> Option< String >
  {
    let needle = format!( "\"{key}\"" );
    let key_pos = text.find( needle.as_str() )?;
    let after_key = &text[ key_pos + needle.len().. ];
    let after_colon = after_key[ after_key.find( ':' )? + 1.. ].trim_start();
    let after_quote = &after_colon[ after_colon.find( '"' )? + 1.. ];
    let end = after_quote.find( '"' )?;
    Some( after_quote[ ..end ].to_string() )
  }

  /// Lenient substring scan for a bare boolean field, e.g.
  /// `"eof_retry_hint":true`.
  fn extract_bool_field( text : &str, key : &str ) -> Option< bool >
  {
    let needle = format!( "\"{key}\"" );
    let key_pos = text.find( needle.as_str() )?;
    let after_key = &text[ key_pos + needle.len().. ];
    let after_colon = after_key[ after_key.find( ':' )? + 1.. ].trim_start();
    if after_colon.starts_with( "true" ) { Some( true ) }
    else if after_colon.starts_with( "false" ) { Some( false ) }
    else { None }
  }

  /// Stream an inbound streaming request body to completion while
  /// extracting `model` and `eof_retry_hint` from the first
  /// [`BODY_PEEK_LIMIT`] bytes (or from whatever arrived, if the body is
  /// shorter) rather than buffering the whole thing before looking at it.
  /// The full body is still accumulated, since a failover retry needs to
  /// replay it against the next candidate endpoint.
  async fn peek_streaming_body( body : Body ) -> Result< ( Bytes, Option< String >, bool ), RelayError >
  {
    use futures::StreamExt;

    let mut stream = body.into_data_stream();
    let mut buffer = bytes::BytesMut::new();
    let mut peeked : Option< ( Option< String >, bool ) > = None;

    while let Some( next ) = stream.next().await
    {
      let chunk = next.map_err( | error | RelayError::ConfigInvalid { detail : format!( "reading request body: {error}" ) } )?;
      buffer.extend_from_slice( &chunk );
      if peeked.is_none() && buffer.len() >= BODY_PEEK_LIMIT
      {
        let text = String::from_utf8_lossy( &buffer );
        peeked = Some( ( extract_quoted_field( &text, "model" ), extract_bool_field( &text, "eof_retry_hint" ).unwrap_or( false ) ) );
      }
    }

    let ( model, eof_retry_hint ) = match peeked
    {
      Some( found ) => found,
      None =>
      {
        let text = String::from_utf8_lossy( &buffer );
        ( extract_quoted_field( &text, "model" ), extract_bool_field( &text, "eof_retry_hint" ).unwrap_or( false ) )
      }
    };

    Ok( ( buffer.freeze(), model, eof_retry_hint ) )
  }

  fn path_and_query( request : &Request ) -> String
  {
    request.uri().path_and_query().map_or_else( || request.uri().path().to_string(), | pq | pq.as_str().to_string() )
  }

  async fn engine_configs( state : &AppState ) -> Result< ( RoutingConfig, BackoffConfig ), ApiError >
  {
    let routing_config = state.routing_config().await.map_err( ApiError::from )?;
    let backoff = state.backoff_config().await.map_err( ApiError::from )?;
    Ok( ( routing_config, backoff ) )
  }

  /// Run `engine.route`, then keep re-attempting a suspended request via
  /// `resume_suspended` until it resolves or `deadline` passes.
  async fn route_with_suspend_wait< D >
  (
    engine : &RoutingEngine< D >,
    request_id : &str,
    cancel : &CancellationToken,
    suspend_timeout : Duration,
  ) -> relay_routing::RouteOutcome
  where
    D : relay_routing::Dispatch,
  {
    let mut outcome = engine.route( request_id, cancel ).await;
    let deadline = tokio::time::Instant::now() + suspend_timeout;

    while matches!( outcome, relay_routing::RouteOutcome::Suspended )
    {
      if cancel.is_cancelled() || tokio::time::Instant::now() >= deadline
      {
        let elapsed_ms = u64::try_from( suspend_timeout.as_millis() ).unwrap_or( u64::MAX );
        return relay_routing::RouteOutcome::Failed( RelayError::StaleTimeout { elapsed_ms } );
      }
      tokio::time::sleep( SUSPEND_POLL_INTERVAL ).await;
      let resumed = engine.resume_suspended( cancel ).await;
      if let Some( ( _, resolved ) ) = resumed.into_iter().find( | ( id, _ ) | id == request_id )
      {
        outcome = resolved;
      }
    }
    outcome
  }

  async fn admit_record( state : &AppState, request_id : &str, model : Option< String >, streaming : bool, auth_type : AuthType, auth_fingerprint : Option< String > ) -> Result< (), ApiError >
  {
    let mut record = RequestRecord::new( request_id.to_string(), chrono::Utc::now(), streaming );
    record.model = model;
    record.auth_type = auth_type;
    record.auth_key_fingerprint = auth_fingerprint;
    state.admit( record ).map_err( ApiError::from )?;
    state.hot_pool.transition_business( request_id, BusinessState::Forwarding, chrono::Utc::now(), None ).await;
    Ok( () )
  }

  async fn finalize_terminal( hot_pool : &HotPool, archive : &relay_pool::ArchiveQueue, request_id : &str, next : BusinessState, reason : Option< String > )
  {
    if let Some( transition ) = hot_pool.transition_business( request_id, next, chrono::Utc::now(), reason ).await
    {
      if let Some( record ) = transition.terminal_record
      {
        archive.push( record );
      }
    }
  }

  async fn price_completed_request( state : &AppState, request_id : &str )
  {
    let priced = state.hot_pool.with_record( request_id, | record | ( record.model.clone(), record.selected_endpoint.clone(), record.tokens ) ).await;
    let Some( ( model, selected_endpoint, tokens ) ) = priced else { return; };

    let pricing = match &model
    {
      Some( model ) => state.pricing_store.get( model ).await.ok().flatten(),
      None => None,
    };
    let Some( pricing ) = pricing else { return; };

    let endpoint = match &selected_endpoint
    {
      Some( endpoint_ref ) => state.endpoint_store.get( endpoint_ref.id ).await.ok().flatten(),
      None => None,
    };
    let Some( endpoint ) = endpoint else { return; };

    let multipliers = relay_types::CostMultipliers
    {
      overall : endpoint.cost_multiplier_overall,
      input : endpoint.cost_multiplier_input,
      output : endpoint.cost_multiplier_output,
      cache_creation_5m : endpoint.cost_multiplier_cache_creation_5m,
      cache_creation_1h : endpoint.cost_multiplier_cache_creation_1h,
      cache_read : endpoint.cost_multiplier_cache_read,
    };
    let cost_usd = relay_types::attribute_cost( tokens, pricing, multipliers );
    state.hot_pool.with_record( request_id, | record | record.cost_usd = cost_usd ).await;
  }

  /// Buffered (non-streaming) proxy path.
  ///
  /// # Errors
  ///
  /// Returns [`ApiError`] for admission failure (pool at capacity) or a
  /// terminal routing failure with no remaining failover options.
  pub async fn proxy_regular( State( state ) : State< Arc< AppState > >, request : Request ) -> Result< Response, ApiError >
  {
    let request_id = new_request_id();
    let method = request.method().clone();
    let pq = path_and_query( &request );
    let headers = request.headers().clone();
    let ( auth_type, auth_fingerprint ) = inbound_auth( &headers );
    let body = axum::body::to_bytes( request.into_body(), REQUEST_BODY_LIMIT ).await
      .map_err( | error | ApiError::from( RelayError::ConfigInvalid { detail : format!( "reading request body: {error}" ) } ) )?;
    let ( model, _streaming_requested ) = inspect_body( &body );

    admit_record( &state, &request_id, model, false, auth_type, auth_fingerprint ).await?;

    let ( routing_config, backoff ) = engine_configs( &state ).await?;
    let ( dispatcher, slot ) = BufferedDispatcher::new( state.http_client.clone(), method, pq, headers, body, state.hot_pool.clone(), request_id.clone() );
    let engine = RoutingEngine::new( routing_config, backoff, state.catalog.clone(), state.health_registry(), state.cooldowns(), state.quick_test(), dispatcher )
      .with_quick_test_supervisor( state.health_supervisor.clone() );
    let cancel = state.shutdown.child_token();
    let suspend_timeout = state.settings.get_duration( "failover", "suspend_timeout", Duration::from_secs( 300 ) ).await.unwrap_or( Duration::from_secs( 300 ) );

    let outcome = route_with_suspend_wait( &engine, &request_id, &cancel, suspend_timeout ).await;
    let failure = match outcome
    {
      relay_routing::RouteOutcome::Completed( _ ) => None,
      relay_routing::RouteOutcome::Suspended => Some( RelayError::NetworkTransient { detail : "no_endpoints_available".to_string() } ),
      relay_routing::RouteOutcome::Failed( error ) => Some( error ),
    };

    let Some( error ) = failure else
    {
      state.hot_pool.transition_business( &request_id, BusinessState::Processing, chrono::Utc::now(), None ).await;
      price_completed_request( &state, &request_id ).await;
      finalize_terminal( &state.hot_pool, &state.archive_queue, &request_id, BusinessState::Completed, None ).await;

      let buffered = slot.lock().await.take();
      let Some( buffered ) = buffered else
      {
        return Ok( StatusCode::INTERNAL_SERVER_ERROR.into_response() );
      };
      let mut response = Response::builder().status( buffered.status ).body( Body::from( buffered.body ) )
        .unwrap_or_else( | _ | StatusCode::INTERNAL_SERVER_ERROR.into_response() );
      *response.headers_mut() = crate::dispatch::strip_inbound_headers( &buffered.headers );
      return Ok( response );
    };

    finalize_terminal( &state.hot_pool, &state.archive_queue, &request_id, BusinessState::Failed, Some( error.to_string() ) ).await;
    Err( ApiError::from( error ) )
  }

  async fn open_debug_file( state : &AppState, request_id : &str ) -> Option< Arc< tokio::sync::Mutex< tokio::fs::File > > >
  {
    let path = state.log_dir.join( format!( "{request_id}.debug" ) );
    tokio::fs::OpenOptions::new().create( true ).append( true ).open( path ).await.ok()
      .map( | file | Arc::new( tokio::sync::Mutex::new( file ) ) )
  }

  fn sse_error_frame( error : &RelayError ) -> Bytes
  {
    let payload = serde_json::json!( { "type" : "error", "error" : { "type" : "proxy_error", "message" : error.to_string() } } );
    Bytes::from( format!( "event: error\ndata: {payload}\n\n" ) )
  }

  /// The terminal frame sent for a mid-stream disconnect when the caller
  /// opted in via `eof_retry_hint`, inviting it to retry the request
  /// itself rather than surfacing a closed connection.
  fn retry_hint_frame( error : &RelayError ) -> Bytes
  {
    let payload = serde_json::json!( { "retryable" : true, "message" : error.to_string() } );
    Bytes::from( format!( "event: error\ndata: {payload}\n\n" ) )
  }

  async fn finalize_streaming
  (
    state : Arc< AppState >,
    request_id : String,
    outcome : relay_routing::RouteOutcome,
    eof_retry_hint : bool,
    tx : mpsc::Sender< StreamChunk >,
  )
  {
    let failure = match outcome
    {
      relay_routing::RouteOutcome::Completed( _ ) => None,
      relay_routing::RouteOutcome::Suspended => Some( RelayError::NetworkTransient { detail : "no_endpoints_available".to_string() } ),
      relay_routing::RouteOutcome::Failed( error ) => Some( error ),
    };

    let Some( error ) = failure else
    {
      let zero_tokens = state.hot_pool.with_record( &request_id, | record | record.tokens.total() == 0 ).await.unwrap_or( false );
      if zero_tokens
      {
        if let Some( recovered ) = relay_pool::recover_tokens( &state.log_dir, &request_id ).await
        {
          state.hot_pool.with_record( &request_id, | record | record.tokens.merge_monotonic( recovered ) ).await;
        }
      }
      price_completed_request( &state, &request_id ).await;
      finalize_terminal( &state.hot_pool, &state.archive_queue, &request_id, BusinessState::Completed, None ).await;
      return;
    };

    // A mid-stream abort only reaches the client as a frame when it opted
    // into `eof_retry_hint`; otherwise the connection simply closes. Every
    // other failure kind (the attempt never got past headers, or every
    // candidate is exhausted) is a genuine terminal error and is always
    // surfaced.
    match &error
    {
      RelayError::StreamMidwayAbort { .. } =>
      {
        if eof_retry_hint
        {
          let _ = tx.send( Ok( retry_hint_frame( &error ) ) ).await;
        }
      }
      _ =>
      {
        let _ = tx.send( Ok( sse_error_frame( &error ) ) ).await;
      }
    }
    finalize_terminal( &state.hot_pool, &state.archive_queue, &request_id, BusinessState::Failed, Some( error.to_string() ) ).await;
  }

  /// Streaming (SSE) proxy path.
  ///
  /// Builds the response body from a channel immediately, then drives
  /// routing in a background task that feeds the channel as bytes arrive
  /// upstream — the only shape compatible with [`relay_routing::Dispatch`]
  /// requiring one attempt to run to completion before the engine learns
  /// whether it succeeded.
  ///
  /// # Errors
  ///
  /// Returns [`ApiError`] only for admission failure; once the streaming
  /// body has been handed to axum, failures are reported as an SSE
  /// `event: error` frame rather than an HTTP error status.
  pub async fn proxy_streaming( State( state ) : State< Arc< AppState > >, request : Request ) -> Result< Response, ApiError >
  {
    let request_id = new_request_id();
    let method = request.method().clone();
    let pq = path_and_query( &request );
    let headers = request.headers().clone();
    let ( auth_type, auth_fingerprint ) = inbound_auth( &headers );
    let ( body, model, eof_retry_hint ) = peek_streaming_body( request.into_body() ).await.map_err( ApiError::from )?;

    admit_record( &state, &request_id, model, true, auth_type, auth_fingerprint ).await?;

    let ( routing_config, backoff ) = engine_configs( &state ).await?;
    let debug_file = open_debug_file( &state, &request_id ).await;
    let ( tx, rx ) = mpsc::channel::< StreamChunk >( 32 );
    let dispatcher = StreamingDispatcher::new( state.http_client.clone(), method, pq, headers, body, state.hot_pool.clone(), request_id.clone(), tx.clone(), debug_file );
    let engine = RoutingEngine::new( routing_config, backoff, state.catalog.clone(), state.health_registry(), state.cooldowns(), state.quick_test(), dispatcher )
      .with_quick_test_supervisor( state.health_supervisor.clone() );
    let cancel = state.shutdown.child_token();

    let background_state = state.clone();
    let background_request_id = request_id.clone();
    tokio::spawn( async move
    {
      let outcome = engine.route( &background_request_id, &cancel ).await;
      finalize_streaming( background_state, background_request_id, outcome, eof_retry_hint, tx ).await;
    } );

    let body = Body::from_stream( ReceiverStream::new( rx ) );
    let mut response = Response::new( body );
    *response.status_mut() = StatusCode::OK;
    response.headers_mut().insert( axum::http::header::CONTENT_TYPE, HeaderValue::from_static( "text/event-stream" ) );
    response.headers_mut().insert( axum::http::header::CACHE_CONTROL, HeaderValue::from_static( "no-cache" ) );
    Ok( response )
  }
}

crate::mod_interface!
{
  exposed use
  {
    proxy_regular,
    proxy_streaming,
  };
}
