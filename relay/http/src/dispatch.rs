//! Real upstream forwarding
//!
//! Implements [`relay_routing::Dispatch`] for one inbound request. The
//! routing engine hands this one endpoint at a time; everything else
//! needed to repeat the attempt across a failover — method, path, headers,
//! body, and where to hand finished bytes back — lives on the struct,
//! built once per request by the proxy handlers in [`crate::handlers`].

mod private
{
  use async_trait::async_trait;
  use axum::http::{ HeaderMap, Method };
  use bytes::Bytes;
  use relay_pool::HotPool;
  use relay_routing::{ Dispatch, DispatchSuccess };
  use relay_types::{ Endpoint, EndpointRef, RelayError, RelayResult, TokenCounters };
  use std::sync::Arc;
  use std::time::{ Duration, Instant };
  use tokio::sync::{ mpsc, Mutex as AsyncMutex };

  /// Headers never forwarded upstream or back to the client: hop-by-hop
  /// per RFC 7230 §6.1, plus `host`/`content-length`/the inbound
  /// credential, which every endpoint replaces with its own.
  const STRIPPED_HEADERS : &[ &str ] =
  &[
    "connection", "keep-alive", "proxy-authenticate", "proxy-authorization",
    "te", "trailers", "transfer-encoding", "upgrade", "host", "content-length",
    "authorization", "x-api-key",
  ];

  /// Inbound headers with hop-by-hop and credential headers removed, ready
  /// to merge with one endpoint's own auth and custom headers.
  #[ must_use ]
  pub fn strip_inbound_headers( inbound : &HeaderMap ) -> HeaderMap
  {
    let mut headers = HeaderMap::new();
    for ( name, value ) in inbound
    {
      if !STRIPPED_HEADERS.contains( &name.as_str() )
      {
        headers.append( name.clone(), value.clone() );
      }
    }
    headers
  }

  /// Truncate an upstream error body for inclusion in a [`RelayError`].
  fn truncated_body( body : &[ u8 ] ) -> String
  {
    const MAX_LEN : usize = 2048;
    let text = String::from_utf8_lossy( body );
    if text.len() > MAX_LEN { format!( "{}…", &text[ ..MAX_LEN ] ) } else { text.into_owned() }
  }

  /// Everything a non-streaming attempt hands back once it succeeds.
  #[ derive( Debug, Clone ) ]
  pub struct BufferedResponse
  {
    /// Upstream HTTP status.
    pub status : u16,
    /// Upstream response headers, hop-by-hop entries not yet stripped.
    pub headers : HeaderMap,
    /// Full response body.
    pub body : Bytes,
  }

  /// Holds the first successful buffered attempt's response; `None` until
  /// then.
  pub type BufferedSlot = Arc< AsyncMutex< Option< BufferedResponse > > >;

  /// A dispatcher that buffers the whole upstream response before
  /// returning, for non-streaming requests.
  pub struct BufferedDispatcher
  {
    client : reqwest::Client,
    method : Method,
    path_and_query : String,
    inbound_headers : HeaderMap,
    body : Bytes,
    hot_pool : Arc< HotPool >,
    request_id : String,
    slot : BufferedSlot,
  }

  impl BufferedDispatcher
  {
    /// Build a dispatcher for `request_id`; `slot` is populated on the
    /// first successful attempt.
    #[ must_use ]
    pub fn new
    (
      client : reqwest::Client,
      method : Method,
      path_and_query : String,
      inbound_headers : HeaderMap,
      body : Bytes,
      hot_pool : Arc< HotPool >,
      request_id : String,
    ) -> ( Self, BufferedSlot )
    {
      let slot : BufferedSlot = Arc::new( AsyncMutex::new( None ) );
      let dispatcher = Self
      {
        client, method, path_and_query, inbound_headers, body, hot_pool, request_id,
        slot : slot.clone(),
      };
      ( dispatcher, slot )
    }
  }

  /// Record on the in-flight request which endpoint this attempt is
  /// against, clearing any partial counters the previous failed attempt
  /// left behind (§4.6 duplicate-billing protection).
  async fn begin_attempt( hot_pool : &HotPool, request_id : &str, endpoint : &Endpoint )
  {
    hot_pool.with_record( request_id, | record |
    {
      record.tokens.zero();
      record.selected_endpoint = Some( EndpointRef
      {
        id : endpoint.id,
        channel : endpoint.channel.clone(),
        name : endpoint.name.clone(),
      } );
      record.selected_channel = Some( endpoint.channel.clone() );
      record.retry_count += 1;
    } ).await;
  }

  fn build_request
  (
    client : &reqwest::Client,
    method : Method,
    url : &str,
    inbound_headers : &HeaderMap,
    body : Bytes,
    endpoint : &Endpoint,
  ) -> reqwest::RequestBuilder
  {
    let mut request = client
      .request( method, url )
      .headers( strip_inbound_headers( inbound_headers ) )
      .timeout( Duration::from_secs( endpoint.timeout_seconds ) )
      .body( body );

    if let Some( token ) = &endpoint.bearer_token
    {
      request = request.bearer_auth( token );
    }
    if let Some( key ) = &endpoint.api_key
    {
      request = request.header( "x-api-key", key );
    }
    for ( name, value ) in &endpoint.custom_headers
    {
      request = request.header( name, value );
    }
    request
  }

  /// Classify a non-2xx upstream status into the matching [`RelayError`].
  async fn classify_error_status( response : reqwest::Response, status : reqwest::StatusCode ) -> RelayError
  {
    if status.as_u16() == 429
    {
      let retry_after_seconds = response.headers().get( "retry-after" )
        .and_then( | v | v.to_str().ok() )
        .and_then( | v | v.parse().ok() );
      return RelayError::UpstreamRateLimited { retry_after_seconds };
    }
    let body = response.bytes().await.unwrap_or_default();
    if status.is_server_error()
    {
      RelayError::UpstreamServerError { status : status.as_u16(), body : truncated_body( &body ) }
    }
    else
    {
      RelayError::UpstreamClientError { status : status.as_u16(), body : truncated_body( &body ) }
    }
  }

  /// Extract a `"usage":{...}` object from a buffered JSON body, falling
  /// back to zero counters (and a logged warning) when none parses — a
  /// malformed usage object must not fail an otherwise-successful response.
  fn extract_usage( body : &[ u8 ] ) -> TokenCounters
  {
    let text = String::from_utf8_lossy( body );
    relay_pool::extract_last_usage( &text ).unwrap_or_else( ||
    {
      tracing::warn!( "response body carried no parseable usage object; billing zero tokens" );
      TokenCounters::default()
    } )
  }

  #[ async_trait ]
  impl Dispatch for BufferedDispatcher
  {
    async fn attempt( &self, endpoint : &Endpoint ) -> RelayResult< DispatchSuccess >
    {
      begin_attempt( &self.hot_pool, &self.request_id, endpoint ).await;

      let url = format!( "{}{}", endpoint.url.trim_end_matches( '/' ), self.path_and_query );
      let request = build_request( &self.client, self.method.clone(), &url, &self.inbound_headers, self.body.clone(), endpoint );

      let start = Instant::now();
      let response = request.send().await.map_err( | error |
        RelayError::NetworkTransient { detail : error.to_string() } )?;

      let status = response.status();
      if !status.is_success()
      {
        return Err( classify_error_status( response, status ).await );
      }

      let headers = response.headers().clone();
      let body = response.bytes().await.map_err( | error |
        RelayError::NetworkTransient { detail : error.to_string() } )?;
      let tokens = extract_usage( &body );
      let latency_ms = u64::try_from( start.elapsed().as_millis() ).unwrap_or( u64::MAX );

      self.hot_pool.with_record( &self.request_id, | record |
      {
        record.tokens.merge_monotonic( tokens );
        record.http_status = Some( status.as_u16() );
      } ).await;

      *self.slot.lock().await = Some( BufferedResponse { status : status.as_u16(), headers, body } );

      Ok( DispatchSuccess { latency_ms : Some( latency_ms ) } )
    }
  }

  /// A chunk of the upstream SSE body, forwarded to the client as-is.
  pub type StreamChunk = Result< Bytes, std::io::Error >;

  /// A dispatcher that pumps the upstream SSE body to a channel as it
  /// arrives, for streaming requests. Built once the channel's receiving
  /// half has already been handed to axum as the response body.
  pub struct StreamingDispatcher
  {
    client : reqwest::Client,
    method : Method,
    path_and_query : String,
    inbound_headers : HeaderMap,
    body : Bytes,
    hot_pool : Arc< HotPool >,
    request_id : String,
    tx : mpsc::Sender< StreamChunk >,
    debug_file : Option< Arc< AsyncMutex< tokio::fs::File > > >,
  }

  impl StreamingDispatcher
  {
    /// Build a dispatcher forwarding bytes onto `tx`. `debug_file`, when
    /// present, receives every decoded SSE line so a clean close with no
    /// parseable terminal usage can be recovered from later.
    #[ must_use ]
    pub fn new
    (
      client : reqwest::Client,
      method : Method,
      path_and_query : String,
      inbound_headers : HeaderMap,
      body : Bytes,
      hot_pool : Arc< HotPool >,
      request_id : String,
      tx : mpsc::Sender< StreamChunk >,
      debug_file : Option< Arc< AsyncMutex< tokio::fs::File > > >,
    ) -> Self
    {
      Self { client, method, path_and_query, inbound_headers, body, hot_pool, request_id, tx, debug_file }
    }

    /// Read the upstream body line-by-line, forwarding every chunk on
    /// `self.tx` and extracting `usage` objects as they appear. Once at
    /// least one chunk has already reached the client, a dropped
    /// connection returns [`RelayError::StreamMidwayAbort`] (never
    /// retryable — the client has already seen partial output). If the
    /// connection drops before any application byte was forwarded, the
    /// headers-only attempt is still safe to retry against a different
    /// endpoint, so that case returns [`RelayError::NetworkTransient`]
    /// instead.
    async fn pump( &self, response : reqwest::Response, start : Instant ) -> RelayResult< DispatchSuccess >
    {
      use futures::StreamExt;
      use tokio::io::AsyncWriteExt;

      self.hot_pool.transition_business( &self.request_id, relay_types::BusinessState::Streaming, chrono::Utc::now(), None ).await;

      let mut byte_stream = response.bytes_stream();
      let mut line_buffer : Vec< u8 > = Vec::new();
      let mut events_forwarded = 0_usize;
      let mut first_byte_latency = None;

      while let Some( next ) = byte_stream.next().await
      {
        let chunk = match next
        {
          Ok( chunk ) => chunk,
          Err( error ) =>
          {
            tracing::warn!( error = %error, events_forwarded, "upstream stream dropped mid-transfer" );
            if events_forwarded == 0
            {
              return Err( RelayError::NetworkTransient { detail : error.to_string() } );
            }
            return Err( RelayError::StreamMidwayAbort { events_forwarded } );
          }
        };

        if first_byte_latency.is_none()
        {
          first_byte_latency = Some( u64::try_from( start.elapsed().as_millis() ).unwrap_or( u64::MAX ) );
        }

        line_buffer.extend_from_slice( &chunk );
        while let Some( newline ) = line_buffer.iter().position( | b | *b == b'\n' )
        {
          let line : Vec< u8 > = line_buffer.drain( ..=newline ).collect();
          if let Some( file ) = &self.debug_file
          {
            let _ = file.lock().await.write_all( &line ).await;
          }
          if let Some( usage ) = relay_pool::extract_last_usage( &String::from_utf8_lossy( &line ) )
          {
            self.hot_pool.with_record( &self.request_id, | record | record.tokens.merge_monotonic( usage ) ).await;
          }
        }

        events_forwarded += 1;
        if self.tx.send( Ok( chunk ) ).await.is_err()
        {
          return Err( RelayError::ClientCancelled );
        }
      }

      Ok( DispatchSuccess { latency_ms : first_byte_latency } )
    }
  }

  #[ async_trait ]
  impl Dispatch for StreamingDispatcher
  {
    async fn attempt( &self, endpoint : &Endpoint ) -> RelayResult< DispatchSuccess >
    {
      begin_attempt( &self.hot_pool, &self.request_id, endpoint ).await;

      let url = format!( "{}{}", endpoint.url.trim_end_matches( '/' ), self.path_and_query );
      let request = build_request( &self.client, self.method.clone(), &url, &self.inbound_headers, self.body.clone(), endpoint );

      let start = Instant::now();
      let response = request.send().await.map_err( | error |
        RelayError::NetworkTransient { detail : error.to_string() } )?;

      let status = response.status();
      if !status.is_success()
      {
        return Err( classify_error_status( response, status ).await );
      }

      self.hot_pool.with_record( &self.request_id, | record | record.http_status = Some( status.as_u16() ) ).await;
      self.pump( response, start ).await
    }
  }
}

crate::mod_interface!
{
  exposed use
  {
    strip_inbound_headers,
    BufferedResponse,
    BufferedSlot,
    BufferedDispatcher,
    StreamChunk,
    StreamingDispatcher,
  };
}
