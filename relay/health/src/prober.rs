//! Endpoint probing
//!
//! Issues the configured health or quick-test path against an endpoint's
//! credentials. A non-5xx response within the timeout is healthy; any
//! error, timeout, or 5xx response is unhealthy.

mod private
{
  use core::time::Duration;
  use std::collections::BTreeMap;
  use std::time::Instant;

  /// Everything a probe needs to reach and authenticate against one
  /// endpoint.
  #[ derive( Debug, Clone ) ]
  pub struct ProbeTarget
  {
    /// Endpoint primary key, used as the cache/registry key.
    pub endpoint_id : i64,
    /// Upstream base URL.
    pub url : String,
    /// Bearer token credential, if any.
    pub bearer_token : Option< String >,
    /// `x-api-key` credential, if any.
    pub api_key : Option< String >,
    /// Extra headers merged onto the probe request.
    pub custom_headers : BTreeMap< String, String >,
  }

  /// Result of one probe attempt.
  #[ derive( Debug, Clone, PartialEq ) ]
  pub struct ProbeOutcome
  {
    /// Whether the probe considered the endpoint healthy.
    pub healthy : bool,
    /// Observed round-trip latency, if the request completed at all.
    pub latency_ms : Option< u64 >,
    /// Human-readable failure reason, present only when unhealthy.
    pub error : Option< String >,
  }

  /// Issue one probe against `target.url` + `path`, bounded by `timeout`.
  pub async fn probe( client : &reqwest::Client, target : &ProbeTarget, path : &str, timeout : Duration ) -> ProbeOutcome
  {
    let url = format!( "{}{path}", target.url.trim_end_matches( '/' ) );
    let mut request = client.get( &url ).timeout( timeout );

    if let Some( token ) = &target.bearer_token
    {
      request = request.bearer_auth( token );
    }
    if let Some( key ) = &target.api_key
    {
      request = request.header( "x-api-key", key );
    }
    for ( name, value ) in &target.custom_headers
    {
      request = request.header( name, value );
    }

    let start = Instant::now();
    match request.send().await
    {
      Ok( response ) =>
      {
        let latency_ms = u64::try_from( start.elapsed().as_millis() ).unwrap_or( u64::MAX );
        if response.status().is_server_error()
        {
          ProbeOutcome { healthy : false, latency_ms : Some( latency_ms ), error : Some( format!( "HTTP {}", response.status() ) ) }
        }
        else
        {
          ProbeOutcome { healthy : true, latency_ms : Some( latency_ms ), error : None }
        }
      }
      Err( error ) if error.is_timeout() =>
      {
        ProbeOutcome { healthy : false, latency_ms : None, error : Some( "probe timed out".to_string() ) }
      }
      Err( error ) =>
      {
        ProbeOutcome { healthy : false, latency_ms : None, error : Some( error.to_string() ) }
      }
    }
  }
}

crate::mod_interface!
{
  exposed use
  {
    ProbeTarget,
    ProbeOutcome,
    probe,
  };
}
