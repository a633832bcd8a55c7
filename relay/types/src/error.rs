//! The relay fabric's error taxonomy
//!
//! One enum, matched on by every crate that needs to decide whether to
//! retry, fail over, suspend an endpoint, or simply report failure to the
//! client. Never string-matched — each call site pattern-matches the
//! discriminant directly.

mod private
{
  use core::fmt;

  /// Every way a proxied request can fail, as classified at the point the
  /// failure was observed.
  #[ derive( Debug, Clone ) ]
  pub enum RelayError
  {
    /// Connection refused, reset, timed out, or DNS failed before any
    /// response bytes were read. Retryable.
    NetworkTransient
    {
      /// Lower-level description, e.g. from the HTTP client.
      detail : String,
    },
    /// Upstream responded with a `5xx` status.
    UpstreamServerError
    {
      /// HTTP status code.
      status : u16,
      /// Upstream-provided body, truncated.
      body : String,
    },
    /// Upstream responded `429`.
    UpstreamRateLimited
    {
      /// `Retry-After` header value, if present.
      retry_after_seconds : Option< u64 >,
    },
    /// Upstream responded with a `4xx` status other than `429`. Not
    /// retryable against the same endpoint.
    UpstreamClientError
    {
      /// HTTP status code.
      status : u16,
      /// Upstream-provided body, truncated.
      body : String,
    },
    /// The connection dropped partway through an SSE stream, after some
    /// events were already forwarded to the client.
    StreamMidwayAbort
    {
      /// Number of SSE events already forwarded before the abort.
      events_forwarded : usize,
    },
    /// The inbound client disconnected or cancelled before completion.
    ClientCancelled,
    /// A request sat in the `Suspended` error state longer than the
    /// configured maximum and was given up on.
    StaleTimeout
    {
      /// How long the request had been outstanding, in milliseconds.
      elapsed_ms : u64,
    },
    /// A configuration file failed to parse or failed validation.
    ConfigInvalid
    {
      /// Description of what was wrong.
      detail : String,
    },
    /// The on-disk schema version does not match what this binary expects.
    SchemaIncompatible
    {
      /// Schema version found on disk.
      found : i64,
      /// Schema version this binary expects.
      expected : i64,
    },
    /// The store could not acquire a connection or lock in time, but may
    /// succeed if retried.
    StorageBusy
    {
      /// Lower-level description.
      detail : String,
    },
    /// The store failed in a way that retrying will not fix.
    StorageFatal
    {
      /// Lower-level description.
      detail : String,
    },
    /// An upstream `usage` object could not be parsed into token counters.
    UsageParseFailed
    {
      /// Lower-level description.
      detail : String,
    },
  }

  impl RelayError
  {
    /// Whether this failure should be retried against a different endpoint
    /// rather than reported straight back to the client.
    #[ must_use ]
    pub fn is_retryable( &self ) -> bool
    {
      matches!
      (
        self,
        Self::NetworkTransient { .. }
          | Self::UpstreamServerError { .. }
          | Self::UpstreamRateLimited { .. }
      )
    }

    /// Whether this failure should place the offending endpoint into
    /// cooldown.
    #[ must_use ]
    pub fn triggers_cooldown( &self ) -> bool
    {
      matches!
      (
        self,
        Self::NetworkTransient { .. }
          | Self::UpstreamServerError { .. }
          | Self::UpstreamRateLimited { .. }
      )
    }

    /// The HTTP status this error should be reported to the inbound client
    /// as, when no more failover options remain.
    #[ must_use ]
    pub fn client_status( &self ) -> u16
    {
      match self
      {
        Self::NetworkTransient { .. } | Self::StorageBusy { .. } => 503,
        Self::UpstreamServerError { status, .. } | Self::UpstreamClientError { status, .. } => *status,
        Self::UpstreamRateLimited { .. } => 429,
        Self::StreamMidwayAbort { .. } => 502,
        Self::ClientCancelled => 499,
        Self::StaleTimeout { .. } => 504,
        Self::ConfigInvalid { .. } | Self::SchemaIncompatible { .. } | Self::StorageFatal { .. } => 500,
        Self::UsageParseFailed { .. } => 200,
      }
    }
  }

  impl fmt::Display for RelayError
  {
    fn fmt( &self, f : &mut fmt::Formatter< '_ > ) -> fmt::Result
    {
      match self
      {
        Self::NetworkTransient { detail } => write!( f, "network transient error: {detail}" ),
        Self::UpstreamServerError { status, body } =>
          write!( f, "upstream server error {status}: {body}" ),
        Self::UpstreamRateLimited { retry_after_seconds } => match retry_after_seconds
        {
          Some( secs ) => write!( f, "upstream rate limited, retry after {secs}s" ),
          None => write!( f, "upstream rate limited" ),
        },
        Self::UpstreamClientError { status, body } =>
          write!( f, "upstream client error {status}: {body}" ),
        Self::StreamMidwayAbort { events_forwarded } =>
          write!( f, "stream aborted after {events_forwarded} events forwarded" ),
        Self::ClientCancelled => write!( f, "client cancelled the request" ),
        Self::StaleTimeout { elapsed_ms } => write!( f, "request stale after {elapsed_ms}ms" ),
        Self::ConfigInvalid { detail } => write!( f, "invalid configuration: {detail}" ),
        Self::SchemaIncompatible { found, expected } =>
          write!( f, "schema version {found} incompatible, expected {expected}" ),
        Self::StorageBusy { detail } => write!( f, "storage busy: {detail}" ),
        Self::StorageFatal { detail } => write!( f, "storage error: {detail}" ),
        Self::UsageParseFailed { detail } => write!( f, "failed to parse usage: {detail}" ),
      }
    }
  }

  impl core::error::Error for RelayError {}

  /// Convenience alias used throughout the relay fabric.
  pub type RelayResult< T > = core::result::Result< T, RelayError >;

  #[ cfg( test ) ]
  mod tests
  {
    use super::*;

    #[ test ]
    fn network_transient_is_retryable_and_triggers_cooldown()
    {
      let err = RelayError::NetworkTransient { detail : "connection reset".to_string() };
      assert!( err.is_retryable() );
      assert!( err.triggers_cooldown() );
    }

    #[ test ]
    fn upstream_client_error_is_not_retryable()
    {
      let err = RelayError::UpstreamClientError { status : 400, body : String::new() };
      assert!( !err.is_retryable() );
      assert!( !err.triggers_cooldown() );
    }

    #[ test ]
    fn client_cancelled_reports_499()
    {
      assert_eq!( RelayError::ClientCancelled.client_status(), 499 );
    }

    #[ test ]
    fn upstream_server_error_propagates_status()
    {
      let err = RelayError::UpstreamServerError { status : 503, body : String::new() };
      assert_eq!( err.client_status(), 503 );
    }

    #[ test ]
    fn display_includes_detail()
    {
      let err = RelayError::ConfigInvalid { detail : "missing field foo".to_string() };
      assert!( err.to_string().contains( "missing field foo" ) );
    }
  }
}

crate::mod_interface!
{
  exposed use
  {
    RelayError,
    RelayResult,
  };
}
