//! The seam between routing and request forwarding
//!
//! The engine decides *which* endpoint to try and *when* to retry; it
//! never speaks HTTP itself. A [`Dispatch`] implementation (owned by the
//! HTTP layer) is handed one endpoint at a time and reports back a
//! [`relay_types::RelayError`] the engine classifies via
//! `RelayError::is_retryable`/`triggers_cooldown`.

mod private
{
  use relay_types::{ Endpoint, RelayResult };

  /// One attempt's outcome on success. Forwarding details (bytes streamed,
  /// token counts) are the dispatcher's business; the engine only needs to
  /// know the attempt reached a terminal, non-retryable success.
  #[ derive( Debug, Clone, Copy, Default ) ]
  pub struct DispatchSuccess
  {
    /// Observed round-trip latency, fed back into the quick-test cache.
    pub latency_ms : Option< u64 >,
  }

  /// Forwards one request attempt to `endpoint`. Implemented by the HTTP
  /// layer; the routing engine is generic over it so this crate never
  /// depends on an HTTP client or the request body.
  #[ async_trait::async_trait ]
  pub trait Dispatch : Send + Sync
  {
    /// Attempt to forward the in-flight request to `endpoint`.
    ///
    /// # Errors
    ///
    /// Returns the classified failure; the engine decides whether to
    /// retry the same candidate, fail over, or surface it to the client.
    async fn attempt( &self, endpoint : &Endpoint ) -> RelayResult< DispatchSuccess >;
  }
}

crate::mod_interface!
{
  exposed use
  {
    DispatchSuccess,
    Dispatch,
  };
}
