//! `RelayError` to HTTP response mapping
//!
//! No string matching — [`RelayError::client_status`] already classifies
//! on the discriminant, so this module only wraps that into an
//! `axum::response::IntoResponse` and a consistent JSON problem body.

mod private
{
  use axum::http::StatusCode;
  use axum::response::{ IntoResponse, Response };
  use axum::Json;
  use relay_types::RelayError;
  use serde::Serialize;

  /// The JSON body every failed request or admin call returns.
  #[ derive( Debug, Serialize ) ]
  struct ProblemBody
  {
    error : String,
    detail : String,
  }

  /// Newtype so `relay_http` can impl a foreign trait (`IntoResponse`) on
  /// a foreign type (`RelayError`) without an orphan-rule violation.
  #[ derive( Debug ) ]
  pub struct ApiError( pub RelayError );

  impl From< RelayError > for ApiError
  {
    fn from( error : RelayError ) -> Self
    {
      Self( error )
    }
  }

  impl IntoResponse for ApiError
  {
    fn into_response( self ) -> Response
    {
      let status = StatusCode::from_u16( self.0.client_status() ).unwrap_or( StatusCode::INTERNAL_SERVER_ERROR );
      let body = ProblemBody
      {
        error : variant_name( &self.0 ).to_string(),
        detail : self.0.to_string(),
      };
      ( status, Json( body ) ).into_response()
    }
  }

  fn variant_name( error : &RelayError ) -> &'static str
  {
    match error
    {
      RelayError::NetworkTransient { .. } => "network_transient",
      RelayError::UpstreamServerError { .. } => "upstream_server_error",
      RelayError::UpstreamRateLimited { .. } => "upstream_rate_limited",
      RelayError::UpstreamClientError { .. } => "upstream_client_error",
      RelayError::StreamMidwayAbort { .. } => "stream_midway_abort",
      RelayError::ClientCancelled => "client_cancelled",
      RelayError::StaleTimeout { .. } => "stale_timeout",
      RelayError::ConfigInvalid { .. } => "config_invalid",
      RelayError::SchemaIncompatible { .. } => "schema_incompatible",
      RelayError::StorageBusy { .. } => "storage_busy",
      RelayError::StorageFatal { .. } => "storage_fatal",
      RelayError::UsageParseFailed { .. } => "usage_parse_failed",
    }
  }

  #[ cfg( test ) ]
  mod tests
  {
    use super::*;

    #[ test ]
    fn client_cancelled_maps_to_499()
    {
      let response = ApiError( RelayError::ClientCancelled ).into_response();
      assert_eq!( response.status().as_u16(), 499 );
    }

    #[ test ]
    fn upstream_server_error_propagates_its_status()
    {
      let response = ApiError( RelayError::UpstreamServerError { status : 503, body : String::new() } ).into_response();
      assert_eq!( response.status().as_u16(), 503 );
    }
  }
}

crate::mod_interface!
{
  exposed use ApiError;
}
