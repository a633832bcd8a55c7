//! Core persisted and runtime record types
//!
//! `Endpoint`, `Channel`, `EndpointRuntimeStatus`, the request lifecycle
//! record, the usage summary rollup, and `Setting`.

#[ allow( clippy::missing_inline_in_public_items ) ]
mod private
{
  use serde::{ Deserialize, Serialize };
  use std::collections::BTreeMap;
  use chrono::{ DateTime, Utc };

  /// An upstream API target, identified by `(channel, name)`.
  #[ derive( Debug, Clone, PartialEq, Serialize, Deserialize ) ]
  pub struct Endpoint
  {
    /// Primary key, assigned by the persistence layer.
    pub id : i64,
    /// Owning channel name.
    pub channel : String,
    /// Endpoint name, unique within `channel`.
    pub name : String,
    /// Upstream base URL.
    pub url : String,
    /// Bearer token credential, if this endpoint authenticates that way.
    pub bearer_token : Option< String >,
    /// `x-api-key` credential, if this endpoint authenticates that way.
    pub api_key : Option< String >,
    /// Extra headers merged onto every forwarded request; endpoint values win.
    pub custom_headers : BTreeMap< String, String >,
    /// Selection order within the channel, lower is earlier.
    pub priority : i32,
    /// Whether this endpoint may be used for intra-channel failover.
    pub participates_in_failover : bool,
    /// Endpoint-specific cooldown override, in seconds.
    pub cooldown_seconds : Option< u64 >,
    /// Per-request timeout, in seconds. Invariant : `>= 1`.
    pub timeout_seconds : u64,
    /// Whether this endpoint reports a `usage` object the proxy can bill from.
    pub supports_token_counting : bool,
    /// Cost multiplier applied across every token category.
    pub cost_multiplier_overall : f64,
    /// Cost multiplier applied to input tokens.
    pub cost_multiplier_input : f64,
    /// Cost multiplier applied to output tokens.
    pub cost_multiplier_output : f64,
    /// Cost multiplier applied to 5-minute cache-creation tokens.
    pub cost_multiplier_cache_creation_5m : f64,
    /// Cost multiplier applied to 1-hour cache-creation tokens.
    pub cost_multiplier_cache_creation_1h : f64,
    /// Cost multiplier applied to cache-read tokens.
    pub cost_multiplier_cache_read : f64,
    /// Whether routing may select this endpoint at all.
    pub enabled : bool,
    /// Creation timestamp.
    pub created_at : DateTime< Utc >,
    /// Last update timestamp.
    pub updated_at : DateTime< Utc >,
  }

  impl Endpoint
  {
    /// Default per-request timeout when none is configured.
    pub const DEFAULT_TIMEOUT_SECONDS : u64 = 300;

    /// Validate field-level invariants : a positive timeout, non-negative
    /// cost multipliers, and a non-empty name.
    ///
    /// # Errors
    ///
    /// Returns a message describing the first invariant violated.
    pub fn validate( &self ) -> Result< (), String >
    {
      if self.timeout_seconds < 1
      {
        return Err( "endpoint timeout_seconds must be >= 1".to_string() );
      }
      for ( label, multiplier ) in
      [
        ( "cost_multiplier_overall", self.cost_multiplier_overall ),
        ( "cost_multiplier_input", self.cost_multiplier_input ),
        ( "cost_multiplier_output", self.cost_multiplier_output ),
        ( "cost_multiplier_cache_creation_5m", self.cost_multiplier_cache_creation_5m ),
        ( "cost_multiplier_cache_creation_1h", self.cost_multiplier_cache_creation_1h ),
        ( "cost_multiplier_cache_read", self.cost_multiplier_cache_read ),
      ]
      {
        if multiplier < 0.0
        {
          return Err( format!( "endpoint {label} must be >= 0" ) );
        }
      }
      if self.name.is_empty()
      {
        return Err( "endpoint name must not be empty".to_string() );
      }
      Ok( () )
    }

    /// `(channel, name)` identity tuple.
    #[ must_use ]
    pub fn identity( &self ) -> ( &str, &str )
    {
      ( &self.channel, &self.name )
    }
  }

  /// A named grouping of endpoints sharing failover semantics.
  #[ derive( Debug, Clone, PartialEq, Serialize, Deserialize ) ]
  pub struct Channel
  {
    /// Primary key.
    pub id : i64,
    /// Channel name, globally unique.
    pub name : String,
    /// Optional informational website.
    pub website : Option< String >,
    /// Selection order among channels, lower is earlier.
    pub priority : i32,
    /// Whether this channel may receive inter-channel failover traffic.
    pub participates_in_channel_failover : bool,
    /// Creation timestamp.
    pub created_at : DateTime< Utc >,
    /// Last update timestamp.
    pub updated_at : DateTime< Utc >,
  }

  /// Runtime health/cooldown status for one endpoint, owned by the health
  /// supervisor and the catalog.
  #[ derive( Debug, Clone, PartialEq, Serialize, Deserialize ) ]
  pub struct EndpointRuntimeStatus
  {
    /// Whether the last probe (or live traffic) considered this endpoint healthy.
    pub healthy : bool,
    /// Whether this endpoint has never been probed.
    pub never_checked : bool,
    /// Time of the last probe, if any.
    pub last_check : Option< DateTime< Utc > >,
    /// Latency of the last successful probe or request, in milliseconds.
    pub last_latency_ms : Option< u64 >,
    /// Exclusive upper bound of the current cooldown window, if any.
    pub cooldown_until : Option< DateTime< Utc > >,
    /// Human-readable reason the cooldown was entered.
    pub cooldown_reason : Option< String >,
  }

  impl Default for EndpointRuntimeStatus
  {
    fn default() -> Self
    {
      Self
      {
        healthy : false,
        never_checked : true,
        last_check : None,
        last_latency_ms : None,
        cooldown_until : None,
        cooldown_reason : None,
      }
    }
  }

  impl EndpointRuntimeStatus
  {
    /// Whether the endpoint is presently eligible for selection : healthy and
    /// not within an active cooldown window.
    #[ must_use ]
    pub fn is_eligible( &self, now : DateTime< Utc > ) -> bool
    {
      let not_cooling = self.cooldown_until.is_none_or( | until | now >= until );
      self.healthy && not_cooling
    }
  }

  /// Business states of the request lifecycle state machine.
  #[ derive( Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize ) ]
  #[ serde( rename_all = "snake_case" ) ]
  pub enum BusinessState
  {
    /// Accepted, not yet dispatched to an upstream.
    Pending,
    /// Dispatched, awaiting the first response bytes.
    Forwarding,
    /// Receiving an SSE body.
    Streaming,
    /// Receiving and decoding a buffered body.
    Processing,
    /// Terminal : succeeded.
    Completed,
    /// Terminal : failed.
    Failed,
    /// Terminal : cancelled by the client.
    Cancelled,
  }

  impl BusinessState
  {
    /// Whether this state is terminal and latches further mutation.
    #[ must_use ]
    pub fn is_terminal( self ) -> bool
    {
      matches!( self, Self::Completed | Self::Failed | Self::Cancelled )
    }

    /// Whether `next` is a legal transition from `self` in the business
    /// state diagram : terminal states never transition further, and every
    /// other edge follows the forward progression a request actually takes.
    #[ must_use ]
    pub fn can_transition_to( self, next : Self ) -> bool
    {
      if self.is_terminal()
      {
        return false;
      }
      match ( self, next )
      {
        ( Self::Pending, Self::Forwarding | Self::Cancelled ) => true,
        ( Self::Forwarding, Self::Streaming | Self::Processing | Self::Failed | Self::Cancelled ) => true,
        ( Self::Streaming, Self::Processing | Self::Completed | Self::Failed | Self::Cancelled ) => true,
        ( Self::Processing, Self::Completed | Self::Failed | Self::Cancelled ) => true,
        _ => false,
      }
    }
  }

  /// Orthogonal error state, layered on top of the business state.
  #[ derive( Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize ) ]
  #[ serde( rename_all = "snake_case" ) ]
  pub enum ErrorState
  {
    /// No outstanding error condition.
    None,
    /// A retry backoff is outstanding.
    Retrying,
    /// Parked on the recovery queue awaiting endpoint recovery.
    Suspended,
  }

  /// How the inbound client authenticated.
  #[ derive( Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize ) ]
  #[ serde( rename_all = "snake_case" ) ]
  pub enum AuthType
  {
    /// `Authorization: Bearer <token>`.
    Token,
    /// `x-api-key: <key>`.
    ApiKey,
    /// No credential presented.
    None,
  }

  /// Which channel/endpoint a request was routed to.
  #[ derive( Debug, Clone, PartialEq, Eq, Serialize, Deserialize ) ]
  pub struct EndpointRef
  {
    /// Endpoint primary key.
    pub id : i64,
    /// Owning channel name.
    pub channel : String,
    /// Endpoint name.
    pub name : String,
  }

  /// Token counters accumulated over the life of a request.
  #[ derive( Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize ) ]
  pub struct TokenCounters
  {
    /// Input tokens.
    pub input : u64,
    /// Output tokens.
    pub output : u64,
    /// 5-minute cache-creation tokens.
    pub cache_creation_5m : u64,
    /// 1-hour cache-creation tokens.
    pub cache_creation_1h : u64,
    /// Cache-read tokens.
    pub cache_read : u64,
  }

  impl TokenCounters
  {
    /// Sum of every token category.
    #[ must_use ]
    pub fn total( &self ) -> u64
    {
      self.input + self.output + self.cache_creation_5m + self.cache_creation_1h + self.cache_read
    }

    /// Merge in a later partial observation. Per §3, counters only grow
    /// monotonically until a terminal state, so this takes the max of each
    /// field rather than summing — a later `usage` object from the same
    /// upstream message is a cumulative snapshot, not a delta.
    pub fn merge_monotonic( &mut self, other : TokenCounters )
    {
      self.input = self.input.max( other.input );
      self.output = self.output.max( other.output );
      self.cache_creation_5m = self.cache_creation_5m.max( other.cache_creation_5m );
      self.cache_creation_1h = self.cache_creation_1h.max( other.cache_creation_1h );
      self.cache_read = self.cache_read.max( other.cache_read );
    }

    /// Reset to zero, used when a retry replaces a failed attempt's partial
    /// counters (§4.6 duplicate-billing protection).
    pub fn zero( &mut self )
    {
      *self = Self::default();
    }
  }

  /// A request's full lifecycle record, as tracked by the hot pool and
  /// eventually archived to `request_logs`.
  #[ derive( Debug, Clone, Serialize, Deserialize ) ]
  pub struct RequestRecord
  {
    /// Opaque identity, prefixed `req-`.
    pub request_id : String,
    /// When the request was accepted.
    pub start_time : DateTime< Utc >,
    /// When the request reached a terminal state.
    pub end_time : Option< DateTime< Utc > >,
    /// Business state.
    pub state : BusinessState,
    /// Orthogonal error state.
    pub error_state : ErrorState,
    /// Currently (or finally) selected endpoint.
    pub selected_endpoint : Option< EndpointRef >,
    /// Currently (or finally) selected channel.
    pub selected_channel : Option< String >,
    /// Model name discovered from the request body.
    pub model : Option< String >,
    /// How the inbound client authenticated.
    pub auth_type : AuthType,
    /// Fingerprint of the inbound credential, never the raw value.
    pub auth_key_fingerprint : Option< String >,
    /// Upstream HTTP status, once known.
    pub http_status : Option< u16 >,
    /// Number of retry attempts made so far.
    pub retry_count : u32,
    /// Reason recorded on terminal `Failed`.
    pub failure_reason : Option< String >,
    /// Reason recorded on terminal `Cancelled`.
    pub cancel_reason : Option< String >,
    /// Whether this request asked for a streamed response.
    pub streaming : bool,
    /// Accumulated token counters.
    pub tokens : TokenCounters,
    /// Attributed cost in US dollars.
    pub cost_usd : f64,
    /// Wall-clock duration in milliseconds, once terminal.
    pub duration_ms : Option< u64 >,
  }

  impl RequestRecord
  {
    /// Construct a new record in the `Pending` state.
    #[ must_use ]
    pub fn new( request_id : String, start_time : DateTime< Utc >, streaming : bool ) -> Self
    {
      Self
      {
        request_id,
        start_time,
        end_time : None,
        state : BusinessState::Pending,
        error_state : ErrorState::None,
        selected_endpoint : None,
        selected_channel : None,
        model : None,
        auth_type : AuthType::None,
        auth_key_fingerprint : None,
        http_status : None,
        retry_count : 0,
        failure_reason : None,
        cancel_reason : None,
        streaming,
        tokens : TokenCounters::default(),
        cost_usd : 0.0,
        duration_ms : None,
      }
    }

    /// Whether the business state is terminal.
    #[ must_use ]
    pub fn is_terminal( &self ) -> bool
    {
      self.state.is_terminal()
    }
  }

  /// `(date, model, channel, endpoint)` usage rollup, eventually consistent
  /// with the underlying `request_logs` rows.
  #[ derive( Debug, Clone, Default, PartialEq, Serialize, Deserialize ) ]
  pub struct UsageSummary
  {
    /// Calendar date, in the configured timezone, `YYYY-MM-DD`.
    pub date : String,
    /// Model name.
    pub model : String,
    /// Channel name.
    pub channel : String,
    /// Endpoint name.
    pub endpoint : String,
    /// Number of requests counted.
    pub request_count : u64,
    /// Number of those requests that completed successfully.
    pub success_count : u64,
    /// Number of those requests that failed.
    pub error_count : u64,
    /// Accumulated token counters.
    pub tokens : TokenCounters,
    /// Accumulated cost in US dollars.
    pub cost_usd : f64,
  }

  /// Declared value type of a setting, governing how its string value is
  /// parsed on read.
  #[ derive( Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize ) ]
  #[ serde( rename_all = "snake_case" ) ]
  pub enum SettingValueType
  {
    /// Opaque string.
    String,
    /// Signed integer.
    Int,
    /// Floating point.
    Float,
    /// Boolean.
    Bool,
    /// Duration, stored as a humantime-style string (e.g. `"30s"`).
    Duration,
    /// String whose value should be masked in any UI representation.
    Password,
    /// Arbitrary JSON document.
    Json,
  }

  /// A single `(category, key)` configuration row.
  #[ derive( Debug, Clone, PartialEq, Serialize, Deserialize ) ]
  pub struct Setting
  {
    /// Grouping category, e.g. `"retry"` or `"failover"`.
    pub category : String,
    /// Key within the category.
    pub key : String,
    /// Raw string value.
    pub value : String,
    /// Declared type, used to parse `value`.
    pub value_type : SettingValueType,
    /// Human-readable label for the admin UI.
    pub label : String,
    /// Longer-form description for the admin UI.
    pub description : String,
    /// Display order within the category.
    pub display_order : i32,
    /// Whether changing this setting requires a process restart to take effect.
    pub requires_restart : bool,
    /// Creation timestamp.
    pub created_at : DateTime< Utc >,
    /// Last update timestamp.
    pub updated_at : DateTime< Utc >,
  }

  #[ cfg( test ) ]
  mod tests
  {
    use super::*;

    fn sample_endpoint() -> Endpoint
    {
      Endpoint
      {
        id : 1,
        channel : "primary".to_string(),
        name : "east".to_string(),
        url : "https://example.test".to_string(),
        bearer_token : None,
        api_key : None,
        custom_headers : BTreeMap::new(),
        priority : 1,
        participates_in_failover : true,
        cooldown_seconds : None,
        timeout_seconds : Endpoint::DEFAULT_TIMEOUT_SECONDS,
        supports_token_counting : true,
        cost_multiplier_overall : 1.0,
        cost_multiplier_input : 1.0,
        cost_multiplier_output : 1.0,
        cost_multiplier_cache_creation_5m : 1.0,
        cost_multiplier_cache_creation_1h : 1.0,
        cost_multiplier_cache_read : 1.0,
        enabled : true,
        created_at : DateTime::UNIX_EPOCH,
        updated_at : DateTime::UNIX_EPOCH,
      }
    }

    #[ test ]
    fn endpoint_default_timeout_is_valid()
    {
      assert!( sample_endpoint().validate().is_ok() );
    }

    #[ test ]
    fn endpoint_rejects_zero_timeout()
    {
      let mut endpoint = sample_endpoint();
      endpoint.timeout_seconds = 0;
      assert!( endpoint.validate().is_err() );
    }

    #[ test ]
    fn endpoint_rejects_negative_multiplier()
    {
      let mut endpoint = sample_endpoint();
      endpoint.cost_multiplier_input = -1.0;
      assert!( endpoint.validate().is_err() );
    }

    #[ test ]
    fn runtime_status_defaults_to_never_checked_and_ineligible()
    {
      let status = EndpointRuntimeStatus::default();
      assert!( status.never_checked );
      assert!( !status.healthy );
      assert!( !status.is_eligible( Utc::now() ) );
    }

    #[ test ]
    fn runtime_status_eligible_when_healthy_and_not_cooling()
    {
      let status = EndpointRuntimeStatus
      {
        healthy : true,
        never_checked : false,
        last_check : Some( Utc::now() ),
        last_latency_ms : Some( 20 ),
        cooldown_until : None,
        cooldown_reason : None,
      };
      assert!( status.is_eligible( Utc::now() ) );
    }

    #[ test ]
    fn runtime_status_ineligible_while_cooling_down()
    {
      let now = Utc::now();
      let status = EndpointRuntimeStatus
      {
        healthy : true,
        never_checked : false,
        last_check : Some( now ),
        last_latency_ms : None,
        cooldown_until : Some( now + chrono::Duration::seconds( 60 ) ),
        cooldown_reason : Some( "upstream 503".to_string() ),
      };
      assert!( !status.is_eligible( now ) );
      assert!( status.is_eligible( now + chrono::Duration::seconds( 61 ) ) );
    }

    #[ test ]
    fn business_state_legal_transitions()
    {
      assert!( BusinessState::Pending.can_transition_to( BusinessState::Forwarding ) );
      assert!( BusinessState::Forwarding.can_transition_to( BusinessState::Streaming ) );
      assert!( BusinessState::Streaming.can_transition_to( BusinessState::Completed ) );
      assert!( !BusinessState::Completed.can_transition_to( BusinessState::Forwarding ) );
      assert!( !BusinessState::Pending.can_transition_to( BusinessState::Completed ) );
    }

    #[ test ]
    fn business_state_terminal_states()
    {
      assert!( BusinessState::Completed.is_terminal() );
      assert!( BusinessState::Failed.is_terminal() );
      assert!( BusinessState::Cancelled.is_terminal() );
      assert!( !BusinessState::Streaming.is_terminal() );
    }

    #[ test ]
    fn token_counters_merge_is_monotonic_not_additive()
    {
      let mut acc = TokenCounters { input : 10, output : 5, ..TokenCounters::default() };
      acc.merge_monotonic( TokenCounters { input : 8, output : 12, ..TokenCounters::default() } );
      assert_eq!( acc.input, 10 );
      assert_eq!( acc.output, 12 );
    }

    #[ test ]
    fn token_counters_total_sums_all_categories()
    {
      let tokens = TokenCounters
      {
        input : 1,
        output : 2,
        cache_creation_5m : 3,
        cache_creation_1h : 4,
        cache_read : 5,
      };
      assert_eq!( tokens.total(), 15 );
    }

    #[ test ]
    fn request_record_starts_pending_with_no_error()
    {
      let record = RequestRecord::new( "req-abc".to_string(), Utc::now(), false );
      assert_eq!( record.state, BusinessState::Pending );
      assert_eq!( record.error_state, ErrorState::None );
      assert!( !record.is_terminal() );
    }
  }
}

crate::mod_interface!
{
  exposed use
  {
    Endpoint,
    Channel,
    EndpointRuntimeStatus,
    BusinessState,
    ErrorState,
    AuthType,
    EndpointRef,
    TokenCounters,
    RequestRecord,
    UsageSummary,
    SettingValueType,
    Setting,
  };
}
