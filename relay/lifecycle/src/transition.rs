//! Validated mutation of a single request record
//!
//! These functions are the only sanctioned way to change a
//! [`RequestRecord`]'s `state` or `error_state`. Terminal states latch:
//! once a record reaches `Completed`, `Failed`, or `Cancelled`, every
//! further mutation attempt — business or error — is silently ignored.
//! A non-terminal but illegal
//! business transition (one [`BusinessState::can_transition_to`] rejects)
//! is also ignored rather than panicking, since the state machine is
//! driven entirely by internal callers, not untrusted input; it is logged
//! so the invariant violation is not silent in practice.

mod private
{
  use chrono::{ DateTime, Utc };
  use relay_types::{ BusinessState, ErrorState, RequestRecord };

  /// Attempt to move `record` to `next`. Returns `true` if the record's
  /// `state` actually changed.
  ///
  /// On a transition into `Failed` or `Cancelled`, `reason` is recorded
  /// into `failure_reason` or `cancel_reason` respectively; it is ignored
  /// for every other target state. On any terminal transition, `end_time`
  /// is set to `now`.
  pub fn apply_business_transition
  (
    record : &mut RequestRecord,
    next : BusinessState,
    now : DateTime< Utc >,
    reason : Option< String >,
  ) -> bool
  {
    if record.is_terminal()
    {
      tracing::debug!( request_id = %record.request_id, ?next, "ignoring transition attempt on terminal record" );
      return false;
    }

    if !record.state.can_transition_to( next )
    {
      tracing::warn!
      (
        request_id = %record.request_id,
        from = ?record.state,
        to = ?next,
        "ignoring illegal business-state transition",
      );
      return false;
    }

    record.state = next;
    match next
    {
      BusinessState::Failed => record.failure_reason = reason,
      BusinessState::Cancelled => record.cancel_reason = reason,
      _ => {},
    }
    if next.is_terminal()
    {
      record.end_time = Some( now );
    }
    true
  }

  /// Attempt to move `record`'s orthogonal error state to `next`. Returns
  /// `true` if it actually changed. A no-op on a terminal record, same as
  /// [`apply_business_transition`].
  pub fn apply_error_state( record : &mut RequestRecord, next : ErrorState ) -> bool
  {
    if record.is_terminal()
    {
      tracing::debug!( request_id = %record.request_id, ?next, "ignoring error-state change on terminal record" );
      return false;
    }
    if record.error_state == next
    {
      return false;
    }
    record.error_state = next;
    true
  }

  #[ cfg( test ) ]
  mod tests
  {
    use super::*;
    use chrono::Utc;

    fn record() -> RequestRecord
    {
      RequestRecord::new( "req-1".to_string(), Utc::now(), false )
    }

    #[ test ]
    fn legal_transition_updates_state_and_returns_true()
    {
      let mut record = record();
      assert!( apply_business_transition( &mut record, BusinessState::Forwarding, Utc::now(), None ) );
      assert_eq!( record.state, BusinessState::Forwarding );
    }

    #[ test ]
    fn illegal_transition_is_ignored()
    {
      let mut record = record();
      assert!( !apply_business_transition( &mut record, BusinessState::Completed, Utc::now(), None ) );
      assert_eq!( record.state, BusinessState::Pending );
    }

    #[ test ]
    fn terminal_record_latches_against_further_business_transitions()
    {
      let mut record = record();
      assert!( apply_business_transition( &mut record, BusinessState::Forwarding, Utc::now(), None ) );
      assert!( apply_business_transition( &mut record, BusinessState::Failed, Utc::now(), Some( "boom".to_string() ) ) );
      assert!( !apply_business_transition( &mut record, BusinessState::Cancelled, Utc::now(), None ) );
      assert_eq!( record.state, BusinessState::Failed );
    }

    #[ test ]
    fn transition_into_failed_records_reason_and_end_time()
    {
      let mut record = record();
      apply_business_transition( &mut record, BusinessState::Forwarding, Utc::now(), None );
      let now = Utc::now();
      apply_business_transition( &mut record, BusinessState::Failed, now, Some( "upstream_down".to_string() ) );
      assert_eq!( record.failure_reason.as_deref(), Some( "upstream_down" ) );
      assert_eq!( record.end_time, Some( now ) );
    }

    #[ test ]
    fn error_state_latches_on_terminal_record()
    {
      let mut record = record();
      apply_business_transition( &mut record, BusinessState::Forwarding, Utc::now(), None );
      apply_business_transition( &mut record, BusinessState::Completed, Utc::now(), None );
      assert!( !apply_error_state( &mut record, ErrorState::Retrying ) );
      assert_eq!( record.error_state, ErrorState::None );
    }

    #[ test ]
    fn error_state_change_on_live_record_returns_true_once()
    {
      let mut record = record();
      assert!( apply_error_state( &mut record, ErrorState::Retrying ) );
      assert!( !apply_error_state( &mut record, ErrorState::Retrying ) );
      assert!( apply_error_state( &mut record, ErrorState::Suspended ) );
    }
  }
}

crate::mod_interface!
{
  exposed use
  {
    apply_business_transition,
    apply_error_state,
  };
}
