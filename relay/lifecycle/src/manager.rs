//! Broadcast-backed façade over record transitions

mod private
{
  use crate::event::LifecycleEvent;
  use crate::transition::{ apply_business_transition, apply_error_state };
  use chrono::{ DateTime, Utc };
  use relay_types::{ BusinessState, ErrorState, RequestRecord };
  use tokio::sync::broadcast;

  const EVENT_CHANNEL_CAPACITY : usize = 1024;

  /// Applies validated state transitions to hot-pool records and
  /// broadcasts a [`LifecycleEvent`] for every one that actually changed
  /// something. Holds no record storage itself — the hot pool (component
  /// F) owns the `request_id -> RequestRecord` map and serializes access
  /// to each record with its own per-record lock; this type only knows how
  /// to mutate a record it's handed and tell the rest of the fabric that it
  /// did. On a terminal transition the emitted event carries `terminal :
  /// true`; the hot pool subscribes and is the one that actually schedules
  /// archival and releases the slot, so this crate has no dependency on the
  /// pool or persistence layers.
  #[ derive( Debug ) ]
  pub struct LifecycleManager
  {
    events : broadcast::Sender< LifecycleEvent >,
  }

  impl Default for LifecycleManager
  {
    fn default() -> Self
    {
      Self::new()
    }
  }

  impl LifecycleManager
  {
    /// A manager with a fresh, empty event bus.
    #[ must_use ]
    pub fn new() -> Self
    {
      let ( events, _receiver ) = broadcast::channel( EVENT_CHANNEL_CAPACITY );
      Self { events }
    }

    /// Subscribe to every transition this manager applies from this point
    /// on. Lagging subscribers miss old events rather than blocking
    /// publishers; see `tokio::sync::broadcast`.
    pub fn subscribe( &self ) -> broadcast::Receiver< LifecycleEvent >
    {
      self.events.subscribe()
    }

    /// Validate and apply a business-state transition, broadcasting on
    /// success. Returns whether the transition was actually applied (a
    /// no-op on a terminal record, or an illegal transition, returns
    /// `false` and broadcasts nothing).
    pub fn transition_business
    (
      &self,
      record : &mut RequestRecord,
      next : BusinessState,
      now : DateTime< Utc >,
      reason : Option< String >,
    ) -> bool
    {
      if !apply_business_transition( record, next, now, reason )
      {
        return false;
      }
      self.publish( record );
      true
    }

    /// Validate and apply an error-state change, broadcasting on success.
    pub fn set_error_state( &self, record : &mut RequestRecord, next : ErrorState ) -> bool
    {
      if !apply_error_state( record, next )
      {
        return false;
      }
      self.publish( record );
      true
    }

    fn publish( &self, record : &RequestRecord )
    {
      let event = LifecycleEvent
      {
        request_id : record.request_id.clone(),
        state : record.state,
        error_state : record.error_state,
        terminal : record.is_terminal(),
      };
      // No receivers yet (e.g. during startup) is not an error.
      let _ = self.events.send( event );
    }
  }

  #[ cfg( test ) ]
  mod tests
  {
    use super::*;

    fn record() -> RequestRecord
    {
      RequestRecord::new( "req-1".to_string(), Utc::now(), false )
    }

    #[ tokio::test ]
    async fn successful_transition_broadcasts_an_event()
    {
      let manager = LifecycleManager::new();
      let mut receiver = manager.subscribe();
      let mut record = record();

      assert!( manager.transition_business( &mut record, BusinessState::Forwarding, Utc::now(), None ) );

      let event = receiver.recv().await.unwrap();
      assert_eq!( event.request_id, "req-1" );
      assert_eq!( event.state, BusinessState::Forwarding );
      assert!( !event.terminal );
    }

    #[ tokio::test ]
    async fn terminal_transition_event_flags_terminal()
    {
      let manager = LifecycleManager::new();
      let mut receiver = manager.subscribe();
      let mut record = record();

      manager.transition_business( &mut record, BusinessState::Forwarding, Utc::now(), None );
      receiver.recv().await.unwrap();
      manager.transition_business( &mut record, BusinessState::Completed, Utc::now(), None );
      let event = receiver.recv().await.unwrap();

      assert!( event.terminal );
      assert_eq!( event.state, BusinessState::Completed );
    }

    #[ tokio::test ]
    async fn rejected_transition_does_not_broadcast()
    {
      let manager = LifecycleManager::new();
      let mut receiver = manager.subscribe();
      let mut record = record();

      assert!( !manager.transition_business( &mut record, BusinessState::Completed, Utc::now(), None ) );
      assert!( receiver.try_recv().is_err() );
    }

    #[ tokio::test ]
    async fn error_state_change_broadcasts_with_current_business_state()
    {
      let manager = LifecycleManager::new();
      let mut receiver = manager.subscribe();
      let mut record = record();

      assert!( manager.set_error_state( &mut record, ErrorState::Retrying ) );
      let event = receiver.recv().await.unwrap();
      assert_eq!( event.error_state, ErrorState::Retrying );
      assert_eq!( event.state, BusinessState::Pending );
    }
  }
}

crate::mod_interface!
{
  exposed use LifecycleManager;
}
