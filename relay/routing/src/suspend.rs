//! Recovery queue for requests that exhausted every channel
//!
//! Bounded by `max_suspended`; each parked request carries a deadline
//! (`suspend_timeout`) past which it gives up with `no_endpoints_available`.

mod private
{
  use chrono::{ DateTime, Utc };
  use parking_lot::Mutex;
  use std::collections::VecDeque;

  /// One request parked on the recovery queue.
  #[ derive( Debug, Clone, PartialEq ) ]
  pub struct SuspendedRequest
  {
    /// The request's opaque identity.
    pub request_id : String,
    /// When this request gives up if nothing becomes viable.
    pub deadline : DateTime< Utc >,
  }

  /// FIFO recovery queue, bounded by capacity, with deadline eviction.
  #[ derive( Debug ) ]
  pub struct SuspendQueue
  {
    entries : Mutex< VecDeque< SuspendedRequest > >,
    max_suspended : usize,
  }

  impl SuspendQueue
  {
    /// A queue that rejects pushes once it holds `max_suspended` entries.
    #[ must_use ]
    pub fn new( max_suspended : usize ) -> Self
    {
      Self { entries : Mutex::new( VecDeque::new() ), max_suspended }
    }

    /// Park `request` if there is capacity; returns it back, unparked, if
    /// the queue is already full.
    ///
    /// # Errors
    ///
    /// Returns `request` unchanged when the queue is at capacity.
    pub fn try_push( &self, request : SuspendedRequest ) -> Result< (), SuspendedRequest >
    {
      let mut entries = self.entries.lock();
      if entries.len() >= self.max_suspended
      {
        return Err( request );
      }
      entries.push_back( request );
      Ok( () )
    }

    /// Pop the oldest parked request, if any.
    pub fn pop_front( &self ) -> Option< SuspendedRequest >
    {
      self.entries.lock().pop_front()
    }

    /// Remove and return every entry whose deadline has passed as of `now`.
    pub fn evict_expired( &self, now : DateTime< Utc > ) -> Vec< SuspendedRequest >
    {
      let mut entries = self.entries.lock();
      let ( expired, remaining ) : ( VecDeque< _ >, VecDeque< _ > ) = entries.drain( .. ).partition( | entry | entry.deadline <= now );
      *entries = remaining;
      expired.into_iter().collect()
    }

    /// Number of requests currently parked.
    #[ must_use ]
    pub fn len( &self ) -> usize
    {
      self.entries.lock().len()
    }

    /// Whether the queue currently holds no requests.
    #[ must_use ]
    pub fn is_empty( &self ) -> bool
    {
      self.len() == 0
    }
  }

  #[ cfg( test ) ]
  mod tests
  {
    use super::*;
    use chrono::Duration as ChronoDuration;

    fn entry( id : &str, now : DateTime< Utc > ) -> SuspendedRequest
    {
      SuspendedRequest { request_id : id.to_string(), deadline : now + ChronoDuration::seconds( 300 ) }
    }

    #[ test ]
    fn push_then_pop_is_fifo()
    {
      let queue = SuspendQueue::new( 10 );
      let now = Utc::now();
      queue.try_push( entry( "a", now ) ).unwrap();
      queue.try_push( entry( "b", now ) ).unwrap();
      assert_eq!( queue.pop_front().unwrap().request_id, "a" );
      assert_eq!( queue.pop_front().unwrap().request_id, "b" );
    }

    #[ test ]
    fn push_rejects_once_at_capacity()
    {
      let queue = SuspendQueue::new( 1 );
      let now = Utc::now();
      queue.try_push( entry( "a", now ) ).unwrap();
      let rejected = queue.try_push( entry( "b", now ) ).unwrap_err();
      assert_eq!( rejected.request_id, "b" );
    }

    #[ test ]
    fn evict_expired_removes_only_past_deadline_entries()
    {
      let queue = SuspendQueue::new( 10 );
      let now = Utc::now();
      queue.try_push( SuspendedRequest { request_id : "stale".to_string(), deadline : now - ChronoDuration::seconds( 1 ) } ).unwrap();
      queue.try_push( entry( "fresh", now ) ).unwrap();

      let expired = queue.evict_expired( now );
      assert_eq!( expired.len(), 1 );
      assert_eq!( expired[ 0 ].request_id, "stale" );
      assert_eq!( queue.len(), 1 );
    }
  }
}

crate::mod_interface!
{
  exposed use
  {
    SuspendedRequest,
    SuspendQueue,
  };
}
