//! Broadcast payload for lifecycle transitions

mod private
{
  use relay_types::{ BusinessState, ErrorState };

  /// Emitted every time a request's business state or error state actually
  /// changes. Consumers (the pool's archival trigger, admin observability)
  /// subscribe via [`crate::LifecycleManager::subscribe`].
  #[ derive( Debug, Clone, PartialEq, Eq ) ]
  pub struct LifecycleEvent
  {
    /// The request this transition belongs to.
    pub request_id : String,
    /// The business state after the transition.
    pub state : BusinessState,
    /// The error state after the transition.
    pub error_state : ErrorState,
    /// Whether `state` is terminal, i.e. the hot-pool slot should be
    /// released and archival scheduled.
    pub terminal : bool,
  }
}

crate::mod_interface!
{
  exposed use LifecycleEvent;
}
