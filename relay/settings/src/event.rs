//! Hot-reload change bus payloads

mod private
{
  /// Emitted after every settings write. `D`, `B`, `F`, and `G` subscribe
  /// and recompute their cached policy parameters from the store whenever
  /// `requires_restart` is `false`; a `true` flag means this event is
  /// informational only — the change takes effect on next process start.
  #[ derive( Debug, Clone, PartialEq, Eq ) ]
  pub enum SettingsEvent
  {
    /// A single `(category, key)` row changed via `set`.
    Changed
    {
      /// The row's category.
      category : String,
      /// The row's key.
      key : String,
      /// Whether the change only takes effect on restart.
      requires_restart : bool,
    },
    /// A batch write landed via `update_and_apply` or `reset_category`;
    /// subscribers should treat every listed category as changed.
    BatchApplied
    {
      /// Categories touched by the batch.
      categories : Vec< String >,
    },
  }
}

crate::mod_interface!
{
  exposed use SettingsEvent;
}
