//! Catalog mutation events
//!
//! Broadcast to every [`crate::Catalog::subscribe`] caller whenever the
//! snapshot is replaced, whether from a service-layer mutation or a
//! reconciliation pass against storage.

mod private
{
  /// Why the snapshot changed.
  #[ derive( Debug, Clone, Copy, PartialEq, Eq ) ]
  pub enum CatalogEvent
  {
    /// A mutation (create/update/delete) went through the service layer.
    Mutated,
    /// A periodic reconciliation pass found and corrected drift against
    /// storage.
    Reconciled,
  }
}

crate::mod_interface!
{
  exposed use CatalogEvent;
}
