//! Transaction-bound store view
//!
//! `WithTransaction` returns a [`StoreTxn`] wrapping a `sqlx::Transaction`;
//! every store method has a `*_in_txn` counterpart taking `&mut StoreTxn`
//! so a caller can batch several stores' writes into one atomic commit
//! (e.g. `request_logs` row plus `usage_summary` upsert in §4.6).

mod private
{
  use relay_types::{ RelayError, RelayResult };
  use sqlx::{ Sqlite, SqlitePool, Transaction };

  /// A transaction borrowed from the shared pool, bound to no particular
  /// store — any store's `*_in_txn` method can operate against it.
  #[ derive( Debug ) ]
  pub struct StoreTxn
  {
    pub( crate ) inner : Transaction< 'static, Sqlite >,
  }

  impl StoreTxn
  {
    /// Begin a new transaction against `pool`.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::StorageFatal`] if a connection cannot be
    /// acquired.
    pub async fn begin( pool : &SqlitePool ) -> RelayResult< Self >
    {
      let inner = pool.begin()
        .await
        .map_err( | e | RelayError::StorageFatal { detail : format!( "beginning transaction: {e}" ) } )?;
      Ok( Self { inner } )
    }

    /// Commit every write made against this transaction.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::StorageFatal`] on commit failure.
    pub async fn commit( self ) -> RelayResult< () >
    {
      self.inner.commit()
        .await
        .map_err( | e | RelayError::StorageFatal { detail : format!( "committing transaction: {e}" ) } )
    }

    /// Discard every write made against this transaction.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::StorageFatal`] on rollback failure.
    pub async fn rollback( self ) -> RelayResult< () >
    {
      self.inner.rollback()
        .await
        .map_err( | e | RelayError::StorageFatal { detail : format!( "rolling back transaction: {e}" ) } )
    }
  }
}

crate::mod_interface!
{
  exposed use StoreTxn;
}
