#![ doc( html_root_url = "https://docs.rs/relay_catalog/latest/relay_catalog/" ) ]
#![ allow( clippy::missing_inline_in_public_items ) ]
#![ allow( clippy::std_instead_of_core ) ]
#![ allow( clippy::must_use_candidate ) ]

//! Runtime catalog of channels and endpoints
//!
//! Maintains an ordered in-memory snapshot ([`CatalogSnapshot`]) behind a
//! many-reader/one-writer pointer swap ([`Catalog`]), and broadcasts
//! [`CatalogEvent`] on every mutation so the routing engine never reads
//! stale candidate lists. Mutations go through a service layer which,
//! within the same transaction boundary as the persistence write, calls
//! [`Catalog::update_from_persistence`] — readers therefore never observe a
//! record absent from the catalog but present in storage. A periodic
//! reconciler ([`Catalog::run_reconciler`]) corrects drift from external
//! edits within a grace of about one reconciliation interval.

use mod_interface::mod_interface;

mod private {}

crate::mod_interface!
{
  layer snapshot;
  layer events;
  layer catalog;
}
