#![ doc( html_root_url = "https://docs.rs/relay_persistence/latest/relay_persistence/" ) ]
#![ allow( clippy::missing_inline_in_public_items ) ]
#![ allow( clippy::std_instead_of_core ) ]
#![ allow( clippy::must_use_candidate ) ]

//! SQLite-backed persistence for the relay fabric
//!
//! One `sqlx::SqlitePool`, one store per table, busy-retry on every
//! write. See `schema` for the table DDL and version gate, `pool` for
//! connection setup and the retry helper, and `txn` for the
//! transaction-bound view stores use to batch writes across tables.

use mod_interface::mod_interface;

mod private {}

crate::mod_interface!
{
  layer time;
  layer pool;
  layer schema;
  layer txn;
  layer endpoint_store;
  layer channel_store;
  layer setting_store;
  layer model_pricing_store;
  layer request_log_store;
  layer usage_summary_store;
}
