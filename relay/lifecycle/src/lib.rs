#![ doc( html_root_url = "https://docs.rs/relay_lifecycle/latest/relay_lifecycle/" ) ]
#![ allow( clippy::missing_inline_in_public_items ) ]
#![ allow( clippy::std_instead_of_core ) ]
#![ allow( clippy::must_use_candidate ) ]

//! Business-state machine for in-flight requests
//!
//! [`LifecycleManager`] is the only sanctioned way to move a
//! [`relay_types::RequestRecord`] between [`relay_types::BusinessState`]
//! values or change its orthogonal [`relay_types::ErrorState`]. Every
//! applied transition is broadcast as a [`LifecycleEvent`]; terminal
//! transitions (`Completed`, `Failed`, `Cancelled`) carry `terminal : true`
//! so subscribers — chiefly the hot pool, which owns the actual record
//! storage — know to schedule archival and release the slot. This crate
//! holds no record storage of its own: it is pure state-machine logic plus
//! an event bus, kept that way so it has no dependency on persistence or
//! the pool.

use mod_interface::mod_interface;

mod private {}

crate::mod_interface!
{
  layer event;
  layer transition;
  layer manager;
}
