#![ doc( html_root_url = "https://docs.rs/relay_types/latest/relay_types/" ) ]
#![ allow( clippy::missing_inline_in_public_items ) ]
#![ allow( clippy::std_instead_of_core ) ]
#![ allow( clippy::must_use_candidate ) ]

//! Shared data model for the relay fabric
//!
//! This crate carries the types every other relay crate agrees on : endpoint
//! and channel records, the request lifecycle record, settings, usage
//! rollups, the error taxonomy, and auth-key fingerprinting. It owns no
//! behavior beyond what is needed to keep those types internally
//! consistent — persistence, routing, and lifecycle management live in
//! their own crates.
//!
//! # Governing Principle : one taxonomy, matched on everywhere
//!
//! Failover decisions, retry decisions, and client-visible error mapping
//! are all driven by matching on [`RelayError`]'s variants, never by
//! inspecting an error's message text.

use mod_interface::mod_interface;

mod private {}

crate::mod_interface!
{
  layer model;
  layer error;
  layer secret;
  layer pricing;
}
