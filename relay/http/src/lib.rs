#![ doc( html_root_url = "https://docs.rs/relay_http/latest/relay_http/" ) ]
#![ allow( clippy::missing_inline_in_public_items ) ]
#![ allow( clippy::std_instead_of_core ) ]
#![ allow( clippy::must_use_candidate ) ]

//! HTTP front door for the relay fabric
//!
//! [`config`] resolves startup configuration; [`state`] is the shared
//! handle every handler and background task clones; [`dispatch`] sends
//! one upstream attempt (buffered or streaming); [`handlers`] is the
//! `/v1/*` proxy request pipeline built on top of it; [`admin`] is the
//! typed RPC surface under `/api`; [`port_manager`] resolves the listener
//! port; [`error`] maps [`relay_types::RelayError`] onto HTTP responses.
//! The `relay-http` binary (`src/main.rs`) wires all of it together.

use mod_interface::mod_interface;

mod private {}

crate::mod_interface!
{
  layer config;
  layer state;
  layer error;
  layer dispatch;
  layer handlers;
  layer admin;
  layer port_manager;
}
