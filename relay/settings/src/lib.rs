#![ doc( html_root_url = "https://docs.rs/relay_settings/latest/relay_settings/" ) ]
#![ allow( clippy::missing_inline_in_public_items ) ]
#![ allow( clippy::std_instead_of_core ) ]
#![ allow( clippy::must_use_candidate ) ]

//! Typed settings accessors and the hot-reload change bus
//!
//! [`SettingsService`] wraps `relay_persistence::SettingStore` with typed
//! accessors (`get_int`/`get_float`/`get_bool`/`get_duration`/`get_value`,
//! each taking a caller-supplied default for a missing row), a write path
//! (`set`, `update_and_apply`, `reset_category`) and a
//! `tokio::sync::broadcast` bus that fires a [`SettingsEvent`] after every
//! write so the routing engine, health supervisor, pool, and HTTP layer
//! can recompute their cached policy parameters without a restart — unless
//! the changed row is flagged `requires_restart`, in which case the event
//! is informational only. [`defaults::DEFAULTS`] is the built-in table
//! `reset_category` re-seeds from.

use mod_interface::mod_interface;

mod private {}

crate::mod_interface!
{
  layer duration;
  layer defaults;
  layer event;
  layer service;
}
