#![ doc( html_root_url = "https://docs.rs/relay_health/latest/relay_health/" ) ]
#![ allow( clippy::missing_inline_in_public_items ) ]
#![ allow( clippy::std_instead_of_core ) ]
#![ allow( clippy::must_use_candidate ) ]

//! Health probing and cooldown tracking for the relay fabric
//!
//! A scoped probe loop ([`HealthSupervisor`]) marks endpoints healthy or
//! unhealthy; a cooldown registry tracks when live traffic failures (not
//! probe failures alone) take an endpoint or channel out of rotation; a
//! quick-test cache backs the "fastest" routing strategy's tie-break.

use mod_interface::mod_interface;

mod private {}

crate::mod_interface!
{
  layer config;
  layer cooldown;
  layer quick_test;
  layer prober;
  layer status;
  layer supervisor;
}
