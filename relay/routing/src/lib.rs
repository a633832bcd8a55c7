#![ doc( html_root_url = "https://docs.rs/relay_routing/latest/relay_routing/" ) ]
#![ allow( clippy::missing_inline_in_public_items ) ]
#![ allow( clippy::std_instead_of_core ) ]
#![ allow( clippy::must_use_candidate ) ]

//! Selection, retry, and failover for the relay fabric
//!
//! [`RoutingEngine`] runs one request at a time through the pipeline:
//! determine the active channel set ([`active_channels`]), build each
//! channel's ordered candidate list
//! ([`candidate_list`]), retry a candidate with [`BackoffConfig`]'s
//! exponential-with-jitter delay, cool down an exhausted candidate or
//! channel, and finally park an exhausted request on a [`SuspendQueue`]
//! when every channel is cooling. The engine never speaks HTTP itself —
//! it is generic over a caller-supplied [`Dispatch`] implementation.

use mod_interface::mod_interface;

mod private {}

crate::mod_interface!
{
  layer backoff;
  layer dispatch;
  layer selection;
  layer suspend;
  layer engine;
}
