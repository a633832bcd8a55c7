#![ doc( html_root_url = "https://docs.rs/relay_pool/latest/relay_pool/" ) ]
#![ allow( clippy::missing_inline_in_public_items ) ]
#![ allow( clippy::std_instead_of_core ) ]
#![ allow( clippy::must_use_candidate ) ]

//! In-memory hot pool and archive pipeline for in-flight requests
//!
//! [`HotPool`] bounds resident requests by count and age and serializes
//! read-modify-write access per record. Every business transition that
//! lands on a terminal state releases the slot in the same call and hands
//! the finished [`relay_types::RequestRecord`] to an [`ArchiveQueue`];
//! [`ArchiveWorker`] drains that queue in batches, writing the
//! `request_logs` row and `usage_summary` delta in one transaction, with
//! disk-backed quarantine for writes that keep failing past their retry
//! budget. [`cleanup::run_forever`] evicts requests that outlive
//! `max_age` without reaching a terminal state, and [`DebugFilePruner`]
//! bounds the per-request debug-file directory those stale requests (and
//! ordinary streaming recovery, via [`recover_tokens`]) write into.

use mod_interface::mod_interface;

mod private {}

crate::mod_interface!
{
  layer hot_pool;
  layer archive;
  layer debug_file;
  layer cleanup;
}
