//! The crypto manager core.
//!
//! The [`CryptoManager`] ties together the registry of key providers, the
//! ledger of generated keys, and the task runner used for status queries.
//! Every environment owns its own manager; nothing is shared between them.

pub use self::manager::CryptoManager;

pub mod keys;
pub mod manager;
pub mod registry;
pub mod runtime;
pub mod status;


//------------ effective_limit -----------------------------------------------

/// Returns how many of `len` items a listing with the given limit returns.
///
/// Negative limits and limits larger than `len` mean no limit at all.
pub(crate) fn effective_limit(limit: Option<i32>, len: usize) -> usize {
    match limit.and_then(|limit| usize::try_from(limit).ok()) {
        Some(limit) if limit < len => limit,
        _ => len,
    }
}


//============ Tests =========================================================
