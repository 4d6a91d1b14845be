//! Disk-backed audio cache for lector.
//!
//! [`FragmentCache`] maps `(book id, fragment id)` to a synthesized audio
//! file under a per-book directory. Total size is capped; once the cache
//! passes its cleanup threshold the oldest entries are evicted before the
//! next write.
//!
//! # Layout
//!
//! ```text
//! <root>/<book id>/<sha256(fragment id)>.<ext>
//! ```
//!
//! There is no index file. The directory listing is the index.

mod eviction;
mod layout;
mod store;

pub use store::FragmentCache;
