pub mod comparator;
pub mod engine;
pub mod listing;
pub mod transfer;
pub mod window;

pub use comparator::{FetchReason, FileComparator, RemoteFileInfo, SyncDecision};
pub use engine::{output_dir_name, MirrorEngine, MirrorReport};
pub use listing::{fetch_listing, Entry, Listing, ListingPage, Redirect};
pub use transfer::{FileSyncer, SyncOutcome, SyncTarget};
pub use window::{compute_window, partition_name, SyncWindow};
