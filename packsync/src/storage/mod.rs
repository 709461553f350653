//! Storage root layout.
//!
//! All persisted state lives below a single root directory:
//!
//! ```text
//! <root>/
//! ├── packages/<resource>/...      manifest-tracked bundles
//! ├── binaries/<file>              prebuilt runtime archives
//! ├── player-assets/<file>         deduplicated small uploads
//! └── temp/<handle>/...            staged update subsets
//! ```

mod location;
mod paths;

pub use location::StorageLocation;
pub use paths::{relative_path, relative_segments, single_segment, PathResolver};
