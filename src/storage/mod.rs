//! Media storage module
//!
//! Handles:
//! - Upload validation (extension and size)
//! - Post image and avatar files on local disk

mod media;

pub use media::{MediaKind, MediaStorage, PUBLIC_PREFIX, PendingUploads, UploadedFile};
