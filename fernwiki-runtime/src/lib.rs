//! # fernwiki-runtime
//!
//! The wiki lifecycle around `fernwiki-core`: typed options loaded from
//! `wiki.conf`, mtime-keyed page and image caches, the category index, the
//! scaled-image pipeline, and the `Wiki` display facade with single-flight
//! render de-duplication.

pub mod cache;
pub mod category;
pub mod display;
pub mod image;
mod singleflight;
pub mod wiki;

pub use self::cache::{CacheError, CachedPage};
pub use self::category::{Category, CategoryEntry, CategoryType, PageObservations};
pub use self::display::{
    mime_type, DisplayCategoryPosts, DisplayError, DisplayImage, DisplayPage, DisplayRedirect,
    DisplayResult,
};
pub use self::image::{generate_scaled, ImageError, SizedImage};
pub use self::wiki::{Wiki, WikiError};
