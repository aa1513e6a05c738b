//! Built-in processing capabilities.

mod thumbnail;

pub use thumbnail::ThumbnailFunction;
