//! # contentkit
//!
//! Content documents, versions and the typed object model for content packs.
//!
//! ```rust,no_run
//! use contentkit::ContentObject;
//!
//! let object = ContentObject::from_path("Packs/Demo/Widgets/widget-Demo.json").unwrap();
//! println!("{} is a {}", object.file_name(), object.kind());
//! ```

pub mod document;
pub mod kind;
pub mod objects;
pub mod unify;
pub mod version;


// Re-export commonly used types
pub use document::{ContentDocument, DocumentError, DocumentFormat};
pub use kind::ContentKind;
pub use objects::{ContentObject, ObjectError};
pub use unify::{UnifyError, unify, write_unified};
pub use version::{ContentVersion, VersionError};
