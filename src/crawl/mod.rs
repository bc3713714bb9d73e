//! Embedded resource discovery: reference extraction and the allow-list.

mod classify;
mod extract;

pub use classify::{DEFAULT_ALLOWED_DOMAINS, DEFAULT_EXTENSIONS, ResourceFilter};
pub use extract::{ExtractionError, extract_resource_urls, find_references, resolve_reference};
