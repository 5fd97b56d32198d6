//! Web framework integration surface.
//!
//! This module provides the boundary between HTTP frameworks and the
//! requirer. It handles:
//! - Mapping HTTP requests to one framework-neutral shape (`RequestAdapter`)
//! - Introducing taint at the boundary (untrusted inputs → `Tainted<T>`)
//! - Carrying response cookies produced while a session is procured
//!
//! # Design Principles
//!
//! 1. **No Framework Dependencies**: This module contains no framework-specific code.
//!    It defines types that framework-specific code can build.
//!
//! 2. **Taint at Boundary**: All external inputs (query params, form fields,
//!    JSON members) are wrapped in `Tainted<T>` at extraction time.
//!
//! 3. **No Authorization**: The web boundary does not grant capabilities.
//!    Authorization happens when a `Requirer` resolves a requirement set.
//!
//! # Integration Model
//!
//! Framework-specific glue should:
//! 1. Build a `RequestAdapter` from the framework request
//! 2. Hand it to `Route::handle`
//! 3. Copy `response_cookies()` onto the framework response
//! 4. Map the returned `Outcome` to a framework response
//!
//! # Example Flow
//!
//! ```ignore
//! let mut adapter = RequestAdapter::from(http_req);
//! let outcome = route.handle(&mut adapter).await;
//!
//! for cookie in adapter.response_cookies() {
//!     response.headers_mut().append("set-cookie", cookie.header_value().parse()?);
//! }
//! ```

mod adapter;
mod extract;

pub use adapter::{RequestAdapter, SetCookie};
pub use extract::{BodyInputs, ExtractInputs, RawValue, RequestInputs, Source};
