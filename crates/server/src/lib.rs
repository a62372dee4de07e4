//! Encrypting reverse proxy for an Alist backend.
//!
//! This crate provides the HTTP data plane:
//! - Range-aware decrypting downloads (`/d`, `/p`, `/redirect`)
//! - Encrypting uploads (`/api/fs/put`, WebDAV `PUT`)
//! - Listing interception with filename decryption and cover folding
//! - WebDAV adaptation (PROPFIND rewriting, path translation)
//! - Catch-all passthrough with 302 interception

pub mod caches;
pub mod error;
pub mod handlers;
pub mod range;
pub mod redirect;
pub mod resolver;
pub mod routes;
pub mod sizing;
pub mod state;
pub mod stream;
pub mod upstream;

pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use state::AppState;
