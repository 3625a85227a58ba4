//! Host and path routing for published content.
//!
//! Both halves are independent of HTTP types so they can be tested without
//! a server.

pub mod host;
pub mod path;

pub use host::{HostRoute, normalize_host, route_host};
pub use path::{PathError, RequestPath, Resolved, resolve};
