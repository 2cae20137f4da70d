//! Site-level endpoints: aggregate counters, newsletter, cached news,
//! comments, and the articles list.

pub mod comments;
pub mod routes;

pub use routes::{SiteRouteState, site_routes};
