//! Routing Table Manager
//!
//! ```text
//! repository ──refresh()──> build new RoutingTable ──ArcSwap::store──> TableHandle
//!                                                                          │
//!                                          request handlers: snapshot() ◄──┘
//! ```

pub mod manager;
pub mod table;

pub use manager::{RefreshOutcome, RoutingTableManager, SkippedRoute, TableHandle};
pub use table::{normalize_path, RouteError, RouteMatch, RoutingTable};
