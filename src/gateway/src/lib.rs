//! # Warden Gateway
//!
//! HTTP surfaces around the authorization core:
//!
//! - **Worker** - `POST /authorize` over the in-process decision engine
//! - **Proxy** - enforcement point in front of arbitrary backends, driven by a
//!   hot-reloaded routing table of proxy resources
//!
//! Both roles share one binary (`warden`) and one TOML configuration file.

pub mod config;
pub mod error;
pub mod observability;
pub mod proxy;
pub mod routing;
pub mod server;
pub mod worker;

pub use config::GatewayConfig;
pub use error::{ErrorBody, ErrorResponse, GatewayError};
pub use observability::REQUEST_ID_HEADER;
pub use routing::{RefreshOutcome, RoutingTable, RoutingTableManager, TableHandle};
pub use server::Role;
