//! Wire shapes shared by the hookcheck target service and its harness
//!
//! The target service and the harness agree on a handful of endpoint paths
//! and on the JSON document the tunnel agent publishes on its local API.

mod error;
mod paths;
mod tunnels;

pub use error::ProtocolError;
pub use paths::{
    HEALTH_PATH, LAST_REQUEST_PATH, PORT_ENV, REGISTER_REQUEST_PATH, TUNNELS_API_PATH,
};
pub use tunnels::{TunnelDescriptor, TunnelInfo};
