//! Signaling and negotiation engine: drives a peer-connection transport
//! through offer/answer and trickle ICE over an unreliable relay.

mod candidate;
mod config;
mod error;
mod lifecycle;
mod negotiator;
mod registry;
mod relay;
mod transport;

pub use candidate::*;
pub use config::*;
pub use error::*;
pub use lifecycle::*;
pub use negotiator::*;
pub use registry::*;
pub use relay::*;
pub use transport::*;
