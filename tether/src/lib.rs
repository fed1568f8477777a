pub use tether_core::{PeerId, SessionId};

pub mod model {
    pub use tether_core::model::*;
}

#[cfg(feature = "peer")]
pub mod peer {
    pub use tether_peer::*;
}

#[cfg(feature = "relay")]
pub mod relay {
    pub use tether_relay::*;
}
