mod candidate;
mod description;
mod peer;
mod session;
mod signaling;

pub use candidate::IceCandidate;
pub use description::{SdpType, SessionDescription};
pub use peer::PeerId;
pub use session::{Role, SessionId};
pub use signaling::{IceServerConfig, MessageKind, RelayEnvelope, SignalMessage};
