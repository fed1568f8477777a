mod transport_binding;
mod transport_config;
mod transport_event;
mod webrtc_binding;

pub use transport_binding::*;
pub use transport_config::*;
pub use transport_event::*;
pub use webrtc_binding::*;
