mod lifecycle_monitor;
mod session_event;
mod supervisory_state;

pub use lifecycle_monitor::*;
pub use session_event::*;
pub use supervisory_state::*;
