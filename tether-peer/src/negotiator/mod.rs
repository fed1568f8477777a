mod negotiation_state;
mod negotiator;
mod negotiator_command;
mod session;
mod session_handle;

pub use negotiation_state::*;
pub use negotiator::*;
pub use negotiator_command::*;
pub use session::*;
pub use session_handle::*;
