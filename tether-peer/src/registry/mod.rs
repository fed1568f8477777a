mod session_registry;
mod signal_router;

pub use session_registry::*;
pub use signal_router::*;
