//! Streaming session layer: authenticated duplex sessions that relay
//! container output and command results to connected clients.
//!
//! Session state machine:
//!
//! ```text
//! connected --authenticate--> authenticated --subscribe--> streaming
//!     |                            |                           |
//!     +----------- disconnect (relays detached) ---------------+
//! ```

pub mod error;
pub mod events;
pub mod manager;

pub use error::{StreamingError, StreamingResult};
pub use events::{ErrorScope, SessionEvent};
pub use manager::{SessionHandle, SessionManager};
