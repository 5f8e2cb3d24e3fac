//! BP35C2 Wi-SUN module driver: line classification and the session
//! state machine built on top of it.

pub mod line;
pub mod session;

pub use line::{Erxudp, Line};
pub use session::{Bp35c2Session, PanDescriptor, SessionState};
