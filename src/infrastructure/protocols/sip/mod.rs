//! SIP signaling (RFC 3261) for a single user agent
//!
//! ```text
//! ┌─────────────────────────┐
//! │   SipSessionTransport   │  registration, dialogs
//! └───────────┬─────────────┘
//!             │
//! ┌───────────▼─────────────┐
//! │  message / builder/sdp  │  parse with rsip, render as text
//! └───────────┬─────────────┘
//!             │
//! ┌───────────▼─────────────┐
//! │      UdpTransport       │
//! └─────────────────────────┘
//! ```

pub mod auth;
pub mod builder;
pub mod dialog;
pub mod message;
pub mod sdp;
pub mod session_transport;
pub mod transport;

pub use auth::{DigestChallenge, DigestCredentials};
pub use message::{SipError, SipMessage, SipMethod, SipRequest, SipResponse};
pub use sdp::SdpSession;
pub use session_transport::{SipAccount, SipSessionTransport};
pub use transport::{IncomingMessage, UdpTransport};
