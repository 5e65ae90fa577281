//! Session transports: the simulated one and SIP

pub mod demo;
pub mod sip;

pub use demo::DemoTransport;
pub use sip::SipSessionTransport;
