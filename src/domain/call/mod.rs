//! Call bounded context - manages the lifecycle of the softphone call

pub mod aggregate;
pub mod entity;
pub mod event;
pub mod repository;
pub mod service;
pub mod value_object;

pub use aggregate::CallSession;
pub use entity::{CallParams, Contact};
pub use event::{SipErrorPayload, SoftphoneEvent};
pub use repository::{ContactRepository, PhoneQuery, PhonecallRepository};
pub use service::CallDomainService;
pub use value_object::{CallDirection, CallState, RejectionKind};
