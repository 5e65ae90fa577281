//! Repository interfaces for the server-side collaborators of a call
//!
//! Defined in the domain layer as traits (ports) and implemented in the
//! infrastructure layer (adapters).

use crate::domain::call::entity::Contact;
use crate::domain::phonecall::{Phonecall, PhonecallOutcome};
use crate::domain::shared::result::Result;
use crate::domain::shared::value_objects::PhonecallId;
use async_trait::async_trait;

/// One step of the caller lookup heuristic
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PhoneQuery {
    /// Stored number equals the received one verbatim
    Exact(String),
    /// Stored number equals the received one once both are reduced to digits
    Sanitized(String),
    /// Stored number, reduced to digits, ends with these digits
    Suffix(String),
}

/// Contact lookup by phone number
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ContactRepository: Send + Sync {
    /// Contacts matching the query, ordered by id
    async fn search(&self, query: &PhoneQuery) -> Result<Vec<Contact>>;
}

/// Call log persistence
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PhonecallRepository: Send + Sync {
    /// Store a new record
    async fn create(&self, call: &Phonecall) -> Result<()>;

    /// Record that the call was answered
    async fn mark_answered(&self, id: &PhonecallId) -> Result<()>;

    /// Record how the call ended
    async fn mark_ended(&self, id: &PhonecallId, outcome: PhonecallOutcome) -> Result<()>;

    /// Find a record by its ID
    async fn find_by_id(&self, id: &PhonecallId) -> Result<Option<Phonecall>>;

    /// Most recent records first
    async fn list_recent(&self, limit: usize) -> Result<Vec<Phonecall>>;
}
