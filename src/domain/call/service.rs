//! Call domain service

use crate::domain::call::entity::Contact;
use crate::domain::call::repository::{ContactRepository, PhoneQuery};
use crate::domain::shared::result::Result;
use tracing::debug;

/// Number of trailing digits compared by the last-resort caller lookup
pub const SUFFIX_MATCH_DIGITS: usize = 6;

/// Domain service for call-related operations
///
/// Domain services contain business logic that doesn't naturally
/// fit within a single aggregate.
pub struct CallDomainService;

impl CallDomainService {
    /// Reduce a number to its digits, dropping `+`, separators and letters
    pub fn sanitize_number(number: &str) -> String {
        number.chars().filter(|c| c.is_ascii_digit()).collect()
    }

    /// Lookup steps for a received number, most precise first
    pub fn lookup_queries(number: &str) -> Vec<PhoneQuery> {
        let mut queries = vec![PhoneQuery::Exact(number.to_string())];

        let sanitized = Self::sanitize_number(number);
        if sanitized.is_empty() {
            return queries;
        }

        queries.push(PhoneQuery::Sanitized(sanitized.clone()));

        if sanitized.len() >= SUFFIX_MATCH_DIGITS {
            let suffix = &sanitized[sanitized.len() - SUFFIX_MATCH_DIGITS..];
            queries.push(PhoneQuery::Suffix(suffix.to_string()));
        }

        queries
    }

    /// Whether a stored number satisfies a lookup step
    pub fn matches(stored: &str, query: &PhoneQuery) -> bool {
        match query {
            PhoneQuery::Exact(number) => stored == number,
            PhoneQuery::Sanitized(digits) => Self::sanitize_number(stored) == *digits,
            PhoneQuery::Suffix(digits) => Self::sanitize_number(stored).ends_with(digits.as_str()),
        }
    }

    /// Find the contact a caller number belongs to
    ///
    /// Runs the lookup steps in order and returns the first contact of the
    /// first step that yields any.
    pub async fn find_matching_contact(
        contacts: &dyn ContactRepository,
        number: &str,
    ) -> Result<Option<Contact>> {
        for query in Self::lookup_queries(number) {
            let found = contacts.search(&query).await?;
            if let Some(contact) = found.into_iter().next() {
                debug!("Matched {} to contact {} via {:?}", number, contact.id(), query);
                return Ok(Some(contact));
            }
        }

        Ok(None)
    }
}
