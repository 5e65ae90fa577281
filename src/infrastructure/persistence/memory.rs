//! In-memory repository implementations

use crate::domain::call::entity::Contact;
use crate::domain::call::repository::{ContactRepository, PhoneQuery, PhonecallRepository};
use crate::domain::call::service::CallDomainService;
use crate::domain::phonecall::{Phonecall, PhonecallOutcome};
use crate::domain::shared::error::DomainError;
use crate::domain::shared::result::Result;
use crate::domain::shared::value_objects::PhonecallId;
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// Address book held in memory
#[derive(Clone, Default)]
pub struct InMemoryContactRepository {
    contacts: Arc<RwLock<Vec<Contact>>>,
}

impl InMemoryContactRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_contacts(contacts: Vec<Contact>) -> Self {
        Self {
            contacts: Arc::new(RwLock::new(contacts)),
        }
    }

    pub async fn add(&self, contact: Contact) {
        self.contacts.write().await.push(contact);
    }
}

#[async_trait]
impl ContactRepository for InMemoryContactRepository {
    async fn search(&self, query: &PhoneQuery) -> Result<Vec<Contact>> {
        let contacts = self.contacts.read().await;

        let mut found: Vec<Contact> = contacts
            .iter()
            .filter(|contact| {
                contact
                    .numbers()
                    .any(|number| CallDomainService::matches(number, query))
            })
            .cloned()
            .collect();
        found.sort_by_key(|contact| contact.id().value());

        Ok(found)
    }
}

/// Records kept by [`InMemoryPhonecallRepository::new`]
pub const DEFAULT_PHONECALL_CAPACITY: usize = 1000;

#[derive(Default)]
struct CallLog {
    calls: HashMap<PhonecallId, Phonecall>,
    /// Creation order, oldest first
    order: VecDeque<PhonecallId>,
}

/// Call log held in memory
///
/// Keeps at most `capacity` records; creating one more drops the oldest.
#[derive(Clone)]
pub struct InMemoryPhonecallRepository {
    log: Arc<RwLock<CallLog>>,
    capacity: usize,
}

impl Default for InMemoryPhonecallRepository {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_PHONECALL_CAPACITY)
    }
}

impl InMemoryPhonecallRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            log: Arc::new(RwLock::new(CallLog::default())),
            capacity: capacity.max(1),
        }
    }

    pub async fn len(&self) -> usize {
        self.log.read().await.calls.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.log.read().await.calls.is_empty()
    }
}

#[async_trait]
impl PhonecallRepository for InMemoryPhonecallRepository {
    async fn create(&self, call: &Phonecall) -> Result<()> {
        let mut log = self.log.write().await;
        if log.calls.contains_key(&call.id) {
            return Err(DomainError::InvalidOperation(format!(
                "Phonecall {} already exists",
                call.id
            )));
        }

        debug!("Phonecall {} created for {}", call.id, call.number);
        log.calls.insert(call.id, call.clone());
        log.order.push_back(call.id);

        while log.order.len() > self.capacity {
            if let Some(oldest) = log.order.pop_front() {
                log.calls.remove(&oldest);
                debug!("Phonecall {} dropped from the log", oldest);
            }
        }
        Ok(())
    }

    async fn mark_answered(&self, id: &PhonecallId) -> Result<()> {
        let mut log = self.log.write().await;
        let call = log
            .calls
            .get_mut(id)
            .ok_or_else(|| DomainError::NotFound(format!("Phonecall {} not found", id)))?;

        call.mark_answered();
        Ok(())
    }

    async fn mark_ended(&self, id: &PhonecallId, outcome: PhonecallOutcome) -> Result<()> {
        let mut log = self.log.write().await;
        let call = log
            .calls
            .get_mut(id)
            .ok_or_else(|| DomainError::NotFound(format!("Phonecall {} not found", id)))?;

        debug!("Phonecall {} ended as {}", id, outcome.state.as_str());
        call.mark_ended(outcome);
        Ok(())
    }

    async fn find_by_id(&self, id: &PhonecallId) -> Result<Option<Phonecall>> {
        Ok(self.log.read().await.calls.get(id).cloned())
    }

    async fn list_recent(&self, limit: usize) -> Result<Vec<Phonecall>> {
        let log = self.log.read().await;

        let mut recent: Vec<Phonecall> = log.calls.values().cloned().collect();
        recent.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        recent.truncate(limit);

        Ok(recent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::call::value_object::CallDirection;
    use crate::domain::phonecall::PhonecallState;
    use crate::domain::shared::value_objects::PartnerId;

    fn contact(id: i64, phone: Option<&str>, mobile: Option<&str>) -> Contact {
        Contact::new(
            PartnerId::new(id),
            format!("Contact {}", id),
            phone.map(str::to_string),
            mobile.map(str::to_string),
        )
    }

    #[tokio::test]
    async fn test_contact_search_steps() {
        let repo = InMemoryContactRepository::with_contacts(vec![
            contact(7, Some("+32 2 555 12 34"), None),
            contact(3, None, Some("0032 475 99 88 77")),
        ]);

        let exact = repo
            .search(&PhoneQuery::Exact("+32 2 555 12 34".to_string()))
            .await
            .unwrap();
        assert_eq!(exact.len(), 1);
        assert_eq!(exact[0].id(), PartnerId::new(7));

        let sanitized = repo
            .search(&PhoneQuery::Sanitized("3225551234".to_string()))
            .await
            .unwrap();
        assert_eq!(sanitized.len(), 1);

        let suffix = repo
            .search(&PhoneQuery::Suffix("998877".to_string()))
            .await
            .unwrap();
        assert_eq!(suffix.len(), 1);
        assert_eq!(suffix[0].id(), PartnerId::new(3));
    }

    #[tokio::test]
    async fn test_contact_search_orders_by_id() {
        let repo = InMemoryContactRepository::new();
        repo.add(contact(9, Some("555 1234"), None)).await;
        repo.add(contact(2, Some("5551234"), None)).await;

        let found = repo
            .search(&PhoneQuery::Sanitized("5551234".to_string()))
            .await
            .unwrap();
        let ids: Vec<i64> = found.iter().map(|c| c.id().value()).collect();
        assert_eq!(ids, vec![2, 9]);
    }

    #[tokio::test]
    async fn test_phonecall_lifecycle() {
        let repo = InMemoryPhonecallRepository::new();
        let call = Phonecall::new(CallDirection::Outgoing, "5551234".to_string(), None);
        let id = call.id;

        repo.create(&call).await.unwrap();
        assert!(repo.create(&call).await.is_err());

        repo.mark_answered(&id).await.unwrap();
        repo.mark_ended(&id, PhonecallOutcome::new(PhonecallState::Done))
            .await
            .unwrap();

        let stored = repo.find_by_id(&id).await.unwrap().unwrap();
        assert_eq!(stored.state, PhonecallState::Done);
        assert!(stored.answered_at.is_some());
        assert!(stored.duration_seconds.is_some());
    }

    #[tokio::test]
    async fn test_unknown_phonecall() {
        let repo = InMemoryPhonecallRepository::new();
        let result = repo.mark_answered(&PhonecallId::new()).await;
        assert!(matches!(result, Err(DomainError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_list_recent() {
        let repo = InMemoryPhonecallRepository::new();
        for number in ["1", "2", "3"] {
            repo.create(&Phonecall::new(CallDirection::Incoming, number.to_string(), None))
                .await
                .unwrap();
        }

        assert_eq!(repo.len().await, 3);
        assert_eq!(repo.list_recent(2).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_oldest_records_are_evicted() {
        let repo = InMemoryPhonecallRepository::with_capacity(2);
        let first = Phonecall::new(CallDirection::Incoming, "1".to_string(), None);
        repo.create(&first).await.unwrap();
        for number in ["2", "3"] {
            repo.create(&Phonecall::new(CallDirection::Incoming, number.to_string(), None))
                .await
                .unwrap();
        }

        assert_eq!(repo.len().await, 2);
        assert!(repo.find_by_id(&first.id).await.unwrap().is_none());
        assert!(matches!(
            repo.mark_ended(&first.id, PhonecallOutcome::new(PhonecallState::Done))
                .await,
            Err(DomainError::NotFound(_))
        ));

        let mut numbers: Vec<String> = repo
            .list_recent(10)
            .await
            .unwrap()
            .into_iter()
            .map(|call| call.number)
            .collect();
        numbers.sort();
        assert_eq!(numbers, vec!["2", "3"]);
    }
}
