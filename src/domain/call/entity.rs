//! Call entities

use crate::domain::shared::value_objects::PartnerId;
use serde::{Deserialize, Serialize};

/// Remote party of the current or most recent call attempt
///
/// Serialized with the key names the dialing panel expects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallParams {
    pub number: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partner_id: Option<PartnerId>,
}

impl CallParams {
    pub fn new(number: impl Into<String>, partner_id: Option<PartnerId>) -> Self {
        Self {
            number: number.into(),
            partner_id,
        }
    }
}

/// Contact known by the server, matched against caller numbers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    id: PartnerId,
    name: String,
    phone: Option<String>,
    mobile: Option<String>,
}

impl Contact {
    pub fn new(id: PartnerId, name: String, phone: Option<String>, mobile: Option<String>) -> Self {
        Self {
            id,
            name,
            phone,
            mobile,
        }
    }

    pub fn id(&self) -> PartnerId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn phone(&self) -> Option<&str> {
        self.phone.as_deref()
    }

    pub fn mobile(&self) -> Option<&str> {
        self.mobile.as_deref()
    }

    /// Every number stored on the contact
    pub fn numbers(&self) -> impl Iterator<Item = &str> {
        self.phone.iter().chain(self.mobile.iter()).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_call_params_serialization() {
        let params = CallParams::new("999", Some(PartnerId::new(42)));
        let json = serde_json::to_value(&params).unwrap();
        assert_eq!(json, serde_json::json!({ "number": "999", "partnerId": 42 }));

        let anonymous = CallParams::new("123", None);
        let json = serde_json::to_value(&anonymous).unwrap();
        assert_eq!(json, serde_json::json!({ "number": "123" }));
    }
}
