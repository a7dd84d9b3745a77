use serde_json::{Map, Value as JsonValue};

use crate::storage::{Record, RecordId, ID_FIELD};

/// Fields that may hold the credential secret, in lookup order.
const SECRET_FIELDS: [&str; 2] = ["password_hash", "password"];
const USERNAME_FIELD: &str = "username";

/// A known identity. The secret is kept private and never serialized by [`User::public_json`].
#[derive(Debug, Clone, PartialEq)]
pub struct User {
    pub id: RecordId,
    pub username: String,
    secret: String,
    /// Any other fields of the user record (display name, roles, ...).
    pub attrs: Map<String, JsonValue>,
}

impl User {
    pub fn new(id: impl Into<RecordId>, username: impl Into<String>, secret: impl Into<String>) -> Self {
        Self { id: id.into(), username: username.into(), secret: secret.into(), attrs: Map::new() }
    }

    pub fn with_attr(mut self, key: &str, value: JsonValue) -> Self {
        self.attrs.insert(key.to_string(), value);
        self
    }

    pub(crate) fn secret(&self) -> &str { &self.secret }

    /// Build a user from a raw `user` table record.
    pub fn from_record(record: &Record) -> Result<Self, String> {
        let id = RecordId::of(record).map_err(|e| e.to_string())?;
        let username = match record.get(USERNAME_FIELD) {
            Some(JsonValue::String(s)) if !s.is_empty() => s.clone(),
            Some(_) => return Err("'username' must be a non-empty string".into()),
            None => return Err("missing 'username'".into()),
        };
        let secret_field = SECRET_FIELDS
            .iter()
            .find(|f| record.contains_key(**f))
            .ok_or_else(|| "missing 'password'".to_string())?;
        let secret = match record.get(*secret_field) {
            Some(JsonValue::String(s)) if !s.is_empty() => s.clone(),
            _ => return Err(format!("'{}' must be a non-empty string", secret_field)),
        };
        let attrs = record
            .iter()
            .filter(|(k, _)| k.as_str() != ID_FIELD && k.as_str() != USERNAME_FIELD && !SECRET_FIELDS.contains(&k.as_str()))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        Ok(Self { id, username, secret, attrs })
    }

    /// The user as returned to clients: every field except the secret.
    pub fn public_json(&self) -> JsonValue {
        let mut out = self.attrs.clone();
        out.insert(ID_FIELD.into(), serde_json::to_value(&self.id).unwrap_or(JsonValue::Null));
        out.insert(USERNAME_FIELD.into(), JsonValue::String(self.username.clone()));
        JsonValue::Object(out)
    }
}
