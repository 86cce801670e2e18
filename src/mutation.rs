//! Queued write intents and their persisted wire shape.

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::types::{Action, Fields, MutationId, RowId, Timestamp};

/// Payload field that identifies the target row of updates and deletes.
pub const ROW_ID_FIELD: &str = "id";

/// Reasons an untyped `(resource, action, payload)` triple is rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MutationError {
    /// Update or delete payload without an `id` field.
    #[error("{action} on `{resource}` is missing the `id` field")]
    MissingRowId {
        /// Target resource.
        resource: String,
        /// Requested action.
        action: Action,
    },
    /// `id` field present but not an integer or string.
    #[error("{action} on `{resource}` has a non-scalar `id`: {value}")]
    InvalidRowId {
        /// Target resource.
        resource: String,
        /// Requested action.
        action: Action,
        /// Offending value, rendered as JSON.
        value: String,
    },
    /// Resource name was empty.
    #[error("resource name must not be empty")]
    EmptyResource,
}

/// One write against a named remote resource.
#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
    /// Create a row from `fields`.
    Insert {
        /// Target collection.
        resource: String,
        /// Row contents.
        fields: Fields,
    },
    /// Overwrite `fields` on the row keyed by `id`.
    Update {
        /// Target collection.
        resource: String,
        /// Target row.
        id: RowId,
        /// Fields to overwrite, identifying field excluded.
        fields: Fields,
    },
    /// Remove the row keyed by `id`.
    Delete {
        /// Target collection.
        resource: String,
        /// Target row.
        id: RowId,
    },
}

impl Mutation {
    /// Builds an insert.
    pub fn insert(resource: impl Into<String>, fields: Fields) -> Self {
        Self::Insert {
            resource: resource.into(),
            fields,
        }
    }

    /// Builds a partial update. An `id` key in `fields` is dropped; the row
    /// is always addressed by `id`.
    pub fn update(resource: impl Into<String>, id: impl Into<RowId>, fields: Fields) -> Self {
        Self::Update {
            resource: resource.into(),
            id: id.into(),
            fields: fields
                .into_iter()
                .filter(|(key, _)| key != ROW_ID_FIELD)
                .collect(),
        }
    }

    /// Builds a delete.
    pub fn delete(resource: impl Into<String>, id: impl Into<RowId>) -> Self {
        Self::Delete {
            resource: resource.into(),
            id: id.into(),
        }
    }

    /// Converts the untyped triple into a typed mutation.
    ///
    /// For updates and deletes the `id` field is lifted out of `payload`;
    /// delete ignores any other fields.
    pub fn from_payload(
        resource: impl Into<String>,
        action: Action,
        payload: Fields,
    ) -> Result<Self, MutationError> {
        let resource = resource.into();
        if resource.is_empty() {
            return Err(MutationError::EmptyResource);
        }

        if action == Action::Insert {
            return Ok(Self::Insert {
                resource,
                fields: payload,
            });
        }

        let mut raw_id = None;
        let mut fields = Fields::new();
        for (key, value) in payload {
            if key == ROW_ID_FIELD {
                raw_id = Some(value);
            } else {
                fields.insert(key, value);
            }
        }

        let id = match raw_id {
            None | Some(serde_json::Value::Null) => {
                return Err(MutationError::MissingRowId { resource, action });
            }
            Some(value) => match RowId::from_value(&value) {
                Some(id) => id,
                None => {
                    return Err(MutationError::InvalidRowId {
                        resource,
                        action,
                        value: value.to_string(),
                    });
                }
            },
        };

        if action == Action::Update {
            Ok(Self::Update {
                resource,
                id,
                fields,
            })
        } else {
            Ok(Self::Delete { resource, id })
        }
    }

    /// Rebuilds the mutation from its persisted payload.
    ///
    /// Whatever this returns decodes back to itself, so the queue stores
    /// nothing it cannot read again. Fails for an empty resource.
    pub fn normalize(self) -> Result<Self, MutationError> {
        let action = self.action();
        let payload = self.payload();
        let resource = match self {
            Self::Insert { resource, .. }
            | Self::Update { resource, .. }
            | Self::Delete { resource, .. } => resource,
        };
        Self::from_payload(resource, action, payload)
    }

    /// Target resource name.
    pub fn resource(&self) -> &str {
        match self {
            Self::Insert { resource, .. }
            | Self::Update { resource, .. }
            | Self::Delete { resource, .. } => resource,
        }
    }

    /// Write kind.
    pub fn action(&self) -> Action {
        match self {
            Self::Insert { .. } => Action::Insert,
            Self::Update { .. } => Action::Update,
            Self::Delete { .. } => Action::Delete,
        }
    }

    /// Target row for updates and deletes.
    pub fn row_id(&self) -> Option<&RowId> {
        match self {
            Self::Insert { .. } => None,
            Self::Update { id, .. } | Self::Delete { id, .. } => Some(id),
        }
    }

    /// Flat payload with the identifying field first.
    pub fn payload(&self) -> Fields {
        match self {
            Self::Insert { fields, .. } => fields.clone(),
            Self::Update { id, fields, .. } => {
                let mut out = Fields::new();
                out.insert(ROW_ID_FIELD.to_string(), id.to_value());
                for (key, value) in fields {
                    if key != ROW_ID_FIELD {
                        out.insert(key.clone(), value.clone());
                    }
                }
                out
            }
            Self::Delete { id, .. } => {
                let mut out = Fields::new();
                out.insert(ROW_ID_FIELD.to_string(), id.to_value());
                out
            }
        }
    }
}

/// A mutation as stored in the queue. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(into = "WireRecord", try_from = "WireRecord")]
pub struct MutationRecord {
    id: MutationId,
    created_at: Timestamp,
    mutation: Mutation,
}

impl MutationRecord {
    /// Stamps a fresh id and the current time onto `mutation`.
    pub fn new(mutation: Mutation) -> Self {
        Self {
            id: MutationId::new(),
            created_at: Utc::now(),
            mutation,
        }
    }

    /// Queue identifier.
    pub fn id(&self) -> MutationId {
        self.id
    }

    /// Enqueue time.
    pub fn created_at(&self) -> Timestamp {
        self.created_at
    }

    /// The write itself.
    pub fn mutation(&self) -> &Mutation {
        &self.mutation
    }

    /// Shorthand for `mutation().resource()`.
    pub fn resource(&self) -> &str {
        self.mutation.resource()
    }

    /// Shorthand for `mutation().action()`.
    pub fn action(&self) -> Action {
        self.mutation.action()
    }

    pub(crate) fn with_fresh_id(mut self) -> Self {
        self.id = MutationId::new();
        self
    }
}

/// Persisted layout: `{id, resource, action, payload, created_at}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct WireRecord {
    id: MutationId,
    resource: String,
    action: Action,
    payload: Fields,
    created_at: Timestamp,
}

impl From<MutationRecord> for WireRecord {
    fn from(value: MutationRecord) -> Self {
        Self {
            id: value.id,
            resource: value.mutation.resource().to_string(),
            action: value.mutation.action(),
            payload: value.mutation.payload(),
            created_at: value.created_at,
        }
    }
}

impl TryFrom<WireRecord> for MutationRecord {
    type Error = MutationError;

    fn try_from(value: WireRecord) -> Result<Self, Self::Error> {
        let mutation = Mutation::from_payload(value.resource, value.action, value.payload)?;
        Ok(Self {
            id: value.id,
            created_at: value.created_at,
            mutation,
        })
    }
}
