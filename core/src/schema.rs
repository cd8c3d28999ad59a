//! Schema registry: tenant-scoped schemas with append-only versions.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use intake_audit::{AuditEvent, AuditEventName, AuditSink};
use intake_types::{
    ActorId, FieldDefinition, FieldDefinitionError, Schema, SchemaId, SchemaVersion, TenantId,
};
use thiserror::Error;
use tokio::sync::RwLock;

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("no such schema {0}")]
    UnknownSchema(SchemaId),
    #[error(transparent)]
    InvalidField(#[from] FieldDefinitionError),
    #[error("schema store failure: {0}")]
    Store(String),
    #[error("audit append failed: {0}")]
    Audit(#[from] intake_audit::AuditError),
}

/// Persistence contract for schemas. Versions are immutable once inserted.
#[async_trait::async_trait]
pub trait SchemaStore: Send + Sync {
    async fn insert_schema(&self, schema: Schema) -> Result<(), SchemaError>;

    async fn get_schema(&self, id: &SchemaId) -> Result<Option<Schema>, SchemaError>;

    async fn insert_version(&self, version: SchemaVersion) -> Result<(), SchemaError>;

    /// Highest version number for a schema, if any version exists.
    async fn latest_version(&self, id: &SchemaId) -> Result<Option<SchemaVersion>, SchemaError>;

    async fn get_version(
        &self,
        id: &SchemaId,
        version: u32,
    ) -> Result<Option<SchemaVersion>, SchemaError>;

    async fn delete_schema(&self, id: &SchemaId) -> Result<bool, SchemaError>;
}

/// In-memory schema store.
#[derive(Debug, Default)]
pub struct MemorySchemaStore {
    schemas: RwLock<HashMap<SchemaId, Schema>>,
    versions: RwLock<HashMap<SchemaId, Vec<SchemaVersion>>>,
}

impl MemorySchemaStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl SchemaStore for MemorySchemaStore {
    async fn insert_schema(&self, schema: Schema) -> Result<(), SchemaError> {
        self.schemas
            .write()
            .await
            .insert(schema.id.clone(), schema);
        Ok(())
    }

    async fn get_schema(&self, id: &SchemaId) -> Result<Option<Schema>, SchemaError> {
        Ok(self.schemas.read().await.get(id).cloned())
    }

    async fn insert_version(&self, version: SchemaVersion) -> Result<(), SchemaError> {
        self.versions
            .write()
            .await
            .entry(version.schema_id.clone())
            .or_default()
            .push(version);
        Ok(())
    }

    async fn latest_version(&self, id: &SchemaId) -> Result<Option<SchemaVersion>, SchemaError> {
        Ok(self
            .versions
            .read()
            .await
            .get(id)
            .and_then(|versions| versions.iter().max_by_key(|v| v.version).cloned()))
    }

    async fn get_version(
        &self,
        id: &SchemaId,
        version: u32,
    ) -> Result<Option<SchemaVersion>, SchemaError> {
        Ok(self
            .versions
            .read()
            .await
            .get(id)
            .and_then(|versions| versions.iter().find(|v| v.version == version).cloned()))
    }

    async fn delete_schema(&self, id: &SchemaId) -> Result<bool, SchemaError> {
        self.versions.write().await.remove(id);
        Ok(self.schemas.write().await.remove(id).is_some())
    }
}

/// Schema CRUD with field validation and audit.
pub struct SchemaService {
    store: Arc<dyn SchemaStore>,
    audit: Arc<dyn AuditSink>,
}

impl SchemaService {
    #[must_use]
    pub fn new(store: Arc<dyn SchemaStore>, audit: Arc<dyn AuditSink>) -> Self {
        Self { store, audit }
    }

    pub async fn create_schema(
        &self,
        tenant_id: TenantId,
        name: impl Into<String>,
        actor: Option<ActorId>,
    ) -> Result<Schema, SchemaError> {
        let schema = Schema {
            id: SchemaId::generate(),
            tenant_id: tenant_id.clone(),
            name: name.into(),
            created_at: Utc::now(),
        };
        self.store.insert_schema(schema.clone()).await?;

        let mut event = AuditEvent::new(
            tenant_id,
            AuditEventName::SchemaCreated,
            "schema",
            schema.id.as_str(),
        )
        .with_detail("name", schema.name.clone());
        if let Some(actor) = actor {
            event = event.with_actor(actor);
        }
        self.audit.append(event).await?;
        Ok(schema)
    }

    /// Append a new immutable version. Field definitions are validated
    /// before anything is written.
    pub async fn add_version(
        &self,
        schema_id: &SchemaId,
        fields: Vec<FieldDefinition>,
        actor: Option<ActorId>,
    ) -> Result<SchemaVersion, SchemaError> {
        let schema = self
            .store
            .get_schema(schema_id)
            .await?
            .ok_or_else(|| SchemaError::UnknownSchema(schema_id.clone()))?;
        intake_types::validate_fields(&fields)?;

        let next = self
            .store
            .latest_version(schema_id)
            .await?
            .map_or(1, |latest| latest.version + 1);
        let version = SchemaVersion {
            schema_id: schema_id.clone(),
            version: next,
            fields,
            created_at: Utc::now(),
        };
        self.store.insert_version(version.clone()).await?;

        let mut event = AuditEvent::new(
            schema.tenant_id,
            AuditEventName::SchemaVersionCreated,
            "schema",
            schema_id.as_str(),
        )
        .with_detail("version", version.version);
        if let Some(actor) = actor {
            event = event.with_actor(actor);
        }
        self.audit.append(event).await?;
        Ok(version)
    }

    pub async fn delete_schema(
        &self,
        schema_id: &SchemaId,
        actor: Option<ActorId>,
    ) -> Result<(), SchemaError> {
        let schema = self
            .store
            .get_schema(schema_id)
            .await?
            .ok_or_else(|| SchemaError::UnknownSchema(schema_id.clone()))?;
        self.store.delete_schema(schema_id).await?;

        let mut event = AuditEvent::new(
            schema.tenant_id,
            AuditEventName::SchemaDeleted,
            "schema",
            schema_id.as_str(),
        );
        if let Some(actor) = actor {
            event = event.with_actor(actor);
        }
        self.audit.append(event).await?;
        Ok(())
    }

    pub async fn latest(&self, schema_id: &SchemaId) -> Result<Option<SchemaVersion>, SchemaError> {
        self.store.latest_version(schema_id).await
    }

    pub async fn version(
        &self,
        schema_id: &SchemaId,
        version: u32,
    ) -> Result<Option<SchemaVersion>, SchemaError> {
        self.store.get_version(schema_id, version).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use intake_audit::MemoryAuditSink;
    use intake_types::FieldType;

    fn field(key: &str) -> FieldDefinition {
        FieldDefinition {
            key: key.to_string(),
            label: key.to_string(),
            field_type: FieldType::String,
            required: false,
            instructions: String::new(),
            enum_options: None,
            validation: None,
            confidence_threshold: None,
            source_hints: None,
        }
    }

    fn service() -> (SchemaService, Arc<MemoryAuditSink>) {
        let audit = Arc::new(MemoryAuditSink::new());
        (
            SchemaService::new(Arc::new(MemorySchemaStore::new()), audit.clone()),
            audit,
        )
    }

    #[tokio::test]
    async fn versions_append_and_latest_wins() {
        let (service, audit) = service();
        let schema = service
            .create_schema(TenantId::new("t1"), "Company profile", None)
            .await
            .unwrap();

        let v1 = service
            .add_version(&schema.id, vec![field("company_name")], None)
            .await
            .unwrap();
        let v2 = service
            .add_version(
                &schema.id,
                vec![field("company_name"), field("phone_number")],
                None,
            )
            .await
            .unwrap();
        assert_eq!(v1.version, 1);
        assert_eq!(v2.version, 2);

        let latest = service.latest(&schema.id).await.unwrap().unwrap();
        assert_eq!(latest.version, 2);
        assert_eq!(latest.fields.len(), 2);
        // Earlier versions stay readable.
        let pinned = service.version(&schema.id, 1).await.unwrap().unwrap();
        assert_eq!(pinned.fields.len(), 1);

        let names = audit.names().await;
        assert_eq!(
            names,
            [
                AuditEventName::SchemaCreated,
                AuditEventName::SchemaVersionCreated,
                AuditEventName::SchemaVersionCreated,
            ]
        );
    }

    #[tokio::test]
    async fn invalid_fields_are_rejected_before_writing() {
        let (service, _) = service();
        let schema = service
            .create_schema(TenantId::new("t1"), "Profile", None)
            .await
            .unwrap();
        let result = service
            .add_version(&schema.id, vec![field("Bad-Key")], None)
            .await;
        assert!(matches!(result, Err(SchemaError::InvalidField(_))));
        assert!(service.latest(&schema.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn delete_removes_schema_and_audits() {
        let (service, audit) = service();
        let schema = service
            .create_schema(TenantId::new("t1"), "Profile", None)
            .await
            .unwrap();
        service.delete_schema(&schema.id, None).await.unwrap();
        assert!(
            service
                .add_version(&schema.id, vec![field("x")], None)
                .await
                .is_err()
        );
        assert!(audit.names().await.contains(&AuditEventName::SchemaDeleted));
    }
}
