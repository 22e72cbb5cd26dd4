//! Asset sync handler.

use async_trait::async_trait;
use hrsync_core::event::SyncEvent;
use hrsync_core::handler::{HandlerError, SyncHandler, SyncOutcome};
use serde_json::Value;
use tracing::{info, instrument};

use crate::client::{AssetClient, AssetError};
use crate::mapping::{AttributeIds, job_title, map_employee};

/// Upserts the employee in each event into the asset system, keyed by email.
#[derive(Debug, Clone)]
pub struct AssetSyncHandler<C> {
    client: C,
    ids: AttributeIds,
}

impl<C: AssetClient> AssetSyncHandler<C> {
    #[must_use]
    pub fn new(client: C, ids: AttributeIds) -> Self {
        Self { client, ids }
    }

    /// Object key of the role named by the employee's job title, creating
    /// the role object on first sight. `None` when there is no job title.
    async fn resolve_role(&self, payload: &Value) -> Result<Option<String>, AssetError> {
        let Some(title) = job_title(payload) else {
            return Ok(None);
        };
        if let Some(role) = self.client.find_role_by_label(title).await? {
            return Ok(Some(role.object_key));
        }
        let role = self.client.create_role(title).await?;
        info!(role = title, object_key = %role.object_key, "role object created");
        Ok(Some(role.object_key))
    }
}

#[async_trait]
impl<C: AssetClient> SyncHandler for AssetSyncHandler<C> {
    #[instrument(skip(self, event), fields(event_id = %event.id, event_type = %event.event_type))]
    async fn handle(&self, event: &SyncEvent) -> Result<SyncOutcome, HandlerError> {
        let role_key = self
            .resolve_role(&event.payload)
            .await
            .map_err(|e| HandlerError::new(e.to_string()))?;
        let employee = map_employee(&event.payload, &self.ids, role_key.as_deref())
            .map_err(|e| HandlerError::new(e.to_string()))?;

        let existing = self
            .client
            .find_by_email(&employee.email)
            .await
            .map_err(|e| HandlerError::new(e.to_string()))?;

        let object_id = match existing {
            Some(object) => {
                self.client
                    .update(&object.id, &employee.attributes)
                    .await
                    .map_err(|e| HandlerError::new(e.to_string()))?;
                info!(object_id = %object.id, "asset object updated");
                object.id
            }
            None => {
                let id = self
                    .client
                    .create(&employee.attributes)
                    .await
                    .map_err(|e| HandlerError::new(e.to_string()))?;
                info!(object_id = %id, "asset object created");
                id
            }
        };

        Ok(SyncOutcome::new(object_id))
    }

    async fn check_connection(&self) -> Result<(), HandlerError> {
        self.client
            .check_connection()
            .await
            .map_err(|e| HandlerError::new(e.to_string()))
    }
}
