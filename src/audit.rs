use chrono::{DateTime, Utc};
use serde_json::Value;
use uuid::Uuid;

use crate::store::Store;

#[derive(Debug, Clone)]
pub struct AuditEntry {
    pub id: Uuid,
    pub customer_id: Option<Uuid>,
    pub action: String,
    pub resource: Option<String>,
    pub metadata: Option<Value>,
    pub created_at: DateTime<Utc>,
}

/// Best-effort audit record; a failure is logged and never fails the request.
pub async fn log_audit(
    store: &dyn Store,
    customer_id: Option<Uuid>,
    action: &str,
    resource: Option<&str>,
    metadata: Option<Value>,
) {
    let entry = AuditEntry {
        id: Uuid::new_v4(),
        customer_id,
        action: action.to_string(),
        resource: resource.map(str::to_string),
        metadata,
        created_at: Utc::now(),
    };
    if let Err(err) = store.record_audit(entry).await {
        tracing::warn!(error = %err, action, "audit log failed");
    }
}
