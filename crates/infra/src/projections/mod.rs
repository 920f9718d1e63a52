//! Projection implementations (read model builders).
//!
//! Projections consume entity events and build query-optimized read models.
//! All projections are:
//! - **Rebuildable**: can be reconstructed from the event log
//! - **Idempotent**: safe for at-least-once delivery
//! - **Isolated**: each owns its store and never reads another's

pub mod audit_log;
pub mod checkpoint_store;
pub mod entity_status;
pub mod flat_view;

use serde_json::Value as JsonValue;

use streamfold_entity::{EntityEvent, EntityEventDecodeError};
use streamfold_events::{EventEnvelope, ProjectionError};

pub use audit_log::{AUDIT_LOG_PROJECTION, AuditLog, AuditLogEntry, AuditLogProjection};
pub use checkpoint_store::{CheckpointStore, InMemoryCheckpointStore};
pub use entity_status::{ENTITY_STATUS_PROJECTION, EntityStatus, EntityStatusProjection};
pub use flat_view::{FLAT_VIEW_PROJECTION, FLAT_VIEW_TABLE, FlatViewProjection, FlatViewRow, RowAction, row_action};

/// Decode a raw stored envelope into a typed entity envelope.
///
/// Unknown type names map to `ProjectionError::UnknownEvent`, malformed
/// payloads to `ProjectionError::Deserialize`.
pub fn decode_envelope(envelope: EventEnvelope<JsonValue>) -> Result<EventEnvelope<EntityEvent>, ProjectionError> {
    let sequence = envelope.sequence();
    envelope.try_map(|event_type, payload| {
        EntityEvent::decode(event_type, payload).map_err(|err| match err {
            EntityEventDecodeError::UnknownEventType(event_type) => {
                ProjectionError::UnknownEvent { event_type, sequence }
            }
            EntityEventDecodeError::Malformed { event_type, reason }
            | EntityEventDecodeError::Encode { event_type, reason } => ProjectionError::Deserialize {
                event_type,
                sequence,
                reason,
            },
        })
    })
}
