use serde::Serializer;
use time::{OffsetDateTime, format_description::well_known::Rfc3339};

pub(crate) mod inbound;
pub mod outbound;
pub mod phase;
pub mod validation;
pub mod view;

pub(crate) fn serialize_timestamp<S: Serializer>(
    value: &Option<OffsetDateTime>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match value {
        Some(timestamp) => {
            let formatted = timestamp
                .format(&Rfc3339)
                .unwrap_or_else(|_| "invalid-timestamp".into());
            serializer.serialize_some(&formatted)
        }
        None => serializer.serialize_none(),
    }
}
