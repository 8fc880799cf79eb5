pub mod card_details;
pub mod orders;
pub mod processor;

pub use card_details::CardDetailsHandler;
pub use orders::OrderEventHandler;
pub use processor::ProcessorEventHandler;

/// Bounded reload-reapply-retry budget for optimistic-save races. When this
/// runs out the conflict bubbles up and the task queue redelivers.
pub const SAVE_RETRIES: u32 = 3;

/// Coerce a JSON scalar into the string form our correlation fields use.
/// Some sources send ids as numbers, some as strings.
pub(crate) fn json_string(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) if !s.is_empty() => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
