//! Element id generation

use chrono::Utc;
use uuid::Uuid;

/// `<prefix>-<unix millis>-<random>`
///
/// Collisions are unlikely but possible; the registry still rejects them.
pub fn generate_id(prefix: &str) -> String {
    let millis = Utc::now().timestamp_millis();
    let random = Uuid::new_v4().simple().to_string();
    format!("{}-{}-{}", prefix, millis, &random[..6])
}
