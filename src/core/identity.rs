//! Sender identity resolution and role-aware message attribution.
//!
//! Two hard rules live here and nowhere else:
//!
//! 1. The wire shape for "who sent this" is not stable; the sender id is
//!    probed through a single prioritized field list instead of ad hoc
//!    fallbacks at call sites.
//! 2. Caretaker sends are proxied through the landlord's identity on the
//!    backend, so for a caretaker viewer a plain id comparison is wrong:
//!    anything from the landlord side counts as "mine", and a matching
//!    `actual_sender_id` additionally marks it as sent by this caretaker
//!    personally.

use crate::api::MessageRecord;
use crate::state::{Message, MessageAttribution, MessageDeliveryState, UserRole, Viewer};

/// Probe order: explicit `sender_id`, flat `user_id`, nested `sender.id`,
/// nested `from.id`. First non-null wins.
pub fn resolved_sender_id(record: &MessageRecord) -> Option<i64> {
    record
        .sender_id
        .or(record.user_id)
        .or(record.sender.as_ref().and_then(|s| s.id))
        .or(record.from.as_ref().and_then(|s| s.id))
}

fn is_landlord_side(role: &str) -> bool {
    role.eq_ignore_ascii_case("landlord") || role.eq_ignore_ascii_case("caretaker")
}

/// Attribution decision table. Kept as explicit branches on (viewer role,
/// sender role, ids); collapsing this into one equality check is exactly the
/// bug that breaks caretaker accounts.
pub fn attribution(
    viewer: &Viewer,
    sender_id: Option<i64>,
    actual_sender_id: Option<i64>,
    sender_role: Option<&str>,
) -> MessageAttribution {
    match viewer.role {
        UserRole::Caretaker => match sender_role {
            Some(role) if is_landlord_side(role) => {
                if actual_sender_id == Some(viewer.user_id) {
                    MessageAttribution::MineViaProxy
                } else {
                    MessageAttribution::Mine
                }
            }
            Some(_) => MessageAttribution::Theirs,
            // No role on the record: fall back to id equality.
            None => {
                if sender_id == Some(viewer.user_id) {
                    MessageAttribution::Mine
                } else {
                    MessageAttribution::Theirs
                }
            }
        },
        _ => {
            if sender_id.is_some() && sender_id == Some(viewer.user_id) {
                MessageAttribution::Mine
            } else {
                MessageAttribution::Theirs
            }
        }
    }
}

/// Normalize a wire record into the engine's message type. This is the only
/// place wire messages become `Message`s, so the resolver runs exactly once
/// per record.
pub fn normalize_message(
    record: &MessageRecord,
    fallback_conversation_id: &str,
    viewer: Option<&Viewer>,
) -> Message {
    let sender_id = resolved_sender_id(record);
    let attribution = viewer
        .map(|v| {
            attribution(
                v,
                sender_id,
                record.actual_sender_id,
                record.sender_role.as_deref(),
            )
        })
        .unwrap_or(MessageAttribution::Theirs);
    Message {
        id: record.id.clone(),
        conversation_id: record
            .conversation_id
            .clone()
            .unwrap_or_else(|| fallback_conversation_id.to_string()),
        sender_id,
        actual_sender_id: record.actual_sender_id,
        sender_role: record.sender_role.clone(),
        text: record.text.clone(),
        image_url: record.image_url.clone(),
        created_at: record.created_at,
        delivery: MessageDeliveryState::Confirmed,
        attribution,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::CaretakerPermissions;

    fn record(v: serde_json::Value) -> MessageRecord {
        serde_json::from_value(v).unwrap()
    }

    fn tenant(user_id: i64) -> Viewer {
        Viewer {
            user_id,
            role: UserRole::Tenant,
            caretaker_permissions: None,
        }
    }

    fn caretaker(user_id: i64) -> Viewer {
        Viewer {
            user_id,
            role: UserRole::Caretaker,
            caretaker_permissions: Some(CaretakerPermissions {
                messages: true,
                maintenance: false,
                listings: false,
            }),
        }
    }

    #[test]
    fn probe_order_is_sender_id_then_user_id_then_nested() {
        let m = record(serde_json::json!({
            "id": "1", "created_at": 0,
            "sender_id": 1, "user_id": 2, "sender": { "id": 3 }, "from": { "id": 4 },
        }));
        assert_eq!(resolved_sender_id(&m), Some(1));

        let m = record(serde_json::json!({
            "id": "1", "created_at": 0,
            "user_id": 2, "sender": { "id": 3 },
        }));
        assert_eq!(resolved_sender_id(&m), Some(2));

        let m = record(serde_json::json!({
            "id": "1", "created_at": 0,
            "sender": { "id": 3 },
        }));
        assert_eq!(resolved_sender_id(&m), Some(3));

        let m = record(serde_json::json!({
            "id": "1", "created_at": 0,
            "from": { "id": 4 },
        }));
        assert_eq!(resolved_sender_id(&m), Some(4));

        let m = record(serde_json::json!({ "id": "1", "created_at": 0 }));
        assert_eq!(resolved_sender_id(&m), None);
    }

    #[test]
    fn default_rule_is_id_equality() {
        let viewer = tenant(7);
        assert_eq!(
            attribution(&viewer, Some(7), None, None),
            MessageAttribution::Mine
        );
        assert_eq!(
            attribution(&viewer, Some(8), None, None),
            MessageAttribution::Theirs
        );
        // Unresolvable sender is never "mine".
        assert_eq!(
            attribution(&viewer, None, None, None),
            MessageAttribution::Theirs
        );
    }

    #[test]
    fn caretaker_claims_landlord_side_regardless_of_id() {
        let viewer = caretaker(55);
        // Proxied through the landlord identity (id 2), no id match.
        assert_eq!(
            attribution(&viewer, Some(2), None, Some("landlord")),
            MessageAttribution::Mine
        );
        assert_eq!(
            attribution(&viewer, Some(2), None, Some("caretaker")),
            MessageAttribution::Mine
        );
        assert_eq!(
            attribution(&viewer, Some(3), None, Some("tenant")),
            MessageAttribution::Theirs
        );
    }

    #[test]
    fn caretaker_own_proxied_send_is_proxy_self() {
        let viewer = caretaker(55);
        assert_eq!(
            attribution(&viewer, Some(2), Some(55), Some("landlord")),
            MessageAttribution::MineViaProxy
        );
        // Another caretaker's proxied send: landlord-side, but not this human.
        assert_eq!(
            attribution(&viewer, Some(2), Some(56), Some("landlord")),
            MessageAttribution::Mine
        );
    }

    #[test]
    fn caretaker_without_role_field_falls_back_to_id_equality() {
        let viewer = caretaker(55);
        assert_eq!(
            attribution(&viewer, Some(55), None, None),
            MessageAttribution::Mine
        );
        assert_eq!(
            attribution(&viewer, Some(2), None, None),
            MessageAttribution::Theirs
        );
    }

    #[test]
    fn normalize_uses_fallback_conversation_id() {
        let m = record(serde_json::json!({
            "id": "m-9", "created_at": 10, "text": "hey", "sender": { "id": 7 },
        }));
        let msg = normalize_message(&m, "42", Some(&tenant(7)));
        assert_eq!(msg.conversation_id, "42");
        assert_eq!(msg.sender_id, Some(7));
        assert_eq!(msg.attribution, MessageAttribution::Mine);
        assert_eq!(msg.delivery, MessageDeliveryState::Confirmed);
    }
}
