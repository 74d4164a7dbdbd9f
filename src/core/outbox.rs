//! Outgoing message drafts, keyed by placeholder id.
//!
//! A draft is retained from optimistic insertion until the send confirms.
//! On failure it stays put: the composed text/image must remain restorable so
//! the user can retry without retyping, and `RetryMessage` resubmits straight
//! from the retained draft.

use std::collections::HashMap;

use crate::core::permissions::SendCapability;
use crate::error::SendError;
use crate::state::ImageAttachment;

#[derive(Debug, Clone)]
pub struct Draft {
    pub conversation_id: String,
    pub text: Option<String>,
    pub image: Option<ImageAttachment>,
    pub created_at: i64,
}

#[derive(Debug, Default)]
pub struct Outbox {
    drafts: HashMap<String, Draft>,
}

impl Outbox {
    pub fn insert(&mut self, placeholder_id: String, draft: Draft) {
        self.drafts.insert(placeholder_id, draft);
    }

    pub fn get(&self, placeholder_id: &str) -> Option<&Draft> {
        self.drafts.get(placeholder_id)
    }

    pub fn remove(&mut self, placeholder_id: &str) -> Option<Draft> {
        self.drafts.remove(placeholder_id)
    }

    pub fn clear(&mut self) {
        self.drafts.clear();
    }
}

/// Send preconditions, checked synchronously before any optimistic insert or
/// network call: permission gate first, then the non-empty payload rule.
pub fn validate(
    capability: &SendCapability,
    text: &str,
    image: &Option<ImageAttachment>,
) -> Result<(), SendError> {
    if !capability.can_send {
        return Err(SendError::PermissionDenied {
            reason: capability
                .read_only_reason
                .clone()
                .unwrap_or_else(|| "Sending is not allowed".to_string()),
        });
    }
    if text.trim().is_empty() && image.is_none() {
        return Err(SendError::EmptyMessage);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::permissions::send_capability;
    use crate::state::{UserRole, Viewer};

    fn cap(role: UserRole) -> SendCapability {
        send_capability(&Viewer {
            user_id: 1,
            role,
            caretaker_permissions: None,
        })
    }

    fn image() -> ImageAttachment {
        ImageAttachment {
            filename: "photo.jpg".to_string(),
            mime_type: "image/jpeg".to_string(),
            bytes: vec![0xff, 0xd8],
        }
    }

    #[test]
    fn permission_denied_wins_over_validation() {
        let err = validate(&cap(UserRole::Caretaker), "", &None).unwrap_err();
        assert!(matches!(err, SendError::PermissionDenied { .. }));
    }

    #[test]
    fn empty_payload_is_rejected() {
        assert_eq!(
            validate(&cap(UserRole::Tenant), "   ", &None),
            Err(SendError::EmptyMessage)
        );
    }

    #[test]
    fn text_or_image_alone_is_enough() {
        assert!(validate(&cap(UserRole::Tenant), "hello", &None).is_ok());
        assert!(validate(&cap(UserRole::Tenant), "", &Some(image())).is_ok());
    }

    #[test]
    fn drafts_survive_until_removed() {
        let mut outbox = Outbox::default();
        outbox.insert(
            "local-1".to_string(),
            Draft {
                conversation_id: "42".to_string(),
                text: Some("Hello".to_string()),
                image: None,
                created_at: 100,
            },
        );
        assert_eq!(outbox.get("local-1").unwrap().text.as_deref(), Some("Hello"));
        let restored = outbox.remove("local-1").unwrap();
        assert_eq!(restored.text.as_deref(), Some("Hello"));
        assert!(outbox.get("local-1").is_none());
    }
}
