use crate::state::{UserRole, Viewer};

pub(crate) const CARETAKER_READ_ONLY_REASON: &str =
    "Messaging is not enabled for your caretaker account";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendCapability {
    pub can_send: bool,
    pub read_only_reason: Option<String>,
}

impl SendCapability {
    fn allowed() -> Self {
        Self {
            can_send: true,
            read_only_reason: None,
        }
    }

    fn denied(reason: &str) -> Self {
        Self {
            can_send: false,
            read_only_reason: Some(reason.to_string()),
        }
    }
}

/// Single source of truth for "can this viewer send". Consulted by the send
/// pipeline before any network call and baked into `ConversationViewState`
/// for the input affordance, so the two can never diverge.
///
/// Caretakers send through the landlord identity; whether they may do so at
/// all is exactly the externally supplied `messages` capability flag.
pub fn send_capability(viewer: &Viewer) -> SendCapability {
    match viewer.role {
        UserRole::Caretaker => {
            let granted = viewer
                .caretaker_permissions
                .as_ref()
                .map(|p| p.messages)
                .unwrap_or(false);
            if granted {
                SendCapability::allowed()
            } else {
                SendCapability::denied(CARETAKER_READ_ONLY_REASON)
            }
        }
        UserRole::Tenant | UserRole::Landlord | UserRole::Admin => SendCapability::allowed(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::CaretakerPermissions;

    fn viewer(role: UserRole, permissions: Option<CaretakerPermissions>) -> Viewer {
        Viewer {
            user_id: 9,
            role,
            caretaker_permissions: permissions,
        }
    }

    #[test]
    fn non_caretaker_roles_always_send() {
        for role in [UserRole::Tenant, UserRole::Landlord, UserRole::Admin] {
            let cap = send_capability(&viewer(role, None));
            assert!(cap.can_send);
            assert_eq!(cap.read_only_reason, None);
        }
    }

    #[test]
    fn caretaker_follows_messages_flag_exactly() {
        let granted = CaretakerPermissions {
            messages: true,
            maintenance: false,
            listings: false,
        };
        assert!(send_capability(&viewer(UserRole::Caretaker, Some(granted))).can_send);

        let revoked = CaretakerPermissions {
            messages: false,
            maintenance: true,
            listings: true,
        };
        let cap = send_capability(&viewer(UserRole::Caretaker, Some(revoked)));
        assert!(!cap.can_send);
        assert_eq!(
            cap.read_only_reason.as_deref(),
            Some(CARETAKER_READ_ONLY_REASON)
        );
    }

    #[test]
    fn caretaker_without_flags_is_read_only() {
        assert!(!send_capability(&viewer(UserRole::Caretaker, None)).can_send);
    }
}
