use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a user record owned by the host application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(Uuid);

impl UserId {
    /// Creates a new random user identifier.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a user identifier from an existing UUID value.
    #[must_use]
    pub fn from_uuid(value: Uuid) -> Self {
        Self(value)
    }

    /// Returns the underlying UUID value.
    #[must_use]
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for UserId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "{}", self.0)
    }
}

/// Capability interface for host user types that participate in access
/// control.
///
/// The access controller operates purely on the resolved identifier, so any
/// user model can opt in by returning its stable id.
pub trait AuthorizableUser {
    /// Returns the stable user identifier.
    fn user_id(&self) -> UserId;
}

impl AuthorizableUser for UserId {
    fn user_id(&self) -> UserId {
        *self
    }
}

#[cfg(test)]
mod tests {
    use super::{AuthorizableUser, UserId};

    #[test]
    fn user_id_is_its_own_capability_handle() {
        let user_id = UserId::new();
        assert_eq!(user_id.user_id(), user_id);
    }

    #[test]
    fn user_id_formats_as_uuid() {
        let user_id = UserId::new();
        assert_eq!(user_id.to_string().len(), 36);
    }
}
