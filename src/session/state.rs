//! Observable session state.

use crate::models::User;

/// Snapshot of the session as seen by the presentation layer.
///
/// Authentication is derived from the presence of a user, so a state that is
/// authenticated without a user cannot be constructed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionState {
    pub(crate) user: Option<User>,
    pub(crate) error_message: Option<String>,
    pub(crate) is_loading: bool,
}

impl SessionState {
    pub(crate) fn restored(user: Option<User>) -> Self {
        Self {
            user,
            ..Self::default()
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.user.is_some()
    }

    pub fn current_user(&self) -> Option<&User> {
        self.user.as_ref()
    }

    /// Latest human-readable error, if the last attempt failed.
    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    /// True only while an external call is outstanding.
    pub fn is_loading(&self) -> bool {
        self.is_loading
    }
}
