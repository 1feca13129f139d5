use crate::api::models::UserRef;
use crate::app::AppState;

/// Identity and credentials of the logged-in user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub user: UserRef,
    pub token: String,
}

impl Session {
    pub fn new(user: UserRef, token: impl Into<String>) -> Self {
        Self { user, token: token.into() }
    }

    pub fn user_id(&self) -> &str {
        &self.user.id
    }

    pub fn from_state(state: &AppState) -> Option<Self> {
        if !state.is_configured() {
            return None;
        }
        let token = state.token.clone()?;
        let user = UserRef {
            id: state.user_id.clone(),
            first_name: state.first_name.clone(),
            last_name: state.last_name.clone(),
        };
        Some(Self::new(user, token))
    }
}
