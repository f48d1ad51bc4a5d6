/// `userID`, `clientID`, `password` triple. Any field may be empty.
/// Immutable once constructed.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Identity {
    user_id: String,
    client_id: String,
    password: String,
}

impl Identity {
    pub fn new(
        user_id: impl Into<String>,
        client_id: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            client_id: client_id.into(),
            password: password.into(),
        }
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn password(&self) -> &str {
        &self.password
    }
}
