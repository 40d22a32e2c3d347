use async_trait::async_trait;
use pgwire::api::auth::{AuthSource, LoginInfo, Password};
use pgwire::error::PgWireResult;

use crate::api::ADMIN_ROLE;

/// Cleartext password per role: the `admin` user checks against the admin
/// password, every other user against the public one.
#[derive(Debug)]
pub struct EventdeskAuthSource {
    admin_password: String,
    public_password: String,
}

impl EventdeskAuthSource {
    pub fn new(admin_password: String, public_password: String) -> Self {
        Self {
            admin_password,
            public_password,
        }
    }

    fn password_for(&self, user: Option<&str>) -> &str {
        if user == Some(ADMIN_ROLE) {
            &self.admin_password
        } else {
            &self.public_password
        }
    }
}

#[async_trait]
impl AuthSource for EventdeskAuthSource {
    async fn get_password(&self, login: &LoginInfo) -> PgWireResult<Password> {
        let password = self.password_for(login.user());
        Ok(Password::new(None, password.as_bytes().to_vec()))
    }
}
