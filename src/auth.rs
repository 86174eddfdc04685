use std::collections::HashMap;

use async_trait::async_trait;
use pgwire::api::auth::{AuthSource, LoginInfo, Password};
use pgwire::error::{ErrorInfo, PgWireError, PgWireResult};

/// Cleartext password check. Staff accounts may carry their own password;
/// everyone else uses the shared one.
#[derive(Debug)]
pub struct StaffAuthSource {
    shared_password: String,
    staff: HashMap<String, String>,
}

impl StaffAuthSource {
    pub fn new(shared_password: String) -> Self {
        Self {
            shared_password,
            staff: HashMap::new(),
        }
    }

    /// Parse `user:password` pairs separated by commas. Malformed entries are
    /// skipped with a warning.
    pub fn with_staff_list(mut self, list: &str) -> Self {
        for entry in list.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            match entry.split_once(':') {
                Some((user, password)) if !user.is_empty() && !password.is_empty() => {
                    self.staff.insert(user.to_string(), password.to_string());
                }
                _ => tracing::warn!("ignoring malformed staff entry {entry:?}"),
            }
        }
        self
    }

    fn password_for(&self, user: Option<&str>) -> &str {
        user.and_then(|u| self.staff.get(u))
            .map(String::as_str)
            .unwrap_or(&self.shared_password)
    }
}

#[async_trait]
impl AuthSource for StaffAuthSource {
    async fn get_password(&self, login: &LoginInfo) -> PgWireResult<Password> {
        let user = login.user().map(|u| u.to_string());
        if user.as_deref().is_none_or(str::is_empty) {
            metrics::counter!(crate::observability::AUTH_FAILURES_TOTAL).increment(1);
            return Err(PgWireError::UserError(Box::new(ErrorInfo::new(
                "FATAL".to_owned(),
                "28000".to_owned(),
                "a user name is required".to_owned(),
            ))));
        }
        let password = self.password_for(user.as_deref());
        Ok(Password::new(None, password.as_bytes().to_vec()))
    }
}
