//! Device login credentials.

use std::fmt;

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::Result;

/// API username and password for the routers being scanned.
#[derive(Clone, Deserialize, PartialEq, Eq)]
pub struct Credentials {
    #[serde(default = "default_username")]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

impl Credentials {
    pub fn new(username: &str, password: &str) -> Self {
        Self {
            username: username.to_string(),
            password: password.to_string(),
        }
    }
}

impl Default for Credentials {
    fn default() -> Self {
        Self {
            username: default_username(),
            password: String::new(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

fn default_username() -> String {
    "admin".to_string()
}

/// Source of credentials, read once at the start of each scan job.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    async fn credentials(&self) -> Result<Credentials>;
}

/// Fixed credentials, typically from configuration.
#[derive(Debug, Clone)]
pub struct StaticCredentials(Credentials);

impl StaticCredentials {
    pub fn new(credentials: Credentials) -> Self {
        Self(credentials)
    }
}

#[async_trait]
impl CredentialProvider for StaticCredentials {
    async fn credentials(&self) -> Result<Credentials> {
        Ok(self.0.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_redacts_password() {
        let creds = Credentials::new("netops", "hunter2");
        let shown = format!("{creds:?}");
        assert!(shown.contains("netops"));
        assert!(!shown.contains("hunter2"));
    }

    #[tokio::test]
    async fn test_static_provider() {
        let provider = StaticCredentials::new(Credentials::default());
        let creds = provider.credentials().await.unwrap();
        assert_eq!(creds.username, "admin");
        assert_eq!(creds.password, "");
    }
}
