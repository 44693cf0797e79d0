use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("unknown KV_BACKEND '{0}' (expected 'dynamodb' or 'memory')")]
    UnknownBackend(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KvBackend {
    DynamoDb,
    Memory,
}

/// Runtime settings, read once at cold start.
#[derive(Debug, Clone)]
pub struct Config {
    pub table_name: String,
    pub cognito_client_id: String,
    pub cognito_client_secret: String,
    pub cognito_user_pool_id: Option<String>,
    /// Emails allowed to claim the admin role at signup.
    pub bootstrap_admin_emails: Vec<String>,
    pub kv_backend: KvBackend,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let kv_backend = match non_empty("KV_BACKEND").as_deref().map(str::to_ascii_lowercase) {
            None => KvBackend::DynamoDb,
            Some(v) if v == "dynamodb" => KvBackend::DynamoDb,
            Some(v) if v == "memory" => KvBackend::Memory,
            Some(other) => return Err(ConfigError::UnknownBackend(other)),
        };

        let bootstrap_admin_emails = non_empty("BOOTSTRAP_ADMIN_EMAILS")
            .map(|raw| {
                raw.split(',')
                    .map(normalize_email)
                    .filter(|email| !email.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            table_name: non_empty("TABLE_NAME").unwrap_or_else(|| "rupantor".to_string()),
            cognito_client_id: non_empty("COGNITO_CLIENT_ID")
                .ok_or(ConfigError::Missing("COGNITO_CLIENT_ID"))?,
            cognito_client_secret: non_empty("COGNITO_CLIENT_SECRET")
                .ok_or(ConfigError::Missing("COGNITO_CLIENT_SECRET"))?,
            cognito_user_pool_id: non_empty("COGNITO_USER_POOL_ID"),
            bootstrap_admin_emails,
            kv_backend,
        })
    }

    pub fn is_bootstrap_admin(&self, email: &str) -> bool {
        let email = normalize_email(email);
        self.bootstrap_admin_emails.iter().any(|e| *e == email)
    }
}

/// Trim + lowercase; the comparison form for every email match.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}
