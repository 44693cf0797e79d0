use async_trait::async_trait;
use aws_sdk_cognitoidentityprovider::types::{AttributeType, AuthFlowType, AuthenticationResultType};
use aws_sdk_cognitoidentityprovider::Client as CognitoClient;
use base64::{engine::general_purpose, Engine as _};
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::identity::{IdentityError, IdentityProvider, IdentityUser, TokenSet};

type HmacSha256 = Hmac<Sha256>;

/// Cognito user pool behind a confidential app client.
pub struct CognitoIdentity {
    client: CognitoClient,
    client_id: String,
    client_secret: String,
    user_pool_id: Option<String>,
}

impl CognitoIdentity {
    pub fn new(
        client: CognitoClient,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        user_pool_id: Option<String>,
    ) -> Self {
        Self {
            client,
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            user_pool_id,
        }
    }

    fn secret_hash(&self, username: &str) -> Result<String, IdentityError> {
        compute_secret_hash(username, &self.client_id, &self.client_secret)
    }
}

/// SECRET_HASH for a confidential client: base64(HMAC-SHA256(secret, username + client_id)).
pub fn compute_secret_hash(
    username: &str,
    client_id: &str,
    client_secret: &str,
) -> Result<String, IdentityError> {
    let message = format!("{}{}", username, client_id);
    let mut mac = HmacSha256::new_from_slice(client_secret.as_bytes())
        .map_err(|e| IdentityError::Service(format!("Invalid client secret: {}", e)))?;
    mac.update(message.as_bytes());
    let result = mac.finalize();
    Ok(general_purpose::STANDARD.encode(result.into_bytes()))
}

fn login_message(error_message: &str) -> &'static str {
    if error_message.contains("NotAuthorizedException") {
        "Incorrect email or password"
    } else if error_message.contains("UserNotConfirmedException") {
        "Please verify your email before logging in"
    } else if error_message.contains("UserNotFoundException") {
        "No account found with this email"
    } else if error_message.contains("PasswordResetRequiredException") {
        "Password reset required"
    } else if error_message.contains("TooManyRequestsException") {
        "Too many login attempts. Please try again later"
    } else {
        "Login failed. Please check your credentials"
    }
}

fn signup_message(error_message: &str) -> Option<&'static str> {
    if error_message.contains("InvalidPasswordException") {
        Some("Password must contain at least 8 characters with uppercase, lowercase, number, and special character")
    } else if error_message.contains("UsernameExistsException") {
        Some("An account with this email already exists")
    } else if error_message.contains("InvalidParameterException") {
        Some("Invalid email or password format")
    } else {
        None
    }
}

fn token_set(result: &AuthenticationResultType, fallback_refresh: Option<&str>) -> TokenSet {
    TokenSet {
        id_token: result.id_token().unwrap_or_default().to_string(),
        access_token: result.access_token().unwrap_or_default().to_string(),
        refresh_token: result
            .refresh_token()
            .or(fallback_refresh)
            .unwrap_or_default()
            .to_string(),
        expires_in: result.expires_in(),
    }
}

#[async_trait]
impl IdentityProvider for CognitoIdentity {
    async fn resolve_token(&self, token: &str) -> Result<Option<IdentityUser>, IdentityError> {
        let response = match self.client.get_user().access_token(token).send().await {
            Ok(response) => response,
            Err(e) => {
                let error_message = format!("{:?}", e);
                if error_message.contains("NotAuthorizedException")
                    || error_message.contains("UserNotFoundException")
                {
                    tracing::info!("Access token rejected by Cognito");
                    return Ok(None);
                }
                tracing::error!("Cognito get_user error: {}", error_message);
                return Err(IdentityError::Service(error_message));
            }
        };

        let attribute = |name: &str| {
            response
                .user_attributes()
                .iter()
                .find(|attr| attr.name() == name)
                .and_then(|attr| attr.value())
                .map(|v| v.to_string())
        };

        let id = attribute("sub").unwrap_or_else(|| response.username().to_string());
        let email = attribute("email").unwrap_or_default();
        let email_verified = attribute("email_verified").is_some_and(|v| v == "true");

        Ok(Some(IdentityUser {
            id,
            email,
            email_verified,
        }))
    }

    async fn create_account(
        &self,
        email: &str,
        password: &str,
        name: &str,
    ) -> Result<IdentityUser, IdentityError> {
        let secret_hash = self.secret_hash(email)?;

        let build_attr = |attr_name: &str, value: &str| {
            AttributeType::builder()
                .name(attr_name)
                .value(value)
                .build()
                .map_err(|e| IdentityError::Service(format!("Invalid attribute: {:?}", e)))
        };

        let signup_result = self
            .client
            .sign_up()
            .client_id(&self.client_id)
            .username(email)
            .password(password)
            .secret_hash(&secret_hash)
            .user_attributes(build_attr("email", email)?)
            .user_attributes(build_attr("name", name)?)
            .send()
            .await;

        let response = match signup_result {
            Ok(response) => response,
            Err(e) => {
                let error_message = format!("{:?}", e);
                tracing::error!("Cognito signup error: {}", error_message);
                return Err(match signup_message(&error_message) {
                    Some(message) => IdentityError::Rejected(message.to_string()),
                    None => IdentityError::Service(error_message),
                });
            }
        };

        tracing::info!("Signup successful for user: {}", email);

        // No email server is configured, so accounts are confirmed right away.
        if let Some(user_pool_id) = &self.user_pool_id {
            if let Err(e) = self
                .client
                .admin_confirm_sign_up()
                .user_pool_id(user_pool_id)
                .username(email)
                .send()
                .await
            {
                tracing::error!("Failed to auto-confirm user: {:?}", e);
            } else {
                tracing::info!("User auto-confirmed: {}", email);
            }
        } else {
            tracing::warn!("COGNITO_USER_POOL_ID not set; skipping auto-confirm");
        }

        Ok(IdentityUser {
            id: response.user_sub().to_string(),
            email: email.to_string(),
            // Auto-confirming the account does not verify the address.
            email_verified: false,
        })
    }

    async fn login(&self, email: &str, password: &str) -> Result<TokenSet, IdentityError> {
        let secret_hash = self.secret_hash(email)?;

        let auth_result = self
            .client
            .initiate_auth()
            .auth_flow(AuthFlowType::UserPasswordAuth)
            .client_id(&self.client_id)
            .auth_parameters("USERNAME", email)
            .auth_parameters("PASSWORD", password)
            .auth_parameters("SECRET_HASH", &secret_hash)
            .send()
            .await;

        match auth_result {
            Ok(response) => match response.authentication_result() {
                Some(result) => {
                    tracing::info!("Authentication successful for user: {}", email);
                    Ok(token_set(result, None))
                }
                None => {
                    tracing::error!("No authentication result returned");
                    Err(IdentityError::Rejected(
                        "No authentication result returned".to_string(),
                    ))
                }
            },
            Err(e) => {
                let error_message = format!("{:?}", e);
                tracing::error!("Cognito authentication error: {}", error_message);
                Err(IdentityError::Rejected(login_message(&error_message).to_string()))
            }
        }
    }

    async fn refresh(&self, email: &str, refresh_token: &str) -> Result<TokenSet, IdentityError> {
        let secret_hash = self.secret_hash(email)?;

        let auth_result = self
            .client
            .initiate_auth()
            .auth_flow(AuthFlowType::RefreshTokenAuth)
            .client_id(&self.client_id)
            .auth_parameters("REFRESH_TOKEN", refresh_token)
            .auth_parameters("SECRET_HASH", &secret_hash)
            .send()
            .await;

        match auth_result {
            Ok(response) => response
                .authentication_result()
                .map(|result| token_set(result, Some(refresh_token)))
                .ok_or_else(|| {
                    IdentityError::Rejected("No authentication result returned".to_string())
                }),
            Err(e) => {
                tracing::error!("Cognito refresh error: {:?}", e);
                Err(IdentityError::Rejected(
                    "Session expired. Please log in again".to_string(),
                ))
            }
        }
    }
}
