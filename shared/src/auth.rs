use lambda_http::http::{header, HeaderMap};
use lambda_http::{Body, Response};

use crate::config::{normalize_email, Config};
use crate::error::ApiError;
use crate::identity::{IdentityError, IdentityProvider, IdentityUser};
use crate::kv::KvStore;
use crate::records::{self, USER};
use crate::responses::{ok, parse_body, required};
use crate::types::{LoginRequest, RefreshRequest, Role, SignupRequest, User};

/// The authenticated caller, handed to every protected handler.
#[derive(Debug, Clone)]
pub struct Session {
    pub user_id: String,
    pub email: String,
    /// Stored profile; `None` when the account never completed signup here.
    pub profile: Option<User>,
}

impl Session {
    pub fn new(user_id: impl Into<String>, email: impl Into<String>, profile: Option<User>) -> Self {
        Self {
            user_id: user_id.into(),
            email: email.into(),
            profile,
        }
    }

    pub fn role(&self) -> Option<Role> {
        self.profile.as_ref().map(|p| p.role)
    }

    pub fn is_admin(&self) -> bool {
        self.role() == Some(Role::Admin)
    }

    pub fn name(&self) -> Option<&str> {
        self.profile.as_ref().map(|p| p.name.as_str())
    }

    pub fn team(&self) -> Option<&str> {
        self.profile.as_ref().and_then(|p| p.team.as_deref())
    }

    pub fn require_admin(&self) -> Result<(), ApiError> {
        if self.is_admin() {
            Ok(())
        } else {
            tracing::warn!("Admin-only action denied for user {}", self.user_id);
            Err(ApiError::admin_only())
        }
    }
}

/// Token from an `Authorization: Bearer <token>` header.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.trim().split_once(' ')?;
    let token = token.trim();
    if scheme.eq_ignore_ascii_case("bearer") && !token.is_empty() {
        Some(token)
    } else {
        None
    }
}

/// Resolve the caller and load their profile for role/team.
pub async fn authenticate(
    identity: &dyn IdentityProvider,
    store: &dyn KvStore,
    config: &Config,
    headers: &HeaderMap,
) -> Result<Session, ApiError> {
    let token = bearer_token(headers).ok_or_else(ApiError::unauthorized)?;

    let user = identity
        .resolve_token(token)
        .await?
        .ok_or_else(ApiError::unauthorized)?;

    let key = records::record_key(USER, &user.id);
    let mut profile: Option<User> = records::load(store, &key).await?;
    match profile.as_mut() {
        None => tracing::warn!("No stored profile for user {}", user.id),
        Some(existing) => {
            if promote_bootstrap_admin(config, &user, existing) {
                records::save(store, &key, &*existing).await?;
            }
        }
    }

    Ok(Session::new(user.id, user.email, profile))
}

/// Bootstrap admins are promoted only once the identity provider vouches for
/// the address; claiming it at signup is not enough.
fn promote_bootstrap_admin(config: &Config, user: &IdentityUser, profile: &mut User) -> bool {
    if profile.role == Role::Admin
        || !user.email_verified
        || !config.is_bootstrap_admin(&user.email)
    {
        return false;
    }
    profile.role = Role::Admin;
    profile.updated_at = Some(records::timestamp());
    tracing::info!("Promoted bootstrap admin {}", user.id);
    true
}

/// Role stored at signup. Admin is never granted here: a bootstrap email
/// starts as public and is promoted on its first authenticated request once
/// the address is verified; everyone else goes through `PATCH /users/:id`.
fn signup_role(config: &Config, email: &str, requested: Option<&str>) -> Result<Role, ApiError> {
    let role = match requested.map(str::trim).filter(|r| !r.is_empty()) {
        None => Role::Public,
        Some(raw) => Role::parse(raw).ok_or_else(|| ApiError::bad_request("Invalid role"))?,
    };

    if role != Role::Admin {
        return Ok(role);
    }
    if !config.is_bootstrap_admin(email) {
        tracing::warn!("Rejected admin self-assignment at signup for {}", email);
        return Err(ApiError::Forbidden(
            "Admin role must be granted by an existing admin".to_string(),
        ));
    }
    tracing::info!("Bootstrap admin signup for {}; pending email verification", email);
    Ok(Role::Public)
}

/// Create the identity-provider account, then the local profile record.
pub async fn signup(
    identity: &dyn IdentityProvider,
    store: &dyn KvStore,
    config: &Config,
    body: &[u8],
) -> Result<Response<Body>, ApiError> {
    tracing::info!("Signup request received");

    let req: SignupRequest = parse_body(body)?;
    let missing = "Missing required fields";
    let email = required(req.email.as_deref(), missing)?;
    let password = req
        .password
        .as_deref()
        .filter(|p| !p.is_empty())
        .ok_or_else(|| ApiError::bad_request(missing))?;
    let name = required(req.name.as_deref(), missing)?;

    let role = signup_role(config, email, req.role.as_deref())?;

    let account = identity.create_account(email, password, name).await?;

    let user = User {
        id: account.id,
        email: email.to_string(),
        name: name.to_string(),
        role,
        team: req.team.map(|t| t.trim().to_string()).filter(|t| !t.is_empty()),
        created_at: records::timestamp(),
        updated_at: None,
    };

    records::save(store, &records::record_key(USER, &user.id), &user).await?;
    tracing::info!("Stored profile for {} with role {:?}", normalize_email(email), role);

    ok(&serde_json::json!({ "user": user }))
}

pub async fn login(identity: &dyn IdentityProvider, body: &[u8]) -> Result<Response<Body>, ApiError> {
    tracing::info!("Login request received");

    let req: LoginRequest = parse_body(body)?;
    let email = required(req.email.as_deref(), "Email and password are required")?;
    let password = req
        .password
        .as_deref()
        .filter(|p| !p.is_empty())
        .ok_or_else(|| ApiError::bad_request("Email and password are required"))?;

    let tokens = identity
        .login(email, password)
        .await
        .map_err(unauthorized_on_rejection)?;

    ok(&tokens)
}

pub async fn refresh(identity: &dyn IdentityProvider, body: &[u8]) -> Result<Response<Body>, ApiError> {
    let req: RefreshRequest = parse_body(body)?;
    let email = required(req.email.as_deref(), "Email and refresh token are required")?;
    let refresh_token = required(
        req.refresh_token.as_deref(),
        "Email and refresh token are required",
    )?;

    let tokens = identity
        .refresh(email, refresh_token)
        .await
        .map_err(unauthorized_on_rejection)?;

    ok(&tokens)
}

fn unauthorized_on_rejection(err: IdentityError) -> ApiError {
    match err {
        IdentityError::Rejected(message) => ApiError::Unauthorized(message),
        other => other.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::TokenSet;
    use crate::memory::MemoryStore;
    use async_trait::async_trait;
    use lambda_http::http::{HeaderValue, StatusCode};

    struct OneUser;

    #[async_trait]
    impl IdentityProvider for OneUser {
        async fn resolve_token(&self, token: &str) -> Result<Option<IdentityUser>, IdentityError> {
            let user = |id: &str, email: &str, email_verified: bool| IdentityUser {
                id: id.into(),
                email: email.into(),
                email_verified,
            };
            Ok(match token {
                "good" => Some(user("u1", "u1@example.com", false)),
                "boss-unverified" => Some(user("new-user", "boss@example.com", false)),
                "boss-verified" => Some(user("new-user", "Boss@Example.com", true)),
                _ => None,
            })
        }

        async fn create_account(&self, email: &str, _: &str, _: &str) -> Result<IdentityUser, IdentityError> {
            if email == "taken@example.com" {
                return Err(IdentityError::Rejected("An account with this email already exists".into()));
            }
            Ok(IdentityUser {
                id: "new-user".into(),
                email: email.into(),
                email_verified: false,
            })
        }

        async fn login(&self, _: &str, password: &str) -> Result<TokenSet, IdentityError> {
            if password != "pw" {
                return Err(IdentityError::Rejected("Incorrect email or password".into()));
            }
            Ok(TokenSet {
                id_token: "id".into(),
                access_token: "access".into(),
                refresh_token: "refresh".into(),
                expires_in: 3600,
            })
        }

        async fn refresh(&self, _: &str, _: &str) -> Result<TokenSet, IdentityError> {
            Err(IdentityError::Rejected("Session expired. Please log in again".into()))
        }
    }

    fn config() -> Config {
        Config {
            table_name: "test".into(),
            cognito_client_id: "client".into(),
            cognito_client_secret: "secret".into(),
            cognito_user_pool_id: None,
            bootstrap_admin_emails: vec!["boss@example.com".into()],
            kv_backend: crate::config::KvBackend::Memory,
        }
    }

    fn headers(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        headers
    }

    fn body_json(response: &Response<Body>) -> serde_json::Value {
        serde_json::from_slice(response.body()).unwrap()
    }

    #[test]
    fn bearer_token_requires_scheme_and_value() {
        assert_eq!(bearer_token(&headers("Bearer abc")), Some("abc"));
        assert_eq!(bearer_token(&headers("bearer abc")), Some("abc"));
        assert_eq!(bearer_token(&headers("Basic abc")), None);
        assert_eq!(bearer_token(&headers("Bearer ")), None);
        assert_eq!(bearer_token(&HeaderMap::new()), None);
    }

    #[tokio::test]
    async fn unknown_token_is_unauthorized() {
        let store = MemoryStore::new();
        let err = authenticate(&OneUser, &store, &config(), &headers("Bearer bad"))
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::UNAUTHORIZED);

        let err = authenticate(&OneUser, &store, &config(), &HeaderMap::new())
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn missing_profile_yields_session_without_role() {
        let store = MemoryStore::new();
        let session = authenticate(&OneUser, &store, &config(), &headers("Bearer good"))
            .await
            .unwrap();

        assert_eq!(session.user_id, "u1");
        assert_eq!(session.role(), None);
        assert!(!session.is_admin());
        assert_eq!(session.require_admin().unwrap_err().status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn signup_defaults_to_public_role() {
        let store = MemoryStore::new();
        let body = br#"{"email":"a@example.com","password":"pw","name":"Ayesha"}"#;
        let response = signup(&OneUser, &store, &config(), body).await.unwrap();

        assert_eq!(body_json(&response)["user"]["role"], "public");
        let stored: User = records::load(&store, "user:new-user").await.unwrap().unwrap();
        assert_eq!(stored.name, "Ayesha");
    }

    #[tokio::test]
    async fn signup_keeps_volunteer_role_and_team() {
        let store = MemoryStore::new();
        let body = br#"{"email":"f@example.com","password":"pw","name":"Farhan","role":"volunteer","team":"Branding team"}"#;
        signup(&OneUser, &store, &config(), body).await.unwrap();

        let stored: User = records::load(&store, "user:new-user").await.unwrap().unwrap();
        assert_eq!(stored.role, Role::Volunteer);
        assert_eq!(stored.team.as_deref(), Some("Branding team"));
    }

    #[tokio::test]
    async fn signup_cannot_self_assign_admin() {
        let store = MemoryStore::new();
        let body = br#"{"email":"x@example.com","password":"pw","name":"X","role":"admin"}"#;
        let err = signup(&OneUser, &store, &config(), body).await.unwrap_err();

        assert_eq!(err.status(), StatusCode::FORBIDDEN);
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn unverified_bootstrap_signup_is_not_admin() {
        let store = MemoryStore::new();
        let body = br#"{"email":"Boss@Example.com","password":"pw","name":"Boss","role":"admin"}"#;
        let response = signup(&OneUser, &store, &config(), body).await.unwrap();
        assert_eq!(body_json(&response)["user"]["role"], "public");

        let session = authenticate(&OneUser, &store, &config(), &headers("Bearer boss-unverified"))
            .await
            .unwrap();
        assert!(!session.is_admin());

        let stored: User = records::load(&store, "user:new-user").await.unwrap().unwrap();
        assert_eq!(stored.role, Role::Public);
    }

    #[tokio::test]
    async fn verified_bootstrap_email_is_promoted_on_first_request() {
        let store = MemoryStore::new();
        let body = br#"{"email":"boss@example.com","password":"pw","name":"Boss"}"#;
        signup(&OneUser, &store, &config(), body).await.unwrap();

        let session = authenticate(&OneUser, &store, &config(), &headers("Bearer boss-verified"))
            .await
            .unwrap();
        assert!(session.is_admin());

        let stored: User = records::load(&store, "user:new-user").await.unwrap().unwrap();
        assert_eq!(stored.role, Role::Admin);
        assert!(stored.updated_at.is_some());
    }

    #[tokio::test]
    async fn verified_email_off_the_bootstrap_list_stays_put() {
        let store = MemoryStore::new();
        let mut profile = crate::testing::user("new-user", Role::Volunteer, None);
        profile.email = "boss@example.com".into();
        crate::records::save(&store, "user:new-user", &profile).await.unwrap();

        let mut config = config();
        config.bootstrap_admin_emails.clear();
        let session = authenticate(&OneUser, &store, &config, &headers("Bearer boss-verified"))
            .await
            .unwrap();
        assert_eq!(session.role(), Some(Role::Volunteer));
    }

    #[tokio::test]
    async fn signup_validates_fields_and_role() {
        let store = MemoryStore::new();
        let err = signup(&OneUser, &store, &config(), br#"{"email":"a@example.com"}"#)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Missing required fields");

        let body = br#"{"email":"a@example.com","password":"pw","name":"A","role":"captain"}"#;
        let err = signup(&OneUser, &store, &config(), body).await.unwrap_err();
        assert_eq!(err.to_string(), "Invalid role");
    }

    #[tokio::test]
    async fn provider_rejection_surfaces_as_bad_request() {
        let store = MemoryStore::new();
        let body = br#"{"email":"taken@example.com","password":"pw","name":"T"}"#;
        let err = signup(&OneUser, &store, &config(), body).await.unwrap_err();

        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(err.to_string(), "An account with this email already exists");
    }

    #[tokio::test]
    async fn login_rejection_is_unauthorized() {
        let err = login(&OneUser, br#"{"email":"a@example.com","password":"nope"}"#)
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::UNAUTHORIZED);

        let response = login(&OneUser, br#"{"email":"a@example.com","password":"pw"}"#)
            .await
            .unwrap();
        assert_eq!(body_json(&response)["access_token"], "access");
    }

    #[tokio::test]
    async fn refresh_rejection_is_unauthorized() {
        let err = refresh(&OneUser, br#"{"email":"a@example.com","refresh_token":"r"}"#)
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
    }
}
