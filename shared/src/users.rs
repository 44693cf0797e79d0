use lambda_http::{Body, Response};

use crate::auth::Session;
use crate::config::normalize_email;
use crate::error::ApiError;
use crate::kv::KvStore;
use crate::records::{self, USER};
use crate::responses::{ok, parse_body};
use crate::types::{Role, UpdateUserRequest, User};

/// The caller's stored profile, or null when it was never created.
pub fn get_profile(session: &Session) -> Result<Response<Body>, ApiError> {
    ok(&serde_json::json!({ "user": session.profile }))
}

/// Public lookup; email comparison ignores case and surrounding spaces.
pub async fn get_user_by_email(store: &dyn KvStore, email: &str) -> Result<Response<Body>, ApiError> {
    let wanted = normalize_email(email);
    if wanted.is_empty() {
        return Err(ApiError::bad_request("Email is required"));
    }

    let users: Vec<User> = records::load_all(store, "user:").await?;
    match users.into_iter().find(|u| normalize_email(&u.email) == wanted) {
        Some(user) => ok(&serde_json::json!({ "user": user })),
        None => Err(ApiError::not_found("User not found")),
    }
}

/// Staff directory: every volunteer and admin profile.
pub async fn list_volunteers(store: &dyn KvStore, session: &Session) -> Result<Response<Body>, ApiError> {
    if !session.role().is_some_and(Role::is_staff) {
        tracing::warn!("User {} denied volunteer directory", session.user_id);
        return Err(ApiError::Forbidden("Forbidden - Staff only".to_string()));
    }

    let users: Vec<User> = records::load_all(store, "user:").await?;
    let mut volunteers: Vec<User> = users.into_iter().filter(|u| u.role.is_staff()).collect();
    volunteers.sort_by(|a, b| a.name.cmp(&b.name));

    ok(&serde_json::json!({ "volunteers": volunteers }))
}

/// Admin promotion and team assignment.
pub async fn update_user(
    store: &dyn KvStore,
    session: &Session,
    id: &str,
    body: &[u8],
) -> Result<Response<Body>, ApiError> {
    session.require_admin()?;

    let req: UpdateUserRequest = parse_body(body)?;
    let role = match req.role.as_deref() {
        Some(raw) => Some(Role::parse(raw).ok_or_else(|| ApiError::bad_request("Invalid role"))?),
        None => None,
    };

    let key = records::record_key(USER, id);
    let mut user: User = records::load(store, &key)
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;

    if let Some(role) = role {
        user.role = role;
    }
    if let Some(team) = req.team {
        let team = team.trim();
        user.team = (!team.is_empty()).then(|| team.to_string());
    }
    user.updated_at = Some(records::timestamp());

    records::save(store, &key, &user).await?;
    tracing::info!(
        "User {} updated by {}: role={:?} team={:?}",
        user.id,
        session.user_id,
        user.role,
        user.team
    );

    ok(&serde_json::json!({ "user": user }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use crate::testing::{admin, body_json, session, store_profile, user, volunteer};
    use lambda_http::http::StatusCode;

    #[test]
    fn profile_is_null_without_stored_record() {
        let stranger = Session::new("s1", "s1@example.com", None);
        let response = get_profile(&stranger).unwrap();
        assert!(body_json(&response)["user"].is_null());

        let response = get_profile(&volunteer("v1", "Branding team")).unwrap();
        assert_eq!(body_json(&response)["user"]["team"], "Branding team");
    }

    #[tokio::test]
    async fn lookup_by_email_ignores_case() {
        let store = MemoryStore::new();
        store_profile(&store, &user("v1", Role::Volunteer, None)).await;

        let response = get_user_by_email(&store, " V1@Example.COM ").await.unwrap();
        assert_eq!(body_json(&response)["user"]["id"], "v1");

        let err = get_user_by_email(&store, "nobody@example.com").await.unwrap_err();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn volunteer_directory_lists_staff_for_staff_only() {
        let store = MemoryStore::new();
        store_profile(&store, &user("v1", Role::Volunteer, Some("Branding team"))).await;
        store_profile(&store, &user("a1", Role::Admin, None)).await;
        store_profile(&store, &user("p1", Role::Public, None)).await;

        let response = list_volunteers(&store, &volunteer("v1", "Branding team")).await.unwrap();
        let ids: Vec<String> = body_json(&response)["volunteers"]
            .as_array()
            .unwrap()
            .iter()
            .map(|u| u["id"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(ids, vec!["a1", "v1"]);

        let err = list_volunteers(&store, &session("p1", Role::Public, None))
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn admin_promotes_and_assigns_team() {
        let store = MemoryStore::new();
        store_profile(&store, &user("p1", Role::Public, None)).await;

        let response = update_user(&store, &admin(), "p1", br#"{"role":"volunteer","team":"Treasurer team"}"#)
            .await
            .unwrap();
        let json = body_json(&response);
        assert_eq!(json["user"]["role"], "volunteer");
        assert_eq!(json["user"]["team"], "Treasurer team");

        let stored: User = records::load(&store, "user:p1").await.unwrap().unwrap();
        assert_eq!(stored.role, Role::Volunteer);
        assert!(stored.updated_at.is_some());
    }

    #[tokio::test]
    async fn update_user_guards() {
        let store = MemoryStore::new();
        store_profile(&store, &user("p1", Role::Public, None)).await;

        let err = update_user(&store, &volunteer("v1", "x"), "p1", br#"{"role":"admin"}"#)
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::FORBIDDEN);

        let err = update_user(&store, &admin(), "p1", br#"{"role":"owner"}"#)
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);

        let err = update_user(&store, &admin(), "ghost", br#"{"role":"volunteer"}"#)
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
    }
}
