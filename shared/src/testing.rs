//! Fixtures shared by the handler tests.

use lambda_http::{Body, Response};

use crate::auth::Session;
use crate::kv::KvStore;
use crate::records::{self, USER};
use crate::types::{Role, User};

pub fn user(id: &str, role: Role, team: Option<&str>) -> User {
    User {
        id: id.to_string(),
        email: format!("{}@example.com", id),
        name: format!("Name of {}", id),
        role,
        team: team.map(str::to_string),
        created_at: "2025-11-01T00:00:00.000Z".to_string(),
        updated_at: None,
    }
}

pub fn session(id: &str, role: Role, team: Option<&str>) -> Session {
    let profile = user(id, role, team);
    Session::new(id, profile.email.clone(), Some(profile))
}

pub fn admin() -> Session {
    session("admin-1", Role::Admin, None)
}

pub fn volunteer(id: &str, team: &str) -> Session {
    session(id, Role::Volunteer, Some(team))
}

pub async fn store_profile(store: &dyn KvStore, user: &User) {
    records::save(store, &records::record_key(USER, &user.id), user)
        .await
        .unwrap();
}

pub fn body_json(response: &Response<Body>) -> serde_json::Value {
    serde_json::from_slice(response.body()).unwrap()
}
