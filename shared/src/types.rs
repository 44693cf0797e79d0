use serde::{Deserialize, Deserializer, Serialize};

/// For patch bodies: an absent field stays `None`, an explicit `null`
/// becomes `Some(None)` and clears the stored value.
fn nullable<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

// ========== USER ==========
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Volunteer,
    Public,
}

impl Role {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "admin" => Some(Role::Admin),
            "volunteer" => Some(Role::Volunteer),
            "public" => Some(Role::Public),
            _ => None,
        }
    }

    /// Staff roles appear in the volunteer directory.
    pub fn is_staff(self) -> bool {
        matches!(self, Role::Admin | Role::Volunteer)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct User {
    pub id: String,
    pub email: String,
    pub name: String,
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub team: Option<String>,
    pub created_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SignupRequest {
    pub email: Option<String>,
    pub password: Option<String>,
    pub name: Option<String>,
    pub role: Option<String>,
    pub team: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub email: Option<String>,
    pub refresh_token: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateUserRequest {
    pub role: Option<String>,
    pub team: Option<String>,
}

// ========== EVENT ==========
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Comment {
    pub id: String,
    pub user_id: String,
    pub user_name: String,
    pub comment: String,
    pub created_at: String,
}

/// Member registrations carry `user_id`; guest registrations carry contact
/// details and `is_guest: true`.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Registration {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default)]
    pub user_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub whatsapp: Option<String>,
    #[serde(rename = "class", default, skip_serializing_if = "Option::is_none")]
    pub class_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub school: Option<String>,
    #[serde(default)]
    pub registered_at: String,
    #[serde(default)]
    pub is_guest: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Event {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub date: String,
    #[serde(default)]
    pub time: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub speakers: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agenda: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default)]
    pub likes: Vec<String>,
    #[serde(default)]
    pub comments: Vec<Comment>,
    #[serde(default)]
    pub registrations: Vec<Registration>,
    pub created_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
pub struct EventFields {
    pub title: Option<String>,
    pub description: Option<String>,
    pub date: Option<String>,
    pub time: Option<String>,
    pub location: Option<String>,
    pub category: Option<String>,
    pub speakers: Option<Vec<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub agenda: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub image: Option<Option<String>>,
}

#[derive(Debug, Deserialize)]
pub struct CommentRequest {
    #[serde(alias = "text")]
    pub comment: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct GuestRegistrationRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub whatsapp: Option<String>,
    #[serde(rename = "class")]
    pub class_name: Option<String>,
    pub school: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct GuestUnregisterRequest {
    pub email: Option<String>,
}

// ========== INSTRUCTION ==========
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    #[default]
    Medium,
    Low,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Todo,
    InProgress,
    Completed,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct IndividualStatus {
    pub user_id: String,
    pub user_name: String,
    #[serde(default)]
    pub user_team: Option<String>,
    pub status: TaskStatus,
    pub updated_at: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct InstructionUpdate {
    pub id: String,
    pub user_id: String,
    pub user_name: String,
    #[serde(default)]
    pub user_team: Option<String>,
    pub update: String,
    pub created_at: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Instruction {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub assigned_teams: Vec<String>,
    #[serde(default)]
    pub assigned_volunteers: Vec<String>,
    /// Legacy single assignee: a user id or "all".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_to: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_to_name: Option<String>,
    #[serde(default)]
    pub status: TaskStatus,
    #[serde(default)]
    pub individual_statuses: Vec<IndividualStatus>,
    #[serde(default)]
    pub updates: Vec<InstructionUpdate>,
    #[serde(default)]
    pub updates_locked: bool,
    pub created_by: String,
    #[serde(default)]
    pub created_by_name: Option<String>,
    pub created_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
pub struct InstructionFields {
    pub title: Option<String>,
    pub description: Option<String>,
    pub priority: Option<Priority>,
    pub assigned_teams: Option<Vec<String>>,
    pub assigned_volunteers: Option<Vec<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub assigned_to: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub assigned_to_name: Option<Option<String>>,
    pub status: Option<TaskStatus>,
    pub updates_locked: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct AddUpdateRequest {
    pub update: Option<String>,
}

// ========== CHAT ==========
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ChatGroup {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub member_ids: Vec<String>,
    pub created_by: String,
    pub created_at: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ChatMessage {
    pub id: String,
    pub from_user_id: String,
    #[serde(default)]
    pub from_user_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_id: Option<String>,
    pub message: String,
    pub timestamp: String,
}

#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    pub to_user_id: Option<String>,
    pub group_id: Option<String>,
    pub message: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateGroupRequest {
    pub name: Option<String>,
    #[serde(default)]
    pub member_ids: Vec<String>,
}
