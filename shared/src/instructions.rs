use lambda_http::{Body, Response};

use crate::auth::Session;
use crate::error::ApiError;
use crate::kv::KvStore;
use crate::records::{self, INSTRUCTION};
use crate::responses::{ok, parse_body, required};
use crate::types::{
    AddUpdateRequest, IndividualStatus, Instruction, InstructionFields, InstructionUpdate,
    TaskStatus,
};

/// Team name that assigns an instruction to every team.
pub const ALL_TEAMS: &str = "All teams";
/// Legacy `assigned_to` value that assigns an instruction to everyone.
pub const ASSIGNED_TO_ALL: &str = "all";

impl Instruction {
    /// Any one of the three assignment mechanisms is enough.
    pub fn is_assigned_to(&self, user_id: &str, team: Option<&str>) -> bool {
        let legacy = matches!(
            self.assigned_to.as_deref(),
            Some(target) if target == user_id || target == ASSIGNED_TO_ALL
        );
        let direct = self.assigned_volunteers.iter().any(|v| v == user_id);
        let by_team = self
            .assigned_teams
            .iter()
            .any(|t| t == ALL_TEAMS || Some(t.as_str()) == team);

        legacy || direct || by_team
    }

    /// Insert or replace the entry for `entry.user_id`; other entries and
    /// the coarse `status` are untouched.
    pub fn upsert_status(&mut self, entry: IndividualStatus) {
        match self
            .individual_statuses
            .iter_mut()
            .find(|s| s.user_id == entry.user_id)
        {
            Some(existing) => *existing = entry,
            None => self.individual_statuses.push(entry),
        }
    }

    pub fn apply(&mut self, fields: InstructionFields) {
        if let Some(title) = fields.title {
            self.title = title;
        }
        if let Some(description) = fields.description {
            self.description = description;
        }
        if let Some(priority) = fields.priority {
            self.priority = priority;
        }
        if let Some(teams) = fields.assigned_teams {
            self.assigned_teams = teams;
        }
        if let Some(volunteers) = fields.assigned_volunteers {
            self.assigned_volunteers = volunteers;
        }
        if let Some(assigned_to) = fields.assigned_to {
            self.assigned_to = assigned_to;
        }
        if let Some(assigned_to_name) = fields.assigned_to_name {
            self.assigned_to_name = assigned_to_name;
        }
        if let Some(status) = fields.status {
            self.status = status;
        }
        if let Some(locked) = fields.updates_locked {
            self.updates_locked = locked;
        }
    }
}

async fn load_instruction(store: &dyn KvStore, id: &str) -> Result<(String, Instruction), ApiError> {
    let key = records::record_key(INSTRUCTION, id);
    match records::load::<Instruction>(store, &key).await? {
        Some(instruction) => Ok((key, instruction)),
        None => Err(ApiError::not_found("Instruction not found")),
    }
}

/// Admins see everything; everyone else only what is assigned to them.
pub async fn list_instructions(
    store: &dyn KvStore,
    session: &Session,
) -> Result<Response<Body>, ApiError> {
    let all: Vec<Instruction> = records::load_all(store, "instruction:").await?;
    let total = all.len();

    let mut instructions: Vec<Instruction> = if session.is_admin() {
        all
    } else {
        all.into_iter()
            .filter(|inst| inst.is_assigned_to(&session.user_id, session.team()))
            .collect()
    };

    tracing::info!(
        "Instructions for user {} (role {:?}, team {:?}): {} of {}",
        session.user_id,
        session.role(),
        session.team(),
        instructions.len(),
        total
    );

    instructions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    ok(&serde_json::json!({ "instructions": instructions }))
}

pub async fn create_instruction(
    store: &dyn KvStore,
    session: &Session,
    body: &[u8],
) -> Result<Response<Body>, ApiError> {
    session.require_admin()?;

    let fields: InstructionFields = parse_body(body)?;
    let title = required(fields.title.as_deref(), "Title is required")?.to_string();

    let mut instruction = Instruction {
        id: records::new_id(),
        title,
        description: String::new(),
        priority: Default::default(),
        assigned_teams: Vec::new(),
        assigned_volunteers: Vec::new(),
        assigned_to: None,
        assigned_to_name: None,
        status: TaskStatus::Todo,
        individual_statuses: Vec::new(),
        updates: Vec::new(),
        updates_locked: false,
        created_by: session.user_id.clone(),
        created_by_name: session.name().map(str::to_string),
        created_at: records::timestamp(),
        updated_at: None,
    };
    // New instructions always start as todo.
    instruction.apply(InstructionFields {
        title: None,
        status: None,
        ..fields
    });

    records::save(store, &records::record_key(INSTRUCTION, &instruction.id), &instruction).await?;
    tracing::info!("Instruction {} created by {}", instruction.id, session.user_id);

    ok(&serde_json::json!({ "instruction": instruction }))
}

/// Admins edit any field. Everyone else can only record their own status.
pub async fn update_instruction(
    store: &dyn KvStore,
    session: &Session,
    id: &str,
    body: &[u8],
) -> Result<Response<Body>, ApiError> {
    let fields: InstructionFields = parse_body(body)?;
    let (key, mut instruction) = load_instruction(store, id).await?;

    if session.is_admin() {
        if let Some(title) = fields.title.as_deref() {
            if title.trim().is_empty() {
                return Err(ApiError::bad_request("Title cannot be empty"));
            }
        }
        instruction.apply(fields);
        instruction.updated_at = Some(records::timestamp());
        records::save(store, &key, &instruction).await?;
        return ok(&serde_json::json!({ "instruction": instruction }));
    }

    if let Some(status) = fields.status {
        let now = records::timestamp();
        instruction.upsert_status(IndividualStatus {
            user_id: session.user_id.clone(),
            user_name: session.name().unwrap_or("Unknown").to_string(),
            user_team: session.team().map(str::to_string),
            status,
            updated_at: now.clone(),
        });
        instruction.updated_at = Some(now);
        records::save(store, &key, &instruction).await?;
        tracing::info!(
            "User {} set status {:?} on instruction {}",
            session.user_id,
            status,
            instruction.id
        );
    }

    ok(&serde_json::json!({ "instruction": instruction }))
}

/// Progress note; blocked for non-admins while updates are locked.
pub async fn add_update(
    store: &dyn KvStore,
    session: &Session,
    id: &str,
    body: &[u8],
) -> Result<Response<Body>, ApiError> {
    let (key, mut instruction) = load_instruction(store, id).await?;

    if instruction.updates_locked && !session.is_admin() {
        tracing::warn!(
            "User {} tried to update locked instruction {}",
            session.user_id,
            instruction.id
        );
        return Err(ApiError::Forbidden(
            "Updates are locked for this instruction".to_string(),
        ));
    }

    let req: AddUpdateRequest = parse_body(body)?;
    let text = required(req.update.as_deref(), "Update text is required")?;

    instruction.updates.push(InstructionUpdate {
        id: records::new_id(),
        user_id: session.user_id.clone(),
        user_name: session.name().unwrap_or("Unknown").to_string(),
        user_team: session.team().map(str::to_string),
        update: text.to_string(),
        created_at: records::timestamp(),
    });
    records::save(store, &key, &instruction).await?;

    ok(&serde_json::json!({ "instruction": instruction }))
}

pub async fn toggle_lock(
    store: &dyn KvStore,
    session: &Session,
    id: &str,
) -> Result<Response<Body>, ApiError> {
    session.require_admin()?;

    let (key, mut instruction) = load_instruction(store, id).await?;
    instruction.updates_locked = !instruction.updates_locked;
    records::save(store, &key, &instruction).await?;

    tracing::info!(
        "Instruction {} updates_locked={}",
        instruction.id,
        instruction.updates_locked
    );
    ok(&serde_json::json!({ "instruction": instruction }))
}
