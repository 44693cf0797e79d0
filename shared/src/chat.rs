use std::collections::HashMap;

use lambda_http::{Body, Response};

use crate::auth::Session;
use crate::error::ApiError;
use crate::kv::KvStore;
use crate::records::{self, GROUP};
use crate::responses::{ok, parse_body, required};
use crate::types::{ChatGroup, ChatMessage, CreateGroupRequest, SendMessageRequest};

/// Canonical id for a two-party conversation; the same for either order.
pub fn conversation_id(a: &str, b: &str) -> String {
    if a <= b {
        format!("{}_{}", a, b)
    } else {
        format!("{}_{}", b, a)
    }
}

/// User ids are embedded in conversation keys, so neither the key separator
/// nor the pair joiner may appear in them.
fn participant_id<'a>(raw: &'a str, field: &str) -> Result<&'a str, ApiError> {
    if raw.contains(':') || raw.contains('_') {
        tracing::warn!("Rejected {} containing a key separator: {}", field, raw);
        return Err(ApiError::bad_request(format!("Invalid {}", field)));
    }
    Ok(raw)
}

/// The two participants of a canonical conversation id.
fn conversation_parties(conversation: &str) -> Result<(&str, &str), ApiError> {
    let invalid = || ApiError::bad_request("Invalid conversation_id");
    let (a, b) = conversation.split_once('_').ok_or_else(invalid)?;
    let a = participant_id(a, "conversation_id")?;
    let b = participant_id(b, "conversation_id")?;
    if a.is_empty() || b.is_empty() || a > b {
        return Err(invalid());
    }
    Ok((a, b))
}

fn group_prefix(group_id: &str) -> String {
    format!("chat:group:{}:", group_id)
}

fn conversation_prefix(conversation: &str) -> String {
    format!("chat:conv:{}:", conversation)
}

/// Which thread a read or write addresses.
#[derive(Debug, PartialEq)]
enum Thread {
    Group(String),
    Conversation(String),
}

impl Thread {
    fn prefix(&self) -> String {
        match self {
            Thread::Group(id) => group_prefix(id),
            Thread::Conversation(id) => conversation_prefix(id),
        }
    }
}

async fn load_group(store: &dyn KvStore, id: &str) -> Result<ChatGroup, ApiError> {
    records::load::<ChatGroup>(store, &records::record_key(GROUP, id))
        .await?
        .ok_or_else(|| ApiError::not_found("Group not found"))
}

/// Group threads are readable and writable by members and admins only.
async fn check_group_access(
    store: &dyn KvStore,
    session: &Session,
    group_id: &str,
) -> Result<ChatGroup, ApiError> {
    let group = load_group(store, group_id).await?;
    if !session.is_admin() && !group.member_ids.iter().any(|m| m == &session.user_id) {
        tracing::warn!(
            "User {} is not a member of group {}",
            session.user_id,
            group.id
        );
        return Err(ApiError::Forbidden("Not a member of this group".to_string()));
    }
    Ok(group)
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

pub async fn send_message(
    store: &dyn KvStore,
    session: &Session,
    body: &[u8],
) -> Result<Response<Body>, ApiError> {
    let req: SendMessageRequest = parse_body(body)?;
    let text = required(req.message.as_deref(), "Message is required")?;

    let to_user = non_blank(req.to_user_id.as_deref());
    let group = non_blank(req.group_id.as_deref());

    let thread = match (to_user, group) {
        (Some(to), None) => Thread::Conversation(conversation_id(
            participant_id(&session.user_id, "user id")?,
            participant_id(to, "to_user_id")?,
        )),
        (None, Some(group_id)) => {
            let group = check_group_access(store, session, records::bare_id(GROUP, group_id)).await?;
            Thread::Group(group.id)
        }
        _ => {
            return Err(ApiError::bad_request(
                "Exactly one of to_user_id or group_id is required",
            ))
        }
    };

    let message = ChatMessage {
        id: records::new_id(),
        from_user_id: session.user_id.clone(),
        from_user_name: session.name().map(str::to_string),
        to_user_id: to_user.map(str::to_string),
        group_id: match &thread {
            Thread::Group(id) => Some(id.clone()),
            Thread::Conversation(_) => None,
        },
        message: text.to_string(),
        timestamp: records::timestamp(),
    };

    let key = format!("{}{}", thread.prefix(), message.id);
    records::save(store, &key, &message).await?;
    tracing::info!("Message {} stored under {}", message.id, thread.prefix());

    ok(&serde_json::json!({ "message": message }))
}

/// Messages of one thread, oldest first. Clients poll this.
pub async fn list_messages(
    store: &dyn KvStore,
    session: &Session,
    query: &HashMap<String, String>,
) -> Result<Response<Body>, ApiError> {
    let param = |name: &str| non_blank(query.get(name).map(String::as_str));

    let thread = if let Some(group_id) = param("group_id") {
        let group = check_group_access(store, session, records::bare_id(GROUP, group_id)).await?;
        Thread::Group(group.id)
    } else if let Some(conversation) = param("conversation_id") {
        let (a, b) = conversation_parties(conversation)?;
        let is_party = a == session.user_id || b == session.user_id;
        if !is_party && !session.is_admin() {
            return Err(ApiError::Forbidden(
                "Not a participant in this conversation".to_string(),
            ));
        }
        Thread::Conversation(conversation.to_string())
    } else if let Some(other) = param("with_user_id") {
        Thread::Conversation(conversation_id(
            participant_id(&session.user_id, "user id")?,
            participant_id(other, "with_user_id")?,
        ))
    } else {
        return Err(ApiError::bad_request(
            "group_id, conversation_id or with_user_id is required",
        ));
    };

    let mut messages: Vec<ChatMessage> = records::load_all(store, &thread.prefix()).await?;
    messages.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));

    ok(&serde_json::json!({ "messages": messages }))
}

pub async fn create_group(
    store: &dyn KvStore,
    session: &Session,
    body: &[u8],
) -> Result<Response<Body>, ApiError> {
    session.require_admin()?;

    let req: CreateGroupRequest = parse_body(body)?;
    let name = required(req.name.as_deref(), "Group name is required")?.to_string();

    let mut member_ids = req.member_ids;
    if !member_ids.contains(&session.user_id) {
        member_ids.push(session.user_id.clone());
    }

    let group = ChatGroup {
        id: records::new_id(),
        name,
        member_ids,
        created_by: session.user_id.clone(),
        created_at: records::timestamp(),
    };
    records::save(store, &records::record_key(GROUP, &group.id), &group).await?;
    tracing::info!("Group {} created with {} members", group.id, group.member_ids.len());

    ok(&serde_json::json!({ "group": group }))
}

/// Groups the caller belongs to.
pub async fn list_groups(store: &dyn KvStore, session: &Session) -> Result<Response<Body>, ApiError> {
    let groups: Vec<ChatGroup> = records::load_all(store, "group:").await?;
    let groups: Vec<ChatGroup> = groups
        .into_iter()
        .filter(|g| g.member_ids.iter().any(|m| m == &session.user_id))
        .collect();

    ok(&serde_json::json!({ "groups": groups }))
}
