use lambda_http::{Body, Response};

use crate::auth::Session;
use crate::config::normalize_email;
use crate::error::ApiError;
use crate::kv::KvStore;
use crate::records::{self, EVENT};
use crate::responses::{ok, parse_body, required};
use crate::types::{
    Comment, CommentRequest, Event, EventFields, GuestRegistrationRequest, GuestUnregisterRequest,
    Registration,
};

impl Event {
    /// Adds the user to `likes`, or removes them if already present.
    /// Returns whether the user likes the event afterwards.
    pub fn toggle_like(&mut self, user_id: &str) -> bool {
        if self.likes.iter().any(|id| id == user_id) {
            self.likes.retain(|id| id != user_id);
            false
        } else {
            self.likes.push(user_id.to_string());
            true
        }
    }

    /// Appends a member registration unless one exists for that user.
    pub fn register_member(&mut self, registration: Registration) -> bool {
        let already = registration.user_id.is_some()
            && self
                .registrations
                .iter()
                .any(|r| r.user_id == registration.user_id);
        if already {
            return false;
        }
        self.registrations.push(registration);
        true
    }

    pub fn unregister_member(&mut self, user_id: &str) -> usize {
        let before = self.registrations.len();
        self.registrations
            .retain(|r| r.user_id.as_deref() != Some(user_id));
        before - self.registrations.len()
    }

    /// Guest entries only; members sharing the email never match.
    pub fn has_guest_email(&self, email: &str) -> bool {
        let email = normalize_email(email);
        self.registrations.iter().any(|r| is_guest_with_email(r, &email))
    }

    pub fn remove_guest(&mut self, email: &str) -> usize {
        let email = normalize_email(email);
        let before = self.registrations.len();
        self.registrations.retain(|r| !is_guest_with_email(r, &email));
        before - self.registrations.len()
    }

    /// Merge editable fields; identity, engagement and audit fields are
    /// not part of `EventFields` and so can never be overwritten.
    pub fn apply(&mut self, fields: EventFields) {
        if let Some(title) = fields.title {
            self.title = title;
        }
        if let Some(description) = fields.description {
            self.description = description;
        }
        if let Some(date) = fields.date {
            self.date = date;
        }
        if let Some(time) = fields.time {
            self.time = time;
        }
        if let Some(location) = fields.location {
            self.location = location;
        }
        if let Some(category) = fields.category {
            self.category = category;
        }
        if let Some(speakers) = fields.speakers {
            self.speakers = speakers;
        }
        if let Some(agenda) = fields.agenda {
            self.agenda = agenda;
        }
        if let Some(image) = fields.image {
            self.image = image;
        }
    }
}

fn is_guest_with_email(registration: &Registration, normalized: &str) -> bool {
    registration.is_guest
        && registration
            .email
            .as_deref()
            .map(normalize_email)
            .as_deref()
            == Some(normalized)
}

async fn load_event(store: &dyn KvStore, id: &str) -> Result<(String, Event), ApiError> {
    let key = records::record_key(EVENT, id);
    match records::load::<Event>(store, &key).await? {
        Some(event) => Ok((key, event)),
        None => Err(ApiError::not_found("Event not found")),
    }
}

/// All events, oldest first.
pub async fn list_events(store: &dyn KvStore) -> Result<Response<Body>, ApiError> {
    let mut events: Vec<Event> = records::load_all(store, "event:").await?;
    events.sort_by(|a, b| a.created_at.cmp(&b.created_at));
    ok(&serde_json::json!({ "events": events }))
}

pub async fn get_event(store: &dyn KvStore, id: &str) -> Result<Response<Body>, ApiError> {
    let (_, event) = load_event(store, id).await?;
    ok(&serde_json::json!({ "event": event }))
}

pub async fn create_event(
    store: &dyn KvStore,
    session: &Session,
    body: &[u8],
) -> Result<Response<Body>, ApiError> {
    session.require_admin()?;

    let fields: EventFields = parse_body(body)?;
    let title = required(fields.title.as_deref(), "Title is required")?.to_string();
    required(fields.date.as_deref(), "Date is required")?;

    let mut event = Event {
        id: records::new_id(),
        title,
        description: String::new(),
        date: String::new(),
        time: String::new(),
        location: String::new(),
        category: String::new(),
        speakers: Vec::new(),
        agenda: None,
        image: None,
        likes: Vec::new(),
        comments: Vec::new(),
        registrations: Vec::new(),
        created_at: records::timestamp(),
        updated_at: None,
    };
    event.apply(EventFields { title: None, ..fields });

    records::save(store, &records::record_key(EVENT, &event.id), &event).await?;
    tracing::info!("Event {} created by {}", event.id, session.user_id);

    ok(&serde_json::json!({ "event": event }))
}

pub async fn update_event(
    store: &dyn KvStore,
    session: &Session,
    id: &str,
    body: &[u8],
) -> Result<Response<Body>, ApiError> {
    session.require_admin()?;

    let fields: EventFields = parse_body(body)?;
    let (key, mut event) = load_event(store, id).await?;

    if let Some(title) = fields.title.as_deref() {
        if title.trim().is_empty() {
            return Err(ApiError::bad_request("Title cannot be empty"));
        }
    }

    event.apply(fields);
    event.updated_at = Some(records::timestamp());
    records::save(store, &key, &event).await?;

    ok(&serde_json::json!({ "event": event }))
}

pub async fn toggle_like(
    store: &dyn KvStore,
    session: &Session,
    id: &str,
) -> Result<Response<Body>, ApiError> {
    let (key, mut event) = load_event(store, id).await?;
    let liked = event.toggle_like(&session.user_id);
    records::save(store, &key, &event).await?;

    tracing::info!(
        "User {} {} event {}",
        session.user_id,
        if liked { "liked" } else { "unliked" },
        event.id
    );
    ok(&serde_json::json!({ "event": event }))
}

pub async fn add_comment(
    store: &dyn KvStore,
    session: &Session,
    id: &str,
    body: &[u8],
) -> Result<Response<Body>, ApiError> {
    let req: CommentRequest = parse_body(body)?;
    let text = required(req.comment.as_deref(), "Comment text is required")?;

    let (key, mut event) = load_event(store, id).await?;
    event.comments.push(Comment {
        id: records::new_id(),
        user_id: session.user_id.clone(),
        user_name: session.name().unwrap_or("Anonymous").to_string(),
        comment: text.to_string(),
        created_at: records::timestamp(),
    });
    records::save(store, &key, &event).await?;

    ok(&serde_json::json!({ "event": event }))
}

pub async fn register(
    store: &dyn KvStore,
    session: &Session,
    id: &str,
) -> Result<Response<Body>, ApiError> {
    let (key, mut event) = load_event(store, id).await?;

    let registration = Registration {
        user_id: Some(session.user_id.clone()),
        user_name: session.name().map(str::to_string),
        email: Some(
            session
                .profile
                .as_ref()
                .map(|p| p.email.clone())
                .unwrap_or_else(|| session.email.clone()),
        ),
        whatsapp: None,
        class_name: None,
        school: None,
        registered_at: records::timestamp(),
        is_guest: false,
    };

    if event.register_member(registration) {
        records::save(store, &key, &event).await?;
        tracing::info!("User {} registered for event {}", session.user_id, event.id);
    }

    ok(&serde_json::json!({ "event": event }))
}

pub async fn unregister(
    store: &dyn KvStore,
    session: &Session,
    id: &str,
) -> Result<Response<Body>, ApiError> {
    let (key, mut event) = load_event(store, id).await?;
    event.unregister_member(&session.user_id);
    records::save(store, &key, &event).await?;

    ok(&serde_json::json!({ "event": event }))
}

/// Registration by contact details alone; no account needed.
pub async fn register_guest(
    store: &dyn KvStore,
    id: &str,
    body: &[u8],
) -> Result<Response<Body>, ApiError> {
    let req: GuestRegistrationRequest = parse_body(body)?;
    let missing = "Name, email, and WhatsApp number are required";
    let name = required(req.name.as_deref(), missing)?;
    let email = required(req.email.as_deref(), missing)?;
    let whatsapp = required(req.whatsapp.as_deref(), missing)?;

    let (key, mut event) = load_event(store, id).await?;

    if event.has_guest_email(email) {
        tracing::info!("Guest email already registered for event {}", event.id);
        return Err(ApiError::bad_request(
            "This email is already registered for this event",
        ));
    }

    event.registrations.push(Registration {
        user_id: None,
        user_name: Some(name.to_string()),
        email: Some(email.to_string()),
        whatsapp: Some(whatsapp.to_string()),
        class_name: req.class_name.filter(|c| !c.trim().is_empty()),
        school: req.school.filter(|s| !s.trim().is_empty()),
        registered_at: records::timestamp(),
        is_guest: true,
    });
    records::save(store, &key, &event).await?;

    ok(&serde_json::json!({ "event": event, "success": true }))
}

pub async fn unregister_guest(
    store: &dyn KvStore,
    id: &str,
    body: &[u8],
) -> Result<Response<Body>, ApiError> {
    let req: GuestUnregisterRequest = parse_body(body)?;
    let email = required(req.email.as_deref(), "Email is required")?;

    let (key, mut event) = load_event(store, id).await?;

    if event.remove_guest(email) == 0 {
        return Err(ApiError::not_found(
            "Guest registration not found for this email",
        ));
    }
    records::save(store, &key, &event).await?;

    ok(&serde_json::json!({ "event": event, "success": true }))
}
