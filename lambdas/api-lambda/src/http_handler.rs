use rupantor_shared::{
    auth, chat,
    error::ApiError,
    events, instructions,
    records::{self, EVENT, INSTRUCTION, USER},
    responses, users, AppState,
};
use lambda_http::{
    http::{Method, StatusCode},
    Body, Error, Request, RequestExt, Response,
};
use std::collections::HashMap;
use std::sync::Arc;

/// Every endpoint the API serves, with its path parameters.
#[derive(Debug, PartialEq)]
enum Route<'a> {
    Health,
    Signup,
    Login,
    Refresh,
    Profile,
    UserByEmail(String),
    UpdateUser(&'a str),
    Volunteers,
    ListEvents,
    CreateEvent,
    GetEvent(&'a str),
    UpdateEvent(&'a str),
    LikeEvent(&'a str),
    CommentEvent(&'a str),
    Register(&'a str),
    Unregister(&'a str),
    RegisterGuest(&'a str),
    UnregisterGuest(&'a str),
    ListInstructions,
    CreateInstruction,
    UpdateInstruction(&'a str),
    AddInstructionUpdate(&'a str),
    ToggleLock(&'a str),
    SendMessage,
    ListMessages,
    CreateGroup,
    ListGroups,
}

impl Route<'_> {
    /// Routes reachable without a bearer token.
    fn is_public(&self) -> bool {
        matches!(
            self,
            Route::Health
                | Route::Signup
                | Route::Login
                | Route::Refresh
                | Route::UserByEmail(_)
                | Route::ListEvents
                | Route::GetEvent(_)
                | Route::RegisterGuest(_)
                | Route::UnregisterGuest(_)
        )
    }
}

/// Map method + path segments to a route. A known path with the wrong
/// method is 405; anything else unknown is 404.
fn resolve<'a>(method: &Method, parts: &[&'a str]) -> Result<Route<'a>, ApiError> {
    let route = match (method, parts) {
        (&Method::GET, []) | (&Method::GET, ["health"]) => Route::Health,

        // --- USERS ---
        (&Method::POST, ["signup"]) => Route::Signup,
        (&Method::POST, ["login"]) => Route::Login,
        (&Method::POST, ["refresh"]) => Route::Refresh,
        (&Method::GET, ["profile"]) => Route::Profile,
        (&Method::GET, ["users", "by-email", email]) => Route::UserByEmail(percent_decode(email)),
        (&Method::PATCH, ["users", id]) => Route::UpdateUser(records::bare_id(USER, *id)),
        (&Method::GET, ["volunteers"]) => Route::Volunteers,

        // --- EVENTS ---
        (&Method::GET, ["events"]) => Route::ListEvents,
        (&Method::POST, ["events"]) => Route::CreateEvent,
        (&Method::GET, ["events", id]) => Route::GetEvent(records::bare_id(EVENT, *id)),
        (&Method::PATCH, ["events", id]) => Route::UpdateEvent(records::bare_id(EVENT, *id)),
        (&Method::POST, ["events", id, action]) => {
            let id = records::bare_id(EVENT, *id);
            match *action {
                "like" => Route::LikeEvent(id),
                "comment" => Route::CommentEvent(id),
                "register" => Route::Register(id),
                "unregister" => Route::Unregister(id),
                "register-guest" => Route::RegisterGuest(id),
                "unregister-guest" => Route::UnregisterGuest(id),
                _ => return Err(ApiError::not_found("Not found")),
            }
        }

        // --- INSTRUCTIONS ---
        (&Method::GET, ["instructions"]) => Route::ListInstructions,
        (&Method::POST, ["instructions"]) => Route::CreateInstruction,
        (&Method::PATCH, ["instructions", id]) => {
            Route::UpdateInstruction(records::bare_id(INSTRUCTION, *id))
        }
        (&Method::POST, ["instructions", id, "update"]) => {
            Route::AddInstructionUpdate(records::bare_id(INSTRUCTION, *id))
        }
        (&Method::PATCH, ["instructions", id, "toggle-lock"]) => {
            Route::ToggleLock(records::bare_id(INSTRUCTION, *id))
        }

        // --- CHAT ---
        (&Method::POST, ["chat", "messages"]) => Route::SendMessage,
        (&Method::GET, ["chat", "messages"]) => Route::ListMessages,
        (&Method::POST, ["chat", "groups"]) => Route::CreateGroup,
        (&Method::GET, ["chat", "groups"]) => Route::ListGroups,

        _ if is_known_path(parts) => return Err(ApiError::MethodNotAllowed),
        _ => return Err(ApiError::not_found("Not found")),
    };
    Ok(route)
}

fn is_known_path(parts: &[&str]) -> bool {
    matches!(
        parts,
        []
            | ["health"]
            | ["signup"]
            | ["login"]
            | ["refresh"]
            | ["profile"]
            | ["volunteers"]
            | ["users", "by-email", _]
            | ["users", _]
            | ["events"]
            | ["events", _]
            | ["events", _, "like" | "comment" | "register" | "unregister" | "register-guest" | "unregister-guest"]
            | ["instructions"]
            | ["instructions", _]
            | ["instructions", _, "update" | "toggle-lock"]
            | ["chat", "messages" | "groups"]
    )
}

/// Decode `%XX` escapes in a path segment (`a%40b.com` -> `a@b.com`).
fn percent_decode(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut out: Vec<u8> = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            let hi = (bytes[i + 1] as char).to_digit(16);
            let lo = (bytes[i + 2] as char).to_digit(16);
            if let (Some(hi), Some(lo)) = (hi, lo) {
                out.push(((hi << 4) + lo) as u8);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

/// Main Lambda handler - resolves the route, authenticates where required
/// and converts handler errors into `{error}` responses.
pub(crate) async fn function_handler(
    event: Request,
    state: Arc<AppState>,
) -> Result<Response<Body>, Error> {
    tracing::info!(
        "API invoked - Method: {} Path: {}",
        event.method(),
        event.uri().path()
    );

    match dispatch(&event, &state).await {
        Ok(response) => Ok(response),
        Err(err) => err.into_response(),
    }
}

async fn dispatch(event: &Request, state: &AppState) -> Result<Response<Body>, ApiError> {
    let method = event.method();

    // Handle CORS preflight
    if method == Method::OPTIONS {
        return responses::preflight();
    }

    let parts: Vec<&str> = event
        .uri()
        .path()
        .split('/')
        .filter(|s| !s.is_empty())
        .collect();
    let route = resolve(method, &parts)?;

    let store = state.store.as_ref();
    let identity = state.identity.as_ref();
    let body: &[u8] = event.body();

    if route.is_public() {
        return match route {
            Route::Health => health(),
            Route::Signup => auth::signup(identity, store, &state.config, body).await,
            Route::Login => auth::login(identity, body).await,
            Route::Refresh => auth::refresh(identity, body).await,
            Route::UserByEmail(email) => users::get_user_by_email(store, &email).await,
            Route::ListEvents => events::list_events(store).await,
            Route::GetEvent(id) => events::get_event(store, id).await,
            Route::RegisterGuest(id) => events::register_guest(store, id, body).await,
            Route::UnregisterGuest(id) => events::unregister_guest(store, id, body).await,
            _ => Err(ApiError::not_found("Not found")),
        };
    }

    let session = auth::authenticate(identity, store, &state.config, event.headers()).await?;
    tracing::info!("Authenticated user {} for {:?}", session.user_id, route);

    match route {
        Route::Profile => users::get_profile(&session),
        Route::UpdateUser(id) => users::update_user(store, &session, id, body).await,
        Route::Volunteers => users::list_volunteers(store, &session).await,

        Route::CreateEvent => events::create_event(store, &session, body).await,
        Route::UpdateEvent(id) => events::update_event(store, &session, id, body).await,
        Route::LikeEvent(id) => events::toggle_like(store, &session, id).await,
        Route::CommentEvent(id) => events::add_comment(store, &session, id, body).await,
        Route::Register(id) => events::register(store, &session, id).await,
        Route::Unregister(id) => events::unregister(store, &session, id).await,

        Route::ListInstructions => instructions::list_instructions(store, &session).await,
        Route::CreateInstruction => instructions::create_instruction(store, &session, body).await,
        Route::UpdateInstruction(id) => {
            instructions::update_instruction(store, &session, id, body).await
        }
        Route::AddInstructionUpdate(id) => {
            instructions::add_update(store, &session, id, body).await
        }
        Route::ToggleLock(id) => instructions::toggle_lock(store, &session, id).await,

        Route::SendMessage => chat::send_message(store, &session, body).await,
        Route::ListMessages => {
            let query: HashMap<String, String> = event
                .query_string_parameters_ref()
                .map(|params| {
                    params
                        .iter()
                        .map(|(k, v)| (k.to_string(), v.to_string()))
                        .collect()
                })
                .unwrap_or_default();
            chat::list_messages(store, &session, &query).await
        }
        Route::CreateGroup => chat::create_group(store, &session, body).await,
        Route::ListGroups => chat::list_groups(store, &session).await,

        _ => Err(ApiError::not_found("Not found")),
    }
}

fn health() -> Result<Response<Body>, ApiError> {
    responses::json(
        StatusCode::OK,
        &serde_json::json!({ "status": "ok", "timestamp": records::timestamp() }),
    )
}
