//! In-memory CInP server used by the client's integration tests.
//!
//! Protocol verbs arrive as literal HTTP methods (`LIST`, `CALL`, ...), which
//! axum's method router cannot express, so every request goes through one
//! fallback handler that dispatches on method and path. Objects live under
//! `/api/v1/<namespace>/<model>`; files under `/files/`.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::{header, HeaderMap, HeaderName, HeaderValue, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    Json, Router,
};
use serde_json::{json, Map, Value};
use tokio::{net::TcpListener, sync::RwLock};

pub const ROOT: &str = "/api/v1/";
pub const FILES: &str = "/files/";

type Object = Map<String, Value>;

#[derive(Debug, Default)]
pub struct Store {
    /// model path → id → values
    models: HashMap<String, BTreeMap<u64, Object>>,
    files: HashMap<String, Vec<u8>>,
    next_id: u64,
}

pub type Db = Arc<RwLock<Store>>;

pub fn app() -> Router {
    let db: Db = Arc::new(RwLock::new(Store::default()));
    Router::new().fallback(dispatch).with_state(db)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    axum::serve(listener, app()).await
}

/// A request path under `ROOT`, split into its parts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    /// `/api/v1/ns/model`, or the namespace path ending in `/`.
    pub model_path: String,
    pub has_model: bool,
    pub ids: Vec<String>,
    pub action: Option<String>,
}

impl Target {
    pub fn parse(path: &str) -> Option<Self> {
        let rest = path.strip_prefix(ROOT)?;
        let (rest, action) = match rest.strip_suffix(')') {
            Some(head) => {
                let open = head.rfind('(')?;
                (&head[..open], Some(head[open + 1..].to_string()))
            }
            None => (rest, None),
        };
        let (model, ids) = match rest.split_once(':') {
            Some((model, ids)) => (
                model,
                ids.split(':')
                    .filter(|id| !id.is_empty())
                    .map(str::to_string)
                    .collect(),
            ),
            None => (rest, Vec::new()),
        };
        Some(Self {
            model_path: format!("{ROOT}{model}"),
            has_model: !model.is_empty() && !model.ends_with('/'),
            ids,
            action,
        })
    }

    fn object_uri(&self, id: &str) -> String {
        format!("{}:{id}:", self.model_path)
    }
}

fn header_text<'h>(headers: &'h HeaderMap, name: &str) -> Option<&'h str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

fn reply(status: StatusCode, extra: &[(&'static str, String)], body: Option<Value>) -> Response {
    let mut headers = HeaderMap::new();
    for (name, value) in extra {
        if let Ok(value) = HeaderValue::from_str(value) {
            headers.insert(HeaderName::from_static(name), value);
        }
    }
    match body {
        Some(body) => (status, headers, Json(body)).into_response(),
        None => (status, headers).into_response(),
    }
}

fn bad_request(message: &str) -> Response {
    reply(StatusCode::BAD_REQUEST, &[], Some(json!({ "message": message })))
}

async fn dispatch(
    State(db): State<Db>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let path = uri.path();
    tracing::info!(%method, path, "request");

    if header_text(&headers, "auth-id") == Some("bad") {
        return StatusCode::UNAUTHORIZED.into_response();
    }

    if let Some(name) = path.strip_prefix(FILES) {
        return match method.as_str() {
            "GET" => get_file(&db, name).await,
            "POST" if name.is_empty() => upload_file(&db, &headers, body).await,
            _ => StatusCode::NOT_FOUND.into_response(),
        };
    }

    let Some(target) = Target::parse(path) else {
        return StatusCode::NOT_FOUND.into_response();
    };

    let values = if body.is_empty() {
        None
    } else {
        match serde_json::from_slice::<Value>(&body) {
            Ok(Value::Object(map)) => Some(map),
            Ok(_) => return bad_request("body must be an object"),
            Err(_) => return bad_request("unable to parse body"),
        }
    };

    let multi = header_text(&headers, "multi-object")
        .is_some_and(|v| v.eq_ignore_ascii_case("true"))
        || target.ids.len() > 1;

    match method.as_str() {
        "DESCRIBE" => describe(&target),
        "LIST" => list(&db, &target, &headers, values.unwrap_or_default()).await,
        "CREATE" => create(&db, &target, values.unwrap_or_default()).await,
        "GET" => get(&db, &target, multi).await,
        "UPDATE" => update(&db, &target, values.unwrap_or_default(), multi).await,
        "DELETE" => delete(&db, &target).await,
        "CALL" => call(&target, values.unwrap_or_default()),
        _ => bad_request("unknown verb"),
    }
}

fn describe(target: &Target) -> Response {
    let (kind, name) = match (&target.action, target.has_model) {
        (Some(action), _) => ("Action", action.clone()),
        (None, true) => (
            "Model",
            target
                .model_path
                .rsplit('/')
                .next()
                .unwrap_or_default()
                .to_string(),
        ),
        (None, false) => ("Namespace", target.model_path.clone()),
    };
    reply(
        StatusCode::OK,
        &[("type", kind.to_string())],
        Some(json!({ "name": name, "path": target.model_path })),
    )
}

async fn list(db: &Db, target: &Target, headers: &HeaderMap, filter: Object) -> Response {
    let number = |name: &str, default: usize| {
        header_text(headers, name)
            .and_then(|v| v.parse().ok())
            .unwrap_or(default)
    };
    let position = number("position", 0);
    let count = number("count", 10);

    let prefix = match header_text(headers, "filter") {
        None => None,
        Some("prefix") => Some(
            filter
                .get("prefix")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
        ),
        Some(other) => return bad_request(&format!("unknown filter \"{other}\"")),
    };

    let store = db.read().await;
    let matching: Vec<String> = store
        .models
        .get(&target.model_path)
        .into_iter()
        .flatten()
        .filter(|(_, values)| match &prefix {
            Some(prefix) => values
                .get("name")
                .and_then(Value::as_str)
                .is_some_and(|name| name.starts_with(prefix.as_str())),
            None => true,
        })
        .map(|(id, _)| target.object_uri(&id.to_string()))
        .collect();

    let page: Vec<String> = matching.iter().skip(position).take(count).cloned().collect();
    reply(
        StatusCode::OK,
        &[
            ("position", position.to_string()),
            ("count", page.len().to_string()),
            ("total", matching.len().to_string()),
        ],
        Some(json!(page)),
    )
}

async fn create(db: &Db, target: &Target, values: Object) -> Response {
    let mut store = db.write().await;
    store.next_id += 1;
    let id = store.next_id;
    store
        .models
        .entry(target.model_path.clone())
        .or_default()
        .insert(id, values.clone());
    reply(
        StatusCode::CREATED,
        &[("object-id", target.object_uri(&id.to_string()))],
        Some(Value::Object(values)),
    )
}

fn lookup_ids(target: &Target) -> Option<Vec<u64>> {
    target.ids.iter().map(|id| id.parse().ok()).collect()
}

fn render(target: &Target, found: Vec<(u64, Object)>, multi: bool) -> Response {
    let body = if multi {
        let keyed: Object = found
            .into_iter()
            .map(|(id, values)| (target.object_uri(&id.to_string()), Value::Object(values)))
            .collect();
        Value::Object(keyed)
    } else {
        found
            .into_iter()
            .next()
            .map(|(_, values)| Value::Object(values))
            .unwrap_or_default()
    };
    reply(StatusCode::OK, &[("multi-object", multi.to_string())], Some(body))
}

async fn get(db: &Db, target: &Target, multi: bool) -> Response {
    let store = db.read().await;
    let Some(ids) = lookup_ids(target) else {
        return StatusCode::NOT_FOUND.into_response();
    };
    let Some(objects) = store.models.get(&target.model_path) else {
        return StatusCode::NOT_FOUND.into_response();
    };
    let mut found = Vec::new();
    for id in ids {
        match objects.get(&id) {
            Some(values) => found.push((id, values.clone())),
            None => return StatusCode::NOT_FOUND.into_response(),
        }
    }
    render(target, found, multi)
}

async fn update(db: &Db, target: &Target, changes: Object, multi: bool) -> Response {
    let mut store = db.write().await;
    let Some(ids) = lookup_ids(target) else {
        return StatusCode::NOT_FOUND.into_response();
    };
    let Some(objects) = store.models.get_mut(&target.model_path) else {
        return StatusCode::NOT_FOUND.into_response();
    };
    if !ids.iter().all(|id| objects.contains_key(id)) {
        return StatusCode::NOT_FOUND.into_response();
    }
    let mut found = Vec::new();
    for id in ids {
        if let Some(values) = objects.get_mut(&id) {
            values.extend(changes.clone());
            found.push((id, values.clone()));
        }
    }
    render(target, found, multi)
}

async fn delete(db: &Db, target: &Target) -> Response {
    let mut store = db.write().await;
    let Some(ids) = lookup_ids(target) else {
        return StatusCode::NOT_FOUND.into_response();
    };
    let Some(objects) = store.models.get_mut(&target.model_path) else {
        return StatusCode::NOT_FOUND.into_response();
    };
    if !ids.iter().all(|id| objects.contains_key(id)) {
        return StatusCode::NOT_FOUND.into_response();
    }
    for id in ids {
        objects.remove(&id);
    }
    StatusCode::OK.into_response()
}

fn call(target: &Target, args: Object) -> Response {
    match target.action.as_deref() {
        Some("echo") => reply(StatusCode::OK, &[], Some(Value::Object(args))),
        Some("fail") => reply(
            StatusCode::INTERNAL_SERVER_ERROR,
            &[],
            Some(json!({ "message": "action failed", "trace": "mock-server dispatch" })),
        ),
        Some("reject") => reply(
            StatusCode::BAD_REQUEST,
            &[],
            Some(json!({
                "class": "ValueError",
                "error": "rejected",
                "message": "arguments rejected",
                "args": args,
            })),
        ),
        _ => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn get_file(db: &Db, name: &str) -> Response {
    let store = db.read().await;
    match store.files.get(name) {
        Some(data) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "application/octet-stream")],
            data.clone(),
        )
            .into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

/// Pull the name out of `inline: filename="<name>"`.
pub fn disposition_filename(value: &str) -> Option<&str> {
    let start = value.find("filename=\"")? + "filename=\"".len();
    let rest = &value[start..];
    let end = rest.find('"')?;
    Some(&rest[..end]).filter(|name| !name.is_empty())
}

async fn upload_file(db: &Db, headers: &HeaderMap, body: Bytes) -> Response {
    let Some(name) = header_text(headers, "content-disposition").and_then(disposition_filename)
    else {
        return bad_request("missing file name");
    };
    let name = name.to_string();
    db.write().await.files.insert(name.clone(), body.to_vec());
    reply(
        StatusCode::ACCEPTED,
        &[],
        Some(json!({ "uri": format!("{FILES}{name}") })),
    )
}
