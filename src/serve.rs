//! Purpose: Provide the HTTP/JSON request layer in front of the lending engine.
//! Exports: `ServeConfig`, `serve`, `validate_config`.
//! Role: Axum-based server mapping each route onto one `Library` operation.
//! Invariants: One mutex guards the library and the notice queue; every handler holds it
//! Invariants: for its full read-check-mutate sequence and never across an await point.
//! Invariants: Mutations answer with `303 See Other` and queue exactly one notice.
//! Invariants: Loopback-only unless explicitly allowed.

use axum::extract::{DefaultBodyLimit, Path as AxumPath, Query, State};
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{Value, json};
use std::future::IntoFuture;
use std::net::{IpAddr, SocketAddr};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::time::Duration;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use shelfkeep::api::{
    BookId, Error, ErrorKind, Library, LoanId, LoanPolicy, MAX_LOAN_DAYS, UserId,
    validate_library,
};
use shelfkeep::notice::{Notice, NoticeQueue, notice_json};

use crate::library_json::{
    book_json, error_json, error_message, loan_json, report_json, search_hit_json,
    statistics_json, summary_json, user_json,
};

const API_HEADER: &str = "shelfkeep-api";

#[derive(Clone, Debug)]
pub struct ServeConfig {
    pub bind: SocketAddr,
    pub allow_non_loopback: bool,
    pub loan_days: u32,
    pub require_known_user: bool,
    pub seed: bool,
    pub max_body_bytes: u64,
}

impl ServeConfig {
    pub fn loan_policy(&self) -> LoanPolicy {
        LoanPolicy {
            loan_days: self.loan_days,
            require_known_user: self.require_known_user,
        }
    }
}

struct Shared {
    library: Library,
    notices: NoticeQueue,
}

struct AppState {
    shared: Mutex<Shared>,
}

impl AppState {
    fn new(library: Library) -> Self {
        Self {
            shared: Mutex::new(Shared {
                library,
                notices: NoticeQueue::new(),
            }),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Shared>, Error> {
        self.shared.lock().map_err(|_| {
            Error::new(ErrorKind::Internal).with_message("library state lock poisoned")
        })
    }
}

pub async fn serve(config: ServeConfig) -> Result<(), Error> {
    validate_config(&config)?;

    init_tracing();

    let max_body_bytes: usize = config
        .max_body_bytes
        .try_into()
        .map_err(|_| Error::new(ErrorKind::Usage).with_message("--max-body-bytes is too large"))?;

    let policy = config.loan_policy();
    let library = if config.seed {
        Library::seeded(policy)
    } else {
        Library::new(policy)
    };
    let summary = library.summary();
    tracing::info!(
        books = summary.total_books,
        users = summary.total_users,
        loan_days = policy.loan_days,
        require_known_user = policy.require_known_user,
        "library ready"
    );

    let app = router(Arc::new(AppState::new(library)), max_body_bytes);

    let listener = tokio::net::TcpListener::bind(config.bind)
        .await
        .map_err(|err| {
            Error::new(ErrorKind::Io)
                .with_message("failed to bind server")
                .with_hint(format!("Is another process already using {}?", config.bind))
                .with_source(err)
        })?;
    tracing::info!(bind = %config.bind, "listening");

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
    let server = axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = shutdown_rx.await;
        })
        .into_future();
    tokio::pin!(server);

    tokio::select! {
        result = &mut server => {
            result.map_err(|err| {
                Error::new(ErrorKind::Io)
                    .with_message("server failed")
                    .with_source(err)
            })?;
        }
        _ = shutdown_signal() => {
            tracing::info!("shutting down");
            let _ = shutdown_tx.send(());
            match tokio::time::timeout(Duration::from_secs(10), &mut server).await {
                Ok(result) => result.map_err(|err| {
                    Error::new(ErrorKind::Io)
                        .with_message("server failed")
                        .with_source(err)
                })?,
                Err(_) => {
                    return Err(Error::new(ErrorKind::Io).with_message("server shutdown timed out"));
                }
            }
        }
    };
    Ok(())
}

fn router(state: Arc<AppState>, max_body_bytes: usize) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/healthz", get(healthz))
        .route("/libros", get(list_books))
        .route("/libros/agregar", get(add_book_form).post(add_book))
        .route("/usuarios", get(list_users))
        .route("/usuarios/agregar", get(add_user_form).post(add_user))
        .route("/prestamos", get(list_loans))
        .route("/prestamos/realizar", get(create_loan_form).post(create_loan))
        .route("/prestamos/devolver/:loan_id", get(close_loan))
        .route("/buscar", get(search_query).post(search_form))
        .route("/estadisticas", get(statistics))
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn is_loopback(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(addr) => addr.is_loopback(),
        IpAddr::V6(addr) => addr.is_loopback(),
    }
}

pub fn validate_config(config: &ServeConfig) -> Result<(), Error> {
    if !is_loopback(config.bind.ip()) && !config.allow_non_loopback {
        return Err(Error::new(ErrorKind::Usage)
            .with_message("non-loopback bind requires explicit opt-in")
            .with_hint("Re-run with --allow-non-loopback or use a loopback address."));
    }

    if config.loan_days == 0 {
        return Err(Error::new(ErrorKind::Usage)
            .with_message("--loan-days must be greater than zero")
            .with_hint("Use a positive value like 14."));
    }

    if config.loan_days > MAX_LOAN_DAYS {
        return Err(Error::new(ErrorKind::Usage)
            .with_message(format!("--loan-days must be at most {MAX_LOAN_DAYS}"))
            .with_hint("Due dates further out than that cannot be represented reliably."));
    }

    if config.max_body_bytes == 0 {
        return Err(Error::new(ErrorKind::Usage)
            .with_message("--max-body-bytes must be greater than zero")
            .with_hint("Use a positive value like 65536."));
    }

    if config.max_body_bytes > usize::MAX as u64 {
        return Err(Error::new(ErrorKind::Usage)
            .with_message("--max-body-bytes exceeds platform limits")
            .with_hint("Use a smaller value that fits in memory."));
    }

    Ok(())
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .try_init();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };
    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::warn!(error = %err, "SIGTERM handler unavailable");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(unix)]
    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    #[cfg(not(unix))]
    ctrl_c.await;
}

#[derive(Debug, Deserialize)]
struct AddBookRequest {
    title: String,
    author: String,
    year: i32,
}

#[derive(Debug, Deserialize)]
struct AddUserRequest {
    name: String,
    email: String,
}

#[derive(Debug, Deserialize)]
struct CreateLoanRequest {
    user_id: u64,
    book_id: u64,
}

#[derive(Debug, Deserialize)]
struct SearchRequest {
    term: String,
}

#[derive(Debug, Deserialize)]
struct SearchQuery {
    term: Option<String>,
}

async fn healthz(State(state): State<Arc<AppState>>) -> Response {
    let shared = match state.lock() {
        Ok(shared) => shared,
        Err(err) => return error_response(err),
    };
    let report = validate_library(&shared.library);
    if !report.is_ok() {
        tracing::error!(issues = report.issues.len(), "library state failed validation");
        return json_response_with_status(StatusCode::INTERNAL_SERVER_ERROR, report_json(&report));
    }
    json_response(report_json(&report))
}

async fn index(State(state): State<Arc<AppState>>) -> Response {
    let mut shared = match state.lock() {
        Ok(shared) => shared,
        Err(err) => return error_response(err),
    };
    let summary = summary_json(shared.library.summary());
    page_response(&mut shared, summary)
}

async fn list_books(State(state): State<Arc<AppState>>) -> Response {
    let mut shared = match state.lock() {
        Ok(shared) => shared,
        Err(err) => return error_response(err),
    };
    let catalog = shared.library.catalog();
    let books: Vec<Value> = catalog
        .books()
        .map(|(id, book)| book_json(id, book))
        .collect();
    let available: Vec<u64> = catalog.available_ids().iter().map(|id| id.0).collect();
    page_response(
        &mut shared,
        json!({ "books": books, "available_ids": available }),
    )
}

async fn add_book_form(State(state): State<Arc<AppState>>) -> Response {
    form_response(&state, &["title", "author", "year"])
}

async fn add_book(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<AddBookRequest>,
) -> Response {
    let mut shared = match state.lock() {
        Ok(shared) => shared,
        Err(err) => return error_response(err),
    };
    let id = shared
        .library
        .add_book(payload.title.clone(), payload.author, payload.year);
    tracing::info!(book = id.0, "book added");
    shared.notices.push(
        Notice::success("add_book", format!("book \"{}\" added", payload.title))
            .with_detail("book_id", id.0),
    );
    redirect_response("/libros")
}

async fn list_users(State(state): State<Arc<AppState>>) -> Response {
    let mut shared = match state.lock() {
        Ok(shared) => shared,
        Err(err) => return error_response(err),
    };
    let users: Vec<Value> = shared
        .library
        .members()
        .users()
        .map(|(id, user)| user_json(id, user))
        .collect();
    page_response(&mut shared, json!({ "users": users }))
}

async fn add_user_form(State(state): State<Arc<AppState>>) -> Response {
    form_response(&state, &["name", "email"])
}

async fn add_user(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<AddUserRequest>,
) -> Response {
    let mut shared = match state.lock() {
        Ok(shared) => shared,
        Err(err) => return error_response(err),
    };
    let id = shared
        .library
        .add_user(payload.name.clone(), payload.email);
    tracing::info!(user = id.0, "user added");
    shared.notices.push(
        Notice::success("add_user", format!("user \"{}\" added", payload.name))
            .with_detail("user_id", id.0),
    );
    redirect_response("/usuarios")
}

async fn list_loans(State(state): State<Arc<AppState>>) -> Response {
    let mut shared = match state.lock() {
        Ok(shared) => shared,
        Err(err) => return error_response(err),
    };
    let library = &shared.library;
    let loans: Vec<Value> = library
        .ledger()
        .loans()
        .map(|(id, loan)| loan_json(library, id, loan))
        .collect();
    page_response(&mut shared, json!({ "loans": loans }))
}

async fn create_loan_form(State(state): State<Arc<AppState>>) -> Response {
    let mut shared = match state.lock() {
        Ok(shared) => shared,
        Err(err) => return error_response(err),
    };
    let library = &shared.library;
    let books: Vec<Value> = library
        .catalog()
        .books()
        .filter(|(id, _)| library.catalog().is_available(*id))
        .map(|(id, book)| book_json(id, book))
        .collect();
    let users: Vec<Value> = library
        .members()
        .users()
        .map(|(id, user)| user_json(id, user))
        .collect();
    page_response(
        &mut shared,
        json!({ "fields": ["user_id", "book_id"], "books": books, "users": users }),
    )
}

async fn create_loan(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateLoanRequest>,
) -> Response {
    let mut shared = match state.lock() {
        Ok(shared) => shared,
        Err(err) => return error_response(err),
    };
    let user = UserId(payload.user_id);
    let book = BookId(payload.book_id);
    match shared.library.create_loan(user, book) {
        Ok(loan) => {
            tracing::info!(loan = loan.0, book = book.0, user = user.0, "loan created");
            shared.notices.push(
                Notice::success("create_loan", "loan created")
                    .with_detail("loan_id", loan.0)
                    .with_detail("book_id", book.0)
                    .with_detail("user_id", user.0),
            );
            redirect_response("/prestamos")
        }
        Err(err) if is_rejection(err.kind()) => {
            tracing::info!(book = book.0, user = user.0, kind = ?err.kind(), "loan refused");
            let mut notice = Notice::error("create_loan", error_message(&err))
                .with_detail("book_id", book.0)
                .with_detail("user_id", user.0);
            if let Some((held_by, loan)) = shared.library.ledger().loan_for_book(book) {
                notice = notice
                    .with_detail("active_loan_id", held_by.0)
                    .with_detail("held_by_user_id", loan.user.0);
            }
            shared.notices.push(notice);
            redirect_response("/prestamos/realizar")
        }
        Err(err) => error_response(err),
    }
}

async fn close_loan(
    State(state): State<Arc<AppState>>,
    AxumPath(loan_id): AxumPath<u64>,
) -> Response {
    let mut shared = match state.lock() {
        Ok(shared) => shared,
        Err(err) => return error_response(err),
    };
    match shared.library.close_loan(LoanId(loan_id)) {
        Ok(loan) => {
            tracing::info!(loan = loan_id, book = loan.book.0, "loan closed");
            shared.notices.push(
                Notice::success("close_loan", "book returned")
                    .with_detail("loan_id", loan_id)
                    .with_detail("book_id", loan.book.0),
            );
        }
        Err(err) if is_rejection(err.kind()) => {
            tracing::info!(loan = loan_id, "return refused: loan not found");
            shared.notices.push(
                Notice::error("close_loan", error_message(&err)).with_detail("loan_id", loan_id),
            );
        }
        Err(err) => return error_response(err),
    }
    redirect_response("/prestamos")
}

async fn search_query(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SearchQuery>,
) -> Response {
    search_page(&state, query.term.unwrap_or_default())
}

async fn search_form(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<SearchRequest>,
) -> Response {
    search_page(&state, payload.term)
}

fn search_page(state: &AppState, term: String) -> Response {
    let mut shared = match state.lock() {
        Ok(shared) => shared,
        Err(err) => return error_response(err),
    };
    let results: Vec<Value> = shared
        .library
        .search(&term)
        .iter()
        .map(search_hit_json)
        .collect();
    page_response(&mut shared, json!({ "term": term, "results": results }))
}

async fn statistics(State(state): State<Arc<AppState>>) -> Response {
    let mut shared = match state.lock() {
        Ok(shared) => shared,
        Err(err) => return error_response(err),
    };
    let stats = statistics_json(&shared.library.statistics());
    page_response(&mut shared, stats)
}

fn form_response(state: &AppState, fields: &[&str]) -> Response {
    let mut shared = match state.lock() {
        Ok(shared) => shared,
        Err(err) => return error_response(err),
    };
    page_response(&mut shared, json!({ "fields": fields }))
}

/// Rejections that end in a notice and a redirect instead of an error status.
fn is_rejection(kind: ErrorKind) -> bool {
    matches!(
        kind,
        ErrorKind::BookUnavailable | ErrorKind::LoanNotFound | ErrorKind::UserNotFound
    )
}

/// Page payload plus every pending notice, which is consumed here.
fn page_response(shared: &mut Shared, mut payload: Value) -> Response {
    let notices: Vec<Value> = shared.notices.drain().iter().map(notice_json).collect();
    if let Some(map) = payload.as_object_mut() {
        map.insert("notices".to_string(), Value::Array(notices));
    }
    json_response(payload)
}

fn redirect_response(target: &'static str) -> Response {
    let mut response = Redirect::to(target).into_response();
    response
        .headers_mut()
        .insert(API_HEADER, HeaderValue::from_static("0"));
    response
}

fn json_response(payload: Value) -> Response {
    json_response_with_status(StatusCode::OK, payload)
}

fn json_response_with_status(status: StatusCode, payload: Value) -> Response {
    let mut response = (status, Json(payload)).into_response();
    response
        .headers_mut()
        .insert(API_HEADER, HeaderValue::from_static("0"));
    response
}

fn error_response(err: Error) -> Response {
    let status = match err.kind() {
        ErrorKind::Usage => StatusCode::BAD_REQUEST,
        ErrorKind::NotFound | ErrorKind::LoanNotFound | ErrorKind::UserNotFound => {
            StatusCode::NOT_FOUND
        }
        ErrorKind::BookUnavailable => StatusCode::CONFLICT,
        ErrorKind::Io | ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    };
    json_response_with_status(status, error_json(&err))
}
