use axum::{
    Json, Router,
    extract::{Multipart, Path, Query, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::{delete, get, post, put},
};
use log::info;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::config::Settings;
use crate::dialogs::{FixedAnswer, Notice, NoticeBuffer};
use crate::error::{ErrorKind, Result, SheetError};
use crate::mailer::MailDraft;
use crate::mutation::Outcome;
use crate::query::RowRef;
use crate::record::{DatasetSummary, Record};
use crate::session::Session;
use crate::storage::FileStore;
use crate::store::{RecordStore, Upserted};

pub type WebSession = Session<FileStore, NoticeBuffer>;

pub struct AppState {
    session: Mutex<WebSession>,
}

impl AppState {
    pub fn new(session: WebSession) -> Arc<Self> {
        Arc::new(AppState {
            session: Mutex::new(session),
        })
    }

    fn lock(&self) -> MutexGuard<'_, WebSession> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Envelope of every API response: the payload or an error message, plus the
/// notices raised while handling the request.
#[derive(Serialize)]
struct ApiResponse<T> {
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
    notices: Vec<Notice>,
}

#[derive(Serialize)]
struct DatasetList {
    datasets: Vec<DatasetSummary>,
    active: Option<String>,
}

#[derive(Serialize)]
struct UploadBody {
    name: String,
    replaced: bool,
}

#[derive(Serialize)]
struct OutcomeBody {
    applied: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    removed: Option<usize>,
}

impl From<Outcome> for OutcomeBody {
    fn from(outcome: Outcome) -> Self {
        OutcomeBody {
            applied: outcome.is_applied(),
            removed: None,
        }
    }
}

impl From<Outcome<usize>> for OutcomeBody {
    fn from(outcome: Outcome<usize>) -> Self {
        match outcome {
            Outcome::Applied(count) => OutcomeBody {
                applied: true,
                removed: Some(count),
            },
            Outcome::Cancelled => OutcomeBody {
                applied: false,
                removed: None,
            },
        }
    }
}

#[derive(Serialize)]
struct RowBody {
    row: RowRef,
    record: Record,
}

#[derive(Serialize)]
struct PageBody {
    dataset: Option<String>,
    headers: Vec<String>,
    rows: Vec<RowBody>,
    page: usize,
    page_size: usize,
    total_pages: usize,
    total_matches: usize,
}

#[derive(Deserialize)]
struct ConfirmQuery {
    #[serde(default)]
    confirmed: bool,
}

#[derive(Deserialize)]
struct RowsQuery {
    filter: Option<String>,
    sort: Option<String>,
    page: Option<usize>,
    page_size: Option<usize>,
}

#[derive(Deserialize)]
struct EditRequest {
    record: Record,
    #[serde(default)]
    confirmed: bool,
}

fn status_for(err: &SheetError) -> StatusCode {
    match err.kind() {
        ErrorKind::Parse => StatusCode::UNPROCESSABLE_ENTITY,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::Validation => StatusCode::BAD_REQUEST,
        ErrorKind::Persistence | ErrorKind::Export => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Turn a result into a JSON response carrying the notices queued so far.
fn reply<T: Serialize>(session: &mut WebSession, result: Result<T>) -> Response {
    let notices = session.notifier_mut().drain();
    match result {
        Ok(data) => Json(ApiResponse {
            status: "ok",
            data: Some(data),
            message: None,
            notices,
        })
        .into_response(),
        Err(err) => (
            status_for(&err),
            Json(ApiResponse::<()> {
                status: "error",
                data: None,
                message: Some(err.to_string()),
                notices,
            }),
        )
            .into_response(),
    }
}

pub fn router(state: Arc<AppState>, settings: &Settings) -> Router {
    Router::new()
        .route("/api/datasets", get(list_datasets).post(upload_dataset))
        .route("/api/datasets/:name", delete(delete_dataset))
        .route("/api/datasets/:name/select", post(select_dataset))
        .route("/api/datasets/:name/export", get(export_dataset))
        .route("/api/rows", get(get_rows))
        .route("/api/rows/:index", put(edit_row).delete(delete_member))
        .route("/api/rows/:index/mail", get(compose_mail))
        .route("/api/mail", post(submit_mail))
        .fallback_service(ServeDir::new(&settings.static_dir))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

pub async fn run(settings: Settings) -> std::result::Result<(), Box<dyn std::error::Error>> {
    let store = RecordStore::open_with_key(
        FileStore::new(&settings.data_dir),
        settings.storage_key.clone(),
    )?;
    let session = Session::new(store, NoticeBuffer::new()).with_page_size(settings.page_size);
    let app = router(AppState::new(session), &settings);

    let listener = TcpListener::bind(&settings.bind_addr).await?;
    info!(
        "serving {} on http://{}",
        settings.data_dir.display(),
        settings.bind_addr
    );
    axum::serve(listener, app).await?;

    Ok(())
}

async fn list_datasets(State(state): State<Arc<AppState>>) -> Response {
    let mut session = state.lock();
    let body = DatasetList {
        datasets: session.datasets(),
        active: session.active_name().map(str::to_string),
    };
    reply(&mut session, Ok(body))
}

async fn upload_dataset(State(state): State<Arc<AppState>>, mut multipart: Multipart) -> Response {
    let mut upload = None;
    loop {
        match multipart.next_field().await {
            Ok(Some(field)) if field.name() == Some("file") => {
                let file_name = field.file_name().unwrap_or("upload.xlsx").to_string();
                match field.bytes().await {
                    Ok(bytes) => upload = Some((file_name, bytes)),
                    Err(e) => return (StatusCode::BAD_REQUEST, e.to_string()).into_response(),
                }
            }
            Ok(Some(_)) => {}
            Ok(None) => break,
            Err(e) => return (StatusCode::BAD_REQUEST, e.to_string()).into_response(),
        }
    }

    let mut session = state.lock();
    let result = match upload {
        Some((file_name, bytes)) => session
            .upload(&bytes, &file_name)
            .map(|outcome| UploadBody {
                name: file_name,
                replaced: outcome == Upserted::Replaced,
            }),
        None => Err(SheetError::validation("no file field in the upload")),
    };
    reply(&mut session, result)
}

async fn select_dataset(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Response {
    let mut session = state.lock();
    let result = session.select(&name);
    reply(&mut session, result)
}

async fn delete_dataset(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    Query(query): Query<ConfirmQuery>,
) -> Response {
    let mut session = state.lock();
    let result = session
        .delete_dataset(&name, &mut FixedAnswer(query.confirmed))
        .map(OutcomeBody::from);
    reply(&mut session, result)
}

async fn export_dataset(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Response {
    let mut session = state.lock();
    match session.export(&name) {
        Ok(file) => {
            session.notifier_mut().drain();
            let disposition = format!(
                "attachment; filename=\"{}\"",
                file.file_name.replace('"', "")
            );
            (
                [
                    (header::CONTENT_TYPE, file.content_type.to_string()),
                    (header::CONTENT_DISPOSITION, disposition),
                ],
                file.bytes,
            )
                .into_response()
        }
        Err(err) => reply::<()>(&mut session, Err(err)),
    }
}

async fn get_rows(State(state): State<Arc<AppState>>, Query(query): Query<RowsQuery>) -> Response {
    let mut session = state.lock();
    let result = apply_rows_query(&mut session, query).map(|()| page_body(&mut session));
    reply(&mut session, result)
}

fn apply_rows_query(session: &mut WebSession, query: RowsQuery) -> Result<()> {
    if let Some(filter) = query.filter {
        session.set_filter(filter);
    }
    if let Some(sort) = query.sort {
        session.set_sort_token(&sort)?;
    }
    if let Some(page_size) = query.page_size {
        session.set_page_size(page_size)?;
    }
    if let Some(page) = query.page {
        session.go_to_page(page);
    }
    Ok(())
}

fn page_body(session: &mut WebSession) -> PageBody {
    let dataset = session.active_name().map(str::to_string);
    let headers = session.headers().to_vec();
    let page = session.current_page();
    PageBody {
        dataset,
        headers,
        rows: page
            .rows
            .iter()
            .map(|r| RowBody {
                row: r.row,
                record: r.record.clone(),
            })
            .collect(),
        page: page.page,
        page_size: page.page_size,
        total_pages: page.total_pages,
        total_matches: page.total_matches,
    }
}

/// The browser sends the whole edited row at once, so the modal is opened,
/// filled and saved inside one request and always left closed.
async fn edit_row(
    State(state): State<Arc<AppState>>,
    Path(index): Path<usize>,
    Json(request): Json<EditRequest>,
) -> Response {
    let mut session = state.lock();
    session.cancel_edit();
    let result = fill_and_save(&mut session, RowRef(index), request).map(OutcomeBody::from);
    session.cancel_edit();
    reply(&mut session, result)
}

fn fill_and_save(session: &mut WebSession, row: RowRef, request: EditRequest) -> Result<Outcome> {
    session.begin_edit(row)?;
    // keys outside the headers are dropped, as `edit_row` does
    let headers = session.headers().to_vec();
    for (header, value) in request.record.iter() {
        if headers.contains(header) {
            session.set_field(header, value.clone())?;
        }
    }
    session.save_edit(&mut FixedAnswer(request.confirmed))
}

async fn delete_member(
    State(state): State<Arc<AppState>>,
    Path(index): Path<usize>,
    Query(query): Query<ConfirmQuery>,
) -> Response {
    let mut session = state.lock();
    let result = session
        .delete_member(RowRef(index), &mut FixedAnswer(query.confirmed))
        .map(OutcomeBody::from);
    reply(&mut session, result)
}

async fn compose_mail(State(state): State<Arc<AppState>>, Path(index): Path<usize>) -> Response {
    let mut session = state.lock();
    let result = session.compose_mail(RowRef(index));
    reply(&mut session, result)
}

async fn submit_mail(State(state): State<Arc<AppState>>, Json(draft): Json<MailDraft>) -> Response {
    let mut session = state.lock();
    let html = session.submit_mail(&draft);
    reply(&mut session, Ok(html))
}
