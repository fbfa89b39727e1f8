use std::{collections::VecDeque, convert::Infallible, sync::Arc};

use axum::{
    extract::{Path, State},
    http::{header::COOKIE, HeaderMap, StatusCode},
    response::{
        sse::{Event, Sse},
        IntoResponse, Response,
    },
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use shared::{
    domain::{Book, BookId, BookStatus, GenerationConfig},
    protocol::GenerationRequest,
};
use tokio::{
    net::TcpListener,
    sync::{mpsc, Mutex},
};
use tokio_stream::{wrappers::UnboundedReceiverStream, StreamExt as _};

pub(crate) fn sample_config() -> GenerationConfig {
    GenerationConfig {
        title: "T".into(),
        description: "D".into(),
        genre: "G".into(),
        target_audience: "A".into(),
        style: "S".into(),
        tone: "N".into(),
        length: "L".into(),
    }
}

pub(crate) fn book_from(id: i64, config: &GenerationConfig, status: BookStatus) -> Book {
    Book {
        id: BookId(id),
        title: config.title.clone(),
        description: config.description.clone(),
        genre: config.genre.clone(),
        target_audience: config.target_audience.clone(),
        style: config.style.clone(),
        tone: config.tone.clone(),
        length: config.length.clone(),
        status,
        content: None,
        created_at: None,
        updated_at: None,
    }
}

/// In-process stand-in for the book service.
#[derive(Clone)]
pub(crate) struct MockService {
    pub(crate) requests: Arc<Mutex<Vec<String>>>,
    pub(crate) created: Arc<Mutex<Vec<GenerationConfig>>>,
    pub(crate) cookies: Arc<Mutex<Vec<Option<String>>>>,
    /// `Last-Event-ID` header of every `GET /events/{id}`.
    pub(crate) last_event_ids: Arc<Mutex<Vec<Option<String>>>>,
    next_id: i64,
    create_failure: Option<StatusCode>,
    generate_failure: Option<StatusCode>,
    status_failure: Option<StatusCode>,
    statuses: Arc<Mutex<VecDeque<BookStatus>>>,
    streams: Arc<Mutex<VecDeque<mpsc::UnboundedReceiver<Event>>>>,
}

impl MockService {
    pub(crate) fn new() -> Self {
        Self {
            requests: Arc::new(Mutex::new(Vec::new())),
            created: Arc::new(Mutex::new(Vec::new())),
            cookies: Arc::new(Mutex::new(Vec::new())),
            last_event_ids: Arc::new(Mutex::new(Vec::new())),
            next_id: 42,
            create_failure: None,
            generate_failure: None,
            status_failure: None,
            statuses: Arc::new(Mutex::new(VecDeque::from([BookStatus::Draft]))),
            streams: Arc::new(Mutex::new(VecDeque::new())),
        }
    }

    pub(crate) fn failing_create(mut self, status: StatusCode) -> Self {
        self.create_failure = Some(status);
        self
    }

    pub(crate) fn failing_generate(mut self, status: StatusCode) -> Self {
        self.generate_failure = Some(status);
        self
    }

    pub(crate) fn failing_status(mut self, status: StatusCode) -> Self {
        self.status_failure = Some(status);
        self
    }

    /// Statuses returned by successive status polls; the last one repeats.
    pub(crate) fn with_statuses(self, statuses: impl IntoIterator<Item = BookStatus>) -> Self {
        *self.statuses.try_lock().expect("statuses unlocked") = statuses.into_iter().collect();
        self
    }

    /// Queues an event stream; each `GET /events/{id}` consumes one. The
    /// stream ends when the returned sender is dropped.
    pub(crate) async fn push_stream(&self) -> mpsc::UnboundedSender<Event> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.streams.lock().await.push_back(rx);
        tx
    }

    pub(crate) async fn recorded(&self) -> Vec<String> {
        self.requests.lock().await.clone()
    }

    async fn record(&self, line: String) {
        self.requests.lock().await.push(line);
    }

    async fn record_cookie(&self, headers: &HeaderMap) {
        self.cookies.lock().await.push(header_text(headers, COOKIE.as_str()));
    }

    pub(crate) async fn spawn(self) -> String {
        std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        let app = Router::new()
            .route("/", get(service_info))
            .route("/books", post(create_book))
            .route("/books/:id/generate", post(generate_book))
            .route("/books/:id/status", get(book_status))
            .route("/events/:id", get(events))
            .route("/generate/", post(generate_content))
            .with_state(self);
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        format!("http://{addr}")
    }
}

fn header_text(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
}

fn failure(status: StatusCode) -> Response {
    (status, Json(json!({ "detail": "mock failure" }))).into_response()
}

async fn service_info(State(svc): State<MockService>) -> Response {
    svc.record("GET /".into()).await;
    Json(json!({
        "message": "Advanced Book Generator API is running",
        "version": "1.0.0",
        "features": ["Advanced AI Generation", "Quality Analysis"],
    }))
    .into_response()
}

async fn create_book(
    State(svc): State<MockService>,
    Json(config): Json<GenerationConfig>,
) -> Response {
    svc.record("POST /books".into()).await;
    if let Some(status) = svc.create_failure {
        return failure(status);
    }
    svc.created.lock().await.push(config.clone());
    Json(book_from(svc.next_id, &config, BookStatus::Draft)).into_response()
}

async fn generate_book(State(svc): State<MockService>, Path(id): Path<i64>) -> Response {
    svc.record(format!("POST /books/{id}/generate")).await;
    if let Some(status) = svc.generate_failure {
        return failure(status);
    }
    Json(json!({ "message": "Generation started" })).into_response()
}

async fn book_status(
    State(svc): State<MockService>,
    Path(id): Path<i64>,
    headers: HeaderMap,
) -> Response {
    svc.record(format!("GET /books/{id}/status")).await;
    svc.record_cookie(&headers).await;
    if let Some(status) = svc.status_failure {
        return failure(status);
    }
    let status = {
        let mut statuses = svc.statuses.lock().await;
        if statuses.len() > 1 {
            statuses.pop_front().unwrap_or(BookStatus::Draft)
        } else {
            statuses.front().copied().unwrap_or(BookStatus::Draft)
        }
    };
    Json(book_from(id, &sample_config(), status)).into_response()
}

async fn events(
    State(svc): State<MockService>,
    Path(id): Path<i64>,
    headers: HeaderMap,
) -> Response {
    svc.record(format!("GET /events/{id}")).await;
    svc.record_cookie(&headers).await;
    svc.last_event_ids
        .lock()
        .await
        .push(header_text(&headers, "last-event-id"));
    let Some(rx) = svc.streams.lock().await.pop_front() else {
        return StatusCode::NOT_FOUND.into_response();
    };
    let stream = UnboundedReceiverStream::new(rx).map(Ok::<_, Infallible>);
    Sse::new(stream).into_response()
}

async fn generate_content(
    State(svc): State<MockService>,
    Json(request): Json<GenerationRequest>,
) -> Response {
    svc.record("POST /generate/".into()).await;
    Json(json!({
        "content": { "title": request.config.title, "chapters": [] },
        "metadata": {
            "timestamp": "2024-01-01T00:00:00Z",
            "version": "2.0",
            "quality_metrics": { "overall": request.quality_threshold },
        },
    }))
    .into_response()
}
