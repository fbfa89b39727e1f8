use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use reqwest::{cookie::Jar, Client, Response};
use shared::{
    domain::{Book, BookId, GenerationConfig},
    error::ErrorBody,
    protocol::{GenerationRequest, GenerationResponse, ServiceInfo},
};
use tracing::{debug, error, info};
use url::Url;

pub mod error;
pub mod form;
pub mod progress;
pub mod reconnect;
pub mod sse;

pub use error::{ClientError, ClientResult, StreamError};
pub use form::{FormField, GenerateForm, SubmitOutcome};
pub use progress::{ConnectionState, Subscription};
pub use reconnect::ReconnectPolicy;

/// Request/response surface of the book service. The form controller and the
/// CLI only talk to the service through this trait.
#[async_trait]
pub trait BookApi: Send + Sync {
    async fn create_book(&self, config: &GenerationConfig) -> ClientResult<Book>;
    async fn generate_book(&self, id: BookId) -> ClientResult<()>;
    async fn get_book_status(&self, id: BookId) -> ClientResult<Book>;
}

/// HTTP client for one book service. All calls share a cookie store, so a
/// session established by any response (or seeded at construction) is sent
/// with every later request, including progress streams.
#[derive(Clone)]
pub struct GenerationClient {
    http: Client,
    base_url: String,
}

impl GenerationClient {
    pub fn new(base_url: &str) -> ClientResult<Self> {
        Self::with_session_cookie(base_url, None)
    }

    /// `session_cookie` is a `name=value` pair scoped to the base url's host.
    pub fn with_session_cookie(base_url: &str, session_cookie: Option<&str>) -> ClientResult<Self> {
        let (base_url, parsed) = normalize_base_url(base_url)?;

        let jar = Arc::new(Jar::default());
        if let Some(cookie) = session_cookie {
            jar.add_cookie_str(cookie, &parsed);
        }
        let http = Client::builder().cookie_provider(jar).build()?;

        Ok(Self { http, base_url })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    pub async fn service_info(&self) -> ClientResult<ServiceInfo> {
        let response = self.http.get(self.endpoint("/")).send().await?;
        let info = ensure_success(response).await?.json().await?;
        Ok(info)
    }

    /// One-shot generation that does not create a stored book.
    pub async fn generate_content(
        &self,
        request: &GenerationRequest,
    ) -> ClientResult<GenerationResponse> {
        request.validate()?;
        let result: ClientResult<GenerationResponse> = async {
            let response = self
                .http
                .post(self.endpoint("/generate/"))
                .json(request)
                .send()
                .await?;
            Ok(ensure_success(response).await?.json().await?)
        }
        .await;
        result.inspect_err(|err| error!(error = %err, "content generation request failed"))
    }
}

#[async_trait]
impl BookApi for GenerationClient {
    async fn create_book(&self, config: &GenerationConfig) -> ClientResult<Book> {
        let result: ClientResult<Book> = async {
            let response = self
                .http
                .post(self.endpoint("/books"))
                .json(config)
                .send()
                .await?;
            Ok(ensure_success(response).await?.json().await?)
        }
        .await;
        match &result {
            Ok(book) => info!(book_id = %book.id, status = %book.status, "book created"),
            Err(err) => error!(error = %err, "error creating book"),
        }
        result
    }

    async fn generate_book(&self, id: BookId) -> ClientResult<()> {
        let result: ClientResult<()> = async {
            let response = self
                .http
                .post(self.endpoint(&format!("/books/{id}/generate")))
                .send()
                .await?;
            ensure_success(response).await?;
            Ok(())
        }
        .await;
        match &result {
            Ok(()) => info!(book_id = %id, "book generation triggered"),
            Err(err) => error!(book_id = %id, error = %err, "error generating book"),
        }
        result
    }

    async fn get_book_status(&self, id: BookId) -> ClientResult<Book> {
        let result: ClientResult<Book> = async {
            let response = self
                .http
                .get(self.endpoint(&format!("/books/{id}/status")))
                .send()
                .await?;
            Ok(ensure_success(response).await?.json().await?)
        }
        .await;
        result.inspect_err(|err| error!(book_id = %id, error = %err, "error getting book status"))
    }
}

/// Polls `get_book_status` until the book is completed or failed. Request
/// failures end the wait immediately.
pub async fn wait_for_terminal_status(
    api: &dyn BookApi,
    id: BookId,
    interval: Duration,
) -> ClientResult<Book> {
    loop {
        let book = api.get_book_status(id).await?;
        if book.status.is_terminal() {
            return Ok(book);
        }
        debug!(book_id = %id, status = %book.status, "book not settled yet");
        tokio::time::sleep(interval).await;
    }
}

async fn ensure_success(response: Response) -> ClientResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message = match serde_json::from_str::<ErrorBody>(&body) {
        Ok(error_body) => error_body.detail_text(),
        Err(_) if !body.trim().is_empty() => body.trim().to_string(),
        Err(_) => status
            .canonical_reason()
            .unwrap_or("unexpected status")
            .to_string(),
    };
    Err(ClientError::request(Some(status.as_u16()), message))
}

fn normalize_base_url(raw: &str) -> ClientResult<(String, Url)> {
    let trimmed = raw.trim().trim_end_matches('/');
    let parsed = Url::parse(trimmed).map_err(|err| ClientError::InvalidBaseUrl {
        url: raw.to_string(),
        reason: err.to_string(),
    })?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(ClientError::InvalidBaseUrl {
            url: raw.to_string(),
            reason: "base url must start with http:// or https://".to_string(),
        });
    }
    Ok((trimmed.to_string(), parsed))
}

#[cfg(test)]
#[path = "tests/support.rs"]
mod test_support;

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
