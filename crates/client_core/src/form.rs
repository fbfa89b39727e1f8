//! Headless controller for the "generate new book" form.
//!
//! Holds the seven text inputs plus loading/error state and runs the
//! create-then-generate sequence. Rendering is left to the front end.

use shared::domain::{Book, BookId, GenerationConfig};
use tracing::error;

use crate::{error::ClientResult, BookApi, ClientError};

pub const GENERIC_FAILURE_MESSAGE: &str = "Failed to generate book. Please try again.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FormField {
    Title,
    Description,
    Genre,
    TargetAudience,
    Style,
    Tone,
    Length,
}

impl FormField {
    pub const ALL: [FormField; 7] = [
        FormField::Title,
        FormField::Description,
        FormField::Genre,
        FormField::TargetAudience,
        FormField::Style,
        FormField::Tone,
        FormField::Length,
    ];

    pub fn key(self) -> &'static str {
        match self {
            Self::Title => "title",
            Self::Description => "description",
            Self::Genre => "genre",
            Self::TargetAudience => "target_audience",
            Self::Style => "style",
            Self::Tone => "tone",
            Self::Length => "length",
        }
    }

    pub fn label(self) -> String {
        self.key().replace('_', " ")
    }

    pub fn placeholder(self) -> String {
        format!("Enter {}", self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Book created and generation triggered; go to the book's page.
    Navigate { book_id: BookId, route: String },
    Failed,
    /// Required inputs left empty; nothing was sent.
    Incomplete(Vec<FormField>),
    /// A submission is already in flight.
    Busy,
}

pub fn book_route(id: BookId) -> String {
    format!("/books/{id}")
}

#[derive(Debug, Default)]
pub struct GenerateForm {
    values: GenerationConfig,
    loading: bool,
    error: Option<String>,
    last_failure: Option<ClientError>,
}

impl GenerateForm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: GenerationConfig) -> Self {
        Self {
            values: config,
            ..Self::default()
        }
    }

    pub fn value(&self, field: FormField) -> &str {
        match field {
            FormField::Title => &self.values.title,
            FormField::Description => &self.values.description,
            FormField::Genre => &self.values.genre,
            FormField::TargetAudience => &self.values.target_audience,
            FormField::Style => &self.values.style,
            FormField::Tone => &self.values.tone,
            FormField::Length => &self.values.length,
        }
    }

    pub fn set(&mut self, field: FormField, value: impl Into<String>) {
        let slot = match field {
            FormField::Title => &mut self.values.title,
            FormField::Description => &mut self.values.description,
            FormField::Genre => &mut self.values.genre,
            FormField::TargetAudience => &mut self.values.target_audience,
            FormField::Style => &mut self.values.style,
            FormField::Tone => &mut self.values.tone,
            FormField::Length => &mut self.values.length,
        };
        *slot = value.into();
    }

    pub fn config(&self) -> &GenerationConfig {
        &self.values
    }

    pub fn missing_fields(&self) -> Vec<FormField> {
        FormField::ALL
            .into_iter()
            .filter(|field| self.value(*field).is_empty())
            .collect()
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn can_submit(&self) -> bool {
        !self.loading
    }

    /// Banner text shown above the form after a failed submission.
    pub fn error_banner(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Structured cause behind the banner, for front ends that want more
    /// than the generic message.
    pub fn last_failure(&self) -> Option<&ClientError> {
        self.last_failure.as_ref()
    }

    /// Validates the inputs and enters the loading state. Front ends that run
    /// the requests elsewhere pair this with [`finish_submit`](Self::finish_submit).
    pub fn begin_submit(&mut self) -> Result<GenerationConfig, SubmitOutcome> {
        if self.loading {
            return Err(SubmitOutcome::Busy);
        }
        let missing = self.missing_fields();
        if !missing.is_empty() {
            return Err(SubmitOutcome::Incomplete(missing));
        }
        self.loading = true;
        self.error = None;
        self.last_failure = None;
        Ok(self.values.clone())
    }

    pub fn finish_submit(&mut self, result: ClientResult<Book>) -> SubmitOutcome {
        self.loading = false;
        match result {
            Ok(book) => SubmitOutcome::Navigate {
                book_id: book.id,
                route: book_route(book.id),
            },
            Err(err) => {
                error!(error = %err, "error generating book");
                self.error = Some(GENERIC_FAILURE_MESSAGE.to_string());
                self.last_failure = Some(err);
                SubmitOutcome::Failed
            }
        }
    }

    pub async fn submit(&mut self, api: &dyn BookApi) -> SubmitOutcome {
        let config = match self.begin_submit() {
            Ok(config) => config,
            Err(outcome) => return outcome,
        };
        let result = create_and_generate(api, &config).await;
        self.finish_submit(result)
    }
}

/// Creates the book and triggers its generation, strictly in that order.
/// Returns the book as created; its status is not refreshed.
pub async fn create_and_generate(
    api: &dyn BookApi,
    config: &GenerationConfig,
) -> ClientResult<Book> {
    let book = api.create_book(config).await?;
    api.generate_book(book.id).await?;
    Ok(book)
}

#[cfg(test)]
#[path = "tests/form_tests.rs"]
mod tests;
