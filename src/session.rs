use crate::campaign::{self, SendPlan, SendReport};
use crate::cell::CellValue;
use crate::downloader::{self, Export, ExportError, ExportFormat};
use crate::evaluator;
use crate::filter::{Filter, FilterError, FilterId, FilterSet};
use crate::loader::{self, LoadError};
use crate::mailer::{EmailDispatcher, SmtpCredentials};
use crate::recipients::{self, RecipientPair, SenderContext};
use crate::table::Table;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Shown when a send is requested before anything can be sent.
pub const NOTHING_TO_SEND: &str = "⏳ Apply filters and click 'Send Emails' to start.";

#[derive(Debug, Error, PartialEq)]
pub enum SendRunError {
    #[error("{}", NOTHING_TO_SEND)]
    NothingToSend,

    #[error("{0} is required")]
    MissingField(&'static str),
}

/// The sender section and template of the send form.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SendRequest {
    pub sender_name: String,
    pub sender_email: String,
    pub sender_password: String,
    pub company_name: String,
    pub subject: String,
    pub template: String,
    pub pairs: [RecipientPair; 2],
}

impl SendRequest {
    fn check(&self) -> Result<(), SendRunError> {
        if self.sender_email.trim().is_empty() {
            return Err(SendRunError::MissingField("sender email"));
        }
        if self.sender_password.is_empty() {
            return Err(SendRunError::MissingField("app password"));
        }
        if self.template.trim().is_empty() {
            return Err(SendRunError::MissingField("email template"));
        }
        Ok(())
    }
}

/// State of one user's dashboard: the uploaded table, the filters being
/// built over it and the view produced by the last "apply".
///
/// Every operation goes through this object; nothing lives in globals.
#[derive(Debug, Default)]
pub struct Session {
    table: Option<Table>,
    file_name: Option<String>,
    filters: FilterSet,
    view: Option<Table>,
}

impl Session {
    pub fn new() -> Self {
        Session::default()
    }

    /// Decode an upload and make it the current table.
    ///
    /// Filters survive the upload but are re-derived from the new columns.
    /// A failed upload leaves the session with no table at all.
    pub fn load_upload(&mut self, file_name: &str, bytes: &[u8]) -> Result<&Table, LoadError> {
        self.view = None;
        match loader::load_upload(file_name, bytes) {
            Ok(table) => {
                self.filters.refresh(Some(&table));
                self.file_name = Some(file_name.to_string());
                Ok(&*self.table.insert(table))
            }
            Err(e) => {
                warn!("upload {} could not be read: {}", file_name, e);
                self.table = None;
                self.file_name = None;
                self.filters.refresh(None);
                Err(e)
            }
        }
    }

    pub fn table(&self) -> Option<&Table> {
        self.table.as_ref()
    }

    pub fn file_name(&self) -> Option<&str> {
        self.file_name.as_deref()
    }

    /// Header of the current table, empty when nothing is loaded.
    pub fn columns(&self) -> &[String] {
        self.table.as_ref().map(Table::columns).unwrap_or(&[])
    }

    pub fn filters(&self) -> &FilterSet {
        &self.filters
    }

    pub fn filter(&self, id: FilterId) -> Option<&Filter> {
        self.filters.get(id)
    }

    pub fn add_filter(&mut self) -> Option<FilterId> {
        self.filters.add(self.table.as_ref())
    }

    pub fn remove_filter(&mut self, id: FilterId) -> Option<Filter> {
        self.filters.remove(id)
    }

    pub fn set_filter_column(
        &mut self,
        id: FilterId,
        column: Option<&str>,
    ) -> Option<(&[CellValue], bool)> {
        self.filters.set_column(id, column, self.table.as_ref())
    }

    pub fn set_filter_value(
        &mut self,
        id: FilterId,
        value: Option<CellValue>,
    ) -> Result<(), FilterError> {
        self.filters.set_value(id, value)
    }

    /// Evaluate the filters and keep the result as the current view.
    pub fn apply_filters(&mut self) -> &Table {
        let view = evaluator::apply(self.table.as_ref(), &self.filters);
        info!("filtered view has {} rows", view.len());
        self.view.insert(view)
    }

    /// The view produced by the last [`Session::apply_filters`].
    pub fn view(&self) -> Option<&Table> {
        self.view.as_ref()
    }

    /// The current view as a file; `None` when there is nothing to download.
    pub fn download(&self, format: ExportFormat) -> Result<Option<Export>, ExportError> {
        match &self.view {
            Some(view) if !view.is_empty() => downloader::export_filtered(view, format).map(Some),
            _ => Ok(None),
        }
    }

    /// Mail every recipient found in the current view.
    ///
    /// Fails up front only when there is nothing to send or a required
    /// field is blank; per-recipient failures are in the report.
    pub fn send_emails(
        &self,
        request: &SendRequest,
        dispatcher: &dyn EmailDispatcher,
    ) -> Result<SendReport, SendRunError> {
        let (jobs, plan) = self.prepare_send(request)?;
        Ok(campaign::run(&jobs, &plan, dispatcher))
    }

    /// Build the jobs and plan for a send without dispatching anything, so
    /// the caller can run them elsewhere.
    pub fn prepare_send(
        &self,
        request: &SendRequest,
    ) -> Result<(Vec<recipients::SendJob>, SendPlan), SendRunError> {
        let view = match &self.view {
            Some(view) if !view.is_empty() => view,
            _ => return Err(SendRunError::NothingToSend),
        };
        request.check()?;

        let sender = SenderContext {
            sender_name: request.sender_name.clone(),
            company_name: request.company_name.clone(),
        };
        let jobs = recipients::build_jobs(view, &request.pairs, &sender);
        info!("prepared {} send jobs from {} rows", jobs.len(), view.len());

        let plan = SendPlan {
            credentials: SmtpCredentials {
                address: request.sender_email.trim().to_string(),
                secret: request.sender_password.clone(),
            },
            subject: request.subject.clone(),
            template: request.template.clone(),
        };
        Ok((jobs, plan))
    }
}
