use crate::mailer::{EmailDispatcher, Envelope, SmtpCredentials};
use crate::recipients::SendJob;
use crate::template;
use chrono::{DateTime, Utc};
use log::{info, warn};
use serde::Serialize;
use std::fmt;

/// Everything a run needs besides the jobs themselves.
#[derive(Debug, Clone)]
pub struct SendPlan {
    pub credentials: SmtpCredentials,
    pub subject: String,
    pub template: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", content = "reason", rename_all = "lowercase")]
pub enum SendOutcome {
    Sent,
    Failed(String),
}

/// What happened to one job.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SendResult {
    pub recipient_email: String,
    pub outcome: SendOutcome,
}

impl SendResult {
    pub fn is_sent(&self) -> bool {
        self.outcome == SendOutcome::Sent
    }
}

impl fmt::Display for SendResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.outcome {
            SendOutcome::Sent => write!(f, "✅ Email sent to {}", self.recipient_email),
            SendOutcome::Failed(reason) => write!(
                f,
                "❌ Failed to send email to {}: {}",
                self.recipient_email, reason
            ),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SendReport {
    pub results: Vec<SendResult>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl SendReport {
    pub fn sent(&self) -> usize {
        self.results.iter().filter(|r| r.is_sent()).count()
    }

    pub fn failed(&self) -> usize {
        self.results.len() - self.sent()
    }

    /// One status line per recipient, in send order.
    pub fn lines(&self) -> Vec<String> {
        self.results.iter().map(|r| r.to_string()).collect()
    }
}

/// Render and send every job in order, one at a time.
///
/// A render or dispatch failure is recorded against that recipient and the
/// run moves on to the next job.
pub fn run(jobs: &[SendJob], plan: &SendPlan, dispatcher: &dyn EmailDispatcher) -> SendReport {
    let started_at = Utc::now();
    let mut results = Vec::with_capacity(jobs.len());

    for job in jobs {
        let outcome = match template::render(&plan.template, &job.variables) {
            Err(e) => SendOutcome::Failed(e.to_string()),
            Ok(body) => {
                let envelope = Envelope {
                    from: plan.credentials.address.clone(),
                    to: job.recipient_email.clone(),
                    subject: plan.subject.clone(),
                    body,
                };
                match dispatcher.send(&plan.credentials, &envelope) {
                    Ok(()) => SendOutcome::Sent,
                    Err(e) => SendOutcome::Failed(e.to_string()),
                }
            }
        };

        if let SendOutcome::Failed(reason) = &outcome {
            warn!("email to {} failed: {}", job.recipient_email, reason);
        }
        results.push(SendResult {
            recipient_email: job.recipient_email.clone(),
            outcome,
        });
    }

    let report = SendReport {
        results,
        started_at,
        finished_at: Utc::now(),
    };
    info!(
        "send run finished: {} sent, {} failed",
        report.sent(),
        report.failed()
    );
    report
}
