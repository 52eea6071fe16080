//! Contract with the print pipeline.
//!
//! The kiosk only needs to hand a paid job over and ask how it is doing;
//! drivers, queues and page rendering live behind [`PrintSubmitter`].

#![allow(async_fn_in_trait)]

use crate::error::PaymentResult;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A paid print job ready for submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrintJobDescriptor {
    /// Id of the job in the kiosk's own records; written onto the ledger.
    pub job_id: i64,
    pub document: String,
    pub pages: u32,
    pub copies: u32,
    /// Price charged for the job.
    pub cost: Decimal,
    pub printer: Option<String>,
}

impl PrintJobDescriptor {
    pub fn new(job_id: i64, document: impl Into<String>, pages: u32, cost: Decimal) -> Self {
        Self {
            job_id,
            document: document.into(),
            pages,
            copies: 1,
            cost,
            printer: None,
        }
    }

    pub fn copies(mut self, copies: u32) -> Self {
        self.copies = copies;
        self
    }

    pub fn printer(mut self, printer: impl Into<String>) -> Self {
        self.printer = Some(printer.into());
        self
    }
}

/// Reference to a submitted job, issued by the print pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobHandle(String);

impl JobHandle {
    pub fn new(id: impl Into<String>) -> Self {
        JobHandle(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum PrintStatus {
    Queued,
    Printing,
    Completed,
    Failed(String),
    Cancelled,
}

impl PrintStatus {
    /// Whether the job will not change status again.
    pub fn is_finished(&self) -> bool {
        matches!(
            self,
            PrintStatus::Completed | PrintStatus::Failed(_) | PrintStatus::Cancelled
        )
    }
}

/// Print pipeline as seen from the payment flow.
pub trait PrintSubmitter: Send + Sync {
    /// Queue a job.
    ///
    /// # Errors
    ///
    /// `PaymentError::PrintSubmission` if the pipeline rejects the job.
    async fn submit(&self, job: &PrintJobDescriptor) -> PaymentResult<JobHandle>;

    async fn poll_status(&self, handle: &JobHandle) -> PaymentResult<PrintStatus>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(PrintStatus::Queued, false)]
    #[case(PrintStatus::Printing, false)]
    #[case(PrintStatus::Completed, true)]
    #[case(PrintStatus::Failed("paper jam".into()), true)]
    #[case(PrintStatus::Cancelled, true)]
    fn test_is_finished(#[case] status: PrintStatus, #[case] finished: bool) {
        assert_eq!(status.is_finished(), finished);
    }

    #[test]
    fn test_descriptor_builder() {
        let job = PrintJobDescriptor::new(12, "thesis.pdf", 40, Decimal::from(20))
            .copies(2)
            .printer("Lobby");

        assert_eq!(job.copies, 2);
        assert_eq!(job.printer.as_deref(), Some("Lobby"));
        assert_eq!(job.cost, Decimal::from(20));
    }
}
