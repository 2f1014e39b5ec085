use crate::pool::{self, BatchReport};
use crate::synthesis::{CaseSynthesizer, CreatedCase};
use crate::types::CaseUpdate;
use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::warn;

/// Menu-level operations over the whole case set.
pub struct BulkOperations {
    synthesizer: Arc<CaseSynthesizer>,
    workers: usize,
}

impl BulkOperations {
    pub fn new(synthesizer: CaseSynthesizer, workers: usize) -> Self {
        Self {
            synthesizer: Arc::new(synthesizer),
            workers,
        }
    }

    pub async fn generate(&self, count: usize) -> BatchReport<CreatedCase> {
        println!("\nGenerating {count} new cases...");
        let synthesizer = Arc::clone(&self.synthesizer);
        let outcomes = pool::run_bounded(count, self.workers, move |case_num| {
            let synthesizer = Arc::clone(&synthesizer);
            async move { synthesizer.synthesize(case_num).await }
        })
        .await;

        let report: BatchReport<CreatedCase> = outcomes.into_iter().collect();
        for failure in &report.failures {
            println!("{failure}");
        }
        println!(
            "\n{} of {count} new cases generated successfully.",
            report.succeeded.len()
        );
        report
    }

    /// Sequentially regenerates subject, type and priority of every case.
    /// Fails only when the cases cannot be listed.
    pub async fn retag_all(&self) -> Result<BatchReport<CaseUpdate>> {
        println!("\nUpdating subjects, types, and priority for existing cases...\n");
        let cases = self
            .synthesizer
            .records()
            .cases_for_retag()
            .await
            .context("could not list cases to update")?;

        let mut report = BatchReport::empty();
        for case in &cases {
            let outcome = self.synthesizer.retag(case).await;
            if let Ok(update) = &outcome {
                println!(
                    "[Case # {}]\n Old subject: {}\n New subject: {}\n    Old Type: {}\n    New Type: {}\nOld Priority: {}\nNew Priority: {}\n",
                    case.id,
                    case.subject.as_deref().unwrap_or_default(),
                    update.subject,
                    case.category.as_deref().unwrap_or("-"),
                    update.category,
                    case.priority.as_deref().unwrap_or("-"),
                    update.priority
                );
            }
            report.record(outcome);
        }

        for failure in &report.failures {
            println!("Skipped {failure}");
        }
        println!(
            "Updated {} of {} cases.",
            report.succeeded.len(),
            report.total()
        );
        Ok(report)
    }

    /// Deletes every case one by one; a failed delete is reported and
    /// skipped. Fails only when the cases cannot be listed.
    pub async fn delete_all(&self) -> Result<BatchReport<String>> {
        println!("\nDeleting all support cases...");
        let records = self.synthesizer.records();
        let ids = records
            .all_case_ids()
            .await
            .context("could not list cases to delete")?;

        let mut report = BatchReport::empty();
        for id in ids {
            match records.delete(&id).await {
                Ok(()) => {
                    println!("Deleted case with ID: {id}");
                    report.record(Ok(id));
                }
                Err(err) => {
                    warn!(case_id = %id, "failed to delete case: {err}");
                    println!("Failed to delete case with ID: {id}");
                    report.record(Err(format!("case {id}: {err}")));
                }
            }
        }

        println!(
            "\nDeleted {} cases, {} failed.",
            report.succeeded.len(),
            report.failures.len()
        );
        Ok(report)
    }
}
