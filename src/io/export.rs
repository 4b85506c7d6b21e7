use anyhow::{Context, Result};
use chrono::SecondsFormat;
use std::io::Write;

use crate::application::TransactionService;
use crate::domain::Transaction;

use super::TransactionEvent;

/// Rows fetched per page while walking the ledger
const EXPORT_PAGE_SIZE: u32 = 500;

/// Output format for `export transactions`
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ExportFormat {
    Csv,
    Json,
}

/// Exporter for writing the ledger to CSV or JSON
pub struct Exporter<'a> {
    service: &'a TransactionService,
}

impl<'a> Exporter<'a> {
    pub fn new(service: &'a TransactionService) -> Self {
        Self { service }
    }

    pub async fn export_transactions<W: Write>(
        &self,
        format: ExportFormat,
        writer: W,
    ) -> Result<usize> {
        let transactions = self.all_transactions().await?;
        match format {
            ExportFormat::Csv => write_csv(&transactions, writer),
            ExportFormat::Json => write_json(&transactions, writer),
        }
    }

    /// Oldest first, one page at a time.
    async fn all_transactions(&self) -> Result<Vec<Transaction>> {
        let mut all = Vec::new();
        let mut page = 1;
        loop {
            let batch = self
                .service
                .find_all(page, EXPORT_PAGE_SIZE, "created_at asc")
                .await
                .with_context(|| format!("Failed to read transactions page {}", page))?;
            let fetched = batch.items.len();
            all.extend(batch.items);
            if fetched < EXPORT_PAGE_SIZE as usize || all.len() as u64 >= batch.total {
                break;
            }
            page += 1;
        }
        Ok(all)
    }
}

fn write_csv<W: Write>(transactions: &[Transaction], writer: W) -> Result<usize> {
    let mut csv_writer = csv::Writer::from_writer(writer);

    csv_writer.write_record([
        "id",
        "type",
        "status",
        "amount_cents",
        "currency",
        "account_from",
        "destination",
        "external_reference",
        "created_at",
        "updated_at",
    ])?;

    for tx in transactions {
        csv_writer.write_record([
            tx.id.to_string(),
            tx.kind().to_string(),
            tx.status.to_string(),
            tx.amount.to_string(),
            tx.currency.clone(),
            tx.source_account_id.to_string(),
            tx.destination.id().to_string(),
            tx.external_reference.clone().unwrap_or_default(),
            tx.created_at.to_rfc3339_opts(SecondsFormat::Secs, true),
            tx.updated_at.to_rfc3339_opts(SecondsFormat::Secs, true),
        ])?;
    }

    csv_writer.flush()?;
    Ok(transactions.len())
}

fn write_json<W: Write>(transactions: &[Transaction], mut writer: W) -> Result<usize> {
    let events = transactions
        .iter()
        .map(TransactionEvent::from_transaction)
        .collect::<Result<Vec<_>, _>>()?;

    let json = serde_json::to_string_pretty(&events)?;
    writer.write_all(json.as_bytes())?;
    writer.write_all(b"\n")?;
    writer.flush()?;
    Ok(events.len())
}
