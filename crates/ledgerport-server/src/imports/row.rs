//! Imported statement rows
//!
//! Every mutator follows the same order: refuse terminal rows, refuse
//! targets outside the transition table, merge the supplied fields, then
//! move the status and stamp `status_at`. The first two checks run before
//! anything is written, so a refused call leaves the row untouched.

use chrono::{DateTime, NaiveDate, Utc};
use ledgerport_common::checksum::RowFingerprint;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::batch::truncate_chars;
use super::status::RowStatus;
use crate::error::{ImportError, ImportResult};

pub const DUPLICATE_ERROR_CODE: &str = "DUPLICATE";
pub const MAX_ERROR_CODE_LENGTH: usize = 64;
pub const MAX_ERROR_MESSAGE_LENGTH: usize = 2048;

/// One record as extracted by a statement parser, kept verbatim
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawImportRecord {
    pub line_number: i32,
    pub payload: serde_json::Value,
    #[serde(default)]
    pub date: Option<NaiveDate>,
    #[serde(default)]
    pub amount_text: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, rename = "type")]
    pub record_type: Option<String>,
    #[serde(default)]
    pub balance_text: Option<String>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub counterparty: Option<String>,
    #[serde(default)]
    pub reference: Option<String>,
    #[serde(default)]
    pub fit_id: Option<String>,
}

impl RawImportRecord {
    pub fn new(line_number: i32, payload: serde_json::Value) -> Self {
        Self {
            line_number,
            payload,
            date: None,
            amount_text: None,
            description: None,
            record_type: None,
            balance_text: None,
            currency: None,
            counterparty: None,
            reference: None,
            fit_id: None,
        }
    }

    /// Content-address digest over the salient raw fields
    pub fn content_hash(&self) -> String {
        let date = self.date.map(|d| d.format("%Y-%m-%d").to_string());
        RowFingerprint {
            line_number: self.line_number,
            raw_date: date.as_deref(),
            raw_amount_text: self.amount_text.as_deref(),
            raw_description: self.description.as_deref(),
            raw_type: self.record_type.as_deref(),
            raw_currency: self.currency.as_deref(),
            raw_counterparty: self.counterparty.as_deref(),
            raw_reference: self.reference.as_deref(),
            raw_fit_id: self.fit_id.as_deref(),
            payload: Some(&self.payload),
        }
        .digest()
    }

    fn validate(&self) -> ImportResult<()> {
        if self.line_number < 1 {
            return Err(ImportError::Validation(format!(
                "Raw line number must be at least 1, got {}",
                self.line_number
            )));
        }
        if let Some(currency) = &self.currency {
            validate_currency(currency)?;
        }
        let limits = [
            ("amount", self.amount_text.as_deref(), 128),
            ("description", self.description.as_deref(), 2048),
            ("type", self.record_type.as_deref(), 64),
            ("balance", self.balance_text.as_deref(), 128),
            ("counterparty", self.counterparty.as_deref(), 512),
            ("reference", self.reference.as_deref(), 256),
            ("FIT id", self.fit_id.as_deref(), 128),
        ];
        for (field, value, max) in limits {
            if exceeds(value, max) {
                return Err(ImportError::Validation(format!(
                    "Raw {} exceeds {} characters on line {}",
                    field, max, self.line_number
                )));
            }
        }
        Ok(())
    }
}

/// Fields produced progressively by parsing and normalization.
/// Absent or blank values never overwrite what is already stored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NormalizedFields {
    pub signed_minor: Option<i64>,
    pub currency: Option<String>,
    pub date: Option<NaiveDate>,
    pub payee: Option<String>,
    pub counterparty: Option<String>,
    pub memo: Option<String>,
    pub reference: Option<String>,
    pub external_id: Option<String>,
    pub suggested_category_id: Option<Uuid>,
    pub match_confidence: Option<f64>,
}

impl NormalizedFields {
    fn validate(&self) -> ImportResult<()> {
        if let Some(currency) = self.currency.as_deref().filter(|c| !c.trim().is_empty()) {
            validate_currency(currency)?;
        }
        if let Some(confidence) = self.match_confidence {
            validate_confidence(confidence)?;
        }
        let limits = [
            ("Payee", self.payee.as_deref(), 512),
            ("Counterparty", self.counterparty.as_deref(), 512),
            ("Memo", self.memo.as_deref(), 1024),
            ("Reference", self.reference.as_deref(), 256),
            ("External id", self.external_id.as_deref(), 128),
        ];
        for (field, value, max) in limits {
            if exceeds(value, max) {
                return Err(ImportError::Validation(format!("{} exceeds {} characters", field, max)));
            }
        }
        Ok(())
    }

    fn merge(&mut self, update: NormalizedFields) {
        coalesce(&mut self.signed_minor, update.signed_minor);
        coalesce_text(&mut self.currency, update.currency.map(|c| c.to_ascii_uppercase()));
        coalesce(&mut self.date, update.date);
        coalesce_text(&mut self.payee, update.payee);
        coalesce_text(&mut self.counterparty, update.counterparty);
        coalesce_text(&mut self.memo, update.memo);
        coalesce_text(&mut self.reference, update.reference);
        coalesce_text(&mut self.external_id, update.external_id);
        coalesce(&mut self.suggested_category_id, update.suggested_category_id);
        coalesce(&mut self.match_confidence, update.match_confidence);
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RowSnapshot {
    pub id: Uuid,
    pub batch_id: Uuid,
    pub raw: RawImportRecord,
    pub raw_hash: String,
    pub normalized: NormalizedFields,
    pub status: RowStatus,
    pub status_at: DateTime<Utc>,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
    pub error_log: Option<serde_json::Value>,
    pub duplicate_of_row_id: Option<Uuid>,
    pub imported_transaction_id: Option<Uuid>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImportRow {
    id: Uuid,
    batch_id: Uuid,
    raw: RawImportRecord,
    raw_hash: String,
    normalized: NormalizedFields,
    status: RowStatus,
    status_at: DateTime<Utc>,
    error_code: Option<String>,
    error_message: Option<String>,
    error_log: Option<serde_json::Value>,
    duplicate_of_row_id: Option<Uuid>,
    imported_transaction_id: Option<Uuid>,
}

impl ImportRow {
    /// Build an `Unprocessed` row and compute its content hash
    pub fn new(batch_id: Uuid, mut raw: RawImportRecord) -> ImportResult<Self> {
        raw.validate()?;
        raw.currency = raw.currency.map(|c| c.to_ascii_uppercase());
        let raw_hash = raw.content_hash();

        Ok(Self {
            id: Uuid::now_v7(),
            batch_id,
            raw,
            raw_hash,
            normalized: NormalizedFields::default(),
            status: RowStatus::Unprocessed,
            status_at: Utc::now(),
            error_code: None,
            error_message: None,
            error_log: None,
            duplicate_of_row_id: None,
            imported_transaction_id: None,
        })
    }

    pub fn restore(snapshot: RowSnapshot) -> Self {
        Self {
            id: snapshot.id,
            batch_id: snapshot.batch_id,
            raw: snapshot.raw,
            raw_hash: snapshot.raw_hash,
            normalized: snapshot.normalized,
            status: snapshot.status,
            status_at: snapshot.status_at,
            error_code: snapshot.error_code,
            error_message: snapshot.error_message,
            error_log: snapshot.error_log,
            duplicate_of_row_id: snapshot.duplicate_of_row_id,
            imported_transaction_id: snapshot.imported_transaction_id,
        }
    }

    pub fn snapshot(&self) -> RowSnapshot {
        RowSnapshot {
            id: self.id,
            batch_id: self.batch_id,
            raw: self.raw.clone(),
            raw_hash: self.raw_hash.clone(),
            normalized: self.normalized.clone(),
            status: self.status,
            status_at: self.status_at,
            error_code: self.error_code.clone(),
            error_message: self.error_message.clone(),
            error_log: self.error_log.clone(),
            duplicate_of_row_id: self.duplicate_of_row_id,
            imported_transaction_id: self.imported_transaction_id,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn batch_id(&self) -> Uuid {
        self.batch_id
    }

    pub fn raw(&self) -> &RawImportRecord {
        &self.raw
    }

    pub fn line_number(&self) -> i32 {
        self.raw.line_number
    }

    pub fn raw_hash(&self) -> &str {
        &self.raw_hash
    }

    pub fn normalized(&self) -> &NormalizedFields {
        &self.normalized
    }

    pub fn status(&self) -> RowStatus {
        self.status
    }

    pub fn status_at(&self) -> DateTime<Utc> {
        self.status_at
    }

    pub fn error_code(&self) -> Option<&str> {
        self.error_code.as_deref()
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    pub fn error_log(&self) -> Option<&serde_json::Value> {
        self.error_log.as_ref()
    }

    pub fn duplicate_of_row_id(&self) -> Option<Uuid> {
        self.duplicate_of_row_id
    }

    pub fn imported_transaction_id(&self) -> Option<Uuid> {
        self.imported_transaction_id
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn mark_parsed(&mut self, fields: NormalizedFields) -> ImportResult<()> {
        self.ensure_can_move_to(RowStatus::Parsed)?;
        fields.validate()?;
        self.normalized.merge(fields);
        self.move_to(RowStatus::Parsed);
        Ok(())
    }

    pub fn apply_normalization(&mut self, fields: NormalizedFields) -> ImportResult<()> {
        self.ensure_can_move_to(RowStatus::Normalized)?;
        fields.validate()?;
        self.normalized.merge(fields);
        self.move_to(RowStatus::Normalized);
        Ok(())
    }

    /// Point this row at the canonical row it repeats.
    /// Confidence defaults to 1.0.
    pub fn mark_duplicate(&mut self, canonical_row_id: Uuid, confidence: Option<f64>) -> ImportResult<()> {
        self.ensure_can_move_to(RowStatus::Duplicate)?;
        if canonical_row_id == self.id {
            return Err(ImportError::Validation(format!(
                "Import row {} cannot be a duplicate of itself",
                self.id
            )));
        }
        let confidence = confidence.unwrap_or(1.0);
        validate_confidence(confidence)?;

        self.duplicate_of_row_id = Some(canonical_row_id);
        self.normalized.match_confidence = Some(confidence);
        self.error_code
            .get_or_insert_with(|| DUPLICATE_ERROR_CODE.to_string());
        self.move_to(RowStatus::Duplicate);
        Ok(())
    }

    pub fn mark_rejected(
        &mut self,
        error_code: Option<String>,
        error_message: Option<String>,
        error_log: Option<serde_json::Value>,
    ) -> ImportResult<()> {
        self.ensure_can_move_to(RowStatus::Rejected)?;
        if error_code.as_ref().is_some_and(|c| c.chars().count() > MAX_ERROR_CODE_LENGTH) {
            return Err(ImportError::Validation(format!(
                "Error code exceeds {} characters",
                MAX_ERROR_CODE_LENGTH
            )));
        }

        coalesce_text(&mut self.error_code, error_code);
        coalesce_text(
            &mut self.error_message,
            error_message.map(|m| truncate_chars(m, MAX_ERROR_MESSAGE_LENGTH)),
        );
        coalesce(&mut self.error_log, error_log.filter(|log| !log.is_null()));
        self.move_to(RowStatus::Rejected);
        Ok(())
    }

    pub fn mark_skipped(&mut self, reason: Option<String>) -> ImportResult<()> {
        self.ensure_can_move_to(RowStatus::Skipped)?;
        coalesce_text(
            &mut self.error_message,
            reason.map(|r| truncate_chars(r, MAX_ERROR_MESSAGE_LENGTH)),
        );
        self.move_to(RowStatus::Skipped);
        Ok(())
    }

    /// Link the row to the ledger transaction created from it
    pub fn mark_imported(&mut self, transaction_id: Uuid) -> ImportResult<()> {
        self.ensure_can_move_to(RowStatus::Imported)?;
        self.imported_transaction_id = Some(transaction_id);
        self.move_to(RowStatus::Imported);
        Ok(())
    }

    fn ensure_can_move_to(&self, next: RowStatus) -> ImportResult<()> {
        if self.status.is_terminal() {
            return Err(ImportError::TerminalMutation {
                entity: "import row",
                id: self.id,
                status: self.status.as_str(),
            });
        }
        if !self.status.can_transition_to(next) {
            return Err(ImportError::IllegalTransition {
                entity: "import row",
                id: self.id,
                from: self.status.as_str(),
                to: next.as_str(),
            });
        }
        Ok(())
    }

    fn move_to(&mut self, next: RowStatus) {
        self.status = next;
        self.status_at = Utc::now();
    }
}

fn coalesce<T>(slot: &mut Option<T>, value: Option<T>) {
    if let Some(value) = value {
        *slot = Some(value);
    }
}

fn coalesce_text(slot: &mut Option<String>, value: Option<String>) {
    coalesce(slot, value.filter(|v| !v.trim().is_empty()));
}

fn exceeds(value: Option<&str>, max_chars: usize) -> bool {
    value.is_some_and(|v| v.chars().count() > max_chars)
}

fn validate_currency(currency: &str) -> ImportResult<()> {
    if currency.len() != 3 || !currency.bytes().all(|b| b.is_ascii_alphabetic()) {
        return Err(ImportError::Validation(format!(
            "Currency must be a 3-letter code, got '{}'",
            currency
        )));
    }
    Ok(())
}

fn validate_confidence(confidence: f64) -> ImportResult<()> {
    if !(0.0..=1.0).contains(&confidence) {
        return Err(ImportError::Validation(format!(
            "Match confidence must be between 0 and 1, got {}",
            confidence
        )));
    }
    Ok(())
}
