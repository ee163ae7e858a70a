//! PostgreSQL implementation of [`ImportRepository`].
//!
//! Batch updates are guarded by the `version` column: every write must name
//! the version it read and bumps it by one. File integrity columns can only
//! be written while `sha256` is still NULL, and terminal rows are excluded
//! from updates at the SQL level as well as in the domain types.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde_json::Value as JsonValue;
use sqlx::PgPool;
use std::collections::BTreeMap;
use uuid::Uuid;

use super::{check_constraint_violation, ConstraintViolation, DbError, DbResult};
use crate::imports::{
    BatchSnapshot, BatchStatus, BatchTimeline, FileSnapshot, ImportBatch, ImportFile,
    ImportRepository, ImportRow, NormalizedFields, RawImportRecord, RowSnapshot, RowStatus,
};

// ============================================================================
// Records
// ============================================================================

#[derive(Debug, sqlx::FromRow)]
struct BatchRecord {
    id: Uuid,
    account_id: Uuid,
    status: String,
    retry_count: i32,
    error: Option<String>,
    version: i64,
    imported_at: DateTime<Utc>,
    uploaded_at: Option<DateTime<Utc>>,
    queued_at: Option<DateTime<Utc>>,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    failed_at: Option<DateTime<Utc>>,
    canceled_at: Option<DateTime<Utc>>,
    duplicate_at: Option<DateTime<Utc>>,
    superseded_at: Option<DateTime<Utc>>,
}

impl TryFrom<BatchRecord> for ImportBatch {
    type Error = DbError;

    fn try_from(record: BatchRecord) -> DbResult<Self> {
        let status: BatchStatus = record
            .status
            .parse()
            .map_err(|e| DbError::Decode(format!("import batch {}: {}", record.id, e)))?;

        Ok(ImportBatch::restore(BatchSnapshot {
            id: record.id,
            account_id: record.account_id,
            status,
            retry_count: record.retry_count,
            error: record.error,
            version: record.version,
            timeline: BatchTimeline {
                imported_at: record.imported_at,
                uploaded_at: record.uploaded_at,
                queued_at: record.queued_at,
                started_at: record.started_at,
                completed_at: record.completed_at,
                failed_at: record.failed_at,
                canceled_at: record.canceled_at,
                duplicate_at: record.duplicate_at,
                superseded_at: record.superseded_at,
            },
        }))
    }
}

#[derive(Debug, sqlx::FromRow)]
struct FileRecord {
    id: Uuid,
    batch_id: Uuid,
    original_file_name: String,
    base_name: String,
    extension: Option<String>,
    content_type: String,
    container: String,
    object_key: String,
    expected_size_bytes: i64,
    size_bytes: i64,
    sha256: Option<String>,
    confirmed_at: Option<DateTime<Utc>>,
}

impl From<FileRecord> for ImportFile {
    fn from(record: FileRecord) -> Self {
        ImportFile::restore(FileSnapshot {
            id: record.id,
            batch_id: record.batch_id,
            original_file_name: record.original_file_name,
            base_name: record.base_name,
            extension: record.extension,
            content_type: record.content_type,
            container: record.container,
            object_key: record.object_key,
            expected_size_bytes: record.expected_size_bytes,
            size_bytes: record.size_bytes,
            sha256: record.sha256,
            confirmed_at: record.confirmed_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct RowRecord {
    id: Uuid,
    batch_id: Uuid,
    raw_line_number: i32,
    raw_record: JsonValue,
    raw_date: Option<NaiveDate>,
    raw_amount_text: Option<String>,
    raw_description: Option<String>,
    raw_type: Option<String>,
    raw_balance_text: Option<String>,
    raw_currency: Option<String>,
    raw_counterparty: Option<String>,
    raw_reference: Option<String>,
    raw_fit_id: Option<String>,
    raw_hash: String,
    signed_minor: Option<i64>,
    currency: Option<String>,
    normalized_date: Option<NaiveDate>,
    payee: Option<String>,
    counterparty: Option<String>,
    memo: Option<String>,
    reference: Option<String>,
    external_id: Option<String>,
    suggested_category_id: Option<Uuid>,
    match_confidence: Option<f64>,
    status: String,
    status_at: DateTime<Utc>,
    error_code: Option<String>,
    error_message: Option<String>,
    error_log: Option<JsonValue>,
    duplicate_of_row_id: Option<Uuid>,
    imported_transaction_id: Option<Uuid>,
}

impl TryFrom<RowRecord> for ImportRow {
    type Error = DbError;

    fn try_from(record: RowRecord) -> DbResult<Self> {
        let status: RowStatus = record
            .status
            .parse()
            .map_err(|e| DbError::Decode(format!("import row {}: {}", record.id, e)))?;

        Ok(ImportRow::restore(RowSnapshot {
            id: record.id,
            batch_id: record.batch_id,
            raw: RawImportRecord {
                line_number: record.raw_line_number,
                payload: record.raw_record,
                date: record.raw_date,
                amount_text: record.raw_amount_text,
                description: record.raw_description,
                record_type: record.raw_type,
                balance_text: record.raw_balance_text,
                currency: record.raw_currency,
                counterparty: record.raw_counterparty,
                reference: record.raw_reference,
                fit_id: record.raw_fit_id,
            },
            raw_hash: record.raw_hash,
            normalized: NormalizedFields {
                signed_minor: record.signed_minor,
                currency: record.currency,
                date: record.normalized_date,
                payee: record.payee,
                counterparty: record.counterparty,
                memo: record.memo,
                reference: record.reference,
                external_id: record.external_id,
                suggested_category_id: record.suggested_category_id,
                match_confidence: record.match_confidence,
            },
            status,
            status_at: record.status_at,
            error_code: record.error_code,
            error_message: record.error_message,
            error_log: record.error_log,
            duplicate_of_row_id: record.duplicate_of_row_id,
            imported_transaction_id: record.imported_transaction_id,
        }))
    }
}

const BATCH_COLUMNS: &str = r#"
    id, account_id, status, retry_count, error, version,
    imported_at, uploaded_at, queued_at, started_at, completed_at,
    failed_at, canceled_at, duplicate_at, superseded_at
"#;

const FILE_COLUMNS: &str = r#"
    id, batch_id, original_file_name, base_name, extension, content_type,
    container, object_key, expected_size_bytes, size_bytes, sha256, confirmed_at
"#;

const ROW_COLUMNS: &str = r#"
    id, batch_id, raw_line_number, raw_record, raw_date, raw_amount_text,
    raw_description, raw_type, raw_balance_text, raw_currency, raw_counterparty,
    raw_reference, raw_fit_id, raw_hash, signed_minor, currency, normalized_date,
    payee, counterparty, memo, reference, external_id, suggested_category_id,
    match_confidence, status, status_at, error_code, error_message, error_log,
    duplicate_of_row_id, imported_transaction_id
"#;

// ============================================================================
// Repository
// ============================================================================

#[derive(Clone)]
pub struct PgImportRepository {
    pool: PgPool,
}

impl PgImportRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn version_conflict(batch: &ImportBatch) -> DbError {
        DbError::Conflict(format!(
            "Import batch {} was modified concurrently (expected version {}).",
            batch.id(),
            batch.version()
        ))
    }
}

/// CAS update of every mutable batch column. Timestamps are first-write-wins
/// in the store as well, so a stale in-memory stamp never overwrites one.
async fn update_batch_in<'e, E>(executor: E, batch: &ImportBatch) -> DbResult<Option<i64>>
where
    E: sqlx::PgExecutor<'e>,
{
    let snapshot = batch.snapshot();
    let timeline = &snapshot.timeline;

    let version = sqlx::query_scalar::<_, i64>(
        r#"
        UPDATE import_batches
        SET status = $3,
            retry_count = $4,
            error = $5,
            uploaded_at = COALESCE(uploaded_at, $6),
            queued_at = COALESCE(queued_at, $7),
            started_at = COALESCE(started_at, $8),
            completed_at = COALESCE(completed_at, $9),
            failed_at = COALESCE(failed_at, $10),
            canceled_at = COALESCE(canceled_at, $11),
            duplicate_at = COALESCE(duplicate_at, $12),
            superseded_at = COALESCE(superseded_at, $13),
            version = version + 1,
            updated_at = NOW()
        WHERE id = $1 AND version = $2
        RETURNING version
        "#,
    )
    .bind(snapshot.id)
    .bind(snapshot.version)
    .bind(snapshot.status.as_str())
    .bind(snapshot.retry_count)
    .bind(&snapshot.error)
    .bind(timeline.uploaded_at)
    .bind(timeline.queued_at)
    .bind(timeline.started_at)
    .bind(timeline.completed_at)
    .bind(timeline.failed_at)
    .bind(timeline.canceled_at)
    .bind(timeline.duplicate_at)
    .bind(timeline.superseded_at)
    .fetch_optional(executor)
    .await?;

    Ok(version)
}

#[async_trait]
impl ImportRepository for PgImportRepository {
    async fn account_exists(&self, account_id: Uuid) -> DbResult<bool> {
        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM accounts WHERE id = $1)",
        )
        .bind(account_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(exists)
    }

    async fn insert_batch(&self, batch: &ImportBatch, file: &ImportFile) -> DbResult<()> {
        let batch = batch.snapshot();
        let file = file.snapshot();
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO import_batches (
                id, account_id, status, retry_count, error, version, imported_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(batch.id)
        .bind(batch.account_id)
        .bind(batch.status.as_str())
        .bind(batch.retry_count)
        .bind(&batch.error)
        .bind(batch.version)
        .bind(batch.timeline.imported_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| match check_constraint_violation(e) {
            ConstraintViolation::ForeignKey(_) => DbError::NotFound(format!(
                "Account with ID {} was not found.",
                batch.account_id
            )),
            ConstraintViolation::Unique(_) => DbError::duplicate("Import batch", &batch.id.to_string()),
            ConstraintViolation::Other(e) => DbError::Sqlx(e),
        })?;

        sqlx::query(
            r#"
            INSERT INTO import_files (
                id, batch_id, original_file_name, base_name, extension, content_type,
                container, object_key, expected_size_bytes, size_bytes, sha256, confirmed_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(file.id)
        .bind(file.batch_id)
        .bind(&file.original_file_name)
        .bind(&file.base_name)
        .bind(&file.extension)
        .bind(&file.content_type)
        .bind(&file.container)
        .bind(&file.object_key)
        .bind(file.expected_size_bytes)
        .bind(file.size_bytes)
        .bind(&file.sha256)
        .bind(file.confirmed_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| match check_constraint_violation(e) {
            ConstraintViolation::Unique(_) => DbError::Duplicate(format!(
                "Object '{}' in container '{}' is already attached to an import batch.",
                file.object_key, file.container
            )),
            ConstraintViolation::ForeignKey(_) => {
                DbError::not_found("Import batch", &file.batch_id.to_string())
            }
            ConstraintViolation::Other(e) => DbError::Sqlx(e),
        })?;

        tx.commit().await?;

        tracing::debug!(batch_id = %batch.id, file_id = %file.id, "Inserted import batch");
        Ok(())
    }

    async fn find_batch(&self, batch_id: Uuid) -> DbResult<Option<ImportBatch>> {
        let sql = format!("SELECT {} FROM import_batches WHERE id = $1", BATCH_COLUMNS);
        sqlx::query_as::<_, BatchRecord>(&sql)
            .bind(batch_id)
            .fetch_optional(&self.pool)
            .await?
            .map(ImportBatch::try_from)
            .transpose()
    }

    async fn find_file(&self, batch_id: Uuid) -> DbResult<Option<ImportFile>> {
        let sql = format!("SELECT {} FROM import_files WHERE batch_id = $1", FILE_COLUMNS);
        let record = sqlx::query_as::<_, FileRecord>(&sql)
            .bind(batch_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(record.map(ImportFile::from))
    }

    async fn update_batch(&self, batch: &ImportBatch) -> DbResult<i64> {
        update_batch_in(&self.pool, batch)
            .await?
            .ok_or_else(|| Self::version_conflict(batch))
    }

    async fn save_confirmation(&self, batch: &ImportBatch, file: &ImportFile) -> DbResult<i64> {
        let file = file.snapshot();
        let mut tx = self.pool.begin().await?;

        let version = update_batch_in(&mut *tx, batch)
            .await?
            .ok_or_else(|| Self::version_conflict(batch))?;

        let written = sqlx::query(
            r#"
            UPDATE import_files
            SET sha256 = $2, size_bytes = $3, confirmed_at = $4
            WHERE batch_id = $1 AND sha256 IS NULL
            "#,
        )
        .bind(file.batch_id)
        .bind(&file.sha256)
        .bind(file.size_bytes)
        .bind(file.confirmed_at)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if written == 0 {
            return Err(DbError::Conflict(format!(
                "Integrity of the file attached to import batch {} is already recorded.",
                file.batch_id
            )));
        }

        tx.commit().await?;
        Ok(version)
    }

    async fn insert_row(&self, row: &ImportRow) -> DbResult<()> {
        let row = row.snapshot();
        let raw = &row.raw;
        let normalized = &row.normalized;

        sqlx::query(&format!(
            r#"
            INSERT INTO import_rows ({})
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16,
                    $17, $18, $19, $20, $21, $22, $23, $24, $25, $26, $27, $28, $29, $30, $31)
            "#,
            ROW_COLUMNS
        ))
        .bind(row.id)
        .bind(row.batch_id)
        .bind(raw.line_number)
        .bind(&raw.payload)
        .bind(raw.date)
        .bind(&raw.amount_text)
        .bind(&raw.description)
        .bind(&raw.record_type)
        .bind(&raw.balance_text)
        .bind(&raw.currency)
        .bind(&raw.counterparty)
        .bind(&raw.reference)
        .bind(&raw.fit_id)
        .bind(&row.raw_hash)
        .bind(normalized.signed_minor)
        .bind(&normalized.currency)
        .bind(normalized.date)
        .bind(&normalized.payee)
        .bind(&normalized.counterparty)
        .bind(&normalized.memo)
        .bind(&normalized.reference)
        .bind(&normalized.external_id)
        .bind(normalized.suggested_category_id)
        .bind(normalized.match_confidence)
        .bind(row.status.as_str())
        .bind(row.status_at)
        .bind(&row.error_code)
        .bind(&row.error_message)
        .bind(&row.error_log)
        .bind(row.duplicate_of_row_id)
        .bind(row.imported_transaction_id)
        .execute(&self.pool)
        .await
        .map_err(|e| match check_constraint_violation(e) {
            ConstraintViolation::Unique(constraint) => {
                DbError::Duplicate(duplicate_row_message(&row, constraint.as_deref()))
            }
            ConstraintViolation::ForeignKey(_) => {
                DbError::not_found("Import batch", &row.batch_id.to_string())
            }
            ConstraintViolation::Other(e) => DbError::Sqlx(e),
        })?;

        Ok(())
    }

    async fn find_row(&self, row_id: Uuid) -> DbResult<Option<ImportRow>> {
        let sql = format!("SELECT {} FROM import_rows WHERE id = $1", ROW_COLUMNS);
        sqlx::query_as::<_, RowRecord>(&sql)
            .bind(row_id)
            .fetch_optional(&self.pool)
            .await?
            .map(ImportRow::try_from)
            .transpose()
    }

    async fn update_row(&self, row: &ImportRow) -> DbResult<()> {
        let row = row.snapshot();
        let normalized = &row.normalized;

        let updated = sqlx::query(
            r#"
            UPDATE import_rows
            SET signed_minor = $2,
                currency = $3,
                normalized_date = $4,
                payee = $5,
                counterparty = $6,
                memo = $7,
                reference = $8,
                external_id = $9,
                suggested_category_id = $10,
                match_confidence = $11,
                status = $12,
                status_at = $13,
                error_code = $14,
                error_message = $15,
                error_log = $16,
                duplicate_of_row_id = $17,
                imported_transaction_id = $18
            WHERE id = $1
              AND status NOT IN ('Duplicate', 'Rejected', 'Skipped', 'Imported')
            "#,
        )
        .bind(row.id)
        .bind(normalized.signed_minor)
        .bind(&normalized.currency)
        .bind(normalized.date)
        .bind(&normalized.payee)
        .bind(&normalized.counterparty)
        .bind(&normalized.memo)
        .bind(&normalized.reference)
        .bind(&normalized.external_id)
        .bind(normalized.suggested_category_id)
        .bind(normalized.match_confidence)
        .bind(row.status.as_str())
        .bind(row.status_at)
        .bind(&row.error_code)
        .bind(&row.error_message)
        .bind(&row.error_log)
        .bind(row.duplicate_of_row_id)
        .bind(row.imported_transaction_id)
        .execute(&self.pool)
        .await
        .map_err(|e| match check_constraint_violation(e) {
            ConstraintViolation::ForeignKey(_) => DbError::NotFound(format!(
                "Canonical import row with ID {} was not found.",
                row.duplicate_of_row_id.map(|id| id.to_string()).unwrap_or_default()
            )),
            ConstraintViolation::Unique(_) => DbError::Conflict(format!(
                "Import row {} collides with another row.",
                row.id
            )),
            ConstraintViolation::Other(e) => DbError::Sqlx(e),
        })?
        .rows_affected();

        if updated == 0 {
            let exists = sqlx::query_scalar::<_, bool>(
                "SELECT EXISTS(SELECT 1 FROM import_rows WHERE id = $1)",
            )
            .bind(row.id)
            .fetch_one(&self.pool)
            .await?;

            return Err(if exists {
                DbError::Conflict(format!(
                    "Import row {} is already in a terminal status and cannot be modified.",
                    row.id
                ))
            } else {
                DbError::NotFound(format!("Import row with ID {} was not found.", row.id))
            });
        }

        Ok(())
    }

    async fn count_rows_by_status(&self, batch_id: Uuid) -> DbResult<BTreeMap<RowStatus, i64>> {
        let counts = sqlx::query_as::<_, (String, i64)>(
            r#"
            SELECT status, COUNT(*)
            FROM import_rows
            WHERE batch_id = $1
            GROUP BY status
            "#,
        )
        .bind(batch_id)
        .fetch_all(&self.pool)
        .await?;

        counts
            .into_iter()
            .map(|(status, count)| {
                let status: RowStatus = status
                    .parse()
                    .map_err(|e| DbError::Decode(format!("import row status: {}", e)))?;
                Ok((status, count))
            })
            .collect()
    }
}

fn duplicate_row_message(row: &RowSnapshot, constraint: Option<&str>) -> String {
    match constraint {
        Some("ux_import_rows_batch_line") => format!(
            "Import batch {} already has a row for line {}.",
            row.batch_id, row.raw.line_number
        ),
        Some("ux_import_rows_batch_fit_id") => format!(
            "Import batch {} already has a row with FIT id '{}'.",
            row.batch_id,
            row.raw.fit_id.as_deref().unwrap_or_default()
        ),
        Some("ux_import_rows_batch_hash") => format!(
            "Import batch {} already contains a row with hash {}.",
            row.batch_id, row.raw_hash
        ),
        _ => format!("Import row {} already exists.", row.id),
    }
}
