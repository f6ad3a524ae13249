//! Core types for userdata-export

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use url::Url;

use crate::error::{Error, Result, TableFailure};

/// Inclusive date range of requested data
///
/// Can only be built through [`DateRange::new`] (or deserialization, which
/// goes through the same check), so `start <= end` always holds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawDateRange", rename_all = "camelCase")]
pub struct DateRange {
    start_date: NaiveDate,
    end_date: NaiveDate,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawDateRange {
    start_date: NaiveDate,
    end_date: NaiveDate,
}

impl TryFrom<RawDateRange> for DateRange {
    type Error = Error;

    fn try_from(raw: RawDateRange) -> Result<Self> {
        DateRange::new(raw.start_date, raw.end_date)
    }
}

impl DateRange {
    /// Create a range, rejecting a start date after the end date
    pub fn new(start_date: NaiveDate, end_date: NaiveDate) -> Result<Self> {
        if start_date > end_date {
            return Err(Error::BadRequest(format!(
                "startDate {start_date} can't be after endDate {end_date}"
            )));
        }
        Ok(Self {
            start_date,
            end_date,
        })
    }

    /// First day included
    pub fn start(&self) -> NaiveDate {
        self.start_date
    }

    /// Last day included
    pub fn end(&self) -> NaiveDate {
        self.end_date
    }
}

/// Caller details used for naming and logging, never for filtering
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallerMetadata {
    /// Study (data partition) the caller belongs to
    pub study_id: String,
    /// Non-identifying id safe to write to logs
    pub log_id: String,
}

/// One export request, shared read-only by every table task
#[derive(Clone, PartialEq, Eq)]
pub struct ExportRequest {
    health_code: String,
    date_range: DateRange,
    caller: CallerMetadata,
}

impl ExportRequest {
    /// Create a request for `health_code`'s rows within `date_range`
    pub fn new(
        health_code: impl Into<String>,
        date_range: DateRange,
        caller: CallerMetadata,
    ) -> Result<Self> {
        let health_code = health_code.into();
        if health_code.trim().is_empty() {
            return Err(Error::BadRequest("healthCode must be specified".into()));
        }
        Ok(Self {
            health_code,
            date_range,
            caller,
        })
    }

    /// Identity filter value
    pub fn health_code(&self) -> &str {
        &self.health_code
    }

    /// Requested date range
    pub fn date_range(&self) -> &DateRange {
        &self.date_range
    }

    /// Caller metadata
    pub fn caller(&self) -> &CallerMetadata {
        &self.caller
    }
}

// The health code must never end up in logs
impl fmt::Debug for ExportRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExportRequest")
            .field("health_code", &"<redacted>")
            .field("date_range", &self.date_range)
            .field("caller", &self.caller)
            .finish()
    }
}

/// Declared type of a table column
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FieldType {
    /// Opaque binary attachment
    AttachmentBlob,
    /// CSV attachment
    AttachmentCsv,
    /// JSON blob attachment
    AttachmentJsonBlob,
    /// JSON table attachment
    AttachmentJsonTable,
    /// Generic attachment (v2 schemas)
    AttachmentV2,
    /// Boolean
    Boolean,
    /// Calendar date
    CalendarDate,
    /// Floating point number
    Float,
    /// JSON stored inline in the row
    InlineJsonBlob,
    /// Integer
    Int,
    /// String
    String,
    /// Timestamp
    Timestamp,
    /// Any type this crate does not know about; treated as plain data
    #[serde(other)]
    Other,
}

impl FieldType {
    /// Whether values of this column are attachment identifiers
    pub fn is_attachment(&self) -> bool {
        matches!(
            self,
            FieldType::AttachmentBlob
                | FieldType::AttachmentCsv
                | FieldType::AttachmentJsonBlob
                | FieldType::AttachmentJsonTable
                | FieldType::AttachmentV2
        )
    }
}

/// One named column of a table schema
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaField {
    /// Column name as it appears in the query result header
    pub name: String,
    /// Declared column type
    pub field_type: FieldType,
}

impl SchemaField {
    /// Create a schema field
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
        }
    }
}

/// Which rows of a table belong in the export
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RowFilter {
    /// Only the caller's rows within the requested date range
    #[default]
    Caller,
    /// The whole table (shared reference tables such as survey definitions)
    All,
}

/// A remote table participating in the export, supplied by the catalog
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableDescriptor {
    /// Remote table identifier
    pub table_id: String,
    /// Human-meaningful name for the table's files (defaults to `table_id`)
    #[serde(default)]
    pub key: Option<String>,
    /// Ordered column declarations
    #[serde(default)]
    pub schema: Vec<SchemaField>,
    /// Row selection
    #[serde(default)]
    pub filter: RowFilter,
}

impl TableDescriptor {
    /// Create a caller-filtered descriptor with no explicit key
    pub fn new(table_id: impl Into<String>, schema: Vec<SchemaField>) -> Self {
        Self {
            table_id: table_id.into(),
            key: None,
            schema,
            filter: RowFilter::Caller,
        }
    }

    /// Set the file key
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    /// Set the row filter
    pub fn with_filter(mut self, filter: RowFilter) -> Self {
        self.filter = filter;
        self
    }

    /// Declared type of `column`, if the schema knows it
    pub fn field_type(&self, column: &str) -> Option<FieldType> {
        self.schema
            .iter()
            .find(|field| field.name == column)
            .map(|field| field.field_type)
    }

    /// File name stem for everything this table writes
    ///
    /// Path separators are replaced so a key can never escape the workspace.
    pub fn file_key(&self) -> String {
        self.key
            .as_deref()
            .unwrap_or(&self.table_id)
            .chars()
            .map(|c| match c {
                '/' | '\\' | ':' | '\0' => '_',
                other => other,
            })
            .collect()
    }
}

/// Files one table task produced
#[must_use]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TaskResult {
    /// Table the files came from
    pub table_id: String,
    /// Query results, when the table had rows for the caller
    pub csv_file: Option<PathBuf>,
    /// Attachment bundle, when rows referenced attachments
    pub bundle_file: Option<PathBuf>,
}

impl TaskResult {
    /// A table that contributed nothing
    pub fn empty(table_id: impl Into<String>) -> Self {
        Self {
            table_id: table_id.into(),
            csv_file: None,
            bundle_file: None,
        }
    }

    /// Whether the table contributed no files
    pub fn is_empty(&self) -> bool {
        self.csv_file.is_none() && self.bundle_file.is_none()
    }

    /// The produced files, query results first
    pub fn into_files(self) -> impl Iterator<Item = PathBuf> {
        self.csv_file.into_iter().chain(self.bundle_file)
    }
}

/// The zip produced for one run
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ArchiveDescriptor {
    /// Location inside the workspace
    pub path: PathBuf,
    /// Generated file name, also used as the object key
    pub name: String,
}

/// A time-limited, credential-free download link
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresignedLink {
    /// The URL itself
    pub url: Url,
    /// When the URL stops working
    pub expires_at: DateTime<Utc>,
}

/// What an export run produced
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ExportOutcome {
    /// The queries legitimately found nothing for the caller
    NoData,
    /// An archive was published
    Published {
        /// Download link for the archive
        link: PresignedLink,
        /// Name of the published archive
        archive_name: String,
        /// Tables that failed and are listed in the archive's `error.log`
        failures: Vec<TableFailure>,
    },
}

impl ExportOutcome {
    /// The link, if anything was published
    pub fn link(&self) -> Option<&PresignedLink> {
        match self {
            ExportOutcome::NoData => None,
            ExportOutcome::Published { link, .. } => Some(link),
        }
    }
}
