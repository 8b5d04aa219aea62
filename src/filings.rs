use super::Registry;
use super::error::Result;
use super::model::{ArtifactPaths, Filing, FilingStatus, FormType};
use super::options::ListOptions;
use super::traits::FilingOperations;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use serde_json;

/// Submission history document for one company.
///
/// The registry serves this as a single JSON object per CIK: company identity
/// plus a columnar listing of recent filings. Older filings overflow into
/// separate page files referenced by `filings.files`.
#[derive(Debug, Clone, Deserialize)]
pub struct Submissions {
    pub cik: String,
    pub name: String,
    #[serde(default)]
    pub tickers: Vec<String>,
    pub filings: FilingsData,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FilingsData {
    pub recent: FilingColumns,
    #[serde(default)]
    pub files: Vec<FilingPage>,
}

/// Reference to one older-filings page file.
#[derive(Debug, Clone, Deserialize)]
pub struct FilingPage {
    pub name: String,
    #[serde(rename = "filingCount")]
    pub filing_count: u64,
    #[serde(rename = "filingFrom")]
    pub filing_from: String,
    #[serde(rename = "filingTo")]
    pub filing_to: String,
}

/// Columnar filing arrays as served by the registry.
///
/// Every column has one entry per filing at the same index. Page files
/// contain this structure at the top level; the main submissions document
/// nests it under `filings.recent`.
#[derive(Debug, Clone, Deserialize)]
pub struct FilingColumns {
    #[serde(rename = "accessionNumber")]
    pub accession_number: Vec<String>,
    #[serde(rename = "filingDate")]
    pub filing_date: Vec<String>,
    #[serde(rename = "reportDate")]
    pub report_date: Option<Vec<String>>,
    #[serde(rename = "acceptanceDateTime")]
    pub acceptance_date_time: Option<Vec<String>>,
    pub form: Vec<String>,
    #[serde(rename = "primaryDocument")]
    pub primary_document: Option<Vec<String>>,
    #[serde(rename = "primaryDocDescription")]
    pub primary_doc_description: Option<Vec<String>>,
}

/// One filing row in a form the rest of the pipeline can use directly.
#[derive(Debug, Clone)]
pub struct FilingSummary {
    pub cik: u64,
    pub company_name: String,
    pub accession_number: String,
    /// Raw form string as listed (`10-K`, `10-K/A`, ...).
    pub form: String,
    pub form_type: FormType,
    pub is_amendment: bool,
    pub filed_date: NaiveDate,
    pub accepted_at: Option<DateTime<Utc>>,
    pub period_of_report: Option<NaiveDate>,
    /// Filename of the primary document; empty when the registry lists none.
    pub primary_document: String,
    pub primary_doc_description: Option<String>,
}

impl FilingColumns {
    fn get_vec_item_at<T: Clone>(vec_opt: &Option<Vec<T>>, idx: usize) -> Option<T> {
        vec_opt.as_ref().and_then(|v| v.get(idx).cloned())
    }

    /// Filed date of the row at `idx`, if the column parses.
    fn filed_date_at(&self, idx: usize) -> Option<NaiveDate> {
        self.filing_date
            .get(idx)
            .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok())
    }

    /// Builds a summary from the row at `idx`.
    ///
    /// Returns `None` when the row is not one of the ingested form kinds or
    /// its filed date is malformed. Acceptance timestamps that are missing or
    /// unparsable degrade to `None` rather than dropping the row.
    fn summary_at(&self, idx: usize, cik: u64, company_name: &str) -> Option<FilingSummary> {
        let form = self.form.get(idx)?.trim().to_string();
        let (form_type, is_amendment) = FormType::from_form(&form)?;
        let filed_date = self.filed_date_at(idx)?;

        let accepted_at = Self::get_vec_item_at(&self.acceptance_date_time, idx)
            .and_then(|raw| DateTime::parse_from_rfc3339(&raw).ok())
            .map(|dt| dt.with_timezone(&Utc));

        let period_of_report = Self::get_vec_item_at(&self.report_date, idx)
            .and_then(|raw| NaiveDate::parse_from_str(&raw, "%Y-%m-%d").ok());

        Some(FilingSummary {
            cik,
            company_name: company_name.to_string(),
            accession_number: self.accession_number.get(idx)?.clone(),
            form,
            form_type,
            is_amendment,
            filed_date,
            accepted_at,
            period_of_report,
            primary_document: Self::get_vec_item_at(&self.primary_document, idx)
                .unwrap_or_default(),
            primary_doc_description: Self::get_vec_item_at(&self.primary_doc_description, idx)
                .filter(|d| !d.is_empty()),
        })
    }
}

impl From<&FilingSummary> for Filing {
    /// Registers a freshly discovered filing from its listing row.
    fn from(summary: &FilingSummary) -> Self {
        let now = Utc::now();
        Filing {
            cik: summary.cik,
            accession_number: summary.accession_number.clone(),
            form: summary.form.clone(),
            form_type: summary.form_type,
            company_name: summary.company_name.clone(),
            ticker: None,
            filed_date: summary.filed_date,
            accepted_at: summary.accepted_at,
            period_of_report: summary.period_of_report,
            primary_document: summary.primary_document.clone(),
            status: FilingStatus::Discovered,
            retries: 0,
            error: None,
            artifacts: ArtifactPaths::default(),
            discovered_at: now,
            updated_at: now,
        }
    }
}

impl From<&Filing> for FilingSummary {
    /// Rebuilds the download addressing for a stored filing record.
    fn from(filing: &Filing) -> Self {
        let is_amendment = FormType::from_form(&filing.form)
            .map(|(_, amended)| amended)
            .unwrap_or(false);
        FilingSummary {
            cik: filing.cik,
            company_name: filing.company_name.clone(),
            accession_number: filing.accession_number.clone(),
            form: filing.form.clone(),
            form_type: filing.form_type,
            is_amendment,
            filed_date: filing.filed_date,
            accepted_at: filing.accepted_at,
            period_of_report: filing.period_of_report,
            primary_document: filing.primary_document.clone(),
            primary_doc_description: None,
        }
    }
}

#[derive(Debug)]
enum UrlType {
    Submissions,
    SubmissionsPage,
    FilingDocument,
    FilingText,
    FilingIndex,
}

impl Registry {
    fn build_url(&self, url_type: UrlType, params: &[&str]) -> String {
        match url_type {
            UrlType::Submissions => {
                let cik = format!("{:0>10}", params[0]);
                format!("{}/submissions/CIK{}.json", self.data_base_url, cik)
            }
            UrlType::SubmissionsPage => {
                format!("{}/submissions/{}", self.data_base_url, params[0])
            }
            UrlType::FilingDocument => {
                let (cik, acc_no, filename) = (params[0], params[1], params[2]);
                let formatted_acc = acc_no.replace("-", "");
                format!(
                    "{}/data/{}/{}/{}",
                    self.archives_base_url, cik, formatted_acc, filename
                )
            }
            UrlType::FilingText => {
                // Master rendition: /data/CIK/ACC_NO_NO_DASHES/ACC_NO_WITH_DASHES.txt
                let (cik, acc_no) = (params[0], params[1]);
                let formatted_acc = acc_no.replace("-", "");
                format!(
                    "{}/data/{}/{}/{}.txt",
                    self.archives_base_url, cik, formatted_acc, acc_no
                )
            }
            UrlType::FilingIndex => {
                let (cik, acc_no) = (params[0], params[1]);
                let formatted_acc = acc_no.replace("-", "");
                format!(
                    "{}/data/{}/{}/index.json",
                    self.archives_base_url, cik, formatted_acc
                )
            }
        }
    }

    /// URL of the document the processor should download for a filing:
    /// the primary document when the registry lists one, otherwise the
    /// master `.txt` rendition of the whole filing.
    pub(crate) fn document_url(&self, summary: &FilingSummary) -> String {
        let cik = summary.cik.to_string();
        if summary.primary_document.is_empty() {
            self.build_url(
                UrlType::FilingText,
                &[&cik, &summary.accession_number],
            )
        } else {
            self.build_url(
                UrlType::FilingDocument,
                &[&cik, &summary.accession_number, &summary.primary_document],
            )
        }
    }
}

/// Scans one columnar page newest-first, appending matching rows to `out`.
///
/// Returns true once a row older than `options.since` is reached; the
/// registry lists newest-first, so everything after that row is older still
/// and remaining pages can be skipped.
fn collect_rows(
    columns: &FilingColumns,
    cik: u64,
    company_name: &str,
    options: &ListOptions,
    out: &mut Vec<FilingSummary>,
) -> bool {
    for idx in 0..columns.accession_number.len() {
        if let Some(since) = options.since {
            match columns.filed_date_at(idx) {
                Some(filed) if filed < since => return true,
                _ => {}
            }
        }

        let form = columns.form.get(idx).map(String::as_str).unwrap_or("");
        if !options.matches_form(form) {
            continue;
        }

        if let Some(summary) = columns.summary_at(idx, cik, company_name) {
            out.push(summary);
        }
    }
    false
}

#[async_trait]
impl FilingOperations for Registry {
    /// Retrieves the submission history document for a company.
    ///
    /// # Arguments
    ///
    /// * `cik` - Central Index Key of the company.
    ///
    /// # Errors
    ///
    /// * `IngestError::NotFound` - No submission history exists for the CIK.
    /// * `IngestError::JsonError` - The response could not be parsed.
    async fn submissions(&self, cik: u64) -> Result<Submissions> {
        let url = self.build_url(UrlType::Submissions, &[&cik.to_string()]);
        let response = self.get(&url).await?;
        Ok(serde_json::from_str::<Submissions>(&response)?)
    }

    /// Lists a company's filings filtered, ordered, and truncated per the
    /// given options.
    ///
    /// The recent page of the submissions document is scanned first; older
    /// page files are fetched only while the `since` window has not been
    /// crossed and the limit is unmet. Results are ordered newest-first by
    /// acceptance timestamp with the accession number as tie-break; rows
    /// without an acceptance timestamp sort last.
    async fn list_filings(&self, cik: u64, options: &ListOptions) -> Result<Vec<FilingSummary>> {
        let submissions = self.submissions(cik).await?;
        let company_name = submissions.name.clone();

        let mut summaries = Vec::new();
        let mut window_crossed = collect_rows(
            &submissions.filings.recent,
            cik,
            &company_name,
            options,
            &mut summaries,
        );

        for page in &submissions.filings.files {
            if window_crossed {
                break;
            }
            if let Some(limit) = options.limit {
                if summaries.len() >= limit {
                    break;
                }
            }
            // Pages hold strictly older filings than the recent block.
            let url = self.build_url(UrlType::SubmissionsPage, &[&page.name]);
            let response = self.get(&url).await?;
            let columns: FilingColumns = serde_json::from_str(&response)?;
            window_crossed = collect_rows(&columns, cik, &company_name, options, &mut summaries);
        }

        summaries.sort_by(|a, b| {
            b.accepted_at
                .cmp(&a.accepted_at)
                .then_with(|| b.accession_number.cmp(&a.accession_number))
        });
        if let Some(limit) = options.limit {
            summaries.truncate(limit);
        }
        Ok(summaries)
    }

    /// Downloads the filing's document content.
    ///
    /// Prefers the primary document named in the listing; falls back to the
    /// master `.txt` rendition when the listing names none.
    async fn download_document(&self, summary: &FilingSummary) -> Result<String> {
        let url = self.document_url(summary);
        self.get(&url).await
    }

    /// Downloads the registry's metadata for a filing (the filing directory
    /// index), returned as raw JSON for verbatim persistence.
    async fn download_metadata(&self, summary: &FilingSummary) -> Result<serde_json::Value> {
        let url = self.build_url(
            UrlType::FilingIndex,
            &[&summary.cik.to_string(), &summary.accession_number],
        );
        let response = self.get(&url).await?;
        Ok(serde_json::from_str(&response)?)
    }
}
