use chrono::{Months, NaiveDate, Utc};

use super::model::FormType;

/// Expected filing cadence per company and year: one annual report, three
/// quarterly reports, with headroom for amendments.
const FILINGS_PER_YEAR: usize = 8;

/// Minimum listing limit used by backfill windows.
const BACKFILL_FLOOR: usize = 40;

/// Options for listing a company's filings.
#[derive(Debug, Clone)]
pub struct ListOptions {
    /// Form kinds to include. Defaults to both periodic report kinds.
    pub form_types: Vec<FormType>,
    /// Inclusive lower bound on the filed date. Listings stop paging once
    /// entries older than this are reached.
    pub since: Option<NaiveDate>,
    /// Maximum number of summaries returned, applied after sorting.
    pub limit: Option<usize>,
    /// Whether to automatically include amendment forms (e.g., 10-K/A when
    /// 10-K is requested). Defaults to true.
    pub include_amendments: bool,
}

impl Default for ListOptions {
    fn default() -> Self {
        Self {
            form_types: vec![FormType::AnnualReport, FormType::QuarterlyReport],
            since: None,
            limit: None,
            include_amendments: true,
        }
    }
}

impl ListOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the options for a historical backfill reaching `years` back
    /// from today: the `since` bound is moved back accordingly and the limit
    /// is sized to the expected filing cadence.
    pub fn backfill(years: u32) -> Self {
        let since = Utc::now()
            .date_naive()
            .checked_sub_months(Months::new(12 * years))
            .unwrap_or(NaiveDate::MIN);
        Self {
            since: Some(since),
            limit: Some((years as usize * FILINGS_PER_YEAR).max(BACKFILL_FLOOR)),
            ..Self::default()
        }
    }

    pub fn with_form_type(mut self, form_type: FormType) -> Self {
        self.form_types = vec![form_type];
        self
    }

    pub fn with_form_types(mut self, form_types: Vec<FormType>) -> Self {
        self.form_types = form_types;
        self
    }

    pub fn with_since(mut self, since: NaiveDate) -> Self {
        self.since = Some(since);
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Set whether to include amendment forms automatically.
    ///
    /// When true (default), requesting 10-K will also include 10-K/A filings.
    /// When false, only the exact form kinds specified are returned.
    pub fn with_include_amendments(mut self, include_amendments: bool) -> Self {
        self.include_amendments = include_amendments;
        self
    }

    /// Decides whether a raw form string from the registry passes this
    /// filter. Forms outside the ingested set never match.
    pub fn matches_form(&self, form: &str) -> bool {
        match FormType::from_form(form) {
            Some((_, true)) if !self.include_amendments => false,
            Some((kind, _)) => self.form_types.contains(&kind),
            None => false,
        }
    }
}
