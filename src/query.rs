//! Filter, sort and paginate the rows of the active dataset.
//!
//! Everything here is a pure function of the rows and the query. Page-number
//! correction is left to the caller: compute [`total_pages`], clamp with
//! [`clamp_page`], then ask for the page.

use lazy_static::lazy_static;
use log::debug;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::ops::Range;
use std::str::FromStr;

use crate::error::{Result, SheetError};
use crate::record::{CellValue, Dataset, Record};

lazy_static! {
    static ref SORT_TOKEN_REGEX: Regex = Regex::new(r"^(.+)-(ASC|DESC)$").unwrap();
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SortDirection {
    Asc,
    Desc,
}

impl FromStr for SortDirection {
    type Err = SheetError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "ASC" => Ok(SortDirection::Asc),
            "DESC" => Ok(SortDirection::Desc),
            other => Err(SheetError::validation(format!("unknown sort direction '{other}'"))),
        }
    }
}

impl fmt::Display for SortDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SortDirection::Asc => f.write_str("ASC"),
            SortDirection::Desc => f.write_str("DESC"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SortSpec {
    pub key: String,
    pub direction: SortDirection,
}

impl SortSpec {
    pub fn new(key: impl Into<String>, direction: SortDirection) -> Self {
        SortSpec {
            key: key.into(),
            direction,
        }
    }

    /// Parse the `<HEADER>-ASC` / `<HEADER>-DESC` token used by the sort
    /// selectors. An empty token means "no sort".
    pub fn parse_token(token: &str) -> Result<Option<SortSpec>> {
        let token = token.trim();
        if token.is_empty() {
            return Ok(None);
        }
        let caps = SORT_TOKEN_REGEX
            .captures(token)
            .ok_or_else(|| SheetError::validation(format!("invalid sort '{token}'")))?;
        Ok(Some(SortSpec::new(&caps[1], caps[2].parse()?)))
    }

    pub fn token(&self) -> String {
        format!("{}-{}", self.key, self.direction)
    }
}

/// Position of a row in the full, unfiltered, unsorted row list.
///
/// Carried next to every row a query returns so edits and deletes can be
/// resolved without searching by field values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RowRef(pub usize);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuerySpec {
    pub filter: String,
    pub sort: Option<SortSpec>,
    pub page_size: usize,
    /// 1-based.
    pub page: usize,
}

impl Default for QuerySpec {
    fn default() -> Self {
        QuerySpec {
            filter: String::new(),
            sort: None,
            page_size: 20,
            page: 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageRow<'a> {
    pub row: RowRef,
    pub record: &'a Record,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Page<'a> {
    pub rows: Vec<PageRow<'a>>,
    pub page: usize,
    pub page_size: usize,
    pub total_pages: usize,
    pub total_matches: usize,
}

/// A row matches when any of its values, lower-cased, contains the
/// lower-cased needle. An empty needle matches everything.
pub fn matches_filter(record: &Record, filter: &str) -> bool {
    if filter.is_empty() {
        return true;
    }
    let needle = filter.to_lowercase();
    record
        .values()
        .any(|value| value.to_text().to_lowercase().contains(&needle))
}

/// Order two cells: numerically when both are numeric, otherwise as text.
pub fn compare_cells(a: &CellValue, b: &CellValue) -> Ordering {
    match (a.as_number(), b.as_number()) {
        (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
        _ => compare_text(&a.to_text(), &b.to_text()),
    }
}

/// Case-insensitive ordering with lower case first on ties, which is how
/// browsers order plain words with `localeCompare`.
pub fn compare_text(a: &str, b: &str) -> Ordering {
    a.to_lowercase()
        .cmp(&b.to_lowercase())
        .then_with(|| b.cmp(a))
}

/// Indices of the matching rows, in display order.
pub fn ordered_indices(rows: &[Record], filter: &str, sort: Option<&SortSpec>) -> Vec<usize> {
    let mut indices: Vec<usize> = rows
        .iter()
        .enumerate()
        .filter(|(_, record)| matches_filter(record, filter))
        .map(|(index, _)| index)
        .collect();

    if let Some(sort) = sort.filter(|s| !s.key.is_empty()) {
        indices.sort_by(|&a, &b| {
            let ord = compare_cells(rows[a].get(&sort.key), rows[b].get(&sort.key));
            match sort.direction {
                SortDirection::Asc => ord,
                SortDirection::Desc => ord.reverse(),
            }
        });
    }
    indices
}

pub fn total_pages(matches: usize, page_size: usize) -> usize {
    if page_size == 0 {
        return 0;
    }
    matches.div_ceil(page_size)
}

/// Pull a 1-based page number into `1..=total_pages` (page 1 when empty).
pub fn clamp_page(page: usize, total_pages: usize) -> usize {
    page.clamp(1, total_pages.max(1))
}

/// Half-open slice of the match list shown on `page`.
pub fn page_bounds(matches: usize, page_size: usize, page: usize) -> Range<usize> {
    if page == 0 || page_size == 0 {
        return 0..0;
    }
    let start = (page - 1).saturating_mul(page_size).min(matches);
    let end = page.saturating_mul(page_size).min(matches);
    start..end
}

fn slice_page<'a>(dataset: &'a Dataset, order: &[usize], spec: &QuerySpec) -> Page<'a> {
    let bounds = page_bounds(order.len(), spec.page_size, spec.page);
    Page {
        rows: order[bounds]
            .iter()
            .map(|&index| PageRow {
                row: RowRef(index),
                record: &dataset.rows[index],
            })
            .collect(),
        page: spec.page,
        page_size: spec.page_size,
        total_pages: total_pages(order.len(), spec.page_size),
        total_matches: order.len(),
    }
}

/// Run a query without memoization.
pub fn run_query<'a>(dataset: &'a Dataset, spec: &QuerySpec) -> Page<'a> {
    let order = ordered_indices(&dataset.rows, &spec.filter, spec.sort.as_ref());
    slice_page(dataset, &order, spec)
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct CacheKey {
    dataset: String,
    revision: u64,
    filter: String,
    sort: Option<SortSpec>,
}

/// Memoizes the filtered and sorted row order of the last query.
///
/// The cache is keyed on the dataset's name and revision, so any commit
/// through the record store invalidates it. Page slicing is cheap and is
/// redone on every call.
#[derive(Debug, Default)]
pub struct QueryEngine {
    cached: Option<(CacheKey, Vec<usize>)>,
    computations: u64,
}

impl QueryEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Matching row indices in display order.
    pub fn matches(&mut self, dataset: &Dataset, filter: &str, sort: Option<&SortSpec>) -> &[usize] {
        let key = CacheKey {
            dataset: dataset.name.clone(),
            revision: dataset.revision(),
            filter: filter.to_string(),
            sort: sort.cloned(),
        };

        let stale = self.cached.as_ref().is_none_or(|(cached, _)| *cached != key);
        if stale {
            let order = ordered_indices(&dataset.rows, filter, sort);
            self.computations += 1;
            debug!(
                "recomputed order for '{}' rev {}: {} of {} rows",
                dataset.name,
                dataset.revision(),
                order.len(),
                dataset.rows.len()
            );
            self.cached = Some((key, order));
        }
        match &self.cached {
            Some((_, order)) => order,
            None => &[],
        }
    }

    pub fn page<'a>(&mut self, dataset: &'a Dataset, spec: &QuerySpec) -> Page<'a> {
        let order = self.matches(dataset, &spec.filter, spec.sort.as_ref());
        slice_page(dataset, order, spec)
    }

    /// How many times the row order was actually recomputed.
    pub fn computations(&self) -> u64 {
        self.computations
    }
}
