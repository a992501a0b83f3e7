use log::{info, warn};

use crate::dialogs::{Confirm, Prompt};
use crate::error::{Result, SheetError};
use crate::query::RowRef;
use crate::record::{CellValue, MEMBER_HEADER, Record};
use crate::storage::KeyValueStore;
use crate::store::RecordStore;

/// Result of a confirmed operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome<T = ()> {
    Applied(T),
    /// The user declined; nothing changed.
    Cancelled,
}

impl<T> Outcome<T> {
    pub fn is_applied(&self) -> bool {
        matches!(self, Outcome::Applied(_))
    }
}

/// Whether two member identifiers are the same: numerically when both are
/// numeric (`"7"` equals `7`), textually otherwise.
pub fn same_member(a: &CellValue, b: &CellValue) -> bool {
    match (a.as_number(), b.as_number()) {
        (Some(x), Some(y)) => x == y,
        _ => a.to_text() == b.to_text(),
    }
}

fn require_numeric_member(member: &CellValue) -> Result<()> {
    if member.is_numeric() {
        Ok(())
    } else {
        warn!("refusing member id '{member}'");
        Err(SheetError::validation(format!(
            "Member id is not correct! ('{member}')"
        )))
    }
}

/// Index of the first row with this `MEMBER` and `NAME`.
///
/// Fallback for callers that no longer hold the row's [`RowRef`]; ambiguous
/// when the pair is duplicated.
pub fn locate_row(rows: &[Record], member: &CellValue, name: &str) -> Option<RowRef> {
    rows.iter()
        .position(|r| same_member(r.member(), member) && r.name().to_text() == name)
        .map(RowRef)
}

/// Replace the record at `row` of the full row list and commit it.
///
/// `record` is conformed to the dataset's headers first. In a dataset with a
/// `MEMBER` column both the stored row and its replacement must carry a
/// numeric member id.
pub fn edit_row<S: KeyValueStore>(
    store: &mut RecordStore<S>,
    dataset: &str,
    row: RowRef,
    record: Record,
    confirm: &mut dyn Confirm,
) -> Result<Outcome> {
    let current = store
        .get(dataset)
        .ok_or_else(|| SheetError::not_found(format!("dataset '{dataset}'")))?;
    let existing = current
        .rows
        .get(row.0)
        .ok_or_else(|| SheetError::not_found(format!("row {} of '{dataset}'", row.0)))?;
    let record = record.conform(&current.headers);
    if current.headers.iter().any(|h| h == MEMBER_HEADER) {
        require_numeric_member(existing.member())?;
        require_numeric_member(record.member())?;
    }

    let prompt = Prompt::are_you_sure(
        format!("Do you really want to update member: {}?", record.name()),
        "Yes, update it!",
    );
    if !confirm.confirm(&prompt) {
        info!("edit of row {} in '{dataset}' cancelled", row.0);
        return Ok(Outcome::Cancelled);
    }

    let mut rows = current.rows.clone();
    rows[row.0] = record;
    store.replace_rows(dataset, rows)?;
    info!("updated row {} in '{dataset}'", row.0);
    Ok(Outcome::Applied(()))
}

/// Remove every record whose `MEMBER` equals `member` and commit the rest.
///
/// Returns how many records were removed. The identifier must be numeric and
/// must match at least one record.
pub fn delete_row<S: KeyValueStore>(
    store: &mut RecordStore<S>,
    dataset: &str,
    member: &CellValue,
    confirm: &mut dyn Confirm,
) -> Result<Outcome<usize>> {
    require_numeric_member(member)?;
    let current = store
        .get(dataset)
        .ok_or_else(|| SheetError::not_found(format!("dataset '{dataset}'")))?;

    let (removed, kept): (Vec<&Record>, Vec<&Record>) = current
        .rows
        .iter()
        .partition(|r| same_member(r.member(), member));
    let Some(first) = removed.first() else {
        return Err(SheetError::not_found(format!(
            "member {member} in '{dataset}'"
        )));
    };

    let label = match first.name() {
        name if name.is_empty() => member.to_text(),
        name => name.to_text(),
    };
    let prompt = Prompt::are_you_sure(
        format!("Do you really want to delete member: {label}?"),
        "Yes, delete it!",
    );
    if !confirm.confirm(&prompt) {
        info!("delete of member {member} in '{dataset}' cancelled");
        return Ok(Outcome::Cancelled);
    }

    let count = removed.len();
    let rows = kept.into_iter().cloned().collect();
    store.replace_rows(dataset, rows)?;
    info!("deleted {count} rows with member {member} from '{dataset}'");
    Ok(Outcome::Applied(count))
}
