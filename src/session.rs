//! The controller a front end drives: active dataset, view state, the edit
//! modal and the collaborators, on top of the record store.

use log::{debug, info};
use std::path::Path;

use crate::config::DEFAULT_PAGE_SIZE;
use crate::dialogs::{Confirm, Notice, Notify, Prompt};
use crate::downloader::{ExportedFile, export_dataset};
use crate::error::{ErrorKind, Result, SheetError};
use crate::loader::parse_upload;
use crate::mailer::{MailDraft, submit_draft};
use crate::mutation::{Outcome, delete_row, edit_row};
use crate::query::{Page, QueryEngine, QuerySpec, RowRef, SortSpec, clamp_page, total_pages};
use crate::record::{CellValue, Dataset, DatasetSummary, Record};
use crate::saving::{load_archive, save_archive};
use crate::storage::KeyValueStore;
use crate::store::{RecordStore, Upserted};

/// Search, sort and paging inputs of the table view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewState {
    pub filter: String,
    pub sort: Option<SortSpec>,
    pub page_size: usize,
    /// 1-based; kept within the page count by the session.
    pub page: usize,
}

impl Default for ViewState {
    fn default() -> Self {
        ViewState {
            filter: String::new(),
            sort: None,
            page_size: DEFAULT_PAGE_SIZE,
            page: 1,
        }
    }
}

impl ViewState {
    pub fn query_spec(&self) -> QuerySpec {
        QuerySpec {
            filter: self.filter.clone(),
            sort: self.sort.clone(),
            page_size: self.page_size,
            page: self.page,
        }
    }
}

/// The edit modal.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum EditorState {
    #[default]
    Closed,
    Editing { row: RowRef, draft: Record },
    /// A save is waiting on confirmation or persistence.
    Saving { row: RowRef, draft: Record },
}

impl EditorState {
    pub fn is_open(&self) -> bool {
        !matches!(self, EditorState::Closed)
    }
}

pub struct Session<S, N> {
    store: RecordStore<S>,
    notifier: N,
    active: Option<String>,
    view: ViewState,
    editor: EditorState,
    engine: QueryEngine,
}

impl<S: KeyValueStore, N: Notify> Session<S, N> {
    pub fn new(store: RecordStore<S>, notifier: N) -> Self {
        Session {
            store,
            notifier,
            active: None,
            view: ViewState::default(),
            editor: EditorState::Closed,
            engine: QueryEngine::new(),
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.view.page_size = page_size;
        self
    }

    pub fn store(&self) -> &RecordStore<S> {
        &self.store
    }

    pub fn notifier(&self) -> &N {
        &self.notifier
    }

    pub fn notifier_mut(&mut self) -> &mut N {
        &mut self.notifier
    }

    pub fn view(&self) -> &ViewState {
        &self.view
    }

    pub fn editor(&self) -> &EditorState {
        &self.editor
    }

    pub fn datasets(&self) -> Vec<DatasetSummary> {
        self.store.list_datasets()
    }

    pub fn active_name(&self) -> Option<&str> {
        self.active.as_deref()
    }

    pub fn active_dataset(&self) -> Option<&Dataset> {
        self.active.as_deref().and_then(|name| self.store.get(name))
    }

    pub fn headers(&self) -> &[String] {
        self.active_dataset().map_or(&[], |d| d.headers.as_slice())
    }

    /// Report an error to the user and hand it back.
    fn report(&mut self, err: SheetError) -> SheetError {
        let notice = match err.kind() {
            ErrorKind::Validation => Notice::warning("Warning!", err.to_string()),
            _ => Notice::error(err.to_string()),
        };
        self.notifier.notify(notice);
        err
    }

    fn activate(&mut self, name: String) {
        debug!("active dataset is now '{name}'");
        self.active = Some(name);
        self.view.page = 1;
        self.editor = EditorState::Closed;
    }

    fn require_active(&self) -> Result<&Dataset> {
        self.active_dataset()
            .ok_or_else(|| SheetError::not_found("no dataset selected"))
    }

    /// Parse an uploaded file, store it (replacing a same-named dataset) and
    /// make it the active one.
    pub fn upload(&mut self, bytes: &[u8], file_name: &str) -> Result<Upserted> {
        let dataset = match parse_upload(bytes, file_name) {
            Ok(dataset) => dataset,
            Err(err) => {
                info!("upload of '{file_name}' rejected: {err}");
                self.notifier.notify(Notice::error("Failed to process the file."));
                return Err(err);
            }
        };
        let name = dataset.name.clone();
        let outcome = self.store.upsert(dataset).map_err(|e| self.report(e))?;
        let notice = match outcome {
            Upserted::Replaced => Notice::success("Updated!", "File has been updated."),
            Upserted::Created => Notice::success("Success!", "File has been uploaded."),
        };
        self.notifier.notify(notice);
        self.activate(name);
        Ok(outcome)
    }

    pub fn select(&mut self, name: &str) -> Result<()> {
        if !self.store.contains(name) {
            let err = SheetError::not_found(format!("dataset '{name}'"));
            return Err(self.report(err));
        }
        self.activate(name.to_string());
        Ok(())
    }

    /// Delete a stored dataset after confirmation. The active pointer is
    /// cleared only when it pointed at the deleted dataset.
    pub fn delete_dataset(&mut self, name: &str, confirm: &mut dyn Confirm) -> Result<Outcome> {
        if !self.store.contains(name) {
            let err = SheetError::not_found(format!("dataset '{name}'"));
            return Err(self.report(err));
        }
        let prompt = Prompt::are_you_sure(
            format!("Do you really want to delete the file: {name}?"),
            "Yes, delete it!",
        );
        if !confirm.confirm(&prompt) {
            self.notifier
                .notify(Notice::info("Cancelled", "The file was not deleted."));
            return Ok(Outcome::Cancelled);
        }

        self.store.remove(name).map_err(|e| self.report(e))?;
        if self.active.as_deref() == Some(name) {
            self.active = None;
            self.editor = EditorState::Closed;
            self.view.page = 1;
        }
        self.notifier
            .notify(Notice::success("Deleted!", "The file has been deleted."));
        Ok(Outcome::Applied(()))
    }

    pub fn export(&mut self, name: &str) -> Result<ExportedFile> {
        let result = match self.store.get(name) {
            Some(dataset) => export_dataset(dataset),
            None => Err(SheetError::not_found(format!("dataset '{name}'"))),
        };
        result.map_err(|e| self.report(e))
    }

    pub fn set_filter(&mut self, filter: impl Into<String>) {
        self.view.filter = filter.into();
    }

    pub fn set_sort(&mut self, sort: Option<SortSpec>) {
        self.view.sort = sort;
    }

    /// Set the sort from a `<HEADER>-ASC|DESC` token; empty clears it.
    pub fn set_sort_token(&mut self, token: &str) -> Result<()> {
        let sort = SortSpec::parse_token(token).map_err(|e| self.report(e))?;
        self.view.sort = sort;
        Ok(())
    }

    pub fn set_page_size(&mut self, page_size: usize) -> Result<()> {
        if page_size == 0 {
            let err = SheetError::validation("page size must be at least 1");
            return Err(self.report(err));
        }
        self.view.page_size = page_size;
        Ok(())
    }

    /// Number of rows matching the current filter in the active dataset.
    pub fn match_count(&mut self) -> usize {
        match self.active.as_deref().and_then(|name| self.store.get(name)) {
            Some(dataset) => self
                .engine
                .matches(dataset, &self.view.filter, self.view.sort.as_ref())
                .len(),
            None => 0,
        }
    }

    pub fn total_pages(&mut self) -> usize {
        total_pages(self.match_count(), self.view.page_size)
    }

    pub fn go_to_page(&mut self, page: usize) -> usize {
        let total = self.total_pages();
        self.view.page = clamp_page(page, total);
        self.view.page
    }

    pub fn next_page(&mut self) -> usize {
        self.go_to_page(self.view.page.saturating_add(1))
    }

    pub fn previous_page(&mut self) -> usize {
        self.go_to_page(self.view.page.saturating_sub(1))
    }

    /// The visible page of the active dataset. The page number is clamped to
    /// the current page count first, so a narrowing filter never strands the
    /// view on an empty page.
    pub fn current_page(&mut self) -> Page<'_> {
        let Some(dataset) = self.active.as_deref().and_then(|name| self.store.get(name)) else {
            return Page {
                rows: Vec::new(),
                page: 1,
                page_size: self.view.page_size,
                total_pages: 0,
                total_matches: 0,
            };
        };

        let matches = self
            .engine
            .matches(dataset, &self.view.filter, self.view.sort.as_ref())
            .len();
        self.view.page = clamp_page(self.view.page, total_pages(matches, self.view.page_size));
        let spec = self.view.query_spec();
        self.engine.page(dataset, &spec)
    }

    /// Record at `row` of the active dataset.
    pub fn record(&self, row: RowRef) -> Result<&Record> {
        let dataset = self.require_active()?;
        dataset
            .rows
            .get(row.0)
            .ok_or_else(|| SheetError::not_found(format!("row {} of '{}'", row.0, dataset.name)))
    }

    /// Open the edit modal on a row.
    pub fn begin_edit(&mut self, row: RowRef) -> Result<()> {
        if self.editor.is_open() {
            let err = SheetError::validation("another row is already being edited");
            return Err(self.report(err));
        }
        let draft = self.record(row).cloned().map_err(|e| self.report(e))?;
        self.editor = EditorState::Editing { row, draft };
        Ok(())
    }

    pub fn set_field(&mut self, header: &str, value: impl Into<CellValue>) -> Result<()> {
        if !matches!(self.editor, EditorState::Editing { .. }) {
            let err = SheetError::validation("no row is being edited");
            return Err(self.report(err));
        }
        if !self.headers().iter().any(|h| h == header) {
            let err = SheetError::validation(format!("unknown column '{header}'"));
            return Err(self.report(err));
        }
        if let EditorState::Editing { draft, .. } = &mut self.editor {
            draft.set(header, value);
        }
        Ok(())
    }

    pub fn cancel_edit(&mut self) {
        self.editor = EditorState::Closed;
    }

    /// Commit the draft after confirmation. The modal closes only when the
    /// edit was applied; otherwise the draft stays open for another try.
    pub fn save_edit(&mut self, confirm: &mut dyn Confirm) -> Result<Outcome> {
        let (row, draft) = match std::mem::take(&mut self.editor) {
            EditorState::Editing { row, draft } => (row, draft),
            other => {
                self.editor = other;
                let err = SheetError::validation("no row is being edited");
                return Err(self.report(err));
            }
        };
        let Some(name) = self.active.clone() else {
            let err = SheetError::not_found("no dataset selected");
            return Err(self.report(err));
        };

        self.editor = EditorState::Saving {
            row,
            draft: draft.clone(),
        };
        let result = edit_row(&mut self.store, &name, row, draft.clone(), confirm);
        match result {
            Ok(Outcome::Applied(())) => {
                self.editor = EditorState::Closed;
                self.notifier
                    .notify(Notice::success("Updated!", "The Member has been updated."));
                Ok(Outcome::Applied(()))
            }
            Ok(Outcome::Cancelled) => {
                self.editor = EditorState::Editing { row, draft };
                self.notifier
                    .notify(Notice::info("Cancelled", "The Member was not updated."));
                Ok(Outcome::Cancelled)
            }
            Err(err) => {
                self.editor = EditorState::Editing { row, draft };
                Err(self.report(err))
            }
        }
    }

    /// Delete every row sharing the `MEMBER` id of `row`.
    pub fn delete_member(&mut self, row: RowRef, confirm: &mut dyn Confirm) -> Result<Outcome<usize>> {
        let member = self.record(row).map(|r| r.member().clone());
        let member = member.map_err(|e| self.report(e))?;
        if !member.is_numeric() {
            self.notifier.notify(Notice::warning(
                "Member id is not correct!",
                "Cannot delete the member!",
            ));
            return Err(SheetError::validation(format!("member id '{member}' is not numeric")));
        }
        let Some(name) = self.active.clone() else {
            return Err(self.report(SheetError::not_found("no dataset selected")));
        };

        match delete_row(&mut self.store, &name, &member, confirm) {
            Ok(Outcome::Applied(count)) => {
                // row positions shifted under any open draft
                self.editor = EditorState::Closed;
                self.notifier
                    .notify(Notice::success("Deleted!", "The Member has been deleted."));
                Ok(Outcome::Applied(count))
            }
            Ok(Outcome::Cancelled) => {
                self.notifier
                    .notify(Notice::info("Cancelled", "The Member was not deleted."));
                Ok(Outcome::Cancelled)
            }
            Err(err) => Err(self.report(err)),
        }
    }

    pub fn compose_mail(&mut self, row: RowRef) -> Result<MailDraft> {
        let draft = self.record(row).map(MailDraft::for_record);
        draft.map_err(|e| self.report(e))
    }

    pub fn submit_mail(&mut self, draft: &MailDraft) -> String {
        let html = submit_draft(draft);
        self.notifier.notify(Notice::info(
            "Info",
            "In a real application, this would send the email.",
        ));
        html
    }

    /// Write every stored dataset to a compressed archive.
    pub fn backup(&mut self, path: &Path) -> Result<usize> {
        let count = self.store.datasets().len();
        save_archive(self.store.datasets(), path).map_err(|e| self.report(e))?;
        self.notifier.notify(Notice::success(
            "Saved!",
            format!("{count} files written to {}.", path.display()),
        ));
        Ok(count)
    }

    /// Replace the whole collection with an archive's contents.
    pub fn restore(&mut self, path: &Path, confirm: &mut dyn Confirm) -> Result<Outcome<usize>> {
        let datasets = load_archive(path).map_err(|e| self.report(e))?;
        let prompt = Prompt::are_you_sure(
            format!(
                "Replace all stored files with the {} in {}?",
                datasets.len(),
                path.display()
            ),
            "Yes, restore it!",
        );
        if !confirm.confirm(&prompt) {
            self.notifier
                .notify(Notice::info("Cancelled", "Nothing was restored."));
            return Ok(Outcome::Cancelled);
        }

        let count = datasets.len();
        self.store.replace_all(datasets).map_err(|e| self.report(e))?;
        let still_there = self
            .active
            .as_deref()
            .is_some_and(|name| self.store.contains(name));
        if !still_there {
            self.active = None;
        }
        self.editor = EditorState::Closed;
        self.view.page = 1;
        self.notifier
            .notify(Notice::success("Restored!", format!("{count} files restored.")));
        Ok(Outcome::Applied(count))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialogs::{FixedAnswer, NoticeBuffer, NoticeLevel};
    use crate::storage::MemoryStore;
    use pretty_assertions::assert_eq;

    fn session() -> Session<MemoryStore, NoticeBuffer> {
        let store = RecordStore::open(MemoryStore::new()).unwrap();
        Session::new(store, NoticeBuffer::new())
    }

    fn csv(rows: usize) -> Vec<u8> {
        let mut out = String::from("MEMBER,NAME,CITY\n");
        for i in 1..=rows {
            let city = if i % 2 == 0 { "Oslo" } else { "Paris" };
            out.push_str(&format!("{i},Person {i},{city}\n"));
        }
        out.into_bytes()
    }

    fn last_level(session: &Session<MemoryStore, NoticeBuffer>) -> NoticeLevel {
        session.notifier().notices().last().unwrap().level
    }

    #[test]
    fn upload_activates_and_reports() {
        let mut s = session();
        assert_eq!(s.upload(&csv(3), "a.csv").unwrap(), Upserted::Created);
        assert_eq!(s.active_name(), Some("a.csv"));
        assert_eq!(s.upload(&csv(5), "a.csv").unwrap(), Upserted::Replaced);
        assert_eq!(s.datasets().len(), 1);
        assert_eq!(s.current_page().total_matches, 5);
        let titles: Vec<_> = s.notifier().notices().iter().map(|n| n.title.clone()).collect();
        assert_eq!(titles, vec!["Success!", "Updated!"]);
    }

    #[test]
    fn failed_upload_changes_nothing() {
        let mut s = session();
        s.upload(&csv(2), "a.csv").unwrap();
        assert!(s.upload(b"junk", "b.xlsx").is_err());
        assert_eq!(s.active_name(), Some("a.csv"));
        assert_eq!(s.datasets().len(), 1);
        assert_eq!(last_level(&s), NoticeLevel::Error);
    }

    #[test]
    fn narrowing_filter_pulls_page_back() {
        let mut s = session();
        s.upload(&csv(45), "a.csv").unwrap();
        assert_eq!(s.go_to_page(3), 3);
        assert_eq!(s.current_page().rows.len(), 5);

        s.set_filter("oslo");
        let page = s.current_page();
        assert_eq!(page.total_matches, 22);
        assert_eq!(page.page, 2);
        assert_eq!(page.rows.len(), 2);
    }

    #[test]
    fn paging_stays_in_bounds() {
        let mut s = session();
        s.upload(&csv(25), "a.csv").unwrap();
        assert_eq!(s.previous_page(), 1);
        assert_eq!(s.next_page(), 2);
        assert_eq!(s.next_page(), 2);
    }

    #[test]
    fn deleting_another_dataset_keeps_active() {
        let mut s = session();
        s.upload(&csv(1), "a.csv").unwrap();
        s.upload(&csv(1), "b.csv").unwrap();
        s.delete_dataset("a.csv", &mut FixedAnswer(true)).unwrap();
        assert_eq!(s.active_name(), Some("b.csv"));

        s.delete_dataset("b.csv", &mut FixedAnswer(true)).unwrap();
        assert_eq!(s.active_name(), None);
        assert!(s.current_page().rows.is_empty());
    }

    #[test]
    fn cancelled_dataset_delete_is_reported_as_info() {
        let mut s = session();
        s.upload(&csv(1), "a.csv").unwrap();
        let outcome = s.delete_dataset("a.csv", &mut FixedAnswer(false)).unwrap();
        assert_eq!(outcome, Outcome::Cancelled);
        assert_eq!(last_level(&s), NoticeLevel::Info);
        assert_eq!(s.datasets().len(), 1);
    }

    #[test]
    fn edit_modal_state_machine() {
        let mut s = session();
        s.upload(&csv(3), "a.csv").unwrap();

        assert!(s.set_field("NAME", "x").is_err());
        assert!(s.save_edit(&mut FixedAnswer(true)).is_err());

        s.begin_edit(RowRef(1)).unwrap();
        assert!(s.begin_edit(RowRef(0)).is_err());
        assert!(s.set_field("NOPE", "x").is_err());
        s.set_field("NAME", "Renamed").unwrap();

        assert_eq!(s.save_edit(&mut FixedAnswer(false)).unwrap(), Outcome::Cancelled);
        assert!(matches!(s.editor(), EditorState::Editing { row: RowRef(1), .. }));

        let mut prompted = Vec::new();
        let mut confirm = |p: &Prompt| {
            prompted.push(p.body.clone());
            true
        };
        assert!(s.save_edit(&mut confirm).unwrap().is_applied());
        assert_eq!(prompted, vec!["Do you really want to update member: Renamed?"]);
        assert_eq!(s.editor(), &EditorState::Closed);
        assert_eq!(s.record(RowRef(1)).unwrap().name().to_text(), "Renamed");
    }

    #[test]
    fn delete_member_from_a_sorted_page() {
        let mut s = session();
        s.upload(&csv(5), "a.csv").unwrap();
        s.set_sort_token("MEMBER-DESC").unwrap();
        let top = s.current_page().rows[0].row;
        assert_eq!(top, RowRef(4));

        let outcome = s.delete_member(top, &mut FixedAnswer(true)).unwrap();
        assert_eq!(outcome, Outcome::Applied(1));
        assert_eq!(s.current_page().total_matches, 4);
    }

    #[test]
    fn non_numeric_member_warns() {
        let mut s = session();
        s.upload(b"MEMBER,NAME\nabc,Ann\n", "a.csv").unwrap();
        let err = s.delete_member(RowRef(0), &mut FixedAnswer(true)).unwrap_err();
        assert!(matches!(err, SheetError::Validation(_)));
        let notice = s.notifier().notices().last().unwrap();
        assert_eq!(notice.title, "Member id is not correct!");
    }

    #[test]
    fn mail_draft_round() {
        let mut s = session();
        s.upload(b"MEMBER,NAME,EMAIL\n1,Ann,ann@x.org\n", "a.csv").unwrap();
        let draft = s.compose_mail(RowRef(0)).unwrap();
        assert_eq!(draft.to, "ann@x.org");
        let html = s.submit_mail(&draft);
        assert!(html.contains("Member: Ann"));
        assert_eq!(last_level(&s), NoticeLevel::Info);
    }

    #[test]
    fn backup_and_restore() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("all.json.gz");
        let mut s = session();
        s.upload(&csv(2), "a.csv").unwrap();
        assert_eq!(s.backup(&path).unwrap(), 1);

        s.upload(&csv(2), "b.csv").unwrap();
        let outcome = s.restore(&path, &mut FixedAnswer(true)).unwrap();
        assert_eq!(outcome, Outcome::Applied(1));
        assert_eq!(s.active_name(), None);
        assert_eq!(s.datasets(), vec![DatasetSummary { name: "a.csv".into() }]);
    }
}
