use pretty_assertions::assert_eq;
use std::cell::Cell;
use std::rc::Rc;
use sheetdesk::dialogs::{FixedAnswer, NoticeBuffer, NoticeLevel};
use sheetdesk::downloader::export_dataset;
use sheetdesk::loader::parse_upload;
use sheetdesk::mutation::{Outcome, delete_row, edit_row};
use sheetdesk::query::{QuerySpec, RowRef, SortSpec, run_query};
use sheetdesk::session::EditorState;
use sheetdesk::storage::{FileStore, KeyValueStore, MemoryStore};
use sheetdesk::{CellValue, RecordStore, Result, Session, SheetError};

const MEMBERS: &str = "MEMBER,NAME,DOB,CITY\n\
                       3,Carla,36526,Oslo\n\
                       1,Ann,25569,Paris\n\
                       2,Bob,,Oslo\n\
                       1,Ann,25570,Lyon\n";

/// Accepts reads, refuses writes while the shared flag is set.
#[derive(Default)]
struct FlakyStore {
    inner: MemoryStore,
    fail: Rc<Cell<bool>>,
}

impl KeyValueStore for FlakyStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        self.inner.get(key)
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        if self.fail.get() {
            return Err(SheetError::Persistence("disk full".to_string()));
        }
        self.inner.set(key, value)
    }
}

#[test]
fn upload_query_edit_delete_export() {
    let mut store = RecordStore::open(MemoryStore::new()).unwrap();
    store.upsert(parse_upload(MEMBERS.as_bytes(), "members.csv").unwrap()).unwrap();

    let dataset = store.get("members.csv").unwrap();
    assert_eq!(dataset.len(), 4);
    assert_eq!(dataset.rows[1].get("DOB"), &CellValue::from("01-01-1970"));
    assert_eq!(dataset.rows[2].get("DOB"), &CellValue::Empty);

    let spec = QuerySpec {
        filter: "oslo".into(),
        sort: SortSpec::parse_token("NAME-DESC").unwrap(),
        ..QuerySpec::default()
    };
    let page = run_query(dataset, &spec);
    let names: Vec<String> = page.rows.iter().map(|r| r.record.name().to_text()).collect();
    assert_eq!(names, vec!["Carla", "Bob"]);
    let bob = page.rows[1].row;

    let mut edited = dataset.rows[bob.0].clone();
    edited.set("CITY", "Bergen");
    let outcome = edit_row(&mut store, "members.csv", bob, edited, &mut FixedAnswer(true)).unwrap();
    assert!(outcome.is_applied());

    let removed = delete_row(
        &mut store,
        "members.csv",
        &CellValue::from("1"),
        &mut FixedAnswer(true),
    )
    .unwrap();
    assert_eq!(removed, Outcome::Applied(2));

    let file = export_dataset(store.get("members.csv").unwrap()).unwrap();
    assert_eq!(
        String::from_utf8(file.bytes).unwrap(),
        "MEMBER,NAME,DOB,CITY\n3,Carla,01-01-2000,Oslo\n2,Bob,,Bergen\n"
    );
}

#[test]
fn uploading_the_same_name_twice_replaces() {
    let mut store = RecordStore::open(MemoryStore::new()).unwrap();
    store.upsert(parse_upload(MEMBERS.as_bytes(), "m.csv").unwrap()).unwrap();
    store.upsert(parse_upload(b"MEMBER\n9\n", "other.csv").unwrap()).unwrap();
    store.upsert(parse_upload(b"MEMBER,NAME\n5,Eve\n", "m.csv").unwrap()).unwrap();

    let names: Vec<String> = store.list_datasets().into_iter().map(|s| s.name).collect();
    assert_eq!(names, vec!["m.csv", "other.csv"]);
    assert_eq!(store.get("m.csv").unwrap().len(), 1);
}

#[test]
fn failed_writes_leave_memory_untouched() {
    let fail = Rc::new(Cell::new(false));
    let backend = FlakyStore {
        inner: MemoryStore::new(),
        fail: Rc::clone(&fail),
    };
    let mut store = RecordStore::open(backend).unwrap();
    store.upsert(parse_upload(MEMBERS.as_bytes(), "m.csv").unwrap()).unwrap();
    let before = store.datasets().to_vec();

    fail.set(true);
    let err = delete_row(&mut store, "m.csv", &CellValue::from("1"), &mut FixedAnswer(true))
        .unwrap_err();
    assert!(matches!(err, SheetError::Persistence(_)));
    assert!(store.upsert(parse_upload(b"A\n1\n", "n.csv").unwrap()).is_err());
    assert!(store.remove("m.csv").is_err());
    assert_eq!(store.datasets(), before.as_slice());

    let persisted = RecordStore::open(store.backend().inner.clone()).unwrap();
    assert_eq!(persisted.datasets(), before.as_slice());
}

#[test]
fn file_store_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    {
        let mut store = RecordStore::open(FileStore::new(dir.path())).unwrap();
        store.upsert(parse_upload(MEMBERS.as_bytes(), "m.csv").unwrap()).unwrap();
    }
    assert!(dir.path().join("excelFiles.json").exists());

    let store = RecordStore::open(FileStore::new(dir.path())).unwrap();
    let dataset = store.get("m.csv").unwrap();
    assert_eq!(dataset.headers, vec!["MEMBER", "NAME", "DOB", "CITY"]);
    assert_eq!(dataset.rows[0].get("DOB").to_text(), "01-01-2000");
}

#[test]
fn workbook_export_parses_back() {
    let original = parse_upload(MEMBERS.as_bytes(), "members.csv").unwrap();
    let mut as_workbook = original.clone();
    as_workbook.name = "members.xlsx".into();

    let file = export_dataset(&as_workbook).unwrap();
    let back = parse_upload(&file.bytes, &file.file_name).unwrap();

    assert_eq!(back.headers, original.headers);
    for (a, b) in back.rows.iter().zip(&original.rows) {
        for header in &original.headers {
            assert_eq!(a.get(header).to_text(), b.get(header).to_text());
        }
    }
}

#[test]
fn session_keeps_the_active_dataset_when_another_is_deleted() {
    let store = RecordStore::open(MemoryStore::new()).unwrap();
    let mut session = Session::new(store, NoticeBuffer::new());
    session.upload(MEMBERS.as_bytes(), "a.csv").unwrap();
    session.upload(MEMBERS.as_bytes(), "b.csv").unwrap();
    session.select("a.csv").unwrap();

    session.delete_dataset("b.csv", &mut FixedAnswer(true)).unwrap();
    assert_eq!(session.active_name(), Some("a.csv"));
    assert_eq!(session.current_page().total_matches, 4);
}

#[test]
fn session_editor_rejects_out_of_order_steps() {
    let store = RecordStore::open(MemoryStore::new()).unwrap();
    let mut session = Session::new(store, NoticeBuffer::new());
    session.upload(MEMBERS.as_bytes(), "a.csv").unwrap();
    session.notifier_mut().drain();

    assert!(session.save_edit(&mut FixedAnswer(true)).is_err());
    assert!(session.begin_edit(RowRef(99)).is_err());
    assert_eq!(session.editor(), &EditorState::Closed);

    session.begin_edit(RowRef(0)).unwrap();
    session.set_field("MEMBER", "x").unwrap();
    let err = session.save_edit(&mut FixedAnswer(true)).unwrap_err();
    assert!(matches!(err, SheetError::Validation(_)));
    assert!(matches!(session.editor(), EditorState::Editing { .. }));

    session.cancel_edit();
    session.cancel_edit();
    assert_eq!(session.editor(), &EditorState::Closed);

    let levels: Vec<NoticeLevel> = session.notifier().notices().iter().map(|n| n.level).collect();
    assert_eq!(
        levels,
        vec![NoticeLevel::Warning, NoticeLevel::Error, NoticeLevel::Warning]
    );
}
