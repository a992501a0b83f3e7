/*!
# Sheetdesk

Import member spreadsheets, browse them page by page, edit or delete members
and export the result again, built in Rust.

## Overview

A user uploads a workbook or delimited text file. The first row becomes the
header list, every following non-blank row becomes a record keyed by header,
and any column whose header contains `DOB` is turned from a spreadsheet date
serial into a `DD-MM-YYYY` string. Datasets are stored by file name; uploading
the same name again replaces the stored copy.

## Architecture

### Pipeline
- **loader**: Tabular parser (xlsx/xls/ods via calamine, csv/tsv via csv)
- **dates**: Date serial to `DD-MM-YYYY` conversion
- **record**: Cells, records and datasets
- **store**: Named datasets mirrored to a key-value backend, persistence first
- **query**: Search, sort and pagination with a memoized match list
- **mutation**: Confirmed row edits and deletes by member id
- **downloader**: Export to xlsx, csv or tsv

### Around the pipeline
- **session**: The controller a front end drives (active dataset, view state,
  edit modal)
- **dialogs**: Confirmation and notification collaborators
- **storage**: File and in-memory key-value backends
- **saving**: Gzip archives of the whole collection
- **mailer**: Mail drafts pre-filled from a row
- **config**: Settings from `SHEETDESK_*` variables
- **app**: axum routes over a shared session (feature `web`)

## Data Persistence

The whole collection lives under one key (`excelFiles` by default) as a JSON
array of `{fileName, headers, data}` objects. Every change writes the complete
next collection before the in-memory copy changes, so a failed write never
leaves the two out of step.

## Binaries

- `sheetdesk`: command line front end (`list`, `import`, `show`, `edit`,
  `delete-member`, `delete`, `export`, `backup`, `restore`, `mail`)
- `sheetdesk-web`: JSON API plus static front end (requires `--features web`)

## REST API Endpoints

- `GET /api/datasets`, `POST /api/datasets` - List and upload
- `POST /api/datasets/{name}/select` - Make a dataset active
- `DELETE /api/datasets/{name}?confirmed=true` - Delete a dataset
- `GET /api/datasets/{name}/export` - Download
- `GET /api/rows?filter=&sort=&page=&page_size=` - Page of the active dataset
- `PUT /api/rows/{index}`, `DELETE /api/rows/{index}?confirmed=true` - Edit or
  delete a member
- `GET /api/rows/{index}/mail`, `POST /api/mail` - Mail drafts
*/

pub mod config;
pub mod dates;
pub mod dialogs;
pub mod downloader;
pub mod error;
pub mod loader;
pub mod mailer;
pub mod mutation;
pub mod query;
pub mod record;
pub mod saving;
pub mod session;
pub mod storage;
pub mod store;

#[cfg(feature = "web")]
pub mod app;

pub use error::{ErrorKind, Result, SheetError};
pub use record::{CellValue, Dataset, Record};
pub use session::Session;
pub use store::RecordStore;
