#![cfg(not(tarpaulin_include))]

use clap::{Parser, Subcommand};
use sheetdesk::config::Settings;
use sheetdesk::dialogs::{Confirm, Notice, NoticeLevel, Notify, Prompt};
use sheetdesk::query::RowRef;
use sheetdesk::session::Session;
use sheetdesk::storage::FileStore;
use sheetdesk::store::RecordStore;
use std::fs;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "sheetdesk")]
#[command(about = "Import, browse and edit member spreadsheets")]
#[command(version)]
struct Cli {
    #[arg(long, global = true, env = "SHEETDESK_DATA_DIR", help = "Directory holding the stored datasets")]
    data_dir: Option<PathBuf>,
    #[arg(long, global = true, env = "SHEETDESK_PAGE_SIZE", help = "Rows per page")]
    page_size: Option<usize>,
    #[arg(long, short, global = true, help = "Answer yes to every confirmation")]
    yes: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "List stored datasets")]
    List,
    #[command(about = "Import a spreadsheet, replacing a stored one with the same file name")]
    Import {
        #[arg(help = "Path to an xlsx/xls/ods/csv/tsv file")]
        path: PathBuf,
    },
    #[command(about = "Show one page of a dataset")]
    Show {
        dataset: String,
        #[arg(long, short, help = "Case-insensitive text every shown row must contain")]
        filter: Option<String>,
        #[arg(long, short, help = "Sort token such as NAME-ASC or MEMBER-DESC")]
        sort: Option<String>,
        #[arg(long, short, default_value_t = 1)]
        page: usize,
    },
    #[command(about = "Change fields of one row")]
    Edit {
        dataset: String,
        #[arg(help = "Row number as printed by `show`")]
        row: usize,
        #[arg(long = "set", value_name = "HEADER=VALUE", value_parser = parse_assignment, required = true)]
        assignments: Vec<(String, String)>,
    },
    #[command(about = "Delete every row sharing the member id of a row")]
    DeleteMember { dataset: String, row: usize },
    #[command(about = "Delete a stored dataset")]
    Delete { dataset: String },
    #[command(about = "Write a dataset back out as a file named after it")]
    Export {
        dataset: String,
        #[arg(long, short, help = "Output path (defaults to the dataset name)")]
        out: Option<PathBuf>,
    },
    #[command(about = "Write every stored dataset to a .json.gz archive")]
    Backup { path: PathBuf },
    #[command(about = "Replace every stored dataset with an archive's contents")]
    Restore { path: PathBuf },
    #[command(about = "Render a mail draft for a row")]
    Mail {
        dataset: String,
        row: usize,
        #[arg(long, default_value = "")]
        from: String,
        #[arg(long, default_value = "")]
        subject: String,
        #[arg(long, default_value = "")]
        message: String,
    },
}

fn parse_assignment(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((header, value)) if !header.trim().is_empty() => {
            Ok((header.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("expected HEADER=VALUE, got '{raw}'")),
    }
}

/// Asks on stderr and reads the answer from stdin.
struct TerminalConfirm {
    assume_yes: bool,
}

impl Confirm for TerminalConfirm {
    fn confirm(&mut self, prompt: &Prompt) -> bool {
        if self.assume_yes {
            return true;
        }
        eprint!(
            "{} {} [{} / {}] (y/N) ",
            prompt.title, prompt.body, prompt.confirm_label, prompt.cancel_label
        );
        let _ = io::stderr().flush();
        let mut answer = String::new();
        if io::stdin().lock().read_line(&mut answer).is_err() {
            return false;
        }
        matches!(answer.trim().to_lowercase().as_str(), "y" | "yes")
    }
}

struct ConsoleNotifier;

impl Notify for ConsoleNotifier {
    fn notify(&mut self, notice: Notice) {
        let tag = match notice.level {
            NoticeLevel::Success => "ok",
            NoticeLevel::Error => "error",
            NoticeLevel::Warning => "warning",
            NoticeLevel::Info => "info",
        };
        eprintln!("[{tag}] {}: {}", notice.title, notice.body);
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();

    let mut settings = Settings::from_env()?;
    if let Some(dir) = cli.data_dir {
        settings.data_dir = dir;
    }
    let store = RecordStore::open_with_key(FileStore::new(&settings.data_dir), settings.storage_key)?;
    let mut session = Session::new(store, ConsoleNotifier).with_page_size(settings.page_size);
    if let Some(size) = cli.page_size {
        session.set_page_size(size)?;
    }
    let mut confirm = TerminalConfirm {
        assume_yes: cli.yes,
    };

    match cli.command {
        Commands::List => {
            for summary in session.datasets() {
                println!("{}", summary.name);
            }
        }
        Commands::Import { path } => {
            let bytes = fs::read(&path)?;
            let file_name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string());
            session.upload(&bytes, &file_name)?;
        }
        Commands::Show {
            dataset,
            filter,
            sort,
            page,
        } => {
            session.select(&dataset)?;
            if let Some(filter) = filter {
                session.set_filter(filter);
            }
            if let Some(sort) = sort {
                session.set_sort_token(&sort)?;
            }
            session.go_to_page(page);
            print_page(&mut session);
        }
        Commands::Edit {
            dataset,
            row,
            assignments,
        } => {
            session.select(&dataset)?;
            session.begin_edit(RowRef(row))?;
            for (header, value) in assignments {
                session.set_field(&header, value)?;
            }
            session.save_edit(&mut confirm)?;
        }
        Commands::DeleteMember { dataset, row } => {
            session.select(&dataset)?;
            session.delete_member(RowRef(row), &mut confirm)?;
        }
        Commands::Delete { dataset } => {
            session.delete_dataset(&dataset, &mut confirm)?;
        }
        Commands::Export { dataset, out } => {
            let file = session.export(&dataset)?;
            let out = out.unwrap_or_else(|| PathBuf::from(&file.file_name));
            fs::write(&out, &file.bytes)?;
            println!("wrote {} ({} bytes)", out.display(), file.bytes.len());
        }
        Commands::Backup { path } => {
            session.backup(&path)?;
        }
        Commands::Restore { path } => {
            session.restore(&path, &mut confirm)?;
        }
        Commands::Mail {
            dataset,
            row,
            from,
            subject,
            message,
        } => {
            session.select(&dataset)?;
            let mut draft = session.compose_mail(RowRef(row))?;
            draft.from = from;
            draft.subject = subject;
            draft.message = message;
            println!("{}", session.submit_mail(&draft));
        }
    }

    Ok(())
}

fn print_page(session: &mut Session<FileStore, ConsoleNotifier>) {
    let headers = session.headers().to_vec();
    let page = session.current_page();

    println!("ROW\t{}", headers.join("\t"));
    for entry in &page.rows {
        let cells: Vec<String> = headers.iter().map(|h| entry.record.get(h).to_text()).collect();
        println!("{}\t{}", entry.row.0, cells.join("\t"));
    }
    println!(
        "page {} of {} ({} matching rows)",
        page.page, page.total_pages, page.total_matches
    );
}
