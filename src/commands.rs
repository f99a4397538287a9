use anyhow::{Context, Result};
use tracing::info;

use cellsync::config::Settings;
use cellsync::domain::entities::cell::CellValue;
use cellsync::domain::entities::column::{ColumnDefinition, ColumnSet};
use cellsync::domain::entities::dataset::{DatasetId, PageQuery, Row, ROW_ID_KEY};
use cellsync::domain::entities::edit::DirtyChange;
use cellsync::error::SaveError;
use cellsync::format::format_cell_value;
use cellsync::infra::import::csv::parse_field;
use cellsync::infra::sqlite::service::SqliteTableService;
use cellsync::usecase::ports::data_service::DataService;
use cellsync::usecase::services::import_service::ImportService;
use cellsync::usecase::services::table_editor::TableEditor;

use crate::cli::{Assignment, Cli, Command, EditArgs, ShowArgs};

pub fn run(cli: Cli) -> Result<()> {
    let mut settings = Settings::load(cli.config.as_deref()).context("failed to load settings")?;
    if let Some(db) = cli.db {
        settings.db_path = Some(db);
    }

    match cli.command {
        Command::Import(args) => run_import(&settings, &args.path),
        Command::List => run_list(&settings),
        Command::Show(args) => run_show(&settings, &args),
        Command::Edit(args) => run_edit(&settings, args),
    }
}

fn run_import(settings: &Settings, path: &std::path::Path) -> Result<()> {
    let service = ImportService::new(settings.resolve_db_path()?, settings.column_set()?);
    let result = service.import_csv(path)?;
    println!(
        "imported dataset #{} ({} rows)",
        result.dataset_id.0, result.row_count
    );
    Ok(())
}

fn run_list(settings: &Settings) -> Result<()> {
    let service = ImportService::new(settings.resolve_db_path()?, settings.column_set()?);
    let datasets = service.list_datasets()?;
    if datasets.is_empty() {
        println!("no datasets");
    }
    for dataset in datasets {
        println!(
            "#{:<4} {:<24} {:>8} rows  {}  {}",
            dataset.id.0, dataset.name, dataset.row_count, dataset.imported_at, dataset.source_path
        );
    }
    Ok(())
}

fn open_service(settings: &Settings, dataset: i64) -> Result<SqliteTableService> {
    let service = SqliteTableService::new(settings.resolve_db_path()?, DatasetId(dataset));
    service.init()?;
    Ok(service)
}

/// Builds an editor over `service`. Lazy tables load up to `max_pages`
/// pages; eager tables read every row up front.
fn open_editor(
    settings: &Settings,
    service: &SqliteTableService,
    max_pages: Option<usize>,
) -> Result<TableEditor> {
    let columns = service.columns()?;
    let config = settings.editor_config();

    if !config.lazy_loading {
        let rows = fetch_all(service, config.page_size)?;
        return Ok(TableEditor::new(columns, config, rows));
    }

    let mut editor = TableEditor::new(columns, config, Vec::new());
    let mut loaded = 0;
    while editor.has_more() && max_pages.map_or(true, |max| loaded < max) {
        editor.load_more(service)?;
        loaded += 1;
    }
    Ok(editor)
}

fn fetch_all(
    service: &SqliteTableService,
    page_size: usize,
) -> Result<Vec<Row>> {
    let mut rows = Vec::new();
    let mut page = 0;
    loop {
        let fetched = service.fetch_page(PageQuery { page, page_size })?;
        rows.extend(fetched.data);
        if !fetched.has_more {
            return Ok(rows);
        }
        page += 1;
    }
}

fn run_show(settings: &Settings, args: &ShowArgs) -> Result<()> {
    let service = open_service(settings, args.dataset)?;
    let editor = open_editor(settings, &service, Some(args.pages.max(1)))?;
    let columns = editor.columns();

    println!("{}", columns.keys().collect::<Vec<_>>().join("\t"));
    for row in editor.rows() {
        let cells: Vec<String> = columns
            .iter()
            .map(|column| {
                if column.key == ROW_ID_KEY {
                    row.id.clone()
                } else {
                    format_cell_value(column, &row.value_or_null(&column.key)).replace('\n', " ")
                }
            })
            .collect();
        println!("{}", cells.join("\t"));
    }

    let total = editor
        .cache()
        .paged()
        .map_or(editor.cache().row_count() as u64, |paged| paged.total());
    println!("-- {} of {} rows", editor.cache().row_count(), total);
    Ok(())
}

fn run_edit(settings: &Settings, args: EditArgs) -> Result<()> {
    let service = open_service(settings, args.dataset)?;
    let mut editor = open_editor(settings, &service, None)?.with_listener(|change: &DirtyChange| -> Result<()> {
        println!("saved {} = {}", change.cell_key(), change.value);
        Ok(())
    });

    for assignment in &args.assignments {
        let value = assignment_value(editor.columns(), assignment)?;
        editor
            .set_cell(&assignment.row_id, &assignment.column_key, value)
            .with_context(|| format!("failed to set {}:{}", assignment.row_id, assignment.column_key))?;
    }

    match editor.save_all(&service) {
        Ok(saved) => {
            info!(dataset = args.dataset, saved, "edit finished");
            Ok(())
        }
        Err(SaveError::Empty) => {
            println!("nothing to save");
            Ok(())
        }
        Err(err) => Err(err.into()),
    }
}

/// Inline columns take JSON or `;`-separated text; everything else is
/// handed to the editor as text and validated there.
fn assignment_value(columns: &ColumnSet, assignment: &Assignment) -> Result<CellValue> {
    let column: Option<&ColumnDefinition> = columns.get(&assignment.column_key);
    match column {
        Some(column) if column.kind.opens_inline() => parse_field(column, &assignment.raw),
        _ if assignment.raw.is_empty() => Ok(CellValue::Null),
        _ => Ok(CellValue::text(&assignment.raw)),
    }
}
