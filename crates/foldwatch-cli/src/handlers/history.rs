use std::path::Path;

use anyhow::{Result, anyhow};
use foldwatch_history::{
    HistoryColumn, HistoryDatabase, ProductionView, QueryField, QueryFile, QueryOperator,
    QueryParameters, QueryValue,
};

pub fn list(
    data_dir: &Path,
    query_name: Option<String>,
    view: ProductionView,
    page: usize,
    page_size: usize,
    project: Option<u32>,
    client: Option<String>,
) -> Result<()> {
    let db = HistoryDatabase::open(data_dir.join("history.db"))?;

    let params = match query_name {
        Some(name) => {
            let file = QueryFile::load(data_dir.join("queries.json"))?;
            file.get(&name)
                .cloned()
                .ok_or_else(|| anyhow!("no saved query named '{name}'"))?
        }
        None => ad_hoc_query(project, client),
    };

    let page = db.page(page, page_size, &params, view)?;
    if page.entries.is_empty() {
        println!("No matching history entries.");
        return Ok(());
    }

    println!(
        "{:>6} {:<24} {:<16} {:<16} {:<16} {:>7} {:>10} {:>12}",
        "ID", "PROJECT", "CLIENT", "RESULT", "ASSIGNED", "FRAME", "CREDIT", "PPD"
    );
    for entry in &page.entries {
        println!(
            "{:>6} {:<24} {:<16} {:<16?} {:<16} {:>6}s {:>10.1} {:>12.1}",
            entry.id,
            entry.project.to_string(),
            entry.client_name,
            entry.result,
            entry
                .assigned
                .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                .unwrap_or_else(|| "-".to_string()),
            entry.frame_time_secs,
            entry.credit,
            entry.ppd,
        );
    }
    println!(
        "page {} of {} ({} entries)",
        page.page,
        page.page_count(),
        page.total_count
    );
    Ok(())
}

fn ad_hoc_query(project: Option<u32>, client: Option<String>) -> QueryParameters {
    let mut params = QueryParameters::new("ad hoc");
    if let Some(project) = project {
        params.fields.push(QueryField {
            column: HistoryColumn::Project,
            op: QueryOperator::Equal,
            value: QueryValue::Integer(project as i64),
        });
    }
    if let Some(pattern) = client {
        params.fields.push(QueryField {
            column: HistoryColumn::ClientName,
            op: QueryOperator::Like,
            value: QueryValue::Text(pattern),
        });
    }

    if params.fields.is_empty() {
        QueryParameters::select_all()
    } else {
        params
    }
}

pub fn delete(data_dir: &Path, id: i64) -> Result<()> {
    let db = HistoryDatabase::open(data_dir.join("history.db"))?;
    if db.delete(id)? == 0 {
        println!("No history entry with id {id}.");
    } else {
        println!("Deleted history entry {id}.");
    }
    Ok(())
}
