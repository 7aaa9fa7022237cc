// src/import.rs - Tolerant spreadsheet reader and purchase order import
//
// Files arrive from several SAP exports with inconsistent column labels,
// so every field is looked up through a candidate list first and a
// token fallback second. Unparseable numerics become 0 instead of
// failing the row.

use std::collections::{HashMap, HashSet};
use std::io::Cursor;

use calamine::{open_workbook_auto_from_rs, Data, Reader};
use chrono::Utc;
use serde::Serialize;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::models::{generate_business_id, progress_rate, round2};

// ==================== CELLS AND SHEETS ====================

#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Empty,
    Number(f64),
    Text(String),
}

impl Cell {
    fn from_data(data: &Data) -> Self {
        match data {
            Data::Empty => Cell::Empty,
            Data::Float(v) => Cell::Number(*v),
            Data::Int(v) => Cell::Number(*v as f64),
            Data::Bool(b) => Cell::Text(b.to_string()),
            Data::String(s) => Cell::Text(s.clone()),
            Data::DateTime(dt) => match dt.as_datetime() {
                Some(naive) => Cell::Text(naive.format("%Y-%m-%d").to_string()),
                None => Cell::Empty,
            },
            Data::DateTimeIso(s) => Cell::Text(s.clone()),
            Data::DurationIso(s) => Cell::Text(s.clone()),
            Data::Error(_) => Cell::Empty,
        }
    }
}

#[derive(Debug)]
pub struct Sheet {
    headers: Vec<String>, // normalized, by column index
    pub rows: Vec<Vec<Cell>>,
}

/// Header normalization: trim, lowercase, underscores and dashes become
/// spaces, whitespace runs collapse.
pub fn normalize_header(header: &str) -> String {
    header
        .trim()
        .to_lowercase()
        .replace(['_', '-'], " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

impl Sheet {
    pub fn new(headers: Vec<String>, rows: Vec<Vec<Cell>>) -> Self {
        let headers = headers.iter().map(|h| normalize_header(h)).collect();
        Self { headers, rows }
    }

    /// Exact candidate match first, then any header containing all of the
    /// field's tokens as substrings.
    pub fn find_column(&self, candidates: &[&str], tokens: &[&str]) -> Option<usize> {
        for candidate in candidates {
            let normalized = normalize_header(candidate);
            if let Some(idx) = self.headers.iter().position(|h| *h == normalized) {
                return Some(idx);
            }
        }
        if tokens.is_empty() {
            return None;
        }
        self.headers
            .iter()
            .position(|h| tokens.iter().all(|t| h.contains(t)))
    }

    pub fn cell<'a>(&self, row: &'a [Cell], column: Option<usize>) -> &'a Cell {
        match column {
            Some(idx) => row.get(idx).unwrap_or(&Cell::Empty),
            None => &Cell::Empty,
        }
    }
}

/// Open an uploaded spreadsheet. XLSX and friends go through calamine;
/// anything calamine rejects is retried as CSV.
pub fn parse_sheet(bytes: &[u8]) -> ApiResult<Sheet> {
    match open_workbook_auto_from_rs(Cursor::new(bytes.to_vec())) {
        Ok(mut workbook) => {
            let sheet_name = workbook
                .sheet_names()
                .first()
                .cloned()
                .ok_or_else(|| ApiError::BadRequest("Workbook has no sheets".to_string()))?;
            let range = workbook
                .worksheet_range(&sheet_name)
                .map_err(|e| ApiError::BadRequest(format!("Failed to read sheet: {}", e)))?;

            let mut rows_iter = range.rows();
            let headers: Vec<String> = rows_iter
                .next()
                .ok_or_else(|| ApiError::BadRequest("Sheet is empty".to_string()))?
                .iter()
                .map(|c| c.to_string())
                .collect();
            let rows = rows_iter
                .map(|row| row.iter().map(Cell::from_data).collect())
                .collect();
            Ok(Sheet::new(headers, rows))
        }
        Err(_) => parse_csv(bytes),
    }
}

fn parse_csv(bytes: &[u8]) -> ApiResult<Sheet> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(bytes);

    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| ApiError::BadRequest(format!("Failed to read CSV headers: {}", e)))?
        .iter()
        .map(|h| h.to_string())
        .collect();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record =
            record.map_err(|e| ApiError::BadRequest(format!("Failed to read CSV row: {}", e)))?;
        rows.push(
            record
                .iter()
                .map(|field| {
                    if field.trim().is_empty() {
                        Cell::Empty
                    } else {
                        Cell::Text(field.to_string())
                    }
                })
                .collect(),
        );
    }
    Ok(Sheet::new(headers, rows))
}

// ==================== CELL CLEANING ====================

/// Placeholder values written by upstream exports count as missing.
pub fn clean_text(cell: &Cell) -> Option<String> {
    let text = match cell {
        Cell::Empty => return None,
        Cell::Number(v) => {
            // Whole numbers drop the trailing .0 so PO numbers survive
            if v.fract() == 0.0 {
                format!("{}", *v as i64)
            } else {
                v.to_string()
            }
        }
        Cell::Text(s) => s.trim().to_string(),
    };
    if text.is_empty() {
        return None;
    }
    match text.to_lowercase().as_str() {
        "nan" | "nat" | "none" | "null" => None,
        _ => Some(text),
    }
}

pub fn is_stale_text(value: &Option<String>) -> bool {
    match value {
        None => true,
        Some(s) => {
            let t = s.trim().to_lowercase();
            t.is_empty() || matches!(t.as_str(), "nan" | "nat" | "none" | "null")
        }
    }
}

/// Fail-soft amount parsing; decimal commas are normalized, garbage is 0.
pub fn parse_amount(raw: &str) -> f64 {
    let mut s: String = raw
        .trim()
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '\u{a0}')
        .collect();
    if s.contains(',') && s.contains('.') {
        // 1,234.56 style: comma is a thousands separator
        s = s.replace(',', "");
    } else if s.contains(',') {
        s = s.replace(',', ".");
    }
    s.parse::<f64>().map(round2).unwrap_or(0.0)
}

pub fn cell_amount(cell: &Cell) -> f64 {
    match cell {
        Cell::Empty => 0.0,
        Cell::Number(v) => round2(*v),
        Cell::Text(s) => parse_amount(s),
    }
}

// ==================== COLUMN CATALOG ====================

struct Columns {
    document: Option<usize>,
    item: Option<usize>,
    supplier: Option<usize>,
    description: Option<usize>,
    ordered_qty: Option<usize>,
    received_qty: Option<usize>,
    still_to_deliver: Option<usize>,
    net_price: Option<usize>,
    net_order_value: Option<usize>,
    currency: Option<usize>,
    delivery_date: Option<usize>,
    plant: Option<usize>,
    storage_location: Option<usize>,
    release_indicator: Option<usize>,
    document_date: Option<usize>,
    purchasing_group: Option<usize>,
    release_date: Option<usize>,
    ordered_by: Option<usize>,
}

impl Columns {
    fn resolve(sheet: &Sheet) -> Self {
        Self {
            document: sheet.find_column(
                &["Purchasing Document", "PO Number", "Purchasing Doc"],
                &["purchasing", "document"],
            ),
            item: sheet.find_column(&["Item", "PO Item", "Item Number"], &["item"]),
            supplier: sheet.find_column(
                &["Supplier/Supplying Plant", "Supplier", "Vendor", "Vendor Name"],
                &["supplier"],
            ),
            description: sheet.find_column(&["Short Text", "Description"], &["short", "text"]),
            ordered_qty: sheet.find_column(&["Order Quantity", "Quantity"], &["order", "quantity"]),
            received_qty: sheet.find_column(
                &["Quantity Received", "Received Quantity", "GR Quantity"],
                &["received"],
            ),
            still_to_deliver: sheet.find_column(
                &["Still to be delivered (qty)", "Still to Deliver"],
                &["still", "deliver"],
            ),
            net_price: sheet.find_column(&["Net Price"], &["net", "price"]),
            net_order_value: sheet.find_column(&["Net Order Value"], &["net", "order", "value"]),
            currency: sheet.find_column(&["Currency"], &["currency"]),
            delivery_date: sheet.find_column(&["Delivery Date"], &["delivery", "date"]),
            plant: sheet.find_column(&["Plant"], &["plant"]),
            storage_location: sheet.find_column(&["Storage Location"], &["storage", "location"]),
            release_indicator: sheet
                .find_column(&["Release Indicator"], &["release", "indicator"]),
            document_date: sheet.find_column(&["Document Date"], &["document", "date"]),
            purchasing_group: sheet.find_column(&["Purchasing Group"], &["purchasing", "group"]),
            release_date: sheet.find_column(&["Release Date"], &["release", "date"]),
            ordered_by: sheet.find_column(&["Created By", "Ordered By"], &["created", "by"]),
        }
    }
}

// ==================== IMPORT ====================

#[derive(Debug, Serialize, Default)]
pub struct ImportSummary {
    pub lines_processed: u64,
    pub pos_created: u64,
    pub pos_updated: u64,
    pub errors: Vec<String>,
}

/// Run the whole import in one transaction: supplier and PO get-or-create,
/// line upsert by business id, then one cached-amount recomputation per
/// affected PO.
pub async fn import_purchase_orders(
    pool: &SqlitePool,
    bytes: &[u8],
    filename: &str,
    user_id: Option<&str>,
) -> ApiResult<ImportSummary> {
    let sheet = parse_sheet(bytes)?;
    let columns = Columns::resolve(&sheet);

    if columns.document.is_none() {
        return Err(ApiError::BadRequest(
            "No purchasing document column found in file".to_string(),
        ));
    }

    let mut summary = ImportSummary::default();
    let mut supplier_cache: HashMap<String, String> = HashMap::new();
    let mut po_cache: HashMap<String, String> = HashMap::new();
    let mut affected: HashSet<String> = HashSet::new();

    let mut tx = pool.begin().await?;

    for (idx, row) in sheet.rows.iter().enumerate() {
        // Header occupies the first file row
        let row_number = idx + 2;

        let po_number = match clean_text(sheet.cell(row, columns.document)) {
            Some(v) => v,
            None => {
                summary
                    .errors
                    .push(format!("Row {}: missing purchasing document", row_number));
                continue;
            }
        };
        let item_number = match clean_text(sheet.cell(row, columns.item)) {
            Some(v) => v,
            None => {
                summary
                    .errors
                    .push(format!("Row {}: missing item number", row_number));
                continue;
            }
        };

        let supplier_name = clean_text(sheet.cell(row, columns.supplier));
        let supplier_id = match supplier_name {
            Some(name) => Some(match supplier_cache.get(&name) {
                Some(id) => id.clone(),
                None => {
                    let id = get_or_create_supplier(&mut tx, &name).await?;
                    supplier_cache.insert(name, id.clone());
                    id
                }
            }),
            None => None,
        };

        let header = PoHeaderFields {
            release_indicator: clean_text(sheet.cell(row, columns.release_indicator)),
            document_date: clean_text(sheet.cell(row, columns.document_date)),
            purchasing_group: clean_text(sheet.cell(row, columns.purchasing_group)),
            release_date: clean_text(sheet.cell(row, columns.release_date)),
            ordered_by: clean_text(sheet.cell(row, columns.ordered_by)),
        };

        let po_id = match po_cache.get(&po_number) {
            Some(id) => {
                fill_po_header(&mut tx, id, supplier_id.as_deref(), &header).await?;
                id.clone()
            }
            None => {
                let (id, created) =
                    get_or_create_po(&mut tx, &po_number, supplier_id.as_deref(), &header).await?;
                if created {
                    summary.pos_created += 1;
                } else {
                    summary.pos_updated += 1;
                }
                po_cache.insert(po_number.clone(), id.clone());
                id
            }
        };

        let line = LineFields {
            business_id: generate_business_id(&po_number, &item_number),
            item_number,
            description: clean_text(sheet.cell(row, columns.description)),
            ordered_quantity: cell_amount(sheet.cell(row, columns.ordered_qty)),
            received_quantity: cell_amount(sheet.cell(row, columns.received_qty)),
            still_to_deliver: cell_amount(sheet.cell(row, columns.still_to_deliver)),
            net_price: cell_amount(sheet.cell(row, columns.net_price)),
            net_order_value: cell_amount(sheet.cell(row, columns.net_order_value)),
            currency: clean_text(sheet.cell(row, columns.currency)),
            delivery_date: clean_text(sheet.cell(row, columns.delivery_date)),
            plant: clean_text(sheet.cell(row, columns.plant)),
            storage_location: clean_text(sheet.cell(row, columns.storage_location)),
        };

        upsert_line(&mut tx, &po_id, &line).await?;
        affected.insert(po_id);
        summary.lines_processed += 1;
    }

    // One recomputation per affected PO, whatever the line count was
    for po_id in &affected {
        update_po_amounts(&mut tx, po_id).await?;
    }

    tx.commit().await?;

    record_imported_file(pool, filename, summary.lines_processed as i64, user_id).await;

    log::info!(
        "Imported {}: {} lines, {} POs created, {} updated, {} errors",
        filename,
        summary.lines_processed,
        summary.pos_created,
        summary.pos_updated,
        summary.errors.len()
    );

    Ok(summary)
}

struct PoHeaderFields {
    release_indicator: Option<String>,
    document_date: Option<String>,
    purchasing_group: Option<String>,
    release_date: Option<String>,
    ordered_by: Option<String>,
}

struct LineFields {
    business_id: String,
    item_number: String,
    description: Option<String>,
    ordered_quantity: f64,
    received_quantity: f64,
    still_to_deliver: f64,
    net_price: f64,
    net_order_value: f64,
    currency: Option<String>,
    delivery_date: Option<String>,
    plant: Option<String>,
    storage_location: Option<String>,
}

async fn get_or_create_supplier(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    name: &str,
) -> ApiResult<String> {
    let existing: Option<(String,)> = sqlx::query_as("SELECT id FROM suppliers WHERE name = ?")
        .bind(name)
        .fetch_optional(&mut **tx)
        .await?;
    if let Some((id,)) = existing {
        return Ok(id);
    }

    let id = Uuid::new_v4().to_string();
    let now = Utc::now();
    sqlx::query(
        r#"INSERT INTO suppliers (
            id, name, supplier_kind, category_kind, description, active,
            created_at, updated_at
        ) VALUES (?, ?, 'local', 'goods', ?, 1, ?, ?)"#,
    )
    .bind(&id)
    .bind(name)
    .bind("Created automatically by purchase order import")
    .bind(now)
    .bind(now)
    .execute(&mut **tx)
    .await?;
    Ok(id)
}

async fn get_or_create_po(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    number: &str,
    supplier_id: Option<&str>,
    header: &PoHeaderFields,
) -> ApiResult<(String, bool)> {
    let existing: Option<(String,)> = sqlx::query_as("SELECT id FROM purchase_orders WHERE number = ?")
        .bind(number)
        .fetch_optional(&mut **tx)
        .await?;

    if let Some((id,)) = existing {
        fill_po_header(tx, &id, supplier_id, header).await?;
        return Ok((id, false));
    }

    let id = Uuid::new_v4().to_string();
    let now = Utc::now();
    sqlx::query(
        r#"INSERT INTO purchase_orders (
            id, number, supplier_id, release_indicator, document_date,
            purchasing_group, release_date, ordered_by,
            total, received, remaining, progress_rate,
            created_at, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, 0, 0, 0, 0, ?, ?)"#,
    )
    .bind(&id)
    .bind(number)
    .bind(supplier_id)
    .bind(&header.release_indicator)
    .bind(&header.document_date)
    .bind(&header.purchasing_group)
    .bind(&header.release_date)
    .bind(&header.ordered_by)
    .bind(now)
    .bind(now)
    .execute(&mut **tx)
    .await?;
    Ok((id, true))
}

/// Header fields fill only empty slots; stale placeholder values left by
/// earlier imports count as empty and get overwritten.
async fn fill_po_header(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    po_id: &str,
    supplier_id: Option<&str>,
    header: &PoHeaderFields,
) -> ApiResult<()> {
    let current: (Option<String>, Option<String>, Option<String>, Option<String>, Option<String>, Option<String>) =
        sqlx::query_as(
            r#"SELECT supplier_id, release_indicator, document_date,
                      purchasing_group, release_date, ordered_by
               FROM purchase_orders WHERE id = ?"#,
        )
        .bind(po_id)
        .fetch_one(&mut **tx)
        .await?;

    let (cur_supplier, cur_release, cur_doc_date, cur_group, cur_rel_date, cur_ordered_by) = current;

    let new_supplier = match (&cur_supplier, supplier_id) {
        (None, Some(s)) => Some(s.to_string()),
        _ => cur_supplier.clone(),
    };
    let pick = |current: Option<String>, incoming: &Option<String>| {
        if is_stale_text(&current) {
            incoming.clone().or(current)
        } else {
            current
        }
    };
    let new_release = pick(cur_release, &header.release_indicator);
    let new_doc_date = pick(cur_doc_date, &header.document_date);
    let new_group = pick(cur_group, &header.purchasing_group);
    let new_rel_date = pick(cur_rel_date, &header.release_date);
    let new_ordered_by = pick(cur_ordered_by, &header.ordered_by);

    sqlx::query(
        r#"UPDATE purchase_orders SET
            supplier_id = ?, release_indicator = ?, document_date = ?,
            purchasing_group = ?, release_date = ?, ordered_by = ?,
            updated_at = datetime('now')
        WHERE id = ?"#,
    )
    .bind(&new_supplier)
    .bind(&new_release)
    .bind(&new_doc_date)
    .bind(&new_group)
    .bind(&new_rel_date)
    .bind(&new_ordered_by)
    .bind(po_id)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

/// Numeric fields always win; text fields only overwrite when the incoming
/// cell carried a value.
async fn upsert_line(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    po_id: &str,
    line: &LineFields,
) -> ApiResult<()> {
    let existing: Option<(String,)> =
        sqlx::query_as("SELECT id FROM purchase_order_lines WHERE business_id = ?")
            .bind(&line.business_id)
            .fetch_optional(&mut **tx)
            .await?;

    let now = Utc::now();
    match existing {
        Some((id,)) => {
            sqlx::query(
                r#"UPDATE purchase_order_lines SET
                    order_id = ?,
                    ordered_quantity = ?, received_quantity = ?,
                    still_to_deliver = ?, net_price = ?, net_order_value = ?,
                    description = COALESCE(?, description),
                    currency = COALESCE(?, currency),
                    delivery_date = COALESCE(?, delivery_date),
                    plant = COALESCE(?, plant),
                    storage_location = COALESCE(?, storage_location),
                    updated_at = ?
                WHERE id = ?"#,
            )
            .bind(po_id)
            .bind(line.ordered_quantity)
            .bind(line.received_quantity)
            .bind(line.still_to_deliver)
            .bind(line.net_price)
            .bind(line.net_order_value)
            .bind(&line.description)
            .bind(&line.currency)
            .bind(&line.delivery_date)
            .bind(&line.plant)
            .bind(&line.storage_location)
            .bind(now)
            .bind(&id)
            .execute(&mut **tx)
            .await?;
        }
        None => {
            sqlx::query(
                r#"INSERT INTO purchase_order_lines (
                    id, business_id, order_id, item_number, description,
                    ordered_quantity, received_quantity, still_to_deliver,
                    net_price, net_order_value, currency, delivery_date,
                    plant, storage_location, created_at, updated_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
            )
            .bind(Uuid::new_v4().to_string())
            .bind(&line.business_id)
            .bind(po_id)
            .bind(&line.item_number)
            .bind(&line.description)
            .bind(line.ordered_quantity)
            .bind(line.received_quantity)
            .bind(line.still_to_deliver)
            .bind(line.net_price)
            .bind(line.net_order_value)
            .bind(&line.currency)
            .bind(&line.delivery_date)
            .bind(&line.plant)
            .bind(&line.storage_location)
            .bind(now)
            .bind(now)
            .execute(&mut **tx)
            .await?;
        }
    }
    Ok(())
}

async fn update_po_amounts(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    po_id: &str,
) -> ApiResult<()> {
    let sums: (Option<f64>, Option<f64>, Option<f64>) = sqlx::query_as(
        r#"SELECT
            SUM(net_order_value),
            SUM(received_quantity * net_price),
            SUM(still_to_deliver * net_price)
        FROM purchase_order_lines WHERE order_id = ?"#,
    )
    .bind(po_id)
    .fetch_one(&mut **tx)
    .await?;

    let total = round2(sums.0.unwrap_or(0.0));
    let received = round2(sums.1.unwrap_or(0.0));
    let remaining = round2(sums.2.unwrap_or(0.0));
    let progress = progress_rate(total, received);

    sqlx::query(
        r#"UPDATE purchase_orders SET
            total = ?, received = ?, remaining = ?, progress_rate = ?,
            updated_at = datetime('now')
        WHERE id = ?"#,
    )
    .bind(total)
    .bind(received)
    .bind(remaining)
    .bind(progress)
    .bind(po_id)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

/// Upload trace. Never fails the import that produced it.
async fn record_imported_file(
    pool: &SqlitePool,
    filename: &str,
    rows_count: i64,
    user_id: Option<&str>,
) {
    let extension = filename.rsplit('.').next().map(|e| e.to_lowercase());
    let result = sqlx::query(
        r#"INSERT INTO imported_files (id, filename, extension, rows_count, uploaded_by, imported_at)
           VALUES (?, ?, ?, ?, ?, ?)"#,
    )
    .bind(Uuid::new_v4().to_string())
    .bind(filename)
    .bind(extension)
    .bind(rows_count)
    .bind(user_id)
    .bind(Utc::now())
    .execute(pool)
    .await;

    if let Err(e) = result {
        log::warn!("Failed to record imported file '{}': {}", filename, e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;
    use crate::models::PurchaseOrder;

    #[test]
    fn test_normalize_header() {
        assert_eq!(normalize_header("  Purchasing_Document "), "purchasing document");
        assert_eq!(normalize_header("Net-Order-Value"), "net order value");
        assert_eq!(normalize_header("Short   Text"), "short text");
        assert_eq!(normalize_header("PLANT"), "plant");
    }

    #[test]
    fn test_find_column_exact_then_tokens() {
        let sheet = Sheet::new(
            vec![
                "PO Number".to_string(),
                "The Item Col".to_string(),
                "Document Date".to_string(),
            ],
            vec![],
        );
        // Exact candidate
        assert_eq!(
            sheet.find_column(&["Purchasing Document", "PO Number"], &["purchasing", "document"]),
            Some(0)
        );
        // Token fallback
        assert_eq!(sheet.find_column(&["Item"], &["item"]), Some(1));
        // "document date" has "document" but not "purchasing"
        assert_eq!(
            sheet.find_column(&["Nonexistent"], &["purchasing", "document"]),
            None
        );
        assert_eq!(sheet.find_column(&["Missing"], &["missing"]), None);
    }

    #[test]
    fn test_clean_text() {
        assert_eq!(clean_text(&Cell::Empty), None);
        assert_eq!(clean_text(&Cell::Text("  ".to_string())), None);
        assert_eq!(clean_text(&Cell::Text("NaN".to_string())), None);
        assert_eq!(clean_text(&Cell::Text("NaT".to_string())), None);
        assert_eq!(clean_text(&Cell::Text("null".to_string())), None);
        assert_eq!(clean_text(&Cell::Text("None".to_string())), None);
        assert_eq!(
            clean_text(&Cell::Text(" ACME SARL ".to_string())),
            Some("ACME SARL".to_string())
        );
        // Numeric PO numbers lose the float artifacts
        assert_eq!(clean_text(&Cell::Number(4500001234.0)), Some("4500001234".to_string()));
    }

    #[test]
    fn test_parse_amount() {
        assert_eq!(parse_amount("1234.56"), 1234.56);
        assert_eq!(parse_amount("1 234,56"), 1234.56);
        assert_eq!(parse_amount("1,234.56"), 1234.56);
        assert_eq!(parse_amount("12,5"), 12.5);
        assert_eq!(parse_amount(""), 0.0);
        assert_eq!(parse_amount("garbage"), 0.0);
        assert_eq!(parse_amount("  42 "), 42.0);
    }

    #[test]
    fn test_parse_sheet_csv_fallback() {
        let csv = b"PO Number,Item,Net Price\n4500001234,10,12.5\n";
        let sheet = parse_sheet(csv).unwrap();
        assert_eq!(sheet.rows.len(), 1);
        assert_eq!(sheet.find_column(&["PO Number"], &[]), Some(0));
    }

    const IMPORT_CSV: &str = "\
Purchasing Document,Item,Supplier,Short Text,Order Quantity,Quantity Received,Still to be delivered (qty),Net Price,Net Order Value,Currency,Release Indicator,Purchasing Group
4500001234,10,ACME SARL,Cement bags,100,40,60,12.5,1250,XOF,G,C01
4500001234,20,ACME SARL,Gravel,10,10,0,50,500,XOF,G,C01
4500009999,10,Beta Ltd,Steel rods,5,0,5,100,500,EUR,nan,
,10,Ghost,No document,1,0,1,1,1,XOF,,
";

    #[tokio::test]
    async fn test_import_creates_orders_and_totals() {
        let pool = test_pool().await;
        let summary = import_purchase_orders(&pool, IMPORT_CSV.as_bytes(), "orders.csv", None)
            .await
            .unwrap();

        assert_eq!(summary.lines_processed, 3);
        assert_eq!(summary.pos_created, 2);
        assert_eq!(summary.pos_updated, 0);
        assert_eq!(summary.errors.len(), 1);
        assert!(summary.errors[0].contains("Row 5"));

        let po: PurchaseOrder =
            sqlx::query_as("SELECT * FROM purchase_orders WHERE number = '4500001234'")
                .fetch_one(&pool)
                .await
                .unwrap();
        // total = 1250 + 500; received = 40*12.5 + 10*50; remaining = 60*12.5
        assert_eq!(po.total, 1750.0);
        assert_eq!(po.received, 1000.0);
        assert_eq!(po.remaining, 750.0);
        assert_eq!(po.progress_rate, 57.14);
        assert_eq!(po.purchasing_group.as_deref(), Some("C01"));

        // Supplier auto-created with the import marker
        let supplier: (String, Option<String>) =
            sqlx::query_as("SELECT id, description FROM suppliers WHERE name = 'ACME SARL'")
                .fetch_one(&pool)
                .await
                .unwrap();
        assert!(supplier.1.unwrap().contains("automatically"));
        assert_eq!(po.supplier_id, Some(supplier.0));

        // Stale 'nan' release indicator was dropped, not stored
        let other: PurchaseOrder =
            sqlx::query_as("SELECT * FROM purchase_orders WHERE number = '4500009999'")
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(other.release_indicator, None);

        // Upload trace was written
        let trace: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM imported_files")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(trace.0, 1);
    }

    #[tokio::test]
    async fn test_reimport_upserts_by_business_id() {
        let pool = test_pool().await;
        import_purchase_orders(&pool, IMPORT_CSV.as_bytes(), "orders.csv", None)
            .await
            .unwrap();

        // Same PO, line 10 now fully received
        let updated = "\
Purchasing Document,Item,Supplier,Short Text,Order Quantity,Quantity Received,Still to be delivered (qty),Net Price,Net Order Value,Currency
4500001234,10,ACME SARL,Cement bags,100,100,0,12.5,1250,XOF
";
        let summary = import_purchase_orders(&pool, updated.as_bytes(), "orders2.csv", None)
            .await
            .unwrap();
        assert_eq!(summary.pos_created, 0);
        assert_eq!(summary.pos_updated, 1);

        let lines: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM purchase_order_lines WHERE business_id = '4500001234-0010'",
        )
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(lines.0, 1);

        let po: PurchaseOrder =
            sqlx::query_as("SELECT * FROM purchase_orders WHERE number = '4500001234'")
                .fetch_one(&pool)
                .await
                .unwrap();
        // received = 100*12.5 + 10*50; remaining = 0
        assert_eq!(po.received, 1750.0);
        assert_eq!(po.remaining, 0.0);
        assert_eq!(po.progress_rate, 100.0);
    }

    #[tokio::test]
    async fn test_import_without_document_column_fails() {
        let pool = test_pool().await;
        let csv = b"Something,Else\n1,2\n";
        let result = import_purchase_orders(&pool, csv, "bad.csv", None).await;
        assert!(result.is_err());
    }
}
