// src/report_handlers.rs - CSV and XLSX exports
//
// All exports are admin only. CSV files carry fixed header rows so
// downstream spreadsheets keep working when columns are added here.

use actix_web::{web, HttpRequest, HttpResponse};
use rust_xlsxwriter::{Chart, ChartType, Color, Format, Workbook};
use serde::Deserialize;
use sqlx::SqlitePool;
use std::sync::Arc;

use crate::auth::{require_permission, UserRole};
use crate::error::{ApiError, ApiResult};
use crate::evaluation_handlers::{compute_ranking, yearly_series, RankingEntry};
use crate::models::{SupplierEvaluation, VENDOR_CRITERIA};
use crate::AppState;

fn csv_error(e: impl std::fmt::Display) -> ApiError {
    ApiError::InternalServerError(format!("CSV generation failed: {}", e))
}

fn xlsx_error(e: impl std::fmt::Display) -> ApiError {
    ApiError::InternalServerError(format!("XLSX generation failed: {}", e))
}

fn csv_response(filename: &str, data: Vec<u8>) -> HttpResponse {
    HttpResponse::Ok()
        .content_type("text/csv; charset=utf-8")
        .insert_header((
            "Content-Disposition",
            format!("attachment; filename=\"{}\"", filename),
        ))
        .body(data)
}

fn xlsx_response(filename: &str, data: Vec<u8>) -> HttpResponse {
    HttpResponse::Ok()
        .content_type("application/vnd.openxmlformats-officedocument.spreadsheetml.sheet")
        .insert_header((
            "Content-Disposition",
            format!("attachment; filename=\"{}\"", filename),
        ))
        .body(data)
}

// ==================== CSV EXPORTS ====================

#[derive(Debug, sqlx::FromRow)]
struct ContractExportRow {
    number: String,
    subject: String,
    kind: String,
    amount: f64,
    currency: String,
    supplier_name: String,
    status: String,
    expiry_date: String,
}

pub async fn export_contracts_csv(
    app_state: web::Data<Arc<AppState>>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    let pool = &app_state.db_pool;
    require_permission(&http_request, UserRole::can_export_reports)?;

    let rows = sqlx::query_as::<_, ContractExportRow>(
        r#"
        SELECT c.number, c.subject, c.kind, c.amount, c.currency,
               s.name AS supplier_name, c.status, c.expiry_date
        FROM contracts c
        JOIN suppliers s ON s.id = c.supplier_id
        ORDER BY c.number ASC
        "#,
    )
    .fetch_all(pool)
    .await?;

    let mut writer = csv::Writer::from_writer(Vec::new());
    writer
        .write_record([
            "Number", "Subject", "Kind", "Amount", "Currency", "Supplier", "Status",
            "Expiry Date",
        ])
        .map_err(csv_error)?;
    for row in rows {
        writer
            .write_record([
                row.number,
                row.subject,
                row.kind,
                format!("{:.2}", row.amount),
                row.currency,
                row.supplier_name,
                row.status,
                row.expiry_date,
            ])
            .map_err(csv_error)?;
    }
    let data = writer.into_inner().map_err(csv_error)?;

    log::info!("Exported contracts.csv");
    Ok(csv_response("contracts.csv", data))
}

#[derive(Debug, sqlx::FromRow)]
struct SupplierExportRow {
    name: String,
    category: Option<String>,
    supplier_kind: String,
    email: Option<String>,
    phone: Option<String>,
    active: bool,
}

pub async fn export_suppliers_csv(
    app_state: web::Data<Arc<AppState>>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    let pool = &app_state.db_pool;
    require_permission(&http_request, UserRole::can_export_reports)?;

    let rows = sqlx::query_as::<_, SupplierExportRow>(
        "SELECT name, category, supplier_kind, email, phone, active FROM suppliers ORDER BY name ASC",
    )
    .fetch_all(pool)
    .await?;

    let mut writer = csv::Writer::from_writer(Vec::new());
    writer
        .write_record(["Name", "Category", "Supplier Kind", "Email", "Phone", "Active"])
        .map_err(csv_error)?;
    for row in rows {
        writer
            .write_record([
                row.name,
                row.category.unwrap_or_default(),
                row.supplier_kind,
                row.email.unwrap_or_default(),
                row.phone.unwrap_or_default(),
                if row.active { "Yes".to_string() } else { "No".to_string() },
            ])
            .map_err(csv_error)?;
    }
    let data = writer.into_inner().map_err(csv_error)?;

    log::info!("Exported suppliers.csv");
    Ok(csv_response("suppliers.csv", data))
}

#[derive(Debug, sqlx::FromRow)]
struct EvaluationExportRow {
    supplier_name: String,
    delivery_compliance: i64,
    delivery_timeline: i64,
    advising_capability: i64,
    after_sales_qos: i64,
    vendor_relationship: i64,
    final_rating: f64,
    evaluator: Option<String>,
    comments: Option<String>,
    created_at: String,
}

pub async fn export_evaluations_csv(
    app_state: web::Data<Arc<AppState>>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    let pool = &app_state.db_pool;
    require_permission(&http_request, UserRole::can_export_reports)?;

    let rows = sqlx::query_as::<_, EvaluationExportRow>(
        r#"
        SELECT s.name AS supplier_name, e.delivery_compliance, e.delivery_timeline,
               e.advising_capability, e.after_sales_qos, e.vendor_relationship,
               e.final_rating,
               u.first_name || ' ' || u.last_name AS evaluator,
               e.comments, e.created_at
        FROM supplier_evaluations e
        JOIN suppliers s ON s.id = e.supplier_id
        LEFT JOIN users u ON u.id = e.evaluator_id
        ORDER BY e.created_at DESC
        "#,
    )
    .fetch_all(pool)
    .await?;

    let mut writer = csv::Writer::from_writer(Vec::new());
    let mut header: Vec<String> = vec!["Supplier".to_string()];
    header.extend(VENDOR_CRITERIA.iter().map(|(_, _, en)| en.to_string()));
    header.push("Final Rating".to_string());
    header.push("Evaluator".to_string());
    header.push("Date".to_string());
    writer.write_record(&header).map_err(csv_error)?;

    for row in rows {
        writer
            .write_record([
                row.supplier_name,
                row.delivery_compliance.to_string(),
                row.delivery_timeline.to_string(),
                row.advising_capability.to_string(),
                row.after_sales_qos.to_string(),
                row.vendor_relationship.to_string(),
                format!("{:.2}", row.final_rating),
                row.evaluator.unwrap_or_default(),
                row.created_at,
            ])
            .map_err(csv_error)?;
    }
    let data = writer.into_inner().map_err(csv_error)?;

    log::info!("Exported evaluations.csv");
    Ok(csv_response("evaluations.csv", data))
}

fn ranking_csv(entries: &[RankingEntry]) -> ApiResult<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer
        .write_record(["Rank", "Supplier", "Average", "Evaluations"])
        .map_err(csv_error)?;
    for entry in entries {
        writer
            .write_record([
                entry.rank.to_string(),
                entry.supplier_name.clone(),
                format!("{:.2}", entry.weighted),
                entry.evaluation_count.to_string(),
            ])
            .map_err(csv_error)?;
    }
    writer.into_inner().map_err(csv_error)
}

pub async fn export_top_suppliers_csv(
    app_state: web::Data<Arc<AppState>>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    require_permission(&http_request, UserRole::can_export_reports)?;
    let ranking = compute_ranking(&app_state.db_pool).await?;
    let top: Vec<RankingEntry> = ranking.into_iter().take(10).collect();
    let data = ranking_csv(&top)?;
    Ok(csv_response("top_suppliers.csv", data))
}

pub async fn export_bottom_suppliers_csv(
    app_state: web::Data<Arc<AppState>>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    require_permission(&http_request, UserRole::can_export_reports)?;
    let ranking = compute_ranking(&app_state.db_pool).await?;
    let bottom: Vec<RankingEntry> = ranking.into_iter().rev().take(10).collect();
    let data = ranking_csv(&bottom)?;
    Ok(csv_response("bottom_suppliers.csv", data))
}

pub async fn export_supplier_evaluations_csv(
    app_state: web::Data<Arc<AppState>>,
    path: web::Path<String>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    let pool = &app_state.db_pool;
    require_permission(&http_request, UserRole::can_export_reports)?;
    let supplier_id = path.into_inner();

    let supplier_name: Option<String> =
        sqlx::query_scalar("SELECT name FROM suppliers WHERE id = ?")
            .bind(&supplier_id)
            .fetch_optional(pool)
            .await?;
    let supplier_name = supplier_name.ok_or_else(|| ApiError::supplier_not_found(&supplier_id))?;

    let rows = sqlx::query_as::<_, EvaluationExportRow>(
        r#"
        SELECT s.name AS supplier_name, e.delivery_compliance, e.delivery_timeline,
               e.advising_capability, e.after_sales_qos, e.vendor_relationship,
               e.final_rating,
               u.first_name || ' ' || u.last_name AS evaluator,
               e.comments, e.created_at
        FROM supplier_evaluations e
        JOIN suppliers s ON s.id = e.supplier_id
        LEFT JOIN users u ON u.id = e.evaluator_id
        WHERE e.supplier_id = ?
        ORDER BY e.created_at DESC
        "#,
    )
    .bind(&supplier_id)
    .fetch_all(pool)
    .await?;

    let mut writer = csv::Writer::from_writer(Vec::new());
    let mut header: Vec<String> = vec!["Date".to_string(), "Final Rating".to_string()];
    header.extend(VENDOR_CRITERIA.iter().map(|(_, _, en)| en.to_string()));
    header.push("Evaluator".to_string());
    header.push("Comments".to_string());
    writer.write_record(&header).map_err(csv_error)?;

    for row in rows {
        writer
            .write_record([
                row.created_at,
                format!("{:.2}", row.final_rating),
                row.delivery_compliance.to_string(),
                row.delivery_timeline.to_string(),
                row.advising_capability.to_string(),
                row.after_sales_qos.to_string(),
                row.vendor_relationship.to_string(),
                row.evaluator.unwrap_or_default(),
                row.comments.unwrap_or_default(),
            ])
            .map_err(csv_error)?;
    }
    let data = writer.into_inner().map_err(csv_error)?;

    let safe_name = supplier_name.replace(|c: char| !c.is_alphanumeric(), "_");
    Ok(csv_response(&format!("evaluations_{}.csv", safe_name), data))
}

// ==================== XLSX RANKING WORKBOOK ====================

#[derive(Debug, Deserialize)]
pub struct RankingXlsxQuery {
    pub supplier: Option<String>,
    pub yearly: Option<bool>,
}

fn write_ranking_sheet(
    workbook: &mut Workbook,
    name: &str,
    entries: &[RankingEntry],
    header_format: &Format,
) -> Result<(), rust_xlsxwriter::XlsxError> {
    let sheet = workbook.add_worksheet().set_name(name)?;
    let headers = ["Rank", "Supplier", "Vendor Avg", "Buyer Avg", "Weighted", "Badge"];
    for (col, header) in headers.iter().enumerate() {
        sheet.write_with_format(0, col as u16, *header, header_format)?;
    }
    for (i, entry) in entries.iter().enumerate() {
        let row = (i + 1) as u32;
        sheet.write(row, 0, entry.rank as f64)?;
        sheet.write(row, 1, entry.supplier_name.as_str())?;
        sheet.write(row, 2, entry.vendor_avg)?;
        sheet.write(row, 3, entry.buyer_avg)?;
        sheet.write(row, 4, entry.weighted)?;
        sheet.write(row, 5, entry.badge)?;
    }
    sheet.autofit();
    Ok(())
}

/// Ranking workbook: Overview, Top10 and Bottom10 sheets, plus an
/// optional per-supplier history sheet and a yearly trend sheet with a
/// line chart.
pub async fn export_ranking_xlsx(
    app_state: web::Data<Arc<AppState>>,
    query: web::Query<RankingXlsxQuery>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    let pool = &app_state.db_pool;
    require_permission(&http_request, UserRole::can_export_reports)?;

    let ranking = compute_ranking(pool).await?;
    let data = build_ranking_workbook(pool, &ranking, &query).await?;

    log::info!("Exported ranking.xlsx ({} suppliers ranked)", ranking.len());
    Ok(xlsx_response("ranking.xlsx", data))
}

async fn build_ranking_workbook(
    pool: &SqlitePool,
    ranking: &[RankingEntry],
    query: &RankingXlsxQuery,
) -> ApiResult<Vec<u8>> {
    let mut workbook = Workbook::new();
    let header_format = Format::new()
        .set_bold()
        .set_background_color(Color::RGB(0xD9E1F2));

    write_ranking_sheet(&mut workbook, "Overview", ranking, &header_format)
        .map_err(xlsx_error)?;
    let top: Vec<RankingEntry> = ranking.iter().take(10).cloned().collect();
    write_ranking_sheet(&mut workbook, "Top10", &top, &header_format).map_err(xlsx_error)?;
    let bottom: Vec<RankingEntry> = ranking.iter().rev().take(10).cloned().collect();
    write_ranking_sheet(&mut workbook, "Bottom10", &bottom, &header_format)
        .map_err(xlsx_error)?;

    if let Some(supplier_id) = &query.supplier {
        let supplier_name: Option<String> =
            sqlx::query_scalar("SELECT name FROM suppliers WHERE id = ?")
                .bind(supplier_id)
                .fetch_optional(pool)
                .await?;
        let supplier_name =
            supplier_name.ok_or_else(|| ApiError::supplier_not_found(supplier_id))?;

        let evaluations = sqlx::query_as::<_, SupplierEvaluation>(
            "SELECT * FROM supplier_evaluations WHERE supplier_id = ? ORDER BY created_at ASC",
        )
        .bind(supplier_id)
        .fetch_all(pool)
        .await?;

        // Worksheet names are capped at 31 characters
        let sheet_name: String = supplier_name.chars().take(31).collect();
        let sheet = workbook
            .add_worksheet()
            .set_name(&sheet_name)
            .map_err(xlsx_error)?;
        let mut headers = vec!["Date".to_string()];
        headers.extend(VENDOR_CRITERIA.iter().map(|(_, _, en)| en.to_string()));
        headers.push("Final Rating".to_string());
        for (col, header) in headers.iter().enumerate() {
            sheet
                .write_with_format(0, col as u16, header.as_str(), &header_format)
                .map_err(xlsx_error)?;
        }
        for (i, evaluation) in evaluations.iter().enumerate() {
            let row = (i + 1) as u32;
            sheet
                .write(row, 0, evaluation.created_at.format("%Y-%m-%d").to_string())
                .map_err(xlsx_error)?;
            for (col, score) in evaluation.scores().iter().enumerate() {
                sheet
                    .write(row, (col + 1) as u16, *score as f64)
                    .map_err(xlsx_error)?;
            }
            sheet
                .write(row, 6, evaluation.final_rating)
                .map_err(xlsx_error)?;
        }
        sheet.autofit();
    }

    if query.yearly.unwrap_or(false) {
        let series = yearly_series(pool).await?;
        let sheet = workbook
            .add_worksheet()
            .set_name("Yearly")
            .map_err(xlsx_error)?;
        let headers = [
            "Year",
            "Vendor Avg",
            "Buyer Avg",
            "Weighted",
            "Moving Avg",
            "Evaluations",
        ];
        for (col, header) in headers.iter().enumerate() {
            sheet
                .write_with_format(0, col as u16, *header, &header_format)
                .map_err(xlsx_error)?;
        }
        for (i, point) in series.iter().enumerate() {
            let row = (i + 1) as u32;
            sheet.write(row, 0, point.year.as_str()).map_err(xlsx_error)?;
            sheet.write(row, 1, point.vendor_avg).map_err(xlsx_error)?;
            sheet.write(row, 2, point.buyer_avg).map_err(xlsx_error)?;
            sheet.write(row, 3, point.weighted).map_err(xlsx_error)?;
            sheet.write(row, 4, point.moving_avg).map_err(xlsx_error)?;
            sheet.write(row, 5, point.count as f64).map_err(xlsx_error)?;
        }

        if !series.is_empty() {
            let last_row = series.len() as u32;
            let mut chart = Chart::new(ChartType::Line);
            chart
                .add_series()
                .set_categories(("Yearly", 1, 0, last_row, 0))
                .set_values(("Yearly", 1, 3, last_row, 3))
                .set_name("Average Final Rating");
            chart.title().set_name("Average Final Rating by Year");
            chart.y_axis().set_min(0).set_max(10);
            sheet.insert_chart(1, 7, &chart).map_err(xlsx_error)?;
        }
        sheet.autofit();
    }

    workbook.save_to_buffer().map_err(xlsx_error)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(rank: i64, name: &str, weighted: f64) -> RankingEntry {
        RankingEntry {
            rank,
            supplier_id: format!("s{}", rank),
            supplier_name: name.to_string(),
            vendor_avg: weighted,
            buyer_avg: 0.0,
            weighted,
            evaluation_count: 1,
            badge: "good",
        }
    }

    #[test]
    fn test_ranking_csv_format() {
        let entries = vec![entry(1, "Bravo", 7.5), entry(2, "Alpha", 6.25)];
        let data = ranking_csv(&entries).unwrap();
        let text = String::from_utf8(data).unwrap();
        let mut lines = text.lines();
        assert_eq!(lines.next(), Some("Rank,Supplier,Average,Evaluations"));
        assert_eq!(lines.next(), Some("1,Bravo,7.50,1"));
        assert_eq!(lines.next(), Some("2,Alpha,6.25,1"));
    }

    #[test]
    fn test_ranking_csv_empty() {
        let data = ranking_csv(&[]).unwrap();
        let text = String::from_utf8(data).unwrap();
        assert_eq!(text.trim_end(), "Rank,Supplier,Average,Evaluations");
    }

    #[test]
    fn test_workbook_sheets_build() {
        let entries = vec![entry(1, "Bravo", 7.5)];
        let mut workbook = Workbook::new();
        let format = Format::new().set_bold();
        write_ranking_sheet(&mut workbook, "Overview", &entries, &format).unwrap();
        let data = workbook.save_to_buffer().unwrap();
        // XLSX files are zip archives
        assert_eq!(&data[0..2], b"PK");
    }
}
