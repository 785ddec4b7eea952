use std::collections::BTreeMap;

use chrono::{Datelike, NaiveDate};
use rusqlite::Connection;

use crate::error::{ResiduosError, Result};
use crate::models::Record;

// ---------------------------------------------------------------------------
// Filtering
// ---------------------------------------------------------------------------

/// Earliest and latest operation dates, or `None` when there are no records.
pub fn date_bounds(conn: &Connection) -> Result<Option<(NaiveDate, NaiveDate)>> {
    let bounds: (Option<NaiveDate>, Option<NaiveDate>) =
        conn.query_row("SELECT MIN(data), MAX(data) FROM registros", [], |r| Ok((r.get(0)?, r.get(1)?)))?;
    Ok(match bounds {
        (Some(min), Some(max)) => Some((min, max)),
        _ => None,
    })
}

/// Equality filters are exact matches against the stored (standardized) text.
#[derive(Debug, Clone, Default)]
pub struct DashboardFilter {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub regional: Option<String>,
    pub branch: Option<String>,
    pub product: Option<String>,
    pub destination: Option<String>,
    pub operation_type: Option<String>,
    pub unit: Option<String>,
    pub user: Option<String>,
}

impl DashboardFilter {
    fn equality_clauses(&self) -> Vec<(&'static str, &str)> {
        [
            ("regional", &self.regional),
            ("filial_remetente", &self.branch),
            ("produto", &self.product),
            ("destino", &self.destination),
            ("tipo_operacao", &self.operation_type),
            ("unidade", &self.unit),
            ("usuario_lancamento", &self.user),
        ]
        .into_iter()
        .filter_map(|(col, value)| {
            value
                .as_deref()
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(|v| (col, v))
        })
        .collect()
    }
}

/// Records matching `filter`, oldest first. Missing dates default to the
/// stored bounds.
pub fn get_dashboard_rows(conn: &Connection, filter: &DashboardFilter) -> Result<Vec<Record>> {
    let Some((min, max)) = date_bounds(conn)? else {
        return Ok(Vec::new());
    };
    let from = filter.from.unwrap_or(min);
    let to = filter.to.unwrap_or(max);
    if from > to {
        return Err(ResiduosError::Validation(format!(
            "start date {from} is after end date {to}"
        )));
    }

    let mut sql = format!("SELECT {} FROM registros WHERE data BETWEEN ?1 AND ?2", Record::SELECT_COLUMNS);
    let mut params: Vec<String> = vec![from.format("%Y-%m-%d").to_string(), to.format("%Y-%m-%d").to_string()];
    for (col, value) in filter.equality_clauses() {
        params.push(value.to_string());
        sql.push_str(&format!(" AND {col} = ?{}", params.len()));
    }
    sql.push_str(" ORDER BY data ASC, id ASC");

    let mut stmt = conn.prepare(&sql)?;
    let param_values: Vec<&dyn rusqlite::types::ToSql> =
        params.iter().map(|p| p as &dyn rusqlite::types::ToSql).collect();
    let rows = stmt.query_map(param_values.as_slice(), Record::from_row)?;
    Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
}

// ---------------------------------------------------------------------------
// Trends
// ---------------------------------------------------------------------------

pub const REVENUE_TREND_THRESHOLD: f64 = 100.0;
pub const QUANTITY_TREND_THRESHOLD: f64 = 50.0;

/// Ordinary least squares over `(i, ys[i])`. Needs at least two points.
pub fn linear_fit(ys: &[f64]) -> Option<(f64, f64)> {
    if ys.len() < 2 {
        return None;
    }
    let n = ys.len() as f64;
    let mean_x = (n - 1.0) / 2.0;
    let mean_y = ys.iter().sum::<f64>() / n;
    let (mut sxy, mut sxx) = (0.0, 0.0);
    for (i, y) in ys.iter().enumerate() {
        let dx = i as f64 - mean_x;
        sxy += dx * (y - mean_y);
        sxx += dx * dx;
    }
    let slope = sxy / sxx;
    Some((slope, mean_y - slope * mean_x))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrendLabel {
    Growth,
    Decline,
    Stable,
}

impl TrendLabel {
    pub fn classify(slope: f64, threshold: f64) -> Self {
        if slope > threshold {
            Self::Growth
        } else if slope < -threshold {
            Self::Decline
        } else {
            Self::Stable
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Growth => "tendência de crescimento",
            Self::Decline => "tendência de queda",
            Self::Stable => "tendência de estabilidade",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Trend {
    pub slope: f64,
    pub intercept: f64,
    pub label: TrendLabel,
}

impl Trend {
    pub fn fit(ys: &[f64], threshold: f64) -> Option<Self> {
        let (slope, intercept) = linear_fit(ys)?;
        Some(Trend {
            slope,
            intercept,
            label: TrendLabel::classify(slope, threshold),
        })
    }

    /// Fitted value at bucket `i`.
    pub fn at(&self, i: usize) -> f64 {
        self.slope * i as f64 + self.intercept
    }
}

// ---------------------------------------------------------------------------
// Period series
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Period {
    Monthly,
    Quarterly,
    Yearly,
}

impl Period {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Monthly => "Mensal",
            Self::Quarterly => "Trimestral",
            Self::Yearly => "Anual",
        }
    }

    /// First day of the bucket containing `date`.
    fn bucket_start(&self, date: NaiveDate) -> NaiveDate {
        let month = match self {
            Self::Monthly => date.month(),
            Self::Quarterly => (date.month0() / 3) * 3 + 1,
            Self::Yearly => 1,
        };
        NaiveDate::from_ymd_opt(date.year(), month, 1).unwrap_or(date)
    }

    fn next(&self, start: NaiveDate) -> Option<NaiveDate> {
        let months = match self {
            Self::Monthly => 1,
            Self::Quarterly => 3,
            Self::Yearly => 12,
        };
        start.checked_add_months(chrono::Months::new(months))
    }

    pub fn bucket_label(&self, start: NaiveDate) -> String {
        match self {
            Self::Monthly => start.format("%Y-%m").to_string(),
            Self::Quarterly => format!("{}Q{}", start.year(), start.month0() / 3 + 1),
            Self::Yearly => start.year().to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SeriesPoint {
    pub start: NaiveDate,
    pub label: String,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Series {
    pub points: Vec<SeriesPoint>,
    pub trend: Option<Trend>,
}

/// Sums `value` per bucket from the first to the last populated bucket.
/// Buckets with no records are present with 0.
pub fn bucket_series(rows: &[Record], period: Period, value: impl Fn(&Record) -> f64) -> Vec<SeriesPoint> {
    let mut sums: BTreeMap<NaiveDate, f64> = BTreeMap::new();
    for r in rows {
        *sums.entry(period.bucket_start(r.date)).or_default() += value(r);
    }
    let (Some(&first), Some(&last)) = (sums.keys().next(), sums.keys().next_back()) else {
        return Vec::new();
    };

    let mut points = Vec::new();
    let mut cursor = Some(first);
    while let Some(start) = cursor.filter(|s| *s <= last) {
        points.push(SeriesPoint {
            start,
            label: period.bucket_label(start),
            value: sums.get(&start).copied().unwrap_or(0.0),
        });
        cursor = period.next(start);
    }
    points
}

fn series(rows: &[Record], period: Period, threshold: f64, value: impl Fn(&Record) -> f64) -> Series {
    let points = bucket_series(rows, period, value);
    let ys: Vec<f64> = points.iter().map(|p| p.value).collect();
    Series {
        trend: Trend::fit(&ys, threshold),
        points,
    }
}

// ---------------------------------------------------------------------------
// Dashboard
// ---------------------------------------------------------------------------

/// One group in a breakdown. `share` is the fraction of total revenue
/// (0 when total revenue is 0).
#[derive(Debug, Clone, PartialEq)]
pub struct Ranked {
    pub name: String,
    pub value: f64,
    pub share: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProductSummary {
    pub name: String,
    pub revenue: f64,
    pub quantity: f64,
    pub avg_unit_price: f64,
}

#[derive(Debug, Clone)]
pub struct Dashboard {
    pub record_count: usize,
    pub total_revenue: f64,
    pub total_quantity: f64,
    pub top_regional: Option<String>,
    pub top_branch: Option<String>,
    pub top_product: Option<String>,
    pub top3_products: Vec<Ranked>,
    /// Combined share of `top3_products`.
    pub top3_share: f64,
    pub revenue_by_regional: Vec<Ranked>,
    pub top_branches: Vec<Ranked>,
    pub top_destinations: Vec<Ranked>,
    pub top_products: Vec<Ranked>,
    pub top_products_by_quantity: Vec<Ranked>,
    /// Sorted by average unit price, highest first.
    pub products: Vec<ProductSummary>,
    pub monthly_revenue_trend: Option<Trend>,
    pub monthly_quantity_trend: Option<Trend>,
    pub period: Period,
    pub revenue_series: Series,
    pub quantity_series: Series,
}

/// Sum per non-empty key, highest first, ties broken by name.
fn group_sum(rows: &[Record], key: impl Fn(&Record) -> &str, value: impl Fn(&Record) -> f64) -> Vec<(String, f64)> {
    let mut sums: BTreeMap<&str, f64> = BTreeMap::new();
    for r in rows {
        let k = key(r);
        if !k.is_empty() {
            *sums.entry(k).or_default() += value(r);
        }
    }
    let mut out: Vec<(String, f64)> = sums.into_iter().map(|(k, v)| (k.to_string(), v)).collect();
    out.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    out
}

fn ranked(groups: &[(String, f64)], total_revenue: f64, limit: usize) -> Vec<Ranked> {
    groups
        .iter()
        .take(limit)
        .map(|(name, value)| Ranked {
            name: name.clone(),
            value: *value,
            share: if total_revenue > 0.0 { value / total_revenue } else { 0.0 },
        })
        .collect()
}

fn product_summaries(rows: &[Record]) -> Vec<ProductSummary> {
    let mut acc: BTreeMap<&str, (f64, f64, f64, usize)> = BTreeMap::new();
    for r in rows.iter().filter(|r| !r.product.is_empty()) {
        let e = acc.entry(r.product.as_str()).or_default();
        e.0 += r.total_value;
        e.1 += r.quantity;
        e.2 += r.unit_price;
        e.3 += 1;
    }
    let mut out: Vec<ProductSummary> = acc
        .into_iter()
        .map(|(name, (revenue, quantity, price_sum, n))| ProductSummary {
            name: name.to_string(),
            revenue,
            quantity,
            avg_unit_price: price_sum / n as f64,
        })
        .collect();
    out.sort_by(|a, b| b.avg_unit_price.total_cmp(&a.avg_unit_price).then_with(|| a.name.cmp(&b.name)));
    out
}

pub fn build_dashboard(rows: &[Record], period: Period) -> Dashboard {
    let total_revenue: f64 = rows.iter().map(|r| r.total_value).sum();
    let total_quantity: f64 = rows.iter().map(|r| r.quantity).sum();

    let by_regional = group_sum(rows, |r| r.regional.as_str(), |r| r.total_value);
    let by_branch = group_sum(rows, |r| r.branch.as_str(), |r| r.total_value);
    let by_destination = group_sum(rows, |r| r.destination.as_str(), |r| r.total_value);
    let by_product = group_sum(rows, |r| r.product.as_str(), |r| r.total_value);
    let qty_by_product = group_sum(rows, |r| r.product.as_str(), |r| r.quantity);

    let top3_products = ranked(&by_product, total_revenue, 3);
    let top3_share = top3_products.iter().map(|r| r.share).sum();

    let monthly_revenue = series(rows, Period::Monthly, REVENUE_TREND_THRESHOLD, |r| r.total_value);
    let monthly_quantity = series(rows, Period::Monthly, QUANTITY_TREND_THRESHOLD, |r| r.quantity);

    Dashboard {
        record_count: rows.len(),
        total_revenue,
        total_quantity,
        top_regional: by_regional.first().map(|g| g.0.clone()),
        top_branch: by_branch.first().map(|g| g.0.clone()),
        top_product: by_product.first().map(|g| g.0.clone()),
        top3_products,
        top3_share,
        revenue_by_regional: ranked(&by_regional, total_revenue, usize::MAX),
        top_branches: ranked(&by_branch, total_revenue, 10),
        top_destinations: ranked(&by_destination, total_revenue, 10),
        top_products: ranked(&by_product, total_revenue, 10),
        top_products_by_quantity: ranked(&qty_by_product, 0.0, 10),
        products: product_summaries(rows),
        monthly_revenue_trend: monthly_revenue.trend,
        monthly_quantity_trend: monthly_quantity.trend,
        period,
        revenue_series: series(rows, period, REVENUE_TREND_THRESHOLD, |r| r.total_value),
        quantity_series: series(rows, period, QUANTITY_TREND_THRESHOLD, |r| r.quantity),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::admin;
    use crate::db::test_db;
    use crate::models::{OperationType, RecordInput};
    use crate::records::add;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn rec(id: i64, date: NaiveDate, regional: &str, product: &str, qty: f64, total: f64) -> Record {
        Record {
            id,
            date,
            operation_type: Some(OperationType::Sale),
            regional: regional.to_string(),
            branch: format!("Filial {regional}"),
            destination: "Cliente".to_string(),
            product: product.to_string(),
            quantity: qty,
            unit: "Kg".to_string(),
            unit_price: total / qty,
            total_value: total,
            invoice: String::new(),
            notes: String::new(),
            created_at: None,
            created_by: "ana".to_string(),
        }
    }

    fn input(date: NaiveDate, regional: &str, product: &str, op: OperationType) -> RecordInput {
        RecordInput {
            date,
            operation_type: op,
            regional: regional.to_string(),
            branch: "Filial A".to_string(),
            destination: "Cliente".to_string(),
            product: product.to_string(),
            quantity: 10.0,
            unit: "Kg".to_string(),
            unit_price: 2.0,
            total_value: 0.0,
            invoice: String::new(),
            notes: String::new(),
        }
    }

    #[test]
    fn test_linear_fit() {
        let (slope, intercept) = linear_fit(&[1.0, 3.0, 5.0, 7.0]).unwrap();
        assert!((slope - 2.0).abs() < 1e-12);
        assert!((intercept - 1.0).abs() < 1e-12);
        assert!(linear_fit(&[5.0]).is_none());
        assert!(linear_fit(&[]).is_none());
    }

    #[test]
    fn test_trend_thresholds() {
        assert_eq!(TrendLabel::classify(100.5, REVENUE_TREND_THRESHOLD), TrendLabel::Growth);
        assert_eq!(TrendLabel::classify(100.0, REVENUE_TREND_THRESHOLD), TrendLabel::Stable);
        assert_eq!(TrendLabel::classify(-101.0, REVENUE_TREND_THRESHOLD), TrendLabel::Decline);
        assert_eq!(TrendLabel::classify(60.0, QUANTITY_TREND_THRESHOLD), TrendLabel::Growth);
        assert_eq!(TrendLabel::classify(60.0, REVENUE_TREND_THRESHOLD), TrendLabel::Stable);
    }

    #[test]
    fn test_bucket_series_fills_gaps() {
        let rows = vec![
            rec(1, d(2024, 1, 5), "Norte", "Sucata", 1.0, 100.0),
            rec(2, d(2024, 1, 20), "Norte", "Sucata", 1.0, 50.0),
            rec(3, d(2024, 4, 2), "Sul", "Ferro", 1.0, 300.0),
        ];
        let monthly = bucket_series(&rows, Period::Monthly, |r| r.total_value);
        assert_eq!(
            monthly.iter().map(|p| (p.label.as_str(), p.value)).collect::<Vec<_>>(),
            vec![("2024-01", 150.0), ("2024-02", 0.0), ("2024-03", 0.0), ("2024-04", 300.0)]
        );
        let quarterly = bucket_series(&rows, Period::Quarterly, |r| r.total_value);
        assert_eq!(
            quarterly.iter().map(|p| (p.label.as_str(), p.value)).collect::<Vec<_>>(),
            vec![("2024Q1", 150.0), ("2024Q2", 300.0)]
        );
        let yearly = bucket_series(&rows, Period::Yearly, |r| r.quantity);
        assert_eq!(yearly.len(), 1);
        assert_eq!(yearly[0].label, "2024");
        assert!(bucket_series(&[], Period::Monthly, |r| r.quantity).is_empty());
    }

    #[test]
    fn test_build_dashboard() {
        let rows = vec![
            rec(1, d(2024, 1, 5), "Norte", "Sucata", 10.0, 100.0),
            rec(2, d(2024, 2, 5), "Sul", "Ferro", 20.0, 400.0),
            rec(3, d(2024, 3, 5), "Norte", "Papelão", 30.0, 300.0),
            rec(4, d(2024, 3, 6), "Leste", "Plástico", 40.0, 200.0),
        ];
        let dash = build_dashboard(&rows, Period::Quarterly);
        assert_eq!(dash.record_count, 4);
        assert_eq!(dash.total_revenue, 1000.0);
        assert_eq!(dash.total_quantity, 100.0);
        assert_eq!(dash.top_regional.as_deref(), Some("Sul"));
        assert_eq!(dash.top_product.as_deref(), Some("Ferro"));
        assert_eq!(
            dash.top3_products.iter().map(|r| r.name.as_str()).collect::<Vec<_>>(),
            vec!["Ferro", "Papelão", "Plástico"]
        );
        assert!((dash.top3_share - 0.9).abs() < 1e-12);
        assert_eq!(dash.revenue_by_regional[0].name, "Sul");
        assert_eq!(dash.revenue_by_regional.len(), 3);
        assert_eq!(dash.top_products_by_quantity[0].name, "Plástico");
        assert_eq!(dash.products[0].name, "Ferro");
        assert_eq!(dash.products[0].avg_unit_price, 20.0);

        let trend = dash.monthly_revenue_trend.unwrap();
        assert!((trend.slope - 200.0).abs() < 1e-9);
        assert_eq!(trend.label, TrendLabel::Growth);
        assert_eq!(dash.monthly_quantity_trend.unwrap().label, TrendLabel::Stable);

        assert_eq!(dash.revenue_series.points.len(), 1);
        assert!(dash.revenue_series.trend.is_none());
    }

    #[test]
    fn test_dashboard_ties_pick_first_name() {
        let rows = vec![
            rec(1, d(2024, 1, 5), "Sul", "B", 1.0, 100.0),
            rec(2, d(2024, 1, 6), "Norte", "A", 1.0, 100.0),
        ];
        let dash = build_dashboard(&rows, Period::Monthly);
        assert_eq!(dash.top_regional.as_deref(), Some("Norte"));
        assert_eq!(dash.top_product.as_deref(), Some("A"));
    }

    #[test]
    fn test_empty_dashboard() {
        let dash = build_dashboard(&[], Period::Monthly);
        assert_eq!(dash.record_count, 0);
        assert!(dash.top_regional.is_none());
        assert!(dash.monthly_revenue_trend.is_none());
        assert_eq!(dash.top3_share, 0.0);
    }

    #[test]
    fn test_date_bounds_and_filtered_rows() {
        let (_dir, conn) = test_db();
        assert!(date_bounds(&conn).unwrap().is_none());
        assert!(get_dashboard_rows(&conn, &DashboardFilter::default()).unwrap().is_empty());

        add(&conn, &admin(), &input(d(2024, 1, 10), "norte", "sucata", OperationType::Sale)).unwrap();
        add(&conn, &admin(), &input(d(2024, 2, 10), "sul", "sucata", OperationType::Transfer)).unwrap();
        add(&conn, &admin(), &input(d(2024, 3, 10), "norte", "ferro", OperationType::Sale)).unwrap();

        assert_eq!(date_bounds(&conn).unwrap(), Some((d(2024, 1, 10), d(2024, 3, 10))));
        assert_eq!(get_dashboard_rows(&conn, &DashboardFilter::default()).unwrap().len(), 3);

        let norte = DashboardFilter {
            regional: Some("Norte".to_string()),
            ..Default::default()
        };
        let rows = get_dashboard_rows(&conn, &norte).unwrap();
        assert_eq!(rows.iter().map(|r| r.id).collect::<Vec<_>>(), vec![1, 3]);

        let window = DashboardFilter {
            from: Some(d(2024, 2, 1)),
            to: Some(d(2024, 3, 10)),
            product: Some("Sucata".to_string()),
            ..Default::default()
        };
        assert_eq!(get_dashboard_rows(&conn, &window).unwrap().len(), 1);

        let transfers = DashboardFilter {
            operation_type: Some("Transferência".to_string()),
            user: Some("Administrador".to_string()),
            ..Default::default()
        };
        assert_eq!(get_dashboard_rows(&conn, &transfers).unwrap()[0].regional, "Sul");

        let blank = DashboardFilter {
            unit: Some("  ".to_string()),
            ..Default::default()
        };
        assert_eq!(get_dashboard_rows(&conn, &blank).unwrap().len(), 3);
    }

    #[test]
    fn test_inverted_range_rejected() {
        let (_dir, conn) = test_db();
        add(&conn, &admin(), &input(d(2024, 1, 10), "norte", "sucata", OperationType::Sale)).unwrap();
        let bad = DashboardFilter {
            from: Some(d(2024, 3, 1)),
            to: Some(d(2024, 1, 1)),
            ..Default::default()
        };
        assert!(matches!(get_dashboard_rows(&conn, &bad), Err(ResiduosError::Validation(_))));
    }
}
