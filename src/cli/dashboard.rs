use colored::Colorize;
use comfy_table::{Cell, CellAlignment, Table};

use crate::cli::{open_db, Credentials, FilterArgs, PeriodArg};
use crate::error::Result;
use crate::fmt::{money, percent, quantity};
use crate::reports::{build_dashboard, get_dashboard_rows, DashboardFilter, Ranked, Series, Trend, TrendLabel};

fn right(text: String) -> Cell {
    Cell::new(text).set_alignment(CellAlignment::Right)
}

fn ranked_table(rows: &[Ranked], name_header: &str, fmt: fn(f64) -> String, with_share: bool) -> Table {
    let mut table = Table::new();
    let mut header = vec![name_header, "Valor"];
    if with_share {
        header.push("%");
    }
    table.set_header(header);
    for r in rows {
        let mut row = vec![Cell::new(&r.name), right(fmt(r.value))];
        if with_share {
            row.push(right(percent(r.share)));
        }
        table.add_row(row);
    }
    table
}

fn series_table(series: &Series, fmt: fn(f64) -> String) -> Table {
    let mut table = Table::new();
    table.set_header(vec!["Período", "Valor", "Tendência"]);
    for (i, p) in series.points.iter().enumerate() {
        let fitted = series.trend.map(|t| fmt(t.at(i))).unwrap_or_default();
        table.add_row(vec![Cell::new(&p.label), right(fmt(p.value)), right(fitted)]);
    }
    table
}

fn trend_sentence(subject: &str, trend: Option<Trend>, unit: &str) -> String {
    match trend {
        None => format!("{subject}: dados insuficientes para calcular a tendência."),
        Some(t) => {
            let label = match t.label {
                TrendLabel::Growth => t.label.label().green(),
                TrendLabel::Decline => t.label.label().red(),
                TrendLabel::Stable => t.label.label().normal(),
            };
            format!("{subject} apresenta {label} ({:+.2} {unit} por mês).", t.slope)
        }
    }
}

pub fn run(creds: &Credentials, filter: FilterArgs, period: PeriodArg) -> Result<()> {
    let (_, conn) = open_db()?;
    creds.session(&conn)?;

    let filter: DashboardFilter = filter.into();
    let rows = get_dashboard_rows(&conn, &filter)?;
    if rows.is_empty() {
        println!("No records match the selected filters.");
        return Ok(());
    }
    let dash = build_dashboard(&rows, period.into());

    println!("{}", "Resumo".bold());
    println!("Registros:           {}", dash.record_count);
    println!("Valor total:         {}", money(dash.total_revenue));
    println!("Quantidade total:    {}", quantity(dash.total_quantity));
    println!("Regional destaque:   {}", dash.top_regional.as_deref().unwrap_or("-"));
    println!("Filial destaque:     {}", dash.top_branch.as_deref().unwrap_or("-"));
    println!("Produto destaque:    {}", dash.top_product.as_deref().unwrap_or("-"));
    println!();

    println!("{}", trend_sentence("A receita mensal", dash.monthly_revenue_trend, "R$"));
    println!("{}", trend_sentence("A quantidade mensal", dash.monthly_quantity_trend, "unidades"));
    if !dash.top3_products.is_empty() {
        let names: Vec<&str> = dash.top3_products.iter().map(|r| r.name.as_str()).collect();
        println!(
            "Os principais produtos ({}) representam {} da receita.",
            names.join(", "),
            percent(dash.top3_share)
        );
    }
    println!();

    println!("Receita por Regional\n{}\n", ranked_table(&dash.revenue_by_regional, "Regional", money, true));
    println!("Top 10 Filiais\n{}\n", ranked_table(&dash.top_branches, "Filial", money, true));
    println!("Top 10 Destinos\n{}\n", ranked_table(&dash.top_destinations, "Destino", money, true));
    println!("Top 10 Produtos por Receita\n{}\n", ranked_table(&dash.top_products, "Produto", money, true));
    println!(
        "Top 10 Produtos por Quantidade\n{}\n",
        ranked_table(&dash.top_products_by_quantity, "Produto", quantity, false)
    );

    let mut products = Table::new();
    products.set_header(vec!["Produto", "Receita", "Quantidade", "Preço Médio"]);
    for p in &dash.products {
        products.add_row(vec![
            Cell::new(&p.name),
            right(money(p.revenue)),
            right(quantity(p.quantity)),
            right(money(p.avg_unit_price)),
        ]);
    }
    println!("Produtos\n{products}\n");

    let name = dash.period.name();
    println!("Evolução {name} da Receita\n{}\n", series_table(&dash.revenue_series, money));
    println!("Evolução {name} da Quantidade\n{}", series_table(&dash.quantity_series, quantity));
    Ok(())
}
