use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use log::*;
use rog_common::Money;
use serde::Serialize;

use crate::{
    api::metrics_api::period_bounds,
    db_types::{Order, OrderStatusType, PeriodType, Restaurant},
    traits::{LedgerError, OrderManagement},
};

/// Builds the weekly and monthly report payloads consumed by the (external) mailer. Everything
/// here is a read-only projection over the ledger; rendering and delivery are not this crate's
/// concern.
pub struct ReportApi<B> {
    db: B,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReportPeriod {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReportMetrics {
    pub total_orders: i64,
    /// Gross order volume: the sum over every order in the window, not only delivered ones.
    pub total_revenue: Money,
    pub average_order_value: Money,
    pub delivered_orders: i64,
    pub cancelled_orders: i64,
    pub delayed_orders: i64,
    pub average_delivery_time_minutes: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RecommendationSeverity {
    Success,
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, Serialize)]
pub struct Recommendation {
    pub severity: RecommendationSeverity,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct WeeklyReport {
    pub restaurant: String,
    pub period: ReportPeriod,
    pub metrics: ReportMetrics,
    pub recommendations: Vec<Recommendation>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DailySales {
    pub date: NaiveDate,
    pub orders: i64,
    pub revenue: Money,
}

#[derive(Debug, Clone, Serialize)]
pub struct MonthlyReport {
    pub restaurant: String,
    pub period: ReportPeriod,
    pub metrics: ReportMetrics,
    pub daily_breakdown: Vec<DailySales>,
    pub recommendations: Vec<Recommendation>,
}

impl<B> ReportApi<B>
where B: OrderManagement
{
    pub fn new(db: B) -> Self {
        Self { db }
    }

    /// Report over the ISO week containing `week_of`.
    pub async fn weekly(&self, restaurant: &Restaurant, week_of: NaiveDate) -> Result<WeeklyReport, LedgerError> {
        let (start, end) = period_bounds(week_of, PeriodType::Weekly);
        let orders = self.db.fetch_orders_placed_between(restaurant.id, start, end).await?;
        let metrics = report_metrics(&orders, Utc::now());
        let recommendations = build_recommendations(&metrics);
        debug!("📊️ Weekly report for restaurant {}: {} orders", restaurant.id, metrics.total_orders);
        Ok(WeeklyReport {
            restaurant: restaurant.name.clone(),
            period: ReportPeriod { start: start.date_naive(), end: end.date_naive() - Duration::days(1) },
            metrics,
            recommendations,
        })
    }

    /// Report over the calendar month containing `month_of`, with a per-day breakdown.
    pub async fn monthly(&self, restaurant: &Restaurant, month_of: NaiveDate) -> Result<MonthlyReport, LedgerError> {
        let (start, end) = period_bounds(month_of, PeriodType::Monthly);
        let orders = self.db.fetch_orders_placed_between(restaurant.id, start, end).await?;
        let metrics = report_metrics(&orders, Utc::now());
        let recommendations = build_recommendations(&metrics);
        let daily_breakdown = daily_breakdown(&orders, start.date_naive(), end.date_naive());
        debug!("📊️ Monthly report for restaurant {}: {} orders", restaurant.id, metrics.total_orders);
        Ok(MonthlyReport {
            restaurant: restaurant.name.clone(),
            period: ReportPeriod { start: start.date_naive(), end: end.date_naive() - Duration::days(1) },
            metrics,
            daily_breakdown,
            recommendations,
        })
    }
}

fn report_metrics(orders: &[Order], now: DateTime<Utc>) -> ReportMetrics {
    let total_orders = orders.len() as i64;
    let total_revenue: Money = orders.iter().map(|o| o.total_amount).sum();
    let delivered: Vec<&Order> = orders.iter().filter(|o| o.status == OrderStatusType::Delivered).collect();
    let cancelled_orders = orders.iter().filter(|o| o.status == OrderStatusType::Cancelled).count() as i64;
    let delayed_orders = orders
        .iter()
        .filter(|o| o.expected_delivery_at.map_or(false, |t| t < now) && !o.status.is_terminal())
        .count() as i64;
    let average_order_value = if total_orders == 0 {
        Money::default()
    } else {
        Money::from_cents((total_revenue.value() as f64 / total_orders as f64).round() as i64)
    };
    let delivery_samples: Vec<f64> = delivered
        .iter()
        .filter_map(|o| match (o.placed_at, o.delivered_at) {
            (Some(a), Some(b)) => Some((b - a).num_seconds() as f64 / 60.0),
            _ => None,
        })
        .collect();
    let average_delivery_time_minutes = if delivery_samples.is_empty() {
        None
    } else {
        Some(delivery_samples.iter().sum::<f64>() / delivery_samples.len() as f64)
    };
    ReportMetrics {
        total_orders,
        total_revenue,
        average_order_value,
        delivered_orders: delivered.len() as i64,
        cancelled_orders,
        delayed_orders,
        average_delivery_time_minutes,
    }
}

fn daily_breakdown(orders: &[Order], start: NaiveDate, end: NaiveDate) -> Vec<DailySales> {
    let mut result = Vec::new();
    let mut day = start;
    while day < end {
        let day_orders: Vec<&Order> =
            orders.iter().filter(|o| o.placed_at.map_or(false, |t| t.date_naive() == day)).collect();
        result.push(DailySales {
            date: day,
            orders: day_orders.len() as i64,
            revenue: day_orders.iter().map(|o| o.total_amount).sum(),
        });
        day = day + Duration::days(1);
    }
    result
}

fn build_recommendations(metrics: &ReportMetrics) -> Vec<Recommendation> {
    let mut recommendations = Vec::new();
    if metrics.total_orders == 0 {
        recommendations.push(Recommendation {
            severity: RecommendationSeverity::Warning,
            message: "Nenhum pedido registrado no período. Verifique a integração com o iFood.".to_string(),
        });
        return recommendations;
    }
    let delayed_pct = metrics.delayed_orders as f64 / metrics.total_orders as f64 * 100.0;
    if delayed_pct > 10.0 {
        recommendations.push(Recommendation {
            severity: RecommendationSeverity::Error,
            message: format!(
                "Taxa de atraso alta ({delayed_pct:.1}%). Revise o tempo de preparo e comunicação com entregadores."
            ),
        });
    }
    let cancelled_pct = metrics.cancelled_orders as f64 / metrics.total_orders as f64 * 100.0;
    if cancelled_pct > 5.0 {
        recommendations.push(Recommendation {
            severity: RecommendationSeverity::Warning,
            message: format!("Taxa de cancelamento alta ({cancelled_pct:.1}%). Analise os motivos dos cancelamentos."),
        });
    }
    if let Some(avg) = metrics.average_delivery_time_minutes {
        if avg > 60.0 {
            recommendations.push(Recommendation {
                severity: RecommendationSeverity::Info,
                message: format!("Tempo médio de entrega alto ({avg:.0} minutos). Considere otimizar o processo."),
            });
        }
    }
    if recommendations.is_empty() {
        recommendations.push(Recommendation {
            severity: RecommendationSeverity::Success,
            message: "Métricas dentro do esperado. Continue assim!".to_string(),
        });
    }
    recommendations
}

/// The Monday of the week before the one containing `today` — the window the scheduled weekly
/// report covers.
pub fn previous_week(today: NaiveDate) -> NaiveDate {
    today - Duration::days(today.weekday().num_days_from_monday() as i64) - Duration::days(7)
}

/// A day inside the month before the one containing `today`.
pub fn previous_month(today: NaiveDate) -> NaiveDate {
    today.with_day(1).unwrap_or(today) - Duration::days(1)
}
