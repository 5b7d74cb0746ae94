//! Anomaly classification for a site's day against its trailing week

use std::fmt;

use serde::Serialize;
use time::{Date, Duration};

use soloboard_shared::{SiteMetricsDaily, UptimeStatus};

/// Days of history averaged for comparison.
pub const HISTORY_DAYS: i64 = 7;

/// Visitors below this share of the average count as a traffic drop.
pub const LOW_TRAFFIC_RATIO: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertType {
    SiteDown,
    NoSales,
    LowTraffic,
}

impl AlertType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertType::SiteDown => "site_down",
            AlertType::NoSales => "no_sales",
            AlertType::LowTraffic => "low_traffic",
        }
    }
}

impl fmt::Display for AlertType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SiteHealth {
    Online,
    Warning,
    Offline,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoricalAverage {
    /// Cents per day
    pub avg_revenue_7d: f64,
    pub avg_visitors_7d: f64,
    pub days: usize,
}

impl HistoricalAverage {
    /// Plain mean over the rows given. No rows means zero averages.
    pub fn from_rows(rows: &[SiteMetricsDaily]) -> Self {
        if rows.is_empty() {
            return Self::default();
        }
        let n = rows.len() as f64;
        let revenue: i64 = rows.iter().map(|r| r.revenue).sum();
        let visitors: i64 = rows.iter().map(|r| r.visitors).sum();
        Self {
            avg_revenue_7d: revenue as f64 / n,
            avg_visitors_7d: visitors as f64 / n,
            days: rows.len(),
        }
    }

    /// Average over the `HISTORY_DAYS` days strictly before `today`.
    pub fn trailing_week(rows: &[SiteMetricsDaily], today: Date) -> Self {
        let since = history_start(today);
        let window: Vec<SiteMetricsDaily> = rows
            .iter()
            .filter(|r| r.date >= since && r.date < today)
            .cloned()
            .collect();
        Self::from_rows(&window)
    }
}

/// First day included in the trailing week.
pub fn history_start(today: Date) -> Date {
    today.saturating_sub(Duration::days(HISTORY_DAYS))
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DayMetrics {
    pub revenue: i64,
    pub visitors: i64,
    pub uptime: UptimeStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    #[serde(rename = "type")]
    pub alert_type: AlertType,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub drop_percentage: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Anomaly {
    pub status: SiteHealth,
    pub alert: Option<Alert>,
}

/// Classify a day. Downtime wins over missing sales, which wins over a
/// traffic drop; at most one alert comes back.
pub fn detect_anomaly(today: &DayMetrics, history: &HistoricalAverage) -> Anomaly {
    if today.uptime == UptimeStatus::Down {
        return Anomaly {
            status: SiteHealth::Offline,
            alert: Some(Alert {
                alert_type: AlertType::SiteDown,
                message: "Site is not responding".to_string(),
                drop_percentage: None,
            }),
        };
    }

    if today.revenue == 0 && history.avg_revenue_7d > 0.0 {
        return Anomaly {
            status: SiteHealth::Warning,
            alert: Some(Alert {
                alert_type: AlertType::NoSales,
                message: format!(
                    "No sales today (7-day average ${:.2}/day)",
                    history.avg_revenue_7d / 100.0
                ),
                drop_percentage: None,
            }),
        };
    }

    if history.avg_visitors_7d > 0.0
        && (today.visitors as f64) < history.avg_visitors_7d * LOW_TRAFFIC_RATIO
    {
        let drop = drop_percentage(today.visitors, history.avg_visitors_7d);
        return Anomaly {
            status: SiteHealth::Warning,
            alert: Some(Alert {
                alert_type: AlertType::LowTraffic,
                message: format!("Traffic is {}% below the 7-day average", drop),
                drop_percentage: Some(drop),
            }),
        };
    }

    Anomaly {
        status: SiteHealth::Online,
        alert: None,
    }
}

pub fn drop_percentage(today: i64, average: f64) -> u32 {
    if average <= 0.0 {
        return 0;
    }
    let pct = ((average - today as f64) / average * 100.0).round();
    pct.clamp(0.0, 100.0) as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::date;

    fn day(date: Date, revenue: i64, visitors: i64) -> SiteMetricsDaily {
        SiteMetricsDaily {
            site_id: "s1".into(),
            date,
            revenue,
            visitors,
            uptime_percentage: 100.0,
            response_time: 120,
        }
    }

    fn history(avg_revenue: f64, avg_visitors: f64) -> HistoricalAverage {
        HistoricalAverage {
            avg_revenue_7d: avg_revenue,
            avg_visitors_7d: avg_visitors,
            days: 7,
        }
    }

    fn today(revenue: i64, visitors: i64, uptime: UptimeStatus) -> DayMetrics {
        DayMetrics {
            revenue,
            visitors,
            uptime,
        }
    }

    #[test]
    fn down_beats_everything() {
        let a = detect_anomaly(&today(0, 0, UptimeStatus::Down), &history(1000.0, 100.0));
        assert_eq!(a.status, SiteHealth::Offline);
        assert_eq!(a.alert.unwrap().alert_type, AlertType::SiteDown);
    }

    #[test]
    fn no_sales_needs_history() {
        let a = detect_anomaly(&today(0, 100, UptimeStatus::Up), &history(1000.0, 100.0));
        assert_eq!(a.alert.unwrap().alert_type, AlertType::NoSales);

        let quiet = detect_anomaly(&today(0, 100, UptimeStatus::Up), &history(0.0, 100.0));
        assert!(quiet.alert.is_none());
        assert_eq!(quiet.status, SiteHealth::Online);
    }

    #[test]
    fn traffic_drop_threshold_is_half() {
        let h = history(0.0, 100.0);
        let dropped = detect_anomaly(&today(0, 49, UptimeStatus::Up), &h);
        let alert = dropped.alert.unwrap();
        assert_eq!(alert.alert_type, AlertType::LowTraffic);
        assert_eq!(alert.drop_percentage, Some(51));

        let borderline = detect_anomaly(&today(0, 50, UptimeStatus::Up), &h);
        assert!(borderline.alert.is_none());
    }

    #[test]
    fn trailing_week_excludes_today_and_older_rows() {
        let t = date!(2025 - 03 - 10);
        let rows = vec![
            day(t, 9999, 9999),
            day(date!(2025 - 03 - 09), 200, 20),
            day(date!(2025 - 03 - 03), 400, 40),
            day(date!(2025 - 03 - 02), 9999, 9999),
        ];
        let avg = HistoricalAverage::trailing_week(&rows, t);
        assert_eq!(avg.days, 2);
        assert_eq!(avg.avg_revenue_7d, 300.0);
        assert_eq!(avg.avg_visitors_7d, 30.0);
    }

    #[test]
    fn empty_history_is_zero() {
        assert_eq!(HistoricalAverage::from_rows(&[]), HistoricalAverage::default());
    }

    #[test]
    fn alert_serializes_with_type_key() {
        let alert = Alert {
            alert_type: AlertType::NoSales,
            message: "m".into(),
            drop_percentage: None,
        };
        let v = serde_json::to_value(&alert).unwrap();
        assert_eq!(v["type"], "no_sales");
        assert!(v.get("dropPercentage").is_none());
    }
}
