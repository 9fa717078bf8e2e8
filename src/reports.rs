use crate::documents::ActivityLog;
use crate::error::AppError;
use crate::roster::infractions_on;
use crate::session::InstitutionContext;
use crate::store::Store;
use serde::Serialize;
use std::collections::HashMap;
use time::{Date, Duration, UtcOffset};

/// Sites listed by name before the rest are folded into "other".
const TOP_SITES: usize = 5;
const REPORT_DAYS: i64 = 7;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SiteUsage {
    pub site: String,
    pub minutes: i64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DailyInfractions {
    #[serde(with = "iso_date")]
    pub date: Date,
    pub weekday: String,
    pub infractions: usize,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageReport {
    pub student_count: usize,
    pub usage_by_site: Vec<SiteUsage>,
    pub daily_infractions: Vec<DailyInfractions>,
}

time::serde::format_description!(iso_date, Date, "[year]-[month]-[day]");

/// The host part of a logged URL.
fn site_of(url: &str) -> String {
    let lowered = url.trim().to_lowercase();
    let without_scheme = lowered
        .split_once("://")
        .map_or(lowered.as_str(), |(_, rest)| rest);
    let host = without_scheme
        .split(['/', '?', '#'])
        .next()
        .unwrap_or(without_scheme);
    host.strip_prefix("www.").unwrap_or(host).to_string()
}

fn to_minutes(seconds: i64) -> i64 {
    seconds.saturating_add(30) / 60
}

/// Time spent per site, largest first, the tail folded into "other".
pub fn usage_by_site(logs: &[ActivityLog]) -> Vec<SiteUsage> {
    let mut seconds: HashMap<String, i64> = HashMap::new();
    for log in logs {
        let total = seconds.entry(site_of(&log.url)).or_default();
        *total = total.saturating_add(log.duration_secs.max(0));
    }

    let mut ranked: Vec<(String, i64)> = seconds.into_iter().collect();
    ranked.sort_by(|(a_site, a), (b_site, b)| b.cmp(a).then_with(|| a_site.cmp(b_site)));

    let other = ranked
        .iter()
        .skip(TOP_SITES)
        .fold(0i64, |sum, (_, secs)| sum.saturating_add(*secs));
    let mut usage: Vec<SiteUsage> = ranked
        .into_iter()
        .take(TOP_SITES)
        .map(|(site, secs)| SiteUsage {
            site,
            minutes: to_minutes(secs),
        })
        .collect();
    if other > 0 {
        usage.push(SiteUsage {
            site: "other".to_string(),
            minutes: to_minutes(other),
        });
    }
    usage
}

/// Infractions for each of the seven days ending `today`, oldest first.
pub fn daily_infractions(
    logs: &[ActivityLog],
    today: Date,
    offset: UtcOffset,
) -> Vec<DailyInfractions> {
    (0..REPORT_DAYS)
        .rev()
        .map(|days_back| {
            let date = today - Duration::days(days_back);
            DailyInfractions {
                date,
                weekday: date.weekday().to_string(),
                infractions: infractions_on(logs, date, offset),
            }
        })
        .collect()
}

impl Store {
    /// Usage and infractions across the institution for the last seven days.
    pub fn usage_report(
        &self,
        ctx: &InstitutionContext,
        today: Date,
        offset: UtcOffset,
    ) -> Result<UsageReport, AppError> {
        let students = self.institution_students(ctx)?;
        let first_day = today - Duration::days(REPORT_DAYS - 1);
        let logs: Vec<ActivityLog> = students
            .iter()
            .flat_map(|student| student.activity_logs.iter())
            .filter(|log| {
                let day = log.timestamp.to_offset(offset).date();
                first_day <= day && day <= today
            })
            .cloned()
            .collect();

        Ok(UsageReport {
            student_count: students.len(),
            usage_by_site: usage_by_site(&logs),
            daily_infractions: daily_infractions(&logs, today, offset),
        })
    }
}
