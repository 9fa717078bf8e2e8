use crate::database::{FilterConfigRow, filter_configs};
use crate::error::AppError;
use crate::session::InstitutionContext;
use crate::store::Store;
use diesel::prelude::*;
use serde::Serialize;
use time::OffsetDateTime;

/// The URL blacklist an institution's devices enforce.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterConfig {
    pub institution_id: String,
    pub blacklist: Vec<String>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub updated_at: Option<OffsetDateTime>,
    pub updated_by: Option<String>,
}

impl FilterConfig {
    fn empty(institution_id: &str) -> Self {
        FilterConfig {
            institution_id: institution_id.to_string(),
            blacklist: Vec::new(),
            updated_at: None,
            updated_by: None,
        }
    }
}

impl TryFrom<FilterConfigRow> for FilterConfig {
    type Error = AppError;

    fn try_from(row: FilterConfigRow) -> Result<Self, Self::Error> {
        let blacklist = serde_json::from_str(&row.blacklist).map_err(|err| {
            AppError::Internal(format!(
                "stored blacklist of {} is unreadable: {err}",
                row.institution_id
            ))
        })?;
        Ok(FilterConfig {
            institution_id: row.institution_id,
            blacklist,
            updated_at: Some(row.updated_at),
            updated_by: Some(row.updated_by),
        })
    }
}

/// Reduces a URL to the host-and-path form devices match against.
///
/// `https://Example.com/` and `example.com` are the same entry.
pub fn normalize_url(raw: &str) -> Result<String, AppError> {
    let lowered = raw.trim().to_lowercase();
    let without_scheme = lowered
        .strip_prefix("https://")
        .or_else(|| lowered.strip_prefix("http://"))
        .unwrap_or(&lowered);
    let normalized = without_scheme.trim_end_matches('/');

    if normalized.is_empty() {
        return Err(AppError::Validation(format!("{raw:?} is not a usable URL")));
    }
    Ok(normalized.to_string())
}

/// Normalizes every entry, keeping the first of any duplicates.
pub fn normalize_blacklist<S: AsRef<str>>(urls: &[S]) -> Result<Vec<String>, AppError> {
    let mut normalized: Vec<String> = Vec::with_capacity(urls.len());
    for url in urls {
        let url = normalize_url(url.as_ref())?;
        if !normalized.contains(&url) {
            normalized.push(url);
        }
    }
    Ok(normalized)
}

impl Store {
    /// The institution's blacklist. Institutions that never saved one have an empty list.
    pub fn filter_config(&self, ctx: &InstitutionContext) -> Result<FilterConfig, AppError> {
        let row = self.with_connection(|conn| {
            Ok(filter_configs::table
                .find(ctx.institution_id())
                .select(FilterConfigRow::as_select())
                .first(conn)
                .optional()?)
        })?;

        match row {
            Some(row) => row.try_into(),
            None => Ok(FilterConfig::empty(ctx.institution_id())),
        }
    }

    /// Replaces the blacklist. An empty list clears it.
    pub fn save_filter_config<S: AsRef<str>>(
        &self,
        ctx: &InstitutionContext,
        urls: &[S],
        updated_by: &str,
    ) -> Result<FilterConfig, AppError> {
        let blacklist = normalize_blacklist(urls)?;
        self.institution(ctx)?;

        let encoded = serde_json::to_string(&blacklist)
            .map_err(|err| AppError::Internal(format!("could not encode blacklist: {err}")))?;
        let row = FilterConfigRow {
            institution_id: ctx.institution_id().to_string(),
            blacklist: encoded,
            updated_at: OffsetDateTime::now_utc(),
            updated_by: updated_by.to_string(),
        };
        self.with_connection(|conn| {
            diesel::replace_into(filter_configs::table)
                .values(&row)
                .execute(conn)?;
            Ok(())
        })?;

        tracing::info!(
            institution = %row.institution_id,
            entries = blacklist.len(),
            "saved URL blacklist"
        );
        Ok(FilterConfig {
            institution_id: row.institution_id,
            blacklist,
            updated_at: Some(row.updated_at),
            updated_by: Some(row.updated_by),
        })
    }
}
