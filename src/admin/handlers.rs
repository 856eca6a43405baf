use std::collections::{BTreeMap, BTreeSet};
use std::net::IpAddr;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{Duration, Timelike, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::audit::{AuditEvent, AuditLevel, LogFilter};
use crate::http::server::AppState;
use crate::security::inspector::SecurityStats;
use crate::security::policies::{PolicyName, UnblockScope};
use crate::security::rate_limit::GateStats;

const DEFAULT_LOG_LIMIT: usize = 50;
const MAX_LOG_LIMIT: usize = 500;
const RECENT_EVENTS: usize = 20;

/// Error body for admin requests.
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(json!({ "success": false, "error": self.message })),
        )
            .into_response()
    }
}

#[derive(Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub status: &'static str,
}

pub async fn get_status() -> Json<SystemStatus> {
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        status: "operational",
    })
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityOverview {
    pub inspector: SecurityStats,
    pub rate_limits: BTreeMap<PolicyName, GateStats>,
    pub recent_events: Vec<AuditEvent>,
    pub audit_dropped: u64,
}

pub async fn get_overview(State(state): State<AppState>) -> Json<SecurityOverview> {
    let recent_events = state
        .audit_log
        .recent(state.audit_log.len())
        .into_iter()
        .filter(|event| event.level != AuditLevel::Info)
        .take(RECENT_EVENTS)
        .collect();

    Json(SecurityOverview {
        inspector: state.inspector.security_stats(),
        rate_limits: state.policies.stats(),
        recent_events,
        audit_dropped: state.audit.dropped(),
    })
}

#[derive(Debug, Default, Deserialize)]
pub struct LogQuery {
    pub level: Option<String>,
    pub ip: Option<String>,
    pub identity: Option<String>,
    pub offset: Option<usize>,
    pub limit: Option<usize>,
}

#[derive(Serialize)]
pub struct LogPage {
    pub logs: Vec<AuditEvent>,
    pub offset: usize,
    pub limit: usize,
}

pub async fn get_logs(
    State(state): State<AppState>,
    Query(query): Query<LogQuery>,
) -> Result<Json<LogPage>, ApiError> {
    let level = query
        .level
        .as_deref()
        .map(str::parse::<AuditLevel>)
        .transpose()
        .map_err(ApiError::bad_request)?;
    let offset = query.offset.unwrap_or(0);
    let limit = query.limit.unwrap_or(DEFAULT_LOG_LIMIT).min(MAX_LOG_LIMIT);

    let logs = state.audit_log.query(&LogFilter {
        level,
        ip: query.ip,
        identity: query.identity,
        since: None,
        offset,
        limit: Some(limit),
    });
    Ok(Json(LogPage {
        logs,
        offset,
        limit,
    }))
}

#[derive(Debug, Deserialize)]
pub struct BlockIpRequest {
    pub ip: Option<String>,
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UnblockIpRequest {
    pub ip: Option<String>,
}

fn parse_ip(ip: Option<&str>) -> Result<IpAddr, ApiError> {
    let ip = ip
        .filter(|ip| !ip.is_empty())
        .ok_or_else(|| ApiError::bad_request("IP address is required"))?;
    ip.parse()
        .map_err(|_| ApiError::bad_request(format!("Invalid IP address: {ip}")))
}

pub async fn block_ip(
    State(state): State<AppState>,
    Json(body): Json<BlockIpRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let ip = parse_ip(body.ip.as_deref())?;
    let reason = body
        .reason
        .filter(|reason| !reason.is_empty())
        .unwrap_or_else(|| "Manual block by administrator".to_string());

    state.inspector.block_ip(ip, &reason);
    Ok(Json(json!({
        "success": true,
        "message": format!("IP {ip} has been blocked"),
        "reason": reason,
    })))
}

pub async fn unblock_ip(
    State(state): State<AppState>,
    Json(body): Json<UnblockIpRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let ip = parse_ip(body.ip.as_deref())?;
    if !state.inspector.unblock_ip(ip) {
        return Err(ApiError::not_found(format!("IP {ip} is not blocked")));
    }
    Ok(Json(json!({
        "success": true,
        "message": format!("IP {ip} has been unblocked"),
    })))
}

#[derive(Debug, Deserialize)]
pub struct UnblockRateLimitRequest {
    pub identifier: Option<String>,
    #[serde(rename = "type")]
    pub scope: Option<String>,
}

pub async fn unblock_rate_limit(
    State(state): State<AppState>,
    Json(body): Json<UnblockRateLimitRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let identifier = body
        .identifier
        .filter(|identifier| !identifier.is_empty())
        .ok_or_else(|| ApiError::bad_request("Identifier is required"))?;
    let scope: UnblockScope = body
        .scope
        .as_deref()
        .unwrap_or("all")
        .parse()
        .map_err(ApiError::bad_request)?;

    if !state.policies.unblock(&identifier, scope) {
        return Err(ApiError::not_found(format!(
            "No rate limit entry found for {identifier}"
        )));
    }
    Ok(Json(json!({
        "success": true,
        "message": format!("Rate limit cleared for {identifier}"),
    })))
}

#[derive(Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ThreatSummary {
    pub period: &'static str,
    pub total_threats: usize,
    pub unique_ips: usize,
    pub attack_types: BTreeMap<String, usize>,
    /// Threat count per UTC hour of day.
    pub hourly_distribution: Vec<usize>,
}

/// Summarize warning and error events from the last 24 hours.
pub fn summarize_threats(events: &[AuditEvent]) -> ThreatSummary {
    let since = Utc::now() - Duration::hours(24);
    let mut ips = BTreeSet::new();
    let mut attack_types = BTreeMap::new();
    let mut hourly = vec![0; 24];
    let mut total = 0;

    for event in events
        .iter()
        .filter(|event| event.level != AuditLevel::Info && event.timestamp >= since)
    {
        total += 1;
        if let Some(ip) = &event.ip {
            ips.insert(ip.as_str());
        }
        *attack_types.entry(event.category.clone()).or_insert(0) += 1;
        hourly[event.timestamp.hour() as usize] += 1;
    }

    ThreatSummary {
        period: "24h",
        total_threats: total,
        unique_ips: ips.len(),
        attack_types,
        hourly_distribution: hourly,
    }
}

pub async fn get_threats(State(state): State<AppState>) -> Json<ThreatSummary> {
    let events = state.audit_log.recent(state.audit_log.len());
    Json(summarize_threats(&events))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::category;

    #[test]
    fn test_threat_summary_counts_recent_warnings() {
        let mut stale = AuditEvent::error(category::AUTO_BLOCK, "old").with_ip("1.1.1.1");
        stale.timestamp = Utc::now() - Duration::hours(30);

        let events = vec![
            AuditEvent::warning(category::SUSPICIOUS_CONTENT, "a").with_ip("1.1.1.1"),
            AuditEvent::warning(category::SUSPICIOUS_CONTENT, "b").with_ip("2.2.2.2"),
            AuditEvent::error(category::AUTO_BLOCK, "c").with_ip("1.1.1.1"),
            AuditEvent::info(category::ACCESS_GRANTED, "d").with_ip("3.3.3.3"),
            stale,
        ];

        let summary = summarize_threats(&events);
        assert_eq!(summary.total_threats, 3);
        assert_eq!(summary.unique_ips, 2);
        assert_eq!(summary.attack_types["SUSPICIOUS_CONTENT"], 2);
        assert_eq!(summary.attack_types["AUTO_BLOCK"], 1);
        assert_eq!(summary.hourly_distribution.iter().sum::<usize>(), 3);
    }

    #[test]
    fn test_parse_ip_rejects_missing_and_invalid() {
        assert!(parse_ip(None).is_err());
        assert!(parse_ip(Some("")).is_err());
        assert!(parse_ip(Some("not-an-ip")).is_err());
        assert_eq!(parse_ip(Some("::1")).ok(), Some("::1".parse().unwrap()));
    }
}
