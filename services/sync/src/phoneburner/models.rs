use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::str::FromStr;

/// Known PhoneBurner contact response shapes. Selected explicitly from
/// configuration; records are never probed for alternative field names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContactSchemaVersion {
    V1,
    V2,
}

impl FromStr for ContactSchemaVersion {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "v1" => Ok(Self::V1),
            "v2" => Ok(Self::V2),
            other => Err(format!("unknown PhoneBurner contact schema: {other}")),
        }
    }
}

/// Normalized contact, independent of the API shape it came from.
#[derive(Debug, Clone)]
pub struct ContactRecord {
    pub external_id: String,
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub company: Option<String>,
    pub phone: Option<String>,
    pub raw: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct V1Contact {
    contact_id: i64,
    email: Option<String>,
    first_name: Option<String>,
    last_name: Option<String>,
    company: Option<String>,
    phone: Option<String>,
}

#[derive(Debug, Deserialize)]
struct V2Contact {
    id: String,
    primary_email: Option<String>,
    full_name: Option<String>,
    company_name: Option<String>,
    phone_number: Option<String>,
}

/// Locate the record array inside a contacts page.
pub fn contact_page_items(
    schema: ContactSchemaVersion,
    body: &serde_json::Value,
) -> Result<Vec<serde_json::Value>, String> {
    let key = match schema {
        ContactSchemaVersion::V1 => "contacts",
        ContactSchemaVersion::V2 => "data",
    };
    body.get(key)
        .and_then(|v| v.as_array())
        .cloned()
        .ok_or_else(|| format!("contacts page missing '{key}' array"))
}

pub fn parse_contact(
    schema: ContactSchemaVersion,
    item: &serde_json::Value,
) -> Result<ContactRecord, String> {
    match schema {
        ContactSchemaVersion::V1 => {
            let c: V1Contact =
                serde_json::from_value(item.clone()).map_err(|e| e.to_string())?;
            let display_name = match (c.first_name, c.last_name) {
                (Some(f), Some(l)) => Some(format!("{f} {l}")),
                (Some(f), None) => Some(f),
                (None, Some(l)) => Some(l),
                (None, None) => None,
            };
            Ok(ContactRecord {
                external_id: c.contact_id.to_string(),
                email: c.email,
                display_name,
                company: c.company,
                phone: c.phone,
                raw: item.clone(),
            })
        }
        ContactSchemaVersion::V2 => {
            let c: V2Contact =
                serde_json::from_value(item.clone()).map_err(|e| e.to_string())?;
            Ok(ContactRecord {
                external_id: c.id,
                email: c.primary_email,
                display_name: c.full_name,
                company: c.company_name,
                phone: c.phone_number,
                raw: item.clone(),
            })
        }
    }
}

/// Normalized dial session.
#[derive(Debug, Clone)]
pub struct SessionRecord {
    pub external_id: String,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub dial_count: i32,
    pub raw: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct WireSession {
    session_id: String,
    started_at: Option<DateTime<Utc>>,
    ended_at: Option<DateTime<Utc>>,
    dial_count: Option<i32>,
}

pub fn session_page_items(body: &serde_json::Value) -> Result<Vec<serde_json::Value>, String> {
    body.get("sessions")
        .and_then(|v| v.as_array())
        .cloned()
        .ok_or_else(|| "sessions page missing 'sessions' array".to_string())
}

pub fn parse_session(item: &serde_json::Value) -> Result<SessionRecord, String> {
    let s: WireSession = serde_json::from_value(item.clone()).map_err(|e| e.to_string())?;
    Ok(SessionRecord {
        external_id: s.session_id,
        started_at: s.started_at,
        ended_at: s.ended_at,
        dial_count: s.dial_count.unwrap_or(0),
        raw: item.clone(),
    })
}

/// Normalized dial within a session.
#[derive(Debug, Clone)]
pub struct DialRecord {
    pub external_id: String,
    pub contact_external_id: Option<String>,
    pub disposition: Option<String>,
    pub duration_secs: Option<i32>,
    pub dialed_at: Option<DateTime<Utc>>,
    pub raw: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct WireDial {
    dial_id: String,
    contact_id: Option<String>,
    disposition: Option<String>,
    duration_secs: Option<i32>,
    dialed_at: Option<DateTime<Utc>>,
}

pub fn dial_page_items(body: &serde_json::Value) -> Result<Vec<serde_json::Value>, String> {
    body.get("dials")
        .and_then(|v| v.as_array())
        .cloned()
        .ok_or_else(|| "session details missing 'dials' array".to_string())
}

pub fn parse_dial(item: &serde_json::Value) -> Result<DialRecord, String> {
    let d: WireDial = serde_json::from_value(item.clone()).map_err(|e| e.to_string())?;
    Ok(DialRecord {
        external_id: d.dial_id,
        contact_external_id: d.contact_id,
        disposition: d.disposition,
        duration_secs: d.duration_secs,
        dialed_at: d.dialed_at,
        raw: item.clone(),
    })
}
