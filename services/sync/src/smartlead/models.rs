use serde::Deserialize;

/// Normalized campaign from the campaign listing.
#[derive(Debug, Clone)]
pub struct CampaignRecord {
    pub external_id: String,
    pub name: Option<String>,
    pub status: Option<String>,
    pub raw: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct WireCampaign {
    id: i64,
    name: Option<String>,
    status: Option<String>,
}

/// The campaign listing is a bare array.
pub fn campaign_page_items(body: &serde_json::Value) -> Result<Vec<serde_json::Value>, String> {
    body.as_array()
        .cloned()
        .ok_or_else(|| "campaign listing is not an array".to_string())
}

pub fn parse_campaign(item: &serde_json::Value) -> Result<CampaignRecord, String> {
    let c: WireCampaign = serde_json::from_value(item.clone()).map_err(|e| e.to_string())?;
    Ok(CampaignRecord {
        external_id: c.id.to_string(),
        name: c.name,
        status: c.status,
        raw: item.clone(),
    })
}

/// Normalized lead from a campaign's lead listing.
#[derive(Debug, Clone)]
pub struct LeadRecord {
    pub external_id: String,
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub company: Option<String>,
    pub raw: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct WireLead {
    id: i64,
    email: Option<String>,
    first_name: Option<String>,
    last_name: Option<String>,
    company_name: Option<String>,
}

pub fn lead_page_items(body: &serde_json::Value) -> Result<Vec<serde_json::Value>, String> {
    body.get("data")
        .and_then(|v| v.as_array())
        .cloned()
        .ok_or_else(|| "lead page missing 'data' array".to_string())
}

pub fn parse_lead(item: &serde_json::Value) -> Result<LeadRecord, String> {
    let l: WireLead = serde_json::from_value(item.clone()).map_err(|e| e.to_string())?;
    let display_name = match (l.first_name, l.last_name) {
        (Some(f), Some(la)) => Some(format!("{f} {la}")),
        (Some(f), None) => Some(f),
        (None, Some(la)) => Some(la),
        (None, None) => None,
    };
    Ok(LeadRecord {
        external_id: l.id.to_string(),
        email: l.email,
        display_name,
        company: l.company_name,
        raw: item.clone(),
    })
}
