use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

/// Activity-level fact row, one per (workspace, campaign, contact, step).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailActivity {
    pub id: Uuid,
    pub workspace_id: Uuid,
    pub campaign_id: Uuid,
    pub contact_id: Uuid,
    pub step: i32,
    pub sent_at: Option<DateTime<Utc>>,
    pub open_count: i32,
    pub last_opened_at: Option<DateTime<Utc>>,
    pub click_count: i32,
    pub last_clicked_at: Option<DateTime<Utc>>,
    pub replied_at: Option<DateTime<Utc>>,
    pub reply_category: Option<String>,
    pub bounced_at: Option<DateTime<Utc>>,
    pub unsubscribed_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmailEventKind {
    Sent,
    Opened,
    Clicked,
    Replied,
    Bounced,
    Finished,
    Unsubscribed,
}

impl EmailEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sent => "sent",
            Self::Opened => "opened",
            Self::Clicked => "clicked",
            Self::Replied => "replied",
            Self::Bounced => "bounced",
            Self::Finished => "finished",
            Self::Unsubscribed => "unsubscribed",
        }
    }
}

impl FromStr for EmailEventKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sent" => Ok(Self::Sent),
            "opened" => Ok(Self::Opened),
            "clicked" => Ok(Self::Clicked),
            "replied" => Ok(Self::Replied),
            "bounced" => Ok(Self::Bounced),
            "finished" => Ok(Self::Finished),
            "unsubscribed" => Ok(Self::Unsubscribed),
            other => Err(format!("unknown email event type: {other}")),
        }
    }
}

/// The target of one webhook-event application.
#[derive(Debug, Clone)]
pub struct EmailEventTarget {
    pub workspace_id: Uuid,
    pub campaign_id: Uuid,
    pub contact_id: Uuid,
    pub step: i32,
    pub kind: EmailEventKind,
    pub occurred_at: DateTime<Utc>,
}
