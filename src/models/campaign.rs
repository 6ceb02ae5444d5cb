use jiff::Timestamp;
use serde::Serialize;
use uuid::Uuid;

text_enum! {
    /// Delivery state of one cold-email recipient
    pub enum RecipientStatus {
        Pending => "pending",
        Sent => "sent",
        Bounced => "bounced",
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColdEmailCampaign {
    pub id: Uuid,
    pub workspace_id: Uuid,
    pub name: String,
    pub subject: String,
    pub body: String,
    pub status: String,
    pub recipient_count: i32,
    pub sent_count: i32,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Recipient {
    pub id: Uuid,
    pub campaign_id: Uuid,
    pub email: String,
    pub status: RecipientStatus,
    pub sent_at: Option<Timestamp>,
    pub error_message: Option<String>,
    pub created_at: Timestamp,
}

/// Campaign counters after a batch has been recorded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CampaignProgress {
    pub recipient_count: i32,
    pub sent_count: i32,
    /// Recipients still waiting for a send attempt
    pub pending: i64,
}

impl ColdEmailCampaign {
    /// Status once every recipient has had a send attempt
    pub const STATUS_SENT: &'static str = "sent";
    /// Status while pending recipients remain
    pub const STATUS_SENDING: &'static str = "sending";
}
