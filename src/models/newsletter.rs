use jiff::Timestamp;
use serde::Serialize;
use uuid::Uuid;

text_enum! {
    pub enum SubscriberStatus {
        Active => "active",
        Unsubscribed => "unsubscribed",
    }
}

text_enum! {
    /// Outcome recorded for one (issue, subscriber) pair
    pub enum DeliveryStatus {
        Sent => "sent",
        Bounced => "bounced",
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewsletterIssue {
    pub id: Uuid,
    pub newsletter_id: Uuid,
    pub workspace_id: Uuid,
    pub subject: String,
    pub body: String,
    pub status: String,
    pub recipient_count: i32,
    pub sent_count: i32,
    pub sent_at: Option<Timestamp>,
    pub created_at: Timestamp,
}

impl NewsletterIssue {
    pub const STATUS_SENT: &'static str = "sent";
    pub const STATUS_SENDING: &'static str = "sending";
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Subscriber {
    pub id: Uuid,
    pub newsletter_id: Uuid,
    pub email: String,
    pub status: SubscriberStatus,
    pub created_at: Timestamp,
}

/// Delivery row; the (issue, subscriber) pair is unique so a subscriber is
/// never mailed twice for the same issue.
#[derive(Debug, Clone, PartialEq)]
pub struct NewDelivery {
    pub issue_id: Uuid,
    pub subscriber_id: Uuid,
    pub status: DeliveryStatus,
    pub error_message: Option<String>,
    pub delivered_at: Timestamp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IssueProgress {
    pub recipient_count: i32,
    pub sent_count: i32,
    /// Active subscribers without a delivery row for the issue
    pub remaining: i64,
}
