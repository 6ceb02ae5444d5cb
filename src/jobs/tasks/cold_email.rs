use std::sync::Arc;

use async_trait::async_trait;
use jiff::Timestamp;
use serde::Deserialize;
use serde_json::{Value as JsonValue, json};
use uuid::Uuid;

use super::{ItemOutcome, batch_limit, parse_payload, run_batch};
use crate::config::TaskSettings;
use crate::delivery::{Delivery, OutgoingEmail};
use crate::error::{AppError, AppResult};
use crate::jobs::models::Job;
use crate::jobs::types::{JobHandler, JobType};
use crate::lock::Lease;
use crate::models::{ColdEmailCampaign, Recipient};
use crate::store::CampaignStore;

#[derive(Debug, Deserialize)]
struct ColdEmailPayload {
    campaign_id: Uuid,
}

/// Sends one batch of a cold email campaign
pub struct ColdEmailProcessor {
    campaigns: Arc<dyn CampaignStore>,
    delivery: Delivery,
    settings: TaskSettings,
}

impl ColdEmailProcessor {
    pub fn new(campaigns: Arc<dyn CampaignStore>, delivery: Delivery, settings: TaskSettings) -> Self {
        Self {
            campaigns,
            delivery,
            settings,
        }
    }

    async fn deliver(&self, campaign: &ColdEmailCampaign, recipient: Recipient) -> AppResult<ItemOutcome> {
        let email = OutgoingEmail {
            to: recipient.email.clone(),
            from: self.delivery.from_address.clone(),
            subject: campaign.subject.clone(),
            body: campaign.body.clone(),
            workspace_id: campaign.workspace_id,
            reference_id: recipient.id,
        };

        let outcome = match self.delivery.mailer.send(&email).await {
            Ok(_) => self
                .campaigns
                .mark_recipient_sent(recipient.id, Timestamp::now())
                .await?
                .then_some(ItemOutcome::Delivered),
            Err(error) => {
                tracing::warn!(
                    campaign_id = %campaign.id,
                    recipient_id = %recipient.id,
                    error = %error,
                    "Cold email bounced"
                );
                self.campaigns
                    .mark_recipient_bounced(recipient.id, &error.to_string())
                    .await?
                    .then_some(ItemOutcome::Rejected)
            }
        };

        Ok(outcome.unwrap_or_else(|| {
            tracing::debug!(recipient_id = %recipient.id, "Recipient already advanced");
            ItemOutcome::Skipped
        }))
    }
}

#[async_trait]
impl JobHandler for ColdEmailProcessor {
    fn job_type(&self) -> JobType {
        JobType::ColdEmailSend
    }

    async fn handle(&self, job: &Job, _lease: &Lease) -> AppResult<JsonValue> {
        let payload: ColdEmailPayload = parse_payload(job)?;
        let campaign = self
            .campaigns
            .find_campaign(payload.campaign_id)
            .await?
            .ok_or_else(|| AppError::not_found("Campaign", "id", payload.campaign_id))?;

        if campaign.workspace_id != job.workspace_id {
            return Err(AppError::validation(
                "payload.campaign_id",
                format!(
                    "Campaign {} belongs to workspace {}, not {}",
                    campaign.id, campaign.workspace_id, job.workspace_id
                ),
            ));
        }

        let recipients = self
            .campaigns
            .pending_recipients(campaign.id, batch_limit(self.settings.batch_size))
            .await?;
        tracing::info!(
            job_id = %job.id,
            campaign_id = %campaign.id,
            batch = recipients.len(),
            "Sending cold email batch"
        );

        let tally = run_batch(recipients, self.settings.send_concurrency, |recipient| {
            self.deliver(&campaign, recipient)
        })
        .await?;

        let progress = self
            .campaigns
            .record_campaign_progress(campaign.id, tally.delivered, Timestamp::now())
            .await?;

        Ok(json!({
            "sent": tally.delivered,
            "bounced": tally.rejected,
            "remaining": progress.pending,
        }))
    }
}
