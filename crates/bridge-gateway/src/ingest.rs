use tracing::{info, warn};

use crate::bridge::{Bridge, IngestOutcome};
use crate::error::IngestError;

impl Bridge {
    /// Post webhook content into the webhook's channel.
    ///
    /// Credentials are checked before anything else; an id that is not a
    /// number is just an unknown webhook. The content then takes the same
    /// path as a client message, sent under the webhook's name.
    pub async fn execute_webhook(
        &self,
        webhook_id: &str,
        token: &str,
        content: &str,
        remote_ip: &str,
    ) -> Result<IngestOutcome, IngestError> {
        let Ok(id) = webhook_id.parse::<i64>() else {
            return Err(IngestError::NotFound);
        };
        let webhook = self
            .db()
            .get_webhook_by_credentials(id, token)
            .map_err(|e| IngestError::Database(e.to_string()))?
            .ok_or(IngestError::NotFound)?;

        let channel = self
            .channels()
            .by_id(webhook.channel_id)
            .filter(|c| self.channels().is_valid_room(&c.group, &c.room))
            .ok_or(IngestError::ChannelNotFound)?;

        if let Err(e) = self.db().touch_webhook(webhook.id, remote_ip) {
            warn!("Failed to record use of webhook {}: {}", webhook.id, e);
        }

        info!("Webhook '{}' ({}) posting to {}", webhook.name, webhook.id, channel.room_key());
        self.submit(&channel, &webhook.name, content, None).await
    }
}
