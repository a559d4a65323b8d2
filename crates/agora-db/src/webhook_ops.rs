use agora_core::id::{DeliveryId, WebhookId};

use crate::{
    Database, DbResult, DeliveryRecord, WebhookRecord, webhook_deliveries, webhooks,
};

impl Database {
    pub async fn insert_webhook(
        &self,
        webhook_id: WebhookId,
        record: WebhookRecord,
    ) -> DbResult<()> {
        self.write_with(|tx| {
            tx.open_table(&webhooks::TABLE)?
                .insert(&webhook_id, &record)?;
            Ok(())
        })
        .await
    }

    /// Active webhooks subscribed to the given event type.
    pub async fn list_webhooks_for_event(
        &self,
        event_type: &str,
    ) -> DbResult<Vec<(WebhookId, WebhookRecord)>> {
        self.read_with(|tx| {
            let table = tx.open_table(&webhooks::TABLE)?;
            let mut out = Vec::new();
            for entry in table.range(..)? {
                let (k, v) = entry?;
                let record = v.value();
                if record.active && record.subscribes_to(event_type) {
                    out.push((k.value(), record));
                }
            }
            Ok(out)
        })
        .await
    }

    /// Append one immutable delivery-audit row.
    pub async fn record_webhook_delivery(
        &self,
        webhook_id: WebhookId,
        delivery_id: DeliveryId,
        record: DeliveryRecord,
    ) -> DbResult<()> {
        self.write_with(|tx| {
            tx.open_table(&webhook_deliveries::TABLE)?
                .insert(&(webhook_id, delivery_id), &record)?;
            Ok(())
        })
        .await
    }

    pub async fn list_webhook_deliveries(
        &self,
        webhook_id: WebhookId,
    ) -> DbResult<Vec<(DeliveryId, DeliveryRecord)>> {
        self.read_with(|tx| {
            let table = tx.open_table(&webhook_deliveries::TABLE)?;
            let mut out = Vec::new();
            for entry in
                table.range((webhook_id, DeliveryId::ZERO)..=(webhook_id, DeliveryId::MAX))?
            {
                let (k, v) = entry?;
                out.push((k.value().1, v.value()));
            }
            Ok(out)
        })
        .await
    }
}
