use serde_json::json;
use sqlx::PgConnection;

use crate::{
    events::NotificationHub,
    model::{
        event::Event,
        notification::{Notification, NotificationCreateInput, NotificationType},
    },
    repo::{event::EventRepo, notification::NotificationRepo},
};

#[derive(Clone)]
pub struct NotificationService;

impl NotificationService {
    /// Persists the notification, then pushes it to the recipient's live
    /// connections. The write comes first so a client that misses the push
    /// still finds the record when it next lists its notifications.
    pub async fn create_and_publish(
        input: NotificationCreateInput,
        hub: &NotificationHub,
        db: &mut PgConnection,
    ) -> sqlx::Result<Notification> {
        let notification = NotificationRepo::create_one(input, db).await?;
        hub.publish(&notification);
        Ok(notification)
    }

    /// Tells every participant except the organizer that an event changed.
    /// One participant's failed insert is logged and does not keep the rest
    /// from being notified.
    pub async fn notify_event_participants(
        event: &Event,
        title: &str,
        hub: &NotificationHub,
        db: &mut PgConnection,
    ) -> sqlx::Result<()> {
        let participant_ids = EventRepo::list_participant_ids(event.id, db).await?;
        for user_id in participant_ids {
            if user_id == event.organizer_id {
                continue;
            }
            let input = NotificationCreateInput {
                user_id,
                actor_id: Some(event.organizer_id),
                notification_type: NotificationType::System,
                payload: json!({
                    "title": title,
                    "body": event.title,
                    "target_type": "activity",
                    "target_id": event.id,
                }),
            };
            if let Err(e) = Self::create_and_publish(input, hub, db).await {
                tracing::error!(%user_id, "failed to notify participant: {e}");
            }
        }
        Ok(())
    }
}
