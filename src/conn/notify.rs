use tracing::{debug, error, trace};

use super::{ConnectionManager, Connector, Notification, Session};
use crate::errors::Result;
use crate::utils::quote_identifier;

impl<C: Connector> ConnectionManager<C> {
    /// Blocks until a notification arrives on one of `channels` or the wait
    /// time elapses, whichever comes first.
    ///
    /// The channels are listened to for the duration of the wait only. A
    /// notification and a timeout look the same to the caller; either way the
    /// caller is expected to poll its queues again.
    pub async fn wait<S: AsRef<str>>(&self, channels: &[S]) -> Result<()> {
        if channels.is_empty() {
            tokio::time::sleep(self.wait_time).await;
            return Ok(());
        }

        self.execute(&channel_statement("LISTEN", channels), &[])
            .await?;
        match self.wait_for_notify().await? {
            Some(notification) => debug!(
                at = "wait",
                channel = %notification.channel,
                "Received notification"
            ),
            None => trace!(at = "wait", "Wait timed out"),
        }
        self.execute(&channel_statement("UNLISTEN", channels), &[])
            .await?;
        self.drain_notifications().await;

        Ok(())
    }

    async fn wait_for_notify(&self) -> Result<Option<Notification>> {
        let mut guard = self.session.lock().await;
        let Some(session) = guard.as_mut() else {
            return Ok(None);
        };

        let result = session.wait_for_notification(self.wait_time).await;
        match result {
            Ok(notification) => Ok(notification),
            Err(e) => {
                error!(at = "wait", error = %e, "Lost connection while waiting");
                self.discard(&mut guard).await;
                Err(e.into())
            }
        }
    }

    /// Discards notifications that arrived while nobody was waiting.
    async fn drain_notifications(&self) {
        let mut guard = self.session.lock().await;
        if let Some(session) = guard.as_mut() {
            while let Some(notification) = session.next_buffered() {
                debug!(
                    at = "drain_notifications",
                    channel = %notification.channel
                );
            }
        }
    }
}

fn channel_statement<S: AsRef<str>>(command: &str, channels: &[S]) -> String {
    channels
        .iter()
        .map(|channel| format!("{command} {}", quote_identifier(channel.as_ref())))
        .collect::<Vec<_>>()
        .join(";")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_statement() {
        assert_eq!(channel_statement("LISTEN", &["default"]), "LISTEN \"default\"");
        assert_eq!(
            channel_statement("UNLISTEN", &["a", "b"]),
            "UNLISTEN \"a\";UNLISTEN \"b\""
        );
    }
}
