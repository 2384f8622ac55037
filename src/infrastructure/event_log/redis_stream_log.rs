//! Redis Streams backed event log.

use super::service::{EventLog, LogError, LogMessage, LogResult, ReadFrom};
use crate::config::mask_connection_string;
use crate::domain::click_event::ClickEvent;
use async_trait::async_trait;
use redis::streams::{
    StreamAutoClaimOptions, StreamAutoClaimReply, StreamId, StreamReadOptions, StreamReadReply,
};
use redis::{AsyncCommands, Client, aio::ConnectionManager};
use std::time::Duration;
use tokio_retry::Retry;
use tokio_retry::strategy::FixedInterval;
use tracing::{debug, info, warn};

const PAYLOAD_FIELD: &str = "payload";
const CONNECT_ATTEMPTS: usize = 5;
const CONNECT_RETRY_DELAY: Duration = Duration::from_secs(2);

/// Durable log on a Redis stream with a single consumer group.
///
/// `XADD` returns after the server has appended the entry and `XREADGROUP`
/// distributes entries across named consumers. Acknowledgement runs `XACK`
/// and `XDEL` together, so the stream only holds undelivered and pending
/// entries. `XAUTOCLAIM` moves idle pending entries to a live consumer.
pub struct RedisStreamLog {
    conn: ConnectionManager,
    stream_key: String,
    group: String,
}

impl RedisStreamLog {
    /// Connects to Redis and validates the connection with a PING.
    ///
    /// # Errors
    ///
    /// Returns [`LogError::Connection`] if the URL is invalid, the connection
    /// cannot be established, or the PING fails.
    pub async fn connect(redis_url: &str, stream_key: &str, group: &str) -> LogResult<Self> {
        info!(
            "Connecting to Redis stream '{}' at {}",
            stream_key,
            mask_connection_string(redis_url)
        );

        let client = Client::open(redis_url)
            .map_err(|e| LogError::Connection(format!("Failed to create Redis client: {}", e)))?;

        let conn = ConnectionManager::new(client)
            .await
            .map_err(|e| LogError::Connection(format!("Failed to connect to Redis: {}", e)))?;

        let mut test_conn = conn.clone();
        test_conn
            .ping::<()>()
            .await
            .map_err(|e| LogError::Connection(format!("Redis PING failed: {}", e)))?;

        info!("✓ Connected to Redis stream '{}'", stream_key);

        Ok(Self {
            conn,
            stream_key: stream_key.to_string(),
            group: group.to_string(),
        })
    }

    /// Connects with a fixed number of attempts, pausing between them.
    pub async fn connect_with_retry(
        redis_url: &str,
        stream_key: &str,
        group: &str,
    ) -> LogResult<Self> {
        let strategy = FixedInterval::new(CONNECT_RETRY_DELAY).take(CONNECT_ATTEMPTS - 1);

        Retry::spawn(strategy, || async {
            Self::connect(redis_url, stream_key, group)
                .await
                .inspect_err(|e| warn!("Event log connection attempt failed: {}", e))
        })
        .await
    }
}

#[async_trait]
impl EventLog for RedisStreamLog {
    async fn ensure_topic(&self) -> LogResult<()> {
        let mut conn = self.conn.clone();

        let created: redis::RedisResult<()> = conn
            .xgroup_create_mkstream(&self.stream_key, &self.group, "0")
            .await;

        match created {
            Ok(()) => {
                info!(
                    "Created consumer group '{}' on stream '{}'",
                    self.group, self.stream_key
                );
                Ok(())
            }
            Err(e) if e.code() == Some("BUSYGROUP") => {
                debug!("Consumer group '{}' already exists", self.group);
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn publish(&self, event: &ClickEvent) -> LogResult<()> {
        let payload = serde_json::to_vec(event)?;
        let mut conn = self.conn.clone();

        let entry_id: String = conn
            .xadd(
                &self.stream_key,
                "*",
                &[(PAYLOAD_FIELD, payload.as_slice())],
            )
            .await?;

        debug!(click_id = %event.id, entry_id = %entry_id, "Published click");
        Ok(())
    }

    async fn read(
        &self,
        consumer: &str,
        from: ReadFrom,
        max: usize,
    ) -> LogResult<Vec<LogMessage>> {
        let start = match from {
            ReadFrom::Pending => "0",
            ReadFrom::New => ">",
        };
        let options = StreamReadOptions::default()
            .group(&self.group, consumer)
            .count(max);
        let mut conn = self.conn.clone();

        let reply: Option<StreamReadReply> = conn
            .xread_options(&[&self.stream_key], &[start], &options)
            .await?;

        let messages = reply
            .map(|reply| {
                reply
                    .keys
                    .into_iter()
                    .flat_map(|key| key.ids)
                    .map(to_message)
                    .collect()
            })
            .unwrap_or_default();

        Ok(messages)
    }

    async fn claim(
        &self,
        consumer: &str,
        min_idle: Duration,
        max: usize,
    ) -> LogResult<Vec<LogMessage>> {
        let options = StreamAutoClaimOptions::default().count(max);
        let mut conn = self.conn.clone();

        let reply: StreamAutoClaimReply = conn
            .xautoclaim_options(
                &self.stream_key,
                &self.group,
                consumer,
                min_idle.as_millis() as u64,
                "0-0",
                options,
            )
            .await?;

        if !reply.claimed.is_empty() {
            info!(
                consumer,
                claimed = reply.claimed.len(),
                "Claimed idle pending entries"
            );
        }

        Ok(reply.claimed.into_iter().map(to_message).collect())
    }

    async fn ack(&self, ids: &[String]) -> LogResult<()> {
        if ids.is_empty() {
            return Ok(());
        }

        let mut conn = self.conn.clone();
        let (acked, deleted): (i64, i64) = redis::pipe()
            .atomic()
            .xack(&self.stream_key, &self.group, ids)
            .xdel(&self.stream_key, ids)
            .query_async(&mut conn)
            .await?;

        debug!(
            "Acknowledged {} and deleted {} of {} entries",
            acked,
            deleted,
            ids.len()
        );
        Ok(())
    }

    async fn health_check(&self) -> bool {
        let mut conn = self.conn.clone();
        conn.ping::<()>().await.is_ok()
    }
}

/// An entry whose payload was already deleted decodes to an empty payload.
fn to_message(entry: StreamId) -> LogMessage {
    LogMessage {
        payload: entry.get::<Vec<u8>>(PAYLOAD_FIELD).unwrap_or_default(),
        id: entry.id,
    }
}
