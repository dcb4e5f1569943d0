//! Redis Streams-backed event bus (durable, at-least-once delivery).
//!
//! - **Stream key**: `pricewatch:events` by default, one stream for every routing key.
//!   Each entry carries `routing_key`, `event_type`, `event_id` and the JSON
//!   envelope as `payload`.
//! - **Consumer groups**: one per `(group, pattern)` subscription, so every
//!   subscriber sees every matching event once.
//! - **Acknowledgement**: after the envelope is handed to the subscriber.
//!   Entries whose routing key does not match the pattern are acknowledged and
//!   skipped.
//! - **Redelivery**: pending entries idle longer than the reclaim timeout are
//!   claimed again; after `max_deliveries` they move to `<stream key>:dlq`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use tokio::sync::mpsc;
use tracing::{debug, error, instrument, warn};

use pricewatch_events::{topic_matches, EventBus, JsonEnvelope, PublishError, Subscription};

use super::DEFAULT_STREAM_KEY;

const DEFAULT_MAX_DELIVERIES: u64 = 5;
const DEFAULT_RECLAIM_IDLE_MS: u64 = 60_000;
/// Approximate cap on stream length (`XADD MAXLEN ~`).
const DEFAULT_MAX_LEN: u64 = 100_000;
const READ_COUNT: usize = 10;
const BLOCK_MS: u64 = 1_000;
const ERROR_BACKOFF: Duration = Duration::from_secs(1);

#[derive(Debug, thiserror::Error)]
pub enum RedisStreamsError {
    #[error("Redis connection error: {0}")]
    Connection(String),

    #[error("Redis command error: {0}")]
    Command(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

fn dlq_key(stream_key: &str) -> String {
    format!("{stream_key}:dlq")
}

impl From<RedisStreamsError> for PublishError {
    fn from(err: RedisStreamsError) -> Self {
        match err {
            RedisStreamsError::Serialization(msg) => PublishError::Serialization(msg),
            other => PublishError::Unavailable(other.to_string()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RedisStreamsEventBus {
    client: Arc<redis::Client>,
    stream_key: String,
    dlq_key: String,
    group: String,
    consumer: String,
    max_deliveries: u64,
    reclaim_idle_ms: u64,
}

impl RedisStreamsEventBus {
    /// `group` prefixes the consumer groups created by [`subscribe`](EventBus::subscribe).
    pub fn new(redis_url: impl AsRef<str>, group: impl Into<String>) -> Result<Self, RedisStreamsError> {
        let client = redis::Client::open(redis_url.as_ref())
            .map_err(|e| RedisStreamsError::Connection(e.to_string()))?;

        Ok(Self {
            client: Arc::new(client),
            stream_key: DEFAULT_STREAM_KEY.to_string(),
            dlq_key: dlq_key(DEFAULT_STREAM_KEY),
            group: group.into(),
            consumer: format!("consumer-{}", uuid::Uuid::now_v7()),
            max_deliveries: DEFAULT_MAX_DELIVERIES,
            reclaim_idle_ms: DEFAULT_RECLAIM_IDLE_MS,
        })
    }

    pub fn with_stream_key(mut self, stream_key: impl Into<String>) -> Self {
        self.stream_key = stream_key.into();
        self.dlq_key = dlq_key(&self.stream_key);
        self
    }

    /// Stable consumer name, so a restarted instance picks up its own
    /// pending entries.
    pub fn with_consumer_name(mut self, consumer: impl Into<String>) -> Self {
        self.consumer = consumer.into();
        self
    }

    async fn connection(&self) -> Result<MultiplexedConnection, RedisStreamsError> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| RedisStreamsError::Connection(e.to_string()))
    }

    #[instrument(skip(self, message), fields(stream_key = %self.stream_key, event_id = %message.event_id()), err)]
    async fn append(&self, topic: &str, message: &JsonEnvelope) -> Result<String, RedisStreamsError> {
        let payload = serde_json::to_string(message)
            .map_err(|e| RedisStreamsError::Serialization(e.to_string()))?;
        let mut conn = self.connection().await?;

        redis::cmd("XADD")
            .arg(&self.stream_key)
            .arg("MAXLEN")
            .arg("~")
            .arg(DEFAULT_MAX_LEN)
            .arg("*")
            .arg("routing_key")
            .arg(topic)
            .arg("event_type")
            .arg(message.event_type())
            .arg("event_id")
            .arg(message.event_id().to_string())
            .arg("payload")
            .arg(&payload)
            .query_async::<_, String>(&mut conn)
            .await
            .map_err(|e| RedisStreamsError::Command(format!("XADD failed: {e}")))
    }

    /// Create the consumer group if missing. New groups start at the stream
    /// tail.
    async fn ensure_group(
        &self,
        conn: &mut MultiplexedConnection,
        group: &str,
    ) -> Result<(), RedisStreamsError> {
        let created: redis::RedisResult<String> = redis::cmd("XGROUP")
            .arg("CREATE")
            .arg(&self.stream_key)
            .arg(group)
            .arg("$")
            .arg("MKSTREAM")
            .query_async(conn)
            .await;

        match created {
            Ok(_) => Ok(()),
            Err(e) if e.code() == Some("BUSYGROUP") => Ok(()),
            Err(e) => Err(RedisStreamsError::Command(format!("XGROUP CREATE failed: {e}"))),
        }
    }

    async fn acknowledge(
        &self,
        conn: &mut MultiplexedConnection,
        group: &str,
        id: &str,
    ) -> Result<(), RedisStreamsError> {
        redis::cmd("XACK")
            .arg(&self.stream_key)
            .arg(group)
            .arg(id)
            .query_async::<_, u64>(conn)
            .await
            .map(|_| ())
            .map_err(|e| RedisStreamsError::Command(format!("XACK failed: {e}")))
    }

    async fn dead_letter(
        &self,
        conn: &mut MultiplexedConnection,
        id: &str,
        fields: &HashMap<String, String>,
        reason: &str,
    ) -> Result<(), RedisStreamsError> {
        redis::cmd("XADD")
            .arg(&self.dlq_key)
            .arg("*")
            .arg("original_message_id")
            .arg(id)
            .arg("reason")
            .arg(reason)
            .arg("failed_at")
            .arg(chrono::Utc::now().to_rfc3339())
            .arg("payload")
            .arg(fields.get("payload").map(String::as_str).unwrap_or_default())
            .query_async::<_, String>(conn)
            .await
            .map_err(|e| RedisStreamsError::Command(format!("DLQ XADD failed: {e}")))?;

        warn!(message_id = %id, reason, "message sent to dead-letter stream");
        Ok(())
    }

    /// New entries for this consumer, waiting up to `BLOCK_MS`.
    async fn read_new(
        &self,
        conn: &mut MultiplexedConnection,
        group: &str,
    ) -> Result<Vec<StreamEntry>, RedisStreamsError> {
        let reply: Option<Vec<(String, Vec<redis::Value>)>> = redis::cmd("XREADGROUP")
            .arg("GROUP")
            .arg(group)
            .arg(&self.consumer)
            .arg("COUNT")
            .arg(READ_COUNT)
            .arg("BLOCK")
            .arg(BLOCK_MS)
            .arg("STREAMS")
            .arg(&self.stream_key)
            .arg(">")
            .query_async(conn)
            .await
            .map_err(|e| RedisStreamsError::Command(format!("XREADGROUP failed: {e}")))?;

        Ok(reply
            .unwrap_or_default()
            .into_iter()
            .filter(|(stream, _)| *stream == self.stream_key)
            .flat_map(|(_, entries)| parse_entries(entries))
            .collect())
    }

    /// Claim entries left pending too long by any consumer in the group.
    /// Entries already delivered `max_deliveries` times go to the DLQ instead.
    async fn reclaim(
        &self,
        conn: &mut MultiplexedConnection,
        group: &str,
    ) -> Result<Vec<StreamEntry>, RedisStreamsError> {
        let pending: Vec<(String, String, u64, u64)> = redis::cmd("XPENDING")
            .arg(&self.stream_key)
            .arg(group)
            .arg("IDLE")
            .arg(self.reclaim_idle_ms)
            .arg("-")
            .arg("+")
            .arg(READ_COUNT)
            .query_async(conn)
            .await
            .map_err(|e| RedisStreamsError::Command(format!("XPENDING failed: {e}")))?;

        let mut to_claim = Vec::new();
        for (id, _, _, deliveries) in pending {
            if deliveries < self.max_deliveries {
                to_claim.push(id);
                continue;
            }
            let entries: Vec<redis::Value> = redis::cmd("XRANGE")
                .arg(&self.stream_key)
                .arg(&id)
                .arg(&id)
                .query_async(conn)
                .await
                .map_err(|e| RedisStreamsError::Command(format!("XRANGE failed: {e}")))?;
            let fields = parse_entries(entries)
                .into_iter()
                .next()
                .map(|entry| entry.fields)
                .unwrap_or_default();
            self.dead_letter(conn, &id, &fields, &format!("delivered {deliveries} times"))
                .await?;
            self.acknowledge(conn, group, &id).await?;
        }

        if to_claim.is_empty() {
            return Ok(Vec::new());
        }

        let claimed: Vec<redis::Value> = redis::cmd("XCLAIM")
            .arg(&self.stream_key)
            .arg(group)
            .arg(&self.consumer)
            .arg(self.reclaim_idle_ms)
            .arg(&to_claim[..])
            .query_async(conn)
            .await
            .map_err(|e| RedisStreamsError::Command(format!("XCLAIM failed: {e}")))?;

        Ok(parse_entries(claimed))
    }

    /// Hand one entry to the subscriber and acknowledge it. Returns `false`
    /// once the subscriber is gone (the entry stays pending).
    async fn deliver(
        &self,
        conn: &mut MultiplexedConnection,
        group: &str,
        pattern: &str,
        entry: StreamEntry,
        tx: &mpsc::UnboundedSender<JsonEnvelope>,
    ) -> Result<bool, RedisStreamsError> {
        match classify(&entry.fields, pattern) {
            Disposition::Deliver(envelope) => {
                if tx.send(*envelope).is_err() {
                    return Ok(false);
                }
            }
            Disposition::Skip => {
                debug!(message_id = %entry.id, pattern, "skipping non-matching entry");
            }
            Disposition::DeadLetter(reason) => {
                self.dead_letter(conn, &entry.id, &entry.fields, &reason).await?;
            }
        }
        self.acknowledge(conn, group, &entry.id).await?;
        Ok(true)
    }

    async fn consume(
        self,
        group: String,
        pattern: String,
        tx: mpsc::UnboundedSender<JsonEnvelope>,
    ) {
        let mut conn = loop {
            if tx.is_closed() {
                return;
            }
            match self.connection().await {
                Ok(mut conn) => match self.ensure_group(&mut conn, &group).await {
                    Ok(()) => break conn,
                    Err(e) => error!(%group, error = %e, "failed to create consumer group"),
                },
                Err(e) => error!(%group, error = %e, "failed to connect to Redis"),
            }
            tokio::time::sleep(ERROR_BACKOFF).await;
        };

        while !tx.is_closed() {
            let batch = match self.reclaim(&mut conn, &group).await {
                Ok(entries) if !entries.is_empty() => Ok(entries),
                Ok(_) => self.read_new(&mut conn, &group).await,
                Err(e) => Err(e),
            };

            let entries = match batch {
                Ok(entries) => entries,
                Err(e) => {
                    error!(%group, error = %e, "failed to read from stream");
                    tokio::time::sleep(ERROR_BACKOFF).await;
                    continue;
                }
            };

            for entry in entries {
                match self.deliver(&mut conn, &group, &pattern, entry, &tx).await {
                    Ok(true) => {}
                    Ok(false) => return,
                    Err(e) => error!(%group, error = %e, "failed to settle stream entry"),
                }
            }
        }
    }
}

#[async_trait]
impl EventBus<JsonEnvelope> for RedisStreamsEventBus {
    async fn publish(&self, topic: &str, message: JsonEnvelope) -> Result<(), PublishError> {
        self.append(topic, &message).await?;
        Ok(())
    }

    /// Spawns a consumer task on the current runtime; it stops when the
    /// returned subscription is dropped.
    fn subscribe(&self, pattern: &str) -> Subscription<JsonEnvelope> {
        let (tx, rx) = mpsc::unbounded_channel();
        let group = format!("{}.{}", self.group, pattern);
        tokio::spawn(self.clone().consume(group, pattern.to_string(), tx));
        Subscription::new(rx)
    }
}

#[derive(Debug, Clone)]
struct StreamEntry {
    id: String,
    fields: HashMap<String, String>,
}

/// Entries that cannot be read as `[id, [field, value, ...]]` (for example
/// trimmed ones) are dropped.
fn parse_entries(values: Vec<redis::Value>) -> Vec<StreamEntry> {
    values
        .iter()
        .filter_map(|value| {
            redis::from_redis_value::<(String, HashMap<String, String>)>(value).ok()
        })
        .map(|(id, fields)| StreamEntry { id, fields })
        .collect()
}

#[derive(Debug)]
enum Disposition {
    Deliver(Box<JsonEnvelope>),
    Skip,
    DeadLetter(String),
}

fn classify(fields: &HashMap<String, String>, pattern: &str) -> Disposition {
    let Some(routing_key) = fields.get("routing_key") else {
        return Disposition::DeadLetter("missing routing_key field".to_string());
    };
    if !topic_matches(pattern, routing_key) {
        return Disposition::Skip;
    }
    let Some(payload) = fields.get("payload") else {
        return Disposition::DeadLetter("missing payload field".to_string());
    };
    match serde_json::from_str::<JsonEnvelope>(payload) {
        Ok(envelope) => Disposition::Deliver(Box::new(envelope)),
        Err(e) => Disposition::DeadLetter(format!("undecodable envelope: {e}")),
    }
}
