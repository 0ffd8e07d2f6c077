/// Transaction Bus (C1).
///
/// Topology per logical stream: a direct main exchange bound to the main
/// queue; a topic dead-letter exchange fanning out to a retry queue
/// (`retry.<queue>`, TTL-gated, dead-letters back to the main exchange on
/// expiry) and a terminal DLQ (`dlq.<queue>`). The main queue's own
/// `x-dead-letter-*` arguments point straight at the DLQ routing key, so a
/// native `basic_nack` with `requeue=false` lands a message in the DLQ
/// without any application code involved; the retry path is instead an
/// explicit republish-then-ack, matched to the "attempt" bookkeeping the
/// consumer contract requires.
use crate::errors::PipelineError;
use crate::logger::{self, LogTag};
use crate::model::IngestMessage;
use crate::retry::{retry_with_backoff, RetryPolicy};
use futures_util::StreamExt;
use lapin::options::{
    BasicAckOptions, BasicConsumeOptions, BasicNackOptions, BasicPublishOptions, BasicQosOptions,
    ConfirmSelectOptions, ExchangeDeclareOptions, QueueBindOptions, QueueDeclareOptions,
};
use lapin::types::{AMQPValue, FieldTable};
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties, ExchangeKind};

fn main_exchange(queue: &str) -> String {
    format!("{}.main", queue)
}

fn dlx_exchange(queue: &str) -> String {
    format!("{}.dlx", queue)
}

fn retry_queue_name(queue: &str) -> String {
    format!("{}.retry", queue)
}

fn dlq_queue_name(queue: &str) -> String {
    format!("{}.dlq", queue)
}

fn retry_routing_key(queue: &str) -> String {
    format!("retry.{}", queue)
}

fn dlq_routing_key(queue: &str) -> String {
    format!("dlq.{}", queue)
}

pub struct TransactionBus {
    connection: Connection,
    channel: Channel,
    queue_name: String,
    prefetch: u16,
    retry_delay_ms: u64,
}

impl TransactionBus {
    pub async fn connect(
        url: &str,
        queue_name: &str,
        prefetch: u16,
        retry_delay: std::time::Duration,
    ) -> Result<Self, PipelineError> {
        let connection = Connection::connect(url, ConnectionProperties::default())
            .await
            .map_err(|e| PipelineError::bus(e.to_string()))?;
        let channel = connection
            .create_channel()
            .await
            .map_err(|e| PipelineError::bus(e.to_string()))?;
        channel
            .confirm_select(ConfirmSelectOptions::default())
            .await
            .map_err(|e| PipelineError::bus(e.to_string()))?;

        let bus = Self {
            connection,
            channel,
            queue_name: queue_name.to_string(),
            prefetch,
            retry_delay_ms: retry_delay.as_millis() as u64,
        };
        bus.declare_topology().await?;
        Ok(bus)
    }

    async fn declare_topology(&self) -> Result<(), PipelineError> {
        let main_ex = main_exchange(&self.queue_name);
        let dlx = dlx_exchange(&self.queue_name);
        let retry_q = retry_queue_name(&self.queue_name);
        let dlq_q = dlq_queue_name(&self.queue_name);

        self.channel
            .exchange_declare(&main_ex, ExchangeKind::Direct, ExchangeDeclareOptions { durable: true, ..Default::default() }, FieldTable::default())
            .await
            .map_err(|e| PipelineError::bus(e.to_string()))?;
        self.channel
            .exchange_declare(&dlx, ExchangeKind::Topic, ExchangeDeclareOptions { durable: true, ..Default::default() }, FieldTable::default())
            .await
            .map_err(|e| PipelineError::bus(e.to_string()))?;

        let mut main_args = FieldTable::default();
        main_args.insert("x-dead-letter-exchange".into(), AMQPValue::LongString(dlx.clone().into()));
        main_args.insert(
            "x-dead-letter-routing-key".into(),
            AMQPValue::LongString(dlq_routing_key(&self.queue_name).into()),
        );
        self.channel
            .queue_declare(&self.queue_name, QueueDeclareOptions { durable: true, ..Default::default() }, main_args)
            .await
            .map_err(|e| PipelineError::bus(e.to_string()))?;
        self.channel
            .queue_bind(&self.queue_name, &main_ex, &self.queue_name, QueueBindOptions::default(), FieldTable::default())
            .await
            .map_err(|e| PipelineError::bus(e.to_string()))?;

        // Declared with the full set of arguments (including the TTL) up
        // front: redeclaring this queue later with different arguments would
        // fail RabbitMQ's equivalence precondition check on the existing
        // queue, so the TTL can't be bolted on after the fact.
        let mut retry_args = FieldTable::default();
        retry_args.insert("x-dead-letter-exchange".into(), AMQPValue::LongString(main_ex.clone().into()));
        retry_args.insert("x-dead-letter-routing-key".into(), AMQPValue::LongString(self.queue_name.clone().into()));
        retry_args.insert("x-message-ttl".into(), AMQPValue::LongLongInt(self.retry_delay_ms as i64));
        self.channel
            .queue_declare(&retry_q, QueueDeclareOptions { durable: true, ..Default::default() }, retry_args)
            .await
            .map_err(|e| PipelineError::bus(e.to_string()))?;
        self.channel
            .queue_bind(&retry_q, &dlx, &retry_routing_key(&self.queue_name), QueueBindOptions::default(), FieldTable::default())
            .await
            .map_err(|e| PipelineError::bus(e.to_string()))?;

        self.channel
            .queue_declare(&dlq_q, QueueDeclareOptions { durable: true, ..Default::default() }, FieldTable::default())
            .await
            .map_err(|e| PipelineError::bus(e.to_string()))?;
        self.channel
            .queue_bind(&dlq_q, &dlx, &dlq_routing_key(&self.queue_name), QueueBindOptions::default(), FieldTable::default())
            .await
            .map_err(|e| PipelineError::bus(e.to_string()))?;

        Ok(())
    }

    /// Publishes a message to the main exchange, waiting for the broker's
    /// publisher confirm before returning. Retries transient publish failures
    /// locally at 1s/2s/4s per the producer failure-semantics table.
    pub async fn publish(&self, msg: &IngestMessage) -> Result<bool, PipelineError> {
        msg.validate().map_err(PipelineError::validation)?;
        let payload = serde_json::to_vec(msg)?;
        let policy = RetryPolicy::linear(3, std::time::Duration::from_secs(1));

        let signature = msg.signature.clone();
        let attempt = msg.attempt;
        let source = msg.source.to_string();
        let priority = msg.priority;

        let result = retry_with_backoff(
            policy,
            |_err: &PipelineError| true,
            |_attempt| {
                let payload = payload.clone();
                let signature = signature.clone();
                let source = source.clone();
                async move {
                    let mut headers = FieldTable::default();
                    headers.insert("attempt".into(), AMQPValue::ShortInt(attempt as i16));
                    headers.insert("source".into(), AMQPValue::LongString(source.into()));
                    headers.insert("priority".into(), AMQPValue::LongString(format!("{:?}", priority).into()));

                    let properties = BasicProperties::default()
                        .with_delivery_mode(2)
                        .with_message_id(signature.into())
                        .with_headers(headers);

                    let confirm = self
                        .channel
                        .basic_publish(
                            &main_exchange(&self.queue_name),
                            &self.queue_name,
                            BasicPublishOptions::default(),
                            &payload,
                            properties,
                        )
                        .await
                        .map_err(|e| PipelineError::bus(e.to_string()))?;

                    confirm.await.map_err(|e| PipelineError::bus(e.to_string()))
                }
            },
        )
        .await;

        match result {
            Ok(_) => Ok(true),
            Err(e) => {
                logger::warning(LogTag::Bus, &format!("publish failed after retries: {}", e));
                Ok(false)
            }
        }
    }

    /// Republishes a message to the retry queue with an incremented attempt
    /// count, used by the consumer's "handler returned false" path.
    pub async fn republish_for_retry(&self, msg: &IngestMessage) -> Result<(), PipelineError> {
        let mut retried = msg.clone();
        retried.attempt += 1;
        let payload = serde_json::to_vec(&retried)?;

        let mut headers = FieldTable::default();
        headers.insert("attempt".into(), AMQPValue::ShortInt(retried.attempt as i16));

        let properties = BasicProperties::default()
            .with_delivery_mode(2)
            .with_message_id(retried.signature.clone().into())
            .with_headers(headers);

        self.channel
            .basic_publish(
                &dlx_exchange(&self.queue_name),
                &retry_routing_key(&self.queue_name),
                BasicPublishOptions::default(),
                &payload,
                properties,
            )
            .await
            .map_err(|e| PipelineError::bus(e.to_string()))?
            .await
            .map_err(|e| PipelineError::bus(e.to_string()))?;
        Ok(())
    }

    /// Consumes messages one at a time, applying `handler` to each. Returning
    /// `Ok(true)` acks; `Ok(false)` or `Err` triggers the retry path (or, past
    /// `max_retries`, a native nack straight to the DLQ).
    ///
    /// Opens its own channel off the shared connection rather than reusing
    /// `self.channel`, so `consumer_tag` only has to be unique among the
    /// callers of this method, not across the whole bus — a second
    /// `basic_consume` for the same tag on one channel is rejected by the
    /// broker, which is what running several of these concurrently (one per
    /// worker loop) on a shared channel would hit.
    pub async fn consume<F, Fut>(
        &self,
        consumer_tag: &str,
        max_retries: u32,
        mut handler: F,
    ) -> Result<(), PipelineError>
    where
        F: FnMut(IngestMessage) -> Fut,
        Fut: std::future::Future<Output = Result<bool, PipelineError>>,
    {
        let channel = self
            .connection
            .create_channel()
            .await
            .map_err(|e| PipelineError::bus(e.to_string()))?;
        channel
            .basic_qos(self.prefetch, BasicQosOptions::default())
            .await
            .map_err(|e| PipelineError::bus(e.to_string()))?;

        let mut consumer = channel
            .basic_consume(
                &self.queue_name,
                consumer_tag,
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|e| PipelineError::bus(e.to_string()))?;

        while let Some(delivery) = consumer.next().await {
            let delivery = match delivery {
                Ok(d) => d,
                Err(e) => {
                    logger::error(LogTag::Bus, &format!("consumer delivery error: {}", e));
                    continue;
                }
            };

            let msg: IngestMessage = match serde_json::from_slice(&delivery.data) {
                Ok(m) => m,
                Err(e) => {
                    logger::warning(LogTag::Bus, &format!("dropping malformed message: {}", e));
                    let _ = delivery.ack(BasicAckOptions::default()).await;
                    continue;
                }
            };

            let header_attempt = delivery
                .properties
                .headers()
                .as_ref()
                .and_then(|h| h.inner().get("attempt"))
                .and_then(|v| match v {
                    AMQPValue::ShortInt(n) => Some(*n as u32),
                    _ => None,
                })
                .unwrap_or(0);
            let attempt = header_attempt.max(msg.attempt);

            if attempt >= max_retries {
                logger::warning(
                    LogTag::Bus,
                    &format!("{} exceeded max retries ({}), routing to DLQ", msg.signature, max_retries),
                );
                let _ = delivery.nack(BasicNackOptions { requeue: false, ..Default::default() }).await;
                continue;
            }

            let mut attempted_msg = msg.clone();
            attempted_msg.attempt = attempt;

            match handler(attempted_msg.clone()).await {
                Ok(true) => {
                    let _ = delivery.ack(BasicAckOptions::default()).await;
                }
                Ok(false) => {
                    if let Err(e) = self.republish_for_retry(&attempted_msg).await {
                        logger::error(LogTag::Bus, &format!("retry republish failed: {}", e));
                    }
                    let _ = delivery.ack(BasicAckOptions::default()).await;
                }
                Err(e) => {
                    logger::warning(LogTag::Bus, &format!("handler error for {}: {}", msg.signature, e));
                    if let Err(e) = self.republish_for_retry(&attempted_msg).await {
                        logger::error(LogTag::Bus, &format!("retry republish failed: {}", e));
                    }
                    let _ = delivery.ack(BasicAckOptions::default()).await;
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topology_names_are_derived_consistently() {
        assert_eq!(main_exchange("dln.tx"), "dln.tx.main");
        assert_eq!(dlx_exchange("dln.tx"), "dln.tx.dlx");
        assert_eq!(retry_queue_name("dln.tx"), "dln.tx.retry");
        assert_eq!(dlq_queue_name("dln.tx"), "dln.tx.dlq");
        assert_eq!(retry_routing_key("dln.tx"), "retry.dln.tx");
        assert_eq!(dlq_routing_key("dln.tx"), "dlq.dln.tx");
    }
}
