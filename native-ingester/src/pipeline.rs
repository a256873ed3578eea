use std::sync::Arc;
use std::time::Instant;

use common_kafka::message::RawQueueMessage;
use futures::future::join_all;

use crate::error::PipelineError;
use crate::forwarder::Forwarder;
use crate::hash::native_hash;
use crate::native_writer::{NativeMessage, WriteReceipt, Writer, NATIVE_HASH_HEADER};
use crate::observer::{PipelineEvent, PipelineObserver};
use crate::publication_event::PublicationEvent;

/// Counts of what happened to the messages of one batch.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BatchReport {
    pub received: usize,
    pub written: usize,
    pub failed: usize,
    pub forwarded: usize,
}

/// Takes queue messages to the native store, one attempt per delivery.
///
/// Every message goes through: parse, resolve collection, enrich body,
/// compute hash, write. The first failing step drops the message; it is
/// reported to the observer and never retried here. Redelivery is up to the
/// queue.
#[derive(Clone)]
pub struct Pipeline {
    writer: Arc<dyn Writer>,
    observer: Arc<dyn PipelineObserver>,
    forwarder: Option<Arc<dyn Forwarder>>,
}

impl Pipeline {
    pub fn new(writer: Arc<dyn Writer>, observer: Arc<dyn PipelineObserver>) -> Self {
        Self {
            writer,
            observer,
            forwarder: None,
        }
    }

    /// Forward messages to another topic once they are written.
    pub fn with_forwarder(mut self, forwarder: Arc<dyn Forwarder>) -> Self {
        self.forwarder = Some(forwarder);
        self
    }

    /// Processes every message of a batch concurrently. A failing message
    /// never affects the others.
    pub async fn process_batch(&self, messages: &[RawQueueMessage]) -> BatchReport {
        let results = join_all(messages.iter().map(|message| self.process(message))).await;

        let report = results.iter().fold(
            BatchReport {
                received: messages.len(),
                ..Default::default()
            },
            |mut report, result| {
                match result {
                    Ok(outcome) => {
                        report.written += 1;
                        if outcome.forwarded {
                            report.forwarded += 1;
                        }
                    }
                    Err(_) => report.failed += 1,
                }
                report
            },
        );

        self.observer.observe(&PipelineEvent::BatchProcessed {
            size: messages.len(),
        });
        report
    }

    /// Processes a single message, then forwards it if a forwarder is set.
    pub async fn process(&self, message: &RawQueueMessage) -> Result<Outcome, PipelineError> {
        let event = PublicationEvent::new(message);
        let transaction_id = event.transaction_id();
        self.observer.observe(&PipelineEvent::Received { transaction_id });

        let start = Instant::now();
        let (collection, receipt) = match self.write(&event).await {
            Ok(written) => written,
            Err(error) => {
                self.observer.observe(&PipelineEvent::Failed {
                    transaction_id,
                    error: &error,
                });
                return Err(error);
            }
        };
        self.observer.observe(&PipelineEvent::Written {
            transaction_id,
            collection,
            content_uuid: &receipt.content_uuid,
            elapsed: start.elapsed(),
        });

        let forwarded = match &self.forwarder {
            Some(forwarder) => self.forward(forwarder.as_ref(), &event).await,
            None => false,
        };

        Ok(Outcome { receipt, forwarded })
    }

    async fn write<'w>(
        &'w self,
        event: &PublicationEvent<'_>,
    ) -> Result<(&'w str, WriteReceipt), PipelineError> {
        let collection = self
            .writer
            .resolve_collection(event.origin_system_id())?;
        let body = event.content_body()?;

        let hash = native_hash(&body).map_err(PipelineError::Hash)?;
        let mut message = NativeMessage::new(body, event.transaction_id());
        message.add_header(NATIVE_HASH_HEADER, &hash);

        let receipt = self.writer.write(&message, collection).await?;
        Ok((collection, receipt))
    }

    async fn forward(&self, forwarder: &dyn Forwarder, event: &PublicationEvent<'_>) -> bool {
        let transaction_id = event.transaction_id();
        let topic = forwarder.topic();
        match forwarder.forward(event.message()).await {
            Ok(()) => {
                self.observer.observe(&PipelineEvent::Forwarded {
                    transaction_id,
                    topic,
                });
                true
            }
            Err(error) => {
                self.observer.observe(&PipelineEvent::ForwardFailed {
                    transaction_id,
                    topic,
                    error: &error,
                });
                false
            }
        }
    }
}

/// A message that made it to the native store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    pub receipt: WriteReceipt,
    pub forwarded: bool,
}
