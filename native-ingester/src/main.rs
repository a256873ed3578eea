use std::sync::Arc;

use common_kafka::kafka_consumer::BatchConsumer;
use common_kafka::kafka_producer::create_kafka_producer;
use envconfig::Envconfig;
use futures::future::{select, Either};
use health::HealthRegistry;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

use native_ingester::body_parser::UuidFieldParser;
use native_ingester::config::Config;
use native_ingester::consumer::{consume, wait_for_shutdown, RECV_ERROR_BACKOFF};
use native_ingester::forwarder::KafkaForwarder;
use native_ingester::handlers::{self, AppState};
use native_ingester::metrics_utils::{serve, setup_metrics_recorder};
use native_ingester::native_writer::{NativeWriter, NativeWriterConfig};
use native_ingester::observer::TracingObserver;
use native_ingester::pipeline::Pipeline;

async fn shutdown() {
    let mut term = signal::unix::signal(signal::unix::SignalKind::terminate())
        .expect("failed to register SIGTERM handler");

    let mut interrupt = signal::unix::signal(signal::unix::SignalKind::interrupt())
        .expect("failed to register SIGINT handler");

    tokio::select! {
        _ = term.recv() => {},
        _ = interrupt.recv() => {},
    };

    info!("Shutting down gracefully...");
}

#[tokio::main]
async fn main() {
    let config = Config::init_from_env().expect("failed to load configuration from env");

    let log_layer = {
        let base_layer = fmt::layer().with_target(true).with_level(true);
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        if config.log_json {
            base_layer.json().with_filter(filter).boxed()
        } else {
            base_layer.with_filter(filter).boxed()
        }
    };
    tracing_subscriber::registry().with(log_layer).init();

    let deadline = time::Duration::seconds(config.consumer_liveness_deadline_secs as i64);
    let liveness = HealthRegistry::new("liveness");
    let consumer_liveness = liveness.register("consumer", deadline);
    let kafka_liveness = liveness.register("rdkafka", deadline);

    let writer = NativeWriter::new(
        NativeWriterConfig {
            address: config.native_writer_address.clone(),
            host_header: config
                .native_writer_host_header
                .as_ref()
                .map(|host| host.as_str().to_owned()),
            request_timeout: config.request_timeout.0,
        },
        Arc::new(config.collections_by_origins.clone()),
        Box::new(UuidFieldParser::new(config.content_uuid_field())),
    )
    .expect("failed to build native writer");
    let writer = Arc::new(writer);

    let mut pipeline = Pipeline::new(writer.clone(), Arc::new(TracingObserver));
    if let Some(topic) = &config.kafka_producer_topic {
        let producer = create_kafka_producer(&config.kafka, kafka_liveness.clone())
            .await
            .expect("failed to create kafka producer");
        info!("forwarding written messages to {}", topic.as_str());
        let forwarder = KafkaForwarder::new(producer, topic.as_str());
        pipeline = pipeline.with_forwarder(Arc::new(forwarder));
    }

    let consumer = BatchConsumer::new(&config.kafka, &config.consumer, kafka_liveness)
        .expect("failed to create kafka consumer");
    info!(
        "consuming {} as {}",
        consumer.topic(),
        config.consumer.kafka_consumer_group
    );

    let (stop_tx, stop_rx) = watch::channel(false);

    let recorder_handle = setup_metrics_recorder().expect("failed to install metrics recorder");
    let app = handlers::app(AppState { writer, liveness }, Some(recorder_handle));
    let bind = config.bind();
    let http_server = Box::pin(serve(app, &bind, wait_for_shutdown(stop_rx.clone())));
    let consumer_loop = Box::pin(consume(
        &consumer,
        &pipeline,
        &consumer_liveness,
        RECV_ERROR_BACKOFF,
        stop_rx,
    ));

    tokio::spawn(async move {
        shutdown().await;
        stop_tx.send_replace(true);
    });

    match select(http_server, consumer_loop).await {
        Either::Left((Ok(()), consumer_loop)) => consumer_loop.await,
        Either::Left((Err(e), _)) => {
            error!("failed to start native-ingester http server, {}", e)
        }
        Either::Right(((), http_server)) => {
            if let Err(e) = http_server.await {
                error!("native-ingester http server failed, {}", e);
            }
        }
    };
}
