pub mod body_parser;
pub mod collections;
pub mod config;
pub mod consumer;
pub mod error;
pub mod forwarder;
pub mod handlers;
pub mod hash;
pub mod metrics_utils;
pub mod native_writer;
pub mod observer;
pub mod pipeline;
pub mod publication_event;
