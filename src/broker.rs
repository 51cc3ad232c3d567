//! Kafka-backed channel implementations
//!
//! The only module that knows the message bus is Kafka. Connections are
//! made once at process start from environment configuration and handed
//! to the simulation as [`TelemetrySink`] / [`CommandSource`] handles.

use std::collections::VecDeque;
use std::env;
use std::time::{Duration, Instant};

use kafka::consumer::{Consumer, FetchOffset, GroupOffsetStorage};
use kafka::producer::{Producer, Record, RequiredAcks};
use log::info;
use thiserror::Error;

use crate::channel::{ChannelError, CommandSource, TelemetrySink};

/// Default outbound (telemetry) topic.
pub const DEFAULT_DATA_TOPIC: &str = "cstr_data";
/// Default inbound (control command) topic.
pub const DEFAULT_CONTROL_TOPIC: &str = "cstr_control";
/// Default consumer group for the control topic.
pub const DEFAULT_CONSUMER_GROUP: &str = "cstr-simulator";

/// Startup configuration problems.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("KAFKA_BROKER_ADDRESS is not set")]
    MissingBrokerAddress,

    #[error("CSTR_RUN_COUNT is not a positive integer: {value:?}")]
    InvalidRunCount { value: String },
}

/// Broker and run settings resolved from the environment.
#[derive(Debug, Clone)]
pub struct BrokerConfig {
    /// Bootstrap broker addresses.
    pub brokers: Vec<String>,
    /// Topic telemetry is published on.
    pub data_topic: String,
    /// Topic control commands are consumed from.
    pub control_topic: String,
    /// Consumer group joined for the control topic.
    pub group: String,
    /// How many simulation runs the driver performs.
    pub run_count: u32,
}

impl BrokerConfig {
    /// Read the configuration from the process environment.
    ///
    /// `KAFKA_BROKER_ADDRESS` is required (comma-separated host list);
    /// topics, group and run count fall back to defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(|name| env::var(name).ok())
    }

    fn from_vars(get: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let address = get("KAFKA_BROKER_ADDRESS").ok_or(ConfigError::MissingBrokerAddress)?;
        let brokers = address
            .split(',')
            .map(|host| host.trim().to_string())
            .filter(|host| !host.is_empty())
            .collect::<Vec<_>>();
        if brokers.is_empty() {
            return Err(ConfigError::MissingBrokerAddress);
        }

        let run_count = match get("CSTR_RUN_COUNT") {
            None => 1,
            Some(value) => match value.parse::<u32>() {
                Ok(count) if count > 0 => count,
                _ => return Err(ConfigError::InvalidRunCount { value }),
            },
        };

        Ok(Self {
            brokers,
            data_topic: get("CSTR_DATA_TOPIC").unwrap_or_else(|| DEFAULT_DATA_TOPIC.into()),
            control_topic: get("CSTR_CONTROL_TOPIC")
                .unwrap_or_else(|| DEFAULT_CONTROL_TOPIC.into()),
            group: get("CSTR_CONSUMER_GROUP").unwrap_or_else(|| DEFAULT_CONSUMER_GROUP.into()),
            run_count,
        })
    }
}

/// Telemetry sink backed by a Kafka producer.
///
/// Sends are synchronous with `RequiredAcks::One`, so a successful
/// `send` means the broker has acknowledged the message.
pub struct KafkaTelemetrySink {
    producer: Producer,
    topic: String,
}

impl KafkaTelemetrySink {
    pub fn connect(config: &BrokerConfig) -> Result<Self, ChannelError> {
        let producer = Producer::from_hosts(config.brokers.clone())
            .with_ack_timeout(Duration::from_secs(1))
            .with_required_acks(RequiredAcks::One)
            .create()
            .map_err(|err| ChannelError::with_source("kafka producer setup failed", err))?;

        info!(
            "telemetry producer connected to {:?}, topic {}",
            config.brokers, config.data_topic
        );
        Ok(Self {
            producer,
            topic: config.data_topic.clone(),
        })
    }
}

impl TelemetrySink for KafkaTelemetrySink {
    fn send(&mut self, payload: &[u8]) -> Result<(), ChannelError> {
        self.producer
            .send(&Record::from_value(&self.topic, payload))
            .map_err(|err| ChannelError::with_source("kafka send failed", err))
    }
}

/// Command source backed by a Kafka consumer group.
///
/// Fetched message sets are buffered and drained one payload per poll.
/// Offsets are tracked in-session only and never committed durably, so
/// a restarted process re-reads the control topic from the earliest
/// offset.
pub struct KafkaCommandSource {
    consumer: Consumer,
    buffered: VecDeque<Vec<u8>>,
}

impl KafkaCommandSource {
    pub fn connect(config: &BrokerConfig) -> Result<Self, ChannelError> {
        let consumer = Consumer::from_hosts(config.brokers.clone())
            .with_topic(config.control_topic.clone())
            .with_group(config.group.clone())
            .with_fallback_offset(FetchOffset::Earliest)
            .with_offset_storage(Some(GroupOffsetStorage::Kafka))
            .create()
            .map_err(|err| ChannelError::with_source("kafka consumer setup failed", err))?;

        info!(
            "command consumer joined group {} on topic {}",
            config.group, config.control_topic
        );
        Ok(Self {
            consumer,
            buffered: VecDeque::new(),
        })
    }
}

impl CommandSource for KafkaCommandSource {
    fn poll(&mut self, timeout: Duration) -> Result<Option<Vec<u8>>, ChannelError> {
        if let Some(payload) = self.buffered.pop_front() {
            return Ok(Some(payload));
        }

        let deadline = Instant::now() + timeout;
        loop {
            let sets = self
                .consumer
                .poll()
                .map_err(|err| ChannelError::with_source("kafka poll failed", err))?;

            for set in sets.iter() {
                for message in set.messages() {
                    self.buffered.push_back(message.value.to_vec());
                }
                self.consumer
                    .consume_messageset(set)
                    .map_err(|err| ChannelError::with_source("kafka offset tracking failed", err))?;
            }

            if let Some(payload) = self.buffered.pop_front() {
                return Ok(Some(payload));
            }
            if Instant::now() >= deadline {
                return Ok(None);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars<'a>(pairs: &'a [(&'a str, &'a str)]) -> impl Fn(&str) -> Option<String> + 'a {
        move |name| {
            pairs
                .iter()
                .find(|(key, _)| *key == name)
                .map(|(_, value)| (*value).to_string())
        }
    }

    #[test]
    fn defaults_apply_when_only_the_broker_is_set() {
        let config =
            BrokerConfig::from_vars(vars(&[("KAFKA_BROKER_ADDRESS", "kafka:9092")])).unwrap();

        assert_eq!(config.brokers, vec!["kafka:9092".to_string()]);
        assert_eq!(config.data_topic, DEFAULT_DATA_TOPIC);
        assert_eq!(config.control_topic, DEFAULT_CONTROL_TOPIC);
        assert_eq!(config.group, DEFAULT_CONSUMER_GROUP);
        assert_eq!(config.run_count, 1);
    }

    #[test]
    fn broker_list_is_split_and_trimmed() {
        let config = BrokerConfig::from_vars(vars(&[(
            "KAFKA_BROKER_ADDRESS",
            "kafka-1:9092, kafka-2:9092",
        )]))
        .unwrap();

        assert_eq!(config.brokers, vec!["kafka-1:9092", "kafka-2:9092"]);
    }

    #[test]
    fn missing_broker_address_is_an_error() {
        let result = BrokerConfig::from_vars(vars(&[]));
        assert!(matches!(result, Err(ConfigError::MissingBrokerAddress)));
    }

    #[test]
    fn bad_run_count_is_an_error() {
        let result = BrokerConfig::from_vars(vars(&[
            ("KAFKA_BROKER_ADDRESS", "kafka:9092"),
            ("CSTR_RUN_COUNT", "zero"),
        ]));
        assert!(matches!(result, Err(ConfigError::InvalidRunCount { .. })));
    }
}
