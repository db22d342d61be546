use crate::config::{MqttConf, TopicsConf};
use crate::dispatcher::{Dispatched, Dispatcher};
use rumqttc::{AsyncClient, ConnectReturnCode, Event, EventLoop, Incoming, MqttOptions, QoS};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

#[derive(Debug, thiserror::Error)]
pub enum BusError {
    #[error("MQTT connection failed: {0}")]
    Connect(String),
    #[error("MQTT broker refused connection: {0:?}")]
    Refused(ConnectReturnCode),
    #[error("MQTT subscribe failed: {0}")]
    Subscribe(#[from] rumqttc::ClientError),
    #[error("MQTT publish failed: {0}")]
    Publish(String),
    #[error("MQTT packet too large: {size} bytes (max {max})")]
    TooLarge { size: usize, max: usize },
}

/// Outbound side of the bus as seen by the dispatcher. Publishing must not
/// block: it runs inside the event loop that would have to flush it.
pub trait FeedbackPublisher: Send + Sync {
    fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), BusError>;
}

#[derive(Clone)]
pub struct MqttPublisher {
    client: AsyncClient,
    max_packet_size: usize,
}

impl MqttPublisher {
    /// `max_packet_size` must match the limit given to the client's options:
    /// the event loop drops the connection on anything larger.
    pub fn new(client: AsyncClient, max_packet_size: usize) -> Self {
        Self { client, max_packet_size }
    }
}

impl FeedbackPublisher for MqttPublisher {
    fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), BusError> {
        // try_publish only queues; an oversized packet would fail later, inside the event loop.
        let size = publish_packet_size(topic, payload.len());
        if size > self.max_packet_size {
            return Err(BusError::TooLarge { size, max: self.max_packet_size });
        }
        self.client
            .try_publish(topic, QoS::AtMostOnce, false, payload)
            .map_err(|e| BusError::Publish(e.to_string()))
    }
}

#[cfg(test)]
impl FeedbackPublisher for symbion_devkit::MockMqttClient {
    fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), BusError> {
        self.try_publish(topic, QoS::AtMostOnce, false, payload)
            .map_err(|e| BusError::Publish(e.to_string()))
    }
}

/// Encoded size of a QoS 0 MQTT 3.1.1 PUBLISH packet.
pub fn publish_packet_size(topic: &str, payload_len: usize) -> usize {
    let remaining = 2 + topic.len() + payload_len;
    let length_bytes = match remaining {
        0..=127 => 1,
        128..=16_383 => 2,
        16_384..=2_097_151 => 3,
        _ => 4,
    };
    1 + length_bytes + remaining
}

/// Client options built from the config. Client ids are unique per process
/// start so two nodes sharing a config do not kick each other off the broker.
pub fn mqtt_options(mqtt: &MqttConf) -> MqttOptions {
    let client_id = format!("{}-{}", mqtt.client_id_prefix, uuid::Uuid::new_v4().simple());
    let mut opts = MqttOptions::new(client_id, &mqtt.host, mqtt.port);
    opts.set_keep_alive(Duration::from_secs(mqtt.keep_alive_secs));
    opts.set_max_packet_size(mqtt.max_packet_size, mqtt.max_packet_size);
    if let (Some(username), Some(password)) = (&mqtt.username, &mqtt.password) {
        opts.set_credentials(username, password);
    }
    opts
}

/// Queues the command and serial subscriptions. Non blocking so it can run
/// from inside the poll loop.
fn subscribe_all(client: &AsyncClient, topics: &TopicsConf) -> Result<(), BusError> {
    client.try_subscribe(&topics.command, QoS::AtMostOnce)?;
    client.try_subscribe(&topics.serial_data, QoS::AtMostOnce)?;
    info!("[mqtt] subscribed to {} and {}", topics.command, topics.serial_data);
    Ok(())
}

/// Connected MQTT session: subscribed to the command and serial topics,
/// ready to feed the dispatcher.
pub struct BusGateway {
    client: AsyncClient,
    eventloop: EventLoop,
    topics: TopicsConf,
    max_packet_size: usize,
}

impl BusGateway {
    /// Connects and waits for the broker's CONNACK. Any failure here is
    /// meant to stop the process.
    pub async fn connect(mqtt: &MqttConf, topics: &TopicsConf) -> Result<Self, BusError> {
        let (client, mut eventloop) = AsyncClient::new(mqtt_options(mqtt), mqtt.channel_capacity);
        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Incoming::ConnAck(ack))) => {
                    if ack.code != ConnectReturnCode::Success {
                        return Err(BusError::Refused(ack.code));
                    }
                    break;
                }
                Ok(_) => {}
                Err(e) => return Err(BusError::Connect(e.to_string())),
            }
        }
        info!("[mqtt] connected to {}:{}", mqtt.host, mqtt.port);
        subscribe_all(&client, topics)?;

        Ok(Self { client, eventloop, topics: topics.clone(), max_packet_size: mqtt.max_packet_size })
    }

    pub fn publisher(&self) -> MqttPublisher {
        MqttPublisher::new(self.client.clone(), self.max_packet_size)
    }

    /// Polls the connection until `shutdown` flips. Inbound commands are
    /// dispatched inline, one at a time.
    pub async fn run(mut self, dispatcher: &Dispatcher, mut shutdown: watch::Receiver<bool>) {
        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    info!("[mqtt] shutting down");
                    if let Err(e) = self.client.disconnect().await {
                        debug!("[mqtt] disconnect: {}", e);
                    }
                    return;
                }
                event = self.eventloop.poll() => match event {
                    Ok(Event::Incoming(Incoming::Publish(p))) => {
                        route_inbound(&self.topics, dispatcher, &p.topic, &p.payload);
                    }
                    Ok(Event::Incoming(Incoming::ConnAck(_))) => {
                        // clean session: the broker forgot our subscriptions
                        info!("[mqtt] reconnected");
                        if let Err(e) = subscribe_all(&self.client, &self.topics) {
                            error!("[mqtt] resubscribe failed: {}", e);
                        }
                    }
                    Ok(_) => {}
                    Err(e) => {
                        // rumqttc reconnects on the next poll
                        error!("[mqtt] connection error: {:?}", e);
                        tokio::time::sleep(Duration::from_secs(2)).await;
                    }
                }
            }
        }
    }
}

/// Routes one inbound publish. Command payloads go through the dispatcher;
/// serial data is only acknowledged in the log.
pub fn route_inbound(topics: &TopicsConf, dispatcher: &Dispatcher, topic: &str, payload: &[u8]) -> Vec<Dispatched> {
    let text = String::from_utf8_lossy(payload);
    debug!("[mqtt] message on {}: {}", topic, text);

    if topic == topics.command {
        let command = text.trim_matches(|c: char| c.is_whitespace() || c == '\0');
        let dispatched = dispatcher.intake(command);
        for d in &dispatched {
            info!("[mqtt] {} command {:?} -> {:?}", d.category, d.command, d.action);
        }
        dispatched
    } else if topic == topics.serial_data {
        debug!("[mqtt] serial data received ({} bytes), not processed", payload.len());
        Vec::new()
    } else {
        warn!("[mqtt] message on unexpected topic {}", topic);
        Vec::new()
    }
}
