use anyhow::{Result, anyhow};
use rumqttc::{AsyncClient, Event, LastWill, MqttOptions, Packet, QoS};
use std::sync::{
    Arc, RwLock,
    atomic::{AtomicBool, Ordering},
};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task;
use tracing::{debug, error, info, warn};

#[derive(Clone, Debug)]
pub struct MqttMessage {
    pub topic: String,
    pub payload: Vec<u8>,
    pub pkid: u16,
}

/// Outbound half of the broker connection, mockable in tests
#[async_trait::async_trait]
pub trait MqttPublisherClient: Send + Sync {
    async fn publish_bytes(
        &self,
        topic: &str,
        payload: &[u8],
        qos: QoS,
        retain: bool,
    ) -> Result<()>;
    fn is_connected(&self) -> bool;
}

/// Retained message re-sent after every (re)connect
#[derive(Clone, Debug)]
pub struct BirthMessage {
    pub topic: String,
    pub payload: String,
}

#[derive(Clone)]
pub struct MqttClient {
    client: AsyncClient,
    tx: broadcast::Sender<MqttMessage>,
    connected: Arc<AtomicBool>,
    subscriptions: Arc<RwLock<Vec<String>>>,
}

impl MqttClient {
    pub async fn new(
        host: &str,
        port: u16,
        client_id: &str,
        last_will: Option<LastWill>,
        birth: Option<BirthMessage>,
    ) -> Result<Self> {
        let mut mqttoptions = MqttOptions::new(client_id, host, port);
        mqttoptions.set_keep_alive(Duration::from_secs(20));
        // Persistent session so responses in flight survive a reconnect
        mqttoptions.set_clean_session(false);
        mqttoptions.set_manual_acks(true);

        if let Some(will) = last_will {
            mqttoptions.set_last_will(will);
        }

        let (client, mut eventloop) = AsyncClient::new(mqttoptions, 100);
        let (tx, _) = broadcast::channel(1024);
        let tx_clone = tx.clone();
        let connected = Arc::new(AtomicBool::new(false));
        let connected_clone = connected.clone();

        let subscriptions = Arc::new(RwLock::new(Vec::<String>::new()));
        let subscriptions_clone = subscriptions.clone();
        let client_clone = client.clone();

        task::spawn(async move {
            loop {
                match eventloop.poll().await {
                    Ok(Event::Incoming(Packet::Publish(publish))) => {
                        let msg = MqttMessage {
                            topic: publish.topic,
                            payload: publish.payload.to_vec(),
                            pkid: publish.pkid,
                        };
                        if let Err(broadcast::error::SendError(dropped)) = tx_clone.send(msg) {
                            // No receiver yet (startup); the broker redelivers unacked QoS 1
                            debug!(topic = %dropped.topic, "Dropped MQTT message, no internal subscribers");
                        }
                    }
                    Ok(Event::Incoming(Packet::ConnAck(_))) => {
                        info!("MQTT Connected");
                        connected_clone.store(true, Ordering::Relaxed);

                        let subs = subscriptions_clone
                            .read()
                            .map(|s| s.clone())
                            .unwrap_or_default();
                        if !subs.is_empty() {
                            info!("Re-subscribing to {} topics...", subs.len());
                            for topic in subs {
                                if let Err(e) =
                                    client_clone.subscribe(&topic, QoS::AtLeastOnce).await
                                {
                                    error!("Failed to re-subscribe to {}: {}", topic, e);
                                }
                            }
                        }

                        if let Some(birth) = &birth {
                            if let Err(e) = client_clone
                                .publish(
                                    &birth.topic,
                                    QoS::AtLeastOnce,
                                    true,
                                    birth.payload.as_bytes(),
                                )
                                .await
                            {
                                warn!("Failed to publish birth message: {}", e);
                            }
                        }
                    }
                    Ok(Event::Outgoing(rumqttc::Outgoing::Disconnect)) => {
                        connected_clone.store(false, Ordering::Relaxed);
                    }
                    Ok(_) => {}
                    Err(e) => {
                        error!("MQTT Connection error: {:?}", e);
                        connected_clone.store(false, Ordering::Relaxed);
                        tokio::time::sleep(Duration::from_secs(1)).await;
                    }
                }
            }
        });

        Ok(Self {
            client,
            tx,
            connected,
            subscriptions,
        })
    }

    pub fn subscribe_messages(&self) -> broadcast::Receiver<MqttMessage> {
        self.tx.subscribe()
    }

    pub async fn publish(&self, topic: &str, payload: &str, retain: bool) -> Result<()> {
        self.publish_bytes(topic, payload.as_bytes(), QoS::AtLeastOnce, retain)
            .await
    }

    pub async fn subscribe(&self, topic: &str) -> Result<()> {
        {
            let mut subs = self
                .subscriptions
                .write()
                .map_err(|_| anyhow!("Subscription list poisoned"))?;
            if !subs.iter().any(|s| s == topic) {
                subs.push(topic.to_string());
            }
        }

        self.client
            .subscribe(topic, QoS::AtLeastOnce)
            .await
            .map_err(|e| anyhow!("Failed to subscribe to topic {}: {}", topic, e))?;
        Ok(())
    }

    pub async fn ack(&self, topic: &str, pkid: u16) -> Result<()> {
        // QoS 0 deliveries carry pkid 0 and need no ack
        if pkid == 0 {
            return Ok(());
        }

        let publish = rumqttc::Publish {
            pkid,
            topic: topic.to_string(),
            qos: QoS::AtLeastOnce,
            payload: bytes::Bytes::new(),
            retain: false,
            dup: false,
        };

        self.client
            .ack(&publish)
            .await
            .map_err(|e| anyhow!("Failed to ack packet {}: {}", pkid, e))
    }

    pub async fn disconnect(&self) -> Result<()> {
        self.client
            .disconnect()
            .await
            .map_err(|e| anyhow!("Failed to disconnect: {}", e))
    }
}

#[async_trait::async_trait]
impl MqttPublisherClient for MqttClient {
    async fn publish_bytes(
        &self,
        topic: &str,
        payload: &[u8],
        qos: QoS,
        retain: bool,
    ) -> Result<()> {
        self.client
            .publish(topic, qos, retain, payload.to_vec())
            .await
            .map_err(|e| anyhow!("Failed to publish MQTT message: {}", e))?;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }
}
