use std::sync::mpsc;
use std::thread::JoinHandle;
use std::time::Duration;

use anyhow::Result;
use rumqttc::{Client, Event, MqttOptions, Packet, QoS};

use super::{BrokerSettings, TelemetryError, TelemetryMessage, TelemetrySink};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Publishing side of the telemetry channel, owned by the inference
/// engine process.
///
/// `start` connects and fails fatally if the broker never acknowledges;
/// there is no reconnect. The rumqttc event loop is drained on a
/// background thread so publishes flush asynchronously.
pub struct TelemetryProducer {
    client: Client,
    event_loop: Option<JoinHandle<()>>,
}

impl TelemetryProducer {
    pub fn start(broker: &BrokerSettings, client_id: &str) -> Result<Self> {
        let mut options = MqttOptions::new(client_id, &broker.host, broker.port);
        options.set_keep_alive(Duration::from_secs(30));
        let (client, mut connection) = Client::new(options, 10);

        let (ready_tx, ready_rx) = mpsc::channel();
        let event_loop = std::thread::spawn(move || {
            let mut connected = false;
            for event in connection.iter() {
                match event {
                    Ok(Event::Incoming(Packet::ConnAck(_))) => {
                        if !connected {
                            connected = true;
                            let _ = ready_tx.send(Ok(()));
                        }
                    }
                    Ok(_) => {}
                    Err(e) => {
                        if !connected {
                            let _ = ready_tx.send(Err(e.to_string()));
                        } else {
                            log::warn!("telemetry producer connection closed: {}", e);
                        }
                        break;
                    }
                }
            }
        });

        match ready_rx.recv_timeout(CONNECT_TIMEOUT) {
            Ok(Ok(())) => {}
            Ok(Err(reason)) => return Err(TelemetryError::ConnectionFailure(reason).into()),
            Err(_) => {
                return Err(TelemetryError::ConnectionFailure(format!(
                    "no broker acknowledgment from {}:{} within {:?}",
                    broker.host, broker.port, CONNECT_TIMEOUT
                ))
                .into())
            }
        }

        log::info!("telemetry producer connected to {}:{}", broker.host, broker.port);
        Ok(Self {
            client,
            event_loop: Some(event_loop),
        })
    }

    /// Disconnect and join the event loop thread.
    pub fn stop(&mut self) -> Result<()> {
        if let Some(handle) = self.event_loop.take() {
            let _ = self.client.disconnect();
            let _ = handle.join();
        }
        Ok(())
    }
}

impl TelemetrySink for TelemetryProducer {
    /// Publish one message (QoS 1).
    fn produce(&mut self, message: &TelemetryMessage) -> Result<()> {
        let (topic, payload) = message.encode()?;
        self.client.publish(topic, QoS::AtLeastOnce, false, payload)?;
        Ok(())
    }
}

impl Drop for TelemetryProducer {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}
