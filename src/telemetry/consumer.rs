use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::thread::JoinHandle;
use std::time::Duration;

use anyhow::Result;
use rumqttc::{Client, Event, MqttOptions, Packet, QoS};

use super::{
    BrokerSettings, TelemetryError, TelemetryMessage, TelemetrySource, DATA_TOPIC, QUEUE_CAPACITY,
    STATUS_TOPIC,
};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Consuming side of the telemetry channel, owned by the monitor process.
///
/// Subscribes to both experiment topics on connect. A background thread
/// drains the rumqttc event loop into a bounded FIFO queue of
/// [`QUEUE_CAPACITY`] messages; when the queue is full the *delivery*
/// thread blocks, so telemetry stalls the producer instead of dropping.
pub struct TelemetryConsumer {
    client: Client,
    queue: Option<Receiver<(String, Vec<u8>)>>,
    event_loop: Option<JoinHandle<()>>,
}

impl TelemetryConsumer {
    pub fn start(broker: &BrokerSettings, client_id: &str) -> Result<Self> {
        let mut options = MqttOptions::new(client_id, &broker.host, broker.port);
        options.set_keep_alive(Duration::from_secs(30));
        let (client, mut connection) = Client::new(options, 10);

        client.subscribe(STATUS_TOPIC, QoS::AtLeastOnce)?;
        client.subscribe(DATA_TOPIC, QoS::AtLeastOnce)?;

        let (queue_tx, queue_rx) = mpsc::sync_channel(QUEUE_CAPACITY);
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
                    Ok(Event::Incoming(Packet::Publish(publish))) => {
                        // Blocks when the queue is full; never drops.
                        if queue_tx
                            .send((publish.topic, publish.payload.to_vec()))
                            .is_err()
                        {
                            break;
                        }
                    }
                    Ok(_) => {}
                    Err(e) => {
                        if !connected {
                            let _ = ready_tx.send(Err(e.to_string()));
                        } else {
                            log::warn!("telemetry consumer connection closed: {}", e);
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

        log::info!("telemetry consumer connected to {}:{}", broker.host, broker.port);
        Ok(Self {
            client,
            queue: Some(queue_rx),
            event_loop: Some(event_loop),
        })
    }

    /// Disconnect and join the event loop thread.
    pub fn stop(&mut self) -> Result<()> {
        // The receiver must go first: a delivery thread blocked on a full
        // queue only unblocks when the channel disconnects, and joining
        // before that would hang forever.
        self.queue.take();
        if let Some(handle) = self.event_loop.take() {
            let _ = self.client.disconnect();
            let _ = handle.join();
        }
        Ok(())
    }
}

impl TelemetrySource for TelemetryConsumer {
    /// Dequeue and decode at most one message; `Ok(None)` when the queue
    /// is empty or the consumer was stopped. A payload failing schema
    /// validation is an error.
    fn consume(&mut self) -> Result<Option<TelemetryMessage>> {
        let queue = match &self.queue {
            Some(queue) => queue,
            None => return Ok(None),
        };
        match queue.try_recv() {
            Ok((topic, payload)) => Ok(Some(TelemetryMessage::decode(&topic, &payload)?)),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => Ok(None),
        }
    }
}

impl Drop for TelemetryConsumer {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Client::new does no I/O until the connection is polled, so a
    // consumer can be assembled without a broker.
    fn offline_consumer(
        queue: Receiver<(String, Vec<u8>)>,
        event_loop: JoinHandle<()>,
    ) -> (TelemetryConsumer, rumqttc::Connection) {
        let (client, connection) = Client::new(MqttOptions::new("test", "localhost", 1883), 10);
        (
            TelemetryConsumer {
                client,
                queue: Some(queue),
                event_loop: Some(event_loop),
            },
            connection,
        )
    }

    #[test]
    fn stop_with_full_queue_does_not_hang() {
        let (queue_tx, queue_rx) = mpsc::sync_channel(QUEUE_CAPACITY);
        for _ in 0..QUEUE_CAPACITY {
            queue_tx
                .send((STATUS_TOPIC.to_string(), br#"{"active":true}"#.to_vec()))
                .unwrap();
        }
        // Stand-in for the delivery thread, blocked on the full queue the
        // same way queue_tx.send() blocks in the event loop.
        let delivery = std::thread::spawn(move || {
            let _ = queue_tx.send((STATUS_TOPIC.to_string(), br#"{"active":false}"#.to_vec()));
        });

        let (mut consumer, _connection) = offline_consumer(queue_rx, delivery);
        consumer.stop().unwrap();
        assert!(consumer.consume().unwrap().is_none());
    }

    #[test]
    fn consume_after_stop_is_empty_not_an_error() {
        let (_queue_tx, queue_rx) = mpsc::sync_channel::<(String, Vec<u8>)>(QUEUE_CAPACITY);
        let idle = std::thread::spawn(|| {});
        let (mut consumer, _connection) = offline_consumer(queue_rx, idle);
        consumer.stop().unwrap();
        consumer.stop().unwrap();
        assert!(consumer.consume().unwrap().is_none());
    }
}
