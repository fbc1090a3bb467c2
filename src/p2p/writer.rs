//! The single writer of a connection.

use super::connection::Connection;

use crate::capability::Capability;
use crate::channel::{encode, Sender};
use crate::message::{BundleOfEnvelopes, NetworkEnvelope, Payload};
use crate::{Error, Result};

use std::collections::VecDeque;
use std::time::Instant;

use tokio::sync::{mpsc, oneshot};

use tracing::{debug, trace, warn};

pub(crate) enum WriterCommand {
    Send { envelope: NetworkEnvelope, ack: Option<oneshot::Sender<Result<()>>> },
    /// Flush and shut the write direction of the socket down.
    Close,
}

type Pending = (NetworkEnvelope, Option<oneshot::Sender<Result<()>>>);

pub(crate) struct Writer {
    sender: Sender,
    connection: Connection,
    last_write: Option<Instant>,
}

impl Writer {
    pub(crate) fn new(sender: Sender, connection: Connection) -> Self {
        Writer { sender, connection, last_write: None }
    }

    pub(crate) async fn run(mut self, mut commands: mpsc::UnboundedReceiver<WriterCommand>) {
        let mut backlog: VecDeque<WriterCommand> = VecDeque::new();
        loop {
            let command = match backlog.pop_front() {
                Some(command) => command,
                None => match commands.recv().await {
                    Some(command) => command,
                    None => break,
                },
            };
            let pending = match command {
                WriterCommand::Send { envelope, ack } => (envelope, ack),
                WriterCommand::Close => break,
            };

            let mut batch = vec![pending];
            if self.is_throttled() {
                let config = self.connection.config();
                debug!(
                    "We got 2 send requests in less than {:?}, sleeping {:?} to avoid flooding our peer",
                    config.send_msg_throttle_trigger, config.send_msg_throttle_sleep
                );
                tokio::time::sleep(config.send_msg_throttle_sleep).await;
                if self.bundles_supported() && is_bundleable(&batch[0].0) {
                    self.collect_bundle(&mut batch, &mut commands, &mut backlog);
                }
            }
            self.last_write = Some(Instant::now());
            self.write(batch).await;
        }

        if let Err(err) = self.sender.shutdown().await {
            trace!("shutdown of the write half failed, might be expected: {}", err);
        }
        // anything still queued can no longer be written
        commands.close();
        while let Ok(command) = commands.try_recv() {
            backlog.push_back(command);
        }
        for command in backlog {
            if let WriterCommand::Send { ack: Some(ack), .. } = command {
                let _ = ack.send(Err(Error::ConnectionStopped));
            }
        }
    }

    fn is_throttled(&self) -> bool {
        let trigger = self.connection.config().send_msg_throttle_trigger;
        self.last_write.map(|last| last.elapsed() < trigger).unwrap_or(false)
    }

    fn bundles_supported(&self) -> bool {
        self.connection.capabilities().contains(Capability::BundleOfEnvelopes)
    }

    // Moves queued envelopes into the batch while the bundle stays below 90% of the default
    // size ceiling. The first command that does not fit is kept for the next round.
    fn collect_bundle(
        &self,
        batch: &mut Vec<Pending>,
        commands: &mut mpsc::UnboundedReceiver<WriterCommand>,
        backlog: &mut VecDeque<WriterCommand>,
    ) {
        let budget = self.connection.config().max_permitted_message_size * 9 / 10;
        let mut size = encoded_len(&batch[0].0);
        while let Ok(command) = commands.try_recv() {
            match command {
                WriterCommand::Send { envelope, ack } if is_bundleable(&envelope) => {
                    let len = encoded_len(&envelope);
                    if size + len > budget {
                        backlog.push_back(WriterCommand::Send { envelope, ack });
                        return;
                    }
                    size += len;
                    batch.push((envelope, ack));
                }
                other => {
                    backlog.push_back(other);
                    return;
                }
            }
        }
    }

    async fn write(&mut self, batch: Vec<Pending>) {
        let (envelopes, acks): (Vec<NetworkEnvelope>, Vec<_>) = batch.into_iter().unzip();
        if self.connection.is_stopped() {
            debug!("connection stopped, not writing {} envelope(s)", envelopes.len());
            ack_all(acks, || Err(Error::ConnectionStopped));
            return;
        }

        let frame_envelope = if envelopes.len() == 1 {
            envelopes[0].clone()
        } else {
            trace!("sending {} envelopes as a bundle", envelopes.len());
            NetworkEnvelope::with_version(
                self.connection.config().message_version,
                Payload::Bundle(BundleOfEnvelopes::new(envelopes.clone())),
            )
        };
        let frame = match encode(&frame_envelope) {
            Ok(frame) => frame,
            Err(err) => {
                warn!("could not encode {}: {}", frame_envelope.payload.name(), err);
                let message = err.to_string();
                ack_all(acks, || Err(Error::SendFailed(message.clone())));
                return;
            }
        };

        let size = frame.len();
        match self.sender.send(frame).await {
            Ok(()) => {
                let statistic = self.connection.statistic();
                statistic.add_sent_bytes(size);
                let address_known = self.connection.has_peers_node_address();
                for envelope in envelopes {
                    statistic.add_sent_message(envelope.payload.name());
                    self.connection.connection_state().on_message(&envelope.payload, address_known);
                    self.connection.notify_message_sent(envelope);
                }
                ack_all(acks, || Ok(()));
            }
            Err(err) => {
                let reason = super::input_handler::classify_io_error(&err);
                debug!("write failed ({}): {}", reason, err);
                let message = err.to_string();
                ack_all(acks, || Err(Error::SendFailed(message.clone())));
                self.connection.shut_down(reason);
            }
        }
    }
}

fn is_bundleable(envelope: &NetworkEnvelope) -> bool {
    !matches!(envelope.payload, Payload::CloseConnection(_) | Payload::Bundle(_))
}

fn encoded_len(envelope: &NetworkEnvelope) -> usize {
    bincode::serialized_size(envelope).map(|size| size as usize).unwrap_or(usize::MAX / 2)
}

fn ack_all<F>(acks: Vec<Option<oneshot::Sender<Result<()>>>>, result: F)
where
    F: Fn() -> Result<()>,
{
    for ack in acks.into_iter().flatten() {
        let _ = ack.send(result());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::Capabilities;
    use crate::message::{Ping, SupportedCapabilitiesMessage};
    use crate::p2p::connection_config::ConnectionConfig;
    use crate::test_util::*;

    use std::time::Duration;

    fn ping(nonce: u32) -> NetworkEnvelope {
        NetworkEnvelope::new(Payload::Ping(Ping::new(nonce, 0)))
    }

    #[actix_rt::test]
    async fn test_sends_keep_order() {
        let config = ConnectionConfig {
            send_msg_throttle_sleep: Duration::from_millis(1),
            ..ConnectionConfig::default()
        };
        let (context, _) = test_context(config);
        let listener = RecordingListener::new();
        let (connection, mut peer) = connect_pair(&context, listener.clone()).await;

        for nonce in 0..20 {
            connection.send_message(ping(nonce));
        }
        for nonce in 0..20 {
            assert_eq!(peer.recv().await.unwrap(), ping(nonce));
        }
        wait_for(|| listener.sent().len() == 20).await;
        assert_eq!(connection.statistic().sent_messages().get("Ping"), Some(&20));
        assert!(connection.statistic().sent_bytes() > 0);
    }

    #[actix_rt::test]
    async fn test_throttled_sends_are_bundled() {
        let config = ConnectionConfig {
            send_msg_throttle_trigger: Duration::from_secs(5),
            ..ConnectionConfig::default()
        };
        let (context, _) = test_context(config);
        let listener = RecordingListener::new();
        let (connection, mut peer) = connect_pair(&context, listener.clone()).await;

        let capabilities: Capabilities =
            vec![Capability::DaoState, Capability::BundleOfEnvelopes].into_iter().collect();
        peer.send(&NetworkEnvelope::new(Payload::SupportedCapabilities(
            SupportedCapabilitiesMessage::new(capabilities, None),
        )))
        .await;
        listener.wait_for_messages(1).await;

        connection.send_message(ping(0));
        assert_eq!(peer.recv().await.unwrap(), ping(0));
        for nonce in 1..5 {
            connection.send_message(ping(nonce));
        }
        let bundle = peer.recv().await.unwrap();
        assert_eq!(
            bundle.payload,
            Payload::Bundle(BundleOfEnvelopes::new(vec![ping(1), ping(2), ping(3), ping(4)]))
        );
    }
}
