//! Registration channel
//!
//! Concrete channel state machine for instance registration over a
//! message transport: register, then heartbeat while registered, then
//! unregister and close.
use std::sync::Arc;

use tokio::sync::watch;
use tracing::debug;

use crate::error::{KestrelError, Result};
use crate::registry::InstanceInfo;
use crate::transport::channel::{ClientChannel, SendCompletion, TransportClient};
use crate::transport::messages::OutboundMessage;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RegistrationState {
    Idle,
    Registered,
    Closed,
}

pub struct RegistrationChannel {
    channel: ClientChannel<RegistrationState>,
    instance: Arc<InstanceInfo>,
}

impl RegistrationChannel {
    pub fn new(client: Arc<dyn TransportClient>, instance: Arc<InstanceInfo>) -> Self {
        Self {
            channel: ClientChannel::new(
                RegistrationState::Idle,
                RegistrationState::Closed,
                client,
            ),
            instance,
        }
    }

    pub fn state(&self) -> RegistrationState {
        self.channel.state()
    }

    pub fn subscribe(&self) -> watch::Receiver<RegistrationState> {
        self.channel.subscribe()
    }

    /// Send the current descriptor snapshot and await the ack.
    pub async fn register(&self) -> Result<()> {
        if self.channel.is_closed() {
            return Err(KestrelError::Transport("channel is closed".to_string()));
        }
        let connection = self.channel.connect().await?;
        let completion = self
            .channel
            .send_expect_ack(&connection, OutboundMessage::Register(self.instance.snapshot()));
        await_completion(completion).await?;
        self.channel.move_to(RegistrationState::Registered);
        debug!(instance = %self.instance.id(), "registration acknowledged");
        Ok(())
    }

    /// Renew the lease over the bound connection.
    pub async fn heartbeat(&self) -> Result<()> {
        if self.channel.state() != RegistrationState::Registered {
            return Err(KestrelError::Transport(
                "heartbeat before registration".to_string(),
            ));
        }
        let connection = self.channel.connect().await?;
        let completion = self
            .channel
            .send_expect_ack(&connection, OutboundMessage::Heartbeat);
        await_completion(completion).await
    }

    /// Withdraw the registration, then close the channel.
    pub async fn unregister(&self) -> Result<()> {
        if self.channel.state() == RegistrationState::Registered {
            let connection = self.channel.connect().await?;
            let completion = self
                .channel
                .send_expect_ack(&connection, OutboundMessage::Unregister);
            await_completion(completion).await?;
        }
        self.close();
        Ok(())
    }

    pub fn close(&self) {
        self.channel.close();
    }
}

async fn await_completion(completion: SendCompletion) -> Result<()> {
    completion
        .await
        .map_err(|_| KestrelError::Transport("send observer dropped".to_string()))?
}
