//! SSH transport using russh.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use russh::client::{self, Handle};
use russh::keys::ssh_key::PublicKey;
use russh::{Channel, ChannelMsg, Disconnect};
use secrecy::ExposeSecret;
use tracing::{debug, info, warn};

use super::pump::{ChannelEvent, ChannelPump, RemoteChannel};
use super::{Connection, Connector, ShellStreams, TransportConfig};
use crate::error::RemoteShellError;
use crate::Result;

/// Connects to real hosts over SSH with password authentication.
#[derive(Debug, Clone)]
pub struct SshConnector {
    keepalive: Option<Duration>,
}

impl SshConnector {
    pub fn new() -> Self {
        Self {
            keepalive: Some(Duration::from_secs(30)),
        }
    }

    /// Interval of SSH keepalive messages; `None` disables them.
    pub fn keepalive(mut self, interval: Option<Duration>) -> Self {
        self.keepalive = interval;
        self
    }

    fn client_config(&self) -> client::Config {
        client::Config {
            keepalive_interval: self.keepalive,
            ..Default::default()
        }
    }
}

impl Default for SshConnector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Connector for SshConnector {
    async fn connect(&self, config: &TransportConfig) -> Result<Box<dyn Connection>> {
        let address = config.address();
        info!("connecting to {}@{}", config.user, address);

        let handler = HostKeyCheck {
            host: config.host.clone(),
            port: config.port,
            strict: config.verify_host_strictly,
            known_hosts: config.known_hosts.clone(),
        };
        let client_config = Arc::new(self.client_config());

        let attempt = async {
            let mut handle =
                client::connect(client_config, (config.host.as_str(), config.port), handler)
                    .await
                    .map_err(|e| RemoteShellError::Transport(format!("{}: {}", address, e)))?;

            let auth = handle
                .authenticate_password(config.user.as_str(), config.secret.expose_secret())
                .await
                .map_err(|e| RemoteShellError::Transport(format!("{}: {}", address, e)))?;

            if !auth.success() {
                return Err(RemoteShellError::Transport(format!(
                    "{}: authentication failed for user {}",
                    address, config.user
                )));
            }

            Ok(handle)
        };

        let handle = tokio::time::timeout(config.connect_timeout, attempt)
            .await
            .map_err(|_| {
                RemoteShellError::Transport(format!(
                    "{}: connection timed out after {:?}",
                    address, config.connect_timeout
                ))
            })??;

        info!("authenticated as {}@{}", config.user, address);
        Ok(Box::new(SshConnection {
            handle: Some(handle),
            address,
        }))
    }
}

/// Server key policy for one connection attempt.
struct HostKeyCheck {
    host: String,
    port: u16,
    strict: bool,
    known_hosts: Option<std::path::PathBuf>,
}

impl client::Handler for HostKeyCheck {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &PublicKey,
    ) -> std::result::Result<bool, Self::Error> {
        if !self.strict {
            warn!(
                "accepting unverified host key for {}:{}",
                self.host, self.port
            );
            return Ok(true);
        }

        let known = match &self.known_hosts {
            Some(path) => russh::keys::check_known_hosts_path(
                &self.host,
                self.port,
                server_public_key,
                path,
            ),
            None => russh::keys::check_known_hosts(&self.host, self.port, server_public_key),
        };

        match known {
            Ok(true) => Ok(true),
            Ok(false) => {
                warn!("host key for {}:{} is not known", self.host, self.port);
                Ok(false)
            }
            Err(e) => {
                warn!("host key for {}:{} rejected: {}", self.host, self.port, e);
                Ok(false)
            }
        }
    }
}

/// An authenticated SSH connection.
pub struct SshConnection {
    handle: Option<Handle<HostKeyCheck>>,
    address: String,
}

#[async_trait]
impl Connection for SshConnection {
    async fn new_interactive_session(&mut self) -> Result<ShellStreams> {
        let handle = self
            .handle
            .as_ref()
            .ok_or_else(|| RemoteShellError::SessionSetup("connection closed".into()))?;

        let channel = handle
            .channel_open_session()
            .await
            .map_err(|e| RemoteShellError::SessionSetup(format!("open channel: {}", e)))?;

        channel
            .request_shell(true)
            .await
            .map_err(|e| RemoteShellError::SessionSetup(format!("start shell: {}", e)))?;

        debug!("shell started on {}", self.address);

        let (pump, streams) = ChannelPump::new(SshChannel { channel });
        tokio::spawn(pump.run());
        Ok(streams)
    }

    async fn close(&mut self) -> Result<()> {
        let Some(handle) = self.handle.take() else {
            return Ok(());
        };
        debug!("disconnecting from {}", self.address);
        handle
            .disconnect(Disconnect::ByApplication, "", "en")
            .await
            .map_err(|e| RemoteShellError::Transport(e.to_string()))
    }
}

/// A russh session channel seen through the pump's interface.
struct SshChannel {
    channel: Channel<client::Msg>,
}

#[async_trait]
impl RemoteChannel for SshChannel {
    async fn next_event(&mut self) -> Option<ChannelEvent> {
        loop {
            let event = match self.channel.wait().await? {
                ChannelMsg::Data { data } => ChannelEvent::Data(data.to_vec()),
                ChannelMsg::ExtendedData { data, ext } => {
                    ChannelEvent::ExtendedData(data.to_vec(), ext)
                }
                ChannelMsg::Eof => ChannelEvent::Eof,
                ChannelMsg::ExitStatus { exit_status } => ChannelEvent::ExitStatus(exit_status),
                ChannelMsg::Close => ChannelEvent::Close,
                _ => continue,
            };
            return Some(event);
        }
    }

    async fn send_data(&mut self, data: &[u8]) -> std::io::Result<()> {
        self.channel
            .data(data)
            .await
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::BrokenPipe, e.to_string()))
    }

    async fn send_eof(&mut self) -> std::io::Result<()> {
        self.channel
            .eof()
            .await
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::BrokenPipe, e.to_string()))
    }
}
