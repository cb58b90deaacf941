//! The task that owns the modem.
//!
//! Only [`ModemActor`] ever touches the serial transport. Everyone else
//! holds a [`ModemHandle`] and queues requests; the actor runs them one at
//! a time, so two writers can never interleave on the wire.

use std::io;
use std::net::IpAddr;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_serial::{SerialPortBuilderExt, SerialStream};
use tokio_util::sync::CancellationToken;

use super::commands::ModemCommand;
use super::engine::AtEngine;
use super::response::{parse_cgpaddr, parse_csq};
use super::{ModemError, Result, SignalQuality, SmsReceipt, sms};
use crate::config::ModemSettings;
use crate::tracing::prelude::*;

/// Opens the byte stream to a modem.
#[async_trait]
pub trait Connector: Send + 'static {
    type Transport: AsyncRead + AsyncWrite + Unpin + Send + 'static;

    async fn connect(&mut self) -> io::Result<Self::Transport>;

    /// Where this connector points, for logs.
    fn describe(&self) -> String;
}

/// Serial port connector.
#[derive(Debug, Clone)]
pub struct SerialConnector {
    port: String,
    baud_rate: u32,
}

impl SerialConnector {
    pub fn new(port: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            port: port.into(),
            baud_rate,
        }
    }

    pub fn from_settings(settings: &ModemSettings) -> Self {
        Self::new(&settings.serial_port, settings.baud_rate)
    }
}

#[async_trait]
impl Connector for SerialConnector {
    type Transport = SerialStream;

    async fn connect(&mut self) -> io::Result<SerialStream> {
        tokio_serial::new(&self.port, self.baud_rate)
            .open_native_async()
            .map_err(io::Error::from)
    }

    fn describe(&self) -> String {
        format!("{}@{}", self.port, self.baud_rate)
    }
}

/// Session parameters.
#[derive(Debug, Clone)]
pub struct ModemOptions {
    pub apn: String,
    pub command_timeout: Duration,
    pub submit_timeout: Duration,
    pub reset_on_init: bool,
    pub reset_settle: Duration,
}

impl ModemOptions {
    pub fn from_settings(settings: &ModemSettings) -> Self {
        Self {
            apn: settings.apn.clone(),
            command_timeout: settings.command_timeout(),
            submit_timeout: settings.submit_timeout(),
            reset_on_init: settings.reset_on_init,
            reset_settle: settings.reset_settle(),
        }
    }
}

impl Default for ModemOptions {
    fn default() -> Self {
        Self::from_settings(&ModemSettings::default())
    }
}

/// Cloneable client for the modem task.
#[derive(Debug, Clone)]
pub struct ModemHandle {
    tx: mpsc::Sender<ModemCommand>,
}

impl ModemHandle {
    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<Result<T>>) -> ModemCommand,
    ) -> Result<T> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(make(reply))
            .await
            .map_err(|_| ModemError::ActorGone)?;
        rx.await.map_err(|_| ModemError::ActorGone)?
    }

    pub async fn execute(&self, command: impl Into<String>) -> Result<String> {
        let command = command.into();
        self.request(|reply| ModemCommand::Execute {
            command,
            timeout: None,
            reply,
        })
        .await
    }

    pub async fn execute_with_timeout(
        &self,
        command: impl Into<String>,
        timeout: Duration,
    ) -> Result<String> {
        let command = command.into();
        self.request(|reply| ModemCommand::Execute {
            command,
            timeout: Some(timeout),
            reply,
        })
        .await
    }

    pub async fn submit_with_prompt(
        &self,
        command: impl Into<String>,
        body: impl Into<String>,
    ) -> Result<String> {
        let (command, body) = (command.into(), body.into());
        self.request(|reply| ModemCommand::SubmitWithPrompt {
            command,
            body,
            reply,
        })
        .await
    }

    pub async fn send_sms(
        &self,
        recipient: impl Into<String>,
        body: impl Into<String>,
    ) -> Result<SmsReceipt> {
        let (recipient, body) = (recipient.into(), body.into());
        self.request(|reply| ModemCommand::SendSms {
            recipient,
            body,
            reply,
        })
        .await
    }

    pub async fn signal_quality(&self) -> Result<SignalQuality> {
        self.request(|reply| ModemCommand::SignalQuality { reply })
            .await
    }

    pub async fn initialize(&self) -> Result<()> {
        self.request(|reply| ModemCommand::Initialize { reply }).await
    }

    pub async fn attach_data(&self) -> Result<IpAddr> {
        self.request(|reply| ModemCommand::AttachData { reply }).await
    }

    pub async fn data_address(&self) -> Result<Option<IpAddr>> {
        self.request(|reply| ModemCommand::DataAddress { reply })
            .await
    }

    pub async fn disconnect(&self) -> Result<()> {
        self.request(|reply| ModemCommand::Disconnect { reply }).await
    }
}

pub struct ModemActor<C: Connector> {
    connector: C,
    options: ModemOptions,
    session: Option<AtEngine<C::Transport>>,
    data_attached: bool,
    rx: mpsc::Receiver<ModemCommand>,
}

impl<C: Connector> ModemActor<C> {
    pub fn new(connector: C, options: ModemOptions, queue_depth: usize) -> (Self, ModemHandle) {
        let (tx, rx) = mpsc::channel(queue_depth.max(1));
        let actor = Self {
            connector,
            options,
            session: None,
            data_attached: false,
            rx,
        };
        (actor, ModemHandle { tx })
    }

    /// Start the actor on its own task.
    pub fn spawn(
        connector: C,
        options: ModemOptions,
        queue_depth: usize,
        cancellation: CancellationToken,
    ) -> (ModemHandle, JoinHandle<()>) {
        let (actor, handle) = Self::new(connector, options, queue_depth);
        let task = tokio::spawn(actor.run(cancellation));
        (handle, task)
    }

    /// Serve requests until cancelled or every handle is dropped, then
    /// close the link. A request in progress always runs to completion.
    pub async fn run(mut self, cancellation: CancellationToken) {
        info!(modem = %self.connector.describe(), "Modem task started");

        loop {
            tokio::select! {
                biased;
                _ = cancellation.cancelled() => break,
                command = self.rx.recv() => match command {
                    Some(command) => self.handle(command).await,
                    None => break,
                },
            }
        }

        self.close().await;
        info!("Modem task stopped");
    }

    async fn handle(&mut self, command: ModemCommand) {
        trace!(request = command.name(), "Modem request");

        match command {
            ModemCommand::Execute {
                command,
                timeout,
                reply,
            } => {
                let timeout = timeout.unwrap_or(self.options.command_timeout);
                let result = self.execute(&command, timeout).await;
                self.finish(reply, result);
            }
            ModemCommand::SubmitWithPrompt {
                command,
                body,
                reply,
            } => {
                let result = self.submit_with_prompt(&command, &body).await;
                self.finish(reply, result);
            }
            ModemCommand::SendSms {
                recipient,
                body,
                reply,
            } => {
                let result = self.send_sms(&recipient, &body).await;
                self.finish(reply, result);
            }
            ModemCommand::SignalQuality { reply } => {
                let result = self.signal_quality().await;
                self.finish(reply, result);
            }
            ModemCommand::Initialize { reply } => {
                self.session = None;
                let result = self.session().await.map(|_| ());
                self.finish(reply, result);
            }
            ModemCommand::AttachData { reply } => {
                let result = self.attach_data().await;
                self.finish(reply, result);
            }
            ModemCommand::DataAddress { reply } => {
                let result = self.data_address().await;
                self.finish(reply, result);
            }
            ModemCommand::Disconnect { reply } => {
                self.close().await;
                self.finish(reply, Ok(()));
            }
        }
    }

    /// Drop a broken session and hand the result back.
    fn finish<T>(&mut self, reply: oneshot::Sender<Result<T>>, result: Result<T>) {
        if let Err(e) = &result {
            if e.is_link_failure() && self.session.is_some() {
                warn!(error = %e, "Modem link lost, will reopen on next request");
                self.session = None;
                self.data_attached = false;
            }
        }
        // The requester may have given up waiting.
        let _ = reply.send(result);
    }

    /// The open session, opening and initializing one if needed.
    async fn session(&mut self) -> Result<&mut AtEngine<C::Transport>> {
        let engine = match self.session.take() {
            Some(engine) => engine,
            None => self.open().await?,
        };
        Ok(self.session.insert(engine))
    }

    async fn open(&mut self) -> Result<AtEngine<C::Transport>> {
        info!(modem = %self.connector.describe(), "Opening modem");
        let timeout = self.options.command_timeout;
        let mut engine = AtEngine::new(self.connector.connect().await?);

        if self.options.reset_on_init {
            if let Err(e) = engine.execute("AT+CFUN=1,1", timeout).await {
                warn!(error = %e, "Modem reset failed");
            }
            debug!(settle = ?self.options.reset_settle, "Waiting for modem to restart");
            drop(engine);
            tokio::time::sleep(self.options.reset_settle).await;
            // USB modems re-enumerate after a reset.
            engine = AtEngine::new(self.connector.connect().await?);
        }

        engine.execute("AT", timeout).await?;

        if let Err(e) = engine.execute("AT+CMEE=2", timeout).await {
            warn!(error = %e, "Could not enable verbose errors");
        }
        let context = format!("AT+CGDCONT=1,\"IP\",\"{}\"", self.options.apn);
        if let Err(e) = engine.execute(&context, timeout).await {
            warn!(apn = %self.options.apn, error = %e, "Could not set PDP context");
        }

        info!("Modem initialized");
        Ok(engine)
    }

    async fn close(&mut self) {
        let attached = std::mem::take(&mut self.data_attached);
        if let Some(mut engine) = self.session.take() {
            if attached {
                if let Err(e) = engine
                    .execute("AT+CGACT=0,1", self.options.command_timeout)
                    .await
                {
                    warn!(error = %e, "Failed to deactivate packet data");
                }
            }
            info!("Modem link closed");
        }
    }

    async fn execute(&mut self, command: &str, timeout: Duration) -> Result<String> {
        self.session().await?.execute(command, timeout).await
    }

    async fn submit_with_prompt(&mut self, command: &str, body: &str) -> Result<String> {
        let (prompt, submit) = (self.options.command_timeout, self.options.submit_timeout);
        self.session()
            .await?
            .submit_with_prompt(command, body, prompt, submit)
            .await
    }

    async fn send_sms(&mut self, recipient: &str, body: &str) -> Result<SmsReceipt> {
        let (command, submit) = (self.options.command_timeout, self.options.submit_timeout);
        let engine = self.session().await?;
        sms::send_sms(engine, recipient, body, command, submit).await
    }

    async fn signal_quality(&mut self) -> Result<SignalQuality> {
        let timeout = self.options.command_timeout;
        let text = self.session().await?.execute("AT+CSQ", timeout).await?;
        parse_csq(&text)
    }

    async fn attach_data(&mut self) -> Result<IpAddr> {
        // Context activation waits on the network, give it the long deadline.
        let activate = self.options.submit_timeout;
        self.session()
            .await?
            .execute("AT+CGACT=1,1", activate)
            .await?;
        self.data_attached = true;

        let address = self
            .data_address()
            .await?
            .ok_or_else(|| ModemError::UnexpectedResponse {
                command: "AT+CGPADDR=1".to_string(),
                response: "no address assigned".to_string(),
            })?;
        info!(%address, "Packet data attached");
        Ok(address)
    }

    async fn data_address(&mut self) -> Result<Option<IpAddr>> {
        let timeout = self.options.command_timeout;
        let text = self
            .session()
            .await?
            .execute("AT+CGPADDR=1", timeout)
            .await?;
        Ok(parse_cgpaddr(&text))
    }
}
