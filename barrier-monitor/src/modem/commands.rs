//! Requests sent to the modem task.
//!
//! Each request carries a oneshot reply channel so the caller can await
//! the outcome of its own command.

use std::net::IpAddr;
use std::time::Duration;

use tokio::sync::oneshot;

use super::{Result, SignalQuality, SmsReceipt};

pub enum ModemCommand {
    /// Run one command. `timeout` defaults to the configured command
    /// timeout.
    Execute {
        command: String,
        timeout: Option<Duration>,
        reply: oneshot::Sender<Result<String>>,
    },

    /// Run a two-phase command that prompts for a body.
    SubmitWithPrompt {
        command: String,
        body: String,
        reply: oneshot::Sender<Result<String>>,
    },

    SendSms {
        recipient: String,
        body: String,
        reply: oneshot::Sender<Result<SmsReceipt>>,
    },

    SignalQuality {
        reply: oneshot::Sender<Result<SignalQuality>>,
    },

    /// (Re)open the link and run the init sequence.
    Initialize { reply: oneshot::Sender<Result<()>> },

    /// Activate the packet data context and report the address assigned.
    AttachData {
        reply: oneshot::Sender<Result<IpAddr>>,
    },

    /// Address of the packet data context, if one is active.
    DataAddress {
        reply: oneshot::Sender<Result<Option<IpAddr>>>,
    },

    /// Deactivate packet data and close the link.
    Disconnect { reply: oneshot::Sender<Result<()>> },
}

impl ModemCommand {
    pub(crate) fn name(&self) -> &'static str {
        match self {
            ModemCommand::Execute { .. } => "execute",
            ModemCommand::SubmitWithPrompt { .. } => "submit_with_prompt",
            ModemCommand::SendSms { .. } => "send_sms",
            ModemCommand::SignalQuality { .. } => "signal_quality",
            ModemCommand::Initialize { .. } => "initialize",
            ModemCommand::AttachData { .. } => "attach_data",
            ModemCommand::DataAddress { .. } => "data_address",
            ModemCommand::Disconnect { .. } => "disconnect",
        }
    }
}
