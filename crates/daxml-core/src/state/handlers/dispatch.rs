//! Command/reply exchange with the DA.
//!
//! After an envelope is sent the DA answers with a plain reply, then drives
//! the conversation with nested `<host>` command frames. Every nested frame
//! the host consumes is acknowledged with a plain "OK".

use tracing::{debug, warn};

use crate::error::DaError;
use crate::events::{DaEvent, DaObserver};
use crate::payload::{DownloadRequest, UploadRequest};
use crate::protocol::constants::*;
use crate::protocol::field;
use crate::state::machine::FrameExpectation;
use crate::transport::UsbTransport;

use super::DaContext;

/// A nested command resolved from a device frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Nested {
    Start,
    /// Device asks the host to push data.
    Download(DownloadRequest),
    /// Device is about to push data to the host.
    Upload(UploadRequest),
    /// Command finished; carries the result, or the failure message when
    /// the device attached one.
    End(String),
    /// Any command the host does not interpret.
    Other(String),
}

impl Nested {
    pub fn command_name(&self) -> &str {
        match self {
            Nested::Start => CMD_START,
            Nested::Download(_) => CMD_DOWNLOAD_FILE,
            Nested::Upload(_) => CMD_UPLOAD_FILE,
            Nested::End(_) => CMD_END,
            Nested::Other(name) => name,
        }
    }

    /// Textual result, as reported back for absorbed commands.
    pub fn result_text(&self) -> String {
        match self {
            Nested::Start => "START".to_string(),
            Nested::Download(req) => req.info.clone(),
            Nested::Upload(req) => req.info.clone(),
            Nested::End(result) => result.clone(),
            Nested::Other(_) => String::new(),
        }
    }
}

/// Outcome of [`send_command`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// END/OK followed by START: the command completed.
    Done,
    /// "OK" received and the caller asked to resolve the rest itself.
    Acknowledged,
    /// Device asked for something before ending the command.
    Nested(Nested),
    /// Device declined the command; the conversation is back in sync.
    Unsupported(String),
    /// Device reported an error; text forwarded verbatim.
    Device(String),
}

impl Reply {
    /// Require a completed command.
    pub fn into_done(self) -> Result<(), DaError> {
        match self {
            Reply::Done | Reply::Acknowledged => Ok(()),
            Reply::Unsupported(msg) => Err(DaError::Unsupported(msg)),
            Reply::Device(msg) => Err(DaError::Device(msg)),
            Reply::Nested(nested) => Err(DaError::Sequence {
                expected: CMD_END,
                got: nested.command_name().to_string(),
            }),
        }
    }
}

fn classify_failure(message: String) -> Reply {
    if message.contains(UNSUPPORTED_MARKER) {
        Reply::Unsupported(message)
    } else {
        Reply::Device(message)
    }
}

/// Send one command envelope and interpret the device's answer.
///
/// With `no_ack` the exchange stops after a plain "OK" so the caller can
/// drive the nested commands itself.
pub fn send_command<T: UsbTransport, O: DaObserver>(
    ctx: &mut DaContext<'_, T, O>,
    xml: &str,
    no_ack: bool,
) -> Result<Reply, DaError> {
    let command = field(xml, "command").to_string();
    debug!(command = %command, "Sending command");
    ctx.emit(DaEvent::CommandSent { command });

    ctx.link.send_text(xml)?;
    ctx.state.expect(FrameExpectation::Reply);
    let reply = ctx.receive_text("command reply")?;

    if reply == REPLY_OK {
        if no_ack {
            return Ok(Reply::Acknowledged);
        }
        return match resolve_next(ctx)? {
            Nested::End(result) if result == REPLY_OK => {
                ctx.ack()?;
                resolve_start(ctx)?;
                Ok(Reply::Done)
            }
            Nested::End(message) => Ok(classify_failure(message)),
            other => Ok(Reply::Nested(other)),
        };
    }

    if reply == REPLY_ERR_UNSUPPORTED {
        // One trailing result is still in flight; absorb it to stay in sync.
        let absorbed = resolve_next(ctx)?;
        ctx.ack()?;
        resolve_start(ctx)?;
        let detail = absorbed.result_text();
        let message = if detail.is_empty() {
            UNSUPPORTED_MARKER.to_string()
        } else {
            format!("{}: {}", UNSUPPORTED_MARKER, detail)
        };
        return Ok(Reply::Unsupported(message));
    }

    if reply.contains(REPLY_ERR_PREFIX) {
        warn!(reply = %reply, "Device rejected command");
        return Ok(Reply::Device(reply));
    }

    Err(DaError::UnexpectedReply {
        expected: REPLY_OK,
        got: reply,
    })
}

enum Pending {
    Read,
    Classify(String),
    DrainProgress,
}

/// Read and classify the next nested command, acknowledging it.
///
/// Progress reports are drained transparently: every report frame up to and
/// including `OK!EOT` is acknowledged, then the following frame is resolved.
pub fn resolve_next<T: UsbTransport, O: DaObserver>(
    ctx: &mut DaContext<'_, T, O>,
) -> Result<Nested, DaError> {
    let mut pending = Pending::Read;
    loop {
        pending = match pending {
            Pending::Read => {
                ctx.state.expect(FrameExpectation::Command);
                Pending::Classify(ctx.receive_text("nested command")?)
            }
            Pending::Classify(data) => match field(&data, "command") {
                CMD_START => {
                    ctx.ack()?;
                    return Ok(Nested::Start);
                }
                CMD_DOWNLOAD_FILE => {
                    let request = DownloadRequest::from_payload(&data);
                    ctx.ack()?;
                    return Ok(Nested::Download(request));
                }
                CMD_UPLOAD_FILE => {
                    let request = UploadRequest::from_payload(&data);
                    ctx.ack()?;
                    return Ok(Nested::Upload(request));
                }
                CMD_PROGRESS_REPORT => {
                    ctx.ack()?;
                    Pending::DrainProgress
                }
                CMD_END => {
                    let result = field(&data, "result");
                    let message = field(&data, "message");
                    if result != REPLY_OK && !message.is_empty() {
                        return Ok(Nested::End(message.to_string()));
                    }
                    return Ok(Nested::End(result.to_string()));
                }
                other => {
                    debug!(command = %other, "Unhandled nested command");
                    return Ok(Nested::Other(other.to_string()));
                }
            },
            Pending::DrainProgress => {
                ctx.state.expect(FrameExpectation::ProgressDrain);
                loop {
                    let report = ctx.receive_text("progress report")?;
                    ctx.ack()?;
                    if report == REPLY_EOT {
                        break;
                    }
                    ctx.emit(DaEvent::DeviceProgress { message: report });
                }
                Pending::Read
            }
        };
    }
}

/// Resolve the next nested command and require CMD:START.
pub fn resolve_start<T: UsbTransport, O: DaObserver>(
    ctx: &mut DaContext<'_, T, O>,
) -> Result<(), DaError> {
    match resolve_next(ctx)? {
        Nested::Start => {
            ctx.state.expect(FrameExpectation::Idle);
            Ok(())
        }
        other => Err(DaError::Sequence {
            expected: CMD_START,
            got: other.command_name().to_string(),
        }),
    }
}
