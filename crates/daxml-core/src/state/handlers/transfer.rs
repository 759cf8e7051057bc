//! Chunked data transfers.
//!
//! Direction names follow the device: a DOWNLOAD-FILE request makes the host
//! upload, an UPLOAD-FILE request makes the host download.

use tracing::{debug, info, warn};

use crate::error::DaError;
use crate::events::{DaEvent, DaObserver};
use crate::payload::{ChunkState, DownloadRequest, UploadRequest};
use crate::protocol::constants::*;
use crate::protocol::{DataType, parse_hex_u64};
use crate::state::machine::FrameExpectation;
use crate::transport::{Payload, UsbTransport};

use super::DaContext;
use super::dispatch::{Nested, Reply, resolve_next, resolve_start, send_command};

/// Acknowledgments sent after the END that closes a device-to-host transfer.
///
/// Partition table reads are answered with two; everything else with one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckCadence {
    Single,
    Double,
}

impl AckCadence {
    fn count(self) -> usize {
        match self {
            AckCadence::Single => 1,
            AckCadence::Double => 2,
        }
    }
}

/// Push `data` to the device in answer to a DOWNLOAD-FILE request.
///
/// Exactly the declared length is sent, split into packet-length chunks.
/// The command's END/OK and the following START are consumed before returning.
pub fn upload<T: UsbTransport, O: DaObserver>(
    ctx: &mut DaContext<'_, T, O>,
    request: &DownloadRequest,
    data: &[u8],
) -> Result<(), DaError> {
    let length = request
        .source
        .length()
        .ok_or_else(|| DaError::BadDescriptor(request.source.to_string()))?;
    if request.packet_length == 0 {
        return Err(DaError::BadPacketLength(format!(
            "0x{:x}",
            request.packet_length
        )));
    }
    if (data.len() as u64) < length {
        return Err(DaError::ImageTooShort {
            expected: length,
            actual: data.len() as u64,
        });
    }

    info!(
        info = %request.info,
        length = format!("0x{:x}", length),
        packet = format!("0x{:x}", request.packet_length),
        "Uploading data"
    );

    ctx.link.ack_value(length)?;
    ctx.expect_reply(REPLY_OK, "upload length confirmation")?;

    let mut chunks = ChunkState::new(length as usize, request.packet_length as usize);
    ctx.state.begin_transfer(length);
    while let Some(chunk) = chunks.next_chunk(data) {
        let position = chunks.offset - chunk.len();
        ctx.link.ack_value(0)?;
        ctx.link.send(Payload::Bytes(chunk), DataType::ProtocolFlow)?;
        let reply = ctx.receive_text("upload chunk status")?;
        if reply != REPLY_OK {
            warn!(
                position = format!("0x{:x}", position),
                reply = %reply,
                "Chunk rejected"
            );
            return Err(DaError::UnexpectedReply {
                expected: REPLY_OK,
                got: reply,
            });
        }
        ctx.state.advance_transfer(chunk.len() as u64);
        debug!(
            pct = chunks.progress_pct(),
            "Chunk {}/{}: {} bytes",
            chunks.current,
            chunks.total,
            chunk.len()
        );
        ctx.emit(DaEvent::Progress {
            phase: ctx.state.phase,
            operation: request.info.clone(),
            current: ctx.state.transferred,
            total: length,
        });
    }

    match resolve_next(ctx)? {
        Nested::End(result) if result == REPLY_OK => {}
        Nested::End(message) => return Err(DaError::Device(message)),
        other => {
            return Err(DaError::Sequence {
                expected: CMD_END,
                got: other.command_name().to_string(),
            });
        }
    }
    ctx.ack()?;
    resolve_start(ctx)?;
    ctx.state.finish_transfer();
    Ok(())
}

/// Pull the data announced by an UPLOAD-FILE request.
///
/// The device first states the length as `OK@0x<len>`, then "OK"; both are
/// acknowledged. Data frames are acknowledged one by one until the stated
/// length is reached. The command's END is left for the caller.
pub fn download<T: UsbTransport, O: DaObserver>(
    ctx: &mut DaContext<'_, T, O>,
    request: &UploadRequest,
) -> Result<Vec<u8>, DaError> {
    let announce = ctx.receive_text("download length")?;
    let total = announce
        .find(REPLY_VALUE_PREFIX)
        .and_then(|pos| parse_hex_u64(&announce[pos + REPLY_VALUE_PREFIX.len()..]))
        .ok_or_else(|| DaError::Download(announce.clone()))?;
    ctx.ack()?;

    let confirm = ctx.receive_text("download confirmation")?;
    if confirm != REPLY_OK {
        return Err(DaError::Download(confirm));
    }
    ctx.ack()?;

    debug!(
        info = %request.info,
        length = format!("0x{:x}", total),
        "Downloading data"
    );

    let mut buffer = Vec::with_capacity(total.min(RESPONSE_WINDOW) as usize);
    ctx.state.begin_transfer(total);
    ctx.state.expect(FrameExpectation::TransferData);
    while (buffer.len() as u64) < total {
        let chunk = ctx.link.receive_bytes();
        if chunk.is_empty() {
            return Err(DaError::FrameRead {
                context: "download data",
            });
        }
        let remaining = (total - buffer.len() as u64) as usize;
        if chunk.len() > remaining {
            warn!(
                extra = chunk.len() - remaining,
                "Device sent more than announced, truncating"
            );
            buffer.extend_from_slice(&chunk[..remaining]);
        } else {
            buffer.extend_from_slice(&chunk);
        }
        ctx.ack()?;
        ctx.state.advance_transfer(chunk.len().min(remaining) as u64);
        ctx.emit(DaEvent::Progress {
            phase: ctx.state.phase,
            operation: request.info.clone(),
            current: buffer.len() as u64,
            total,
        });
    }
    ctx.state.finish_transfer();
    Ok(buffer)
}

/// Send a command whose answer arrives through an UPLOAD-FILE request and
/// collect that answer.
///
/// Returns `None` when the device declines the command.
pub(crate) fn fetch_via_upload<T: UsbTransport, O: DaObserver>(
    ctx: &mut DaContext<'_, T, O>,
    xml: &str,
    cadence: AckCadence,
) -> Result<Option<Vec<u8>>, DaError> {
    match send_command(ctx, xml, true)? {
        Reply::Acknowledged => {}
        Reply::Unsupported(message) => {
            debug!(message = %message, "Command declined");
            return Ok(None);
        }
        Reply::Device(message) => return Err(DaError::Device(message)),
        other => {
            return Err(DaError::UnexpectedReply {
                expected: REPLY_OK,
                got: format!("{:?}", other),
            });
        }
    }

    let request = match resolve_next(ctx)? {
        Nested::Upload(request) => request,
        Nested::End(message) if message.contains(UNSUPPORTED_MARKER) => {
            debug!(message = %message, "Command declined");
            return Ok(None);
        }
        Nested::End(message) => return Err(DaError::Device(message)),
        other => {
            return Err(DaError::Sequence {
                expected: CMD_UPLOAD_FILE,
                got: other.command_name().to_string(),
            });
        }
    };

    let data = download(ctx, &request)?;

    let end = resolve_next(ctx)?;
    for _ in 0..cadence.count() {
        ctx.ack()?;
    }
    match end {
        Nested::End(result) if result == REPLY_OK => {}
        Nested::End(message) => return Err(DaError::Device(message)),
        other => {
            return Err(DaError::Sequence {
                expected: CMD_END,
                got: other.command_name().to_string(),
            });
        }
    }
    resolve_start(ctx)?;
    Ok(Some(data))
}
