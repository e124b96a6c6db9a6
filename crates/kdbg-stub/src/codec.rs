//! Debug-stub wire framing.
//!
//! Commands are `[opcode][sequence][payload]`; notifications are
//! `[opcode][payload]`. All integers are little endian.

use crate::error::StubError;
use crate::protocol::{command_op, notification_op, Notification, StubCommand};

/// Largest payload accepted in a length-prefixed notification.
pub const MAX_PAYLOAD_LEN: usize = 16 * 1024 * 1024;

/// Encode a command with the given sequence number.
pub fn encode_command(command: &StubCommand, sequence: u8) -> Vec<u8> {
    let mut buf = Vec::with_capacity(7);
    buf.push(command.opcode());
    buf.push(sequence);
    match *command {
        StubCommand::SetBreakpoint { slot, address } => {
            buf.extend_from_slice(&address.to_le_bytes());
            buf.push(slot);
        }
        StubCommand::DeleteBreakpoint { slot } => {
            buf.extend_from_slice(&0u32.to_le_bytes());
            buf.push(slot);
        }
        StubCommand::SetRawTrap(address)
        | StubCommand::ClearRawTrap(address)
        | StubCommand::SetAsmBreak(address) => {
            buf.extend_from_slice(&address.to_le_bytes());
        }
        _ => {}
    }
    buf
}

/// Decode the command at the start of `data`.
///
/// Returns `Ok(None)` when more bytes are needed.
pub fn decode_command(data: &[u8]) -> Result<Option<(StubCommand, u8, usize)>, StubError> {
    if data.len() < 2 {
        return Ok(None);
    }
    let (opcode, sequence) = (data[0], data[1]);
    let body = &data[2..];
    let simple = |cmd: StubCommand| Ok(Some((cmd, sequence, 2)));
    match opcode {
        command_op::CONTINUE => simple(StubCommand::Continue),
        command_op::BREAK => simple(StubCommand::Break),
        command_op::STEP_INTO => simple(StubCommand::StepInto),
        command_op::STEP_OVER => simple(StubCommand::StepOver),
        command_op::STEP_OUT => simple(StubCommand::StepOut),
        command_op::ASM_STEP_INTO => simple(StubCommand::AsmStepInto),
        command_op::PING => simple(StubCommand::Ping),
        command_op::BATCH_END => simple(StubCommand::BatchEnd),
        command_op::SEND_REGISTERS => simple(StubCommand::RequestRegisters),
        command_op::SEND_FRAME => simple(StubCommand::RequestFrame),
        command_op::SEND_STACK => simple(StubCommand::RequestStack),
        command_op::BREAK_ON_ADDRESS => {
            let Some(address) = read_u32(body) else {
                return Ok(None);
            };
            let Some(&slot) = body.get(4) else {
                return Ok(None);
            };
            let cmd = if address == 0 {
                StubCommand::DeleteBreakpoint { slot }
            } else {
                StubCommand::SetBreakpoint { slot, address }
            };
            Ok(Some((cmd, sequence, 7)))
        }
        command_op::SET_INT3 | command_op::CLEAR_INT3 | command_op::SET_ASM_BREAK => {
            let Some(address) = read_u32(body) else {
                return Ok(None);
            };
            let cmd = match opcode {
                command_op::SET_INT3 => StubCommand::SetRawTrap(address),
                command_op::CLEAR_INT3 => StubCommand::ClearRawTrap(address),
                _ => StubCommand::SetAsmBreak(address),
            };
            Ok(Some((cmd, sequence, 6)))
        }
        other => Err(StubError::Malformed(format!("unknown command opcode {other}"))),
    }
}

/// Encode a notification as the stub would send it.
///
/// `Connected` and `ConnectionLost` never travel over the wire and encode
/// to nothing.
pub fn encode_notification(notification: &Notification) -> Vec<u8> {
    let mut buf = Vec::new();
    match notification {
        Notification::Connected | Notification::ConnectionLost(_) => {}
        Notification::Started => buf.push(notification_op::STARTED),
        Notification::Break(address) => push_u32(&mut buf, notification_op::BREAK, *address),
        Notification::Trace(value) => push_u32(&mut buf, notification_op::TRACE, *value),
        Notification::StackCorruption(address) => {
            push_u32(&mut buf, notification_op::STACK_CORRUPTION, *address)
        }
        Notification::NullReference(address) => {
            push_u32(&mut buf, notification_op::NULL_REFERENCE, *address)
        }
        Notification::Registers(bytes) => push_blob(&mut buf, notification_op::REGISTERS, bytes),
        Notification::Frame(bytes) => push_blob(&mut buf, notification_op::FRAME, bytes),
        Notification::Stack(bytes) => push_blob(&mut buf, notification_op::STACK, bytes),
        Notification::Pong(bytes) => push_blob(&mut buf, notification_op::PONG, bytes),
        Notification::Text(text) => push_blob(&mut buf, notification_op::TEXT, text.as_bytes()),
        Notification::MessageBox(text) => {
            push_blob(&mut buf, notification_op::MESSAGE_BOX, text.as_bytes())
        }
        Notification::CommandCompleted(seq) => {
            buf.push(notification_op::COMMAND_COMPLETED);
            buf.push(*seq);
        }
        Notification::Channel {
            channel,
            command,
            payload,
        } => {
            buf.push(*channel);
            buf.push(*command);
            buf.extend_from_slice(&(payload.len() as u32).to_le_bytes());
            buf.extend_from_slice(payload);
        }
        Notification::Unrecognized(op) => buf.push(*op),
    }
    buf
}

/// Decode the notification at the start of `data`.
///
/// Returns the notification and the number of bytes consumed, or `Ok(None)`
/// if the buffer does not yet hold a complete notification. A byte that
/// starts no known notification decodes to [`Notification::Unrecognized`]
/// and consumes only itself.
pub fn decode_notification(data: &[u8]) -> Result<Option<(Notification, usize)>, StubError> {
    let Some(&opcode) = data.first() else {
        return Ok(None);
    };
    let body = &data[1..];

    if opcode >= notification_op::CHANNEL_BASE {
        return decode_channel(opcode, body);
    }

    match opcode {
        notification_op::STARTED => Ok(Some((Notification::Started, 1))),
        notification_op::COMMAND_COMPLETED => Ok(body
            .first()
            .map(|&seq| (Notification::CommandCompleted(seq), 2))),
        notification_op::BREAK => Ok(read_u32(body).map(|a| (Notification::Break(a), 5))),
        notification_op::TRACE => Ok(read_u32(body).map(|v| (Notification::Trace(v), 5))),
        notification_op::STACK_CORRUPTION => {
            Ok(read_u32(body).map(|a| (Notification::StackCorruption(a), 5)))
        }
        notification_op::NULL_REFERENCE => {
            Ok(read_u32(body).map(|a| (Notification::NullReference(a), 5)))
        }
        notification_op::REGISTERS => Ok(read_blob(body).map(|(b, n)| (Notification::Registers(b), n + 1))),
        notification_op::FRAME => Ok(read_blob(body).map(|(b, n)| (Notification::Frame(b), n + 1))),
        notification_op::STACK => Ok(read_blob(body).map(|(b, n)| (Notification::Stack(b), n + 1))),
        notification_op::PONG => Ok(read_blob(body).map(|(b, n)| (Notification::Pong(b), n + 1))),
        notification_op::TEXT => Ok(read_blob(body)
            .map(|(b, n)| (Notification::Text(String::from_utf8_lossy(&b).into_owned()), n + 1))),
        notification_op::MESSAGE_BOX => Ok(read_blob(body).map(|(b, n)| {
            (
                Notification::MessageBox(String::from_utf8_lossy(&b).into_owned()),
                n + 1,
            )
        })),
        other => Ok(Some((Notification::Unrecognized(other), 1))),
    }
}

/// Decode a side-channel packet: `[channel][command][u32 len][payload]`.
fn decode_channel(channel: u8, body: &[u8]) -> Result<Option<(Notification, usize)>, StubError> {
    let Some(&command) = body.first() else {
        return Ok(None);
    };
    let Some(len) = read_u32(&body[1..]) else {
        return Ok(None);
    };
    let len = len as usize;
    if len > MAX_PAYLOAD_LEN {
        return Err(StubError::Malformed(format!(
            "channel {channel:#04x} payload of {len} bytes exceeds limit"
        )));
    }
    let start = 5;
    if body.len() < start + len {
        return Ok(None);
    }
    let payload = body[start..start + len].to_vec();
    Ok(Some((
        Notification::Channel {
            channel,
            command,
            payload,
        },
        1 + start + len,
    )))
}

fn push_u32(buf: &mut Vec<u8>, opcode: u8, value: u32) {
    buf.push(opcode);
    buf.extend_from_slice(&value.to_le_bytes());
}

fn push_blob(buf: &mut Vec<u8>, opcode: u8, bytes: &[u8]) {
    buf.push(opcode);
    let len = bytes.len().min(u16::MAX as usize);
    buf.extend_from_slice(&(len as u16).to_le_bytes());
    buf.extend_from_slice(&bytes[..len]);
}

fn read_u32(data: &[u8]) -> Option<u32> {
    let bytes: [u8; 4] = data.get(..4)?.try_into().ok()?;
    Some(u32::from_le_bytes(bytes))
}

/// Read a `u16`-length-prefixed blob. Returns the bytes and the total
/// number of bytes consumed including the prefix.
fn read_blob(data: &[u8]) -> Option<(Vec<u8>, usize)> {
    let prefix: [u8; 2] = data.get(..2)?.try_into().ok()?;
    let len = u16::from_le_bytes(prefix) as usize;
    let bytes = data.get(2..2 + len)?;
    Some((bytes.to_vec(), 2 + len))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_set_breakpoint_layout() {
        let bytes = encode_command(
            &StubCommand::SetBreakpoint {
                slot: 7,
                address: 0x0040_1000,
            },
            3,
        );
        assert_eq!(bytes, vec![6, 3, 0x00, 0x10, 0x40, 0x00, 7]);
    }

    #[test]
    fn encode_delete_breakpoint_uses_zero_address() {
        let bytes = encode_command(&StubCommand::DeleteBreakpoint { slot: 2 }, 9);
        assert_eq!(bytes, vec![6, 9, 0, 0, 0, 0, 2]);
    }

    #[test]
    fn encode_simple_command_is_two_bytes() {
        assert_eq!(encode_command(&StubCommand::Continue, 1), vec![4, 1]);
        assert_eq!(encode_command(&StubCommand::AsmStepInto, 2), vec![18, 2]);
    }

    #[test]
    fn decode_command_reads_back_trap() {
        let bytes = encode_command(&StubCommand::ClearRawTrap(0xDEAD_BEEF), 4);
        let (cmd, seq, used) = decode_command(&bytes).unwrap().unwrap();
        assert_eq!(cmd, StubCommand::ClearRawTrap(0xDEAD_BEEF));
        assert_eq!(seq, 4);
        assert_eq!(used, bytes.len());
    }

    #[test]
    fn decode_command_incomplete() {
        assert!(decode_command(&[6, 1, 0x10]).unwrap().is_none());
        assert!(decode_command(&[4]).unwrap().is_none());
    }

    #[test]
    fn decode_command_unknown_opcode() {
        let err = decode_command(&[99, 0]).unwrap_err();
        assert!(err.to_string().contains("unknown command opcode 99"), "got: {err}");
    }

    #[test]
    fn decode_break_notification() {
        let (n, used) = decode_notification(&[3, 0x10, 0x40, 0, 0]).unwrap().unwrap();
        assert_eq!(n, Notification::Break(0x4010));
        assert_eq!(used, 5);
    }

    #[test]
    fn decode_text_is_lossy_utf8() {
        let data = [2, 3, 0, b'o', 0xFF, b'k'];
        let (n, used) = decode_notification(&data).unwrap().unwrap();
        assert_eq!(n, Notification::Text("o\u{FFFD}k".into()));
        assert_eq!(used, data.len());
    }

    #[test]
    fn decode_incomplete_blob_waits() {
        // Registers header claims 40 bytes, only 3 present.
        let data = [10, 40, 0, 1, 2, 3];
        assert!(decode_notification(&data).unwrap().is_none());
    }

    #[test]
    fn decode_unrecognized_consumes_one_byte() {
        let (n, used) = decode_notification(&[0x42, 3, 0, 0, 0, 0]).unwrap().unwrap();
        assert_eq!(n, Notification::Unrecognized(0x42));
        assert_eq!(used, 1);
    }

    #[test]
    fn decode_channel_packet() {
        let data = [0x81, 0x02, 3, 0, 0, 0, 9, 8, 7];
        let (n, used) = decode_notification(&data).unwrap().unwrap();
        assert_eq!(
            n,
            Notification::Channel {
                channel: 0x81,
                command: 2,
                payload: vec![9, 8, 7],
            }
        );
        assert_eq!(used, data.len());
    }

    #[test]
    fn decode_channel_rejects_oversized_payload() {
        let data = [0x90, 0x00, 0xFF, 0xFF, 0xFF, 0xFF];
        let err = decode_notification(&data).unwrap_err();
        assert!(err.to_string().contains("exceeds limit"), "got: {err}");
    }

    #[test]
    fn decode_back_to_back_notifications() {
        let mut buf = encode_notification(&Notification::Started);
        buf.extend(encode_notification(&Notification::Trace(77)));
        buf.extend(encode_notification(&Notification::MessageBox("hi".into())));

        let (first, a) = decode_notification(&buf).unwrap().unwrap();
        let (second, b) = decode_notification(&buf[a..]).unwrap().unwrap();
        let (third, c) = decode_notification(&buf[a + b..]).unwrap().unwrap();
        assert_eq!(first, Notification::Started);
        assert_eq!(second, Notification::Trace(77));
        assert_eq!(third, Notification::MessageBox("hi".into()));
        assert_eq!(a + b + c, buf.len());
    }

    #[test]
    fn local_notifications_encode_to_nothing() {
        assert!(encode_notification(&Notification::Connected).is_empty());
        assert!(encode_notification(&Notification::ConnectionLost("eof".into())).is_empty());
    }
}
