//! Fixed-size binary records exchanged over the notification FIFOs.
//!
//! A command record is 144 bytes, little endian:
//!
//! | offset | size | field        |
//! |--------|------|--------------|
//! | 0      | 4    | pid          |
//! | 4      | 4    | handle id    |
//! | 8      | 4    | focus type   |
//! | 12     | 4    | state (1 acquired, 0 released) |
//! | 16     | 64   | stream type, NUL padded |
//! | 80     | 64   | option name, NUL padded |
//!
//! A result record is one little-endian `u32`: bits 0..=29 carry the echoed
//! handle id, bit 30 the by-session flag and bit 31 the auto-reacquire flag.

use bytes::{Buf, BufMut, BytesMut};
use focusd_core::{Ack, FocusNotice, FocusState, FocusType, MAX_NAME_LEN, NotifyError, NotifyResult};
use tokio_util::codec::{Decoder, Encoder};

/// Size of a command record.
pub const COMMAND_LEN: usize = 16 + 2 * NAME_FIELD_LEN;

/// Size of a result record.
pub const RESULT_LEN: usize = 4;

const NAME_FIELD_LEN: usize = MAX_NAME_LEN + 1;
const HANDLE_MASK: u32 = (1 << 30) - 1;
const BY_SESSION_BIT: u32 = 1 << 30;
const REACQUIRE_BIT: u32 = 1 << 31;

/// Codec for command records.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoticeCodec;

impl Encoder<&FocusNotice> for NoticeCodec {
    type Error = NotifyError;

    fn encode(&mut self, notice: &FocusNotice, dst: &mut BytesMut) -> NotifyResult<()> {
        dst.reserve(COMMAND_LEN);
        dst.put_i32_le(notice.pid);
        dst.put_i32_le(notice.handle_id);
        dst.put_i32_le(i32::from(notice.focus_type.bits()));
        dst.put_i32_le(match notice.state {
            FocusState::Released => 0,
            FocusState::Acquired => 1,
        });
        put_name(dst, &notice.stream_type)?;
        put_name(dst, &notice.option_name)?;
        Ok(())
    }
}

impl Decoder for NoticeCodec {
    type Item = FocusNotice;
    type Error = NotifyError;

    fn decode(&mut self, src: &mut BytesMut) -> NotifyResult<Option<FocusNotice>> {
        if src.len() < COMMAND_LEN {
            src.reserve(COMMAND_LEN - src.len());
            return Ok(None);
        }

        let mut record = src.split_to(COMMAND_LEN);
        let pid = record.get_i32_le();
        let handle_id = record.get_i32_le();
        let raw_type = record.get_i32_le();
        let focus_type = u8::try_from(raw_type)
            .ok()
            .and_then(|bits| FocusType::from_bits(bits).ok())
            .ok_or_else(|| NotifyError::Malformed(format!("focus type {raw_type}")))?;
        let state = match record.get_i32_le() {
            0 => FocusState::Released,
            1 => FocusState::Acquired,
            other => return Err(NotifyError::Malformed(format!("state {other}"))),
        };
        let stream_type = take_name(&mut record)?;
        let option_name = take_name(&mut record)?;

        Ok(Some(FocusNotice { pid, handle_id, focus_type, state, stream_type, option_name }))
    }
}

fn put_name(dst: &mut BytesMut, name: &str) -> NotifyResult<()> {
    if name.len() > MAX_NAME_LEN || name.contains('\0') {
        return Err(NotifyError::Malformed(format!("name does not fit a record: {name:?}")));
    }
    dst.put_slice(name.as_bytes());
    dst.put_bytes(0, NAME_FIELD_LEN - name.len());
    Ok(())
}

fn take_name(src: &mut BytesMut) -> NotifyResult<String> {
    let field = src.split_to(NAME_FIELD_LEN);
    let end = field
        .iter()
        .position(|&b| b == 0)
        .ok_or_else(|| NotifyError::Malformed("unterminated name field".to_string()))?;
    String::from_utf8(field[..end].to_vec()).map_err(|e| NotifyError::Malformed(e.to_string()))
}

/// Codec for result records.
#[derive(Debug, Default, Clone, Copy)]
pub struct AckCodec;

impl Encoder<Ack> for AckCodec {
    type Error = NotifyError;

    fn encode(&mut self, ack: Ack, dst: &mut BytesMut) -> NotifyResult<()> {
        let handle = u32::try_from(ack.handle_id)
            .ok()
            .filter(|h| *h <= HANDLE_MASK)
            .ok_or_else(|| {
                NotifyError::Malformed(format!("handle {} out of range", ack.handle_id))
            })?;

        let mut raw = handle;
        if ack.by_session {
            raw |= BY_SESSION_BIT;
        }
        if ack.auto_reacquire {
            raw |= REACQUIRE_BIT;
        }
        dst.put_u32_le(raw);
        Ok(())
    }
}

impl Decoder for AckCodec {
    type Item = Ack;
    type Error = NotifyError;

    fn decode(&mut self, src: &mut BytesMut) -> NotifyResult<Option<Ack>> {
        if src.len() < RESULT_LEN {
            return Ok(None);
        }
        let raw = src.get_u32_le();
        let handle_id = i32::try_from(raw & HANDLE_MASK)
            .map_err(|e| NotifyError::Malformed(e.to_string()))?;

        Ok(Some(Ack {
            handle_id,
            auto_reacquire: raw & REACQUIRE_BIT != 0,
            by_session: raw & BY_SESSION_BIT != 0,
        }))
    }
}
