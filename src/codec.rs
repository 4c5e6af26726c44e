//! Wire codec
//!
//! Every message travels as a frame: a 4-byte big-endian signed length
//! followed by that many bytes of UTF-8 JSON. Free-text fields are JSON
//! string-escaped, so quotes, commas, colons and braces inside `content`
//! survive the round trip intact.

use std::io;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::AppError;
use crate::message::Message;

/// Size of the length prefix in bytes
pub const LENGTH_PREFIX_LEN: usize = 4;

/// Largest payload accepted from a peer
pub const MAX_FRAME_LEN: usize = 1024 * 1024;

/// Serialize a message into its JSON payload (no length prefix)
pub fn encode_payload(message: &Message) -> Result<Vec<u8>, AppError> {
    Ok(serde_json::to_vec(message)?)
}

/// Parse a JSON payload (no length prefix) into a message
pub fn decode_payload(payload: &[u8]) -> Result<Message, AppError> {
    Ok(serde_json::from_slice(payload)?)
}

fn checked_payload(message: &Message) -> Result<Vec<u8>, AppError> {
    let payload = encode_payload(message)?;
    if payload.len() > MAX_FRAME_LEN {
        return Err(AppError::MessageTooLarge(payload.len()));
    }
    Ok(payload)
}

/// Check that a message fits in a single frame
pub fn ensure_fits(message: &Message) -> Result<(), AppError> {
    checked_payload(message).map(|_| ())
}

/// Encode a message as a complete frame
pub fn encode(message: &Message) -> Result<Vec<u8>, AppError> {
    let payload = checked_payload(message)?;

    let mut frame = Vec::with_capacity(LENGTH_PREFIX_LEN + payload.len());
    frame.extend_from_slice(&(payload.len() as i32).to_be_bytes());
    frame.extend_from_slice(&payload);
    Ok(frame)
}

/// Decode one complete frame
///
/// The buffer must hold exactly one length prefix and its payload.
pub fn decode(frame: &[u8]) -> Result<Message, AppError> {
    let Some((prefix, payload)) = frame.split_first_chunk::<LENGTH_PREFIX_LEN>() else {
        return Err(AppError::Malformed(format!(
            "frame of {} bytes is shorter than the length prefix",
            frame.len()
        )));
    };

    let len = check_length(i32::from_be_bytes(*prefix))?;
    if payload.len() != len {
        return Err(AppError::Malformed(format!(
            "declared length {} but frame carries {} bytes",
            len,
            payload.len()
        )));
    }

    decode_payload(payload)
}

fn check_length(len: i32) -> Result<usize, AppError> {
    if len <= 0 {
        return Err(AppError::Malformed(format!("invalid frame length: {}", len)));
    }
    let len = len as usize;
    if len > MAX_FRAME_LEN {
        return Err(AppError::Malformed(format!(
            "frame length {} exceeds limit of {}",
            len, MAX_FRAME_LEN
        )));
    }
    Ok(len)
}

/// Read one framed message from the stream
///
/// Returns `Ok(None)` when the peer closed the stream before a new frame
/// started.
pub async fn read_message<R>(reader: &mut R) -> Result<Option<Message>, AppError>
where
    R: AsyncRead + Unpin,
{
    let len = match reader.read_i32().await {
        Ok(len) => len,
        Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(err) => return Err(err.into()),
    };
    let len = check_length(len)?;

    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).await?;

    decode_payload(&payload).map(Some)
}

/// Write one framed message and flush it
pub async fn write_message<W>(writer: &mut W, message: &Message) -> Result<(), AppError>
where
    W: AsyncWrite + Unpin,
{
    let frame = encode(message)?;
    writer.write_all(&frame).await?;
    writer.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::MessageType;

    fn frame_of(payload: &[u8]) -> Vec<u8> {
        let mut frame = (payload.len() as i32).to_be_bytes().to_vec();
        frame.extend_from_slice(payload);
        frame
    }

    #[test]
    fn test_round_trip_preserves_fields() {
        let msg = Message::new(MessageType::PrivateMessage)
            .with_sender("alice")
            .with_recipient("bob")
            .with_content("hey");

        let decoded = decode(&encode(&msg).unwrap()).unwrap();
        assert_eq!(decoded, msg);
        assert!(decoded.room().is_none());
    }

    #[test]
    fn test_round_trip_escapes_structural_characters() {
        let text = r#"a "quoted", {braced}: value \ with "commas", and
newlines"#;
        let msg = Message::new(MessageType::TextMessage)
            .with_sender("bob")
            .with_room("team,\"x\":1")
            .with_content(text);

        let decoded = decode(&encode(&msg).unwrap()).unwrap();
        assert_eq!(decoded.content(), Some(text));
        assert_eq!(decoded.room(), Some("team,\"x\":1"));
    }

    #[test]
    fn test_absent_fields_are_omitted() {
        let msg = Message::new(MessageType::LoginRequest).with_content("alice");
        let payload = String::from_utf8(encode_payload(&msg).unwrap()).unwrap();

        assert!(payload.contains("\"type\":\"LOGIN_REQUEST\""));
        assert!(payload.contains("\"version\":\"1.0\""));
        assert!(payload.contains("\"content\":\"alice\""));
        assert!(!payload.contains("sender"));
        assert!(!payload.contains("recipient"));
        assert!(!payload.contains("room"));
    }

    #[test]
    fn test_empty_string_stays_empty_string() {
        let msg = Message::new(MessageType::TextMessage).with_content("");
        let decoded = decode(&encode(&msg).unwrap()).unwrap();
        assert_eq!(decoded.content(), Some(""));
        assert!(decoded.sender().is_none());
    }

    #[test]
    fn test_decode_fills_defaults_and_ignores_unknown_fields() {
        let payload = br#"{"type":"TEXT_MESSAGE","content":"hi","priority":5,"sender":null}"#;
        let msg = decode(&frame_of(payload)).unwrap();

        assert_eq!(msg.kind(), MessageType::TextMessage);
        assert_eq!(msg.version(), "1.0");
        assert!(msg.timestamp() > 0);
        assert!(msg.sender().is_none());
        assert_eq!(msg.content(), Some("hi"));
    }

    #[test]
    fn test_decode_keeps_explicit_timestamp() {
        let payload = br#"{"type":"LOGIN_RESPONSE","timestamp":1710000000000,"content":"OK"}"#;
        let msg = decode(&frame_of(payload)).unwrap();
        assert_eq!(msg.timestamp(), 1_710_000_000_000);
    }

    #[test]
    fn test_decode_rejects_missing_or_unknown_type() {
        let missing = decode(&frame_of(br#"{"content":"hi"}"#)).unwrap_err();
        assert!(missing.is_malformed());

        let unknown = decode(&frame_of(br#"{"type":"SHOUT","content":"hi"}"#)).unwrap_err();
        assert!(unknown.is_malformed());
    }

    #[test]
    fn test_decode_rejects_bad_payloads() {
        assert!(decode(&frame_of(b"not json")).unwrap_err().is_malformed());
        assert!(decode(&frame_of(&[0xff, 0xfe, 0xfd])).unwrap_err().is_malformed());
        assert!(decode(&frame_of(br#"{"type":"TEXT_MESSAGE","content":7}"#))
            .unwrap_err()
            .is_malformed());
    }

    #[test]
    fn test_decode_rejects_bad_lengths() {
        let mut zero = 0i32.to_be_bytes().to_vec();
        zero.extend_from_slice(b"{}");
        assert!(decode(&zero).unwrap_err().is_malformed());

        let negative = (-5i32).to_be_bytes().to_vec();
        assert!(decode(&negative).unwrap_err().is_malformed());

        let mut short = frame_of(br#"{"type":"TEXT_MESSAGE"}"#);
        short.pop();
        assert!(decode(&short).unwrap_err().is_malformed());

        assert!(decode(&[0, 0]).unwrap_err().is_malformed());
    }

    #[test]
    fn test_oversized_message_is_recoverable() {
        let msg = Message::new(MessageType::TextMessage).with_content("x".repeat(MAX_FRAME_LEN));

        let err = ensure_fits(&msg).unwrap_err();
        assert!(matches!(err, AppError::MessageTooLarge(len) if len > MAX_FRAME_LEN));
        assert!(!err.is_malformed());
        assert!(matches!(encode(&msg), Err(AppError::MessageTooLarge(_))));

        let small = Message::new(MessageType::TextMessage).with_content("hi");
        assert!(ensure_fits(&small).is_ok());
    }

    #[tokio::test]
    async fn test_stream_round_trip() {
        let (mut writer, mut reader) = tokio::io::duplex(1024);
        let first = Message::new(MessageType::LoginRequest).with_content("alice");
        let second = Message::new(MessageType::TextMessage).with_content("hi, \"all\"");

        write_message(&mut writer, &first).await.unwrap();
        write_message(&mut writer, &second).await.unwrap();
        drop(writer);

        assert_eq!(read_message(&mut reader).await.unwrap(), Some(first));
        assert_eq!(read_message(&mut reader).await.unwrap(), Some(second));
        assert_eq!(read_message(&mut reader).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_stream_rejects_non_positive_length() {
        let (mut writer, mut reader) = tokio::io::duplex(64);
        writer.write_all(&(-1i32).to_be_bytes()).await.unwrap();

        let err = read_message(&mut reader).await.unwrap_err();
        assert!(err.is_malformed());
    }

    #[tokio::test]
    async fn test_stream_rejects_oversized_frame() {
        let (mut writer, mut reader) = tokio::io::duplex(64);
        writer
            .write_all(&((MAX_FRAME_LEN as i32) + 1).to_be_bytes())
            .await
            .unwrap();

        let err = read_message(&mut reader).await.unwrap_err();
        assert!(err.is_malformed());
    }

    #[tokio::test]
    async fn test_stream_eof_mid_frame_is_io_error() {
        let (mut writer, mut reader) = tokio::io::duplex(64);
        writer.write_all(&10i32.to_be_bytes()).await.unwrap();
        writer.write_all(b"{\"ty").await.unwrap();
        drop(writer);

        let err = read_message(&mut reader).await.unwrap_err();
        assert!(matches!(err, AppError::Io(_)));
    }
}
