//! Connection handler
//!
//! Drives one client connection: reads framed messages, dispatches them to
//! the router, delivers the resulting directives, and cleans up the registry
//! when the connection ends.

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::codec;
use crate::error::AppError;
use crate::message::{Message, MessageType};
use crate::router::{Outbound, Router};
use crate::session::{Session, SessionRef, OUTBOUND_BUFFER};
use crate::shutdown::Shutdown;
use crate::types::SessionId;

/// How long teardown waits for queued replies to be flushed
const WRITER_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Handle a new client stream
///
/// The stream is already secured (or deliberately plaintext); this function
/// only speaks the framed protocol. It returns once the peer disconnects,
/// the stream fails, or shutdown is requested.
pub async fn handle_connection<S>(
    stream: S,
    peer: String,
    router: Arc<Router>,
    mut shutdown: Shutdown,
) -> Result<(), AppError>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let (reader, writer) = tokio::io::split(stream);
    let mut reader = BufReader::new(reader);

    // Server -> client queue; the write task is its only consumer
    let (msg_tx, msg_rx) = mpsc::channel::<Message>(OUTBOUND_BUFFER);
    let mut session = Session::new(msg_tx);
    let session_id = session.id();
    info!("Session {} connected from {}", session_id, peer);

    let write_task = tokio::spawn(write_loop(writer, msg_rx, session_id));

    let result = read_loop(&mut reader, &mut session, &router, &mut shutdown).await;

    match &result {
        Ok(()) => {}
        Err(err) if err.is_malformed() => {
            warn!("Session {} sent a malformed frame: {}", session.display_name(), err);
            // No resync after a framing error; tell the peer why before closing
            let notice = Message::new(MessageType::ErrorResponse).with_content(err.to_string());
            if let Err(send_err) = session.handle().try_deliver(notice) {
                debug!("Malformed-frame notice for {} not delivered: {}", session_id, send_err);
            }
        }
        Err(err) => {
            warn!("Session {} connection error: {}", session.display_name(), err);
        }
    }

    let notices = router.disconnect(&mut session).await;
    if let Err(err) = dispatch(session.handle(), notices).await {
        debug!("Leave notice for {} not fully delivered: {}", session_id, err);
    }

    // Dropping the session releases the last sender once the registry has
    // let go of its handles, which ends the write task.
    drop(session);
    let abort = write_task.abort_handle();
    if tokio::time::timeout(WRITER_DRAIN_TIMEOUT, write_task)
        .await
        .is_err()
    {
        debug!("Write task for {} did not drain in time", session_id);
        abort.abort();
    }

    info!("Session {} disconnected", session_id);
    result
}

async fn read_loop<R>(
    reader: &mut R,
    session: &mut Session,
    router: &Router,
    shutdown: &mut Shutdown,
) -> Result<(), AppError>
where
    R: AsyncRead + Unpin,
{
    loop {
        if shutdown.is_triggered() {
            debug!("Shutdown requested, closing session {}", session.id());
            return Ok(());
        }

        let next = tokio::select! {
            _ = shutdown.recv() => {
                debug!("Shutdown requested, closing session {}", session.id());
                return Ok(());
            }
            next = codec::read_message(reader) => next?,
        };

        let Some(msg) = next else {
            debug!("Session {} closed the stream", session.display_name());
            return Ok(());
        };

        debug!("Session {} sent {}", session.display_name(), msg.kind());
        let outbound = router.handle(session, msg).await;

        // A reply can wait on a full queue while the peer stops reading
        tokio::select! {
            _ = shutdown.recv() => {
                debug!("Shutdown requested during delivery, closing session {}", session.id());
                return Ok(());
            }
            result = dispatch(session.handle(), outbound) => result?,
        }
    }
}

/// Execute router directives in order
///
/// Replies go to the initiating session and fail the connection if its own
/// queue is gone. Deliveries to other sessions are best effort.
pub async fn dispatch(own: &SessionRef, outbound: Vec<Outbound>) -> Result<(), AppError> {
    for directive in outbound {
        match directive {
            Outbound::Reply(msg) => own.send(msg).await?,
            Outbound::Direct(target, msg) => deliver(&target, msg),
            Outbound::Broadcast(members, msg) => {
                for member in &members {
                    deliver(member, msg.clone());
                }
            }
        }
    }
    Ok(())
}

fn deliver(target: &SessionRef, msg: Message) {
    if let Err(err) = target.try_deliver(msg) {
        warn!("Failed to deliver to session {}: {}", target.id(), err);
    }
}

/// Write task: drains the outbound queue onto the stream
async fn write_loop<W>(mut writer: W, mut msg_rx: mpsc::Receiver<Message>, session_id: SessionId)
where
    W: AsyncWrite + Unpin,
{
    while let Some(msg) = msg_rx.recv().await {
        match codec::write_message(&mut writer, &msg).await {
            Ok(()) => {}
            Err(AppError::Io(err)) => {
                debug!("Write to session {} failed: {}", session_id, err);
                break;
            }
            // Nothing reached the stream, so the next message can still go out
            Err(err) => {
                warn!("Dropped {} for session {}: {}", msg.kind(), session_id, err);
            }
        }
    }

    let _ = writer.shutdown().await;
    debug!("Write task ended for {}", session_id);
}
