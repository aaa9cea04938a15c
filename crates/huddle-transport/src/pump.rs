//! Per-connection read and write pumps.
//!
//! Every connection runs two independent tasks:
//!
//! - the **read pump** decodes client frames and submits them to the hub,
//!   and asks the hub to unregister the client when the socket dies or
//!   goes idle;
//! - the **write pump** drains the client's outbound queue to the socket
//!   and sends keepalive pings. It stops only when the hub closes the
//!   queue or a write fails.

use crate::frame::{TransportError, WireFrame};
use bytes::Bytes;
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use huddle_core::{ClientKey, ClientSession, HubHandle, RoomId};
use huddle_protocol::{codec, Envelope, ProtocolError, MAX_FRAME_SIZE};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, trace, warn};

/// Time allowed to write a frame.
pub const WRITE_WAIT: Duration = Duration::from_secs(10);

/// Time allowed between pongs before the connection is considered dead.
pub const PONG_WAIT: Duration = Duration::from_secs(60);

/// Pump timing and size limits.
#[derive(Debug, Clone)]
pub struct PumpConfig {
    /// Deadline for each write.
    pub write_wait: Duration,
    /// Idle-read deadline, refreshed by each pong.
    pub pong_wait: Duration,
    /// Keepalive ping interval. Must be shorter than `pong_wait`.
    pub ping_period: Duration,
    /// Maximum inbound frame size in bytes.
    pub max_message_size: usize,
}

impl PumpConfig {
    /// Build a config whose ping period is 9/10 of `pong_wait`.
    #[must_use]
    pub fn new(write_wait: Duration, pong_wait: Duration, max_message_size: usize) -> Self {
        Self {
            write_wait,
            pong_wait,
            ping_period: pong_wait * 9 / 10,
            max_message_size,
        }
    }
}

impl Default for PumpConfig {
    fn default() -> Self {
        Self::new(WRITE_WAIT, PONG_WAIT, MAX_FRAME_SIZE)
    }
}

/// Who a connection belongs to. Attached to every inbound message.
#[derive(Debug, Clone)]
pub struct Identity {
    /// Registry handle.
    pub key: ClientKey,
    /// Verified user id.
    pub user_id: String,
    /// Room joined at connection time.
    pub room: RoomId,
}

/// Why a read pump stopped.
#[derive(Debug)]
pub enum DisconnectReason {
    /// The peer closed the socket.
    Closed,
    /// No pong arrived within the idle-read deadline.
    IdleTimeout,
    /// A frame could not be decoded.
    Decode(ProtocolError),
    /// The socket failed.
    Transport(TransportError),
    /// The hub is no longer running.
    HubClosed,
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DisconnectReason::Closed => f.write_str("closed by peer"),
            DisconnectReason::IdleTimeout => f.write_str("idle timeout"),
            DisconnectReason::Decode(e) => write!(f, "decode error: {e}"),
            DisconnectReason::Transport(e) => write!(f, "transport error: {e}"),
            DisconnectReason::HubClosed => f.write_str("hub stopped"),
        }
    }
}

/// A registered client ready to be attached to a socket.
pub struct Connection {
    identity: Identity,
    outbound: mpsc::Receiver<Arc<Envelope>>,
    hub: HubHandle,
    config: PumpConfig,
}

impl Connection {
    /// Wrap a session returned by [`HubHandle::join`].
    #[must_use]
    pub fn new(session: ClientSession, hub: HubHandle, config: PumpConfig) -> Self {
        let ClientSession {
            key,
            user_id,
            room,
            outbound,
        } = session;

        Self {
            identity: Identity { key, user_id, room },
            outbound,
            hub,
            config,
        }
    }

    /// The connection's identity.
    #[must_use]
    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// Start both pumps.
    ///
    /// The write pump is spawned; the read pump runs on the caller's task
    /// and its exit reason is returned.
    pub async fn run<K, S>(self, sink: K, stream: S) -> DisconnectReason
    where
        K: Sink<WireFrame, Error = TransportError> + Unpin + Send + 'static,
        S: Stream<Item = Result<WireFrame, TransportError>> + Unpin,
    {
        let Self {
            identity,
            outbound,
            hub,
            config,
        } = self;

        let key = identity.key;
        let write_config = config.clone();
        tokio::spawn(async move {
            match write_pump(sink, outbound, &write_config).await {
                Ok(()) => debug!(client = %key, "Write pump finished"),
                Err(e) => warn!(client = %key, error = %e, "Write pump failed"),
            }
        });

        read_pump(stream, &identity, &hub, &config).await
    }
}

/// Read frames until the socket dies, then ask the hub to unregister.
pub async fn read_pump<S>(
    mut stream: S,
    identity: &Identity,
    hub: &HubHandle,
    config: &PumpConfig,
) -> DisconnectReason
where
    S: Stream<Item = Result<WireFrame, TransportError>> + Unpin,
{
    let reason = read_frames(&mut stream, identity, hub, config).await;

    match &reason {
        DisconnectReason::Closed | DisconnectReason::IdleTimeout | DisconnectReason::HubClosed => {
            debug!(client = %identity.key, user = %identity.user_id, reason = %reason, "Read pump stopped");
        }
        DisconnectReason::Decode(_) | DisconnectReason::Transport(_) => {
            warn!(client = %identity.key, user = %identity.user_id, reason = %reason, "Read pump stopped");
        }
    }

    hub.leave(identity.key);
    drop(stream);
    reason
}

async fn read_frames<S>(
    stream: &mut S,
    identity: &Identity,
    hub: &HubHandle,
    config: &PumpConfig,
) -> DisconnectReason
where
    S: Stream<Item = Result<WireFrame, TransportError>> + Unpin,
{
    let mut deadline = Instant::now() + config.pong_wait;

    loop {
        let frame = match tokio::time::timeout_at(deadline, stream.next()).await {
            Err(_) => return DisconnectReason::IdleTimeout,
            Ok(None) => return DisconnectReason::Closed,
            Ok(Some(Err(e))) => return DisconnectReason::Transport(e),
            Ok(Some(Ok(frame))) => frame,
        };

        let decoded = match &frame {
            WireFrame::Text(text) => codec::decode_limited(text.as_bytes(), config.max_message_size),
            WireFrame::Binary(data) => codec::decode_limited(data, config.max_message_size),
            WireFrame::Pong(_) => {
                deadline = Instant::now() + config.pong_wait;
                trace!(client = %identity.key, "Pong");
                continue;
            }
            WireFrame::Ping(_) => continue,
            WireFrame::Close => return DisconnectReason::Closed,
        };

        let inbound = match decoded {
            Ok(inbound) => inbound,
            Err(e) => return DisconnectReason::Decode(e),
        };

        let envelope = inbound.into_envelope(identity.room.clone(), identity.user_id.clone());
        if hub.submit(envelope).await.is_err() {
            return DisconnectReason::HubClosed;
        }
    }
}

/// Drain the outbound queue to the socket until the hub closes it.
///
/// Once the queue is closed the sink is closed, which sends the close frame
/// or, if the peer closed first, flushes the close reply. A sink that fails
/// to close at that point is treated as already gone.
///
/// # Errors
///
/// Returns an error if a write fails or misses its deadline.
pub async fn write_pump<K>(
    mut sink: K,
    mut outbound: mpsc::Receiver<Arc<Envelope>>,
    config: &PumpConfig,
) -> Result<(), TransportError>
where
    K: Sink<WireFrame, Error = TransportError> + Unpin,
{
    let mut ticker = tokio::time::interval_at(Instant::now() + config.ping_period, config.ping_period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            next = outbound.recv() => match next {
                Some(envelope) => {
                    let text = codec::encode(&envelope)?;
                    send_frame(&mut sink, WireFrame::Text(text), config.write_wait).await?;
                    ticker.reset();
                }
                None => return close_sink(&mut sink, config.write_wait).await,
            },
            _ = ticker.tick() => {
                send_frame(&mut sink, WireFrame::Ping(Bytes::new()), config.write_wait).await?;
            }
        }
    }
}

async fn close_sink<K>(sink: &mut K, wait: Duration) -> Result<(), TransportError>
where
    K: Sink<WireFrame, Error = TransportError> + Unpin,
{
    match tokio::time::timeout(wait, sink.close()).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => {
            debug!(error = %e, "Socket already closed");
            Ok(())
        }
        Err(_) => Err(TransportError::Timeout),
    }
}

async fn send_frame<K>(sink: &mut K, frame: WireFrame, wait: Duration) -> Result<(), TransportError>
where
    K: Sink<WireFrame, Error = TransportError> + Unpin,
{
    match tokio::time::timeout(wait, sink.send(frame)).await {
        Ok(result) => result,
        Err(_) => Err(TransportError::Timeout),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::channel::mpsc as frames;
    use huddle_core::{Hub, HubConfig};
    use huddle_protocol::MessageKind;
    use serde_json::json;
    use std::pin::Pin;
    use std::task::{Context, Poll};

    type FrameResult = Result<WireFrame, TransportError>;

    fn identity_of(session: &ClientSession) -> Identity {
        Identity {
            key: session.key,
            user_id: session.user_id.clone(),
            room: session.room.clone(),
        }
    }

    fn text(value: serde_json::Value) -> FrameResult {
        Ok(WireFrame::Text(value.to_string()))
    }

    fn test_sink(
        tx: frames::UnboundedSender<WireFrame>,
    ) -> impl Sink<WireFrame, Error = TransportError> + Unpin + Send + 'static {
        tx.sink_map_err(|_| TransportError::ConnectionClosed)
    }

    /// Accepts frames but refuses to close, like a socket whose peer has
    /// already finished the close handshake.
    struct PeerClosedSink;

    impl Sink<WireFrame> for PeerClosedSink {
        type Error = TransportError;

        fn poll_ready(self: Pin<&mut Self>, _: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Ready(Ok(()))
        }

        fn start_send(self: Pin<&mut Self>, _: WireFrame) -> Result<(), Self::Error> {
            Ok(())
        }

        fn poll_flush(self: Pin<&mut Self>, _: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Ready(Ok(()))
        }

        fn poll_close(self: Pin<&mut Self>, _: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Ready(Err(TransportError::SendFailed(
                "Sending after closing is not allowed".into(),
            )))
        }
    }

    async fn drain_until_closed(session: &mut ClientSession) -> Vec<Arc<Envelope>> {
        let mut seen = Vec::new();
        while let Some(env) = session.outbound.recv().await {
            seen.push(env);
        }
        seen
    }

    #[tokio::test]
    async fn test_read_pump_tags_identity() {
        let hub = Hub::spawn(HubConfig::default());
        let mut alice = hub.join("alice", "lobby").await.unwrap();
        let mut bob = hub.join("bob", "lobby").await.unwrap();
        let identity = identity_of(&alice);

        let (tx, rx) = frames::unbounded::<FrameResult>();
        let pump_hub = hub.clone();
        let reader = tokio::spawn(async move {
            read_pump(rx, &identity, &pump_hub, &PumpConfig::default()).await
        });

        tx.unbounded_send(text(json!({
            "type": "leave",
            "room": "elsewhere",
            "user_id": "mallory",
            "content": "hi"
        })))
        .unwrap();

        let join = bob.outbound.recv().await.unwrap();
        assert_eq!(join.kind, MessageKind::Join);
        let msg = bob.outbound.recv().await.unwrap();
        assert_eq!(msg.kind, MessageKind::Message);
        assert_eq!(msg.user_id, "alice");
        assert_eq!(msg.room, "lobby");
        assert_eq!(msg.content, json!("hi"));

        tx.unbounded_send(Ok(WireFrame::Close)).unwrap();
        assert!(matches!(reader.await.unwrap(), DisconnectReason::Closed));

        let leave = bob.outbound.recv().await.unwrap();
        assert_eq!(leave.kind, MessageKind::Leave);
        assert_eq!(leave.user_id, "alice");

        let seen = drain_until_closed(&mut alice).await;
        assert!(seen.iter().any(|e| e.kind == MessageKind::Message));
    }

    #[tokio::test]
    async fn test_read_pump_decode_error_leaves() {
        let hub = Hub::spawn(HubConfig::default());
        let mut alice = hub.join("alice", "lobby").await.unwrap();
        let identity = identity_of(&alice);

        let (tx, rx) = frames::unbounded::<FrameResult>();
        tx.unbounded_send(Ok(WireFrame::Text("{not json".into())))
            .unwrap();

        let reason = read_pump(rx, &identity, &hub, &PumpConfig::default()).await;
        assert!(matches!(reason, DisconnectReason::Decode(ProtocolError::Json(_))));

        drain_until_closed(&mut alice).await;
        assert_eq!(hub.client_count(), 0);
        drop(tx);
    }

    #[tokio::test]
    async fn test_read_pump_rejects_oversized_frame() {
        let hub = Hub::spawn(HubConfig::default());
        let alice = hub.join("alice", "lobby").await.unwrap();
        let identity = identity_of(&alice);
        let config = PumpConfig::new(WRITE_WAIT, PONG_WAIT, 16);

        let (tx, rx) = frames::unbounded::<FrameResult>();
        tx.unbounded_send(text(json!({ "content": "x".repeat(64) })))
            .unwrap();

        let reason = read_pump(rx, &identity, &hub, &config).await;
        assert!(matches!(
            reason,
            DisconnectReason::Decode(ProtocolError::FrameTooLarge(_))
        ));
    }

    #[tokio::test]
    async fn test_read_pump_transport_error_leaves() {
        let hub = Hub::spawn(HubConfig::default());
        let mut alice = hub.join("alice", "lobby").await.unwrap();
        let identity = identity_of(&alice);

        let (tx, rx) = frames::unbounded::<FrameResult>();
        tx.unbounded_send(Err(TransportError::ReceiveFailed("reset".into())))
            .unwrap();

        let reason = read_pump(rx, &identity, &hub, &PumpConfig::default()).await;
        assert!(matches!(reason, DisconnectReason::Transport(_)));
        drain_until_closed(&mut alice).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_pump_idle_timeout() {
        let hub = Hub::spawn(HubConfig::default());
        let mut alice = hub.join("alice", "lobby").await.unwrap();
        let identity = identity_of(&alice);

        let (_tx, rx) = frames::unbounded::<FrameResult>();
        let start = Instant::now();
        let reason = read_pump(rx, &identity, &hub, &PumpConfig::default()).await;

        assert!(matches!(reason, DisconnectReason::IdleTimeout));
        assert!(start.elapsed() >= PONG_WAIT);
        drain_until_closed(&mut alice).await;
        assert!(!hub.room_exists("lobby"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_pong_extends_read_deadline() {
        let hub = Hub::spawn(HubConfig::default());
        let alice = hub.join("alice", "lobby").await.unwrap();
        let identity = identity_of(&alice);

        let (tx, rx) = frames::unbounded::<FrameResult>();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(50)).await;
            tx.unbounded_send(Ok(WireFrame::Pong(Bytes::new()))).unwrap();
            tokio::time::sleep(Duration::from_secs(3600)).await;
            drop(tx);
        });

        let start = Instant::now();
        let reason = read_pump(rx, &identity, &hub, &PumpConfig::default()).await;

        assert!(matches!(reason, DisconnectReason::IdleTimeout));
        assert!(start.elapsed() >= Duration::from_secs(110));
    }

    #[tokio::test]
    async fn test_write_pump_closes_sink_when_queue_closed() {
        let (queue_tx, queue_rx) = mpsc::channel(4);
        let (tx, mut rx) = frames::unbounded();

        queue_tx
            .send(Arc::new(Envelope::message("lobby", "alice", json!("hi"))))
            .await
            .unwrap();
        drop(queue_tx);

        write_pump(test_sink(tx), queue_rx, &PumpConfig::default())
            .await
            .unwrap();

        match rx.next().await {
            Some(WireFrame::Text(text)) => {
                let env = codec::decode_envelope(text.as_bytes()).unwrap();
                assert_eq!(env.content, json!("hi"));
            }
            other => panic!("Expected text frame, got {:?}", other),
        }
        assert_eq!(rx.next().await, None);
    }

    #[tokio::test]
    async fn test_write_pump_ends_cleanly_after_peer_close() {
        let (queue_tx, queue_rx) = mpsc::channel(4);
        queue_tx
            .send(Arc::new(Envelope::message("lobby", "alice", json!("bye"))))
            .await
            .unwrap();
        drop(queue_tx);

        let result = write_pump(PeerClosedSink, queue_rx, &PumpConfig::default()).await;
        assert!(result.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_write_pump_pings_when_idle() {
        let (queue_tx, queue_rx) = mpsc::channel::<Arc<Envelope>>(4);
        let (tx, mut rx) = frames::unbounded();
        let config = PumpConfig::default();

        let start = Instant::now();
        let writer = tokio::spawn(async move { write_pump(test_sink(tx), queue_rx, &config).await });

        assert!(matches!(rx.next().await, Some(WireFrame::Ping(_))));
        assert!(start.elapsed() >= Duration::from_secs(54));

        drop(queue_tx);
        assert_eq!(rx.next().await, None);
        writer.await.unwrap().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_write_pump_traffic_resets_ping_timer() {
        let (queue_tx, queue_rx) = mpsc::channel::<Arc<Envelope>>(4);
        let (tx, mut rx) = frames::unbounded();
        let config = PumpConfig::default();

        let start = Instant::now();
        tokio::spawn(async move { write_pump(test_sink(tx), queue_rx, &config).await });

        tokio::time::sleep(Duration::from_secs(30)).await;
        queue_tx
            .send(Arc::new(Envelope::message("lobby", "alice", json!(1))))
            .await
            .unwrap();

        assert!(matches!(rx.next().await, Some(WireFrame::Text(_))));
        assert!(matches!(rx.next().await, Some(WireFrame::Ping(_))));
        assert!(start.elapsed() >= Duration::from_secs(84));
    }

    #[tokio::test(start_paused = true)]
    async fn test_write_pump_deadline() {
        let (queue_tx, queue_rx) = mpsc::channel::<Arc<Envelope>>(4);
        // Bounded with no reader: the first send fills it, the second stalls
        let (tx, _rx) = frames::channel::<WireFrame>(0);
        let sink = tx.sink_map_err(|_| TransportError::ConnectionClosed);

        for i in 0..2 {
            queue_tx
                .send(Arc::new(Envelope::message("lobby", "alice", json!(i))))
                .await
                .unwrap();
        }

        let start = Instant::now();
        let result = write_pump(sink, queue_rx, &PumpConfig::default()).await;
        assert!(matches!(result, Err(TransportError::Timeout)));
        assert!(start.elapsed() >= WRITE_WAIT);
    }

    #[tokio::test]
    async fn test_connection_teardown_on_close() {
        let hub = Hub::spawn(HubConfig::default());
        let session = hub.join("alice", "lobby").await.unwrap();
        let mut bob = hub.join("bob", "lobby").await.unwrap();

        let connection = Connection::new(session, hub.clone(), PumpConfig::default());
        assert_eq!(connection.identity().user_id, "alice");

        let (in_tx, in_rx) = frames::unbounded::<FrameResult>();
        let (out_tx, mut out_rx) = frames::unbounded::<WireFrame>();
        let running = tokio::spawn(connection.run(test_sink(out_tx), in_rx));

        in_tx.unbounded_send(text(json!({ "content": "hello" }))).unwrap();
        assert_eq!(
            drain_kinds(&mut bob, 2).await,
            vec![MessageKind::Join, MessageKind::Message]
        );

        in_tx.unbounded_send(Ok(WireFrame::Close)).unwrap();
        assert!(matches!(running.await.unwrap(), DisconnectReason::Closed));
        assert_eq!(drain_kinds(&mut bob, 1).await, vec![MessageKind::Leave]);
        assert_eq!(hub.roster("lobby"), vec!["bob"]);

        // The writer closes the sink once the hub drops the queue
        let mut sent = Vec::new();
        while let Some(frame) = out_rx.next().await {
            sent.push(frame);
        }
        assert!(matches!(sent.last(), Some(WireFrame::Text(_))));
    }

    async fn drain_kinds(session: &mut ClientSession, n: usize) -> Vec<MessageKind> {
        let mut kinds = Vec::with_capacity(n);
        for _ in 0..n {
            kinds.push(session.outbound.recv().await.unwrap().kind);
        }
        kinds
    }
}
