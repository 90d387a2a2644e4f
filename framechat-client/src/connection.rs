//! Connection management.
//!
//! A [`Connection`] owns the duplex channel to the peer for the lifetime of
//! one session. All channel and queue state is driven by exactly two tasks,
//! spawned by the caller: [`Connection::read_loop`], which owns the read
//! half, and [`Connection::write_loop`], which owns the write half and the
//! outbound queue receiver. Producer threads never touch either; they hand
//! work over through [`Connection::enqueue`] and [`Connection::close`],
//! which are plain channel sends and atomic flips.

use crate::error::ClientError;
use bytes::Bytes;
use framechat_protocol::{decode_header, Frame, HEADER_LEN};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc, Mutex, Notify};

/// Default connect timeout.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Capacity of the inbound message broadcast channel.
const MESSAGE_CHANNEL_CAPACITY: usize = 256;

/// Connection configuration.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Peer hostname or IP address.
    pub host: String,
    /// Peer port.
    pub port: u16,
    /// Connect timeout.
    pub connect_timeout: Duration,
}

impl ConnectionConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }
}

/// A connection to a framechat peer.
pub struct Connection {
    config: ConnectionConfig,
    /// Read half of the stream; taken by the read loop at startup.
    reader: Mutex<Option<OwnedReadHalf>>,
    /// Write half of the stream; taken by the write loop at startup.
    writer: Mutex<Option<OwnedWriteHalf>>,
    /// Producer side of the outbound queue.
    outbound: std::sync::Mutex<Option<mpsc::UnboundedSender<Frame>>>,
    /// Consumer side of the outbound queue; taken by the write loop.
    outbound_rx: Mutex<Option<mpsc::UnboundedReceiver<Frame>>>,
    /// Is the session live?
    connected: AtomicBool,
    /// Wakes the read loop when the session is torn down from elsewhere
    /// (a local close or a write failure).
    shutdown: Notify,
    /// Broadcast channel for decoded inbound message bodies.
    messages: broadcast::Sender<Bytes>,
}

impl Connection {
    /// Creates a new connection (not yet connected).
    pub fn new(config: ConnectionConfig) -> Self {
        let (messages, _) = broadcast::channel(MESSAGE_CHANNEL_CAPACITY);
        Self {
            config,
            reader: Mutex::new(None),
            writer: Mutex::new(None),
            outbound: std::sync::Mutex::new(None),
            outbound_rx: Mutex::new(None),
            connected: AtomicBool::new(false),
            shutdown: Notify::new(),
            messages,
        }
    }

    /// Subscribes to decoded inbound message bodies.
    pub fn subscribe_messages(&self) -> broadcast::Receiver<Bytes> {
        self.messages.subscribe()
    }

    /// Connects to the peer.
    ///
    /// The connect attempt races the configured timeout; exactly one wins.
    /// If the timer fires first the pending attempt is dropped and can
    /// never surface as a late connection, and a completed connect can
    /// never be followed by a spurious timeout.
    pub async fn connect(&self) -> Result<(), ClientError> {
        let host = self.config.host.as_str();
        let port = self.config.port;
        tracing::debug!("connecting to {}:{}...", host, port);

        let stream = tokio::time::timeout(
            self.config.connect_timeout,
            TcpStream::connect((host, port)),
        )
        .await
        .map_err(|_| {
            tracing::debug!("connect timed out");
            ClientError::ConnectTimeout {
                host: host.to_string(),
                port,
                timeout: self.config.connect_timeout,
            }
        })?
        .map_err(|e| {
            tracing::debug!("connect failed: {}", e);
            ClientError::Connect {
                host: host.to_string(),
                port,
                source: e,
            }
        })?;

        stream.set_nodelay(true).ok();

        let (read_half, write_half) = stream.into_split();
        *self.reader.lock().await = Some(read_half);
        *self.writer.lock().await = Some(write_half);

        let (tx, rx) = mpsc::unbounded_channel();
        *lock_outbound(&self.outbound) = Some(tx);
        *self.outbound_rx.lock().await = Some(rx);

        self.connected.store(true, Ordering::SeqCst);
        tracing::debug!("connected to {}:{}", host, port);
        Ok(())
    }

    /// Runs the read pipeline (call this in a background task).
    ///
    /// Reads one frame at a time, header then body, strictly in arrival
    /// order, and broadcasts each decoded body to subscribers. Returns when
    /// the session ends: `Ok` if the end was locally initiated via
    /// [`close`](Self::close), otherwise the terminal reason.
    pub async fn read_loop(&self) -> Result<(), ClientError> {
        let mut reader = self
            .reader
            .lock()
            .await
            .take()
            .ok_or(ClientError::NotConnected)?;

        // The session can end from the other direction too: a local close
        // or a write failure fires `shutdown`, which cancels the pending
        // read so no frame is read or delivered after teardown.
        let err = tokio::select! {
            err = read_frames(&mut reader, &self.messages) => err,
            _ = self.shutdown.notified() => ClientError::ConnectionClosed,
        };

        if self.connected.swap(false, Ordering::SeqCst) {
            tracing::debug!("session ended: {}", err);
            // Terminal for the whole session: stop the write side too.
            self.shutdown_session();
            Err(err)
        } else {
            // close() already ended the session; the read failure is just
            // the channel being torn down underneath us.
            Ok(())
        }
    }

    /// Runs the write pipeline (call this in a background task).
    ///
    /// Drains the outbound queue one frame at a time; at most one write is
    /// in flight against the channel. Returns `Ok` once the queue is
    /// closed and fully drained, or the terminal reason on a write
    /// failure, in which case remaining queued frames are dropped.
    pub async fn write_loop(&self) -> Result<(), ClientError> {
        let mut writer = self
            .writer
            .lock()
            .await
            .take()
            .ok_or(ClientError::NotConnected)?;
        let mut queue = self
            .outbound_rx
            .lock()
            .await
            .take()
            .ok_or(ClientError::NotConnected)?;

        match write_frames(&mut writer, &mut queue).await {
            Ok(()) => Ok(()),
            Err(err) => {
                if self.connected.swap(false, Ordering::SeqCst) {
                    tracing::debug!("session ended: {}", err);
                    self.shutdown_session();
                    Err(err)
                } else {
                    Ok(())
                }
            }
        }
    }

    /// Appends a frame to the outbound queue.
    ///
    /// Callable from any thread; never blocks. Frames are transmitted in
    /// the exact order they were enqueued.
    pub fn enqueue(&self, frame: Frame) -> Result<(), ClientError> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(ClientError::NotConnected);
        }
        match lock_outbound(&self.outbound).as_ref() {
            Some(tx) => tx
                .send(frame)
                .map_err(|_| ClientError::ConnectionClosed),
            None => Err(ClientError::NotConnected),
        }
    }

    /// Closes the connection.
    ///
    /// Callable from any thread and idempotent. Closing the outbound queue
    /// lets the write loop drain whatever was already enqueued and then
    /// shut down the channel; the read loop is woken and stops without
    /// delivering anything further. Never blocks on the I/O tasks.
    pub fn close(&self) {
        if self.connected.swap(false, Ordering::SeqCst) {
            tracing::debug!("closing connection");
        }
        self.shutdown_session();
    }

    /// Returns whether the session is live.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Tears the session down: drops the queue producer so the write loop
    /// sees end-of-queue, and wakes the read loop so it stops reading.
    fn shutdown_session(&self) {
        lock_outbound(&self.outbound).take();
        self.shutdown.notify_one();
    }
}

/// Locks the outbound sender slot, recovering from poisoning.
fn lock_outbound(
    outbound: &std::sync::Mutex<Option<mpsc::UnboundedSender<Frame>>>,
) -> std::sync::MutexGuard<'_, Option<mpsc::UnboundedSender<Frame>>> {
    outbound.lock().unwrap_or_else(|e| e.into_inner())
}

/// The read pipeline: header, decode, body, deliver, repeat.
///
/// Only one message is in flight at a time; the next header read never
/// starts before the current body read completes. Returns the reason the
/// loop stopped. End-of-stream on a frame boundary is reported as
/// [`ClientError::ConnectionClosed`] (the peer hung up cleanly); anything
/// else mid-frame is a read or decode failure.
async fn read_frames<R>(stream: &mut R, messages: &broadcast::Sender<Bytes>) -> ClientError
where
    R: AsyncRead + Unpin,
{
    loop {
        let mut header = [0u8; HEADER_LEN];
        // Only end-of-stream before the first header byte is a clean
        // close; EOF once the header has started is a truncated frame.
        match stream.read(&mut header[..1]).await {
            Ok(0) => return ClientError::ConnectionClosed,
            Ok(_) => {}
            Err(e) => return ClientError::Read(e),
        }
        if let Err(e) = stream.read_exact(&mut header[1..]).await {
            return ClientError::Read(e);
        }

        let body_len = match decode_header(&header) {
            Ok(len) => len,
            Err(e) => return ClientError::Protocol(e),
        };

        let mut body = vec![0u8; body_len];
        if let Err(e) = stream.read_exact(&mut body).await {
            return ClientError::Read(e);
        }

        // No receivers just means nobody is listening right now.
        let _ = messages.send(Bytes::from(body));
    }
}

/// The write pipeline: pop the front frame, write it fully, repeat.
///
/// Returns `Ok` after shutting down the channel once the queue is closed
/// and drained. A write failure drops the queue receiver, abandoning any
/// frames still waiting.
async fn write_frames<W>(
    stream: &mut W,
    queue: &mut mpsc::UnboundedReceiver<Frame>,
) -> Result<(), ClientError>
where
    W: AsyncWrite + Unpin,
{
    while let Some(frame) = queue.recv().await {
        stream
            .write_all(&frame.encode())
            .await
            .map_err(ClientError::Write)?;
    }
    stream.shutdown().await.map_err(ClientError::Write)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::sync::Arc;
    use tokio::net::TcpListener;

    fn frame(body: &[u8]) -> Frame {
        Frame::new(body.to_vec()).expect("test body within bounds")
    }

    #[tokio::test]
    async fn connect_and_receive_frames() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            socket.write_all(b"0005hello").await.unwrap();
            socket.write_all(b"0002hi").await.unwrap();
            socket
        });

        let conn = Arc::new(Connection::new(ConnectionConfig::new(
            addr.ip().to_string(),
            addr.port(),
        )));
        conn.connect().await.unwrap();
        assert!(conn.is_connected());

        let mut rx = conn.subscribe_messages();
        let reader = {
            let conn = conn.clone();
            tokio::spawn(async move { conn.read_loop().await })
        };

        assert_eq!(rx.recv().await.unwrap().as_ref(), b"hello");
        assert_eq!(rx.recv().await.unwrap().as_ref(), b"hi");

        // Peer hangs up on a frame boundary.
        drop(server.await.unwrap());
        let result = reader.await.unwrap();
        assert!(matches!(result, Err(ClientError::ConnectionClosed)));
        assert!(!conn.is_connected());
    }

    #[tokio::test]
    async fn oversized_header_closes_session() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            // Announces 9999 body bytes but sends none.
            socket.write_all(b"9999").await.unwrap();
            socket
        });

        let conn = Arc::new(Connection::new(ConnectionConfig::new(
            addr.ip().to_string(),
            addr.port(),
        )));
        conn.connect().await.unwrap();

        let reader = {
            let conn = conn.clone();
            tokio::spawn(async move { conn.read_loop().await })
        };

        let result = reader.await.unwrap();
        assert!(matches!(
            result,
            Err(ClientError::Protocol(
                framechat_protocol::ProtocolError::BodyTooLarge { size: 9999, .. }
            ))
        ));
        assert!(!conn.is_connected());
        drop(server.await.unwrap());
    }

    #[tokio::test]
    async fn connect_refused() {
        // Bind then drop to get a port with nothing listening.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let conn = Connection::new(ConnectionConfig::new(
            addr.ip().to_string(),
            addr.port(),
        ));
        let result = conn.connect().await;
        assert!(matches!(result, Err(ClientError::Connect { .. })));
        assert!(!conn.is_connected());
    }

    #[tokio::test]
    async fn no_spurious_timeout_after_connect() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let conn = Connection::new(
            ConnectionConfig::new(addr.ip().to_string(), addr.port())
                .with_connect_timeout(Duration::from_millis(250)),
        );
        conn.connect().await.unwrap();

        tokio::time::sleep(Duration::from_millis(400)).await;
        assert!(conn.is_connected());
    }

    #[tokio::test]
    async fn transmission_preserves_enqueue_order() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut received = Vec::new();
            socket.read_to_end(&mut received).await.unwrap();
            received
        });

        let conn = Arc::new(Connection::new(ConnectionConfig::new(
            addr.ip().to_string(),
            addr.port(),
        )));
        conn.connect().await.unwrap();

        let writer = {
            let conn = conn.clone();
            tokio::spawn(async move { conn.write_loop().await })
        };

        conn.enqueue(frame(b"first")).unwrap();
        conn.enqueue(frame(b"second")).unwrap();
        conn.enqueue(frame(b"third")).unwrap();
        conn.close();

        writer.await.unwrap().unwrap();
        let received = server.await.unwrap();
        assert_eq!(received, b"0005first0006second0005third");
    }

    #[tokio::test]
    async fn close_is_idempotent_and_terminal_for_enqueue() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let conn = Connection::new(ConnectionConfig::new(
            addr.ip().to_string(),
            addr.port(),
        ));
        conn.connect().await.unwrap();

        conn.close();
        conn.close();
        assert!(!conn.is_connected());
        assert!(matches!(
            conn.enqueue(frame(b"late")),
            Err(ClientError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn enqueue_before_connect_fails() {
        let conn = Connection::new(ConnectionConfig::new("127.0.0.1", 1));
        assert!(matches!(
            conn.enqueue(frame(b"early")),
            Err(ClientError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn no_frames_delivered_after_close() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            socket
        });

        let conn = Arc::new(Connection::new(ConnectionConfig::new(
            addr.ip().to_string(),
            addr.port(),
        )));
        conn.connect().await.unwrap();

        let mut rx = conn.subscribe_messages();
        let reader = {
            let conn = conn.clone();
            tokio::spawn(async move { conn.read_loop().await })
        };

        // A local close wakes the parked read loop; it finishes cleanly.
        conn.close();
        reader.await.unwrap().unwrap();

        // Bytes arriving after the close are never read or delivered.
        let mut socket = server.await.unwrap();
        socket.write_all(b"0005hello").await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn write_failure_tears_down_session() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            // Hang up immediately so writes start failing.
            drop(socket);
        });

        let conn = Arc::new(Connection::new(ConnectionConfig::new(
            addr.ip().to_string(),
            addr.port(),
        )));
        conn.connect().await.unwrap();
        server.await.unwrap();

        let reader = {
            let conn = conn.clone();
            tokio::spawn(async move { conn.read_loop().await })
        };
        let writer = {
            let conn = conn.clone();
            tokio::spawn(async move { conn.write_loop().await })
        };

        // Keep enqueueing until the session notices the dead peer.
        let mut failed = false;
        for _ in 0..100 {
            if conn.enqueue(frame(b"ping")).is_err() {
                failed = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(failed, "session never ended after peer hangup");

        // Whichever loop hit the failure first wakes the other; both end.
        let write_result = writer.await.unwrap();
        let read_result = reader.await.unwrap();
        assert!(write_result.is_err() || read_result.is_err());
        assert!(!conn.is_connected());
        assert!(matches!(
            conn.enqueue(frame(b"late")),
            Err(ClientError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn truncated_header_is_read_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            // Two header bytes, then hang up mid-header.
            socket.write_all(b"00").await.unwrap();
        });

        let (messages, _rx) = broadcast::channel(8);
        let mut stream = TcpStream::connect(addr).await.unwrap();
        let err = read_frames(&mut stream, &messages).await;
        assert!(matches!(err, ClientError::Read(_)));
        server.await.unwrap();
    }

    #[tokio::test]
    async fn read_error_mid_body_is_terminal() {
        let (messages, mut rx) = broadcast::channel(8);
        let mut mock = tokio_test::io::Builder::new()
            .read(b"0005hello")
            .read(b"0004ab")
            .read_error(io::Error::new(io::ErrorKind::ConnectionReset, "reset"))
            .build();

        let err = read_frames(&mut mock, &messages).await;
        assert!(matches!(err, ClientError::Read(_)));
        // The complete frame before the failure was still delivered.
        assert_eq!(rx.recv().await.unwrap().as_ref(), b"hello");
    }

    #[tokio::test]
    async fn malformed_header_stops_read_pipeline() {
        let (messages, _rx) = broadcast::channel(8);
        let mut mock = tokio_test::io::Builder::new().read(b"12x4").build();

        let err = read_frames(&mut mock, &messages).await;
        assert!(matches!(
            err,
            ClientError::Protocol(framechat_protocol::ProtocolError::MalformedHeader(_))
        ));
    }

    #[tokio::test]
    async fn write_pipeline_drains_in_order() {
        let mut mock = tokio_test::io::Builder::new()
            .write(b"0005hello")
            .write(b"0005world")
            .build();

        let (tx, mut rx) = mpsc::unbounded_channel();
        tx.send(frame(b"hello")).unwrap();
        tx.send(frame(b"world")).unwrap();
        drop(tx);

        write_frames(&mut mock, &mut rx).await.unwrap();
    }

    #[tokio::test]
    async fn write_error_abandons_queue() {
        let mut mock = tokio_test::io::Builder::new()
            .write(b"0005hello")
            .write_error(io::Error::new(io::ErrorKind::BrokenPipe, "gone"))
            .build();

        let (tx, mut rx) = mpsc::unbounded_channel();
        tx.send(frame(b"hello")).unwrap();
        tx.send(frame(b"world")).unwrap();
        tx.send(frame(b"never")).unwrap();

        let result = write_frames(&mut mock, &mut rx).await;
        assert!(matches!(result, Err(ClientError::Write(_))));
    }
}
