use crate::crypt::{new_cipher, AesCfb8, AsyncStreamCipher};
use crate::dispatch::{decode_packet, InboundPacket, PacketHandler, UnknownPacketFilter};
use kestrel_common::buffer::MAX_VARINT_BYTES;
use kestrel_common::{ConnectionState, KestrelError, Result};
use kestrel_logger::log::log;
use kestrel_logger::severity::LogSeverity::{Debug, Error, Info, Warning};
use kestrel_protocol::frame::{
    decode_frame_body, encode_packet, CompressionSnapshot, MAX_FRAME_LEN,
};
use kestrel_protocol::packet::Packet;
use once_cell::sync::OnceCell;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio_util::sync::CancellationToken;

/// Default compression threshold until the peer negotiates one.
const DEFAULT_COMPRESSION_THRESHOLD: usize = 256;

/// A packet waiting in the outbound queue, together with the compression
/// settings captured when it was enqueued. The writer frames each packet
/// with its own snapshot, so enabling compression never reframes packets
/// that were queued before the toggle.
struct EnqueuedPacket {
    packet: Box<dyn Packet>,
    compression: CompressionSnapshot,
}

/// Callback invoked exactly once when the connection tears down. The
/// argument is true when the remote end closed the stream first.
type ClosedCallback = Box<dyn FnOnce(bool) + Send>;

struct Shared {
    remote: SocketAddr,
    handler: Arc<dyn PacketHandler>,
    state: Mutex<ConnectionState>,
    compression_enabled: AtomicBool,
    compression_threshold: AtomicUsize,
    connected: AtomicBool,
    initialized: AtomicBool,
    closing: AtomicBool,
    cancel: CancellationToken,
    queue_tx: Mutex<Option<UnboundedSender<EnqueuedPacket>>>,
    queue_rx: Mutex<Option<UnboundedReceiver<EnqueuedPacket>>>,
    encryption_key: OnceCell<[u8; 16]>,
    on_closed: Mutex<Option<ClosedCallback>>,
    packets_in: AtomicU64,
    packets_out: AtomicU64,
    bytes_in: AtomicU64,
    bytes_out: AtomicU64,
}

/// Mutex poisoning only happens if a holder panicked; the guarded data
/// here stays coherent regardless, so recover the guard.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// A full-duplex client connection. Cheap to clone; all clones share one
/// underlying socket, queue, and state machine.
///
/// After [`Connection::initialize`], a read task decodes inbound frames
/// and feeds the [`PacketHandler`], while a write task drains the
/// outbound queue. [`Connection::send`] never blocks on the socket.
#[derive(Clone)]
pub struct Connection {
    shared: Arc<Shared>,
}

impl Connection {
    pub fn new(remote: SocketAddr, handler: Arc<dyn PacketHandler>) -> Self {
        let (queue_tx, queue_rx) = mpsc::unbounded_channel();
        Connection {
            shared: Arc::new(Shared {
                remote,
                handler,
                state: Mutex::new(ConnectionState::Handshake),
                compression_enabled: AtomicBool::new(false),
                compression_threshold: AtomicUsize::new(DEFAULT_COMPRESSION_THRESHOLD),
                connected: AtomicBool::new(false),
                initialized: AtomicBool::new(false),
                closing: AtomicBool::new(false),
                cancel: CancellationToken::new(),
                queue_tx: Mutex::new(Some(queue_tx)),
                queue_rx: Mutex::new(Some(queue_rx)),
                encryption_key: OnceCell::new(),
                on_closed: Mutex::new(None),
                packets_in: AtomicU64::new(0),
                packets_out: AtomicU64::new(0),
                bytes_in: AtomicU64::new(0),
                bytes_out: AtomicU64::new(0),
            }),
        }
    }

    /// Connects the socket and spawns the read and write tasks. Returns
    /// `Ok(true)` when this call performed the setup, `Ok(false)` when
    /// the connection was already initialized. A failed connect leaves
    /// the connection eligible for another attempt.
    pub async fn initialize(&self) -> Result<bool> {
        if self.shared.initialized.swap(true, Ordering::SeqCst) {
            return Ok(false);
        }

        let stream = match TcpStream::connect(self.shared.remote).await {
            Ok(stream) => stream,
            Err(err) => {
                self.shared.initialized.store(false, Ordering::SeqCst);
                return Err(KestrelError::SocketFault(err));
            }
        };
        // Packets are small and latency-sensitive.
        let _ = stream.set_nodelay(true);

        let (read_half, write_half) = stream.into_split();
        let queue_rx = match lock(&self.shared.queue_rx).take() {
            Some(rx) => rx,
            None => return Err(KestrelError::ConnectionClosed),
        };
        self.shared.connected.store(true, Ordering::SeqCst);
        log(format!("Connected to {}.", self.shared.remote), Info);

        let reader = self.clone();
        tokio::spawn(async move { reader.read_loop(read_half).await });
        let writer = self.clone();
        tokio::spawn(async move { writer.write_loop(write_half, queue_rx).await });
        Ok(true)
    }

    /// Enqueues a packet for the write task. The compression settings in
    /// force right now travel with the packet.
    pub fn send<P: Packet + 'static>(&self, packet: P) -> Result<()> {
        let compression = self.compression_snapshot();
        let guard = lock(&self.shared.queue_tx);
        let queue = guard.as_ref().ok_or(KestrelError::ConnectionClosed)?;
        queue
            .send(EnqueuedPacket {
                packet: Box::new(packet),
                compression,
            })
            .map_err(|_| KestrelError::ConnectionClosed)
    }

    pub fn state(&self) -> ConnectionState {
        *lock(&self.shared.state)
    }

    /// Moves the connection to a new protocol state. Transitions only go
    /// forward; anything else is an error.
    pub fn set_state(&self, to: ConnectionState) -> Result<()> {
        let mut state = lock(&self.shared.state);
        if !state.can_transition_to(to) {
            return Err(KestrelError::InvalidStateTransition { from: *state, to });
        }
        *state = to;
        Ok(())
    }

    pub fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::SeqCst)
    }

    /// Turns compression on for every packet enqueued and every frame
    /// read from here on. Already-queued packets keep the snapshot they
    /// were enqueued with.
    pub fn enable_compression(&self, threshold: usize) {
        self.shared
            .compression_threshold
            .store(threshold, Ordering::SeqCst);
        self.shared.compression_enabled.store(true, Ordering::SeqCst);
        log(
            format!("Compression enabled with threshold {}.", threshold),
            Debug,
        );
    }

    pub fn compression_enabled(&self) -> bool {
        self.shared.compression_enabled.load(Ordering::SeqCst)
    }

    /// Installs the AES-128-CFB8 shared secret. Both loops pick the
    /// cipher up before their next byte of traffic. The secret can only
    /// be installed once for the lifetime of the connection.
    pub fn install_encryption(&self, key: [u8; 16]) -> Result<()> {
        self.shared
            .encryption_key
            .set(key)
            .map_err(|_| KestrelError::EncryptionAlreadyInstalled)?;
        log("Encryption enabled.".to_owned(), Info);
        Ok(())
    }

    /// Registers a teardown callback. Runs at most once, with `true`
    /// when the remote end closed the stream.
    pub fn on_closed(&self, callback: impl FnOnce(bool) + Send + 'static) {
        *lock(&self.shared.on_closed) = Some(Box::new(callback));
    }

    /// Initiates a local shutdown.
    pub fn stop(&self) {
        self.disconnected(false);
    }

    pub fn packets_in(&self) -> u64 {
        self.shared.packets_in.load(Ordering::Relaxed)
    }

    pub fn packets_out(&self) -> u64 {
        self.shared.packets_out.load(Ordering::Relaxed)
    }

    pub fn bytes_in(&self) -> u64 {
        self.shared.bytes_in.load(Ordering::Relaxed)
    }

    pub fn bytes_out(&self) -> u64 {
        self.shared.bytes_out.load(Ordering::Relaxed)
    }

    fn compression_snapshot(&self) -> CompressionSnapshot {
        if self.shared.compression_enabled.load(Ordering::SeqCst) {
            CompressionSnapshot::enabled(self.shared.compression_threshold.load(Ordering::SeqCst))
        } else {
            CompressionSnapshot::disabled()
        }
    }

    /// Single teardown path, no matter which side noticed first. The
    /// `closing` swap makes every later call a no-op, so the callback
    /// fires at most once.
    fn disconnected(&self, notified: bool) {
        if self.shared.closing.swap(true, Ordering::SeqCst) {
            return;
        }
        self.shared.cancel.cancel();
        lock(&self.shared.queue_tx).take();
        *lock(&self.shared.state) = ConnectionState::Closed;
        let was_connected = self.shared.connected.swap(false, Ordering::SeqCst);

        let callback = lock(&self.shared.on_closed).take();
        if let Some(callback) = callback {
            callback(notified);
        }

        if was_connected {
            log(format!("Disconnected from {}.", self.shared.remote), Info);
        }
    }

    async fn read_loop(&self, read_half: OwnedReadHalf) {
        let mut reader = FrameReader {
            stream: read_half,
            cipher: None,
        };
        let mut filter = UnknownPacketFilter::new();
        let mut notified = false;

        loop {
            if reader.cipher.is_none() {
                if let Some(key) = self.shared.encryption_key.get() {
                    reader.cipher = Some(new_cipher(key));
                }
            }

            let compression = self.shared.compression_enabled.load(Ordering::SeqCst);
            let frame = tokio::select! {
                _ = self.shared.cancel.cancelled() => break,
                frame = reader.read_frame(compression) => frame,
            };

            match frame {
                Ok((packet_id, payload, wire_bytes)) => {
                    self.shared
                        .bytes_in
                        .fetch_add(wire_bytes as u64, Ordering::Relaxed);
                    let state = self.state();
                    match decode_packet(state, packet_id, payload) {
                        Ok(packet) => {
                            self.shared.packets_in.fetch_add(1, Ordering::Relaxed);
                            self.dispatch(state, packet);
                        }
                        Err(err @ KestrelError::UnknownPacketId { .. }) => {
                            if filter.record(state, packet_id) {
                                log(format!("{}, skipping", err), Debug);
                            }
                        }
                        Err(err) => {
                            log(
                                format!("Failed to decode packet 0x{:02x}: {}", packet_id, err),
                                Error,
                            );
                            break;
                        }
                    }
                }
                Err(KestrelError::SocketFault(ref err))
                    if err.kind() == io::ErrorKind::UnexpectedEof =>
                {
                    notified = true;
                    break;
                }
                Err(err) => {
                    log(format!("Read loop error: {}", err), Error);
                    break;
                }
            }
        }

        filter.log_summary();
        self.disconnected(notified);
    }

    /// Applies pipeline-level effects, then hands the packet to the
    /// handler for the state it arrived in. Compression negotiation and
    /// the Login -> Play transition must happen before the next frame is
    /// read, so they live here rather than in user handlers.
    fn dispatch(&self, state: ConnectionState, packet: InboundPacket) {
        match &packet {
            InboundPacket::SetCompression(set) => {
                // Compression is one-way here; a negative threshold is
                // the disable request this pipeline does not support.
                if set.threshold < 0 {
                    let err = KestrelError::UnsupportedCompressionState(format!(
                        "negative threshold {}",
                        set.threshold
                    ));
                    log(format!("{}", err), Warning);
                } else {
                    self.enable_compression(set.threshold as usize);
                }
            }
            InboundPacket::LoginSuccess(_) => {
                if let Err(err) = self.set_state(ConnectionState::Play) {
                    log(format!("Login success ignored: {}", err), Error);
                }
            }
            _ => {}
        }

        match state {
            ConnectionState::Handshake => self.shared.handler.handle_handshake(self, packet),
            ConnectionState::Status => self.shared.handler.handle_status(self, packet),
            ConnectionState::Login => self.shared.handler.handle_login(self, packet),
            ConnectionState::Play => self.shared.handler.handle_play(self, packet),
            ConnectionState::Closed => {}
        }
    }

    async fn write_loop(
        &self,
        write_half: OwnedWriteHalf,
        mut queue_rx: UnboundedReceiver<EnqueuedPacket>,
    ) {
        let mut writer = FrameWriter {
            stream: write_half,
            cipher: None,
        };

        loop {
            if writer.cipher.is_none() {
                if let Some(key) = self.shared.encryption_key.get() {
                    writer.cipher = Some(new_cipher(key));
                }
            }

            let enqueued = tokio::select! {
                _ = self.shared.cancel.cancelled() => break,
                enqueued = queue_rx.recv() => match enqueued {
                    Some(enqueued) => enqueued,
                    None => break,
                },
            };

            match writer.write_frame(&enqueued).await {
                Ok(written) => {
                    self.shared.packets_out.fetch_add(1, Ordering::Relaxed);
                    self.shared
                        .bytes_out
                        .fetch_add(written as u64, Ordering::Relaxed);
                }
                Err(err) => {
                    log(format!("Write loop error: {}", err), Error);
                    break;
                }
            }
        }

        // Unblock senders and drop whatever never made it to the wire.
        queue_rx.close();
        while queue_rx.try_recv().is_ok() {}
        self.disconnected(false);
    }
}

/// Read half of the socket plus the optional inbound cipher. Decryption
/// happens byte-for-byte as data comes off the wire, before any frame
/// parsing, because the length prefix itself is encrypted.
struct FrameReader {
    stream: OwnedReadHalf,
    cipher: Option<AesCfb8>,
}

impl FrameReader {
    async fn read_u8(&mut self) -> Result<u8> {
        let mut byte = [0u8; 1];
        self.stream.read_exact(&mut byte).await?;
        if let Some(cipher) = self.cipher.as_mut() {
            cipher.decrypt(&mut byte);
        }
        Ok(byte[0])
    }

    async fn read_varint(&mut self) -> Result<(i32, usize)> {
        let mut result: u32 = 0;
        for i in 0..MAX_VARINT_BYTES {
            let byte = self.read_u8().await?;
            result |= ((byte & 0x7F) as u32) << (7 * i);
            if byte & 0x80 == 0 {
                return Ok((result as i32, i + 1));
            }
        }
        Err(KestrelError::MalformedVarint)
    }

    /// Reads one complete frame off the wire and decodes its body into
    /// `(packet_id, payload)`. Also reports the wire bytes consumed.
    async fn read_frame(&mut self, compression_enabled: bool) -> Result<(i32, Vec<u8>, usize)> {
        let (length, prefix_size) = self.read_varint().await?;
        if length <= 0 || length as usize > MAX_FRAME_LEN {
            return Err(KestrelError::FrameTooLarge {
                declared: length.max(0) as usize,
                limit: MAX_FRAME_LEN,
            });
        }

        let mut body = vec![0u8; length as usize];
        self.stream.read_exact(&mut body).await?;
        if let Some(cipher) = self.cipher.as_mut() {
            cipher.decrypt(&mut body);
        }

        let (packet_id, payload) = decode_frame_body(body, compression_enabled)?;
        Ok((packet_id, payload, prefix_size + length as usize))
    }
}

/// Write half of the socket plus the optional outbound cipher.
struct FrameWriter {
    stream: OwnedWriteHalf,
    cipher: Option<AesCfb8>,
}

impl FrameWriter {
    async fn write_frame(&mut self, enqueued: &EnqueuedPacket) -> Result<usize> {
        let mut frame = encode_packet(enqueued.packet.as_ref(), enqueued.compression)?;
        if let Some(cipher) = self.cipher.as_mut() {
            cipher.encrypt(&mut frame);
        }
        self.stream.write_all(&frame).await?;
        self.stream.flush().await?;
        Ok(frame.len())
    }
}
