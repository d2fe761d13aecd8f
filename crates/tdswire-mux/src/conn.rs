use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use bytes::Bytes;
use tracing::{debug, warn};

use tdswire_packet::{
    packet_count, split_message, Assembler, Message, Packet, PacketError, PacketReader,
    PacketStatus, PacketType, PacketWriter,
};
use tdswire_transport::{DbStream, TcpTransport};

use crate::config::ConnConfig;
use crate::error::{MuxError, Result, Terminal};
use crate::window::FlowController;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// What a receiver pops off a channel's inbound queue.
#[derive(Debug)]
enum Delivery {
    Message(Message),
    /// A mid-message protocol violation. Fatal to that message only; the
    /// connection keeps running.
    Violation(String),
}

#[derive(Debug, Default)]
struct Inbox {
    queue: VecDeque<Delivery>,
    /// Set once the connection reaches a terminal state; re-read by every
    /// receiver after the queue drains.
    terminal: Option<Terminal>,
}

/// Per-channel bookkeeping. Created on first use of the channel id.
#[derive(Debug, Default)]
struct ChannelState {
    /// Serializes whole outbound messages so packet runs never interleave
    /// on one channel. Attention sends do not take this lock.
    send: Mutex<()>,
    /// Next outbound sequence number, wrapping at 256.
    next_nr: AtomicU8,
    inbox: Mutex<Inbox>,
    ready: Condvar,
}

#[derive(Debug)]
enum LinkState {
    Open,
    Done(Terminal),
}

struct Shared {
    config: ConnConfig,
    writer: Mutex<PacketWriter<DbStream>>,
    /// Extra stream handle used to shut the socket down, which unblocks
    /// the reader thread.
    control: DbStream,
    flow: FlowController,
    channels: Mutex<HashMap<u16, Arc<ChannelState>>>,
    state: Mutex<LinkState>,
    sequence_gaps: AtomicU64,
}

/// The transport multiplexer: one duplex stream, many logical channels.
///
/// A dedicated reader thread demultiplexes inbound packets by channel id
/// and feeds per-channel assemblers; any number of threads may send on
/// different channels concurrently. Packets are written atomically under a
/// connection-wide writer lock (the channel id lives inside each header,
/// so byte-level interleaving would corrupt the stream), and window
/// admission happens per packet, so a channel at its window limit never
/// delays traffic on its siblings.
pub struct Connection {
    shared: Arc<Shared>,
    reader: Option<JoinHandle<()>>,
}

impl Connection {
    /// Connect to a server and start the reader thread.
    pub fn connect(
        addr: impl std::net::ToSocketAddrs + std::fmt::Display,
        config: ConnConfig,
    ) -> Result<Self> {
        config.validate()?;
        let stream = TcpTransport::connect(addr)?;
        Self::from_stream(stream, config)
    }

    /// Build a connection over an already-established stream.
    pub fn from_stream(stream: DbStream, config: ConnConfig) -> Result<Self> {
        config.validate()?;

        let packet_config = config.packet_config();
        let reader_stream = stream.try_clone()?;
        let control = stream.try_clone()?;

        let reader = PacketReader::with_config_db(reader_stream, packet_config.clone())?;
        let writer = PacketWriter::with_config_db(stream, packet_config)?;

        let shared = Arc::new(Shared {
            flow: FlowController::new(config.window),
            config,
            writer: Mutex::new(writer),
            control,
            channels: Mutex::new(HashMap::new()),
            state: Mutex::new(LinkState::Open),
            sequence_gaps: AtomicU64::new(0),
        });

        let handle = {
            let shared = Arc::clone(&shared);
            std::thread::Builder::new()
                .name("tdswire-reader".to_string())
                .spawn(move || read_loop(&shared, reader))
                .map_err(|err| MuxError::Transport(err.into()))?
        };

        Ok(Self {
            shared,
            reader: Some(handle),
        })
    }

    /// Send one logical message on a channel.
    ///
    /// The payload is split into packets at the negotiated maximum size;
    /// the call suspends while the channel's window is exhausted or the
    /// writer lock is held, and returns once every packet is on the wire.
    pub fn send_message(
        &self,
        channel: u16,
        msg_type: PacketType,
        status: PacketStatus,
        payload: impl Into<Bytes>,
    ) -> Result<()> {
        self.shared.send_message(channel, msg_type, status, payload.into())
    }

    /// Receive the next logical message on a channel, blocking until the
    /// assembler finalizes one.
    pub fn receive_message(&self, channel: u16) -> Result<Message> {
        self.shared.receive(channel, None)
    }

    /// Receive with an upper bound on the wait.
    pub fn receive_message_timeout(&self, channel: u16, timeout: Duration) -> Result<Message> {
        self.shared.receive(channel, Some(timeout))
    }

    /// Send an attention (cancellation) request on a channel.
    ///
    /// Always sendable regardless of window state; the channel stays in
    /// pending-attention until the peer's acknowledgment is observed. A
    /// second request while one is pending is refused.
    pub fn send_attention(&self, channel: u16) -> Result<()> {
        self.shared.send_attention(channel)
    }

    /// Whether an attention request on the channel awaits acknowledgment.
    pub fn attention_pending(&self, channel: u16) -> bool {
        self.shared.flow.attention_pending(channel)
    }

    /// Sent-but-unacknowledged packets on a channel.
    pub fn outstanding(&self, channel: u16) -> u8 {
        self.shared.flow.outstanding(channel)
    }

    /// Total inbound sequence gaps observed since connect.
    pub fn sequence_gaps(&self) -> u64 {
        self.shared.sequence_gaps.load(Ordering::Relaxed)
    }

    /// The configuration this connection was built with.
    pub fn config(&self) -> &ConnConfig {
        &self.shared.config
    }

    /// A channel-scoped handle over this connection.
    pub fn channel(&self, id: u16) -> ChannelHandle {
        ChannelHandle {
            shared: Arc::clone(&self.shared),
            id,
        }
    }

    /// Close the connection: fail outstanding waiters, shut the stream
    /// down and join the reader thread. Idempotent.
    pub fn close(&mut self) -> Result<()> {
        self.shared.terminate(Terminal::Closed);
        self.shared.control.shutdown()?;
        if let Some(handle) = self.reader.take() {
            let _ = handle.join();
        }
        debug!("connection closed");
        Ok(())
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("max_packet_size", &self.shared.config.max_packet_size)
            .field("window", &self.shared.config.window)
            .finish()
    }
}

/// Channel-scoped view of a [`Connection`].
#[derive(Clone)]
pub struct ChannelHandle {
    shared: Arc<Shared>,
    id: u16,
}

impl ChannelHandle {
    /// The channel id this handle is scoped to.
    pub fn id(&self) -> u16 {
        self.id
    }

    /// Send one logical message on this channel.
    pub fn send(
        &self,
        msg_type: PacketType,
        status: PacketStatus,
        payload: impl Into<Bytes>,
    ) -> Result<()> {
        self.shared
            .send_message(self.id, msg_type, status, payload.into())
    }

    /// Receive the next logical message on this channel.
    pub fn receive(&self) -> Result<Message> {
        self.shared.receive(self.id, None)
    }

    /// Receive with an upper bound on the wait.
    pub fn receive_timeout(&self, timeout: Duration) -> Result<Message> {
        self.shared.receive(self.id, Some(timeout))
    }

    /// Send an attention (cancellation) request on this channel.
    pub fn send_attention(&self) -> Result<()> {
        self.shared.send_attention(self.id)
    }
}

impl std::fmt::Debug for ChannelHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelHandle").field("id", &self.id).finish()
    }
}

impl Shared {
    fn ensure_open(&self) -> Result<()> {
        match &*lock(&self.state) {
            LinkState::Open => Ok(()),
            LinkState::Done(terminal) => Err(terminal.to_error()),
        }
    }

    fn channel_state(&self, id: u16) -> Arc<ChannelState> {
        let channel = {
            let mut channels = lock(&self.channels);
            match channels.get(&id) {
                Some(channel) => return Arc::clone(channel),
                None => {
                    let channel = Arc::new(ChannelState::default());
                    channels.insert(id, Arc::clone(&channel));
                    channel
                }
            }
        };

        // A channel created after shutdown inherits the terminal state;
        // `terminate` may have iterated the map before our insert.
        let terminal = match &*lock(&self.state) {
            LinkState::Open => None,
            LinkState::Done(terminal) => Some(terminal.clone()),
        };
        if let Some(terminal) = terminal {
            let mut inbox = lock(&channel.inbox);
            inbox.terminal.get_or_insert(terminal);
            channel.ready.notify_all();
        }
        channel
    }

    fn send_message(
        &self,
        channel: u16,
        msg_type: PacketType,
        status: PacketStatus,
        payload: Bytes,
    ) -> Result<()> {
        self.ensure_open()?;
        let state = self.channel_state(channel);
        let _message_guard = lock(&state.send);

        let count = packet_count(payload.len(), self.config.max_packet_size);
        let first_nr = state.next_nr.fetch_add(count as u8, Ordering::Relaxed);

        let splitter = split_message(
            channel,
            msg_type,
            self.config.status | status,
            payload,
            self.config.max_packet_size,
            first_nr,
            self.config.window,
        )?;

        for packet in splitter {
            self.flow.acquire(channel)?;
            self.write_packet(&packet)?;
        }
        Ok(())
    }

    fn send_attention(&self, channel: u16) -> Result<()> {
        self.ensure_open()?;
        let state = self.channel_state(channel);
        self.flow.begin_attention(channel)?;

        let mut packet = Packet::new(PacketType::Attention, channel, Bytes::new());
        packet.header.status = self.config.status | PacketStatus::ATTN | PacketStatus::EOM;
        packet.header.packet_nr = state.next_nr.fetch_add(1, Ordering::Relaxed);
        packet.header.window = self.config.window;

        debug!(channel, "sending attention");
        match self.write_packet(&packet) {
            Ok(()) => Ok(()),
            Err(err) => {
                self.flow.clear_attention(channel);
                Err(err)
            }
        }
    }

    fn write_packet(&self, packet: &Packet) -> Result<()> {
        let mut writer = lock(&self.writer);
        self.ensure_open()?;
        writer.write_packet(packet).map_err(|err| {
            // Write failures break the shared stream for everyone.
            self.terminate(Terminal::Failed(format!("write failed: {err}")));
            MuxError::Packet(err)
        })
    }

    fn receive(&self, channel: u16, timeout: Option<Duration>) -> Result<Message> {
        let state = self.channel_state(channel);
        let deadline = timeout.map(|t| Instant::now() + t);

        let mut inbox = lock(&state.inbox);
        loop {
            if let Some(delivery) = inbox.queue.pop_front() {
                return match delivery {
                    Delivery::Message(message) => Ok(message),
                    Delivery::Violation(why) => {
                        Err(MuxError::Packet(PacketError::ProtocolViolation(why)))
                    }
                };
            }
            if let Some(terminal) = &inbox.terminal {
                return Err(terminal.to_error());
            }

            inbox = match deadline {
                None => state
                    .ready
                    .wait(inbox)
                    .unwrap_or_else(PoisonError::into_inner),
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Err(MuxError::Timeout(timeout.unwrap_or_default()));
                    }
                    state
                        .ready
                        .wait_timeout(inbox, deadline - now)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0
                }
            };
        }
    }

    /// Move the connection into a terminal state (first one wins), wake
    /// every window waiter and every receiver on every channel.
    fn terminate(&self, terminal: Terminal) -> Terminal {
        let terminal = {
            let mut state = lock(&self.state);
            match &*state {
                LinkState::Open => {
                    *state = LinkState::Done(terminal.clone());
                    terminal
                }
                LinkState::Done(existing) => existing.clone(),
            }
        };

        self.flow.abort(terminal.clone());

        let channels: Vec<Arc<ChannelState>> = lock(&self.channels).values().cloned().collect();
        for channel in channels {
            let mut inbox = lock(&channel.inbox);
            inbox.terminal.get_or_insert(terminal.clone());
            channel.ready.notify_all();
        }
        terminal
    }

    fn dispatch(&self, assemblers: &mut HashMap<u16, Assembler>, packet: Packet) {
        let header = packet.header;
        let channel = header.channel;

        if header.status.contains(PacketStatus::ATTN_ACK) {
            self.flow.acknowledge(channel);
            self.flow.clear_attention(channel);
            debug!(channel, "attention acknowledged");
        }

        // Protocol acknowledgments feed the window and are consumed by the
        // transport; they carry no message content.
        if header.msg_type == PacketType::ProtoAck {
            self.flow.acknowledge(channel);
            return;
        }

        let assembler = assemblers
            .entry(channel)
            .or_insert_with(|| Assembler::new(channel));

        match assembler.push(packet) {
            Ok(push) => {
                if push.gap.is_some() {
                    self.sequence_gaps.fetch_add(1, Ordering::Relaxed);
                }
                if let Some(message) = push.message {
                    let state = self.channel_state(channel);
                    let mut inbox = lock(&state.inbox);
                    inbox.queue.push_back(Delivery::Message(message));
                    state.ready.notify_all();
                }
            }
            Err(err) => {
                // Fatal to the logical message, not to the connection;
                // surface it to that channel's receiver.
                warn!(channel, %err, "dropping partial message");
                let state = self.channel_state(channel);
                let mut inbox = lock(&state.inbox);
                inbox.queue.push_back(Delivery::Violation(err.to_string()));
                state.ready.notify_all();
            }
        }
    }
}

/// Body of the dedicated reader thread: decode one packet at a time and
/// dispatch by channel until the stream ends.
fn read_loop(shared: &Shared, mut reader: PacketReader<DbStream>) {
    let mut assemblers: HashMap<u16, Assembler> = HashMap::new();
    loop {
        match reader.read_packet() {
            Ok(packet) => shared.dispatch(&mut assemblers, packet),
            Err(PacketError::ConnectionClosed) => {
                let applied = shared.terminate(Terminal::PeerClosed);
                if matches!(applied, Terminal::PeerClosed) {
                    debug!("peer closed connection");
                }
                break;
            }
            Err(err) => {
                let applied = shared.terminate(Terminal::Failed(err.to_string()));
                // A locally closed stream also errors the reader; only log
                // genuine failures.
                if let Terminal::Failed(reason) = &applied {
                    warn!(%reason, "connection failed");
                }
                break;
            }
        }
    }
}
