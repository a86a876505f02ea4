//! `MultiplexSocket` (spec.md §4.C): multiplexes N logical virtual
//! sockets over one physical connection, routing incoming frames by
//! type and serializing outgoing frames on a single writer task. Three
//! tasks cooperate per socket (spec.md §5): a reader task that never
//! shares the physical read half with anyone else, a writer task that
//! owns the write half and a bounded outgoing queue, and an offload
//! task that runs control-frame handlers so the reader never blocks on
//! a writer future (which would deadlock, since control responses are
//! themselves waited on through the writer).

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, trace, warn};

use super::frame::{hash_key, salted_service_id_hash, FIRST_SENTINEL_SALT};
use super::virtual_socket::{VirtualSocket, VirtualSocketHandle};
use crate::config::Config;
use crate::proto::multiplex_frame::{Body, ControlBody, ConnectionResponseStatus, MultiplexFrame, SALTED_HASH_LENGTH};
use crate::wire::framing;
use crate::{Error, Result};

const OUTGOING_QUEUE_DEPTH: usize = 32;
const VIRTUAL_SOCKET_INCOMING_DEPTH: usize = 64;

/// One item on the outgoing writer queue (spec.md §4.C.2 "(future,
/// data, name)"). `ack` is `Some` for synchronous control writes the
/// caller awaits; data frames pass `None` and are fire-and-forget.
pub(crate) struct WriterItem {
    pub bytes: Vec<u8>,
    pub ack: Option<oneshot::Sender<Result<()>>>,
}

struct Entry {
    socket: Arc<VirtualSocket>,
    incoming: mpsc::Sender<Vec<u8>>,
}

/// A registered incoming-connection callback: fires with a freshly
/// accepted virtual socket for a matching CONNECTION_REQUEST
/// (spec.md §4.C.3 "Incoming establishment").
pub type IncomingConnectionSender = mpsc::Sender<VirtualSocketHandle>;

struct Shared {
    enabled: Arc<AtomicBool>,
    writer_tx: mpsc::Sender<WriterItem>,
    virtual_sockets: Mutex<HashMap<String, Entry>>,
    pending_responses: Mutex<HashMap<[u8; SALTED_HASH_LENGTH], oneshot::Sender<ConnectionResponseStatus>>>,
    incoming_callbacks: Mutex<HashMap<String, IncomingConnectionSender>>,
    config: Config,
}

/// Multiplexes virtual sockets over one physical `AsyncRead + AsyncWrite`
/// connection. Construction spawns the reader, writer, and offload
/// tasks described in spec.md §5; dropping the last clone does not by
/// itself tear the socket down — call [`MultiplexSocket::shutdown`].
#[derive(Clone)]
pub struct MultiplexSocket {
    shared: Arc<Shared>,
}

impl MultiplexSocket {
    /// Spawns the reader/writer tasks for `connection` and returns the
    /// handle callers use to establish virtual sockets and register
    /// incoming-connection callbacks.
    pub fn spawn<C>(connection: C, config: Config) -> Self
    where
        C: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        let (reader_half, writer_half) = tokio::io::split(connection);
        let (writer_tx, writer_rx) = mpsc::channel(OUTGOING_QUEUE_DEPTH);

        let shared = Arc::new(Shared {
            enabled: Arc::new(AtomicBool::new(false)),
            writer_tx,
            virtual_sockets: Mutex::new(HashMap::new()),
            pending_responses: Mutex::new(HashMap::new()),
            incoming_callbacks: Mutex::new(HashMap::new()),
            config,
        });

        tokio::spawn(run_writer(writer_half, writer_rx));
        tokio::spawn(run_reader(reader_half, Arc::clone(&shared)));

        Self { shared }
    }

    /// Registers `sender` to receive freshly accepted incoming virtual
    /// sockets for `service_id` (spec.md §4.C.3 "Incoming
    /// establishment").
    pub fn register_incoming_connection_callback(&self, service_id: impl Into<String>, sender: IncomingConnectionSender) {
        self.shared.incoming_callbacks.lock().insert(service_id.into(), sender);
    }

    /// `establish_virtual_socket(service_id)` (spec.md §4.C.3 "Outgoing
    /// establishment"). Returns `None` on `NOT_LISTENING`, timeout, or
    /// disconnect.
    pub async fn establish_virtual_socket(&self, service_id: &str) -> Option<VirtualSocketHandle> {
        let salt = crate::wire::base64url::encode(&rand_salt());
        let hash = salted_service_id_hash(service_id, &salt);

        let (tx, rx) = oneshot::channel();
        self.shared.pending_responses.lock().insert(hash, tx);

        let frame = MultiplexFrame::connection_request(hash, salt);
        if self.write_control(frame.encode()).await.is_err() {
            self.shared.pending_responses.lock().remove(&hash);
            return None;
        }

        let status = match tokio::time::timeout(self.shared.config.multiplex_socket_connection_response_timeout, rx).await {
            Ok(Ok(status)) => status,
            _ => {
                self.shared.pending_responses.lock().remove(&hash);
                return None;
            }
        };

        if status != ConnectionResponseStatus::ConnectionAccepted {
            return None;
        }

        Some(self.register_virtual_socket(service_id.to_string(), hash, false))
    }

    /// Closes `handle`'s virtual socket and, if still enabled, notifies
    /// the peer with a DISCONNECTION frame (spec.md §4.C.3 "DISCONNECTION
    /// frame"). When it was the last virtual socket, shuts the whole
    /// multiplex socket down.
    pub async fn close_virtual_socket(&self, key: &str) {
        let removed = self.shared.virtual_sockets.lock().remove(key).is_some();
        if !removed {
            return;
        }
        if self.shared.enabled.load(Ordering::Acquire) {
            if let Some(hash) = decode_key(key) {
                let frame = MultiplexFrame::disconnection(hash);
                let _ = self.write_data(frame.encode()).await;
            }
        }
        if self.shared.virtual_sockets.lock().is_empty() {
            self.shutdown().await;
        }
    }

    /// Shuts the multiplex socket down (spec.md §4.C.4): cancels
    /// pending futures with IO-failure, closes every virtual socket,
    /// and clears incoming-connection callbacks. The physical reader
    /// and writer tasks observe the channel closures and exit on their
    /// own.
    pub async fn shutdown(&self) {
        debug!("shutting down multiplex socket");
        for (_, tx) in self.shared.pending_responses.lock().drain() {
            let _ = tx.send(ConnectionResponseStatus::NotListening);
        }
        self.shared.virtual_sockets.lock().clear();
        self.shared.incoming_callbacks.lock().clear();
    }

    /// Creates the "first" virtual socket on a sentinel salt before any
    /// real salt has been observed from the peer (spec.md §3 "Virtual
    /// socket"); its key is remapped the moment a DATA frame carrying a
    /// real salt for `service_id` arrives.
    #[must_use]
    pub fn establish_first_virtual_socket(&self, service_id: &str) -> VirtualSocketHandle {
        let hash = salted_service_id_hash(service_id, FIRST_SENTINEL_SALT);
        self.register_virtual_socket(service_id.to_string(), hash, true)
    }

    fn register_virtual_socket(&self, service_id: String, hash: [u8; SALTED_HASH_LENGTH], is_first: bool) -> VirtualSocketHandle {
        let key = hash_key(&hash);
        let (incoming_tx, incoming_rx) = mpsc::channel(VIRTUAL_SOCKET_INCOMING_DEPTH);
        let socket = Arc::new(VirtualSocket {
            service_id,
            key: Mutex::new(key.clone()),
            is_first,
            writer: self.shared.writer_tx.clone(),
            salted_hash: Mutex::new(hash),
            enabled: Arc::clone(&self.shared.enabled),
            incoming_tx: incoming_tx.clone(),
        });
        self.shared.virtual_sockets.lock().insert(
            key,
            Entry {
                socket: Arc::clone(&socket),
                incoming: incoming_tx,
            },
        );
        VirtualSocketHandle { socket, incoming: incoming_rx }
    }

    async fn write_control(&self, bytes: Vec<u8>) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        if self.shared.writer_tx.send(WriterItem { bytes, ack: Some(tx) }).await.is_err() {
            return Err(Error::Cancelled);
        }
        match tokio::time::timeout(self.shared.config.mediums_frame_write_timeout, rx).await {
            Ok(Ok(result)) => result,
            _ => Err(Error::Timeout { what: "multiplex control write" }),
        }
    }

    async fn write_data(&self, bytes: Vec<u8>) -> Result<()> {
        self.shared
            .writer_tx
            .send(WriterItem { bytes, ack: None })
            .await
            .map_err(|_| Error::Cancelled)
    }

}

async fn run_writer<W: AsyncWrite + Unpin>(mut writer: W, mut queue: mpsc::Receiver<WriterItem>) {
    while let Some(item) = queue.recv().await {
        let result = framing::write_framed(&mut writer, &item.bytes).await;
        if let Err(err) = &result {
            warn!(%err, "multiplex physical write failed");
        }
        if let Some(ack) = item.ack {
            let _ = ack.send(result);
        }
    }
}

async fn run_reader<R: AsyncRead + Unpin>(mut reader: R, shared: Arc<Shared>) {
    loop {
        let len = match framing::read_int(&mut reader).await {
            Ok(len) => len,
            Err(err) => {
                debug!(%err, "multiplex physical read failed, stopping reader");
                break;
            }
        };
        if len <= 0 || len > shared.config.max_frame_length {
            warn!(len, "ignoring out-of-range multiplex frame length");
            continue;
        }
        let mut bytes = vec![0u8; len as usize];
        if let Err(err) = reader.read_exact(&mut bytes).await {
            debug!(%err, "multiplex physical read failed, stopping reader");
            break;
        }

        match MultiplexFrame::decode(&bytes) {
            Some(frame) => {
                shared_enable(&shared);
                dispatch(&shared, frame).await;
            }
            None => {
                let sole = sole_virtual_socket(&shared);
                match sole {
                    Some(entry) => {
                        let _ = entry.send(bytes).await;
                    }
                    None => debug!("dropping unparseable multiplex frame"),
                }
            }
        }
    }
}

fn shared_enable(shared: &Arc<Shared>) {
    if !shared.enabled.swap(true, Ordering::AcqRel) {
        trace!("multiplex socket enabled by first valid frame from peer");
    }
}

fn sole_virtual_socket(shared: &Shared) -> Option<mpsc::Sender<Vec<u8>>> {
    let map = shared.virtual_sockets.lock();
    if map.len() == 1 {
        map.values().next().map(|entry| entry.incoming.clone())
    } else {
        None
    }
}

async fn dispatch(shared: &Arc<Shared>, frame: MultiplexFrame) {
    match frame.body {
        Body::Control(ControlBody::ConnectionRequest) => {
            handle_connection_request(shared, frame.salted_service_id_hash, frame.salt).await;
        }
        Body::Control(ControlBody::ConnectionResponse { status }) => {
            if let Some(tx) = shared.pending_responses.lock().remove(&frame.salted_service_id_hash) {
                let _ = tx.send(status);
            }
        }
        Body::Control(ControlBody::Disconnection) => {
            let key = hash_key(&frame.salted_service_id_hash);
            shared.virtual_sockets.lock().remove(&key);
        }
        Body::Data(data) => route_data(shared, frame.salted_service_id_hash, frame.salt, data).await,
    }
}

async fn handle_connection_request(shared: &Arc<Shared>, hash: [u8; SALTED_HASH_LENGTH], salt: Option<String>) {
    let Some(salt) = salt else {
        return;
    };

    let callbacks: Vec<(String, IncomingConnectionSender)> = shared
        .incoming_callbacks
        .lock()
        .iter()
        .map(|(id, sender)| (id.clone(), sender.clone()))
        .collect();

    let matched = callbacks
        .into_iter()
        .find(|(service_id, _)| salted_service_id_hash(service_id, &salt) == hash);

    let Some((service_id, sender)) = matched else {
        let response = MultiplexFrame::connection_response(hash, ConnectionResponseStatus::NotListening);
        let _ = shared.writer_tx.send(WriterItem { bytes: response.encode(), ack: None }).await;
        return;
    };

    let response = MultiplexFrame::connection_response(hash, ConnectionResponseStatus::ConnectionAccepted);
    if shared.writer_tx.send(WriterItem { bytes: response.encode(), ack: None }).await.is_err() {
        return;
    }

    let key = hash_key(&hash);
    let (incoming_tx, incoming_rx) = mpsc::channel(VIRTUAL_SOCKET_INCOMING_DEPTH);
    let socket = Arc::new(VirtualSocket {
        service_id,
        key: Mutex::new(key.clone()),
        is_first: shared.virtual_sockets.lock().is_empty(),
        writer: shared.writer_tx.clone(),
        salted_hash: Mutex::new(hash),
        enabled: Arc::clone(&shared.enabled),
        incoming_tx: incoming_tx.clone(),
    });
    shared.virtual_sockets.lock().insert(
        key,
        Entry {
            socket: Arc::clone(&socket),
            incoming: incoming_tx,
        },
    );

    let _ = sender.send(VirtualSocketHandle { socket, incoming: incoming_rx }).await;
}

/// Remaps the sentinel-salted "first" virtual socket to its real key
/// once the peer's salt is observed, then delivers the data
/// (spec.md §4.C.3 "DATA frame routing"). When more than one "first"
/// socket is still on the sentinel salt at once the choice between
/// them is unspecified (spec.md §9 open question); this picks whichever
/// one a `HashMap` iteration visits first.
async fn route_data(shared: &Arc<Shared>, hash: [u8; SALTED_HASH_LENGTH], salt: Option<String>, data: Vec<u8>) {
    let direct_key = hash_key(&hash);
    let sender = {
        let mut map = shared.virtual_sockets.lock();
        if let Some(entry) = map.get(&direct_key) {
            Some(entry.incoming.clone())
        } else if salt.is_some() {
            let sentinel_key = map
                .iter()
                .find(|(_, entry)| entry.socket.is_first() && entry.socket.key() == hash_key(&salted_service_id_hash(entry.socket.service_id(), FIRST_SENTINEL_SALT)))
                .map(|(key, _)| key.clone());
            if let Some(old_key) = sentinel_key {
                let entry = map.remove(&old_key).expect("found key must be present");
                entry.socket.remap(direct_key.clone(), hash);
                let sender = entry.incoming.clone();
                map.insert(direct_key, entry);
                Some(sender)
            } else {
                None
            }
        } else {
            None
        }
    };

    match sender {
        Some(sender) => {
            let _ = sender.send(data).await;
        }
        None => debug!("dropping DATA frame for unknown virtual socket"),
    }
}

fn decode_key(key: &str) -> Option<[u8; SALTED_HASH_LENGTH]> {
    let bytes = crate::wire::base64url::decode(key)?;
    if bytes.len() != SALTED_HASH_LENGTH {
        return None;
    }
    let mut out = [0u8; SALTED_HASH_LENGTH];
    out.copy_from_slice(&bytes);
    Some(out)
}

fn rand_salt() -> [u8; 8] {
    use rand::RngCore;
    let mut bytes = [0u8; 8];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::duplex;

    #[tokio::test]
    async fn outgoing_establish_times_out_without_peer_response() {
        let (connection, _peer) = duplex(4096);
        let mut config = Config::default();
        config.multiplex_socket_connection_response_timeout = std::time::Duration::from_millis(20);
        let socket = MultiplexSocket::spawn(connection, config);

        let handle = socket.establish_virtual_socket("service_2").await;
        assert!(handle.is_none());
    }

    #[tokio::test]
    async fn incoming_connection_request_fires_matching_callback() {
        let (connection, mut peer) = duplex(4096);
        let socket = MultiplexSocket::spawn(connection, Config::default());

        let (tx, mut rx) = mpsc::channel(1);
        socket.register_incoming_connection_callback("service_2", tx);

        let salt = "J7frzSmHK-VBTHjCKpf4ew".to_string();
        let hash = salted_service_id_hash("service_2", &salt);
        let request = MultiplexFrame::connection_request(hash, salt);
        framing::write_framed(&mut peer, &request.encode()).await.unwrap();

        let handle = tokio::time::timeout(std::time::Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .expect("callback should fire");
        assert_eq!(handle.socket.service_id(), "service_2");
    }
}
