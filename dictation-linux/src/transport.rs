//! Session transport: one TCP connection between companion and host. Version and
//! role handshake, then length-prefixed packets in both directions. Every inbound
//! packet becomes a `TransportEvent` on the event channel; outbound calls only
//! queue a frame for the writer task.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use dictation_core::protocol::FILE_NAME_KEY;
use dictation_core::recording::is_safe_file_name;
use dictation_core::wire::{self, LEN_SIZE};
use dictation_core::{
    ActivationState, FileMetadata, MessageDict, Packet, Role, Transport, TransportError,
    TransportEvent, UserInfo, PROTOCOL_VERSION,
};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use uuid::Uuid;

const HANDSHAKE_SIZE: usize = 2; // version + role

pub type EventSender = mpsc::UnboundedSender<TransportEvent>;
pub type EventReceiver = mpsc::UnboundedReceiver<TransportEvent>;

/// The currently attached session, if any.
struct Slot {
    activation: ActivationState,
    counterpart_installed: bool,
    writer: Option<mpsc::UnboundedSender<Vec<u8>>>,
    generation: u64,
}

/// Handle to the process's one session. Cloned into the dispatch loop (as the
/// protocol's `Transport`) and into the connection tasks.
#[derive(Clone)]
pub struct Link {
    role: Role,
    slot: Arc<Mutex<Slot>>,
    events: EventSender,
    activate_tx: mpsc::UnboundedSender<()>,
}

impl Link {
    /// Create the link. The receiver yields one item per `activate()` request.
    pub fn new(role: Role, events: EventSender) -> (Self, mpsc::UnboundedReceiver<()>) {
        let (activate_tx, activate_rx) = mpsc::unbounded_channel();
        let link = Self {
            role,
            slot: Arc::new(Mutex::new(Slot {
                activation: ActivationState::NotActivated,
                counterpart_installed: false,
                writer: None,
                generation: 0,
            })),
            events,
            activate_tx,
        };
        (link, activate_rx)
    }

    fn lock(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn emit(&self, event: TransportEvent) {
        let _ = self.events.send(event);
    }

    fn queue(&self, packet: &Packet) -> Result<(), TransportError> {
        let frame = wire::encode_frame(packet)?;
        let slot = self.lock();
        let tx = slot.writer.as_ref().ok_or(TransportError::Unavailable)?;
        tx.send(frame).map_err(|_| TransportError::Closed)
    }

    /// Make a freshly handshaken connection the current session.
    /// Returns its generation, its outbound queue, and whether it displaced another.
    fn attach(&self, peer_role: Option<Role>) -> (u64, mpsc::UnboundedReceiver<Vec<u8>>, bool) {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut slot = self.lock();
        let displaced = slot.writer.replace(tx).is_some();
        slot.generation = slot.generation.wrapping_add(1);
        slot.activation = ActivationState::Activated;
        slot.counterpart_installed = peer_role == Some(self.role.counterpart());
        (slot.generation, rx, displaced)
    }

    /// Drop the session if it is still current. True if it was.
    fn detach(&self, generation: u64) -> bool {
        let mut slot = self.lock();
        if slot.generation != generation {
            return false;
        }
        slot.writer = None;
        slot.activation = ActivationState::NotActivated;
        slot.counterpart_installed = false;
        true
    }

    fn is_current(&self, generation: u64) -> bool {
        self.lock().generation == generation
    }
}

impl Transport for Link {
    fn activation_state(&self) -> ActivationState {
        self.lock().activation
    }

    fn is_counterpart_installed(&self) -> bool {
        self.lock().counterpart_installed
    }

    fn activate(&mut self) {
        let _ = self.activate_tx.send(());
    }

    fn send_message(&mut self, message: MessageDict) -> Result<(), TransportError> {
        self.queue(&Packet::Message(message))
    }

    fn transfer_user_info(&mut self, info: UserInfo) -> Result<(), TransportError> {
        self.queue(&Packet::UserInfo(info))
    }

    fn transfer_file(&mut self, path: &Path, metadata: FileMetadata) -> Result<(), TransportError> {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(str::to_string)
            .or_else(|| metadata.get(FILE_NAME_KEY).cloned())
            .unwrap_or_default();
        // Size and presence are checked here; the read itself runs off the dispatch loop.
        let len = std::fs::metadata(path)?.len();
        if len > u64::from(wire::MAX_FRAME_LEN) {
            return Err(wire::FrameEncodeError::TooLarge.into());
        }
        if self.lock().writer.is_none() {
            return Err(TransportError::Unavailable);
        }
        let link = self.clone();
        let path = path.to_path_buf();
        tokio::spawn(async move {
            let contents = match tokio::fs::read(&path).await {
                Ok(c) => c,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "cannot read file for transfer");
                    return;
                }
            };
            let packet = Packet::File {
                name,
                metadata,
                contents,
            };
            if let Err(e) = link.queue(&packet) {
                tracing::warn!(path = %path.display(), error = %e, "file transfer dropped");
            }
        });
        Ok(())
    }
}

/// Host side: accept companions forever. A new connection replaces the current session.
pub async fn serve(listener: TcpListener, link: Link, inbox: PathBuf) -> std::io::Result<()> {
    loop {
        let (stream, addr) = listener.accept().await?;
        tracing::info!(%addr, "companion connected");
        tokio::spawn(run_session(stream, link.clone(), inbox.clone()));
    }
}

/// Companion side: connect, run the session, then wait for an activation request
/// before connecting again.
pub async fn connect(
    addr: SocketAddr,
    link: Link,
    inbox: PathBuf,
    mut activate_rx: mpsc::UnboundedReceiver<()>,
) {
    loop {
        match TcpStream::connect(addr).await {
            Ok(stream) => run_session(stream, link.clone(), inbox.clone()).await,
            Err(e) => {
                tracing::warn!(%addr, error = %e, "cannot reach host");
                link.emit(TransportEvent::ActivationCompleted {
                    state: ActivationState::NotActivated,
                    error: Some(e.to_string()),
                });
            }
        }
        if activate_rx.recv().await.is_none() {
            break;
        }
    }
}

async fn run_session(stream: TcpStream, link: Link, inbox: PathBuf) {
    let (mut reader, mut writer) = stream.into_split();
    let peer_role = match handshake(&mut reader, &mut writer, link.role).await {
        Ok(r) => r,
        Err(e) => {
            tracing::warn!(error = %e, "handshake failed");
            link.emit(TransportEvent::ActivationCompleted {
                state: ActivationState::NotActivated,
                error: Some(e.to_string()),
            });
            return;
        }
    };
    if peer_role != Some(link.role.counterpart()) {
        tracing::warn!(?peer_role, "peer is not the counterpart app");
    }
    let (generation, mut rx, displaced) = link.attach(peer_role);
    if displaced {
        link.emit(TransportEvent::SessionDeactivated);
    }
    link.emit(TransportEvent::ActivationCompleted {
        state: ActivationState::Activated,
        error: None,
    });
    link.emit(TransportEvent::ReachabilityChanged(true));

    tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if writer.write_all(&frame).await.is_err() {
                break;
            }
            let _ = writer.flush().await;
        }
        let _ = writer.shutdown().await;
    });

    loop {
        let packet = match read_packet(&mut reader).await {
            Ok(p) => p,
            Err(e) => {
                tracing::debug!(error = %e, "session closed");
                break;
            }
        };
        if !link.is_current(generation) {
            break;
        }
        if let Some(event) = into_event(packet, &inbox).await {
            link.emit(event);
        }
    }
    if link.detach(generation) {
        link.emit(TransportEvent::ReachabilityChanged(false));
    }
}

async fn handshake<R, W>(reader: &mut R, writer: &mut W, role: Role) -> std::io::Result<Option<Role>>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    writer.write_all(&[PROTOCOL_VERSION, role.as_byte()]).await?;
    writer.flush().await?;
    let mut buf = [0u8; HANDSHAKE_SIZE];
    reader.read_exact(&mut buf).await?;
    if buf[0] != PROTOCOL_VERSION {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            "unsupported protocol version",
        ));
    }
    Ok(Role::from_byte(buf[1]))
}

async fn read_packet<R: AsyncRead + Unpin>(reader: &mut R) -> std::io::Result<Packet> {
    let mut header = [0u8; LEN_SIZE];
    reader.read_exact(&mut header).await?;
    let len = wire::frame_len(header)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
    let mut body = vec![0u8; len];
    reader.read_exact(&mut body).await?;
    wire::decode_body(&body).map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
}

async fn into_event(packet: Packet, inbox: &Path) -> Option<TransportEvent> {
    match packet {
        Packet::Message(m) => Some(TransportEvent::MessageReceived(m)),
        Packet::UserInfo(info) => Some(TransportEvent::UserInfoReceived(info)),
        Packet::File {
            name,
            metadata,
            contents,
        } => {
            if contents.is_empty() || !is_safe_file_name(&name) {
                tracing::warn!(file = %name, bytes = contents.len(), "dropping file transfer");
                return None;
            }
            match stage_file(inbox, &name, &contents).await {
                Ok(path) => Some(TransportEvent::FileReceived { path, metadata }),
                Err(e) => {
                    tracing::warn!(file = %name, error = %e, "cannot stage received file");
                    None
                }
            }
        }
    }
}

async fn stage_file(inbox: &Path, name: &str, contents: &[u8]) -> std::io::Result<PathBuf> {
    tokio::fs::create_dir_all(inbox).await?;
    let path = inbox.join(format!("{}-{}", Uuid::new_v4(), name));
    tokio::fs::write(&path, contents).await?;
    Ok(path)
}
