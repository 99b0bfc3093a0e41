//! Endpoint glue: owns the sync protocol and runs the single dispatch loop that
//! applies transport events to it.

use std::path::{Path, PathBuf};

use anyhow::Context;
use dictation_core::{
    AudioTransferPayload, EventOutcome, RecordingStore, Role, SendOutcome, SyncProtocol,
    AUDIO_EXTENSION,
};
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use crate::config::Config;
use crate::store::DirectoryStore;
use crate::transport::{self, EventReceiver, Link};

type Protocol = SyncProtocol<Link, DirectoryStore>;

/// How the companion hands its recording to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendMode {
    UserInfo,
    File,
}

/// Run the host until Ctrl+C: store every recording that arrives and confirm it.
pub async fn run_host(config: &Config) -> anyhow::Result<()> {
    let listener = TcpListener::bind(("0.0.0.0", config.port))
        .await
        .with_context(|| format!("cannot listen on port {}", config.port))?;
    tracing::info!(port = config.port, dir = %config.recordings_dir.display(), "host listening");

    let (events_tx, mut events_rx) = mpsc::unbounded_channel();
    // The host never dials out, so reactivation requests have no listener.
    let (link, _) = Link::new(Role::Host, events_tx);
    let mut protocol = SyncProtocol::new(
        Role::Host,
        link.clone(),
        DirectoryStore::new(&config.recordings_dir),
    );
    tokio::spawn(transport::serve(listener, link, config.inbox_dir()));

    let shutdown = crate::shutdown_signal();
    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            event = events_rx.recv() => {
                let Some(event) = event else { break };
                report_host(protocol.handle_event(event));
            }
            _ = &mut shutdown => break,
        }
    }
    Ok(())
}

fn report_host(outcome: EventOutcome) {
    match outcome {
        EventOutcome::RecordingReceived {
            name, confirmed, ..
        } => {
            tracing::info!(file = %name, confirmed, "successfully received data from paired companion");
        }
        EventOutcome::ConnectivityUpdated(reachable) => {
            tracing::info!(reachable, "companion connectivity");
        }
        EventOutcome::Rejected(e) => tracing::debug!(error = %e, "event rejected"),
        _ => {}
    }
}

/// Companion run: keep `input` as a new recording, send it once the session is
/// up, and exit after the host's delete command or when the session goes away.
pub async fn run_companion(config: &Config, input: &Path, mode: SendMode) -> anyhow::Result<()> {
    let audio = tokio::fs::read(input)
        .await
        .with_context(|| format!("cannot read {}", input.display()))?;

    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let (link, activate_rx) = Link::new(Role::Companion, events_tx);
    let mut protocol = SyncProtocol::new(
        Role::Companion,
        link.clone(),
        DirectoryStore::new(&config.recordings_dir),
    );
    let payload = protocol.record(&chrono::Local::now(), audio)?;
    tokio::spawn(transport::connect(
        config.peer,
        link,
        config.inbox_dir(),
        activate_rx,
    ));

    let shutdown = crate::shutdown_signal();
    tokio::pin!(shutdown);
    tokio::select! {
        r = companion_loop(&mut protocol, events_rx, payload, mode) => r,
        _ = &mut shutdown => Ok(()),
    }
}

async fn companion_loop(
    protocol: &mut Protocol,
    mut events_rx: EventReceiver,
    payload: AudioTransferPayload,
    mode: SendMode,
) -> anyhow::Result<()> {
    let mut pending = Some(payload);
    while let Some(event) = events_rx.recv().await {
        match protocol.handle_event(event) {
            EventOutcome::ConnectivityUpdated(true) => {
                let Some(p) = pending.take() else { continue };
                match send(protocol, &p, mode)? {
                    SendOutcome::Sent => {}
                    SendOutcome::Skipped => pending = Some(p),
                    SendOutcome::Failed(e) => {
                        tracing::warn!(file = %p.file_name, error = %e, "recording kept on companion");
                        return Ok(());
                    }
                }
            }
            EventOutcome::ConnectivityUpdated(false) => {
                let kept = protocol.recordings()?;
                tracing::info!(kept = kept.len(), "session unavailable, recordings kept on companion");
                return Ok(());
            }
            EventOutcome::RecordingsDeleted(n) => {
                tracing::info!(deleted = n, "host confirmed receipt");
                return Ok(());
            }
            EventOutcome::Rejected(e) => tracing::warn!(error = %e, "event rejected"),
            _ => {}
        }
    }
    Ok(())
}

fn send(
    protocol: &mut Protocol,
    payload: &AudioTransferPayload,
    mode: SendMode,
) -> anyhow::Result<SendOutcome> {
    Ok(match mode {
        SendMode::UserInfo => protocol.send_recording(payload),
        SendMode::File => {
            let path: PathBuf = protocol.store().path_of(&payload.file_name)?;
            protocol.send_recording_file(&path)
        }
    })
}

/// Recordings kept in the configured directory.
pub fn list(config: &Config) -> anyhow::Result<Vec<String>> {
    let store = DirectoryStore::new(&config.recordings_dir);
    Ok(store.list(AUDIO_EXTENSION)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_in(dir: &Path, port: u16) -> Config {
        Config {
            port,
            peer: std::net::SocketAddr::from(([127, 0, 0, 1], port)),
            recordings_dir: dir.to_path_buf(),
        }
    }

    #[tokio::test]
    async fn companion_keeps_recording_when_host_absent() {
        let dir = tempfile::tempdir().unwrap();
        // Bind then drop to get a port nobody listens on.
        let port = {
            let l = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            l.local_addr().unwrap().port()
        };
        let input = dir.path().join("capture.raw");
        std::fs::write(&input, [1u8, 2, 3]).unwrap();
        let config = config_in(&dir.path().join("companion"), port);

        run_companion(&config, &input, SendMode::UserInfo)
            .await
            .unwrap();
        assert_eq!(list(&config).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn companion_to_host_end_to_end() {
        for mode in [SendMode::UserInfo, SendMode::File] {
            let dir = tempfile::tempdir().unwrap();
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            let port = listener.local_addr().unwrap().port();
            let host_config = config_in(&dir.path().join("host"), port);
            let companion_config = config_in(&dir.path().join("companion"), port);

            let (events_tx, mut events_rx) = mpsc::unbounded_channel();
            let (link, _activate) = Link::new(Role::Host, events_tx);
            let mut host = SyncProtocol::new(
                Role::Host,
                link.clone(),
                DirectoryStore::new(&host_config.recordings_dir),
            );
            tokio::spawn(transport::serve(listener, link, host_config.inbox_dir()));
            let host_task = tokio::spawn(async move {
                while let Some(event) = events_rx.recv().await {
                    if let EventOutcome::RecordingReceived { name, .. } = host.handle_event(event)
                    {
                        return name;
                    }
                }
                String::new()
            });

            let input = dir.path().join("capture.raw");
            std::fs::write(&input, [1u8, 2, 3]).unwrap();
            run_companion(&companion_config, &input, mode).await.unwrap();

            let name = host_task.await.unwrap();
            assert!(name.ends_with(".m4a"), "{:?}: {}", mode, name);
            assert_eq!(list(&host_config).unwrap(), vec![name.clone()]);
            assert_eq!(
                std::fs::read(host_config.recordings_dir.join(&name)).unwrap(),
                vec![1, 2, 3]
            );
            assert!(list(&companion_config).unwrap().is_empty());
        }
    }
}
