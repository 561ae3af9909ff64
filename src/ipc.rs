use serde::{Deserialize, Serialize};
use std::io;
use std::os::unix::fs::FileTypeExt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::debounce::{Event, StatusReport};
use crate::error::InstanceError;
use crate::settings::SettingsPatch;

const SOCKET_NAME: &str = "glasstint.sock";
const ACCEPT_RETRY_DELAY: Duration = Duration::from_millis(250);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum IpcCommand {
    #[serde(rename = "set")]
    Set(SettingsPatch),
    #[serde(rename = "get_status")]
    GetStatus,
    #[serde(rename = "force_apply")]
    ForceApply,
    #[serde(rename = "reset_day")]
    ResetDay,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum IpcResponse {
    #[serde(rename = "ok")]
    Ok,
    #[serde(rename = "status")]
    Status(StatusReport),
    #[serde(rename = "error")]
    Error { message: String },
}

pub fn default_socket_path() -> PathBuf {
    match std::env::var_os("XDG_RUNTIME_DIR") {
        Some(dir) if !dir.is_empty() => PathBuf::from(dir).join(SOCKET_NAME),
        _ => std::env::temp_dir().join(format!(
            "glasstint-{}.sock",
            nix::unistd::Uid::current()
        )),
    }
}

/// Binds the control socket, which doubles as the single-instance lock.
///
/// Fails with `AlreadyRunning` if something answers on `path`. A socket
/// file nobody listens on is left over from a crashed run and is replaced.
pub async fn claim_instance(path: &Path) -> Result<UnixListener, InstanceError> {
    if UnixStream::connect(path).await.is_ok() {
        return Err(InstanceError::AlreadyRunning(path.to_path_buf()));
    }
    let io_err = |source| InstanceError::Io {
        path: path.to_path_buf(),
        source,
    };
    match std::fs::symlink_metadata(path) {
        Ok(meta) if meta.file_type().is_socket() => {
            debug!("removing stale socket {}", path.display());
            std::fs::remove_file(path).map_err(io_err)?;
        }
        Ok(_) => {
            return Err(io_err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                "path exists and is not a socket",
            )));
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(io_err(e)),
    }
    UnixListener::bind(path).map_err(io_err)
}

pub async fn serve(listener: UnixListener, events: mpsc::UnboundedSender<Event>) {
    loop {
        match listener.accept().await {
            Ok((stream, _)) => {
                let events = events.clone();
                tokio::spawn(async move {
                    if let Err(e) = handle_client(stream, events).await {
                        debug!("ipc client error: {e}");
                    }
                });
            }
            Err(e) => {
                warn!("ipc accept failed: {e}");
                tokio::time::sleep(ACCEPT_RETRY_DELAY).await;
            }
        }
    }
}

async fn handle_client(
    stream: UnixStream,
    events: mpsc::UnboundedSender<Event>,
) -> std::io::Result<()> {
    let (read, mut write) = stream.into_split();
    let mut lines = BufReader::new(read).lines();

    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let response = match serde_json::from_str::<IpcCommand>(line) {
            Ok(command) => dispatch(command, &events).await,
            Err(e) => IpcResponse::Error {
                message: format!("Invalid command: {e}"),
            },
        };
        let mut json = serde_json::to_string(&response).map_err(std::io::Error::other)?;
        json.push('\n');
        write.write_all(json.as_bytes()).await?;
        write.flush().await?;
    }
    Ok(())
}

async fn dispatch(command: IpcCommand, events: &mpsc::UnboundedSender<Event>) -> IpcResponse {
    let event = match command {
        IpcCommand::Set(patch) => Event::SettingsChanged(patch),
        IpcCommand::ForceApply => Event::ForceApply,
        IpcCommand::ResetDay => Event::ResetDay,
        IpcCommand::GetStatus => {
            let (reply_tx, reply_rx) = oneshot::channel();
            if events.send(Event::Status(reply_tx)).is_err() {
                return stopped();
            }
            return match reply_rx.await {
                Ok(report) => IpcResponse::Status(report),
                Err(_) => stopped(),
            };
        }
    };
    debug!("ipc: {event:?}");
    match events.send(event) {
        Ok(()) => IpcResponse::Ok,
        Err(_) => stopped(),
    }
}

fn stopped() -> IpcResponse {
    IpcResponse::Error {
        message: "daemon is shutting down".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::compute;
    use crate::scheduling::DayPhase;
    use crate::settings::{SettingsSnapshot, TimeOfDay};
    use tempfile::tempdir;

    #[test]
    fn parses_set_command_with_partial_fields() {
        let cmd: IpcCommand =
            serde_json::from_str(r#"{"type":"set","brightness_pct":40,"schedule_off_time":"07:30"}"#)
                .unwrap();
        assert_eq!(
            cmd,
            IpcCommand::Set(SettingsPatch {
                brightness_pct: Some(40),
                schedule_off_time: TimeOfDay::new(7, 30),
                ..SettingsPatch::default()
            })
        );
    }

    #[test]
    fn parses_unit_commands() {
        for (raw, want) in [
            (r#"{"type":"get_status"}"#, IpcCommand::GetStatus),
            (r#"{"type":"force_apply"}"#, IpcCommand::ForceApply),
            (r#"{"type":"reset_day"}"#, IpcCommand::ResetDay),
        ] {
            assert_eq!(serde_json::from_str::<IpcCommand>(raw).unwrap(), want);
        }
        assert!(serde_json::from_str::<IpcCommand>(r#"{"type":"explode"}"#).is_err());
        assert!(
            serde_json::from_str::<IpcCommand>(r#"{"type":"set","schedule_on_time":"25:00"}"#)
                .is_err()
        );
    }

    #[test]
    fn status_response_is_tagged() {
        let settings = SettingsSnapshot::default();
        let response = IpcResponse::Status(StatusReport {
            arguments: compute(&settings),
            settings,
            last_applied: None,
            phase: DayPhase::Night,
        });
        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value["type"], "status");
        assert_eq!(value["phase"], "night");
        assert_eq!(value["settings"]["schedule_on_time"], "19:00");
        assert_eq!(value["arguments"]["temperature_k"], 6500);
    }

    #[tokio::test]
    async fn second_claim_is_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ctl.sock");
        let _listener = claim_instance(&path).await.unwrap();
        let err = claim_instance(&path).await.unwrap_err();
        assert!(matches!(err, InstanceError::AlreadyRunning(_)));
    }

    #[tokio::test]
    async fn stale_socket_is_replaced() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ctl.sock");
        drop(std::os::unix::net::UnixListener::bind(&path).unwrap());
        assert!(path.exists());
        claim_instance(&path).await.unwrap();
    }

    #[tokio::test]
    async fn regular_file_at_socket_path_is_left_alone() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        std::fs::write(&path, "precious").unwrap();

        let err = claim_instance(&path).await.unwrap_err();
        assert!(
            matches!(&err, InstanceError::Io { source, .. } if source.kind() == io::ErrorKind::AlreadyExists)
        );
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "precious");
    }

    #[tokio::test]
    async fn client_commands_become_events() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ctl.sock");
        let listener = claim_instance(&path).await.unwrap();
        let (tx, mut rx) = mpsc::unbounded_channel();
        tokio::spawn(serve(listener, tx));

        let stream = UnixStream::connect(&path).await.unwrap();
        let (read, mut write) = stream.into_split();
        let mut lines = BufReader::new(read).lines();

        write
            .write_all(b"{\"type\":\"set\",\"vibrance_pct\":25}\n")
            .await
            .unwrap();
        let reply = lines.next_line().await.unwrap().unwrap();
        assert_eq!(reply, r#"{"type":"ok"}"#);
        match rx.recv().await.unwrap() {
            Event::SettingsChanged(patch) => assert_eq!(patch.vibrance_pct, Some(25)),
            other => panic!("unexpected event {other:?}"),
        }

        write.write_all(b"garbage\n").await.unwrap();
        let reply = lines.next_line().await.unwrap().unwrap();
        assert!(reply.starts_with(r#"{"type":"error""#));

        write.write_all(b"{\"type\":\"get_status\"}\n").await.unwrap();
        let settings = SettingsSnapshot::default();
        match rx.recv().await.unwrap() {
            Event::Status(reply) => reply
                .send(StatusReport {
                    arguments: compute(&settings),
                    settings,
                    last_applied: None,
                    phase: DayPhase::Day,
                })
                .unwrap(),
            other => panic!("unexpected event {other:?}"),
        }
        let reply = lines.next_line().await.unwrap().unwrap();
        let value: serde_json::Value = serde_json::from_str(&reply).unwrap();
        assert_eq!(value["type"], "status");
        assert_eq!(value["phase"], "day");
    }
}
