//! Request loop for `serve` mode

use std::os::unix::net::UnixStream;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use anyhow::Result;
use tracing::{debug, info, warn};

use super::{Request, Response, Server, read_frame, write_message};
use crate::constants::ipc::ACCEPT_POLL_MS;
use crate::service::ConfigService;

/// Serve clients one at a time until `shutdown` is set or a client asks to stop
pub fn serve(service: &ConfigService, server: &Server, shutdown: &AtomicBool) -> Result<()> {
    info!(socket = %server.path().display(), "IPC listener started");

    while !shutdown.load(Ordering::Relaxed) {
        let Some(stream) = server.try_accept()? else {
            thread::sleep(Duration::from_millis(ACCEPT_POLL_MS));
            continue;
        };
        debug!("client connected");

        match handle_client(service, stream) {
            Ok(true) => {
                info!("Received shutdown request via IPC");
                shutdown.store(true, Ordering::Relaxed);
            }
            Ok(false) => debug!("client disconnected"),
            Err(e) => warn!(error = ?e, "IPC connection closed or error"),
        }
    }

    info!("IPC listener stopped");
    Ok(())
}

/// Answer requests until the client hangs up; `true` if it asked for shutdown
fn handle_client(service: &ConfigService, mut stream: UnixStream) -> Result<bool> {
    while let Some(frame) = read_frame(&mut stream)? {
        let request = match serde_json::from_slice::<Request>(&frame) {
            Ok(request) => request,
            Err(e) => {
                warn!(error = %e, "rejecting undecodable request");
                write_message(&mut stream, &Response::failure("BadRequest", e.to_string()))?;
                continue;
            }
        };

        let stop = request == Request::Shutdown;
        let response = service.handle(request);
        write_message(&mut stream, &response)?;
        if stop {
            return Ok(true);
        }
    }
    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::store::ProfileStore;
    use crate::ipc::Client;
    use crate::script::LaunchScript;
    use serde_json::json;
    use std::io::Write;
    use std::sync::Arc;
    use tempfile::TempDir;

    #[test]
    fn serves_requests_until_shutdown() {
        let dir = TempDir::new().unwrap();
        let socket = dir.path().join("profiles.sock");
        let service = ConfigService::new(
            ProfileStore::new(dir.path().join("profiles.toml")),
            LaunchScript::new(dir.path().join("lsfg")),
        );
        let server = Server::bind_to(socket.clone()).unwrap();
        let shutdown = Arc::new(AtomicBool::new(false));

        let flag = Arc::clone(&shutdown);
        let worker = thread::spawn(move || serve(&service, &server, &flag));

        let mut client = Client::connect_to(&socket).unwrap();
        let pong = client.request(&Request::Ping).unwrap();
        assert_eq!(pong.message.as_deref(), Some("pong"));

        let updated = client
            .request(&Request::UpdateField {
                profile: None,
                field: "multiplier".into(),
                value: json!(3),
            })
            .unwrap();
        assert!(updated.success);
        assert_eq!(updated.values.unwrap()["multiplier"], json!(3));

        client.stream.write_all(&4u32.to_le_bytes()).unwrap();
        client.stream.write_all(b"nope").unwrap();
        let bad = client.recv_response().unwrap();
        assert_eq!(bad.error.unwrap().kind, "BadRequest");

        let bye = client.request(&Request::Shutdown).unwrap();
        assert!(bye.success);

        worker.join().unwrap().unwrap();
        assert!(shutdown.load(Ordering::Relaxed));
        assert!(!socket.exists());
    }
}
