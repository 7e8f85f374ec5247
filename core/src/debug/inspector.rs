//! TCP inspector debug service
//!
//! A [`DebugService`] that lets a remote client list attached environments,
//! fetch their sources through the script loader, and resume environments
//! held at entry. Requests and responses are newline-delimited JSON:
//!
//! ```text
//! -> {"command":"list"}
//! <- {"status":"debuggees","debuggees":[{"id":1,"path":"a.wat","ready":true,"suspended":false}]}
//! -> {"command":"source","id":1}
//! <- {"status":"source","id":1,"path":"a.wat","source":"(module ...)"}
//! -> {"command":"resume","id":1}
//! <- {"status":"resumed","id":1}
//! ```

use std::io::{self, BufRead, BufReader, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Sender};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};

use super::service::{
    DebugConfig, DebugOptions, DebugService, DebugServiceError, ResumeSignal,
};
use crate::environment::EnvironmentHandle;
use crate::registry::SourceLoader;

/// How often blocked accept/read calls re-check for shutdown
const POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Client request
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum InspectorRequest {
    List,
    Source { id: u64 },
    Resume { id: u64 },
}

/// Attached environment as seen by clients
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct DebuggeeInfo {
    pub id: u64,
    pub path: String,
    /// Global scope has been handed to the service
    pub ready: bool,
    /// Waiting for a resume request
    pub suspended: bool,
}

/// Server response
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum InspectorResponse {
    Debuggees { debuggees: Vec<DebuggeeInfo> },
    Source { id: u64, path: String, source: String },
    Resumed { id: u64 },
    NotFound { id: u64 },
    Error { message: String },
}

struct Debuggee {
    path: String,
    options: DebugOptions,
    ready: bool,
    resume: Option<Sender<()>>,
}

#[derive(Default)]
struct Shared {
    debuggees: Mutex<HashMap<EnvironmentHandle, Debuggee>>,
    shutdown: AtomicBool,
}

impl Shared {
    fn debuggees(&self) -> MutexGuard<'_, HashMap<EnvironmentHandle, Debuggee>> {
        self.debuggees.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn handle_request(&self, request: InspectorRequest, loader: &SourceLoader) -> InspectorResponse {
        match request {
            InspectorRequest::List => {
                let mut debuggees: Vec<DebuggeeInfo> = self
                    .debuggees()
                    .iter()
                    .map(|(handle, d)| DebuggeeInfo {
                        id: handle.id(),
                        path: d.path.clone(),
                        ready: d.ready,
                        suspended: d.resume.is_some(),
                    })
                    .collect();
                debuggees.sort_by_key(|d| d.id);
                InspectorResponse::Debuggees { debuggees }
            }
            InspectorRequest::Source { id } => {
                let handle = EnvironmentHandle::from_raw(id);
                let path = self.debuggees().get(&handle).map(|d| d.path.clone());
                match path.and_then(|path| loader(handle, &path).map(|source| (path, source))) {
                    Some((path, source)) => InspectorResponse::Source {
                        id,
                        path,
                        source: source.to_string(),
                    },
                    None => InspectorResponse::NotFound { id },
                }
            }
            InspectorRequest::Resume { id } => {
                let handle = EnvironmentHandle::from_raw(id);
                let mut debuggees = self.debuggees();
                match debuggees.get_mut(&handle) {
                    Some(debuggee) => {
                        if let Some(resume) = debuggee.resume.take() {
                            let _ = resume.send(());
                        }
                        InspectorResponse::Resumed { id }
                    }
                    None => InspectorResponse::NotFound { id },
                }
            }
        }
    }
}

/// Newline-delimited JSON inspector served over TCP
#[derive(Default)]
pub struct InspectorService {
    config: Option<DebugConfig>,
    loader: Option<SourceLoader>,
    shared: Arc<Shared>,
    local_addr: Option<SocketAddr>,
    server: Option<JoinHandle<()>>,
}

impl InspectorService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Address the service is listening on, once started
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }
}

impl DebugService for InspectorService {
    fn configure(
        &mut self,
        config: &DebugConfig,
        loader: SourceLoader,
    ) -> Result<(), DebugServiceError> {
        if self.server.is_some() {
            return Err(DebugServiceError::Configure(
                "cannot reconfigure a running inspector".to_string(),
            ));
        }
        self.config = Some(config.clone());
        self.loader = Some(loader);
        Ok(())
    }

    fn install(
        &mut self,
        handle: EnvironmentHandle,
        path: &str,
        options: &DebugOptions,
    ) -> Result<(), DebugServiceError> {
        let mut debuggees = self.shared.debuggees();
        if debuggees.contains_key(&handle) {
            return Err(DebugServiceError::Install {
                handle,
                reason: "already installed".to_string(),
            });
        }
        debuggees.insert(
            handle,
            Debuggee {
                path: path.to_string(),
                options: *options,
                ready: false,
                resume: None,
            },
        );
        Ok(())
    }

    fn start(&mut self) -> Result<(), DebugServiceError> {
        let (Some(config), Some(loader)) = (&self.config, &self.loader) else {
            return Err(DebugServiceError::Start("inspector not configured".to_string()));
        };
        if self.server.is_some() {
            return Err(DebugServiceError::Start("inspector already started".to_string()));
        }

        let addr = format!("{}:{}", config.bind_host, config.port);
        let listener = TcpListener::bind(&addr)
            .map_err(|e| DebugServiceError::Start(format!("failed to bind {}: {}", addr, e)))?;
        listener
            .set_nonblocking(true)
            .map_err(|e| DebugServiceError::Start(format!("failed to set non-blocking: {}", e)))?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| DebugServiceError::Start(format!("failed to get local addr: {}", e)))?;

        let shared = Arc::clone(&self.shared);
        let loader = Arc::clone(loader);
        let server = thread::Builder::new()
            .name("debug-inspector".to_string())
            .spawn(move || accept_loop(listener, shared, loader))
            .map_err(|e| DebugServiceError::Start(format!("failed to spawn server: {}", e)))?;

        tracing::info!(%local_addr, "debug inspector listening");
        self.local_addr = Some(local_addr);
        self.server = Some(server);
        Ok(())
    }

    fn add_debuggee(
        &mut self,
        handle: EnvironmentHandle,
    ) -> Result<Option<ResumeSignal>, DebugServiceError> {
        let mut debuggees = self.shared.debuggees();
        let debuggee = debuggees
            .get_mut(&handle)
            .ok_or_else(|| DebugServiceError::AddDebuggee {
                handle,
                reason: "not installed".to_string(),
            })?;
        debuggee.ready = true;

        if debuggee.options.suspended {
            let (tx, rx) = mpsc::channel();
            debuggee.resume = Some(tx);
            tracing::info!(%handle, path = %debuggee.path, "debuggee suspended until resumed");
            return Ok(Some(rx));
        }
        Ok(None)
    }

    fn uninstall(&mut self, handle: EnvironmentHandle) -> Result<(), DebugServiceError> {
        // Dropping the entry drops any pending resume sender, releasing the waiter
        self.shared
            .debuggees()
            .remove(&handle)
            .map(|_| ())
            .ok_or_else(|| DebugServiceError::Uninstall {
                handle,
                reason: "not installed".to_string(),
            })
    }

    fn stop(&mut self) -> Result<(), DebugServiceError> {
        self.shared.shutdown.store(true, Ordering::SeqCst);
        self.shared.debuggees().clear();
        if let Some(server) = self.server.take() {
            server
                .join()
                .map_err(|_| DebugServiceError::Stop("inspector thread panicked".to_string()))?;
        }
        self.local_addr = None;
        Ok(())
    }
}

impl Drop for InspectorService {
    fn drop(&mut self) {
        if self.server.is_some()
            && let Err(e) = self.stop()
        {
            tracing::warn!("inspector shutdown failed: {}", e);
        }
    }
}

fn accept_loop(listener: TcpListener, shared: Arc<Shared>, loader: SourceLoader) {
    let mut connections: Vec<JoinHandle<()>> = Vec::new();

    while !shared.shutdown.load(Ordering::SeqCst) {
        match listener.accept() {
            Ok((stream, peer)) => {
                tracing::debug!(%peer, "inspector client connected");
                let shared = Arc::clone(&shared);
                let loader = Arc::clone(&loader);
                let spawned = thread::Builder::new()
                    .name(format!("debug-client-{}", peer))
                    .spawn(move || {
                        if let Err(e) = serve_client(stream, &shared, &loader) {
                            tracing::debug!(%peer, "inspector client closed: {}", e);
                        }
                    });
                match spawned {
                    Ok(handle) => connections.push(handle),
                    Err(e) => tracing::warn!("failed to spawn inspector client thread: {}", e),
                }
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => thread::sleep(POLL_INTERVAL),
            Err(e) => {
                tracing::warn!("inspector accept failed: {}", e);
                thread::sleep(POLL_INTERVAL);
            }
        }
        connections.retain(|c| !c.is_finished());
    }

    for connection in connections {
        let _ = connection.join();
    }
}

fn serve_client(stream: TcpStream, shared: &Shared, loader: &SourceLoader) -> io::Result<()> {
    stream.set_nonblocking(false)?;
    stream.set_read_timeout(Some(POLL_INTERVAL))?;
    let mut writer = stream.try_clone()?;
    let mut reader = BufReader::new(stream);
    let mut line = Vec::new();

    while !shared.shutdown.load(Ordering::SeqCst) {
        match reader.read_until(b'\n', &mut line) {
            Ok(0) => return Ok(()),
            Ok(_) if line.ends_with(b"\n") => {
                let response = match serde_json::from_slice::<InspectorRequest>(line.trim_ascii()) {
                    Ok(request) => shared.handle_request(request, loader),
                    Err(e) => InspectorResponse::Error {
                        message: format!("invalid request: {}", e),
                    },
                };
                line.clear();
                serde_json::to_writer(&mut writer, &response)?;
                writer.write_all(b"\n")?;
                writer.flush()?;
            }
            // Partial line: keep what we have and read on
            Ok(_) => {}
            Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}
