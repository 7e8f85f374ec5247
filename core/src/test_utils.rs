//! Shared test utilities for integration and unit tests

use std::io::{self, Write};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use hashbrown::HashSet;

use crate::bridge::{HostBridge, ScriptValue};
use crate::debug::{DebugConfig, DebugOptions, DebugService, DebugServiceError, ResumeSignal};
use crate::engine::{
    EngineError, EngineRuntime, ErrorReport, ErrorReporter, RuntimeLimits, ScriptEngine,
};
use crate::environment::EnvironmentHandle;
use crate::registry::SourceLoader;

// ============================================================================
// Output capture
// ============================================================================

/// Cloneable in-memory `Write` sink
#[derive(Clone, Default)]
pub struct SharedBuffer {
    bytes: Arc<Mutex<Vec<u8>>>,
}

impl SharedBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contents(&self) -> String {
        String::from_utf8(self.bytes.lock().unwrap().clone()).unwrap()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        // Byte-at-a-time writes make any missing output lock show up as interleaving
        let mut bytes = self.bytes.lock().unwrap();
        for byte in buf {
            bytes.push(*byte);
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

// ============================================================================
// Test Engine Implementation
// ============================================================================

/// Stage a [`FakeEngine`] can be told to fail at
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FakeStage {
    Runtime,
    Global,
    StandardLibrary,
    Registration,
}

/// Tracks concurrent `create_runtime` calls
#[derive(Debug, Default)]
pub struct CreationCounter {
    active: AtomicUsize,
    max_active: AtomicUsize,
    created: AtomicUsize,
}

impl CreationCounter {
    pub fn max_active(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }

    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }
}

/// Line-oriented toy engine for exercising the host
///
/// Each non-empty line of a script is one statement:
///
/// - `log(<args>)` - args are `"strings"`, numbers, `true`/`false`,
///   `null`, or `obj` (an object)
/// - `sleep(<ms>)`
/// - `throw "<message>"`
/// - lines starting with `//` are ignored
#[derive(Debug, Default)]
pub struct FakeEngine {
    pub fail_at: Option<FakeStage>,
    pub creations: Arc<CreationCounter>,
}

impl FakeEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_at(stage: FakeStage) -> Self {
        Self {
            fail_at: Some(stage),
            ..Self::default()
        }
    }
}

impl ScriptEngine for FakeEngine {
    type Runtime = FakeRuntime;

    fn create_runtime(
        &self,
        limits: &RuntimeLimits,
        reporter: ErrorReporter,
    ) -> Result<FakeRuntime, EngineError> {
        let active = self.creations.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.creations.max_active.fetch_max(active, Ordering::SeqCst);
        std::thread::sleep(Duration::from_millis(2));
        self.creations.active.fetch_sub(1, Ordering::SeqCst);

        if self.fail_at == Some(FakeStage::Runtime) {
            return Err(EngineError::Runtime("out of memory".to_string()));
        }
        self.creations.created.fetch_add(1, Ordering::SeqCst);
        Ok(FakeRuntime {
            reporter,
            fail_at: self.fail_at,
            limits: *limits,
        })
    }
}

pub struct FakeRuntime {
    reporter: ErrorReporter,
    fail_at: Option<FakeStage>,
    pub limits: RuntimeLimits,
}

#[derive(Default)]
pub struct FakeScope {
    standard: bool,
    bridge: Option<Arc<HostBridge>>,
}

impl EngineRuntime for FakeRuntime {
    type Scope = FakeScope;

    fn new_global(&mut self) -> Result<FakeScope, EngineError> {
        if self.fail_at == Some(FakeStage::Global) {
            return Err(EngineError::Global("could not create a global object".to_string()));
        }
        Ok(FakeScope::default())
    }

    fn init_standard_bindings(&mut self, scope: &mut FakeScope) -> Result<(), EngineError> {
        if self.fail_at == Some(FakeStage::StandardLibrary) {
            return Err(EngineError::Global("unable to init standard classes".to_string()));
        }
        scope.standard = true;
        Ok(())
    }

    fn register_host_functions(
        &mut self,
        scope: &mut FakeScope,
        bridge: Arc<HostBridge>,
    ) -> Result<(), EngineError> {
        if self.fail_at == Some(FakeStage::Registration) {
            return Err(EngineError::Registration("unable to define functions".to_string()));
        }
        scope.bridge = Some(bridge);
        Ok(())
    }

    fn evaluate(
        &mut self,
        scope: &mut FakeScope,
        source: &str,
        filename: &str,
    ) -> Result<(), EngineError> {
        assert!(scope.standard, "standard bindings must be installed first");

        for (index, raw) in source.lines().enumerate() {
            let line = raw.trim();
            let lineno = index as u32 + 1;
            let fail = |message: String| {
                let report = ErrorReport::new(filename, Some(lineno), message);
                self.reporter.report(report.clone());
                Err(EngineError::Evaluation(report))
            };

            if line.is_empty() || line.starts_with("//") {
                continue;
            }
            if let Some(rest) = line.strip_prefix("throw ") {
                return fail(rest.trim_matches('"').to_string());
            }
            if let Some(ms) = call_body(line, "sleep") {
                match ms.trim().parse::<u64>() {
                    Ok(ms) => std::thread::sleep(Duration::from_millis(ms)),
                    Err(_) => return fail(format!("bad sleep argument: {}", ms)),
                }
                continue;
            }
            if let Some(body) = call_body(line, "log") {
                let Some(bridge) = &scope.bridge else {
                    return fail("log is not defined".to_string());
                };
                let args = match parse_args(body) {
                    Ok(args) => args,
                    Err(message) => return fail(message),
                };
                if let Err(e) = bridge.log(&args) {
                    return fail(e.to_string());
                }
                continue;
            }
            return fail(format!("syntax error: {}", line));
        }
        Ok(())
    }
}

fn call_body<'a>(line: &'a str, name: &str) -> Option<&'a str> {
    line.strip_prefix(name)?
        .trim_start()
        .strip_prefix('(')?
        .trim_end()
        .trim_end_matches(';')
        .strip_suffix(')')
}

fn parse_args(body: &str) -> Result<Vec<ScriptValue>, String> {
    let mut args = Vec::new();
    let mut rest = body.trim();
    while !rest.is_empty() {
        let (token, tail) = if let Some(quoted) = rest.strip_prefix('"') {
            let end = quoted.find('"').ok_or("unterminated string")?;
            (
                ScriptValue::String(quoted[..end].to_string()),
                &quoted[end + 1..],
            )
        } else {
            let end = rest.find(',').unwrap_or(rest.len());
            let word = rest[..end].trim();
            let value = match word {
                "true" => ScriptValue::Bool(true),
                "false" => ScriptValue::Bool(false),
                "null" => ScriptValue::Null,
                "undefined" => ScriptValue::Undefined,
                "obj" => ScriptValue::Object("[object Object]".to_string()),
                number => ScriptValue::Number(
                    number
                        .parse()
                        .map_err(|_| format!("unknown identifier: {}", number))?,
                ),
            };
            (value, &rest[end..])
        };
        args.push(token);
        rest = tail.trim_start();
        rest = rest.strip_prefix(',').unwrap_or(rest).trim_start();
    }
    Ok(args)
}

// ============================================================================
// Test Debug Service Implementation
// ============================================================================

/// Calls observed by a [`RecordingService`]
#[derive(Default)]
pub struct ServiceLog {
    pub configures: u32,
    pub installs: u32,
    pub starts: u32,
    pub debuggees: u32,
    pub uninstalls: u32,
    pub stops: u32,
    pub installed: HashSet<EnvironmentHandle>,
    /// Installed count observed at the moment stop was called
    pub installed_at_stop: Option<usize>,
    pub loader: Option<SourceLoader>,
}

/// Which service calls should fail
#[derive(Debug, Clone, Copy, Default)]
pub struct Failures {
    pub configure: bool,
    pub install: bool,
    pub start: bool,
    pub add_debuggee: bool,
    pub uninstall: bool,
    /// Hand out a resume signal from `add_debuggee`
    pub suspend: bool,
}

/// In-memory debug service that records every call
#[derive(Clone, Default)]
pub struct RecordingService {
    log: Arc<Mutex<ServiceLog>>,
    pub failures: Failures,
    resumers: Arc<Mutex<Vec<std::sync::mpsc::Sender<()>>>>,
}

impl RecordingService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(failures: Failures) -> Self {
        Self {
            failures,
            ..Self::default()
        }
    }

    pub fn log(&self) -> MutexGuard<'_, ServiceLog> {
        self.log.lock().unwrap()
    }

    /// Release every suspended debuggee
    pub fn resume_all(&self) {
        for tx in self.resumers.lock().unwrap().drain(..) {
            let _ = tx.send(());
        }
    }

    pub fn pending_resumes(&self) -> usize {
        self.resumers.lock().unwrap().len()
    }
}

impl DebugService for RecordingService {
    fn configure(
        &mut self,
        _config: &DebugConfig,
        loader: SourceLoader,
    ) -> Result<(), DebugServiceError> {
        let mut log = self.log();
        log.configures += 1;
        if self.failures.configure {
            return Err(DebugServiceError::Configure("bad address".to_string()));
        }
        log.loader = Some(loader);
        Ok(())
    }

    fn install(
        &mut self,
        handle: EnvironmentHandle,
        _path: &str,
        _options: &DebugOptions,
    ) -> Result<(), DebugServiceError> {
        let mut log = self.log();
        log.installs += 1;
        if self.failures.install {
            return Err(DebugServiceError::Install {
                handle,
                reason: "refused".to_string(),
            });
        }
        log.installed.insert(handle);
        Ok(())
    }

    fn start(&mut self) -> Result<(), DebugServiceError> {
        let mut log = self.log();
        log.starts += 1;
        if self.failures.start {
            return Err(DebugServiceError::Start("address in use".to_string()));
        }
        Ok(())
    }

    fn add_debuggee(
        &mut self,
        handle: EnvironmentHandle,
    ) -> Result<Option<ResumeSignal>, DebugServiceError> {
        self.log().debuggees += 1;
        if self.failures.add_debuggee {
            return Err(DebugServiceError::AddDebuggee {
                handle,
                reason: "no scope".to_string(),
            });
        }
        if self.failures.suspend {
            let (tx, rx) = std::sync::mpsc::channel();
            self.resumers.lock().unwrap().push(tx);
            return Ok(Some(rx));
        }
        Ok(None)
    }

    fn uninstall(&mut self, handle: EnvironmentHandle) -> Result<(), DebugServiceError> {
        let mut log = self.log();
        log.uninstalls += 1;
        log.installed.remove(&handle);
        if self.failures.uninstall {
            return Err(DebugServiceError::Uninstall {
                handle,
                reason: "gone".to_string(),
            });
        }
        Ok(())
    }

    fn stop(&mut self) -> Result<(), DebugServiceError> {
        let mut log = self.log();
        log.stops += 1;
        let installed = log.installed.len();
        log.installed_at_stop = Some(installed);
        Ok(())
    }
}
