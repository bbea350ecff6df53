//! Shared test support: scripted engine doubles and sandbox construction.
//!
//! The Python double interprets a deliberately tiny statement language —
//! just enough surface (print, open/read/write, raise, spin loops) to
//! exercise the supervisor pipeline without a real interpreter. The bash
//! double drives the confined filesystem exactly as a real engine would,
//! which is the point: confinement must hold against the engine's own
//! filesystem calls.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use heimdall::config::SandboxConfig;
use heimdall::coordinator::Coordinator;
use heimdall::engine::{
    BashEngine, BashEngineProvider, BashOutput, CapturedOutput, EngineError, EngineLimits,
    KillSwitch, PythonEngine, PythonEngineProvider,
};
use heimdall::secure_fs::SandboxFs;
use heimdall::vfs::VirtualFs;

// ============================================================================
// Python engine double
// ============================================================================

pub struct FlagKill(Arc<AtomicBool>);

impl KillSwitch for FlagKill {
    fn kill(&self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

pub struct ScriptedPython {
    vfs: Arc<dyn VirtualFs>,
    killed: Arc<AtomicBool>,
    captured: CapturedOutput,
    cwd: String,
    installed: Arc<Mutex<Vec<String>>>,
    broken_installer: bool,
}

impl ScriptedPython {
    fn resolve(&self, path: &str) -> String {
        if path.starts_with('/') {
            path.to_owned()
        } else {
            format!("{}/{}", self.cwd.trim_end_matches('/'), path)
        }
    }

    fn eval(&mut self, expr: &str) -> Result<Option<String>, EngineError> {
        let expr = expr.trim();
        // open('f').read()
        if let Some(path) = expr
            .strip_prefix("open('")
            .and_then(|rest| rest.strip_suffix("').read()"))
        {
            let virt = self.resolve(path);
            let bytes = self.vfs.read_file(&virt).map_err(|e| {
                EngineError::Execution(format!("FileNotFoundError: {e}"))
            })?;
            return Ok(Some(String::from_utf8_lossy(&bytes).into_owned()));
        }
        // integer arithmetic: a+b+...
        if expr.bytes().all(|b| b.is_ascii_digit() || b == b'+')
            && expr.split('+').all(|part| !part.is_empty())
        {
            let sum: i64 = expr
                .split('+')
                .map(|part| part.parse::<i64>().unwrap_or(0))
                .sum();
            return Ok(Some(sum.to_string()));
        }
        // string literal
        if let Some(inner) = expr
            .strip_prefix('\'')
            .and_then(|rest| rest.strip_suffix('\''))
        {
            return Ok(Some(inner.to_owned()));
        }
        Err(EngineError::Execution(format!(
            "NameError: name '{expr}' is not defined"
        )))
    }

    fn exec_line(&mut self, line: &str) -> Result<Option<String>, EngineError> {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with("import ") {
            return Ok(None);
        }
        if line.contains("while True") {
            loop {
                if self.killed.load(Ordering::SeqCst) {
                    return Err(EngineError::Killed);
                }
                std::thread::sleep(Duration::from_millis(2));
            }
        }
        if let Some(message) = line.strip_prefix("raise ") {
            return Err(EngineError::Execution(
                message.replace("('", ": ").replace("')", ""),
            ));
        }
        if let Some(inner) = line
            .strip_prefix("print(")
            .and_then(|rest| rest.strip_suffix(')'))
        {
            let value = self.eval(inner)?.unwrap_or_default();
            self.captured.stdout.push_str(&value);
            self.captured.stdout.push('\n');
            return Ok(None);
        }
        // open('f', 'w').write('text')
        if let Some(rest) = line.strip_prefix("open('") {
            if let Some((path, rest)) = rest
                .split_once("', 'w').write('")
                .or_else(|| rest.split_once("','w').write('"))
            {
                if let Some(text) = rest.strip_suffix("')") {
                    let virt = self.resolve(path);
                    self.vfs
                        .write_file(&virt, text.as_bytes())
                        .map_err(|e| EngineError::Execution(format!("OSError: {e}")))?;
                    return Ok(Some(text.len().to_string()));
                }
            }
        }
        self.eval(line)
    }
}

impl PythonEngine for ScriptedPython {
    fn run(&mut self, code: &str) -> Result<Option<String>, EngineError> {
        let mut last = None;
        for line in code.lines() {
            last = self.exec_line(line)?;
        }
        Ok(last)
    }

    fn run_sync(&mut self, code: &str) -> Result<(), EngineError> {
        for line in code.lines() {
            let line = line.trim();
            if let Some(path) = line
                .strip_prefix("os.chdir('")
                .and_then(|rest| rest.strip_suffix("')"))
            {
                self.cwd = path.to_owned();
            }
        }
        Ok(())
    }

    fn autoload_packages(&mut self, _code: &str) -> Result<(), EngineError> {
        Ok(())
    }

    fn load_installer(&mut self) -> Result<(), EngineError> {
        if self.broken_installer {
            Err(EngineError::Internal("installer module missing".into()))
        } else {
            Ok(())
        }
    }

    fn install_package(&mut self, spec: &str) -> Result<(), EngineError> {
        if self.broken_installer || spec.starts_with("nonexistent") {
            return Err(EngineError::Internal(format!("no distribution for {spec}")));
        }
        self.installed
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(spec.to_owned());
        Ok(())
    }

    fn begin_capture(&mut self) {
        self.captured = CapturedOutput::default();
    }

    fn take_output(&mut self) -> CapturedOutput {
        std::mem::take(&mut self.captured)
    }

    fn kill_switch(&self) -> Arc<dyn KillSwitch> {
        Arc::new(FlagKill(self.killed.clone()))
    }
}

pub struct ScriptedPythonProvider {
    pub installed: Arc<Mutex<Vec<String>>>,
    pub broken_installer: bool,
}

impl Default for ScriptedPythonProvider {
    fn default() -> Self {
        Self {
            installed: Arc::new(Mutex::new(Vec::new())),
            broken_installer: false,
        }
    }
}

impl PythonEngineProvider for ScriptedPythonProvider {
    fn create(&self, vfs: Arc<dyn VirtualFs>) -> Result<Box<dyn PythonEngine>, EngineError> {
        Ok(Box::new(ScriptedPython {
            vfs,
            killed: Arc::new(AtomicBool::new(false)),
            captured: CapturedOutput::default(),
            cwd: "/workspace".to_owned(),
            installed: self.installed.clone(),
            broken_installer: self.broken_installer,
        }))
    }
}

// ============================================================================
// Bash engine double
// ============================================================================

pub struct ScriptedBash {
    fs: Arc<dyn SandboxFs>,
}

impl ScriptedBash {
    fn run_one(&self, command: &str, cwd: &str, out: &mut BashOutput) -> bool {
        let command = command.trim();
        let resolve = |path: &str| self.fs.resolve(cwd, path);

        // echo TEXT > FILE / echo TEXT
        if let Some(rest) = command.strip_prefix("echo ") {
            if let Some((text, file)) = rest.split_once(" > ") {
                let path = match resolve(file.trim()) {
                    Ok(path) => path,
                    Err(e) => {
                        out.stderr.push_str(&format!("echo: {e}\n"));
                        out.exit_code = 1;
                        return false;
                    }
                };
                let mut data = text.trim().to_owned();
                data.push('\n');
                match self.fs.write(&path, data.as_bytes()) {
                    Ok(()) => return true,
                    Err(e) => {
                        out.stderr.push_str(&format!("echo: {e}\n"));
                        out.exit_code = 1;
                        return false;
                    }
                }
            }
            out.stdout.push_str(rest.trim());
            out.stdout.push('\n');
            return true;
        }
        if let Some(rest) = command.strip_prefix("ln -s ") {
            let mut parts = rest.split_whitespace();
            let (Some(target), Some(link)) = (parts.next(), parts.next()) else {
                out.stderr.push_str("ln: missing operand\n");
                out.exit_code = 1;
                return false;
            };
            let link = match resolve(link) {
                Ok(link) => link,
                Err(e) => {
                    out.stderr.push_str(&format!("ln: {e}\n"));
                    out.exit_code = 1;
                    return false;
                }
            };
            match self.fs.symlink(target, &link) {
                Ok(()) => true,
                Err(e) => {
                    out.stderr.push_str(&format!("ln: {e}\n"));
                    out.exit_code = 1;
                    false
                }
            }
        } else if let Some(file) = command.strip_prefix("cat ") {
            let path = match resolve(file.trim()) {
                Ok(path) => path,
                Err(e) => {
                    out.stderr.push_str(&format!("cat: {e}\n"));
                    out.exit_code = 1;
                    return false;
                }
            };
            match self.fs.read(&path) {
                Ok(content) => {
                    out.stdout.push_str(&content);
                    true
                }
                Err(e) => {
                    out.stderr.push_str(&format!("cat: {e}\n"));
                    out.exit_code = 1;
                    false
                }
            }
        } else if let Some(rest) = command.strip_prefix("mkdir ") {
            let (recursive, dir) = match rest.trim().strip_prefix("-p ") {
                Some(dir) => (true, dir),
                None => (false, rest.trim()),
            };
            match resolve(dir).and_then(|path| self.fs.mkdir(&path, recursive)) {
                Ok(()) => true,
                Err(e) => {
                    out.stderr.push_str(&format!("mkdir: {e}\n"));
                    out.exit_code = 1;
                    false
                }
            }
        } else if let Some(rest) = command.strip_prefix("rm ") {
            let (recursive, file) = match rest.trim().strip_prefix("-r ") {
                Some(file) => (true, file),
                None => (false, rest.trim()),
            };
            match resolve(file).and_then(|path| self.fs.rm(&path, recursive)) {
                Ok(()) => true,
                Err(e) => {
                    out.stderr.push_str(&format!("rm: {e}\n"));
                    out.exit_code = 1;
                    false
                }
            }
        } else {
            out.stderr
                .push_str(&format!("bash: {command}: command not found\n"));
            out.exit_code = 127;
            false
        }
    }
}

impl BashEngine for ScriptedBash {
    fn exec(&self, command: &str, cwd: Option<&str>) -> Result<BashOutput, EngineError> {
        let cwd = cwd.unwrap_or("/workspace");
        let mut out = BashOutput {
            stdout: String::new(),
            stderr: String::new(),
            exit_code: 0,
        };
        for part in command.split("&&") {
            if !self.run_one(part, cwd, &mut out) {
                break;
            }
        }
        Ok(out)
    }
}

pub struct ScriptedBashProvider;

impl BashEngineProvider for ScriptedBashProvider {
    fn create(
        &self,
        fs: Arc<dyn SandboxFs>,
        _limits: EngineLimits,
    ) -> Result<Box<dyn BashEngine>, EngineError> {
        Ok(Box::new(ScriptedBash { fs }))
    }
}

// ============================================================================
// Construction helpers
// ============================================================================

static TRACING: std::sync::Once = std::sync::Once::new();

/// Route tracing output through the test harness, once per binary.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    });
}

pub async fn sandbox(config: SandboxConfig) -> Coordinator {
    init_tracing();
    Coordinator::new(
        config,
        Arc::new(ScriptedPythonProvider::default()),
        Arc::new(ScriptedBashProvider),
    )
    .await
    .expect("sandbox construction")
}

pub async fn default_sandbox(root: &std::path::Path) -> Coordinator {
    sandbox(SandboxConfig::with_root(root)).await
}
