use anyhow::Result;
use notify::event::EventKind;
use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{channel, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::adapters::template_loader::{TemplateLoader, TEMPLATE_EXTENSIONS};
use crate::adapters::template_store::TemplateStore;
use crate::config::env_file::EnvOverrides;
use crate::config::SharedRuntime;

enum Msg {
    Fs(notify::Result<Event>),
    Stop,
}

type SharedWatcher = Arc<Mutex<RecommendedWatcher>>;

struct ActiveWatch {
    // Dropping the last handle releases the OS watches.
    watcher: SharedWatcher,
    tx: Sender<Msg>,
    worker: JoinHandle<()>,
}

/// Watches the template tree and the `.env` file.
///
/// Template changes rebuild and republish the whole snapshot; `.env` changes
/// update the live runtime settings. Events arriving within the debounce
/// window are coalesced into one reload.
pub struct FileWatcher {
    env_file: PathBuf,
    debounce: Duration,
    loader: Arc<TemplateLoader>,
    store: Arc<TemplateStore>,
    runtime: SharedRuntime,
    active: Mutex<Option<ActiveWatch>>,
}

impl FileWatcher {
    pub fn new(
        env_file: impl Into<PathBuf>,
        debounce: Duration,
        loader: Arc<TemplateLoader>,
        store: Arc<TemplateStore>,
        runtime: SharedRuntime,
    ) -> Self {
        Self {
            env_file: env_file.into(),
            debounce,
            loader,
            store,
            runtime,
            active: Mutex::new(None),
        }
    }

    pub fn is_running(&self) -> bool {
        self.active.lock().unwrap_or_else(|e| e.into_inner()).is_some()
    }

    /// Starts watching. Calling it while already running only logs a warning.
    pub fn start(&self) -> Result<()> {
        let mut active = self.active.lock().unwrap_or_else(|e| e.into_inner());
        if active.is_some() {
            warn!("File watcher already running");
            return Ok(());
        }

        let (tx, rx) = channel();
        let event_tx = tx.clone();
        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| {
                let _ = event_tx.send(Msg::Fs(res));
            },
            Config::default(),
        )?;

        // A missing template root is picked up once it is created in its
        // parent directory.
        let templates_dir = self.loader.root();
        let mut awaiting_root = None;
        if templates_dir.is_dir() {
            watcher.watch(templates_dir, RecursiveMode::Recursive)?;
            info!("Watching template directory: {}", templates_dir.display());
        } else {
            let parent = env_dir(templates_dir);
            if parent.is_dir() {
                watcher.watch(&parent, RecursiveMode::NonRecursive)?;
                info!(
                    "Template directory does not exist yet, watching {} for it",
                    parent.display()
                );
                awaiting_root = Some(parent);
            } else {
                warn!(
                    "Template directory and its parent do not exist, restart required to watch: {}",
                    templates_dir.display()
                );
            }
        }

        // The directory is watched so editors that replace the file still
        // produce events.
        let env_dir = env_dir(&self.env_file);
        if env_dir.is_dir() {
            watcher.watch(&env_dir, RecursiveMode::NonRecursive)?;
            info!("Watching env file: {}", self.env_file.display());
        } else {
            warn!("Env file directory does not exist, skipping: {}", env_dir.display());
        }

        let watcher = Arc::new(Mutex::new(watcher));
        let context = WatchContext {
            watcher: watcher.clone(),
            awaiting_root,
            env_name: self.env_file.file_name().map(OsString::from),
            env_dir: canonical(&env_dir),
            env_file: self.env_file.clone(),
            last_env: EnvOverrides::load_optional(&self.env_file).ok().flatten().unwrap_or_default(),
            debounce: self.debounce,
            loader: self.loader.clone(),
            store: self.store.clone(),
            runtime: self.runtime.clone(),
        };
        let worker = std::thread::Builder::new()
            .name("gproxy-watcher".to_string())
            .spawn(move || context.run(rx))?;

        *active = Some(ActiveWatch { watcher, tx, worker });
        Ok(())
    }

    /// Stops watching and waits for the worker to exit. No-op when stopped.
    pub fn stop(&self) {
        let Some(active) = self.active.lock().unwrap_or_else(|e| e.into_inner()).take() else {
            debug!("File watcher not running");
            return;
        };

        let _ = active.tx.send(Msg::Stop);
        if active.worker.join().is_err() {
            error!("File watcher thread panicked");
        }
        drop(active.watcher);
        info!("File watcher stopped");
    }
}

impl Drop for FileWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Directory holding `path`; `.` for bare file names.
fn env_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

fn canonical(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| path.to_path_buf())
}

#[derive(Default)]
struct Pending {
    templates: bool,
    env: bool,
}

struct WatchContext {
    watcher: SharedWatcher,
    /// Parent watched while the template root does not exist
    awaiting_root: Option<PathBuf>,
    env_name: Option<OsString>,
    env_dir: PathBuf,
    env_file: PathBuf,
    last_env: EnvOverrides,
    debounce: Duration,
    loader: Arc<TemplateLoader>,
    store: Arc<TemplateStore>,
    runtime: SharedRuntime,
}

impl WatchContext {
    fn run(mut self, rx: Receiver<Msg>) {
        loop {
            let mut pending = Pending::default();
            match rx.recv() {
                Ok(Msg::Fs(res)) => self.record(res, &mut pending),
                Ok(Msg::Stop) | Err(_) => break,
            }
            if !pending.templates && !pending.env {
                continue;
            }

            // Coalesce the rest of the burst
            loop {
                match rx.recv_timeout(self.debounce) {
                    Ok(Msg::Fs(res)) => self.record(res, &mut pending),
                    Ok(Msg::Stop) | Err(RecvTimeoutError::Disconnected) => return,
                    Err(RecvTimeoutError::Timeout) => break,
                }
            }

            if pending.templates {
                self.reload_templates();
            }
            if pending.env {
                self.reload_env();
            }
        }
    }

    fn record(&mut self, res: notify::Result<Event>, pending: &mut Pending) {
        let event = match res {
            Ok(event) => event,
            Err(e) => {
                error!("Watch error: {:?}", e);
                return;
            }
        };
        if !matches!(
            event.kind,
            EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_) | EventKind::Any
        ) {
            return;
        }

        if self.awaiting_root.is_some()
            && matches!(event.kind, EventKind::Create(_) | EventKind::Any)
            && event.paths.iter().any(|p| same_path(p, self.loader.root()))
        {
            self.attach_root(pending);
        }

        for path in &event.paths {
            if self.is_env_file(path) {
                pending.env = true;
            } else if is_template_candidate(path) && is_under(path, self.loader.root()) {
                debug!(path = %path.display(), kind = ?event.kind, "Template change detected");
                pending.templates = true;
            }
        }
    }

    /// Switches from watching the parent to watching the new template root.
    fn attach_root(&mut self, pending: &mut Pending) {
        let root = self.loader.root();
        let mut watcher = self.watcher.lock().unwrap_or_else(|e| e.into_inner());
        if let Err(e) = watcher.watch(root, RecursiveMode::Recursive) {
            error!("Failed to watch template directory {}: {:?}", root.display(), e);
            return;
        }
        info!("Template directory created, watching: {}", root.display());

        if let Some(parent) = self.awaiting_root.take() {
            // The env file may live in the same directory
            if canonical(&parent) != self.env_dir {
                if let Err(e) = watcher.unwatch(&parent) {
                    debug!("Failed to unwatch {}: {:?}", parent.display(), e);
                }
            }
        }
        // Files written before the watch was attached
        pending.templates = true;
    }

    fn is_env_file(&self, path: &Path) -> bool {
        let same_name = match (&self.env_name, path.file_name()) {
            (Some(expected), Some(name)) => expected.as_os_str() == name,
            _ => false,
        };
        same_name && path.parent().map(canonical).as_deref() == Some(self.env_dir.as_path())
    }

    fn reload_templates(&self) {
        info!("Template change detected, reloading...");
        match self.loader.reload_into(&self.store) {
            Ok(count) => info!(
                templates = count,
                reloads = self.store.reload_count(),
                "Templates reloaded"
            ),
            Err(e) => error!("Template reload failed, keeping previous templates: {:#}", e),
        }
    }

    fn reload_env(&mut self) {
        let overrides = match EnvOverrides::load(&self.env_file) {
            Ok(overrides) => overrides,
            Err(e) => {
                error!("Failed to reload {}, keeping current settings: {:#}", self.env_file.display(), e);
                return;
            }
        };

        let changed = {
            let mut runtime = self.runtime.blocking_write();
            overrides.apply_runtime(&mut runtime)
        };
        if changed.is_empty() {
            debug!("Env file changed, no live settings affected");
        } else {
            info!(keys = ?changed, "Applied env file changes");
        }

        let restart = overrides.restart_required(&self.last_env);
        if !restart.is_empty() {
            warn!(keys = ?restart, "Env file changes require a restart to take effect");
        }
        self.last_env = overrides;
    }
}

/// Template files and extensionless paths (directories, possibly removed)
/// outside dotfiles.
fn is_template_candidate(path: &Path) -> bool {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    if name.starts_with('.') {
        return false;
    }
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) => TEMPLATE_EXTENSIONS.contains(&ext),
        None => true,
    }
}

fn same_path(a: &Path, b: &Path) -> bool {
    a == b || canonical(a) == canonical(b)
}

fn is_under(path: &Path, root: &Path) -> bool {
    path.starts_with(root) || path.starts_with(canonical(root))
}
