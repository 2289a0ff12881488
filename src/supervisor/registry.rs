use crate::config::RegistrySettings;
use crate::error::{MinderError, Result};
use crate::process::{spawn, wait, Clock, ExitClass, MonotonicClock, SpawnSpec};
use nix::errno::Errno;
use nix::unistd::{access, AccessFlags, Pid};
use std::ffi::OsStr;
use std::fs::{self, Metadata};
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Filesystem identity of a service executable.
///
/// Stable across renames; a replaced or re-created file gets a new one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ServiceIdentity {
    pub dev: u64,
    pub ino: u64,
}

impl ServiceIdentity {
    pub fn of(metadata: &Metadata) -> Self {
        Self {
            dev: metadata.dev(),
            ino: metadata.ino(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceEntry {
    pub identity: ServiceIdentity,
    /// Where the executable was last found
    pub path: PathBuf,
    pub pid: Option<Pid>,
    /// How the previous child of this service ended
    pub last_exit: Option<ExitClass>,
}

/// Keeps one supervised instance of every executable found in a set of
/// directories
pub struct ServiceRegistry<C: Clock = MonotonicClock> {
    entries: Vec<ServiceEntry>,
    capacity: usize,
    respawn_program: String,
    scan_interval: Duration,
    clock: C,
    /// Entries discovered by the scans of the current cycle
    found: Vec<usize>,
}

impl<C: Clock> ServiceRegistry<C> {
    pub fn new(settings: &RegistrySettings, clock: C) -> Self {
        Self {
            entries: Vec::new(),
            capacity: settings.max_services,
            respawn_program: settings.respawn_program.clone(),
            scan_interval: settings.scan_interval(),
            clock,
            found: Vec::new(),
        }
    }

    pub fn entries(&self) -> &[ServiceEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of services with a live child
    pub fn running(&self) -> usize {
        self.entries.iter().filter(|e| e.pid.is_some()).count()
    }

    /// Scan, reap and spawn forever; returns only when a directory
    /// cannot be read
    pub fn run(&mut self, dirs: &[PathBuf]) -> Result<()> {
        info!("supervising services in {} director(ies)", dirs.len());
        loop {
            self.cycle(dirs)?;
            if let Err(errno) = self.clock.pause(self.scan_interval) {
                error!("failed to sleep: {} (error {})", errno.desc(), errno as i32);
            }
        }
    }

    /// One reap, discovery and spawn pass over `dirs`
    pub fn cycle(&mut self, dirs: &[PathBuf]) -> Result<()> {
        // discoveries of a cycle that failed midway are void
        self.found.clear();
        self.reap();
        for dir in dirs {
            self.scan(dir)?;
        }
        self.spawn_pending();
        Ok(())
    }

    /// Collect every terminated child without blocking and free the
    /// matching entries. Returns how many entries were freed.
    pub fn reap(&mut self) -> usize {
        let (reaped, failure) = wait::drain_terminated();
        if let Some(errno) = failure {
            error!("waitpid() failed: {} (error {})", errno.desc(), errno as i32);
        }

        let mut freed = 0;
        for (pid, status) in reaped {
            match self.entries.iter_mut().find(|e| e.pid == Some(pid)) {
                Some(entry) => {
                    let exit = ExitClass::from_raw(status);
                    info!("service {} (process {}) {}", entry.path.display(), pid, exit);
                    entry.pid = None;
                    entry.last_exit = Some(exit);
                    freed += 1;
                }
                None => debug!("reaped untracked process {}", pid),
            }
        }
        freed
    }

    /// Register every candidate executable directly inside `dir`.
    /// Returns how many candidates were found.
    pub fn scan(&mut self, dir: &Path) -> Result<usize> {
        let listing = fs::read_dir(dir)
            .map_err(|e| MinderError::from_io(format!("reading {}", dir.display()), e))?;

        let mut candidates = 0;
        for dirent in listing {
            let dirent = match dirent {
                Ok(dirent) => dirent,
                Err(e) => {
                    warn!("failed to read an entry of {}: {}", dir.display(), e);
                    continue;
                }
            };

            let name = dirent.file_name();
            if name.is_empty() || name.as_bytes().starts_with(b".") {
                continue;
            }

            let path = dirent.path();
            if self.consider(&path).is_some() {
                candidates += 1;
            }
        }
        Ok(candidates)
    }

    // Find-or-insert `path` if it is a runnable service; returns its slot
    fn consider(&mut self, path: &Path) -> Option<usize> {
        let metadata = match fs::metadata(path) {
            Ok(metadata) => metadata,
            Err(e) => {
                warn!("failed to stat {}: {}; skipping it.", path.display(), e);
                return None;
            }
        };

        if !metadata.is_file() {
            return None;
        }

        if let Err(Errno::EACCES) = access(path, AccessFlags::X_OK) {
            return None;
        }

        let identity = ServiceIdentity::of(&metadata);
        let Some(index) = self.find_or_insert(identity, path) else {
            warn!("could not start {}: too many services.", path.display());
            return None;
        };

        self.entries[index].path = path.to_path_buf();
        self.found.push(index);
        Some(index)
    }

    /// Slot for `identity`, allocating one if there is room
    pub fn find_or_insert(&mut self, identity: ServiceIdentity, path: &Path) -> Option<usize> {
        if let Some(index) = self.entries.iter().position(|e| e.identity == identity) {
            return Some(index);
        }

        if self.entries.len() >= self.capacity {
            return None;
        }

        self.entries.push(ServiceEntry {
            identity,
            path: path.to_path_buf(),
            pid: None,
            last_exit: None,
        });
        Some(self.entries.len() - 1)
    }

    /// Start every service found this cycle that has no live child.
    /// Returns how many were started.
    pub fn spawn_pending(&mut self) -> usize {
        let mut started = 0;
        for index in std::mem::take(&mut self.found) {
            if self.entries[index].pid.is_some() {
                continue;
            }

            let path = self.entries[index].path.clone();
            let program = OsStr::new(&self.respawn_program);
            let spec = match SpawnSpec::new(program, &[program, path.as_os_str()]) {
                Ok(spec) => spec,
                Err(e) => {
                    warn!("cannot start {}: {}", path.display(), e);
                    continue;
                }
            };

            match spawn(&spec) {
                Ok(pid) => {
                    info!("started {} as process {}", path.display(), pid);
                    self.entries[index].pid = Some(pid);
                    started += 1;
                }
                Err(e) => error!("unable to start {}: {}", path.display(), e),
            }
        }
        started
    }
}
