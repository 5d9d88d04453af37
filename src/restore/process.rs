//! Liveness check for the application that owns a live resource

use std::io;
#[cfg(target_os = "linux")]
use std::fs;
#[cfg(target_os = "linux")]
use std::path::Path;
#[cfg(not(target_os = "linux"))]
use std::process::Command;

/// Answers whether a process with a given name is currently running
///
/// The coordinator only ever asks this one question, so tests can swap in a
/// fake instead of enumerating real processes.
pub trait ProcessChecker {
    /// Returns `Ok(true)` if a process named `name` is running.
    ///
    /// An `Err` means the question could not be answered at all.
    fn is_running(&self, name: &str) -> io::Result<bool>;
}

impl<T: ProcessChecker + ?Sized> ProcessChecker for &T {
    fn is_running(&self, name: &str) -> io::Result<bool> {
        (**self).is_running(name)
    }
}

/// Queries the operating system process table
///
/// Names are compared exactly, never as patterns. On Linux a process matches
/// if its kernel name, the file name of its executable, or the file name of
/// its `argv[0]` equals `name`; the kernel name alone is cut to 15 bytes, so
/// it cannot be relied on for longer names.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemProcessChecker;

impl ProcessChecker for SystemProcessChecker {
    #[cfg(target_os = "linux")]
    fn is_running(&self, name: &str) -> io::Result<bool> {
        scan_proc(Path::new("/proc"), name)
    }

    #[cfg(all(unix, not(target_os = "linux")))]
    fn is_running(&self, name: &str) -> io::Result<bool> {
        let output = Command::new("ps").args(["-A", "-o", "comm="]).output()?;
        if !output.status.success() {
            return Err(io::Error::other(format!(
                "ps failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(stdout
            .lines()
            .map(str::trim)
            .any(|comm| comm == name || file_name_of(comm) == name))
    }

    #[cfg(windows)]
    fn is_running(&self, name: &str) -> io::Result<bool> {
        let image = if name.to_lowercase().ends_with(".exe") {
            name.to_string()
        } else {
            format!("{}.exe", name)
        };
        let output = Command::new("tasklist")
            .args(["/FI", &format!("IMAGENAME eq {}", image), "/FO", "CSV", "/NH"])
            .output()?;
        if !output.status.success() {
            return Err(io::Error::other("tasklist failed"));
        }
        // First CSV column is the image name, quoted
        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(stdout.lines().any(|line| {
            line.split(',')
                .next()
                .map(|col| col.trim().trim_matches('"'))
                .is_some_and(|col| col.eq_ignore_ascii_case(&image))
        }))
    }
}

/// Last `/`-separated component of a command or executable path
#[cfg(unix)]
fn file_name_of(command: &str) -> &str {
    command.rsplit('/').next().unwrap_or(command)
}

/// Look through a procfs tree for a process called `name`
#[cfg(target_os = "linux")]
fn scan_proc(proc_root: &Path, name: &str) -> io::Result<bool> {
    for entry in fs::read_dir(proc_root)? {
        // Processes come and go while we walk; skip whatever vanished
        let Ok(entry) = entry else { continue };
        let is_pid = entry
            .file_name()
            .to_str()
            .is_some_and(|n| !n.is_empty() && n.bytes().all(|b| b.is_ascii_digit()));
        if !is_pid {
            continue;
        }
        if process_names(&entry.path()).iter().any(|n| n == name) {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Names a single `/proc/<pid>` entry can be known by
#[cfg(target_os = "linux")]
fn process_names(pid_dir: &Path) -> Vec<String> {
    let mut names = Vec::new();

    if let Ok(comm) = fs::read_to_string(pid_dir.join("comm")) {
        names.push(comm.trim_end_matches('\n').to_string());
    }

    // Unreadable for other users' processes; cmdline below still is
    if let Ok(exe) = fs::read_link(pid_dir.join("exe")) {
        let exe = exe.to_string_lossy();
        let exe = exe.strip_suffix(" (deleted)").unwrap_or(&exe);
        names.push(file_name_of(exe).to_string());
    }

    if let Ok(cmdline) = fs::read(pid_dir.join("cmdline")) {
        if let Some(argv0) = cmdline.split(|b| *b == 0).next().filter(|a| !a.is_empty()) {
            let argv0 = String::from_utf8_lossy(argv0);
            names.push(file_name_of(&argv0).to_string());
        }
    }

    names
}

/// Reports a fixed set of names as running
#[derive(Debug, Default, Clone)]
pub struct StaticProcessChecker {
    running: Vec<String>,
}

impl StaticProcessChecker {
    /// A checker that reports the given names as running
    pub fn running<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            running: names.into_iter().map(Into::into).collect(),
        }
    }

    /// A checker that reports nothing as running
    pub fn none() -> Self {
        Self::default()
    }
}

impl ProcessChecker for StaticProcessChecker {
    fn is_running(&self, name: &str) -> io::Result<bool> {
        Ok(self.running.iter().any(|n| n == name))
    }
}
