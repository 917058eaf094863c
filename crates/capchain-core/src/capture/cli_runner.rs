//! External screenshot tool runner
//!
//! Runs one screenshot executable against a fresh temp path, waits for it
//! under a bound, and decodes whatever it wrote. The temp file is owned by a
//! [`TempCapturePath`] guard, so it is gone on every exit path: success,
//! non-zero exit, timeout, decode failure, or the caller dropping the future.
//!
//! # Timeouts
//!
//! | Invocation | Default | Override |
//! |------------|---------|----------|
//! | non-interactive | 10 s | `CAPCHAIN_CLI_TIMEOUT_MS` |
//! | interactive (own selection UI) | 60 s | `CAPCHAIN_CLI_INTERACTIVE_TIMEOUT_MS` |
//!
//! A tool that exceeds its bound is killed and reported as
//! [`CaptureError::CaptureTimeout`]. On unix each tool leads its own process
//! group and the whole group is killed, so helpers started by wrapper scripts
//! (grimblast, hyprshot) go with it.

use std::{
    ffi::OsString,
    io,
    path::{Path, PathBuf},
    process::{Output, Stdio},
    time::Duration,
};

use tokio::{
    io::{AsyncRead, AsyncReadExt},
    process::{Child, Command},
};

use super::{config::ChainConfig, constants, context::WindowService, image_buffer::ImageBuffer};
use crate::{
    error::{CaptureError, CaptureResult},
    model::{CaptureKind, CaptureOptions, DesktopEnvironment},
    util::temp_files::TempCapturePath,
};

/// One tool command line
///
/// Arguments may contain `{path}`, `{dir}` or `{file}`. When none of them
/// appears, the output path is appended as the last argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolInvocation {
    pub tool:        String,
    pub args:        Vec<String>,
    /// Tool shows its own selection UI and gets the longer bound
    pub interactive: bool,
}

impl ToolInvocation {
    pub fn new(tool: impl Into<String>, args: &[&str]) -> Self {
        Self {
            tool:        tool.into(),
            args:        args.iter().map(|a| a.to_string()).collect(),
            interactive: false,
        }
    }

    /// Splits a whitespace-separated argument template
    pub fn from_template(tool: impl Into<String>, template: &str) -> Self {
        let args: Vec<&str> = template.split_whitespace().collect();
        Self::new(tool, &args)
    }

    pub fn interactive(mut self) -> Self {
        self.interactive = true;
        self
    }

    /// Inserts flags ahead of the template arguments
    pub fn with_leading(mut self, flags: &[&str]) -> Self {
        let mut args: Vec<String> = flags.iter().map(|f| f.to_string()).collect();
        args.append(&mut self.args);
        self.args = args;
        self
    }

    fn render(&self, output: &Path) -> Vec<OsString> {
        let path = output.to_string_lossy();
        let dir = output
            .parent()
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_default();
        let file = output
            .file_name()
            .map(|f| f.to_string_lossy().into_owned())
            .unwrap_or_default();

        let mut placed = false;
        let mut rendered: Vec<OsString> = self
            .args
            .iter()
            .map(|arg| {
                if arg.contains("{path}") || arg.contains("{dir}") || arg.contains("{file}") {
                    placed = true;
                }
                OsString::from(
                    arg.replace("{path}", &path)
                        .replace("{dir}", &dir)
                        .replace("{file}", &file),
                )
            })
            .collect();

        if !placed {
            rendered.push(output.as_os_str().to_os_string());
        }
        rendered
    }
}

/// Spawns screenshot tools and hands back decoded bitmaps
#[derive(Debug, Clone)]
pub struct CliToolRunner {
    temp_root:           PathBuf,
    timeout:             Duration,
    interactive_timeout: Duration,
    search_path:         Option<OsString>,
}

impl Default for CliToolRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl CliToolRunner {
    /// Runner with env-derived timeouts writing under the system temp dir
    pub fn new() -> Self {
        Self {
            temp_root:           std::env::temp_dir(),
            timeout:             Duration::from_millis(constants::cli_timeout_ms()),
            interactive_timeout: Duration::from_millis(constants::cli_interactive_timeout_ms()),
            search_path:         None,
        }
    }

    pub fn from_config(config: &ChainConfig) -> Self {
        Self {
            temp_root:           config.temp_root(),
            timeout:             Duration::from_millis(config.cli_timeout_ms),
            interactive_timeout: Duration::from_millis(config.cli_interactive_timeout_ms),
            search_path:         None,
        }
    }

    pub fn with_temp_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.temp_root = root.into();
        self
    }

    pub fn with_timeouts(mut self, timeout: Duration, interactive_timeout: Duration) -> Self {
        self.timeout = timeout;
        self.interactive_timeout = interactive_timeout;
        self
    }

    /// Looks tools up in `paths` instead of `$PATH`
    pub fn with_search_path(mut self, paths: impl Into<OsString>) -> Self {
        self.search_path = Some(paths.into());
        self
    }

    pub fn temp_root(&self) -> &Path {
        &self.temp_root
    }

    /// Directory holding this runner's temp files
    pub fn temp_dir(&self) -> PathBuf {
        self.temp_root.join(crate::util::temp_files::TEMP_SUBDIR)
    }

    fn bound(&self, interactive: bool) -> Duration {
        if interactive {
            self.interactive_timeout
        } else {
            self.timeout
        }
    }

    /// Full path of an executable, if it can be run
    pub fn resolve(&self, tool: &str) -> Option<PathBuf> {
        let candidate = Path::new(tool);
        if candidate.components().count() > 1 {
            return is_executable(candidate).then(|| candidate.to_path_buf());
        }

        let paths = match &self.search_path {
            Some(paths) => paths.clone(),
            None => std::env::var_os("PATH")?,
        };
        std::env::split_paths(&paths)
            .flat_map(|dir| executable_names(tool).map(move |name| dir.join(name)))
            .find(|path| is_executable(path))
    }

    pub fn is_available(&self, tool: &str) -> bool {
        self.resolve(tool).is_some()
    }

    /// Runs one invocation and decodes its output file
    pub async fn run(&self, invocation: &ToolInvocation) -> CaptureResult<ImageBuffer> {
        let program = self
            .resolve(&invocation.tool)
            .ok_or_else(|| CaptureError::ToolNotFound {
                tool: invocation.tool.clone(),
            })?;
        let output = TempCapturePath::new_in(&self.temp_root, "png")?;
        let bound = self.bound(invocation.interactive);

        tracing::debug!(
            "Running {} (timeout {}ms) -> {}",
            invocation.tool,
            bound.as_millis(),
            output.path().display()
        );

        let mut command = Command::new(&program);
        command
            .args(invocation.render(output.path()))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());
        // Declared after `output` so the group is dead before the file is removed
        let mut process = ToolProcess::spawn(&mut command)?;

        let finished = match tokio::time::timeout(bound, process.wait_with_output()).await {
            Ok(result) => result?,
            Err(_) => {
                process.kill().await;
                tracing::warn!(
                    "{} did not exit within {}ms; killed",
                    invocation.tool,
                    bound.as_millis()
                );
                return Err(CaptureError::CaptureTimeout {
                    duration_ms: bound.as_millis() as u64,
                });
            }
        };

        if !finished.status.success() {
            tracing::debug!(
                "{} failed: {}",
                invocation.tool,
                String::from_utf8_lossy(&finished.stderr).trim()
            );
            return Err(CaptureError::ToolFailed {
                tool:      invocation.tool.clone(),
                exit_code: finished.status.code(),
            });
        }

        match output.written_len() {
            Some(len) if len > 0 => ImageBuffer::load(output.path()),
            _ => Err(CaptureError::NoOutput {
                tool: invocation.tool.clone(),
            }),
        }
    }

    /// Tries each invocation in order and returns the first image
    ///
    /// Tools missing from the search path are skipped without spawning. When
    /// nothing succeeds the last error is returned, which is `ToolNotFound`
    /// for the first candidate if none was installed.
    pub async fn run_first(&self, candidates: &[ToolInvocation]) -> CaptureResult<ImageBuffer> {
        let mut last_error = None;

        for invocation in candidates {
            if !self.is_available(&invocation.tool) {
                tracing::debug!("{} not installed; skipping", invocation.tool);
                continue;
            }
            match self.run(invocation).await {
                Ok(image) => return Ok(image),
                Err(err) => {
                    tracing::debug!("{} failed: {}", invocation.tool, err);
                    last_error = Some(err);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| CaptureError::ToolNotFound {
            tool: candidates
                .first()
                .map(|c| c.tool.clone())
                .unwrap_or_else(|| "screenshot tool".to_string()),
        }))
    }

    /// Runs a helper that prints to stdout (slurp) and returns trimmed text
    pub async fn stdout_of(
        &self,
        tool: &str,
        args: &[&str],
        interactive: bool,
    ) -> CaptureResult<String> {
        let program = self.resolve(tool).ok_or_else(|| CaptureError::ToolNotFound {
            tool: tool.to_string(),
        })?;
        let bound = self.bound(interactive);

        let mut command = Command::new(&program);
        command
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null());
        let mut process = ToolProcess::spawn(&mut command)?;

        let finished = match tokio::time::timeout(bound, process.wait_with_output()).await {
            Ok(result) => result?,
            Err(_) => {
                process.kill().await;
                tracing::warn!("{} did not exit within {}ms; killed", tool, bound.as_millis());
                return Err(CaptureError::CaptureTimeout {
                    duration_ms: bound.as_millis() as u64,
                });
            }
        };

        if !finished.status.success() {
            return Err(CaptureError::ToolFailed {
                tool:      tool.to_string(),
                exit_code: finished.status.code(),
            });
        }

        let text = String::from_utf8_lossy(&finished.stdout).trim().to_string();
        if text.is_empty() {
            return Err(CaptureError::NoOutput {
                tool: tool.to_string(),
            });
        }
        Ok(text)
    }
}

/// A running tool and everything it started
///
/// Dropping the handle before the tool has been waited on kills the whole
/// process group. That covers both the timeout path and a caller dropping
/// the capture future on cancellation.
struct ToolProcess {
    child:  Child,
    /// Process group id; the tool is the group leader on unix
    group:  Option<u32>,
    reaped: bool,
}

impl ToolProcess {
    fn spawn(command: &mut Command) -> io::Result<Self> {
        #[cfg(unix)]
        command.process_group(0);

        let child = command.kill_on_drop(true).spawn()?;
        let group = child.id();
        Ok(Self {
            child,
            group,
            reaped: false,
        })
    }

    /// Waits for exit while draining whichever pipes were requested
    async fn wait_with_output(&mut self) -> io::Result<Output> {
        let mut stdout = self.child.stdout.take();
        let mut stderr = self.child.stderr.take();

        let (status, stdout, stderr) = tokio::try_join!(
            self.child.wait(),
            read_pipe(stdout.as_mut()),
            read_pipe(stderr.as_mut()),
        )?;
        self.reaped = true;

        Ok(Output {
            status,
            stdout,
            stderr,
        })
    }

    /// Kills the group and reaps the leader
    async fn kill(&mut self) {
        self.kill_group();
        if let Err(e) = self.child.kill().await {
            tracing::debug!("Reaping killed tool: {}", e);
        }
        self.reaped = true;
    }

    #[cfg(unix)]
    fn kill_group(&self) {
        use nix::{
            errno::Errno,
            sys::signal::{Signal, killpg},
            unistd::Pid,
        };

        let Some(group) = self.group.and_then(|id| i32::try_from(id).ok()) else {
            return;
        };
        match killpg(Pid::from_raw(group), Signal::SIGKILL) {
            Ok(()) | Err(Errno::ESRCH) => {}
            Err(errno) => tracing::debug!("killpg({}) failed: {}", group, errno),
        }
    }

    #[cfg(not(unix))]
    fn kill_group(&self) {}
}

impl Drop for ToolProcess {
    fn drop(&mut self) {
        // The leader itself is covered by kill_on_drop
        if !self.reaped {
            self.kill_group();
        }
    }
}

async fn read_pipe<R: AsyncRead + Unpin>(pipe: Option<&mut R>) -> io::Result<Vec<u8>> {
    let mut buffer = Vec::new();
    if let Some(pipe) = pipe {
        pipe.read_to_end(&mut buffer).await?;
    }
    Ok(buffer)
}

#[cfg(windows)]
fn executable_names(tool: &str) -> impl Iterator<Item = String> {
    [format!("{tool}.exe"), tool.to_string()].into_iter()
}

#[cfg(not(windows))]
fn executable_names(tool: &str) -> impl Iterator<Item = String> {
    std::iter::once(tool.to_string())
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;

    std::fs::metadata(path)
        .map(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

// =============================================================================
// Linux tool table
// =============================================================================

struct LinuxTool {
    name:        &'static str,
    full:        &'static str,
    region:      &'static str,
    window:      Option<&'static str>,
    cursor_flag: Option<&'static str>,
    x11_only:    bool,
}

const LINUX_TOOLS: [LinuxTool; 5] = [
    LinuxTool {
        name:        "gnome-screenshot",
        full:        "-f",
        region:      "-a -f",
        window:      Some("-w -b -f"),
        cursor_flag: Some("-p"),
        x11_only:    false,
    },
    LinuxTool {
        name:        "spectacle",
        full:        "-b -n -o",
        region:      "-b -n -r -o",
        window:      Some("-a -b -n -o"),
        cursor_flag: Some("-p"),
        x11_only:    false,
    },
    LinuxTool {
        name:        "xfce4-screenshooter",
        full:        "-f -s",
        region:      "-r -s",
        window:      Some("-w -s"),
        cursor_flag: Some("-m"),
        x11_only:    false,
    },
    LinuxTool {
        name:        "scrot",
        full:        "",
        region:      "-s",
        window:      Some("-u -b"),
        cursor_flag: Some("-p"),
        x11_only:    true,
    },
    LinuxTool {
        name:        "import",
        full:        "-window root",
        region:      "",
        // Needs a window id from the window service
        window:      None,
        cursor_flag: None,
        x11_only:    true,
    },
];

fn native_tool(desktop: Option<DesktopEnvironment>) -> Option<&'static str> {
    match desktop? {
        DesktopEnvironment::Gnome | DesktopEnvironment::Cinnamon | DesktopEnvironment::Mate => {
            Some("gnome-screenshot")
        }
        DesktopEnvironment::Kde => Some("spectacle"),
        DesktopEnvironment::Xfce => Some("xfce4-screenshooter"),
        _ => None,
    }
}

/// Ordered tool invocations for a capture kind on Linux
///
/// The desktop's own tool comes first, then the rest of the table in order.
/// `scrot` and `import` need an X server and are left out on Wayland.
pub fn linux_tool_candidates(
    kind: CaptureKind,
    desktop: Option<DesktopEnvironment>,
    wayland: bool,
    window_service: Option<&dyn WindowService>,
    options: &CaptureOptions,
) -> Vec<ToolInvocation> {
    let native = native_tool(desktop);
    let ordered = LINUX_TOOLS
        .iter()
        .filter(|tool| Some(tool.name) == native)
        .chain(LINUX_TOOLS.iter().filter(|tool| Some(tool.name) != native));

    ordered
        .filter(|tool| !(wayland && tool.x11_only))
        .filter_map(|tool| {
            let invocation = match kind {
                CaptureKind::FullScreen => ToolInvocation::from_template(tool.name, tool.full),
                CaptureKind::Region => {
                    ToolInvocation::from_template(tool.name, tool.region).interactive()
                }
                CaptureKind::ActiveWindow => match tool.window {
                    Some(template) => ToolInvocation::from_template(tool.name, template),
                    None => {
                        let handle = window_service?.foreground_window()?;
                        let id = handle.to_string();
                        ToolInvocation::new(tool.name, &["-window", &id])
                    }
                },
            };

            Some(match tool.cursor_flag {
                Some(flag) if options.show_cursor => invocation.with_leading(&[flag]),
                _ => invocation,
            })
        })
        .collect()
}

// =============================================================================
// wlroots tool table
// =============================================================================

/// grimblast/hyprshot invocations tried on Hyprland before grim + slurp
pub fn hyprland_tool_candidates(kind: CaptureKind) -> Vec<ToolInvocation> {
    match kind {
        CaptureKind::Region => vec![
            ToolInvocation::new("grimblast", &["save", "area"]).interactive(),
            ToolInvocation::new("hyprshot", &["-m", "region", "-o", "{dir}", "-f", "{file}"])
                .interactive(),
        ],
        CaptureKind::ActiveWindow => vec![
            ToolInvocation::new("grimblast", &["save", "active"]).interactive(),
            ToolInvocation::new("hyprshot", &["-m", "window", "-o", "{dir}", "-f", "{file}"])
                .interactive(),
        ],
        CaptureKind::FullScreen => Vec::new(),
    }
}

/// `grim` for a whole output, or a slurp-selected geometry
pub fn grim_invocation(geometry: Option<&str>, options: &CaptureOptions) -> ToolInvocation {
    let invocation = match geometry {
        Some(geometry) => ToolInvocation::new("grim", &["-g", geometry]),
        None => ToolInvocation::new("grim", &[]),
    };
    if options.show_cursor {
        invocation.with_leading(&["-c"])
    } else {
        invocation
    }
}
