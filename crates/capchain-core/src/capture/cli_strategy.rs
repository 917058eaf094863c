//! Last-resort whole-platform strategies that shell out
//!
//! - macOS: `/usr/sbin/screencapture`, which works on every release but
//!   takes regions in logical points
//! - Windows: PowerShell with `System.Drawing` `CopyFromScreen`
//!
//! Both go through [`CliToolRunner`], so they share its temp-file guard and
//! timeouts with the Linux CLI provider.

use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use super::{
    chain::Stage,
    cli_runner::{CliToolRunner, ToolInvocation},
    context::{CaptureRequest, foreground_bounds},
    provider::{CaptureOutcome, guarded},
    strategy::{CONFIGURATION_CHANNEL_CAPACITY, CaptureStrategy},
};
use crate::{
    error::{CaptureError, CaptureResult},
    model::{
        BackendCapabilities, BackendType, CaptureKind, CaptureOptions, ConfigurationChanged,
        MonitorInfo, Region,
    },
};

pub const SCREENCAPTURE_STRATEGY_ID: &str = "screencapture-cli";
pub const POWERSHELL_STRATEGY_ID: &str = "powershell-cli";

const SCREENCAPTURE_PATH: &str = "/usr/sbin/screencapture";
const POWERSHELL: &str = "powershell";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flavour {
    Screencapture,
    PowerShell,
}

/// Screenshot-tool strategy for macOS or Windows
#[derive(Debug)]
pub struct CliStrategy {
    flavour: Flavour,
    runner:  CliToolRunner,
    events:  broadcast::Sender<ConfigurationChanged>,
}

impl CliStrategy {
    fn with_flavour(flavour: Flavour, runner: CliToolRunner) -> Self {
        let (events, _) = broadcast::channel(CONFIGURATION_CHANNEL_CAPACITY);
        Self {
            flavour,
            runner,
            events,
        }
    }

    pub fn screencapture(runner: CliToolRunner) -> Self {
        Self::with_flavour(Flavour::Screencapture, runner)
    }

    pub fn powershell(runner: CliToolRunner) -> Self {
        Self::with_flavour(Flavour::PowerShell, runner)
    }

    /// Whether the underlying tool can be found
    pub fn is_supported(&self) -> bool {
        self.runner.is_available(self.tool())
    }

    fn tool(&self) -> &'static str {
        match self.flavour {
            Flavour::Screencapture => SCREENCAPTURE_PATH,
            Flavour::PowerShell => POWERSHELL,
        }
    }

    fn backend(&self) -> BackendType {
        match self.flavour {
            Flavour::Screencapture => BackendType::MacOS,
            Flavour::PowerShell => BackendType::Windows,
        }
    }

    async fn run(&self, invocation: ToolInvocation, cancel: &CancellationToken) -> CaptureOutcome {
        let id = self.id().to_string();
        guarded(&id, cancel, async { self.runner.run(&invocation).await.map(Some) }).await
    }
}

#[async_trait]
impl CaptureStrategy for CliStrategy {
    fn id(&self) -> &str {
        match self.flavour {
            Flavour::Screencapture => SCREENCAPTURE_STRATEGY_ID,
            Flavour::PowerShell => POWERSHELL_STRATEGY_ID,
        }
    }

    fn stage(&self) -> Stage {
        Stage::CliFallback
    }

    fn capabilities(&self) -> BackendCapabilities {
        match self.flavour {
            Flavour::Screencapture => BackendCapabilities {
                supports_per_monitor_dpi: true,
                requires_permission: true,
                ..BackendCapabilities::cli("screencapture CLI")
            },
            Flavour::PowerShell => BackendCapabilities::cli("PowerShell CopyFromScreen"),
        }
    }

    async fn monitors(&self) -> CaptureResult<Vec<MonitorInfo>> {
        match self.flavour {
            Flavour::PowerShell => {
                let json = self
                    .runner
                    .stdout_of(
                        POWERSHELL,
                        &["-NoProfile", "-NonInteractive", "-Command", SCREENS_SCRIPT],
                        false,
                    )
                    .await?;
                parse_screens(&json)
            }
            Flavour::Screencapture => native_monitors(self.backend()).await,
        }
    }

    async fn capture(&self, request: &CaptureRequest, cancel: &CancellationToken) -> CaptureOutcome {
        let invocation = match self.flavour {
            Flavour::Screencapture => screencapture_invocation(request.kind, &request.options),
            Flavour::PowerShell => {
                let bounds = match request.kind {
                    CaptureKind::ActiveWindow => {
                        let Some(bounds) = foreground_bounds(request.window_service.as_deref())
                        else {
                            return CaptureOutcome::failure(
                                self.id(),
                                "active window capture needs a window service",
                            );
                        };
                        Some(bounds)
                    }
                    CaptureKind::FullScreen | CaptureKind::Region => None,
                };
                powershell_invocation(bounds)
            }
        };
        self.run(invocation, cancel).await
    }

    async fn capture_region(
        &self,
        region: Region,
        _options: &CaptureOptions,
        cancel: &CancellationToken,
    ) -> CaptureOutcome {
        let invocation = match self.flavour {
            Flavour::PowerShell => powershell_invocation(Some(region)),
            Flavour::Screencapture => {
                let monitors = native_monitors(self.backend())
                    .await
                    .unwrap_or_else(|_| vec![MonitorInfo::default_display()]);
                match screencapture_region_invocation(region, &monitors) {
                    Some(invocation) => invocation,
                    None => {
                        return CaptureOutcome::failure(
                            self.id(),
                            format!(
                                "region {}x{} at {},{} does not intersect any monitor",
                                region.width, region.height, region.x, region.y
                            ),
                        );
                    }
                }
            }
        };
        self.run(invocation, cancel).await
    }

    fn configuration_changed(&self) -> broadcast::Receiver<ConfigurationChanged> {
        self.events.subscribe()
    }
}

#[cfg(all(
    feature = "native",
    any(target_os = "linux", target_os = "windows", target_os = "macos")
))]
async fn native_monitors(backend: BackendType) -> CaptureResult<Vec<MonitorInfo>> {
    use super::xcap_capture;

    xcap_capture::run_blocking(super::constants::x11_capture_timeout_ms(), move || {
        Ok(xcap_capture::monitors_or_default(backend))
    })
    .await
}

#[cfg(not(all(
    feature = "native",
    any(target_os = "linux", target_os = "windows", target_os = "macos")
)))]
async fn native_monitors(_backend: BackendType) -> CaptureResult<Vec<MonitorInfo>> {
    Ok(vec![MonitorInfo::default_display()])
}

/// `screencapture` arguments for a capture kind
///
/// `-x` silences the shutter sound. Window and region kinds use the tool's
/// own picker and get the interactive bound.
pub fn screencapture_invocation(kind: CaptureKind, options: &CaptureOptions) -> ToolInvocation {
    let mut args = vec!["-x"];
    if options.show_cursor {
        args.push("-C");
    }
    match kind {
        CaptureKind::FullScreen => ToolInvocation::new(SCREENCAPTURE_PATH, &args),
        CaptureKind::ActiveWindow => {
            args.push("-w");
            if !options.include_window_frame {
                args.push("-o");
            }
            ToolInvocation::new(SCREENCAPTURE_PATH, &args).interactive()
        }
        CaptureKind::Region => {
            args.push("-i");
            ToolInvocation::new(SCREENCAPTURE_PATH, &args).interactive()
        }
    }
}

/// `screencapture -R` for a physical region
///
/// `-R` takes logical points, so the region is divided by the scale of the
/// first monitor it touches. `None` when it touches no monitor.
pub fn screencapture_region_invocation(region: Region, monitors: &[MonitorInfo]) -> Option<ToolInvocation> {
    let monitor = monitors.iter().find(|m| m.bounds.intersect(&region).is_some())?;
    let scale = if monitor.scale_factor > 0.0 {
        monitor.scale_factor
    } else {
        1.0
    };
    // Origin rounds down and size rounds up so the points cover every pixel
    let origin = |v: i32| (f64::from(v) / scale).floor() as i32;
    let extent = |v: i32| ((f64::from(v) / scale).ceil() as i32).max(1);
    let rect = format!(
        "-R{},{},{},{}",
        origin(region.x),
        origin(region.y),
        extent(region.width),
        extent(region.height)
    );
    Some(ToolInvocation::new(SCREENCAPTURE_PATH, &["-x", &rect]))
}

/// PowerShell `CopyFromScreen` of `bounds`, or of the whole virtual screen
pub fn powershell_invocation(bounds: Option<Region>) -> ToolInvocation {
    let rect = match bounds {
        Some(r) => format!(
            "$b=New-Object System.Drawing.Rectangle {},{},{},{};",
            r.x, r.y, r.width, r.height
        ),
        None => "$b=[System.Windows.Forms.SystemInformation]::VirtualScreen;".to_string(),
    };
    let script = format!(
        "Add-Type -AssemblyName System.Windows.Forms,System.Drawing;{rect}\
         $bmp=New-Object System.Drawing.Bitmap $b.Width,$b.Height;\
         $g=[System.Drawing.Graphics]::FromImage($bmp);\
         $g.CopyFromScreen($b.Left,$b.Top,0,0,$bmp.Size);\
         $bmp.Save('{{path}}',[System.Drawing.Imaging.ImageFormat]::Png);\
         $g.Dispose();$bmp.Dispose()"
    );
    ToolInvocation::new(POWERSHELL, &["-NoProfile", "-NonInteractive", "-Command", &script])
}

const SCREENS_SCRIPT: &str = "Add-Type -AssemblyName System.Windows.Forms;\
    [System.Windows.Forms.Screen]::AllScreens | ForEach-Object { [pscustomobject]@{\
    DeviceName=$_.DeviceName;Primary=$_.Primary;BitsPerPixel=$_.BitsPerPixel;\
    Bounds=@{X=$_.Bounds.X;Y=$_.Bounds.Y;Width=$_.Bounds.Width;Height=$_.Bounds.Height};\
    WorkingArea=@{X=$_.WorkingArea.X;Y=$_.WorkingArea.Y;Width=$_.WorkingArea.Width;Height=$_.WorkingArea.Height}\
    } } | ConvertTo-Json -Compress -Depth 3";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ScreenRect {
    x:      i32,
    y:      i32,
    width:  i32,
    height: i32,
}

impl From<ScreenRect> for Region {
    fn from(r: ScreenRect) -> Self {
        Region::new(r.x, r.y, r.width, r.height)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Screen {
    device_name:    String,
    primary:        bool,
    bits_per_pixel: u32,
    bounds:         ScreenRect,
    working_area:   ScreenRect,
}

/// `ConvertTo-Json` emits a bare object for a single screen
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Screens {
    Many(Vec<Screen>),
    One(Screen),
}

/// Parses the PowerShell screen listing
pub fn parse_screens(json: &str) -> CaptureResult<Vec<MonitorInfo>> {
    let screens = match serde_json::from_str::<Screens>(json) {
        Ok(Screens::Many(screens)) => screens,
        Ok(Screens::One(screen)) => vec![screen],
        Err(e) => {
            tracing::debug!("Unreadable PowerShell screen list: {}", e);
            return Err(CaptureError::ToolFailed {
                tool:      POWERSHELL.to_string(),
                exit_code: None,
            });
        }
    };

    if screens.is_empty() {
        return Err(CaptureError::BackendNotAvailable {
            backend: BackendType::Windows,
        });
    }

    Ok(screens
        .into_iter()
        .enumerate()
        .map(|(index, screen)| MonitorInfo {
            id:             index.to_string(),
            name:           screen.device_name,
            is_primary:     screen.primary,
            bounds:         screen.bounds.into(),
            working_area:   screen.working_area.into(),
            scale_factor:   1.0,
            rotation:       0.0,
            refresh_rate:   60.0,
            bits_per_pixel: screen.bits_per_pixel,
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_screencapture_full_screen_is_silent() {
        let invocation = screencapture_invocation(CaptureKind::FullScreen, &CaptureOptions::default());

        assert_eq!(invocation.tool, SCREENCAPTURE_PATH);
        assert_eq!(invocation.args, vec!["-x"]);
        assert!(!invocation.interactive);
    }

    #[test]
    fn test_screencapture_window_and_region_are_interactive() {
        let window = screencapture_invocation(
            CaptureKind::ActiveWindow,
            &CaptureOptions::default().with_cursor(true),
        );
        assert_eq!(window.args, vec!["-x", "-C", "-w", "-o"]);
        assert!(window.interactive);

        let region = screencapture_invocation(CaptureKind::Region, &CaptureOptions::default());
        assert_eq!(region.args, vec!["-x", "-i"]);
        assert!(region.interactive);
    }

    #[test]
    fn test_region_is_converted_to_logical_points() {
        let mut retina = MonitorInfo::default_display();
        retina.bounds = Region::new(0, 0, 2880, 1800);
        retina.scale_factor = 2.0;

        let invocation =
            screencapture_region_invocation(Region::new(200, 100, 800, 600), &[retina]).unwrap();

        assert_eq!(invocation.args, vec!["-x", "-R100,50,400,300"]);
    }

    #[test]
    fn test_small_region_never_rounds_to_zero_points() {
        let mut retina = MonitorInfo::default_display();
        retina.bounds = Region::new(-2880, 0, 5760, 1800);
        retina.scale_factor = 2.0;

        let tiny = screencapture_region_invocation(Region::new(201, 101, 1, 3), &[retina.clone()])
            .unwrap();
        assert_eq!(tiny.args, vec!["-x", "-R100,50,1,2"]);

        let left = screencapture_region_invocation(Region::new(-3, 7, 5, 5), &[retina]).unwrap();
        assert_eq!(left.args, vec!["-x", "-R-2,3,3,3"]);
    }

    #[test]
    fn test_region_off_every_monitor_has_no_invocation() {
        let invocation = screencapture_region_invocation(
            Region::new(5000, 5000, 10, 10),
            &[MonitorInfo::default_display()],
        );
        assert!(invocation.is_none());
    }

    #[test]
    fn test_powershell_script_targets_output_path() {
        let invocation = powershell_invocation(Some(Region::new(10, 20, 30, 40)));
        let script = invocation.args.last().unwrap();

        assert_eq!(invocation.tool, POWERSHELL);
        assert!(script.contains("Rectangle 10,20,30,40"));
        assert!(script.contains("Save('{path}'"));

        let full = powershell_invocation(None);
        assert!(full.args.last().unwrap().contains("VirtualScreen"));
    }

    #[test]
    fn test_parse_screens_accepts_object_or_array() {
        let one = r#"{"DeviceName":"\\\\.\\DISPLAY1","Primary":true,"BitsPerPixel":32,
            "Bounds":{"X":0,"Y":0,"Width":2560,"Height":1440},
            "WorkingArea":{"X":0,"Y":0,"Width":2560,"Height":1400}}"#;
        let monitors = parse_screens(one).unwrap();
        assert_eq!(monitors.len(), 1);
        assert!(monitors[0].is_primary);
        assert_eq!(monitors[0].working_area.height, 1400);

        let many = format!("[{one},{}]", one.replace("\"Primary\":true", "\"Primary\":false"));
        let monitors = parse_screens(&many).unwrap();
        assert_eq!(monitors.len(), 2);
        assert_eq!(monitors[1].id, "1");
        assert!(!monitors[1].is_primary);
    }

    #[test]
    fn test_parse_screens_rejects_garbage() {
        assert!(parse_screens("not json").is_err());
        assert!(matches!(
            parse_screens("[]"),
            Err(CaptureError::BackendNotAvailable { .. })
        ));
    }

    #[test]
    fn test_strategy_reports_missing_tool() {
        let dir = tempfile::tempdir().unwrap();
        let strategy = CliStrategy::powershell(CliToolRunner::new().with_search_path(dir.path()));

        assert!(!strategy.is_supported());
        assert_eq!(strategy.id(), POWERSHELL_STRATEGY_ID);
        assert_eq!(strategy.stage(), Stage::CliFallback);
    }
}
