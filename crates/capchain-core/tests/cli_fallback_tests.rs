//! CLI runner behaviour against fake screenshot tools
//!
//! Every tool here is a `/bin/sh` script written by
//! `capchain_test_utils::fixtures::ToolBox`, so the tests run without a
//! display and never touch a real screenshot tool.

#[cfg(unix)]
mod tests {
    use std::{path::Path, time::Duration};

    use capchain_core::{
        capture::{
            cli_runner::{CliToolRunner, ToolInvocation, grim_invocation, linux_tool_candidates},
            provider::{CaptureOutcome, guarded},
        },
        error::CaptureError,
        model::{CaptureKind, CaptureOptions, DesktopEnvironment},
        util::temp_files::TEMP_SUBDIR,
    };
    use capchain_test_utils::{fixtures::ToolBox, timing};
    use tempfile::TempDir;
    use tokio_util::sync::CancellationToken;

    /// Long enough for a surviving helper of `wrapper_tool` to write
    const HELPER_WINDOW: Duration = Duration::from_millis(1500);

    fn runner(tools: &ToolBox, temp: &TempDir) -> CliToolRunner {
        CliToolRunner::new()
            .with_search_path(tools.search_path())
            .with_temp_root(temp.path())
    }

    fn leftover_files(temp: &Path) -> usize {
        std::fs::read_dir(temp.join(TEMP_SUBDIR))
            .map(|entries| entries.count())
            .unwrap_or(0)
    }

    #[tokio::test]
    async fn test_png_is_decoded_and_temp_file_removed() {
        let tools = ToolBox::new();
        let temp = tempfile::tempdir().unwrap();
        tools.png_tool("scrot", 64, 48);

        let image = runner(&tools, &temp)
            .run(&ToolInvocation::new("scrot", &[]))
            .await
            .unwrap();

        assert_eq!(image.dimensions(), (64, 48));
        assert_eq!(leftover_files(temp.path()), 0);
    }

    #[tokio::test]
    async fn test_hanging_tool_is_killed_at_timeout() {
        let tools = ToolBox::new();
        let temp = tempfile::tempdir().unwrap();
        tools.hanging_tool("gnome-screenshot");
        let runner = runner(&tools, &temp)
            .with_timeouts(Duration::from_millis(200), Duration::from_millis(200));

        let invocation = ToolInvocation::from_template("gnome-screenshot", "-f");

        let (result, elapsed) = timing::measure_async("hanging tool", runner.run(&invocation)).await;

        assert!(matches!(result, Err(CaptureError::CaptureTimeout { duration_ms: 200 })));
        timing::assert_duration_below(elapsed, Duration::from_secs(5), "timed-out tool");
        assert_eq!(leftover_files(temp.path()), 0);

        // Timeouts surface as provider failures, not cancellations
        let outcome = CaptureOutcome::from_runtime("cli", result.map(Some));
        assert!(outcome.is_failure());
    }

    #[tokio::test]
    async fn test_timeout_kills_helpers_started_by_the_tool() {
        let tools = ToolBox::new();
        let temp = tempfile::tempdir().unwrap();
        let marker = tools.wrapper_tool("grimblast");
        let runner = runner(&tools, &temp)
            .with_timeouts(Duration::from_millis(200), Duration::from_millis(200));

        let result = runner
            .run(&ToolInvocation::new("grimblast", &["save", "area"]).interactive())
            .await;
        assert!(matches!(result, Err(CaptureError::CaptureTimeout { duration_ms: 200 })));

        tokio::time::sleep(HELPER_WINDOW).await;
        assert!(!marker.exists(), "background helper outlived the timeout");
        assert_eq!(leftover_files(temp.path()), 0);
    }

    #[tokio::test]
    async fn test_cancel_kills_running_tool_and_removes_temp_file() {
        let tools = ToolBox::new();
        let temp = tempfile::tempdir().unwrap();
        let marker = tools.wrapper_tool("scrot");
        let runner = runner(&tools, &temp);
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            trigger.cancel();
        });

        let invocation = ToolInvocation::new("scrot", &[]);
        let (outcome, elapsed) = timing::measure_async(
            "cancelled tool",
            guarded("cli", &cancel, async { runner.run(&invocation).await.map(Some) }),
        )
        .await;

        assert!(outcome.is_cancelled());
        assert_eq!(outcome.provider_id(), "cli");
        timing::assert_duration_below(elapsed, Duration::from_secs(5), "cancelled tool");

        tokio::time::sleep(HELPER_WINDOW).await;
        assert!(!marker.exists(), "tool kept running after cancellation");
        assert_eq!(leftover_files(temp.path()), 0);
    }

    #[tokio::test]
    async fn test_nonzero_exit_is_tool_failed() {
        let tools = ToolBox::new();
        let temp = tempfile::tempdir().unwrap();
        tools.failing_tool("spectacle", 3);

        let err = runner(&tools, &temp)
            .run(&ToolInvocation::from_template("spectacle", "-b -n -o"))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            CaptureError::ToolFailed { ref tool, exit_code: Some(3) } if tool == "spectacle"
        ));
    }

    #[tokio::test]
    async fn test_silent_success_is_no_output() {
        let tools = ToolBox::new();
        let temp = tempfile::tempdir().unwrap();
        tools.silent_tool("import");

        let err = runner(&tools, &temp)
            .run(&ToolInvocation::from_template("import", "-window root"))
            .await
            .unwrap_err();

        assert!(matches!(err, CaptureError::NoOutput { .. }));
    }

    #[tokio::test]
    async fn test_undecodable_output_is_image_error() {
        let tools = ToolBox::new();
        let temp = tempfile::tempdir().unwrap();
        tools.garbage_tool("scrot");

        let err = runner(&tools, &temp)
            .run(&ToolInvocation::new("scrot", &[]))
            .await
            .unwrap_err();

        assert!(matches!(err, CaptureError::ImageError(_)));
        assert_eq!(leftover_files(temp.path()), 0);
    }

    #[tokio::test]
    async fn test_first_working_candidate_wins() {
        let tools = ToolBox::new();
        let temp = tempfile::tempdir().unwrap();
        // gnome-screenshot is not installed, spectacle fails, scrot works
        tools.failing_tool("spectacle", 1);
        let scrot_log = tools.logging_png_tool("scrot", 16, 16);

        let candidates = linux_tool_candidates(
            CaptureKind::FullScreen,
            Some(DesktopEnvironment::Gnome),
            false,
            None,
            &CaptureOptions::default(),
        );
        let image = runner(&tools, &temp).run_first(&candidates).await.unwrap();

        assert_eq!(image.dimensions(), (16, 16));
        let logged = std::fs::read_to_string(scrot_log).unwrap();
        assert_eq!(logged.lines().count(), 1);
        assert!(logged.contains(TEMP_SUBDIR));
    }

    #[tokio::test]
    async fn test_no_installed_candidate_is_tool_not_found() {
        let tools = ToolBox::new();
        let temp = tempfile::tempdir().unwrap();

        let candidates = linux_tool_candidates(
            CaptureKind::Region,
            Some(DesktopEnvironment::Kde),
            false,
            None,
            &CaptureOptions::default(),
        );
        let err = runner(&tools, &temp).run_first(&candidates).await.unwrap_err();

        assert!(matches!(err, CaptureError::ToolNotFound { ref tool } if tool == "spectacle"));
    }

    #[tokio::test]
    async fn test_slurp_geometry_feeds_grim() {
        let tools = ToolBox::new();
        let temp = tempfile::tempdir().unwrap();
        tools.stdout_tool("slurp", "10,20 300x200");
        let grim_log = tools.logging_png_tool("grim", 300, 200);
        let runner = runner(&tools, &temp);

        let geometry = runner.stdout_of("slurp", &[], true).await.unwrap();
        let image = runner
            .run(&grim_invocation(Some(&geometry), &CaptureOptions::default().with_cursor(true)))
            .await
            .unwrap();

        assert_eq!(geometry, "10,20 300x200");
        assert_eq!(image.dimensions(), (300, 200));
        let logged = std::fs::read_to_string(grim_log).unwrap();
        assert!(logged.starts_with("-c -g 10,20 300x200 "));
    }

    #[tokio::test]
    async fn test_dismissed_slurp_fails() {
        let tools = ToolBox::new();
        let temp = tempfile::tempdir().unwrap();
        tools.failing_tool("slurp", 1);

        let err = runner(&tools, &temp)
            .stdout_of("slurp", &[], true)
            .await
            .unwrap_err();

        assert!(matches!(err, CaptureError::ToolFailed { exit_code: Some(1), .. }));
    }
}
