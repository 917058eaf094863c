//! Filesystem fixtures
//!
//! [`write_png`] produces a real decodable PNG. [`ToolBox`] writes fake
//! screenshot tools (`/bin/sh` scripts) into a private directory that tests
//! hand to the CLI runner as its search path, so no real screenshot tool is
//! ever spawned.

use std::path::{Path, PathBuf};

use image::{Rgba, RgbaImage};

/// Writes a `width` x `height` gradient PNG to `path`
///
/// # Panics
///
/// Panics if the file cannot be written.
pub fn write_png(path: &Path, width: u32, height: u32) {
    let image = RgbaImage::from_fn(width, height, |x, y| {
        Rgba([(x % 256) as u8, (y % 256) as u8, 0x80, 0xff])
    });
    image.save(path).unwrap_or_else(|e| panic!("write {}: {e}", path.display()));
}

/// A temp directory of fake screenshot tools
#[cfg(unix)]
pub struct ToolBox {
    root: tempfile::TempDir,
}

#[cfg(unix)]
impl Default for ToolBox {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(unix)]
impl ToolBox {
    /// # Panics
    ///
    /// Panics if the temp directory cannot be created.
    pub fn new() -> Self {
        let root = tempfile::tempdir().expect("create toolbox dir");
        std::fs::create_dir(root.path().join("bin")).expect("create toolbox bin");
        std::fs::create_dir(root.path().join("data")).expect("create toolbox data");
        Self { root }
    }

    /// Directory to use as `PATH`
    pub fn search_path(&self) -> PathBuf {
        self.root.path().join("bin")
    }

    fn data(&self, name: &str) -> PathBuf {
        self.root.path().join("data").join(name)
    }

    /// Writes an executable script named `name`
    pub fn script(&self, name: &str, body: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let path = self.search_path().join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).expect("write tool script");
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))
            .expect("chmod tool script");
        path
    }

    /// Tool that copies a `width` x `height` PNG to its last argument
    pub fn png_tool(&self, name: &str, width: u32, height: u32) -> PathBuf {
        let fixture = self.data(&format!("{name}.png"));
        write_png(&fixture, width, height);
        self.script(
            name,
            &format!("for last; do :; done\ncp '{}' \"$last\"", fixture.display()),
        )
    }

    /// Like [`png_tool`](Self::png_tool), also appending its arguments to a
    /// log whose path is returned
    pub fn logging_png_tool(&self, name: &str, width: u32, height: u32) -> PathBuf {
        let fixture = self.data(&format!("{name}.png"));
        let log = self.data(&format!("{name}.log"));
        write_png(&fixture, width, height);
        self.script(
            name,
            &format!(
                "echo \"$@\" >> '{}'\nfor last; do :; done\ncp '{}' \"$last\"",
                log.display(),
                fixture.display()
            ),
        );
        log
    }

    /// Tool that exits with `code` without writing anything
    pub fn failing_tool(&self, name: &str, code: i32) -> PathBuf {
        self.script(name, &format!("echo '{name} failed' >&2\nexit {code}"))
    }

    /// Tool that exits 0 without writing anything
    pub fn silent_tool(&self, name: &str) -> PathBuf {
        self.script(name, "exit 0")
    }

    /// Tool that writes bytes which are not an image
    pub fn garbage_tool(&self, name: &str) -> PathBuf {
        self.script(name, "for last; do :; done\necho 'not an image' > \"$last\"")
    }

    /// Tool that never exits on its own
    pub fn hanging_tool(&self, name: &str) -> PathBuf {
        self.script(name, "exec sleep 30")
    }

    /// Wrapper-style tool that never exits on its own
    ///
    /// Like grimblast, it hands the capture to a background helper. The
    /// helper writes the output path and the returned marker file after a
    /// second, unless it was killed first.
    pub fn wrapper_tool(&self, name: &str) -> PathBuf {
        let marker = self.data(&format!("{name}.late"));
        self.script(
            name,
            &format!(
                "for last; do :; done\n\
                 (sleep 1; echo late > \"$last\"; echo late > '{}') &\n\
                 sleep 30 &\n\
                 wait",
                marker.display()
            ),
        );
        marker
    }

    /// Tool that prints `text` on stdout, like `slurp`
    pub fn stdout_tool(&self, name: &str, text: &str) -> PathBuf {
        self.script(name, &format!("echo '{text}'"))
    }
}
