//! Input injection backends
//!
//! [`YdotoolInjector`] sends mouse events via uinput at the kernel level
//! through ydotool, so it works on Wayland by bypassing the display server.
//! Requires the ydotoold daemon: `sudo systemctl enable --now ydotoold`.
//!
//! [`XTestInjector`] uses the XTest extension and needs an X11 (or
//! XWayland) display.

use std::path::Path;
use std::process::Command;
use tracing::{debug, info};
use x11rb::connection::Connection;
use x11rb::protocol::xproto::{BUTTON_PRESS_EVENT, BUTTON_RELEASE_EVENT, MOTION_NOTIFY_EVENT};
use x11rb::protocol::xtest::ConnectionExt as _;
use x11rb::rust_connection::RustConnection;

use crate::config::InjectorBackend;
use crate::MiddleClickError;

/// Host facility that accepts synthesized pointer events
///
/// Events apply at the current cursor location. Implementations are moved
/// onto the synthesizer thread and only ever called from there.
pub trait InputInjector: Send + 'static {
    fn button_down(&mut self) -> Result<(), MiddleClickError>;
    fn button_up(&mut self) -> Result<(), MiddleClickError>;
    /// Relative motion, subject to the host's pointer acceleration
    fn move_relative(&mut self, dx: i32, dy: i32) -> Result<(), MiddleClickError>;
}

impl<I: InputInjector + ?Sized> InputInjector for Box<I> {
    fn button_down(&mut self) -> Result<(), MiddleClickError> {
        (**self).button_down()
    }

    fn button_up(&mut self) -> Result<(), MiddleClickError> {
        (**self).button_up()
    }

    fn move_relative(&mut self, dx: i32, dy: i32) -> Result<(), MiddleClickError> {
        (**self).move_relative(dx, dy)
    }
}

/// Build the injector selected in the configuration
pub fn create_injector(backend: InjectorBackend) -> Result<Box<dyn InputInjector>, MiddleClickError> {
    Ok(match backend {
        InjectorBackend::Ydotool => Box::new(YdotoolInjector::new()?),
        InjectorBackend::Xtest => Box::new(XTestInjector::new()?),
    })
}

/// ydotool click codes: low bits select the button, 0x40 = down, 0x80 = up
const YDOTOOL_MIDDLE_DOWN: &str = "0x42";
const YDOTOOL_MIDDLE_UP: &str = "0x82";

/// Get the ydotool socket path
fn get_socket_path() -> String {
    let uid = unsafe { libc::getuid() };
    format!("/run/user/{}/.ydotool_socket", uid)
}

/// Input injector that sends synthetic events via ydotool
pub struct YdotoolInjector {
    socket_path: String,
}

impl YdotoolInjector {
    /// Create a new YdotoolInjector
    ///
    /// Requires ydotool to be installed and ydotoold daemon running.
    pub fn new() -> Result<Self, MiddleClickError> {
        info!("Connecting to ydotoold...");

        let output = Command::new("which")
            .arg("ydotool")
            .output()
            .map_err(|e| MiddleClickError::Injection(format!("Failed to check for ydotool: {}", e)))?;

        if !output.status.success() {
            return Err(MiddleClickError::Injection(
                "ydotool not found. Install it from your distribution's packages".to_string(),
            ));
        }

        let socket_path = get_socket_path();
        match std::fs::metadata(Path::new(&socket_path)) {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
                return Err(MiddleClickError::PermissionDenied);
            }
            Err(_) => {
                return Err(MiddleClickError::Injection(format!(
                    "ydotoold socket {} missing. Start it: sudo systemctl enable --now ydotoold",
                    socket_path
                )));
            }
        }

        info!("ydotool injector ready ({})", socket_path);
        Ok(Self { socket_path })
    }

    /// Run a ydotool command with the socket path set
    fn run_ydotool(&self, args: &[&str]) -> Result<(), MiddleClickError> {
        let output = Command::new("ydotool")
            .env("YDOTOOL_SOCKET", &self.socket_path)
            .args(args)
            .output()
            .map_err(|e| MiddleClickError::Injection(format!("Failed to run ydotool: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(MiddleClickError::Injection(format!("ydotool failed: {}", stderr)));
        }

        Ok(())
    }
}

impl InputInjector for YdotoolInjector {
    fn button_down(&mut self) -> Result<(), MiddleClickError> {
        debug!("Sending middle press via ydotool");
        self.run_ydotool(&["click", YDOTOOL_MIDDLE_DOWN])
    }

    fn button_up(&mut self) -> Result<(), MiddleClickError> {
        debug!("Sending middle release via ydotool");
        self.run_ydotool(&["click", YDOTOOL_MIDDLE_UP])
    }

    fn move_relative(&mut self, dx: i32, dy: i32) -> Result<(), MiddleClickError> {
        let x = dx.to_string();
        let y = dy.to_string();
        self.run_ydotool(&["mousemove", "-x", &x, "-y", &y])
    }
}

/// X11 button number of the middle button
const X11_MIDDLE_BUTTON: u8 = 2;

/// Input injector using the XTest extension
pub struct XTestInjector {
    conn: RustConnection,
}

impl XTestInjector {
    pub fn new() -> Result<Self, MiddleClickError> {
        let (conn, _screen) = x11rb::connect(None)
            .map_err(|e| MiddleClickError::Injection(format!("Failed to connect to X11: {}", e)))?;

        let version = conn
            .xtest_get_version(2, 2)
            .map_err(|e| MiddleClickError::Injection(format!("XTest unavailable: {}", e)))?
            .reply()
            .map_err(|e| MiddleClickError::Injection(format!("XTest unavailable: {}", e)))?;

        info!(
            "XTest injector ready (XTest {}.{})",
            version.major_version, version.minor_version
        );
        Ok(Self { conn })
    }

    fn fake_input(&self, kind: u8, detail: u8, dx: i16, dy: i16) -> Result<(), MiddleClickError> {
        self.conn
            .xtest_fake_input(kind, detail, x11rb::CURRENT_TIME, x11rb::NONE, dx, dy, 0)
            .map_err(|e| MiddleClickError::Injection(format!("XTest request failed: {}", e)))?;
        self.conn
            .flush()
            .map_err(|e| MiddleClickError::Injection(format!("X11 flush failed: {}", e)))
    }
}

impl InputInjector for XTestInjector {
    fn button_down(&mut self) -> Result<(), MiddleClickError> {
        debug!("Sending middle press via XTest");
        self.fake_input(BUTTON_PRESS_EVENT, X11_MIDDLE_BUTTON, 0, 0)
    }

    fn button_up(&mut self) -> Result<(), MiddleClickError> {
        debug!("Sending middle release via XTest");
        self.fake_input(BUTTON_RELEASE_EVENT, X11_MIDDLE_BUTTON, 0, 0)
    }

    fn move_relative(&mut self, dx: i32, dy: i32) -> Result<(), MiddleClickError> {
        let clamp = |v: i32| v.clamp(i16::MIN as i32, i16::MAX as i32) as i16;
        // detail = 1 makes MotionNotify relative to the current position
        self.fake_input(MOTION_NOTIFY_EVENT, 1, clamp(dx), clamp(dy))
    }
}
