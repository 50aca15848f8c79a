//! Contact frame source abstraction
//!
//! A source enumerates contact-sensing devices and, once a device is
//! started, invokes that device's callback once per sensor frame. Calls for
//! one device are serialized; different devices may deliver concurrently.

use crate::contact::{DeviceInfo, Frame};
use crate::MiddleClickError;

/// Per-device frame handler, called from the source's delivery context
pub type FrameCallback = Box<dyn FnMut(Frame) + Send>;

/// Native subsystem that produces contact frames
pub trait ContactFrameSource: Send + Sync + 'static {
    /// Enumerate the devices currently present
    fn discover_devices(&self) -> Result<Vec<DeviceInfo>, MiddleClickError>;

    /// Attach the callback that will receive this device's frames
    fn register_frame_callback(
        &self,
        device: &DeviceInfo,
        callback: FrameCallback,
    ) -> Result<(), MiddleClickError>;

    /// Detach the callback
    ///
    /// When this returns, no delivery to the old callback is in flight and
    /// none will follow.
    fn unregister_frame_callback(&self, device: &DeviceInfo) -> Result<(), MiddleClickError>;

    /// Begin frame delivery; `mode` is passed through to the native layer
    fn start_device(&self, device: &DeviceInfo, mode: i32) -> Result<(), MiddleClickError>;

    fn stop_device(&self, device: &DeviceInfo) -> Result<(), MiddleClickError>;
}
