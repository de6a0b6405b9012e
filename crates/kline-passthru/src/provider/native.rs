//! Native J2534 driver loaded with `libloading`
//!
//! Targets the v04.04 calling convention: `unsigned long` is 32 bits and the
//! entry points use the platform system ABI (`__stdcall` on 32-bit Windows).

use std::ffi::{c_char, c_void, CStr, CString};
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use super::{IoctlRequest, PassThruApi, SConfig, VersionInfo};
use crate::error::SessionError;
use crate::frame::PassThruMsg;
use crate::j2534::StatusCode;

type OpenFn = unsafe extern "system" fn(name: *const c_void, device_id: *mut u32) -> i32;
type CloseFn = unsafe extern "system" fn(device_id: u32) -> i32;
type ConnectFn = unsafe extern "system" fn(
    device_id: u32,
    protocol_id: u32,
    flags: u32,
    baud_rate: u32,
    channel_id: *mut u32,
) -> i32;
type DisconnectFn = unsafe extern "system" fn(channel_id: u32) -> i32;
type ReadMsgsFn = unsafe extern "system" fn(
    channel_id: u32,
    msgs: *mut PassThruMsg,
    num_msgs: *mut u32,
    timeout: u32,
) -> i32;
type WriteMsgsFn = unsafe extern "system" fn(
    channel_id: u32,
    msgs: *mut PassThruMsg,
    num_msgs: *mut u32,
    timeout: u32,
) -> i32;
type StartPeriodicMsgFn = unsafe extern "system" fn(
    channel_id: u32,
    msg: *const PassThruMsg,
    msg_id: *mut u32,
    interval: u32,
) -> i32;
type StopPeriodicMsgFn = unsafe extern "system" fn(channel_id: u32, msg_id: u32) -> i32;
type StartMsgFilterFn = unsafe extern "system" fn(
    channel_id: u32,
    filter_type: u32,
    mask: *const PassThruMsg,
    pattern: *const PassThruMsg,
    flow_control: *const PassThruMsg,
    filter_id: *mut u32,
) -> i32;
type ReadVersionFn = unsafe extern "system" fn(
    device_id: u32,
    firmware: *mut c_char,
    dll: *mut c_char,
    api: *mut c_char,
) -> i32;
type GetLastErrorFn = unsafe extern "system" fn(description: *mut c_char) -> i32;
type IoctlFn =
    unsafe extern "system" fn(handle: u32, ioctl_id: u32, input: *mut c_void, output: *mut c_void)
        -> i32;

/// J2534 mandates 80 bytes; some drivers write more.
const TEXT_BUFFER_LEN: usize = 256;

/// SCONFIG_LIST passed to SET_CONFIG
#[repr(C)]
struct SConfigList {
    num_of_params: u32,
    config_ptr: *mut SConfig,
}

/// A loaded J2534 driver module
pub struct NativeProvider {
    path: PathBuf,
    open: OpenFn,
    close: CloseFn,
    connect: ConnectFn,
    disconnect: DisconnectFn,
    read_msgs: ReadMsgsFn,
    write_msgs: WriteMsgsFn,
    start_periodic_msg: StartPeriodicMsgFn,
    stop_periodic_msg: StopPeriodicMsgFn,
    start_msg_filter: StartMsgFilterFn,
    read_version: ReadVersionFn,
    get_last_error: GetLastErrorFn,
    ioctl: IoctlFn,
    // Must outlive the function pointers above; dropped last.
    _library: libloading::Library,
}

impl NativeProvider {
    /// Load the driver module and resolve all entry points
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SessionError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(SessionError::ModuleLoad(format!(
                "J2534 module not found: {}",
                path.display()
            )));
        }

        let library = unsafe { libloading::Library::new(path) }.map_err(|e| {
            SessionError::ModuleLoad(format!("Failed to load {}: {}", path.display(), e))
        })?;

        let provider = unsafe {
            NativeProvider {
                path: path.to_path_buf(),
                open: resolve(&library, b"PassThruOpen\0")?,
                close: resolve(&library, b"PassThruClose\0")?,
                connect: resolve(&library, b"PassThruConnect\0")?,
                disconnect: resolve(&library, b"PassThruDisconnect\0")?,
                read_msgs: resolve(&library, b"PassThruReadMsgs\0")?,
                write_msgs: resolve(&library, b"PassThruWriteMsgs\0")?,
                start_periodic_msg: resolve(&library, b"PassThruStartPeriodicMsg\0")?,
                stop_periodic_msg: resolve(&library, b"PassThruStopPeriodicMsg\0")?,
                start_msg_filter: resolve(&library, b"PassThruStartMsgFilter\0")?,
                read_version: resolve(&library, b"PassThruReadVersion\0")?,
                get_last_error: resolve(&library, b"PassThruGetLastError\0")?,
                ioctl: resolve(&library, b"PassThruIoctl\0")?,
                _library: library,
            }
        };

        info!(path = %path.display(), "PassThru module loaded");
        Ok(provider)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Copy a function pointer out of the library
///
/// Safety: `T` must match the exported symbol's signature.
unsafe fn resolve<T: Copy>(library: &libloading::Library, name: &[u8]) -> Result<T, SessionError> {
    let symbol: libloading::Symbol<T> = library.get(name).map_err(|e| {
        let printable = String::from_utf8_lossy(&name[..name.len().saturating_sub(1)]);
        SessionError::ModuleLoad(format!("Function {} not found in library: {}", printable, e))
    })?;
    Ok(*symbol)
}

fn text_from(buf: &[u8]) -> String {
    CStr::from_bytes_until_nul(buf)
        .map(|s| s.to_string_lossy().trim().to_string())
        .unwrap_or_default()
}

impl PassThruApi for NativeProvider {
    fn open(&self, name: Option<&str>) -> Result<u32, StatusCode> {
        let name = name
            .map(|n| CString::new(n).map_err(|_| StatusCode::NullParameter))
            .transpose()?;
        let name_ptr = name
            .as_ref()
            .map_or(std::ptr::null(), |n| n.as_ptr() as *const c_void);

        let mut device_id = 0u32;
        StatusCode::into_result(unsafe { (self.open)(name_ptr, &mut device_id) })?;
        Ok(device_id)
    }

    fn close(&self, device_id: u32) -> Result<(), StatusCode> {
        StatusCode::into_result(unsafe { (self.close)(device_id) })
    }

    fn connect(
        &self,
        device_id: u32,
        protocol_id: u32,
        flags: u32,
        baud_rate: u32,
    ) -> Result<u32, StatusCode> {
        let mut channel_id = 0u32;
        StatusCode::into_result(unsafe {
            (self.connect)(device_id, protocol_id, flags, baud_rate, &mut channel_id)
        })?;
        Ok(channel_id)
    }

    fn disconnect(&self, channel_id: u32) -> Result<(), StatusCode> {
        StatusCode::into_result(unsafe { (self.disconnect)(channel_id) })
    }

    fn read_msgs(
        &self,
        channel_id: u32,
        msgs: &mut [PassThruMsg],
        timeout_ms: u32,
    ) -> Result<usize, StatusCode> {
        let mut count = msgs.len() as u32;
        let status = unsafe { (self.read_msgs)(channel_id, msgs.as_mut_ptr(), &mut count, timeout_ms) };
        match StatusCode::into_result(status) {
            Ok(()) => Ok((count as usize).min(msgs.len())),
            // A timeout with a partial batch still delivered messages
            Err(StatusCode::Timeout) if count > 0 => Ok((count as usize).min(msgs.len())),
            Err(e) => Err(e),
        }
    }

    fn write_msgs(
        &self,
        channel_id: u32,
        msgs: &[PassThruMsg],
        timeout_ms: u32,
    ) -> Result<usize, StatusCode> {
        let mut count = msgs.len() as u32;
        // The driver only reads the buffer despite the non-const prototype.
        let ptr = msgs.as_ptr() as *mut PassThruMsg;
        StatusCode::into_result(unsafe { (self.write_msgs)(channel_id, ptr, &mut count, timeout_ms) })?;
        Ok(count as usize)
    }

    fn start_periodic_msg(
        &self,
        channel_id: u32,
        msg: &PassThruMsg,
        interval_ms: u32,
    ) -> Result<u32, StatusCode> {
        let mut msg_id = 0u32;
        StatusCode::into_result(unsafe {
            (self.start_periodic_msg)(channel_id, msg, &mut msg_id, interval_ms)
        })?;
        Ok(msg_id)
    }

    fn stop_periodic_msg(&self, channel_id: u32, msg_id: u32) -> Result<(), StatusCode> {
        StatusCode::into_result(unsafe { (self.stop_periodic_msg)(channel_id, msg_id) })
    }

    fn start_msg_filter(
        &self,
        channel_id: u32,
        filter_type: u32,
        mask: &PassThruMsg,
        pattern: &PassThruMsg,
        flow_control: Option<&PassThruMsg>,
    ) -> Result<u32, StatusCode> {
        let flow_ptr = flow_control.map_or(std::ptr::null(), |m| m as *const PassThruMsg);
        let mut filter_id = 0u32;
        StatusCode::into_result(unsafe {
            (self.start_msg_filter)(channel_id, filter_type, mask, pattern, flow_ptr, &mut filter_id)
        })?;
        Ok(filter_id)
    }

    fn ioctl(&self, handle: u32, request: &IoctlRequest) -> Result<Option<u32>, StatusCode> {
        let id = request.id();
        match request {
            IoctlRequest::SetConfig(params) => {
                let mut params = params.clone();
                let mut list = SConfigList {
                    num_of_params: params.len() as u32,
                    config_ptr: params.as_mut_ptr(),
                };
                StatusCode::into_result(unsafe {
                    (self.ioctl)(
                        handle,
                        id,
                        &mut list as *mut SConfigList as *mut c_void,
                        std::ptr::null_mut(),
                    )
                })?;
                Ok(None)
            }
            IoctlRequest::ReadVbatt => {
                let mut millivolts = 0u32;
                StatusCode::into_result(unsafe {
                    (self.ioctl)(
                        handle,
                        id,
                        std::ptr::null_mut(),
                        &mut millivolts as *mut u32 as *mut c_void,
                    )
                })?;
                Ok(Some(millivolts))
            }
            _ => {
                StatusCode::into_result(unsafe {
                    (self.ioctl)(handle, id, std::ptr::null_mut(), std::ptr::null_mut())
                })?;
                Ok(None)
            }
        }
    }

    fn read_version(&self, device_id: u32) -> Result<VersionInfo, StatusCode> {
        let mut firmware = [0u8; TEXT_BUFFER_LEN];
        let mut dll = [0u8; TEXT_BUFFER_LEN];
        let mut api = [0u8; TEXT_BUFFER_LEN];
        StatusCode::into_result(unsafe {
            (self.read_version)(
                device_id,
                firmware.as_mut_ptr() as *mut c_char,
                dll.as_mut_ptr() as *mut c_char,
                api.as_mut_ptr() as *mut c_char,
            )
        })?;
        Ok(VersionInfo {
            api: text_from(&api),
            firmware: text_from(&firmware),
            driver: text_from(&dll),
        })
    }

    fn last_error(&self) -> Option<String> {
        let mut buf = [0u8; TEXT_BUFFER_LEN];
        let status = unsafe { (self.get_last_error)(buf.as_mut_ptr() as *mut c_char) };
        if StatusCode::into_result(status).is_err() {
            return None;
        }
        let text = text_from(&buf);
        (!text.is_empty()).then_some(text)
    }
}

impl Drop for NativeProvider {
    fn drop(&mut self) {
        debug!(path = %self.path.display(), "Releasing PassThru module");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_missing_module_fails() {
        let err = NativeProvider::load("/nonexistent/op20pt32.dll")
            .err()
            .expect("load should fail");
        assert!(matches!(err, SessionError::ModuleLoad(_)));
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn test_text_from_stops_at_nul() {
        let mut buf = [0u8; 16];
        buf[..5].copy_from_slice(b"04.04");
        assert_eq!(text_from(&buf), "04.04");
        assert_eq!(text_from(b"no terminator"), "");
    }
}
