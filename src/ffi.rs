//! C ABI for hosts that load the viewer as a shared library.
//!
//! Functions returning `c_int` report 0 on success and -1 on failure; the
//! message of the last failure is available from `goio_last_error`. The
//! generated C header is written to `include/goio.h` by cbindgen.

use crate::config::GoIoConfig;
use crate::error::LastError;
use crate::types::ProductId;
use crate::viewer::{Viewer, ViewerSettings};
use crate::{GoIoError, Result};
use std::ffi::{c_char, c_int, CStr, CString};

static LAST_ERROR: LastError = LastError::new();

/// Opaque viewer handle for C consumers.
pub struct GoIoViewer {
    viewer: Viewer,
    product: ProductId,
    devices: Vec<CString>,
}

/// One reading in C-compatible layout.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct GoIoGrab {
    /// Calibrated value in sensor units.
    pub value: f64,
    /// Most recent raw ADC value used.
    pub raw: i32,
    /// Number of samples averaged into `value`.
    pub samples: u32,
}

fn status(result: Result<()>) -> c_int {
    match result {
        Ok(()) => {
            LAST_ERROR.clear();
            0
        }
        Err(e) => {
            log::debug!("goio ffi call failed: {}", e);
            LAST_ERROR.set(&e);
            -1
        }
    }
}

fn open_viewer() -> Result<GoIoViewer> {
    let config = GoIoConfig::from_env()?;
    let goio = config.open()?;
    Ok(GoIoViewer {
        viewer: Viewer::new(goio),
        product: config.product,
        devices: Vec::new(),
    })
}

/// Initialise the library with the backend selected by the `GOIO_*`
/// environment variables. Returns NULL on error (check goio_last_error()).
#[no_mangle]
pub extern "C" fn goio_viewer_new() -> *mut GoIoViewer {
    match open_viewer() {
        Ok(viewer) => {
            LAST_ERROR.clear();
            Box::into_raw(Box::new(viewer))
        }
        Err(e) => {
            LAST_ERROR.set(&e);
            std::ptr::null_mut()
        }
    }
}

/// Rescan and return the number of connected devices, or -1 on error.
///
/// The names returned by `goio_viewer_device_name` refer to this scan.
///
/// # Safety
/// `viewer` must be a pointer returned by `goio_viewer_new`, or null.
#[no_mangle]
pub unsafe extern "C" fn goio_viewer_device_count(viewer: *mut GoIoViewer) -> c_int {
    if viewer.is_null() {
        return -1;
    }
    let handle = &mut *viewer;

    let scan = handle
        .viewer
        .device_parameter(handle.product)
        .and_then(|param| {
            param
                .limits
                .into_iter()
                .map(|name| {
                    CString::new(name).map_err(|e| GoIoError::Protocol(e.to_string()))
                })
                .collect::<Result<Vec<_>>>()
        });

    match scan {
        Ok(devices) => {
            LAST_ERROR.clear();
            handle.devices = devices;
            handle.devices.len() as c_int
        }
        Err(e) => {
            LAST_ERROR.set(&e);
            -1
        }
    }
}

/// Name of the `index`-th device of the last scan, or NULL. The string stays
/// valid until the next `goio_viewer_device_count` call.
///
/// # Safety
/// `viewer` must be a pointer returned by `goio_viewer_new`, or null.
#[no_mangle]
pub unsafe extern "C" fn goio_viewer_device_name(
    viewer: *const GoIoViewer,
    index: c_int,
) -> *const c_char {
    if viewer.is_null() || index < 0 {
        return std::ptr::null();
    }
    let handle = &*viewer;
    handle
        .devices
        .get(index as usize)
        .map(|name| name.as_ptr())
        .unwrap_or(std::ptr::null())
}

/// Open `device` and start collecting. A NULL `device` selects the first
/// connected one.
///
/// # Safety
/// `viewer` must be a pointer returned by `goio_viewer_new`, or null.
/// `device` must be a NUL-terminated string, or null.
#[no_mangle]
pub unsafe extern "C" fn goio_viewer_init(
    viewer: *mut GoIoViewer,
    device: *const c_char,
) -> c_int {
    if viewer.is_null() {
        return -1;
    }
    let handle = &mut *viewer;

    let device = if device.is_null() {
        handle
            .viewer
            .device_parameter(handle.product)
            .and_then(|param| {
                param.value.ok_or(GoIoError::DeviceNotFound {
                    device: "#0".to_string(),
                    product: handle.product,
                })
            })
    } else {
        Ok(CStr::from_ptr(device).to_string_lossy().into_owned())
    };

    status(device.and_then(|device| {
        let info = handle.viewer.ini_detector(ViewerSettings {
            device,
            product: handle.product,
        })?;
        log::info!("Viewer initialised: {}", info);
        Ok(())
    }))
}

/// Read one value into `out`, averaging over `n_average` samples.
///
/// # Safety
/// `viewer` and `out` must be valid pointers, or null.
#[no_mangle]
pub unsafe extern "C" fn goio_viewer_grab(
    viewer: *mut GoIoViewer,
    n_average: c_int,
    out: *mut GoIoGrab,
) -> c_int {
    if viewer.is_null() || out.is_null() {
        return -1;
    }
    let handle = &mut *viewer;

    status(
        handle
            .viewer
            .grab_data(n_average.max(1) as usize)
            .map(|data| {
                out.write(GoIoGrab {
                    value: data.value,
                    raw: data.raw,
                    samples: data.samples as u32,
                });
            }),
    )
}

/// Stop collecting. The next grab restarts acquisition.
///
/// # Safety
/// `viewer` must be a pointer returned by `goio_viewer_new`, or null.
#[no_mangle]
pub unsafe extern "C" fn goio_viewer_stop(viewer: *mut GoIoViewer) -> c_int {
    if viewer.is_null() {
        return -1;
    }
    status((*viewer).viewer.stop())
}

/// Close the sensor. Calling it again does nothing.
///
/// # Safety
/// `viewer` must be a pointer returned by `goio_viewer_new`, or null.
#[no_mangle]
pub unsafe extern "C" fn goio_viewer_close(viewer: *mut GoIoViewer) -> c_int {
    if viewer.is_null() {
        return -1;
    }
    status((*viewer).viewer.close())
}

/// Close everything and free the viewer.
///
/// # Safety
/// `viewer` must be a pointer returned by `goio_viewer_new`, or null.
#[no_mangle]
pub unsafe extern "C" fn goio_viewer_free(viewer: *mut GoIoViewer) {
    if !viewer.is_null() {
        drop(Box::from_raw(viewer));
    }
}

/// Get the last error message. Returns NULL if the last call succeeded.
/// The returned pointer is valid until the next goio API call.
#[no_mangle]
pub extern "C" fn goio_last_error() -> *const c_char {
    LAST_ERROR.as_ptr()
}

#[cfg(all(test, feature = "mock"))]
mod tests {
    use super::*;
    use crate::device::GoIo;
    use crate::mock::MockLibrary;

    fn handle() -> *mut GoIoViewer {
        let goio = GoIo::open(Box::new(MockLibrary::single_golink())).unwrap();
        Box::into_raw(Box::new(GoIoViewer {
            viewer: Viewer::new(goio),
            product: ProductId::GoLink,
            devices: Vec::new(),
        }))
    }

    #[test]
    fn test_viewer_through_c_abi() {
        let viewer = handle();
        unsafe {
            assert_eq!(goio_viewer_device_count(viewer), 1);
            let name = CStr::from_ptr(goio_viewer_device_name(viewer, 0));
            assert_eq!(name.to_str().unwrap(), "mock-golink-0");
            assert!(goio_viewer_device_name(viewer, 1).is_null());

            assert_eq!(goio_viewer_init(viewer, std::ptr::null()), 0);
            let mut grab = GoIoGrab::default();
            assert_eq!(goio_viewer_grab(viewer, 1, &mut grab), 0);
            assert_eq!(grab.raw, 2051);
            assert_eq!(grab.samples, 1);

            assert_eq!(goio_viewer_stop(viewer), 0);
            assert_eq!(goio_viewer_close(viewer), 0);
            assert_eq!(goio_viewer_close(viewer), 0);
            goio_viewer_free(viewer);
        }
    }

    #[test]
    fn test_null_and_failed_calls() {
        unsafe {
            assert_eq!(goio_viewer_device_count(std::ptr::null_mut()), -1);
            assert_eq!(goio_viewer_stop(std::ptr::null_mut()), -1);
            goio_viewer_free(std::ptr::null_mut());

            let viewer = handle();
            let device = CString::new("missing").unwrap();
            assert_eq!(goio_viewer_init(viewer, device.as_ptr()), -1);
            // The other test in this module only clears the slot.
            assert_eq!(goio_viewer_device_count(viewer), 1);
            assert!(goio_last_error().is_null());
            goio_viewer_free(viewer);
        }
    }
}
