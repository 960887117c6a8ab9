//! Rainmeter plugin exposing the system's now-playing media session
//!
//! Each measure reports one field of the active session (`PlayerType`) and
//! accepts transport bangs (`[!CommandMeasure Measure "PlayPause"]`).

pub mod context;
pub mod host;
pub mod logging;
pub mod measure;
pub mod registry;

pub use context::{PlatformFactory, PluginContext};
pub use host::{HostApi, LogLevel};
pub use measure::Measure;
pub use registry::{MeasureId, Registry};

#[cfg(windows)]
mod exports {
    use crate::host::{from_wide, Rainmeter};
    use crate::registry::{MeasureId, Registry};
    use nowplaying_media_session::create_media_platform;
    use parking_lot::Mutex;
    use std::ffi::c_void;
    use std::sync::{Arc, OnceLock};

    static REGISTRY: OnceLock<Mutex<Registry>> = OnceLock::new();

    fn registry() -> &'static Mutex<Registry> {
        REGISTRY.get_or_init(|| Mutex::new(Registry::new(Box::new(create_media_platform))))
    }

    fn measure_id(data: *mut c_void) -> MeasureId {
        MeasureId(data as usize)
    }

    #[no_mangle]
    pub unsafe extern "C" fn Initialize(data: *mut *mut c_void, rm: *mut c_void) {
        if data.is_null() {
            return;
        }
        let id = registry().lock().initialize(Arc::new(Rainmeter::new(rm)));
        *data = id.0 as *mut c_void;
    }

    #[no_mangle]
    pub unsafe extern "C" fn Reload(data: *mut c_void, _rm: *mut c_void, _max_value: *mut f64) {
        registry().lock().reload(measure_id(data));
    }

    #[no_mangle]
    pub unsafe extern "C" fn Update(data: *mut c_void) -> f64 {
        registry().lock().update(measure_id(data))
    }

    /// Points into the measure's own buffer, valid until its next call
    #[no_mangle]
    pub unsafe extern "C" fn GetString(data: *mut c_void) -> *const u16 {
        registry()
            .lock()
            .string(measure_id(data))
            .map_or(std::ptr::null(), |wide| wide.as_ptr())
    }

    #[no_mangle]
    pub unsafe extern "C" fn ExecuteBang(data: *mut c_void, args: *const u16) {
        let args = from_wide(args);
        registry().lock().execute_bang(measure_id(data), &args);
    }

    #[no_mangle]
    pub unsafe extern "C" fn Finalize(data: *mut c_void) {
        registry().lock().finalize(measure_id(data));
    }
}
