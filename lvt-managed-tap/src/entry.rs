//! Process-attach entry point and worker thread.

use std::ffi::c_void;
use std::sync::atomic::{AtomicPtr, Ordering};

use log::LevelFilter;
use windows::Win32::Foundation::{CloseHandle, BOOL, HINSTANCE, HMODULE, TRUE};
use windows::Win32::System::LibraryLoader::{DisableThreadLibraryCalls, FreeLibraryAndExitThread};
use windows::Win32::System::SystemServices::DLL_PROCESS_ATTACH;
use windows::Win32::System::Threading::{CreateThread, GetCurrentProcessId, THREAD_CREATION_FLAGS};

use lvt_core::bridge::host::run_managed_walker;
use lvt_core::com::ComApartment;
use lvt_core::logging::init_file_logger;
use lvt_core::win32::module_path_from_address;
use lvt_core::LvtError;

use crate::WalkerPlan;

static MODULE: AtomicPtr<c_void> = AtomicPtr::new(std::ptr::null_mut());

/// Nothing runs under the loader lock except starting the worker.
#[no_mangle]
pub extern "system" fn DllMain(module: HINSTANCE, reason: u32, _reserved: *mut c_void) -> BOOL {
    if reason == DLL_PROCESS_ATTACH {
        MODULE.store(module.0, Ordering::SeqCst);
        unsafe {
            let _ = DisableThreadLibraryCalls(HMODULE(module.0));
            if let Ok(thread) = CreateThread(None, 0, Some(worker), None, THREAD_CREATION_FLAGS(0), None) {
                let _ = CloseHandle(thread);
            }
        }
    }
    TRUE
}

unsafe extern "system" fn worker(_param: *mut c_void) -> u32 {
    let code = match run() {
        Ok(()) => 0,
        Err(err) => {
            log::error!("managed tap failed: {err}");
            1
        }
    };
    log::logger().flush();
    let module = HMODULE(MODULE.load(Ordering::SeqCst));
    FreeLibraryAndExitThread(module, code)
}

fn run() -> Result<(), LvtError> {
    let module = module_path_from_address(worker as *const c_void)?;
    let pid = unsafe { GetCurrentProcessId() };
    let plan = WalkerPlan::for_module(&module, pid)?;
    if let Err(err) = init_file_logger(&plan.log_file(), LevelFilter::Debug) {
        eprintln!("lvt managed tap: no log file: {err}");
    }
    log::info!("{} tap loaded in pid {pid} from {}", plan.target.label, module.display());

    let _apartment = ComApartment::enter()?;
    let endpoint = plan.endpoint()?;
    log::info!("endpoint {endpoint}");
    run_managed_walker(&plan.target, &plan.assembly, &endpoint)
}
