//! COM objects exposed to the XAML diagnostics runtime.
//!
//! The runtime creates the tap through [`DllGetClassObject`] and hands it
//! the diagnostics site. From there a worker thread subscribes to visual
//! tree notifications, asks the UI thread (through a message-only window)
//! to read each element's layout properties, and writes the payload to the
//! endpoint named in the initialization data.

use std::ffi::c_void;
use std::mem::ManuallyDrop;
use std::sync::Arc;
use std::time::Duration;

use log::LevelFilter;
use parking_lot::Mutex;
use windows::core::{implement, w, Interface, IUnknown, GUID, HRESULT, PCWSTR};
use windows::Win32::Foundation::{
    BOOL, CLASS_E_CLASSNOTAVAILABLE, CLASS_E_NOAGGREGATION, E_POINTER, HWND, LPARAM, LRESULT,
    S_FALSE, WPARAM,
};
use windows::Win32::System::Com::{CoTaskMemFree, IClassFactory, IClassFactory_Impl};
use windows::Win32::System::LibraryLoader::GetModuleHandleW;
use windows::Win32::System::Ole::{IObjectWithSite, IObjectWithSite_Impl};
use windows::Win32::UI::WindowsAndMessaging::{
    CreateWindowExW, DefWindowProcW, PostMessageW, RegisterClassW, SendMessageW, HMENU,
    HWND_MESSAGE, WINDOW_EX_STYLE, WINDOW_STYLE, WM_CLOSE, WM_USER, WNDCLASSW,
};
use windows::Win32::UI::Xaml::Diagnostics::{
    IVisualTreeService, IVisualTreeServiceCallback, IVisualTreeServiceCallback2,
    IVisualTreeServiceCallback2_Impl, IVisualTreeServiceCallback_Impl, IXamlDiagnostics,
    ParentChildRelation, PropertyChainSource, PropertyChainValue, VisualElement,
    VisualElementState, VisualMutationType, Add as MUTATION_ADD,
};

use lvt_core::com::ComApartment;
use lvt_core::inject::{TapInit, TAP_CLSID};
use lvt_core::transport::{send_payload, EndpointName};
use lvt_core::LvtError;

use crate::tree::TapTree;

const WM_COLLECT: u32 = WM_USER + 100;
const LOG_FILE: &str = "lvt_tap.log";
/// Time given to the initial tree replay when nothing arrived during advise.
const REPLAY_GRACE: Duration = Duration::from_millis(500);

/// COM pointers moved to the worker thread. The diagnostics service is
/// free-threaded; the window handle is only used to post to the UI thread.
struct Shared<T>(T);

unsafe impl<T> Send for Shared<T> {}
unsafe impl<T> Sync for Shared<T> {}

struct TapState {
    service: Shared<IVisualTreeService>,
    init: TapInit,
    tree: Mutex<TapTree>,
}

// ---------------------------------------------------------------------------
// Class factory
// ---------------------------------------------------------------------------

#[implement(IClassFactory)]
struct TapFactory;

impl IClassFactory_Impl for TapFactory_Impl {
    fn CreateInstance(
        &self,
        outer: Option<&IUnknown>,
        riid: *const GUID,
        object: *mut *mut c_void,
    ) -> windows::core::Result<()> {
        if object.is_null() {
            return Err(E_POINTER.into());
        }
        unsafe { *object = std::ptr::null_mut() };
        if outer.is_some() {
            return Err(CLASS_E_NOAGGREGATION.into());
        }
        let tap: IObjectWithSite = LvtTap {
            site: Mutex::new(None),
        }
        .into();
        unsafe { tap.query(riid, object) }.ok()
    }

    fn LockServer(&self, _lock: BOOL) -> windows::core::Result<()> {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tap object
// ---------------------------------------------------------------------------

#[implement(IObjectWithSite)]
struct LvtTap {
    site: Mutex<Option<IUnknown>>,
}

impl IObjectWithSite_Impl for LvtTap_Impl {
    fn SetSite(&self, site: Option<&IUnknown>) -> windows::core::Result<()> {
        *self.site.lock() = site.cloned();
        let Some(site) = site else {
            return Ok(());
        };
        if let Err(err) = lvt_core::logging::init_file_logger(LOG_FILE, LevelFilter::Debug) {
            eprintln!("lvt_tap: no log file: {err}");
        }
        match start(site) {
            Ok(()) => Ok(()),
            Err(err) => {
                log::error!("tap start failed: {err}");
                Ok(())
            }
        }
    }

    fn GetSite(&self, riid: *const GUID, site: *mut *mut c_void) -> windows::core::Result<()> {
        match self.site.lock().as_ref() {
            Some(unknown) => unsafe { unknown.query(riid, site) }.ok(),
            None => Err(windows::core::Error::from(E_POINTER)),
        }
    }
}

/// Runs on the UI thread that delivered the site.
fn start(site: &IUnknown) -> Result<(), LvtError> {
    let diagnostics: IXamlDiagnostics = site.cast()?;
    let data = unsafe { diagnostics.GetInitializationData() }?.to_string();
    let init = TapInit::parse(&data);
    log::info!(
        "tap attached (endpoint {}, properties {})",
        init.endpoint,
        init.collect_properties
    );
    let service: IVisualTreeService = site.cast()?;
    let window = create_message_window()?;

    let state = Arc::new(TapState {
        service: Shared(service),
        init,
        tree: Mutex::new(TapTree::new()),
    });
    let callback: IVisualTreeServiceCallback2 = TreeCallback {
        state: Arc::clone(&state),
    }
    .into();
    let callback: IVisualTreeServiceCallback = callback.cast()?;

    let callback = Shared(callback);
    let window = Shared(window);
    std::thread::Builder::new()
        .name("lvt-tap".into())
        .spawn(move || {
            let (callback, window) = (callback, window);
            if let Err(err) = run_worker(&state, &callback.0, window.0) {
                log::error!("tap worker failed: {err}");
            }
        })?;
    Ok(())
}

fn run_worker(state: &Arc<TapState>, callback: &IVisualTreeServiceCallback, window: HWND) -> Result<(), LvtError> {
    let _apartment = ComApartment::enter()?;
    let service = &state.service.0;
    unsafe { service.AdviseVisualTreeChange(callback) }?;
    if state.tree.lock().is_empty() {
        std::thread::sleep(REPLAY_GRACE);
    }

    let result = collect_and_send(state, window);

    if let Err(err) = unsafe { service.UnadviseVisualTreeChange(callback) } {
        log::debug!("unadvise failed: {err}");
    }
    if let Err(err) = unsafe { PostMessageW(window, WM_CLOSE, WPARAM(0), LPARAM(0)) } {
        log::debug!("could not close message window: {err}");
    }
    result
}

fn collect_and_send(state: &Arc<TapState>, window: HWND) -> Result<(), LvtError> {
    // Property reads have to happen on the UI thread.
    unsafe {
        SendMessageW(window, WM_COLLECT, WPARAM(0), LPARAM(Arc::as_ptr(state) as isize));
    }
    let payload = {
        let tree = state.tree.lock();
        log::info!("{} elements, {} roots", tree.len(), tree.root_count());
        tree.encode()?
    };
    send_payload(&EndpointName::from_string(state.init.endpoint.clone()), &payload)?;
    log::info!("sent {} bytes", payload.len());
    Ok(())
}

// ---------------------------------------------------------------------------
// Tree notifications
// ---------------------------------------------------------------------------

#[implement(IVisualTreeServiceCallback2)]
struct TreeCallback {
    state: Arc<TapState>,
}

impl IVisualTreeServiceCallback_Impl for TreeCallback_Impl {
    fn OnVisualTreeChange(
        &self,
        relation: &ParentChildRelation,
        element: &VisualElement,
        mutation: VisualMutationType,
    ) -> windows::core::Result<()> {
        if mutation == MUTATION_ADD {
            self.state.tree.lock().add(
                relation.Parent,
                element.Handle,
                &element.Type.to_string(),
                &element.Name.to_string(),
            );
        }
        Ok(())
    }
}

impl IVisualTreeServiceCallback2_Impl for TreeCallback_Impl {
    fn OnElementStateChanged(
        &self,
        _element: u64,
        _state: VisualElementState,
        _context: &PCWSTR,
    ) -> windows::core::Result<()> {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// UI thread collection
// ---------------------------------------------------------------------------

fn create_message_window() -> Result<HWND, LvtError> {
    let instance = unsafe { GetModuleHandleW(None) }?;
    let class = WNDCLASSW {
        lpfnWndProc: Some(window_proc),
        hInstance: instance.into(),
        lpszClassName: w!("LvtTapMsg"),
        ..Default::default()
    };
    // Zero also means the class survives from an earlier attach.
    if unsafe { RegisterClassW(&class) } == 0 {
        log::debug!("RegisterClassW returned 0; reusing existing class");
    }
    let window = unsafe {
        CreateWindowExW(
            WINDOW_EX_STYLE::default(),
            w!("LvtTapMsg"),
            w!(""),
            WINDOW_STYLE::default(),
            0,
            0,
            0,
            0,
            HWND_MESSAGE,
            HMENU::default(),
            class.hInstance,
            None,
        )
    }?;
    Ok(window)
}

unsafe extern "system" fn window_proc(window: HWND, message: u32, wparam: WPARAM, lparam: LPARAM) -> LRESULT {
    if message == WM_COLLECT && lparam.0 != 0 {
        let state = &*(lparam.0 as *const TapState);
        collect_layout(state);
        return LRESULT(0);
    }
    DefWindowProcW(window, message, wparam, lparam)
}

fn collect_layout(state: &TapState) {
    let handles = state.tree.lock().handles();
    let mut failed = 0usize;
    for handle in handles {
        match unsafe { read_chain(&state.service.0, handle) } {
            Ok(chain) => state
                .tree
                .lock()
                .apply_chain(handle, &chain, state.init.collect_properties),
            Err(_) => failed += 1,
        }
    }
    if failed > 0 {
        log::debug!("{failed} elements had no readable properties");
    }
}

/// `(PropertyName, Value)` for each entry of the element's property chain.
unsafe fn read_chain(service: &IVisualTreeService, handle: u64) -> windows::core::Result<Vec<(String, String)>> {
    let mut source_count = 0u32;
    let mut sources: *mut PropertyChainSource = std::ptr::null_mut();
    let mut value_count = 0u32;
    let mut values: *mut PropertyChainValue = std::ptr::null_mut();
    service.GetPropertyValuesChain(handle, &mut source_count, &mut sources, &mut value_count, &mut values)?;

    let mut chain = Vec::with_capacity(value_count as usize);
    if !values.is_null() {
        for value in std::slice::from_raw_parts_mut(values, value_count as usize) {
            chain.push((value.PropertyName.to_string(), value.Value.to_string()));
            ManuallyDrop::drop(&mut value.Type);
            ManuallyDrop::drop(&mut value.DeclaringType);
            ManuallyDrop::drop(&mut value.ValueType);
            ManuallyDrop::drop(&mut value.ItemType);
            ManuallyDrop::drop(&mut value.Value);
            ManuallyDrop::drop(&mut value.PropertyName);
        }
        CoTaskMemFree(Some(values as *const c_void));
    }
    if !sources.is_null() {
        for source in std::slice::from_raw_parts_mut(sources, source_count as usize) {
            ManuallyDrop::drop(&mut source.TargetType);
            ManuallyDrop::drop(&mut source.Name);
            ManuallyDrop::drop(&mut source.SrcInfo.FileName);
            ManuallyDrop::drop(&mut source.SrcInfo.Hash);
        }
        CoTaskMemFree(Some(sources as *const c_void));
    }
    Ok(chain)
}

// ---------------------------------------------------------------------------
// Exports
// ---------------------------------------------------------------------------

/// # Safety
///
/// Called by COM with valid `rclsid`, `riid` and `ppv` pointers.
#[no_mangle]
pub unsafe extern "system" fn DllGetClassObject(
    rclsid: *const GUID,
    riid: *const GUID,
    ppv: *mut *mut c_void,
) -> HRESULT {
    if rclsid.is_null() || riid.is_null() || ppv.is_null() {
        return E_POINTER;
    }
    *ppv = std::ptr::null_mut();
    if *rclsid != GUID::from_u128(TAP_CLSID) {
        return CLASS_E_CLASSNOTAVAILABLE;
    }
    let factory: IClassFactory = TapFactory.into();
    factory.query(riid, ppv)
}

/// The tap stays loaded for the life of the process.
#[no_mangle]
pub extern "system" fn DllCanUnloadNow() -> HRESULT {
    S_FALSE
}
