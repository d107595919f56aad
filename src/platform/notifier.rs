//! Session-change notifications
//!
//! `WTSRegisterSessionNotification` delivers `WM_WTSSESSION_CHANGE` to a
//! window, so a dedicated thread owns a hidden message-only window and pumps
//! its queue. The window procedure finds its sink through the creation
//! parameter stored in `GWLP_USERDATA`, so several notifiers can coexist.

use crate::constants::WM_WTSSESSION_CHANGE;
use crate::core::session::SessionEvent;
use crate::platform::registry::to_wide;
use std::ffi::c_void;
use std::sync::mpsc as std_mpsc;
use std::thread::JoinHandle;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, error, warn};
use windows::core::PCWSTR;
use windows::Win32::Foundation::{HINSTANCE, HWND, LPARAM, LRESULT, WPARAM};
use windows::Win32::System::LibraryLoader::GetModuleHandleW;
use windows::Win32::System::RemoteDesktop::{
    WTSRegisterSessionNotification, WTSUnRegisterSessionNotification, NOTIFY_FOR_ALL_SESSIONS,
};
use windows::Win32::UI::WindowsAndMessaging::{
    CreateWindowExW, DefWindowProcW, DestroyWindow, DispatchMessageW, GetMessageW,
    PostMessageW, PostQuitMessage, RegisterClassW, TranslateMessage, CREATESTRUCTW, GWLP_USERDATA,
    HMENU, HWND_MESSAGE, MSG, WINDOW_EX_STYLE, WINDOW_STYLE, WM_CLOSE, WM_DESTROY, WM_NCCREATE,
    WNDCLASSW,
};

const WINDOW_CLASS: &str = "WinUnlockSessionNotifier";

/// State the window procedure needs, owned by the pump thread
struct NotifierContext {
    sink: UnboundedSender<SessionEvent>,
}

/// Running notification pump; stops when dropped
pub struct SessionNotifier {
    hwnd: isize,
    thread: Option<JoinHandle<()>>,
}

impl SessionNotifier {
    /// Start the pump thread and register for notifications of all sessions
    pub fn start(sink: UnboundedSender<SessionEvent>) -> Result<Self, String> {
        let (ready_tx, ready_rx) = std_mpsc::channel::<Result<isize, String>>();

        let thread = std::thread::Builder::new()
            .name("session-notifier".to_string())
            .spawn(move || pump(NotifierContext { sink }, ready_tx))
            .map_err(|e| format!("Failed to spawn notifier thread: {}", e))?;

        match ready_rx.recv() {
            Ok(Ok(hwnd)) => Ok(Self {
                hwnd,
                thread: Some(thread),
            }),
            Ok(Err(e)) => {
                let _ = thread.join();
                Err(e)
            }
            Err(_) => {
                let _ = thread.join();
                Err("Notifier thread exited before reporting".to_string())
            }
        }
    }

    /// Unregister and join the pump thread
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        if let Some(thread) = self.thread.take() {
            // SAFETY: The window is owned by the pump thread; posting WM_CLOSE
            // from another thread is permitted.
            let posted = unsafe {
                PostMessageW(
                    HWND(self.hwnd as *mut c_void),
                    WM_CLOSE,
                    WPARAM(0),
                    LPARAM(0),
                )
            };
            if let Err(e) = posted {
                warn!("Failed to post WM_CLOSE to notifier window: {:?}", e);
                return;
            }
            let _ = thread.join();
            debug!("Session notifier stopped");
        }
    }
}

impl Drop for SessionNotifier {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn pump(context: NotifierContext, ready: std_mpsc::Sender<Result<isize, String>>) {
    let context = Box::new(context);
    let hwnd = match create_window(&context) {
        Ok(hwnd) => hwnd,
        Err(e) => {
            let _ = ready.send(Err(e));
            return;
        }
    };

    // SAFETY: `hwnd` is a live window owned by this thread.
    if let Err(e) = unsafe { WTSRegisterSessionNotification(hwnd, NOTIFY_FOR_ALL_SESSIONS) } {
        // SAFETY: As above.
        unsafe {
            let _ = DestroyWindow(hwnd);
        }
        let _ = ready.send(Err(format!(
            "WTSRegisterSessionNotification failed: {:?}",
            e
        )));
        return;
    }

    debug!("Registered for session notifications");
    let _ = ready.send(Ok(hwnd.0 as isize));

    let mut msg = MSG::default();
    // SAFETY: Standard message loop on the thread that owns the window.
    unsafe {
        while GetMessageW(&mut msg, HWND::default(), 0, 0).as_bool() {
            let _ = TranslateMessage(&msg);
            DispatchMessageW(&msg);
        }
    }

    // The window (and the pointer to `context` it held) is gone by now
    drop(context);
}

fn create_window(context: &NotifierContext) -> Result<HWND, String> {
    let class_name = to_wide(WINDOW_CLASS);

    // SAFETY: `class_name` outlives both calls; the context pointer stays
    // valid until the message loop exits, after the window is destroyed.
    unsafe {
        let module = GetModuleHandleW(PCWSTR::null())
            .map_err(|e| format!("GetModuleHandleW failed: {:?}", e))?;
        let instance = HINSTANCE(module.0);

        let class = WNDCLASSW {
            lpfnWndProc: Some(window_proc),
            hInstance: instance,
            lpszClassName: PCWSTR::from_raw(class_name.as_ptr()),
            ..Default::default()
        };
        // Zero means already registered by an earlier notifier in this process
        let _ = RegisterClassW(&class);

        CreateWindowExW(
            WINDOW_EX_STYLE::default(),
            PCWSTR::from_raw(class_name.as_ptr()),
            PCWSTR::null(),
            WINDOW_STYLE::default(),
            0,
            0,
            0,
            0,
            HWND_MESSAGE,
            HMENU::default(),
            instance,
            Some(context as *const NotifierContext as *const c_void),
        )
        .map_err(|e| format!("CreateWindowExW failed: {:?}", e))
    }
}

unsafe extern "system" fn window_proc(
    hwnd: HWND,
    msg: u32,
    wparam: WPARAM,
    lparam: LPARAM,
) -> LRESULT {
    match msg {
        WM_NCCREATE => {
            let create = &*(lparam.0 as *const CREATESTRUCTW);
            set_user_data(hwnd, create.lpCreateParams as isize);
            DefWindowProcW(hwnd, msg, wparam, lparam)
        }
        WM_WTSSESSION_CHANGE => {
            let context = get_user_data(hwnd) as *const NotifierContext;
            if let Some(context) = context.as_ref() {
                let code = wparam.0 as u32;
                let session_id = lparam.0 as u32;
                if let Some(event) = SessionEvent::from_notification(code, session_id) {
                    debug!("Session notification {:#x} for session {}", code, session_id);
                    if context.sink.send(event).is_err() {
                        error!("Session monitor is gone, dropping {:?}", event);
                    }
                }
            }
            LRESULT(0)
        }
        WM_CLOSE => {
            let _ = WTSUnRegisterSessionNotification(hwnd);
            let _ = DestroyWindow(hwnd);
            LRESULT(0)
        }
        WM_DESTROY => {
            set_user_data(hwnd, 0);
            PostQuitMessage(0);
            LRESULT(0)
        }
        _ => DefWindowProcW(hwnd, msg, wparam, lparam),
    }
}

#[cfg(target_pointer_width = "64")]
unsafe fn set_user_data(hwnd: HWND, value: isize) {
    windows::Win32::UI::WindowsAndMessaging::SetWindowLongPtrW(hwnd, GWLP_USERDATA, value);
}

#[cfg(target_pointer_width = "64")]
unsafe fn get_user_data(hwnd: HWND) -> isize {
    windows::Win32::UI::WindowsAndMessaging::GetWindowLongPtrW(hwnd, GWLP_USERDATA)
}

#[cfg(target_pointer_width = "32")]
unsafe fn set_user_data(hwnd: HWND, value: isize) {
    windows::Win32::UI::WindowsAndMessaging::SetWindowLongW(hwnd, GWLP_USERDATA, value as i32);
}

#[cfg(target_pointer_width = "32")]
unsafe fn get_user_data(hwnd: HWND) -> isize {
    windows::Win32::UI::WindowsAndMessaging::GetWindowLongW(hwnd, GWLP_USERDATA) as isize
}
