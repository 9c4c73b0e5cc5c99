use raw_window_handle::{
    DisplayHandle, HandleError, HasDisplayHandle, HasWindowHandle, RawDisplayHandle,
    RawWindowHandle, WebDisplayHandle, WebWindowHandle, WindowHandle,
};

/// Platform window handed over by the host UI.
///
/// This is a plain owned copy of the raw handles. The host keeps the actual
/// window alive; the core never extends its lifetime.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct NativeWindow {
    window: RawWindowHandle,
    display: RawDisplayHandle,
}

// SAFETY: the raw handles are only dereferenced by the driver on the render
// thread, and `from_window` requires the host to keep the window alive for as
// long as any surface created from it exists.
unsafe impl Send for NativeWindow {}
unsafe impl Sync for NativeWindow {}

impl NativeWindow {
    /// Captures the raw handles of a live platform window.
    ///
    /// # Safety
    ///
    /// The window must outlive every surface attached from the returned value,
    /// i.e. the host must deliver `notify_surface_destroyed` (and let it be
    /// processed) before destroying the window.
    pub unsafe fn from_window<W>(window: &W) -> Result<Self, HandleError>
    where
        W: HasWindowHandle + HasDisplayHandle + ?Sized,
    {
        Ok(Self {
            window: window.window_handle()?.as_raw(),
            display: window.display_handle()?.as_raw(),
        })
    }

    /// Placeholder window for drivers that never touch a platform window
    /// (headless rendering, tests). `id` distinguishes windows from each other.
    pub fn offscreen(id: u32) -> Self {
        Self {
            window: RawWindowHandle::Web(WebWindowHandle::new(id)),
            display: RawDisplayHandle::Web(WebDisplayHandle::new()),
        }
    }

    pub fn raw_window(&self) -> RawWindowHandle {
        self.window
    }

    pub fn raw_display(&self) -> RawDisplayHandle {
        self.display
    }
}

impl HasWindowHandle for NativeWindow {
    fn window_handle(&self) -> Result<WindowHandle<'_>, HandleError> {
        // SAFETY: validity is guaranteed by the `from_window` contract.
        Ok(unsafe { WindowHandle::borrow_raw(self.window) })
    }
}

impl HasDisplayHandle for NativeWindow {
    fn display_handle(&self) -> Result<DisplayHandle<'_>, HandleError> {
        // SAFETY: see `window_handle`.
        Ok(unsafe { DisplayHandle::borrow_raw(self.display) })
    }
}
