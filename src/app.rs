/*
 * The `Session` owns the curses library instance, the identity registry and
 * every wrapper created through it. Wrappers are addressed by logical ids
 * (`WindowId`, `PanelId`, `MenuId`, ...) allocated from a counter that never
 * repeats, so an id that outlived its wrapper is reported as `InvalidHandle`.
 *
 * Operations on each wrapper kind live next to their state in `window_common`
 * and the `controls` modules as further `impl Session` blocks. This module holds
 * the lifecycle (initscr/endwin), identity helpers and the user-data API.
 *
 * Dropping a session restores the terminal. This also happens while unwinding
 * from a fatal invariant panic.
 */

use crate::config::SessionConfig;
use crate::controls::form_handler::{FieldData, FormData};
use crate::controls::menu_handler::{ItemData, MenuData};
use crate::controls::panel_handler::PanelData;
use crate::controls::slk_handler::SlkStack;
use crate::curses::{CursesLibrary, HookEvent, RawHandle};
use crate::dispatch::DispatchState;
use crate::error::{BindingError, Result, check_curses};
use crate::registry::IdentityRegistry;
use crate::types::{FieldId, FormId, ItemId, MenuId, PanelId, WindowId, Wrapper};
use crate::user_data::UserData;
use crate::window_common::WindowData;

use std::any::Any;
use std::collections::HashMap;

pub struct Session {
    pub(crate) library: Box<dyn CursesLibrary>,
    pub(crate) registry: IdentityRegistry,
    pub(crate) config: SessionConfig,
    next_id: u64,
    screen: WindowId,
    ended: bool,
    pub(crate) dispatch_state: DispatchState,
    /* Hook events pulled from the library but not yet delivered. */
    pub(crate) pending_hooks: Vec<HookEvent>,
    pub(crate) windows: HashMap<WindowId, WindowData>,
    pub(crate) panels: HashMap<PanelId, PanelData>,
    pub(crate) items: HashMap<ItemId, ItemData>,
    pub(crate) menus: HashMap<MenuId, MenuData>,
    pub(crate) fields: HashMap<FieldId, FieldData>,
    pub(crate) forms: HashMap<FormId, FormData>,
    pub(crate) slk: SlkStack,
}

impl Session {
    /*
     * Initializes the screen and wraps it as a non-owning window. Input settings
     * from the config are applied to the screen and to every window created later.
     * The soft label row must be reserved before `initscr`, so it is done here.
     */
    pub fn new(library: impl CursesLibrary + 'static, config: SessionConfig) -> Result<Self> {
        let mut library: Box<dyn CursesLibrary> = Box::new(library);
        if let Some(format) = config.slk_format {
            if library.slk_init(format.code()) != crate::curses::OK {
                log::error!("Session: slk_init({format:?}) failed");
                return Err(BindingError::InitializationFailed(format!(
                    "slk_init({format:?}) failed"
                )));
            }
            log::debug!("Session: label row reserved as {format:?}");
        }
        let screen_handle = library.initscr().ok_or_else(|| {
            log::error!("Session: initscr returned NULL");
            BindingError::InitializationFailed("initscr returned NULL".to_string())
        })?;
        log::debug!(
            "Session: screen initialized ({}x{})",
            library.lines(),
            library.cols()
        );

        let mut session = Self {
            library,
            registry: IdentityRegistry::new(),
            config,
            next_id: 1,
            screen: WindowId(0),
            ended: false,
            dispatch_state: DispatchState::Idle,
            pending_hooks: Vec::new(),
            windows: HashMap::new(),
            panels: HashMap::new(),
            items: HashMap::new(),
            menus: HashMap::new(),
            fields: HashMap::new(),
            forms: HashMap::new(),
            slk: SlkStack::default(),
        };
        session.screen = session.register_window(screen_handle, None, false)?;
        Ok(session)
    }

    pub(crate) fn allocate_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    pub(crate) fn attach_hook(&mut self, handle: RawHandle, wrapper: impl Into<Wrapper>) -> Result<()> {
        self.registry
            .attach(self.library.as_mut(), handle, wrapper.into())
    }

    /*
     * Hook events still naming `handle` are dropped first; once the hook is gone
     * they could no longer be resolved.
     */
    pub(crate) fn detach_hook(&mut self, handle: RawHandle) -> Option<UserData> {
        let queued = self.library.drain_hook_events();
        self.pending_hooks.extend(queued);
        let before = self.pending_hooks.len();
        self.pending_hooks
            .retain(|event| event.handle != handle && event.child != Some(handle));
        let dropped = before - self.pending_hooks.len();
        if dropped > 0 {
            log::debug!("Session: dropped {dropped} undelivered hook event(s) for {handle:?}");
        }
        self.registry.detach(self.library.as_mut(), handle)
    }

    pub fn screen(&self) -> WindowId {
        self.screen
    }

    pub fn library(&self) -> &dyn CursesLibrary {
        self.library.as_ref()
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn dispatch_state(&self) -> DispatchState {
        self.dispatch_state
    }

    pub fn is_ended(&self) -> bool {
        self.ended
    }

    /// Restores the terminal. Calling it again is a no-op.
    pub fn end(&mut self) -> Result<()> {
        if self.ended {
            return Ok(());
        }
        self.ended = true;
        log::debug!("Session: ending curses mode");
        check_curses(self.library.endwin(), "endwin")
    }

    pub fn beep(&mut self) {
        if self.library.beep() != crate::curses::OK {
            log::warn!("Session: beep failed");
        }
    }

    /// Recomputes the panel stack and pushes it to the terminal.
    pub fn redraw_all(&mut self) -> Result<()> {
        self.library.update_panels();
        check_curses(self.library.doupdate(), "doupdate")
    }

    /*
     * Entry point for handles that come back from the library (current item,
     * current field, hook notifications).
     */
    /// # Panics
    /// Panics when the handle carries no identity hook of this session, or one
    /// written for a different handle.
    pub fn resolve_handle(&self, handle: RawHandle) -> Wrapper {
        self.registry.resolve(self.library.as_ref(), handle)
    }

    pub(crate) fn resolve_item(&self, handle: RawHandle) -> ItemId {
        match self.resolve_handle(handle) {
            Wrapper::Item(id) => id,
            other => wrong_kind(handle, "item", other),
        }
    }

    pub(crate) fn resolve_field(&self, handle: RawHandle) -> FieldId {
        match self.resolve_handle(handle) {
            Wrapper::Field(id) => id,
            other => wrong_kind(handle, "field", other),
        }
    }

    /// Library handle currently backing a wrapper.
    pub fn handle_of(&self, target: impl Into<Wrapper>) -> Result<RawHandle> {
        match target.into() {
            Wrapper::Window(id) => self.window_handle(id),
            Wrapper::Panel(id) => self.panel_data(id).map(|data| data.handle),
            Wrapper::Menu(id) => self.menu_data(id).map(|data| data.handle),
            Wrapper::Item(id) => self.item_data(id).map(|data| data.handle),
            Wrapper::Form(id) => self.form_data(id).map(|data| data.handle),
            Wrapper::Field(id) => self.field_data(id).map(|data| data.handle),
        }
    }

    // ── User data ────────────────────────────────────────────────────────────

    /// Attaches `value` to the wrapper's hook, returning whatever was attached before.
    pub fn set_user_data<T: Any>(
        &mut self,
        target: impl Into<Wrapper>,
        value: T,
    ) -> Result<Option<UserData>> {
        let handle = self.handle_of(target)?;
        Ok(self
            .registry
            .set_user_data(self.library.as_ref(), handle, Some(UserData::new(value))))
    }

    /// `Ok(None)` when nothing is attached; `TypeMismatch` when something else is.
    pub fn user_data<T: Any>(&self, target: impl Into<Wrapper>) -> Result<Option<&T>> {
        let handle = self.handle_of(target)?;
        match self.registry.user_data(self.library.as_ref(), handle) {
            Some(data) => data.downcast_ref::<T>().map(Some),
            None => Ok(None),
        }
    }

    pub fn user_data_mut<T: Any>(&mut self, target: impl Into<Wrapper>) -> Result<Option<&mut T>> {
        let handle = self.handle_of(target)?;
        match self.registry.user_data_mut(self.library.as_ref(), handle) {
            Some(data) => data.downcast_mut::<T>().map(Some),
            None => Ok(None),
        }
    }

    pub fn take_user_data(&mut self, target: impl Into<Wrapper>) -> Result<Option<UserData>> {
        let handle = self.handle_of(target)?;
        Ok(self
            .registry
            .set_user_data(self.library.as_ref(), handle, None))
    }
}

fn wrong_kind(handle: RawHandle, expected: &str, found: Wrapper) -> ! {
    log::error!("Session: handle {handle:?} resolved to {found:?}, expected {expected}");
    panic!("identity hook violation for handle {handle:?}: expected {expected}, found {found:?}");
}

impl Drop for Session {
    fn drop(&mut self) {
        if !self.ended {
            self.ended = true;
            if self.library.endwin() != crate::curses::OK {
                log::warn!("Session: endwin failed while dropping the session");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WindowConfig;
    use crate::curses_memory::MemoryCurses;

    fn session() -> (Session, crate::curses_memory::MemoryProbe) {
        let lib = MemoryCurses::new(24, 80);
        let probe = lib.probe();
        let session = Session::new(lib, SessionConfig::default()).expect("session");
        (session, probe)
    }

    #[test]
    fn screen_window_is_hooked_and_resolvable() {
        // Arrange
        let (session, _probe) = session();
        // Act
        let handle = session.handle_of(session.screen()).expect("screen handle");
        // Assert
        assert_eq!(
            session.resolve_handle(handle),
            Wrapper::Window(session.screen())
        );
    }

    #[test]
    fn failed_initscr_is_an_initialization_error() {
        let lib = MemoryCurses::new(24, 80);
        lib.probe().fail_next_allocation();
        let result = Session::new(lib, SessionConfig::default());
        assert!(matches!(result, Err(BindingError::InitializationFailed(_))));
    }

    #[test]
    fn dropping_the_session_restores_the_terminal() {
        let (session, probe) = session();
        assert!(!probe.is_ended());
        drop(session);
        assert!(probe.is_ended());
    }

    #[test]
    fn end_is_idempotent() {
        let (mut session, probe) = session();
        session.end().expect("first end");
        session.end().expect("second end");
        assert!(session.is_ended());
        assert!(probe.is_ended());
    }

    #[test]
    fn user_data_round_trips_and_checks_type() {
        // Arrange
        let (mut session, _probe) = session();
        let win = session
            .create_window(WindowConfig::new(3, 10, 0, 0))
            .expect("window");

        // Act
        let previous = session.set_user_data(win, String::from("notes")).expect("set");

        // Assert
        assert!(previous.is_none());
        assert_eq!(
            session.user_data::<String>(win).expect("read"),
            Some(&String::from("notes"))
        );
        assert!(matches!(
            session.user_data::<u32>(win),
            Err(BindingError::TypeMismatch { .. })
        ));
        session
            .user_data_mut::<String>(win)
            .expect("read mut")
            .expect("present")
            .push('!');
        let taken = session.take_user_data(win).expect("take").expect("present");
        assert_eq!(taken.into_inner::<String>().ok().as_deref(), Some("notes!"));
        assert_eq!(session.user_data::<String>(win).expect("read"), None);
        assert_eq!(session.resolve_handle(session.handle_of(win).expect("handle")), Wrapper::Window(win));
    }

    #[test]
    fn user_data_on_destroyed_wrapper_is_invalid_handle() {
        let (mut session, _probe) = session();
        let win = session
            .create_window(WindowConfig::new(3, 10, 0, 0))
            .expect("window");
        session.destroy_window(win).expect("destroy");

        assert!(matches!(
            session.set_user_data(win, 1u8),
            Err(BindingError::InvalidHandle(_))
        ));
    }

    #[test]
    #[should_panic(expected = "identity hook violation")]
    fn resolving_a_corrupted_slot_is_fatal() {
        let (session, probe) = session();
        let handle = session.handle_of(session.screen()).expect("screen handle");
        probe.overwrite_userptr(handle, 9999);
        session.resolve_handle(handle);
    }
}
