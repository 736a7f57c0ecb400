/*
 * Window and subwindow bookkeeping. Every window wrapper records its parent,
 * the previous sibling under that parent and the most recently created of its
 * own subwindows, which together form a LIFO child list per window.
 *
 * Killing the subwindows of a window walks that list newest first, kills each
 * child's descendants before the child, unhooks and deletes the child's handle
 * and leaves the child wrapper in place but disabled. A disabled wrapper has no
 * handle; every operation on it reports `InvalidHandle` except destruction.
 *
 * Windows created on behalf of panels are marked `managed` and can only be
 * released through the panel that owns them.
 */

use crate::app::Session;
use crate::config::WindowConfig;
use crate::curses::{OK, RawHandle};
use crate::error::{BindingError, Result, check_curses};
use crate::types::WindowId;

#[derive(Debug)]
pub(crate) struct WindowData {
    /// `None` once the window was killed through its parent.
    handle: Option<RawHandle>,
    parent: Option<WindowId>,
    previous_sibling: Option<WindowId>,
    last_child: Option<WindowId>,
    owns_handle: bool,
    managed: bool,
}

impl WindowData {
    fn new(handle: RawHandle, parent: Option<WindowId>, owns_handle: bool) -> Self {
        Self {
            handle: Some(handle),
            parent,
            previous_sibling: None,
            last_child: None,
            owns_handle,
            managed: false,
        }
    }

    pub(crate) fn handle(&self) -> Option<RawHandle> {
        self.handle
    }
}

fn no_window(id: WindowId) -> BindingError {
    log::warn!("WindowCommon: window {id:?} not found");
    BindingError::InvalidHandle(format!("window {id:?} not found"))
}

impl Session {
    fn window_data(&self, id: WindowId) -> Result<&WindowData> {
        self.windows.get(&id).ok_or_else(|| no_window(id))
    }

    fn window_data_mut(&mut self, id: WindowId) -> Result<&mut WindowData> {
        self.windows.get_mut(&id).ok_or_else(|| no_window(id))
    }

    /// Live library handle of a window; killed windows are reported as invalid.
    pub(crate) fn window_handle(&self, id: WindowId) -> Result<RawHandle> {
        self.window_data(id)?.handle.ok_or_else(|| {
            log::warn!("WindowCommon: window {id:?} was killed with its parent's subwindows");
            BindingError::InvalidHandle(format!("window {id:?} has been killed"))
        })
    }

    /*
     * Hooks a freshly created handle, applies the session's input settings and
     * links the wrapper under its parent. On a hook failure the handle is
     * deleted again when this wrapper would have owned it.
     */
    pub(crate) fn register_window(
        &mut self,
        handle: RawHandle,
        parent: Option<WindowId>,
        owns_handle: bool,
    ) -> Result<WindowId> {
        let id = WindowId(self.allocate_id());
        if let Err(err) = self.attach_hook(handle, id) {
            if owns_handle && self.library.delwin(handle) != OK {
                log::warn!("WindowCommon: delwin failed while rolling back window {id:?}");
            }
            return Err(err);
        }
        if self.library.keypad(handle, self.config.keypad) != OK {
            log::warn!("WindowCommon: keypad setting rejected for window {id:?}");
        }
        let delay = self.config.timeout_ms();
        self.library.wtimeout(handle, delay);

        let mut data = WindowData::new(handle, parent, owns_handle);
        if let Some(parent_id) = parent
            && let Some(parent_data) = self.windows.get_mut(&parent_id)
        {
            data.previous_sibling = parent_data.last_child.replace(id);
        }
        self.windows.insert(id, data);
        log::debug!("WindowCommon: registered window {id:?} (parent {parent:?})");
        Ok(id)
    }

    pub fn create_window(&mut self, config: WindowConfig) -> Result<WindowId> {
        let handle = self
            .library
            .newwin(config.lines, config.cols, config.begin_y, config.begin_x)
            .ok_or_else(|| {
                log::warn!("WindowCommon: newwin rejected {config:?}");
                BindingError::SystemError(format!("newwin returned NULL for {config:?}"))
            })?;
        self.register_window(handle, None, true)
    }

    /*
     * Creates a subwindow positioned relative to `parent`. The new window is
     * pushed at the head of the parent's child list.
     */
    /// # Panics
    /// Panics when `parent` is a disabled (killed) window.
    pub fn create_subwindow(&mut self, parent: WindowId, config: WindowConfig) -> Result<WindowId> {
        let Some(parent_handle) = self.window_data(parent)?.handle else {
            log::error!("WindowCommon: subwindow requested of disabled window {parent:?}");
            panic!("cannot create a subwindow of disabled window {parent:?}");
        };
        let handle = self
            .library
            .derwin(
                parent_handle,
                config.lines,
                config.cols,
                config.begin_y,
                config.begin_x,
            )
            .ok_or_else(|| {
                log::warn!("WindowCommon: derwin rejected {config:?} inside {parent:?}");
                BindingError::OperationFailed(format!(
                    "derwin returned NULL for {config:?} inside window {parent:?}"
                ))
            })?;
        self.register_window(handle, Some(parent), true)
    }

    pub(crate) fn mark_window_managed(&mut self, id: WindowId) -> Result<()> {
        self.window_data_mut(id)?.managed = true;
        Ok(())
    }

    /// Subwindows of `id`, newest first.
    pub fn subwindows(&self, id: WindowId) -> Result<Vec<WindowId>> {
        let mut children = Vec::new();
        let mut cursor = self.window_data(id)?.last_child;
        while let Some(child) = cursor {
            children.push(child);
            cursor = self.windows.get(&child).and_then(|data| data.previous_sibling);
        }
        Ok(children)
    }

    pub fn window_parent(&self, id: WindowId) -> Result<Option<WindowId>> {
        Ok(self.window_data(id)?.parent)
    }

    pub fn is_window_enabled(&self, id: WindowId) -> Result<bool> {
        Ok(self.window_data(id)?.handle.is_some())
    }

    fn release_handle(&mut self, id: WindowId) -> Result<()> {
        let data = self.window_data_mut(id)?;
        let owns_handle = data.owns_handle;
        let Some(handle) = data.handle.take() else {
            return Ok(());
        };
        self.detach_hook(handle);
        if owns_handle {
            check_curses(self.library.delwin(handle), format!("delwin for window {id:?}"))?;
        }
        Ok(())
    }

    /*
     * Kills every descendant of `id`, newest child first. The child list is
     * emptied; the killed wrappers stay registered but disabled. Trees holding a
     * panel window are refused: those windows go away with their panel.
     */
    pub fn kill_subwindows(&mut self, id: WindowId) -> Result<()> {
        if self.subtree_has_managed(id)? {
            log::warn!("WindowCommon: subwindows of {id:?} include panel windows");
            return Err(BindingError::NotPermitted(format!(
                "window tree {id:?} holds panel windows"
            )));
        }
        self.kill_descendants(id)
    }

    fn subtree_has_managed(&self, id: WindowId) -> Result<bool> {
        let data = self.window_data(id)?;
        if data.managed {
            return Ok(true);
        }
        let mut cursor = data.last_child;
        while let Some(child) = cursor {
            if self.subtree_has_managed(child)? {
                return Ok(true);
            }
            cursor = self.window_data(child)?.previous_sibling;
        }
        Ok(false)
    }

    fn kill_descendants(&mut self, id: WindowId) -> Result<()> {
        let mut cursor = self.window_data_mut(id)?.last_child.take();
        while let Some(child) = cursor {
            self.kill_descendants(child)?;
            self.release_handle(child)?;
            let data = self.window_data_mut(child)?;
            cursor = data.previous_sibling.take();
            log::debug!("WindowCommon: killed subwindow {child:?} of {id:?}");
        }
        Ok(())
    }

    fn unlink_from_parent(&mut self, id: WindowId) -> Result<()> {
        let data = self.window_data(id)?;
        let (Some(parent), previous) = (data.parent, data.previous_sibling) else {
            return Ok(());
        };
        let Some(parent_data) = self.windows.get_mut(&parent) else {
            return Ok(());
        };
        if parent_data.last_child == Some(id) {
            parent_data.last_child = previous;
            return Ok(());
        }
        let mut cursor = parent_data.last_child;
        while let Some(sibling) = cursor {
            let Some(sibling_data) = self.windows.get_mut(&sibling) else {
                break;
            };
            if sibling_data.previous_sibling == Some(id) {
                sibling_data.previous_sibling = previous;
                break;
            }
            cursor = sibling_data.previous_sibling;
        }
        Ok(())
    }

    pub(crate) fn release_window(&mut self, id: WindowId) -> Result<()> {
        self.kill_descendants(id)?;
        self.unlink_from_parent(id)?;
        self.release_handle(id)?;
        self.windows.remove(&id);
        log::debug!("WindowCommon: destroyed window {id:?}");
        Ok(())
    }

    /// Destroys a window and all of its subwindows. The screen and panel windows are refused.
    pub fn destroy_window(&mut self, id: WindowId) -> Result<()> {
        if id == self.screen() {
            log::warn!("WindowCommon: refusing to destroy the screen window");
            return Err(BindingError::NotPermitted(
                "the screen window is owned by the session".to_string(),
            ));
        }
        if self.window_data(id)?.managed {
            log::warn!("WindowCommon: window {id:?} belongs to a panel");
            return Err(BindingError::NotPermitted(format!(
                "window {id:?} is released with its panel"
            )));
        }
        self.release_window(id)
    }

    // ── Pass-through operations ──────────────────────────────────────────────

    pub fn move_window(&mut self, id: WindowId, begin_y: i32, begin_x: i32) -> Result<()> {
        let handle = self.window_handle(id)?;
        check_curses(
            self.library.mvwin(handle, begin_y, begin_x),
            format!("mvwin {id:?} to ({begin_y}, {begin_x})"),
        )
    }

    pub fn resize_window(&mut self, id: WindowId, lines: i32, cols: i32) -> Result<()> {
        let handle = self.window_handle(id)?;
        check_curses(
            self.library.wresize(handle, lines, cols),
            format!("wresize {id:?} to {lines}x{cols}"),
        )
    }

    pub fn draw_box(&mut self, id: WindowId, bold: bool) -> Result<()> {
        let handle = self.window_handle(id)?;
        check_curses(self.library.wbox(handle, bold), format!("box on {id:?}"))
    }

    pub fn put_str(&mut self, id: WindowId, y: i32, x: i32, text: &str) -> Result<()> {
        let handle = self.window_handle(id)?;
        check_curses(
            self.library.mvwaddstr(handle, y, x, text),
            format!("mvwaddstr on {id:?} at ({y}, {x})"),
        )
    }

    pub fn clear_window(&mut self, id: WindowId) -> Result<()> {
        let handle = self.window_handle(id)?;
        check_curses(self.library.wclear(handle), format!("wclear on {id:?}"))
    }

    pub fn refresh_window(&mut self, id: WindowId) -> Result<()> {
        let handle = self.window_handle(id)?;
        check_curses(
            self.library.wnoutrefresh(handle),
            format!("wnoutrefresh on {id:?}"),
        )?;
        check_curses(self.library.doupdate(), "doupdate")
    }

    /// `(lines, cols)` of the window.
    pub fn window_size(&self, id: WindowId) -> Result<(i32, i32)> {
        let handle = self.window_handle(id)?;
        self.library
            .getmaxyx(handle)
            .ok_or_else(|| BindingError::OperationFailed(format!("getmaxyx on {id:?}")))
    }

    /// Absolute `(y, x)` of the window's top-left cell.
    pub fn window_origin(&self, id: WindowId) -> Result<(i32, i32)> {
        let handle = self.window_handle(id)?;
        self.library
            .getbegyx(handle)
            .ok_or_else(|| BindingError::OperationFailed(format!("getbegyx on {id:?}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SessionConfig;
    use crate::curses_memory::{MemoryCurses, MemoryProbe};
    use std::time::Duration;

    fn session() -> (Session, MemoryProbe) {
        let lib = MemoryCurses::new(24, 80);
        let probe = lib.probe();
        (
            Session::new(lib, SessionConfig::default()).expect("session"),
            probe,
        )
    }

    #[test]
    fn subwindows_are_listed_newest_first() {
        // Arrange
        let (mut session, _probe) = session();
        let root = session
            .create_window(WindowConfig::new(10, 20, 0, 0))
            .expect("root");

        // Act
        let first = session
            .create_subwindow(root, WindowConfig::new(2, 5, 0, 0))
            .expect("first");
        let second = session
            .create_subwindow(root, WindowConfig::new(2, 5, 3, 0))
            .expect("second");

        // Assert
        assert_eq!(session.subwindows(root).expect("list"), vec![second, first]);
        assert_eq!(session.window_parent(first).expect("parent"), Some(root));
        assert_eq!(session.window_origin(second).expect("origin"), (3, 0));
    }

    #[test]
    fn kill_subwindows_disables_descendants_and_frees_handles() {
        let (mut session, probe) = session();
        let root = session
            .create_window(WindowConfig::new(10, 20, 0, 0))
            .expect("root");
        let child = session
            .create_subwindow(root, WindowConfig::new(5, 10, 0, 0))
            .expect("child");
        let grandchild = session
            .create_subwindow(child, WindowConfig::new(2, 2, 1, 1))
            .expect("grandchild");
        let windows_before = probe.live_windows();

        session.kill_subwindows(root).expect("kill");

        assert_eq!(probe.live_windows(), windows_before - 2);
        assert!(!session.is_window_enabled(child).expect("child wrapper"));
        assert!(!session.is_window_enabled(grandchild).expect("grandchild wrapper"));
        assert!(session.subwindows(root).expect("list").is_empty());
        assert!(matches!(
            session.put_str(child, 0, 0, "x"),
            Err(BindingError::InvalidHandle(_))
        ));
        session.destroy_window(child).expect("disabled wrapper can be destroyed");
    }

    #[test]
    #[should_panic(expected = "disabled window")]
    fn subwindow_of_disabled_parent_is_fatal() {
        let (mut session, _probe) = session();
        let root = session
            .create_window(WindowConfig::new(10, 20, 0, 0))
            .expect("root");
        let child = session
            .create_subwindow(root, WindowConfig::new(5, 10, 0, 0))
            .expect("child");
        session.kill_subwindows(root).expect("kill");

        let _ = session.create_subwindow(child, WindowConfig::new(1, 1, 0, 0));
    }

    #[test]
    fn destroying_a_middle_sibling_keeps_the_list_intact() {
        let (mut session, _probe) = session();
        let root = session
            .create_window(WindowConfig::new(10, 20, 0, 0))
            .expect("root");
        let a = session
            .create_subwindow(root, WindowConfig::new(1, 1, 0, 0))
            .expect("a");
        let b = session
            .create_subwindow(root, WindowConfig::new(1, 1, 1, 0))
            .expect("b");
        let c = session
            .create_subwindow(root, WindowConfig::new(1, 1, 2, 0))
            .expect("c");

        session.destroy_window(b).expect("destroy b");

        assert_eq!(session.subwindows(root).expect("list"), vec![c, a]);
    }

    #[test]
    fn destroying_the_screen_is_refused() {
        let (mut session, _probe) = session();
        let screen = session.screen();
        assert!(matches!(
            session.destroy_window(screen),
            Err(BindingError::NotPermitted(_))
        ));
    }

    #[test]
    fn library_rejections_surface_as_operation_failed() {
        let (mut session, _probe) = session();
        let win = session
            .create_window(WindowConfig::new(2, 4, 0, 0))
            .expect("window");
        assert!(matches!(
            session.put_str(win, 5, 0, "out of range"),
            Err(BindingError::OperationFailed(_))
        ));
        assert!(matches!(
            session.create_subwindow(win, WindowConfig::new(5, 5, 0, 0)),
            Err(BindingError::OperationFailed(_))
        ));
    }

    #[test]
    fn windows_pick_up_input_settings() {
        let lib = MemoryCurses::new(24, 80);
        let probe = lib.probe();
        let config = SessionConfig {
            input_timeout: Some(Duration::from_millis(50)),
            ..SessionConfig::default()
        };
        let mut session = Session::new(lib, config).expect("session");

        let win = session
            .create_window(WindowConfig::new(2, 4, 0, 0))
            .expect("window");
        let handle = session.handle_of(win).expect("handle");

        assert_eq!(probe.window_timeout(handle), Some(50));
        assert_eq!(probe.window_keypad(handle), Some(true));
    }

    #[test]
    fn moving_and_resizing_report_new_geometry() {
        let (mut session, _probe) = session();
        let win = session
            .create_window(WindowConfig::new(2, 4, 0, 0))
            .expect("window");

        session.move_window(win, 5, 6).expect("move");
        session.resize_window(win, 3, 7).expect("resize");

        assert_eq!(session.window_origin(win).expect("origin"), (5, 6));
        assert_eq!(session.window_size(win).expect("size"), (3, 7));
    }
}
