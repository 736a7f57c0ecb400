/*
 * Panels: a window placed in the library's stacking deck. A panel created with
 * `framed` set reserves a one-cell border around its usable area and gets a
 * content subwindow inside that border. Frames and labels may only be drawn on
 * such panels; on any other panel the decoration would overwrite content, so it
 * is refused with `NotPermitted`.
 *
 * Hiding a panel keeps its place in the deck. Showing it again puts it on top,
 * as the library does.
 */

use crate::app::Session;
use crate::config::{PanelConfig, WindowConfig};
use crate::curses::{OK, RawHandle};
use crate::error::{BindingError, Result, check_curses};
use crate::types::{PanelId, WindowId};

#[derive(Debug)]
pub(crate) struct PanelData {
    pub(crate) handle: RawHandle,
    window: WindowId,
    content: Option<WindowId>,
}

impl PanelData {
    fn framed(&self) -> bool {
        self.content.is_some()
    }
}

/// Column where `text` starts when centered in `width` cells, and the part that fits.
fn centered(text: &str, width: i32) -> (i32, String) {
    let available = width.max(0) as usize;
    let fitted: String = text.chars().take(available).collect();
    let offset = (available - fitted.chars().count()) / 2;
    (offset as i32, fitted)
}

impl Session {
    pub(crate) fn panel_data(&self, id: PanelId) -> Result<&PanelData> {
        self.panels.get(&id).ok_or_else(|| {
            log::warn!("PanelHandler: panel {id:?} not found");
            BindingError::InvalidHandle(format!("panel {id:?} not found"))
        })
    }

    /*
     * Creates the window (two cells larger each way when framed), the panel on
     * top of the deck, and for framed panels the content subwindow. Everything
     * created so far is released again if a later step fails.
     */
    pub fn create_panel(&mut self, config: PanelConfig) -> Result<PanelId> {
        let area = config.window;
        let outer = if config.framed {
            WindowConfig::new(area.lines + 2, area.cols + 2, area.begin_y, area.begin_x)
        } else {
            area
        };
        log::debug!("PanelHandler: create_panel {outer:?} (framed: {})", config.framed);

        let window = self.create_window(outer)?;
        self.mark_window_managed(window)?;
        let content = if config.framed {
            match self.create_subwindow(window, WindowConfig::new(area.lines, area.cols, 1, 1)) {
                Ok(content) => Some(content),
                Err(err) => {
                    self.release_window(window)?;
                    return Err(err);
                }
            }
        } else {
            None
        };

        let window_handle = self.window_handle(window)?;
        let Some(handle) = self.library.new_panel(window_handle) else {
            log::warn!("PanelHandler: new_panel returned NULL for window {window:?}");
            self.release_window(window)?;
            return Err(BindingError::SystemError(format!(
                "new_panel returned NULL for window {window:?}"
            )));
        };

        let id = PanelId(self.allocate_id());
        if let Err(err) = self.attach_hook(handle, id) {
            if self.library.del_panel(handle) != OK {
                log::warn!("PanelHandler: del_panel failed while rolling back {id:?}");
            }
            self.release_window(window)?;
            return Err(err);
        }
        self.panels.insert(
            id,
            PanelData {
                handle,
                window,
                content,
            },
        );
        if let Some(content) = content {
            self.mark_window_managed(content)?;
        }
        Ok(id)
    }

    /// Removes the panel from the deck and destroys its window (content window first).
    pub fn destroy_panel(&mut self, id: PanelId) -> Result<()> {
        let data = self.panels.remove(&id).ok_or_else(|| {
            log::warn!("PanelHandler: destroy of unknown panel {id:?}");
            BindingError::InvalidHandle(format!("panel {id:?} not found"))
        })?;
        self.detach_hook(data.handle);
        check_curses(
            self.library.del_panel(data.handle),
            format!("del_panel for {id:?}"),
        )?;
        if let Some(content) = data.content {
            self.release_window(content)?;
        }
        self.release_window(data.window)?;
        log::debug!("PanelHandler: destroyed panel {id:?}");
        Ok(())
    }

    pub fn show_panel(&mut self, id: PanelId) -> Result<()> {
        let handle = self.panel_data(id)?.handle;
        check_curses(self.library.show_panel(handle), format!("show_panel {id:?}"))
    }

    pub fn hide_panel(&mut self, id: PanelId) -> Result<()> {
        let handle = self.panel_data(id)?.handle;
        check_curses(self.library.hide_panel(handle), format!("hide_panel {id:?}"))
    }

    pub fn top_panel(&mut self, id: PanelId) -> Result<()> {
        let handle = self.panel_data(id)?.handle;
        check_curses(self.library.top_panel(handle), format!("top_panel {id:?}"))
    }

    pub fn bottom_panel(&mut self, id: PanelId) -> Result<()> {
        let handle = self.panel_data(id)?.handle;
        check_curses(
            self.library.bottom_panel(handle),
            format!("bottom_panel {id:?}"),
        )
    }

    pub fn panel_hidden(&self, id: PanelId) -> Result<bool> {
        let handle = self.panel_data(id)?.handle;
        self.library
            .panel_hidden(handle)
            .ok_or_else(|| BindingError::OperationFailed(format!("panel_hidden {id:?}")))
    }

    /// The panel's outer window (including the border of framed panels).
    pub fn panel_window(&self, id: PanelId) -> Result<WindowId> {
        Ok(self.panel_data(id)?.window)
    }

    /// Where content goes: the inner subwindow when framed, the panel window otherwise.
    pub fn panel_content_window(&self, id: PanelId) -> Result<WindowId> {
        let data = self.panel_data(id)?;
        Ok(data.content.unwrap_or(data.window))
    }

    pub fn panel_is_framed(&self, id: PanelId) -> Result<bool> {
        Ok(self.panel_data(id)?.framed())
    }

    fn framed_window(&self, id: PanelId, operation: &str) -> Result<WindowId> {
        let data = self.panel_data(id)?;
        if !data.framed() {
            log::warn!("PanelHandler: {operation} on unframed panel {id:?} refused");
            return Err(BindingError::NotPermitted(format!(
                "{operation} needs a panel created with frame space ({id:?})"
            )));
        }
        Ok(data.window)
    }

    pub fn frame(&mut self, id: PanelId, title: Option<&str>, subtitle: Option<&str>) -> Result<()> {
        let window = self.framed_window(id, "frame")?;
        self.draw_box(window, false)?;
        self.draw_labels(window, title, subtitle)
    }

    pub fn boldframe(
        &mut self,
        id: PanelId,
        title: Option<&str>,
        subtitle: Option<&str>,
    ) -> Result<()> {
        let window = self.framed_window(id, "boldframe")?;
        self.draw_box(window, true)?;
        self.draw_labels(window, title, subtitle)
    }

    /// Writes title and subtitle onto the border rows without redrawing the frame.
    pub fn label(&mut self, id: PanelId, title: Option<&str>, subtitle: Option<&str>) -> Result<()> {
        let window = self.framed_window(id, "label")?;
        self.draw_labels(window, title, subtitle)
    }

    fn draw_labels(
        &mut self,
        window: WindowId,
        title: Option<&str>,
        subtitle: Option<&str>,
    ) -> Result<()> {
        let (lines, cols) = self.window_size(window)?;
        // Border cells at both ends stay untouched.
        let inner = cols - 2;
        if let Some(title) = title {
            let (offset, text) = centered(title, inner);
            self.put_str(window, 0, offset + 1, &text)?;
        }
        if let Some(subtitle) = subtitle {
            let (offset, text) = centered(subtitle, inner);
            self.put_str(window, lines - 1, offset + 1, &text)?;
        }
        Ok(())
    }
}
