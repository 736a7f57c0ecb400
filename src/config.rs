/*
 * Construction-time configuration for the session and for each wrapper kind.
 * All structs are plain data with `Default` impls so callers can use struct
 * update syntax and only spell out what differs.
 */

use crate::curses::MenuOptions;
use crate::types::{Ownership, SlkFormat};

use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Enable function-key translation on every window the binding creates.
    pub keypad: bool,
    /// `None` blocks on key reads; `Some` makes reads return `ERR` after the delay.
    pub input_timeout: Option<Duration>,
    /// Label row reserved before the screen starts; `None` leaves the row to the screen.
    pub slk_format: Option<SlkFormat>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            keypad: true,
            input_timeout: None,
            slk_format: Some(SlkFormat::FourFour),
        }
    }
}

impl SessionConfig {
    /// Delay in the form `wtimeout` takes: -1 blocks.
    pub(crate) fn timeout_ms(&self) -> i32 {
        match self.input_timeout {
            Some(delay) => delay.as_millis().min(i32::MAX as u128) as i32,
            None => -1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowConfig {
    pub lines: i32,
    pub cols: i32,
    pub begin_y: i32,
    pub begin_x: i32,
}

impl WindowConfig {
    pub const fn new(lines: i32, cols: i32, begin_y: i32, begin_x: i32) -> Self {
        Self {
            lines,
            cols,
            begin_y,
            begin_x,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PanelConfig {
    /// Geometry of the usable area; a framed panel's window is two cells larger each way.
    pub window: WindowConfig,
    pub framed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MenuConfig {
    pub begin_y: i32,
    pub begin_x: i32,
    pub framed: bool,
    pub ownership: Ownership,
    pub options: MenuOptions,
    /// Visible rows; `None` shows every item.
    pub rows: Option<i32>,
    pub mark: String,
}

impl Default for MenuConfig {
    fn default() -> Self {
        Self {
            begin_y: 0,
            begin_x: 0,
            framed: true,
            ownership: Ownership::Owned,
            options: MenuOptions::default(),
            rows: None,
            mark: "-".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormConfig {
    pub begin_y: i32,
    pub begin_x: i32,
    pub framed: bool,
    pub ownership: Ownership,
}

impl Default for FormConfig {
    fn default() -> Self {
        Self {
            begin_y: 0,
            begin_x: 0,
            framed: true,
            ownership: Ownership::Owned,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldConfig {
    pub height: i32,
    pub width: i32,
    pub top: i32,
    pub left: i32,
}

impl FieldConfig {
    pub const fn new(height: i32, width: i32, top: i32, left: i32) -> Self {
        Self {
            height,
            width,
            top,
            left,
        }
    }
}
