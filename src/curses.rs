/*
 * The boundary to the underlying curses-style library. Every method mirrors one
 * documented C entry point: factories return `None` where C returns NULL,
 * mutators return the C `int` status sentinel, and each handle kind carries a
 * user-pointer slot. The binding layer talks to the library exclusively through
 * this trait, so the same code runs against a native backend or the headless
 * `MemoryCurses` emulation.
 *
 * Numeric constants keep the values of the C headers (curses.h, panel.h,
 * menu.h, form.h).
 */

use bitflags::bitflags;

use std::fmt;
use std::num::NonZeroU64;
use std::rc::Rc;

/// C `int` status returned by library mutators.
pub type Status = i32;

pub const OK: Status = 0;
pub const ERR: Status = -1;

// menu.h / form.h status codes.
pub const E_OK: Status = 0;
pub const E_SYSTEM_ERROR: Status = -1;
pub const E_BAD_ARGUMENT: Status = -2;
pub const E_POSTED: Status = -3;
pub const E_CONNECTED: Status = -4;
pub const E_BAD_STATE: Status = -5;
pub const E_NO_ROOM: Status = -6;
pub const E_NOT_POSTED: Status = -7;
pub const E_UNKNOWN_COMMAND: Status = -8;
pub const E_NO_MATCH: Status = -9;
pub const E_NOT_SELECTABLE: Status = -10;
pub const E_NOT_CONNECTED: Status = -11;
pub const E_REQUEST_DENIED: Status = -12;
pub const E_INVALID_FIELD: Status = -13;
pub const E_CURRENT: Status = -14;

// curses.h key codes.
pub const KEY_DOWN: i32 = 0o402;
pub const KEY_UP: i32 = 0o403;
pub const KEY_LEFT: i32 = 0o404;
pub const KEY_RIGHT: i32 = 0o405;
pub const KEY_HOME: i32 = 0o406;
pub const KEY_BACKSPACE: i32 = 0o407;
pub const KEY_F0: i32 = 0o410;
pub const KEY_DC: i32 = 0o512;
pub const KEY_IC: i32 = 0o513;
pub const KEY_NPAGE: i32 = 0o522;
pub const KEY_PPAGE: i32 = 0o523;
pub const KEY_ENTER: i32 = 0o527;
pub const KEY_BTAB: i32 = 0o541;
pub const KEY_END: i32 = 0o550;
pub const KEY_MAX: i32 = 0o777;

pub const fn key_f(n: i32) -> i32 {
    KEY_F0 + n
}

pub const fn ctrl(c: u8) -> i32 {
    (c & 0x1f) as i32
}

/// Opaque handle to a library-owned record (window, panel, item, menu, field, form).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RawHandle(NonZeroU64);

impl RawHandle {
    pub fn from_raw(value: u64) -> Option<Self> {
        NonZeroU64::new(value).map(Self)
    }

    pub fn raw(self) -> u64 {
        self.0.get()
    }
}

/// Sentinel-terminated handle array handed to `new_menu`/`new_form` and friends.
/// The library takes ownership of the buffer, never of the handles it points to.
pub type HandleArray = Vec<Option<RawHandle>>;

bitflags! {
    /// menu.h `Menu_Options`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct MenuOptions: u32 {
        const ONEVALUE   = 0x01;
        const SHOWDESC   = 0x02;
        const ROWMAJOR   = 0x04;
        const IGNORECASE = 0x08;
        const SHOWMATCH  = 0x10;
        const NONCYCLIC  = 0x20;
    }
}

impl Default for MenuOptions {
    fn default() -> Self {
        MenuOptions::ONEVALUE
            | MenuOptions::SHOWDESC
            | MenuOptions::ROWMAJOR
            | MenuOptions::IGNORECASE
            | MenuOptions::SHOWMATCH
    }
}

bitflags! {
    /// menu.h `Item_Options`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ItemOptions: u32 {
        const SELECTABLE = 0x01;
    }
}

bitflags! {
    /// form.h `Field_Options`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct FieldOptions: u32 {
        const VISIBLE  = 0x0001;
        const ACTIVE   = 0x0002;
        const PUBLIC   = 0x0004;
        const EDIT     = 0x0008;
        const WRAP     = 0x0010;
        const BLANK    = 0x0020;
        const AUTOSKIP = 0x0040;
        const NULLOK   = 0x0080;
        const PASSOK   = 0x0100;
        const STATIC   = 0x0200;
    }
}

impl Default for FieldOptions {
    fn default() -> Self {
        FieldOptions::VISIBLE
            | FieldOptions::ACTIVE
            | FieldOptions::PUBLIC
            | FieldOptions::EDIT
            | FieldOptions::WRAP
            | FieldOptions::BLANK
            | FieldOptions::AUTOSKIP
            | FieldOptions::NULLOK
            | FieldOptions::PASSOK
            | FieldOptions::STATIC
    }
}

/*
 * Application-defined field validation, installed through `FieldType::Custom`.
 * `field_check` sees the whole buffer when the field is validated, `char_check`
 * each character as it is typed. A type with choices answers
 * `REQ_NEXT_CHOICE`/`REQ_PREV_CHOICE` by returning the replacement buffer;
 * `None` denies the request.
 */
pub trait UserFieldType {
    fn field_check(&self, value: &str) -> bool;

    fn char_check(&self, ch: char) -> bool;

    fn next_choice(&self, _value: &str) -> Option<String> {
        None
    }

    fn previous_choice(&self, _value: &str) -> Option<String> {
        None
    }
}

/// Field validation types (`TYPE_ALPHA`, `TYPE_ALNUM`, `TYPE_INTEGER`, `TYPE_NUMERIC`,
/// `TYPE_REGEXP`, `TYPE_ENUM`, `TYPE_IPV4`, and user-defined types).
///
/// Range checks apply only when `min < max`. `precision` pads integers with
/// leading zeros and fixes the number of decimals of numerics once a value
/// passes validation.
#[derive(Clone)]
pub enum FieldType {
    Alpha {
        min_width: usize,
    },
    Alnum {
        min_width: usize,
    },
    Integer {
        precision: usize,
        min: i64,
        max: i64,
    },
    Numeric {
        precision: usize,
        min: f64,
        max: f64,
    },
    /// Regular expression matched anywhere in the buffer.
    Regexp(String),
    Enumeration {
        values: Vec<String>,
        case_sensitive: bool,
        /// Accept a prefix shared by several values, taking the first.
        non_unique_matches: bool,
    },
    Ipv4,
    Custom(Rc<dyn UserFieldType>),
}

impl fmt::Debug for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldType::Alpha { min_width } => write!(f, "Alpha {{ min_width: {min_width} }}"),
            FieldType::Alnum { min_width } => write!(f, "Alnum {{ min_width: {min_width} }}"),
            FieldType::Integer {
                precision,
                min,
                max,
            } => write!(f, "Integer {{ precision: {precision}, min: {min}, max: {max} }}"),
            FieldType::Numeric {
                precision,
                min,
                max,
            } => write!(f, "Numeric {{ precision: {precision}, min: {min}, max: {max} }}"),
            FieldType::Regexp(expr) => write!(f, "Regexp({expr:?})"),
            FieldType::Enumeration {
                values,
                case_sensitive,
                non_unique_matches,
            } => write!(
                f,
                "Enumeration {{ values: {values:?}, case_sensitive: {case_sensitive}, non_unique_matches: {non_unique_matches} }}"
            ),
            FieldType::Ipv4 => f.write_str("Ipv4"),
            FieldType::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// Hook slots a menu or form can install (`set_item_init`, `set_menu_term`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookKind {
    ContainerInit,
    ContainerTerm,
    ChildInit,
    ChildTerm,
}

/// One hook invocation recorded by the library; `handle` is the menu or form.
/// `child` is the item or field that was current when the hook ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HookEvent {
    pub kind: HookKind,
    pub handle: RawHandle,
    pub child: Option<RawHandle>,
}

/// The C entry points consumed by the binding layer.
pub trait CursesLibrary {
    // ── Screen lifecycle ─────────────────────────────────────────────────────
    fn initscr(&mut self) -> Option<RawHandle>;
    fn endwin(&mut self) -> Status;
    fn isendwin(&self) -> bool;
    fn lines(&self) -> i32;
    fn cols(&self) -> i32;
    fn beep(&mut self) -> Status;
    fn doupdate(&mut self) -> Status;

    // ── Windows ──────────────────────────────────────────────────────────────
    fn newwin(&mut self, lines: i32, cols: i32, begin_y: i32, begin_x: i32) -> Option<RawHandle>;
    fn derwin(
        &mut self,
        parent: RawHandle,
        lines: i32,
        cols: i32,
        begin_y: i32,
        begin_x: i32,
    ) -> Option<RawHandle>;
    fn delwin(&mut self, win: RawHandle) -> Status;
    fn mvwin(&mut self, win: RawHandle, y: i32, x: i32) -> Status;
    fn wresize(&mut self, win: RawHandle, lines: i32, cols: i32) -> Status;
    fn getmaxyx(&self, win: RawHandle) -> Option<(i32, i32)>;
    fn getbegyx(&self, win: RawHandle) -> Option<(i32, i32)>;
    /// `box()` drawn with default characters; `bold` wraps it in `A_BOLD`.
    fn wbox(&mut self, win: RawHandle, bold: bool) -> Status;
    fn mvwaddstr(&mut self, win: RawHandle, y: i32, x: i32, text: &str) -> Status;
    fn wclear(&mut self, win: RawHandle) -> Status;
    fn wnoutrefresh(&mut self, win: RawHandle) -> Status;
    fn keypad(&mut self, win: RawHandle, enable: bool) -> Status;
    fn wtimeout(&mut self, win: RawHandle, delay_ms: i32);
    fn wgetch(&mut self, win: RawHandle) -> i32;

    // ── User pointer slot (one per handle of any kind) ───────────────────────
    fn set_userptr(&mut self, handle: RawHandle, value: usize) -> Status;
    fn userptr(&self, handle: RawHandle) -> usize;

    // ── Panels ───────────────────────────────────────────────────────────────
    fn new_panel(&mut self, win: RawHandle) -> Option<RawHandle>;
    fn del_panel(&mut self, panel: RawHandle) -> Status;
    fn show_panel(&mut self, panel: RawHandle) -> Status;
    fn hide_panel(&mut self, panel: RawHandle) -> Status;
    fn top_panel(&mut self, panel: RawHandle) -> Status;
    fn bottom_panel(&mut self, panel: RawHandle) -> Status;
    /// `panel_hidden`: `Some(true)` when hidden, `None` for a bad handle (C `ERR`).
    fn panel_hidden(&self, panel: RawHandle) -> Option<bool>;
    fn update_panels(&mut self);

    // ── Menus ────────────────────────────────────────────────────────────────
    fn new_item(&mut self, name: &str, description: &str) -> Option<RawHandle>;
    fn free_item(&mut self, item: RawHandle) -> Status;
    fn item_name(&self, item: RawHandle) -> Option<String>;
    fn item_description(&self, item: RawHandle) -> Option<String>;
    fn item_index(&self, item: RawHandle) -> i32;
    fn item_value(&self, item: RawHandle) -> bool;
    fn set_item_value(&mut self, item: RawHandle, value: bool) -> Status;
    fn item_opts(&self, item: RawHandle) -> ItemOptions;
    fn set_item_opts(&mut self, item: RawHandle, opts: ItemOptions) -> Status;
    fn new_menu(&mut self, items: HandleArray) -> Option<RawHandle>;
    fn set_menu_items(&mut self, menu: RawHandle, items: HandleArray) -> Status;
    fn free_menu(&mut self, menu: RawHandle) -> Status;
    fn item_count(&self, menu: RawHandle) -> i32;
    fn current_item(&self, menu: RawHandle) -> Option<RawHandle>;
    fn set_current_item(&mut self, menu: RawHandle, item: RawHandle) -> Status;
    fn menu_opts(&self, menu: RawHandle) -> MenuOptions;
    fn set_menu_opts(&mut self, menu: RawHandle, opts: MenuOptions) -> Status;
    fn set_menu_format(&mut self, menu: RawHandle, rows: i32, cols: i32) -> Status;
    fn set_menu_mark(&mut self, menu: RawHandle, mark: &str) -> Status;
    fn scale_menu(&self, menu: RawHandle) -> Option<(i32, i32)>;
    fn set_menu_win(&mut self, menu: RawHandle, win: RawHandle) -> Status;
    fn set_menu_sub(&mut self, menu: RawHandle, win: RawHandle) -> Status;
    fn post_menu(&mut self, menu: RawHandle) -> Status;
    fn unpost_menu(&mut self, menu: RawHandle) -> Status;
    fn menu_pattern(&self, menu: RawHandle) -> Option<String>;
    fn menu_driver(&mut self, menu: RawHandle, request: i32) -> Status;

    // ── Forms ────────────────────────────────────────────────────────────────
    fn new_field(&mut self, height: i32, width: i32, top: i32, left: i32) -> Option<RawHandle>;
    fn free_field(&mut self, field: RawHandle) -> Status;
    fn field_buffer(&self, field: RawHandle) -> Option<String>;
    fn set_field_buffer(&mut self, field: RawHandle, text: &str) -> Status;
    fn field_opts(&self, field: RawHandle) -> FieldOptions;
    fn set_field_opts(&mut self, field: RawHandle, opts: FieldOptions) -> Status;
    fn set_field_type(&mut self, field: RawHandle, field_type: Option<FieldType>) -> Status;
    fn field_index(&self, field: RawHandle) -> i32;
    fn new_form(&mut self, fields: HandleArray) -> Option<RawHandle>;
    fn set_form_fields(&mut self, form: RawHandle, fields: HandleArray) -> Status;
    fn free_form(&mut self, form: RawHandle) -> Status;
    fn field_count(&self, form: RawHandle) -> i32;
    fn current_field(&self, form: RawHandle) -> Option<RawHandle>;
    fn set_current_field(&mut self, form: RawHandle, field: RawHandle) -> Status;
    fn scale_form(&self, form: RawHandle) -> Option<(i32, i32)>;
    fn set_form_win(&mut self, form: RawHandle, win: RawHandle) -> Status;
    fn set_form_sub(&mut self, form: RawHandle, win: RawHandle) -> Status;
    fn post_form(&mut self, form: RawHandle) -> Status;
    fn unpost_form(&mut self, form: RawHandle) -> Status;
    fn form_driver(&mut self, form: RawHandle, request: i32) -> Status;

    // ── Hooks ────────────────────────────────────────────────────────────────
    /// Installs or removes the binding's hook trampoline for one hook slot.
    fn set_hook(&mut self, container: RawHandle, kind: HookKind, enabled: bool) -> Status;
    /// Returns the hook invocations recorded since the last call, oldest first.
    fn drain_hook_events(&mut self) -> Vec<HookEvent>;

    // ── Soft label keys (1-based label numbers, as in C) ─────────────────────
    /// Reserves the label row; only effective before `initscr`.
    fn slk_init(&mut self, format: i32) -> Status;
    fn slk_set(&mut self, label: i32, text: &str, justify: i32) -> Status;
    fn slk_label(&self, label: i32) -> Option<String>;
    fn slk_clear(&mut self) -> Status;
    fn slk_restore(&mut self) -> Status;
    fn slk_touch(&mut self) -> Status;
    fn slk_noutrefresh(&mut self) -> Status;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_handle_rejects_null() {
        assert!(RawHandle::from_raw(0).is_none());
        assert_eq!(RawHandle::from_raw(7).map(RawHandle::raw), Some(7));
    }

    #[test]
    fn key_constants_match_curses_header() {
        assert_eq!(KEY_DOWN, 258);
        assert_eq!(KEY_ENTER, 343);
        assert_eq!(key_f(1), 265);
        assert_eq!(ctrl(b'x'), 24);
    }

    #[test]
    fn default_field_options_are_editable_and_active() {
        let opts = FieldOptions::default();
        assert!(opts.contains(FieldOptions::EDIT | FieldOptions::ACTIVE));
    }
}
