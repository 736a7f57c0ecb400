/*
 * Key virtualization: turns raw keystrokes into the semantic requests a menu or
 * form driver understands. The default maps are pure functions; dispatch
 * handlers may replace them wholesale through `MenuHandler::virtualize` and
 * `FormHandler::virtualize`.
 *
 * Request codes keep the values of menu.h (`REQ_LEFT_ITEM` = 512 ...) and
 * form.h (`REQ_NEXT_FIELD` = 516 ...). Keys without a mapping pass through as
 * literal characters, which the menu driver uses for pattern matching and the
 * form driver inserts into the current field.
 */

use crate::curses::{
    KEY_BACKSPACE, KEY_BTAB, KEY_DC, KEY_DOWN, KEY_END, KEY_ENTER, KEY_HOME, KEY_IC, KEY_LEFT,
    KEY_NPAGE, KEY_PPAGE, KEY_RIGHT, KEY_UP, ctrl,
};

const KEY_TAB: i32 = b'\t' as i32;
const KEY_NEWLINE: i32 = b'\n' as i32;
const KEY_RETURN: i32 = b'\r' as i32;
const KEY_ESCAPE: i32 = 0x1b;
const KEY_DELETE: i32 = 0x7f;
const KEY_CTRL_H: i32 = 0x08;

/// What the dispatch loop does with one keystroke.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Request {
    /// Hand this code to the library driver (a request code or a literal character).
    Driver(i32),
    /// Run the action bound to the current item or field.
    Action,
    /// Leave the loop.
    Quit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MenuRequest {
    LeftItem,
    RightItem,
    UpItem,
    DownItem,
    ScrollUpLine,
    ScrollDownLine,
    ScrollDownPage,
    ScrollUpPage,
    FirstItem,
    LastItem,
    NextItem,
    PrevItem,
    ToggleItem,
    ClearPattern,
    BackPattern,
    NextMatch,
    PrevMatch,
}

impl MenuRequest {
    const ALL: [MenuRequest; 17] = [
        MenuRequest::LeftItem,
        MenuRequest::RightItem,
        MenuRequest::UpItem,
        MenuRequest::DownItem,
        MenuRequest::ScrollUpLine,
        MenuRequest::ScrollDownLine,
        MenuRequest::ScrollDownPage,
        MenuRequest::ScrollUpPage,
        MenuRequest::FirstItem,
        MenuRequest::LastItem,
        MenuRequest::NextItem,
        MenuRequest::PrevItem,
        MenuRequest::ToggleItem,
        MenuRequest::ClearPattern,
        MenuRequest::BackPattern,
        MenuRequest::NextMatch,
        MenuRequest::PrevMatch,
    ];

    /// `REQ_*` value from menu.h; the variants are laid out contiguously from 512.
    pub const fn code(self) -> i32 {
        512 + self as i32
    }

    pub fn from_code(code: i32) -> Option<Self> {
        usize::try_from(code - 512)
            .ok()
            .and_then(|offset| Self::ALL.get(offset).copied())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FormRequest {
    NextField,
    PrevField,
    FirstField,
    LastField,
    NextChar,
    PrevChar,
    BeginField,
    EndField,
    LeftChar,
    RightChar,
    DeleteChar,
    DeletePrev,
    ClearField,
    OverlayMode,
    InsertMode,
    Validation,
    NextChoice,
    PrevChoice,
}

impl FormRequest {
    const ALL: [FormRequest; 18] = [
        FormRequest::NextField,
        FormRequest::PrevField,
        FormRequest::FirstField,
        FormRequest::LastField,
        FormRequest::NextChar,
        FormRequest::PrevChar,
        FormRequest::BeginField,
        FormRequest::EndField,
        FormRequest::LeftChar,
        FormRequest::RightChar,
        FormRequest::DeleteChar,
        FormRequest::DeletePrev,
        FormRequest::ClearField,
        FormRequest::OverlayMode,
        FormRequest::InsertMode,
        FormRequest::Validation,
        FormRequest::NextChoice,
        FormRequest::PrevChoice,
    ];

    /// `REQ_*` value from form.h. Only the subset the binding drives is modelled.
    pub const fn code(self) -> i32 {
        match self {
            FormRequest::NextField => 516,
            FormRequest::PrevField => 517,
            FormRequest::FirstField => 518,
            FormRequest::LastField => 519,
            FormRequest::NextChar => 528,
            FormRequest::PrevChar => 529,
            FormRequest::BeginField => 534,
            FormRequest::EndField => 535,
            FormRequest::LeftChar => 538,
            FormRequest::RightChar => 539,
            FormRequest::DeleteChar => 545,
            FormRequest::DeletePrev => 546,
            FormRequest::ClearField => 551,
            FormRequest::OverlayMode => 552,
            FormRequest::InsertMode => 553,
            FormRequest::Validation => 566,
            FormRequest::NextChoice => 567,
            FormRequest::PrevChoice => 568,
        }
    }

    pub fn from_code(code: i32) -> Option<Self> {
        Self::ALL.iter().copied().find(|request| request.code() == code)
    }
}

fn is_action_key(key: i32) -> bool {
    matches!(key, KEY_NEWLINE | KEY_RETURN | KEY_ENTER)
}

fn is_quit_key(key: i32) -> bool {
    key == ctrl(b'x') || key == KEY_ESCAPE
}

/// Default keystroke map for menus.
pub fn menu_virtualize(key: i32) -> Request {
    if is_action_key(key) {
        return Request::Action;
    }
    if is_quit_key(key) {
        return Request::Quit;
    }
    let request = match key {
        KEY_LEFT => MenuRequest::LeftItem,
        KEY_RIGHT => MenuRequest::RightItem,
        KEY_UP => MenuRequest::UpItem,
        KEY_DOWN => MenuRequest::DownItem,
        KEY_TAB => MenuRequest::NextItem,
        KEY_BTAB => MenuRequest::PrevItem,
        KEY_HOME => MenuRequest::FirstItem,
        KEY_END => MenuRequest::LastItem,
        KEY_NPAGE => MenuRequest::ScrollDownPage,
        KEY_PPAGE => MenuRequest::ScrollUpPage,
        KEY_BACKSPACE | KEY_DELETE | KEY_CTRL_H => MenuRequest::BackPattern,
        k if k == ctrl(b't') => MenuRequest::ToggleItem,
        k if k == ctrl(b's') => MenuRequest::NextMatch,
        k if k == ctrl(b'r') => MenuRequest::PrevMatch,
        k if k == ctrl(b'k') => MenuRequest::ClearPattern,
        literal => return Request::Driver(literal),
    };
    Request::Driver(request.code())
}

/// Default keystroke map for forms.
pub fn form_virtualize(key: i32) -> Request {
    if is_action_key(key) {
        return Request::Action;
    }
    if is_quit_key(key) {
        return Request::Quit;
    }
    let request = match key {
        KEY_DOWN | KEY_TAB => FormRequest::NextField,
        KEY_UP | KEY_BTAB => FormRequest::PrevField,
        KEY_LEFT => FormRequest::PrevChar,
        KEY_RIGHT => FormRequest::NextChar,
        KEY_HOME => FormRequest::BeginField,
        KEY_END => FormRequest::EndField,
        KEY_BACKSPACE | KEY_DELETE | KEY_CTRL_H => FormRequest::DeletePrev,
        KEY_DC => FormRequest::DeleteChar,
        KEY_IC => FormRequest::InsertMode,
        KEY_NPAGE => FormRequest::LastField,
        KEY_PPAGE => FormRequest::FirstField,
        k if k == ctrl(b'u') => FormRequest::ClearField,
        literal => return Request::Driver(literal),
    };
    Request::Driver(request.code())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn menu_request_codes_follow_menu_header() {
        assert_eq!(MenuRequest::LeftItem.code(), 512);
        assert_eq!(MenuRequest::DownItem.code(), 515);
        assert_eq!(MenuRequest::PrevMatch.code(), 528);
        assert_eq!(MenuRequest::from_code(524), Some(MenuRequest::ToggleItem));
        assert_eq!(MenuRequest::from_code(511), None);
        assert_eq!(MenuRequest::from_code(529), None);
    }

    #[test]
    fn form_request_codes_follow_form_header() {
        for request in FormRequest::ALL {
            assert_eq!(FormRequest::from_code(request.code()), Some(request));
        }
        assert_eq!(FormRequest::Validation.code(), 566);
        assert_eq!(FormRequest::from_code(65), None);
    }

    #[test]
    fn menu_map_covers_navigation_action_and_quit() {
        assert_eq!(
            menu_virtualize(KEY_DOWN),
            Request::Driver(MenuRequest::DownItem.code())
        );
        assert_eq!(menu_virtualize('\n' as i32), Request::Action);
        assert_eq!(menu_virtualize(KEY_ENTER), Request::Action);
        assert_eq!(menu_virtualize(ctrl(b'x')), Request::Quit);
        assert_eq!(menu_virtualize(0x1b), Request::Quit);
    }

    #[test]
    fn unmapped_keys_pass_through_as_literals() {
        assert_eq!(menu_virtualize('g' as i32), Request::Driver('g' as i32));
        assert_eq!(form_virtualize('7' as i32), Request::Driver('7' as i32));
    }

    #[test]
    fn form_map_moves_between_fields_and_edits() {
        assert_eq!(
            form_virtualize(KEY_DOWN),
            Request::Driver(FormRequest::NextField.code())
        );
        assert_eq!(
            form_virtualize(KEY_BACKSPACE),
            Request::Driver(FormRequest::DeletePrev.code())
        );
        assert_eq!(form_virtualize('\r' as i32), Request::Action);
    }
}
