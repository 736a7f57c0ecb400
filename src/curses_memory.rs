/*
 * Headless, in-memory implementation of the curses library boundary.
 *
 * `MemoryCurses` keeps every library record (windows with character grids, the
 * panel deck, menus, items, forms, fields, the soft-label row) in a shared
 * `MemoryState`. It reproduces the status sentinels and driver semantics the
 * binding depends on, reads keystrokes from a scripted queue, and records hook
 * invocations. A `MemoryProbe` shares the same state so tests can script input
 * and inspect what the library saw after the session took ownership of the
 * `MemoryCurses` value.
 *
 * The emulation covers the request vocabulary listed in `keys`; rendering is
 * limited to what `mvwaddstr` and `wbox` write into the grids.
 */

use crate::curses::*;
use crate::keys::{FormRequest, MenuRequest};

use regex::Regex;
use std::cell::RefCell;
use std::collections::{HashMap, HashSet, VecDeque};
use std::rc::Rc;

#[derive(Debug)]
struct WindowRec {
    parent: Option<RawHandle>,
    lines: i32,
    cols: i32,
    y: i32,
    x: i32,
    cells: Vec<Vec<char>>,
    keypad: bool,
    timeout: i32,
    boxed: Option<bool>,
}

impl WindowRec {
    fn new(parent: Option<RawHandle>, lines: i32, cols: i32, y: i32, x: i32) -> Self {
        Self {
            parent,
            lines,
            cols,
            y,
            x,
            cells: vec![vec![' '; cols as usize]; lines as usize],
            keypad: false,
            timeout: -1,
            boxed: None,
        }
    }

    fn put(&mut self, y: i32, x: i32, text: &str) -> Status {
        if y < 0 || y >= self.lines || x < 0 || x >= self.cols {
            return ERR;
        }
        let row = &mut self.cells[y as usize];
        for (offset, ch) in text.chars().enumerate() {
            let col = x as usize + offset;
            if col >= row.len() {
                return ERR;
            }
            row[col] = ch;
        }
        OK
    }
}

#[derive(Debug)]
struct PanelRec {
    window: RawHandle,
    hidden: bool,
}

#[derive(Debug)]
struct ItemRec {
    name: String,
    description: String,
    value: bool,
    opts: ItemOptions,
    menu: Option<RawHandle>,
    index: i32,
}

#[derive(Debug)]
struct MenuRec {
    items: Vec<RawHandle>,
    current: usize,
    top_row: usize,
    opts: MenuOptions,
    rows: i32,
    cols: i32,
    mark: String,
    win: Option<RawHandle>,
    sub: Option<RawHandle>,
    posted: bool,
    pattern: String,
}

#[derive(Debug)]
struct FieldRec {
    height: i32,
    width: i32,
    top: i32,
    left: i32,
    buffer: String,
    opts: FieldOptions,
    field_type: Option<FieldType>,
    pattern: Option<Regex>,
    form: Option<RawHandle>,
    index: i32,
}

impl FieldRec {
    fn capacity(&self) -> usize {
        (self.height.max(0) * self.width.max(0)) as usize
    }
}

#[derive(Debug)]
struct FormRec {
    fields: Vec<RawHandle>,
    current: usize,
    cursor: usize,
    overlay: bool,
    win: Option<RawHandle>,
    sub: Option<RawHandle>,
    posted: bool,
}

#[derive(Debug, Default)]
struct MemoryState {
    lines: i32,
    cols: i32,
    next_handle: u64,
    initialized: bool,
    ended: bool,
    stdscr: Option<RawHandle>,
    userptrs: HashMap<RawHandle, usize>,
    windows: HashMap<RawHandle, WindowRec>,
    panels: HashMap<RawHandle, PanelRec>,
    deck: Vec<RawHandle>,
    items: HashMap<RawHandle, ItemRec>,
    menus: HashMap<RawHandle, MenuRec>,
    fields: HashMap<RawHandle, FieldRec>,
    forms: HashMap<RawHandle, FormRec>,
    hooks: HashSet<(RawHandle, HookKind)>,
    hook_events: Vec<HookEvent>,
    input: VecDeque<i32>,
    beeps: usize,
    updates: usize,
    slk_format: Option<i32>,
    slk_labels: Vec<String>,
    slk_hidden: bool,
    slk_writes: Vec<(i32, String)>,
    fail_next_allocation: bool,
    skew_indices: bool,
}

fn is_printable(key: i32) -> bool {
    (0x20..0x7f).contains(&key)
}

fn matches_prefix(name: &str, pattern: &str, ignore_case: bool) -> bool {
    if ignore_case {
        name.to_lowercase().starts_with(&pattern.to_lowercase())
    } else {
        name.starts_with(pattern)
    }
}

fn check_char(field_type: Option<&FieldType>, ch: char, position: usize) -> bool {
    match field_type {
        None | Some(FieldType::Enumeration { .. } | FieldType::Regexp(_)) => true,
        Some(FieldType::Alpha { .. }) => ch.is_alphabetic(),
        Some(FieldType::Alnum { .. }) => ch.is_alphanumeric(),
        Some(FieldType::Integer { .. }) => ch.is_ascii_digit() || (ch == '-' && position == 0),
        Some(FieldType::Numeric { .. }) => ch.is_ascii_digit() || matches!(ch, '+' | '-' | '.'),
        Some(FieldType::Ipv4) => ch.is_ascii_digit() || ch == '.',
        Some(FieldType::Custom(user)) => user.char_check(ch),
    }
}

/* Bounds only apply when min < max. */
fn in_range<T: PartialOrd>(value: T, min: T, max: T) -> bool {
    min >= max || (min <= value && value <= max)
}

fn fit(text: String, capacity: usize) -> String {
    text.chars().take(capacity).collect()
}

fn is_decimal(value: &str) -> bool {
    let unsigned = value.strip_prefix(['+', '-']).unwrap_or(value);
    let (whole, fraction) = unsigned.split_once('.').unwrap_or((unsigned, ""));
    let all_digits = |part: &str| part.chars().all(|c| c.is_ascii_digit());
    !(whole.is_empty() && fraction.is_empty()) && all_digits(whole) && all_digits(fraction)
}

fn is_ipv4(value: &str) -> bool {
    let parts: Vec<&str> = value.split('.').collect();
    parts.len() == 4
        && parts.iter().all(|part| {
            !part.is_empty()
                && part.chars().all(|c| c.is_ascii_digit())
                && part.parse::<u32>().is_ok_and(|n| n <= 255)
        })
}

/*
 * Field-level validation run when leaving a field or on REQ_VALIDATION.
 * A blank field passes when NULLOK is set. Integer and numeric fields are
 * rewritten to their precision; enumerations complete a matching prefix to the
 * full value.
 */
fn validate_field(field: &mut FieldRec) -> bool {
    let value = field.buffer.trim().to_string();
    if value.is_empty() {
        return field.opts.contains(FieldOptions::NULLOK);
    }
    let capacity = field.capacity();
    match &field.field_type {
        None => true,
        Some(FieldType::Alpha { min_width }) => {
            value.chars().all(char::is_alphabetic) && value.chars().count() >= *min_width
        }
        Some(FieldType::Alnum { min_width }) => {
            value.chars().all(char::is_alphanumeric) && value.chars().count() >= *min_width
        }
        Some(FieldType::Integer {
            precision,
            min,
            max,
        }) => {
            if value.starts_with('+') {
                return false;
            }
            let Ok(number) = value.parse::<i64>() else {
                return false;
            };
            if !in_range(number, *min, *max) {
                return false;
            }
            let digits = format!("{:0width$}", number.unsigned_abs(), width = *precision);
            let text = if number < 0 { format!("-{digits}") } else { digits };
            field.buffer = fit(text, capacity);
            true
        }
        Some(FieldType::Numeric {
            precision,
            min,
            max,
        }) => {
            if !is_decimal(&value) {
                return false;
            }
            let Ok(number) = value.parse::<f64>() else {
                return false;
            };
            if !in_range(number, *min, *max) {
                return false;
            }
            field.buffer = fit(format!("{number:.prec$}", prec = *precision), capacity);
            true
        }
        Some(FieldType::Regexp(_)) => field
            .pattern
            .as_ref()
            .is_some_and(|pattern| pattern.is_match(&value)),
        Some(FieldType::Ipv4) => is_ipv4(&value),
        Some(FieldType::Custom(user)) => user.field_check(&value),
        Some(FieldType::Enumeration {
            values,
            case_sensitive,
            non_unique_matches,
        }) => {
            let normalize = |s: &str| {
                if *case_sensitive {
                    s.to_string()
                } else {
                    s.to_lowercase()
                }
            };
            let wanted = normalize(&value);
            if let Some(exact) = values.iter().find(|v| normalize(v) == wanted) {
                field.buffer = exact.clone();
                return true;
            }
            let candidates: Vec<&String> = values
                .iter()
                .filter(|v| normalize(v).starts_with(&wanted))
                .collect();
            match candidates.as_slice() {
                [only] => {
                    field.buffer = (*only).clone();
                    true
                }
                [first, ..] if *non_unique_matches => {
                    field.buffer = (*first).clone();
                    true
                }
                _ => false,
            }
        }
    }
}

impl MemoryState {
    fn allocate(&mut self) -> Option<RawHandle> {
        if std::mem::take(&mut self.fail_next_allocation) {
            return None;
        }
        self.next_handle += 1;
        RawHandle::from_raw(self.next_handle)
    }

    fn is_live(&self, handle: RawHandle) -> bool {
        self.windows.contains_key(&handle)
            || self.panels.contains_key(&handle)
            || self.items.contains_key(&handle)
            || self.menus.contains_key(&handle)
            || self.fields.contains_key(&handle)
            || self.forms.contains_key(&handle)
    }

    fn forget(&mut self, handle: RawHandle) {
        self.userptrs.remove(&handle);
        self.hooks.retain(|(owner, _)| *owner != handle);
        self.hook_events
            .retain(|event| event.handle != handle && event.child != Some(handle));
    }

    fn current_child(&self, container: RawHandle) -> Option<RawHandle> {
        if let Some(menu) = self.menus.get(&container) {
            return menu.items.get(menu.current).copied();
        }
        let form = self.forms.get(&container)?;
        form.fields.get(form.current).copied()
    }

    fn emit(&mut self, handle: RawHandle, kind: HookKind) {
        if self.hooks.contains(&(handle, kind)) {
            let child = self.current_child(handle);
            self.hook_events.push(HookEvent {
                kind,
                handle,
                child,
            });
        }
    }

    fn reported_index(&self, index: i32) -> i32 {
        if self.skew_indices { index + 1 } else { index }
    }

    // ── Menus ────────────────────────────────────────────────────────────────

    /// Validates a sentinel-terminated item array; returns the handles before the sentinel.
    fn collect_items(&self, items: &HandleArray, menu: Option<RawHandle>) -> Result<Vec<RawHandle>, Status> {
        if items.last() != Some(&None) {
            return Err(E_BAD_ARGUMENT);
        }
        let handles: Vec<RawHandle> = items.iter().map_while(|h| *h).collect();
        let mut seen = HashSet::new();
        for handle in &handles {
            let Some(item) = self.items.get(handle) else {
                return Err(E_BAD_ARGUMENT);
            };
            if !seen.insert(*handle) {
                return Err(E_BAD_ARGUMENT);
            }
            if item.menu.is_some() && item.menu != menu {
                return Err(E_CONNECTED);
            }
        }
        Ok(handles)
    }

    fn connect_items(&mut self, menu: RawHandle, handles: &[RawHandle]) {
        for (index, handle) in handles.iter().enumerate() {
            if let Some(item) = self.items.get_mut(handle) {
                item.menu = Some(menu);
                item.index = index as i32;
                item.value = false;
            }
        }
    }

    fn disconnect_items(&mut self, handles: &[RawHandle]) {
        for handle in handles {
            if let Some(item) = self.items.get_mut(handle) {
                item.menu = None;
                item.index = -1;
            }
        }
    }

    fn total_rows(menu: &MenuRec) -> usize {
        let cols = menu.cols.max(1) as usize;
        menu.items.len().div_ceil(cols)
    }

    fn visible_rows(menu: &MenuRec) -> usize {
        (menu.rows.max(1) as usize).min(Self::total_rows(menu).max(1))
    }

    fn keep_current_visible(menu: &mut MenuRec) {
        let cols = menu.cols.max(1) as usize;
        let row = menu.current / cols;
        let visible = Self::visible_rows(menu);
        if row < menu.top_row {
            menu.top_row = row;
        } else if row >= menu.top_row + visible {
            menu.top_row = row + 1 - visible;
        }
    }

    fn find_match(&self, menu: &MenuRec, pattern: &str, start: usize, forward: bool, include_start: bool) -> Option<usize> {
        let count = menu.items.len();
        let ignore_case = menu.opts.contains(MenuOptions::IGNORECASE);
        let first_step = if include_start { 0 } else { 1 };
        (first_step..count + first_step)
            .map(|step| {
                if forward {
                    (start + step) % count
                } else {
                    (start + count * 2 - step) % count
                }
            })
            .find(|index| {
                self.items
                    .get(&menu.items[*index])
                    .is_some_and(|item| matches_prefix(&item.name, pattern, ignore_case))
            })
    }

    fn drive_menu(&mut self, handle: RawHandle, request: i32) -> Status {
        let Some(menu) = self.menus.get(&handle) else {
            return E_BAD_ARGUMENT;
        };
        if !menu.posted {
            return E_NOT_POSTED;
        }
        let count = menu.items.len();
        if count == 0 {
            return E_NOT_CONNECTED;
        }
        let current = menu.current;
        let cols = menu.cols.max(1) as usize;
        let cyclic = !menu.opts.contains(MenuOptions::NONCYCLIC);
        let visible = Self::visible_rows(menu);
        let total_rows = Self::total_rows(menu);

        let target: Option<usize> = match MenuRequest::from_code(request) {
            Some(MenuRequest::LeftItem) => (current % cols != 0).then(|| current - 1),
            Some(MenuRequest::RightItem) => {
                (current % cols != cols - 1 && current + 1 < count).then_some(current + 1)
            }
            Some(MenuRequest::UpItem) => current.checked_sub(cols),
            Some(MenuRequest::DownItem) => (current + cols < count).then_some(current + cols),
            Some(MenuRequest::NextItem) => {
                if current + 1 < count {
                    Some(current + 1)
                } else {
                    cyclic.then_some(0)
                }
            }
            Some(MenuRequest::PrevItem) => {
                if current > 0 {
                    Some(current - 1)
                } else {
                    cyclic.then_some(count - 1)
                }
            }
            Some(MenuRequest::FirstItem) => Some(0),
            Some(MenuRequest::LastItem) => Some(count - 1),
            Some(MenuRequest::ScrollUpLine) => {
                let top = menu.top_row;
                if top == 0 {
                    None
                } else {
                    let row = (current / cols).min(top - 1 + visible - 1);
                    Some((row * cols + current % cols).min(count - 1))
                }
            }
            Some(MenuRequest::ScrollDownLine) => {
                let top = menu.top_row;
                if top + visible >= total_rows {
                    None
                } else {
                    let row = (current / cols).max(top + 1);
                    Some((row * cols + current % cols).min(count - 1))
                }
            }
            Some(MenuRequest::ScrollDownPage) => {
                if menu.top_row + visible >= total_rows {
                    None
                } else {
                    let top = (menu.top_row + visible).min(total_rows - visible);
                    Some((top * cols).min(count - 1))
                }
            }
            Some(MenuRequest::ScrollUpPage) => {
                if menu.top_row == 0 {
                    None
                } else {
                    Some(menu.top_row.saturating_sub(visible) * cols)
                }
            }
            Some(MenuRequest::ToggleItem) => return self.toggle_item(handle),
            Some(MenuRequest::ClearPattern) => {
                if let Some(menu) = self.menus.get_mut(&handle) {
                    menu.pattern.clear();
                }
                return E_OK;
            }
            Some(MenuRequest::BackPattern) => {
                return match self
                    .menus
                    .get_mut(&handle)
                    .and_then(|menu| menu.pattern.pop())
                {
                    Some(_) => E_OK,
                    None => E_REQUEST_DENIED,
                };
            }
            Some(MenuRequest::NextMatch) | Some(MenuRequest::PrevMatch) => {
                let forward = MenuRequest::from_code(request) == Some(MenuRequest::NextMatch);
                let pattern = menu.pattern.clone();
                if pattern.is_empty() {
                    return E_NO_MATCH;
                }
                return match self.find_match(menu, &pattern, current, forward, false) {
                    Some(index) => {
                        self.move_current(handle, index, false);
                        E_OK
                    }
                    None => E_NO_MATCH,
                };
            }
            None if is_printable(request) => {
                let mut pattern = menu.pattern.clone();
                pattern.push(request as u8 as char);
                return match self.find_match(menu, &pattern, current, true, true) {
                    Some(index) => {
                        self.move_current(handle, index, false);
                        if let Some(menu) = self.menus.get_mut(&handle) {
                            menu.pattern = pattern;
                        }
                        E_OK
                    }
                    None => E_NO_MATCH,
                };
            }
            None => return E_UNKNOWN_COMMAND,
        };

        match target {
            Some(index) => {
                self.move_current(handle, index, true);
                E_OK
            }
            None => E_REQUEST_DENIED,
        }
    }

    fn move_current(&mut self, handle: RawHandle, index: usize, clear_pattern: bool) {
        let changed = self
            .menus
            .get(&handle)
            .is_some_and(|menu| menu.current != index);
        if changed {
            self.emit(handle, HookKind::ChildTerm);
        }
        if let Some(menu) = self.menus.get_mut(&handle) {
            menu.current = index;
            if clear_pattern {
                menu.pattern.clear();
            }
            Self::keep_current_visible(menu);
        }
        if changed {
            self.emit(handle, HookKind::ChildInit);
        }
    }

    fn toggle_item(&mut self, handle: RawHandle) -> Status {
        let Some(menu) = self.menus.get(&handle) else {
            return E_BAD_ARGUMENT;
        };
        if menu.opts.contains(MenuOptions::ONEVALUE) {
            return E_REQUEST_DENIED;
        }
        let item_handle = menu.items[menu.current];
        match self.items.get_mut(&item_handle) {
            Some(item) if item.opts.contains(ItemOptions::SELECTABLE) => {
                item.value = !item.value;
                E_OK
            }
            Some(_) => E_NOT_SELECTABLE,
            None => E_SYSTEM_ERROR,
        }
    }

    // ── Forms ────────────────────────────────────────────────────────────────

    fn collect_fields(&self, fields: &HandleArray, form: Option<RawHandle>) -> Result<Vec<RawHandle>, Status> {
        if fields.last() != Some(&None) {
            return Err(E_BAD_ARGUMENT);
        }
        let handles: Vec<RawHandle> = fields.iter().map_while(|h| *h).collect();
        let mut seen = HashSet::new();
        for handle in &handles {
            let Some(field) = self.fields.get(handle) else {
                return Err(E_BAD_ARGUMENT);
            };
            if !seen.insert(*handle) {
                return Err(E_BAD_ARGUMENT);
            }
            if field.form.is_some() && field.form != form {
                return Err(E_CONNECTED);
            }
        }
        Ok(handles)
    }

    fn connect_fields(&mut self, form: RawHandle, handles: &[RawHandle]) {
        for (index, handle) in handles.iter().enumerate() {
            if let Some(field) = self.fields.get_mut(handle) {
                field.form = Some(form);
                field.index = index as i32;
            }
        }
    }

    fn disconnect_fields(&mut self, handles: &[RawHandle]) {
        for handle in handles {
            if let Some(field) = self.fields.get_mut(handle) {
                field.form = None;
                field.index = -1;
            }
        }
    }

    fn first_active(&self, form: &FormRec) -> usize {
        form.fields
            .iter()
            .position(|f| self.field_is_active(*f))
            .unwrap_or(0)
    }

    fn field_is_active(&self, handle: RawHandle) -> bool {
        self.fields.get(&handle).is_some_and(|field| {
            field
                .opts
                .contains(FieldOptions::ACTIVE | FieldOptions::VISIBLE)
        })
    }

    fn validate_current(&mut self, form_handle: RawHandle) -> bool {
        let Some(form) = self.forms.get(&form_handle) else {
            return false;
        };
        let field_handle = form.fields[form.current];
        match self.fields.get_mut(&field_handle) {
            Some(field) => validate_field(field),
            None => false,
        }
    }

    fn step_field(&self, form: &FormRec, forward: bool) -> usize {
        let count = form.fields.len();
        (1..=count)
            .map(|step| {
                if forward {
                    (form.current + step) % count
                } else {
                    (form.current + count * 2 - step) % count
                }
            })
            .find(|index| self.field_is_active(form.fields[*index]))
            .unwrap_or(form.current)
    }

    fn move_field(&mut self, handle: RawHandle, index: usize) {
        let changed = self
            .forms
            .get(&handle)
            .is_some_and(|form| form.current != index);
        if changed {
            self.emit(handle, HookKind::ChildTerm);
        }
        if let Some(form) = self.forms.get_mut(&handle) {
            form.current = index;
            form.cursor = 0;
        }
        if changed {
            self.emit(handle, HookKind::ChildInit);
        }
    }

    fn drive_form(&mut self, handle: RawHandle, request: i32) -> Status {
        let Some(form) = self.forms.get(&handle) else {
            return E_BAD_ARGUMENT;
        };
        if !form.posted {
            return E_NOT_POSTED;
        }
        if form.fields.is_empty() {
            return E_NOT_CONNECTED;
        }
        let field_handle = form.fields[form.current];
        let cursor = form.cursor;
        let overlay = form.overlay;

        match FormRequest::from_code(request) {
            Some(
                navigation @ (FormRequest::NextField
                | FormRequest::PrevField
                | FormRequest::FirstField
                | FormRequest::LastField),
            ) => {
                if !self.validate_current(handle) {
                    return E_INVALID_FIELD;
                }
                let Some(form) = self.forms.get(&handle) else {
                    return E_SYSTEM_ERROR;
                };
                let target = match navigation {
                    FormRequest::NextField => self.step_field(form, true),
                    FormRequest::PrevField => self.step_field(form, false),
                    FormRequest::FirstField => self.first_active(form),
                    _ => form
                        .fields
                        .iter()
                        .rposition(|f| self.field_is_active(*f))
                        .unwrap_or(form.current),
                };
                self.move_field(handle, target);
                E_OK
            }
            Some(FormRequest::Validation) => {
                if self.validate_current(handle) {
                    E_OK
                } else {
                    E_INVALID_FIELD
                }
            }
            Some(FormRequest::InsertMode) | Some(FormRequest::OverlayMode) => {
                if let Some(form) = self.forms.get_mut(&handle) {
                    form.overlay = FormRequest::from_code(request) == Some(FormRequest::OverlayMode);
                }
                E_OK
            }
            Some(request @ (FormRequest::NextChoice | FormRequest::PrevChoice)) => {
                let Some(field) = self.fields.get_mut(&field_handle) else {
                    return E_SYSTEM_ERROR;
                };
                let forward = request == FormRequest::NextChoice;
                let current = field.buffer.trim().to_string();
                let choice = match &field.field_type {
                    Some(FieldType::Enumeration { values, .. }) if !values.is_empty() => {
                        let position = values.iter().position(|v| *v == current);
                        let next = match (position, forward) {
                            (None, _) => 0,
                            (Some(p), true) => (p + 1) % values.len(),
                            (Some(p), false) => (p + values.len() - 1) % values.len(),
                        };
                        Some(values[next].clone())
                    }
                    Some(FieldType::Custom(user)) if forward => user.next_choice(&current),
                    Some(FieldType::Custom(user)) => user.previous_choice(&current),
                    _ => None,
                };
                match choice {
                    Some(text) => {
                        field.buffer = fit(text, field.capacity());
                        E_OK
                    }
                    None => E_REQUEST_DENIED,
                }
            }
            Some(motion) => {
                let Some(field) = self.fields.get_mut(&field_handle) else {
                    return E_SYSTEM_ERROR;
                };
                let len = field.buffer.chars().count();
                let editable = field.opts.contains(FieldOptions::EDIT);
                let last_cell = field.capacity().saturating_sub(1);
                let new_cursor = match motion {
                    FormRequest::NextChar | FormRequest::RightChar => {
                        (cursor < len && cursor < last_cell).then_some(cursor + 1)
                    }
                    FormRequest::PrevChar | FormRequest::LeftChar => cursor.checked_sub(1),
                    FormRequest::BeginField => Some(0),
                    FormRequest::EndField => Some(len.min(last_cell)),
                    FormRequest::DeleteChar if editable && cursor < len => {
                        let mut chars: Vec<char> = field.buffer.chars().collect();
                        chars.remove(cursor);
                        field.buffer = chars.into_iter().collect();
                        Some(cursor)
                    }
                    FormRequest::DeletePrev if editable && cursor > 0 => {
                        let mut chars: Vec<char> = field.buffer.chars().collect();
                        chars.remove(cursor - 1);
                        field.buffer = chars.into_iter().collect();
                        Some(cursor - 1)
                    }
                    FormRequest::ClearField if editable => {
                        field.buffer.clear();
                        Some(0)
                    }
                    _ => None,
                };
                match new_cursor {
                    Some(position) => {
                        if let Some(form) = self.forms.get_mut(&handle) {
                            form.cursor = position;
                        }
                        E_OK
                    }
                    None => E_REQUEST_DENIED,
                }
            }
            None if is_printable(request) => {
                let Some(field) = self.fields.get_mut(&field_handle) else {
                    return E_SYSTEM_ERROR;
                };
                if !field.opts.contains(FieldOptions::EDIT) {
                    return E_REQUEST_DENIED;
                }
                let ch = request as u8 as char;
                if !check_char(field.field_type.as_ref(), ch, cursor) {
                    return E_INVALID_FIELD;
                }
                let mut chars: Vec<char> = field.buffer.chars().collect();
                if overlay && cursor < chars.len() {
                    chars[cursor] = ch;
                } else {
                    if chars.len() >= field.capacity() {
                        return E_REQUEST_DENIED;
                    }
                    chars.insert(cursor.min(chars.len()), ch);
                }
                field.buffer = chars.into_iter().collect();
                let last_cell = field.capacity().saturating_sub(1);
                if let Some(form) = self.forms.get_mut(&handle) {
                    form.cursor = (cursor + 1).min(last_cell.max(cursor));
                }
                E_OK
            }
            None => E_UNKNOWN_COMMAND,
        }
    }
}

/// In-memory curses library. Cloning a probe from it before handing it to a
/// `Session` keeps a window into the library state.
#[derive(Debug)]
pub struct MemoryCurses {
    state: Rc<RefCell<MemoryState>>,
}

/// Test-side view of a `MemoryCurses` instance.
#[derive(Debug, Clone)]
pub struct MemoryProbe {
    state: Rc<RefCell<MemoryState>>,
}

impl MemoryCurses {
    pub fn new(lines: i32, cols: i32) -> Self {
        Self {
            state: Rc::new(RefCell::new(MemoryState {
                lines,
                cols,
                ..MemoryState::default()
            })),
        }
    }

    pub fn probe(&self) -> MemoryProbe {
        MemoryProbe {
            state: Rc::clone(&self.state),
        }
    }
}

impl Default for MemoryCurses {
    fn default() -> Self {
        Self::new(24, 80)
    }
}

impl MemoryProbe {
    pub fn push_keys(&self, keys: &[i32]) {
        self.state.borrow_mut().input.extend(keys.iter().copied());
    }

    pub fn push_str(&self, text: &str) {
        self.state
            .borrow_mut()
            .input
            .extend(text.bytes().map(i32::from));
    }

    pub fn pending_keys(&self) -> usize {
        self.state.borrow().input.len()
    }

    pub fn beeps(&self) -> usize {
        self.state.borrow().beeps
    }

    pub fn updates(&self) -> usize {
        self.state.borrow().updates
    }

    pub fn is_ended(&self) -> bool {
        self.state.borrow().ended
    }

    pub fn is_live(&self, handle: RawHandle) -> bool {
        self.state.borrow().is_live(handle)
    }

    pub fn live_windows(&self) -> usize {
        self.state.borrow().windows.len()
    }

    pub fn live_panels(&self) -> usize {
        self.state.borrow().panels.len()
    }

    pub fn live_items(&self) -> usize {
        self.state.borrow().items.len()
    }

    pub fn live_fields(&self) -> usize {
        self.state.borrow().fields.len()
    }

    pub fn live_menus(&self) -> usize {
        self.state.borrow().menus.len()
    }

    pub fn live_forms(&self) -> usize {
        self.state.borrow().forms.len()
    }

    /// Text of one window row, trailing blanks removed.
    pub fn window_row(&self, win: RawHandle, y: i32) -> Option<String> {
        let state = self.state.borrow();
        let window = state.windows.get(&win)?;
        let row = window.cells.get(usize::try_from(y).ok()?)?;
        Some(row.iter().collect::<String>().trim_end().to_string())
    }

    /// `Some(bold)` when a box was drawn on the window.
    pub fn window_boxed(&self, win: RawHandle) -> Option<bool> {
        self.state.borrow().windows.get(&win)?.boxed
    }

    pub fn window_timeout(&self, win: RawHandle) -> Option<i32> {
        Some(self.state.borrow().windows.get(&win)?.timeout)
    }

    pub fn window_keypad(&self, win: RawHandle) -> Option<bool> {
        Some(self.state.borrow().windows.get(&win)?.keypad)
    }

    /// Panels from bottom to top with their hidden flag.
    pub fn panel_deck(&self) -> Vec<(RawHandle, bool)> {
        let state = self.state.borrow();
        state
            .deck
            .iter()
            .filter_map(|p| state.panels.get(p).map(|rec| (*p, rec.hidden)))
            .collect()
    }

    pub fn slk_format(&self) -> Option<i32> {
        self.state.borrow().slk_format
    }

    pub fn slk_labels(&self) -> Vec<String> {
        self.state.borrow().slk_labels.clone()
    }

    /// `slk_set` calls since the last take, as (1-based label, text).
    pub fn take_slk_writes(&self) -> Vec<(i32, String)> {
        std::mem::take(&mut self.state.borrow_mut().slk_writes)
    }

    /// Whether `slk_clear` hid the label row.
    pub fn slk_hidden(&self) -> bool {
        self.state.borrow().slk_hidden
    }

    pub fn menu_is_posted(&self, menu: RawHandle) -> bool {
        self.state.borrow().menus.get(&menu).is_some_and(|m| m.posted)
    }

    pub fn form_is_posted(&self, form: RawHandle) -> bool {
        self.state.borrow().forms.get(&form).is_some_and(|f| f.posted)
    }

    /// Makes the next factory call (window, panel, item, menu, field, form) return NULL.
    pub fn fail_next_allocation(&self) {
        self.state.borrow_mut().fail_next_allocation = true;
    }

    /// Makes `item_index`/`field_index` report positions off by one.
    pub fn skew_indices(&self, skew: bool) {
        self.state.borrow_mut().skew_indices = skew;
    }

    /// Overwrites a handle's user pointer behind the binding's back.
    pub fn overwrite_userptr(&self, handle: RawHandle, value: usize) {
        self.state.borrow_mut().userptrs.insert(handle, value);
    }
}

impl CursesLibrary for MemoryCurses {
    fn initscr(&mut self) -> Option<RawHandle> {
        let mut state = self.state.borrow_mut();
        if let Some(stdscr) = state.stdscr {
            state.ended = false;
            return Some(stdscr);
        }
        let handle = state.allocate()?;
        let (lines, cols) = (state.lines, state.cols);
        state
            .windows
            .insert(handle, WindowRec::new(None, lines, cols, 0, 0));
        state.stdscr = Some(handle);
        state.initialized = true;
        state.ended = false;
        Some(handle)
    }

    fn endwin(&mut self) -> Status {
        let mut state = self.state.borrow_mut();
        if !state.initialized {
            return ERR;
        }
        state.ended = true;
        OK
    }

    fn isendwin(&self) -> bool {
        self.state.borrow().ended
    }

    fn lines(&self) -> i32 {
        self.state.borrow().lines
    }

    fn cols(&self) -> i32 {
        self.state.borrow().cols
    }

    fn beep(&mut self) -> Status {
        self.state.borrow_mut().beeps += 1;
        OK
    }

    fn doupdate(&mut self) -> Status {
        self.state.borrow_mut().updates += 1;
        OK
    }

    fn newwin(&mut self, lines: i32, cols: i32, begin_y: i32, begin_x: i32) -> Option<RawHandle> {
        let mut state = self.state.borrow_mut();
        let lines = if lines == 0 { state.lines - begin_y } else { lines };
        let cols = if cols == 0 { state.cols - begin_x } else { cols };
        if lines <= 0 || cols <= 0 || begin_y < 0 || begin_x < 0 {
            return None;
        }
        if begin_y + lines > state.lines || begin_x + cols > state.cols {
            return None;
        }
        let handle = state.allocate()?;
        state
            .windows
            .insert(handle, WindowRec::new(None, lines, cols, begin_y, begin_x));
        Some(handle)
    }

    fn derwin(
        &mut self,
        parent: RawHandle,
        lines: i32,
        cols: i32,
        begin_y: i32,
        begin_x: i32,
    ) -> Option<RawHandle> {
        let mut state = self.state.borrow_mut();
        let (parent_lines, parent_cols, parent_y, parent_x) = {
            let rec = state.windows.get(&parent)?;
            (rec.lines, rec.cols, rec.y, rec.x)
        };
        if lines <= 0 || cols <= 0 || begin_y < 0 || begin_x < 0 {
            return None;
        }
        if begin_y + lines > parent_lines || begin_x + cols > parent_cols {
            return None;
        }
        let handle = state.allocate()?;
        state.windows.insert(
            handle,
            WindowRec::new(
                Some(parent),
                lines,
                cols,
                parent_y + begin_y,
                parent_x + begin_x,
            ),
        );
        Some(handle)
    }

    fn delwin(&mut self, win: RawHandle) -> Status {
        let mut state = self.state.borrow_mut();
        if !state.windows.contains_key(&win) {
            return ERR;
        }
        if state.windows.values().any(|w| w.parent == Some(win)) {
            return ERR;
        }
        state.windows.remove(&win);
        state.forget(win);
        if state.stdscr == Some(win) {
            state.stdscr = None;
        }
        OK
    }

    fn mvwin(&mut self, win: RawHandle, y: i32, x: i32) -> Status {
        let mut state = self.state.borrow_mut();
        let (lines, cols) = (state.lines, state.cols);
        match state.windows.get_mut(&win) {
            Some(rec) if y >= 0 && x >= 0 && y + rec.lines <= lines && x + rec.cols <= cols => {
                rec.y = y;
                rec.x = x;
                OK
            }
            _ => ERR,
        }
    }

    fn wresize(&mut self, win: RawHandle, lines: i32, cols: i32) -> Status {
        let mut state = self.state.borrow_mut();
        match state.windows.get_mut(&win) {
            Some(rec) if lines > 0 && cols > 0 => {
                rec.cells.resize(lines as usize, vec![' '; cols as usize]);
                for row in &mut rec.cells {
                    row.resize(cols as usize, ' ');
                }
                rec.lines = lines;
                rec.cols = cols;
                OK
            }
            _ => ERR,
        }
    }

    fn getmaxyx(&self, win: RawHandle) -> Option<(i32, i32)> {
        self.state
            .borrow()
            .windows
            .get(&win)
            .map(|rec| (rec.lines, rec.cols))
    }

    fn getbegyx(&self, win: RawHandle) -> Option<(i32, i32)> {
        self.state
            .borrow()
            .windows
            .get(&win)
            .map(|rec| (rec.y, rec.x))
    }

    fn wbox(&mut self, win: RawHandle, bold: bool) -> Status {
        let mut state = self.state.borrow_mut();
        let Some(rec) = state.windows.get_mut(&win) else {
            return ERR;
        };
        if rec.lines < 2 || rec.cols < 2 {
            return ERR;
        }
        let (last_y, last_x) = ((rec.lines - 1) as usize, (rec.cols - 1) as usize);
        for (y, row) in rec.cells.iter_mut().enumerate() {
            for (x, cell) in row.iter_mut().enumerate() {
                let edge_y = y == 0 || y == last_y;
                let edge_x = x == 0 || x == last_x;
                if edge_y && edge_x {
                    *cell = '+';
                } else if edge_y {
                    *cell = '-';
                } else if edge_x {
                    *cell = '|';
                }
            }
        }
        rec.boxed = Some(bold);
        OK
    }

    fn mvwaddstr(&mut self, win: RawHandle, y: i32, x: i32, text: &str) -> Status {
        match self.state.borrow_mut().windows.get_mut(&win) {
            Some(rec) => rec.put(y, x, text),
            None => ERR,
        }
    }

    fn wclear(&mut self, win: RawHandle) -> Status {
        match self.state.borrow_mut().windows.get_mut(&win) {
            Some(rec) => {
                for row in &mut rec.cells {
                    row.fill(' ');
                }
                rec.boxed = None;
                OK
            }
            None => ERR,
        }
    }

    fn wnoutrefresh(&mut self, win: RawHandle) -> Status {
        if self.state.borrow().windows.contains_key(&win) {
            OK
        } else {
            ERR
        }
    }

    fn keypad(&mut self, win: RawHandle, enable: bool) -> Status {
        match self.state.borrow_mut().windows.get_mut(&win) {
            Some(rec) => {
                rec.keypad = enable;
                OK
            }
            None => ERR,
        }
    }

    fn wtimeout(&mut self, win: RawHandle, delay_ms: i32) {
        if let Some(rec) = self.state.borrow_mut().windows.get_mut(&win) {
            rec.timeout = delay_ms;
        }
    }

    fn wgetch(&mut self, win: RawHandle) -> i32 {
        let mut state = self.state.borrow_mut();
        if state.ended || !state.windows.contains_key(&win) {
            return ERR;
        }
        state.input.pop_front().unwrap_or(ERR)
    }

    fn set_userptr(&mut self, handle: RawHandle, value: usize) -> Status {
        let mut state = self.state.borrow_mut();
        if !state.is_live(handle) {
            return ERR;
        }
        state.userptrs.insert(handle, value);
        OK
    }

    fn userptr(&self, handle: RawHandle) -> usize {
        self.state
            .borrow()
            .userptrs
            .get(&handle)
            .copied()
            .unwrap_or(0)
    }

    fn new_panel(&mut self, win: RawHandle) -> Option<RawHandle> {
        let mut state = self.state.borrow_mut();
        if !state.windows.contains_key(&win) {
            return None;
        }
        let handle = state.allocate()?;
        state.panels.insert(
            handle,
            PanelRec {
                window: win,
                hidden: false,
            },
        );
        state.deck.push(handle);
        Some(handle)
    }

    fn del_panel(&mut self, panel: RawHandle) -> Status {
        let mut state = self.state.borrow_mut();
        if state.panels.remove(&panel).is_none() {
            return ERR;
        }
        state.deck.retain(|p| *p != panel);
        state.forget(panel);
        OK
    }

    fn show_panel(&mut self, panel: RawHandle) -> Status {
        let mut state = self.state.borrow_mut();
        match state.panels.get_mut(&panel) {
            Some(rec) => {
                rec.hidden = false;
                state.deck.retain(|p| *p != panel);
                state.deck.push(panel);
                OK
            }
            None => ERR,
        }
    }

    fn hide_panel(&mut self, panel: RawHandle) -> Status {
        match self.state.borrow_mut().panels.get_mut(&panel) {
            Some(rec) => {
                rec.hidden = true;
                OK
            }
            None => ERR,
        }
    }

    fn top_panel(&mut self, panel: RawHandle) -> Status {
        let mut state = self.state.borrow_mut();
        if !state.panels.contains_key(&panel) {
            return ERR;
        }
        state.deck.retain(|p| *p != panel);
        state.deck.push(panel);
        OK
    }

    fn bottom_panel(&mut self, panel: RawHandle) -> Status {
        let mut state = self.state.borrow_mut();
        if !state.panels.contains_key(&panel) {
            return ERR;
        }
        state.deck.retain(|p| *p != panel);
        state.deck.insert(0, panel);
        OK
    }

    fn panel_hidden(&self, panel: RawHandle) -> Option<bool> {
        self.state.borrow().panels.get(&panel).map(|rec| rec.hidden)
    }

    fn update_panels(&mut self) {
        let state = self.state.borrow();
        log::trace!(
            "MemoryCurses: update_panels over {} panel(s), {} visible",
            state.deck.len(),
            state
                .deck
                .iter()
                .filter(|p| state.panels.get(p).is_some_and(|rec| !rec.hidden && state.windows.contains_key(&rec.window)))
                .count()
        );
    }

    fn new_item(&mut self, name: &str, description: &str) -> Option<RawHandle> {
        if name.is_empty() {
            return None;
        }
        let mut state = self.state.borrow_mut();
        let handle = state.allocate()?;
        state.items.insert(
            handle,
            ItemRec {
                name: name.to_string(),
                description: description.to_string(),
                value: false,
                opts: ItemOptions::SELECTABLE,
                menu: None,
                index: -1,
            },
        );
        Some(handle)
    }

    fn free_item(&mut self, item: RawHandle) -> Status {
        let mut state = self.state.borrow_mut();
        match state.items.get(&item) {
            None => E_BAD_ARGUMENT,
            Some(rec) if rec.menu.is_some() => E_CONNECTED,
            Some(_) => {
                state.items.remove(&item);
                state.forget(item);
                E_OK
            }
        }
    }

    fn item_name(&self, item: RawHandle) -> Option<String> {
        self.state.borrow().items.get(&item).map(|rec| rec.name.clone())
    }

    fn item_description(&self, item: RawHandle) -> Option<String> {
        self.state
            .borrow()
            .items
            .get(&item)
            .map(|rec| rec.description.clone())
    }

    fn item_index(&self, item: RawHandle) -> i32 {
        let state = self.state.borrow();
        match state.items.get(&item) {
            Some(rec) if rec.menu.is_some() => state.reported_index(rec.index),
            _ => ERR,
        }
    }

    fn item_value(&self, item: RawHandle) -> bool {
        self.state.borrow().items.get(&item).is_some_and(|rec| rec.value)
    }

    fn set_item_value(&mut self, item: RawHandle, value: bool) -> Status {
        let mut state = self.state.borrow_mut();
        let one_value = match state.items.get(&item) {
            None => return E_BAD_ARGUMENT,
            Some(rec) => rec
                .menu
                .and_then(|menu| state.menus.get(&menu))
                .is_some_and(|menu| menu.opts.contains(MenuOptions::ONEVALUE)),
        };
        match state.items.get_mut(&item) {
            Some(rec) if one_value || !rec.opts.contains(ItemOptions::SELECTABLE) => {
                E_REQUEST_DENIED
            }
            Some(rec) => {
                rec.value = value;
                E_OK
            }
            None => E_BAD_ARGUMENT,
        }
    }

    fn item_opts(&self, item: RawHandle) -> ItemOptions {
        self.state
            .borrow()
            .items
            .get(&item)
            .map(|rec| rec.opts)
            .unwrap_or(ItemOptions::empty())
    }

    fn set_item_opts(&mut self, item: RawHandle, opts: ItemOptions) -> Status {
        match self.state.borrow_mut().items.get_mut(&item) {
            Some(rec) => {
                rec.opts = opts;
                if !opts.contains(ItemOptions::SELECTABLE) {
                    rec.value = false;
                }
                E_OK
            }
            None => E_BAD_ARGUMENT,
        }
    }

    fn new_menu(&mut self, items: HandleArray) -> Option<RawHandle> {
        let mut state = self.state.borrow_mut();
        let handles = state.collect_items(&items, None).ok()?;
        let handle = state.allocate()?;
        state.connect_items(handle, &handles);
        let rows = (handles.len() as i32).clamp(1, 16);
        state.menus.insert(
            handle,
            MenuRec {
                items: handles,
                current: 0,
                top_row: 0,
                opts: MenuOptions::default(),
                rows,
                cols: 1,
                mark: "-".to_string(),
                win: None,
                sub: None,
                posted: false,
                pattern: String::new(),
            },
        );
        Some(handle)
    }

    fn set_menu_items(&mut self, menu: RawHandle, items: HandleArray) -> Status {
        let mut state = self.state.borrow_mut();
        let old = match state.menus.get(&menu) {
            None => return E_BAD_ARGUMENT,
            Some(rec) if rec.posted => return E_POSTED,
            Some(rec) => rec.items.clone(),
        };
        let handles = match state.collect_items(&items, Some(menu)) {
            Ok(handles) => handles,
            Err(status) => return status,
        };
        state.disconnect_items(&old);
        state.connect_items(menu, &handles);
        if let Some(rec) = state.menus.get_mut(&menu) {
            rec.items = handles;
            rec.current = 0;
            rec.top_row = 0;
            rec.pattern.clear();
        }
        E_OK
    }

    fn free_menu(&mut self, menu: RawHandle) -> Status {
        let mut state = self.state.borrow_mut();
        let items = match state.menus.get(&menu) {
            None => return E_BAD_ARGUMENT,
            Some(rec) if rec.posted => return E_POSTED,
            Some(rec) => rec.items.clone(),
        };
        state.disconnect_items(&items);
        state.menus.remove(&menu);
        state.forget(menu);
        E_OK
    }

    fn item_count(&self, menu: RawHandle) -> i32 {
        self.state
            .borrow()
            .menus
            .get(&menu)
            .map(|rec| rec.items.len() as i32)
            .unwrap_or(ERR)
    }

    fn current_item(&self, menu: RawHandle) -> Option<RawHandle> {
        let state = self.state.borrow();
        let rec = state.menus.get(&menu)?;
        rec.items.get(rec.current).copied()
    }

    fn set_current_item(&mut self, menu: RawHandle, item: RawHandle) -> Status {
        let mut state = self.state.borrow_mut();
        let Some(index) = state
            .menus
            .get(&menu)
            .and_then(|rec| rec.items.iter().position(|h| *h == item))
        else {
            return E_BAD_ARGUMENT;
        };
        state.move_current(menu, index, true);
        E_OK
    }

    fn menu_opts(&self, menu: RawHandle) -> MenuOptions {
        self.state
            .borrow()
            .menus
            .get(&menu)
            .map(|rec| rec.opts)
            .unwrap_or(MenuOptions::empty())
    }

    fn set_menu_opts(&mut self, menu: RawHandle, opts: MenuOptions) -> Status {
        let mut state = self.state.borrow_mut();
        let items = match state.menus.get_mut(&menu) {
            None => return E_BAD_ARGUMENT,
            Some(rec) if rec.posted => return E_POSTED,
            Some(rec) => {
                rec.opts = opts;
                rec.items.clone()
            }
        };
        if opts.contains(MenuOptions::ONEVALUE) {
            for item in items {
                if let Some(rec) = state.items.get_mut(&item) {
                    rec.value = false;
                }
            }
        }
        E_OK
    }

    fn set_menu_format(&mut self, menu: RawHandle, rows: i32, cols: i32) -> Status {
        if rows < 0 || cols < 0 {
            return E_BAD_ARGUMENT;
        }
        match self.state.borrow_mut().menus.get_mut(&menu) {
            None => E_BAD_ARGUMENT,
            Some(rec) if rec.posted => E_POSTED,
            Some(rec) => {
                if rows > 0 {
                    rec.rows = rows;
                }
                if cols > 0 {
                    rec.cols = cols;
                }
                rec.top_row = 0;
                E_OK
            }
        }
    }

    fn set_menu_mark(&mut self, menu: RawHandle, mark: &str) -> Status {
        match self.state.borrow_mut().menus.get_mut(&menu) {
            Some(rec) => {
                rec.mark = mark.to_string();
                E_OK
            }
            None => E_BAD_ARGUMENT,
        }
    }

    fn scale_menu(&self, menu: RawHandle) -> Option<(i32, i32)> {
        let state = self.state.borrow();
        let rec = state.menus.get(&menu)?;
        if rec.items.is_empty() {
            return None;
        }
        let items: Vec<&ItemRec> = rec.items.iter().filter_map(|h| state.items.get(h)).collect();
        let name_width = items.iter().map(|i| i.name.chars().count()).max().unwrap_or(0);
        let desc_width = items
            .iter()
            .map(|i| i.description.chars().count())
            .max()
            .unwrap_or(0);
        let mut item_width = name_width + rec.mark.chars().count();
        if rec.opts.contains(MenuOptions::SHOWDESC) && desc_width > 0 {
            item_width += 1 + desc_width;
        }
        let cols = rec.cols.max(1);
        let rows = MemoryState::visible_rows(rec) as i32;
        Some((rows, item_width as i32 * cols + (cols - 1)))
    }

    fn set_menu_win(&mut self, menu: RawHandle, win: RawHandle) -> Status {
        let mut state = self.state.borrow_mut();
        if !state.windows.contains_key(&win) {
            return E_BAD_ARGUMENT;
        }
        match state.menus.get_mut(&menu) {
            None => E_BAD_ARGUMENT,
            Some(rec) if rec.posted => E_POSTED,
            Some(rec) => {
                rec.win = Some(win);
                E_OK
            }
        }
    }

    fn set_menu_sub(&mut self, menu: RawHandle, win: RawHandle) -> Status {
        let mut state = self.state.borrow_mut();
        if !state.windows.contains_key(&win) {
            return E_BAD_ARGUMENT;
        }
        match state.menus.get_mut(&menu) {
            None => E_BAD_ARGUMENT,
            Some(rec) if rec.posted => E_POSTED,
            Some(rec) => {
                rec.sub = Some(win);
                E_OK
            }
        }
    }

    fn post_menu(&mut self, menu: RawHandle) -> Status {
        let mut guard = self.state.borrow_mut();
        let state = &mut *guard;
        let Some(rec) = state.menus.get_mut(&menu) else {
            return E_BAD_ARGUMENT;
        };
        if rec.posted {
            return E_POSTED;
        }
        if rec.items.is_empty() {
            return E_NOT_CONNECTED;
        }
        rec.posted = true;
        let target = rec.sub.or(rec.win);
        let lines: Vec<String> = rec
            .items
            .iter()
            .enumerate()
            .filter_map(|(index, h)| {
                state.items.get(h).map(|item| {
                    let mark = if index == rec.current { rec.mark.as_str() } else { "" };
                    format!("{mark}{}", item.name)
                })
            })
            .collect();
        if let Some(win) = target.and_then(|w| state.windows.get_mut(&w)) {
            for (row, line) in lines.iter().enumerate() {
                let _ = win.put(row as i32, 0, line);
            }
        }
        state.emit(menu, HookKind::ContainerInit);
        state.emit(menu, HookKind::ChildInit);
        E_OK
    }

    fn unpost_menu(&mut self, menu: RawHandle) -> Status {
        let mut state = self.state.borrow_mut();
        match state.menus.get_mut(&menu) {
            None => E_BAD_ARGUMENT,
            Some(rec) if !rec.posted => E_NOT_POSTED,
            Some(rec) => {
                rec.posted = false;
                state.emit(menu, HookKind::ChildTerm);
                state.emit(menu, HookKind::ContainerTerm);
                E_OK
            }
        }
    }

    fn menu_pattern(&self, menu: RawHandle) -> Option<String> {
        self.state
            .borrow()
            .menus
            .get(&menu)
            .map(|rec| rec.pattern.clone())
    }

    fn menu_driver(&mut self, menu: RawHandle, request: i32) -> Status {
        self.state.borrow_mut().drive_menu(menu, request)
    }

    fn new_field(&mut self, height: i32, width: i32, top: i32, left: i32) -> Option<RawHandle> {
        if height <= 0 || width <= 0 || top < 0 || left < 0 {
            return None;
        }
        let mut state = self.state.borrow_mut();
        let handle = state.allocate()?;
        state.fields.insert(
            handle,
            FieldRec {
                height,
                width,
                top,
                left,
                buffer: String::new(),
                opts: FieldOptions::default(),
                field_type: None,
                pattern: None,
                form: None,
                index: -1,
            },
        );
        Some(handle)
    }

    fn free_field(&mut self, field: RawHandle) -> Status {
        let mut state = self.state.borrow_mut();
        match state.fields.get(&field) {
            None => E_BAD_ARGUMENT,
            Some(rec) if rec.form.is_some() => E_CONNECTED,
            Some(_) => {
                state.fields.remove(&field);
                state.forget(field);
                E_OK
            }
        }
    }

    fn field_buffer(&self, field: RawHandle) -> Option<String> {
        self.state
            .borrow()
            .fields
            .get(&field)
            .map(|rec| rec.buffer.clone())
    }

    fn set_field_buffer(&mut self, field: RawHandle, text: &str) -> Status {
        match self.state.borrow_mut().fields.get_mut(&field) {
            Some(rec) if text.chars().count() <= rec.capacity() => {
                rec.buffer = text.to_string();
                E_OK
            }
            Some(_) => E_BAD_ARGUMENT,
            None => E_BAD_ARGUMENT,
        }
    }

    fn field_opts(&self, field: RawHandle) -> FieldOptions {
        self.state
            .borrow()
            .fields
            .get(&field)
            .map(|rec| rec.opts)
            .unwrap_or(FieldOptions::empty())
    }

    fn set_field_opts(&mut self, field: RawHandle, opts: FieldOptions) -> Status {
        let mut state = self.state.borrow_mut();
        let posted_form = match state.fields.get(&field) {
            None => return E_BAD_ARGUMENT,
            Some(rec) => rec.form.filter(|form| state.forms.get(form).is_some_and(|f| f.posted)),
        };
        let is_current = posted_form
            .and_then(|form| state.forms.get(&form))
            .is_some_and(|form| form.fields.get(form.current) == Some(&field));
        if is_current && !opts.contains(FieldOptions::ACTIVE) {
            return E_CURRENT;
        }
        match state.fields.get_mut(&field) {
            Some(rec) => {
                rec.opts = opts;
                E_OK
            }
            None => E_BAD_ARGUMENT,
        }
    }

    fn set_field_type(&mut self, field: RawHandle, field_type: Option<FieldType>) -> Status {
        let pattern = match &field_type {
            Some(FieldType::Regexp(expr)) => match Regex::new(expr) {
                Ok(pattern) => Some(pattern),
                Err(_) => return E_BAD_ARGUMENT,
            },
            _ => None,
        };
        match self.state.borrow_mut().fields.get_mut(&field) {
            Some(rec) => {
                rec.field_type = field_type;
                rec.pattern = pattern;
                E_OK
            }
            None => E_BAD_ARGUMENT,
        }
    }

    fn field_index(&self, field: RawHandle) -> i32 {
        let state = self.state.borrow();
        match state.fields.get(&field) {
            Some(rec) if rec.form.is_some() => state.reported_index(rec.index),
            _ => ERR,
        }
    }

    fn new_form(&mut self, fields: HandleArray) -> Option<RawHandle> {
        let mut state = self.state.borrow_mut();
        let handles = state.collect_fields(&fields, None).ok()?;
        let handle = state.allocate()?;
        state.connect_fields(handle, &handles);
        let mut form = FormRec {
            fields: handles,
            current: 0,
            cursor: 0,
            overlay: false,
            win: None,
            sub: None,
            posted: false,
        };
        form.current = state.first_active(&form);
        state.forms.insert(handle, form);
        Some(handle)
    }

    fn set_form_fields(&mut self, form: RawHandle, fields: HandleArray) -> Status {
        let mut state = self.state.borrow_mut();
        let old = match state.forms.get(&form) {
            None => return E_BAD_ARGUMENT,
            Some(rec) if rec.posted => return E_POSTED,
            Some(rec) => rec.fields.clone(),
        };
        let handles = match state.collect_fields(&fields, Some(form)) {
            Ok(handles) => handles,
            Err(status) => return status,
        };
        state.disconnect_fields(&old);
        state.connect_fields(form, &handles);
        let first = {
            let Some(rec) = state.forms.get(&form) else {
                return E_SYSTEM_ERROR;
            };
            let probe = FormRec {
                fields: handles.clone(),
                current: 0,
                cursor: 0,
                overlay: rec.overlay,
                win: rec.win,
                sub: rec.sub,
                posted: false,
            };
            state.first_active(&probe)
        };
        if let Some(rec) = state.forms.get_mut(&form) {
            rec.fields = handles;
            rec.current = first;
            rec.cursor = 0;
        }
        E_OK
    }

    fn free_form(&mut self, form: RawHandle) -> Status {
        let mut state = self.state.borrow_mut();
        let fields = match state.forms.get(&form) {
            None => return E_BAD_ARGUMENT,
            Some(rec) if rec.posted => return E_POSTED,
            Some(rec) => rec.fields.clone(),
        };
        state.disconnect_fields(&fields);
        state.forms.remove(&form);
        state.forget(form);
        E_OK
    }

    fn field_count(&self, form: RawHandle) -> i32 {
        self.state
            .borrow()
            .forms
            .get(&form)
            .map(|rec| rec.fields.len() as i32)
            .unwrap_or(ERR)
    }

    fn current_field(&self, form: RawHandle) -> Option<RawHandle> {
        let state = self.state.borrow();
        let rec = state.forms.get(&form)?;
        rec.fields.get(rec.current).copied()
    }

    fn set_current_field(&mut self, form: RawHandle, field: RawHandle) -> Status {
        let mut state = self.state.borrow_mut();
        let Some(index) = state
            .forms
            .get(&form)
            .and_then(|rec| rec.fields.iter().position(|h| *h == field))
        else {
            return E_BAD_ARGUMENT;
        };
        if !state.field_is_active(field) {
            return E_REQUEST_DENIED;
        }
        let posted = state.forms.get(&form).is_some_and(|rec| rec.posted);
        if posted && !state.validate_current(form) {
            return E_INVALID_FIELD;
        }
        state.move_field(form, index);
        E_OK
    }

    fn scale_form(&self, form: RawHandle) -> Option<(i32, i32)> {
        let state = self.state.borrow();
        let rec = state.forms.get(&form)?;
        if rec.fields.is_empty() {
            return None;
        }
        rec.fields
            .iter()
            .filter_map(|h| state.fields.get(h))
            .map(|f| (f.top + f.height, f.left + f.width))
            .reduce(|(r1, c1), (r2, c2)| (r1.max(r2), c1.max(c2)))
    }

    fn set_form_win(&mut self, form: RawHandle, win: RawHandle) -> Status {
        let mut state = self.state.borrow_mut();
        if !state.windows.contains_key(&win) {
            return E_BAD_ARGUMENT;
        }
        match state.forms.get_mut(&form) {
            None => E_BAD_ARGUMENT,
            Some(rec) if rec.posted => E_POSTED,
            Some(rec) => {
                rec.win = Some(win);
                E_OK
            }
        }
    }

    fn set_form_sub(&mut self, form: RawHandle, win: RawHandle) -> Status {
        let mut state = self.state.borrow_mut();
        if !state.windows.contains_key(&win) {
            return E_BAD_ARGUMENT;
        }
        match state.forms.get_mut(&form) {
            None => E_BAD_ARGUMENT,
            Some(rec) if rec.posted => E_POSTED,
            Some(rec) => {
                rec.sub = Some(win);
                E_OK
            }
        }
    }

    fn post_form(&mut self, form: RawHandle) -> Status {
        let mut state = self.state.borrow_mut();
        let Some(rec) = state.forms.get_mut(&form) else {
            return E_BAD_ARGUMENT;
        };
        if rec.posted {
            return E_POSTED;
        }
        if rec.fields.is_empty() {
            return E_NOT_CONNECTED;
        }
        rec.posted = true;
        rec.cursor = 0;
        state.emit(form, HookKind::ContainerInit);
        state.emit(form, HookKind::ChildInit);
        E_OK
    }

    fn unpost_form(&mut self, form: RawHandle) -> Status {
        let mut state = self.state.borrow_mut();
        match state.forms.get_mut(&form) {
            None => E_BAD_ARGUMENT,
            Some(rec) if !rec.posted => E_NOT_POSTED,
            Some(rec) => {
                rec.posted = false;
                state.emit(form, HookKind::ChildTerm);
                state.emit(form, HookKind::ContainerTerm);
                E_OK
            }
        }
    }

    fn form_driver(&mut self, form: RawHandle, request: i32) -> Status {
        self.state.borrow_mut().drive_form(form, request)
    }

    fn set_hook(&mut self, container: RawHandle, kind: HookKind, enabled: bool) -> Status {
        let mut state = self.state.borrow_mut();
        if !state.menus.contains_key(&container) && !state.forms.contains_key(&container) {
            return E_BAD_ARGUMENT;
        }
        if enabled {
            state.hooks.insert((container, kind));
        } else {
            state.hooks.remove(&(container, kind));
        }
        E_OK
    }

    fn drain_hook_events(&mut self) -> Vec<HookEvent> {
        std::mem::take(&mut self.state.borrow_mut().hook_events)
    }

    fn slk_init(&mut self, format: i32) -> Status {
        let mut state = self.state.borrow_mut();
        if state.initialized {
            return ERR;
        }
        let count = match format {
            0 | 1 => 8,
            2 | 3 => 12,
            _ => return ERR,
        };
        state.slk_format = Some(format);
        state.slk_labels = vec![String::new(); count];
        state.slk_hidden = false;
        OK
    }

    fn slk_set(&mut self, label: i32, text: &str, justify: i32) -> Status {
        let mut state = self.state.borrow_mut();
        if !(0..=2).contains(&justify) {
            return ERR;
        }
        let count = state.slk_labels.len() as i32;
        if state.slk_format.is_none() || label < 1 || label > count {
            return ERR;
        }
        state.slk_labels[(label - 1) as usize] = text.to_string();
        state.slk_writes.push((label, text.to_string()));
        OK
    }

    fn slk_label(&self, label: i32) -> Option<String> {
        let state = self.state.borrow();
        if label < 1 {
            return None;
        }
        state.slk_labels.get((label - 1) as usize).cloned()
    }

    fn slk_clear(&mut self) -> Status {
        let mut state = self.state.borrow_mut();
        if state.slk_format.is_none() {
            return ERR;
        }
        state.slk_hidden = true;
        OK
    }

    fn slk_restore(&mut self) -> Status {
        let mut state = self.state.borrow_mut();
        if state.slk_format.is_none() {
            return ERR;
        }
        state.slk_hidden = false;
        OK
    }

    fn slk_touch(&mut self) -> Status {
        if self.state.borrow().slk_format.is_some() { OK } else { ERR }
    }

    fn slk_noutrefresh(&mut self) -> Status {
        if self.state.borrow().slk_format.is_some() { OK } else { ERR }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::curses::{KEY_DOWN, KEY_UP};

    fn menu_with(lib: &mut MemoryCurses, names: &[&str]) -> (RawHandle, Vec<RawHandle>) {
        let items: Vec<RawHandle> = names
            .iter()
            .map(|n| lib.new_item(n, "").expect("item"))
            .collect();
        let mut array: HandleArray = items.iter().copied().map(Some).collect();
        array.push(None);
        let menu = lib.new_menu(array).expect("menu");
        (menu, items)
    }

    #[test]
    fn menu_driver_moves_and_denies_at_edges() {
        let mut lib = MemoryCurses::default();
        let (menu, items) = menu_with(&mut lib, &["one", "two"]);
        assert_eq!(lib.menu_driver(menu, MenuRequest::DownItem.code()), E_NOT_POSTED);
        assert_eq!(lib.post_menu(menu), E_OK);

        assert_eq!(lib.menu_driver(menu, MenuRequest::DownItem.code()), E_OK);
        assert_eq!(lib.current_item(menu), Some(items[1]));
        assert_eq!(lib.menu_driver(menu, MenuRequest::DownItem.code()), E_REQUEST_DENIED);
        assert_eq!(lib.menu_driver(menu, KEY_UP), E_UNKNOWN_COMMAND);
    }

    #[test]
    fn menu_pattern_matching_reports_no_match() {
        let mut lib = MemoryCurses::default();
        let (menu, items) = menu_with(&mut lib, &["apple", "banana", "cherry"]);
        lib.post_menu(menu);

        assert_eq!(lib.menu_driver(menu, 'b' as i32), E_OK);
        assert_eq!(lib.current_item(menu), Some(items[1]));
        assert_eq!(lib.menu_pattern(menu).as_deref(), Some("b"));
        assert_eq!(lib.menu_driver(menu, 'z' as i32), E_NO_MATCH);
        assert_eq!(lib.menu_pattern(menu).as_deref(), Some("b"));
    }

    #[test]
    fn connected_items_cannot_join_second_menu_or_be_freed() {
        let mut lib = MemoryCurses::default();
        let (_menu, items) = menu_with(&mut lib, &["solo"]);

        assert_eq!(lib.new_menu(vec![Some(items[0]), None]), None);
        assert_eq!(lib.free_item(items[0]), E_CONNECTED);
    }

    #[test]
    fn item_arrays_must_carry_the_sentinel() {
        let mut lib = MemoryCurses::default();
        let item = lib.new_item("x", "").expect("item");
        assert_eq!(lib.new_menu(vec![Some(item)]), None);
    }

    #[test]
    fn delwin_refuses_parent_with_live_subwindow() {
        let mut lib = MemoryCurses::default();
        let parent = lib.newwin(10, 10, 0, 0).expect("parent");
        let child = lib.derwin(parent, 2, 2, 1, 1).expect("child");
        assert_eq!(lib.delwin(parent), ERR);
        assert_eq!(lib.delwin(child), OK);
        assert_eq!(lib.delwin(parent), OK);
    }

    #[test]
    fn integer_field_rejects_letters_and_out_of_range_values() {
        let mut lib = MemoryCurses::default();
        let age = lib.new_field(1, 4, 0, 0).expect("field");
        let other = lib.new_field(1, 4, 1, 0).expect("field");
        lib.set_field_type(
            age,
            Some(FieldType::Integer {
                precision: 0,
                min: 1,
                max: 120,
            }),
        );
        let form = lib.new_form(vec![Some(age), Some(other), None]).expect("form");
        lib.post_form(form);

        assert_eq!(lib.form_driver(form, 'x' as i32), E_INVALID_FIELD);
        assert_eq!(lib.form_driver(form, '9' as i32), E_OK);
        assert_eq!(lib.form_driver(form, '9' as i32), E_OK);
        assert_eq!(lib.form_driver(form, '9' as i32), E_OK);
        assert_eq!(
            lib.form_driver(form, FormRequest::NextField.code()),
            E_INVALID_FIELD
        );
        assert_eq!(lib.form_driver(form, FormRequest::DeletePrev.code()), E_OK);
        assert_eq!(lib.form_driver(form, FormRequest::NextField.code()), E_OK);
        assert_eq!(lib.current_field(form), Some(other));
        assert_eq!(lib.field_buffer(age).as_deref(), Some("99"));
    }

    #[test]
    fn hooks_fire_only_when_installed() {
        let mut lib = MemoryCurses::default();
        let (menu, items) = menu_with(&mut lib, &["a", "b"]);
        lib.post_menu(menu);
        lib.menu_driver(menu, KEY_DOWN);
        assert!(lib.drain_hook_events().is_empty());

        lib.set_hook(menu, HookKind::ChildInit, true);
        lib.menu_driver(menu, MenuRequest::DownItem.code());
        assert_eq!(
            lib.drain_hook_events(),
            vec![HookEvent {
                kind: HookKind::ChildInit,
                handle: menu,
                child: Some(items[1]),
            }]
        );
    }

    #[test]
    fn freeing_a_menu_drops_its_queued_hook_events() {
        let mut lib = MemoryCurses::default();
        let (menu, items) = menu_with(&mut lib, &["a", "b"]);
        lib.set_hook(menu, HookKind::ChildTerm, true);
        lib.post_menu(menu);
        lib.menu_driver(menu, MenuRequest::DownItem.code());

        lib.unpost_menu(menu);
        lib.free_menu(menu);
        for item in items {
            lib.free_item(item);
        }

        assert!(lib.drain_hook_events().is_empty());
    }

    #[test]
    fn slk_row_can_only_be_reserved_before_initscr() {
        let mut lib = MemoryCurses::default();
        assert_eq!(lib.slk_init(0), OK);
        lib.initscr().expect("stdscr");
        assert_eq!(lib.slk_init(0), ERR);
    }

    #[test]
    fn slk_writes_are_logged_in_order() {
        let mut lib = MemoryCurses::default();
        let probe = lib.probe();
        lib.slk_init(0);
        lib.initscr().expect("stdscr");

        lib.slk_set(1, "", 0);
        lib.slk_set(1, "Help", 0);

        assert_eq!(
            probe.take_slk_writes(),
            vec![(1, String::new()), (1, "Help".to_string())]
        );
        assert!(probe.take_slk_writes().is_empty());
    }

    struct Weekday;

    impl UserFieldType for Weekday {
        fn field_check(&self, value: &str) -> bool {
            DAYS.contains(&value)
        }
        fn char_check(&self, ch: char) -> bool {
            ch.is_ascii_alphabetic()
        }
        fn next_choice(&self, value: &str) -> Option<String> {
            let position = DAYS.iter().position(|day| *day == value)?;
            DAYS.get(position + 1).map(|day| day.to_string())
        }
        fn previous_choice(&self, value: &str) -> Option<String> {
            let position = DAYS.iter().position(|day| *day == value)?;
            position.checked_sub(1).map(|p| DAYS[p].to_string())
        }
    }

    const DAYS: [&str; 3] = ["mon", "tue", "wed"];

    #[test]
    fn user_defined_type_checks_and_steps_through_choices() {
        let mut lib = MemoryCurses::default();
        let day = lib.new_field(1, 3, 0, 0).expect("field");
        lib.set_field_type(day, Some(FieldType::Custom(Rc::new(Weekday))));
        let form = lib.new_form(vec![Some(day), None]).expect("form");
        lib.post_form(form);

        assert_eq!(lib.form_driver(form, '1' as i32), E_INVALID_FIELD);
        lib.set_field_buffer(day, "mon");
        assert_eq!(lib.form_driver(form, FormRequest::PrevChoice.code()), E_REQUEST_DENIED);
        assert_eq!(lib.form_driver(form, FormRequest::NextChoice.code()), E_OK);
        assert_eq!(lib.field_buffer(day).as_deref(), Some("tue"));
        assert_eq!(lib.form_driver(form, FormRequest::Validation.code()), E_OK);

        lib.set_field_buffer(day, "sun");
        assert_eq!(
            lib.form_driver(form, FormRequest::Validation.code()),
            E_INVALID_FIELD
        );
    }

    #[test]
    fn malformed_regexp_is_a_bad_argument() {
        let mut lib = MemoryCurses::default();
        let field = lib.new_field(1, 8, 0, 0).expect("field");
        assert_eq!(
            lib.set_field_type(field, Some(FieldType::Regexp("(unclosed".into()))),
            E_BAD_ARGUMENT
        );
        assert_eq!(
            lib.set_field_type(field, Some(FieldType::Regexp("^[a-z]+$".into()))),
            E_OK
        );
    }

    #[test]
    fn scripted_input_runs_dry_with_err() {
        let mut lib = MemoryCurses::default();
        let probe = lib.probe();
        let screen = lib.initscr().expect("stdscr");
        probe.push_keys(&[KEY_DOWN]);
        assert_eq!(lib.wgetch(screen), KEY_DOWN);
        assert_eq!(lib.wgetch(screen), ERR);
    }
}
