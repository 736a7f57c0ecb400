/*
 * Input dispatch for menus and forms. A run loop blocks for one keystroke,
 * virtualizes it through the handler, executes the resulting request against
 * the library driver and reacts to the status the driver returns. Nothing is
 * carried from one keystroke to the next; the only state is whether a loop is
 * currently running.
 *
 * Rejections the user can cause (request denied, invalid selection, no match,
 * unknown command) go to overridable handler methods which beep by default.
 * Any other status ends the loop with an error. Hook notifications the library
 * produced during a driver call are resolved through the identity registry and
 * delivered to `on_hook` after the call returns.
 */

use crate::app::Session;
use crate::curses::{
    E_INVALID_FIELD, E_NO_MATCH, E_NOT_SELECTABLE, E_OK, E_REQUEST_DENIED, E_UNKNOWN_COMMAND,
    ERR, HookKind, MenuOptions, RawHandle, Status,
};
use crate::error::{BindingError, Result, check};
use crate::keys::{self, FormRequest, Request};
use crate::types::{ActionResult, FieldId, FormId, ItemId, MenuId, PanelId, Wrapper};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DispatchState {
    #[default]
    Idle,
    Dispatching,
}

/// How a driver status is handled by the loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    Accepted,
    RequestDenied,
    InvalidSelection,
    NoMatch,
    UnknownCommand,
}

/// A library hook notification, resolved to wrappers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hook {
    MenuInit(MenuId),
    MenuTerm(MenuId),
    ItemInit { menu: MenuId, item: Option<ItemId> },
    ItemTerm { menu: MenuId, item: Option<ItemId> },
    FormInit(FormId),
    FormTerm(FormId),
    FieldInit { form: FormId, field: Option<FieldId> },
    FieldTerm { form: FormId, field: Option<FieldId> },
}

/// Menu status vocabulary. Statuses outside it are errors.
pub fn classify_menu_status(status: Status, context: &str) -> Result<DispatchOutcome> {
    match status {
        E_OK => Ok(DispatchOutcome::Accepted),
        E_REQUEST_DENIED => Ok(DispatchOutcome::RequestDenied),
        E_NOT_SELECTABLE => Ok(DispatchOutcome::InvalidSelection),
        E_NO_MATCH => Ok(DispatchOutcome::NoMatch),
        E_UNKNOWN_COMMAND => Ok(DispatchOutcome::UnknownCommand),
        other => check(other, context).map(|()| DispatchOutcome::Accepted),
    }
}

/// Form status vocabulary. Statuses outside it are errors.
pub fn classify_form_status(status: Status, context: &str) -> Result<DispatchOutcome> {
    match status {
        E_OK => Ok(DispatchOutcome::Accepted),
        E_REQUEST_DENIED => Ok(DispatchOutcome::RequestDenied),
        E_INVALID_FIELD => Ok(DispatchOutcome::InvalidSelection),
        E_UNKNOWN_COMMAND => Ok(DispatchOutcome::UnknownCommand),
        other => check(other, context).map(|()| DispatchOutcome::Accepted),
    }
}

pub trait MenuHandler {
    fn virtualize(&mut self, key: i32) -> Request {
        keys::menu_virtualize(key)
    }

    fn on_request_denied(&mut self, session: &mut Session, _key: i32) {
        session.beep();
    }

    fn on_invalid_selection(&mut self, session: &mut Session, _key: i32) {
        session.beep();
    }

    fn on_no_match(&mut self, session: &mut Session, _key: i32) {
        session.beep();
    }

    fn on_unknown_command(&mut self, session: &mut Session, _key: i32) {
        session.beep();
    }

    fn on_hook(&mut self, _session: &mut Session, _hook: Hook) {}
}

pub trait FormHandler {
    fn virtualize(&mut self, key: i32) -> Request {
        keys::form_virtualize(key)
    }

    fn on_request_denied(&mut self, session: &mut Session, _key: i32) {
        session.beep();
    }

    fn on_invalid_selection(&mut self, session: &mut Session, _key: i32) {
        session.beep();
    }

    fn on_unknown_command(&mut self, session: &mut Session, _key: i32) {
        session.beep();
    }

    fn on_hook(&mut self, _session: &mut Session, _hook: Hook) {}
}

/// Handler with every default: default key map, beep on rejection.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultHandler;

impl MenuHandler for DefaultHandler {}
impl FormHandler for DefaultHandler {}

fn route_menu_outcome(
    handler: &mut dyn MenuHandler,
    session: &mut Session,
    outcome: DispatchOutcome,
    key: i32,
) {
    match outcome {
        DispatchOutcome::Accepted => {}
        DispatchOutcome::RequestDenied => handler.on_request_denied(session, key),
        DispatchOutcome::InvalidSelection => handler.on_invalid_selection(session, key),
        DispatchOutcome::NoMatch => handler.on_no_match(session, key),
        DispatchOutcome::UnknownCommand => handler.on_unknown_command(session, key),
    }
}

fn route_form_outcome(
    handler: &mut dyn FormHandler,
    session: &mut Session,
    outcome: DispatchOutcome,
    key: i32,
) {
    match outcome {
        DispatchOutcome::Accepted => {}
        DispatchOutcome::RequestDenied => handler.on_request_denied(session, key),
        DispatchOutcome::InvalidSelection => handler.on_invalid_selection(session, key),
        // Forms have no pattern buffer; treat a stray no-match like an unknown request.
        DispatchOutcome::NoMatch | DispatchOutcome::UnknownCommand => {
            handler.on_unknown_command(session, key)
        }
    }
}

impl Session {
    fn begin_dispatch(&mut self) -> Result<()> {
        if self.dispatch_state == DispatchState::Dispatching {
            log::warn!("Dispatch: a run loop is already active");
            return Err(BindingError::BadState(
                "a dispatch loop is already running".to_string(),
            ));
        }
        self.dispatch_state = DispatchState::Dispatching;
        Ok(())
    }

    /*
     * Converts the library's pending hook notifications into `Hook` values.
     * Child notifications carry the child that was current when the hook ran.
     */
    fn drain_hooks(&mut self) -> Vec<Hook> {
        let mut events = std::mem::take(&mut self.pending_hooks);
        events.extend(self.library.drain_hook_events());
        events
            .into_iter()
            .filter_map(|event| match self.resolve_handle(event.handle) {
                Wrapper::Menu(menu) => {
                    let item = event.child.map(|raw| self.resolve_item(raw));
                    Some(match event.kind {
                        HookKind::ContainerInit => Hook::MenuInit(menu),
                        HookKind::ContainerTerm => Hook::MenuTerm(menu),
                        HookKind::ChildInit => Hook::ItemInit { menu, item },
                        HookKind::ChildTerm => Hook::ItemTerm { menu, item },
                    })
                }
                Wrapper::Form(form) => {
                    let field = event.child.map(|raw| self.resolve_field(raw));
                    Some(match event.kind {
                        HookKind::ContainerInit => Hook::FormInit(form),
                        HookKind::ContainerTerm => Hook::FormTerm(form),
                        HookKind::ChildInit => Hook::FieldInit { form, field },
                        HookKind::ChildTerm => Hook::FieldTerm { form, field },
                    })
                }
                other => {
                    log::warn!("Dispatch: hook event on non-container {other:?} ignored");
                    None
                }
            })
            .collect()
    }

    fn deliver_menu_hooks(&mut self, handler: &mut dyn MenuHandler) {
        for hook in self.drain_hooks() {
            log::trace!("Dispatch: delivering {hook:?}");
            handler.on_hook(self, hook);
        }
    }

    fn deliver_form_hooks(&mut self, handler: &mut dyn FormHandler) {
        for hook in self.drain_hooks() {
            log::trace!("Dispatch: delivering {hook:?}");
            handler.on_hook(self, hook);
        }
    }

    fn read_key(&mut self, panel: PanelId) -> Result<i32> {
        let window = self.panel_content_window(panel)?;
        let handle = self.window_handle(window)?;
        let key = self.library.wgetch(handle);
        if key == ERR {
            log::debug!("Dispatch: key read returned ERR");
            return Err(BindingError::NoInput(
                "key read timed out or input is exhausted".to_string(),
            ));
        }
        Ok(key)
    }

    fn finish_dispatch<T>(&mut self, result: Result<T>, teardown: Result<()>) -> Result<T> {
        self.dispatch_state = DispatchState::Idle;
        match (result, teardown) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(err)) => Err(err),
            (Err(err), teardown) => {
                if let Err(teardown_err) = teardown {
                    log::warn!("Dispatch: teardown after error also failed: {teardown_err}");
                }
                Err(err)
            }
        }
    }

    // ── Menus ────────────────────────────────────────────────────────────────

    /*
     * Runs the menu until an item action or `Quit` ends it. One-value menus
     * return the item that is current at that point; multi-valued menus return
     * `None` and leave the selection readable through `selected_items`.
     */
    pub fn run_menu(
        &mut self,
        menu: MenuId,
        handler: &mut dyn MenuHandler,
    ) -> Result<Option<ItemId>> {
        self.begin_dispatch()?;
        log::debug!("Dispatch: entering menu loop for {menu:?}");
        let result = self
            .open_menu(menu, handler)
            .and_then(|()| self.menu_loop(menu, handler));
        let teardown = self.close_menu(menu, handler);
        log::debug!("Dispatch: leaving menu loop for {menu:?}");
        self.finish_dispatch(result, teardown)
    }

    fn open_menu(&mut self, menu: MenuId, handler: &mut dyn MenuHandler) -> Result<()> {
        let panel = self.menu_panel(menu)?;
        self.post_menu(menu)?;
        self.deliver_menu_hooks(handler);
        self.show_panel(panel)?;
        self.redraw_all()
    }

    fn close_menu(&mut self, menu: MenuId, handler: &mut dyn MenuHandler) -> Result<()> {
        let panel = self.menu_panel(menu)?;
        if self.menu_data(menu)?.posted {
            self.unpost_menu(menu)?;
            self.deliver_menu_hooks(handler);
        }
        self.hide_panel(panel)?;
        self.redraw_all()
    }

    fn menu_result(&self, menu: MenuId) -> Result<Option<ItemId>> {
        if self.menu_options(menu)?.contains(MenuOptions::ONEVALUE) {
            self.current_item(menu)
        } else {
            Ok(None)
        }
    }

    fn menu_loop(&mut self, menu: MenuId, handler: &mut dyn MenuHandler) -> Result<Option<ItemId>> {
        let panel = self.menu_panel(menu)?;
        loop {
            let key = self.read_key(panel)?;
            let request = handler.virtualize(key);
            log::trace!("Dispatch: menu {menu:?} key {key} -> {request:?}");
            match request {
                Request::Quit => return self.menu_result(menu),
                Request::Action => {
                    if self.activate_menu(menu, handler, key)? == ActionResult::Exit {
                        return self.menu_result(menu);
                    }
                }
                Request::Driver(code) => {
                    let handle = self.menu_data(menu)?.handle;
                    let status = self.library.menu_driver(handle, code);
                    self.deliver_menu_hooks(handler);
                    let outcome = classify_menu_status(status, &format!("menu_driver {code}"))?;
                    route_menu_outcome(handler, self, outcome, key);
                }
            }
            self.redraw_all()?;
        }
    }

    fn activate_menu(
        &mut self,
        menu: MenuId,
        handler: &mut dyn MenuHandler,
        key: i32,
    ) -> Result<ActionResult> {
        if self.menu_options(menu)?.contains(MenuOptions::ONEVALUE) {
            let Some(item) = self.current_item(menu)? else {
                handler.on_request_denied(self, key);
                return Ok(ActionResult::Continue);
            };
            if !self.item_selectable(item)? {
                handler.on_invalid_selection(self, key);
                return Ok(ActionResult::Continue);
            }
            return self.run_item_action(item);
        }

        /* An empty selection is not an error; the loop just goes on. */
        let selected = self.selected_items(menu)?;
        let mut result = ActionResult::Continue;
        for item in selected {
            if self.run_item_action(item)? == ActionResult::Exit {
                result = ActionResult::Exit;
            }
        }
        Ok(result)
    }

    // ── Forms ────────────────────────────────────────────────────────────────

    /// Runs the form until a field action or `Quit` ends it; returns the current field.
    pub fn run_form(&mut self, form: FormId, handler: &mut dyn FormHandler) -> Result<FieldId> {
        self.begin_dispatch()?;
        log::debug!("Dispatch: entering form loop for {form:?}");
        let result = self
            .open_form(form, handler)
            .and_then(|()| self.form_loop(form, handler));
        let teardown = self.close_form(form, handler);
        log::debug!("Dispatch: leaving form loop for {form:?}");
        self.finish_dispatch(result, teardown)
    }

    fn open_form(&mut self, form: FormId, handler: &mut dyn FormHandler) -> Result<()> {
        let panel = self.form_panel(form)?;
        self.post_form(form)?;
        self.deliver_form_hooks(handler);
        self.show_panel(panel)?;
        self.redraw_all()
    }

    fn close_form(&mut self, form: FormId, handler: &mut dyn FormHandler) -> Result<()> {
        let panel = self.form_panel(form)?;
        if self.form_data(form)?.posted {
            self.unpost_form(form)?;
            self.deliver_form_hooks(handler);
        }
        self.hide_panel(panel)?;
        self.redraw_all()
    }

    fn form_result(&self, form: FormId) -> Result<FieldId> {
        self.current_field(form)?.ok_or_else(|| {
            BindingError::NotConnected(format!("form {form:?} has no current field"))
        })
    }

    fn drive_form(
        &mut self,
        form: FormId,
        handler: &mut dyn FormHandler,
        code: i32,
    ) -> Result<DispatchOutcome> {
        let handle: RawHandle = self.form_data(form)?.handle;
        let status = self.library.form_driver(handle, code);
        self.deliver_form_hooks(handler);
        classify_form_status(status, &format!("form_driver {code}"))
    }

    fn form_loop(&mut self, form: FormId, handler: &mut dyn FormHandler) -> Result<FieldId> {
        let panel = self.form_panel(form)?;
        loop {
            let key = self.read_key(panel)?;
            let request = handler.virtualize(key);
            log::trace!("Dispatch: form {form:?} key {key} -> {request:?}");
            match request {
                Request::Quit => return self.form_result(form),
                Request::Action => {
                    if self.activate_form(form, handler, key)? == ActionResult::Exit {
                        return self.form_result(form);
                    }
                }
                Request::Driver(code) => {
                    let outcome = self.drive_form(form, handler, code)?;
                    route_form_outcome(handler, self, outcome, key);
                }
            }
            self.redraw_all()?;
        }
    }

    /*
     * Validates the current field, then runs its action. A field that asks to
     * continue hands focus to the next field.
     */
    fn activate_form(
        &mut self,
        form: FormId,
        handler: &mut dyn FormHandler,
        key: i32,
    ) -> Result<ActionResult> {
        let outcome = self.drive_form(form, handler, FormRequest::Validation.code())?;
        if outcome != DispatchOutcome::Accepted {
            route_form_outcome(handler, self, outcome, key);
            return Ok(ActionResult::Continue);
        }
        let field = self.form_result(form)?;
        let result = self.run_field_action(field)?;
        if result == ActionResult::Continue {
            let outcome = self.drive_form(form, handler, FormRequest::NextField.code())?;
            route_form_outcome(handler, self, outcome, key);
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{FieldConfig, FormConfig, MenuConfig, SessionConfig};
    use crate::curses::{FieldType, KEY_DOWN, KEY_UP, ctrl};
    use crate::curses_memory::{MemoryCurses, MemoryProbe};

    fn session() -> (Session, MemoryProbe) {
        let lib = MemoryCurses::new(24, 80);
        let probe = lib.probe();
        (
            Session::new(lib, SessionConfig::default()).expect("session"),
            probe,
        )
    }

    fn menu(session: &mut Session, names: &[&str], options: MenuOptions) -> (MenuId, Vec<ItemId>) {
        let items: Vec<ItemId> = names
            .iter()
            .map(|name| session.create_item(name, "").expect("item"))
            .collect();
        let menu = session
            .create_menu(
                &items,
                MenuConfig {
                    options,
                    ..MenuConfig::default()
                },
            )
            .expect("menu");
        (menu, items)
    }

    #[derive(Default)]
    struct Recorder {
        denied: usize,
        no_match: usize,
        unknown: usize,
        invalid: usize,
        hooks: Vec<Hook>,
    }

    impl MenuHandler for Recorder {
        fn on_request_denied(&mut self, _session: &mut Session, _key: i32) {
            self.denied += 1;
        }
        fn on_no_match(&mut self, _session: &mut Session, _key: i32) {
            self.no_match += 1;
        }
        fn on_unknown_command(&mut self, _session: &mut Session, _key: i32) {
            self.unknown += 1;
        }
        fn on_invalid_selection(&mut self, _session: &mut Session, _key: i32) {
            self.invalid += 1;
        }
        fn on_hook(&mut self, _session: &mut Session, hook: Hook) {
            self.hooks.push(hook);
        }
    }

    impl FormHandler for Recorder {
        fn on_request_denied(&mut self, _session: &mut Session, _key: i32) {
            self.denied += 1;
        }
        fn on_invalid_selection(&mut self, _session: &mut Session, _key: i32) {
            self.invalid += 1;
        }
        fn on_unknown_command(&mut self, _session: &mut Session, _key: i32) {
            self.unknown += 1;
        }
    }

    #[test]
    fn classification_maps_each_vocabulary() {
        assert_eq!(
            classify_menu_status(E_NO_MATCH, "t"),
            Ok(DispatchOutcome::NoMatch)
        );
        assert_eq!(
            classify_form_status(E_INVALID_FIELD, "t"),
            Ok(DispatchOutcome::InvalidSelection)
        );
        assert!(matches!(
            classify_menu_status(crate::curses::E_NOT_POSTED, "t"),
            Err(BindingError::NotPosted(_))
        ));
        assert!(matches!(
            classify_form_status(E_NOT_SELECTABLE, "t"),
            Err(BindingError::InvalidSelection(_))
        ));
    }

    #[test]
    fn default_handler_beeps_on_rejections() {
        // Arrange
        let (mut session, probe) = session();
        let (menu, items) = menu(&mut session, &["one", "two"], MenuOptions::default());
        probe.push_keys(&[KEY_UP, 'z' as i32, KEY_DOWN, '\n' as i32]);

        // Act
        let chosen = session
            .run_menu(menu, &mut DefaultHandler)
            .expect("run");

        // Assert
        assert_eq!(chosen, Some(items[1]));
        assert_eq!(probe.beeps(), 2);
        assert_eq!(session.dispatch_state(), DispatchState::Idle);
    }

    #[test]
    fn override_points_receive_each_rejection() {
        let (mut session, probe) = session();
        let (menu, _items) = menu(&mut session, &["apple", "berry"], MenuOptions::default());
        let mut recorder = Recorder::default();
        probe.push_keys(&[KEY_UP, 'q' as i32, 0x1ff, ctrl(b'x')]);

        session.run_menu(menu, &mut recorder).expect("run");

        assert_eq!(recorder.denied, 1);
        assert_eq!(recorder.no_match, 1);
        assert_eq!(recorder.unknown, 1);
        assert_eq!(probe.beeps(), 0);
    }

    #[test]
    fn pattern_typing_moves_to_matching_item() {
        let (mut session, probe) = session();
        let (menu, items) = menu(
            &mut session,
            &["alpha", "beta", "bravo"],
            MenuOptions::default(),
        );
        probe.push_str("br\n");

        let chosen = session.run_menu(menu, &mut DefaultHandler).expect("run");

        assert_eq!(chosen, Some(items[2]));
    }

    #[test]
    fn custom_virtualize_controls_termination() {
        struct QuitOnQ;
        impl MenuHandler for QuitOnQ {
            fn virtualize(&mut self, key: i32) -> Request {
                if key == 'q' as i32 {
                    Request::Quit
                } else {
                    keys::menu_virtualize(key)
                }
            }
        }
        let (mut session, probe) = session();
        let (menu, items) = menu(&mut session, &["a", "b", "c"], MenuOptions::default());
        probe.push_keys(&[KEY_DOWN, 'q' as i32, KEY_DOWN]);

        let chosen = session.run_menu(menu, &mut QuitOnQ).expect("run");

        assert_eq!(chosen, Some(items[1]));
        assert_eq!(probe.pending_keys(), 1);
    }

    #[test]
    fn exhausted_input_ends_with_no_input_and_cleans_up() {
        let (mut session, probe) = session();
        let (menu, _items) = menu(&mut session, &["a"], MenuOptions::default());
        let handle = session.handle_of(menu).expect("handle");

        let result = session.run_menu(menu, &mut DefaultHandler);

        assert!(matches!(result, Err(BindingError::NoInput(_))));
        assert!(!probe.menu_is_posted(handle));
        assert!(session
            .panel_hidden(session.menu_panel(menu).expect("panel"))
            .expect("hidden"));
        assert_eq!(session.dispatch_state(), DispatchState::Idle);
    }

    #[test]
    fn item_action_can_keep_the_loop_running() {
        let (mut session, probe) = session();
        let (menu, items) = menu(&mut session, &["stay", "leave"], MenuOptions::default());
        session
            .set_item_action(items[0], |session, _item| {
                session.beep();
                ActionResult::Continue
            })
            .expect("action");
        probe.push_keys(&['\n' as i32, KEY_DOWN, '\n' as i32]);

        let chosen = session.run_menu(menu, &mut DefaultHandler).expect("run");

        assert_eq!(chosen, Some(items[1]));
        assert_eq!(probe.beeps(), 1);
    }

    #[test]
    fn non_selectable_item_routes_to_invalid_selection() {
        let (mut session, probe) = session();
        let (menu, items) = menu(&mut session, &["locked", "open"], MenuOptions::default());
        session.set_item_selectable(items[0], false).expect("lock");
        let mut recorder = Recorder::default();
        probe.push_keys(&['\n' as i32, ctrl(b'x')]);

        session.run_menu(menu, &mut recorder).expect("run");

        assert_eq!(recorder.invalid, 1);
    }

    #[test]
    fn multi_valued_menu_runs_selected_actions_and_returns_none() {
        let (mut session, probe) = session();
        let (menu, items) = menu(
            &mut session,
            &["a", "b", "c"],
            MenuOptions::default() - MenuOptions::ONEVALUE,
        );
        for item in &items {
            session
                .set_item_action(*item, |session, item| {
                    session
                        .set_user_data(item, true)
                        .expect("mark as run");
                    ActionResult::Exit
                })
                .expect("action");
        }
        probe.push_keys(&[ctrl(b't'), KEY_DOWN, KEY_DOWN, ctrl(b't'), '\n' as i32]);

        let chosen = session.run_menu(menu, &mut DefaultHandler).expect("run");

        assert_eq!(chosen, None);
        assert_eq!(session.selected_items(menu).expect("selected"), vec![items[0], items[2]]);
        assert_eq!(session.user_data::<bool>(items[0]).expect("a"), Some(&true));
        assert_eq!(session.user_data::<bool>(items[1]).expect("b"), None);
        assert_eq!(session.user_data::<bool>(items[2]).expect("c"), Some(&true));
    }

    #[test]
    fn multi_valued_action_without_selection_just_continues() {
        let (mut session, probe) = session();
        let (menu, items) = menu(
            &mut session,
            &["a", "b"],
            MenuOptions::default() - MenuOptions::ONEVALUE,
        );
        session
            .set_item_action(items[1], |_, _| ActionResult::Exit)
            .expect("action");
        let mut recorder = Recorder::default();
        probe.push_keys(&['\n' as i32, KEY_DOWN, ctrl(b't'), '\n' as i32]);

        let chosen = session.run_menu(menu, &mut recorder).expect("run");

        assert_eq!(chosen, None);
        assert_eq!(recorder.denied, 0);
        assert_eq!(probe.beeps(), 0);
        assert_eq!(probe.pending_keys(), 0);
    }

    #[test]
    fn hooks_of_a_destroyed_menu_are_never_delivered() {
        // Arrange
        let (mut session, probe) = session();
        let (doomed, _) = menu(&mut session, &["a", "b"], MenuOptions::default());
        session.post_menu(doomed).expect("post");
        session.destroy_menu(doomed).expect("destroy");
        let (other, other_items) = menu(&mut session, &["c"], MenuOptions::default());
        let mut recorder = Recorder::default();
        probe.push_keys(&['\n' as i32]);

        // Act
        let chosen = session.run_menu(other, &mut recorder).expect("run");

        // Assert
        assert_eq!(chosen, Some(other_items[0]));
        assert_eq!(
            recorder.hooks,
            vec![
                Hook::MenuInit(other),
                Hook::ItemInit { menu: other, item: Some(other_items[0]) },
                Hook::ItemTerm { menu: other, item: Some(other_items[0]) },
                Hook::MenuTerm(other),
            ]
        );
    }

    #[test]
    fn hooks_are_resolved_to_wrappers() {
        let (mut session, probe) = session();
        let (menu, items) = menu(&mut session, &["a", "b"], MenuOptions::default());
        let mut recorder = Recorder::default();
        probe.push_keys(&[KEY_DOWN, ctrl(b'x')]);

        session.run_menu(menu, &mut recorder).expect("run");

        assert_eq!(
            recorder.hooks,
            vec![
                Hook::MenuInit(menu),
                Hook::ItemInit { menu, item: Some(items[0]) },
                Hook::ItemTerm { menu, item: Some(items[0]) },
                Hook::ItemInit { menu, item: Some(items[1]) },
                Hook::ItemTerm { menu, item: Some(items[1]) },
                Hook::MenuTerm(menu),
            ]
        );
    }

    #[test]
    fn nested_run_is_refused() {
        let (mut session, probe) = session();
        let (outer, _) = menu(&mut session, &["a"], MenuOptions::default());
        let (inner, inner_items) = menu(&mut session, &["b"], MenuOptions::default());
        let nested = std::rc::Rc::new(std::cell::RefCell::new(None));
        let slot = std::rc::Rc::clone(&nested);
        let outer_item = session.menu_item(outer, 0).expect("item");
        session
            .set_item_action(outer_item, move |session, _| {
                *slot.borrow_mut() = Some(session.run_menu(inner, &mut DefaultHandler));
                ActionResult::Exit
            })
            .expect("action");
        probe.push_keys(&['\n' as i32]);

        session.run_menu(outer, &mut DefaultHandler).expect("outer run");

        assert!(matches!(
            nested.borrow().as_ref(),
            Some(Err(BindingError::BadState(_)))
        ));
        assert_eq!(session.menu_items(inner).expect("items"), inner_items);
    }

    fn form(session: &mut Session) -> (FormId, Vec<FieldId>) {
        let fields: Vec<FieldId> = (0..2)
            .map(|row| {
                session
                    .create_field(FieldConfig::new(1, 6, row, 0))
                    .expect("field")
            })
            .collect();
        let form = session
            .create_form(&fields, FormConfig::default())
            .expect("form");
        (form, fields)
    }

    #[test]
    fn form_loop_edits_fields_and_returns_current() {
        // Arrange
        let (mut session, probe) = session();
        let (form, fields) = form(&mut session);
        session
            .set_field_action(fields[1], |_, _| ActionResult::Exit)
            .expect("action");
        probe.push_str("ab");
        probe.push_keys(&['\n' as i32]);
        probe.push_str("cd\n");

        // Act
        let field = session.run_form(form, &mut DefaultHandler).expect("run");

        // Assert
        assert_eq!(field, fields[1]);
        assert_eq!(session.field_buffer(fields[0]).expect("first"), "ab");
        assert_eq!(session.field_buffer(fields[1]).expect("second"), "cd");
    }

    #[test]
    fn invalid_field_is_reported_and_focus_stays() {
        let (mut session, probe) = session();
        let (form, fields) = form(&mut session);
        session
            .set_field_type(fields[0], Some(FieldType::Alpha { min_width: 3 }))
            .expect("type");
        let mut recorder = Recorder::default();
        probe.push_str("ab");
        probe.push_keys(&[KEY_DOWN, '1' as i32, '\n' as i32, ctrl(b'x')]);

        let field = session.run_form(form, &mut recorder).expect("run");

        assert_eq!(field, fields[0]);
        assert_eq!(recorder.invalid, 3);
    }
}
