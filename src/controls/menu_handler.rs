/*
 * Menu and item wrappers. A menu rests on its own panel, sized from the
 * library's `scale_menu` after the items are attached, and keeps its items in a
 * `ChildCollection`. The binding tracks which menu each item belongs to so an
 * item that is still connected is refused before its hook is touched.
 *
 * Teardown order follows the library's rules: the menu is unposted and freed
 * first, which disconnects its items, and only then are owned items freed.
 */

use crate::app::Session;
use crate::config::{MenuConfig, PanelConfig, WindowConfig};
use crate::controls::collection::ChildCollection;
use crate::curses::{HookKind, ItemOptions, MenuOptions, OK, RawHandle};
use crate::error::{BindingError, Result, check};
use crate::types::{ActionResult, ItemId, MenuId, PanelId};

/// Runs when the dispatch loop activates an item.
pub type ItemAction = Box<dyn FnMut(&mut Session, ItemId) -> ActionResult>;

pub(crate) struct ItemData {
    pub(crate) handle: RawHandle,
    menu: Option<MenuId>,
    action: Option<ItemAction>,
}

#[derive(Debug)]
pub(crate) struct MenuData {
    pub(crate) handle: RawHandle,
    pub(crate) panel: PanelId,
    items: ChildCollection<ItemId>,
    pub(crate) posted: bool,
}

pub(crate) const HOOK_KINDS: [HookKind; 4] = [
    HookKind::ContainerInit,
    HookKind::ContainerTerm,
    HookKind::ChildInit,
    HookKind::ChildTerm,
];

impl Session {
    pub(crate) fn item_data(&self, id: ItemId) -> Result<&ItemData> {
        self.items.get(&id).ok_or_else(|| {
            log::warn!("MenuHandler: item {id:?} not found");
            BindingError::InvalidHandle(format!("item {id:?} not found"))
        })
    }

    pub(crate) fn menu_data(&self, id: MenuId) -> Result<&MenuData> {
        self.menus.get(&id).ok_or_else(|| {
            log::warn!("MenuHandler: menu {id:?} not found");
            BindingError::InvalidHandle(format!("menu {id:?} not found"))
        })
    }

    // ── Items ────────────────────────────────────────────────────────────────

    pub fn create_item(&mut self, name: &str, description: &str) -> Result<ItemId> {
        let handle = self.library.new_item(name, description).ok_or_else(|| {
            log::warn!("MenuHandler: new_item rejected {name:?}");
            BindingError::BadArgument(format!("new_item returned NULL for {name:?}"))
        })?;
        let id = ItemId(self.allocate_id());
        if let Err(err) = self.attach_hook(handle, id) {
            if self.library.free_item(handle) != OK {
                log::warn!("MenuHandler: free_item failed while rolling back {id:?}");
            }
            return Err(err);
        }
        self.items.insert(
            id,
            ItemData {
                handle,
                menu: None,
                action: None,
            },
        );
        log::debug!("MenuHandler: created item {id:?} ({name:?})");
        Ok(id)
    }

    /// Items still attached to a menu are refused with `Connected`.
    pub fn destroy_item(&mut self, id: ItemId) -> Result<()> {
        let data = self.item_data(id)?;
        if let Some(menu) = data.menu {
            log::warn!("MenuHandler: item {id:?} is still attached to {menu:?}");
            return Err(BindingError::Connected(format!(
                "item {id:?} belongs to menu {menu:?}"
            )));
        }
        let handle = data.handle;
        self.detach_hook(handle);
        self.items.remove(&id);
        check(self.library.free_item(handle), format!("free_item {id:?}"))?;
        log::debug!("MenuHandler: destroyed item {id:?}");
        Ok(())
    }

    pub fn item_name(&self, id: ItemId) -> Result<String> {
        let handle = self.item_data(id)?.handle;
        self.library
            .item_name(handle)
            .ok_or_else(|| BindingError::SystemError(format!("item_name {id:?}")))
    }

    pub fn item_description(&self, id: ItemId) -> Result<String> {
        let handle = self.item_data(id)?.handle;
        self.library
            .item_description(handle)
            .ok_or_else(|| BindingError::SystemError(format!("item_description {id:?}")))
    }

    pub fn item_value(&self, id: ItemId) -> Result<bool> {
        let handle = self.item_data(id)?.handle;
        Ok(self.library.item_value(handle))
    }

    /// Selects or deselects an item of a multi-valued menu.
    pub fn set_item_value(&mut self, id: ItemId, value: bool) -> Result<()> {
        let handle = self.item_data(id)?.handle;
        check(
            self.library.set_item_value(handle, value),
            format!("set_item_value {id:?}"),
        )
    }

    pub fn item_selectable(&self, id: ItemId) -> Result<bool> {
        let handle = self.item_data(id)?.handle;
        Ok(self.library.item_opts(handle).contains(ItemOptions::SELECTABLE))
    }

    pub fn set_item_selectable(&mut self, id: ItemId, selectable: bool) -> Result<()> {
        let handle = self.item_data(id)?.handle;
        let mut opts = self.library.item_opts(handle);
        opts.set(ItemOptions::SELECTABLE, selectable);
        check(
            self.library.set_item_opts(handle, opts),
            format!("set_item_opts {id:?}"),
        )
    }

    /// Replaces the item's action. Items without an action end the menu loop.
    pub fn set_item_action(
        &mut self,
        id: ItemId,
        action: impl FnMut(&mut Session, ItemId) -> ActionResult + 'static,
    ) -> Result<()> {
        let data = self.items.get_mut(&id).ok_or_else(|| {
            BindingError::InvalidHandle(format!("item {id:?} not found"))
        })?;
        data.action = Some(Box::new(action));
        Ok(())
    }

    /*
     * Runs the item's action with the action temporarily taken out of the
     * table, so the action itself may use the session freely.
     */
    pub(crate) fn run_item_action(&mut self, id: ItemId) -> Result<ActionResult> {
        let taken = self
            .items
            .get_mut(&id)
            .ok_or_else(|| BindingError::InvalidHandle(format!("item {id:?} not found")))?
            .action
            .take();
        let Some(mut action) = taken else {
            return Ok(ActionResult::Exit);
        };
        let result = action(self, id);
        if let Some(data) = self.items.get_mut(&id)
            && data.action.is_none()
        {
            data.action = Some(action);
        }
        Ok(result)
    }

    fn item_pairs(&self, items: &[ItemId]) -> Result<Vec<(ItemId, RawHandle)>> {
        items
            .iter()
            .map(|id| self.item_data(*id).map(|data| (*id, data.handle)))
            .collect()
    }

    fn claim_items(&mut self, items: &[ItemId], menu: Option<MenuId>) {
        for id in items {
            if let Some(data) = self.items.get_mut(id) {
                data.menu = menu;
            }
        }
    }

    fn verify_menu_sync(&self, id: MenuId) -> Result<()> {
        let data = self.menu_data(id)?;
        let library = self.library.as_ref();
        data.items.verify_sync(
            &format!("menu {id:?}"),
            library.item_count(data.handle),
            |handle| library.item_index(handle),
        );
        Ok(())
    }

    // ── Menus ────────────────────────────────────────────────────────────────

    /*
     * Builds the menu from `items`, configures it, sizes a panel around it and
     * binds the panel's windows. The panel starts hidden; the dispatch loop
     * shows it while it runs.
     */
    pub fn create_menu(&mut self, items: &[ItemId], config: MenuConfig) -> Result<MenuId> {
        let collection = ChildCollection::new(self.item_pairs(items)?, config.ownership);
        let handle = self
            .library
            .new_menu(collection.sentinel_array())
            .ok_or_else(|| {
                log::warn!("MenuHandler: new_menu rejected the item array {items:?}");
                BindingError::Connected(format!(
                    "new_menu refused items {items:?} (already attached or invalid)"
                ))
            })?;

        let panel = match self.configure_menu(handle, collection.len(), &config) {
            Ok(panel) => panel,
            Err(err) => {
                if self.library.free_menu(handle) != OK {
                    log::warn!("MenuHandler: free_menu failed while rolling back");
                }
                return Err(err);
            }
        };

        let id = MenuId(self.allocate_id());
        if let Err(err) = self.attach_hook(handle, id) {
            if self.library.free_menu(handle) != OK {
                log::warn!("MenuHandler: free_menu failed while rolling back {id:?}");
            }
            self.destroy_panel(panel)?;
            return Err(err);
        }
        self.claim_items(collection.children(), Some(id));
        self.menus.insert(
            id,
            MenuData {
                handle,
                panel,
                items: collection,
                posted: false,
            },
        );
        self.verify_menu_sync(id)?;
        for kind in HOOK_KINDS {
            check(
                self.library.set_hook(handle, kind, true),
                format!("set_hook {kind:?} on {id:?}"),
            )?;
        }
        log::debug!("MenuHandler: created menu {id:?} with {} item(s)", items.len());
        Ok(id)
    }

    fn configure_menu(&mut self, handle: RawHandle, count: usize, config: &MenuConfig) -> Result<PanelId> {
        check(
            self.library.set_menu_opts(handle, config.options),
            "set_menu_opts",
        )?;
        check(
            self.library.set_menu_mark(handle, &config.mark),
            "set_menu_mark",
        )?;
        let rows = config.rows.unwrap_or(count as i32).max(1);
        check(self.library.set_menu_format(handle, rows, 1), "set_menu_format")?;
        let (lines, cols) = self.library.scale_menu(handle).ok_or_else(|| {
            log::warn!("MenuHandler: scale_menu found no items to size");
            BindingError::NotConnected("scale_menu: menu has no items".to_string())
        })?;

        let panel = self.create_panel(PanelConfig {
            window: WindowConfig::new(lines, cols, config.begin_y, config.begin_x),
            framed: config.framed,
        })?;
        if let Err(err) = self.bind_menu_windows(handle, panel) {
            self.destroy_panel(panel)?;
            return Err(err);
        }
        Ok(panel)
    }

    fn bind_menu_windows(&mut self, handle: RawHandle, panel: PanelId) -> Result<()> {
        let window = self.window_handle(self.panel_window(panel)?)?;
        let content = self.window_handle(self.panel_content_window(panel)?)?;
        check(self.library.set_menu_win(handle, window), "set_menu_win")?;
        check(self.library.set_menu_sub(handle, content), "set_menu_sub")?;
        self.hide_panel(panel)
    }

    /// Frees the menu, then its owned items, then its panel.
    pub fn destroy_menu(&mut self, id: MenuId) -> Result<()> {
        if self.menu_data(id)?.posted {
            self.unpost_menu(id)?;
        }
        let Some(data) = self.menus.remove(&id) else {
            return Err(BindingError::InvalidHandle(format!("menu {id:?} not found")));
        };
        self.detach_hook(data.handle);
        check(self.library.free_menu(data.handle), format!("free_menu {id:?}"))?;
        self.claim_items(data.items.children(), None);
        for item in data.items.owned_children() {
            self.destroy_item(*item)?;
        }
        self.destroy_panel(data.panel)?;
        log::debug!("MenuHandler: destroyed menu {id:?}");
        Ok(())
    }

    /*
     * Swaps in a new item list. A rejected array leaves the previous collection
     * in place; once accepted, owned items missing from the new list are freed.
     */
    pub fn set_menu_items(&mut self, id: MenuId, items: &[ItemId]) -> Result<()> {
        let (handle, ownership) = {
            let data = self.menu_data(id)?;
            (data.handle, data.items.ownership())
        };
        let next = ChildCollection::new(self.item_pairs(items)?, ownership);
        check(
            self.library.set_menu_items(handle, next.sentinel_array()),
            format!("set_menu_items {id:?}"),
        )?;

        let Some(data) = self.menus.get_mut(&id) else {
            return Err(BindingError::InvalidHandle(format!("menu {id:?} not found")));
        };
        let previous = std::mem::replace(&mut data.items, next);
        self.claim_items(previous.children(), None);
        self.claim_items(items, Some(id));
        self.verify_menu_sync(id)?;
        let retired = previous.retired_by(&self.menu_data(id)?.items);
        for retired in retired {
            self.destroy_item(retired)?;
        }
        log::debug!("MenuHandler: menu {id:?} now holds {} item(s)", items.len());
        Ok(())
    }

    pub fn menu_items(&self, id: MenuId) -> Result<Vec<ItemId>> {
        Ok(self.menu_data(id)?.items.children().to_vec())
    }

    pub fn menu_item_count(&self, id: MenuId) -> Result<usize> {
        let handle = self.menu_data(id)?.handle;
        usize::try_from(self.library.item_count(handle))
            .map_err(|_| BindingError::SystemError(format!("item_count {id:?}")))
    }

    /// The item at `index`; indices at or past the library's item count are `BadArgument`.
    pub fn menu_item(&self, id: MenuId, index: usize) -> Result<ItemId> {
        let count = self.menu_item_count(id)?;
        if index >= count {
            return Err(BindingError::BadArgument(format!(
                "item index {index} out of range for {id:?} ({count} items)"
            )));
        }
        self.menu_data(id)?
            .items
            .get(index)
            .ok_or_else(|| BindingError::BadArgument(format!("item index {index} for {id:?}")))
    }

    /// Resolved through the identity hook of the handle the library reports.
    pub fn current_item(&self, id: MenuId) -> Result<Option<ItemId>> {
        let handle = self.menu_data(id)?.handle;
        Ok(self
            .library
            .current_item(handle)
            .map(|raw| self.resolve_item(raw)))
    }

    pub fn set_current_item(&mut self, id: MenuId, item: ItemId) -> Result<()> {
        let handle = self.menu_data(id)?.handle;
        let item_handle = self.item_data(item)?.handle;
        check(
            self.library.set_current_item(handle, item_handle),
            format!("set_current_item {item:?} on {id:?}"),
        )
    }

    pub fn post_menu(&mut self, id: MenuId) -> Result<()> {
        let handle = self.menu_data(id)?.handle;
        check(self.library.post_menu(handle), format!("post_menu {id:?}"))?;
        if let Some(data) = self.menus.get_mut(&id) {
            data.posted = true;
        }
        Ok(())
    }

    pub fn unpost_menu(&mut self, id: MenuId) -> Result<()> {
        let handle = self.menu_data(id)?.handle;
        check(self.library.unpost_menu(handle), format!("unpost_menu {id:?}"))?;
        if let Some(data) = self.menus.get_mut(&id) {
            data.posted = false;
        }
        Ok(())
    }

    pub fn menu_pattern(&self, id: MenuId) -> Result<String> {
        let handle = self.menu_data(id)?.handle;
        self.library
            .menu_pattern(handle)
            .ok_or_else(|| BindingError::SystemError(format!("menu_pattern {id:?}")))
    }

    pub fn menu_options(&self, id: MenuId) -> Result<MenuOptions> {
        let handle = self.menu_data(id)?.handle;
        Ok(self.library.menu_opts(handle))
    }

    pub fn set_menu_options(&mut self, id: MenuId, options: MenuOptions) -> Result<()> {
        let handle = self.menu_data(id)?.handle;
        check(
            self.library.set_menu_opts(handle, options),
            format!("set_menu_opts {id:?}"),
        )
    }

    /// Items whose value is set, in menu order.
    pub fn selected_items(&self, id: MenuId) -> Result<Vec<ItemId>> {
        let data = self.menu_data(id)?;
        let mut selected = Vec::new();
        for item in data.items.children() {
            if self.item_value(*item)? {
                selected.push(*item);
            }
        }
        Ok(selected)
    }

    pub fn set_menu_mark(&mut self, id: MenuId, mark: &str) -> Result<()> {
        let handle = self.menu_data(id)?.handle;
        check(
            self.library.set_menu_mark(handle, mark),
            format!("set_menu_mark {id:?}"),
        )
    }

    pub fn menu_panel(&self, id: MenuId) -> Result<PanelId> {
        Ok(self.menu_data(id)?.panel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SessionConfig;
    use crate::curses_memory::{MemoryCurses, MemoryProbe};
    use crate::types::Ownership;

    fn session() -> (Session, MemoryProbe) {
        let lib = MemoryCurses::new(24, 80);
        let probe = lib.probe();
        (
            Session::new(lib, SessionConfig::default()).expect("session"),
            probe,
        )
    }

    fn items(session: &mut Session, names: &[&str]) -> Vec<ItemId> {
        names
            .iter()
            .map(|name| session.create_item(name, "").expect("item"))
            .collect()
    }

    #[test]
    fn owned_menu_destroys_each_item_exactly_once() {
        // Arrange
        let (mut session, probe) = session();
        let ids = items(&mut session, &["a", "b", "c"]);
        let menu = session
            .create_menu(&ids, MenuConfig::default())
            .expect("menu");
        assert_eq!(probe.live_items(), 3);

        // Act
        session.destroy_menu(menu).expect("destroy");

        // Assert
        assert_eq!(probe.live_items(), 0);
        assert_eq!(probe.live_menus(), 0);
        assert!(session.items.is_empty());
    }

    #[test]
    fn borrowed_menu_leaves_items_destroyable() {
        let (mut session, probe) = session();
        let ids = items(&mut session, &["a", "b"]);
        let menu = session
            .create_menu(
                &ids,
                MenuConfig {
                    ownership: Ownership::Borrowed,
                    ..MenuConfig::default()
                },
            )
            .expect("menu");

        assert!(matches!(
            session.destroy_item(ids[0]),
            Err(BindingError::Connected(_))
        ));
        session.destroy_menu(menu).expect("destroy");

        assert_eq!(probe.live_items(), 2);
        for id in ids {
            session.destroy_item(id).expect("independent destroy");
        }
        assert_eq!(probe.live_items(), 0);
    }

    #[test]
    fn item_lookup_by_index_respects_library_count() {
        let (mut session, _probe) = session();
        let ids = items(&mut session, &["x", "y"]);
        let menu = session
            .create_menu(&ids, MenuConfig::default())
            .expect("menu");

        assert_eq!(session.menu_item(menu, 1).expect("index 1"), ids[1]);
        assert!(matches!(
            session.menu_item(menu, 2),
            Err(BindingError::BadArgument(_))
        ));
        assert_eq!(session.current_item(menu).expect("current"), Some(ids[0]));
        assert_eq!(session.item_name(ids[1]).expect("name"), "y");
    }

    #[test]
    fn reattach_frees_owned_items_left_out() {
        let (mut session, probe) = session();
        let ids = items(&mut session, &["a", "b", "c"]);
        let menu = session
            .create_menu(&ids, MenuConfig::default())
            .expect("menu");
        let extra = session.create_item("d", "").expect("item");

        session
            .set_menu_items(menu, &[ids[2], extra])
            .expect("reattach");

        assert_eq!(session.menu_items(menu).expect("items"), vec![ids[2], extra]);
        assert_eq!(session.menu_item(menu, 0).expect("first"), ids[2]);
        assert_eq!(probe.live_items(), 2);
        assert!(matches!(
            session.item_name(ids[0]),
            Err(BindingError::InvalidHandle(_))
        ));
    }

    #[test]
    fn rejected_reattach_keeps_previous_items() {
        let (mut session, _probe) = session();
        let first = items(&mut session, &["a"]);
        let second = items(&mut session, &["b"]);
        let menu_a = session
            .create_menu(&first, MenuConfig::default())
            .expect("menu a");
        let _menu_b = session
            .create_menu(&second, MenuConfig::default())
            .expect("menu b");

        let result = session.set_menu_items(menu_a, &second);

        assert!(matches!(result, Err(BindingError::Connected(_))));
        assert_eq!(session.menu_items(menu_a).expect("items"), first);
    }

    #[test]
    fn item_in_another_menu_is_refused_at_creation() {
        let (mut session, probe) = session();
        let ids = items(&mut session, &["shared"]);
        session
            .create_menu(&ids, MenuConfig::default())
            .expect("first menu");
        let panels = probe.live_panels();

        assert!(matches!(
            session.create_menu(&ids, MenuConfig::default()),
            Err(BindingError::Connected(_))
        ));
        assert_eq!(probe.live_panels(), panels);
    }

    #[test]
    #[should_panic(expected = "index sync violation")]
    fn skewed_library_indices_are_fatal() {
        let (mut session, probe) = session();
        let ids = items(&mut session, &["a", "b"]);
        probe.skew_indices(true);
        let _ = session.create_menu(&ids, MenuConfig::default());
    }

    #[test]
    fn selection_in_multi_valued_menu() {
        let (mut session, _probe) = session();
        let ids = items(&mut session, &["a", "b", "c"]);
        let menu = session
            .create_menu(
                &ids,
                MenuConfig {
                    options: MenuOptions::default() - MenuOptions::ONEVALUE,
                    ..MenuConfig::default()
                },
            )
            .expect("menu");

        session.set_item_value(ids[0], true).expect("select a");
        session.set_item_value(ids[2], true).expect("select c");
        session.set_item_selectable(ids[1], false).expect("lock b");

        assert_eq!(session.selected_items(menu).expect("selected"), vec![ids[0], ids[2]]);
        assert!(matches!(
            session.set_item_value(ids[1], true),
            Err(BindingError::RequestDenied(_))
        ));
    }

    #[test]
    fn menu_panel_is_sized_from_the_items() {
        let (mut session, _probe) = session();
        let ids = items(&mut session, &["short", "longest"]);
        let menu = session
            .create_menu(&ids, MenuConfig::default())
            .expect("menu");

        let panel = session.menu_panel(menu).expect("panel");
        let content = session.panel_content_window(panel).expect("content");
        assert_eq!(session.window_size(content).expect("size"), (2, 8));
        assert!(session.panel_hidden(panel).expect("hidden"));
    }

    #[test]
    fn empty_menu_cannot_be_sized() {
        let (mut session, probe) = session();
        assert!(matches!(
            session.create_menu(&[], MenuConfig::default()),
            Err(BindingError::NotConnected(_))
        ));
        assert_eq!(probe.live_menus(), 0);
        assert_eq!(probe.live_panels(), 0);
    }

    #[test]
    fn menu_panel_windows_cannot_be_killed_from_outside() {
        // Arrange
        let (mut session, probe) = session();
        let ids = items(&mut session, &["a", "b"]);
        let menu = session
            .create_menu(
                &ids,
                MenuConfig {
                    framed: true,
                    ..MenuConfig::default()
                },
            )
            .expect("menu");
        let panel = session.menu_panel(menu).expect("panel");
        let outer = session.panel_window(panel).expect("outer");
        let windows_before = probe.live_windows();

        // Act
        let killed = session.kill_subwindows(outer);

        // Assert
        assert!(matches!(killed, Err(BindingError::NotPermitted(_))));
        assert_eq!(probe.live_windows(), windows_before);
        probe.push_keys(&['\n' as i32]);
        let chosen = session
            .run_menu(menu, &mut crate::dispatch::DefaultHandler)
            .expect("menu still runs");
        assert_eq!(chosen, Some(ids[0]));
        session.destroy_menu(menu).expect("destroy");
    }
}
