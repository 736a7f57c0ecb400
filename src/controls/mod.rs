pub(crate) mod collection;
pub(crate) mod form_handler;
pub(crate) mod menu_handler;
pub(crate) mod panel_handler;
pub(crate) mod slk_handler;
