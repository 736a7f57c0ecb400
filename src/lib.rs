/*
 * Object layer over a curses-style terminal library with panel, menu, form and
 * soft-label-key extensions. The library itself is reached only through the
 * `CursesLibrary` trait; `Session` owns it and hands out logical ids for every
 * window, panel, item, menu, field and form it creates.
 *
 * Every library record the session creates carries an identity hook so a raw
 * handle coming back from the library (current item, hook notification) maps to
 * exactly one wrapper. Containers keep their children in lockstep with the
 * handle arrays given to the library, and the dispatch loops in `dispatch` turn
 * keystrokes into driver requests with overridable reactions.
 *
 * `curses_memory` provides a headless library so the whole layer runs in tests
 * without a terminal.
 */
pub mod app;
pub mod config;
pub(crate) mod controls;
pub mod curses;
pub mod curses_memory;
pub mod dispatch;
pub mod error;
pub mod keys;
pub(crate) mod registry;
pub mod types;
pub mod user_data;
pub(crate) mod window_common;

pub use app::Session;
pub use config::{FieldConfig, FormConfig, MenuConfig, PanelConfig, SessionConfig, WindowConfig};
pub use controls::form_handler::FieldAction;
pub use controls::menu_handler::ItemAction;
pub use controls::slk_handler::SlkLayer;
pub use curses::{
    CursesLibrary, FieldOptions, FieldType, ItemOptions, MenuOptions, RawHandle, UserFieldType,
};
pub use dispatch::{DefaultHandler, DispatchOutcome, DispatchState, FormHandler, Hook, MenuHandler};
pub use error::{BindingError, Result};
pub use keys::{FormRequest, MenuRequest, Request};
pub use types::{
    ActionResult, FieldId, FormId, ItemId, Justification, MenuId, Ownership, PanelId, SlkFormat,
    WindowId, Wrapper,
};
pub use user_data::UserData;
