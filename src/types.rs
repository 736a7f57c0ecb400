/*
 * Platform-agnostic value types shared across the binding layer: logical ids for
 * every wrapper kind, the `Wrapper` back-reference stored in identity hooks,
 * collection ownership, and the soft-label-key layout vocabulary.
 *
 * Logical ids are allocated by the `Session` from a monotonically increasing
 * counter and never reused, so a stale id can never alias a newer wrapper.
 */

macro_rules! logical_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub(crate) u64);

        impl $name {
            pub const fn raw(self) -> u64 {
                self.0
            }
        }
    };
}

logical_id!(
    /// A window or subwindow wrapper.
    WindowId
);
logical_id!(
    /// A panel wrapper (window plus stack entry).
    PanelId
);
logical_id!(MenuId);
logical_id!(ItemId);
logical_id!(FormId);
logical_id!(FieldId);

/// Back-reference from a library handle to the wrapper that owns it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Wrapper {
    Window(WindowId),
    Panel(PanelId),
    Menu(MenuId),
    Item(ItemId),
    Form(FormId),
    Field(FieldId),
}

impl From<WindowId> for Wrapper {
    fn from(id: WindowId) -> Self {
        Wrapper::Window(id)
    }
}

impl From<PanelId> for Wrapper {
    fn from(id: PanelId) -> Self {
        Wrapper::Panel(id)
    }
}

impl From<MenuId> for Wrapper {
    fn from(id: MenuId) -> Self {
        Wrapper::Menu(id)
    }
}

impl From<ItemId> for Wrapper {
    fn from(id: ItemId) -> Self {
        Wrapper::Item(id)
    }
}

impl From<FormId> for Wrapper {
    fn from(id: FormId) -> Self {
        Wrapper::Form(id)
    }
}

impl From<FieldId> for Wrapper {
    fn from(id: FieldId) -> Self {
        Wrapper::Field(id)
    }
}

/// Whether a child collection destroys its children on teardown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Ownership {
    #[default]
    Owned,
    Borrowed,
}

/// Result of an item or field action run by the dispatch loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionResult {
    Continue,
    Exit,
}

/// Soft-label-key row layout, with the values `slk_init` expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SlkFormat {
    /// 8 labels arranged 3-2-3.
    ThreeTwoThree,
    /// 8 labels arranged 4-4.
    FourFour,
    /// 12 labels arranged 4-4-4.
    FourFourFour,
    /// 12 labels arranged 4-4-4 with an index line.
    FourFourFourIndex,
}

impl SlkFormat {
    pub const fn code(self) -> i32 {
        match self {
            SlkFormat::ThreeTwoThree => 0,
            SlkFormat::FourFour => 1,
            SlkFormat::FourFourFour => 2,
            SlkFormat::FourFourFourIndex => 3,
        }
    }

    pub const fn label_count(self) -> usize {
        match self {
            SlkFormat::ThreeTwoThree | SlkFormat::FourFour => 8,
            SlkFormat::FourFourFour | SlkFormat::FourFourFourIndex => 12,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Justification {
    #[default]
    Left,
    Center,
    Right,
}

impl Justification {
    pub const fn code(self) -> i32 {
        match self {
            Justification::Left => 0,
            Justification::Center => 1,
            Justification::Right => 2,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slk_formats_report_curses_codes_and_counts() {
        assert_eq!(SlkFormat::ThreeTwoThree.code(), 0);
        assert_eq!(SlkFormat::FourFourFourIndex.code(), 3);
        assert_eq!(SlkFormat::FourFour.label_count(), 8);
        assert_eq!(SlkFormat::FourFourFour.label_count(), 12);
    }

    #[test]
    fn ids_convert_into_wrapper_back_references() {
        assert_eq!(Wrapper::from(ItemId(3)), Wrapper::Item(ItemId(3)));
        assert_ne!(Wrapper::from(MenuId(3)), Wrapper::from(FormId(3)));
    }
}
