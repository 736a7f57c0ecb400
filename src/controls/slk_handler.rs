/*
 * Soft-label-key layers. The terminal has a single label row, so layers are
 * managed as a LIFO stack: pushing a layer shadows the one below it, popping
 * brings the shadowed layer back. The labels on screen are always those of the
 * top layer.
 *
 * The row's layout (and with it the label count) is reserved when the session
 * starts, from `SessionConfig::slk_format`, and every layer uses that one.
 * Labels are 0-based here and converted to the library's 1-based numbers at the
 * call site.
 */

use crate::app::Session;
use crate::error::{BindingError, Result, check_curses};
use crate::types::{Justification, SlkFormat};

#[derive(Debug, Clone, PartialEq, Eq)]
struct SlkLabel {
    text: String,
    justification: Justification,
    visible: bool,
}

/// One set of label texts. Constructed through `Session::new_slk_layer`.
#[derive(Debug)]
pub struct SlkLayer {
    labels: Vec<SlkLabel>,
    previous: Option<Box<SlkLayer>>,
}

impl SlkLayer {
    pub fn label_count(&self) -> usize {
        self.labels.len()
    }

    pub fn label(&self, index: usize) -> Option<&str> {
        self.labels.get(index).map(|label| label.text.as_str())
    }

    pub fn set_label(&mut self, index: usize, text: &str, justification: Justification) -> Result<()> {
        let count = self.labels.len();
        let label = self.labels.get_mut(index).ok_or_else(|| {
            BindingError::BadArgument(format!("label {index} out of range ({count} labels)"))
        })?;
        label.text = text.to_string();
        label.justification = justification;
        Ok(())
    }
}

#[derive(Debug, Default)]
pub(crate) struct SlkStack {
    top: Option<Box<SlkLayer>>,
}

impl SlkStack {
    fn depth(&self) -> usize {
        std::iter::successors(self.top.as_deref(), |layer| layer.previous.as_deref()).count()
    }
}

impl Session {
    /*
     * `format` may be omitted or repeat the layout reserved at session start;
     * naming a different one is a `BadArgument`. Without a reserved row there is
     * nothing to put labels on.
     */
    pub fn new_slk_layer(&mut self, format: Option<SlkFormat>) -> Result<SlkLayer> {
        let Some(fixed) = self.config.slk_format else {
            log::warn!("SlkHandler: no label row was reserved");
            return Err(BindingError::BadState(
                "no soft label row was reserved when the session started".to_string(),
            ));
        };
        if let Some(requested) = format.filter(|requested| *requested != fixed) {
            log::warn!("SlkHandler: layout {requested:?} requested, {fixed:?} is fixed");
            return Err(BindingError::BadArgument(format!(
                "soft label layout is fixed to {fixed:?}, cannot use {requested:?}"
            )));
        }
        Ok(SlkLayer {
            labels: vec![
                SlkLabel {
                    text: String::new(),
                    justification: Justification::Left,
                    visible: true,
                };
                fixed.label_count()
            ],
            previous: None,
        })
    }

    pub fn slk_format(&self) -> Option<SlkFormat> {
        self.config.slk_format
    }

    pub fn slk_depth(&self) -> usize {
        self.slk.depth()
    }

    pub fn current_slk_layer(&self) -> Option<&SlkLayer> {
        self.slk.top.as_deref()
    }

    fn write_text(&mut self, index: usize, text: &str, justification: Justification) -> Result<()> {
        check_curses(
            self.library
                .slk_set(index as i32 + 1, text, justification.code()),
            format!("slk_set label {index}"),
        )
    }

    fn write_label(&mut self, index: usize, label: &SlkLabel) -> Result<()> {
        let text = if label.visible { label.text.as_str() } else { "" };
        self.write_text(index, text, label.justification)
    }

    fn apply_top_layer(&mut self) -> Result<()> {
        let labels = match self.slk.top.as_deref() {
            Some(layer) => layer.labels.clone(),
            None => return Ok(()),
        };
        for (index, label) in labels.iter().enumerate() {
            self.write_label(index, label)?;
        }
        check_curses(self.library.slk_noutrefresh(), "slk_noutrefresh")
    }

    pub fn slk_push(&mut self, mut layer: SlkLayer) -> Result<()> {
        if layer.previous.is_some() {
            return Err(BindingError::BadState(
                "soft label layer is already stacked".to_string(),
            ));
        }
        let was_empty = self.slk.top.is_none();
        layer.previous = self.slk.top.take();
        self.slk.top = Some(Box::new(layer));
        log::debug!("SlkHandler: pushed layer (depth {})", self.slk.depth());
        if was_empty {
            check_curses(self.library.slk_restore(), "slk_restore")?;
        }
        self.apply_top_layer()
    }

    /// Removes the top layer. Returns `false` when there was none.
    pub fn slk_pop(&mut self) -> Result<bool> {
        let Some(mut top) = self.slk.top.take() else {
            return Ok(false);
        };
        self.slk.top = top.previous.take();
        log::debug!("SlkHandler: popped layer (depth {})", self.slk.depth());
        if self.slk.top.is_some() {
            self.apply_top_layer()?;
        } else {
            check_curses(self.library.slk_clear(), "slk_clear")?;
        }
        Ok(true)
    }

    /// # Panics
    /// Panics when no layer is current.
    pub fn slk_expect_pop(&mut self) -> Result<()> {
        if self.slk_pop()? {
            return Ok(());
        }
        log::error!("SlkHandler: expect_pop on an empty soft label stack");
        panic!("no current soft label layer to pop");
    }

    fn top_layer_mut(&mut self) -> Result<&mut SlkLayer> {
        self.slk.top.as_deref_mut().ok_or_else(|| {
            log::warn!("SlkHandler: no current soft label layer");
            BindingError::BadState("no current soft label layer".to_string())
        })
    }

    fn set_visible(&mut self, index: usize, visible: bool) -> Result<()> {
        let layer = self.top_layer_mut()?;
        let count = layer.labels.len();
        let label = layer.labels.get_mut(index).ok_or_else(|| {
            BindingError::BadArgument(format!("label {index} out of range ({count} labels)"))
        })?;
        label.visible = visible;
        let label = label.clone();
        /* Showing blanks the label first so the library repaints it. */
        self.write_text(index, "", label.justification)?;
        if visible {
            self.write_label(index, &label)?;
        }
        check_curses(self.library.slk_noutrefresh(), "slk_noutrefresh")
    }

    /// Shows label `index` of the current layer.
    pub fn slk_show(&mut self, index: usize) -> Result<()> {
        self.set_visible(index, true)
    }

    /// Blanks label `index` of the current layer; its text is kept.
    pub fn slk_hide(&mut self, index: usize) -> Result<()> {
        self.set_visible(index, false)
    }

    pub fn slk_show_all(&mut self) -> Result<()> {
        let count = self.top_layer_mut()?.labels.len();
        (0..count).try_for_each(|index| self.set_visible(index, true))
    }

    pub fn slk_hide_all(&mut self) -> Result<()> {
        let count = self.top_layer_mut()?.labels.len();
        (0..count).try_for_each(|index| self.set_visible(index, false))
    }

    /// Changes a label of the current layer and puts it on screen.
    pub fn slk_set_label(&mut self, index: usize, text: &str, justification: Justification) -> Result<()> {
        self.top_layer_mut()?.set_label(index, text, justification)?;
        self.set_visible(index, true)
    }

    pub fn slk_label(&self, index: usize) -> Option<&str> {
        self.current_slk_layer()?.label(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SessionConfig;
    use crate::curses_memory::{MemoryCurses, MemoryProbe};

    fn session() -> (Session, MemoryProbe) {
        let lib = MemoryCurses::new(24, 80);
        let probe = lib.probe();
        (
            Session::new(lib, SessionConfig::default()).expect("session"),
            probe,
        )
    }

    fn layer(session: &mut Session, first: &str) -> SlkLayer {
        let mut layer = session.new_slk_layer(None).expect("layer");
        layer
            .set_label(0, first, Justification::Center)
            .expect("label 0");
        layer
    }

    #[test]
    fn push_pop_restores_previous_labels() {
        // Arrange
        let (mut session, probe) = session();
        let a = layer(&mut session, "Help");
        let b = layer(&mut session, "Quit");

        // Act
        session.slk_push(a).expect("push a");
        session.slk_push(b).expect("push b");
        assert_eq!(probe.slk_labels()[0], "Quit");
        assert!(session.slk_pop().expect("pop b"));

        // Assert
        assert_eq!(probe.slk_labels()[0], "Help");
        assert_eq!(session.slk_depth(), 1);
        assert!(session.slk_pop().expect("pop a"));
        assert!(probe.slk_hidden());
        assert!(!session.slk_pop().expect("empty pop"));
    }

    #[test]
    fn layout_is_reserved_when_the_session_starts() {
        let lib = MemoryCurses::new(24, 80);
        let probe = lib.probe();
        let config = SessionConfig {
            slk_format: Some(SlkFormat::FourFourFour),
            ..SessionConfig::default()
        };
        let mut session = Session::new(lib, config).expect("session");
        assert_eq!(probe.slk_format(), Some(2));

        let first = session
            .new_slk_layer(Some(SlkFormat::FourFourFour))
            .expect("first");
        assert_eq!(first.label_count(), 12);

        let reused = session.new_slk_layer(None).expect("reuse");
        assert_eq!(reused.label_count(), 12);
        assert!(session.new_slk_layer(Some(SlkFormat::FourFourFour)).is_ok());
        assert!(matches!(
            session.new_slk_layer(Some(SlkFormat::ThreeTwoThree)),
            Err(BindingError::BadArgument(_))
        ));
    }

    #[test]
    fn without_a_reserved_row_layers_are_bad_state() {
        let lib = MemoryCurses::new(24, 80);
        let probe = lib.probe();
        let config = SessionConfig {
            slk_format: None,
            ..SessionConfig::default()
        };
        let mut session = Session::new(lib, config).expect("session");

        assert_eq!(probe.slk_format(), None);
        assert_eq!(session.slk_format(), None);
        assert!(matches!(
            session.new_slk_layer(None),
            Err(BindingError::BadState(_))
        ));
    }

    #[test]
    fn hide_blanks_label_and_show_restores_text() {
        let (mut session, probe) = session();
        let a = layer(&mut session, "Save");
        session.slk_push(a).expect("push");
        probe.take_slk_writes();

        session.slk_hide(0).expect("hide");
        assert_eq!(probe.take_slk_writes(), vec![(1, String::new())]);
        assert_eq!(probe.slk_labels()[0], "");
        assert_eq!(session.slk_label(0), Some("Save"));

        session.slk_show(0).expect("show");
        assert_eq!(
            probe.take_slk_writes(),
            vec![(1, String::new()), (1, "Save".to_string())]
        );
        assert_eq!(probe.slk_labels()[0], "Save");
    }

    #[test]
    fn hidden_state_survives_being_shadowed() {
        let (mut session, probe) = session();
        let a = layer(&mut session, "Save");
        let b = layer(&mut session, "Load");
        session.slk_push(a).expect("push a");
        session.slk_hide_all().expect("hide all");
        session.slk_push(b).expect("push b");
        assert_eq!(probe.slk_labels()[0], "Load");

        session.slk_pop().expect("pop");

        assert_eq!(probe.slk_labels()[0], "");
        session.slk_show_all().expect("show all");
        assert_eq!(probe.slk_labels()[0], "Save");
    }

    #[test]
    fn label_operations_without_a_layer_are_bad_state() {
        let (mut session, _probe) = session();
        assert!(matches!(session.slk_show(0), Err(BindingError::BadState(_))));
        assert_eq!(session.slk_label(0), None);
    }

    #[test]
    fn out_of_range_label_is_bad_argument() {
        let (mut session, _probe) = session();
        let mut layer = session.new_slk_layer(None).expect("layer");
        assert!(matches!(
            layer.set_label(8, "x", Justification::Left),
            Err(BindingError::BadArgument(_))
        ));
    }

    #[test]
    #[should_panic(expected = "no current soft label layer")]
    fn expect_pop_on_empty_stack_is_fatal() {
        let (mut session, _probe) = session();
        let _ = session.slk_expect_pop();
    }
}
