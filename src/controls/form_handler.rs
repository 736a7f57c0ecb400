/*
 * Form and field wrappers. Structured like the menu wrapper: the form rests on
 * its own panel, sized from `scale_form`, and keeps its fields in a
 * `ChildCollection` whose order and library indices stay in sync.
 *
 * Field validation is done by the library through the field type; the binding
 * only installs the type and reports `E_INVALID_FIELD` as `InvalidSelection`,
 * or as `false` from `validate_current_field`.
 */

use crate::app::Session;
use crate::config::{FieldConfig, FormConfig, PanelConfig, WindowConfig};
use crate::controls::collection::ChildCollection;
use crate::controls::menu_handler::HOOK_KINDS;
use crate::curses::{E_INVALID_FIELD, FieldOptions, FieldType, OK, RawHandle};
use crate::keys::FormRequest;
use crate::error::{BindingError, Result, check};
use crate::types::{ActionResult, FieldId, FormId, PanelId};

/// Runs when the dispatch loop activates a field that passed validation.
pub type FieldAction = Box<dyn FnMut(&mut Session, FieldId) -> ActionResult>;

pub(crate) struct FieldData {
    pub(crate) handle: RawHandle,
    form: Option<FormId>,
    action: Option<FieldAction>,
}

#[derive(Debug)]
pub(crate) struct FormData {
    pub(crate) handle: RawHandle,
    pub(crate) panel: PanelId,
    fields: ChildCollection<FieldId>,
    pub(crate) posted: bool,
}

impl Session {
    pub(crate) fn field_data(&self, id: FieldId) -> Result<&FieldData> {
        self.fields.get(&id).ok_or_else(|| {
            log::warn!("FormHandler: field {id:?} not found");
            BindingError::InvalidHandle(format!("field {id:?} not found"))
        })
    }

    pub(crate) fn form_data(&self, id: FormId) -> Result<&FormData> {
        self.forms.get(&id).ok_or_else(|| {
            log::warn!("FormHandler: form {id:?} not found");
            BindingError::InvalidHandle(format!("form {id:?} not found"))
        })
    }

    // ── Fields ───────────────────────────────────────────────────────────────

    pub fn create_field(&mut self, config: FieldConfig) -> Result<FieldId> {
        let handle = self
            .library
            .new_field(config.height, config.width, config.top, config.left)
            .ok_or_else(|| {
                log::warn!("FormHandler: new_field rejected {config:?}");
                BindingError::BadArgument(format!("new_field returned NULL for {config:?}"))
            })?;
        let id = FieldId(self.allocate_id());
        if let Err(err) = self.attach_hook(handle, id) {
            if self.library.free_field(handle) != OK {
                log::warn!("FormHandler: free_field failed while rolling back {id:?}");
            }
            return Err(err);
        }
        self.fields.insert(
            id,
            FieldData {
                handle,
                form: None,
                action: None,
            },
        );
        log::debug!("FormHandler: created field {id:?} {config:?}");
        Ok(id)
    }

    pub fn destroy_field(&mut self, id: FieldId) -> Result<()> {
        let data = self.field_data(id)?;
        if let Some(form) = data.form {
            log::warn!("FormHandler: field {id:?} is still attached to {form:?}");
            return Err(BindingError::Connected(format!(
                "field {id:?} belongs to form {form:?}"
            )));
        }
        let handle = data.handle;
        self.detach_hook(handle);
        self.fields.remove(&id);
        check(self.library.free_field(handle), format!("free_field {id:?}"))?;
        log::debug!("FormHandler: destroyed field {id:?}");
        Ok(())
    }

    pub fn field_buffer(&self, id: FieldId) -> Result<String> {
        let handle = self.field_data(id)?.handle;
        self.library
            .field_buffer(handle)
            .ok_or_else(|| BindingError::SystemError(format!("field_buffer {id:?}")))
    }

    pub fn set_field_buffer(&mut self, id: FieldId, text: &str) -> Result<()> {
        let handle = self.field_data(id)?.handle;
        check(
            self.library.set_field_buffer(handle, text),
            format!("set_field_buffer {id:?}"),
        )
    }

    /// `None` removes validation from the field.
    pub fn set_field_type(&mut self, id: FieldId, field_type: Option<FieldType>) -> Result<()> {
        let handle = self.field_data(id)?.handle;
        check(
            self.library.set_field_type(handle, field_type),
            format!("set_field_type {id:?}"),
        )
    }

    pub fn field_options(&self, id: FieldId) -> Result<FieldOptions> {
        let handle = self.field_data(id)?.handle;
        Ok(self.library.field_opts(handle))
    }

    pub fn set_field_options(&mut self, id: FieldId, options: FieldOptions) -> Result<()> {
        let handle = self.field_data(id)?.handle;
        check(
            self.library.set_field_opts(handle, options),
            format!("set_field_opts {id:?}"),
        )
    }

    /// Replaces the field's action. Fields without an action move on to the next field.
    pub fn set_field_action(
        &mut self,
        id: FieldId,
        action: impl FnMut(&mut Session, FieldId) -> ActionResult + 'static,
    ) -> Result<()> {
        let data = self.fields.get_mut(&id).ok_or_else(|| {
            BindingError::InvalidHandle(format!("field {id:?} not found"))
        })?;
        data.action = Some(Box::new(action));
        Ok(())
    }

    pub(crate) fn run_field_action(&mut self, id: FieldId) -> Result<ActionResult> {
        let taken = self
            .fields
            .get_mut(&id)
            .ok_or_else(|| BindingError::InvalidHandle(format!("field {id:?} not found")))?
            .action
            .take();
        let Some(mut action) = taken else {
            return Ok(ActionResult::Continue);
        };
        let result = action(self, id);
        if let Some(data) = self.fields.get_mut(&id)
            && data.action.is_none()
        {
            data.action = Some(action);
        }
        Ok(result)
    }

    fn field_pairs(&self, fields: &[FieldId]) -> Result<Vec<(FieldId, RawHandle)>> {
        fields
            .iter()
            .map(|id| self.field_data(*id).map(|data| (*id, data.handle)))
            .collect()
    }

    fn claim_fields(&mut self, fields: &[FieldId], form: Option<FormId>) {
        for id in fields {
            if let Some(data) = self.fields.get_mut(id) {
                data.form = form;
            }
        }
    }

    fn verify_form_sync(&self, id: FormId) -> Result<()> {
        let data = self.form_data(id)?;
        let library = self.library.as_ref();
        data.fields.verify_sync(
            &format!("form {id:?}"),
            library.field_count(data.handle),
            |handle| library.field_index(handle),
        );
        Ok(())
    }

    // ── Forms ────────────────────────────────────────────────────────────────

    pub fn create_form(&mut self, fields: &[FieldId], config: FormConfig) -> Result<FormId> {
        let collection = ChildCollection::new(self.field_pairs(fields)?, config.ownership);
        let handle = self
            .library
            .new_form(collection.sentinel_array())
            .ok_or_else(|| {
                log::warn!("FormHandler: new_form rejected the field array {fields:?}");
                BindingError::Connected(format!(
                    "new_form refused fields {fields:?} (already attached or invalid)"
                ))
            })?;

        let panel = match self.place_form(handle, &config) {
            Ok(panel) => panel,
            Err(err) => {
                if self.library.free_form(handle) != OK {
                    log::warn!("FormHandler: free_form failed while rolling back");
                }
                return Err(err);
            }
        };

        let id = FormId(self.allocate_id());
        if let Err(err) = self.attach_hook(handle, id) {
            if self.library.free_form(handle) != OK {
                log::warn!("FormHandler: free_form failed while rolling back {id:?}");
            }
            self.destroy_panel(panel)?;
            return Err(err);
        }
        self.claim_fields(collection.children(), Some(id));
        self.forms.insert(
            id,
            FormData {
                handle,
                panel,
                fields: collection,
                posted: false,
            },
        );
        self.verify_form_sync(id)?;
        for kind in HOOK_KINDS {
            check(
                self.library.set_hook(handle, kind, true),
                format!("set_hook {kind:?} on {id:?}"),
            )?;
        }
        log::debug!("FormHandler: created form {id:?} with {} field(s)", fields.len());
        Ok(id)
    }

    fn place_form(&mut self, handle: RawHandle, config: &FormConfig) -> Result<PanelId> {
        let (lines, cols) = self.library.scale_form(handle).ok_or_else(|| {
            log::warn!("FormHandler: scale_form found no fields to size");
            BindingError::NotConnected("scale_form: form has no fields".to_string())
        })?;
        let panel = self.create_panel(PanelConfig {
            window: WindowConfig::new(lines, cols, config.begin_y, config.begin_x),
            framed: config.framed,
        })?;
        if let Err(err) = self.bind_form_windows(handle, panel) {
            self.destroy_panel(panel)?;
            return Err(err);
        }
        Ok(panel)
    }

    fn bind_form_windows(&mut self, handle: RawHandle, panel: PanelId) -> Result<()> {
        let window = self.window_handle(self.panel_window(panel)?)?;
        let content = self.window_handle(self.panel_content_window(panel)?)?;
        check(self.library.set_form_win(handle, window), "set_form_win")?;
        check(self.library.set_form_sub(handle, content), "set_form_sub")?;
        self.hide_panel(panel)
    }

    pub fn destroy_form(&mut self, id: FormId) -> Result<()> {
        if self.form_data(id)?.posted {
            self.unpost_form(id)?;
        }
        let Some(data) = self.forms.remove(&id) else {
            return Err(BindingError::InvalidHandle(format!("form {id:?} not found")));
        };
        self.detach_hook(data.handle);
        check(self.library.free_form(data.handle), format!("free_form {id:?}"))?;
        self.claim_fields(data.fields.children(), None);
        for field in data.fields.owned_children() {
            self.destroy_field(*field)?;
        }
        self.destroy_panel(data.panel)?;
        log::debug!("FormHandler: destroyed form {id:?}");
        Ok(())
    }

    pub fn set_form_fields(&mut self, id: FormId, fields: &[FieldId]) -> Result<()> {
        let (handle, ownership) = {
            let data = self.form_data(id)?;
            (data.handle, data.fields.ownership())
        };
        let next = ChildCollection::new(self.field_pairs(fields)?, ownership);
        check(
            self.library.set_form_fields(handle, next.sentinel_array()),
            format!("set_form_fields {id:?}"),
        )?;

        let Some(data) = self.forms.get_mut(&id) else {
            return Err(BindingError::InvalidHandle(format!("form {id:?} not found")));
        };
        let previous = std::mem::replace(&mut data.fields, next);
        self.claim_fields(previous.children(), None);
        self.claim_fields(fields, Some(id));
        self.verify_form_sync(id)?;
        let retired = previous.retired_by(&self.form_data(id)?.fields);
        for field in retired {
            self.destroy_field(field)?;
        }
        log::debug!("FormHandler: form {id:?} now holds {} field(s)", fields.len());
        Ok(())
    }

    pub fn form_fields(&self, id: FormId) -> Result<Vec<FieldId>> {
        Ok(self.form_data(id)?.fields.children().to_vec())
    }

    pub fn form_field_count(&self, id: FormId) -> Result<usize> {
        let handle = self.form_data(id)?.handle;
        usize::try_from(self.library.field_count(handle))
            .map_err(|_| BindingError::SystemError(format!("field_count {id:?}")))
    }

    pub fn form_field(&self, id: FormId, index: usize) -> Result<FieldId> {
        let count = self.form_field_count(id)?;
        if index >= count {
            return Err(BindingError::BadArgument(format!(
                "field index {index} out of range for {id:?} ({count} fields)"
            )));
        }
        self.form_data(id)?
            .fields
            .get(index)
            .ok_or_else(|| BindingError::BadArgument(format!("field index {index} for {id:?}")))
    }

    pub fn current_field(&self, id: FormId) -> Result<Option<FieldId>> {
        let handle = self.form_data(id)?.handle;
        Ok(self
            .library
            .current_field(handle)
            .map(|raw| self.resolve_field(raw)))
    }

    pub fn set_current_field(&mut self, id: FormId, field: FieldId) -> Result<()> {
        let handle = self.form_data(id)?.handle;
        let field_handle = self.field_data(field)?.handle;
        check(
            self.library.set_current_field(handle, field_handle),
            format!("set_current_field {field:?} on {id:?}"),
        )
    }

    /*
     * Checks the current field against its type without leaving it. Integer
     * and numeric types rewrite the buffer to their precision when it passes.
     */
    pub fn validate_current_field(&mut self, id: FormId) -> Result<bool> {
        let handle = self.form_data(id)?.handle;
        let status = self
            .library
            .form_driver(handle, FormRequest::Validation.code());
        if status == E_INVALID_FIELD {
            log::debug!("FormHandler: current field of {id:?} failed validation");
            return Ok(false);
        }
        check(status, format!("validate current field of {id:?}"))?;
        Ok(true)
    }

    pub fn post_form(&mut self, id: FormId) -> Result<()> {
        let handle = self.form_data(id)?.handle;
        check(self.library.post_form(handle), format!("post_form {id:?}"))?;
        if let Some(data) = self.forms.get_mut(&id) {
            data.posted = true;
        }
        Ok(())
    }

    pub fn unpost_form(&mut self, id: FormId) -> Result<()> {
        let handle = self.form_data(id)?.handle;
        check(self.library.unpost_form(handle), format!("unpost_form {id:?}"))?;
        if let Some(data) = self.forms.get_mut(&id) {
            data.posted = false;
        }
        Ok(())
    }

    pub fn form_panel(&self, id: FormId) -> Result<PanelId> {
        Ok(self.form_data(id)?.panel)
    }
}
