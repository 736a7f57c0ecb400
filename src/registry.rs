/*
 * Identity registry: links each library handle to the wrapper that owns it.
 *
 * The binding keeps the hook records itself and only writes an opaque token into
 * the handle's user-pointer slot. Resolving a handle reads the token back, finds
 * the hook and checks that the hook was written for this very handle. Anything
 * else (no token, unknown token, token belonging to another handle) means a
 * stale or foreign handle crossed the API boundary, and the registry panics
 * instead of acting on it.
 *
 * Hooks are written once, right after the handle is created, and removed right
 * before it is destroyed. Only the user-data field changes in between.
 */

use crate::curses::{CursesLibrary, OK, RawHandle};
use crate::error::{BindingError, Result};
use crate::types::Wrapper;
use crate::user_data::UserData;

use std::collections::HashMap;

#[derive(Debug)]
struct Hook {
    owner: RawHandle,
    wrapper: Wrapper,
    user: Option<UserData>,
}

#[derive(Debug)]
pub(crate) struct IdentityRegistry {
    hooks: HashMap<usize, Hook>,
    next_token: usize,
}

fn identity_violation(handle: RawHandle, detail: &str) -> ! {
    log::error!("Registry: identity hook violation for handle {handle:?}: {detail}");
    panic!("identity hook violation for handle {handle:?}: {detail}");
}

impl IdentityRegistry {
    pub(crate) fn new() -> Self {
        Self {
            hooks: HashMap::new(),
            next_token: 1,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.hooks.len()
    }

    /*
     * Writes a fresh hook token into the handle's user-pointer slot. A rejected
     * slot write is reported as a system error and leaves nothing registered.
     */
    pub(crate) fn attach(
        &mut self,
        lib: &mut dyn CursesLibrary,
        handle: RawHandle,
        wrapper: Wrapper,
    ) -> Result<()> {
        let token = self.next_token;
        self.next_token += 1;
        if lib.set_userptr(handle, token) != OK {
            log::error!("Registry: set_userptr failed for handle {handle:?} ({wrapper:?})");
            return Err(BindingError::SystemError(format!(
                "cannot store identity hook for {wrapper:?}"
            )));
        }
        self.hooks.insert(
            token,
            Hook {
                owner: handle,
                wrapper,
                user: None,
            },
        );
        log::trace!("Registry: attached {wrapper:?} to handle {handle:?} (token {token})");
        Ok(())
    }

    fn token_for(&self, lib: &dyn CursesLibrary, handle: RawHandle) -> usize {
        let token = lib.userptr(handle);
        match self.hooks.get(&token) {
            None if token == 0 => identity_violation(handle, "handle carries no hook"),
            None => identity_violation(handle, "hook token is unknown to this session"),
            Some(hook) if hook.owner != handle => identity_violation(
                handle,
                &format!("hook belongs to handle {:?}", hook.owner),
            ),
            Some(_) => token,
        }
    }

    /// # Panics
    /// Panics when `handle` does not carry a hook written by this registry.
    pub(crate) fn resolve(&self, lib: &dyn CursesLibrary, handle: RawHandle) -> Wrapper {
        let token = self.token_for(lib, handle);
        self.hooks[&token].wrapper
    }

    /*
     * Clears the slot before dropping the hook so the library can never hand
     * back a token whose hook is gone. Returns any user data still attached.
     */
    pub(crate) fn detach(
        &mut self,
        lib: &mut dyn CursesLibrary,
        handle: RawHandle,
    ) -> Option<UserData> {
        let token = self.token_for(lib, handle);
        if lib.set_userptr(handle, 0) != OK {
            log::warn!("Registry: could not clear user pointer of handle {handle:?}");
        }
        let hook = self.hooks.remove(&token)?;
        log::trace!(
            "Registry: detached {:?} from handle {handle:?}",
            hook.wrapper
        );
        hook.user
    }

    pub(crate) fn user_data(&self, lib: &dyn CursesLibrary, handle: RawHandle) -> Option<&UserData> {
        let token = self.token_for(lib, handle);
        self.hooks[&token].user.as_ref()
    }

    pub(crate) fn user_data_mut(
        &mut self,
        lib: &dyn CursesLibrary,
        handle: RawHandle,
    ) -> Option<&mut UserData> {
        let token = self.token_for(lib, handle);
        self.hooks.get_mut(&token).and_then(|hook| hook.user.as_mut())
    }

    pub(crate) fn set_user_data(
        &mut self,
        lib: &dyn CursesLibrary,
        handle: RawHandle,
        data: Option<UserData>,
    ) -> Option<UserData> {
        let token = self.token_for(lib, handle);
        match self.hooks.get_mut(&token) {
            Some(hook) => std::mem::replace(&mut hook.user, data),
            None => None,
        }
    }
}
