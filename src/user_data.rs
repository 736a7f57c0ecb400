/*
 * Type-erased application data attached to a library handle. The value is boxed
 * as `dyn Any` next to the name of its concrete type, so a wrong-typed read
 * reports what was actually stored instead of silently failing.
 */

use crate::error::{BindingError, Result};

use std::any::{Any, type_name};
use std::fmt;

pub struct UserData {
    value: Box<dyn Any>,
    type_name: &'static str,
}

impl UserData {
    pub fn new<T: Any>(value: T) -> Self {
        Self {
            value: Box::new(value),
            type_name: type_name::<T>(),
        }
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn is<T: Any>(&self) -> bool {
        self.value.is::<T>()
    }

    pub fn downcast_ref<T: Any>(&self) -> Result<&T> {
        let actual = self.type_name;
        self.value
            .downcast_ref::<T>()
            .ok_or(BindingError::TypeMismatch {
                expected: type_name::<T>(),
                actual,
            })
    }

    pub fn downcast_mut<T: Any>(&mut self) -> Result<&mut T> {
        let actual = self.type_name;
        self.value
            .downcast_mut::<T>()
            .ok_or(BindingError::TypeMismatch {
                expected: type_name::<T>(),
                actual,
            })
    }

    /// Consumes the container; on a type mismatch the original container is handed back.
    pub fn into_inner<T: Any>(self) -> std::result::Result<T, Self> {
        let type_name = self.type_name;
        match self.value.downcast::<T>() {
            Ok(boxed) => Ok(*boxed),
            Err(value) => Err(Self { value, type_name }),
        }
    }
}

impl fmt::Debug for UserData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserData")
            .field("type_name", &self.type_name)
            .finish_non_exhaustive()
    }
}
