//! Native objects shared with the script heap
//!
//! Every exposed object lives in an [`ObjectCell`] carrying its ownership
//! tag and a validity flag. The native side holds the cell through
//! [`Object`]; each script wrapper holds it through its own
//! [`OpaqueReference`]. Whoever owns the object destroys it, at most once,
//! and a destroyed object is never handed out again.

use super::class::Scriptable;
use super::context::prototype_for;
use boa_engine::{Context, JsData, JsObject, JsResult, JsValue};
use boa_gc::{Finalize, Trace, empty_trace};
use std::cell::{Cell, Ref, RefCell, RefMut};
use std::fmt;
use std::rc::{Rc, Weak};

/// Who is responsible for destroying an exposed object
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ownership {
    /// Destroyed when the native [`Object`] handle is dropped
    Native,
    /// Destroyed when its script wrappers are collected
    Script,
}

pub(crate) struct ObjectCell<T> {
    value: RefCell<Option<T>>,
    ownership: Cell<Ownership>,
    valid: Cell<bool>,
}

impl<T> ObjectCell<T> {
    fn new(value: T) -> Self {
        Self {
            value: RefCell::new(Some(value)),
            ownership: Cell::new(Ownership::Native),
            valid: Cell::new(true),
        }
    }

    /// Clear the validity flag and drop the value. Only the first call has
    /// an effect.
    fn destroy(&self) {
        if !self.valid.replace(false) {
            return;
        }
        let value = match self.value.try_borrow_mut() {
            Ok(mut slot) => slot.take(),
            Err(_) => {
                log::warn!(
                    "{} destroyed while borrowed; value released with its last reference",
                    std::any::type_name::<T>()
                );
                None
            }
        };
        drop(value);
    }

    fn borrow(&self) -> Option<Ref<'_, T>> {
        if !self.valid.get() {
            return None;
        }
        let slot = self.value.try_borrow().ok()?;
        Ref::filter_map(slot, Option::as_ref).ok()
    }

    fn borrow_mut(&self) -> Option<RefMut<'_, T>> {
        if !self.valid.get() {
            return None;
        }
        let slot = self.value.try_borrow_mut().ok()?;
        RefMut::filter_map(slot, Option::as_mut).ok()
    }
}

/// Native owner of an exposed object.
///
/// Dropping it destroys the value while the ownership tag is
/// [`Ownership::Native`]; wrappers created earlier stay reachable from
/// script but resolve to nothing.
pub struct Object<T: 'static> {
    cell: Rc<ObjectCell<T>>,
}

impl<T: 'static> Object<T> {
    pub fn new(value: T) -> Self {
        Self {
            cell: Rc::new(ObjectCell::new(value)),
        }
    }

    pub fn ownership(&self) -> Ownership {
        self.cell.ownership.get()
    }

    pub fn is_valid(&self) -> bool {
        self.cell.valid.get()
    }

    /// Run `f` on the value; `None` if destroyed or mutably borrowed
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> Option<R> {
        self.cell.borrow().map(|value| f(&value))
    }

    pub fn with_mut<R>(&self, f: impl FnOnce(&mut T) -> R) -> Option<R> {
        self.cell.borrow_mut().map(|mut value| f(&mut value))
    }

    /// Non-owning view of this object
    pub fn downgrade(&self) -> ObjectRef<T> {
        ObjectRef {
            cell: Rc::downgrade(&self.cell),
        }
    }
}

impl<T: Scriptable> Object<T> {
    /// Create a new script wrapper for this object.
    ///
    /// Each call creates an independent wrapper; all of them share this
    /// object's validity flag. Fails when `T` has no prototype in `context`.
    pub fn to_js_value(&self, context: &mut Context) -> JsResult<JsValue> {
        let prototype = prototype_for::<T>(context)?;
        let reference = OpaqueReference {
            cell: Rc::clone(&self.cell),
        };
        Ok(JsObject::from_proto_and_data(prototype, reference).into())
    }

    /// Hand the object over to the script heap and return its wrapper.
    ///
    /// The ownership tag becomes [`Ownership::Script`]; from then on only the
    /// collector destroys the object.
    pub fn into_script(self, context: &mut Context) -> JsResult<JsValue> {
        let wrapper = self.to_js_value(context)?;
        self.cell.ownership.set(Ownership::Script);
        Ok(wrapper)
    }

    /// Resolve a script wrapper of class `T` to its object.
    ///
    /// Returns `None` for values that are not wrappers of `T` and for
    /// wrappers whose object has been destroyed.
    pub fn get_native_object(value: &JsValue) -> Option<ObjectRef<T>> {
        let object = value.as_object()?;
        let reference = object.downcast_ref::<OpaqueReference<T>>()?;
        if !reference.cell.valid.get() {
            return None;
        }
        let cell = Rc::downgrade(&reference.cell);
        Some(ObjectRef { cell })
    }
}

impl<T: 'static> Drop for Object<T> {
    fn drop(&mut self) {
        if self.cell.ownership.get() == Ownership::Native {
            self.cell.destroy();
        }
    }
}

impl<T: fmt::Debug + 'static> fmt::Debug for Object<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Object")
            .field("ownership", &self.ownership())
            .field("value", &self.cell.borrow().as_deref())
            .finish()
    }
}

/// Non-owning view of an exposed object
pub struct ObjectRef<T> {
    cell: Weak<ObjectCell<T>>,
}

impl<T> ObjectRef<T> {
    /// Run `f` on the value; `None` once the object is destroyed
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> Option<R> {
        let cell = self.cell.upgrade()?;
        let value = cell.borrow()?;
        Some(f(&value))
    }

    pub fn with_mut<R>(&self, f: impl FnOnce(&mut T) -> R) -> Option<R> {
        let cell = self.cell.upgrade()?;
        let mut value = cell.borrow_mut()?;
        Some(f(&mut value))
    }

    pub fn is_valid(&self) -> bool {
        self.cell.upgrade().is_some_and(|cell| cell.valid.get())
    }

    /// Whether both views resolve to the same native object
    pub fn same_object(&self, other: &ObjectRef<T>) -> bool {
        Weak::ptr_eq(&self.cell, &other.cell)
    }
}

impl<T> Clone for ObjectRef<T> {
    fn clone(&self) -> Self {
        Self {
            cell: Weak::clone(&self.cell),
        }
    }
}

/// Payload of one script wrapper.
///
/// When its wrapper is collected it destroys a script-owned object, but
/// only if no other wrapper or borrow still reaches the object; the last
/// reference destroys it otherwise.
pub(crate) struct OpaqueReference<T: 'static> {
    cell: Rc<ObjectCell<T>>,
}

impl<T: 'static> Finalize for OpaqueReference<T> {
    fn finalize(&self) {
        let cell = &self.cell;
        if cell.valid.get()
            && cell.ownership.get() == Ownership::Script
            && Rc::strong_count(cell) == 1
        {
            cell.destroy();
        }
    }
}

// SAFETY: the payload holds no garbage-collected pointers.
unsafe impl<T: 'static> Trace for OpaqueReference<T> {
    empty_trace!();
}

impl<T: 'static> JsData for OpaqueReference<T> {}
