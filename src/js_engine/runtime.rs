//! Script runtime shared by every context
//!
//! Holds the class table and the module loader configuration. Class
//! identifiers live as long as the runtime; prototypes are per context.

use super::class::{ClassId, ClassRecord, Scriptable};
use crate::config::EngineConfig;
use crate::utils::error::{Result, ScriptError};
use boa_engine::Context;
use boa_engine::module::SimpleModuleLoader;
use std::any::TypeId;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

/// Runtime owning the class table
pub struct Runtime {
    config: EngineConfig,
    classes: RefCell<HashMap<TypeId, ClassRecord>>,
    next_class_id: Cell<u32>,
}

impl Runtime {
    pub fn new(config: EngineConfig) -> Rc<Self> {
        Rc::new(Self {
            config,
            classes: RefCell::new(HashMap::new()),
            next_class_id: Cell::new(1),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Register `T`, allocating its class id on first use
    pub fn register_class<T: Scriptable>(&self) -> ClassId {
        let mut classes = self.classes.borrow_mut();
        if let Some(record) = classes.get(&TypeId::of::<T>()) {
            return record.id;
        }

        let id = ClassId(self.next_class_id.get());
        self.next_class_id.set(id.0 + 1);
        classes.insert(TypeId::of::<T>(), ClassRecord { id, name: T::NAME });
        log::debug!("registered class {} as {id}", T::NAME);
        id
    }

    pub fn class_record<T: 'static>(&self) -> Option<ClassRecord> {
        self.classes.borrow().get(&TypeId::of::<T>()).cloned()
    }

    pub fn class_count(&self) -> usize {
        self.classes.borrow().len()
    }

    /// Build a fresh evaluation context with the module loader attached
    pub(crate) fn build_context(&self) -> Result<Context> {
        let root = &self.config.module_root;
        match SimpleModuleLoader::new(root) {
            Ok(loader) => Context::builder()
                .module_loader(Rc::new(loader))
                .build()
                .map_err(|err| ScriptError::Context(err.to_string()).into()),
            Err(err) => {
                log::warn!(
                    "module root {} unusable ({err}); imports are disabled",
                    root.display()
                );
                Ok(Context::default())
            }
        }
    }
}
