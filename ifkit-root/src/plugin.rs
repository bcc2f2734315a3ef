//! Named plugin registries.
//!
//! Two process-wide families exist: `"rootfinder"` (numeric solve steps) and
//! `"linsol"` (linear solvers). Built-in plugins are registered the first time a
//! family is accessed; callers may add or replace entries at any time.

use std::collections::BTreeMap;
use std::sync::{Arc, OnceLock, PoisonError, RwLock};

use crate::error::{Error, Result};
use crate::linsol::{DenseLu, LinearSolver};
use crate::options::{check_options, format_table, Dict, OptionInfo};
use crate::solvers::newton::{Newton, NEWTON_OPTIONS};
use crate::solvers::RootSolver;

/// Factory of a rootfinder plugin: builds the solve step from its options.
pub type RootSolverFactory = dyn Fn(&Dict) -> Result<Box<dyn RootSolver>> + Send + Sync;

/// Factory of a linear solver plugin.
pub type LinsolFactory = dyn Fn(&Dict) -> Result<Box<dyn LinearSolver>> + Send + Sync;

/// A registered plugin: documentation, option table and factory.
pub struct Plugin<F: ?Sized> {
    name: String,
    doc: String,
    options: &'static [OptionInfo],
    factory: Arc<F>,
}

impl<F: ?Sized> Clone for Plugin<F> {
    fn clone(&self) -> Self {
        Plugin {
            name: self.name.clone(),
            doc: self.doc.clone(),
            options: self.options,
            factory: Arc::clone(&self.factory),
        }
    }
}

impl<F: ?Sized> Plugin<F> {
    pub fn new(name: &str, doc: &str, options: &'static [OptionInfo], factory: Arc<F>) -> Self {
        Plugin {
            name: name.to_string(),
            doc: doc.to_string(),
            options,
            factory,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn options(&self) -> &'static [OptionInfo] {
        self.options
    }

    pub fn factory(&self) -> &F {
        &self.factory
    }

    /// Description followed by the option table.
    pub fn doc(&self) -> String {
        let mut out = format!("{}\n", self.doc);
        if !self.options.is_empty() {
            out.push_str("\nOptions:\n");
            out.push_str(&format_table(self.options));
        }
        out
    }
}

/// A family of plugins addressed by name.
pub struct Registry<F: ?Sized> {
    family: &'static str,
    plugins: RwLock<BTreeMap<String, Plugin<F>>>,
}

impl<F: ?Sized> Registry<F> {
    pub fn new(family: &'static str) -> Self {
        Registry {
            family,
            plugins: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn family(&self) -> &'static str {
        self.family
    }

    /// Add a plugin, replacing any plugin of the same name.
    pub fn register(&self, plugin: Plugin<F>) {
        log::debug!("registering {} plugin '{}'", self.family, plugin.name);
        let mut map = self.plugins.write().unwrap_or_else(PoisonError::into_inner);
        map.insert(plugin.name.clone(), plugin);
    }

    pub fn has(&self, name: &str) -> bool {
        let map = self.plugins.read().unwrap_or_else(PoisonError::into_inner);
        map.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Result<Plugin<F>> {
        let map = self.plugins.read().unwrap_or_else(PoisonError::into_inner);
        map.get(name).cloned().ok_or_else(|| Error::UnknownPlugin {
            family: self.family,
            name: name.to_string(),
        })
    }

    pub fn doc(&self, name: &str) -> Result<String> {
        Ok(self.get(name)?.doc())
    }

    /// Registered names in sorted order.
    pub fn names(&self) -> Vec<String> {
        let map = self.plugins.read().unwrap_or_else(PoisonError::into_inner);
        map.keys().cloned().collect()
    }
}

pub(crate) fn rootfinder_registry() -> &'static Registry<RootSolverFactory> {
    static REGISTRY: OnceLock<Registry<RootSolverFactory>> = OnceLock::new();
    REGISTRY.get_or_init(|| {
        let registry = Registry::new("rootfinder");
        let newton: Arc<RootSolverFactory> =
            Arc::new(|opts: &Dict| -> Result<Box<dyn RootSolver>> {
                Ok(Box::new(Newton::from_options(opts)?))
            });
        registry.register(Plugin::new(
            "newton",
            "Damped Newton iteration with Armijo backtracking on the residual norm.",
            NEWTON_OPTIONS,
            newton,
        ));
        registry
    })
}

pub(crate) fn linsol_registry() -> &'static Registry<LinsolFactory> {
    static REGISTRY: OnceLock<Registry<LinsolFactory>> = OnceLock::new();
    REGISTRY.get_or_init(|| {
        let registry = Registry::new("linsol");
        let lu: Arc<LinsolFactory> = Arc::new(|opts: &Dict| -> Result<Box<dyn LinearSolver>> {
            check_options(&[], opts)?;
            Ok(Box::new(DenseLu::new()))
        });
        registry.register(Plugin::new(
            "lu",
            "Dense LU factorization with partial pivoting.",
            &[],
            lu,
        ));
        #[cfg(feature = "sparse")]
        {
            let sparse_lu: Arc<LinsolFactory> =
                Arc::new(|opts: &Dict| -> Result<Box<dyn LinearSolver>> {
                    check_options(&[], opts)?;
                    Ok(Box::new(crate::linsol::SparseLu::new()))
                });
            registry.register(Plugin::new(
                "sparse_lu",
                "Sparse direct LU factorization (faer).",
                &[],
                sparse_lu,
            ));
        }
        registry
    })
}

/// Register a rootfinder plugin, replacing any plugin of the same name.
pub fn register_rootfinder<F>(name: &str, doc: &str, options: &'static [OptionInfo], factory: F)
where
    F: Fn(&Dict) -> Result<Box<dyn RootSolver>> + Send + Sync + 'static,
{
    let factory: Arc<RootSolverFactory> = Arc::new(factory);
    rootfinder_registry().register(Plugin::new(name, doc, options, factory));
}

/// Whether a rootfinder plugin called `name` is registered.
pub fn has_rootfinder(name: &str) -> bool {
    rootfinder_registry().has(name)
}

/// Make sure the rootfinder plugin `name` is available.
pub fn load_rootfinder(name: &str) -> Result<()> {
    rootfinder_registry().get(name).map(|_| ())
}

/// Documentation and option table of the rootfinder plugin `name`.
pub fn doc_rootfinder(name: &str) -> Result<String> {
    rootfinder_registry().doc(name)
}

/// Names of all registered rootfinder plugins.
pub fn rootfinder_plugins() -> Vec<String> {
    rootfinder_registry().names()
}

/// Register a linear solver plugin, replacing any plugin of the same name.
pub fn register_linsol<F>(name: &str, doc: &str, options: &'static [OptionInfo], factory: F)
where
    F: Fn(&Dict) -> Result<Box<dyn LinearSolver>> + Send + Sync + 'static,
{
    let factory: Arc<LinsolFactory> = Arc::new(factory);
    linsol_registry().register(Plugin::new(name, doc, options, factory));
}

pub fn has_linsol(name: &str) -> bool {
    linsol_registry().has(name)
}

pub fn doc_linsol(name: &str) -> Result<String> {
    linsol_registry().doc(name)
}

/// Instantiate the linear solver plugin `name`.
pub fn linsol(name: &str, opts: &Dict) -> Result<Box<dyn LinearSolver>> {
    let plugin = linsol_registry().get(name)?;
    (plugin.factory())(opts)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtins_are_registered_lazily() {
        assert!(has_rootfinder("newton"));
        assert!(has_linsol("lu"));
        assert!(rootfinder_plugins().contains(&"newton".to_string()));
    }

    #[test]
    fn unknown_plugin_is_reported() {
        assert_eq!(
            load_rootfinder("no-such-solver"),
            Err(Error::UnknownPlugin {
                family: "rootfinder",
                name: "no-such-solver".into()
            })
        );
        assert!(linsol("no-such-linsol", &Dict::new()).is_err());
    }

    #[test]
    fn doc_lists_options() {
        let doc = doc_rootfinder("newton").unwrap();
        assert!(doc.contains("abstol"));
        assert!(doc.contains("max_iter"));
    }

    #[test]
    fn local_registry_replaces_by_name() {
        let reg: Registry<dyn Fn() -> u32 + Send + Sync> = Registry::new("test");
        let first: Arc<dyn Fn() -> u32 + Send + Sync> = Arc::new(|| 1);
        let second: Arc<dyn Fn() -> u32 + Send + Sync> = Arc::new(|| 2);
        reg.register(Plugin::new("a", "first", &[], first));
        reg.register(Plugin::new("a", "second", &[], second));
        assert_eq!(reg.names(), vec!["a".to_string()]);
        assert_eq!((reg.get("a").unwrap().factory())(), 2);
        assert!(reg.doc("a").unwrap().starts_with("second"));
    }
}
