//! User callbacks standing in for a host scripting layer.
//!
//! A host that supports scripted colvars keeps a [`ScriptRegistry`] and
//! forwards the scripting entry points of
//! [`ColvarProxy`](crate::proxy::ColvarProxy) to it. Registering any callback
//! switches on the "have scripts" flag; registering a force callback also
//! marks the force script as defined.

use crate::error::{ProxyError, ProxyResult};
use crate::types::{ColvarValue, Gradient};
use std::collections::HashMap;
use std::fmt;

/// Computes a colvar value from the values of its components.
pub type ValueCallback = Box<dyn FnMut(&[&ColvarValue]) -> ProxyResult<ColvarValue> + Send>;

/// Computes one gradient matrix per component of a colvar.
pub type GradientCallback = Box<dyn FnMut(&[&ColvarValue]) -> ProxyResult<Vec<Gradient>> + Send>;

/// Applies user-defined forces once per step.
pub type ForceCallback = Box<dyn FnMut() -> ProxyResult<()> + Send>;

/// Availability flags for a scripting layer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScriptingFlags {
    /// A user force script is defined
    pub force_script_defined: bool,
    /// A scripting interface is available
    pub have_scripts: bool,
}

/// Named colvar callbacks plus an optional force callback.
#[derive(Default)]
pub struct ScriptRegistry {
    values: HashMap<String, ValueCallback>,
    gradients: HashMap<String, GradientCallback>,
    force: Option<ForceCallback>,
}

impl fmt::Debug for ScriptRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut values: Vec<_> = self.values.keys().collect();
        values.sort();
        let mut gradients: Vec<_> = self.gradients.keys().collect();
        gradients.sort();
        f.debug_struct("ScriptRegistry")
            .field("values", &values)
            .field("gradients", &gradients)
            .field("force", &self.force.is_some())
            .finish()
    }
}

impl ScriptRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the value callback of colvar `name`, replacing any previous one.
    pub fn set_value_callback(&mut self, name: &str, cb: ValueCallback) {
        self.values.insert(name.to_string(), cb);
    }

    /// Registers the gradient callback of colvar `name`, replacing any previous one.
    pub fn set_gradient_callback(&mut self, name: &str, cb: GradientCallback) {
        self.gradients.insert(name.to_string(), cb);
    }

    /// Registers the per-step force callback.
    pub fn set_force_callback(&mut self, cb: ForceCallback) {
        self.force = Some(cb);
    }

    /// Flags describing what this registry provides.
    pub fn flags(&self) -> ScriptingFlags {
        ScriptingFlags {
            force_script_defined: self.force.is_some(),
            have_scripts: self.force.is_some() || !self.values.is_empty() || !self.gradients.is_empty(),
        }
    }

    /// Runs the force callback.
    pub fn run_force(&mut self) -> ProxyResult<()> {
        match self.force.as_mut() {
            Some(cb) => cb(),
            None => Err(ProxyError::not_implemented("force script")),
        }
    }

    /// Runs the value callback of colvar `name` and stores the result in `value`.
    pub fn run_value(&mut self, name: &str, cvcs: &[&ColvarValue], value: &mut ColvarValue) -> ProxyResult<()> {
        let cb = self
            .values
            .get_mut(name)
            .ok_or_else(|| ProxyError::not_implemented(format!("value script for colvar \"{}\"", name)))?;
        *value = cb(cvcs)?;
        Ok(())
    }

    /// Runs the gradient callback of colvar `name` and stores one matrix per
    /// component in `gradient`.
    pub fn run_gradient(
        &mut self,
        name: &str,
        cvcs: &[&ColvarValue],
        gradient: &mut Vec<Gradient>,
    ) -> ProxyResult<()> {
        let cb = self
            .gradients
            .get_mut(name)
            .ok_or_else(|| ProxyError::not_implemented(format!("gradient script for colvar \"{}\"", name)))?;
        let result = cb(cvcs)?;
        if result.len() != cvcs.len() {
            return Err(ProxyError::Input(format!(
                "gradient script for colvar \"{}\" returned {} matrices for {} components",
                name,
                result.len(),
                cvcs.len()
            )));
        }
        *gradient = result;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::DMatrix;

    #[test]
    fn test_empty_registry_reports_not_implemented() {
        let mut reg = ScriptRegistry::new();
        let mut value = ColvarValue::default();
        assert_eq!(reg.flags(), ScriptingFlags::default());
        assert!(reg.run_force().unwrap_err().is_not_implemented());
        assert!(reg.run_value("d", &[], &mut value).unwrap_err().is_not_implemented());
    }

    #[test]
    fn test_value_callback_sums_components() {
        let mut reg = ScriptRegistry::new();
        reg.set_value_callback(
            "sum",
            Box::new(|cvcs| Ok(ColvarValue::Scalar(cvcs.iter().filter_map(|v| v.as_scalar()).sum()))),
        );
        assert!(reg.flags().have_scripts);
        assert!(!reg.flags().force_script_defined);

        let a = ColvarValue::Scalar(1.5);
        let b = ColvarValue::Scalar(2.0);
        let mut out = ColvarValue::default();
        reg.run_value("sum", &[&a, &b], &mut out).unwrap();
        assert_eq!(out, ColvarValue::Scalar(3.5));
    }

    #[test]
    fn test_gradient_callback_must_match_components() {
        let mut reg = ScriptRegistry::new();
        reg.set_gradient_callback("g", Box::new(|_| Ok(vec![DMatrix::zeros(1, 3)])));
        let a = ColvarValue::Scalar(1.0);
        let b = ColvarValue::Scalar(1.0);
        let mut grad = Vec::new();

        reg.run_gradient("g", &[&a], &mut grad).unwrap();
        assert_eq!(grad.len(), 1);
        assert!(reg.run_gradient("g", &[&a, &b], &mut grad).is_err());
    }

    #[test]
    fn test_force_callback_sets_flag() {
        let mut reg = ScriptRegistry::new();
        reg.set_force_callback(Box::new(|| Ok(())));
        assert!(reg.flags().force_script_defined);
        reg.run_force().unwrap();
    }
}
