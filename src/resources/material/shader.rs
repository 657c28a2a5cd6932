//! User-authored shader materials.
//!
//! The template is rendered by the same engine as the built-in programs,
//! so it can `{$ include "uniforms" $}` shared chunks. User uniforms are
//! appended to the program's single uniform block after the built-in
//! object and camera members; the template reads them as `u.<name>`.
//! Texture uniforms are declared as `t_<name>` / `s_<name>` pairs.

use std::hash::{Hash, Hasher};

use rustc_hash::FxHasher;
use xxhash_rust::xxh3::xxh3_64;

use crate::resources::shader_defines::ShaderDefines;
use crate::resources::uniforms::UniformValue;

#[derive(Debug, Clone, PartialEq)]
pub struct ShaderMaterial {
    template: String,
    source_hash: u64,
    uniforms: Vec<(String, UniformValue)>,
    pub defines: ShaderDefines,
    /// Declare the scene light arrays in the program.
    pub lights: bool,
    /// Declare fog uniforms in the program.
    pub fog: bool,
}

impl ShaderMaterial {
    #[must_use]
    pub fn new(template: impl Into<String>) -> Self {
        let template = template.into();
        Self {
            source_hash: xxh3_64(template.as_bytes()),
            template,
            uniforms: Vec::new(),
            defines: ShaderDefines::new(),
            lights: false,
            fog: false,
        }
    }

    #[must_use]
    pub fn template(&self) -> &str {
        &self.template
    }

    pub fn set_template(&mut self, template: impl Into<String>) {
        self.template = template.into();
        self.source_hash = xxh3_64(self.template.as_bytes());
    }

    #[must_use]
    pub fn source_hash(&self) -> u64 {
        self.source_hash
    }

    /// Sets a uniform, appending it when the name is new.
    pub fn set_uniform(&mut self, name: &str, value: impl Into<UniformValue>) {
        let value = value.into();
        match self.uniforms.iter_mut().find(|(n, _)| n == name) {
            Some((_, slot)) => *slot = value,
            None => self.uniforms.push((name.to_owned(), value)),
        }
    }

    #[must_use]
    pub fn with_uniform(mut self, name: &str, value: impl Into<UniformValue>) -> Self {
        self.set_uniform(name, value);
        self
    }

    #[must_use]
    pub fn uniform(&self, name: &str) -> Option<&UniformValue> {
        self.uniforms.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    #[must_use]
    pub fn uniforms(&self) -> &[(String, UniformValue)] {
        &self.uniforms
    }

    /// Hash of everything that changes the generated program: template,
    /// defines and the name and shape of every uniform.
    #[must_use]
    pub fn layout_hash(&self) -> u64 {
        let mut h = FxHasher::default();
        self.source_hash.hash(&mut h);
        self.defines.hash(&mut h);
        self.lights.hash(&mut h);
        self.fog.hash(&mut h);
        for (name, value) in &self.uniforms {
            name.hash(&mut h);
            std::mem::discriminant(value).hash(&mut h);
            match value {
                UniformValue::Vec4Array(v) => v.len().hash(&mut h),
                UniformValue::Mat4Array(v) => v.len().hash(&mut h),
                _ => {}
            }
        }
        h.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    #[test]
    fn value_changes_keep_layout_hash() {
        let mut m = ShaderMaterial::new("x").with_uniform("tint", Vec3::ONE);
        let h = m.layout_hash();
        m.set_uniform("tint", Vec3::ZERO);
        assert_eq!(m.layout_hash(), h);
        m.set_uniform("strength", 1.0);
        assert_ne!(m.layout_hash(), h);
    }
}
