//! Identity-based program cache.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use tracing::debug;

use ember_core::{GpuContext, GraphicsService};

use crate::error::ProgramError;
use crate::program::GraphicsProgram;

/// Deduplication cache for compiled programs, keyed by program identity
/// (the joined shader names).
///
/// Entries are weak: the cache never keeps a program alive on its own, so
/// the last owner's drop still releases the device handle. A later request
/// for the same identity recompiles.
#[derive(Debug, Default)]
pub struct ProgramCache {
    programs: HashMap<String, Weak<GraphicsProgram>>,
}

impl ProgramCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// The live program for this shader combination, compiling one if no
    /// owner currently holds it. Material programs get their sampler/UBO
    /// convention applied right after the fresh compile, and only then.
    pub fn get_or_create(
        &mut self,
        service: &Arc<dyn GraphicsService>,
        gpu: &GpuContext,
        vertex: &str,
        geometry: Option<&str>,
        fragment: &str,
        material_required: bool,
    ) -> Result<Arc<GraphicsProgram>, ProgramError> {
        let key = GraphicsProgram::name_for(vertex, geometry, fragment);

        if let Some(live) = self.programs.get(&key).and_then(Weak::upgrade) {
            debug!("program '{key}' served from cache");
            return Ok(live);
        }

        let program = match geometry {
            Some(geometry) => GraphicsProgram::with_geometry(
                Arc::clone(service),
                gpu,
                vertex,
                geometry,
                fragment,
                material_required,
            )?,
            None => GraphicsProgram::new(
                Arc::clone(service),
                gpu,
                vertex,
                fragment,
                material_required,
            )?,
        };
        if material_required {
            program.set_samplers_and_ubos(gpu);
        }

        let shared = Arc::new(program);
        self.programs.retain(|_, weak| weak.strong_count() > 0);
        self.programs.insert(key, Arc::downgrade(&shared));
        Ok(shared)
    }

    /// Number of cached programs still owned by somebody.
    pub fn live_count(&self) -> usize {
        self.programs
            .values()
            .filter(|weak| weak.strong_count() > 0)
            .count()
    }
}
