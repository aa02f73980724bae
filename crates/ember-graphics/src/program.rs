//! Compiled shader programs.

use std::collections::HashMap;
use std::sync::Arc;
use std::thread::{self, ThreadId};

use tracing::{debug, warn};

use ember_core::{Element, GpuContext, GraphicsService, ProgramHandle};

use crate::bindings::{
    MaterialBindings, AMBIENT_SAMPLER, DIFFUSE_SAMPLER, NORMAL_SAMPLER, OPACITY_SAMPLER,
    SHADOW_DIRECTIONAL_SAMPLER, SHADOW_POINT_SAMPLER, SPECULAR_SAMPLER,
};
use crate::error::ProgramError;

const NAME_SEPARATOR: &str = "|";

/// A (vertex, optional geometry, fragment) shader triple compiled into one
/// device program.
///
/// The compiled handle is exclusively owned and released exactly once on
/// drop; what persists across runs is only the construction description
/// (shader names and the material flag), see [`GraphicsProgram::serialize`].
pub struct GraphicsProgram {
    service: Arc<dyn GraphicsService>,
    program_name: String,
    vertex_shader: String,
    geometry_shader: Option<String>,
    fragment_shader: String,
    material_required: bool,
    program_id: ProgramHandle,
    uniforms: HashMap<String, u32>,
    outputs: HashMap<String, u32>,
    device_thread: ThreadId,
}

impl GraphicsProgram {
    /// Compile a two-stage program.
    pub fn new(
        service: Arc<dyn GraphicsService>,
        gpu: &GpuContext,
        vertex: impl Into<String>,
        fragment: impl Into<String>,
        material_required: bool,
    ) -> Result<Self, ProgramError> {
        Self::compile(service, gpu, vertex.into(), None, fragment.into(), material_required)
    }

    /// Compile a three-stage program with a geometry shader.
    pub fn with_geometry(
        service: Arc<dyn GraphicsService>,
        gpu: &GpuContext,
        vertex: impl Into<String>,
        geometry: impl Into<String>,
        fragment: impl Into<String>,
        material_required: bool,
    ) -> Result<Self, ProgramError> {
        Self::compile(
            service,
            gpu,
            vertex.into(),
            Some(geometry.into()),
            fragment.into(),
            material_required,
        )
    }

    /// The identity two programs are interchangeable under.
    pub fn name_for(vertex: &str, geometry: Option<&str>, fragment: &str) -> String {
        match geometry {
            Some(geometry) => {
                format!("{vertex}{NAME_SEPARATOR}{geometry}{NAME_SEPARATOR}{fragment}")
            }
            None => format!("{vertex}{NAME_SEPARATOR}{fragment}"),
        }
    }

    fn compile(
        service: Arc<dyn GraphicsService>,
        gpu: &GpuContext,
        vertex: String,
        geometry: Option<String>,
        fragment: String,
        material_required: bool,
    ) -> Result<Self, ProgramError> {
        let program_name = Self::name_for(&vertex, geometry.as_deref(), &fragment);
        let compiled =
            service.compile_program(&vertex, geometry.as_deref().unwrap_or(""), &fragment)?;
        debug!(
            "compiled program '{}' with {} uniforms",
            program_name,
            compiled.uniforms.len()
        );
        Ok(Self {
            service,
            program_name,
            vertex_shader: vertex,
            geometry_shader: geometry,
            fragment_shader: fragment,
            material_required,
            program_id: compiled.handle,
            uniforms: compiled.uniforms,
            outputs: compiled.outputs,
            device_thread: gpu.thread(),
        })
    }

    pub fn program_name(&self) -> &str {
        &self.program_name
    }

    pub fn id(&self) -> ProgramHandle {
        self.program_id
    }

    pub fn vertex_shader(&self) -> &str {
        &self.vertex_shader
    }

    pub fn geometry_shader(&self) -> Option<&str> {
        self.geometry_shader.as_deref()
    }

    pub fn fragment_shader(&self) -> &str {
        &self.fragment_shader
    }

    pub fn material_required(&self) -> bool {
        self.material_required
    }

    /// Uniform name to binding location, as reflected at compile time.
    pub fn uniforms(&self) -> &HashMap<String, u32> {
        &self.uniforms
    }

    /// Fragment-output name to binding location.
    pub fn outputs(&self) -> &HashMap<String, u32> {
        &self.outputs
    }

    pub fn set_uniform_i32(&self, name: &str, value: i32) -> bool {
        self.service.set_uniform_i32(self.program_id, name, value)
    }

    pub fn set_uniform_f32(&self, name: &str, value: f32) -> bool {
        self.service.set_uniform_f32(self.program_id, name, value)
    }

    pub fn set_uniform_vec3(&self, name: &str, value: ember_core::Vec3) -> bool {
        self.service.set_uniform_vec3(self.program_id, name, value)
    }

    /// Apply the default material convention. See
    /// [`GraphicsProgram::set_samplers_and_ubos_with`].
    pub fn set_samplers_and_ubos(&self, gpu: &GpuContext) {
        self.set_samplers_and_ubos_with(gpu, &MaterialBindings::default());
    }

    /// Bind the material sampler units and attach the shared per-model
    /// uniform blocks.
    ///
    /// The opacity sampler is bound only when the compiled program declared
    /// it; not every material carries an opacity map. Any other absent
    /// sampler is reported and skipped, a partially bound material still
    /// renders.
    pub fn set_samplers_and_ubos_with(&self, gpu: &GpuContext, bindings: &MaterialBindings) {
        debug_assert_eq!(
            gpu.thread(),
            self.device_thread,
            "material bindings applied off the device thread"
        );

        for (name, unit) in [
            (DIFFUSE_SAMPLER, bindings.diffuse_unit),
            (AMBIENT_SAMPLER, bindings.ambient_unit),
            (SPECULAR_SAMPLER, bindings.specular_unit),
        ] {
            if !self.set_uniform_i32(name, unit) {
                warn!("uniform \"{name}\" could not be set on '{}'", self.program_name);
            }
        }

        if self.uniforms.contains_key(OPACITY_SAMPLER)
            && !self.set_uniform_i32(OPACITY_SAMPLER, bindings.opacity_unit)
        {
            warn!(
                "uniform \"{OPACITY_SAMPLER}\" could not be set on '{}'",
                self.program_name
            );
        }

        if !self.set_uniform_i32(NORMAL_SAMPLER, bindings.normal_unit) {
            warn!(
                "uniform \"{NORMAL_SAMPLER}\" could not be set on '{}'",
                self.program_name
            );
        }

        // The top texture units feed the shadow pre-pass results back in.
        let max_units = self.service.max_texture_image_units();
        if !self.set_uniform_i32(
            SHADOW_DIRECTIONAL_SAMPLER,
            bindings.shadow_directional_unit(max_units),
        ) {
            warn!(
                "uniform \"{SHADOW_DIRECTIONAL_SAMPLER}\" could not be set on '{}'",
                self.program_name
            );
        }
        if !self.set_uniform_i32(SHADOW_POINT_SAMPLER, bindings.shadow_point_unit(max_units)) {
            warn!(
                "uniform \"{SHADOW_POINT_SAMPLER}\" could not be set on '{}'",
                self.program_name
            );
        }

        self.service.attach_model_ubo(self.program_id);
        self.service.attach_model_indices_ubo(self.program_id);
    }

    /// Append this program's description to `parent`.
    ///
    /// Only construction inputs are persisted. Handles and binding locations
    /// are rebuilt by a fresh compile when the description is read back.
    pub fn serialize(&self, parent: &mut Element) {
        let node = parent.add_child(Element::new("GraphicsProgram"));
        node.add_child(Element::with_text("VertexShader", self.vertex_shader.as_str()));
        node.add_child(Element::with_text(
            "GeometryShader",
            self.geometry_shader.as_deref().unwrap_or(""),
        ));
        node.add_child(Element::with_text(
            "FragmentShader",
            self.fragment_shader.as_str(),
        ));
        node.add_child(Element::with_text(
            "MaterialRequired",
            if self.material_required { "True" } else { "False" },
        ));
    }

    /// Rebuild a program from a persisted description node.
    ///
    /// Vertex and fragment entries are required; a missing or empty geometry
    /// entry means a two-stage program. A missing or unrecognized
    /// MaterialRequired flag falls back to `false` with a warning. When the
    /// flag is set, the material convention is applied once, right here.
    pub fn deserialize(
        node: &Element,
        service: Arc<dyn GraphicsService>,
        gpu: &GpuContext,
    ) -> Result<Self, ProgramError> {
        let vertex = match node.child_text("VertexShader") {
            Some(text) if !text.is_empty() => text.to_string(),
            Some(_) => {
                return Err(ProgramError::MalformedDescription(
                    "vertex shader entry has no text".to_string(),
                ))
            }
            None => {
                return Err(ProgramError::MalformedDescription(
                    "vertex shader entry is missing".to_string(),
                ))
            }
        };

        let geometry = match node.child_text("GeometryShader") {
            Some(text) if !text.is_empty() => Some(text.to_string()),
            _ => {
                debug!("program description has no geometry stage");
                None
            }
        };

        let fragment = match node.child_text("FragmentShader") {
            Some(text) if !text.is_empty() => text.to_string(),
            Some(_) => {
                return Err(ProgramError::MalformedDescription(
                    "fragment shader entry has no text".to_string(),
                ))
            }
            None => {
                return Err(ProgramError::MalformedDescription(
                    "fragment shader entry is missing".to_string(),
                ))
            }
        };

        let material_required = match node.child_text("MaterialRequired") {
            Some("True") => true,
            Some("False") => false,
            Some(other) => {
                warn!("material-required flag '{other}' not recognized, assuming not required");
                false
            }
            None => {
                warn!("material-required flag not found, assuming not required");
                false
            }
        };

        let program = match geometry {
            Some(geometry) => {
                Self::with_geometry(service, gpu, vertex, geometry, fragment, material_required)?
            }
            None => Self::new(service, gpu, vertex, fragment, material_required)?,
        };
        if program.material_required {
            program.set_samplers_and_ubos(gpu);
        }
        Ok(program)
    }
}

impl std::fmt::Debug for GraphicsProgram {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphicsProgram")
            .field("program_name", &self.program_name)
            .field("program_id", &self.program_id)
            .field("material_required", &self.material_required)
            .finish_non_exhaustive()
    }
}

impl Drop for GraphicsProgram {
    fn drop(&mut self) {
        debug_assert_eq!(
            thread::current().id(),
            self.device_thread,
            "program released off the device thread"
        );
        self.service.destroy_program(self.program_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bindings;
    use ember_core::{CompiledProgram, GraphicsError, TextureHandle, TextureMetaData};
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Service double that "reflects" a fixed uniform set and records what
    /// the program layer does with it.
    struct RecordingService {
        declared: Vec<String>,
        max_units: i32,
        fail_compile: bool,
        next_handle: AtomicU32,
        set_calls: Mutex<Vec<(String, i32)>>,
        model_ubo_attached: Mutex<Vec<ProgramHandle>>,
        indices_ubo_attached: Mutex<Vec<ProgramHandle>>,
        destroyed: Mutex<Vec<ProgramHandle>>,
    }

    impl RecordingService {
        fn base(names: &[&str]) -> Self {
            Self {
                declared: names.iter().map(|n| n.to_string()).collect(),
                max_units: 16,
                fail_compile: false,
                next_handle: AtomicU32::new(0),
                set_calls: Mutex::new(Vec::new()),
                model_ubo_attached: Mutex::new(Vec::new()),
                indices_ubo_attached: Mutex::new(Vec::new()),
                destroyed: Mutex::new(Vec::new()),
            }
        }

        fn with_uniforms(names: &[&str]) -> Arc<Self> {
            Arc::new(Self::base(names))
        }

        fn failing() -> Arc<Self> {
            let mut service = Self::base(&[]);
            service.fail_compile = true;
            Arc::new(service)
        }

        fn material_set() -> Arc<Self> {
            Self::with_uniforms(&[
                bindings::DIFFUSE_SAMPLER,
                bindings::AMBIENT_SAMPLER,
                bindings::SPECULAR_SAMPLER,
                bindings::NORMAL_SAMPLER,
                bindings::SHADOW_DIRECTIONAL_SAMPLER,
                bindings::SHADOW_POINT_SAMPLER,
            ])
        }

        fn set_value(&self, name: &str) -> Option<i32> {
            self.set_calls
                .lock()
                .iter()
                .find(|(n, _)| n == name)
                .map(|(_, v)| *v)
        }
    }

    impl GraphicsService for RecordingService {
        fn compile_program(
            &self,
            _vertex: &str,
            _geometry: &str,
            _fragment: &str,
        ) -> Result<CompiledProgram, GraphicsError> {
            if self.fail_compile {
                return Err(GraphicsError::CompileFailed {
                    diagnostics: "0:12: 'gl_Position' : undeclared identifier".to_string(),
                });
            }
            let handle = ProgramHandle(self.next_handle.fetch_add(1, Ordering::Relaxed) + 1);
            let uniforms = self
                .declared
                .iter()
                .enumerate()
                .map(|(location, name)| (name.clone(), location as u32))
                .collect();
            Ok(CompiledProgram {
                handle,
                uniforms,
                outputs: HashMap::new(),
            })
        }

        fn destroy_program(&self, program: ProgramHandle) {
            self.destroyed.lock().push(program);
        }

        fn set_uniform_i32(&self, _program: ProgramHandle, name: &str, value: i32) -> bool {
            if self.declared.iter().any(|n| n == name) {
                self.set_calls.lock().push((name.to_string(), value));
                true
            } else {
                false
            }
        }

        fn set_uniform_f32(&self, _program: ProgramHandle, _name: &str, _value: f32) -> bool {
            false
        }

        fn set_uniform_vec3(
            &self,
            _program: ProgramHandle,
            _name: &str,
            _value: ember_core::Vec3,
        ) -> bool {
            false
        }

        fn max_texture_image_units(&self) -> i32 {
            self.max_units
        }

        fn attach_model_ubo(&self, program: ProgramHandle) {
            self.model_ubo_attached.lock().push(program);
        }

        fn attach_model_indices_ubo(&self, program: ProgramHandle) {
            self.indices_ubo_attached.lock().push(program);
        }

        fn create_texture(
            &self,
            _metadata: &TextureMetaData,
            _pixels: &[u8],
        ) -> Result<TextureHandle, GraphicsError> {
            unimplemented!("not exercised by program tests")
        }

        fn destroy_texture(&self, _texture: TextureHandle) {}
    }

    #[test]
    fn two_shader_identity_joins_vertex_and_fragment() {
        let service = RecordingService::with_uniforms(&[]);
        let gpu = GpuContext::claim();
        let program =
            GraphicsProgram::new(service, &gpu, "mesh.vert", "mesh.frag", false).unwrap();

        assert_eq!(program.program_name(), "mesh.vert|mesh.frag");
        assert_eq!(program.geometry_shader(), None);
    }

    #[test]
    fn three_shader_identity_includes_the_geometry_stage() {
        let service = RecordingService::with_uniforms(&[]);
        let gpu = GpuContext::claim();
        let program = GraphicsProgram::with_geometry(
            service,
            &gpu,
            "mesh.vert",
            "mesh.geom",
            "mesh.frag",
            false,
        )
        .unwrap();

        assert_eq!(program.program_name(), "mesh.vert|mesh.geom|mesh.frag");
        assert_eq!(program.geometry_shader(), Some("mesh.geom"));
    }

    #[test]
    fn compile_failure_carries_the_diagnostics() {
        let service = RecordingService::failing();
        let gpu = GpuContext::claim();

        match GraphicsProgram::new(service, &gpu, "mesh.vert", "mesh.frag", false) {
            Err(ProgramError::Compile(e)) => {
                assert!(e.to_string().contains("undeclared identifier"));
            }
            other => panic!("expected Compile, got {other:?}"),
        }
    }

    #[test]
    fn compile_populates_the_uniform_map() {
        let service = RecordingService::material_set();
        let gpu = GpuContext::claim();
        let program =
            GraphicsProgram::new(service, &gpu, "mesh.vert", "mesh.frag", true).unwrap();

        assert!(program.uniforms().contains_key(bindings::DIFFUSE_SAMPLER));
        assert!(!program.uniforms().contains_key(bindings::OPACITY_SAMPLER));
    }

    #[test]
    fn samplers_and_ubos_follow_the_default_table() {
        let service = RecordingService::material_set();
        let gpu = GpuContext::claim();
        let program = GraphicsProgram::new(
            Arc::clone(&service) as Arc<dyn GraphicsService>,
            &gpu,
            "mesh.vert",
            "mesh.frag",
            true,
        )
        .unwrap();

        program.set_samplers_and_ubos(&gpu);

        assert_eq!(service.set_value(bindings::DIFFUSE_SAMPLER), Some(1));
        assert_eq!(service.set_value(bindings::AMBIENT_SAMPLER), Some(2));
        assert_eq!(service.set_value(bindings::SPECULAR_SAMPLER), Some(3));
        assert_eq!(service.set_value(bindings::NORMAL_SAMPLER), Some(5));
        // 16 units on the stub device: the reserved top two.
        assert_eq!(
            service.set_value(bindings::SHADOW_DIRECTIONAL_SAMPLER),
            Some(15)
        );
        assert_eq!(service.set_value(bindings::SHADOW_POINT_SAMPLER), Some(14));
        assert_eq!(service.model_ubo_attached.lock().len(), 1);
        assert_eq!(service.indices_ubo_attached.lock().len(), 1);
    }

    #[test]
    fn undeclared_opacity_sampler_is_skipped_without_error() {
        let service = RecordingService::material_set();
        let gpu = GpuContext::claim();
        let program = GraphicsProgram::new(
            Arc::clone(&service) as Arc<dyn GraphicsService>,
            &gpu,
            "mesh.vert",
            "mesh.frag",
            true,
        )
        .unwrap();

        program.set_samplers_and_ubos(&gpu);

        assert_eq!(service.set_value(bindings::OPACITY_SAMPLER), None);
        // Everything else was still attempted.
        assert_eq!(service.set_calls.lock().len(), 6);
    }

    #[test]
    fn declared_opacity_sampler_gets_its_unit() {
        let service = RecordingService::with_uniforms(&[bindings::OPACITY_SAMPLER]);
        let gpu = GpuContext::claim();
        let program = GraphicsProgram::new(
            Arc::clone(&service) as Arc<dyn GraphicsService>,
            &gpu,
            "mesh.vert",
            "mesh.frag",
            true,
        )
        .unwrap();

        program.set_samplers_and_ubos(&gpu);

        assert_eq!(service.set_value(bindings::OPACITY_SAMPLER), Some(4));
    }

    #[test]
    fn serialize_writes_the_full_description() {
        let service = RecordingService::with_uniforms(&[]);
        let gpu = GpuContext::claim();
        let program = GraphicsProgram::with_geometry(
            service,
            &gpu,
            "mesh.vert",
            "mesh.geom",
            "mesh.frag",
            true,
        )
        .unwrap();

        let mut root = Element::new("Material");
        program.serialize(&mut root);

        let node = root.child("GraphicsProgram").unwrap();
        assert_eq!(node.child_text("VertexShader"), Some("mesh.vert"));
        assert_eq!(node.child_text("GeometryShader"), Some("mesh.geom"));
        assert_eq!(node.child_text("FragmentShader"), Some("mesh.frag"));
        assert_eq!(node.child_text("MaterialRequired"), Some("True"));
    }

    #[test]
    fn description_round_trip_preserves_identity_not_handles() {
        let service = RecordingService::material_set();
        let gpu = GpuContext::claim();
        let original = GraphicsProgram::new(
            Arc::clone(&service) as Arc<dyn GraphicsService>,
            &gpu,
            "mesh.vert",
            "mesh.frag",
            true,
        )
        .unwrap();

        let mut root = Element::new("Material");
        original.serialize(&mut root);
        let restored = GraphicsProgram::deserialize(
            root.child("GraphicsProgram").unwrap(),
            Arc::clone(&service) as Arc<dyn GraphicsService>,
            &gpu,
        )
        .unwrap();

        assert_eq!(restored.program_name(), original.program_name());
        assert_eq!(restored.material_required(), original.material_required());
        assert_eq!(restored.geometry_shader(), original.geometry_shader());
        // A fresh compile means a fresh handle; that is the round-trip
        // contract, not a violation of it.
        assert_ne!(restored.id(), original.id());
    }

    #[test]
    fn deserialize_without_geometry_or_flag_builds_a_two_stage_program() {
        let service = RecordingService::with_uniforms(&[]);
        let gpu = GpuContext::claim();

        let mut node = Element::new("GraphicsProgram");
        node.add_child(Element::with_text("VertexShader", "v.glsl"));
        node.add_child(Element::with_text("FragmentShader", "f.glsl"));

        let program = GraphicsProgram::deserialize(&node, service, &gpu).unwrap();
        assert_eq!(program.program_name(), "v.glsl|f.glsl");
        assert_eq!(program.geometry_shader(), None);
        assert!(!program.material_required());
    }

    #[test]
    fn deserialize_applies_the_material_convention_exactly_once() {
        let service = RecordingService::material_set();
        let gpu = GpuContext::claim();

        let mut node = Element::new("GraphicsProgram");
        node.add_child(Element::with_text("VertexShader", "v.glsl"));
        node.add_child(Element::with_text("FragmentShader", "f.glsl"));
        node.add_child(Element::with_text("MaterialRequired", "True"));

        let program = GraphicsProgram::deserialize(
            &node,
            Arc::clone(&service) as Arc<dyn GraphicsService>,
            &gpu,
        )
        .unwrap();

        assert!(program.material_required());
        assert_eq!(service.model_ubo_attached.lock().len(), 1);
        assert_eq!(service.indices_ubo_attached.lock().len(), 1);
    }

    #[test]
    fn deserialize_rejects_an_empty_vertex_entry() {
        let service = RecordingService::with_uniforms(&[]);
        let gpu = GpuContext::claim();

        let mut node = Element::new("GraphicsProgram");
        node.add_child(Element::new("VertexShader"));
        node.add_child(Element::with_text("FragmentShader", "f.glsl"));

        match GraphicsProgram::deserialize(&node, service, &gpu) {
            Err(ProgramError::MalformedDescription(_)) => {}
            other => panic!("expected MalformedDescription, got {other:?}"),
        }
    }

    #[test]
    fn deserialize_rejects_a_missing_fragment_entry() {
        let service = RecordingService::with_uniforms(&[]);
        let gpu = GpuContext::claim();

        let mut node = Element::new("GraphicsProgram");
        node.add_child(Element::with_text("VertexShader", "v.glsl"));

        assert!(matches!(
            GraphicsProgram::deserialize(&node, service, &gpu),
            Err(ProgramError::MalformedDescription(_))
        ));
    }

    #[test]
    fn unrecognized_material_flag_falls_back_to_not_required() {
        let service = RecordingService::with_uniforms(&[]);
        let gpu = GpuContext::claim();

        let mut node = Element::new("GraphicsProgram");
        node.add_child(Element::with_text("VertexShader", "v.glsl"));
        node.add_child(Element::with_text("FragmentShader", "f.glsl"));
        node.add_child(Element::with_text("MaterialRequired", "Maybe"));

        let program = GraphicsProgram::deserialize(&node, service, &gpu).unwrap();
        assert!(!program.material_required());
    }

    #[test]
    fn drop_destroys_the_program_exactly_once() {
        let service = RecordingService::with_uniforms(&[]);
        let gpu = GpuContext::claim();
        let program = GraphicsProgram::new(
            Arc::clone(&service) as Arc<dyn GraphicsService>,
            &gpu,
            "mesh.vert",
            "mesh.frag",
            false,
        )
        .unwrap();
        let handle = program.id();

        drop(program);

        assert_eq!(*service.destroyed.lock(), vec![handle]);
    }
}
