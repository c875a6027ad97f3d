//! Shader resources: what an engine needs to know about a variant to bind it. For every context this is
//! the list of constants and texture units its stages declare, the vertex layout its vertex stage expects
//! and the render state the descriptor asks for.

use crate::descriptor::ContextDescriptor;
use crate::parsers::uniform::{attribute, uniform, UniformLine};
use crate::parsers::{ShaderParseError, Stage};
use crate::source::ShaderSource;
use crate::variants::{ExpandError, Expander, FlagPolicy, FlagRules, VariantKey};
use linked_hash_map::LinkedHashMap;
use log::{debug, warn};
use serde::Serialize;
use serde_json::Value;
use std::fmt;

/// Default flag guarding per-instance vertex data, which never belongs in the shared layout.
pub const INSTANCING: &str = "_Instancing";

/// Longest sampler array expanded into texture units. Drivers expose far fewer units than this.
pub const MAX_TEXTURE_ARRAY_LEN: u32 = 256;

#[derive(Debug)]
pub enum ResourceError {
    Expand(ExpandError),
    Parse {
        shader: String,
        line: usize,
        error: ShaderParseError,
    },
}

impl fmt::Display for ResourceError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ResourceError::Expand(e) => write!(f, "{}", e),
            ResourceError::Parse {
                shader,
                line,
                error,
            } => write!(f, "{} (variant line {}): {}", shader, line, error),
        }
    }
}

impl std::error::Error for ResourceError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ResourceError::Expand(e) => Some(e),
            ResourceError::Parse { error, .. } => Some(error),
        }
    }
}

impl From<ExpandError> for ResourceError {
    fn from(e: ExpandError) -> Self {
        ResourceError::Expand(e)
    }
}

fn is_false(value: &bool) -> bool {
    !*value
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Constant {
    pub id: String,
    /// The GLSL type, or `floats` for arrays.
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct TextureUnit {
    pub id: String,
    #[serde(skip_serializing_if = "is_false")]
    pub is_image: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub u_addressing: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub v_addressing: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_filter: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mag_filter: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mipmap_filter: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VertexElement {
    pub name: String,
    pub size: usize,
}

/// Fixed-function state of a context. Unset fields are left out of the output so the engine applies its
/// own defaults.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct RenderState {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub depth_write: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compare_mode: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cull_mode: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blend_source: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blend_destination: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blend_operation: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alpha_blend_source: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alpha_blend_destination: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alpha_blend_operation: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stencil_mode: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stencil_pass: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stencil_fail: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stencil_reference_value: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stencil_read_mask: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stencil_write_mask: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color_writes_red: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color_writes_green: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color_writes_blue: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color_writes_alpha: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conservative_raster: Option<bool>,
}

/// `true`, or the string `"true"`. Every other value reads as false.
fn coerce_bool(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::String(s) => s == "true",
        _ => false,
    }
}

fn coerce_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

impl RenderState {
    /// Sets field `key`. Returns `false` if there is no field by that name.
    pub fn set(&mut self, key: &str, value: &Value) -> bool {
        let string = || Some(coerce_string(value));
        let boolean = || Some(coerce_bool(value));
        let verbatim = || Some(value.clone());

        match key {
            "depth_write" => self.depth_write = boolean(),
            "compare_mode" => self.compare_mode = string(),
            "cull_mode" => self.cull_mode = string(),
            "blend_source" => self.blend_source = string(),
            "blend_destination" => self.blend_destination = string(),
            "blend_operation" => self.blend_operation = string(),
            "alpha_blend_source" => self.alpha_blend_source = string(),
            "alpha_blend_destination" => self.alpha_blend_destination = string(),
            "alpha_blend_operation" => self.alpha_blend_operation = string(),
            "stencil_mode" => self.stencil_mode = verbatim(),
            "stencil_pass" => self.stencil_pass = verbatim(),
            "stencil_fail" => self.stencil_fail = verbatim(),
            "stencil_reference_value" => self.stencil_reference_value = verbatim(),
            "stencil_read_mask" => self.stencil_read_mask = verbatim(),
            "stencil_write_mask" => self.stencil_write_mask = verbatim(),
            "color_writes_red" => self.color_writes_red = boolean(),
            "color_writes_green" => self.color_writes_green = boolean(),
            "color_writes_blue" => self.color_writes_blue = boolean(),
            "color_writes_alpha" => self.color_writes_alpha = boolean(),
            "conservative_raster" => self.conservative_raster = boolean(),
            _ => return false,
        }
        true
    }

    /// Reads `params` first, then the keys written on the context itself, which win.
    pub fn from_descriptor(meta: &ContextDescriptor) -> Self {
        let mut state = RenderState::default();
        for param in &meta.params {
            if !state.set(&param.id, &param.value) {
                debug!("{}: ignoring unknown param `{}`", meta.id, param.id);
            }
        }
        for (key, value) in &meta.extra {
            if !state.set(key, value) {
                debug!("{}: ignoring key `{}`", meta.id, key);
            }
        }
        state
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ShaderContext {
    pub id: String,
    /// `<name><suffix>.vert`
    pub vertex_shader: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fragment_shader: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub geometry_shader: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tesscontrol_shader: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tesseval_shader: Option<String>,
    #[serde(flatten)]
    pub render_state: RenderState,
    pub constants: Vec<Constant>,
    pub texture_units: Vec<TextureUnit>,
    pub vertex_structure: Vec<VertexElement>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ShaderResource {
    /// `<base><suffix>`
    pub id: String,
    /// The layout of the first context.
    pub vertex_structure: Vec<VertexElement>,
    pub contexts: Vec<ShaderContext>,
}

/// A context as authored plus the sources of its stages.
#[derive(Debug, Clone)]
pub struct FamilyContext {
    pub meta: ContextDescriptor,
    pub sources: Vec<ShaderSource>,
}

impl FamilyContext {
    pub fn source(&self, stage: Stage) -> Option<&ShaderSource> {
        self.sources.iter().find(|s| s.stage() == stage)
    }
}

enum UniformKind {
    Texture { is_image: bool },
    Constant,
}

fn uniform_kind(type_name: &str) -> UniformKind {
    let sampled = ["sampler", "isampler", "usampler"];
    let images = ["image", "iimage", "uimage"];

    if images.iter().any(|p| type_name.starts_with(p)) {
        UniformKind::Texture { is_image: true }
    } else if sampled.iter().any(|p| type_name.starts_with(p)) {
        UniformKind::Texture { is_image: false }
    } else {
        UniformKind::Constant
    }
}

/// Constants and texture units of one context, deduplicated by name in declaration order.
#[derive(Default)]
struct Uniforms {
    constants: LinkedHashMap<String, Constant>,
    texture_units: LinkedHashMap<String, TextureUnit>,
}

impl Uniforms {
    fn add_texture_unit(&mut self, id: String, is_image: bool, meta: &ContextDescriptor, key: &VariantKey) {
        if self.texture_units.contains_key(&id) {
            return;
        }

        let mut unit = TextureUnit {
            is_image,
            link: meta.link_for(&id, key).map(str::to_string),
            ..Default::default()
        };
        if let Some(param) = meta.texture_param_for(&id, key) {
            unit.u_addressing = param.u_addressing.clone();
            unit.v_addressing = param.v_addressing.clone();
            unit.min_filter = param.min_filter.clone();
            unit.mag_filter = param.mag_filter.clone();
            unit.mipmap_filter = param.mipmap_filter.clone();
        }
        unit.id = id.clone();
        self.texture_units.insert(id, unit);
    }

    fn add_constant(&mut self, constant: Constant) {
        if !self.constants.contains_key(&constant.id) {
            self.constants.insert(constant.id.clone(), constant);
        }
    }
}

/// Builds the resource of every variant of a family.
#[derive(Debug, Clone)]
pub struct ResourceBuilder<'r> {
    rules: &'r FlagRules,
    /// `rules` with the instancing flag forced out, used to read vertex layouts.
    layout_rules: FlagRules,
}

impl<'r> ResourceBuilder<'r> {
    pub fn new(rules: &'r FlagRules) -> Self {
        Self::with_instancing(rules, Some(INSTANCING))
    }

    /// `instancing` names the flag whose guarded vertex inputs are left out of layouts, if any.
    pub fn with_instancing(rules: &'r FlagRules, instancing: Option<&str>) -> Self {
        let mut layout_rules = rules.clone();
        if let Some(flag) = instancing {
            layout_rules.set_policy(flag, FlagPolicy::ForceExcluded);
        }
        Self {
            rules,
            layout_rules,
        }
    }

    fn parse_error(source: &ShaderSource, line: usize, error: ShaderParseError) -> ResourceError {
        ResourceError::Parse {
            shader: source.name().to_string(),
            line: line + 1,
            error,
        }
    }

    fn vertex_structure(&self, vertex: &ShaderSource, key: &VariantKey) -> Result<Vec<VertexElement>, ResourceError> {
        let filtered = Expander::new(&self.layout_rules)
            .with_defines(false)
            .expand(vertex, key)?;

        let mut elements = Vec::new();
        for (index, line) in filtered.lines().iter().enumerate() {
            let declaration = attribute(line).map_err(|e| Self::parse_error(&filtered, index, e))?;
            if let Some(declaration) = declaration {
                elements.push(VertexElement {
                    name: declaration.name.to_string(),
                    size: declaration.size,
                });
            }
        }
        Ok(elements)
    }

    fn collect_uniforms(
        &self,
        source: &ShaderSource,
        meta: &ContextDescriptor,
        key: &VariantKey,
        uniforms: &mut Uniforms,
    ) -> Result<(), ResourceError> {
        for (index, line) in source.lines().iter().enumerate() {
            let parsed = uniform(line).map_err(|e| Self::parse_error(source, index, e))?;
            let declaration = match parsed {
                Some(UniformLine::Declaration(d)) => d,
                Some(UniformLine::Block(name)) => {
                    debug!("{}: skipping uniform block `{}`", source.name(), name);
                    continue;
                }
                None => continue,
            };

            match (uniform_kind(declaration.type_name), declaration.array_len) {
                (UniformKind::Texture { is_image }, None) => {
                    uniforms.add_texture_unit(declaration.name.to_string(), is_image, meta, key);
                }
                (UniformKind::Texture { is_image }, Some(len)) => {
                    let malformed = || {
                        Self::parse_error(
                            source,
                            index,
                            ShaderParseError::MalformedUniformDeclaration(line.trim().to_string()),
                        )
                    };
                    let len: u32 = len.parse().map_err(|_| malformed())?;
                    if len > MAX_TEXTURE_ARRAY_LEN {
                        return Err(malformed());
                    }
                    for i in 0..len {
                        let id = format!("{}[{}]", declaration.name, i);
                        uniforms.add_texture_unit(id, is_image, meta, key);
                    }
                }
                (UniformKind::Constant, array_len) => {
                    let (type_name, size) = match array_len {
                        Some(len) => ("floats".to_string(), len.parse().ok()),
                        None => (declaration.type_name.to_string(), None),
                    };
                    uniforms.add_constant(Constant {
                        id: declaration.name.to_string(),
                        type_name,
                        size,
                        link: meta.link_for(declaration.name, key).map(str::to_string),
                    });
                }
            }
        }
        Ok(())
    }

    /// Describes context `context` as it is in variant `key`. Stage sources may be raw or already
    /// expanded for `key`, conditional blocks are resolved either way.
    pub fn build_context(&self, context: &FamilyContext, key: &VariantKey) -> Result<ShaderContext, ResourceError> {
        let meta = &context.meta;
        let expander = Expander::new(self.rules).with_defines(false);

        let mut uniforms = Uniforms::default();
        let mut vertex_structure = Vec::new();
        let mut shader = ShaderContext {
            id: meta.id.clone(),
            vertex_shader: String::new(),
            fragment_shader: None,
            geometry_shader: None,
            tesscontrol_shader: None,
            tesseval_shader: None,
            render_state: RenderState::from_descriptor(meta),
            constants: Vec::new(),
            texture_units: Vec::new(),
            vertex_structure: Vec::new(),
        };

        for source in &context.sources {
            let reference = source.variant_reference(key);
            match source.stage() {
                Stage::Vertex => {
                    shader.vertex_shader = reference;
                    vertex_structure = self.vertex_structure(source, key)?;
                }
                Stage::Fragment => shader.fragment_shader = Some(reference),
                Stage::Geometry => shader.geometry_shader = Some(reference),
                Stage::TessControl => shader.tesscontrol_shader = Some(reference),
                Stage::TessEval => shader.tesseval_shader = Some(reference),
            }

            let filtered = expander.expand(source, key)?;
            self.collect_uniforms(&filtered, meta, key, &mut uniforms)?;
        }

        shader.constants = uniforms.constants.into_iter().map(|(_, c)| c).collect();
        shader.texture_units = uniforms.texture_units.into_iter().map(|(_, t)| t).collect();
        shader.vertex_structure = vertex_structure;
        Ok(shader)
    }

    /// Describes variant `key` of family `base`, one context per entry of `contexts`.
    pub fn build_resource(
        &self,
        base: &str,
        contexts: &[FamilyContext],
        key: &VariantKey,
    ) -> Result<ShaderResource, ResourceError> {
        let contexts = contexts
            .iter()
            .map(|c| self.build_context(c, key))
            .collect::<Result<Vec<_>, _>>()?;

        let vertex_structure = contexts
            .first()
            .map(|c| c.vertex_structure.clone())
            .unwrap_or_default();

        for context in contexts.iter().skip(1) {
            if context.vertex_structure != vertex_structure {
                warn!(
                    "{}{}: context `{}` has a vertex layout different from `{}`",
                    base,
                    key.suffix(),
                    context.id,
                    contexts[0].id
                );
            }
        }

        Ok(ShaderResource {
            id: format!("{}{}", base, key.suffix()),
            vertex_structure,
            contexts,
        })
    }
}
