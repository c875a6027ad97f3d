//! The generator driver: loads a shader family, expands every variant and writes shaders and resources.
//!
//! Output layout, for a family `mesh` and variant `_Bar`:
//!
//! ```text
//! <out>/Shaders/mesh/mesh_Bar.vert.glsl
//! <out>/Shaders/mesh/mesh_Bar.frag.glsl
//! <out>/ShaderResources/mesh/mesh_Bar.json
//! <out>/ShaderResources/mesh/mesh_Bar.arm       (pack)
//! <out>/ShaderResources/mesh/mesh_Bar.arm.lz4   (compress)
//! <out>/ShaderResources/mesh/mesh_resource.json (combined)
//! ```

use crate::codec::{self, Lz4, Lz4Error, PackError};
use crate::config::GeneratorConfig;
use crate::descriptor::{ContextDescriptor, Descriptor};
use crate::parsers::shader_file::shader_file;
use crate::parsers::{base_name, ShaderParseError, Stage};
use crate::resource::{FamilyContext, ResourceBuilder, ResourceError, ShaderResource};
use crate::scanner::scan;
use crate::source::ShaderSource;
use crate::variants::{generate_all_variants, ExpandError, Expander, FlagRules, VariantKey};
use log::{debug, info};
use rayon::prelude::*;
use serde::Serialize;
use serde_json::ser::PrettyFormatter;
use std::{
    collections::BTreeSet,
    fmt, fs, io,
    path::{Path, PathBuf},
};

#[derive(Debug)]
pub enum MakeError {
    Io { path: PathBuf, source: io::Error },
    Json(serde_json::Error),
    Parse(ShaderParseError),
    Expand(ExpandError),
    Resource(ResourceError),
    Pack(PackError),
    Lz4(Lz4Error),
    TooManyFlags { family: String, flags: usize, max: usize },
    /// A context without the stage every context needs.
    MissingStage { context: String, stage: Stage },
    Config(String),
}

impl fmt::Display for MakeError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            MakeError::Io { path, source } => write!(f, "{}: {}", path.display(), source),
            MakeError::Json(e) => write!(f, "invalid JSON: {}", e),
            MakeError::Parse(e) => write!(f, "{}", e),
            MakeError::Expand(e) => write!(f, "{}", e),
            MakeError::Resource(e) => write!(f, "{}", e),
            MakeError::Pack(e) => write!(f, "armpack: {}", e),
            MakeError::Lz4(e) => write!(f, "{}", e),
            MakeError::TooManyFlags { family, flags, max } => write!(
                f,
                "{} has {} flags, more than the {} allowed ({} variants)",
                family,
                flags,
                max,
                1u128 << (*flags).min(127)
            ),
            MakeError::MissingStage { context, stage } => {
                write!(f, "context `{}` has no {}", context, stage.descriptor_key())
            }
            MakeError::Config(e) => f.write_str(e),
        }
    }
}

impl std::error::Error for MakeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            MakeError::Io { source, .. } => Some(source),
            MakeError::Json(e) => Some(e),
            MakeError::Parse(e) => Some(e),
            MakeError::Expand(e) => Some(e),
            MakeError::Resource(e) => Some(e),
            MakeError::Pack(e) => Some(e),
            MakeError::Lz4(e) => Some(e),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for MakeError {
    fn from(e: serde_json::Error) -> Self {
        MakeError::Json(e)
    }
}

impl From<ShaderParseError> for MakeError {
    fn from(e: ShaderParseError) -> Self {
        MakeError::Parse(e)
    }
}

impl From<ExpandError> for MakeError {
    fn from(e: ExpandError) -> Self {
        MakeError::Expand(e)
    }
}

impl From<ResourceError> for MakeError {
    fn from(e: ResourceError) -> Self {
        MakeError::Resource(e)
    }
}

impl From<PackError> for MakeError {
    fn from(e: PackError) -> Self {
        MakeError::Pack(e)
    }
}

impl From<Lz4Error> for MakeError {
    fn from(e: Lz4Error) -> Self {
        MakeError::Lz4(e)
    }
}

fn read_to_string(path: &Path) -> Result<String, MakeError> {
    fs::read_to_string(path).map_err(|source| MakeError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn write_file(path: &Path, contents: &[u8]) -> Result<(), MakeError> {
    let io_error = |source| MakeError::Io {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(io_error)?;
    }
    fs::write(path, contents).map_err(io_error)
}

/// Every context of one descriptor, with its stage sources loaded. All of them share one flag set and one
/// base name.
#[derive(Debug, Clone)]
pub struct ShaderFamily {
    pub name: String,
    pub contexts: Vec<FamilyContext>,
}

impl ShaderFamily {
    /// Loads a JSON descriptor, or a combined `.shader` file when the path ends in `.shader`.
    pub fn load(path: &Path) -> Result<Self, MakeError> {
        let file_name = path.file_name().and_then(|f| f.to_str()).unwrap_or_default();
        let name = base_name(file_name);
        let text = read_to_string(path)?;

        if path.extension().map_or(false, |e| e == "shader") {
            Self::from_shader_file(name, &text)
        } else {
            let descriptor: Descriptor = serde_json::from_str(&text)?;
            let dir = path.parent().unwrap_or_else(|| Path::new(""));
            Self::from_descriptor(name, descriptor, dir)
        }
    }

    /// Reads the stage files of `descriptor`, relative to `dir`.
    pub fn from_descriptor(name: &str, descriptor: Descriptor, dir: &Path) -> Result<Self, MakeError> {
        let mut contexts = Vec::with_capacity(descriptor.contexts.len());

        for meta in descriptor.contexts {
            require_vertex_stage(&meta)?;

            let mut sources = Vec::new();
            for (stage, file) in meta.stages() {
                let location = meta.stage_path(stage).unwrap_or(file);
                let text = read_to_string(&dir.join(location))?;
                sources.push(ShaderSource::new(stage, file, &text));
            }
            contexts.push(FamilyContext { meta, sources });
        }

        Ok(Self {
            name: name.to_string(),
            contexts,
        })
    }

    pub fn from_shader_file(name: &str, text: &str) -> Result<Self, MakeError> {
        let mut contexts = Vec::new();

        for context in shader_file(text)? {
            let meta = ContextDescriptor::from_shader_file(&context);
            require_vertex_stage(&meta)?;

            let sources = context
                .stages
                .iter()
                .map(|section| {
                    let lines = section.lines.iter().map(|l| l.to_string()).collect();
                    ShaderSource::from_lines(section.stage, section.file, lines)
                })
                .collect();
            contexts.push(FamilyContext { meta, sources });
        }

        Ok(Self {
            name: name.to_string(),
            contexts,
        })
    }

    pub fn sources(&self) -> impl Iterator<Item = &ShaderSource> {
        self.contexts.iter().flat_map(|c| c.sources.iter())
    }

    /// Each stage source once, contexts often share them.
    fn unique_sources(&self) -> Vec<&ShaderSource> {
        let mut seen = BTreeSet::new();
        self.sources()
            .filter(|s| seen.insert((s.name().to_string(), s.stage())))
            .collect()
    }
}

fn require_vertex_stage(meta: &ContextDescriptor) -> Result<(), MakeError> {
    match meta.stage_file(Stage::Vertex) {
        Some(_) => Ok(()),
        None => Err(MakeError::MissingStage {
            context: meta.id.clone(),
            stage: Stage::Vertex,
        }),
    }
}

/// One variant of a family: its expanded stage sources and its resource.
#[derive(Debug, Clone)]
pub struct VariantOutput {
    pub key: VariantKey,
    pub shaders: Vec<ShaderSource>,
    pub resource: ShaderResource,
}

#[derive(Debug, Clone)]
pub struct FamilyOutput {
    pub name: String,
    pub flags: BTreeSet<String>,
    pub variants: Vec<VariantOutput>,
}

#[derive(Serialize)]
struct ResourceFile<'a> {
    shader_resources: &'a [ShaderResource],
}

/// JSON with keys sorted and four-space indentation.
fn to_json<T: Serialize>(value: &T) -> Result<Vec<u8>, MakeError> {
    let value = serde_json::to_value(value)?;
    let mut out = Vec::new();
    let mut serializer = serde_json::Serializer::with_formatter(&mut out, PrettyFormatter::with_indent(b"    "));
    value.serialize(&mut serializer)?;
    Ok(out)
}

#[derive(Debug, Clone)]
pub struct Generator {
    config: GeneratorConfig,
    rules: FlagRules,
}

impl Generator {
    pub fn new(config: GeneratorConfig) -> Self {
        let rules = config.flag_rules();
        Self { config, rules }
    }

    pub fn config(&self) -> &GeneratorConfig {
        &self.config
    }

    pub fn rules(&self) -> &FlagRules {
        &self.rules
    }

    /// The flags of `family` and the variants they produce.
    pub fn variants(&self, family: &ShaderFamily) -> Result<(BTreeSet<String>, Vec<VariantKey>), MakeError> {
        let flags = scan(family.sources(), &self.rules)?;
        if flags.len() > self.config.max_flags {
            return Err(MakeError::TooManyFlags {
                family: family.name.clone(),
                flags: flags.len(),
                max: self.config.max_flags,
            });
        }

        let keys = generate_all_variants(&flags);
        Ok((flags, keys))
    }

    fn variant(&self, family: &ShaderFamily, key: &VariantKey) -> Result<VariantOutput, MakeError> {
        let expander = Expander::new(&self.rules)
            .with_mode(self.config.mode)
            .with_defines(self.config.inject_defines);
        let builder = ResourceBuilder::with_instancing(&self.rules, self.config.instancing.as_deref());

        let shaders = family
            .unique_sources()
            .into_iter()
            .map(|source| expander.expand(source, key))
            .collect::<Result<Vec<_>, _>>()?;
        let resource = builder.build_resource(&family.name, &family.contexts, key)?;

        debug!("{}: expanded variant {}", family.name, key);
        Ok(VariantOutput {
            key: key.clone(),
            shaders,
            resource,
        })
    }

    /// Expands every variant of `family`, in parallel. Variants come back in `generate_all_variants`
    /// order whatever order they were processed in.
    pub fn generate(&self, family: &ShaderFamily) -> Result<FamilyOutput, MakeError> {
        let (flags, keys) = self.variants(family)?;

        let variants = keys
            .par_iter()
            .map(|key| self.variant(family, key))
            .collect::<Vec<_>>()
            .into_iter()
            .collect::<Result<Vec<_>, _>>()?;

        Ok(FamilyOutput {
            name: family.name.clone(),
            flags,
            variants,
        })
    }

    /// Writes `output` under `out_dir`, returning the written paths.
    pub fn write(&self, output: &FamilyOutput, out_dir: &Path) -> Result<Vec<PathBuf>, MakeError> {
        let shader_dir = out_dir.join("Shaders").join(&output.name);
        let resource_dir = out_dir.join("ShaderResources").join(&output.name);
        let mut lz4 = Lz4::new();
        let mut written = Vec::new();

        let mut emit = |path: PathBuf, contents: &[u8]| -> Result<(), MakeError> {
            write_file(&path, contents)?;
            written.push(path);
            Ok(())
        };

        for variant in &output.variants {
            for shader in &variant.shaders {
                let path = shader_dir.join(shader.variant_file_name(&variant.key));
                emit(path, shader.text().as_bytes())?;
            }

            let stem = format!("{}{}", output.name, variant.key.suffix());
            let file = ResourceFile {
                shader_resources: std::slice::from_ref(&variant.resource),
            };
            emit(resource_dir.join(format!("{}.json", stem)), &to_json(&file)?)?;

            if self.config.pack || self.config.compress {
                let packed = codec::to_vec(&file)?;
                if self.config.compress {
                    let compressed = lz4.encode(&packed)?;
                    emit(resource_dir.join(format!("{}.arm.lz4", stem)), &compressed)?;
                }
                emit(resource_dir.join(format!("{}.arm", stem)), &packed)?;
            }
        }

        if self.config.combined {
            let resources: Vec<ShaderResource> = output.variants.iter().map(|v| v.resource.clone()).collect();
            let file = ResourceFile {
                shader_resources: &resources,
            };
            emit(
                resource_dir.join(format!("{}_resource.json", output.name)),
                &to_json(&file)?,
            )?;
        }

        Ok(written)
    }

    /// Loads, expands and writes the family described by `input` into the configured output directory.
    pub fn make(&self, input: &Path) -> Result<Vec<PathBuf>, MakeError> {
        let family = ShaderFamily::load(input)?;
        let output = self.generate(&family)?;
        let written = self.write(&output, &self.config.out_dir)?;

        info!(
            "{}: {} flags, {} variants, {} files written to {}",
            output.name,
            output.flags.len(),
            output.variants.len(),
            written.len(),
            self.config.out_dir.display()
        );
        Ok(written)
    }
}
