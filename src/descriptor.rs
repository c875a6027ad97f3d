//! The authored side of a shader family: contexts, their stage files, render state and link tables, read
//! from a JSON descriptor or converted from a combined `.shader` file.

use crate::parsers::shader_file::ShaderFileContext;
use crate::parsers::Stage;
use crate::variants::VariantKey;
use serde::Deserialize;
use serde_json::{Map, Value};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Descriptor {
    pub contexts: Vec<ContextDescriptor>,
}

/// One flag or a list of them. Link guards are written either way.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum FlagList {
    One(String),
    Many(Vec<String>),
}

impl FlagList {
    pub fn any_in(&self, key: &VariantKey) -> bool {
        match self {
            FlagList::One(flag) => key.contains(flag),
            FlagList::Many(flags) => flags.iter().any(|f| key.contains(f)),
        }
    }
}

/// `ifdef`: at least one flag must be in the variant. `ifndef`: none of them may be.
fn guard_allows(ifdef: &Option<FlagList>, ifndef: &Option<FlagList>, key: &VariantKey) -> bool {
    ifdef.as_ref().map_or(true, |flags| flags.any_in(key))
        && !ifndef.as_ref().map_or(false, |flags| flags.any_in(key))
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Param {
    #[serde(alias = "name")]
    pub id: String,
    pub value: Value,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Link {
    #[serde(alias = "name")]
    pub id: String,
    pub link: String,
    #[serde(default)]
    pub ifdef: Option<FlagList>,
    #[serde(default)]
    pub ifndef: Option<FlagList>,
}

impl Link {
    pub fn allowed(&self, key: &VariantKey) -> bool {
        guard_allows(&self.ifdef, &self.ifndef, key)
    }
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct TextureParam {
    #[serde(alias = "name")]
    pub id: String,
    pub u_addressing: Option<String>,
    pub v_addressing: Option<String>,
    pub min_filter: Option<String>,
    pub mag_filter: Option<String>,
    #[serde(alias = "mipmap")]
    pub mipmap_filter: Option<String>,
    #[serde(default)]
    pub ifdef: Option<FlagList>,
    #[serde(default)]
    pub ifndef: Option<FlagList>,
}

impl TextureParam {
    pub fn allowed(&self, key: &VariantKey) -> bool {
        guard_allows(&self.ifdef, &self.ifndef, key)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ContextDescriptor {
    #[serde(alias = "name")]
    pub id: String,

    pub vertex_shader: Option<String>,
    pub fragment_shader: Option<String>,
    pub geometry_shader: Option<String>,
    pub tesscontrol_shader: Option<String>,
    pub tesseval_shader: Option<String>,

    /// Where to read a stage from when it isn't next to the descriptor. The stage keeps the name given by
    /// its `<stage>_shader` key.
    pub vertex_shader_path: Option<String>,
    pub fragment_shader_path: Option<String>,
    pub geometry_shader_path: Option<String>,
    pub tesscontrol_shader_path: Option<String>,
    pub tesseval_shader_path: Option<String>,

    #[serde(default)]
    pub params: Vec<Param>,
    #[serde(default)]
    pub links: Vec<Link>,
    #[serde(default)]
    pub texture_params: Vec<TextureParam>,

    /// Keys written directly on the context, the newer way to give render state.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ContextDescriptor {
    /// The `<stage>_shader` entry, a file name such as `mesh.vert.glsl`.
    pub fn stage_file(&self, stage: Stage) -> Option<&str> {
        let file = match stage {
            Stage::Vertex => &self.vertex_shader,
            Stage::Fragment => &self.fragment_shader,
            Stage::Geometry => &self.geometry_shader,
            Stage::TessControl => &self.tesscontrol_shader,
            Stage::TessEval => &self.tesseval_shader,
        };
        file.as_deref()
    }

    /// The location the stage is read from: its `<stage>_path` override, else its file name.
    pub fn stage_path(&self, stage: Stage) -> Option<&str> {
        let path = match stage {
            Stage::Vertex => &self.vertex_shader_path,
            Stage::Fragment => &self.fragment_shader_path,
            Stage::Geometry => &self.geometry_shader_path,
            Stage::TessControl => &self.tesscontrol_shader_path,
            Stage::TessEval => &self.tesseval_shader_path,
        };
        path.as_deref().or_else(|| self.stage_file(stage))
    }

    /// The stages this context declares, in pipeline order.
    pub fn stages(&self) -> impl Iterator<Item = (Stage, &str)> {
        Stage::ALL
            .iter()
            .filter_map(move |&stage| self.stage_file(stage).map(|file| (stage, file)))
    }

    /// The link bound to uniform `id` in the variant `key`. Only the first link with that id is looked
    /// at; when its guard rejects the variant the uniform stays unbound.
    pub fn link_for(&self, id: &str, key: &VariantKey) -> Option<&str> {
        self.links
            .iter()
            .find(|l| l.id == id)
            .filter(|l| l.allowed(key))
            .map(|l| l.link.as_str())
    }

    pub fn texture_param_for(&self, id: &str, key: &VariantKey) -> Option<&TextureParam> {
        self.texture_params
            .iter()
            .find(|p| p.id == id)
            .filter(|p| p.allowed(key))
    }

    /// A context of a combined `.shader` file, `-set` values kept as strings.
    pub fn from_shader_file(context: &ShaderFileContext) -> Self {
        let mut descriptor = ContextDescriptor {
            id: context.id.to_string(),
            params: context
                .params
                .iter()
                .map(|&(id, value)| Param {
                    id: id.to_string(),
                    value: Value::String(value.to_string()),
                })
                .collect(),
            links: context
                .links
                .iter()
                .map(|&(id, link)| Link {
                    id: id.to_string(),
                    link: link.to_string(),
                    ifdef: None,
                    ifndef: None,
                })
                .collect(),
            ..Default::default()
        };

        for section in &context.stages {
            let file = Some(section.file.to_string());
            match section.stage {
                Stage::Vertex => descriptor.vertex_shader = file,
                Stage::Fragment => descriptor.fragment_shader = file,
                Stage::Geometry => descriptor.geometry_shader = file,
                Stage::TessControl => descriptor.tesscontrol_shader = file,
                Stage::TessEval => descriptor.tesseval_shader = file,
            }
        }

        descriptor
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parsers::shader_file::shader_file;

    const DESCRIPTOR: &str = r#"{
        "contexts": [
            {
                "name": "mesh",
                "vertex_shader": "mesh.vert.glsl",
                "fragment_shader": "mesh.frag.glsl",
                "fragment_shader_path": "../shared/mesh.frag.glsl",
                "depth_write": true,
                "compare_mode": "less",
                "params": [{ "id": "cull_mode", "value": "clockwise" }],
                "links": [
                    { "name": "WVP", "link": "_worldViewProjectionMatrix" },
                    { "name": "skinBones", "link": "_skinBones", "ifdef": ["_Skinning"] },
                    { "name": "skinBones", "link": "_unused" },
                    { "name": "shadowMap", "link": "_shadowMap", "ifndef": "_NoShadows" }
                ],
                "texture_params": [{ "id": "albedo", "u_addressing": "repeat", "mipmap": "linear" }]
            }
        ]
    }"#;

    fn mesh() -> ContextDescriptor {
        let descriptor: Descriptor = serde_json::from_str(DESCRIPTOR).unwrap();
        descriptor.contexts.into_iter().next().unwrap()
    }

    #[test]
    fn reads_descriptor() {
        let mesh = mesh();
        assert_eq!(mesh.id, "mesh");
        assert_eq!(mesh.stage_file(Stage::Fragment), Some("mesh.frag.glsl"));
        assert_eq!(mesh.stage_path(Stage::Fragment), Some("../shared/mesh.frag.glsl"));
        assert_eq!(mesh.stage_path(Stage::Vertex), Some("mesh.vert.glsl"));
        assert_eq!(mesh.stage_file(Stage::Geometry), None);
        assert_eq!(
            mesh.stages().map(|(s, _)| s).collect::<Vec<_>>(),
            vec![Stage::Vertex, Stage::Fragment]
        );
        assert_eq!(mesh.extra.get("depth_write"), Some(&Value::Bool(true)));
        assert!(!mesh.extra.contains_key("links"));
        assert_eq!(
            mesh.texture_params[0].mipmap_filter.as_deref(),
            Some("linear")
        );
    }

    #[test]
    fn guarded_links() {
        let mesh = mesh();
        let empty = VariantKey::empty();
        let skinning = VariantKey::new(vec!["_Skinning"]);
        let no_shadows = VariantKey::new(vec!["_NoShadows"]);

        assert_eq!(mesh.link_for("WVP", &empty), Some("_worldViewProjectionMatrix"));
        assert_eq!(mesh.link_for("skinBones", &skinning), Some("_skinBones"));
        assert_eq!(mesh.link_for("skinBones", &empty), None);
        assert_eq!(mesh.link_for("shadowMap", &empty), Some("_shadowMap"));
        assert_eq!(mesh.link_for("shadowMap", &no_shadows), None);
        assert_eq!(mesh.link_for("missing", &empty), None);
    }

    #[test]
    fn converts_combined_files() {
        let text = "@context mesh\n-set depth_write = true\n-link WVP = _wvp\n-vert mesh.vert.glsl\nvoid main() {}\n-frag mesh.frag.glsl\nvoid main() {}\n";
        let contexts = shader_file(text).unwrap();
        let mesh = ContextDescriptor::from_shader_file(&contexts[0]);

        assert_eq!(mesh.id, "mesh");
        assert_eq!(mesh.stage_file(Stage::Vertex), Some("mesh.vert.glsl"));
        assert_eq!(mesh.stage_file(Stage::Fragment), Some("mesh.frag.glsl"));
        assert_eq!(
            mesh.params,
            vec![Param {
                id: "depth_write".to_string(),
                value: Value::String("true".to_string())
            }]
        );
        assert_eq!(mesh.link_for("WVP", &VariantKey::empty()), Some("_wvp"));
    }
}
