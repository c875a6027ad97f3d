use crate::parsers::{base_name, Stage};
use crate::variants::VariantKey;

/// The text of one shader stage, split in lines. Variants are derived copies, a `ShaderSource` is never
/// modified in place.
#[derive(Debug, Clone, PartialEq)]
pub struct ShaderSource {
    stage: Stage,
    /// Base name of the file the source came from, `mesh` for `mesh.vert.glsl`.
    name: String,
    lines: Vec<String>,
}

impl ShaderSource {
    /// `name` may be a file name or path; only its base name is kept.
    pub fn new(stage: Stage, name: &str, text: &str) -> Self {
        Self::from_lines(stage, name, text.lines().map(str::to_string).collect())
    }

    pub fn from_lines(stage: Stage, name: &str, lines: Vec<String>) -> Self {
        Self {
            stage,
            name: base_name(name).to_string(),
            lines,
        }
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// The source as written to disk, every line terminated by `\n`.
    pub fn text(&self) -> String {
        let mut text = String::with_capacity(self.lines.iter().map(|l| l.len() + 1).sum());
        for line in &self.lines {
            text.push_str(line);
            text.push('\n');
        }
        text
    }

    /// `<name><suffix>.<stage>.glsl`, the file a variant of this source is written to.
    pub fn variant_file_name(&self, key: &VariantKey) -> String {
        format!("{}{}.{}.glsl", self.name, key.suffix(), self.stage.extension())
    }

    /// `<name><suffix>.<stage>`, how resources refer to a variant of this source.
    pub fn variant_reference(&self, key: &VariantKey) -> String {
        format!("{}{}.{}", self.name, key.suffix(), self.stage.extension())
    }
}
