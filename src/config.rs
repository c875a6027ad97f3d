//! Generator settings, read from an INI file. Every value has a default so a missing file or key is never
//! an error.
//!
//! ```ini
//! [flags]
//! ignore = GL_ES
//! force_excluded =
//! instancing = _Instancing
//!
//! [variants]
//! mode = strip
//! inject_defines = true
//! legacy_directives = true
//! max_flags = 12
//!
//! [output]
//! dir = compiled
//! combined = false
//! pack = false
//! compress = false
//! ```
//!
//! Flag lists are separated by commas or whitespace. An empty `instancing` disables the vertex layout
//! carve-out.

use crate::resource::INSTANCING;
use crate::variants::{ExpandMode, FlagPolicy, FlagRules, GL_ES};
use configparser::ini::Ini;
use log::info;
use std::path::PathBuf;

const DEFAULT_MAX_FLAGS: usize = 12;
const DEFAULT_OUT_DIR: &str = "compiled";
pub const DEFAULT_CONFIG_PATH: &str = "variantgen.ini";

#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    /// Platform flags, never variant axes.
    pub ignored: Vec<String>,
    /// Axes whose guarded code is always stripped.
    pub force_excluded: Vec<String>,
    /// Flag guarding per-instance vertex inputs, kept out of vertex layouts.
    pub instancing: Option<String>,
    pub mode: ExpandMode,
    pub inject_defines: bool,
    /// Accept `-ifdef`/`-endif` as directives.
    pub legacy_directives: bool,
    /// Families with more flags than this are refused, they'd produce 2^N variants.
    pub max_flags: usize,
    pub out_dir: PathBuf,
    /// Also write one resource file holding every variant.
    pub combined: bool,
    /// Also write armpack resources.
    pub pack: bool,
    /// LZ4 compress armpack resources.
    pub compress: bool,
    pub config_path: PathBuf,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self::new()
    }
}

fn flag_list(value: &str) -> Vec<String> {
    value
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

impl GeneratorConfig {
    pub fn new() -> Self {
        Self {
            ignored: vec![GL_ES.to_string()],
            force_excluded: Vec::new(),
            instancing: Some(INSTANCING.to_string()),
            mode: ExpandMode::Strip,
            inject_defines: true,
            legacy_directives: true,
            max_flags: DEFAULT_MAX_FLAGS,
            out_dir: PathBuf::from(DEFAULT_OUT_DIR),
            combined: false,
            pack: false,
            compress: false,
            config_path: PathBuf::from(DEFAULT_CONFIG_PATH),
        }
    }

    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self {
            config_path: path.into(),
            ..Self::new()
        }
    }

    /// Loads `config_path`. Keys missing from the file keep their current value.
    pub fn load_from_file(&mut self) -> Result<(), String> {
        let mut ini = Ini::new();
        ini.load(&self.config_path)
            .map_err(|e| format!("Failed to load config file {:?}: {}", self.config_path, e))?;
        self.apply(&ini)?;

        info!(
            "Loaded config {:?}: mode={:?}, max_flags={}, out={:?}",
            self.config_path, self.mode, self.max_flags, self.out_dir
        );
        Ok(())
    }

    pub fn load_from_str(&mut self, text: &str) -> Result<(), String> {
        let mut ini = Ini::new();
        ini.read(text.to_string())
            .map_err(|e| format!("Failed to parse config: {}", e))?;
        self.apply(&ini)
    }

    fn apply(&mut self, ini: &Ini) -> Result<(), String> {
        // [flags]
        if let Some(ignore) = ini.get("flags", "ignore") {
            self.ignored = flag_list(&ignore);
        }
        if let Some(excluded) = ini.get("flags", "force_excluded") {
            self.force_excluded = flag_list(&excluded);
        }
        if let Some(instancing) = ini.get("flags", "instancing") {
            let instancing = instancing.trim();
            self.instancing = if instancing.is_empty() {
                None
            } else {
                Some(instancing.to_string())
            };
        }

        // [variants]
        if let Some(mode) = ini.get("variants", "mode") {
            self.mode = match mode.trim().to_ascii_lowercase().as_str() {
                "strip" => ExpandMode::Strip,
                "preserve" => ExpandMode::Preserve,
                other => return Err(format!("Unknown variant mode `{}`", other)),
            };
        }
        if let Some(inject) = ini.getbool("variants", "inject_defines")? {
            self.inject_defines = inject;
        }
        if let Some(legacy) = ini.getbool("variants", "legacy_directives")? {
            self.legacy_directives = legacy;
        }
        if let Some(max) = ini.getuint("variants", "max_flags")? {
            self.max_flags = max as usize;
        }

        // [output]
        if let Some(dir) = ini.get("output", "dir") {
            self.out_dir = PathBuf::from(dir.trim());
        }
        if let Some(combined) = ini.getbool("output", "combined")? {
            self.combined = combined;
        }
        if let Some(pack) = ini.getbool("output", "pack")? {
            self.pack = pack;
        }
        if let Some(compress) = ini.getbool("output", "compress")? {
            self.compress = compress;
        }

        Ok(())
    }

    /// The flag policies these settings describe.
    pub fn flag_rules(&self) -> FlagRules {
        let mut rules = FlagRules::empty().with_legacy_directives(self.legacy_directives);
        for flag in &self.ignored {
            rules.set_policy(flag, FlagPolicy::Ignored);
        }
        for flag in &self.force_excluded {
            rules.set_policy(flag, FlagPolicy::ForceExcluded);
        }
        rules
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = GeneratorConfig::new();
        let rules = config.flag_rules();
        assert_eq!(rules.policy("GL_ES"), FlagPolicy::Ignored);
        assert_eq!(rules.policy("_Bar"), FlagPolicy::Variant);
        assert_eq!(config.instancing.as_deref(), Some("_Instancing"));
        assert_eq!(config.max_flags, 12);
        assert_eq!(config.out_dir, PathBuf::from("compiled"));
        assert!(!config.pack);
    }

    #[test]
    fn reads_every_section() {
        let mut config = GeneratorConfig::new();
        config
            .load_from_str(
                "[flags]
ignore = GL_ES, _Debug
force_excluded = _Voxels
instancing = _PerInstance

[variants]
mode = Preserve
inject_defines = false
legacy_directives = false
max_flags = 4

[output]
dir = out
combined = true
pack = true
compress = true
",
            )
            .unwrap();

        let rules = config.flag_rules();
        assert_eq!(rules.policy("_Debug"), FlagPolicy::Ignored);
        assert_eq!(rules.policy("_Voxels"), FlagPolicy::ForceExcluded);
        assert_eq!(config.instancing.as_deref(), Some("_PerInstance"));
        assert_eq!(config.mode, ExpandMode::Preserve);
        assert!(!config.inject_defines);
        assert!(!config.legacy_directives);
        assert_eq!(config.max_flags, 4);
        assert_eq!(config.out_dir, PathBuf::from("out"));
        assert!(config.combined && config.pack && config.compress);
    }

    #[test]
    fn missing_keys_keep_defaults() {
        let mut config = GeneratorConfig::new();
        config.load_from_str("[output]\npack = true\n").unwrap();
        assert!(config.pack);
        assert_eq!(config.max_flags, 12);
        assert_eq!(config.ignored, vec!["GL_ES".to_string()]);
    }

    #[test]
    fn rejects_bad_values() {
        let mut config = GeneratorConfig::new();
        assert!(config.load_from_str("[variants]\nmode = fancy\n").is_err());
        assert!(config.load_from_str("[variants]\nmax_flags = many\n").is_err());
    }

    #[test]
    fn missing_file() {
        let mut config = GeneratorConfig::with_path("/nonexistent/variantgen.ini");
        assert!(config.load_from_file().is_err());
    }
}
