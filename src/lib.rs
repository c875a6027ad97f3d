//! # variantgen - Shader variant and resource generator
//!
//! ## Example
//!
//! ```ignore
//! use variantgen::{expand, generate_all_variants, scan, FlagRules, ShaderSource, Stage};
//!
//! /// Prints every variant of a vertex shader
//! fn main() {
//!     let source = ShaderSource::new(Stage::Vertex, "mesh.vert.glsl", &std::fs::read_to_string("mesh.vert.glsl").unwrap());
//!     let flags = scan(vec![&source], &FlagRules::default()).unwrap();
//!
//!     for key in generate_all_variants(&flags) {
//!         let variant = expand(&source, &key).unwrap();
//!         println!("// {}\n{}", source.variant_file_name(&key), variant.text());
//!     }
//! }
//! ```
//!
//! ## Variants
//!
//! Shaders are written once with their optional features behind `#ifdef` blocks. Every flag named by an `#ifdef`
//! or `#ifndef` in any stage of any context of a family is a variant axis, and every subset of those flags is a
//! variant: a family with the flags `_Bar` and `_Tex` has the variants `mesh`, `mesh_Bar`, `mesh_Tex` and
//! `mesh_Bar_Tex`. A variant's shaders contain only the code reachable with its flags defined, plus one
//! `#define` per flag right after the `#version` line:
//!
//! ```ignore
//! #version 450            #version 450
//! #ifdef _Bar             #define _Bar
//! in vec3 nor;      =>    in vec3 nor;
//! #endif                  in vec3 pos;
//! in vec3 pos;
//! ```
//!
//! Not every flag is an axis. `GL_ES` is defined by the compiler itself, so its blocks are left alone for the
//! compiler to resolve. Flags can also be forced out of every variant. Both are configured per flag with a
//! `FlagPolicy`. Old shaders spell their directives `-ifdef`/`-endif`, which are understood as well.
//!
//! ## Resources
//!
//! Next to the shaders every variant gets a resource: for each context, the uniforms its stages declare (split in
//! constants and texture units), the vertex layout its vertex stage expects and its render state. Uniform names are
//! bound to engine values through the descriptor's `links`, which can be restricted to variants that have (or
//! don't have) some flags.
//!
//! Resources are written as JSON and optionally in armpack, a little-endian MessagePack dialect with 32-bit floats
//! and packed numeric arrays, optionally LZ4 compressed.
//!
//! ## Inputs
//!
//! A family is described by a JSON descriptor:
//!
//! ```ignore
//! {
//!     "contexts": [
//!         {
//!             "id": "mesh",
//!             "vertex_shader": "mesh.vert.glsl",
//!             "fragment_shader": "mesh.frag.glsl",
//!             "depth_write": true,
//!             "compare_mode": "less",
//!             "links": [
//!                 { "id": "WVP", "link": "_worldViewProjectionMatrix" },
//!                 { "id": "skinBones", "link": "_skinBones", "ifdef": ["_Skinning"] }
//!             ]
//!         }
//!     ]
//! }
//! ```
//!
//! or by a combined `.shader` file holding the same information and the stage sources, see `parsers::shader_file`.
//!
//! ### Limitations
//!
//! `#if` and `#elif` expressions are never evaluated, their blocks are copied as they are. Flags must therefore be
//! tested with `#ifdef`/`#ifndef` to become variant axes.
//!
//! The number of variants doubles with every flag. The driver refuses families with more flags than
//! `GeneratorConfig::max_flags`.

pub mod codec;
pub mod config;
pub mod descriptor;
pub mod make;
pub mod parsers;
pub mod resource;
pub mod scanner;
pub mod source;
pub mod variants;

pub use make::{Generator, MakeError, ShaderFamily};
pub use parsers::{ShaderParseError, Stage};
pub use resource::{ResourceBuilder, ShaderResource};
pub use scanner::scan;
pub use source::ShaderSource;
pub use variants::{expand, generate_all_variants, ExpandMode, Expander, FlagPolicy, FlagRules, VariantKey};
