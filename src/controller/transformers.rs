//! # Name Transformers
//!
//! Local versions of the name transformers Doppler applies server-side.
//!
//! The controller never renames secrets itself. These are used to find
//! well-known keys (such as `DOPPLER_PROJECT`) in a payload whose names were
//! already transformed by the API.

use crate::crd::NameTransformer;

impl NameTransformer {
    /// Transform a Doppler secret name the way the API does
    pub fn apply(self, name: &str) -> String {
        match self {
            Self::Camel => camel(name),
            Self::UpperCamel => upper_camel(name),
            Self::LowerSnake => name.to_lowercase(),
            Self::TfVar => format!("TF_VAR_{}", name.to_lowercase()),
            Self::DotnetEnv => name
                .split("__")
                .map(upper_camel)
                .collect::<Vec<_>>()
                .join("__"),
        }
    }
}

/// Upper-case the first character and lower-case the rest
fn capitalize(part: &str) -> String {
    let mut chars = part.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

fn camel(name: &str) -> String {
    name.split('_')
        .enumerate()
        .filter(|(_, part)| !part.is_empty())
        .map(|(i, part)| {
            // Position counts empty segments, so "_FOO" yields "Foo".
            if i == 0 {
                part.to_lowercase()
            } else {
                capitalize(part)
            }
        })
        .collect()
}

fn upper_camel(name: &str) -> String {
    name.split('_')
        .filter(|part| !part.is_empty())
        .map(capitalize)
        .collect()
}
