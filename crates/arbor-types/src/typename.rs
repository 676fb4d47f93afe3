use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Runtime type descriptor for a published object.
///
/// A `TypeName` names a concrete layout, e.g. `arbor::Hashmap<int64,float64>`
/// or `arbor::GlobalVertexMap<string,uint32>`. Readers dispatch on the
/// descriptor alone: first on the full string, then on the [`base`] family
/// name, so no compile-time knowledge of the writer's instantiation is
/// required.
///
/// [`base`]: TypeName::base
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TypeName(String);

impl TypeName {
    /// Validate and wrap a descriptor string.
    ///
    /// Rejects empty names, unbalanced angle brackets, and empty parameter
    /// lists (`name<>`).
    pub fn parse(descriptor: impl Into<String>) -> Result<Self, TypeError> {
        let descriptor = descriptor.into();
        let malformed = || TypeError::MalformedTypeName(descriptor.clone());

        if descriptor.is_empty() || descriptor.starts_with('<') {
            return Err(malformed());
        }
        let mut depth = 0usize;
        let mut prev = ' ';
        for c in descriptor.chars() {
            match c {
                '<' => depth += 1,
                '>' => {
                    if depth == 0 || prev == '<' || prev == ',' {
                        return Err(malformed());
                    }
                    depth -= 1;
                }
                ',' if prev == '<' || prev == ',' => return Err(malformed()),
                _ => {}
            }
            prev = c;
        }
        if depth != 0 {
            return Err(malformed());
        }
        Ok(Self(descriptor))
    }

    /// Build a parameterized descriptor from a family name and arguments.
    pub fn parameterized(base: &str, params: &[String]) -> Self {
        Self(format!("{}<{}>", base, params.join(",")))
    }

    /// The family name: everything before the first `<`.
    pub fn base(&self) -> &str {
        match self.0.find('<') {
            Some(idx) => &self.0[..idx],
            None => &self.0,
        }
    }

    /// The type parameters, split at top-level commas.
    ///
    /// Nested brackets are honoured: `Map<Pair<a,b>,c>` yields
    /// `["Pair<a,b>", "c"]`. A descriptor without parameters yields an empty
    /// vector.
    pub fn params(&self) -> Vec<&str> {
        let inner = match (self.0.find('<'), self.0.rfind('>')) {
            (Some(open), Some(close)) if open + 1 < close => &self.0[open + 1..close],
            _ => return Vec::new(),
        };
        let mut params = Vec::new();
        let mut depth = 0usize;
        let mut start = 0usize;
        for (i, c) in inner.char_indices() {
            match c {
                '<' => depth += 1,
                '>' => depth -= 1,
                ',' if depth == 0 => {
                    params.push(&inner[start..i]);
                    start = i + 1;
                }
                _ => {}
            }
        }
        params.push(&inner[start..]);
        params
    }

    /// The full descriptor string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TypeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for TypeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypeName({})", self.0)
    }
}

/// Maps a Rust type to its descriptor atom.
///
/// Scalars map to fixed-width names (`i64` -> `int64`); composite types build
/// parameterized descriptors from their components' tags.
pub trait TypeTag {
    /// The descriptor atom for this type.
    fn type_tag() -> String;
}

macro_rules! scalar_type_tag {
    ($($ty:ty => $name:literal),* $(,)?) => {
        $(impl TypeTag for $ty {
            fn type_tag() -> String {
                $name.to_string()
            }
        })*
    };
}

scalar_type_tag! {
    i32 => "int32",
    i64 => "int64",
    u32 => "uint32",
    u64 => "uint64",
    f32 => "float32",
    f64 => "float64",
    bool => "bool",
    String => "string",
}
