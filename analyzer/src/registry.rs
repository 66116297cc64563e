// registry.rs: Import dictionary and builtin primitive table
//
// The analyzer never reads library source. Hosts describe each importable
// library as a name → arity map (JSON), and builtin primitives come from a
// static table. `ImportDictionary::standard()` bundles a representative
// standard environment.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

// ── Builtins ────────────────────────────────────────────────────────────────

/// How a builtin primitive behaves beyond its arity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuiltinClass {
    /// Plain signal box.
    Box,
    /// Introduces at least one sample of delay (`@`, `mem`).
    Delay,
    /// UI input control; literal arguments configure it and do not count
    /// as signal inputs.
    UiControl,
    /// UI display (bargraph); passes its input through.
    UiDisplay,
    /// UI group; takes the dimension of its second argument.
    UiGroup,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Builtin {
    pub name: &'static str,
    pub inputs: usize,
    pub outputs: usize,
    pub class: BuiltinClass,
}

const fn builtin(name: &'static str, inputs: usize, outputs: usize, class: BuiltinClass) -> Builtin {
    Builtin {
        name,
        inputs,
        outputs,
        class,
    }
}

use BuiltinClass::{Box as B, Delay as D, UiControl as C, UiDisplay as V, UiGroup as G};

pub const BUILTINS: &[Builtin] = &[
    builtin("_", 1, 1, B),
    builtin("!", 1, 0, B),
    builtin("+", 2, 1, B),
    builtin("-", 2, 1, B),
    builtin("*", 2, 1, B),
    builtin("/", 2, 1, B),
    builtin("%", 2, 1, B),
    builtin("@", 2, 1, D),
    builtin("mem", 1, 1, D),
    // math
    builtin("sin", 1, 1, B),
    builtin("cos", 1, 1, B),
    builtin("tan", 1, 1, B),
    builtin("abs", 1, 1, B),
    builtin("sqrt", 1, 1, B),
    builtin("exp", 1, 1, B),
    builtin("log", 1, 1, B),
    builtin("log10", 1, 1, B),
    builtin("floor", 1, 1, B),
    builtin("ceil", 1, 1, B),
    builtin("int", 1, 1, B),
    builtin("float", 1, 1, B),
    builtin("pow", 2, 1, B),
    builtin("min", 2, 1, B),
    builtin("max", 2, 1, B),
    builtin("fmod", 2, 1, B),
    builtin("atan2", 2, 1, B),
    builtin("attach", 2, 1, B),
    builtin("select2", 3, 1, B),
    // UI
    builtin("hslider", 0, 1, C),
    builtin("vslider", 0, 1, C),
    builtin("nentry", 0, 1, C),
    builtin("button", 0, 1, C),
    builtin("checkbox", 0, 1, C),
    builtin("hbargraph", 1, 1, V),
    builtin("vbargraph", 1, 1, V),
    builtin("hgroup", 0, 0, G),
    builtin("vgroup", 0, 0, G),
    builtin("tgroup", 0, 0, G),
];

pub fn lookup_builtin(name: &str) -> Option<&'static Builtin> {
    BUILTINS.iter().find(|b| b.name == name)
}

// ── Standard environment ────────────────────────────────────────────────────

/// Umbrella library whose import brings every standard namespace into scope.
pub const STANDARD_LIBRARY: &str = "stdfaust.lib";

/// Standard namespace prefixes and the library providing each.
pub const STANDARD_NAMESPACES: &[(&str, &str)] = &[
    ("an", "analyzers.lib"),
    ("ba", "basics.lib"),
    ("de", "delays.lib"),
    ("en", "envelopes.lib"),
    ("fi", "filters.lib"),
    ("ma", "maths.lib"),
    ("no", "noises.lib"),
    ("os", "oscillators.lib"),
    ("re", "reverbs.lib"),
    ("si", "signals.lib"),
    ("sp", "spats.lib"),
];

pub fn is_standard_prefix(prefix: &str) -> bool {
    STANDARD_NAMESPACES.iter().any(|(p, _)| *p == prefix)
}

// (namespace, name, inputs, outputs, stateful)
const STANDARD_SYMBOLS: &[(&str, &str, usize, usize, bool)] = &[
    ("an", "amp_follower", 2, 1, true),
    ("an", "rms_envelope_rect", 2, 1, true),
    ("ba", "db2linear", 1, 1, false),
    ("ba", "linear2db", 1, 1, false),
    ("ba", "midikey2hz", 1, 1, false),
    ("ba", "samp2sec", 1, 1, false),
    ("ba", "if", 3, 1, false),
    ("ba", "sAndH", 2, 1, true),
    ("ba", "time", 0, 1, true),
    ("de", "delay", 3, 1, true),
    ("de", "fdelay", 3, 1, true),
    ("de", "sdelay", 4, 1, true),
    ("en", "adsr", 5, 1, true),
    ("en", "ar", 3, 1, true),
    ("en", "asr", 4, 1, true),
    ("fi", "lowpass", 3, 1, true),
    ("fi", "highpass", 3, 1, true),
    ("fi", "resonlp", 4, 1, true),
    ("fi", "bandpass", 4, 1, true),
    ("fi", "dcblocker", 1, 1, true),
    ("fi", "pole", 2, 1, true),
    ("fi", "zero", 2, 1, true),
    ("ma", "SR", 0, 1, false),
    ("ma", "PI", 0, 1, false),
    ("ma", "tanh", 1, 1, false),
    ("no", "noise", 0, 1, true),
    ("no", "pink_noise", 0, 1, true),
    ("os", "osc", 1, 1, true),
    ("os", "oscsin", 1, 1, true),
    ("os", "sawtooth", 1, 1, true),
    ("os", "square", 1, 1, true),
    ("os", "triangle", 1, 1, true),
    ("os", "phasor", 2, 1, true),
    ("re", "mono_freeverb", 4, 1, true),
    ("re", "jcrev", 1, 4, true),
    ("re", "satrev", 1, 2, true),
    ("si", "smoo", 1, 1, true),
    ("si", "smooth", 2, 1, true),
    ("sp", "panner", 2, 2, false),
];

// ── Dictionary types ────────────────────────────────────────────────────────

/// Arity of one exported symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LibrarySymbol {
    pub inputs: usize,
    pub outputs: usize,
    /// The symbol carries internal state (a delay), which breaks a feedback
    /// loop's instantaneous path.
    #[serde(default)]
    pub stateful: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Library {
    pub name: String,
    /// Namespace prefix used when another library includes this one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
    #[serde(default)]
    pub symbols: BTreeMap<String, LibrarySymbol>,
    #[serde(default)]
    pub includes: Vec<String>,
}

/// One name made visible by importing a library.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Export<'a> {
    /// Visible name, qualified with the namespace prefix for included
    /// libraries (`os.osc`).
    pub name: String,
    pub library: &'a str,
    pub symbol: LibrarySymbol,
}

/// Errors that can occur while loading a dictionary.
#[derive(Debug)]
pub enum RegistryError {
    IoError {
        path: PathBuf,
        source: std::io::Error,
    },
    JsonError {
        path: Option<PathBuf>,
        source: serde_json::Error,
    },
    DuplicateLibrary {
        name: String,
        path: PathBuf,
    },
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistryError::IoError { path, source } => {
                write!(f, "{}: {}", path.display(), source)
            }
            RegistryError::JsonError {
                path: Some(path),
                source,
            } => {
                write!(f, "{}: malformed dictionary: {}", path.display(), source)
            }
            RegistryError::JsonError { path: None, source } => {
                write!(f, "malformed dictionary: {}", source)
            }
            RegistryError::DuplicateLibrary { name, path } => {
                write!(
                    f,
                    "duplicate library '{}': redefined in {}",
                    name,
                    path.display()
                )
            }
        }
    }
}

impl std::error::Error for RegistryError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RegistryError::IoError { source, .. } => Some(source),
            RegistryError::JsonError { source, .. } => Some(source),
            RegistryError::DuplicateLibrary { .. } => None,
        }
    }
}

// ── Dictionary ──────────────────────────────────────────────────────────────

/// Library name → exported symbols. Supplied by the host.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ImportDictionary {
    libraries: BTreeMap<String, Library>,
}

impl ImportDictionary {
    pub fn new() -> Self {
        Self::default()
    }

    /// The bundled standard environment: `stdfaust.lib` including every
    /// namespace in [`STANDARD_NAMESPACES`].
    pub fn standard() -> Self {
        let mut dict = ImportDictionary::new();
        for &(prefix, lib) in STANDARD_NAMESPACES {
            let symbols = STANDARD_SYMBOLS
                .iter()
                .filter(|(ns, ..)| *ns == prefix)
                .map(|&(_, name, inputs, outputs, stateful)| {
                    (
                        name.to_string(),
                        LibrarySymbol {
                            inputs,
                            outputs,
                            stateful,
                        },
                    )
                })
                .collect();
            dict.insert(Library {
                name: lib.to_string(),
                prefix: Some(prefix.to_string()),
                symbols,
                includes: Vec::new(),
            });
        }
        dict.insert(Library {
            name: STANDARD_LIBRARY.to_string(),
            prefix: None,
            symbols: BTreeMap::new(),
            includes: STANDARD_NAMESPACES
                .iter()
                .map(|(_, lib)| lib.to_string())
                .collect(),
        });
        dict
    }

    /// Add or replace a library.
    pub fn insert(&mut self, library: Library) {
        self.libraries.insert(library.name.clone(), library);
    }

    pub fn lookup(&self, name: &str) -> Option<&Library> {
        self.libraries.get(name)
    }

    pub fn library_names(&self) -> impl Iterator<Item = &str> {
        self.libraries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.libraries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.libraries.is_empty()
    }

    /// Parse a dictionary from its JSON form (`{ "lib": { ... } }`).
    pub fn from_json(text: &str) -> Result<Self, RegistryError> {
        serde_json::from_str(text).map_err(|e| RegistryError::JsonError {
            path: None,
            source: e,
        })
    }

    /// Load libraries from a JSON file into this dictionary. Returns the
    /// number of libraries added.
    pub fn load_json(&mut self, path: &Path) -> Result<usize, RegistryError> {
        let text = std::fs::read_to_string(path).map_err(|e| RegistryError::IoError {
            path: path.to_path_buf(),
            source: e,
        })?;
        let loaded: ImportDictionary =
            serde_json::from_str(&text).map_err(|e| RegistryError::JsonError {
                path: Some(path.to_path_buf()),
                source: e,
            })?;

        let count = loaded.len();
        for (name, library) in loaded.libraries {
            if self.libraries.contains_key(&name) {
                return Err(RegistryError::DuplicateLibrary {
                    name,
                    path: path.to_path_buf(),
                });
            }
            self.libraries.insert(name, library);
        }
        Ok(count)
    }

    /// Names visible after `import("<library>")`, or `None` if the library
    /// is unknown. Includes are followed transitively; a library reached
    /// twice contributes once.
    pub fn exports(&self, library: &str) -> Option<Vec<Export<'_>>> {
        let root = self.libraries.get(library)?;
        let mut out = Vec::new();
        let mut visited = BTreeSet::new();
        visited.insert(root.name.as_str());
        push_symbols(root, None, &mut out);
        self.collect_includes(root, &mut visited, &mut out);
        Some(out)
    }

    fn collect_includes<'a>(
        &'a self,
        library: &'a Library,
        visited: &mut BTreeSet<&'a str>,
        out: &mut Vec<Export<'a>>,
    ) {
        for include in &library.includes {
            let Some(inner) = self.libraries.get(include) else {
                continue;
            };
            if !visited.insert(inner.name.as_str()) {
                continue;
            }
            push_symbols(inner, inner.prefix.as_deref(), out);
            self.collect_includes(inner, visited, out);
        }
    }

    /// SHA-256 of the canonical (compact, key-sorted) JSON form.
    pub fn fingerprint(&self) -> [u8; 32] {
        use sha2::{Digest, Sha256};

        let canonical = self.canonical_json();
        let mut hasher = Sha256::new();
        hasher.update(canonical.as_bytes());
        let result = hasher.finalize();
        let mut hash = [0u8; 32];
        hash.copy_from_slice(&result);
        hash
    }

    /// Compact JSON with libraries and symbols in sorted order.
    pub fn canonical_json(&self) -> String {
        // BTreeMap keys serialize in order, so this is already canonical.
        serde_json::to_string(self).unwrap_or_default()
    }
}

fn push_symbols<'a>(library: &'a Library, prefix: Option<&str>, out: &mut Vec<Export<'a>>) {
    for (name, symbol) in &library.symbols {
        let name = match prefix {
            Some(p) => format!("{p}.{name}"),
            None => name.clone(),
        };
        out.push(Export {
            name,
            library: &library.name,
            symbol: *symbol,
        });
    }
}
