//! Cross-file class index
//!
//! Stands in for the runtime class registry: every scanned declaration is
//! recorded with its defining file, which answers both "is this a test
//! case" and "where is this class defined".

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::php_scanner::{self, ClassDeclaration};
use crate::settings::DiscoverySettings;

/// Maps a class to the source file that defines it
pub trait Reflector {
    fn defining_file(&self, class: &str) -> Option<&Path>;
}

/// A declaration together with the file it came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexedClass {
    pub declaration: ClassDeclaration,
    pub file: PathBuf,
}

#[derive(Debug, Default)]
pub struct ClassIndex {
    /// Lowercased fully-qualified name -> class
    classes: HashMap<String, IndexedClass>,
    /// File -> lowercased names of the classes it declares, in source order
    files: HashMap<PathBuf, Vec<String>>,
    /// Lowercased names of the test base classes
    base_classes: HashSet<String>,
    infer_external_bases: bool,
}

/// Where a class's `extends` chain leads
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ancestry {
    TestCase,
    NotTestCase,
    /// The chain left the scanned sources at `parent`
    Unresolved { parent: String },
}

fn is_named_after(short_name: &str, stem: &str) -> bool {
    if short_name.eq_ignore_ascii_case(stem) {
        return true;
    }
    let short_name = short_name.to_ascii_lowercase();
    let stem = stem.to_ascii_lowercase();
    short_name
        .strip_suffix(&stem)
        .is_some_and(|prefix| prefix.ends_with('_'))
}

fn class_key(name: &str) -> String {
    name.trim_start_matches('\\').to_ascii_lowercase()
}

impl ClassIndex {
    pub fn new(base_classes: &[String], infer_external_bases: bool) -> Self {
        Self {
            classes: HashMap::new(),
            files: HashMap::new(),
            base_classes: base_classes.iter().map(|name| class_key(name)).collect(),
            infer_external_bases,
        }
    }

    pub fn from_settings(settings: &DiscoverySettings) -> Self {
        Self::new(&settings.base_classes, settings.infer_external_bases)
    }

    /// Scan `path` and record its declarations; files are indexed once.
    /// Returns the canonical path the file is indexed under.
    pub async fn index_file(&mut self, path: &Path) -> Result<PathBuf> {
        let path = tokio::fs::canonicalize(path).await?;
        if self.files.contains_key(&path) {
            return Ok(path);
        }

        let declarations = php_scanner::scan_file(&path).await?;
        tracing::trace!(path = %path.display(), classes = declarations.len(), "indexed file");
        self.add_declarations(&path, declarations);
        Ok(path)
    }

    /// Whether `path` has been indexed
    pub fn contains_file(&self, path: &Path) -> bool {
        self.files.contains_key(path)
    }

    /// Record declarations found in `file`. The first declaration of a name wins.
    pub fn add_declarations(&mut self, file: &Path, declarations: Vec<ClassDeclaration>) {
        let keys = self.files.entry(file.to_path_buf()).or_default();

        for declaration in declarations {
            let key = class_key(&declaration.name);
            if let Some(existing) = self.classes.get(&key) {
                tracing::debug!(
                    class = %declaration.name,
                    kept = %existing.file.display(),
                    ignored = %file.display(),
                    "duplicate class declaration"
                );
                continue;
            }
            keys.push(key.clone());
            self.classes.insert(
                key,
                IndexedClass {
                    declaration,
                    file: file.to_path_buf(),
                },
            );
        }
    }

    pub fn get(&self, class: &str) -> Option<&IndexedClass> {
        self.classes.get(&class_key(class))
    }

    /// Classes first declared in `file`, in source order
    pub fn classes_in(&self, file: &Path) -> Vec<&IndexedClass> {
        self.files
            .get(file)
            .map(|keys| keys.iter().filter_map(|key| self.classes.get(key)).collect())
            .unwrap_or_default()
    }

    /// Whether `class` descends from a configured test base class
    pub fn is_test_case(&self, class: &str) -> bool {
        self.ancestry(class) == Ancestry::TestCase
    }

    /// Walk the `extends` chain of `class` through the index
    pub fn ancestry(&self, class: &str) -> Ancestry {
        let mut current = class_key(class);
        if !self.classes.contains_key(&current) {
            return Ancestry::NotTestCase;
        }

        let mut current_name = class.trim_start_matches('\\').to_string();
        let mut visited = HashSet::new();
        loop {
            if self.base_classes.contains(&current) {
                return Ancestry::TestCase;
            }
            if !visited.insert(current.clone()) {
                tracing::warn!(class, "inheritance cycle");
                return Ancestry::NotTestCase;
            }

            match self.classes.get(&current) {
                Some(indexed) => match &indexed.declaration.parent {
                    Some(parent) => {
                        current = class_key(parent);
                        current_name = parent.trim_start_matches('\\').to_string();
                    }
                    None => return Ancestry::NotTestCase,
                },
                // The chain left the scanned sources
                None => {
                    let short = current.rsplit('\\').next().unwrap_or(&current);
                    if self.infer_external_bases && short.ends_with("testcase") {
                        return Ancestry::TestCase;
                    }
                    return Ancestry::Unresolved {
                        parent: current_name,
                    };
                }
            }
        }
    }

    /// The concrete classes PHPUnit would load from `file`, with their ancestry
    ///
    /// A class named after the file wins, including PEAR-style names such as
    /// `Foo_BarTest` in `BarTest.php`; otherwise every class in the file is
    /// considered.
    pub fn classify_file(&self, file: &Path) -> Vec<(&IndexedClass, Ancestry)> {
        let classes = self.classes_in(file);
        let stem = file
            .file_stem()
            .and_then(|stem| stem.to_str())
            .unwrap_or_default();

        let named: Vec<&IndexedClass> = classes
            .iter()
            .copied()
            .filter(|c| is_named_after(c.declaration.short_name(), stem))
            .collect();
        let candidates = if named.is_empty() { classes } else { named };

        candidates
            .into_iter()
            .filter(|c| c.declaration.is_instantiable())
            .map(|c| (c, self.ancestry(&c.declaration.name)))
            .collect()
    }

    /// The test case classes PHPUnit would load from `file`
    pub fn test_classes_in(&self, file: &Path) -> Vec<&IndexedClass> {
        self.classify_file(file)
            .into_iter()
            .filter(|(_, ancestry)| *ancestry == Ancestry::TestCase)
            .map(|(class, _)| class)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }
}

impl Reflector for ClassIndex {
    fn defining_file(&self, class: &str) -> Option<&Path> {
        self.get(class).map(|indexed| indexed.file.as_path())
    }
}
