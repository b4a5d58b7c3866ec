//! The suite tree handed to the finder
//!
//! Mirrors the shape PHPUnit builds from a configuration: a main suite whose
//! children are the configured suites, each holding test cases or further
//! suites. [`TestTreeBuilder`] assembles it from a parsed phpunit.xml and the
//! class index.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::class_index::{Ancestry, ClassIndex};
use crate::error::{FinderError, Result};
use crate::file_discovery::{FileDiscovery, expand_directory_pattern};
use crate::phpunit_xml::{PhpUnitConfiguration, SuiteDefinition};
use crate::settings::{DiscoverySettings, UnresolvedPolicy};

/// A node of the test tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TestNode {
    Suite(TestSuite),
    Case(TestCase),
}

/// A named, possibly nested, group of tests
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TestSuite {
    pub name: String,
    pub tests: Vec<TestNode>,
}

/// One instantiable test class
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestCase {
    /// Fully-qualified class name
    pub class: String,
}

impl TestNode {
    pub fn as_suite(&self) -> Option<&TestSuite> {
        match self {
            TestNode::Suite(suite) => Some(suite),
            TestNode::Case(_) => None,
        }
    }
}

impl TestSuite {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tests: Vec::new(),
        }
    }

    /// Direct children
    pub fn tests(&self) -> &[TestNode] {
        &self.tests
    }

    pub fn push(&mut self, node: TestNode) {
        self.tests.push(node);
    }

    /// All descendants in pre-order (the suite itself excluded)
    pub fn iter(&self) -> PreOrder<'_> {
        PreOrder {
            stack: self.tests.iter().rev().collect(),
        }
    }

    /// Every test case below this suite, in pre-order
    pub fn test_cases(&self) -> impl Iterator<Item = &TestCase> {
        self.iter().filter_map(|node| match node {
            TestNode::Case(case) => Some(case),
            TestNode::Suite(_) => None,
        })
    }
}

/// Pre-order iterator over a suite's descendants
pub struct PreOrder<'a> {
    stack: Vec<&'a TestNode>,
}

impl<'a> Iterator for PreOrder<'a> {
    type Item = &'a TestNode;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.stack.pop()?;
        if let TestNode::Suite(suite) = node {
            self.stack.extend(suite.tests.iter().rev());
        }
        Some(node)
    }
}

/// Builds the main suite from a configuration
///
/// Building runs in two phases. Every declared suite's sources are indexed
/// first, so a base class resolves no matter which suite declares it or
/// which suites are selected. Only then are the selected suites classified.
pub struct TestTreeBuilder<'a> {
    settings: &'a DiscoverySettings,
    selected: &'a [String],
    on_unresolved: UnresolvedPolicy,
}

/// Suite entries located on disk
struct SuiteSources {
    /// Existing directories the suite's entries expand to
    roots: Vec<PathBuf>,
    /// Test file candidates, directories first
    candidates: Vec<PathBuf>,
}

impl<'a> TestTreeBuilder<'a> {
    pub fn new(settings: &'a DiscoverySettings) -> Self {
        Self {
            settings,
            selected: &[],
            on_unresolved: UnresolvedPolicy::default(),
        }
    }

    /// Only build the named suites; an empty list builds all of them
    pub fn with_selection(mut self, selected: &'a [String]) -> Self {
        self.selected = selected;
        self
    }

    /// What to do with a candidate whose base class is not in any scanned source
    pub fn with_unresolved_policy(mut self, policy: UnresolvedPolicy) -> Self {
        self.on_unresolved = policy;
        self
    }

    fn is_selected(&self, definition: &SuiteDefinition) -> bool {
        self.selected.is_empty() || self.selected.contains(&definition.name)
    }

    /// Build the main suite, indexing every scanned source into `index`
    pub async fn build(
        &self,
        configuration: &PhpUnitConfiguration,
        index: &mut ClassIndex,
    ) -> Result<TestSuite> {
        let mut located = Vec::new();
        for definition in &configuration.suites {
            if self.is_selected(definition) {
                let sources = self.locate(definition).await?;
                self.index_sources(&sources, index).await;
                located.push((definition, sources));
            } else {
                tracing::debug!(suite = %definition.name, "suite not selected, indexing only");
                let sources = self.locate_for_index(definition).await;
                self.index_sources(&sources, index).await;
            }
        }

        let mut main = TestSuite::new(configuration.path.display().to_string());
        for (definition, sources) in located {
            let suite = self.build_suite(definition, sources, index).await?;
            tracing::info!(suite = %suite.name, tests = suite.tests.len(), "built suite");
            main.push(TestNode::Suite(suite));
        }

        Ok(main)
    }

    /// Locate a selected suite's entries; a missing `<file>` is an error
    async fn locate(&self, definition: &SuiteDefinition) -> Result<SuiteSources> {
        let mut sources = SuiteSources {
            roots: Vec::new(),
            candidates: Vec::new(),
        };

        for entry in &definition.directories {
            let discovery = FileDiscovery::new()
                .with_prefix(&entry.prefix)
                .with_suffix(&entry.suffix)
                .with_excludes(&definition.excludes)
                .await?
                .with_follow_symlinks(self.settings.follow_symlinks);

            for root in expand_directory_pattern(&entry.path, self.settings.follow_symlinks).await? {
                if !tokio::fs::try_exists(&root).await.unwrap_or(false) {
                    tracing::debug!(path = %root.display(), "suite directory does not exist");
                    continue;
                }
                sources.candidates.extend(discovery.discover_files(&root).await?);
                sources.roots.push(root);
            }
        }

        for entry in &definition.files {
            if entry.php_version.is_some() {
                tracing::trace!(path = %entry.path.display(), "phpVersion constraint not evaluated");
            }
            match tokio::fs::metadata(&entry.path).await {
                Ok(metadata) if metadata.is_file() => sources.candidates.push(entry.path.clone()),
                _ => {
                    return Err(FinderError::TestFileNotFound {
                        path: entry.path.clone(),
                    });
                }
            }
        }

        Ok(sources)
    }

    /// Locate an unselected suite's sources, skipping whatever is missing or invalid
    async fn locate_for_index(&self, definition: &SuiteDefinition) -> SuiteSources {
        let mut sources = SuiteSources {
            roots: Vec::new(),
            candidates: Vec::new(),
        };

        for entry in &definition.directories {
            match expand_directory_pattern(&entry.path, self.settings.follow_symlinks).await {
                Ok(roots) => sources.roots.extend(roots),
                Err(e) => {
                    tracing::debug!(path = %entry.path.display(), error = %e, "skipping directory entry");
                }
            }
        }
        sources.candidates = definition
            .files
            .iter()
            .map(|entry| entry.path.clone())
            .collect();

        sources
    }

    /// Index every `.php` file beneath the roots plus the listed candidates
    async fn index_sources(&self, sources: &SuiteSources, index: &mut ClassIndex) {
        // Sources beside the tests declare the base classes they extend
        let all_php = FileDiscovery::new().with_follow_symlinks(self.settings.follow_symlinks);
        for root in &sources.roots {
            match all_php.discover_files(root).await {
                Ok(files) => {
                    for file in files {
                        index_source(index, &file).await;
                    }
                }
                Err(e) => {
                    tracing::debug!(path = %root.display(), error = %e, "cannot walk suite directory");
                }
            }
        }
        for candidate in &sources.candidates {
            index_source(index, candidate).await;
        }
    }

    async fn build_suite(
        &self,
        definition: &SuiteDefinition,
        sources: SuiteSources,
        index: &mut ClassIndex,
    ) -> Result<TestSuite> {
        let mut suite = TestSuite::new(definition.name.clone());
        let mut seen = HashSet::new();

        for candidate in sources.candidates {
            let canonical = index.index_file(&candidate).await?;
            if !seen.insert(canonical.clone()) {
                continue;
            }

            let mut found = false;
            for (class, ancestry) in index.classify_file(&canonical) {
                match ancestry {
                    Ancestry::TestCase => {
                        found = true;
                        suite.push(TestNode::Case(TestCase {
                            class: class.declaration.name.clone(),
                        }));
                    }
                    Ancestry::NotTestCase => {}
                    Ancestry::Unresolved { parent } => match self.on_unresolved {
                        UnresolvedPolicy::Skip => {
                            tracing::warn!(
                                class = %class.declaration.name,
                                parent = %parent,
                                path = %canonical.display(),
                                "base class not found in any scanned source, skipping"
                            );
                        }
                        UnresolvedPolicy::Fail => {
                            return Err(FinderError::UnresolvedBaseClass {
                                class: class.declaration.name.clone(),
                                parent,
                            });
                        }
                    },
                }
            }
            if !found {
                tracing::debug!(path = %canonical.display(), "no test case in file");
            }
        }

        Ok(suite)
    }
}

/// Index a supporting source; an unreadable file only costs its declarations
async fn index_source(index: &mut ClassIndex, path: &Path) {
    if let Err(e) = index.index_file(path).await {
        tracing::debug!(path = %path.display(), error = %e, "cannot scan source file");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn case(class: &str) -> TestNode {
        TestNode::Case(TestCase {
            class: class.to_string(),
        })
    }

    fn suite(name: &str, tests: Vec<TestNode>) -> TestNode {
        TestNode::Suite(TestSuite {
            name: name.to_string(),
            tests,
        })
    }

    #[test]
    fn test_pre_order_traversal() {
        let root = TestSuite {
            name: "main".to_string(),
            tests: vec![
                suite("Unit", vec![case("A"), suite("Nested", vec![case("B")]), case("C")]),
                case("D"),
            ],
        };

        let visited: Vec<String> = root
            .iter()
            .map(|node| match node {
                TestNode::Suite(s) => format!("suite:{}", s.name),
                TestNode::Case(c) => c.class.clone(),
            })
            .collect();

        assert_eq!(
            visited,
            vec!["suite:Unit", "A", "suite:Nested", "B", "C", "D"]
        );
    }

    #[test]
    fn test_test_cases_skip_suites() {
        let mut root = TestSuite::new("main");
        root.push(suite("Empty", vec![]));
        root.push(suite("Deep", vec![suite("Deeper", vec![case("X")])]));

        let classes: Vec<_> = root.test_cases().map(|c| c.class.as_str()).collect();
        assert_eq!(classes, vec!["X"]);
    }

    #[test]
    fn test_as_suite() {
        assert!(suite("S", vec![]).as_suite().is_some());
        assert!(case("C").as_suite().is_none());
    }

    mod builder {
        use super::super::*;
        use crate::settings::DiscoverySettings;
        use std::fs;
        use tempfile::TempDir;

        fn write(root: &Path, relative: &str, content: &str) {
            let path = root.join(relative);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, content).unwrap();
        }

        fn test_class(namespace: &str, name: &str, parent: &str) -> String {
            format!("<?php\nnamespace {namespace};\n\nclass {name} extends {parent}\n{{\n}}\n")
        }

        fn project() -> TempDir {
            let temp_dir = TempDir::new().unwrap();
            let root = temp_dir.path();
            write(
                root,
                "tests/Unit/BaseUnitCase.php",
                "<?php namespace Tests\\Unit; abstract class BaseUnitCase extends \\PHPUnit\\Framework\\TestCase {}",
            );
            write(root, "tests/Unit/ATest.php", &test_class("Tests\\Unit", "ATest", "BaseUnitCase"));
            write(root, "tests/Unit/Sub/BTest.php", &test_class("Tests\\Unit\\Sub", "BTest", "\\Tests\\Unit\\BaseUnitCase"));
            write(root, "tests/Unit/Fixtures/FixtureTest.php", &test_class("Tests\\Unit\\Fixtures", "FixtureTest", "\\PHPUnit\\Framework\\TestCase"));
            write(root, "tests/Unit/HelperTest.php", "<?php namespace Tests\\Unit; class HelperTest {}");
            write(root, "tests/Integration/CTest.php", &test_class("Tests\\Integration", "CTest", "\\PHPUnit\\Framework\\TestCase"));
            temp_dir
        }

        fn configuration(root: &Path, body: &str) -> PhpUnitConfiguration {
            let xml = format!("<phpunit><testsuites>{body}</testsuites></phpunit>");
            PhpUnitConfiguration::parse(&xml, &root.join("phpunit.xml")).unwrap()
        }

        fn classes(suite: &TestSuite) -> Vec<String> {
            suite.test_cases().map(|case| case.class.clone()).collect()
        }

        #[tokio::test]
        async fn test_build_suites_from_directories() {
            let temp_dir = project();
            let configuration = configuration(
                temp_dir.path(),
                r#"<testsuite name="Unit">
                       <directory>tests/Unit</directory>
                       <exclude>tests/Unit/Fixtures</exclude>
                   </testsuite>
                   <testsuite name="Integration">
                       <directory>tests/Integration</directory>
                   </testsuite>"#,
            );

            let settings = DiscoverySettings::default();
            let mut index = ClassIndex::from_settings(&settings);
            let main = TestTreeBuilder::new(&settings)
                .build(&configuration, &mut index)
                .await
                .unwrap();

            let names: Vec<_> = main
                .tests()
                .iter()
                .filter_map(TestNode::as_suite)
                .map(|suite| suite.name.as_str())
                .collect();
            assert_eq!(names, vec!["Unit", "Integration"]);

            let unit = main.tests()[0].as_suite().unwrap();
            assert_eq!(classes(unit), vec!["Tests\\Unit\\ATest", "Tests\\Unit\\Sub\\BTest"]);

            let integration = main.tests()[1].as_suite().unwrap();
            assert_eq!(classes(integration), vec!["Tests\\Integration\\CTest"]);

            // The abstract base beside the tests is indexed too
            assert!(index.get("Tests\\Unit\\BaseUnitCase").is_some());
        }

        #[tokio::test]
        async fn test_selection_skips_other_suites() {
            let temp_dir = project();
            let configuration = configuration(
                temp_dir.path(),
                r#"<testsuite name="Unit"><directory>tests/Unit</directory></testsuite>
                   <testsuite name="Broken"><file>tests/Missing/GoneTest.php</file></testsuite>"#,
            );

            let settings = DiscoverySettings::default();
            let selection = vec!["Unit".to_string()];
            let mut index = ClassIndex::from_settings(&settings);
            let main = TestTreeBuilder::new(&settings)
                .with_selection(&selection)
                .build(&configuration, &mut index)
                .await
                .unwrap();

            assert_eq!(main.tests().len(), 1);
        }

        #[tokio::test]
        async fn test_missing_file_entry_is_fatal() {
            let temp_dir = project();
            let configuration = configuration(
                temp_dir.path(),
                r#"<testsuite name="Broken"><file>tests/Missing/GoneTest.php</file></testsuite>"#,
            );

            let settings = DiscoverySettings::default();
            let mut index = ClassIndex::from_settings(&settings);
            let result = TestTreeBuilder::new(&settings)
                .build(&configuration, &mut index)
                .await;

            assert!(matches!(result, Err(FinderError::TestFileNotFound { .. })));
        }

        #[tokio::test]
        async fn test_missing_directory_contributes_nothing() {
            let temp_dir = project();
            let configuration = configuration(
                temp_dir.path(),
                r#"<testsuite name="Unit"><directory>tests/Nowhere</directory></testsuite>"#,
            );

            let settings = DiscoverySettings::default();
            let mut index = ClassIndex::from_settings(&settings);
            let main = TestTreeBuilder::new(&settings)
                .build(&configuration, &mut index)
                .await
                .unwrap();

            let unit = main.tests()[0].as_suite().unwrap();
            assert!(unit.tests().is_empty());
        }

        #[tokio::test]
        async fn test_file_listed_twice_yields_one_case() {
            let temp_dir = project();
            let configuration = configuration(
                temp_dir.path(),
                r#"<testsuite name="Integration">
                       <directory>tests/Integration</directory>
                       <file>tests/Integration/CTest.php</file>
                   </testsuite>"#,
            );

            let settings = DiscoverySettings::default();
            let mut index = ClassIndex::from_settings(&settings);
            let main = TestTreeBuilder::new(&settings)
                .build(&configuration, &mut index)
                .await
                .unwrap();

            assert_eq!(classes(main.tests()[0].as_suite().unwrap()), vec!["Tests\\Integration\\CTest"]);
        }

        #[tokio::test]
        async fn test_base_class_in_later_suite_resolves() {
            let temp_dir = project();
            write(
                temp_dir.path(),
                "tests/Integration/Support/BaseScenario.php",
                "<?php namespace Tests\\Integration\\Support; abstract class BaseScenario extends \\PHPUnit\\Framework\\TestCase {}",
            );
            write(
                temp_dir.path(),
                "tests/Feature/DTest.php",
                &test_class("Tests\\Feature", "DTest", "\\Tests\\Integration\\Support\\BaseScenario"),
            );
            let configuration = configuration(
                temp_dir.path(),
                r#"<testsuite name="Feature"><directory>tests/Feature</directory></testsuite>
                   <testsuite name="Integration"><directory>tests/Integration</directory></testsuite>"#,
            );

            let settings = DiscoverySettings {
                infer_external_bases: false,
                ..DiscoverySettings::default()
            };
            for selection in [vec![], vec!["Feature".to_string()]] {
                let mut index = ClassIndex::from_settings(&settings);
                let main = TestTreeBuilder::new(&settings)
                    .with_selection(&selection)
                    .with_unresolved_policy(UnresolvedPolicy::Fail)
                    .build(&configuration, &mut index)
                    .await
                    .unwrap();

                let feature = main.tests()[0].as_suite().unwrap();
                assert_eq!(classes(feature), vec!["Tests\\Feature\\DTest"]);
            }
        }

        #[tokio::test]
        async fn test_unresolved_base_class_policy() {
            let temp_dir = project();
            write(
                temp_dir.path(),
                "tests/Feature/ETest.php",
                &test_class("Tests\\Feature", "ETest", "\\Vendor\\Scenario"),
            );
            let configuration = configuration(
                temp_dir.path(),
                r#"<testsuite name="Feature"><directory>tests/Feature</directory></testsuite>"#,
            );
            let settings = DiscoverySettings::default();

            let mut index = ClassIndex::from_settings(&settings);
            let main = TestTreeBuilder::new(&settings)
                .build(&configuration, &mut index)
                .await
                .unwrap();
            assert!(main.tests()[0].as_suite().unwrap().tests().is_empty());

            let mut index = ClassIndex::from_settings(&settings);
            let result = TestTreeBuilder::new(&settings)
                .with_unresolved_policy(UnresolvedPolicy::Fail)
                .build(&configuration, &mut index)
                .await;
            match result {
                Err(FinderError::UnresolvedBaseClass { class, parent }) => {
                    assert_eq!(class, "Tests\\Feature\\ETest");
                    assert_eq!(parent, "Vendor\\Scenario");
                }
                other => panic!("expected UnresolvedBaseClass, got {other:?}"),
            }
        }
    }
}
