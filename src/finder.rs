//! Locating the source files of the selected test suites

use std::collections::HashSet;
use std::path::PathBuf;

use crate::bootstrap::load_bootstrap;
use crate::class_index::{ClassIndex, Reflector};
use crate::cli::Config;
use crate::error::{FinderError, Result};
use crate::php_scanner::scan_source;
use crate::phpunit_xml::PhpUnitConfiguration;
use crate::settings::UnresolvedPolicy;
use crate::test_tree::{TestNode, TestTreeBuilder, TestSuite};

/// Runs one lookup for an explicit [`Config`]
pub struct TestFileFinder {
    config: Config,
}

impl TestFileFinder {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Resolve the unique source files of the selected suites, in first-seen order
    pub async fn find(&self) -> Result<Vec<PathBuf>> {
        let settings = &self.config.settings;
        let mut index = ClassIndex::from_settings(&settings.discovery);

        if let Some(script) =
            load_bootstrap(&self.config.bootstrap_file, settings.bootstrap.policy).await?
        {
            let path = tokio::fs::canonicalize(&script.path)
                .await
                .unwrap_or(script.path);
            let declarations = scan_source(&script.source);
            tracing::debug!(classes = declarations.len(), "bootstrap declarations indexed");
            index.add_declarations(&path, declarations);
        }

        let configuration = PhpUnitConfiguration::load(&self.config.config_file).await?;
        tracing::info!(
            path = %configuration.path.display(),
            suites = ?configuration.suite_names(),
            "loaded configuration"
        );
        if let Some(declared) = &configuration.bootstrap {
            tracing::debug!(path = %declared.display(), "configuration declares a bootstrap file");
        }

        let known = configuration.suite_names();
        for name in &self.config.test_suites {
            if !known.contains(&name.as_str()) {
                tracing::warn!(suite = %name, "no test suite with this name in the configuration");
            }
        }

        let main_suite = TestTreeBuilder::new(&settings.discovery)
            .with_selection(&self.config.test_suites)
            .with_unresolved_policy(settings.resolution.on_unresolved)
            .build(&configuration, &mut index)
            .await?;

        collect_test_files(
            &main_suite,
            &self.config.test_suites,
            &index,
            settings.resolution.on_unresolved,
        )
    }
}

/// Walk the selected top-level suites and resolve each test case to its file
///
/// Only composite top-level nodes whose name is in `filters` are walked; an
/// empty `filters` selects every suite. Files are returned once each, in the
/// order they were first reached.
pub fn collect_test_files(
    main_suite: &TestSuite,
    filters: &[String],
    reflector: &impl Reflector,
    on_unresolved: UnresolvedPolicy,
) -> Result<Vec<PathBuf>> {
    let mut seen = HashSet::new();
    let mut files = Vec::new();

    for node in main_suite.tests() {
        let Some(suite) = node.as_suite() else {
            continue;
        };
        if !filters.is_empty() && !filters.contains(&suite.name) {
            continue;
        }

        for test in suite.iter() {
            let TestNode::Case(case) = test else {
                continue;
            };

            match reflector.defining_file(&case.class) {
                Some(file) => {
                    if seen.insert(file.to_path_buf()) {
                        files.push(file.to_path_buf());
                    }
                }
                None => match on_unresolved {
                    UnresolvedPolicy::Skip => {
                        tracing::warn!(class = %case.class, "cannot resolve source file, skipping");
                    }
                    UnresolvedPolicy::Fail => {
                        return Err(FinderError::UnresolvedTestCase {
                            class: case.class.clone(),
                        });
                    }
                },
            }
        }
    }

    tracing::info!(files = files.len(), "located test files");
    Ok(files)
}
