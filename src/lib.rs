//! # phpunit-finder Library
//!
//! Locates the PHP source files behind the test suites declared in a
//! `phpunit.xml`, without running PHP: the configuration is parsed directly
//! and test classes are found by statically scanning the sources.

pub mod bootstrap;
pub mod class_index;
pub mod cli;
pub mod error;
pub mod file_discovery;
pub mod finder;
pub mod logging;
pub mod output;
pub mod php_scanner;
pub mod phpunit_xml;
pub mod settings;
pub mod test_tree;

pub use bootstrap::{BootstrapPolicy, BootstrapScript, load_bootstrap};
pub use class_index::{ClassIndex, IndexedClass, Reflector};
pub use cli::{Cli, Config};
pub use error::{FinderError, Result};
pub use file_discovery::FileDiscovery;
pub use finder::{TestFileFinder, collect_test_files};
pub use output::{Output, OutputFormat};
pub use php_scanner::{ClassDeclaration, ClassKind, scan_file, scan_source};
pub use phpunit_xml::{DirectoryEntry, FileEntry, PhpUnitConfiguration, SuiteDefinition};
pub use settings::{Settings, SettingsError, SettingsManager, UnresolvedPolicy};
pub use test_tree::{TestCase, TestNode, TestSuite, TestTreeBuilder};
