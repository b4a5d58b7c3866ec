//! phpunit.xml parsing
//!
//! Only the parts that declare test suites are read: `<testsuites>`,
//! `<testsuite>` and their `<directory>`, `<file>` and `<exclude>` entries.
//! Everything else in the document is ignored.

use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;
use std::path::{Path, PathBuf};

use crate::error::{FinderError, Result};

pub const DEFAULT_SUFFIX: &str = "Test.php";

/// A parsed phpunit.xml
#[derive(Debug, Clone, PartialEq)]
pub struct PhpUnitConfiguration {
    /// Location of the configuration file
    pub path: PathBuf,
    /// Directory relative entries resolve against
    pub base_dir: PathBuf,
    /// The `bootstrap` attribute of `<phpunit>`, if any
    pub bootstrap: Option<PathBuf>,
    /// Suites in document order
    pub suites: Vec<SuiteDefinition>,
}

/// One `<testsuite>` element
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SuiteDefinition {
    pub name: String,
    pub directories: Vec<DirectoryEntry>,
    pub files: Vec<FileEntry>,
    pub excludes: Vec<PathBuf>,
}

/// A `<directory>` entry
#[derive(Debug, Clone, PartialEq)]
pub struct DirectoryEntry {
    pub path: PathBuf,
    pub prefix: String,
    pub suffix: String,
    pub php_version: Option<String>,
    pub php_version_operator: Option<String>,
}

/// A `<file>` entry
#[derive(Debug, Clone, PartialEq)]
pub struct FileEntry {
    pub path: PathBuf,
    pub php_version: Option<String>,
    pub php_version_operator: Option<String>,
}

/// Where in the document the parser currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scope {
    Root,
    TestSuites,
    TestSuite { legacy: bool },
    Entry,
    Other,
}

#[derive(Debug)]
enum PendingEntry {
    Directory {
        prefix: String,
        suffix: String,
        php_version: Option<String>,
        php_version_operator: Option<String>,
    },
    File {
        php_version: Option<String>,
        php_version_operator: Option<String>,
    },
    Exclude,
}

impl PhpUnitConfiguration {
    /// Read and parse the configuration file at `path`
    pub async fn load(path: &Path) -> Result<Self> {
        let content = match tokio::fs::read_to_string(path).await {
            Ok(content) => content,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Err(FinderError::ConfigurationNotFound {
                    path: path.to_path_buf(),
                });
            }
            Err(err) => return Err(FinderError::Io(err)),
        };

        Self::parse(&content, path)
    }

    /// Parse configuration `content` that was read from `path`
    pub fn parse(content: &str, path: &Path) -> Result<Self> {
        let base_dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));

        let parse_error = |details: String| FinderError::ConfigurationParse {
            path: path.to_path_buf(),
            details,
        };

        let mut reader = Reader::from_str(content);
        reader.trim_text(true);

        let mut scopes: Vec<Scope> = Vec::new();
        let mut seen_root = false;
        let mut seen_testsuites = false;
        let mut bootstrap = None;
        let mut grouped: Vec<SuiteDefinition> = Vec::new();
        let mut legacy: Vec<SuiteDefinition> = Vec::new();
        let mut current_suite: Option<SuiteDefinition> = None;
        let mut pending: Option<(PendingEntry, String)> = None;

        loop {
            let event = reader.read_event().map_err(|e| {
                parse_error(format!("{} at position {}", e, reader.buffer_position()))
            })?;

            match event {
                Event::Start(ref start) | Event::Empty(ref start) => {
                    let is_empty = matches!(event, Event::Empty(_));
                    let name = start.local_name().as_ref().to_vec();
                    let parent = scopes.last().copied();

                    let scope = match parent {
                        None => {
                            if seen_root {
                                return Err(parse_error("multiple root elements".to_string()));
                            }
                            if name != b"phpunit" {
                                return Err(parse_error(format!(
                                    "expected <phpunit> root element, found <{}>",
                                    String::from_utf8_lossy(&name)
                                )));
                            }
                            seen_root = true;
                            bootstrap = attribute(start, b"bootstrap", path)?
                                .filter(|value| !value.is_empty())
                                .map(|value| base_dir.join(value));
                            Scope::Root
                        }
                        Some(Scope::Root) if name == b"testsuites" => {
                            seen_testsuites = true;
                            Scope::TestSuites
                        }
                        Some(Scope::Root) if name == b"testsuite" => {
                            current_suite = Some(suite_from(start, path)?);
                            Scope::TestSuite { legacy: true }
                        }
                        Some(Scope::TestSuites) if name == b"testsuite" => {
                            current_suite = Some(suite_from(start, path)?);
                            Scope::TestSuite { legacy: false }
                        }
                        Some(Scope::TestSuite { .. }) => {
                            let entry = match name.as_slice() {
                                b"directory" => Some(PendingEntry::Directory {
                                    prefix: attribute(start, b"prefix", path)?.unwrap_or_default(),
                                    suffix: attribute(start, b"suffix", path)?
                                        .unwrap_or_else(|| DEFAULT_SUFFIX.to_string()),
                                    php_version: attribute(start, b"phpVersion", path)?,
                                    php_version_operator: attribute(start, b"phpVersionOperator", path)?,
                                }),
                                b"file" => Some(PendingEntry::File {
                                    php_version: attribute(start, b"phpVersion", path)?,
                                    php_version_operator: attribute(start, b"phpVersionOperator", path)?,
                                }),
                                b"exclude" => Some(PendingEntry::Exclude),
                                _ => None,
                            };
                            match entry {
                                Some(entry) => {
                                    pending = Some((entry, String::new()));
                                    Scope::Entry
                                }
                                None => Scope::Other,
                            }
                        }
                        _ => Scope::Other,
                    };

                    if is_empty {
                        close_scope(
                            scope,
                            &base_dir,
                            &mut current_suite,
                            &mut pending,
                            &mut grouped,
                            &mut legacy,
                        );
                    } else {
                        scopes.push(scope);
                    }
                }
                Event::Text(text) => {
                    if let Some((_, buffer)) = pending.as_mut() {
                        let text = text
                            .unescape()
                            .map_err(|e| parse_error(e.to_string()))?;
                        buffer.push_str(&text);
                    }
                }
                Event::CData(data) => {
                    if let Some((_, buffer)) = pending.as_mut() {
                        buffer.push_str(&String::from_utf8_lossy(&data.into_inner()));
                    }
                }
                Event::End(_) => {
                    if let Some(scope) = scopes.pop() {
                        close_scope(
                            scope,
                            &base_dir,
                            &mut current_suite,
                            &mut pending,
                            &mut grouped,
                            &mut legacy,
                        );
                    }
                }
                Event::Eof => break,
                _ => {}
            }
        }

        if !seen_root {
            return Err(parse_error("document has no <phpunit> root element".to_string()));
        }
        if !scopes.is_empty() {
            return Err(parse_error("unexpected end of document".to_string()));
        }

        // <testsuite> directly under <phpunit> only counts without <testsuites>
        let suites = if seen_testsuites { grouped } else { legacy };

        Ok(Self {
            path: path.to_path_buf(),
            base_dir,
            bootstrap,
            suites,
        })
    }

    /// Names of all declared suites, in document order
    pub fn suite_names(&self) -> Vec<&str> {
        self.suites.iter().map(|suite| suite.name.as_str()).collect()
    }
}

fn close_scope(
    scope: Scope,
    base_dir: &Path,
    current_suite: &mut Option<SuiteDefinition>,
    pending: &mut Option<(PendingEntry, String)>,
    grouped: &mut Vec<SuiteDefinition>,
    legacy: &mut Vec<SuiteDefinition>,
) {
    match scope {
        Scope::TestSuite { legacy: is_legacy } => {
            if let Some(suite) = current_suite.take() {
                if is_legacy {
                    legacy.push(suite);
                } else {
                    grouped.push(suite);
                }
            }
        }
        Scope::Entry => {
            let (Some((entry, text)), Some(suite)) = (pending.take(), current_suite.as_mut()) else {
                return;
            };
            let text = text.trim();
            if text.is_empty() {
                return;
            }
            let path = base_dir.join(text);
            match entry {
                PendingEntry::Directory {
                    prefix,
                    suffix,
                    php_version,
                    php_version_operator,
                } => suite.directories.push(DirectoryEntry {
                    path,
                    prefix,
                    suffix,
                    php_version,
                    php_version_operator,
                }),
                PendingEntry::File {
                    php_version,
                    php_version_operator,
                } => suite.files.push(FileEntry {
                    path,
                    php_version,
                    php_version_operator,
                }),
                PendingEntry::Exclude => suite.excludes.push(path),
            }
        }
        _ => {}
    }
}

fn suite_from(start: &BytesStart<'_>, path: &Path) -> Result<SuiteDefinition> {
    Ok(SuiteDefinition {
        name: attribute(start, b"name", path)?.unwrap_or_default(),
        ..SuiteDefinition::default()
    })
}

fn attribute(start: &BytesStart<'_>, key: &[u8], path: &Path) -> Result<Option<String>> {
    for attr in start.attributes() {
        let attr = attr.map_err(|e| FinderError::ConfigurationParse {
            path: path.to_path_buf(),
            details: e.to_string(),
        })?;
        if attr.key.local_name().as_ref() == key {
            let value = attr
                .unescape_value()
                .map_err(|e| FinderError::ConfigurationParse {
                    path: path.to_path_buf(),
                    details: e.to_string(),
                })?;
            return Ok(Some(value.trim().to_string()));
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn parse(content: &str) -> Result<PhpUnitConfiguration> {
        PhpUnitConfiguration::parse(content, Path::new("/project/phpunit.xml"))
    }

    #[test]
    fn test_parse_suites_with_entries() {
        let config = parse(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<phpunit xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance"
         bootstrap="tests/bootstrap.php"
         colors="true">
    <testsuites>
        <testsuite name="Unit">
            <directory suffix="Test.php">tests/Unit</directory>
            <exclude>tests/Unit/Fixtures</exclude>
        </testsuite>
        <testsuite name="Integration">
            <directory prefix="It" suffix=".phpt" phpVersion="8.1" phpVersionOperator="&gt;=">tests/Integration</directory>
            <file>tests/Smoke/SmokeTest.php</file>
        </testsuite>
    </testsuites>
    <php>
        <env name="APP_ENV" value="testing"/>
    </php>
</phpunit>"#,
        )
        .unwrap();

        assert_eq!(config.base_dir, PathBuf::from("/project"));
        assert_eq!(
            config.bootstrap,
            Some(PathBuf::from("/project/tests/bootstrap.php"))
        );
        assert_eq!(config.suite_names(), vec!["Unit", "Integration"]);

        let unit = &config.suites[0];
        assert_eq!(unit.directories.len(), 1);
        assert_eq!(unit.directories[0].path, PathBuf::from("/project/tests/Unit"));
        assert_eq!(unit.directories[0].suffix, "Test.php");
        assert_eq!(unit.directories[0].prefix, "");
        assert_eq!(unit.excludes, vec![PathBuf::from("/project/tests/Unit/Fixtures")]);
        assert!(unit.files.is_empty());

        let integration = &config.suites[1];
        let dir = &integration.directories[0];
        assert_eq!(dir.prefix, "It");
        assert_eq!(dir.suffix, ".phpt");
        assert_eq!(dir.php_version.as_deref(), Some("8.1"));
        assert_eq!(dir.php_version_operator.as_deref(), Some(">="));
        assert_eq!(
            integration.files[0].path,
            PathBuf::from("/project/tests/Smoke/SmokeTest.php")
        );
    }

    #[test]
    fn test_default_suffix_and_trimmed_text() {
        let config = parse(
            r#"<phpunit><testsuites><testsuite name="All">
                <directory>
                    tests
                </directory>
                <directory>   </directory>
            </testsuite></testsuites></phpunit>"#,
        )
        .unwrap();

        let suite = &config.suites[0];
        assert_eq!(suite.directories.len(), 1);
        assert_eq!(suite.directories[0].path, PathBuf::from("/project/tests"));
        assert_eq!(suite.directories[0].suffix, DEFAULT_SUFFIX);
    }

    #[test]
    fn test_absolute_entries_are_kept() {
        let config = parse(
            r#"<phpunit><testsuites><testsuite name="Abs">
                <file>/elsewhere/FooTest.php</file>
            </testsuite></testsuites></phpunit>"#,
        )
        .unwrap();

        assert_eq!(
            config.suites[0].files[0].path,
            PathBuf::from("/elsewhere/FooTest.php")
        );
    }

    #[test]
    fn test_legacy_testsuite_under_root() {
        let config = parse(
            r#"<phpunit>
                <testsuite name="Legacy"><directory>tests</directory></testsuite>
            </phpunit>"#,
        )
        .unwrap();
        assert_eq!(config.suite_names(), vec!["Legacy"]);
    }

    #[test]
    fn test_grouped_suites_shadow_legacy_ones() {
        let config = parse(
            r#"<phpunit>
                <testsuite name="Legacy"><directory>old</directory></testsuite>
                <testsuites>
                    <testsuite name="Current"><directory>new</directory></testsuite>
                </testsuites>
            </phpunit>"#,
        )
        .unwrap();
        assert_eq!(config.suite_names(), vec!["Current"]);
    }

    #[test]
    fn test_empty_testsuites_element_disables_legacy_suites() {
        let config = parse(
            r#"<phpunit>
                <testsuite name="Legacy"><directory>old</directory></testsuite>
                <testsuites/>
            </phpunit>"#,
        )
        .unwrap();
        assert!(config.suites.is_empty());

        let config = parse(
            r#"<phpunit>
                <testsuites></testsuites>
                <testsuite name="Legacy"><directory>old</directory></testsuite>
            </phpunit>"#,
        )
        .unwrap();
        assert!(config.suites.is_empty());
    }

    #[test]
    fn test_empty_suite_and_self_closing_elements() {
        let config = parse(
            r#"<phpunit bootstrap=""><testsuites>
                <testsuite name="Empty"/>
                <testsuite name="Other"><exclude/></testsuite>
            </testsuites></phpunit>"#,
        )
        .unwrap();

        assert_eq!(config.bootstrap, None);
        assert_eq!(config.suite_names(), vec!["Empty", "Other"]);
        assert!(config.suites[1].excludes.is_empty());
    }

    #[test]
    fn test_cdata_and_entities_in_paths() {
        let config = parse(
            r#"<phpunit><testsuites><testsuite name="Odd">
                <directory><![CDATA[tests/R&D]]></directory>
                <file>tests/A&amp;B/FooTest.php</file>
            </testsuite></testsuites></phpunit>"#,
        )
        .unwrap();

        let suite = &config.suites[0];
        assert_eq!(suite.directories[0].path, PathBuf::from("/project/tests/R&D"));
        assert_eq!(
            suite.files[0].path,
            PathBuf::from("/project/tests/A&B/FooTest.php")
        );
    }

    #[test]
    fn test_wrong_root_element() {
        let result = parse("<configuration><testsuites/></configuration>");
        match result {
            Err(FinderError::ConfigurationParse { details, .. }) => {
                assert!(details.contains("<phpunit>"))
            }
            other => panic!("Expected ConfigurationParse, got {:?}", other),
        }
    }

    #[test]
    fn test_malformed_documents() {
        assert!(matches!(
            parse("<phpunit><testsuites></phpunit>"),
            Err(FinderError::ConfigurationParse { .. })
        ));
        assert!(matches!(
            parse("<phpunit><testsuites>"),
            Err(FinderError::ConfigurationParse { .. })
        ));
        assert!(matches!(
            parse(""),
            Err(FinderError::ConfigurationParse { .. })
        ));
    }

    #[tokio::test]
    async fn test_load_missing_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("phpunit.xml");

        match PhpUnitConfiguration::load(&path).await {
            Err(FinderError::ConfigurationNotFound { path: reported }) => assert_eq!(reported, path),
            other => panic!("Expected ConfigurationNotFound, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_load_from_disk() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("phpunit.xml");
        std::fs::write(
            &path,
            r#"<phpunit><testsuites><testsuite name="Unit"><directory>tests</directory></testsuite></testsuites></phpunit>"#,
        )
        .unwrap();

        let config = PhpUnitConfiguration::load(&path).await.unwrap();
        assert_eq!(config.base_dir, temp_dir.path());
        assert_eq!(config.suites[0].directories[0].path, temp_dir.path().join("tests"));
    }
}
