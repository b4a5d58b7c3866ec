use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tokio::fs;

/// A throwaway PHP project laid out on disk
pub struct PhpProject {
    pub temp_dir: TempDir,
}

impl PhpProject {
    pub fn new() -> std::io::Result<Self> {
        Ok(Self {
            temp_dir: TempDir::new()?,
        })
    }

    pub fn root(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Canonical path of a project file, as the finder reports it
    pub fn canonical(&self, relative: &str) -> PathBuf {
        std::fs::canonicalize(self.root().join(relative)).unwrap()
    }

    pub async fn write(&self, relative: &str, content: &str) -> std::io::Result<PathBuf> {
        let path = self.root().join(relative);
        create_test_file(&path, content).await?;
        Ok(path)
    }

    pub async fn write_phpunit_xml(&self, testsuites: &str) -> std::io::Result<PathBuf> {
        self.write("phpunit.xml", &phpunit_xml(testsuites)).await
    }

    pub async fn write_test_case(
        &self,
        relative: &str,
        namespace: &str,
        class: &str,
    ) -> std::io::Result<PathBuf> {
        self.write(relative, &test_case_source(namespace, class, "TestCase"))
            .await
    }
}

/// The project most tests start from
///
/// Suites `Unit` (ATest, BTest plus an abstract base and a fixture that must
/// never be reported) and `Integration` (CTest), and a bootstrap file.
pub async fn create_sample_project() -> std::io::Result<PhpProject> {
    let project = PhpProject::new()?;

    project
        .write_phpunit_xml(
            r#"<testsuite name="Unit">
            <directory>tests/Unit</directory>
            <exclude>tests/Unit/Fixtures</exclude>
        </testsuite>
        <testsuite name="Integration">
            <directory suffix="Test.php">tests/Integration</directory>
        </testsuite>"#,
        )
        .await?;

    project.write("tests/bootstrap.php", BOOTSTRAP_PHP).await?;
    project
        .write("tests/Unit/AbstractUnitTest.php", ABSTRACT_BASE_PHP)
        .await?;
    project
        .write(
            "tests/Unit/ATest.php",
            &test_case_source("Tests\\Unit", "ATest", "AbstractUnitTest"),
        )
        .await?;
    project
        .write_test_case("tests/Unit/BTest.php", "Tests\\Unit", "BTest")
        .await?;
    project
        .write_test_case("tests/Unit/Fixtures/FixtureTest.php", "Tests\\Unit\\Fixtures", "FixtureTest")
        .await?;
    project
        .write_test_case("tests/Integration/CTest.php", "Tests\\Integration", "CTest")
        .await?;

    Ok(project)
}

pub fn phpunit_xml(testsuites: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<phpunit xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance"
         bootstrap="tests/bootstrap.php"
         colors="true">
    <testsuites>
        {testsuites}
    </testsuites>
</phpunit>
"#
    )
}

pub fn test_case_source(namespace: &str, class: &str, parent: &str) -> String {
    format!(
        r#"<?php

declare(strict_types=1);

namespace {namespace};

use PHPUnit\Framework\TestCase;

final class {class} extends {parent}
{{
    public function testSomething(): void
    {{
        $this->assertTrue(true);
    }}
}}
"#
    )
}

/// File system test utilities
pub async fn create_test_file(path: &Path, content: &str) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }
    fs::write(path, content).await
}

pub const BOOTSTRAP_PHP: &str = r#"<?php

require __DIR__ . '/../vendor/autoload.php';
"#;

pub const ABSTRACT_BASE_PHP: &str = r#"<?php

namespace Tests\Unit;

use PHPUnit\Framework\TestCase;

abstract class AbstractUnitTest extends TestCase
{
}
"#;
