//! Just enough `Gemfile.lock` parsing for the deploy checks.

use std::sync::OnceLock;

use regex::Regex;

pub const DEFAULT_BUNDLER_VERSION: &str = "1.17.3";

const DATABASE_ADAPTERS: &[&str] = &["mysql", "mysql2", "do_mysql", "pg", "do_postgres"];

fn bundled_with() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?m)^BUNDLED WITH\r?\n\s+(\S+)").expect("valid regex"))
}

fn bundler_spec() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?m)^ {4}bundler \((\d[^)]*)\)").expect("valid regex"))
}

fn gem_spec() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?m)^ {4}([A-Za-z0-9_.-]+) \(").expect("valid regex"))
}

#[derive(Debug, Clone)]
pub struct Lockfile {
    gems: Vec<String>,
    bundler_version: String,
}

impl Lockfile {
    pub fn parse(content: &str) -> Self {
        let gems = gem_spec()
            .captures_iter(content)
            .map(|c| c[1].to_string())
            .collect();

        let bundler_version = bundled_with()
            .captures(content)
            .or_else(|| bundler_spec().captures(content))
            .map(|c| c[1].trim().to_string())
            .unwrap_or_else(|| DEFAULT_BUNDLER_VERSION.to_string());

        Self {
            gems,
            bundler_version,
        }
    }

    pub fn bundler_version(&self) -> &str {
        &self.bundler_version
    }

    pub fn has_gem(&self, name: &str) -> bool {
        self.gems.iter().any(|g| g == name)
    }

    pub fn any_database_adapter(&self) -> bool {
        DATABASE_ADAPTERS.iter().any(|a| self.has_gem(a))
    }

    /// SQLite only counts when no server-backed adapter is present.
    pub fn uses_sqlite3(&self) -> bool {
        !self.any_database_adapter() && self.has_gem("sqlite3")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LOCKFILE: &str = "\
GEM
  remote: https://rubygems.org/
  specs:
    mysql2 (0.5.3)
    rack (2.2.3)
    rails (6.0.0)
      rack (>= 2.0)
    ey_config (0.0.7)

PLATFORMS
  ruby

DEPENDENCIES
  mysql2
  rails

BUNDLED WITH
   2.1.4
";

    #[test]
    fn bundled_with_wins() {
        assert_eq!(Lockfile::parse(LOCKFILE).bundler_version(), "2.1.4");
    }

    #[test]
    fn bundler_spec_is_the_fallback() {
        let content = "GEM\n  specs:\n    bundler (1.0.21)\n    rack (1.4.0)\n";
        assert_eq!(Lockfile::parse(content).bundler_version(), "1.0.21");
    }

    #[test]
    fn default_version_when_unspecified() {
        let content = "GEM\n  specs:\n    rack (1.4.0)\n";
        assert_eq!(Lockfile::parse(content).bundler_version(), DEFAULT_BUNDLER_VERSION);
    }

    #[test]
    fn detects_adapters_and_gems() {
        let lockfile = Lockfile::parse(LOCKFILE);
        assert!(lockfile.any_database_adapter());
        assert!(lockfile.has_gem("ey_config"));
        assert!(!lockfile.has_gem("rack (>= 2.0)"));
        assert!(!lockfile.uses_sqlite3());
    }

    #[test]
    fn sqlite_only_app() {
        let lockfile = Lockfile::parse("GEM\n  specs:\n    sqlite3 (1.4.2)\n");
        assert!(!lockfile.any_database_adapter());
        assert!(lockfile.uses_sqlite3());
    }
}
