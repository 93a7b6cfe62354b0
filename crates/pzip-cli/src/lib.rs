use std::path::Path;
use std::sync::Arc;

use glob::Pattern;
use pzip_core::pipeline::SkipPredicate;

/// Include/exclude glob filtering shared by both binaries.
///
/// With include patterns present, a path must match at least one to be
/// taken; any exclude match always skips.
pub struct SkipRule {
    includes: Vec<Pattern>,
    excludes: Vec<Pattern>,
}

impl SkipRule {
    pub fn compile(includes: &[String], excludes: &[String]) -> Result<Self, glob::PatternError> {
        Ok(Self {
            includes: includes
                .iter()
                .map(|p| Pattern::new(p))
                .collect::<Result<_, _>>()?,
            excludes: excludes
                .iter()
                .map(|p| Pattern::new(p))
                .collect::<Result<_, _>>()?,
        })
    }

    pub fn skip(&self, path: &Path) -> bool {
        if !self.includes.is_empty() && !self.includes.iter().any(|p| p.matches_path(path)) {
            return true;
        }
        self.excludes.iter().any(|p| p.matches_path(path))
    }

    pub fn into_predicate(self) -> SkipPredicate {
        Arc::new(move |path| self.skip(path))
    }
}

/// Routes `tracing` diagnostics to stderr, filtered by `RUST_LOG`.
pub fn init_logging() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn includes_narrow_and_excludes_drop() -> Result<(), glob::PatternError> {
        let rule = SkipRule::compile(&["*.txt".to_string()], &["*.tmp.txt".to_string()])?;
        assert!(!rule.skip(Path::new("notes.txt")));
        assert!(rule.skip(Path::new("scratch.tmp.txt")));
        assert!(rule.skip(Path::new("binary.dat")));

        let open = SkipRule::compile(&[], &[])?;
        assert!(!open.skip(Path::new("anything")));
        Ok(())
    }
}
