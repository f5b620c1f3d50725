//! Fixture discovery
//!
//! [`FixtureLoader`] walks a suite directory in a deterministic order
//! (depth-first, entries sorted by file name) and yields one item per fixture
//! file. Iteration is lazy and restartable: every call to
//! [`FixtureLoader::iter`] starts a fresh traversal.

use super::{path_id, TestDescriptor};
use crate::error::MalformedFixture;
use rustc_hash::FxHashMap as HashMap;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Selects which fixtures take part in a run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FixtureFilter {
    /// Keep descriptors whose id starts with any of these
    pub id_prefixes: Vec<String>,
    /// Keep descriptors with a section starting with any of these
    pub sections: Vec<String>,
}

impl FixtureFilter {
    pub fn is_empty(&self) -> bool {
        self.id_prefixes.is_empty() && self.sections.is_empty()
    }

    pub fn matches(&self, descriptor: &TestDescriptor) -> bool {
        let id_ok = self.id_prefixes.is_empty()
            || self.id_prefixes.iter().any(|p| descriptor.id.starts_with(p.as_str()));
        let section_ok = self.sections.is_empty()
            || descriptor
                .sections()
                .any(|s| self.sections.iter().any(|p| s.starts_with(p.as_str())));
        id_ok && section_ok
    }

    /// Malformed fixtures have no metadata, so only the id prefix can apply.
    fn matches_malformed(&self, fixture: &MalformedFixture) -> bool {
        if self.is_empty() {
            return true;
        }
        self.sections.is_empty()
            && self.id_prefixes.iter().any(|p| fixture.id.starts_with(p.as_str()))
    }
}

/// Discovers fixtures under a root directory
#[derive(Debug, Clone)]
pub struct FixtureLoader {
    root: PathBuf,
    extension: String,
    filter: FixtureFilter,
}

impl FixtureLoader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            extension: "js".to_string(),
            filter: FixtureFilter::default(),
        }
    }

    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = extension.into();
        self
    }

    pub fn with_filter(mut self, filter: FixtureFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Start a new traversal
    pub fn iter(&self) -> Fixtures<'_> {
        Fixtures {
            loader: self,
            walker: WalkDir::new(&self.root)
                .follow_links(true)
                .sort_by_file_name()
                .into_iter(),
            next_index: 0,
            seen: HashMap::default(),
        }
    }

    /// Load everything eagerly, in discovery order
    pub fn load_all(&self) -> Vec<Result<TestDescriptor, MalformedFixture>> {
        self.iter().collect()
    }

    fn relative<'p>(&self, path: &'p Path) -> &'p Path {
        path.strip_prefix(&self.root).unwrap_or(path)
    }

    fn is_fixture(&self, path: &Path) -> bool {
        path.extension()
            .map(|ext| ext == self.extension.as_str())
            .unwrap_or(false)
    }
}

/// Lazy traversal over a suite, produced by [`FixtureLoader::iter`]
pub struct Fixtures<'a> {
    loader: &'a FixtureLoader,
    walker: walkdir::IntoIter,
    next_index: usize,
    /// Declared ids already handed out, with the path that declared them
    seen: HashMap<String, PathBuf>,
}

impl Fixtures<'_> {
    fn read(&mut self, path: &Path) -> Result<TestDescriptor, MalformedFixture> {
        let relative = self.loader.relative(path).to_path_buf();
        let index = self.next_index;

        let source = std::fs::read_to_string(path).map_err(|e| {
            MalformedFixture::new(index, path_id(&relative), &relative, format!("unreadable: {}", e))
        })?;

        let descriptor = TestDescriptor::from_source(index, relative, source);
        if let Some(first) = self.seen.get(&descriptor.id) {
            return Err(MalformedFixture::new(
                index,
                path_id(&descriptor.path),
                &descriptor.path,
                format!("duplicate id '{}' (first declared in {})", descriptor.id, first.display()),
            ));
        }
        Ok(descriptor)
    }
}

impl Iterator for Fixtures<'_> {
    type Item = Result<TestDescriptor, MalformedFixture>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let entry = match self.walker.next()? {
                Ok(entry) => entry,
                Err(err) => {
                    let path = err.path().map(Path::to_path_buf).unwrap_or_else(|| self.loader.root.clone());
                    let relative = self.loader.relative(&path).to_path_buf();
                    let malformed = MalformedFixture::new(
                        self.next_index,
                        path_id(&relative),
                        relative,
                        format!("unreadable: {}", err),
                    );
                    if !self.loader.filter.matches_malformed(&malformed) {
                        continue;
                    }
                    self.next_index += 1;
                    return Some(Err(malformed));
                }
            };

            if !entry.file_type().is_file() || !self.loader.is_fixture(entry.path()) {
                continue;
            }

            let item = self.read(entry.path());
            let keep = match &item {
                Ok(descriptor) => self.loader.filter.matches(descriptor),
                Err(malformed) => self.loader.filter.matches_malformed(malformed),
            };
            if !keep {
                continue;
            }

            if let Ok(descriptor) = &item {
                self.seen.insert(descriptor.id.clone(), descriptor.path.clone());
            }
            tracing::trace!(index = self.next_index, path = %entry.path().display(), "discovered fixture");
            self.next_index += 1;
            return Some(item);
        }
    }
}
